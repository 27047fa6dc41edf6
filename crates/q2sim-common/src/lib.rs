#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::field_reassign_with_default,
         clippy::manual_range_contains, clippy::comparison_chain, clippy::float_cmp,
         clippy::needless_range_loop, clippy::manual_clamp, clippy::new_without_default)]

pub mod q_shared;
pub mod qfiles;
pub mod md4;
pub mod qcommon;
pub mod cvar;
pub mod common;
pub mod net;
pub mod net_chan;
pub mod pmove;
pub mod cmodel;
mod cm_trace;
