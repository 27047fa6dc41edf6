#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::field_reassign_with_default,
         clippy::manual_range_contains, clippy::comparison_chain, clippy::float_cmp,
         clippy::needless_range_loop, clippy::manual_clamp, clippy::type_complexity)]
// Game side of the simulation: the entity arena and everything that moves it.

pub mod game;
pub mod g_local;
pub mod game_import;
pub mod dispatch;
pub mod g_utils;
pub mod g_phys;
pub mod m_move;
pub mod g_func;
pub mod g_trigger;
pub mod p_client;
pub mod g_main;

#[cfg(test)]
mod testutil;
