#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::field_reassign_with_default,
         clippy::manual_range_contains, clippy::float_cmp, clippy::needless_range_loop)]
// Server side of the simulation: the area tree, level loading, client
// connections and the frame loop.

pub mod server;
pub mod sv_world;
pub mod sv_game;
pub mod sv_init;
pub mod sv_main;
pub mod sv_user;
pub mod sv_send;

#[cfg(test)]
mod testutil;
