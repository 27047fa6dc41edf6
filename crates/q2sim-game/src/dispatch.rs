// dispatch.rs - named entity callbacks
//
// Edicts store small Copy tags instead of closures so the arena stays
// plain data. `Custom` lets tests and embedders attach their own behaviour.

use std::fmt;

use q2sim_common::common::ComResult;
use q2sim_common::q_shared::{CPlane, CSurface};

use crate::g_func;
use crate::g_local::GameCtx;
use crate::g_trigger;
use crate::g_utils;
use crate::game_import::GameImport;

pub type ThinkCallback = fn(&mut GameCtx, &mut dyn GameImport, usize) -> ComResult<()>;
pub type TouchCallback =
    fn(&mut GameCtx, &mut dyn GameImport, usize, usize, Option<&CPlane>, Option<&CSurface>) -> ComResult<()>;
pub type BlockedCallback = fn(&mut GameCtx, &mut dyn GameImport, usize, usize) -> ComResult<()>;

#[derive(Clone, Copy)]
pub enum ThinkFn {
    FreeEdict,
    MoveBegin,
    MoveFinal,
    MoveDone,
    AngleMoveBegin,
    AngleMoveFinal,
    AngleMoveDone,
    AccelMove,
    DoorGoDown,
    Custom(ThinkCallback),
}

#[derive(Clone, Copy)]
pub enum TouchFn {
    TriggerPush,
    Custom(TouchCallback),
}

#[derive(Clone, Copy)]
pub enum BlockedFn {
    Door,
    Rotating,
    Custom(BlockedCallback),
}

/// Called when a mover reaches its destination.
#[derive(Clone, Copy)]
pub enum EndFn {
    DoorHitTop,
    DoorHitBottom,
    Custom(ThinkCallback),
}

impl fmt::Debug for ThinkFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThinkFn::FreeEdict => "FreeEdict",
            ThinkFn::MoveBegin => "MoveBegin",
            ThinkFn::MoveFinal => "MoveFinal",
            ThinkFn::MoveDone => "MoveDone",
            ThinkFn::AngleMoveBegin => "AngleMoveBegin",
            ThinkFn::AngleMoveFinal => "AngleMoveFinal",
            ThinkFn::AngleMoveDone => "AngleMoveDone",
            ThinkFn::AccelMove => "AccelMove",
            ThinkFn::DoorGoDown => "DoorGoDown",
            ThinkFn::Custom(_) => "Custom",
        };
        f.write_str(name)
    }
}

impl fmt::Debug for TouchFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TouchFn::TriggerPush => f.write_str("TriggerPush"),
            TouchFn::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl fmt::Debug for BlockedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockedFn::Door => f.write_str("Door"),
            BlockedFn::Rotating => f.write_str("Rotating"),
            BlockedFn::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl fmt::Debug for EndFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndFn::DoorHitTop => f.write_str("DoorHitTop"),
            EndFn::DoorHitBottom => f.write_str("DoorHitBottom"),
            EndFn::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub fn call_think(think: ThinkFn, ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    match think {
        ThinkFn::FreeEdict => {
            g_utils::g_free_edict(ctx, gi, ent);
            Ok(())
        }
        ThinkFn::MoveBegin => g_func::move_begin(ctx, gi, ent),
        ThinkFn::MoveFinal => g_func::move_final(ctx, gi, ent),
        ThinkFn::MoveDone => g_func::move_done(ctx, gi, ent),
        ThinkFn::AngleMoveBegin => g_func::angle_move_begin(ctx, gi, ent),
        ThinkFn::AngleMoveFinal => g_func::angle_move_final(ctx, gi, ent),
        ThinkFn::AngleMoveDone => g_func::angle_move_done(ctx, gi, ent),
        ThinkFn::AccelMove => g_func::think_accelmove(ctx, gi, ent),
        ThinkFn::DoorGoDown => g_func::door_go_down(ctx, gi, ent),
        ThinkFn::Custom(f) => f(ctx, gi, ent),
    }
}

pub fn call_touch(
    touch: TouchFn,
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    ent: usize,
    other: usize,
    plane: Option<&CPlane>,
    surf: Option<&CSurface>,
) -> ComResult<()> {
    match touch {
        TouchFn::TriggerPush => g_trigger::trigger_push_touch(ctx, gi, ent, other, plane, surf),
        TouchFn::Custom(f) => f(ctx, gi, ent, other, plane, surf),
    }
}

pub fn call_blocked(
    blocked: BlockedFn,
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    ent: usize,
    other: usize,
) -> ComResult<()> {
    match blocked {
        BlockedFn::Door => g_func::door_blocked(ctx, gi, ent, other),
        BlockedFn::Rotating => g_func::rotating_blocked(ctx, gi, ent, other),
        BlockedFn::Custom(f) => f(ctx, gi, ent, other),
    }
}

pub fn call_end(endfunc: EndFn, ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    match endfunc {
        EndFn::DoorHitTop => g_func::door_hit_top(ctx, gi, ent),
        EndFn::DoorHitBottom => g_func::door_hit_bottom(ctx, gi, ent),
        EndFn::Custom(f) => f(ctx, gi, ent),
    }
}
