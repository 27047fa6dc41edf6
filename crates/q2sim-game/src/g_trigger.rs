// g_trigger.rs - trigger volumes

/*
Copyright (C) 1997-2001 Id Software, Inc.

This program is free software; you can redistribute it and/or
modify it under the terms of the GNU General Public License
as published by the Free Software Foundation; either version 2
of the License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

See the GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program; if not, write to the Free Software
Foundation, Inc., 59 Temple Place - Suite 330, Boston, MA  02111-1307, USA.
*/

use q2sim_common::common::ComResult;

use crate::dispatch::TouchFn;
use crate::g_local::*;
use crate::g_utils::{g_free_edict, g_set_movedir, g_spawn};
use crate::game_import::GameImport;

pub const PUSH_ONCE: i32 = 1;

/// A non-solid-to-movement volume that only fires touch functions.
pub fn init_trigger(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) {
    let e = &mut ctx.edicts[ent];
    if !vector_compare(&e.s.angles, &VEC3_ORIGIN) {
        e.movedir = g_set_movedir(&mut e.s.angles);
    }
    e.solid = Solid::Trigger;
    e.movetype = MoveType::None;
    e.svflags = SVF_NOCLIENT;
    gi.linkentity(&mut ctx.edicts, ent);
}

pub fn trigger_push_touch(
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    ent: usize,
    other: usize,
    _plane: Option<&CPlane>,
    _surf: Option<&CSurface>,
) -> ComResult<()> {
    let (movedir, speed, spawnflags) = {
        let e = &ctx.edicts[ent];
        (e.movedir, e.speed, e.spawnflags)
    };

    let o = &mut ctx.edicts[other];
    if o.classname == "grenade" || o.health > 0 {
        o.velocity = vector_scale(&movedir, speed * 10.0);
    }

    if spawnflags & PUSH_ONCE != 0 {
        g_free_edict(ctx, gi, ent);
    }
    Ok(())
}

/// Pushes anything alive that touches it along `angles`.
pub fn spawn_trigger_push(
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    origin: Vec3,
    mins: Vec3,
    maxs: Vec3,
    angles: Vec3,
    speed: f32,
) -> ComResult<usize> {
    let ent = g_spawn(ctx)?;
    {
        let e = &mut ctx.edicts[ent];
        e.classname = "trigger_push".to_string();
        e.s.origin = origin;
        e.s.angles = angles;
        e.mins = mins;
        e.maxs = maxs;
        e.speed = if speed == 0.0 { 1000.0 } else { speed };
        e.touch = Some(TouchFn::TriggerPush);
    }
    init_trigger(ctx, gi, ent);
    Ok(ent)
}
