// g_utils.rs - edict allocation, trigger touching and team helpers

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

use log::debug;

use q2sim_common::common::{ComError, ComResult};

use crate::dispatch::call_touch;
use crate::g_local::*;
use crate::game_import::GameImport;

pub fn g_init_edict(ctx: &mut GameCtx, idx: usize) {
    let e = &mut ctx.edicts[idx];
    e.inuse = true;
    e.classname = "noclass".to_string();
    e.gravity = 1.0;
    e.s.number = idx;
}

/// Either finds a free edict or allocates a new one.
///
/// Slots freed less than half a second ago are skipped so clients don't
/// lerp a new entity from the position of the old one. During the first
/// two seconds of a level any free slot is taken.
pub fn g_spawn(ctx: &mut GameCtx) -> ComResult<usize> {
    let first = ctx.maxclients + 1;
    for i in first..ctx.num_edicts {
        let e = &ctx.edicts[i];
        if !e.inuse && (e.freetime < 2.0 || ctx.level.time - e.freetime > 0.5) {
            g_init_edict(ctx, i);
            return Ok(i);
        }
    }

    if ctx.num_edicts == ctx.max_edicts {
        return Err(ComError::Drop("ED_Alloc: no free edicts".into()));
    }

    let i = ctx.num_edicts;
    ctx.num_edicts += 1;
    g_init_edict(ctx, i);
    Ok(i)
}

/// Marks the edict as free. Player slots are never freed.
pub fn g_free_edict(ctx: &mut GameCtx, gi: &mut dyn GameImport, idx: usize) {
    gi.unlinkentity(&mut ctx.edicts, idx);

    if idx <= ctx.maxclients {
        debug!("tried to free special edict {}", idx);
        return;
    }

    ctx.edicts[idx] = Edict {
        classname: "freed".to_string(),
        freetime: ctx.level.time,
        inuse: false,
        ..Edict::default()
    };
    ctx.edicts[idx].s.number = idx;
}

/// Calls the touch function of every trigger the entity is inside.
pub fn g_touch_triggers(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    let e = &ctx.edicts[ent];

    // dead things don't activate triggers
    if (e.client.is_some() || e.svflags & SVF_MONSTER != 0) && e.health <= 0 {
        return Ok(());
    }

    let (absmin, absmax) = (e.absmin, e.absmax);
    let touch = gi.area_edicts(&ctx.edicts, &absmin, &absmax, MAX_EDICTS, AreaList::Triggers);

    // the touch function can free or relink entities, so look each one up
    // again as it comes
    for hit in touch {
        if !ctx.edicts[hit].inuse {
            continue;
        }
        let Some(touch_fn) = ctx.edicts[hit].touch else {
            continue;
        };
        call_touch(touch_fn, ctx, gi, hit, ent, None, None)?;
    }
    Ok(())
}

/// The team starting at `master`, master first.
pub fn team_members(ctx: &GameCtx, master: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut part = Some(master);
    while let Some(p) = part {
        // a chain looping back on itself would never end
        if out.contains(&p) {
            break;
        }
        out.push(p);
        part = ctx.edicts[p].teamchain;
    }
    out
}

/// Chains `members` into a team. The first one becomes the master and the
/// rest are flagged as slaves so only the master runs physics.
pub fn g_link_team(ctx: &mut GameCtx, members: &[usize]) {
    let Some(&master) = members.first() else {
        return;
    };
    for (n, &m) in members.iter().enumerate() {
        let e = &mut ctx.edicts[m];
        e.teammaster = Some(master);
        e.teamchain = members.get(n + 1).copied();
        if n == 0 {
            e.flags.remove(FL_TEAMSLAVE);
        } else {
            e.flags.insert(FL_TEAMSLAVE);
        }
    }
}

/// The team master of an entity, or the entity itself when it has none.
pub fn g_team_master(ctx: &GameCtx, ent: usize) -> usize {
    let e = &ctx.edicts[ent];
    if e.flags.contains(FL_TEAMSLAVE) {
        e.teammaster.unwrap_or(ent)
    } else {
        ent
    }
}

const VEC_UP: Vec3 = [0.0, -1.0, 0.0];
const MOVEDIR_UP: Vec3 = [0.0, 0.0, 1.0];
const VEC_DOWN: Vec3 = [0.0, -2.0, 0.0];
const MOVEDIR_DOWN: Vec3 = [0.0, 0.0, -1.0];

/// Turns editor angles into a movement direction and clears them. A yaw of
/// -1 means straight up and -2 straight down.
pub fn g_set_movedir(angles: &mut Vec3) -> Vec3 {
    let movedir = if vector_compare(angles, &VEC_UP) {
        MOVEDIR_UP
    } else if vector_compare(angles, &VEC_DOWN) {
        MOVEDIR_DOWN
    } else {
        angle_vectors(angles).0
    };
    *angles = VEC3_ORIGIN;
    movedir
}
