// g_main.rs - the game frame

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

use crate::g_local::*;
use crate::g_phys::g_run_entity;
use crate::game_import::GameImport;
use crate::m_move::m_check_ground;

/// Advances the world by one server frame.
///
/// Entities run in slot order. Players are skipped here: they only move
/// when a command arrives through `client_think`.
pub fn g_run_frame(ctx: &mut GameCtx, gi: &mut dyn GameImport) -> ComResult<()> {
    ctx.level.framenum += 1;
    ctx.level.time = ctx.level.framenum as f32 * FRAMETIME;

    //
    // treat each object in turn
    // even the world gets a chance to think
    //
    // entities spawned during the frame are picked up by the loop bound
    let mut i = 0;
    while i < ctx.num_edicts {
        if !ctx.edicts[i].inuse {
            i += 1;
            continue;
        }

        ctx.level.current_entity = Some(i);

        let e = &mut ctx.edicts[i];
        e.s.old_origin = e.s.origin;

        // if the ground entity moved, make sure we are still on it
        if let Some(g) = ctx.edicts[i].groundentity {
            if ctx.edicts[g].linkcount != ctx.edicts[i].groundentity_linkcount {
                ctx.edicts[i].groundentity = None;
                let e = &ctx.edicts[i];
                if !e.flags.intersects(FL_SWIM | FL_FLY) && e.svflags & SVF_MONSTER != 0 {
                    m_check_ground(ctx, gi, i);
                }
            }
        }

        if ctx.is_client(i) {
            i += 1;
            continue;
        }

        g_run_entity(ctx, gi, i)?;
        i += 1;
    }

    Ok(())
}
