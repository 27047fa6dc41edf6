// m_move.rs - monster step movement
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sim_common::common::ComResult;

use crate::g_local::*;
use crate::g_utils::g_touch_triggers;
use crate::game_import::GameImport;

/// Finds a ground entity for anything that walks.
pub fn m_check_ground(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) {
    let e = &ctx.edicts[ent];
    if e.flags.intersects(FL_SWIM | FL_FLY) {
        return;
    }

    if e.velocity[2] > 100.0 {
        ctx.edicts[ent].groundentity = None;
        return;
    }

    // if the hull point one-quarter unit down is solid the entity is on ground
    let point = [e.s.origin[0], e.s.origin[1], e.s.origin[2] - 0.25];
    let trace = gi.trace(&ctx.edicts, &e.s.origin, &e.mins, &e.maxs, &point, Some(ent), MASK_MONSTERSOLID);

    // check steepness
    if trace.plane.normal[2] < 0.7 && !trace.startsolid {
        ctx.edicts[ent].groundentity = None;
        return;
    }

    if !trace.startsolid && !trace.allsolid {
        let ground = trace.ent.unwrap_or(0);
        let linkcount = ctx.edicts[ground].linkcount;
        let e = &mut ctx.edicts[ent];
        e.s.origin = trace.endpos;
        e.groundentity = Some(ground);
        e.groundentity_linkcount = linkcount;
        e.velocity[2] = 0.0;
    }
}

/// Sets waterlevel 0..3 by probing the feet, the waist and the eyes.
pub fn m_catagorize_position(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) {
    let e = &ctx.edicts[ent];
    let mut point = e.s.origin;
    point[2] += e.mins[2] + 1.0;

    let cont = gi.pointcontents(&ctx.edicts, &point);
    if cont & MASK_WATER == 0 {
        let e = &mut ctx.edicts[ent];
        e.waterlevel = 0;
        e.watertype = 0;
        return;
    }

    ctx.edicts[ent].watertype = cont;
    ctx.edicts[ent].waterlevel = 1;
    point[2] += 26.0;
    if gi.pointcontents(&ctx.edicts, &point) & MASK_WATER == 0 {
        return;
    }

    ctx.edicts[ent].waterlevel = 2;
    point[2] += 22.0;
    if gi.pointcontents(&ctx.edicts, &point) & MASK_WATER != 0 {
        ctx.edicts[ent].waterlevel = 3;
    }
}

/// Returns false if any part of the bottom of the entity is off an edge
/// that is not a staircase.
pub fn m_check_bottom(ctx: &GameCtx, gi: &mut dyn GameImport, ent: usize) -> bool {
    let e = &ctx.edicts[ent];
    let mins = vector_add(&e.s.origin, &e.mins);
    let maxs = vector_add(&e.s.origin, &e.maxs);

    // if all of the points under the corners are solid world, don't bother
    // with the tougher checks. the corners must be within 16 of the
    // midpoint
    let mut start = [0.0, 0.0, mins[2] - 1.0];
    let mut all_solid = true;
    'corners: for x in 0..=1 {
        for y in 0..=1 {
            start[0] = if x != 0 { maxs[0] } else { mins[0] };
            start[1] = if y != 0 { maxs[1] } else { mins[1] };
            if gi.pointcontents(&ctx.edicts, &start) != CONTENTS_SOLID {
                all_solid = false;
                break 'corners;
            }
        }
    }
    if all_solid {
        // we got out easy
        return true;
    }

    // check it for real...
    let mid_x = (mins[0] + maxs[0]) * 0.5;
    let mid_y = (mins[1] + maxs[1]) * 0.5;
    let start = [mid_x, mid_y, mins[2]];
    let stop = [mid_x, mid_y, mins[2] - 2.0 * STEPSIZE];
    let trace = gi.trace(&ctx.edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &stop, Some(ent), MASK_MONSTERSOLID);

    if trace.fraction == 1.0 {
        return false;
    }
    let mid = trace.endpos[2];
    let mut bottom = mid;

    // the corners must be within 16 of the midpoint
    for x in 0..=1 {
        for y in 0..=1 {
            let cx = if x != 0 { maxs[0] } else { mins[0] };
            let cy = if y != 0 { maxs[1] } else { mins[1] };
            let start = [cx, cy, mins[2]];
            let stop = [cx, cy, mins[2] - 2.0 * STEPSIZE];

            let trace =
                gi.trace(&ctx.edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &stop, Some(ent), MASK_MONSTERSOLID);

            if trace.fraction != 1.0 && trace.endpos[2] > bottom {
                bottom = trace.endpos[2];
            }
            if trace.fraction == 1.0 || mid - trace.endpos[2] > STEPSIZE {
                return false;
            }
        }
    }

    true
}

fn relink(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    gi.linkentity(&mut ctx.edicts, ent);
    g_touch_triggers(ctx, gi, ent)
}

/// Called by monster program code. The move will be adjusted for slopes
/// and stairs, but if the move isn't possible, no move is done, false is
/// returned, and the entity is left where it was.
pub fn sv_movestep(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, mv: &Vec3, relink_ent: bool) -> ComResult<bool> {
    let oldorg = ctx.edicts[ent].s.origin;
    let mut neworg = vector_add(&oldorg, mv);

    // flying monsters don't step up
    if ctx.edicts[ent].flags.intersects(FL_SWIM | FL_FLY) {
        // try one move with vertical motion, then one without
        for i in 0..2 {
            neworg = vector_add(&ctx.edicts[ent].s.origin, mv);
            if i == 0 && ctx.edicts[ent].enemy.is_some() {
                if ctx.edicts[ent].goalentity.is_none() {
                    ctx.edicts[ent].goalentity = ctx.edicts[ent].enemy;
                }
                if let Some(goal) = ctx.edicts[ent].goalentity {
                    let e = &ctx.edicts[ent];
                    let g = &ctx.edicts[goal];
                    let dz = e.s.origin[2] - g.s.origin[2];
                    if g.client.is_some() {
                        if dz > 40.0 {
                            neworg[2] -= 8.0;
                        }
                        if !(e.flags.contains(FL_SWIM) && e.waterlevel < 2) && dz < 30.0 {
                            neworg[2] += 8.0;
                        }
                    } else if dz > 8.0 {
                        neworg[2] -= 8.0;
                    } else if dz > 0.0 {
                        neworg[2] -= dz;
                    } else if dz < -8.0 {
                        neworg[2] += 8.0;
                    } else {
                        neworg[2] += dz;
                    }
                }
            }

            let e = &ctx.edicts[ent];
            let trace = gi.trace(&ctx.edicts, &e.s.origin, &e.mins, &e.maxs, &neworg, Some(ent), MASK_MONSTERSOLID);
            let mut test = trace.endpos;
            test[2] += e.mins[2] + 1.0;

            // fly monsters don't enter water voluntarily
            if e.flags.contains(FL_FLY) && e.waterlevel == 0 {
                if gi.pointcontents(&ctx.edicts, &test) & MASK_WATER != 0 {
                    return Ok(false);
                }
            }

            // swim monsters don't exit water voluntarily
            if e.flags.contains(FL_SWIM) && e.waterlevel < 2 {
                if gi.pointcontents(&ctx.edicts, &test) & MASK_WATER == 0 {
                    return Ok(false);
                }
            }

            if trace.fraction == 1.0 {
                ctx.edicts[ent].s.origin = trace.endpos;
                if relink_ent {
                    relink(ctx, gi, ent)?;
                }
                return Ok(true);
            }

            if ctx.edicts[ent].enemy.is_none() {
                break;
            }
        }

        return Ok(false);
    }

    // push down from a step height above the wished position
    let stepsize = if ctx.edicts[ent].monsterinfo.aiflags.contains(AI_NOSTEP) { 1.0 } else { STEPSIZE };

    neworg[2] += stepsize;
    let mut end = neworg;
    end[2] -= stepsize * 2.0;

    let (mins, maxs) = (ctx.edicts[ent].mins, ctx.edicts[ent].maxs);
    let mut trace = gi.trace(&ctx.edicts, &neworg, &mins, &maxs, &end, Some(ent), MASK_MONSTERSOLID);

    if trace.allsolid {
        return Ok(false);
    }

    if trace.startsolid {
        neworg[2] -= stepsize;
        trace = gi.trace(&ctx.edicts, &neworg, &mins, &maxs, &end, Some(ent), MASK_MONSTERSOLID);
        if trace.allsolid || trace.startsolid {
            return Ok(false);
        }
    }

    // don't go in to water
    if ctx.edicts[ent].waterlevel == 0 {
        let mut test = trace.endpos;
        test[2] += mins[2] + 1.0;
        if gi.pointcontents(&ctx.edicts, &test) & MASK_WATER != 0 {
            return Ok(false);
        }
    }

    if trace.fraction == 1.0 {
        // if monster had the ground pulled out, go ahead and fall
        if ctx.edicts[ent].flags.contains(FL_PARTIALGROUND) {
            let e = &mut ctx.edicts[ent];
            e.s.origin = vector_add(&e.s.origin, mv);
            if relink_ent {
                relink(ctx, gi, ent)?;
            }
            ctx.edicts[ent].groundentity = None;
            return Ok(true);
        }

        // walked off an edge
        return Ok(false);
    }

    // check point traces down for dangling corners
    ctx.edicts[ent].s.origin = trace.endpos;

    if !m_check_bottom(ctx, gi, ent) {
        if ctx.edicts[ent].flags.contains(FL_PARTIALGROUND) {
            // entity had floor mostly pulled out from underneath it
            // and is trying to correct
            if relink_ent {
                relink(ctx, gi, ent)?;
            }
            return Ok(true);
        }
        ctx.edicts[ent].s.origin = oldorg;
        return Ok(false);
    }

    let ground = trace.ent.unwrap_or(0);
    let linkcount = ctx.edicts[ground].linkcount;
    {
        let e = &mut ctx.edicts[ent];
        e.flags.remove(FL_PARTIALGROUND);
        e.groundentity = Some(ground);
        e.groundentity_linkcount = linkcount;
    }

    // the move is ok
    if relink_ent {
        relink(ctx, gi, ent)?;
    }
    Ok(true)
}

/// Turns towards `ideal_yaw` by at most `yaw_speed` degrees.
pub fn m_change_yaw(ent: &mut Edict) {
    let current = anglemod(ent.s.angles[YAW]);
    let ideal = ent.ideal_yaw;

    if current == ideal {
        return;
    }

    let mut mv = ideal - current;
    let speed = ent.yaw_speed;
    if ideal > current {
        if mv >= 180.0 {
            mv -= 360.0;
        }
    } else if mv <= -180.0 {
        mv += 360.0;
    }
    mv = mv.clamp(-speed, speed);

    ent.s.angles[YAW] = anglemod(current + mv);
}

/// Steps `dist` units along `yaw`. Only grounded, flying or swimming
/// entities can walk.
pub fn m_walkmove(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, yaw: f32, dist: f32) -> ComResult<bool> {
    let e = &ctx.edicts[ent];
    if e.groundentity.is_none() && !e.flags.intersects(FL_FLY | FL_SWIM) {
        return Ok(false);
    }

    let yaw = yaw.to_radians();
    let mv = [yaw.cos() * dist, yaw.sin() * dist, 0.0];

    sv_movestep(ctx, gi, ent, &mv, true)
}
