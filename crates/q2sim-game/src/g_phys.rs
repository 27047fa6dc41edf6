// g_phys.rs - entity physics

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

/*
pushmove objects do not obey gravity, and do not interact with each other or trigger fields,
but block normal movement and push normal objects when they move.

onground is set for toss objects when they come to a complete rest. it is set for stepping
or walking objects

doors, plats, etc are SOLID_BSP, and MOVETYPE_PUSH
bonus items are SOLID_TRIGGER touch, and MOVETYPE_TOSS
corpses are SOLID_NOT and MOVETYPE_TOSS
crates are SOLID_BBOX and MOVETYPE_TOSS
walking monsters are SOLID_SLIDEBOX and MOVETYPE_STEP
flying/floating monsters are SOLID_SLIDEBOX and MOVETYPE_FLY

solid_edge items only clip against bsp models.
*/

use log::debug;

use q2sim_common::common::ComResult;

use crate::dispatch::{call_blocked, call_think, call_touch};
use crate::g_local::*;
use crate::g_utils::{g_touch_triggers, team_members};
use crate::game_import::GameImport;
use crate::m_move::{m_catagorize_position, m_check_bottom, m_check_ground, sv_movestep};

const STOP_EPSILON: f32 = 0.1;
const MAX_CLIP_PLANES: usize = 5;

pub const SV_STOPSPEED: f32 = 100.0;
pub const SV_FRICTION: f32 = 6.0;
pub const SV_WATERFRICTION: f32 = 1.0;

/// Saved position of an entity moved during a push, for rollback.
#[derive(Debug, Clone, Copy)]
struct Pushed {
    ent: usize,
    origin: Vec3,
    angles: Vec3,
    deltayaw: i16,
}

/// Entities moved so far by one pusher team this frame.
#[derive(Debug, Default)]
pub struct PushState {
    pushed: Vec<Pushed>,
}

impl PushState {
    fn save(&mut self, ctx: &GameCtx, ent: usize) {
        let e = &ctx.edicts[ent];
        let deltayaw = e.client.map_or(0, |c| ctx.clients[c].ps.pmove.delta_angles[YAW]);
        self.pushed.push(Pushed { ent, origin: e.s.origin, angles: e.s.angles, deltayaw });
    }
}

fn restore_pushed(ctx: &mut GameCtx, p: &Pushed) {
    let e = &mut ctx.edicts[p.ent];
    e.s.origin = p.origin;
    e.s.angles = p.angles;
    if let Some(c) = e.client {
        ctx.clients[c].ps.pmove.delta_angles[YAW] = p.deltayaw;
    }
}

/// Returns the world if the entity is stuck in something solid.
pub fn sv_test_entity_position(ctx: &GameCtx, gi: &mut dyn GameImport, ent: usize) -> Option<usize> {
    let e = &ctx.edicts[ent];
    let mask = if e.clipmask != 0 { e.clipmask } else { MASK_SOLID };
    let trace = gi.trace(&ctx.edicts, &e.s.origin, &e.mins, &e.maxs, &e.s.origin, Some(ent), mask);
    if trace.startsolid {
        return Some(0);
    }
    None
}

pub fn sv_check_velocity(ctx: &mut GameCtx, ent: usize) {
    let maxvelocity = ctx.cvars.maxvelocity;
    for v in ctx.edicts[ent].velocity.iter_mut() {
        *v = v.clamp(-maxvelocity, maxvelocity);
    }
}

/// Runs the think function if it is due. Returns false if it ran.
///
/// `nextthink` is cleared before the call, so a think function that wants
/// to run again must reschedule itself.
pub fn sv_run_think(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<bool> {
    let thinktime = ctx.edicts[ent].nextthink;
    if thinktime <= 0.0 {
        return Ok(true);
    }
    if thinktime > ctx.level.time + 0.001 {
        return Ok(true);
    }

    ctx.edicts[ent].nextthink = 0.0;
    let Some(think) = ctx.edicts[ent].think else {
        panic!("NULL ent->think for {} ({})", ent, ctx.edicts[ent].classname);
    };
    call_think(think, ctx, gi, ent)?;
    Ok(false)
}

/// Two entities have touched, so run their touch functions.
pub fn sv_impact(ctx: &mut GameCtx, gi: &mut dyn GameImport, e1: usize, trace: &Trace) -> ComResult<()> {
    let e2 = trace.ent.unwrap_or(0);

    if let Some(touch) = ctx.edicts[e1].touch {
        if ctx.edicts[e1].solid != Solid::Not {
            call_touch(touch, ctx, gi, e1, e2, Some(&trace.plane), trace.surface.as_ref())?;
        }
    }

    if let Some(touch) = ctx.edicts[e2].touch {
        if ctx.edicts[e2].solid != Solid::Not {
            call_touch(touch, ctx, gi, e2, e1, None, None)?;
        }
    }
    Ok(())
}

/// Slides off of the impacting plane. Returns the new velocity and the
/// blocked flags: 1 for a floor, 2 for a wall or step.
pub fn clip_velocity(vel: &Vec3, normal: &Vec3, overbounce: f32) -> (Vec3, i32) {
    let mut blocked = 0;
    if normal[2] > 0.0 {
        blocked |= 1;
    }
    if normal[2] == 0.0 {
        blocked |= 2;
    }

    let backoff = dot_product(vel, normal) * overbounce;

    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = vel[i] - normal[i] * backoff;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    (out, blocked)
}

/// The basic solid body movement clip that slides along multiple planes.
///
/// Returns the clipflags if the velocity was modified (hit something
/// solid): 1 = floor, 2 = wall / step, 4 = dead stop.
pub fn sv_fly_move(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, time: f32, mask: i32) -> ComResult<i32> {
    let numbumps = 4;
    let mut blocked = 0;
    let mut planes: [Vec3; MAX_CLIP_PLANES] = [VEC3_ORIGIN; MAX_CLIP_PLANES];
    let mut numplanes = 0;
    let primal_velocity = ctx.edicts[ent].velocity;
    let mut original_velocity = primal_velocity;
    let mut time_left = time;

    ctx.edicts[ent].groundentity = None;

    for _ in 0..numbumps {
        let (origin, mins, maxs, velocity) = {
            let e = &ctx.edicts[ent];
            (e.s.origin, e.mins, e.maxs, e.velocity)
        };
        let end = vector_ma(&origin, time_left, &velocity);

        let trace = gi.trace(&ctx.edicts, &origin, &mins, &maxs, &end, Some(ent), mask);

        if trace.allsolid {
            // entity is trapped in another solid
            ctx.edicts[ent].velocity = VEC3_ORIGIN;
            return Ok(3);
        }

        if trace.fraction > 0.0 {
            // actually covered some distance
            ctx.edicts[ent].s.origin = trace.endpos;
            original_velocity = ctx.edicts[ent].velocity;
            numplanes = 0;
        }

        if trace.fraction == 1.0 {
            // moved the entire distance
            break;
        }

        let hit = trace.ent.unwrap_or(0);

        if trace.plane.normal[2] > 0.7 {
            blocked |= 1;
            if ctx.edicts[hit].solid == Solid::Bsp {
                let linkcount = ctx.edicts[hit].linkcount;
                let e = &mut ctx.edicts[ent];
                e.groundentity = Some(hit);
                e.groundentity_linkcount = linkcount;
            }
        }
        if trace.plane.normal[2] == 0.0 {
            // step
            blocked |= 2;
        }

        // run the impact function
        sv_impact(ctx, gi, ent, &trace)?;
        if !ctx.edicts[ent].inuse {
            // removed by the impact function
            break;
        }

        time_left -= time_left * trace.fraction;

        // cliped to another plane
        if numplanes >= MAX_CLIP_PLANES {
            // this shouldn't really happen
            ctx.edicts[ent].velocity = VEC3_ORIGIN;
            return Ok(3);
        }

        planes[numplanes] = trace.plane.normal;
        numplanes += 1;

        // modify original_velocity so it parallels all of the clip planes
        let mut new_velocity = VEC3_ORIGIN;
        let mut i = 0;
        while i < numplanes {
            new_velocity = clip_velocity(&original_velocity, &planes[i], 1.0).0;
            let fits = (0..numplanes).all(|j| j == i || dot_product(&new_velocity, &planes[j]) >= 0.0);
            if fits {
                break;
            }
            i += 1;
        }

        if i != numplanes {
            // go along this plane
            ctx.edicts[ent].velocity = new_velocity;
        } else {
            // go along the crease
            if numplanes != 2 {
                ctx.edicts[ent].velocity = VEC3_ORIGIN;
                return Ok(7);
            }
            let dir = cross_product(&planes[0], &planes[1]);
            let d = dot_product(&dir, &ctx.edicts[ent].velocity);
            ctx.edicts[ent].velocity = vector_scale(&dir, d);
        }

        // if original velocity is against the original velocity, stop dead
        // to avoid tiny occilations in sloping corners
        if dot_product(&ctx.edicts[ent].velocity, &primal_velocity) <= 0.0 {
            ctx.edicts[ent].velocity = VEC3_ORIGIN;
            return Ok(blocked);
        }
    }

    Ok(blocked)
}

pub fn sv_add_gravity(ctx: &mut GameCtx, ent: usize) {
    let gravity = ctx.cvars.gravity;
    let e = &mut ctx.edicts[ent];
    e.velocity[2] -= e.gravity * gravity * FRAMETIME;
}

/// Does not change the entity's velocity at all.
pub fn sv_push_entity(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, push: &Vec3) -> ComResult<Trace> {
    let start = ctx.edicts[ent].s.origin;
    let end = vector_add(&start, push);

    let trace = loop {
        let e = &ctx.edicts[ent];
        let mask = if e.clipmask != 0 { e.clipmask } else { MASK_SOLID };
        let trace = gi.trace(&ctx.edicts, &start, &e.mins, &e.maxs, &end, Some(ent), mask);

        ctx.edicts[ent].s.origin = trace.endpos;
        gi.linkentity(&mut ctx.edicts, ent);

        if trace.fraction != 1.0 {
            sv_impact(ctx, gi, ent, &trace)?;

            // if the pushed entity went away and the pusher is still there
            if let Some(hit) = trace.ent {
                if !ctx.edicts[hit].inuse && ctx.edicts[ent].inuse {
                    // move the pusher back and try again
                    ctx.edicts[ent].s.origin = start;
                    gi.linkentity(&mut ctx.edicts, ent);
                    continue;
                }
            }
        }
        break trace;
    };

    if ctx.edicts[ent].inuse {
        g_touch_triggers(ctx, gi, ent)?;
    }

    Ok(trace)
}

/// Objects need to be moved back on a failed push, otherwise riders would
/// continue to slide. Returns the obstacle when the move was blocked; every
/// entity moved by this team so far is then back where it started.
pub fn sv_push(
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    state: &mut PushState,
    pusher: usize,
    mv: &Vec3,
    amove: &Vec3,
) -> ComResult<Option<usize>> {
    // clamp the move to 1/8 units, so the position will be accurate for
    // client side prediction
    let mut mv = *mv;
    for m in mv.iter_mut() {
        let mut temp = *m * 8.0;
        if temp > 0.0 {
            temp += 0.5;
        } else {
            temp -= 0.5;
        }
        *m = 0.125 * (temp as i32) as f32;
    }

    // find the bounding box
    let mins = vector_add(&ctx.edicts[pusher].absmin, &mv);
    let maxs = vector_add(&ctx.edicts[pusher].absmax, &mv);

    // we need this for pushing things later
    let org = vector_negate(amove);
    let (forward, right, up) = angle_vectors(&org);

    // save the pusher's original position
    state.save(ctx, pusher);

    // move the pusher to its final position
    {
        let p = &mut ctx.edicts[pusher];
        p.s.origin = vector_add(&p.s.origin, &mv);
        p.s.angles = vector_add(&p.s.angles, amove);
    }
    gi.linkentity(&mut ctx.edicts, pusher);

    // see if any solid entities are inside the final position
    for check in 1..ctx.num_edicts {
        {
            let c = &ctx.edicts[check];
            if !c.inuse {
                continue;
            }
            if matches!(c.movetype, MoveType::Push | MoveType::Stop | MoveType::None | MoveType::Noclip) {
                continue;
            }
            // not linked in anywhere
            if c.area.is_none() {
                continue;
            }
        }

        // if the entity is standing on the pusher, it will definitely be moved
        if ctx.edicts[check].groundentity != Some(pusher) {
            let c = &ctx.edicts[check];
            // see if the ent needs to be tested
            if c.absmin[0] >= maxs[0]
                || c.absmin[1] >= maxs[1]
                || c.absmin[2] >= maxs[2]
                || c.absmax[0] <= mins[0]
                || c.absmax[1] <= mins[1]
                || c.absmax[2] <= mins[2]
            {
                continue;
            }

            // see if the ent's bbox is inside the pusher's final position
            if sv_test_entity_position(ctx, gi, check).is_none() {
                continue;
            }
        }

        if ctx.edicts[pusher].movetype == MoveType::Push || ctx.edicts[check].groundentity == Some(pusher) {
            // move this entity
            state.save(ctx, check);

            // try moving the contacted entity
            ctx.edicts[check].s.origin = vector_add(&ctx.edicts[check].s.origin, &mv);
            if let Some(c) = ctx.edicts[check].client {
                let delta = &mut ctx.clients[c].ps.pmove.delta_angles[YAW];
                *delta = delta.wrapping_add(angle2short(amove[YAW]));
            }

            // figure movement due to the pusher's amove
            let org = vector_subtract(&ctx.edicts[check].s.origin, &ctx.edicts[pusher].s.origin);
            let org2 = [dot_product(&org, &forward), -dot_product(&org, &right), dot_product(&org, &up)];
            let move2 = vector_subtract(&org2, &org);
            ctx.edicts[check].s.origin = vector_add(&ctx.edicts[check].s.origin, &move2);

            // may have pushed them off an edge
            if ctx.edicts[check].groundentity != Some(pusher) {
                ctx.edicts[check].groundentity = None;
            }

            if sv_test_entity_position(ctx, gi, check).is_none() {
                // pushed ok
                gi.linkentity(&mut ctx.edicts, check);
                continue;
            }

            // if it is ok to leave in the old position, do it.
            // this is only relevent for riding entities, not pushed.
            // the saved copy is restored so no rotation offset survives
            if let Some(saved) = state.pushed.last().copied() {
                restore_pushed(ctx, &saved);
            }
            if sv_test_entity_position(ctx, gi, check).is_none() {
                state.pushed.pop();
                continue;
            }
        }

        // move back any entities we already moved. go backwards, so if the
        // same entity was pushed twice, it goes back to the original position
        for p in state.pushed.iter().rev() {
            restore_pushed(ctx, p);
            gi.linkentity(&mut ctx.edicts, p.ent);
        }
        debug!("push of {} blocked by {}", pusher, check);
        return Ok(Some(check));
    }

    // see if anything we moved has touched a trigger
    let moved: Vec<usize> = state.pushed.iter().rev().map(|p| p.ent).collect();
    for ent in moved {
        g_touch_triggers(ctx, gi, ent)?;
    }

    Ok(None)
}

/// Bmodel objects don't interact with each other, but push all box objects.
/// Returns the obstacle if the team was blocked this frame.
pub fn sv_physics_pusher(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<Option<usize>> {
    // if not a team captain, so movement will be handled elsewhere
    if ctx.edicts[ent].flags.contains(FL_TEAMSLAVE) {
        return Ok(None);
    }

    // make sure all team slaves can move before commiting any moves or
    // calling any think functions. If the move is blocked, all moved
    // objects will be backed out
    let team = team_members(ctx, ent);
    let mut state = PushState::default();
    let mut blocked = None;

    for &part in &team {
        let (velocity, avelocity) = (ctx.edicts[part].velocity, ctx.edicts[part].avelocity);
        if velocity.iter().chain(avelocity.iter()).any(|&v| v != 0.0) {
            // object is moving
            let mv = vector_scale(&velocity, FRAMETIME);
            let amove = vector_scale(&avelocity, FRAMETIME);
            if let Some(obstacle) = sv_push(ctx, gi, &mut state, part, &mv, &amove)? {
                blocked = Some((part, obstacle));
                // move was blocked
                break;
            }
        }
    }

    if let Some((part, obstacle)) = blocked {
        // the move failed, bump all nextthink times and back out moves
        for &mv in &team {
            if ctx.edicts[mv].nextthink > 0.0 {
                ctx.edicts[mv].nextthink += FRAMETIME;
            }
        }

        // if the pusher has a "blocked" function, call it
        // otherwise, just stay in place until the obstacle is gone
        if let Some(b) = ctx.edicts[part].blocked {
            call_blocked(b, ctx, gi, part, obstacle)?;
        }
        return Ok(Some(obstacle));
    }

    // the move succeeded, so call all think functions
    for part in team {
        sv_run_think(ctx, gi, part)?;
    }
    Ok(None)
}

/// Non moving objects can only think.
pub fn sv_physics_none(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    sv_run_think(ctx, gi, ent)?;
    Ok(())
}

/// A moving object that doesn't obey physics.
pub fn sv_physics_noclip(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    // regular thinking
    if !sv_run_think(ctx, gi, ent)? {
        return Ok(());
    }
    if !ctx.edicts[ent].inuse {
        return Ok(());
    }

    let e = &mut ctx.edicts[ent];
    e.s.angles = vector_ma(&e.s.angles, FRAMETIME, &e.avelocity);
    e.s.origin = vector_ma(&e.s.origin, FRAMETIME, &e.velocity);

    gi.linkentity(&mut ctx.edicts, ent);
    Ok(())
}

/// Toss, bounce, and fly movement. When onground, do nothing.
pub fn sv_physics_toss(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    // regular thinking
    sv_run_think(ctx, gi, ent)?;
    if !ctx.edicts[ent].inuse {
        return Ok(());
    }

    // if not a team captain, so movement will be handled elsewhere
    if ctx.edicts[ent].flags.contains(FL_TEAMSLAVE) {
        return Ok(());
    }

    if ctx.edicts[ent].velocity[2] > 0.0 {
        ctx.edicts[ent].groundentity = None;
    }

    // check for the groundentity going away
    if let Some(g) = ctx.edicts[ent].groundentity {
        if !ctx.edicts[g].inuse {
            ctx.edicts[ent].groundentity = None;
        }
    }

    // if onground, return without moving
    if ctx.edicts[ent].groundentity.is_some() {
        return Ok(());
    }

    let old_origin = ctx.edicts[ent].s.origin;

    sv_check_velocity(ctx, ent);

    // add gravity
    let movetype = ctx.edicts[ent].movetype;
    if movetype != MoveType::Fly && movetype != MoveType::FlyMissile {
        sv_add_gravity(ctx, ent);
    }

    // move angles
    {
        let e = &mut ctx.edicts[ent];
        e.s.angles = vector_ma(&e.s.angles, FRAMETIME, &e.avelocity);
    }

    // move origin
    let mv = vector_scale(&ctx.edicts[ent].velocity, FRAMETIME);
    let trace = sv_push_entity(ctx, gi, ent, &mv)?;
    if !ctx.edicts[ent].inuse {
        return Ok(());
    }

    if trace.fraction < 1.0 {
        let backoff = if movetype == MoveType::Bounce { 1.5 } else { 1.0 };
        let (vel, _) = clip_velocity(&ctx.edicts[ent].velocity, &trace.plane.normal, backoff);
        ctx.edicts[ent].velocity = vel;

        // stop if on ground
        if trace.plane.normal[2] > 0.7 && (vel[2] < 60.0 || movetype != MoveType::Bounce) {
            let hit = trace.ent.unwrap_or(0);
            let linkcount = ctx.edicts[hit].linkcount;
            let e = &mut ctx.edicts[ent];
            e.groundentity = Some(hit);
            e.groundentity_linkcount = linkcount;
            e.velocity = VEC3_ORIGIN;
            e.avelocity = VEC3_ORIGIN;
        }
    }

    // check for water transition
    let wasinwater = ctx.edicts[ent].watertype & MASK_WATER != 0;
    let origin = ctx.edicts[ent].s.origin;
    let watertype = gi.pointcontents(&ctx.edicts, &origin);
    let isinwater = watertype & MASK_WATER != 0;
    {
        let e = &mut ctx.edicts[ent];
        e.watertype = watertype;
        e.waterlevel = if isinwater { 1 } else { 0 };
    }

    if !wasinwater && isinwater {
        debug!("{} entered water at {:?}", ent, old_origin);
    } else if wasinwater && !isinwater {
        debug!("{} left water at {:?}", ent, origin);
    }

    // move teamslaves
    let mut slave = ctx.edicts[ent].teamchain;
    while let Some(s) = slave {
        if s == ent {
            break;
        }
        ctx.edicts[s].s.origin = origin;
        gi.linkentity(&mut ctx.edicts, s);
        slave = ctx.edicts[s].teamchain;
    }
    Ok(())
}

pub fn sv_add_rotational_friction(ctx: &mut GameCtx, ent: usize) {
    let e = &mut ctx.edicts[ent];
    e.s.angles = vector_ma(&e.s.angles, FRAMETIME, &e.avelocity);
    let adjustment = FRAMETIME * SV_STOPSPEED * SV_FRICTION;
    for v in e.avelocity.iter_mut() {
        if *v > 0.0 {
            *v -= adjustment;
            if *v < 0.0 {
                *v = 0.0;
            }
        } else {
            *v += adjustment;
            if *v > 0.0 {
                *v = 0.0;
            }
        }
    }
}

/// Monsters freefall when they don't have a ground entity, otherwise all
/// movement is done with discrete steps. This is also used for objects
/// that have become still on the ground, but will fall if the floor is
/// pulled out from under them.
pub fn sv_physics_step(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    // airborn monsters should always check for ground
    if ctx.edicts[ent].groundentity.is_none() {
        m_check_ground(ctx, gi, ent);
    }

    let wasonground = ctx.edicts[ent].groundentity.is_some();

    sv_check_velocity(ctx, ent);

    if ctx.edicts[ent].avelocity.iter().any(|&v| v != 0.0) {
        sv_add_rotational_friction(ctx, ent);
    }

    // add gravity except:
    //   flying monsters
    //   swimming monsters who are in the water
    let mut hitsound = false;
    {
        let e = &ctx.edicts[ent];
        let floats = e.flags.contains(FL_FLY) || (e.flags.contains(FL_SWIM) && e.waterlevel > 2);
        if !wasonground && !floats {
            if e.velocity[2] < ctx.cvars.gravity * -0.1 {
                hitsound = true;
            }
            if e.waterlevel == 0 {
                sv_add_gravity(ctx, ent);
            }
        }
    }

    let e = &mut ctx.edicts[ent];

    // friction for flying monsters that have been given vertical velocity
    if e.flags.contains(FL_FLY) && e.velocity[2] != 0.0 {
        let speed = e.velocity[2].abs();
        let control = if speed < SV_STOPSPEED { SV_STOPSPEED } else { speed };
        let friction = SV_FRICTION / 3.0;
        let newspeed = (speed - FRAMETIME * control * friction).max(0.0) / speed;
        e.velocity[2] *= newspeed;
    }

    // friction for swimming monsters that have been given vertical velocity
    if e.flags.contains(FL_SWIM) && e.velocity[2] != 0.0 {
        let speed = e.velocity[2].abs();
        let control = if speed < SV_STOPSPEED { SV_STOPSPEED } else { speed };
        let newspeed =
            (speed - FRAMETIME * control * SV_WATERFRICTION * e.waterlevel as f32).max(0.0) / speed;
        e.velocity[2] *= newspeed;
    }

    if e.velocity.iter().any(|&v| v != 0.0) {
        // apply friction
        // let dead monsters who aren't completely onground slide
        if wasonground || e.flags.intersects(FL_SWIM | FL_FLY) {
            let dead = ctx.edicts[ent].health <= 0;
            if !(dead && !m_check_bottom(ctx, gi, ent)) {
                let vel = &mut ctx.edicts[ent].velocity;
                let speed = (vel[0] * vel[0] + vel[1] * vel[1]).sqrt();
                if speed != 0.0 {
                    let control = if speed < SV_STOPSPEED { SV_STOPSPEED } else { speed };
                    let newspeed = (speed - FRAMETIME * control * SV_FRICTION).max(0.0) / speed;
                    vel[0] *= newspeed;
                    vel[1] *= newspeed;
                }
            }
        }

        // grounded walkers step over ledges, everything else slides
        let e = &ctx.edicts[ent];
        let walks = wasonground && !e.flags.intersects(FL_SWIM | FL_FLY) && e.velocity[2] == 0.0;
        let step = [e.velocity[0] * FRAMETIME, e.velocity[1] * FRAMETIME, 0.0];
        if !walks || !sv_movestep(ctx, gi, ent, &step, false)? {
            let mask = if ctx.edicts[ent].svflags & SVF_MONSTER != 0 { MASK_MONSTERSOLID } else { MASK_SOLID };
            sv_fly_move(ctx, gi, ent, FRAMETIME, mask)?;
        }

        gi.linkentity(&mut ctx.edicts, ent);
        g_touch_triggers(ctx, gi, ent)?;
        if !ctx.edicts[ent].inuse {
            return Ok(());
        }

        if ctx.edicts[ent].groundentity.is_some() && !wasonground && hitsound {
            debug!("{} landed", ent);
        }
    }

    m_catagorize_position(ctx, gi, ent);

    // regular thinking
    sv_run_think(ctx, gi, ent)?;
    Ok(())
}

/// Advances one non-player entity by a frame.
pub fn g_run_entity(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    match ctx.edicts[ent].movetype {
        MoveType::Push | MoveType::Stop => {
            sv_physics_pusher(ctx, gi, ent)?;
        }
        MoveType::None => sv_physics_none(ctx, gi, ent)?,
        MoveType::Noclip => sv_physics_noclip(ctx, gi, ent)?,
        MoveType::Step => sv_physics_step(ctx, gi, ent)?,
        MoveType::Toss | MoveType::Bounce | MoveType::Fly | MoveType::FlyMissile => {
            sv_physics_toss(ctx, gi, ent)?
        }
        other => panic!("SV_Physics: bad movetype {:?} on entity {}", other, ent),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{BlockedFn, ThinkFn, TouchFn};
    use crate::g_utils::g_link_team;
    use crate::testutil::{spawn_box, BoxWorld};

    fn bits(v: &Vec3) -> [u32; 3] {
        [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()]
    }

    fn snapshot(ctx: &GameCtx) -> Vec<([u32; 3], [u32; 3])> {
        ctx.edicts.iter().map(|e| (bits(&e.s.origin), bits(&e.s.angles))).collect()
    }

    const HALF: (Vec3, Vec3) = ([-8.0, -8.0, -8.0], [8.0, 8.0, 8.0]);

    /// A door at x=0 moving +x, a crate against it and a wall against the crate.
    fn jammed_door(ctx: &mut GameCtx, gi: &mut BoxWorld) -> (usize, usize, usize) {
        let door = spawn_box(ctx, gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        ctx.edicts[door].velocity = [10.0, 0.0, 0.0];
        let blocker = spawn_box(ctx, gi, [16.0, 0.0, 0.0], HALF.0, HALF.1, Solid::Bbox, MoveType::Toss);
        let wall = spawn_box(ctx, gi, [32.0, 0.0, 0.0], HALF.0, HALF.1, Solid::Bsp, MoveType::None);
        (door, blocker, wall)
    }

    #[test]
    fn blocked_pusher_leaves_everything_in_place() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let (door, blocker, _) = jammed_door(&mut ctx, &mut gi);

        let before = snapshot(&ctx);
        let obstacle = sv_physics_pusher(&mut ctx, &mut gi, door).unwrap();
        assert_eq!(obstacle, Some(blocker));
        assert_eq!(snapshot(&ctx), before);
        assert_eq!(ctx.edicts[door].s.origin, [0.0; 3]);
        assert_eq!(ctx.edicts[blocker].s.origin, [16.0, 0.0, 0.0]);
    }

    #[test]
    fn rollback_restores_riders_exactly() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        // spawned first so it is moved before the blocker is found; odd
        // coordinates so any arithmetic round trip would show
        let rider = spawn_box(&mut ctx, &mut gi, [0.3, 0.1, 16.7], HALF.0, HALF.1, Solid::Bbox, MoveType::Step);
        let (door, _, _) = jammed_door(&mut ctx, &mut gi);
        ctx.edicts[rider].groundentity = Some(door);
        ctx.edicts[door].avelocity = [0.0, 33.3, 0.0];

        let before = snapshot(&ctx);
        let obstacle = sv_physics_pusher(&mut ctx, &mut gi, door).unwrap();
        assert!(obstacle.is_some());
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn rider_kept_in_place_is_restored_when_a_later_entity_blocks() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let rider = spawn_box(&mut ctx, &mut gi, [0.1, 0.0, 16.7], HALF.0, HALF.1, Solid::Bbox, MoveType::Step);
        let (door, blocker, _) = jammed_door(&mut ctx, &mut gi);
        ctx.edicts[rider].groundentity = Some(door);
        ctx.edicts[door].avelocity = [0.0, 90.0, 0.0];
        // the rider can't follow the door into this, so it stays behind
        spawn_box(&mut ctx, &mut gi, [17.0, 0.0, 16.7], HALF.0, HALF.1, Solid::Bsp, MoveType::None);

        let before = snapshot(&ctx);
        let obstacle = sv_physics_pusher(&mut ctx, &mut gi, door).unwrap();
        assert_eq!(obstacle, Some(blocker));
        assert_eq!(bits(&ctx.edicts[rider].s.origin), bits(&[0.1, 0.0, 16.7]));
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn rider_kept_in_place_drops_the_rotation_offset() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let rider = spawn_box(&mut ctx, &mut gi, [0.1, 0.0, 16.7], HALF.0, HALF.1, Solid::Bbox, MoveType::Step);
        let door = spawn_box(&mut ctx, &mut gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        ctx.edicts[door].velocity = [10.0, 0.0, 0.0];
        ctx.edicts[door].avelocity = [0.0, 90.0, 0.0];
        ctx.edicts[rider].groundentity = Some(door);
        spawn_box(&mut ctx, &mut gi, [17.0, 0.0, 16.7], HALF.0, HALF.1, Solid::Bsp, MoveType::None);

        assert_eq!(sv_physics_pusher(&mut ctx, &mut gi, door).unwrap(), None);
        assert_eq!(ctx.edicts[door].s.origin, [1.0, 0.0, 0.0]);
        assert_eq!(bits(&ctx.edicts[rider].s.origin), bits(&[0.1, 0.0, 16.7]));
    }

    #[test]
    fn push_moves_entities_in_the_way() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let door = spawn_box(&mut ctx, &mut gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        ctx.edicts[door].velocity = [10.0, 0.0, 0.0];
        let crate_ = spawn_box(&mut ctx, &mut gi, [16.0, 0.0, 0.0], HALF.0, HALF.1, Solid::Bbox, MoveType::Toss);

        assert_eq!(sv_physics_pusher(&mut ctx, &mut gi, door).unwrap(), None);
        assert_eq!(ctx.edicts[door].s.origin, [1.0, 0.0, 0.0]);
        assert_eq!(ctx.edicts[crate_].s.origin, [17.0, 0.0, 0.0]);
    }

    #[test]
    fn stop_movers_do_not_push() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let plat = spawn_box(&mut ctx, &mut gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Stop);
        ctx.edicts[plat].velocity = [10.0, 0.0, 0.0];
        let crate_ = spawn_box(&mut ctx, &mut gi, [16.0, 0.0, 0.0], HALF.0, HALF.1, Solid::Bbox, MoveType::Toss);

        assert_eq!(sv_physics_pusher(&mut ctx, &mut gi, plat).unwrap(), Some(crate_));
        assert_eq!(ctx.edicts[plat].s.origin, [0.0; 3]);
    }

    #[test]
    fn push_is_quantized_to_eighths() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let door = spawn_box(&mut ctx, &mut gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        let mut state = PushState::default();
        sv_push(&mut ctx, &mut gi, &mut state, door, &[0.33, -0.33, 0.0], &VEC3_ORIGIN).unwrap();
        assert_eq!(ctx.edicts[door].s.origin, [0.375, -0.375, 0.0]);
    }

    fn mark_think(ctx: &mut GameCtx, _gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
        ctx.edicts[ent].health += 1;
        Ok(())
    }

    fn mark_blocked(ctx: &mut GameCtx, _gi: &mut dyn GameImport, ent: usize, other: usize) -> ComResult<()> {
        ctx.edicts[ent].activator = Some(other);
        Ok(())
    }

    #[test]
    fn blocked_team_delays_every_think() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        ctx.level.time = 1.0;
        let (door, blocker, _) = jammed_door(&mut ctx, &mut gi);
        let slave = spawn_box(&mut ctx, &mut gi, [0.0, 64.0, 0.0], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        ctx.edicts[slave].velocity = [10.0, 0.0, 0.0];
        g_link_team(&mut ctx, &[door, slave]);
        for e in [door, slave] {
            ctx.edicts[e].think = Some(ThinkFn::Custom(mark_think));
            ctx.edicts[e].nextthink = 1.0;
        }
        ctx.edicts[door].blocked = Some(BlockedFn::Custom(mark_blocked));

        let obstacle = sv_physics_pusher(&mut ctx, &mut gi, door).unwrap();
        assert_eq!(obstacle, Some(blocker));
        assert_eq!(ctx.edicts[door].activator, Some(blocker));
        for e in [door, slave] {
            assert_eq!(ctx.edicts[e].health, 0);
            assert_eq!(ctx.edicts[e].nextthink, 1.0 + FRAMETIME);
        }
        assert_eq!(ctx.edicts[slave].s.origin, [0.0, 64.0, 0.0]);

        // slaves never run on their own
        assert_eq!(sv_physics_pusher(&mut ctx, &mut gi, slave).unwrap(), None);
    }

    #[test]
    fn earlier_team_members_roll_back_too() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        let free = spawn_box(&mut ctx, &mut gi, [0.0, 64.0, 0.0], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        ctx.edicts[free].velocity = [10.0, 0.0, 0.0];
        let (door, _, _) = jammed_door(&mut ctx, &mut gi);
        g_link_team(&mut ctx, &[free, door]);

        assert!(sv_physics_pusher(&mut ctx, &mut gi, free).unwrap().is_some());
        assert_eq!(ctx.edicts[free].s.origin, [0.0, 64.0, 0.0]);
    }

    #[test]
    fn successful_team_runs_all_thinks() {
        let mut ctx = GameCtx::new(0, 16);
        let mut gi = BoxWorld::default();
        ctx.level.time = 1.0;
        let a = spawn_box(&mut ctx, &mut gi, [0.0; 3], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        let b = spawn_box(&mut ctx, &mut gi, [0.0, 64.0, 0.0], HALF.0, HALF.1, Solid::Bsp, MoveType::Push);
        g_link_team(&mut ctx, &[a, b]);
        for e in [a, b] {
            ctx.edicts[e].velocity = [0.0, 0.0, 10.0];
            ctx.edicts[e].think = Some(ThinkFn::Custom(mark_think));
            ctx.edicts[e].nextthink = 1.0;
        }
        assert_eq!(sv_physics_pusher(&mut ctx, &mut gi, a).unwrap(), None);
        assert_eq!(ctx.edicts[a].health, 1);
        assert_eq!(ctx.edicts[b].health, 1);
        assert_eq!(ctx.edicts[b].s.origin, [0.0, 64.0, 1.0]);
        assert_eq!(ctx.edicts[a].nextthink, 0.0);
    }

    #[test]
    fn think_runs_once_when_due() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let e = crate::g_utils::g_spawn(&mut ctx).unwrap();
        ctx.edicts[e].think = Some(ThinkFn::Custom(mark_think));
        ctx.edicts[e].nextthink = 0.5;

        ctx.level.time = 0.4;
        assert!(sv_run_think(&mut ctx, &mut gi, e).unwrap());
        ctx.level.time = 0.4995;
        assert!(!sv_run_think(&mut ctx, &mut gi, e).unwrap());
        assert_eq!(ctx.edicts[e].health, 1);
        assert_eq!(ctx.edicts[e].nextthink, 0.0);
        assert!(sv_run_think(&mut ctx, &mut gi, e).unwrap());
        assert_eq!(ctx.edicts[e].health, 1);
    }

    #[test]
    #[should_panic(expected = "NULL ent->think")]
    fn missing_think_is_fatal() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let e = crate::g_utils::g_spawn(&mut ctx).unwrap();
        ctx.edicts[e].nextthink = 0.1;
        ctx.level.time = 0.1;
        let _ = sv_run_think(&mut ctx, &mut gi, e);
    }

    #[test]
    #[should_panic(expected = "bad movetype")]
    fn walk_movetype_is_not_simulated_here() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let e = crate::g_utils::g_spawn(&mut ctx).unwrap();
        ctx.edicts[e].movetype = MoveType::Walk;
        let _ = g_run_entity(&mut ctx, &mut gi, e);
    }

    #[test]
    fn toss_lands_on_the_floor() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 10.0], [-4.0; 3], [4.0; 3], Solid::Bbox, MoveType::Toss);
        ctx.edicts[e].velocity = [0.0, 0.0, -50.0];

        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        let ent = &ctx.edicts[e];
        assert_eq!(ent.velocity, VEC3_ORIGIN);
        assert_eq!(ent.groundentity, Some(0));
        assert!((ent.s.origin[2] - 4.0).abs() < 1e-4);

        // resting entities don't move or trace
        let traces = gi.traces;
        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(gi.traces, traces);
    }

    #[test]
    fn bounce_keeps_fast_rebounds() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 10.0], [-4.0; 3], [4.0; 3], Solid::Bbox, MoveType::Bounce);
        ctx.edicts[e].velocity = [0.0, 0.0, -400.0];

        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        let ent = &ctx.edicts[e];
        assert!(ent.groundentity.is_none());
        // -480 reflected with 1.5 overbounce
        assert!((ent.velocity[2] - 240.0).abs() < 0.01);
    }

    #[test]
    fn toss_tracks_water() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld { floor: Some(-100.0), water_top: Some(0.0), ..BoxWorld::default() };
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 10.0], [-1.0; 3], [1.0; 3], Solid::Bbox, MoveType::Toss);
        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        assert!((ctx.edicts[e].s.origin[2] - 2.0).abs() < 1e-4);
        assert_eq!(ctx.edicts[e].waterlevel, 0);
        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        assert!(ctx.edicts[e].s.origin[2] < 0.0);
        assert_eq!(ctx.edicts[e].waterlevel, 1);
        assert_eq!(ctx.edicts[e].watertype, CONTENTS_WATER);
    }

    #[test]
    fn flymissile_ignores_gravity() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let e = spawn_box(&mut ctx, &mut gi, [0.0; 3], [-1.0; 3], [1.0; 3], Solid::Bbox, MoveType::FlyMissile);
        ctx.edicts[e].velocity = [100.0, 0.0, 0.0];
        sv_physics_toss(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(ctx.edicts[e].s.origin, [10.0, 0.0, 0.0]);
        assert_eq!(ctx.edicts[e].velocity, [100.0, 0.0, 0.0]);
    }

    fn explode(
        ctx: &mut GameCtx,
        gi: &mut dyn GameImport,
        ent: usize,
        other: usize,
        plane: Option<&CPlane>,
        _surf: Option<&CSurface>,
    ) -> ComResult<()> {
        assert!(plane.is_some());
        ctx.edicts[other].health = -1;
        crate::g_utils::g_free_edict(ctx, gi, ent);
        Ok(())
    }

    #[test]
    fn impact_runs_touch_and_may_free() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let target = spawn_box(&mut ctx, &mut gi, [40.0, 0.0, 0.0], [-8.0; 3], [8.0; 3], Solid::Bsp, MoveType::None);
        let rocket = spawn_box(&mut ctx, &mut gi, [0.0; 3], [-1.0; 3], [1.0; 3], Solid::Bbox, MoveType::FlyMissile);
        ctx.edicts[rocket].velocity = [500.0, 0.0, 0.0];
        ctx.edicts[rocket].touch = Some(TouchFn::Custom(explode));

        sv_physics_toss(&mut ctx, &mut gi, rocket).unwrap();
        assert!(!ctx.edicts[rocket].inuse);
        assert_eq!(ctx.edicts[target].health, -1);
    }

    #[test]
    fn noclip_ignores_solids() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(100.0);
        let e = spawn_box(&mut ctx, &mut gi, [0.0; 3], [-1.0; 3], [1.0; 3], Solid::Not, MoveType::Noclip);
        ctx.edicts[e].velocity = [0.0, 0.0, -20.0];
        ctx.edicts[e].avelocity = [0.0, 90.0, 0.0];
        g_run_entity(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(ctx.edicts[e].s.origin, [0.0, 0.0, -2.0]);
        assert_eq!(ctx.edicts[e].s.angles, [0.0, 9.0, 0.0]);
        assert_eq!(gi.traces, 0);
    }

    #[test]
    fn clip_velocity_flags() {
        let (v, blocked) = clip_velocity(&[100.0, 0.0, -100.0], &[0.0, 0.0, 1.0], 1.0);
        assert_eq!(v, [100.0, 0.0, 0.0]);
        assert_eq!(blocked, 1);
        let (v, blocked) = clip_velocity(&[100.0, 0.0, 0.0], &[-1.0, 0.0, 0.0], 1.0);
        assert_eq!(v, [0.0, 0.0, 0.0]);
        assert_eq!(blocked, 2);
    }

    #[test]
    fn fly_move_slides_along_floor() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 9.0], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        ctx.edicts[e].velocity = [100.0, 0.0, -20.0];
        let blocked = sv_fly_move(&mut ctx, &mut gi, e, 0.1, MASK_SOLID).unwrap();
        assert_eq!(blocked, 1);
        let ent = &ctx.edicts[e];
        assert_eq!(ent.velocity, [100.0, 0.0, 0.0]);
        assert!((ent.s.origin[0] - 10.0).abs() < 1e-4);
        assert_eq!(ent.s.origin[2], 8.0);
        assert_eq!(ent.groundentity, Some(0));
    }

    #[test]
    fn step_friction_slows_grounded_entities() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 8.0], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        ctx.edicts[e].health = 100;
        ctx.edicts[e].velocity = [200.0, 0.0, 0.0];
        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        // grounded by the quarter unit probe, so no gravity and 200 - 0.1 * 200 * 6
        assert_eq!(ctx.edicts[e].velocity[2], 0.0);
        assert!((ctx.edicts[e].velocity[0] - 80.0).abs() < 1e-3);
        assert!((ctx.edicts[e].s.origin[0] - 8.0).abs() < 1e-3);
    }

    #[test]
    fn step_entities_climb_low_ledges() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        // an 8 unit step from x=24 to x=56
        let ledge = spawn_box(&mut ctx, &mut gi, [40.0, 0.0, 4.0], [-16.0, -16.0, -4.0], [16.0, 16.0, 4.0], Solid::Bsp, MoveType::None);
        let e = spawn_box(&mut ctx, &mut gi, [0.0, 0.0, 8.0], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        ctx.edicts[e].health = 100;

        let mut highest: f32 = 0.0;
        let mut stood_on_ledge = false;
        for _ in 0..5 {
            ctx.edicts[e].velocity = [400.0, 0.0, 0.0];
            sv_physics_step(&mut ctx, &mut gi, e).unwrap();
            highest = highest.max(ctx.edicts[e].s.origin[2]);
            stood_on_ledge |= ctx.edicts[e].groundentity == Some(ledge);
        }
        assert!((highest - 16.0).abs() < 1e-3, "{}", highest);
        assert!(stood_on_ledge);
        assert!(ctx.edicts[e].s.origin[0] > 56.0, "{:?}", ctx.edicts[e].s.origin);
    }

    #[test]
    fn step_entities_slide_along_tall_walls() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::with_floor(0.0);
        // too tall to step onto, so the move falls back to sliding
        spawn_box(&mut ctx, &mut gi, [40.0, 0.0, 50.0], [-16.0, -64.0, -50.0], [16.0, 64.0, 50.0], Solid::Bsp, MoveType::None);
        let e = spawn_box(&mut ctx, &mut gi, [8.0, 0.0, 8.0], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        ctx.edicts[e].health = 100;
        ctx.edicts[e].velocity = [400.0, 400.0, 0.0];

        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        let ent = &ctx.edicts[e];
        assert!((ent.s.origin[0] - 16.0).abs() < 1e-3, "{:?}", ent.s.origin);
        assert!(ent.s.origin[1] > 0.0);
        assert_eq!(ent.s.origin[2], 8.0);
    }

    #[test]
    fn swimmers_float_once_submerged() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld { floor: Some(-200.0), water_top: Some(200.0), ..BoxWorld::default() };
        let e = spawn_box(&mut ctx, &mut gi, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        ctx.edicts[e].health = 100;
        ctx.edicts[e].flags.insert(FL_SWIM);

        // not yet known to be in water, so the first frame falls
        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(ctx.edicts[e].velocity[2], -80.0);
        assert_eq!(ctx.edicts[e].waterlevel, 3);
        assert_eq!(ctx.edicts[e].watertype, CONTENTS_WATER);

        // submerged: no gravity, and water friction scaled by depth
        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        assert!((ctx.edicts[e].velocity[2] + 50.0).abs() < 1e-3, "{:?}", ctx.edicts[e].velocity);
        assert!((ctx.edicts[e].s.origin[2] + 13.0).abs() < 1e-3, "{:?}", ctx.edicts[e].s.origin);
    }

    #[test]
    fn step_entities_fall_without_ground() {
        let mut ctx = GameCtx::new(0, 8);
        let mut gi = BoxWorld::default();
        let e = spawn_box(&mut ctx, &mut gi, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Bbox, MoveType::Step);
        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(ctx.edicts[e].velocity[2], -80.0);
        assert_eq!(ctx.edicts[e].s.origin[2], -8.0);

        ctx.edicts[e].flags.insert(FL_FLY);
        ctx.edicts[e].velocity = VEC3_ORIGIN;
        sv_physics_step(&mut ctx, &mut gi, e).unwrap();
        assert_eq!(ctx.edicts[e].velocity, VEC3_ORIGIN);
    }

    #[test]
    fn velocity_is_clamped() {
        let mut ctx = GameCtx::new(0, 8);
        let e = crate::g_utils::g_spawn(&mut ctx).unwrap();
        ctx.edicts[e].velocity = [5000.0, -5000.0, 10.0];
        sv_check_velocity(&mut ctx, e);
        assert_eq!(ctx.edicts[e].velocity, [2000.0, -2000.0, 10.0]);
    }

    #[test]
    fn rotational_friction_stops_at_zero() {
        let mut ctx = GameCtx::new(0, 8);
        let e = crate::g_utils::g_spawn(&mut ctx).unwrap();
        ctx.edicts[e].avelocity = [30.0, -100.0, 0.0];
        sv_add_rotational_friction(&mut ctx, e);
        assert_eq!(ctx.edicts[e].avelocity, [0.0, -40.0, 0.0]);
        assert_eq!(ctx.edicts[e].s.angles, [3.0, -10.0, 0.0]);
    }
}
