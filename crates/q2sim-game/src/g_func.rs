// g_func.rs - movers: linear and angular moves, doors, rotating brushes

/*
  Movers are SOLID_BSP MOVETYPE_PUSH entities. Their think functions set a
  velocity (or avelocity) and schedule the next think at the frame the
  move is expected to end; the pusher physics does the actual moving.
  When a move completes, moveinfo.endfunc is called.
*/

use log::debug;

use q2sim_common::common::ComResult;

use crate::dispatch::{call_end, BlockedFn, EndFn, ThinkFn};
use crate::g_local::*;
use crate::g_utils::{g_free_edict, g_set_movedir, g_spawn, team_members};
use crate::game_import::GameImport;

pub const DOOR_X_AXIS: i32 = 64;
pub const DOOR_Y_AXIS: i32 = 128;

pub const ROTATING_START_ON: i32 = 1;
pub const ROTATING_REVERSE: i32 = 2;
pub const ROTATING_X_AXIS: i32 = 4;
pub const ROTATING_Y_AXIS: i32 = 8;
pub const ROTATING_STOP: i32 = 32;

//
// Support routines for movement (changes in origin using velocity)
//

pub fn move_done(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    ctx.edicts[ent].velocity = VEC3_ORIGIN;
    match ctx.edicts[ent].moveinfo.endfunc {
        Some(f) => call_end(f, ctx, gi, ent),
        None => Ok(()),
    }
}

pub fn move_final(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    if ctx.edicts[ent].moveinfo.remaining_distance == 0.0 {
        return move_done(ctx, gi, ent);
    }

    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];
    e.velocity = vector_scale(&e.moveinfo.dir, e.moveinfo.remaining_distance / FRAMETIME);

    e.think = Some(ThinkFn::MoveDone);
    e.nextthink = time + FRAMETIME;
    Ok(())
}

pub fn move_begin(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    let mi = ctx.edicts[ent].moveinfo;
    if mi.speed * FRAMETIME >= mi.remaining_distance {
        return move_final(ctx, gi, ent);
    }

    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];
    e.velocity = vector_scale(&mi.dir, mi.speed);
    let frames = ((mi.remaining_distance / mi.speed) / FRAMETIME).floor();
    e.moveinfo.remaining_distance -= frames * mi.speed * FRAMETIME;
    e.nextthink = time + frames * FRAMETIME;
    e.think = Some(ThinkFn::MoveFinal);
    Ok(())
}

/// Whether this entity's team is the one being run right now, so a move
/// can start this frame instead of the next.
fn running_now(ctx: &GameCtx, ent: usize) -> bool {
    let e = &ctx.edicts[ent];
    let master = if e.flags.contains(FL_TEAMSLAVE) { e.teammaster } else { Some(ent) };
    ctx.level.current_entity.is_some() && ctx.level.current_entity == master
}

/// Starts a linear move to `dest`, calling `func` on arrival.
pub fn move_calc(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, dest: &Vec3, func: EndFn) -> ComResult<()> {
    let time = ctx.level.time;
    {
        let e = &mut ctx.edicts[ent];
        e.velocity = VEC3_ORIGIN;
        e.moveinfo.dir = vector_subtract(dest, &e.s.origin);
        e.moveinfo.remaining_distance = vector_normalize(&mut e.moveinfo.dir);
        e.moveinfo.endfunc = Some(func);
    }

    let mi = ctx.edicts[ent].moveinfo;
    if mi.speed == mi.accel && mi.speed == mi.decel {
        if running_now(ctx, ent) {
            move_begin(ctx, gi, ent)?;
        } else {
            let e = &mut ctx.edicts[ent];
            e.nextthink = time + FRAMETIME;
            e.think = Some(ThinkFn::MoveBegin);
        }
    } else {
        // accelerative
        let e = &mut ctx.edicts[ent];
        e.moveinfo.current_speed = 0.0;
        e.think = Some(ThinkFn::AccelMove);
        e.nextthink = time + FRAMETIME;
    }
    Ok(())
}

//
// Support routines for angular movement (changes in angle using avelocity)
//

pub fn angle_move_done(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    ctx.edicts[ent].avelocity = VEC3_ORIGIN;
    match ctx.edicts[ent].moveinfo.endfunc {
        Some(f) => call_end(f, ctx, gi, ent),
        None => Ok(()),
    }
}

fn angle_destdelta(e: &Edict) -> Vec3 {
    if e.moveinfo.state == MoverState::Up {
        vector_subtract(&e.moveinfo.end_angles, &e.s.angles)
    } else {
        vector_subtract(&e.moveinfo.start_angles, &e.s.angles)
    }
}

pub fn angle_move_final(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    let mv = angle_destdelta(&ctx.edicts[ent]);

    if vector_compare(&mv, &VEC3_ORIGIN) {
        return angle_move_done(ctx, gi, ent);
    }

    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];
    e.avelocity = vector_scale(&mv, 1.0 / FRAMETIME);

    e.think = Some(ThinkFn::AngleMoveDone);
    e.nextthink = time + FRAMETIME;
    Ok(())
}

pub fn angle_move_begin(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    // set destdelta to the vector needed to move
    let destdelta = angle_destdelta(&ctx.edicts[ent]);

    // calculate length of vector
    let len = vector_length(&destdelta);

    // divide by speed to get time to reach dest
    let traveltime = len / ctx.edicts[ent].moveinfo.speed;

    if traveltime < FRAMETIME {
        return angle_move_final(ctx, gi, ent);
    }

    let frames = (traveltime / FRAMETIME).floor();
    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];

    // scale the destdelta vector by the time spent traveling to get velocity
    e.avelocity = vector_scale(&destdelta, 1.0 / traveltime);

    // set nextthink to trigger a think when dest is reached
    e.nextthink = time + frames * FRAMETIME;
    e.think = Some(ThinkFn::AngleMoveFinal);
    Ok(())
}

/// Starts turning towards the end or start angles, depending on the
/// mover state.
pub fn angle_move_calc(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, func: EndFn) -> ComResult<()> {
    {
        let e = &mut ctx.edicts[ent];
        e.avelocity = VEC3_ORIGIN;
        e.moveinfo.endfunc = Some(func);
    }
    if running_now(ctx, ent) {
        angle_move_begin(ctx, gi, ent)
    } else {
        let time = ctx.level.time;
        let e = &mut ctx.edicts[ent];
        e.nextthink = time + FRAMETIME;
        e.think = Some(ThinkFn::AngleMoveBegin);
        Ok(())
    }
}

/*
==============
Think_AccelMove

The team has completed a frame of movement, so
change the speed for the next frame
==============
*/
fn acceleration_distance(target: f32, rate: f32) -> f32 {
    target * ((target / rate) + 1.0) / 2.0
}

pub fn plat_calc_accelerated_move(mi: &mut MoveInfo) {
    mi.move_speed = mi.speed;

    if mi.remaining_distance < mi.accel {
        mi.current_speed = mi.remaining_distance;
        return;
    }

    let accel_dist = acceleration_distance(mi.speed, mi.accel);
    let mut decel_dist = acceleration_distance(mi.speed, mi.decel);

    if mi.remaining_distance - accel_dist - decel_dist < 0.0 {
        let f = (mi.accel + mi.decel) / (mi.accel * mi.decel);
        mi.move_speed = (-2.0 + (4.0 - 4.0 * f * (-2.0 * mi.remaining_distance)).sqrt()) / (2.0 * f);
        decel_dist = acceleration_distance(mi.move_speed, mi.decel);
    }

    mi.decel_distance = decel_dist;
}

pub fn plat_accelerate(mi: &mut MoveInfo) {
    // are we decelerating?
    if mi.remaining_distance <= mi.decel_distance {
        if mi.remaining_distance < mi.decel_distance {
            if mi.next_speed != 0.0 {
                mi.current_speed = mi.next_speed;
                mi.next_speed = 0.0;
                return;
            }
            if mi.current_speed > mi.decel {
                mi.current_speed -= mi.decel;
            }
        }
        return;
    }

    // are we at full speed and need to start decelerating during this move?
    if mi.current_speed == mi.move_speed && mi.remaining_distance - mi.current_speed < mi.decel_distance {
        let p1_distance = mi.remaining_distance - mi.decel_distance;
        let p2_distance = mi.move_speed * (1.0 - (p1_distance / mi.move_speed));
        let distance = p1_distance + p2_distance;
        mi.current_speed = mi.move_speed;
        mi.next_speed = mi.move_speed - mi.decel * (p2_distance / distance);
        return;
    }

    // are we accelerating?
    if mi.current_speed < mi.speed {
        let old_speed = mi.current_speed;

        // figure simple acceleration up to move_speed
        mi.current_speed += mi.accel;
        if mi.current_speed > mi.speed {
            mi.current_speed = mi.speed;
        }

        // are we accelerating throughout this entire move?
        if mi.remaining_distance - mi.current_speed >= mi.decel_distance {
            return;
        }

        // during this move we will accelrate from current_speed to move_speed
        // and cross over the decel_distance; figure the average speed for the
        // entire move
        let p1_distance = mi.remaining_distance - mi.decel_distance;
        let p1_speed = (old_speed + mi.move_speed) / 2.0;
        let p2_distance = mi.move_speed * (1.0 - (p1_distance / p1_speed));
        let distance = p1_distance + p2_distance;
        mi.current_speed = (p1_speed * (p1_distance / distance)) + (mi.move_speed * (p2_distance / distance));
        mi.next_speed = mi.move_speed - mi.decel * (p2_distance / distance);
    }

    // we are at constant velocity (move_speed)
}

pub fn think_accelmove(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    {
        let mi = &mut ctx.edicts[ent].moveinfo;
        mi.remaining_distance -= mi.current_speed;

        // starting or blocked
        if mi.current_speed == 0.0 {
            plat_calc_accelerated_move(mi);
        }

        plat_accelerate(mi);

        // will the entire move complete on next frame?
        if mi.remaining_distance <= mi.current_speed {
            return move_final(ctx, gi, ent);
        }
    }

    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];
    e.velocity = vector_scale(&e.moveinfo.dir, e.moveinfo.current_speed * 10.0);
    e.nextthink = time + FRAMETIME;
    e.think = Some(ThinkFn::AccelMove);
    Ok(())
}

//
// DOORS
//
//  spawn a trigger surrounding the entire team unless it is
//  already targeted by another
//

/// Opens or closes every areaportal this door targets.
pub fn door_use_areaportals(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, open: bool) -> ComResult<()> {
    let target = &ctx.edicts[ent].target;
    if target.is_empty() {
        return Ok(());
    }

    let portals: Vec<i32> = ctx.edicts[..ctx.num_edicts]
        .iter()
        .filter(|t| t.inuse && t.targetname == *target && t.classname.eq_ignore_ascii_case("func_areaportal"))
        .map(|t| t.style)
        .collect();

    for style in portals {
        gi.set_area_portal_state(style.max(0) as usize, open)?;
    }
    Ok(())
}

pub fn door_hit_top(ctx: &mut GameCtx, _gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    let time = ctx.level.time;
    let e = &mut ctx.edicts[ent];
    e.moveinfo.state = MoverState::Top;
    if e.spawnflags & DOOR_TOGGLE != 0 {
        return Ok(());
    }
    if e.moveinfo.wait >= 0.0 {
        e.think = Some(ThinkFn::DoorGoDown);
        e.nextthink = time + e.moveinfo.wait;
    }
    Ok(())
}

pub fn door_hit_bottom(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    ctx.edicts[ent].moveinfo.state = MoverState::Bottom;
    door_use_areaportals(ctx, gi, ent, false)
}

pub fn door_go_down(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) -> ComResult<()> {
    {
        let e = &mut ctx.edicts[ent];
        if e.max_health != 0 {
            e.health = e.max_health;
        }
        e.moveinfo.state = MoverState::Down;
    }

    let start = ctx.edicts[ent].moveinfo.start_origin;
    match ctx.edicts[ent].classname.as_str() {
        "func_door" => move_calc(ctx, gi, ent, &start, EndFn::DoorHitBottom),
        "func_door_rotating" => angle_move_calc(ctx, gi, ent, EndFn::DoorHitBottom),
        _ => Ok(()),
    }
}

pub fn door_go_up(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, activator: Option<usize>) -> ComResult<()> {
    let time = ctx.level.time;
    {
        let e = &mut ctx.edicts[ent];
        match e.moveinfo.state {
            // already going up
            MoverState::Up => return Ok(()),
            // reset top wait time
            MoverState::Top => {
                if e.moveinfo.wait >= 0.0 {
                    e.nextthink = time + e.moveinfo.wait;
                }
                return Ok(());
            }
            _ => {}
        }
        e.moveinfo.state = MoverState::Up;
        e.activator = activator;
    }

    let end = ctx.edicts[ent].moveinfo.end_origin;
    match ctx.edicts[ent].classname.as_str() {
        "func_door" => move_calc(ctx, gi, ent, &end, EndFn::DoorHitTop)?,
        "func_door_rotating" => angle_move_calc(ctx, gi, ent, EndFn::DoorHitTop)?,
        _ => {}
    }

    door_use_areaportals(ctx, gi, ent, true)
}

/// Opens the door and every door paired with it, or closes them if the
/// door toggles and is already open.
pub fn door_use(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, activator: Option<usize>) -> ComResult<()> {
    if ctx.edicts[ent].flags.contains(FL_TEAMSLAVE) {
        return Ok(());
    }

    let team = team_members(ctx, ent);
    let state = ctx.edicts[ent].moveinfo.state;
    if ctx.edicts[ent].spawnflags & DOOR_TOGGLE != 0 && matches!(state, MoverState::Up | MoverState::Top) {
        // trigger all paired doors
        for part in team {
            ctx.edicts[part].touch = None;
            door_go_down(ctx, gi, part)?;
        }
        return Ok(());
    }

    // trigger all paired doors
    for part in team {
        ctx.edicts[part].touch = None;
        door_go_up(ctx, gi, part, activator)?;
    }
    Ok(())
}

pub fn door_blocked(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, other: usize) -> ComResult<()> {
    if ctx.edicts[other].svflags & SVF_MONSTER == 0 && ctx.edicts[other].client.is_none() {
        // anything that isn't alive gets crushed out of the way
        debug!("{} crushed by {}", ctx.edicts[other].classname, ctx.edicts[ent].classname);
        g_free_edict(ctx, gi, other);
        return Ok(());
    }

    let dmg = ctx.edicts[ent].dmg;
    ctx.edicts[other].health -= dmg;

    if ctx.edicts[ent].spawnflags & DOOR_CRUSHER != 0 {
        return Ok(());
    }

    // if a door has a negative wait, it would never come back if blocked,
    // so let it just squash the object to death real fast
    if ctx.edicts[ent].moveinfo.wait >= 0.0 {
        let master = ctx.edicts[ent].teammaster.unwrap_or(ent);
        let going_down = ctx.edicts[ent].moveinfo.state == MoverState::Down;
        for part in team_members(ctx, master) {
            if going_down {
                let activator = ctx.edicts[part].activator;
                door_go_up(ctx, gi, part, activator)?;
            } else {
                door_go_down(ctx, gi, part)?;
            }
        }
    }
    Ok(())
}

/// Shared setup of a sliding or rotating door's mover fields.
fn door_defaults(e: &mut Edict) {
    e.movetype = MoveType::Push;
    e.solid = Solid::Bsp;
    e.blocked = Some(BlockedFn::Door);

    if e.speed == 0.0 {
        e.speed = 100.0;
    }
    if e.accel == 0.0 {
        e.accel = e.speed;
    }
    if e.decel == 0.0 {
        e.decel = e.speed;
    }
    if e.moveinfo.wait == 0.0 {
        e.moveinfo.wait = 3.0;
    }
    if e.dmg == 0 {
        e.dmg = 2;
    }

    e.moveinfo.state = MoverState::Bottom;
    e.moveinfo.speed = e.speed;
    e.moveinfo.accel = e.accel;
    e.moveinfo.decel = e.decel;
}

/// Parameters for building a door without map text. Zero values take the
/// usual defaults.
#[derive(Debug, Clone, Default)]
pub struct DoorParams {
    pub origin: Vec3,
    pub angles: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub speed: f32,
    pub wait: f32,
    pub lip: f32,
    /// degrees, for rotating doors
    pub distance: f32,
    pub dmg: i32,
    pub spawnflags: i32,
    pub target: String,
}

/// A sliding door that moves along its angles by its size minus `lip`.
pub fn spawn_func_door(ctx: &mut GameCtx, gi: &mut dyn GameImport, params: &DoorParams) -> ComResult<usize> {
    let ent = g_spawn(ctx)?;
    let e = &mut ctx.edicts[ent];
    e.classname = "func_door".to_string();
    e.s.origin = params.origin;
    e.s.angles = params.angles;
    e.mins = params.mins;
    e.maxs = params.maxs;
    e.size = vector_subtract(&params.maxs, &params.mins);
    e.speed = params.speed;
    e.dmg = params.dmg;
    e.spawnflags = params.spawnflags;
    e.target = params.target.clone();
    e.moveinfo.wait = params.wait;

    e.movedir = g_set_movedir(&mut e.s.angles);
    door_defaults(e);
    let lip = if params.lip == 0.0 { 8.0 } else { params.lip };

    // calculate second position
    e.pos1 = e.s.origin;
    let abs_movedir = [e.movedir[0].abs(), e.movedir[1].abs(), e.movedir[2].abs()];
    e.moveinfo.distance = dot_product(&abs_movedir, &e.size) - lip;
    e.pos2 = vector_ma(&e.pos1, e.moveinfo.distance, &e.movedir);

    // if it starts open, switch the positions
    if e.spawnflags & DOOR_START_OPEN != 0 {
        e.s.origin = e.pos2;
        e.pos2 = e.pos1;
        e.pos1 = e.s.origin;
    }

    e.moveinfo.start_origin = e.pos1;
    e.moveinfo.start_angles = e.s.angles;
    e.moveinfo.end_origin = e.pos2;
    e.moveinfo.end_angles = e.s.angles;

    gi.linkentity(&mut ctx.edicts, ent);
    Ok(ent)
}

/// A door that swings `distance` degrees around one axis.
pub fn spawn_func_door_rotating(ctx: &mut GameCtx, gi: &mut dyn GameImport, params: &DoorParams) -> ComResult<usize> {
    let ent = g_spawn(ctx)?;
    let e = &mut ctx.edicts[ent];
    e.classname = "func_door_rotating".to_string();
    e.s.origin = params.origin;
    e.s.angles = VEC3_ORIGIN;
    e.mins = params.mins;
    e.maxs = params.maxs;
    e.speed = params.speed;
    e.dmg = params.dmg;
    e.spawnflags = params.spawnflags;
    e.target = params.target.clone();
    e.moveinfo.wait = params.wait;

    // set the axis of rotation
    e.movedir = VEC3_ORIGIN;
    if e.spawnflags & DOOR_X_AXIS != 0 {
        e.movedir[2] = 1.0;
    } else if e.spawnflags & DOOR_Y_AXIS != 0 {
        e.movedir[0] = 1.0;
    } else {
        // Z_AXIS
        e.movedir[1] = 1.0;
    }

    // check for reverse rotation
    if e.spawnflags & DOOR_REVERSE != 0 {
        e.movedir = vector_negate(&e.movedir);
    }

    let distance = if params.distance == 0.0 {
        debug!("func_door_rotating at {:?} with no distance set", e.s.origin);
        90.0
    } else {
        params.distance
    };

    e.pos1 = e.s.angles;
    e.pos2 = vector_ma(&e.s.angles, distance, &e.movedir);
    e.moveinfo.distance = distance;

    door_defaults(e);

    // if it starts open, switch the positions
    if e.spawnflags & DOOR_START_OPEN != 0 {
        e.s.angles = e.pos2;
        e.pos2 = e.pos1;
        e.pos1 = e.s.angles;
        e.movedir = vector_negate(&e.movedir);
    }

    e.moveinfo.start_origin = e.s.origin;
    e.moveinfo.start_angles = e.pos1;
    e.moveinfo.end_origin = e.s.origin;
    e.moveinfo.end_angles = e.pos2;

    gi.linkentity(&mut ctx.edicts, ent);
    Ok(ent)
}

pub fn rotating_blocked(ctx: &mut GameCtx, _gi: &mut dyn GameImport, ent: usize, other: usize) -> ComResult<()> {
    let dmg = ctx.edicts[ent].dmg;
    ctx.edicts[other].health -= dmg;
    Ok(())
}

/// Starts or stops a func_rotating.
pub fn rotating_use(ctx: &mut GameCtx, ent: usize) {
    let e = &mut ctx.edicts[ent];
    if !vector_compare(&e.avelocity, &VEC3_ORIGIN) {
        e.avelocity = VEC3_ORIGIN;
    } else {
        e.avelocity = vector_scale(&e.movedir, e.speed);
    }
}

/// A brush that spins around one axis at `speed` degrees per second.
pub fn spawn_func_rotating(
    ctx: &mut GameCtx,
    gi: &mut dyn GameImport,
    origin: Vec3,
    mins: Vec3,
    maxs: Vec3,
    speed: f32,
    dmg: i32,
    spawnflags: i32,
) -> ComResult<usize> {
    let ent = g_spawn(ctx)?;
    let e = &mut ctx.edicts[ent];
    e.classname = "func_rotating".to_string();
    e.s.origin = origin;
    e.mins = mins;
    e.maxs = maxs;
    e.spawnflags = spawnflags;
    e.solid = Solid::Bsp;
    e.movetype = if spawnflags & ROTATING_STOP != 0 { MoveType::Stop } else { MoveType::Push };

    // set the axis of rotation
    e.movedir = VEC3_ORIGIN;
    if spawnflags & ROTATING_X_AXIS != 0 {
        e.movedir[2] = 1.0;
    } else if spawnflags & ROTATING_Y_AXIS != 0 {
        e.movedir[0] = 1.0;
    } else {
        e.movedir[1] = 1.0;
    }

    // check for reverse rotation
    if spawnflags & ROTATING_REVERSE != 0 {
        e.movedir = vector_negate(&e.movedir);
    }

    e.speed = if speed == 0.0 { 100.0 } else { speed };
    e.dmg = if dmg == 0 { 2 } else { dmg };
    e.blocked = Some(BlockedFn::Rotating);

    if spawnflags & ROTATING_START_ON != 0 {
        rotating_use(ctx, ent);
    }

    gi.linkentity(&mut ctx.edicts, ent);
    Ok(ent)
}

/// A point entity naming an areaportal that doors open and close.
pub fn spawn_func_areaportal(ctx: &mut GameCtx, targetname: &str, style: i32) -> ComResult<usize> {
    let ent = g_spawn(ctx)?;
    let e = &mut ctx.edicts[ent];
    e.classname = "func_areaportal".to_string();
    e.targetname = targetname.to_string();
    e.style = style;
    Ok(ent)
}
