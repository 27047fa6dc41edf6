// p_client.rs - player entities: spawning, per-command movement, leaving

use log::debug;

use q2sim_common::common::ComResult;
use q2sim_common::pmove::{pmove, PmoveCallbacks};

use crate::dispatch::call_touch;
use crate::g_local::*;
use crate::g_utils::g_touch_triggers;
use crate::game_import::GameImport;

pub const PLAYER_MINS: Vec3 = [-16.0, -16.0, -24.0];
pub const PLAYER_MAXS: Vec3 = [16.0, 16.0, 32.0];

/// Pmove's view of the world: the server's trace with the player as the
/// pass entity.
struct PlayerTrace<'a> {
    gi: &'a mut dyn GameImport,
    edicts: &'a [Edict],
    passent: usize,
    mask: i32,
}

impl PmoveCallbacks for PlayerTrace<'_> {
    fn trace(&mut self, start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> Trace {
        self.gi.trace(self.edicts, start, mins, maxs, end, Some(self.passent), self.mask)
    }

    fn point_contents(&mut self, point: &Vec3) -> i32 {
        self.gi.pointcontents(self.edicts, point)
    }
}

/// Places a connected player at a spawn point.
pub fn put_client_in_server(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, spawn_origin: Vec3, spawn_angles: Vec3) {
    let Some(c) = ctx.edicts[ent].client else {
        debug!("put_client_in_server: {} is not a client", ent);
        return;
    };

    let cmd_angles = ctx.clients[c].cmd_angles;
    let client = &mut ctx.clients[c];
    client.ps = PlayerState::default();
    client.ps.pmove.origin = [
        (spawn_origin[0] * 8.0) as i16,
        (spawn_origin[1] * 8.0) as i16,
        (spawn_origin[2] * 8.0) as i16,
    ];
    // set the delta angle
    for i in 0..3 {
        client.ps.pmove.delta_angles[i] = angle2short(spawn_angles[i] - cmd_angles[i]);
    }
    client.ps.viewangles = [0.0, spawn_angles[YAW], 0.0];
    client.spectator = false;

    let e = &mut ctx.edicts[ent];
    e.groundentity = None;
    e.movetype = MoveType::Walk;
    e.viewheight = 22;
    e.inuse = true;
    e.classname = "player".to_string();
    e.mass = 200;
    e.solid = Solid::Bbox;
    e.deadflag = DEAD_NO;
    e.clipmask = MASK_PLAYERSOLID;
    e.waterlevel = 0;
    e.watertype = 0;
    e.svflags &= !SVF_DEADMONSTER;
    e.health = 100;
    e.max_health = 100;
    e.gravity = 1.0;

    e.mins = PLAYER_MINS;
    e.maxs = PLAYER_MAXS;
    e.velocity = VEC3_ORIGIN;

    e.s.modelindex = 255;
    e.s.angles = [0.0, spawn_angles[YAW], 0.0];
    e.s.origin = spawn_origin;
    // make sure off ground
    e.s.origin[2] += 1.0;
    e.s.old_origin = e.s.origin;

    gi.linkentity(&mut ctx.edicts, ent);
}

/// Takes the player out of the world. The slot stays reserved.
pub fn client_disconnect(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize) {
    if ctx.edicts[ent].client.is_none() {
        return;
    }
    gi.unlinkentity(&mut ctx.edicts, ent);
    let e = &mut ctx.edicts[ent];
    e.s.modelindex = 0;
    e.solid = Solid::Not;
    e.inuse = false;
    e.classname = "disconnected".to_string();
}

/// This will be called once for each client frame, which will usually be a
/// couple times for each server frame.
pub fn client_think(ctx: &mut GameCtx, gi: &mut dyn GameImport, ent: usize, ucmd: &UserCmd) -> ComResult<()> {
    let Some(c) = ctx.edicts[ent].client else {
        return Ok(());
    };
    ctx.level.current_entity = Some(ent);

    let mut pm = PmoveData::default();
    {
        let e = &ctx.edicts[ent];
        let client = &mut ctx.clients[c];

        client.ps.pmove.pm_type = if e.movetype == MoveType::Noclip {
            PmType::Spectator
        } else if e.s.modelindex != 255 {
            PmType::Gib
        } else if e.deadflag != DEAD_NO || e.health <= 0 {
            PmType::Dead
        } else {
            PmType::Normal
        };
        client.ps.pmove.gravity = ctx.cvars.gravity as i16;

        pm.s = client.ps.pmove;
        for i in 0..3 {
            pm.s.origin[i] = (e.s.origin[i] * 8.0) as i16;
            pm.s.velocity[i] = (e.velocity[i] * 8.0) as i16;
        }

        if client.old_pmove != pm.s {
            pm.snapinitial = true;
        }
    }
    pm.cmd = *ucmd;

    // perform a pmove
    {
        let mask = if ctx.edicts[ent].health > 0 { MASK_PLAYERSOLID } else { MASK_DEADSOLID };
        let mut world = PlayerTrace { gi: &mut *gi, edicts: &ctx.edicts, passent: ent, mask };
        pmove(&mut pm, &mut world);
    }

    // save results of pmove
    let ground_linkcount = pm.groundentity.map(|g| ctx.edicts[g].linkcount);
    {
        let client = &mut ctx.clients[c];
        client.ps.pmove = pm.s;
        client.old_pmove = pm.s;
        for i in 0..3 {
            client.cmd_angles[i] = short2angle(ucmd.angles[i]);
        }

        let e = &mut ctx.edicts[ent];
        for i in 0..3 {
            e.s.origin[i] = pm.s.origin[i] as f32 * 0.125;
            e.velocity[i] = pm.s.velocity[i] as f32 * 0.125;
        }
        e.mins = pm.mins;
        e.maxs = pm.maxs;

        e.viewheight = pm.viewheight as i32;
        e.waterlevel = pm.waterlevel;
        e.watertype = pm.watertype;
        e.groundentity = pm.groundentity;
        if let Some(linkcount) = ground_linkcount {
            e.groundentity_linkcount = linkcount;
        }

        if e.deadflag != DEAD_NO {
            client.ps.viewangles[ROLL] = 40.0;
            client.ps.viewangles[PITCH] = -15.0;
        } else {
            client.ps.viewangles = pm.viewangles;
        }
        client.ps.viewoffset = [0.0, 0.0, pm.viewheight];
    }

    gi.linkentity(&mut ctx.edicts, ent);

    if ctx.edicts[ent].movetype != MoveType::Noclip {
        g_touch_triggers(ctx, gi, ent)?;
    }

    // touch other objects
    for (i, &other) in pm.touchents.iter().enumerate() {
        // duplicated
        if pm.touchents[..i].contains(&other) {
            continue;
        }
        let Some(touch) = ctx.edicts[other].touch else {
            continue;
        };
        call_touch(touch, ctx, gi, other, ent, None, None)?;
    }
    Ok(())
}
