// sv_init.rs - level loading
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2.

use log::{debug, info};

use q2sim_common::common::ComResult;
use q2sim_common::q_shared::*;
use q2sim_game::g_local::{GameCtx, MoveType, Solid};
use q2sim_game::g_main::g_run_frame;
use q2sim_game::g_utils::g_spawn;
use q2sim_game::p_client::{PLAYER_MAXS, PLAYER_MINS};
use q2sim_game::game_import::GameImport;

use crate::server::*;
use crate::sv_game::ServerImport;
use crate::sv_main::{clamped_maxclients, sv_final_message, sv_init};
use crate::sv_user::sv_new;

/// Drops a player box down the middle of the world model and returns where
/// it comes to rest. Entity placement from the map's entity text is not
/// done, so this stands in for a spawn spot.
pub fn sv_find_spawn_point(sv: &mut Server) -> Vec3 {
    let Some(world) = sv.cm.model(0).copied() else {
        return VEC3_ORIGIN;
    };
    let cx = (world.mins[0] + world.maxs[0]) * 0.5;
    let cy = (world.mins[1] + world.maxs[1]) * 0.5;
    let start = [cx, cy, world.maxs[2] - PLAYER_MAXS[2] - 1.0];
    let end = [cx, cy, world.mins[2] - PLAYER_MINS[2]];

    let tr = sv.world.trace(
        &mut sv.cm,
        &sv.game.edicts,
        &start,
        &PLAYER_MINS,
        &PLAYER_MAXS,
        &end,
        None,
        MASK_PLAYERSOLID,
    );
    if tr.allsolid || tr.startsolid {
        debug!("no open space above the world center");
        return [cx, cy, 0.0];
    }
    tr.endpos
}

/// One static pusher per inline model so the area tree clips against it.
fn sv_spawn_bmodels(sv: &mut Server) -> ComResult<()> {
    for i in 1..sv.cm.num_inline_models() {
        let Some(model) = sv.cm.model(i).copied() else {
            continue;
        };
        let e = g_spawn(&mut sv.game)?;
        {
            let ent = &mut sv.game.edicts[e];
            ent.classname = "func_wall".to_string();
            ent.solid = Solid::Bsp;
            ent.movetype = MoveType::Push;
            ent.s.modelindex = i as i32 + 1;
            ent.s.origin = model.origin;
            ent.mins = model.mins;
            ent.maxs = model.maxs;
        }
        let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
        gi.linkentity(&mut sv.game.edicts, e);
    }
    Ok(())
}

/// Change the server to a new map, taking all connected clients along with
/// it. A map that fails to load leaves the server dead.
pub fn sv_spawn_server(ctx: &mut ServerContext, mapname: &str, data: Option<&[u8]>) -> ComResult<()> {
    if !ctx.svs.initialized {
        sv_init(ctx);
    }

    info!("------- Server Initialization -------");
    debug!("SpawnServer: {}", mapname);

    ctx.cvars.get_latched_vars();
    let maxclients = clamped_maxclients(ctx);
    if maxclients != ctx.svs.clients.len() {
        sv_final_message(ctx, "Server restarted\n");
        ctx.svs.clients = vec![Client::default(); maxclients];
    }

    ctx.sv.state = ServerState::Dead;
    ctx.cvars.server_active = false;

    // load the collision map first so a failure leaves nothing half built
    ctx.sv.cm.map_noareas = ctx.cvars.variable_value("map_noareas") != 0.0;
    ctx.sv.cm.flushmap = ctx.cvars.variable_value("flushmap") != 0.0;
    let (_, checksum) = ctx.sv.cm.load_map(mapname, false, data)?;

    ctx.svs.spawncount += 1;
    ctx.svs.realtime = 0;

    let sv = &mut ctx.sv;
    sv.state = ServerState::Loading;
    sv.name = mapname.to_string();
    sv.framenum = 0;
    sv.time = 0;

    // clear physics interaction links
    sv.world.clear_world(&sv.cm);

    sv.game = GameCtx::new(maxclients, MAX_EDICTS);
    sv.game.level.mapname = mapname.to_string();
    sv.game.cvars.gravity = ctx.cvars.variable_value("sv_gravity");
    sv.game.cvars.maxvelocity = ctx.cvars.variable_value("sv_maxvelocity");

    sv_spawn_bmodels(sv)?;

    // run two frames to allow everything to settle
    {
        let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
        g_run_frame(&mut sv.game, &mut gi)?;
        g_run_frame(&mut sv.game, &mut gi)?;
    }

    sv.state = ServerState::Game;
    ctx.cvars.server_active = true;
    ctx.cvars.force_set("mapname", mapname);

    // everyone already here has to spawn again into the new level
    for i in 0..ctx.svs.clients.len() {
        let cl = &mut ctx.svs.clients[i];
        if cl.state == ClientState::Spawned {
            cl.state = ClientState::Connected;
        }
        if cl.state == ClientState::Connected {
            cl.lastframe = -1;
            sv_new(ctx, i);
        }
    }

    info!("map {} checksum {}", mapname, checksum);
    info!("-------------------------------------");
    Ok(())
}

/// `map <name>`. With `sv_noreload` set, asking for the running level
/// again keeps it as it is.
pub fn sv_map(ctx: &mut ServerContext, mapname: &str, data: Option<&[u8]>) -> ComResult<()> {
    if ctx.sv.state == ServerState::Game
        && ctx.sv.name == mapname
        && ctx.cvars.variable_value("sv_noreload") != 0.0
    {
        info!("{} is already running", mapname);
        return Ok(());
    }
    sv_spawn_server(ctx, mapname, data)
}
