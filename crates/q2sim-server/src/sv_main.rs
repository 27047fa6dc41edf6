// sv_main.rs - server frame, connection handling and timeouts
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2.

use log::{debug, info, warn};
use rayon::prelude::*;

use q2sim_common::common::*;
use q2sim_common::cvar::CvarFlags;
use q2sim_common::net_chan::*;
use q2sim_common::q_shared::MAX_CLIENTS;
use q2sim_common::qcommon::*;
use q2sim_game::g_main::g_run_frame;
use q2sim_game::p_client::client_disconnect;

use crate::server::*;
use crate::sv_game::ServerImport;
use crate::sv_send::sv_send_client_messages;
use crate::sv_user::{sv_execute_client_message, sv_new};

/// Registers the server variables and allocates the client slots.
pub fn sv_init(ctx: &mut ServerContext) {
    let cv = &mut ctx.cvars;
    cv.get("sv_gravity", "800", CvarFlags::empty());
    cv.get("sv_maxvelocity", "2000", CvarFlags::empty());
    cv.get("timeout", "125", CvarFlags::empty());
    cv.get("zombietime", "2", CvarFlags::empty());
    cv.get("developer", "0", CvarFlags::empty());
    cv.get("map_noareas", "0", CvarFlags::empty());
    cv.get("flushmap", "0", CvarFlags::empty());
    cv.get("sv_noreload", "0", CvarFlags::empty());
    cv.get("hostname", "noname", CvarFlags::SERVERINFO | CvarFlags::ARCHIVE);
    cv.get("maxclients", "8", CvarFlags::SERVERINFO | CvarFlags::LATCH);
    cv.get("port", &PORT_SERVER.to_string(), CvarFlags::NOSET);
    cv.get("protocol", &PROTOCOL_VERSION.to_string(), CvarFlags::SERVERINFO | CvarFlags::NOSET);
    cv.get("mapname", "", CvarFlags::SERVERINFO | CvarFlags::NOSET);

    let maxclients = clamped_maxclients(ctx);
    ctx.svs.clients = vec![Client::default(); maxclients];
    ctx.svs.initialized = true;
}

pub(crate) fn clamped_maxclients(ctx: &ServerContext) -> usize {
    (ctx.cvars.variable_value("maxclients") as usize).clamp(1, MAX_CLIENTS)
}

/// Called when the player is totally leaving the server, either willingly
/// or unwillingly. This is NOT called if the entire server is quitting or
/// crashing.
pub fn sv_drop_client(ctx: &mut ServerContext, client_index: usize) {
    let cl = &mut ctx.svs.clients[client_index];

    // add the disconnect
    msg_write_byte(&mut cl.netchan.message, SVC_DISCONNECT as i32);

    if cl.state == ClientState::Spawned {
        // remove the body from the world
        let edict = cl.edict;
        let sv = &mut ctx.sv;
        let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
        client_disconnect(&mut sv.game, &mut gi, edict);
    }

    let cl = &mut ctx.svs.clients[client_index];
    cl.state = ClientState::Zombie; // become free in a few seconds
    cl.name.clear();
}

// ============================================================
// Connectionless commands
// ============================================================

/// Responds with an "info" string for server browsers.
fn svc_info(ctx: &mut ServerContext, from: &NetAdr, args: &[String]) {
    let version = args.get(1).and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
    let reply = if version != PROTOCOL_VERSION {
        format!("{}: wrong version\n", ctx.cvars.variable_string("hostname"))
    } else {
        let count = ctx.svs.clients.iter().filter(|c| c.state >= ClientState::Connected).count();
        format!(
            "{:>16} {:>8} {:2}/{:2}\n",
            ctx.cvars.variable_string("hostname"),
            ctx.sv.name,
            count,
            ctx.maxclients()
        )
    };
    netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, &format!("info\n{}", reply));
}

/// Just responds with an acknowledgement.
fn svc_ping(ctx: &mut ServerContext, from: &NetAdr) {
    netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, "ack");
}

/// `connect <protocol> <qport> [name]`. A request from an address that
/// already holds a slot with the same qport or port reuses that slot.
fn svc_direct_connect(ctx: &mut ServerContext, from: &NetAdr, args: &[String]) {
    debug!("SVC_DirectConnect ()");

    let version = args.get(1).and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
    if version != PROTOCOL_VERSION {
        let msg = format!("print\nServer is protocol version {}.\n", PROTOCOL_VERSION);
        netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, &msg);
        debug!("    rejected connect from version {}", version);
        return;
    }

    if ctx.sv.state != ServerState::Game {
        netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, "print\nNo map running.\n");
        return;
    }

    let qport = args.get(2).and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
    let name = args.get(3).cloned().unwrap_or_else(|| "player".to_string());

    // if there is already a slot for this ip, reuse it
    let reuse = ctx.svs.clients.iter().position(|cl| {
        cl.state != ClientState::Free
            && from.compare_base_adr(&cl.netchan.remote_address)
            && (cl.netchan.qport == qport || from.port() == cl.netchan.remote_address.port())
    });
    if let Some(i) = reuse {
        info!("{}:reconnect", from);
        if ctx.svs.clients[i].state == ClientState::Spawned {
            sv_drop_client(ctx, i);
        }
    }

    // find a client slot
    let slot = reuse.or_else(|| ctx.svs.clients.iter().position(|cl| cl.state == ClientState::Free));
    let Some(i) = slot else {
        netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, "print\nServer is full.\n");
        debug!("Rejected a connection.");
        return;
    };

    // build a new connection
    let realtime = ctx.svs.realtime;
    let cl = &mut ctx.svs.clients[i];
    *cl = Client::default();
    cl.edict = i + 1;
    cl.name = name;
    cl.lastframe = -1;
    netchan_setup(NetSrc::Server, &mut cl.netchan, *from, qport, realtime);
    cl.state = ClientState::Connected;
    cl.lastmessage = realtime; // don't timeout

    // send the connect packet to the client
    netchan_out_of_band_print(ctx.net.as_mut(), NetSrc::Server, from, "client_connect");
    info!("{} connected from {} into slot {}", ctx.svs.clients[i].name, from, i);

    sv_new(ctx, i);
}

/// A connectionless packet has four leading 0xff characters to
/// distinguish it from a game channel.
fn sv_connectionless_packet(ctx: &mut ServerContext, from: &NetAdr, msg: &mut SizeBuf) {
    msg_begin_reading(msg);
    msg_read_long(msg); // skip the -1 marker

    let s = msg_read_string(msg);
    let line = s.lines().next().unwrap_or("");
    let args = tokenize(line);
    let Some(c) = args.first() else {
        return;
    };
    debug!("Packet {} : {}", from, c);

    match c.as_str() {
        "ping" => svc_ping(ctx, from),
        "info" => svc_info(ctx, from, &args),
        "connect" => svc_direct_connect(ctx, from, &args),
        _ => warn!("bad connectionless packet from {}:\n{}", from, s),
    }
}

// ============================================================
// Frame
// ============================================================

enum TimeoutAction {
    None,
    FixTime(usize),
    FreeZombie(usize),
    Drop(usize),
}

/// If a packet has not been received from a client for `timeout` seconds,
/// drop the connection. Zombies are freed after `zombietime` seconds.
pub fn sv_check_timeouts(ctx: &mut ServerContext) {
    let realtime = ctx.svs.realtime;
    let droppoint = realtime - (1000.0 * ctx.cvars.variable_value("timeout")) as i32;
    let zombiepoint = realtime - (1000.0 * ctx.cvars.variable_value("zombietime")) as i32;

    let actions: Vec<TimeoutAction> = ctx
        .svs
        .clients
        .par_iter()
        .enumerate()
        .map(|(i, cl)| {
            // message times may be wrong across a changelevel
            if cl.lastmessage > realtime {
                return TimeoutAction::FixTime(i);
            }
            match cl.state {
                ClientState::Zombie if cl.lastmessage < zombiepoint => TimeoutAction::FreeZombie(i),
                ClientState::Connected | ClientState::Spawned if cl.lastmessage < droppoint => TimeoutAction::Drop(i),
                _ => TimeoutAction::None,
            }
        })
        .collect();

    for action in actions {
        match action {
            TimeoutAction::None => {}
            TimeoutAction::FixTime(i) => ctx.svs.clients[i].lastmessage = realtime,
            TimeoutAction::FreeZombie(i) => ctx.svs.clients[i].state = ClientState::Free,
            TimeoutAction::Drop(i) => {
                info!("{} timed out", ctx.svs.clients[i].name);
                sv_drop_client(ctx, i);
                ctx.svs.clients[i].state = ClientState::Free; // don't bother with zombie state
            }
        }
    }
}

/// Reads every pending datagram and routes it to the owning client.
pub fn sv_read_packets(ctx: &mut ServerContext) -> ComResult<()> {
    while let Some((from, data)) = ctx.net.get_packet(NetSrc::Server) {
        let mut msg = SizeBuf::from_bytes(&data);

        // check for connectionless packet (0xffffffff) first
        if data.len() >= 4 && i32::from_le_bytes([data[0], data[1], data[2], data[3]]) == -1 {
            sv_connectionless_packet(ctx, &from, &mut msg);
            continue;
        }

        // read the qport out of the message so we can fix up
        // stupid address translating routers
        msg_begin_reading(&mut msg);
        msg_read_long(&mut msg); // sequence number
        msg_read_long(&mut msg); // sequence number
        let qport = msg_read_short(&mut msg) & 0xffff;

        // check for packets from connected clients
        let realtime = ctx.svs.realtime;
        let found = ctx.svs.clients.iter().position(|cl| {
            cl.state != ClientState::Free
                && from.compare_base_adr(&cl.netchan.remote_address)
                && cl.netchan.qport == qport
        });
        let Some(i) = found else {
            debug!("{}:sequenced packet without connection", from);
            continue;
        };

        let cl = &mut ctx.svs.clients[i];
        if cl.netchan.remote_address.port() != from.port() {
            info!("SV_ReadPackets: fixing up a translated port");
            cl.netchan.remote_address = from;
        }

        if netchan_process(&mut cl.netchan, &mut msg, realtime) {
            // this is a valid, sequenced packet, so process it
            if cl.state != ClientState::Zombie {
                cl.lastmessage = realtime; // don't timeout
                sv_execute_client_message(ctx, i, &mut msg)?;
            }
        }
    }
    Ok(())
}

/// Advances the level by one game frame.
pub fn sv_run_game_frame(ctx: &mut ServerContext) -> ComResult<()> {
    // we always need to bump framenum, even if we don't run the world,
    // otherwise the delta compression can get confused when a client
    // has the "current" frame
    ctx.sv.framenum += 1;
    ctx.sv.time = ctx.sv.framenum * FRAMEMSEC;

    let sv = &mut ctx.sv;
    sv.game.cvars.gravity = ctx.cvars.variable_value("sv_gravity");
    sv.game.cvars.maxvelocity = ctx.cvars.variable_value("sv_maxvelocity");
    let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
    g_run_frame(&mut sv.game, &mut gi)?;

    // never get more than one tic behind
    if ctx.sv.time < ctx.svs.realtime {
        debug!("sv highclamp");
        ctx.svs.realtime = ctx.sv.time;
    }
    Ok(())
}

/// Runs one pass of the server loop: timeouts, incoming packets, the game
/// once enough time has built up, then one datagram per client.
pub fn sv_frame(ctx: &mut ServerContext, msec: i32) -> ComResult<()> {
    // if server is not active, do nothing
    if !ctx.svs.initialized {
        return Ok(());
    }

    ctx.svs.realtime += msec;

    // check timeouts
    sv_check_timeouts(ctx);

    // get packets from clients
    sv_read_packets(ctx)?;

    if ctx.sv.state != ServerState::Game {
        return Ok(());
    }

    // move autonomous things around if enough time has passed
    if ctx.svs.realtime < ctx.sv.time {
        // never let the time get too far off
        if ctx.sv.time - ctx.svs.realtime > FRAMEMSEC {
            debug!("sv lowclamp");
            ctx.svs.realtime = ctx.sv.time - FRAMEMSEC;
        }
        return Ok(());
    }

    // let everything in the world think and move
    sv_run_game_frame(ctx)?;

    // send messages back to the clients that had packets read this frame
    sv_send_client_messages(ctx);
    Ok(())
}

/// Used by sv_shutdown to send a final message to all connected clients
/// before the server goes down. The messages are sent immediately, not
/// just stuck on the outgoing message list, because the server is going
/// to totally exit after returning from this function.
pub fn sv_final_message(ctx: &mut ServerContext, message: &str) {
    let mut msg = SizeBuf::new(MAX_MSGLEN);
    msg.allow_overflow = true;
    msg_write_byte(&mut msg, SVC_PRINT as i32);
    msg_write_byte(&mut msg, PRINT_HIGH as i32);
    msg_write_string(&mut msg, message);
    msg_write_byte(&mut msg, SVC_DISCONNECT as i32);

    // send it twice
    // stagger the packets to crutch operating system limited buffers
    let realtime = ctx.svs.realtime;
    for _ in 0..2 {
        for cl in ctx.svs.clients.iter_mut().filter(|cl| cl.state >= ClientState::Connected) {
            netchan_transmit(&mut cl.netchan, ctx.net.as_mut(), msg.as_slice(), realtime);
        }
    }
}

/// Called when each game quits or after an error drops the level.
pub fn sv_shutdown(ctx: &mut ServerContext, finalmsg: &str) {
    if !ctx.svs.clients.is_empty() {
        sv_final_message(ctx, finalmsg);
    }
    info!("Server shutdown: {}", finalmsg.trim_end());

    ctx.sv = Server::default();
    for cl in &mut ctx.svs.clients {
        *cl = Client::default();
    }
    ctx.cvars.server_active = false;
    ctx.cvars.force_set("mapname", "");
}
