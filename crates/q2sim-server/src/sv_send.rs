// sv_send.rs - per-frame messages to clients
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2.

use log::{debug, warn};

use q2sim_common::common::*;
use q2sim_common::net_chan::netchan_transmit;
use q2sim_common::q_shared::PmoveState;
use q2sim_common::qcommon::*;

use crate::server::*;
use crate::sv_main::sv_drop_client;

/// Appends the frame header and the player's movement state. Only the
/// player state is delta compressed, always against the zero state.
pub fn sv_write_frame_to_client(ctx: &ServerContext, client_index: usize, msg: &mut SizeBuf) {
    let cl = &ctx.svs.clients[client_index];

    msg_write_byte(msg, SVC_FRAME as i32);
    msg_write_long(msg, ctx.sv.framenum);
    msg_write_long(msg, cl.lastframe); // what we are delta'ing from

    let pmove = ctx
        .sv
        .game
        .edicts
        .get(cl.edict)
        .and_then(|e| e.client)
        .and_then(|c| ctx.sv.game.clients.get(c))
        .map(|gc| gc.ps.pmove)
        .unwrap_or_default();

    msg_write_byte(msg, SVC_PLAYERINFO as i32);
    msg_write_delta_pmove_state(msg, &PmoveState::default(), &pmove);
}

pub fn sv_send_client_datagram(ctx: &mut ServerContext, client_index: usize) {
    let mut msg = SizeBuf::new(MAX_MSGLEN);
    msg.allow_overflow = true;

    sv_write_frame_to_client(ctx, client_index, &mut msg);

    if msg.overflowed {
        // must have room left for the packet header
        warn!("msg overflowed for {}", ctx.svs.clients[client_index].name);
        msg.clear();
    }

    // send the datagram
    let realtime = ctx.svs.realtime;
    let cl = &mut ctx.svs.clients[client_index];
    netchan_transmit(&mut cl.netchan, ctx.net.as_mut(), msg.as_slice(), realtime);
}

/// Sends one packet to every client that needs one this frame. Spawned
/// clients get a frame. Everyone else only gets pending reliable data or
/// a once a second keepalive.
pub fn sv_send_client_messages(ctx: &mut ServerContext) {
    let realtime = ctx.svs.realtime;

    for i in 0..ctx.svs.clients.len() {
        let cl = &mut ctx.svs.clients[i];
        if cl.state == ClientState::Free {
            continue;
        }

        // if the reliable message overflowed, drop the client
        if cl.netchan.message.overflowed {
            cl.netchan.message.clear();
            warn!("{} overflowed", cl.name);
            if cl.state >= ClientState::Connected {
                sv_drop_client(ctx, i);
            }
        }

        let cl = &mut ctx.svs.clients[i];
        if cl.state == ClientState::Spawned {
            sv_send_client_datagram(ctx, i);
        } else if cl.netchan.message.cursize > 0 || realtime - cl.netchan.last_sent > 1000 {
            // just update reliable if needed
            netchan_transmit(&mut cl.netchan, ctx.net.as_mut(), &[], realtime);
        }

        let cl = &mut ctx.svs.clients[i];
        if cl.netchan.fatal_error && cl.state >= ClientState::Connected {
            debug!("{}: fatal channel error", cl.name);
            sv_drop_client(ctx, i);
        }
    }
}
