// sv_user.rs - server code for moving users

use log::{debug, info, warn};

use q2sim_common::common::*;
use q2sim_common::q_shared::UserCmd;
use q2sim_common::qcommon::*;
use q2sim_game::p_client::{client_think, put_client_in_server};

use crate::server::*;
use crate::sv_game::ServerImport;
use crate::sv_init::sv_find_spawn_point;
use crate::sv_main::sv_drop_client;

/// Sends the first message from the server to a connected client.
/// This will be sent on the initial connection and upon each server load.
pub fn sv_new(ctx: &mut ServerContext, client_index: usize) {
    debug!("New() from {}", ctx.svs.clients[client_index].name);

    let cl = &mut ctx.svs.clients[client_index];
    if cl.state != ClientState::Connected {
        info!("New not valid -- already spawned");
        return;
    }

    // send the serverdata
    let msg = &mut cl.netchan.message;
    msg_write_byte(msg, SVC_SERVERDATA as i32);
    msg_write_long(msg, PROTOCOL_VERSION);
    msg_write_long(msg, ctx.svs.spawncount);
    msg_write_short(msg, client_index as i32);
    msg_write_string(msg, &ctx.sv.name);
}

/// `begin <spawncount>`: the client has its serverdata, put it in the game.
fn sv_begin_f(ctx: &mut ServerContext, client_index: usize, args: &[String]) {
    debug!("Begin() from {}", ctx.svs.clients[client_index].name);

    // handle the case of a level changing while a client was connecting
    let spawncount = args.get(1).and_then(|v| v.parse::<i32>().ok()).unwrap_or(-1);
    if spawncount != ctx.svs.spawncount {
        info!("SV_Begin_f from different level");
        sv_new(ctx, client_index);
        return;
    }
    if ctx.svs.clients[client_index].state != ClientState::Connected {
        return;
    }

    let origin = sv_find_spawn_point(&mut ctx.sv);
    let edict = ctx.svs.clients[client_index].edict;
    let sv = &mut ctx.sv;
    let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
    put_client_in_server(&mut sv.game, &mut gi, edict, origin, [0.0; 3]);

    let cl = &mut ctx.svs.clients[client_index];
    cl.state = ClientState::Spawned;
    info!("{} entered the game", cl.name);
}

/// Pulls `name` out of a `\key\value` userinfo string.
fn userinfo_name(userinfo: &str) -> Option<&str> {
    let mut parts = userinfo.trim_start_matches('\\').split('\\');
    while let (Some(key), Some(value)) = (parts.next(), parts.next()) {
        if key == "name" {
            return Some(value);
        }
    }
    None
}

pub fn sv_execute_user_command(ctx: &mut ServerContext, client_index: usize, s: &str) {
    let args = tokenize(s);
    let Some(cmd) = args.first() else {
        return;
    };
    debug!("{}: {}", ctx.svs.clients[client_index].name, s);

    match cmd.as_str() {
        "new" => sv_new(ctx, client_index),
        "begin" => sv_begin_f(ctx, client_index, &args),
        "disconnect" => {
            info!("{} disconnected", ctx.svs.clients[client_index].name);
            sv_drop_client(ctx, client_index);
        }
        _ => debug!("unknown client command {}", cmd),
    }
}

/// Runs one user command for a spawned client.
pub fn sv_client_think(ctx: &mut ServerContext, client_index: usize, cmd: &UserCmd) -> ComResult<()> {
    if ctx.svs.clients[client_index].state != ClientState::Spawned {
        return Ok(());
    }
    let edict = ctx.svs.clients[client_index].edict;
    let sv = &mut ctx.sv;
    let mut gi = ServerImport { cm: &mut sv.cm, world: &mut sv.world };
    client_think(&mut sv.game, &mut gi, edict, cmd)
}

/// The current net message is parsed for the given client.
pub fn sv_execute_client_message(ctx: &mut ServerContext, client_index: usize, msg: &mut SizeBuf) -> ComResult<()> {
    let mut move_issued = false;
    let mut string_cmd_count = 0;

    loop {
        if msg_read_overrun(msg) {
            warn!("SV_ReadClientMessage: badread");
            sv_drop_client(ctx, client_index);
            return Ok(());
        }

        let c = msg_read_byte(msg);
        if c == -1 {
            break;
        }

        match c as u8 {
            CLC_NOP => {}

            CLC_USERINFO => {
                let userinfo = msg_read_string(msg);
                if let Some(name) = userinfo_name(&userinfo) {
                    ctx.svs.clients[client_index].name = name.to_string();
                }
            }

            CLC_MOVE => {
                // only one move allowed per packet
                if move_issued {
                    return Ok(());
                }
                move_issued = true;

                let lastframe = msg_read_long(msg);
                let oldest = msg_read_delta_usercmd(msg, &UserCmd::default());
                let oldcmd = msg_read_delta_usercmd(msg, &oldest);
                let newcmd = msg_read_delta_usercmd(msg, &oldcmd);

                let cl = &mut ctx.svs.clients[client_index];
                if cl.state != ClientState::Spawned {
                    cl.lastframe = -1;
                    continue;
                }
                cl.lastframe = lastframe;

                // fill in the commands lost since the last packet
                let mut net_drop = cl.netchan.dropped;
                let lastcmd = cl.lastcmd;
                if net_drop < 20 {
                    while net_drop > 2 {
                        sv_client_think(ctx, client_index, &lastcmd)?;
                        net_drop -= 1;
                    }
                    if net_drop > 1 {
                        sv_client_think(ctx, client_index, &oldest)?;
                    }
                    if net_drop > 0 {
                        sv_client_think(ctx, client_index, &oldcmd)?;
                    }
                }
                sv_client_think(ctx, client_index, &newcmd)?;

                ctx.svs.clients[client_index].lastcmd = newcmd;
            }

            CLC_STRINGCMD => {
                let s = msg_read_string(msg);

                // malicious users may try using too many string commands
                string_cmd_count += 1;
                if string_cmd_count < MAX_STRINGCMDS {
                    sv_execute_user_command(ctx, client_index, &s);
                }

                if ctx.svs.clients[client_index].state == ClientState::Zombie {
                    return Ok(()); // disconnect command
                }
            }

            _ => {
                warn!("SV_ReadClientMessage: unknown command char {}", c);
                sv_drop_client(ctx, client_index);
                return Ok(());
            }
        }
    }
    Ok(())
}
