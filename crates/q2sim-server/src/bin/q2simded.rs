// Dedicated server entry point.
//
//   q2simded [+set name value]... +map maps/base1.bsp

use std::process::ExitCode;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use q2sim_common::common::tokenize;
use q2sim_common::cvar::CvarFlags;
use q2sim_common::net::{LoopbackTransport, UdpTransport};
use q2sim_common::qcommon::NetSrc;
use q2sim_server::server::{ServerContext, FRAMEMSEC};
use q2sim_server::sv_init::sv_map;
use q2sim_server::sv_main::{sv_frame, sv_init, sv_shutdown};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut ctx = ServerContext::new(Box::new(LoopbackTransport::new()));
    sv_init(&mut ctx);
    ctx.cvars.get("ip", "localhost", CvarFlags::NOSET);
    let commands = ctx.cvars.apply_command_line(&args[..]);

    let default_filter = if ctx.cvars.variable_value("developer") != 0.0 { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut mapname = None;
    for cmd in &commands {
        let argv = tokenize(cmd);
        match argv.first().map(String::as_str) {
            Some("map") => mapname = argv.get(1).cloned(),
            Some(other) => warn!("Unknown command \"{}\"", other),
            None => {}
        }
    }
    let Some(mapname) = mapname else {
        error!("no map given, start with +map <file.bsp>");
        return ExitCode::FAILURE;
    };

    let mut udp = UdpTransport::new();
    let port = ctx.cvars.variable_value("port") as i32;
    if let Err(e) = udp.open(NetSrc::Server, ctx.cvars.variable_string("ip"), port) {
        error!("couldn't open the server socket on port {}: {}", port, e);
        return ExitCode::FAILURE;
    }
    ctx.net = Box::new(udp);

    if let Err(e) = sv_map(&mut ctx, &mapname, None) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    info!("==== {} up on port {} ====", ctx.cvars.variable_string("hostname"), port);

    let frame = Duration::from_millis(FRAMEMSEC as u64);
    let mut last = Instant::now();
    loop {
        let elapsed = last.elapsed();
        if elapsed < frame {
            std::thread::sleep(frame - elapsed);
        }
        let msec = last.elapsed().as_millis() as i32;
        last += Duration::from_millis(msec as u64);

        if let Err(e) = sv_frame(&mut ctx, msec) {
            // the level is lost but the process carries on with a fresh one
            error!("{}", e);
            sv_shutdown(&mut ctx, &format!("Server crashed: {}\n", e));
            if let Err(e) = sv_map(&mut ctx, &mapname, None) {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }
}
