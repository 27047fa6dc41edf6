// server.rs - server state shared by every sv_* module
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sim_common::cmodel::CModelContext;
use q2sim_common::cvar::CvarContext;
use q2sim_common::net::NetTransport;
use q2sim_common::net_chan::NetChan;
use q2sim_common::q_shared::UserCmd;
use q2sim_game::g_local::GameCtx;

use crate::sv_world::SvWorld;

/// milliseconds per game frame
pub const FRAMEMSEC: i32 = 100;

/// string commands accepted from one client packet
pub const MAX_STRINGCMDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// no map loaded
    #[default]
    Dead,
    /// spawning level edicts
    Loading,
    /// actively running
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ClientState {
    /// can be reused for a new connection
    #[default]
    Free,
    /// client has been disconnected, but don't reuse for a couple seconds
    Zombie,
    /// has been assigned a slot, but not in game yet
    Connected,
    /// client is fully in game
    Spawned,
}

#[derive(Debug, Clone, Default)]
pub struct Client {
    pub state: ClientState,
    pub name: String,
    /// for filling in big drops
    pub lastcmd: UserCmd,
    /// for delta compression
    pub lastframe: i32,
    /// realtime of the last valid packet, for timeouts
    pub lastmessage: i32,
    /// edict index of the player
    pub edict: usize,
    pub netchan: NetChan,
}

/// Per-level state, rebuilt on every map change.
#[derive(Default)]
pub struct Server {
    pub state: ServerState,
    /// map name
    pub name: String,
    pub framenum: i32,
    /// always framenum * FRAMEMSEC
    pub time: i32,
    pub cm: CModelContext,
    pub world: SvWorld,
    pub game: GameCtx,
}

/// State that persists across level changes.
#[derive(Debug, Default)]
pub struct ServerStatic {
    /// sv_init has completed
    pub initialized: bool,
    /// always increasing, no clamping, etc
    pub realtime: i32,
    /// incremented each level load so clients can tell maps apart
    pub spawncount: i32,
    pub clients: Vec<Client>,
}

pub struct ServerContext {
    pub sv: Server,
    pub svs: ServerStatic,
    pub cvars: CvarContext,
    pub net: Box<dyn NetTransport>,
}

impl ServerContext {
    pub fn new(net: Box<dyn NetTransport>) -> Self {
        Self {
            sv: Server::default(),
            svs: ServerStatic::default(),
            cvars: CvarContext::new(),
            net,
        }
    }

    pub fn maxclients(&self) -> usize {
        self.svs.clients.len()
    }
}
