// g_local.rs - entity arena, level state and game-private definitions

pub use q2sim_common::q_shared::*;
pub use crate::game::*;

use crate::dispatch::{BlockedFn, EndFn, ThinkFn, TouchFn};

/// seconds per server frame
pub const FRAMETIME: f32 = 0.1;

pub const STEPSIZE: f32 = 18.0;

// edict->flags
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntityFlags: i32 {
        const FLY            = 0x00000001;
        /// implied immunity to drowining
        const SWIM           = 0x00000002;
        const INWATER        = 0x00000008;
        /// not all corners are valid
        const PARTIALGROUND  = 0x00000100;
        /// player jumping out of water
        const WATERJUMP      = 0x00000200;
        /// not the first on the team
        const TEAMSLAVE      = 0x00000400;
    }
}

pub const FL_FLY: EntityFlags = EntityFlags::FLY;
pub const FL_SWIM: EntityFlags = EntityFlags::SWIM;
pub const FL_INWATER: EntityFlags = EntityFlags::INWATER;
pub const FL_PARTIALGROUND: EntityFlags = EntityFlags::PARTIALGROUND;
pub const FL_WATERJUMP: EntityFlags = EntityFlags::WATERJUMP;
pub const FL_TEAMSLAVE: EntityFlags = EntityFlags::TEAMSLAVE;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AiFlags: i32 {
        const STAND_GROUND = 0x00000001;
        const NOSTEP       = 0x00000004;
    }
}

pub const AI_NOSTEP: AiFlags = AiFlags::NOSTEP;

// edict->movetype values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    /// never moves
    #[default]
    None,
    /// origin and angles change with no interaction
    Noclip,
    /// no clip to world, push on box contact
    Push,
    /// no clip to world, stops on box contact
    Stop,
    /// gravity, player movement
    Walk,
    /// gravity, special edge handling
    Step,
    Fly,
    /// gravity
    Toss,
    /// extra size to monsters
    FlyMissile,
    Bounce,
}

// edict->deadflag values
pub const DEAD_NO: i32 = 0;
pub const DEAD_DYING: i32 = 1;
pub const DEAD_DEAD: i32 = 2;

// edict->spawnflags for doors
pub const DOOR_START_OPEN: i32 = 1;
pub const DOOR_REVERSE: i32 = 2;
pub const DOOR_CRUSHER: i32 = 4;
pub const DOOR_TOGGLE: i32 = 32;

/// Where a mover is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoverState {
    Top,
    #[default]
    Bottom,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoveInfo {
    // fixed data
    pub start_origin: Vec3,
    pub start_angles: Vec3,
    pub end_origin: Vec3,
    pub end_angles: Vec3,

    pub accel: f32,
    pub speed: f32,
    pub decel: f32,
    pub distance: f32,

    pub wait: f32,

    // state data
    pub state: MoverState,
    pub dir: Vec3,
    pub current_speed: f32,
    pub move_speed: f32,
    pub next_speed: f32,
    pub remaining_distance: f32,
    pub decel_distance: f32,
    pub endfunc: Option<EndFn>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonsterInfo {
    pub aiflags: AiFlags,
}

#[derive(Debug, Clone, Default)]
pub struct Edict {
    // seen and written by the server
    pub s: EntityState,
    /// index into `GameCtx::clients`
    pub client: Option<usize>,
    pub inuse: bool,
    pub linkcount: i32,
    pub area: Option<AreaLink>,
    /// -1 when the entity spans too many clusters and `headnode` is used
    pub num_clusters: i32,
    pub clusternums: [i32; MAX_ENT_CLUSTERS],
    /// unused if num_clusters != -1
    pub headnode: i32,
    pub areanum: i32,
    pub areanum2: i32,
    pub svflags: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub absmin: Vec3,
    pub absmax: Vec3,
    pub size: Vec3,
    pub solid: Solid,
    pub clipmask: i32,
    pub owner: Option<usize>,

    // game private
    pub movetype: MoveType,
    pub flags: EntityFlags,
    pub freetime: f32,
    pub classname: String,
    pub spawnflags: i32,
    pub target: String,
    pub targetname: String,
    /// area portal number for func_areaportal
    pub style: i32,

    pub speed: f32,
    pub accel: f32,
    pub decel: f32,
    pub movedir: Vec3,
    pub pos1: Vec3,
    pub pos2: Vec3,

    pub velocity: Vec3,
    pub avelocity: Vec3,
    pub mass: i32,
    pub gravity: f32,

    pub goalentity: Option<usize>,
    pub enemy: Option<usize>,
    pub activator: Option<usize>,
    pub yaw_speed: f32,
    pub ideal_yaw: f32,

    pub nextthink: f32,
    pub think: Option<ThinkFn>,
    pub touch: Option<TouchFn>,
    pub blocked: Option<BlockedFn>,

    pub health: i32,
    pub max_health: i32,
    pub deadflag: i32,
    pub viewheight: i32,
    pub dmg: i32,

    pub groundentity: Option<usize>,
    pub groundentity_linkcount: i32,
    pub teamchain: Option<usize>,
    pub teammaster: Option<usize>,

    pub watertype: i32,
    pub waterlevel: i32,

    pub moveinfo: MoveInfo,
    pub monsterinfo: MonsterInfo,
}

/// Per-player data that survives between frames.
#[derive(Debug, Clone, Default)]
pub struct GClient {
    pub ps: PlayerState,
    /// for detecting out-of-pmove changes
    pub old_pmove: PmoveState,
    /// angles sent over in the last command
    pub cmd_angles: Vec3,
    pub spectator: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LevelLocals {
    pub framenum: i32,
    pub time: f32,
    pub mapname: String,
    /// entity running from g_run_frame
    pub current_entity: Option<usize>,
}

/// Server variables the game reads, copied in before every frame.
#[derive(Debug, Clone, Copy)]
pub struct GameCvars {
    pub gravity: f32,
    pub maxvelocity: f32,
}

impl Default for GameCvars {
    fn default() -> Self {
        Self { gravity: 800.0, maxvelocity: 2000.0 }
    }
}

/// Everything the game owns. Entity 0 is the world and entities
/// `1..=maxclients` are reserved for players.
#[derive(Debug, Clone, Default)]
pub struct GameCtx {
    pub edicts: Vec<Edict>,
    pub clients: Vec<GClient>,
    pub level: LevelLocals,
    pub cvars: GameCvars,
    /// one past the highest slot ever handed out
    pub num_edicts: usize,
    pub max_edicts: usize,
    pub maxclients: usize,
}

impl GameCtx {
    pub fn new(maxclients: usize, max_edicts: usize) -> Self {
        let max_edicts = max_edicts.clamp(maxclients + 1, MAX_EDICTS);
        let mut edicts = vec![Edict::default(); max_edicts];
        for (i, e) in edicts.iter_mut().enumerate() {
            e.s.number = i;
        }
        for i in 0..maxclients {
            edicts[i + 1].client = Some(i);
        }
        let world = &mut edicts[0];
        world.inuse = true;
        world.classname = "worldspawn".to_string();
        world.solid = Solid::Bsp;
        world.movetype = MoveType::Push;
        world.s.modelindex = 1;
        Self {
            edicts,
            clients: vec![GClient::default(); maxclients],
            level: LevelLocals::default(),
            cvars: GameCvars::default(),
            num_edicts: maxclients + 1,
            max_edicts,
            maxclients,
        }
    }

    pub fn ent(&self, idx: usize) -> &Edict {
        &self.edicts[idx]
    }

    pub fn ent_mut(&mut self, idx: usize) -> &mut Edict {
        &mut self.edicts[idx]
    }

    pub fn is_client(&self, idx: usize) -> bool {
        idx > 0 && idx <= self.maxclients
    }
}
