// game.rs - the parts of an entity the server reads and writes directly

use q2sim_common::q_shared::{PmoveState, Vec3};

// edict->svflags
/// don't send entity to clients, even if it has effects
pub const SVF_NOCLIENT: i32 = 0x00000001;
/// treat as CONTENTS_DEADMONSTER for collision
pub const SVF_DEADMONSTER: i32 = 0x00000002;
/// treat as CONTENTS_MONSTER for collision
pub const SVF_MONSTER: i32 = 0x00000004;

// edict->solid values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Solid {
    /// no interaction with other objects
    #[default]
    Not = 0,
    /// only touch when inside, after moving
    Trigger,
    /// touch on edge
    Bbox,
    /// bsp clip, touch on edge
    Bsp,
}

/// Which per-node list an entity is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaList {
    Solid,
    Triggers,
}

/// Where the server world has linked an entity. `None` on the edict means
/// it is not linked anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaLink {
    pub node: usize,
    pub list: AreaList,
}

/// The networked part of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    /// edict index
    pub number: usize,
    pub origin: Vec3,
    pub angles: Vec3,
    /// for lerping
    pub old_origin: Vec3,
    pub modelindex: i32,
    /// packed bbox size for client side prediction, or 31 for bsp models
    pub solid: i32,
}

/// The networked part of a player.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerState {
    pub pmove: PmoveState,
    pub viewangles: Vec3,
    pub viewoffset: Vec3,
}
