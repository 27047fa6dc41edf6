// q_shared.rs - geometry, contents masks and the types shared by CM, Pmove,
// the game and the server.

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// angle indexes
pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

pub const MAX_CLIENTS: usize = 256;
pub const MAX_EDICTS: usize = 1024;
pub const MAX_MODELS: usize = 256;
pub const MAX_ENT_CLUSTERS: usize = 16;

// ============================================================
// Contents and surface flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WINDOW: i32 = 2;
pub const CONTENTS_AUX: i32 = 4;
pub const CONTENTS_LAVA: i32 = 8;
pub const CONTENTS_SLIME: i32 = 16;
pub const CONTENTS_WATER: i32 = 32;
pub const CONTENTS_MIST: i32 = 64;
pub const LAST_VISIBLE_CONTENTS: i32 = 64;

pub const CONTENTS_AREAPORTAL: i32 = 0x8000;
pub const CONTENTS_PLAYERCLIP: i32 = 0x10000;
pub const CONTENTS_MONSTERCLIP: i32 = 0x20000;

pub const CONTENTS_CURRENT_0: i32 = 0x40000;
pub const CONTENTS_CURRENT_90: i32 = 0x80000;
pub const CONTENTS_CURRENT_180: i32 = 0x100000;
pub const CONTENTS_CURRENT_270: i32 = 0x200000;
pub const CONTENTS_CURRENT_UP: i32 = 0x400000;
pub const CONTENTS_CURRENT_DOWN: i32 = 0x800000;

pub const CONTENTS_ORIGIN: i32 = 0x1000000;
pub const CONTENTS_MONSTER: i32 = 0x2000000;
pub const CONTENTS_DEADMONSTER: i32 = 0x4000000;
pub const CONTENTS_DETAIL: i32 = 0x8000000;
pub const CONTENTS_TRANSLUCENT: i32 = 0x10000000;
pub const CONTENTS_LADDER: i32 = 0x20000000;

pub const SURF_LIGHT: i32 = 0x1;
pub const SURF_SLICK: i32 = 0x2;
pub const SURF_SKY: i32 = 0x4;
pub const SURF_WARP: i32 = 0x8;
pub const SURF_NODRAW: i32 = 0x80;

pub const MASK_ALL: i32 = -1;
pub const MASK_SOLID: i32 = CONTENTS_SOLID | CONTENTS_WINDOW;
pub const MASK_PLAYERSOLID: i32 =
    CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;
pub const MASK_DEADSOLID: i32 = CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW;
pub const MASK_MONSTERSOLID: i32 =
    CONTENTS_SOLID | CONTENTS_MONSTERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;
pub const MASK_WATER: i32 = CONTENTS_WATER | CONTENTS_LAVA | CONTENTS_SLIME;
pub const MASK_OPAQUE: i32 = CONTENTS_SOLID | CONTENTS_SLIME | CONTENTS_LAVA;
pub const MASK_SHOT: i32 =
    CONTENTS_SOLID | CONTENTS_MONSTER | CONTENTS_WINDOW | CONTENTS_DEADMONSTER;
pub const MASK_CURRENT: i32 = CONTENTS_CURRENT_0
    | CONTENTS_CURRENT_90
    | CONTENTS_CURRENT_180
    | CONTENTS_CURRENT_270
    | CONTENTS_CURRENT_UP
    | CONTENTS_CURRENT_DOWN;

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    /// 0..2 for axial planes, >= 3 otherwise
    pub plane_type: u8,
    /// bit n set when normal[n] is negative
    pub signbits: u8,
}

impl CPlane {
    /// Builds a plane and derives its type tag and sign bits from the normal.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let mut p = CPlane {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits: 0,
        };
        p.signbits = signbits_for_plane(&p);
        p
    }
}

pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }
    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();
    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

pub fn signbits_for_plane(p: &CPlane) -> u8 {
    let mut bits = 0u8;
    for j in 0..3 {
        if p.normal[j] < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

/// Distance from `p` to the plane, using the axial shortcut when possible.
#[inline]
pub fn plane_diff(p: &Vec3, plane: &CPlane) -> f32 {
    if plane.plane_type < 3 {
        p[plane.plane_type as usize] - plane.dist
    } else {
        dot_product(p, &plane.normal) - plane.dist
    }
}

/// Classifies a box against a plane: 1 = front, 2 = back, 3 = straddling.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    if p.plane_type < 3 {
        let axis = p.plane_type as usize;
        if p.dist <= emins[axis] {
            return 1;
        }
        if p.dist >= emaxs[axis] {
            return 2;
        }
        return 3;
    }

    // pick the nearest and farthest corners from the sign bits
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for i in 0..3 {
        if p.signbits & (1 << i) != 0 {
            far[i] = emins[i];
            near[i] = emaxs[i];
        } else {
            far[i] = emaxs[i];
            near[i] = emins[i];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

// ============================================================
// Collision results
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CSurface {
    pub name: [u8; 16],
    pub flags: i32,
    pub value: i32,
}

impl CSurface {
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Result of sweeping a box through the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// the whole move was inside a solid
    pub allsolid: bool,
    /// the start point was inside a solid
    pub startsolid: bool,
    /// 1.0 = the move completed
    pub fraction: f32,
    pub endpos: Vec3,
    /// valid when fraction < 1.0
    pub plane: CPlane,
    pub surface: Option<CSurface>,
    pub contents: i32,
    /// entity hit, filled in by the world layer
    pub ent: Option<usize>,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: VEC3_ORIGIN,
            plane: CPlane::default(),
            surface: None,
            contents: 0,
            ent: None,
        }
    }
}

// ============================================================
// Player movement state
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum PmType {
    #[default]
    Normal = 0,
    Spectator = 1,
    // no acceleration or turning past this point
    Dead = 2,
    Gib = 3,
    Freeze = 4,
}

impl PmType {
    pub fn from_u8(v: u8) -> Option<PmType> {
        match v {
            0 => Some(PmType::Normal),
            1 => Some(PmType::Spectator),
            2 => Some(PmType::Dead),
            3 => Some(PmType::Gib),
            4 => Some(PmType::Freeze),
            _ => None,
        }
    }
}

pub const PMF_DUCKED: u8 = 1;
pub const PMF_JUMP_HELD: u8 = 2;
pub const PMF_ON_GROUND: u8 = 4;
pub const PMF_TIME_WATERJUMP: u8 = 8;
pub const PMF_TIME_LAND: u8 = 16;
pub const PMF_TIME_TELEPORT: u8 = 32;
pub const PMF_NO_PREDICTION: u8 = 64;

/// Player state exchanged with clients. Integer-only so both ends
/// reproduce it bit for bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmoveState {
    pub pm_type: PmType,
    /// 12.3 fixed point
    pub origin: [i16; 3],
    /// 12.3 fixed point
    pub velocity: [i16; 3],
    pub pm_flags: u8,
    /// each unit is 8 ms
    pub pm_time: u8,
    pub gravity: i16,
    pub delta_angles: [i16; 3],
}

pub const BUTTON_ATTACK: u8 = 1;
pub const BUTTON_USE: u8 = 2;
pub const BUTTON_ANY: u8 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCmd {
    pub msec: u8,
    pub buttons: u8,
    pub angles: [i16; 3],
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
    pub impulse: u8,
    pub lightlevel: u8,
}

pub const MAXTOUCH: usize = 32;

/// In/out block for one `pmove` call.
#[derive(Debug, Clone, Default)]
pub struct PmoveData {
    // state (in / out)
    pub s: PmoveState,

    // command (in)
    pub cmd: UserCmd,
    pub snapinitial: bool,

    // results (out)
    pub touchents: Vec<usize>,
    pub viewangles: Vec3,
    pub viewheight: f32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub groundentity: Option<usize>,
    pub watertype: i32,
    pub waterlevel: i32,
}

// ============================================================
// Vector math
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross_product(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// `start + scale * dir`
#[inline]
pub fn vector_ma(start: &Vec3, scale: f32, dir: &Vec3) -> Vec3 {
    [
        start[0] + scale * dir[0],
        start[1] + scale * dir[1],
        start[2] + scale * dir[2],
    ]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

#[inline]
pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalizes in place and returns the original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

#[inline]
pub fn vector_compare(a: &Vec3, b: &Vec3) -> bool {
    a[0] == b[0] && a[1] == b[1] && a[2] == b[2]
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Forward, right and up vectors for a set of Euler angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = (angles[YAW].to_radians()).sin_cos();
    let (sp, cp) = (angles[PITCH].to_radians()).sin_cos();
    let (sr, cr) = (angles[ROLL].to_radians()).sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    ];
    let up = [cr * sp * cy + sr * sy, cr * sp * sy - sr * cy, cr * cp];
    (forward, right, up)
}

pub fn anglemod(a: f32) -> f32 {
    (360.0 / 65536.0) * (((a * (65536.0 / 360.0)) as i32) & 65535) as f32
}

#[inline]
pub fn angle2short(x: f32) -> i16 {
    ((x * 65536.0 / 360.0) as i32 & 65535) as i16
}

#[inline]
pub fn short2angle(x: i16) -> f32 {
    x as f32 * (360.0 / 65536.0)
}

pub fn vectoyaw(vec: &Vec3) -> f32 {
    if vec[YAW] == 0.0 && vec[PITCH] == 0.0 {
        return 0.0;
    }
    let mut yaw = (vec[YAW].atan2(vec[PITCH]) * 180.0 / std::f32::consts::PI) as i32 as f32;
    if yaw < 0.0 {
        yaw += 360.0;
    }
    yaw
}

pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    vector_length(&corner)
}
