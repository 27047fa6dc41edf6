// testutil.rs - a brute force GameImport for physics tests
//
// The world is an optional infinite floor with optional water above it.
// Entities clip as their axis aligned boxes: bsp entities as solid,
// everything else as monster contents.

use q2sim_common::common::{ComError, ComResult};

use crate::g_local::*;
use crate::game_import::GameImport;

#[derive(Debug, Default)]
pub struct BoxWorld {
    /// top of the solid floor
    pub floor: Option<f32>,
    /// water fills from the floor up to here
    pub water_top: Option<f32>,
    pub num_portals: usize,
    pub portals: Vec<(usize, bool)>,
    pub traces: usize,
}

impl BoxWorld {
    pub fn with_floor(z: f32) -> Self {
        Self { floor: Some(z), ..Self::default() }
    }
}

struct Hit {
    fraction: f32,
    normal: Vec3,
    startsolid: bool,
    allsolid: bool,
}

/// Sweeps the point `start..end` against the box `lo..hi`, which already
/// has the moving box folded in. Touching a face is not a collision.
fn clip_expanded(start: &Vec3, end: &Vec3, lo: &Vec3, hi: &Vec3) -> Option<Hit> {
    let inside = |p: &Vec3| (0..3).all(|i| p[i] > lo[i] && p[i] < hi[i]);
    if inside(start) {
        return Some(Hit { fraction: 0.0, normal: VEC3_ORIGIN, startsolid: true, allsolid: inside(end) });
    }

    let mut enter = f32::NEG_INFINITY;
    let mut exit = f32::INFINITY;
    let mut normal = VEC3_ORIGIN;
    for i in 0..3 {
        let d = end[i] - start[i];
        if d == 0.0 {
            if start[i] <= lo[i] || start[i] >= hi[i] {
                return None;
            }
            continue;
        }
        let t1 = (lo[i] - start[i]) / d;
        let t2 = (hi[i] - start[i]) / d;
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if near > enter {
            enter = near;
            normal = VEC3_ORIGIN;
            normal[i] = if d > 0.0 { -1.0 } else { 1.0 };
        }
        exit = exit.min(far);
    }
    if enter < exit && (0.0..1.0).contains(&enter) {
        return Some(Hit { fraction: enter, normal, startsolid: false, allsolid: false });
    }
    None
}

fn lerp(a: &Vec3, b: &Vec3, f: f32) -> Vec3 {
    [a[0] + f * (b[0] - a[0]), a[1] + f * (b[1] - a[1]), a[2] + f * (b[2] - a[2])]
}

fn merge(best: &mut Trace, hit: Hit, ent: usize, contents: i32, start: &Vec3, end: &Vec3) {
    if hit.allsolid || hit.startsolid || hit.fraction < best.fraction {
        let was_startsolid = best.startsolid;
        best.fraction = hit.fraction;
        best.plane = CPlane::new(hit.normal, 0.0);
        best.startsolid = hit.startsolid || was_startsolid;
        best.allsolid = hit.allsolid;
        best.contents = contents;
        best.ent = Some(ent);
        best.endpos = lerp(start, end, hit.fraction);
    }
}

impl GameImport for BoxWorld {
    fn trace(
        &mut self,
        edicts: &[Edict],
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        passent: Option<usize>,
        contentmask: i32,
    ) -> Trace {
        self.traces += 1;
        let mut best = Trace { endpos: *end, ent: None, ..Trace::default() };

        if let Some(z) = self.floor {
            if contentmask & CONTENTS_SOLID != 0 {
                let lo = [f32::NEG_INFINITY; 3];
                let hi = [f32::INFINITY, f32::INFINITY, z - mins[2]];
                if let Some(hit) = clip_expanded(start, end, &lo, &hi) {
                    merge(&mut best, hit, 0, CONTENTS_SOLID, start, end);
                }
            }
        }

        let pass_owner = passent.and_then(|p| edicts[p].owner);
        for (i, e) in edicts.iter().enumerate().skip(1) {
            if !e.inuse || e.area.is_none() || !matches!(e.solid, Solid::Bbox | Solid::Bsp) {
                continue;
            }
            if Some(i) == passent || (passent.is_some() && e.owner == passent) || Some(i) == pass_owner {
                continue;
            }
            if e.svflags & SVF_DEADMONSTER != 0 && contentmask & CONTENTS_DEADMONSTER == 0 {
                continue;
            }
            let contents = if e.solid == Solid::Bsp {
                CONTENTS_SOLID
            } else if e.svflags & SVF_DEADMONSTER != 0 {
                CONTENTS_DEADMONSTER
            } else {
                CONTENTS_MONSTER
            };
            if contents & contentmask == 0 {
                continue;
            }
            let lo = [
                e.s.origin[0] + e.mins[0] - maxs[0],
                e.s.origin[1] + e.mins[1] - maxs[1],
                e.s.origin[2] + e.mins[2] - maxs[2],
            ];
            let hi = [
                e.s.origin[0] + e.maxs[0] - mins[0],
                e.s.origin[1] + e.maxs[1] - mins[1],
                e.s.origin[2] + e.maxs[2] - mins[2],
            ];
            if let Some(hit) = clip_expanded(start, end, &lo, &hi) {
                merge(&mut best, hit, i, contents, start, end);
            }
        }

        if best.fraction == 1.0 {
            best.endpos = *end;
        }
        best
    }

    fn pointcontents(&mut self, _edicts: &[Edict], point: &Vec3) -> i32 {
        match (self.floor, self.water_top) {
            (Some(f), _) if point[2] < f => CONTENTS_SOLID,
            (_, Some(w)) if point[2] < w => CONTENTS_WATER,
            _ => 0,
        }
    }

    fn linkentity(&mut self, edicts: &mut [Edict], ent: usize) {
        let e = &mut edicts[ent];
        e.size = [e.maxs[0] - e.mins[0], e.maxs[1] - e.mins[1], e.maxs[2] - e.mins[2]];
        for i in 0..3 {
            e.absmin[i] = e.s.origin[i] + e.mins[i] - 1.0;
            e.absmax[i] = e.s.origin[i] + e.maxs[i] + 1.0;
        }
        let list = if e.solid == Solid::Trigger { AreaList::Triggers } else { AreaList::Solid };
        e.area = if e.solid == Solid::Not { None } else { Some(AreaLink { node: 0, list }) };
        e.linkcount += 1;
    }

    fn unlinkentity(&mut self, edicts: &mut [Edict], ent: usize) {
        edicts[ent].area = None;
    }

    fn area_edicts(
        &mut self,
        edicts: &[Edict],
        mins: &Vec3,
        maxs: &Vec3,
        maxcount: usize,
        areatype: AreaList,
    ) -> Vec<usize> {
        edicts
            .iter()
            .enumerate()
            .filter(|(_, e)| e.inuse && e.area.is_some_and(|a| a.list == areatype))
            .filter(|(_, e)| (0..3).all(|i| e.absmin[i] <= maxs[i] && e.absmax[i] >= mins[i]))
            .map(|(i, _)| i)
            .take(maxcount)
            .collect()
    }

    fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> ComResult<()> {
        if portalnum >= self.num_portals {
            return Err(ComError::Drop("areaportal > numareaportals".into()));
        }
        self.portals.push((portalnum, open));
        Ok(())
    }

    fn areas_connected(&mut self, _area1: i32, _area2: i32) -> bool {
        true
    }
}

/// A linked entity with the given bounds.
pub fn spawn_box(
    ctx: &mut GameCtx,
    gi: &mut BoxWorld,
    origin: Vec3,
    mins: Vec3,
    maxs: Vec3,
    solid: Solid,
    movetype: MoveType,
) -> usize {
    let idx = crate::g_utils::g_spawn(ctx).expect("free edict");
    let e = &mut ctx.edicts[idx];
    e.s.origin = origin;
    e.mins = mins;
    e.maxs = maxs;
    e.solid = solid;
    e.movetype = movetype;
    gi.linkentity(&mut ctx.edicts, idx);
    idx
}
