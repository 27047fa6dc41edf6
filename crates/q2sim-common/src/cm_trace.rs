// cm_trace.rs - swept box and point traces through the BSP
//
// Brushes are marked with the current trace's checkcount so a brush that
// spans several leafs is only clipped once per trace.

use crate::cmodel::{rotate_point, CModelContext};
use crate::q_shared::*;

/// 1/32 epsilon to keep floating point happy
pub const DIST_EPSILON: f32 = 0.03125;

/// Per-trace inputs and the result being accumulated.
struct TraceWork {
    start: Vec3,
    end: Vec3,
    mins: Vec3,
    maxs: Vec3,
    extents: Vec3,
    contents: i32,
    ispoint: bool,
    trace: Trace,
}

impl CModelContext {
    fn next_checkcount(&mut self) -> u32 {
        self.checkcount = self.checkcount.wrapping_add(1);
        if self.checkcount == 0 {
            // wrapped; stale marks could now collide
            self.brush_checkcount.iter_mut().for_each(|c| *c = 0);
            self.checkcount = 1;
        }
        self.checkcount
    }

    fn clip_box_to_brush(&self, tw: &mut TraceWork, brushnum: usize) {
        let brush = &self.map.brushes[brushnum];
        if brush.numsides == 0 {
            return;
        }

        let mut enterfrac = -1.0f32;
        let mut leavefrac = 1.0f32;
        let mut clipplane: Option<&CPlane> = None;
        let mut leadside = None;
        let mut getout = false;
        let mut startout = false;

        for side in &self.map.brushsides[brush.firstbrushside..brush.firstbrushside + brush.numsides] {
            let plane = &self.map.planes[side.plane];

            let dist = if tw.ispoint {
                plane.dist
            } else {
                // push the plane out by the box corner nearest to it
                let mut ofs = [0.0f32; 3];
                for j in 0..3 {
                    ofs[j] = if plane.normal[j] < 0.0 { tw.maxs[j] } else { tw.mins[j] };
                }
                plane.dist - dot_product(&ofs, &plane.normal)
            };

            let d1 = dot_product(&tw.start, &plane.normal) - dist;
            let d2 = dot_product(&tw.end, &plane.normal) - dist;

            if d2 > 0.0 {
                getout = true; // endpoint is not in solid
            }
            if d1 > 0.0 {
                startout = true;
            }

            // completely in front of face, no intersection
            if d1 > 0.0 && d2 >= d1 {
                return;
            }
            if d1 <= 0.0 && d2 <= 0.0 {
                continue;
            }

            if d1 > d2 {
                // enter
                let f = (d1 - DIST_EPSILON) / (d1 - d2);
                if f > enterfrac {
                    enterfrac = f;
                    clipplane = Some(plane);
                    leadside = Some(side);
                }
            } else {
                // leave
                let f = (d1 + DIST_EPSILON) / (d1 - d2);
                if f < leavefrac {
                    leavefrac = f;
                }
            }
        }

        if !startout {
            // original point was inside brush
            tw.trace.startsolid = true;
            if !getout {
                tw.trace.allsolid = true;
            }
            return;
        }

        if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < tw.trace.fraction {
            if let (Some(plane), Some(side)) = (clipplane, leadside) {
                tw.trace.fraction = enterfrac.max(0.0);
                tw.trace.plane = *plane;
                tw.trace.surface = side.surface;
                tw.trace.contents = brush.contents;
            }
        }
    }

    fn test_box_in_brush(&self, tw: &mut TraceWork, brushnum: usize) {
        let brush = &self.map.brushes[brushnum];
        if brush.numsides == 0 {
            return;
        }

        for side in &self.map.brushsides[brush.firstbrushside..brush.firstbrushside + brush.numsides] {
            let plane = &self.map.planes[side.plane];
            let mut ofs = [0.0f32; 3];
            for j in 0..3 {
                ofs[j] = if plane.normal[j] < 0.0 { tw.maxs[j] } else { tw.mins[j] };
            }
            let dist = plane.dist - dot_product(&ofs, &plane.normal);
            if dot_product(&tw.start, &plane.normal) - dist > 0.0 {
                return;
            }
        }

        // inside this brush
        tw.trace.startsolid = true;
        tw.trace.allsolid = true;
        tw.trace.fraction = 0.0;
        tw.trace.contents = brush.contents;
    }

    /// Runs `test` on each unvisited brush of a leaf that matches the mask,
    /// stopping early once the trace is fully blocked.
    fn for_leaf_brushes(&mut self, leafnum: usize, tw: &mut TraceWork, test: fn(&Self, &mut TraceWork, usize)) {
        let leaf = self.map.leafs[leafnum];
        if leaf.contents & tw.contents == 0 {
            return;
        }
        let checkcount = self.checkcount;
        for k in 0..leaf.numleafbrushes {
            let brushnum = self.map.leafbrushes[leaf.firstleafbrush + k];
            if self.brush_checkcount[brushnum] == checkcount {
                continue; // already checked this brush in another leaf
            }
            self.brush_checkcount[brushnum] = checkcount;

            if self.map.brushes[brushnum].contents & tw.contents == 0 {
                continue;
            }
            test(self, tw, brushnum);
            if tw.trace.fraction == 0.0 {
                return;
            }
        }
    }

    fn recursive_hull_check(&mut self, num: i32, p1f: f32, p2f: f32, p1: &Vec3, p2: &Vec3, tw: &mut TraceWork) {
        if tw.trace.fraction <= p1f {
            return; // already hit something nearer
        }

        if num < 0 {
            self.for_leaf_brushes((-1 - num) as usize, tw, Self::clip_box_to_brush);
            return;
        }

        // find the point distances to the separating plane and the offset
        // for the size of the box
        let node = self.map.nodes[num as usize];
        let plane = self.map.planes[node.plane];

        let (t1, t2, offset) = if plane.plane_type < 3 {
            let axis = plane.plane_type as usize;
            (p1[axis] - plane.dist, p2[axis] - plane.dist, tw.extents[axis])
        } else {
            let offset = if tw.ispoint {
                0.0
            } else {
                (tw.extents[0] * plane.normal[0]).abs()
                    + (tw.extents[1] * plane.normal[1]).abs()
                    + (tw.extents[2] * plane.normal[2]).abs()
            };
            (
                dot_product(&plane.normal, p1) - plane.dist,
                dot_product(&plane.normal, p2) - plane.dist,
                offset,
            )
        };

        if t1 >= offset && t2 >= offset {
            self.recursive_hull_check(node.children[0], p1f, p2f, p1, p2, tw);
            return;
        }
        if t1 < -offset && t2 < -offset {
            self.recursive_hull_check(node.children[1], p1f, p2f, p1, p2, tw);
            return;
        }

        // put the crosspoint DIST_EPSILON pixels on the near side
        let (side, frac, frac2) = if t1 < t2 {
            let idist = 1.0 / (t1 - t2);
            (1, (t1 - offset + DIST_EPSILON) * idist, (t1 + offset + DIST_EPSILON) * idist)
        } else if t1 > t2 {
            let idist = 1.0 / (t1 - t2);
            (0, (t1 + offset + DIST_EPSILON) * idist, (t1 - offset - DIST_EPSILON) * idist)
        } else {
            (0, 1.0, 0.0)
        };

        // move up to the node
        let frac = frac.clamp(0.0, 1.0);
        let midf = p1f + (p2f - p1f) * frac;
        let mid = lerp(p1, p2, frac);
        self.recursive_hull_check(node.children[side], p1f, midf, p1, &mid, tw);

        // go past the node
        let frac2 = frac2.clamp(0.0, 1.0);
        let midf = p1f + (p2f - p1f) * frac2;
        let mid = lerp(p1, p2, frac2);
        self.recursive_hull_check(node.children[side ^ 1], midf, p2f, &mid, p2, tw);
    }

    /// Sweeps the box `mins`/`maxs` from `start` to `end` through the tree
    /// under `headnode`, stopping at the first brush matching `brushmask`.
    /// With `start == end` this is a position test.
    pub fn box_trace(&mut self, start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3, headnode: i32, brushmask: i32) -> Trace {
        self.next_checkcount();

        let mut tw = TraceWork {
            start: *start,
            end: *end,
            mins: *mins,
            maxs: *maxs,
            extents: [0.0; 3],
            contents: brushmask,
            ispoint: false,
            trace: Trace::default(),
        };

        if self.map.numnodes == 0 {
            // map not loaded
            tw.trace.endpos = *end;
            return tw.trace;
        }

        if vector_compare(start, end) {
            let c1 = [start[0] + mins[0] - 1.0, start[1] + mins[1] - 1.0, start[2] + mins[2] - 1.0];
            let c2 = [start[0] + maxs[0] + 1.0, start[1] + maxs[1] + 1.0, start[2] + maxs[2] + 1.0];
            let (leafs, _) = self.box_leafnums_headnode(&c1, &c2, 1024, headnode);
            for leafnum in leafs {
                self.for_leaf_brushes(leafnum, &mut tw, Self::test_box_in_brush);
                if tw.trace.allsolid {
                    break;
                }
            }
            tw.trace.endpos = *start;
            return tw.trace;
        }

        if vector_compare(mins, &VEC3_ORIGIN) && vector_compare(maxs, &VEC3_ORIGIN) {
            tw.ispoint = true;
        } else {
            for i in 0..3 {
                tw.extents[i] = (-mins[i]).max(maxs[i]);
            }
        }

        self.recursive_hull_check(headnode, 0.0, 1.0, start, end, &mut tw);

        tw.trace.endpos = if tw.trace.fraction == 1.0 {
            *end
        } else {
            lerp(start, end, tw.trace.fraction)
        };
        tw.trace
    }

    /// Trace against a brush model moved to `origin` and rotated by
    /// `angles`. The hit plane comes back in world space.
    #[allow(clippy::too_many_arguments)]
    pub fn transformed_box_trace(
        &mut self,
        start: &Vec3,
        end: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        headnode: i32,
        brushmask: i32,
        origin: &Vec3,
        angles: &Vec3,
    ) -> Trace {
        let mut start_l = vector_subtract(start, origin);
        let mut end_l = vector_subtract(end, origin);

        let rotated = headnode != self.map.box_headnode && !vector_compare(angles, &VEC3_ORIGIN);
        if rotated {
            start_l = rotate_point(&start_l, angles);
            end_l = rotate_point(&end_l, angles);
        }

        let mut trace = self.box_trace(&start_l, &end_l, mins, maxs, headnode, brushmask);

        if rotated && trace.fraction != 1.0 {
            let back = vector_negate(angles);
            trace.plane.normal = rotate_point(&trace.plane.normal, &back);
        }

        trace.endpos = lerp(start, end, trace.fraction);
        trace
    }
}

fn lerp(a: &Vec3, b: &Vec3, frac: f32) -> Vec3 {
    [
        a[0] + frac * (b[0] - a[0]),
        a[1] + frac * (b[1] - a[1]),
        a[2] + frac * (b[2] - a[2]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmodel::tests::{floor_map, load, two_leaf_map};

    const PLAYER_MINS: Vec3 = [-16.0, -16.0, -24.0];
    const PLAYER_MAXS: Vec3 = [16.0, 16.0, 32.0];

    #[test]
    fn no_map_trace_passes_through() {
        let mut cm = CModelContext::new();
        let tr = cm.box_trace(&[0.0; 3], &[100.0, 0.0, 0.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, MASK_SOLID);
        assert_eq!(tr.fraction, 1.0);
        assert!(!tr.startsolid);
        assert_eq!(tr.endpos, [100.0, 0.0, 0.0]);
    }

    #[test]
    fn point_trace_stops_short_of_floor() {
        let mut cm = load(&floor_map());
        let tr = cm.box_trace(&[0.0, 0.0, 100.0], &[0.0, 0.0, -100.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, MASK_SOLID);
        assert!(!tr.startsolid);
        assert!((tr.fraction - (100.0 - DIST_EPSILON) / 200.0).abs() < 1e-5);
        assert!(tr.endpos[2] > 0.0 && tr.endpos[2] < 0.1);
        assert_eq!(tr.plane.normal, [0.0, 0.0, 1.0]);
        assert_eq!(tr.contents, CONTENTS_SOLID);
        assert!(tr.surface.is_some());
    }

    #[test]
    fn box_trace_rests_on_floor() {
        let mut cm = load(&floor_map());
        let tr = cm.box_trace(&[0.0, 0.0, 100.0], &[0.0, 0.0, 0.0], &PLAYER_MINS, &PLAYER_MAXS, 0, MASK_PLAYERSOLID);
        assert!(tr.fraction < 1.0);
        assert!((tr.endpos[2] - 24.0).abs() < 0.1);
        assert!(tr.endpos[2] >= 24.0);
    }

    #[test]
    fn mask_filters_brushes() {
        let mut cm = load(&floor_map());
        let tr = cm.box_trace(&[0.0, 0.0, 100.0], &[0.0, 0.0, -100.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, CONTENTS_WATER);
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn position_test_inside_floor_is_allsolid() {
        let mut cm = load(&floor_map());
        let p = [0.0, 0.0, -10.0];
        let tr = cm.box_trace(&p, &p, &PLAYER_MINS, &PLAYER_MAXS, 0, MASK_SOLID);
        assert!(tr.startsolid && tr.allsolid);
        assert_eq!(tr.fraction, 0.0);
        assert_eq!(tr.endpos, p);

        let p = [0.0, 0.0, 40.0];
        let tr = cm.box_trace(&p, &p, &PLAYER_MINS, &PLAYER_MAXS, 0, MASK_SOLID);
        assert!(!tr.startsolid);
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn trace_out_of_solid_is_startsolid_only() {
        let mut cm = load(&floor_map());
        let tr = cm.box_trace(&[0.0, 0.0, -10.0], &[0.0, 0.0, 50.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, MASK_SOLID);
        assert!(tr.startsolid);
        assert!(!tr.allsolid);
    }

    #[test]
    fn box_hull_blocks_traces() {
        let mut cm = load(&two_leaf_map());
        let head = cm.headnode_for_box(&[-8.0; 3], &[8.0; 3]);
        let tr = cm.transformed_box_trace(
            &[-100.0, 0.0, 0.0],
            &[100.0, 0.0, 0.0],
            &VEC3_ORIGIN,
            &VEC3_ORIGIN,
            head,
            MASK_SHOT,
            &[50.0, 0.0, 0.0],
            &VEC3_ORIGIN,
        );
        assert!(tr.fraction < 1.0);
        assert!((tr.endpos[0] - 42.0).abs() < 0.1);
        assert_eq!(tr.contents, CONTENTS_MONSTER);
        assert_eq!(tr.plane.normal, [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn rotated_model_plane_returns_to_world_space() {
        let mut cm = load(&floor_map());
        // a quarter turn about z leaves the floor normal pointing up
        let tr = cm.transformed_box_trace(
            &[0.0, 0.0, 100.0],
            &[0.0, 0.0, -100.0],
            &VEC3_ORIGIN,
            &VEC3_ORIGIN,
            0,
            MASK_SOLID,
            &VEC3_ORIGIN,
            &[0.0, 90.0, 0.0],
        );
        assert!(tr.fraction < 1.0);
        assert!((tr.plane.normal[2] - 1.0).abs() < 1e-4);
        assert!(tr.endpos[2] > 0.0 && tr.endpos[2] < 0.1);
    }

    #[test]
    fn checkcount_advances_per_trace() {
        let mut cm = load(&floor_map());
        let before = cm.checkcount;
        cm.box_trace(&[0.0; 3], &[1.0, 0.0, 0.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, MASK_SOLID);
        cm.box_trace(&[0.0; 3], &[1.0, 0.0, 0.0], &VEC3_ORIGIN, &VEC3_ORIGIN, 0, MASK_SOLID);
        assert_eq!(cm.checkcount, before + 2);
    }
}
