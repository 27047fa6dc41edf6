// sv_world.rs - entity area checking
//
// An axis aligned tree over the world bounds. Each entity is linked into
// the deepest node its absolute box does not straddle, so area queries
// only visit the nodes that can touch the query box.

use log::warn;

use q2sim_common::cmodel::CModelContext;
use q2sim_common::q_shared::*;
use q2sim_game::game::{AreaLink, AreaList, Solid, SVF_DEADMONSTER};
use q2sim_game::g_local::Edict;

pub const AREA_DEPTH: i32 = 4;
pub const AREA_NODES: usize = 32;

const MAX_TOTAL_ENT_LEAFS: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct AreaNode {
    /// -1 = leaf node
    pub axis: i32,
    pub dist: f32,
    pub children: [usize; 2],
    pub trigger_edicts: Vec<usize>,
    pub solid_edicts: Vec<usize>,
}

impl AreaNode {
    fn list(&self, list: AreaList) -> &Vec<usize> {
        match list {
            AreaList::Solid => &self.solid_edicts,
            AreaList::Triggers => &self.trigger_edicts,
        }
    }

    fn list_mut(&mut self, list: AreaList) -> &mut Vec<usize> {
        match list {
            AreaList::Solid => &mut self.solid_edicts,
            AreaList::Triggers => &mut self.trigger_edicts,
        }
    }
}

/// Everything a single sweep needs while it walks the entity lists.
struct MoveClip<'a> {
    boxmins: Vec3,
    boxmaxs: Vec3,
    mins: &'a Vec3,
    maxs: &'a Vec3,
    start: &'a Vec3,
    end: &'a Vec3,
    trace: Trace,
    passent: Option<usize>,
    contentmask: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SvWorld {
    areanodes: Vec<AreaNode>,
}

impl SvWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_areanodes(&self) -> usize {
        self.areanodes.len()
    }

    pub fn node(&self, i: usize) -> &AreaNode {
        &self.areanodes[i]
    }

    /// Builds a uniformly subdivided tree for the given world size.
    fn create_area_node(&mut self, depth: i32, mins: &Vec3, maxs: &Vec3) -> usize {
        let idx = self.areanodes.len();
        self.areanodes.push(AreaNode { axis: -1, ..AreaNode::default() });

        if depth == AREA_DEPTH {
            return idx;
        }

        let size = vector_subtract(maxs, mins);
        let axis = if size[0] > size[1] { 0 } else { 1 };
        let dist = 0.5 * (maxs[axis] + mins[axis]);

        let mut mins1 = *mins;
        let mut maxs1 = *maxs;
        let mut mins2 = *mins;
        let maxs2 = *maxs;
        maxs1[axis] = dist;
        mins2[axis] = dist;

        let c0 = self.create_area_node(depth + 1, &mins2, &maxs2);
        let c1 = self.create_area_node(depth + 1, &mins1, &maxs1);

        let node = &mut self.areanodes[idx];
        node.axis = axis as i32;
        node.dist = dist;
        node.children = [c0, c1];
        idx
    }

    /// Rebuilds the tree over the world model. Called after every map load;
    /// any links held by old entities become meaningless.
    pub fn clear_world(&mut self, cm: &CModelContext) {
        let (mins, maxs) = cm.model(0).map_or((VEC3_ORIGIN, VEC3_ORIGIN), |m| (m.mins, m.maxs));
        self.areanodes.clear();
        self.areanodes.reserve(AREA_NODES);
        self.create_area_node(0, &mins, &maxs);
    }

    pub fn unlink_edict(&mut self, edicts: &mut [Edict], ent: usize) {
        let Some(link) = edicts[ent].area.take() else {
            return; // not linked in anywhere
        };
        if let Some(node) = self.areanodes.get_mut(link.node) {
            node.list_mut(link.list).retain(|&e| e != ent);
        }
    }

    /// Needs to be called any time an entity changes origin, mins, maxs or
    /// solid. Sets the absolute box, the PVS clusters and the areas, and
    /// links the entity into the tree unless it is not solid.
    pub fn link_edict(&mut self, cm: &CModelContext, edicts: &mut [Edict], ent: usize) {
        if edicts[ent].area.is_some() {
            self.unlink_edict(edicts, ent); // unlink from old position
        }

        if ent == 0 {
            return; // don't add the world
        }

        let e = &mut edicts[ent];
        if !e.inuse {
            return;
        }

        // set the size
        e.size = vector_subtract(&e.maxs, &e.mins);

        // encode the size into the entity state for client prediction
        e.s.solid = match e.solid {
            Solid::Bbox if e.svflags & SVF_DEADMONSTER == 0 => {
                // assume that x/y are equal and symmetric
                let i = ((e.maxs[0] / 8.0) as i32).clamp(1, 31);
                // z is not symmetric
                let j = ((-e.mins[2] / 8.0) as i32).clamp(1, 31);
                // and z maxs can be negative
                let k = (((e.maxs[2] + 32.0) / 8.0) as i32).clamp(1, 63);
                (k << 10) | (j << 5) | i
            }
            Solid::Bsp => 31, // a solid_bbox will never create this value
            _ => 0,
        };

        // set the abs box
        if e.solid == Solid::Bsp && !vector_compare(&e.s.angles, &VEC3_ORIGIN) {
            // expand for rotation
            let mut max = 0.0f32;
            for i in 0..3 {
                max = max.max(e.mins[i].abs()).max(e.maxs[i].abs());
            }
            for i in 0..3 {
                e.absmin[i] = e.s.origin[i] - max;
                e.absmax[i] = e.s.origin[i] + max;
            }
        } else {
            // normal
            e.absmin = vector_add(&e.s.origin, &e.mins);
            e.absmax = vector_add(&e.s.origin, &e.maxs);
        }

        // because movement is clipped an epsilon away from an actual edge,
        // we must fully check even when bounding boxes don't quite touch
        for i in 0..3 {
            e.absmin[i] -= 1.0;
            e.absmax[i] += 1.0;
        }

        // link to PVS leafs
        e.num_clusters = 0;
        e.areanum = 0;
        e.areanum2 = 0;

        let (leafs, topnode) = cm.box_leafnums(&e.absmin, &e.absmax, MAX_TOTAL_ENT_LEAFS);
        let topnode = topnode.map_or(0, |n| n as i32);

        let mut clusters = Vec::with_capacity(leafs.len());
        for &leaf in &leafs {
            clusters.push(cm.leaf_cluster(leaf));
            let area = cm.leaf_area(leaf);
            if area != 0 {
                // doors may legally straggle two areas,
                // but nothing should ever need more than that
                if e.areanum != 0 && e.areanum != area {
                    if e.areanum2 != 0 && e.areanum2 != area {
                        warn!(
                            "Object touching 3 areas at {} {} {}",
                            e.absmin[0], e.absmin[1], e.absmin[2]
                        );
                    }
                    e.areanum2 = area;
                } else {
                    e.areanum = area;
                }
            }
        }

        if leafs.len() >= MAX_TOTAL_ENT_LEAFS {
            // assume we missed some leafs, and mark by headnode
            e.num_clusters = -1;
            e.headnode = topnode;
        } else {
            for (i, &cluster) in clusters.iter().enumerate() {
                if cluster == -1 {
                    continue; // not a visible leaf
                }
                if clusters[..i].contains(&cluster) {
                    continue;
                }
                if e.num_clusters as usize == MAX_ENT_CLUSTERS {
                    // assume we missed some leafs, and mark by headnode
                    e.num_clusters = -1;
                    e.headnode = topnode;
                    break;
                }
                e.clusternums[e.num_clusters as usize] = cluster;
                e.num_clusters += 1;
            }
        }

        // if first time, make sure old_origin is valid
        if e.linkcount == 0 {
            e.s.old_origin = e.s.origin;
        }
        e.linkcount += 1;

        if e.solid == Solid::Not {
            return;
        }

        // find the first node that the ent's box crosses
        let mut node = 0;
        loop {
            let n = &self.areanodes[node];
            if n.axis == -1 {
                break;
            }
            let axis = n.axis as usize;
            if e.absmin[axis] > n.dist {
                node = n.children[0];
            } else if e.absmax[axis] < n.dist {
                node = n.children[1];
            } else {
                break; // crosses the node
            }
        }

        // link it in
        let list = if e.solid == Solid::Trigger { AreaList::Triggers } else { AreaList::Solid };
        self.areanodes[node].list_mut(list).push(ent);
        e.area = Some(AreaLink { node, list });
    }

    fn area_edicts_r(
        &self,
        node: usize,
        edicts: &[Edict],
        mins: &Vec3,
        maxs: &Vec3,
        maxcount: usize,
        areatype: AreaList,
        out: &mut Vec<usize>,
    ) {
        let n = &self.areanodes[node];

        // touch linked edicts
        for &idx in n.list(areatype) {
            let check = &edicts[idx];
            if check.solid == Solid::Not {
                continue; // deactivated
            }
            if check.absmin[0] > maxs[0]
                || check.absmin[1] > maxs[1]
                || check.absmin[2] > maxs[2]
                || check.absmax[0] < mins[0]
                || check.absmax[1] < mins[1]
                || check.absmax[2] < mins[2]
            {
                continue; // not touching
            }
            if out.len() == maxcount {
                warn!("SV_AreaEdicts: MAXCOUNT");
                return;
            }
            out.push(idx);
        }

        if n.axis == -1 {
            return; // terminal node
        }

        // recurse down both sides
        let axis = n.axis as usize;
        if maxs[axis] > n.dist {
            self.area_edicts_r(n.children[0], edicts, mins, maxs, maxcount, areatype, out);
        }
        if mins[axis] < n.dist {
            self.area_edicts_r(n.children[1], edicts, mins, maxs, maxcount, areatype, out);
        }
    }

    /// Entities in one list whose absolute boxes touch `mins`/`maxs`, at
    /// most `maxcount` of them. The result is a snapshot; callers that
    /// free entities while walking it must check `inuse`.
    pub fn area_edicts(&self, edicts: &[Edict], mins: &Vec3, maxs: &Vec3, maxcount: usize, areatype: AreaList) -> Vec<usize> {
        let mut out = Vec::new();
        if self.areanodes.is_empty() {
            return out;
        }
        self.area_edicts_r(0, edicts, mins, maxs, maxcount, areatype, &mut out);
        out
    }

    /// Returns a headnode that can be used for testing or clipping
    /// against the entity: its inline model for bsp entities, otherwise
    /// the shared box hull sized to its bounds.
    pub fn hull_for_entity(cm: &mut CModelContext, ent: &Edict) -> i32 {
        // decide which clipping hull to use, based on the size
        if ent.solid == Solid::Bsp {
            // explicit hulls in the BSP model
            let model = usize::try_from(ent.s.modelindex - 1).ok().and_then(|i| cm.model(i));
            let Some(model) = model else {
                panic!("MOVETYPE_PUSH with a non bsp model");
            };
            return model.headnode;
        }

        // create a temp hull from bounding box sizes
        cm.headnode_for_box(&ent.mins, &ent.maxs)
    }

    /// Contents of the world at `p`, ORed with every solid entity whose
    /// hull contains it.
    pub fn point_contents(&self, cm: &mut CModelContext, edicts: &[Edict], p: &Vec3) -> i32 {
        // get base contents from world
        let world = cm.model(0).map_or(0, |m| m.headnode);
        let mut contents = cm.point_contents(p, world);

        // or in contents from all the other entities
        let touch = self.area_edicts(edicts, p, p, MAX_EDICTS, AreaList::Solid);
        for idx in touch {
            let hit = &edicts[idx];

            // might intersect, so do an exact clip
            let headnode = Self::hull_for_entity(cm, hit);
            let angles = if hit.solid != Solid::Bsp {
                VEC3_ORIGIN // boxes don't rotate
            } else {
                hit.s.angles
            };
            contents |= cm.transformed_point_contents(p, headnode, &hit.s.origin, &angles);
        }

        contents
    }

    fn clip_move_to_entities(&self, cm: &mut CModelContext, edicts: &[Edict], clip: &mut MoveClip) {
        let touchlist = self.area_edicts(edicts, &clip.boxmins, &clip.boxmaxs, MAX_EDICTS, AreaList::Solid);

        // be careful, it is possible to have an entity in this
        // list removed before we get to it (killtriggered)
        for idx in touchlist {
            let touch = &edicts[idx];
            if touch.solid == Solid::Not {
                continue;
            }
            if Some(idx) == clip.passent {
                continue;
            }
            if clip.trace.allsolid {
                return;
            }
            if let Some(pass) = clip.passent {
                if touch.owner == Some(pass) {
                    continue; // don't clip against own missiles
                }
                if edicts[pass].owner == Some(idx) {
                    continue; // don't clip against owner
                }
            }

            if clip.contentmask & CONTENTS_DEADMONSTER == 0 && touch.svflags & SVF_DEADMONSTER != 0 {
                continue;
            }

            // might intersect, so do an exact clip
            let headnode = Self::hull_for_entity(cm, touch);
            let angles = if touch.solid != Solid::Bsp {
                VEC3_ORIGIN // boxes don't rotate
            } else {
                touch.s.angles
            };

            let mut trace = cm.transformed_box_trace(
                clip.start,
                clip.end,
                clip.mins,
                clip.maxs,
                headnode,
                clip.contentmask,
                &touch.s.origin,
                &angles,
            );

            if trace.allsolid || trace.startsolid || trace.fraction < clip.trace.fraction {
                trace.ent = Some(idx);
                if clip.trace.startsolid {
                    clip.trace = trace;
                    clip.trace.startsolid = true;
                } else {
                    clip.trace = trace;
                }
            } else if trace.startsolid {
                clip.trace.startsolid = true;
            }
        }
    }

    /// Moves the given mins/maxs volume through the world from start to
    /// end. `passent` and the entities it owns or is owned by are not
    /// checked.
    #[allow(clippy::too_many_arguments)]
    pub fn trace(
        &self,
        cm: &mut CModelContext,
        edicts: &[Edict],
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        passent: Option<usize>,
        contentmask: i32,
    ) -> Trace {
        // clip to world
        let mut trace = cm.box_trace(start, end, mins, maxs, 0, contentmask);
        trace.ent = Some(0);
        if trace.fraction == 0.0 {
            return trace; // blocked by the world
        }

        let mut clip = MoveClip {
            boxmins: VEC3_ORIGIN,
            boxmaxs: VEC3_ORIGIN,
            mins,
            maxs,
            start,
            end,
            trace,
            passent,
            contentmask,
        };

        // create the bounding box of the entire move
        for i in 0..3 {
            if end[i] > start[i] {
                clip.boxmins[i] = start[i] + mins[i] - 1.0;
                clip.boxmaxs[i] = end[i] + maxs[i] + 1.0;
            } else {
                clip.boxmins[i] = end[i] + mins[i] - 1.0;
                clip.boxmaxs[i] = start[i] + maxs[i] + 1.0;
            }
        }

        // clip to other solid entities
        self.clip_move_to_entities(cm, edicts, &mut clip);

        clip.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{floor_and_pillar, PILLAR_ORIGIN};

    const PLAYER_MINS: Vec3 = [-16.0, -16.0, -24.0];
    const PLAYER_MAXS: Vec3 = [16.0, 16.0, 32.0];

    fn setup() -> (CModelContext, SvWorld, Vec<Edict>) {
        let mut cm = CModelContext::new();
        cm.load_map("maps/test.bsp", false, Some(&floor_and_pillar())).unwrap();
        let mut world = SvWorld::new();
        world.clear_world(&cm);
        let mut edicts = vec![Edict::default(); 8];
        for (i, e) in edicts.iter_mut().enumerate() {
            e.s.number = i;
        }
        edicts[0].inuse = true;
        edicts[0].solid = Solid::Bsp;
        edicts[0].s.modelindex = 1;
        (cm, world, edicts)
    }

    fn place(edicts: &mut [Edict], idx: usize, origin: Vec3, mins: Vec3, maxs: Vec3, solid: Solid) {
        let e = &mut edicts[idx];
        e.inuse = true;
        e.s.origin = origin;
        e.mins = mins;
        e.maxs = maxs;
        e.solid = solid;
    }

    fn place_pillar(cm: &CModelContext, edicts: &mut [Edict], idx: usize) {
        let m = *cm.model(1).unwrap();
        place(edicts, idx, PILLAR_ORIGIN, m.mins, m.maxs, Solid::Bsp);
        edicts[idx].s.modelindex = 2;
    }

    fn links(world: &SvWorld, ent: usize) -> usize {
        (0..world.num_areanodes())
            .map(|i| {
                let n = world.node(i);
                n.solid_edicts.iter().chain(&n.trigger_edicts).filter(|&&e| e == ent).count()
            })
            .sum()
    }

    #[test]
    fn clear_world_builds_full_tree() {
        let (_, world, _) = setup();
        assert_eq!(world.num_areanodes(), 31);
        let root = world.node(0);
        // square world, so the first split is on y through the middle
        assert_eq!(root.axis, 1);
        assert_eq!(root.dist, 0.0);
        assert_eq!(root.children, [1, 16]);
        assert_eq!(world.node(30).axis, -1);
    }

    #[test]
    fn link_sets_bounds_and_packed_solid() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 100.0], PLAYER_MINS, PLAYER_MAXS, Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);

        let e = &edicts[1];
        assert_eq!(e.size, [32.0, 32.0, 56.0]);
        assert_eq!(e.absmin, [-17.0, -17.0, 75.0]);
        assert_eq!(e.absmax, [17.0, 17.0, 133.0]);
        assert_eq!(e.s.solid, (8 << 10) | (3 << 5) | 2);
        assert_eq!(e.linkcount, 1);
        assert_eq!(e.s.old_origin, [0.0, 0.0, 100.0]);
        assert_eq!(e.areanum, 1);
        assert_eq!(e.areanum2, 0);
        assert_eq!(e.num_clusters, 1);
        assert_eq!(e.clusternums[0], 0);
        // straddles the root split
        assert_eq!(e.area, Some(AreaLink { node: 0, list: AreaList::Solid }));
    }

    #[test]
    fn old_origin_is_only_seeded_on_first_link() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 100.0], PLAYER_MINS, PLAYER_MAXS, Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);
        edicts[1].s.origin = [50.0, 0.0, 100.0];
        world.link_edict(&cm, &mut edicts, 1);
        assert_eq!(edicts[1].s.old_origin, [0.0, 0.0, 100.0]);
        assert_eq!(edicts[1].linkcount, 2);
    }

    #[test]
    fn small_entity_sinks_into_the_tree() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [500.0, 500.0, 100.0], [-4.0; 3], [4.0; 3], Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);
        let link = edicts[1].area.unwrap();
        assert_ne!(link.node, 0);

        let near = world.area_edicts(&edicts, &[490.0, 490.0, 90.0], &[510.0, 510.0, 110.0], 16, AreaList::Solid);
        assert_eq!(near, vec![1]);
        let far = world.area_edicts(&edicts, &[-510.0, -510.0, 90.0], &[-490.0, -490.0, 110.0], 16, AreaList::Solid);
        assert!(far.is_empty());
    }

    #[test]
    fn relink_keeps_a_single_link() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 100.0], [-4.0; 3], [4.0; 3], Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);
        edicts[1].s.origin = [-600.0, 300.0, 100.0];
        world.link_edict(&cm, &mut edicts, 1);
        assert_eq!(links(&world, 1), 1);

        world.unlink_edict(&mut edicts, 1);
        assert_eq!(edicts[1].area, None);
        assert_eq!(links(&world, 1), 0);
        // unlinking twice is harmless
        world.unlink_edict(&mut edicts, 1);
    }

    #[test]
    fn triggers_use_their_own_list() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 100.0], [-8.0; 3], [8.0; 3], Solid::Trigger);
        world.link_edict(&cm, &mut edicts, 1);
        let (mins, maxs) = ([-32.0, -32.0, 64.0], [32.0, 32.0, 128.0]);
        assert!(world.area_edicts(&edicts, &mins, &maxs, 16, AreaList::Solid).is_empty());
        assert_eq!(world.area_edicts(&edicts, &mins, &maxs, 16, AreaList::Triggers), vec![1]);
        assert_eq!(edicts[1].s.solid, 0);
    }

    #[test]
    fn non_solid_and_world_are_not_linked() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 100.0], [-8.0; 3], [8.0; 3], Solid::Not);
        world.link_edict(&cm, &mut edicts, 1);
        assert_eq!(edicts[1].area, None);
        assert_eq!(edicts[1].linkcount, 1);
        assert_eq!(edicts[1].absmin, [-9.0, -9.0, 91.0]);

        world.link_edict(&cm, &mut edicts, 0);
        assert_eq!(edicts[0].area, None);
        assert_eq!(edicts[0].linkcount, 0);

        // free slots are ignored entirely
        world.link_edict(&cm, &mut edicts, 2);
        assert_eq!(edicts[2].linkcount, 0);
    }

    #[test]
    fn area_edicts_stops_at_maxcount() {
        let (cm, mut world, mut edicts) = setup();
        for i in 1..4 {
            place(&mut edicts, i, [0.0, 0.0, 100.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
            world.link_edict(&cm, &mut edicts, i);
        }
        let found = world.area_edicts(&edicts, &[-1.0, -1.0, 99.0], &[1.0, 1.0, 101.0], 2, AreaList::Solid);
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn rotated_bmodel_is_expanded() {
        let (cm, mut world, mut edicts) = setup();
        place_pillar(&cm, &mut edicts, 1);
        edicts[1].s.angles = [0.0, 45.0, 0.0];
        world.link_edict(&cm, &mut edicts, 1);
        // model bounds are spread by a unit on load, so the radius is 65
        let e = &edicts[1];
        assert_eq!(e.s.solid, 31);
        assert_eq!(e.absmin, [128.0 - 66.0, -66.0, -66.0]);
        assert_eq!(e.absmax, [128.0 + 66.0, 66.0, 66.0]);
    }

    #[test]
    fn entity_in_two_leafs_records_its_area_once() {
        let (cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 0.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);
        // the floor leaf is in area 0 and has no cluster
        assert_eq!(edicts[1].areanum, 1);
        assert_eq!(edicts[1].areanum2, 0);
        assert_eq!(edicts[1].num_clusters, 1);
    }

    #[test]
    fn trace_lands_on_the_world() {
        let (mut cm, world, edicts) = setup();
        let tr = world.trace(&mut cm, &edicts, &[0.0, 0.0, 100.0], &PLAYER_MINS, &PLAYER_MAXS, &[0.0, 0.0, -100.0], None, MASK_PLAYERSOLID);
        assert!(tr.fraction < 1.0);
        assert!((tr.endpos[2] - 24.0).abs() < 0.1);
        assert_eq!(tr.ent, Some(0));
        assert_eq!(tr.plane.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn trace_hits_box_entities() {
        let (mut cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);

        let (start, end) = ([-100.0, 0.0, 50.0], [100.0, 0.0, 50.0]);
        let tr = world.trace(&mut cm, &edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, None, MASK_PLAYERSOLID);
        assert_eq!(tr.ent, Some(1));
        assert!((tr.endpos[0] + 8.0).abs() < 0.1);
        assert_eq!(tr.contents, CONTENTS_MONSTER);

        // masks without monster contents pass straight through
        let tr = world.trace(&mut cm, &edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, None, MASK_SOLID);
        assert_eq!(tr.fraction, 1.0);
        assert_eq!(tr.endpos, end);
    }

    #[test]
    fn trace_skips_passent_and_ownership() {
        let (mut cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        place(&mut edicts, 2, [40.0, 0.0, 50.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        edicts[2].owner = Some(1);
        world.link_edict(&cm, &mut edicts, 1);
        world.link_edict(&cm, &mut edicts, 2);

        let (start, end) = ([-100.0, 0.0, 50.0], [100.0, 0.0, 50.0]);
        let mut trace = |edicts: &[Edict], passent| {
            world.trace(&mut cm, edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, passent, MASK_PLAYERSOLID)
        };

        assert_eq!(trace(&edicts, None).ent, Some(1));
        // the owner never hits its own missile, and the missile never hits its owner
        assert_eq!(trace(&edicts, Some(1)).fraction, 1.0);
        assert_eq!(trace(&edicts, Some(2)).fraction, 1.0);
        // an unrelated passent still hits both in order
        assert_eq!(trace(&edicts, Some(3)).ent, Some(1));
    }

    #[test]
    fn dead_monsters_need_their_own_mask() {
        let (mut cm, mut world, mut edicts) = setup();
        place(&mut edicts, 1, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        edicts[1].svflags = SVF_DEADMONSTER;
        world.link_edict(&cm, &mut edicts, 1);

        let (start, end) = ([-100.0, 0.0, 50.0], [100.0, 0.0, 50.0]);
        let tr = world.trace(&mut cm, &edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, None, MASK_PLAYERSOLID);
        assert_eq!(tr.fraction, 1.0);
        let mask = MASK_PLAYERSOLID | CONTENTS_DEADMONSTER;
        let tr = world.trace(&mut cm, &edicts, &start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, None, mask);
        assert_eq!(tr.ent, Some(1));
    }

    #[test]
    fn trace_clips_against_inline_models() {
        let (mut cm, mut world, mut edicts) = setup();
        place_pillar(&cm, &mut edicts, 1);
        world.link_edict(&cm, &mut edicts, 1);

        let tr = world.trace(&mut cm, &edicts, &[0.0, 0.0, 32.0], &VEC3_ORIGIN, &VEC3_ORIGIN, &[256.0, 0.0, 32.0], None, MASK_SOLID);
        assert_eq!(tr.ent, Some(1));
        assert!((tr.endpos[0] - 112.0).abs() < 0.1);
        assert_eq!(tr.plane.normal, [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn starting_inside_the_world_stops_at_once() {
        let (mut cm, world, edicts) = setup();
        let tr = world.trace(&mut cm, &edicts, &[0.0, 0.0, -10.0], &VEC3_ORIGIN, &VEC3_ORIGIN, &[0.0, 0.0, -20.0], None, MASK_SOLID);
        assert!(tr.startsolid);
        assert!(tr.allsolid);
        assert_eq!(tr.fraction, 0.0);
        assert_eq!(tr.ent, Some(0));
    }

    #[test]
    fn point_contents_merges_entities() {
        let (mut cm, mut world, mut edicts) = setup();
        place_pillar(&cm, &mut edicts, 1);
        place(&mut edicts, 2, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        world.link_edict(&cm, &mut edicts, 1);
        world.link_edict(&cm, &mut edicts, 2);

        assert_eq!(world.point_contents(&mut cm, &edicts, &[0.0, 0.0, -10.0]), CONTENTS_SOLID);
        assert_eq!(world.point_contents(&mut cm, &edicts, &[300.0, 0.0, 10.0]), 0);
        assert_eq!(world.point_contents(&mut cm, &edicts, &[128.0, 0.0, 32.0]), CONTENTS_SOLID);
        assert_eq!(world.point_contents(&mut cm, &edicts, &[0.0, 0.0, 50.0]), CONTENTS_MONSTER);
    }

    #[test]
    #[should_panic(expected = "non bsp model")]
    fn bsp_entity_without_model_is_fatal() {
        let (mut cm, _, mut edicts) = setup();
        place(&mut edicts, 1, VEC3_ORIGIN, [-8.0; 3], [8.0; 3], Solid::Bsp);
        SvWorld::hull_for_entity(&mut cm, &edicts[1]);
    }
}
