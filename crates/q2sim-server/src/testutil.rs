// testutil.rs - a small synthetic map for server tests
//
// A solid floor slab with its top at z = 0, open space above it in area 1,
// and one inline model: a 32x32x64 pillar whose model origin is x = 128.

use q2sim_common::q_shared::*;
use q2sim_common::qfiles::*;

pub const PILLAR_ORIGIN: Vec3 = [128.0, 0.0, 0.0];

fn box_brush(b: &mut BspBuilder, mins: Vec3, maxs: Vec3) {
    let firstside = b.brushsides.len() as i32;
    for axis in 0..3 {
        let mut n = [0.0f32; 3];
        n[axis] = 1.0;
        b.planes.push(DPlane { normal: n, dist: maxs[axis], plane_type: axis as i32 });
        b.brushsides.push(DBrushSide { planenum: (b.planes.len() - 1) as u16, texinfo: 0 });
        n[axis] = -1.0;
        b.planes.push(DPlane { normal: n, dist: -mins[axis], plane_type: axis as i32 });
        b.brushsides.push(DBrushSide { planenum: (b.planes.len() - 1) as u16, texinfo: 0 });
    }
    b.brushes.push(DBrush { firstside, numsides: 6, contents: CONTENTS_SOLID });
}

fn leaf(contents: i32, cluster: i16, area: i16) -> DLeaf {
    DLeaf { contents, cluster, area, ..Default::default() }
}

pub fn floor_and_pillar() -> Vec<u8> {
    let mut b = BspBuilder::new();
    b.entities = "{\n\"classname\" \"worldspawn\"\n}\n".to_string();
    b.texinfo.push(DTexInfo::default());
    b.planes.push(DPlane { normal: [0.0, 0.0, 1.0], dist: 0.0, plane_type: 2 });
    box_brush(&mut b, [-1024.0, -1024.0, -64.0], [1024.0, 1024.0, 0.0]);
    box_brush(&mut b, [-16.0, -16.0, 0.0], [16.0, 16.0, 64.0]);

    // world
    b.nodes.push(DNode { planenum: 0, children: [-2, -3], ..Default::default() });
    // pillar
    b.nodes.push(DNode { planenum: 0, children: [-4, -5], ..Default::default() });

    b.leafs.push(leaf(CONTENTS_SOLID, -1, 0));
    b.leafs.push(leaf(0, 0, 1));
    b.leafs.push(DLeaf { firstleafbrush: 0, numleafbrushes: 1, ..leaf(CONTENTS_SOLID, -1, 0) });
    b.leafs.push(DLeaf { firstleafbrush: 1, numleafbrushes: 1, ..leaf(CONTENTS_SOLID, -1, 0) });
    b.leafs.push(leaf(0, -1, 0));
    b.leafbrushes = vec![0, 1];

    b.models.push(DModel {
        mins: [-1024.0, -1024.0, -64.0],
        maxs: [1024.0, 1024.0, 1024.0],
        headnode: 0,
        ..Default::default()
    });
    b.models.push(DModel {
        mins: [-16.0, -16.0, 0.0],
        maxs: [16.0, 16.0, 64.0],
        origin: PILLAR_ORIGIN,
        headnode: 1,
        ..Default::default()
    });
    b.areas.push(DArea::default());
    b.areas.push(DArea::default());
    b.to_bytes()
}
