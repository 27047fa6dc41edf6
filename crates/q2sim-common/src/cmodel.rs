// cmodel.rs - BSP collision model: map loading, point and box queries,
// area connectivity and visibility rows.
//
// Box and point sweeps live in `cm_trace`.

use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::common::{ComError, ComResult};
use crate::md4::block_checksum;
use crate::q_shared::*;
use crate::qfiles::*;

/// Lumps with more records than this are decoded on the rayon pool.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

/// Reasons a map can be rejected at load time. Each message names the lump
/// that failed.
#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error("Couldn't load {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CMod_LoadBrushModel: {name} is not an IBSP file")]
    BadMagic { name: String },
    #[error("CMod_LoadBrushModel: {name} has wrong version number ({found} should be {expected})", expected = BSPVERSION)]
    BadVersion { name: String, found: i32 },
    #[error("CMod_Load{lump}: lump extends past end of file")]
    LumpBounds { lump: &'static str },
    #[error("CMod_Load{lump}: funny lump size ({len} is not a multiple of {stride})")]
    LumpSize {
        lump: &'static str,
        len: usize,
        stride: usize,
    },
    #[error("CMod_Load{lump}: Map has too many {lump} ({count} > {max})")]
    TooMany {
        lump: &'static str,
        count: usize,
        max: usize,
    },
    #[error("CMod_Load{lump}: Map with no {lump}")]
    TooFew { lump: &'static str },
    #[error("CMod_Load{lump}: bad {what} index {index}")]
    BadIndex {
        lump: &'static str,
        what: &'static str,
        index: i64,
    },
    #[error("Map leaf 0 is not CONTENTS_SOLID")]
    BadLeafZero,
    #[error("Map does not have an empty leaf")]
    NoEmptyLeaf,
    #[error("Not enough room for box tree")]
    NoRoomForBoxTree,
}

// ============================================================
// In-memory map
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct CNode {
    pub plane: usize,
    /// negative numbers are leafs
    pub children: [i32; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CBrushSide {
    pub plane: usize,
    pub surface: Option<CSurface>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CLeaf {
    pub contents: i32,
    pub cluster: i32,
    pub area: i32,
    pub firstleafbrush: usize,
    pub numleafbrushes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CBrush {
    pub contents: i32,
    pub numsides: usize,
    pub firstbrushside: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CArea {
    pub numareaportals: usize,
    pub firstareaportal: usize,
    pub floodnum: i32,
    pub floodvalid: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MapSurface {
    pub c: CSurface,
    pub rname: String,
}

/// Everything decoded from a BSP file plus the synthesized box hull. Built
/// off to the side during a load and swapped in only when complete.
#[derive(Debug, Clone, Default)]
pub(crate) struct MapData {
    pub planes: Vec<CPlane>,
    pub nodes: Vec<CNode>,
    pub leafs: Vec<CLeaf>,
    pub leafbrushes: Vec<usize>,
    pub brushes: Vec<CBrush>,
    pub brushsides: Vec<CBrushSide>,
    pub surfaces: Vec<MapSurface>,
    pub models: Vec<CModel>,
    pub areas: Vec<CArea>,
    pub areaportals: Vec<DAreaPortal>,
    /// raw visibility lump; offsets in `vis_ofs` are relative to its start
    pub visibility: Vec<u8>,
    pub vis_ofs: Vec<[usize; 2]>,
    pub entity_string: String,

    // counts that exclude the box hull
    pub numplanes: usize,
    pub numnodes: usize,
    pub numleafs: usize,
    pub numbrushes: usize,
    pub numclusters: usize,

    pub emptyleaf: usize,
    pub box_headnode: i32,
    pub box_planes: usize,
}

pub struct CModelContext {
    pub(crate) map: MapData,
    pub(crate) brush_checkcount: Vec<u32>,
    pub(crate) checkcount: u32,

    name: String,
    checksum: u32,

    floodvalid: i32,
    portalopen: Vec<bool>,

    pvsrow: Vec<u8>,
    phsrow: Vec<u8>,

    /// every area is considered connected to every other
    pub map_noareas: bool,
    /// reload from disk even when the same map name is requested
    pub flushmap: bool,
}

impl Default for CModelContext {
    fn default() -> Self {
        Self::new()
    }
}

fn lump_slice<'a>(buf: &'a [u8], l: &Lump, lump: &'static str) -> Result<&'a [u8], MapLoadError> {
    let ofs = usize::try_from(l.fileofs).map_err(|_| MapLoadError::LumpBounds { lump })?;
    let len = usize::try_from(l.filelen).map_err(|_| MapLoadError::LumpBounds { lump })?;
    buf.get(ofs..ofs.saturating_add(len))
        .ok_or(MapLoadError::LumpBounds { lump })
}

fn parse_records<T: Send>(
    data: &[u8],
    lump: &'static str,
    stride: usize,
    max: usize,
    read: fn(&[u8]) -> T,
) -> Result<Vec<T>, MapLoadError> {
    if data.len() % stride != 0 {
        return Err(MapLoadError::LumpSize { lump, len: data.len(), stride });
    }
    let count = data.len() / stride;
    if count > max {
        return Err(MapLoadError::TooMany { lump, count, max });
    }
    Ok(if count > PARALLEL_LUMP_THRESHOLD {
        data.par_chunks_exact(stride).map(read).collect()
    } else {
        data.chunks_exact(stride).map(read).collect()
    })
}

fn bad_index(lump: &'static str, what: &'static str, index: impl Into<i64>) -> MapLoadError {
    MapLoadError::BadIndex { lump, what, index: index.into() }
}

impl MapData {
    fn parse(buf: &[u8], name: &str) -> Result<MapData, MapLoadError> {
        let header = DHeader::parse(buf).ok_or_else(|| MapLoadError::BadMagic { name: name.to_string() })?;
        if header.ident != IDBSPHEADER {
            return Err(MapLoadError::BadMagic { name: name.to_string() });
        }
        if header.version != BSPVERSION {
            return Err(MapLoadError::BadVersion { name: name.to_string(), found: header.version });
        }
        let lumps = &header.lumps;
        let mut map = MapData::default();

        // surfaces
        let data = lump_slice(buf, &lumps[LUMP_TEXINFO], "Surfaces")?;
        let texinfo = parse_records(data, "Surfaces", DTexInfo::SIZE, MAX_MAP_TEXINFO, DTexInfo::read)?;
        if texinfo.is_empty() {
            return Err(MapLoadError::TooFew { lump: "Surfaces" });
        }
        map.surfaces = texinfo
            .iter()
            .map(|t| {
                let mut c = CSurface { flags: t.flags, value: t.value, ..Default::default() };
                c.name.copy_from_slice(&t.texture[..16]);
                let end = t.texture.iter().position(|&b| b == 0).unwrap_or(t.texture.len());
                MapSurface { c, rname: String::from_utf8_lossy(&t.texture[..end]).into_owned() }
            })
            .collect();

        // leafs
        let data = lump_slice(buf, &lumps[LUMP_LEAFS], "Leafs")?;
        let dleafs = parse_records(data, "Leafs", DLeaf::SIZE, MAX_MAP_LEAFS, DLeaf::read)?;
        if dleafs.is_empty() {
            return Err(MapLoadError::TooFew { lump: "Leafs" });
        }
        map.leafs = dleafs
            .iter()
            .map(|l| CLeaf {
                contents: l.contents,
                cluster: l.cluster as i32,
                area: l.area as i32,
                firstleafbrush: l.firstleafbrush as usize,
                numleafbrushes: l.numleafbrushes as usize,
            })
            .collect();
        map.numleafs = map.leafs.len();
        map.numclusters = map
            .leafs
            .iter()
            .map(|l| (l.cluster + 1).max(0) as usize)
            .max()
            .unwrap_or(0);
        if map.leafs[0].contents != CONTENTS_SOLID {
            return Err(MapLoadError::BadLeafZero);
        }
        map.emptyleaf = map
            .leafs
            .iter()
            .skip(1)
            .position(|l| l.contents == 0)
            .map(|i| i + 1)
            .ok_or(MapLoadError::NoEmptyLeaf)?;

        // leafbrushes
        let data = lump_slice(buf, &lumps[LUMP_LEAFBRUSHES], "LeafBrushes")?;
        map.leafbrushes = parse_records(data, "LeafBrushes", 2, MAX_MAP_LEAFBRUSHES, |b| le_u16(b, 0) as usize)?;

        // planes
        let data = lump_slice(buf, &lumps[LUMP_PLANES], "Planes")?;
        let dplanes = parse_records(data, "Planes", DPlane::SIZE, MAX_MAP_PLANES, DPlane::read)?;
        if dplanes.is_empty() {
            return Err(MapLoadError::TooFew { lump: "Planes" });
        }
        map.planes = dplanes
            .iter()
            .map(|p| {
                let mut plane = CPlane::new(p.normal, p.dist);
                plane.plane_type = p.plane_type as u8;
                plane
            })
            .collect();
        map.numplanes = map.planes.len();

        // brushes
        let data = lump_slice(buf, &lumps[LUMP_BRUSHES], "Brushes")?;
        let dbrushes = parse_records(data, "Brushes", DBrush::SIZE, MAX_MAP_BRUSHES, DBrush::read)?;
        map.brushes = dbrushes
            .iter()
            .map(|b| CBrush {
                contents: b.contents,
                numsides: b.numsides.max(0) as usize,
                firstbrushside: b.firstside.max(0) as usize,
            })
            .collect();
        map.numbrushes = map.brushes.len();

        // brushsides
        let data = lump_slice(buf, &lumps[LUMP_BRUSHSIDES], "BrushSides")?;
        let dsides = parse_records(data, "BrushSides", DBrushSide::SIZE, MAX_MAP_BRUSHSIDES, DBrushSide::read)?;
        map.brushsides = dsides
            .iter()
            .map(|s| {
                let plane = s.planenum as usize;
                if plane >= map.numplanes {
                    return Err(bad_index("BrushSides", "plane", s.planenum));
                }
                if s.texinfo as usize >= map.surfaces.len() && s.texinfo >= 0 {
                    return Err(bad_index("BrushSides", "texinfo", s.texinfo));
                }
                let surface = (s.texinfo >= 0).then(|| map.surfaces[s.texinfo as usize].c);
                Ok(CBrushSide { plane, surface })
            })
            .collect::<Result<_, _>>()?;

        // submodels
        let data = lump_slice(buf, &lumps[LUMP_MODELS], "Submodels")?;
        let dmodels = parse_records(data, "Submodels", DModel::SIZE, MAX_MAP_MODELS, DModel::read)?;
        if dmodels.is_empty() {
            return Err(MapLoadError::TooFew { lump: "Submodels" });
        }
        map.models = dmodels
            .iter()
            .map(|m| CModel {
                // spread the mins / maxs by a unit
                mins: [m.mins[0] - 1.0, m.mins[1] - 1.0, m.mins[2] - 1.0],
                maxs: [m.maxs[0] + 1.0, m.maxs[1] + 1.0, m.maxs[2] + 1.0],
                origin: m.origin,
                headnode: m.headnode,
            })
            .collect();

        // nodes
        let data = lump_slice(buf, &lumps[LUMP_NODES], "Nodes")?;
        let dnodes = parse_records(data, "Nodes", DNode::SIZE, MAX_MAP_NODES, DNode::read)?;
        if dnodes.is_empty() {
            return Err(MapLoadError::TooFew { lump: "Nodes" });
        }
        map.nodes = dnodes
            .iter()
            .map(|n| CNode { plane: n.planenum.max(0) as usize, children: n.children })
            .collect();
        map.numnodes = map.nodes.len();

        // areas
        let data = lump_slice(buf, &lumps[LUMP_AREAS], "Areas")?;
        let dareas = parse_records(data, "Areas", DArea::SIZE, MAX_MAP_AREAS, DArea::read)?;
        map.areas = dareas
            .iter()
            .map(|a| CArea {
                numareaportals: a.numareaportals.max(0) as usize,
                firstareaportal: a.firstareaportal.max(0) as usize,
                floodnum: 0,
                floodvalid: 0,
            })
            .collect();

        // areaportals
        let data = lump_slice(buf, &lumps[LUMP_AREAPORTALS], "AreaPortals")?;
        map.areaportals =
            parse_records(data, "AreaPortals", DAreaPortal::SIZE, MAX_MAP_AREAPORTALS, DAreaPortal::read)?;

        // visibility
        let data = lump_slice(buf, &lumps[LUMP_VISIBILITY], "Visibility")?;
        if data.len() > MAX_MAP_VISIBILITY {
            return Err(MapLoadError::TooMany {
                lump: "Visibility",
                count: data.len(),
                max: MAX_MAP_VISIBILITY,
            });
        }
        if !data.is_empty() {
            if data.len() < 4 {
                return Err(MapLoadError::LumpBounds { lump: "Visibility" });
            }
            let numclusters = le_i32(data, 0).max(0) as usize;
            if 4 + numclusters * 8 > data.len() {
                return Err(MapLoadError::LumpBounds { lump: "Visibility" });
            }
            map.vis_ofs = (0..numclusters)
                .map(|i| {
                    [
                        le_i32(data, 4 + i * 8).max(0) as usize,
                        le_i32(data, 8 + i * 8).max(0) as usize,
                    ]
                })
                .collect();
            map.visibility = data.to_vec();
        }

        // entity string
        let data = lump_slice(buf, &lumps[LUMP_ENTITIES], "EntityString")?;
        if data.len() > MAX_MAP_ENTSTRING {
            return Err(MapLoadError::TooMany {
                lump: "EntityString",
                count: data.len(),
                max: MAX_MAP_ENTSTRING,
            });
        }
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        map.entity_string = String::from_utf8_lossy(&data[..end]).into_owned();

        map.validate()?;
        map.init_box_hull()?;
        Ok(map)
    }

    /// Cross-lump references are checked once everything is decoded, so
    /// queries can index without bounds failures.
    fn validate(&self) -> Result<(), MapLoadError> {
        for n in &self.nodes {
            if n.plane >= self.numplanes {
                return Err(bad_index("Nodes", "plane", n.plane as i64));
            }
            for &c in &n.children {
                let ok = if c >= 0 {
                    (c as usize) < self.numnodes
                } else {
                    ((-1 - c) as usize) < self.numleafs
                };
                if !ok {
                    return Err(bad_index("Nodes", "child", c));
                }
            }
        }
        for l in &self.leafs {
            if l.firstleafbrush + l.numleafbrushes > self.leafbrushes.len() {
                return Err(bad_index("Leafs", "leafbrush", l.firstleafbrush as i64));
            }
            if l.area < 0 || (!self.areas.is_empty() && l.area as usize >= self.areas.len()) {
                return Err(bad_index("Leafs", "area", l.area));
            }
        }
        for &b in &self.leafbrushes {
            if b >= self.numbrushes {
                return Err(bad_index("LeafBrushes", "brush", b as i64));
            }
        }
        for b in &self.brushes {
            if b.firstbrushside + b.numsides > self.brushsides.len() {
                return Err(bad_index("Brushes", "brushside", b.firstbrushside as i64));
            }
        }
        for m in &self.models {
            if m.headnode < 0 || m.headnode as usize >= self.numnodes {
                return Err(bad_index("Submodels", "headnode", m.headnode));
            }
        }
        for a in &self.areas {
            if a.firstareaportal + a.numareaportals > self.areaportals.len() {
                return Err(bad_index("Areas", "areaportal", a.firstareaportal as i64));
            }
        }
        for p in &self.areaportals {
            if p.otherarea < 0 || p.otherarea as usize >= self.areas.len() {
                return Err(bad_index("AreaPortals", "area", p.otherarea));
            }
            if p.portalnum < 0 || p.portalnum as usize >= MAX_MAP_AREAPORTALS {
                return Err(bad_index("AreaPortals", "portal", p.portalnum));
            }
        }
        Ok(())
    }

    /// Appends a six sided hull (6 nodes, 12 planes, 1 brush, 1 leaf) after
    /// the map's own data. `headnode_for_box` resizes it so bounding boxes
    /// can be traced like any other model.
    fn init_box_hull(&mut self) -> Result<(), MapLoadError> {
        if self.numnodes + 6 > MAX_MAP_NODES
            || self.numbrushes + 1 > MAX_MAP_BRUSHES
            || self.leafbrushes.len() + 1 > MAX_MAP_LEAFBRUSHES
            || self.brushsides.len() + 6 > MAX_MAP_BRUSHSIDES
            || self.numplanes + 12 > MAX_MAP_PLANES
            || self.numleafs + 1 > MAX_MAP_LEAFS
        {
            return Err(MapLoadError::NoRoomForBoxTree);
        }

        self.box_headnode = self.numnodes as i32;
        self.box_planes = self.numplanes;
        let firstside = self.brushsides.len();
        let box_leaf = self.numleafs;

        self.brushes.push(CBrush {
            contents: CONTENTS_MONSTER,
            numsides: 6,
            firstbrushside: firstside,
        });
        self.leafs.push(CLeaf {
            contents: CONTENTS_MONSTER,
            cluster: -1,
            area: 0,
            firstleafbrush: self.leafbrushes.len(),
            numleafbrushes: 1,
        });
        self.leafbrushes.push(self.numbrushes);

        for i in 0..6usize {
            let side = i & 1;
            let axis = i >> 1;

            self.brushsides.push(CBrushSide {
                plane: self.box_planes + i * 2 + side,
                surface: None,
            });

            let mut children = [0i32; 2];
            children[side] = -1 - self.emptyleaf as i32;
            children[side ^ 1] = if i != 5 {
                self.box_headnode + i as i32 + 1
            } else {
                -1 - box_leaf as i32
            };
            self.nodes.push(CNode { plane: self.box_planes + i * 2, children });

            let mut normal = [0.0f32; 3];
            normal[axis] = 1.0;
            self.planes.push(CPlane { normal, dist: 0.0, plane_type: axis as u8, signbits: 0 });
            normal[axis] = -1.0;
            self.planes.push(CPlane {
                normal,
                dist: 0.0,
                plane_type: 3 + axis as u8,
                signbits: 1 << axis,
            });
        }
        Ok(())
    }
}

impl CModelContext {
    pub fn new() -> Self {
        Self {
            map: MapData::default(),
            brush_checkcount: Vec::new(),
            checkcount: 0,
            name: String::new(),
            checksum: 0,
            floodvalid: 0,
            portalopen: vec![false; MAX_MAP_AREAPORTALS],
            pvsrow: Vec::new(),
            phsrow: Vec::new(),
            map_noareas: false,
            flushmap: false,
        }
    }

    /// Loads a map and returns the world model and the file checksum.
    ///
    /// `buf` holds the file contents; `None` reads `name` from disk. An
    /// empty name leaves a single solid leaf so queries still answer.
    /// Requesting the currently loaded map again reuses it, only resetting
    /// area portals unless `clientload` is set.
    pub fn load_map(&mut self, name: &str, clientload: bool, buf: Option<&[u8]>) -> ComResult<(CModel, u32)> {
        if !self.name.is_empty() && self.name == name && (clientload || !self.flushmap) {
            if !clientload {
                self.portalopen.iter_mut().for_each(|p| *p = false);
                self.flood_area_connections()?;
            }
            return Ok((self.map.models[0], self.checksum));
        }

        if name.is_empty() {
            self.map = MapData::default();
            self.map.leafs.push(CLeaf { contents: CONTENTS_SOLID, cluster: -1, ..Default::default() });
            self.map.numleafs = 1;
            self.map.numclusters = 1;
            self.map.areas.push(CArea::default());
            self.map.models.push(CModel::default());
            self.name.clear();
            self.checksum = 0;
            self.reset_scratch();
            return Ok((CModel::default(), 0));
        }

        let owned;
        let bytes = match buf {
            Some(b) => b,
            None => {
                owned = std::fs::read(name).map_err(|source| MapLoadError::Read {
                    name: name.to_string(),
                    source,
                })?;
                &owned[..]
            }
        };

        let map = MapData::parse(bytes, name)?;
        self.checksum = block_checksum(bytes);
        self.map = map;
        self.name = name.to_string();
        self.reset_scratch();
        self.portalopen.iter_mut().for_each(|p| *p = false);
        self.flood_area_connections()?;

        info!(
            "loaded {}: {} planes, {} nodes, {} leafs, {} brushes, {} clusters, {} areas",
            name,
            self.map.numplanes,
            self.map.numnodes,
            self.map.numleafs,
            self.map.numbrushes,
            self.map.numclusters,
            self.map.areas.len()
        );
        Ok((self.map.models[0], self.checksum))
    }

    fn reset_scratch(&mut self) {
        self.brush_checkcount = vec![0; self.map.brushes.len()];
        self.checkcount = 0;
        let row = (self.map.numclusters + 7) >> 3;
        self.pvsrow = vec![0; row.max(1)];
        self.phsrow = vec![0; row.max(1)];
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// `*N` names an inline brush model.
    pub fn inline_model(&self, name: &str) -> ComResult<CModel> {
        let num = name
            .strip_prefix('*')
            .ok_or_else(|| ComError::Drop("CM_InlineModel: bad name".into()))?
            .parse::<usize>()
            .map_err(|_| ComError::Drop("CM_InlineModel: bad name".into()))?;
        if num < 1 || num >= self.map.models.len() {
            return Err(ComError::Drop("CM_InlineModel: bad number".into()));
        }
        Ok(self.map.models[num])
    }

    pub fn model(&self, index: usize) -> Option<&CModel> {
        self.map.models.get(index)
    }

    pub fn num_clusters(&self) -> usize {
        self.map.numclusters
    }

    pub fn num_inline_models(&self) -> usize {
        self.map.models.len()
    }

    pub fn num_areas(&self) -> usize {
        self.map.areas.len()
    }

    pub fn entity_string(&self) -> &str {
        &self.map.entity_string
    }

    pub fn leaf_contents(&self, leafnum: usize) -> i32 {
        self.map.leafs.get(leafnum).map_or(0, |l| l.contents)
    }

    pub fn leaf_cluster(&self, leafnum: usize) -> i32 {
        self.map.leafs.get(leafnum).map_or(-1, |l| l.cluster)
    }

    pub fn leaf_area(&self, leafnum: usize) -> i32 {
        self.map.leafs.get(leafnum).map_or(0, |l| l.area)
    }

    // ========================================================
    // Point and box classification
    // ========================================================

    pub(crate) fn point_leafnum_r(&self, p: &Vec3, mut num: i32) -> usize {
        while num >= 0 {
            let node = &self.map.nodes[num as usize];
            let d = plane_diff(p, &self.map.planes[node.plane]);
            num = if d < 0.0 { node.children[1] } else { node.children[0] };
        }
        (-1 - num) as usize
    }

    /// Leaf containing `p` in the world model; 0 before any map is loaded.
    pub fn point_leafnum(&self, p: &Vec3) -> usize {
        if self.map.numplanes == 0 {
            return 0;
        }
        self.point_leafnum_r(p, 0)
    }

    fn box_leafnums_r(&self, mins: &Vec3, maxs: &Vec3, mut nodenum: i32, list: &mut Vec<usize>, capacity: usize, topnode: &mut Option<usize>) {
        loop {
            if nodenum < 0 {
                if list.len() < capacity {
                    list.push((-1 - nodenum) as usize);
                }
                return;
            }
            let node = &self.map.nodes[nodenum as usize];
            match box_on_plane_side(mins, maxs, &self.map.planes[node.plane]) {
                1 => nodenum = node.children[0],
                2 => nodenum = node.children[1],
                _ => {
                    // go down both
                    if topnode.is_none() {
                        *topnode = Some(nodenum as usize);
                    }
                    self.box_leafnums_r(mins, maxs, node.children[0], list, capacity, topnode);
                    nodenum = node.children[1];
                }
            }
        }
    }

    /// Leafs touched by the box under `headnode`, at most `capacity` of
    /// them, plus the first node where the walk split.
    pub fn box_leafnums_headnode(&self, mins: &Vec3, maxs: &Vec3, capacity: usize, headnode: i32) -> (Vec<usize>, Option<usize>) {
        let mut list = Vec::new();
        let mut topnode = None;
        if self.map.nodes.is_empty() {
            return (list, topnode);
        }
        self.box_leafnums_r(mins, maxs, headnode, &mut list, capacity, &mut topnode);
        (list, topnode)
    }

    pub fn box_leafnums(&self, mins: &Vec3, maxs: &Vec3, capacity: usize) -> (Vec<usize>, Option<usize>) {
        let headnode = self.map.models.first().map_or(0, |m| m.headnode);
        self.box_leafnums_headnode(mins, maxs, capacity, headnode)
    }

    pub fn point_contents(&self, p: &Vec3, headnode: i32) -> i32 {
        if self.map.numnodes == 0 {
            return 0;
        }
        let l = self.point_leafnum_r(p, headnode);
        self.map.leafs[l].contents
    }

    /// Point contents against a model that may be moved and rotated.
    pub fn transformed_point_contents(&self, p: &Vec3, headnode: i32, origin: &Vec3, angles: &Vec3) -> i32 {
        let mut p_l = vector_subtract(p, origin);
        if headnode != self.map.box_headnode && !vector_compare(angles, &VEC3_ORIGIN) {
            p_l = rotate_point(&p_l, angles);
        }
        self.point_contents(&p_l, headnode)
    }

    /// Sizes the box hull to `mins`/`maxs` and returns its headnode. The
    /// hull is shared, so the result is only valid until the next call.
    pub fn headnode_for_box(&mut self, mins: &Vec3, maxs: &Vec3) -> i32 {
        let bp = self.map.box_planes;
        if self.map.planes.len() < bp + 12 {
            return self.map.box_headnode;
        }
        for axis in 0..3 {
            let p = &mut self.map.planes[bp + axis * 4..bp + axis * 4 + 4];
            p[0].dist = maxs[axis];
            p[1].dist = -maxs[axis];
            p[2].dist = mins[axis];
            p[3].dist = -mins[axis];
        }
        self.map.box_headnode
    }

    // ========================================================
    // Area portals
    // ========================================================

    fn flood_area_r(&mut self, area: usize, floodnum: i32) -> ComResult<()> {
        let mut stack = vec![area];
        while let Some(a) = stack.pop() {
            let ar = &mut self.map.areas[a];
            if ar.floodvalid == self.floodvalid {
                if ar.floodnum == floodnum {
                    continue;
                }
                return Err(ComError::Drop("FloodArea_r: reflooded".into()));
            }
            ar.floodnum = floodnum;
            ar.floodvalid = self.floodvalid;
            let (first, num) = (ar.firstareaportal, ar.numareaportals);
            for p in &self.map.areaportals[first..first + num] {
                if self.portalopen[p.portalnum as usize] {
                    stack.push(p.otherarea as usize);
                }
            }
        }
        Ok(())
    }

    /// Starts a new flood epoch and numbers every connected group of areas.
    /// Area 0 is never flooded.
    pub fn flood_area_connections(&mut self) -> ComResult<()> {
        self.floodvalid += 1;
        let mut floodnum = 0;
        for i in 1..self.map.areas.len() {
            if self.map.areas[i].floodvalid == self.floodvalid {
                continue; // already flooded into
            }
            floodnum += 1;
            self.flood_area_r(i, floodnum)?;
        }
        Ok(())
    }

    pub fn set_area_portal_state(&mut self, portalnum: usize, open: bool) -> ComResult<()> {
        if portalnum >= self.map.areaportals.len().max(1) || portalnum >= self.portalopen.len() {
            return Err(ComError::Drop("areaportal > numareaportals".into()));
        }
        debug!("areaportal {} {}", portalnum, if open { "open" } else { "closed" });
        self.portalopen[portalnum] = open;
        self.flood_area_connections()
    }

    pub fn areas_connected(&self, area1: usize, area2: usize) -> bool {
        if self.map_noareas {
            return true;
        }
        let n = self.map.areas.len();
        if area1 >= n || area2 >= n {
            warn!("CM_AreasConnected: area {} / {} out of {}", area1, area2, n);
            return false;
        }
        self.map.areas[area1].floodnum == self.map.areas[area2].floodnum
    }

    /// Writes a bit vector of the areas connected to `area` and returns its
    /// length in bytes. Area 0 sees everything.
    pub fn write_area_bits(&self, buffer: &mut [u8], area: usize) -> usize {
        let numareas = self.map.areas.len();
        let bytes = ((numareas + 7) >> 3).min(buffer.len());

        if self.map_noareas {
            buffer[..bytes].fill(0xff);
            return bytes;
        }
        buffer[..bytes].fill(0);
        let floodnum = self.map.areas.get(area).map_or(0, |a| a.floodnum);
        for (i, a) in self.map.areas.iter().enumerate() {
            if (i >> 3) < bytes && (area == 0 || a.floodnum == floodnum) {
                buffer[i >> 3] |= 1 << (i & 7);
            }
        }
        bytes
    }

    /// True if any leaf under `nodenum` is in a cluster set in `visbits`.
    pub fn headnode_visible(&self, nodenum: i32, visbits: &[u8]) -> bool {
        if nodenum < 0 {
            let leaf = (-1 - nodenum) as usize;
            let cluster = self.leaf_cluster(leaf);
            if cluster == -1 {
                return false;
            }
            let c = cluster as usize;
            return visbits.get(c >> 3).is_some_and(|b| b & (1 << (c & 7)) != 0);
        }
        match self.map.nodes.get(nodenum as usize) {
            Some(node) => {
                let children = node.children;
                self.headnode_visible(children[0], visbits) || self.headnode_visible(children[1], visbits)
            }
            None => false,
        }
    }

    // ========================================================
    // Visibility
    // ========================================================

    fn cluster_row(&mut self, cluster: i32, which: usize) -> &[u8] {
        let row = (self.map.numclusters + 7) >> 3;
        let mut out = std::mem::take(if which == DVIS_PVS { &mut self.pvsrow } else { &mut self.phsrow });
        out.resize(row.max(1), 0);

        if cluster == -1 {
            out[..row].fill(0);
        } else if self.map.visibility.is_empty() {
            decompress_vis(None, &mut out[..row]);
        } else {
            let ofs = self
                .map
                .vis_ofs
                .get(cluster as usize)
                .map(|o| o[which])
                .filter(|&o| o < self.map.visibility.len());
            match ofs {
                Some(o) => decompress_vis(Some(&self.map.visibility[o..]), &mut out[..row]),
                None => {
                    warn!("CM_ClusterVis: bad cluster {}", cluster);
                    out[..row].fill(0);
                }
            }
        }

        let slot = if which == DVIS_PVS { &mut self.pvsrow } else { &mut self.phsrow };
        *slot = out;
        &slot[..row]
    }

    /// Decompressed potentially-visible row for `cluster`. The slice is a
    /// shared scratch buffer, overwritten by the next call.
    pub fn cluster_pvs(&mut self, cluster: i32) -> &[u8] {
        self.cluster_row(cluster, DVIS_PVS)
    }

    pub fn cluster_phs(&mut self, cluster: i32) -> &[u8] {
        self.cluster_row(cluster, DVIS_PHS)
    }
}

/// Rotates a point into a model's local frame.
pub(crate) fn rotate_point(p: &Vec3, angles: &Vec3) -> Vec3 {
    let (forward, right, up) = angle_vectors(angles);
    [dot_product(p, &forward), -dot_product(p, &right), dot_product(p, &up)]
}

/// Expands a run-length encoded visibility row into `out`.
///
/// A zero byte is followed by a count of zero bytes to emit. Output is
/// clamped to `out.len()` whatever the stream claims; `None` marks
/// everything visible.
pub fn decompress_vis(input: Option<&[u8]>, out: &mut [u8]) {
    let row = out.len();
    let Some(input) = input else {
        out.fill(0xff);
        return;
    };

    let mut i = 0;
    let mut o = 0;
    while o < row {
        let Some(&b) = input.get(i) else {
            // truncated stream
            out[o..].fill(0);
            return;
        };
        if b != 0 {
            out[o] = b;
            o += 1;
            i += 1;
            continue;
        }
        let mut c = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        if o + c > row {
            c = row - o;
            debug!("warning: Vis decompression overrun");
        }
        out[o..o + c].fill(0);
        o += c;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn leaf(contents: i32, cluster: i16, area: i16) -> DLeaf {
        DLeaf { contents, cluster, area, ..Default::default() }
    }

    /// Two leafs split by the plane x = 0: solid leaf 0 behind it, empty
    /// leaf 1 in front.
    pub(crate) fn two_leaf_map() -> BspBuilder {
        let mut b = BspBuilder::new();
        b.texinfo.push(DTexInfo::default());
        b.planes.push(DPlane { normal: [1.0, 0.0, 0.0], dist: 0.0, plane_type: 0 });
        b.nodes.push(DNode { planenum: 0, children: [-2, -1], ..Default::default() });
        b.leafs.push(leaf(CONTENTS_SOLID, -1, 0));
        b.leafs.push(leaf(0, 0, 1));
        b.models.push(DModel {
            mins: [-64.0; 3],
            maxs: [64.0; 3],
            ..Default::default()
        });
        b.areas.push(DArea::default());
        b.areas.push(DArea::default());
        b
    }

    fn axial_box_sides(b: &mut BspBuilder, mins: Vec3, maxs: Vec3) -> (i32, i32) {
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
        (firstside, 6)
    }

    /// Open space above a solid floor slab occupying z in [-64, 0].
    pub(crate) fn floor_map() -> BspBuilder {
        let mut b = BspBuilder::new();
        b.texinfo.push(DTexInfo::default());
        // plane 0 splits the tree at the floor surface
        b.planes.push(DPlane { normal: [0.0, 0.0, 1.0], dist: 0.0, plane_type: 2 });
        let (firstside, numsides) = axial_box_sides(&mut b, [-1024.0, -1024.0, -64.0], [1024.0, 1024.0, 0.0]);
        b.brushes.push(DBrush { firstside, numsides, contents: CONTENTS_SOLID });

        b.nodes.push(DNode { planenum: 0, children: [-2, -3], ..Default::default() });
        b.leafs.push(leaf(CONTENTS_SOLID, -1, 0));
        b.leafs.push(leaf(0, 0, 1));
        b.leafs.push(DLeaf { firstleafbrush: 0, numleafbrushes: 1, ..leaf(CONTENTS_SOLID, -1, 0) });
        b.leafbrushes.push(0);
        b.models.push(DModel {
            mins: [-1024.0, -1024.0, -64.0],
            maxs: [1024.0, 1024.0, 1024.0],
            ..Default::default()
        });
        b.areas.push(DArea::default());
        b.areas.push(DArea::default());
        b
    }

    /// Areas 1-2-3 in a chain joined by portals 0 and 1.
    fn chained_areas_map() -> BspBuilder {
        let mut b = two_leaf_map();
        b.areas = vec![
            DArea::default(),
            DArea { numareaportals: 1, firstareaportal: 0 },
            DArea { numareaportals: 2, firstareaportal: 1 },
            DArea { numareaportals: 1, firstareaportal: 3 },
        ];
        b.areaportals = vec![
            DAreaPortal { portalnum: 0, otherarea: 2 },
            DAreaPortal { portalnum: 0, otherarea: 1 },
            DAreaPortal { portalnum: 1, otherarea: 3 },
            DAreaPortal { portalnum: 1, otherarea: 2 },
        ];
        b
    }

    pub(crate) fn load(b: &BspBuilder) -> CModelContext {
        let mut cm = CModelContext::new();
        cm.load_map("maps/test.bsp", false, Some(&b.to_bytes())).unwrap();
        cm
    }

    #[test]
    fn two_leaf_map_queries() {
        let cm = load(&two_leaf_map());
        assert_eq!(cm.point_leafnum(&[10.0, 0.0, 0.0]), 1);
        assert_eq!(cm.point_leafnum(&[-10.0, 0.0, 0.0]), 0);
        assert_eq!(cm.num_clusters(), 1);
        assert!(cm.areas_connected(1, 1));
        assert_eq!(cm.leaf_cluster(1), 0);
        assert_eq!(cm.leaf_area(1), 1);
    }

    #[test]
    fn point_leafnum_without_map_is_solid_leaf() {
        let cm = CModelContext::new();
        assert_eq!(cm.point_leafnum(&[1.0, 2.0, 3.0]), 0);
        assert_eq!(cm.point_contents(&[1.0, 2.0, 3.0], 0), 0);
    }

    #[test]
    fn world_model_bounds_are_spread() {
        let mut cm = CModelContext::new();
        let (world, checksum) = cm.load_map("maps/a.bsp", false, Some(&two_leaf_map().to_bytes())).unwrap();
        assert_eq!(world.mins, [-65.0; 3]);
        assert_eq!(world.maxs, [65.0; 3]);
        assert_eq!(checksum, block_checksum(&two_leaf_map().to_bytes()));
    }

    #[test]
    fn empty_name_leaves_placeholder() {
        let mut cm = CModelContext::new();
        let (_, checksum) = cm.load_map("", false, None).unwrap();
        assert_eq!(checksum, 0);
        assert_eq!(cm.num_clusters(), 1);
        assert_eq!(cm.num_areas(), 1);
        assert_eq!(cm.point_leafnum(&[0.0; 3]), 0);
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = two_leaf_map().to_bytes();
        bytes[4] = 37;
        let err = CModelContext::new().load_map("maps/v.bsp", false, Some(&bytes)).unwrap_err();
        assert!(matches!(err, ComError::MapLoad(MapLoadError::BadVersion { found: 37, .. })));
    }

    #[test]
    fn rejects_funny_lump_size() {
        let mut bytes = two_leaf_map().to_bytes();
        // shrink the planes lump by one byte
        let len_ofs = 12 + LUMP_PLANES * 8;
        let len = le_i32(&bytes, len_ofs) - 1;
        bytes[len_ofs..len_ofs + 4].copy_from_slice(&len.to_le_bytes());
        let err = CModelContext::new().load_map("maps/p.bsp", false, Some(&bytes)).unwrap_err();
        assert!(err.to_string().starts_with("CMod_LoadPlanes: funny lump size"));
    }

    #[test]
    fn rejects_leaf_zero_not_solid() {
        let mut b = two_leaf_map();
        b.leafs[0].contents = 0;
        let err = CModelContext::new().load_map("maps/l.bsp", false, Some(&b.to_bytes())).unwrap_err();
        assert!(matches!(err, ComError::MapLoad(MapLoadError::BadLeafZero)));
    }

    #[test]
    fn rejects_map_without_empty_leaf() {
        let mut b = two_leaf_map();
        b.leafs[1].contents = CONTENTS_WATER;
        let err = CModelContext::new().load_map("maps/e.bsp", false, Some(&b.to_bytes())).unwrap_err();
        assert!(matches!(err, ComError::MapLoad(MapLoadError::NoEmptyLeaf)));
    }

    #[test]
    fn failed_load_keeps_previous_map() {
        let mut cm = load(&two_leaf_map());
        let mut bad = two_leaf_map();
        bad.nodes[0].planenum = 9;
        assert!(cm.load_map("maps/other.bsp", false, Some(&bad.to_bytes())).is_err());
        assert_eq!(cm.name(), "maps/test.bsp");
        assert_eq!(cm.point_leafnum(&[10.0, 0.0, 0.0]), 1);
    }

    #[test]
    fn box_hull_is_appended() {
        let cm = load(&two_leaf_map());
        assert_eq!(cm.map.box_headnode, 1);
        assert_eq!(cm.map.nodes.len(), 1 + 6);
        assert_eq!(cm.map.planes.len(), 1 + 12);
        assert_eq!(cm.map.brushes.len(), 1);
        assert_eq!(cm.map.brushsides.len(), 6);
    }

    #[test]
    fn headnode_for_box_sets_plane_distances() {
        let mut cm = load(&two_leaf_map());
        let head = cm.headnode_for_box(&[-16.0, -16.0, -24.0], &[16.0, 16.0, 32.0]);
        assert_eq!(head, cm.map.box_headnode);
        let bp = cm.map.box_planes;
        let dists: Vec<f32> = cm.map.planes[bp..bp + 12].iter().map(|p| p.dist).collect();
        assert_eq!(dists, vec![16.0, -16.0, -16.0, 16.0, 16.0, -16.0, -16.0, 16.0, 32.0, -32.0, -24.0, 24.0]);

        assert_eq!(cm.point_contents(&[0.0, 0.0, 0.0], head), CONTENTS_MONSTER);
        assert_eq!(cm.point_contents(&[0.0, 0.0, 40.0], head), 0);
        assert_eq!(cm.point_contents(&[-17.0, 0.0, 0.0], head), 0);
    }

    #[test]
    fn box_leafnums_reports_topnode_and_caps() {
        let cm = load(&two_leaf_map());
        let (leafs, top) = cm.box_leafnums(&[-8.0; 3], &[8.0; 3], 16);
        assert_eq!(leafs, vec![1, 0]);
        assert_eq!(top, Some(0));

        let (leafs, _) = cm.box_leafnums(&[-8.0; 3], &[8.0; 3], 1);
        assert_eq!(leafs, vec![1]);

        let (leafs, top) = cm.box_leafnums(&[4.0; 3], &[8.0; 3], 16);
        assert_eq!(leafs, vec![1]);
        assert_eq!(top, None);
    }

    #[test]
    fn area_flood_is_symmetric_and_transitive() {
        let mut cm = load(&chained_areas_map());
        let check = |cm: &CModelContext| {
            for a in 0..4 {
                for b in 0..4 {
                    assert_eq!(cm.areas_connected(a, b), cm.areas_connected(b, a));
                    for c in 0..4 {
                        if cm.areas_connected(a, b) && cm.areas_connected(b, c) {
                            assert!(cm.areas_connected(a, c));
                        }
                    }
                }
            }
        };

        check(&cm);
        assert!(!cm.areas_connected(1, 2));

        cm.set_area_portal_state(0, true).unwrap();
        check(&cm);
        assert!(cm.areas_connected(1, 2));
        assert!(!cm.areas_connected(2, 3));

        cm.set_area_portal_state(1, true).unwrap();
        check(&cm);
        assert!(cm.areas_connected(1, 3));

        cm.set_area_portal_state(0, false).unwrap();
        check(&cm);
        assert!(!cm.areas_connected(1, 3));
        assert!(cm.areas_connected(2, 3));
    }

    #[test]
    fn one_way_portal_refloods_as_drop() {
        let mut b = two_leaf_map();
        b.areas = vec![
            DArea::default(),
            DArea::default(),
            DArea { numareaportals: 1, firstareaportal: 0 },
        ];
        b.areaportals = vec![DAreaPortal { portalnum: 0, otherarea: 1 }];
        let mut cm = load(&b);
        let err = cm.set_area_portal_state(0, true).unwrap_err();
        assert!(matches!(err, ComError::Drop(ref m) if m.contains("reflooded")));
    }

    #[test]
    fn bad_portal_number_is_drop() {
        let mut cm = load(&chained_areas_map());
        assert!(cm.set_area_portal_state(5000, true).is_err());
    }

    #[test]
    fn reload_same_map_resets_portals() {
        let b = chained_areas_map();
        let bytes = b.to_bytes();
        let mut cm = CModelContext::new();
        let (_, sum1) = cm.load_map("maps/chain.bsp", false, Some(&bytes)).unwrap();
        cm.set_area_portal_state(0, true).unwrap();
        assert!(cm.areas_connected(1, 2));

        let (_, sum2) = cm.load_map("maps/chain.bsp", false, None).unwrap();
        assert_eq!(sum1, sum2);
        assert!(!cm.areas_connected(1, 2));
    }

    #[test]
    fn clientload_reuse_keeps_portals() {
        let bytes = chained_areas_map().to_bytes();
        let mut cm = CModelContext::new();
        cm.load_map("maps/chain.bsp", false, Some(&bytes)).unwrap();
        cm.set_area_portal_state(0, true).unwrap();
        cm.load_map("maps/chain.bsp", true, None).unwrap();
        assert!(cm.areas_connected(1, 2));
    }

    #[test]
    fn write_area_bits_marks_connected_areas() {
        let mut cm = load(&chained_areas_map());
        cm.set_area_portal_state(0, true).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(cm.write_area_bits(&mut buf, 1), 1);
        assert_eq!(buf[0], 0b0110);
        cm.write_area_bits(&mut buf, 0);
        assert_eq!(buf[0], 0b1111);
        cm.map_noareas = true;
        cm.write_area_bits(&mut buf, 3);
        assert_eq!(buf[0], 0xff);
    }

    #[test]
    fn vis_decompression_never_overruns() {
        let mut out = [0xaau8; 2];
        decompress_vis(Some(&[0, 255, 0, 255]), &mut out);
        assert_eq!(out, [0, 0]);

        let mut out = [0u8; 2];
        decompress_vis(Some(&[0xff; 16]), &mut out);
        assert_eq!(out, [0xff, 0xff]);

        let mut out = [0x55u8; 3];
        decompress_vis(Some(&[0x01, 0, 200]), &mut out);
        assert_eq!(out, [0x01, 0, 0]);

        let mut out = [0x55u8; 3];
        decompress_vis(Some(&[0x03]), &mut out);
        assert_eq!(out, [0x03, 0, 0]);
    }

    #[test]
    fn cluster_rows() {
        let mut b = two_leaf_map();
        // ten clusters so rows are two bytes
        b.leafs[1].cluster = 9;
        let rows: Vec<Vec<u8>> = (0..10).map(|i| vec![1 << (i % 8), 0]).collect();
        b.visibility = build_visibility(&rows, &rows);
        let mut cm = load(&b);
        assert_eq!(cm.num_clusters(), 10);
        assert_eq!(cm.cluster_pvs(3), &[0x08, 0]);
        assert_eq!(cm.cluster_phs(9), &[0x02, 0]);
        assert_eq!(cm.cluster_pvs(-1), &[0, 0]);

        let mut no_vis = load(&two_leaf_map());
        assert_eq!(no_vis.cluster_pvs(0), &[0xff]);
        assert_eq!(no_vis.cluster_pvs(-1), &[0]);
    }

    #[test]
    fn headnode_visible_checks_clusters() {
        let cm = load(&two_leaf_map());
        assert!(cm.headnode_visible(0, &[0x01]));
        assert!(!cm.headnode_visible(0, &[0x00]));
        // leaf 0 has no cluster
        assert!(!cm.headnode_visible(-1, &[0xff]));
    }

    #[test]
    fn inline_model_names() {
        let mut b = two_leaf_map();
        b.models.push(DModel { mins: [0.0; 3], maxs: [8.0; 3], ..Default::default() });
        let cm = load(&b);
        assert_eq!(cm.inline_model("*1").unwrap().maxs, [9.0; 3]);
        assert!(cm.inline_model("*2").is_err());
        assert!(cm.inline_model("1").is_err());
        assert_eq!(cm.num_inline_models(), 2);
    }

    #[test]
    fn parallel_lump_decoding_matches_serial() {
        let mut b = two_leaf_map();
        for i in 0..200 {
            b.planes.push(DPlane { normal: [0.0, 1.0, 0.0], dist: i as f32, plane_type: 1 });
        }
        let cm = load(&b);
        assert_eq!(cm.map.numplanes, 201);
        assert_eq!(cm.map.planes[150].dist, 149.0);
    }

    #[test]
    fn entity_string_is_exposed() {
        let mut b = two_leaf_map();
        b.entities = "{\n\"classname\" \"worldspawn\"\n}".into();
        let cm = load(&b);
        assert!(cm.entity_string().contains("worldspawn"));
    }
}
