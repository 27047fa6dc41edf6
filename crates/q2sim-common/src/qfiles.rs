// qfiles.rs - on-disk BSP layout (IBSP version 38)
//
// All multi-byte fields are little endian. Each `D*` record type knows its
// stride and how to decode itself from a slice of exactly that length.

use crate::q_shared::Vec3;

pub const IDBSPHEADER: i32 =
    (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
pub const BSPVERSION: i32 = 38;

// upper design bounds
pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_BRUSHES: usize = 8192;
pub const MAX_MAP_ENTSTRING: usize = 0x40000;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_AREAS: usize = 256;
pub const MAX_MAP_AREAPORTALS: usize = 1024;
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_BRUSHSIDES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;
pub const MAX_MAP_VISIBILITY: usize = 0x100000;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_VISIBILITY: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_LEAFFACES: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const LUMP_POP: usize = 16;
pub const LUMP_AREAS: usize = 17;
pub const LUMP_AREAPORTALS: usize = 18;
pub const HEADER_LUMPS: usize = 19;

/// magic + version + 19 (fileofs, filelen) pairs
pub const HEADER_SIZE: usize = 8 + HEADER_LUMPS * 8;

pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl DHeader {
    /// Returns `None` if the buffer cannot even hold a header.
    pub fn parse(buf: &[u8]) -> Option<DHeader> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut h = DHeader {
            ident: le_i32(buf, 0),
            version: le_i32(buf, 4),
            lumps: [Lump::default(); HEADER_LUMPS],
        };
        for (i, l) in h.lumps.iter_mut().enumerate() {
            l.fileofs = le_i32(buf, 8 + i * 8);
            l.filelen = le_i32(buf, 12 + i * 8);
        }
        Some(h)
    }
}

// ============================================================
// Little-endian field access
// ============================================================

#[inline]
pub fn le_i32(b: &[u8], ofs: usize) -> i32 {
    i32::from_le_bytes([b[ofs], b[ofs + 1], b[ofs + 2], b[ofs + 3]])
}

#[inline]
pub fn le_u16(b: &[u8], ofs: usize) -> u16 {
    u16::from_le_bytes([b[ofs], b[ofs + 1]])
}

#[inline]
pub fn le_i16(b: &[u8], ofs: usize) -> i16 {
    i16::from_le_bytes([b[ofs], b[ofs + 1]])
}

#[inline]
pub fn le_f32(b: &[u8], ofs: usize) -> f32 {
    f32::from_le_bytes([b[ofs], b[ofs + 1], b[ofs + 2], b[ofs + 3]])
}

fn le_vec3(b: &[u8], ofs: usize) -> Vec3 {
    [le_f32(b, ofs), le_f32(b, ofs + 4), le_f32(b, ofs + 8)]
}

fn put_vec3(out: &mut Vec<u8>, v: &Vec3) {
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
}

// ============================================================
// Records
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl DModel {
    pub const SIZE: usize = 48;

    pub fn read(b: &[u8]) -> Self {
        Self {
            mins: le_vec3(b, 0),
            maxs: le_vec3(b, 12),
            origin: le_vec3(b, 24),
            headnode: le_i32(b, 36),
            firstface: le_i32(b, 40),
            numfaces: le_i32(b, 44),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        put_vec3(out, &self.mins);
        put_vec3(out, &self.maxs);
        put_vec3(out, &self.origin);
        out.extend_from_slice(&self.headnode.to_le_bytes());
        out.extend_from_slice(&self.firstface.to_le_bytes());
        out.extend_from_slice(&self.numfaces.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

impl DPlane {
    pub const SIZE: usize = 20;

    pub fn read(b: &[u8]) -> Self {
        Self {
            normal: le_vec3(b, 0),
            dist: le_f32(b, 12),
            plane_type: le_i32(b, 16),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        put_vec3(out, &self.normal);
        out.extend_from_slice(&self.dist.to_le_bytes());
        out.extend_from_slice(&self.plane_type.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DNode {
    pub planenum: i32,
    /// negative numbers are -(leafs+1), not nodes
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl DNode {
    pub const SIZE: usize = 28;

    pub fn read(b: &[u8]) -> Self {
        Self {
            planenum: le_i32(b, 0),
            children: [le_i32(b, 4), le_i32(b, 8)],
            mins: [le_i16(b, 12), le_i16(b, 14), le_i16(b, 16)],
            maxs: [le_i16(b, 18), le_i16(b, 20), le_i16(b, 22)],
            firstface: le_u16(b, 24),
            numfaces: le_u16(b, 26),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.planenum.to_le_bytes());
        out.extend_from_slice(&self.children[0].to_le_bytes());
        out.extend_from_slice(&self.children[1].to_le_bytes());
        for v in self.mins.iter().chain(self.maxs.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.firstface.to_le_bytes());
        out.extend_from_slice(&self.numfaces.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DTexInfo {
    /// [s/t][xyz offset]
    pub vecs: [[f32; 4]; 2],
    pub flags: i32,
    pub value: i32,
    pub texture: [u8; 32],
    pub nexttexinfo: i32,
}

impl Default for DTexInfo {
    fn default() -> Self {
        Self {
            vecs: [[0.0; 4]; 2],
            flags: 0,
            value: 0,
            texture: [0; 32],
            nexttexinfo: -1,
        }
    }
}

impl DTexInfo {
    pub const SIZE: usize = 76;

    pub fn read(b: &[u8]) -> Self {
        let mut vecs = [[0.0f32; 4]; 2];
        for (i, row) in vecs.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = le_f32(b, (i * 4 + j) * 4);
            }
        }
        let mut texture = [0u8; 32];
        texture.copy_from_slice(&b[40..72]);
        Self {
            vecs,
            flags: le_i32(b, 32),
            value: le_i32(b, 36),
            texture,
            nexttexinfo: le_i32(b, 72),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for row in &self.vecs {
            for v in row {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.texture);
        out.extend_from_slice(&self.nexttexinfo.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
}

impl DLeaf {
    pub const SIZE: usize = 28;

    pub fn read(b: &[u8]) -> Self {
        Self {
            contents: le_i32(b, 0),
            cluster: le_i16(b, 4),
            area: le_i16(b, 6),
            mins: [le_i16(b, 8), le_i16(b, 10), le_i16(b, 12)],
            maxs: [le_i16(b, 14), le_i16(b, 16), le_i16(b, 18)],
            firstleafface: le_u16(b, 20),
            numleaffaces: le_u16(b, 22),
            firstleafbrush: le_u16(b, 24),
            numleafbrushes: le_u16(b, 26),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.contents.to_le_bytes());
        out.extend_from_slice(&self.cluster.to_le_bytes());
        out.extend_from_slice(&self.area.to_le_bytes());
        for v in self.mins.iter().chain(self.maxs.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.firstleafface.to_le_bytes());
        out.extend_from_slice(&self.numleaffaces.to_le_bytes());
        out.extend_from_slice(&self.firstleafbrush.to_le_bytes());
        out.extend_from_slice(&self.numleafbrushes.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DBrushSide {
    /// facing out of the leaf
    pub planenum: u16,
    pub texinfo: i16,
}

impl DBrushSide {
    pub const SIZE: usize = 4;

    pub fn read(b: &[u8]) -> Self {
        Self {
            planenum: le_u16(b, 0),
            texinfo: le_i16(b, 2),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.planenum.to_le_bytes());
        out.extend_from_slice(&self.texinfo.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DBrush {
    pub firstside: i32,
    pub numsides: i32,
    pub contents: i32,
}

impl DBrush {
    pub const SIZE: usize = 12;

    pub fn read(b: &[u8]) -> Self {
        Self {
            firstside: le_i32(b, 0),
            numsides: le_i32(b, 4),
            contents: le_i32(b, 8),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.firstside.to_le_bytes());
        out.extend_from_slice(&self.numsides.to_le_bytes());
        out.extend_from_slice(&self.contents.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DArea {
    pub numareaportals: i32,
    pub firstareaportal: i32,
}

impl DArea {
    pub const SIZE: usize = 8;

    pub fn read(b: &[u8]) -> Self {
        Self {
            numareaportals: le_i32(b, 0),
            firstareaportal: le_i32(b, 4),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.numareaportals.to_le_bytes());
        out.extend_from_slice(&self.firstareaportal.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DAreaPortal {
    pub portalnum: i32,
    pub otherarea: i32,
}

impl DAreaPortal {
    pub const SIZE: usize = 8;

    pub fn read(b: &[u8]) -> Self {
        Self {
            portalnum: le_i32(b, 0),
            otherarea: le_i32(b, 4),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.portalnum.to_le_bytes());
        out.extend_from_slice(&self.otherarea.to_le_bytes());
    }
}

// ============================================================
// BSP writer
// ============================================================

/// Assembles an IBSP file from in-memory records. Used by tools and tests
/// to produce maps without a level compiler.
#[derive(Debug, Clone, Default)]
pub struct BspBuilder {
    pub entities: String,
    pub planes: Vec<DPlane>,
    pub nodes: Vec<DNode>,
    pub texinfo: Vec<DTexInfo>,
    pub leafs: Vec<DLeaf>,
    pub leafbrushes: Vec<u16>,
    pub models: Vec<DModel>,
    pub brushes: Vec<DBrush>,
    pub brushsides: Vec<DBrushSide>,
    pub areas: Vec<DArea>,
    pub areaportals: Vec<DAreaPortal>,
    /// raw visibility lump, including the cluster count and offsets
    pub visibility: Vec<u8>,
}

impl BspBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); HEADER_LUMPS];

        let mut ents = self.entities.as_bytes().to_vec();
        ents.push(0);
        lumps[LUMP_ENTITIES] = ents;
        for p in &self.planes {
            p.write(&mut lumps[LUMP_PLANES]);
        }
        lumps[LUMP_VISIBILITY] = self.visibility.clone();
        for n in &self.nodes {
            n.write(&mut lumps[LUMP_NODES]);
        }
        for t in &self.texinfo {
            t.write(&mut lumps[LUMP_TEXINFO]);
        }
        for l in &self.leafs {
            l.write(&mut lumps[LUMP_LEAFS]);
        }
        for lb in &self.leafbrushes {
            lumps[LUMP_LEAFBRUSHES].extend_from_slice(&lb.to_le_bytes());
        }
        for m in &self.models {
            m.write(&mut lumps[LUMP_MODELS]);
        }
        for b in &self.brushes {
            b.write(&mut lumps[LUMP_BRUSHES]);
        }
        for s in &self.brushsides {
            s.write(&mut lumps[LUMP_BRUSHSIDES]);
        }
        for a in &self.areas {
            a.write(&mut lumps[LUMP_AREAS]);
        }
        for p in &self.areaportals {
            p.write(&mut lumps[LUMP_AREAPORTALS]);
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + lumps.iter().map(Vec::len).sum::<usize>());
        out.extend_from_slice(&IDBSPHEADER.to_le_bytes());
        out.extend_from_slice(&BSPVERSION.to_le_bytes());
        let mut ofs = HEADER_SIZE;
        for l in &lumps {
            out.extend_from_slice(&(ofs as i32).to_le_bytes());
            out.extend_from_slice(&(l.len() as i32).to_le_bytes());
            // keep lumps 4-byte aligned
            ofs += (l.len() + 3) & !3;
        }
        for l in &lumps {
            out.extend_from_slice(l);
            out.resize((out.len() + 3) & !3, 0);
        }
        out
    }
}

/// Builds an uncompressed visibility lump: every cluster row given in full
/// for both PVS and PHS. Zero bytes are run-length encoded as required.
pub fn build_visibility(pvs_rows: &[Vec<u8>], phs_rows: &[Vec<u8>]) -> Vec<u8> {
    let numclusters = pvs_rows.len();
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(numclusters);
    let base = 4 + numclusters * 8;

    for c in 0..numclusters {
        let pvs_ofs = base + data.len();
        compress_vis_row(&pvs_rows[c], &mut data);
        let phs_ofs = base + data.len();
        compress_vis_row(&phs_rows[c], &mut data);
        offsets.push((pvs_ofs as i32, phs_ofs as i32));
    }

    let mut out = Vec::with_capacity(base + data.len());
    out.extend_from_slice(&(numclusters as i32).to_le_bytes());
    for (pvs, phs) in offsets {
        out.extend_from_slice(&pvs.to_le_bytes());
        out.extend_from_slice(&phs.to_le_bytes());
    }
    out.extend_from_slice(&data);
    out
}

/// Run-length encodes zero bytes: a zero is followed by its repeat count.
pub fn compress_vis_row(row: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < row.len() {
        if row[i] != 0 {
            out.push(row[i]);
            i += 1;
            continue;
        }
        let mut rep = 1;
        while i + rep < row.len() && row[i + rep] == 0 && rep < 255 {
            rep += 1;
        }
        out.push(0);
        out.push(rep as u8);
        i += rep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut b = BspBuilder::new();
        b.planes.push(DPlane { normal: [1.0, 0.0, 0.0], dist: 4.0, plane_type: 0 });
        let bytes = b.to_bytes();
        let h = DHeader::parse(&bytes).unwrap();
        assert_eq!(h.ident, IDBSPHEADER);
        assert_eq!(h.version, BSPVERSION);
        assert_eq!(h.lumps[LUMP_PLANES].filelen as usize, DPlane::SIZE);

        let ofs = h.lumps[LUMP_PLANES].fileofs as usize;
        let p = DPlane::read(&bytes[ofs..ofs + DPlane::SIZE]);
        assert_eq!(p.dist, 4.0);
    }

    #[test]
    fn leaf_record_layout() {
        let leaf = DLeaf {
            contents: 1,
            cluster: -1,
            area: 3,
            firstleafbrush: 7,
            numleafbrushes: 2,
            ..Default::default()
        };
        let mut out = Vec::new();
        leaf.write(&mut out);
        assert_eq!(out.len(), DLeaf::SIZE);
        assert_eq!(le_u16(&out, 24), 7);
        assert_eq!(DLeaf::read(&out), leaf);
    }

    #[test]
    fn compress_runs_of_zeros() {
        let mut out = Vec::new();
        compress_vis_row(&[0xff, 0, 0, 0, 0x01], &mut out);
        assert_eq!(out, vec![0xff, 0, 3, 0x01]);
    }

    #[test]
    fn short_buffer_has_no_header() {
        assert!(DHeader::parse(&[0u8; 16]).is_none());
    }
}
