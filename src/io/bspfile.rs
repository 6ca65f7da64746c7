//! BSP version 30 container.
//!
//! Fifteen lumps addressed by a header of `(offset, length)` pairs. Every
//! record type has a fixed little-endian layout; lumps are 4-byte aligned.

use crate::errors::{CompileError, Result, check_limit};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

pub const BSPVERSION: i32 = 30;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_TEXTURES: usize = 2;
pub const LUMP_VERTEXES: usize = 3;
pub const LUMP_VISIBILITY: usize = 4;
pub const LUMP_NODES: usize = 5;
pub const LUMP_TEXINFO: usize = 6;
pub const LUMP_FACES: usize = 7;
pub const LUMP_LIGHTING: usize = 8;
pub const LUMP_CLIPNODES: usize = 9;
pub const LUMP_LEAFS: usize = 10;
pub const LUMP_MARKSURFACES: usize = 11;
pub const LUMP_EDGES: usize = 12;
pub const LUMP_SURFEDGES: usize = 13;
pub const LUMP_MODELS: usize = 14;
pub const HEADER_LUMPS: usize = 15;

pub const MAX_MAP_HULLS: usize = 4;
pub const MAX_MAP_MODELS: usize = 400;
pub const MAX_MAP_PLANES: usize = 32768;
pub const MAX_MAP_NODES: usize = 32767;
pub const MAX_MAP_CLIPNODES: usize = 32767;
pub const MAX_MAP_LEAFS: usize = 8192;
pub const MAX_MAP_VERTS: usize = 65535;
pub const MAX_MAP_FACES: usize = 65535;
pub const MAX_MAP_MARKSURFACES: usize = 65535;
pub const MAX_MAP_TEXINFO: usize = 32767;
pub const MAX_MAP_EDGES: usize = 256000;
pub const MAX_MAP_SURFEDGES: usize = 512000;
pub const MAX_MAP_TEXTURES: usize = 4096;
pub const MAX_MAP_LIGHTING: usize = 0x300_0000;
pub const MAX_MAP_VISIBILITY: usize = 0x80_0000;
pub const MAX_MAP_ENTSTRING: usize = 0x8_0000;

pub const MAXLIGHTMAPS: usize = 4;
pub const NUM_AMBIENTS: usize = 4;

/// Texinfo flag: no lightmap, no subdivision (sky, liquids).
pub const TEX_SPECIAL: i32 = 1;

/// A fixed-size record of one lump.
pub trait LumpRecord: Sized {
    const SIZE: usize;
    fn read_from<R: Read>(r: &mut R) -> io::Result<Self>;
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()>;
}

fn read_f32x3<R: Read>(r: &mut R) -> io::Result<[f32; 3]> {
    Ok([
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ])
}

fn write_f32x3<W: Write>(w: &mut W, v: &[f32; 3]) -> io::Result<()> {
    v.iter().try_for_each(|x| w.write_f32::<LittleEndian>(*x))
}

fn read_i16x3<R: Read>(r: &mut R) -> io::Result<[i16; 3]> {
    Ok([
        r.read_i16::<LittleEndian>()?,
        r.read_i16::<LittleEndian>()?,
        r.read_i16::<LittleEndian>()?,
    ])
}

fn write_i16x3<W: Write>(w: &mut W, v: &[i16; 3]) -> io::Result<()> {
    v.iter().try_for_each(|x| w.write_i16::<LittleEndian>(*x))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub headnode: [i32; MAX_MAP_HULLS],
    pub visleafs: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

impl LumpRecord for DModel {
    const SIZE: usize = 64;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mins = read_f32x3(r)?;
        let maxs = read_f32x3(r)?;
        let origin = read_f32x3(r)?;
        let mut headnode = [0; MAX_MAP_HULLS];
        for h in &mut headnode {
            *h = r.read_i32::<LittleEndian>()?;
        }
        Ok(DModel {
            mins,
            maxs,
            origin,
            headnode,
            visleafs: r.read_i32::<LittleEndian>()?,
            firstface: r.read_i32::<LittleEndian>()?,
            numfaces: r.read_i32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_f32x3(w, &self.mins)?;
        write_f32x3(w, &self.maxs)?;
        write_f32x3(w, &self.origin)?;
        for h in &self.headnode {
            w.write_i32::<LittleEndian>(*h)?;
        }
        w.write_i32::<LittleEndian>(self.visleafs)?;
        w.write_i32::<LittleEndian>(self.firstface)?;
        w.write_i32::<LittleEndian>(self.numfaces)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DVertex {
    pub point: [f32; 3],
}

impl LumpRecord for DVertex {
    const SIZE: usize = 12;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(DVertex {
            point: read_f32x3(r)?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_f32x3(w, &self.point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub kind: i32,
}

impl LumpRecord for DPlane {
    const SIZE: usize = 20;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(DPlane {
            normal: read_f32x3(r)?,
            dist: r.read_f32::<LittleEndian>()?,
            kind: r.read_i32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_f32x3(w, &self.normal)?;
        w.write_f32::<LittleEndian>(self.dist)?;
        w.write_i32::<LittleEndian>(self.kind)
    }
}

/// Decision node. A negative child `c` is leaf `-(c + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DNode {
    pub planenum: i32,
    pub children: [i16; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

impl LumpRecord for DNode {
    const SIZE: usize = 24;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(DNode {
            planenum: r.read_i32::<LittleEndian>()?,
            children: [r.read_i16::<LittleEndian>()?, r.read_i16::<LittleEndian>()?],
            mins: read_i16x3(r)?,
            maxs: read_i16x3(r)?,
            firstface: r.read_u16::<LittleEndian>()?,
            numfaces: r.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.planenum)?;
        w.write_i16::<LittleEndian>(self.children[0])?;
        w.write_i16::<LittleEndian>(self.children[1])?;
        write_i16x3(w, &self.mins)?;
        write_i16x3(w, &self.maxs)?;
        w.write_u16::<LittleEndian>(self.firstface)?;
        w.write_u16::<LittleEndian>(self.numfaces)
    }
}

/// Clip hull node. A negative child is a contents code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DClipnode {
    pub planenum: i32,
    pub children: [i16; 2],
}

impl LumpRecord for DClipnode {
    const SIZE: usize = 8;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(DClipnode {
            planenum: r.read_i32::<LittleEndian>()?,
            children: [r.read_i16::<LittleEndian>()?, r.read_i16::<LittleEndian>()?],
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.planenum)?;
        w.write_i16::<LittleEndian>(self.children[0])?;
        w.write_i16::<LittleEndian>(self.children[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexInfo {
    /// `[s, t]` axes: `xyz` scale and offset.
    pub vecs: [[f32; 4]; 2],
    pub miptex: i32,
    pub flags: i32,
}

impl LumpRecord for TexInfo {
    const SIZE: usize = 40;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut vecs = [[0.0; 4]; 2];
        for row in &mut vecs {
            for v in row.iter_mut() {
                *v = r.read_f32::<LittleEndian>()?;
            }
        }
        Ok(TexInfo {
            vecs,
            miptex: r.read_i32::<LittleEndian>()?,
            flags: r.read_i32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for row in &self.vecs {
            for v in row {
                w.write_f32::<LittleEndian>(*v)?;
            }
        }
        w.write_i32::<LittleEndian>(self.miptex)?;
        w.write_i32::<LittleEndian>(self.flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    /// Byte offset into the lighting lump, -1 for none.
    pub lightofs: i32,
}

impl LumpRecord for DFace {
    const SIZE: usize = 20;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let planenum = r.read_u16::<LittleEndian>()?;
        let side = r.read_i16::<LittleEndian>()?;
        let firstedge = r.read_i32::<LittleEndian>()?;
        let numedges = r.read_i16::<LittleEndian>()?;
        let texinfo = r.read_i16::<LittleEndian>()?;
        let mut styles = [0; MAXLIGHTMAPS];
        r.read_exact(&mut styles)?;
        Ok(DFace {
            planenum,
            side,
            firstedge,
            numedges,
            texinfo,
            styles,
            lightofs: r.read_i32::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.planenum)?;
        w.write_i16::<LittleEndian>(self.side)?;
        w.write_i32::<LittleEndian>(self.firstedge)?;
        w.write_i16::<LittleEndian>(self.numedges)?;
        w.write_i16::<LittleEndian>(self.texinfo)?;
        w.write_all(&self.styles)?;
        w.write_i32::<LittleEndian>(self.lightofs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DLeaf {
    pub contents: i32,
    /// Byte offset into the visibility lump, -1 for none.
    pub visofs: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstmarksurface: u16,
    pub nummarksurfaces: u16,
    pub ambient_level: [u8; NUM_AMBIENTS],
}

impl LumpRecord for DLeaf {
    const SIZE: usize = 28;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let contents = r.read_i32::<LittleEndian>()?;
        let visofs = r.read_i32::<LittleEndian>()?;
        let mins = read_i16x3(r)?;
        let maxs = read_i16x3(r)?;
        let firstmarksurface = r.read_u16::<LittleEndian>()?;
        let nummarksurfaces = r.read_u16::<LittleEndian>()?;
        let mut ambient_level = [0; NUM_AMBIENTS];
        r.read_exact(&mut ambient_level)?;
        Ok(DLeaf {
            contents,
            visofs,
            mins,
            maxs,
            firstmarksurface,
            nummarksurfaces,
            ambient_level,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.contents)?;
        w.write_i32::<LittleEndian>(self.visofs)?;
        write_i16x3(w, &self.mins)?;
        write_i16x3(w, &self.maxs)?;
        w.write_u16::<LittleEndian>(self.firstmarksurface)?;
        w.write_u16::<LittleEndian>(self.nummarksurfaces)?;
        w.write_all(&self.ambient_level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DEdge {
    pub v: [u16; 2],
}

impl LumpRecord for DEdge {
    const SIZE: usize = 4;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(DEdge {
            v: [r.read_u16::<LittleEndian>()?, r.read_u16::<LittleEndian>()?],
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.v[0])?;
        w.write_u16::<LittleEndian>(self.v[1])
    }
}

impl LumpRecord for u16 {
    const SIZE: usize = 2;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_u16::<LittleEndian>()
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(*self)
    }
}

impl LumpRecord for i32 {
    const SIZE: usize = 4;

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        r.read_i32::<LittleEndian>()
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(*self)
    }
}

/// Size of a miptex header: 16-byte name, width, height, four mip offsets.
pub const MIPTEX_HEADER_SIZE: usize = 40;

/// One entry of the texture lump. Pixel data (when the texture is embedded)
/// is kept as the raw bytes that follow the header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MipTex {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; 4],
    pub payload: Vec<u8>,
}

impl MipTex {
    /// A header-only entry; the engine loads pixels from a WAD by name.
    pub fn external(name: &str, width: u32, height: u32) -> Self {
        MipTex {
            name: name.to_string(),
            width,
            height,
            offsets: [0; 4],
            payload: Vec::new(),
        }
    }

    pub fn has_pixels(&self) -> bool {
        self.offsets[0] != 0 && !self.payload.is_empty()
    }

    /// Average colour of mip level 0 through the embedded palette.
    pub fn average_color(&self) -> Option<[f32; 3]> {
        if !self.has_pixels() {
            return None;
        }
        let base = MIPTEX_HEADER_SIZE;
        let w = self.width as usize;
        let h = self.height as usize;
        let mip0 = (self.offsets[0] as usize).checked_sub(base)?;
        let mip3 = (self.offsets[3] as usize).checked_sub(base)?;
        let palette = mip3 + (w / 8) * (h / 8) + 2;
        let pixels = self.payload.get(mip0..mip0 + w * h)?;
        let palette = self.payload.get(palette..palette + 768)?;
        if pixels.is_empty() {
            return None;
        }

        let mut sum = [0.0f64; 3];
        for &index in pixels {
            let i = index as usize * 3;
            for c in 0..3 {
                sum[c] += palette[i + c] as f64;
            }
        }
        let n = pixels.len() as f64 * 255.0;
        Some([
            (sum[0] / n) as f32,
            (sum[1] / n) as f32,
            (sum[2] / n) as f32,
        ])
    }
}

/// All lumps of a BSP file, decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BspFile {
    pub entities: String,
    pub planes: Vec<DPlane>,
    pub textures: Vec<MipTex>,
    pub vertexes: Vec<DVertex>,
    pub visibility: Vec<u8>,
    pub nodes: Vec<DNode>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub lighting: Vec<u8>,
    pub clipnodes: Vec<DClipnode>,
    pub leafs: Vec<DLeaf>,
    pub marksurfaces: Vec<u16>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub models: Vec<DModel>,
}

fn read_records<T: LumpRecord>(path: &Path, name: &str, bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(CompileError::corrupt(
            path,
            format!("{name} lump size {} is not a multiple of {}", bytes.len(), T::SIZE),
        ));
    }
    let mut cursor = Cursor::new(bytes);
    (0..bytes.len() / T::SIZE)
        .map(|_| T::read_from(&mut cursor).map_err(|e| CompileError::io(path, e)))
        .collect()
}

fn read_textures(path: &Path, bytes: &[u8]) -> Result<Vec<MipTex>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut cursor = Cursor::new(bytes);
    let corrupt = |reason: &str| CompileError::corrupt(path, format!("texture lump: {reason}"));
    let count = cursor
        .read_i32::<LittleEndian>()
        .map_err(|_| corrupt("missing count"))?;
    if count < 0 {
        return Err(corrupt("negative count"));
    }
    let offsets = (0..count)
        .map(|_| cursor.read_i32::<LittleEndian>())
        .collect::<io::Result<Vec<i32>>>()
        .map_err(|_| corrupt("truncated offsets"))?;

    // each entry runs to the next valid offset (or the end of the lump)
    let mut sorted: Vec<usize> = offsets
        .iter()
        .filter(|&&o| o >= 0)
        .map(|&o| o as usize)
        .collect();
    sorted.sort_unstable();
    sorted.push(bytes.len());

    let mut textures = Vec::with_capacity(offsets.len());
    for &offset in &offsets {
        if offset < 0 {
            textures.push(MipTex::default());
            continue;
        }
        let start = offset as usize;
        let end = sorted
            .iter()
            .copied()
            .find(|&o| o > start)
            .unwrap_or(bytes.len());
        let entry = bytes
            .get(start..end)
            .filter(|e| e.len() >= MIPTEX_HEADER_SIZE)
            .ok_or_else(|| corrupt("entry out of range"))?;

        let raw_name = &entry[..16];
        let name_len = match raw_name.iter().position(|&b| b == 0) {
            Some(n) => n,
            None => {
                tracing::warn!("texture lump: unterminated texture name");
                16
            },
        };
        let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();
        let mut header = Cursor::new(&entry[16..MIPTEX_HEADER_SIZE]);
        let mut fields = [0u32; 6];
        for f in &mut fields {
            *f = header
                .read_u32::<LittleEndian>()
                .map_err(|_| corrupt("truncated header"))?;
        }
        let [width, height, m0, m1, m2, m3] = fields;
        let mip_offsets = [m0, m1, m2, m3];
        textures.push(MipTex {
            name,
            width,
            height,
            offsets: mip_offsets,
            payload: if mip_offsets[0] != 0 {
                entry[MIPTEX_HEADER_SIZE..].to_vec()
            } else {
                Vec::new()
            },
        });
    }
    Ok(textures)
}

fn write_textures(textures: &[MipTex]) -> io::Result<Vec<u8>> {
    if textures.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    out.write_i32::<LittleEndian>(textures.len() as i32)?;
    let mut offset = 4 + 4 * textures.len();
    for t in textures {
        out.write_i32::<LittleEndian>(offset as i32)?;
        offset += MIPTEX_HEADER_SIZE + t.payload.len();
    }
    for t in textures {
        let mut name = [0u8; 16];
        let bytes = t.name.as_bytes();
        let n = bytes.len().min(15);
        name[..n].copy_from_slice(&bytes[..n]);
        out.write_all(&name)?;
        out.write_u32::<LittleEndian>(t.width)?;
        out.write_u32::<LittleEndian>(t.height)?;
        for o in &t.offsets {
            out.write_u32::<LittleEndian>(*o)?;
        }
        out.write_all(&t.payload)?;
    }
    Ok(out)
}

fn records_to_bytes<T: LumpRecord>(records: &[T]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(records.len() * T::SIZE);
    for r in records {
        r.write_to(&mut out)?;
    }
    Ok(out)
}

impl BspFile {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    /// Decodes a whole file. `path` is only used for error messages.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let header_size = 4 + HEADER_LUMPS * 8;
        if bytes.len() < header_size {
            return Err(CompileError::corrupt(path, "file is smaller than the header"));
        }
        let mut cursor = Cursor::new(bytes);
        let version = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| CompileError::io(path, e))?;
        if version != BSPVERSION {
            return Err(CompileError::corrupt(
                path,
                format!("version {version}, expected {BSPVERSION}"),
            ));
        }

        let mut lumps: [&[u8]; HEADER_LUMPS] = [&[]; HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            let ofs = cursor
                .read_i32::<LittleEndian>()
                .map_err(|e| CompileError::io(path, e))?;
            let len = cursor
                .read_i32::<LittleEndian>()
                .map_err(|e| CompileError::io(path, e))?;
            if ofs < 0 || len < 0 || ofs as usize + len as usize > bytes.len() {
                return Err(CompileError::corrupt(path, format!("lump {i} out of range")));
            }
            *lump = &bytes[ofs as usize..ofs as usize + len as usize];
        }

        let entity_bytes = lumps[LUMP_ENTITIES];
        let end = entity_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(entity_bytes.len());

        Ok(BspFile {
            entities: String::from_utf8_lossy(&entity_bytes[..end]).into_owned(),
            planes: read_records(path, "planes", lumps[LUMP_PLANES])?,
            textures: read_textures(path, lumps[LUMP_TEXTURES])?,
            vertexes: read_records(path, "vertexes", lumps[LUMP_VERTEXES])?,
            visibility: lumps[LUMP_VISIBILITY].to_vec(),
            nodes: read_records(path, "nodes", lumps[LUMP_NODES])?,
            texinfo: read_records(path, "texinfo", lumps[LUMP_TEXINFO])?,
            faces: read_records(path, "faces", lumps[LUMP_FACES])?,
            lighting: lumps[LUMP_LIGHTING].to_vec(),
            clipnodes: read_records(path, "clipnodes", lumps[LUMP_CLIPNODES])?,
            leafs: read_records(path, "leafs", lumps[LUMP_LEAFS])?,
            marksurfaces: read_records(path, "marksurfaces", lumps[LUMP_MARKSURFACES])?,
            edges: read_records(path, "edges", lumps[LUMP_EDGES])?,
            surfedges: read_records(path, "surfedges", lumps[LUMP_SURFEDGES])?,
            models: read_records(path, "models", lumps[LUMP_MODELS])?,
        })
    }

    /// Fails if any lump exceeds what the format's index fields can address.
    pub fn check_limits(&self) -> Result<()> {
        check_limit("models", self.models.len(), MAX_MAP_MODELS)?;
        check_limit("planes", self.planes.len(), MAX_MAP_PLANES)?;
        check_limit("nodes", self.nodes.len(), MAX_MAP_NODES)?;
        check_limit("clipnodes", self.clipnodes.len(), MAX_MAP_CLIPNODES)?;
        check_limit("leafs", self.leafs.len(), MAX_MAP_LEAFS)?;
        check_limit("vertexes", self.vertexes.len(), MAX_MAP_VERTS)?;
        check_limit("faces", self.faces.len(), MAX_MAP_FACES)?;
        check_limit("marksurfaces", self.marksurfaces.len(), MAX_MAP_MARKSURFACES)?;
        check_limit("texinfo", self.texinfo.len(), MAX_MAP_TEXINFO)?;
        check_limit("edges", self.edges.len(), MAX_MAP_EDGES)?;
        check_limit("surfedges", self.surfedges.len(), MAX_MAP_SURFEDGES)?;
        check_limit("textures", self.textures.len(), MAX_MAP_TEXTURES)?;
        check_limit("lighting", self.lighting.len(), MAX_MAP_LIGHTING)?;
        check_limit("visibility", self.visibility.len(), MAX_MAP_VISIBILITY)?;
        check_limit("entity text", self.entities.len() + 1, MAX_MAP_ENTSTRING)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.check_limits()?;
        let encode = || -> io::Result<Vec<u8>> {
            let mut entity_bytes = self.entities.as_bytes().to_vec();
            entity_bytes.push(0);

            let lumps: [Vec<u8>; HEADER_LUMPS] = [
                entity_bytes,
                records_to_bytes(&self.planes)?,
                write_textures(&self.textures)?,
                records_to_bytes(&self.vertexes)?,
                self.visibility.clone(),
                records_to_bytes(&self.nodes)?,
                records_to_bytes(&self.texinfo)?,
                records_to_bytes(&self.faces)?,
                self.lighting.clone(),
                records_to_bytes(&self.clipnodes)?,
                records_to_bytes(&self.leafs)?,
                records_to_bytes(&self.marksurfaces)?,
                records_to_bytes(&self.edges)?,
                records_to_bytes(&self.surfedges)?,
                records_to_bytes(&self.models)?,
            ];

            let header_size = 4 + HEADER_LUMPS * 8;
            let mut out = Vec::with_capacity(header_size + lumps.iter().map(Vec::len).sum::<usize>());
            out.write_i32::<LittleEndian>(BSPVERSION)?;
            out.resize(header_size, 0);

            let mut directory = Vec::with_capacity(HEADER_LUMPS);
            for lump in &lumps {
                let ofs = out.len();
                out.extend_from_slice(lump);
                directory.push((ofs as i32, lump.len() as i32));
                while out.len() % 4 != 0 {
                    out.push(0);
                }
            }

            let mut header = Cursor::new(&mut out[4..header_size]);
            for (ofs, len) in directory {
                header.write_i32::<LittleEndian>(ofs)?;
                header.write_i32::<LittleEndian>(len)?;
            }
            Ok(out)
        };
        encode().map_err(|e| CompileError::Internal(format!("encoding bsp: {e}")))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| CompileError::io(path, e))?;
        tracing::debug!(
            "wrote {}: {} planes, {} nodes, {} leafs, {} faces, {} models",
            path.display(),
            self.planes.len(),
            self.nodes.len(),
            self.leafs.len(),
            self.faces.len(),
            self.models.len()
        );
        Ok(())
    }

    /// Logs the size of each lump against its limit.
    pub fn print_usage(&self) {
        let rows: [(&str, usize, usize, usize); 14] = [
            ("models", self.models.len(), MAX_MAP_MODELS, DModel::SIZE),
            ("planes", self.planes.len(), MAX_MAP_PLANES, DPlane::SIZE),
            ("vertexes", self.vertexes.len(), MAX_MAP_VERTS, DVertex::SIZE),
            ("nodes", self.nodes.len(), MAX_MAP_NODES, DNode::SIZE),
            ("texinfos", self.texinfo.len(), MAX_MAP_TEXINFO, TexInfo::SIZE),
            ("faces", self.faces.len(), MAX_MAP_FACES, DFace::SIZE),
            ("clipnodes", self.clipnodes.len(), MAX_MAP_CLIPNODES, DClipnode::SIZE),
            ("leaves", self.leafs.len(), MAX_MAP_LEAFS, DLeaf::SIZE),
            ("marksurfaces", self.marksurfaces.len(), MAX_MAP_MARKSURFACES, 2),
            ("surfedges", self.surfedges.len(), MAX_MAP_SURFEDGES, 4),
            ("edges", self.edges.len(), MAX_MAP_EDGES, DEdge::SIZE),
            ("texdata", self.textures.len(), MAX_MAP_TEXTURES, MIPTEX_HEADER_SIZE),
            ("lightdata", self.lighting.len(), MAX_MAP_LIGHTING, 1),
            ("visdata", self.visibility.len(), MAX_MAP_VISIBILITY, 1),
        ];
        for (name, count, limit, size) in rows {
            tracing::debug!(
                "{name:<14} {count:>7}/{limit:<8} {:>9} bytes ({:5.1}%)",
                count * size,
                count as f64 * 100.0 / limit as f64
            );
        }
        tracing::debug!(
            "{:<14} {:>7}/{:<8}",
            "entdata",
            self.entities.len() + 1,
            MAX_MAP_ENTSTRING
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_layout() {
        let mut buf = Vec::new();
        DFace::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DFace::SIZE);
        buf.clear();
        DLeaf::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DLeaf::SIZE);
        buf.clear();
        DNode::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DNode::SIZE);
        buf.clear();
        DModel::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DModel::SIZE);
        buf.clear();
        TexInfo::default().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), TexInfo::SIZE);
    }

    #[test]
    fn lumps_are_aligned() {
        let bsp = BspFile {
            entities: "{\n\"classname\" \"worldspawn\"\n}\n".into(),
            visibility: vec![1, 2, 3],
            planes: vec![DPlane::default()],
            ..Default::default()
        };
        let bytes = bsp.to_bytes().unwrap();
        let mut cursor = Cursor::new(&bytes[4..]);
        for _ in 0..HEADER_LUMPS {
            let ofs = cursor.read_i32::<LittleEndian>().unwrap();
            let _ = cursor.read_i32::<LittleEndian>().unwrap();
            assert_eq!(ofs % 4, 0);
        }
    }
}
