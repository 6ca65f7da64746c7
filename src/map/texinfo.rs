//! Texture projection and the shared texinfo table.

use crate::errors::{Result, check_limit};
use crate::float_types::{PI, Real};
use crate::io::bspfile::{MAX_MAP_TEXINFO, MAX_MAP_TEXTURES, MipTex, TEX_SPECIAL, TexInfo};
use hashbrown::HashMap;
use nalgebra::Vector3;
use parking_lot::Mutex;

/// Size recorded in the texture lump for textures loaded from WADs by name.
pub const DEFAULT_TEXTURE_SIZE: u32 = 64;

/// How a brush side maps its texture, as written in the map file.
#[derive(Debug, Clone, PartialEq)]
pub enum TexProjection {
    /// `xoff yoff rot xscale yscale`, axes picked from the face normal.
    Standard {
        shift: [Real; 2],
        rotate: Real,
        scale: [Real; 2],
    },
    /// `[ ux uy uz uoff ] [ vx vy vz voff ] rot xscale yscale`.
    Valve220 {
        axes: [Vector3<Real>; 2],
        shift: [Real; 2],
        scale: [Real; 2],
    },
}

#[rustfmt::skip]
const BASE_AXIS: [[[Real; 3]; 3]; 6] = [
    [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]],   // floor
    [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]],  // ceiling
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],   // west wall
    [[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]],  // east wall
    [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],   // south wall
    [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],  // north wall
];

/// Texture s/t axes for a face normal in the standard format.
pub fn texture_axis_from_plane(normal: &Vector3<Real>) -> (Vector3<Real>, Vector3<Real>) {
    let mut best = 0;
    let mut best_dot = 0.0;
    for (i, axis) in BASE_AXIS.iter().enumerate() {
        let dot = normal.dot(&Vector3::from(axis[0]));
        if dot > best_dot {
            best_dot = dot;
            best = i;
        }
    }
    (Vector3::from(BASE_AXIS[best][1]), Vector3::from(BASE_AXIS[best][2]))
}

fn fix_scale(scale: [Real; 2], texture: &str) -> [Real; 2] {
    scale.map(|s| {
        if s == 0.0 {
            tracing::warn!("texture '{texture}': zero scale, using 1");
            1.0
        } else {
            s
        }
    })
}

/// Texture names that never get a lightmap.
pub fn is_special_texture(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("sky")
        || lower.starts_with('!')
        || lower.starts_with('*')
        || lower.starts_with("aaatrigger")
        || is_nodraw_texture(&lower)
}

/// Texture names whose faces are never rendered.
pub fn is_nodraw_texture(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "null" | "hint" | "skip" | "clip" | "origin" | "boundingbox"
    )
}

/// Builds the texinfo of a brush side. `origin` is the owning entity's origin
/// when its planes were made origin-relative.
pub fn texinfo_for_side(
    texture: &str,
    projection: &TexProjection,
    normal: &Vector3<Real>,
    origin: &Vector3<Real>,
    miptex: i32,
) -> TexInfo {
    let (axes, shift, scale) = match projection {
        TexProjection::Standard { shift, rotate, scale } => {
            let (mut s, mut t) = texture_axis_from_plane(normal);
            let (sinv, cosv) = match *rotate {
                r if r == 0.0 => (0.0, 1.0),
                r if r == 90.0 => (1.0, 0.0),
                r if r == 180.0 => (0.0, -1.0),
                r if r == 270.0 => (-1.0, 0.0),
                r => {
                    let a = r / 180.0 * PI;
                    (a.sin(), a.cos())
                },
            };
            let sv = (0..3).find(|&i| s[i] != 0.0).unwrap_or(0);
            let tv = (0..3).find(|&i| t[i] != 0.0).unwrap_or(1);
            for v in [&mut s, &mut t] {
                let ns = cosv * v[sv] - sinv * v[tv];
                let nt = sinv * v[sv] + cosv * v[tv];
                v[sv] = ns;
                v[tv] = nt;
            }
            ([s, t], *shift, *scale)
        },
        TexProjection::Valve220 { axes, shift, scale } => {
            if axes.iter().any(|a| a.norm() < 1e-6) {
                tracing::warn!("texture '{texture}': zero-length texture axis, using defaults");
                let (s, t) = texture_axis_from_plane(normal);
                ([s, t], *shift, *scale)
            } else {
                (*axes, *shift, *scale)
            }
        },
    };
    let scale = fix_scale(scale, texture);

    let mut tx = TexInfo {
        miptex,
        flags: if is_special_texture(texture) { TEX_SPECIAL } else { 0 },
        ..TexInfo::default()
    };
    for i in 0..2 {
        let v = axes[i] / scale[i];
        tx.vecs[i] = [
            v.x as f32,
            v.y as f32,
            v.z as f32,
            (shift[i] + origin.dot(&v)) as f32,
        ];
    }
    tx
}

/// Bit-exact key for texinfo deduplication.
type TexinfoKey = ([u32; 8], i32, i32);

fn key_of(tx: &TexInfo) -> TexinfoKey {
    let mut bits = [0u32; 8];
    for i in 0..2 {
        for j in 0..4 {
            bits[i * 4 + j] = tx.vecs[i][j].to_bits();
        }
    }
    (bits, tx.miptex, tx.flags)
}

#[derive(Debug, Default)]
struct TexinfoInner {
    texinfo: Vec<TexInfo>,
    lookup: HashMap<TexinfoKey, usize>,
    textures: Vec<MipTex>,
    texture_lookup: HashMap<String, usize>,
}

/// Deduplicated texinfo and texture-name table. Appends take a short lock so
/// brushes can be processed in parallel.
#[derive(Debug, Default)]
pub struct TexinfoTable {
    inner: Mutex<TexinfoInner>,
}

impl TexinfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the lumps of an existing BSP.
    pub fn from_lumps(texinfo: Vec<TexInfo>, textures: Vec<MipTex>) -> Self {
        let lookup = texinfo.iter().enumerate().map(|(i, t)| (key_of(t), i)).collect();
        let texture_lookup = textures
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.to_ascii_lowercase(), i))
            .collect();
        TexinfoTable {
            inner: Mutex::new(TexinfoInner {
                texinfo,
                lookup,
                textures,
                texture_lookup,
            }),
        }
    }

    /// Index of the texture lump entry for `name`, added on first use.
    pub fn texture_index(&self, name: &str) -> Result<i32> {
        let mut inner = self.inner.lock();
        let key = name.to_ascii_lowercase();
        if let Some(&i) = inner.texture_lookup.get(&key) {
            return Ok(i as i32);
        }
        check_limit("textures", inner.textures.len() + 1, MAX_MAP_TEXTURES)?;
        let index = inner.textures.len();
        inner
            .textures
            .push(MipTex::external(name, DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE));
        inner.texture_lookup.insert(key, index);
        Ok(index as i32)
    }

    pub fn find_or_insert(&self, tx: TexInfo) -> Result<usize> {
        let key = key_of(&tx);
        let mut inner = self.inner.lock();
        if let Some(&i) = inner.lookup.get(&key) {
            return Ok(i);
        }
        check_limit("texinfo", inner.texinfo.len() + 1, MAX_MAP_TEXINFO)?;
        let index = inner.texinfo.len();
        inner.texinfo.push(tx);
        inner.lookup.insert(key, index);
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<TexInfo> {
        self.inner.lock().texinfo.get(index).copied()
    }

    /// Name of the texture a texinfo refers to.
    pub fn texture_name(&self, texinfo: usize) -> Option<String> {
        let inner = self.inner.lock();
        let tx = inner.texinfo.get(texinfo)?;
        inner
            .textures
            .get(usize::try_from(tx.miptex).ok()?)
            .map(|t| t.name.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().texinfo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_lumps(self) -> (Vec<TexInfo>, Vec<MipTex>) {
        let inner = self.inner.into_inner();
        (inner.texinfo, inner.textures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_uses_xy_axes() {
        let (s, t) = texture_axis_from_plane(&Vector3::z());
        assert_eq!(s, Vector3::x());
        assert_eq!(t, -Vector3::y());
    }

    #[test]
    fn identical_texinfo_is_shared() {
        let table = TexinfoTable::new();
        let miptex = table.texture_index("CRATE").unwrap();
        assert_eq!(table.texture_index("crate").unwrap(), miptex);
        let proj = TexProjection::Standard {
            shift: [0.0, 0.0],
            rotate: 0.0,
            scale: [1.0, 1.0],
        };
        let a = texinfo_for_side("CRATE", &proj, &Vector3::z(), &Vector3::zeros(), miptex);
        let b = texinfo_for_side("CRATE", &proj, &Vector3::z(), &Vector3::zeros(), miptex);
        assert_eq!(
            table.find_or_insert(a).unwrap(),
            table.find_or_insert(b).unwrap()
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn zero_scale_falls_back_to_one() {
        let proj = TexProjection::Standard {
            shift: [0.0, 0.0],
            rotate: 0.0,
            scale: [0.0, 2.0],
        };
        let tx = texinfo_for_side("a", &proj, &Vector3::z(), &Vector3::zeros(), 0);
        assert_eq!(tx.vecs[0][0], 1.0);
        assert_eq!(tx.vecs[1][1], -0.5);
    }
}
