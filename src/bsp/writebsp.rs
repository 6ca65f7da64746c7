//! Turns finished trees into BSP lumps.

use crate::aabb::Aabb;
use crate::bsp::node::{NodeId, Tree};
use crate::bsp::subdivide::subdivide_face;
use crate::contents::Contents;
use crate::errors::{CompileError, Result, check_limit};
use crate::float_types::{Real, tolerance};
use crate::geometry::{PlaneTable, Winding};
use crate::io::bspfile::{
    BspFile, DClipnode, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DVertex, MAX_MAP_CLIPNODES,
    MAX_MAP_EDGES, MAX_MAP_FACES, MAX_MAP_LEAFS, MAX_MAP_MARKSURFACES, MAX_MAP_NODES,
    MAX_MAP_PLANES, MAX_MAP_SURFEDGES, MAX_MAP_VERTS, MAXLIGHTMAPS,
};
use crate::map::texinfo::is_nodraw_texture;
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// Vertexes closer than this share an index.
const VERTEX_GRID: Real = 0.01;

fn to_i16(v: Real) -> i16 {
    v.clamp(i16::MIN as Real, i16::MAX as Real) as i16
}

/// Leaf code of a clip hull; clip brushes collide like solid.
fn clip_contents(contents: Contents) -> i16 {
    match contents.leaf_contents() {
        Contents::Clip => Contents::Solid.code() as i16,
        other => other.code() as i16,
    }
}

fn bounds_i16(bounds: &Aabb) -> ([i16; 3], [i16; 3]) {
    if bounds.is_cleared() {
        return ([0; 3], [0; 3]);
    }
    (
        [0, 1, 2].map(|i| to_i16(bounds.mins[i].floor())),
        [0, 1, 2].map(|i| to_i16(bounds.maxs[i].ceil())),
    )
}

/// Accumulates the lumps of every model.
pub struct BspWriter {
    pub bsp: BspFile,
    subdivide_size: Real,
    plane_map: HashMap<usize, usize>,
    vertex_map: HashMap<[i64; 3], u16>,
    edge_map: HashMap<(u16, u16), usize>,
    edge_shared: Vec<bool>,
}

/// The trees of one model.
pub struct ModelTrees<'a> {
    pub hull0: &'a Tree,
    /// Hulls 1-3; `None` when clip hulls are disabled.
    pub clip: [Option<&'a Tree>; 3],
    pub origin: Vector3<Real>,
    /// Only the world's leafs take part in visibility.
    pub world: bool,
}

impl BspWriter {
    /// Starts from the seed file of the CSG stage, dropping any geometry a
    /// previous run left in it.
    pub fn new(seed: BspFile, subdivide_size: Real) -> Self {
        let bsp = BspFile {
            entities: seed.entities,
            texinfo: seed.texinfo,
            textures: seed.textures,
            // leaf 0 is the shared solid leaf, edge 0 is never referenced
            leafs: vec![DLeaf {
                contents: Contents::Solid.code(),
                visofs: -1,
                ..DLeaf::default()
            }],
            edges: vec![DEdge::default()],
            ..BspFile::default()
        };
        BspWriter {
            bsp,
            subdivide_size,
            plane_map: HashMap::new(),
            vertex_map: HashMap::new(),
            edge_map: HashMap::new(),
            edge_shared: vec![true],
        }
    }

    /// Output index of the pair `planenum` belongs to. Pairs are written
    /// whole, the canonical plane at the even index and its negation after.
    fn emit_plane(&mut self, planenum: usize, planes: &PlaneTable) -> Result<usize> {
        let canonical = planenum & !1;
        if let Some(&i) = self.plane_map.get(&canonical) {
            return Ok(i);
        }
        check_limit("planes", self.bsp.planes.len() + 2, MAX_MAP_PLANES)?;
        let index = self.bsp.planes.len();
        for p in [planes.get(canonical), planes.get(canonical | 1)] {
            self.bsp.planes.push(DPlane {
                normal: [p.normal.x as f32, p.normal.y as f32, p.normal.z as f32],
                dist: p.dist as f32,
                kind: p.kind as i32,
            });
        }
        self.plane_map.insert(canonical, index);
        Ok(index)
    }

    fn emit_vertex(&mut self, p: &Point3<Real>) -> Result<u16> {
        let key = [0, 1, 2].map(|i| (p[i] / VERTEX_GRID).round() as i64);
        if let Some(&v) = self.vertex_map.get(&key) {
            return Ok(v);
        }
        check_limit("vertexes", self.bsp.vertexes.len() + 1, MAX_MAP_VERTS)?;
        let index = self.bsp.vertexes.len() as u16;
        self.bsp.vertexes.push(DVertex {
            point: [p.x as f32, p.y as f32, p.z as f32],
        });
        self.vertex_map.insert(key, index);
        Ok(index)
    }

    /// Surfedge for `a → b`; reuses the reverse edge of a face emitted
    /// earlier when it is not yet shared.
    fn emit_edge(&mut self, a: u16, b: u16) -> Result<i32> {
        if let Some(&e) = self.edge_map.get(&(b, a)) {
            if !self.edge_shared[e] {
                self.edge_shared[e] = true;
                return Ok(-(e as i32));
            }
        }
        check_limit("edges", self.bsp.edges.len() + 1, MAX_MAP_EDGES)?;
        let e = self.bsp.edges.len();
        self.bsp.edges.push(DEdge { v: [a, b] });
        self.edge_shared.push(false);
        self.edge_map.entry((a, b)).or_insert(e);
        Ok(e as i32)
    }

    fn emit_face(
        &mut self,
        planenum: usize,
        texinfo: i32,
        winding: &Winding,
        planes: &PlaneTable,
    ) -> Result<usize> {
        check_limit("faces", self.bsp.faces.len() + 1, MAX_MAP_FACES)?;
        let plane = self.emit_plane(planenum, planes)?;

        let mut indices = Vec::with_capacity(winding.len());
        for p in &winding.points {
            let v = self.emit_vertex(p)?;
            if indices.last() != Some(&v) {
                indices.push(v);
            }
        }
        if indices.len() > 1 && indices.first() == indices.last() {
            indices.pop();
        }

        let firstedge = self.bsp.surfedges.len();
        check_limit("surfedges", firstedge + indices.len(), MAX_MAP_SURFEDGES)?;
        for i in 0..indices.len() {
            let e = self.emit_edge(indices[i], indices[(i + 1) % indices.len()])?;
            self.bsp.surfedges.push(e);
        }

        let mut styles = [255u8; MAXLIGHTMAPS];
        styles[0] = 0;
        self.bsp.faces.push(DFace {
            planenum: plane as u16,
            side: (planenum & 1) as i16,
            firstedge: firstedge as i32,
            numedges: indices.len() as i16,
            texinfo: texinfo as i16,
            styles,
            lightofs: -1,
        });
        Ok(self.bsp.faces.len() - 1)
    }

    fn texture_is_nodraw(&self, texinfo: i32) -> bool {
        let Some(tx) = usize::try_from(texinfo)
            .ok()
            .and_then(|t| self.bsp.texinfo.get(t))
        else {
            return true;
        };
        usize::try_from(tx.miptex)
            .ok()
            .and_then(|m| self.bsp.textures.get(m))
            .is_some_and(|t| is_nodraw_texture(&t.name))
    }

    /// Appends one model and returns its index.
    pub fn write_model(&mut self, trees: &ModelTrees<'_>, planes: &PlaneTable) -> Result<usize> {
        let tree = trees.hull0;
        let epsilon = tolerance();

        // faces that face into open space and are drawn
        let mut visible = vec![false; tree.faces.len()];
        for l in tree.leaves_under(tree.root) {
            if let Some(leaf) = tree.node(l).as_leaf() {
                if leaf.contents != Contents::Solid {
                    for &f in &leaf.mark_faces {
                        visible[f] = true;
                    }
                }
            }
        }

        // faces grouped per node, in node order
        let firstface = self.bsp.faces.len();
        let mut output_faces: Vec<Vec<usize>> = vec![Vec::new(); tree.faces.len()];
        let mut node_faces: HashMap<NodeId, (usize, usize)> = HashMap::new();
        let mut bounds = Aabb::cleared();
        for node in self.decision_order(tree) {
            let first = self.bsp.faces.len();
            for &f in &tree.node(node).faces {
                let face = &tree.faces[f];
                if !visible[f] || self.texture_is_nodraw(face.texinfo) {
                    continue;
                }
                let tex = self.bsp.texinfo[face.texinfo as usize];
                for piece in subdivide_face(face.winding.clone(), &tex, self.subdivide_size, epsilon) {
                    bounds.add_box(&piece.bounds());
                    let out = self.emit_face(face.planenum, face.texinfo, &piece, planes)?;
                    output_faces[f].push(out);
                }
            }
            node_faces.insert(node, (first, self.bsp.faces.len() - first));
        }
        let numfaces = self.bsp.faces.len() - firstface;

        let first_leaf = self.bsp.leafs.len();
        let headnode0 = self.emit_node(tree, tree.root, &node_faces, &output_faces, planes)?;
        let visleafs = if trees.world {
            self.bsp.leafs.len() - first_leaf
        } else {
            0
        };

        let mut headnode = [headnode0 as i32, 0, 0, 0];
        for (i, clip) in trees.clip.iter().enumerate() {
            if let Some(clip) = clip {
                headnode[i + 1] = self.emit_clipnode(clip, clip.root, planes)? as i32;
            }
        }

        if bounds.is_cleared() {
            bounds = Aabb::new(Point3::origin(), Point3::origin());
        }
        let bounds = bounds.expanded(1.0);
        let to_f32 = |p: &Point3<Real>| [p.x as f32, p.y as f32, p.z as f32];
        self.bsp.models.push(DModel {
            mins: to_f32(&bounds.mins),
            maxs: to_f32(&bounds.maxs),
            origin: [
                trees.origin.x as f32,
                trees.origin.y as f32,
                trees.origin.z as f32,
            ],
            headnode,
            visleafs: visleafs as i32,
            firstface: firstface as i32,
            numfaces: numfaces as i32,
        });
        Ok(self.bsp.models.len() - 1)
    }

    /// Decision nodes in the order [`Self::emit_node`] writes them.
    fn decision_order(&self, tree: &Tree) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![tree.root];
        while let Some(n) = stack.pop() {
            if let Some([front, back]) = tree.node(n).children() {
                out.push(n);
                stack.push(back);
                stack.push(front);
            }
        }
        out
    }

    fn emit_leaf(&mut self, tree: &Tree, id: NodeId, output_faces: &[Vec<usize>]) -> Result<i32> {
        let node = tree.node(id);
        let Some(leaf) = node.as_leaf() else {
            return Err(CompileError::Internal(format!("node {id} is not a leaf")));
        };
        if leaf.contents == Contents::Solid {
            return Ok(-1);
        }

        let first = self.bsp.marksurfaces.len();
        for &f in &leaf.mark_faces {
            for &out in &output_faces[f] {
                self.bsp.marksurfaces.push(out as u16);
            }
        }
        check_limit("marksurfaces", self.bsp.marksurfaces.len(), MAX_MAP_MARKSURFACES)?;
        check_limit("leafs", self.bsp.leafs.len() + 1, MAX_MAP_LEAFS)?;

        let (mins, maxs) = bounds_i16(&node.bounds);
        self.bsp.leafs.push(DLeaf {
            contents: leaf.contents.leaf_contents().code(),
            visofs: -1,
            mins,
            maxs,
            firstmarksurface: first as u16,
            nummarksurfaces: (self.bsp.marksurfaces.len() - first) as u16,
            ambient_level: [0; 4],
        });
        Ok(-(self.bsp.leafs.len() as i32 - 1) - 1)
    }

    fn emit_node(
        &mut self,
        tree: &Tree,
        id: NodeId,
        node_faces: &HashMap<NodeId, (usize, usize)>,
        output_faces: &[Vec<usize>],
        planes: &PlaneTable,
    ) -> Result<usize> {
        let node = tree.node(id);
        let (Some(planenum), Some(children)) = (node.planenum(), node.children()) else {
            // a lone leaf still needs a node above it
            let child = self.emit_leaf(tree, id, output_faces)?;
            let plane = self.emit_plane(0, planes)?;
            check_limit("nodes", self.bsp.nodes.len() + 1, MAX_MAP_NODES)?;
            let (mins, maxs) = bounds_i16(&node.bounds);
            self.bsp.nodes.push(DNode {
                planenum: plane as i32,
                children: [child as i16, child as i16],
                mins,
                maxs,
                firstface: 0,
                numfaces: 0,
            });
            return Ok(self.bsp.nodes.len() - 1);
        };

        check_limit("nodes", self.bsp.nodes.len() + 1, MAX_MAP_NODES)?;
        let index = self.bsp.nodes.len();
        let (mins, maxs) = bounds_i16(&node.bounds);
        let (firstface, numfaces) = node_faces.get(&id).copied().unwrap_or((0, 0));
        let plane = self.emit_plane(planenum, planes)?;
        self.bsp.nodes.push(DNode {
            planenum: plane as i32,
            children: [0, 0],
            mins,
            maxs,
            firstface: firstface as u16,
            numfaces: numfaces as u16,
        });

        for (side, child) in children.into_iter().enumerate() {
            let value = if tree.node(child).children().is_some() {
                self.emit_node(tree, child, node_faces, output_faces, planes)? as i32
            } else {
                self.emit_leaf(tree, child, output_faces)?
            };
            self.bsp.nodes[index].children[side] = value as i16;
        }
        Ok(index)
    }

    fn emit_clipnode(&mut self, tree: &Tree, id: NodeId, planes: &PlaneTable) -> Result<usize> {
        let node = tree.node(id);
        check_limit("clipnodes", self.bsp.clipnodes.len() + 1, MAX_MAP_CLIPNODES)?;
        let index = self.bsp.clipnodes.len();

        let Some(planenum) = node.planenum() else {
            let contents = clip_contents(node.as_leaf().map_or(Contents::Solid, |l| l.contents));
            let plane = self.emit_plane(0, planes)?;
            self.bsp.clipnodes.push(DClipnode {
                planenum: plane as i32,
                children: [contents, contents],
            });
            return Ok(index);
        };

        let plane = self.emit_plane(planenum, planes)?;
        self.bsp.clipnodes.push(DClipnode {
            planenum: plane as i32,
            children: [0, 0],
        });
        let children = node.children().unwrap_or([id, id]);
        for (side, child) in children.into_iter().enumerate() {
            let value = match tree.node(child).as_leaf() {
                Some(leaf) => clip_contents(leaf.contents),
                None => self.emit_clipnode(tree, child, planes)? as i16,
            };
            self.bsp.clipnodes[index].children[side] = value;
        }
        Ok(index)
    }

    pub fn finish(self) -> BspFile {
        self.bsp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_edges_are_shared_once() {
        let mut writer = BspWriter::new(BspFile::default(), 240.0);
        let a = writer.emit_vertex(&Point3::new(0.0, 0.0, 0.0)).unwrap();
        let b = writer.emit_vertex(&Point3::new(64.0, 0.0, 0.0)).unwrap();
        assert_eq!(writer.emit_vertex(&Point3::new(64.001, 0.0, 0.0)).unwrap(), b);
        let e = writer.emit_edge(a, b).unwrap();
        assert_eq!(writer.emit_edge(b, a).unwrap(), -e);
        // a third face along the same line gets its own edge
        assert_ne!(writer.emit_edge(b, a).unwrap(), -e);
    }
}
