//! Bounding Volume Hierarchy over triangle meshes.
//!
//! Binary SAH tree with spatial pre-splitting and reinsertion
//! optimization. Nodes are 32 bytes; the two children of an inner node
//! are stored at contiguous indices and the root is node 0.

mod build;
mod optimize;

use crate::PrecomputedTri;
use lumo_math::{Aabb, Ray, Vec3};
use rayon::prelude::*;

/// Capacity of the traversal stack.
pub const TRAVERSAL_STACK_SIZE: usize = 64;
/// Capacity of the per-triangle pre-split stack.
pub const PRESPLIT_STACK_SIZE: usize = 32;
/// Reference count below which subtrees are built sequentially.
pub const PARALLEL_THRESHOLD: usize = 1000;

const TRAVERSAL_COST: f32 = 1.0;

/// Result of a traversal query. `tri < 0` means the ray missed.
#[derive(Debug, Copy, Clone)]
pub struct Hit {
    /// Source triangle index, or -1 on a miss
    pub tri: i32,
    /// Ray parameter of the intersection
    pub t: f32,
    /// Barycentric coordinates
    pub u: f32,
    pub v: f32,
}

impl Hit {
    pub fn none() -> Self {
        Self {
            tri: -1,
            t: f32::MAX,
            u: 0.0,
            v: 0.0,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.tri >= 0
    }
}

/// A BVH node. `count > 0` tags a leaf holding `count` primitives starting
/// at `first` in the primitive-id array; otherwise the node is inner with
/// `count = -axis` and children at `first` and `first + 1`.
#[derive(Debug, Copy, Clone)]
struct Node {
    min: Vec3,
    max: Vec3,
    first: u32,
    count: i32,
}

impl Node {
    fn bbox(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    fn is_leaf(&self) -> bool {
        self.count > 0
    }

    /// Slab test with precomputed reciprocal direction. `oct` selects the
    /// near bound per axis; a hit exists iff `t0 <= t1`.
    #[inline]
    fn intersect(
        &self,
        oct: [bool; 3],
        inv_dir: Vec3,
        org_div_dir: Vec3,
        tmin: f32,
        tmax: f32,
    ) -> (f32, f32) {
        let (nx, fx) = if oct[0] {
            (self.max.x, self.min.x)
        } else {
            (self.min.x, self.max.x)
        };
        let (ny, fy) = if oct[1] {
            (self.max.y, self.min.y)
        } else {
            (self.min.y, self.max.y)
        };
        let (nz, fz) = if oct[2] {
            (self.max.z, self.min.z)
        } else {
            (self.min.z, self.max.z)
        };
        let t0x = nx * inv_dir.x - org_div_dir.x;
        let t1x = fx * inv_dir.x - org_div_dir.x;
        let t0y = ny * inv_dir.y - org_div_dir.y;
        let t1y = fy * inv_dir.y - org_div_dir.y;
        let t0z = nz * inv_dir.z - org_div_dir.z;
        let t1z = fz * inv_dir.z - org_div_dir.z;
        let t0 = t0x.max(t0y).max(tmin.max(t0z));
        let t1 = t1x.min(t1y).min(tmax.min(t1z));
        (t0, t1)
    }
}

/// Bounding Volume Hierarchy.
#[derive(Debug)]
pub struct Bvh {
    nodes: Vec<Node>,
    prim_ids: Vec<u32>,
    tris: Vec<PrecomputedTri>,
}

impl Bvh {
    /// Build a BVH from a vertex array and `4 * num_tris` indices
    /// (triangle `i` uses `indices[4i..4i+3]`; `indices[4i+3]` is the
    /// material id and is ignored here).
    pub fn build(verts: &[Vec3], indices: &[u32]) -> Self {
        let num_tris = indices.len() / 4;
        if num_tris == 0 {
            return Self {
                nodes: Vec::new(),
                prim_ids: Vec::new(),
                tris: Vec::new(),
            };
        }

        // Compute the global bounding box
        let global_bbox = (0..num_tris)
            .into_par_iter()
            .map(|i| {
                let mut bb = Aabb::from_point(verts[indices[i * 4] as usize]);
                bb.extend_point(verts[indices[i * 4 + 1] as usize]);
                bb.extend_point(verts[indices[i * 4 + 2] as usize]);
                bb
            })
            .reduce(Aabb::empty, |a, b| Aabb::surrounding(&a, &b));

        let max_refs = num_tris * 3 / 2;
        let mut bboxes = vec![Aabb::EMPTY; max_refs];
        let mut centers = vec![Vec3::ZERO; max_refs];
        let mut refs = vec![0u32; max_refs];

        let threshold = global_bbox.volume() / (1 << 14) as f32;
        let num_refs = build::pre_split(
            verts,
            indices,
            num_tris,
            threshold,
            max_refs,
            &mut bboxes,
            &mut centers,
            &mut refs,
        );

        let (mut nodes, mut prim_ids) = build::build_top_down(
            global_bbox,
            &bboxes[..num_refs],
            &centers[..num_refs],
            num_refs,
        );

        fix_refs(&mut nodes, &mut prim_ids, &refs);
        optimize::optimize(&mut nodes, 3);

        // Reorganize triangle data for the intersection kernel, in leaf
        // order.
        let tris: Vec<PrecomputedTri> = prim_ids
            .par_iter()
            .map(|&tri_id| {
                let i = tri_id as usize * 4;
                PrecomputedTri::new(
                    verts[indices[i] as usize],
                    verts[indices[i + 1] as usize],
                    verts[indices[i + 2] as usize],
                )
            })
            .collect();

        log::info!(
            "Built BVH: {} nodes, {} references for {} triangles",
            nodes.len(),
            num_refs,
            num_tris
        );

        Self {
            nodes,
            prim_ids,
            tris,
        }
    }

    /// Number of nodes in the hierarchy.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Traverse the BVH for the closest intersection, or any intersection
    /// when `ANY` is set (early-out occlusion queries).
    pub fn traverse<const ANY: bool>(&self, ray: &Ray) -> Hit {
        let mut hit = Hit {
            tri: -1,
            t: ray.tmax,
            u: 0.0,
            v: 0.0,
        };
        if self.nodes.is_empty() {
            return hit;
        }

        let oct = [ray.dir.x <= 0.0, ray.dir.y <= 0.0, ray.dir.z <= 0.0];
        // Zero direction components would turn the slab test into
        // 0 * inf = NaN. The stand-in only ever over-approximates; it is
        // negative because the octant classifies zero as negative.
        let safe = |d: f32| if d == 0.0 { -1e-20 } else { d };
        let inv_dir = Vec3::new(safe(ray.dir.x), safe(ray.dir.y), safe(ray.dir.z)).recip();
        let org_div_dir = ray.org * inv_dir;

        let root = self.nodes[0];
        if root.is_leaf() {
            let (t0, t1) = root.intersect(oct, inv_dir, org_div_dir, ray.tmin, hit.t);
            if t0 <= t1 {
                self.intersect_leaf::<ANY>(&root, ray, &mut hit);
            }
            return self.remap(hit);
        }

        let mut stack = [0u32; TRAVERSAL_STACK_SIZE];
        let mut sp = 0usize;
        let mut top = root.first as usize;

        loop {
            let left = self.nodes[top];
            let right = self.nodes[top + 1];

            // Intersect the two children of this node
            let (lt0, lt1) = left.intersect(oct, inv_dir, org_div_dir, ray.tmin, hit.t);
            let (rt0, rt1) = right.intersect(oct, inv_dir, org_div_dir, ray.tmin, hit.t);

            let mut child = [-1i64; 2];
            if lt0 <= lt1 {
                if left.is_leaf() {
                    if self.intersect_leaf::<ANY>(&left, ray, &mut hit) {
                        return self.remap(hit);
                    }
                } else {
                    child[0] = left.first as i64;
                }
            }
            if rt0 <= rt1 {
                if right.is_leaf() {
                    if self.intersect_leaf::<ANY>(&right, ray, &mut hit) {
                        return self.remap(hit);
                    }
                } else {
                    child[1] = right.first as i64;
                }
            }

            // Continue with the nearer child, push the farther one
            if child[0] >= 0 && child[1] >= 0 {
                if lt0 < rt0 {
                    child.swap(0, 1);
                }
                stack[sp] = child[0] as u32;
                sp += 1;
                top = child[1] as usize;
            } else if child[1] >= 0 {
                top = child[1] as usize;
            } else if child[0] >= 0 {
                top = child[0] as usize;
            } else {
                if sp == 0 {
                    break;
                }
                sp -= 1;
                top = stack[sp] as usize;
            }
        }

        self.remap(hit)
    }

    /// Test every primitive of a leaf. Returns true when `ANY` mode can
    /// stop traversal.
    #[inline]
    fn intersect_leaf<const ANY: bool>(&self, leaf: &Node, ray: &Ray, hit: &mut Hit) -> bool {
        let first = leaf.first as usize;
        for j in first..first + leaf.count as usize {
            if self.tris[j].intersect(ray, &mut hit.t, &mut hit.u, &mut hit.v) {
                hit.tri = j as i32;
                if ANY {
                    return true;
                }
            }
        }
        false
    }

    /// Remap a leaf-slot hit back to the source triangle index.
    #[inline]
    fn remap(&self, mut hit: Hit) -> Hit {
        if hit.tri >= 0 {
            hit.tri = self.prim_ids[hit.tri as usize] as i32;
        }
        hit
    }
}

/// Map leaf slots back to source triangles, then sort and deduplicate
/// each leaf range (pre-splitting may put several references to one
/// triangle into the same leaf).
fn fix_refs(nodes: &mut [Node], prim_ids: &mut [u32], refs: &[u32]) {
    for node in nodes.iter_mut() {
        if !node.is_leaf() {
            continue;
        }
        let begin = node.first as usize;
        let end = begin + node.count as usize;
        let slice = &mut prim_ids[begin..end];
        for p in slice.iter_mut() {
            *p = refs[*p as usize];
        }
        slice.sort_unstable();
        let mut unique = 1;
        for i in 1..slice.len() {
            if slice[i] != slice[unique - 1] {
                slice[unique] = slice[i];
                unique += 1;
            }
        }
        node.count = unique as i32;
    }
}
