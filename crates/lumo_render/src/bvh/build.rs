//! BVH construction: triangle pre-splitting followed by a top-down
//! sweep-SAH build over three presorted primitive arrays.
//!
//! Builder tasks share the node and primitive arrays through [`SyncSlice`].
//! Soundness rests on write disjointness: every task owns the primitive
//! range `[begin, end)` of the node it is building (and the matching cost
//! slots), and node pairs are handed out by an atomic counter so no two
//! tasks ever write the same slot.

use super::{Node, PARALLEL_THRESHOLD, PRESPLIT_STACK_SIZE, TRAVERSAL_COST};
use lumo_math::{Aabb, Vec3};
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared mutable slice for builder tasks writing disjoint regions.
pub(super) struct SyncSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send + Sync> Sync for SyncSlice<'_, T> {}
unsafe impl<T: Send> Send for SyncSlice<'_, T> {}

impl<'a, T> SyncSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            marker: PhantomData,
        }
    }

    /// # Safety
    /// The caller must have exclusive ownership of `[start, end)`.
    unsafe fn slice_mut(&self, start: usize, end: usize) -> &mut [T] {
        debug_assert!(start <= end && end <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(start), end - start)
    }

    /// # Safety
    /// The caller must have exclusive ownership of `[start, end)`.
    unsafe fn slice(&self, start: usize, end: usize) -> &[T] {
        debug_assert!(start <= end && end <= self.len);
        std::slice::from_raw_parts(self.ptr.add(start), end - start)
    }

    /// # Safety
    /// The caller must have exclusive ownership of slot `i`.
    unsafe fn write(&self, i: usize, value: T) {
        debug_assert!(i < self.len);
        self.ptr.add(i).write(value);
    }

    /// # Safety
    /// No other task may be writing slot `i`.
    unsafe fn read(&self, i: usize) -> T
    where
        T: Copy,
    {
        debug_assert!(i < self.len);
        self.ptr.add(i).read()
    }
}

/// Subdivide one triangle according to the Edge-Volume Heuristic, writing
/// bounds, centroids and the back-reference to the source triangle for
/// every reference produced.
fn try_split(
    source: usize,
    tri: [Vec3; 3],
    bboxes: &SyncSlice<Aabb>,
    centers: &SyncSlice<Vec3>,
    refs: &SyncSlice<u32>,
    threshold: f32,
    num_refs: &AtomicUsize,
    max_refs: usize,
) {
    #[derive(Copy, Clone)]
    struct Entry {
        tri: [Vec3; 3],
        slot: usize,
    }

    let mut stack = [Entry {
        tri,
        slot: source,
    }; PRESPLIT_STACK_SIZE];
    let mut sp: i32 = 0;

    while sp >= 0 {
        let mut top = stack[sp as usize];

        let vol = [
            edge_volume(top.tri[0], top.tri[1]),
            edge_volume(top.tri[1], top.tri[2]),
            edge_volume(top.tri[2], top.tri[0]),
        ];
        let max_vol = vol[0].max(vol[1]).max(vol[2]);

        if max_vol > threshold && (sp as usize) + 1 < PRESPLIT_STACK_SIZE {
            let slot = num_refs.fetch_add(1, Ordering::Relaxed);
            if slot < max_refs {
                // Bisect the longest edge; both halves keep the shared
                // midpoint vertex.
                let k = vol.iter().position(|&v| v == max_vol).unwrap();
                let l = (k + 1) % 3;
                let mid = (top.tri[k] + top.tri[l]) * 0.5;
                let mut other = top;
                top.tri[k] = mid;
                other.tri[l] = mid;
                other.slot = slot;
                stack[sp as usize] = top;
                sp += 1;
                stack[sp as usize] = other;
                continue;
            }
        }

        let mut bbox = Aabb::from_point(top.tri[0]);
        bbox.extend_point(top.tri[1]);
        bbox.extend_point(top.tri[2]);
        let center = (top.tri[0] + top.tri[1] + top.tri[2]) * (1.0 / 3.0);
        unsafe {
            bboxes.write(top.slot, bbox);
            centers.write(top.slot, center);
            refs.write(top.slot, source as u32);
        }
        sp -= 1;
    }
}

#[inline]
fn edge_volume(a: Vec3, b: Vec3) -> f32 {
    Aabb::from_points(a, b).volume()
}

/// Split all triangles whose largest edge bounding box exceeds
/// `threshold`. Returns the total reference count (capped at `max_refs`).
pub(super) fn pre_split(
    verts: &[Vec3],
    indices: &[u32],
    num_tris: usize,
    threshold: f32,
    max_refs: usize,
    bboxes: &mut [Aabb],
    centers: &mut [Vec3],
    refs: &mut [u32],
) -> usize {
    let num_refs = AtomicUsize::new(num_tris);
    let bboxes = SyncSlice::new(bboxes);
    let centers = SyncSlice::new(centers);
    let refs = SyncSlice::new(refs);

    (0..num_tris).into_par_iter().for_each(|i| {
        let tri = [
            verts[indices[i * 4] as usize],
            verts[indices[i * 4 + 1] as usize],
            verts[indices[i * 4 + 2] as usize],
        ];
        try_split(
            i, tri, &bboxes, &centers, &refs, threshold, &num_refs, max_refs,
        );
    });

    num_refs.load(Ordering::Relaxed).min(max_refs)
}

/// Stable in-order partition. Returns the size of the left side.
fn stable_partition(slice: &mut [u32], pred: impl Fn(u32) -> bool) -> usize {
    let mut right = Vec::with_capacity(slice.len());
    let mut w = 0;
    for i in 0..slice.len() {
        let v = slice[i];
        if pred(v) {
            slice[w] = v;
            w += 1;
        } else {
            right.push(v);
        }
    }
    slice[w..].copy_from_slice(&right);
    w
}

struct Builder<'a> {
    bboxes: &'a [Aabb],
    centers: &'a [Vec3],
    costs: SyncSlice<'a, f32>,
    prims: [SyncSlice<'a, u32>; 3],
    nodes: SyncSlice<'a, Node>,
    node_count: &'a AtomicUsize,
}

impl Builder<'_> {
    /// Sweep one presorted axis over `[begin, end)` and return the best
    /// split position (absolute), its SAH cost, and the right-side bounds.
    fn find_split(&self, axis: usize, begin: usize, end: usize) -> (usize, f32, Aabb) {
        let prims = unsafe { self.prims[axis].slice(begin, end) };
        let costs = unsafe { self.costs.slice_mut(begin, end) };
        let n = end - begin;

        // Sweep from the left and record prefix costs
        let mut cur = Aabb::empty();
        for i in 0..n - 1 {
            cur.extend(&self.bboxes[prims[i] as usize]);
            costs[i] = (i + 1) as f32 * cur.half_area();
        }

        // Sweep from the right and find the minimum total cost
        let mut min_split = 0;
        let mut min_cost = f32::MAX;
        let mut min_bb = Aabb::empty();
        cur = Aabb::empty();
        for i in (1..n).rev() {
            cur.extend(&self.bboxes[prims[i] as usize]);
            let c = costs[i - 1] + (n - i) as f32 * cur.half_area();
            if c < min_cost {
                min_split = i;
                min_cost = c;
                min_bb = cur;
            }
        }

        (begin + min_split, min_cost, min_bb)
    }

    fn build_node(&self, node_id: usize) {
        let node = unsafe { self.nodes.read(node_id) };
        let begin = node.first as usize;
        let end = begin + node.count as usize;

        if end - begin <= 1 {
            return;
        }

        // On all three axes, try to split this node
        let mut min_axis = 0;
        let mut min_split = 0;
        let mut min_cost = f32::MAX;
        let mut min_right = Aabb::empty();
        for axis in 0..3 {
            let (split, cost, right_bb) = self.find_split(axis, begin, end);
            if cost < min_cost {
                min_axis = axis;
                min_split = split;
                min_cost = cost;
                min_right = right_bb;
            }
        }
        debug_assert!(min_split > begin && min_split < end);

        // Compare the best split cost with the SAH cost of keeping a leaf
        if min_cost >= ((end - begin) as f32 - TRAVERSAL_COST) * node.bbox().half_area() {
            return;
        }

        // Partition the other two axes with a tie-break on the reference
        // id so all three arrays agree on the left side.
        let split_ref = unsafe { self.prims[min_axis].read(min_split - 1) };
        let split_pos = self.centers[split_ref as usize][min_axis];
        let on_left = |r: u32| {
            let pos = self.centers[r as usize][min_axis];
            pos < split_pos || (pos == split_pos && r <= split_ref)
        };
        for axis in [(min_axis + 1) % 3, (min_axis + 2) % 3] {
            let slice = unsafe { self.prims[axis].slice_mut(begin, end) };
            let n = stable_partition(slice, on_left);
            debug_assert_eq!(begin + n, min_split);
        }

        // Recompute the bounding box of the left child
        let mut min_left = Aabb::empty();
        for &p in unsafe { self.prims[min_axis].slice(begin, min_split) } {
            min_left.extend(&self.bboxes[p as usize]);
        }

        let child = self.node_count.fetch_add(2, Ordering::Relaxed);

        // Mark the node as an inner node
        unsafe {
            self.nodes.write(
                node_id,
                Node {
                    min: node.min,
                    max: node.max,
                    first: child as u32,
                    count: -(min_axis as i32),
                },
            );
            self.nodes.write(
                child,
                Node {
                    min: min_left.min,
                    max: min_left.max,
                    first: begin as u32,
                    count: (min_split - begin) as i32,
                },
            );
            self.nodes.write(
                child + 1,
                Node {
                    min: min_right.min,
                    max: min_right.max,
                    first: min_split as u32,
                    count: (end - min_split) as i32,
                },
            );
        }

        let left_count = min_split - begin;
        let right_count = end - min_split;
        let (biggest, smallest) = if right_count >= left_count {
            (child + 1, child)
        } else {
            (child, child + 1)
        };
        let smallest_count = left_count.min(right_count);

        if smallest_count > PARALLEL_THRESHOLD {
            rayon::join(|| self.build_node(biggest), || self.build_node(smallest));
        } else {
            self.build_node(biggest);
            self.build_node(smallest);
        }
    }
}

/// Top-down SAH build over pre-split references. Returns the node array
/// (trimmed to the built count) and the leaf-ordered primitive ids.
pub(super) fn build_top_down(
    global_bbox: Aabb,
    bboxes: &[Aabb],
    centers: &[Vec3],
    num_refs: usize,
) -> (Vec<Node>, Vec<u32>) {
    // Sort according to the projection of the centroid on each axis
    let mut prim0: Vec<u32> = (0..num_refs as u32).collect();
    let mut prim1 = prim0.clone();
    let mut prim2 = prim0.clone();
    let by_axis = |axis: usize| {
        move |a: &u32, b: &u32| {
            centers[*a as usize][axis].total_cmp(&centers[*b as usize][axis])
        }
    };
    rayon::join(
        || prim0.sort_by(by_axis(0)),
        || {
            rayon::join(
                || prim1.sort_by(by_axis(1)),
                || prim2.sort_by(by_axis(2)),
            )
        },
    );

    let mut nodes = vec![
        Node {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            first: 0,
            count: 0,
        };
        2 * num_refs + 1
    ];
    nodes[0] = Node {
        min: global_bbox.min,
        max: global_bbox.max,
        first: 0,
        count: num_refs as i32,
    };

    let mut costs = vec![0.0f32; num_refs];
    let node_count = AtomicUsize::new(1);
    {
        let builder = Builder {
            bboxes,
            centers,
            costs: SyncSlice::new(&mut costs),
            prims: [
                SyncSlice::new(&mut prim0),
                SyncSlice::new(&mut prim1),
                SyncSlice::new(&mut prim2),
            ],
            nodes: SyncSlice::new(&mut nodes),
            node_count: &node_count,
        };
        builder.build_node(0);
    }

    nodes.truncate(node_count.load(Ordering::Relaxed));
    (nodes, prim0)
}
