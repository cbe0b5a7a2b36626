//! Uniform hash grid over a point set, rebuilt once per photon-map
//! iteration and queried with a fixed radius.
//!
//! Cells are cubes with edge length equal to the query radius, addressed
//! by hashing their integer coordinates into a power-of-two table. The
//! index is a counting-sort CSR layout: a per-cell offset array plus one
//! flat array of point indices.

use lumo_math::Vec3;

/// Spatial index supporting fixed-radius neighbor queries.
pub struct HashGrid {
    radius: f32,
    inv_cell: f32,
    mask: u64,
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl HashGrid {
    /// Build a grid over `n` points with the given query radius. The
    /// point accessor is called with indices `0..n`.
    pub fn build(point: impl Fn(usize) -> Vec3, n: usize, radius: f32) -> Self {
        let table_size = n.next_power_of_two().max(1);
        let mask = (table_size - 1) as u64;
        let inv_cell = 1.0 / radius;

        // Counting sort: histogram, prefix sum, then fill
        let mut offsets = vec![0u32; table_size + 1];
        for i in 0..n {
            let h = cell_hash(cell_of(point(i), inv_cell), mask);
            offsets[h + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let mut cursor = offsets[..table_size].to_vec();
        let mut indices = vec![0u32; n];
        for i in 0..n {
            let h = cell_hash(cell_of(point(i), inv_cell), mask);
            indices[cursor[h] as usize] = i as u32;
            cursor[h] += 1;
        }

        Self {
            radius,
            inv_cell,
            mask,
            offsets,
            indices,
        }
    }

    /// The radius the grid was built for.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Visit every indexed point within `radius` of `q`. The visitor
    /// receives the point index and the squared distance.
    pub fn query(
        &self,
        q: Vec3,
        point: impl Fn(usize) -> Vec3,
        mut visit: impl FnMut(usize, f32),
    ) {
        if self.indices.is_empty() {
            return;
        }
        let r2 = self.radius * self.radius;
        let lo = cell_of(q - Vec3::splat(self.radius), self.inv_cell);
        let hi = cell_of(q + Vec3::splat(self.radius), self.inv_cell);

        // Up to 27 neighbor cells; distinct cells may collide into the
        // same bucket, which must be visited only once.
        let mut buckets = [0usize; 27];
        let mut num_buckets = 0;
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let h = cell_hash([x, y, z], self.mask);
                    if !buckets[..num_buckets].contains(&h) {
                        buckets[num_buckets] = h;
                        num_buckets += 1;
                    }
                }
            }
        }

        for &h in &buckets[..num_buckets] {
            let begin = self.offsets[h] as usize;
            let end = self.offsets[h + 1] as usize;
            for &i in &self.indices[begin..end] {
                let d2 = (point(i as usize) - q).length_squared();
                if d2 <= r2 {
                    visit(i as usize, d2);
                }
            }
        }
    }
}

#[inline]
fn cell_of(p: Vec3, inv_cell: f32) -> [i64; 3] {
    [
        (p.x * inv_cell).floor() as i64,
        (p.y * inv_cell).floor() as i64,
        (p.z * inv_cell).floor() as i64,
    ]
}

/// Mix the integer cell coordinates into a table slot.
#[inline]
fn cell_hash(cell: [i64; 3], mask: u64) -> usize {
    let mut h = (cell[0] as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= (cell[1] as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= (cell[2] as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
    h ^= h >> 32;
    (h & mask) as usize
}
