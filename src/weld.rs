use crate::remap::UNUSED_VERTEX;

// Vertex welding is based on the vertex merge algorithm by Morten S.
// Mikkelsen: a recursive median split over the axis of maximum spread, with
// exact float comparison inside the leaves.

struct Welder<'a> {
    vertices: &'a [f32],
    floats_per_vertex: usize,
    destination: Vec<f32>,
    remap: Vec<u32>,
    unique_count: usize,
}

impl Welder<'_> {
    fn record(&self, vertex: u32) -> &[f32] {
        let at = vertex as usize * self.floats_per_vertex;
        &self.vertices[at..at + self.floats_per_vertex]
    }

    fn merge(&mut self, ids: &mut [u32]) {
        // find the axis with the largest spread
        let mut best_channel = 0usize;
        let mut best_spread = -1f32;
        let mut best_range = (0f32, 0f32);

        for channel in 0..self.floats_per_vertex {
            let mut min_val = self.vertices[ids[0] as usize * self.floats_per_vertex + channel];
            let mut max_val = min_val;

            for id in ids[1..].iter() {
                let val = self.vertices[*id as usize * self.floats_per_vertex + channel];

                min_val = min_val.min(val);
                max_val = max_val.max(val);
            }

            let spread = max_val - min_val;

            if spread > best_spread {
                best_channel = channel;
                best_spread = spread;
                best_range = (min_val, max_val);
            }
        }

        let (min_val, max_val) = best_range;
        let avg = 0.5 * (min_val + max_val);

        // when the midpoint can't separate the range the cell is as tight as
        // floating point allows, so resolve it by exact comparison
        if ids.len() == 1 || avg <= min_val || avg >= max_val {
            self.flush_leaf(ids);
            return;
        }

        // partition around the midpoint of the best channel
        let mut split = 0usize;

        for i in 0..ids.len() {
            let val = self.vertices[ids[i] as usize * self.floats_per_vertex + best_channel];

            if val < avg {
                ids.swap(i, split);
                split += 1;
            }
        }

        debug_assert!(split > 0 && split < ids.len());

        let (left, right) = ids.split_at_mut(split);
        self.merge(left);
        self.merge(right);
    }

    fn flush_leaf(&mut self, ids: &[u32]) {
        let fpv = self.floats_per_vertex;
        let leaf_base = self.unique_count;

        for id in ids {
            // look for a bitwise-equal record among the uniques of this leaf
            let found = self.destination[leaf_base * fpv..self.unique_count * fpv]
                .chunks_exact(fpv)
                .position(|unique| {
                    unique
                        .iter()
                        .zip(self.record(*id).iter())
                        .all(|(a, b)| a == b)
                });

            let target = match found {
                Some(at) => leaf_base + at,
                None => {
                    let record = *id as usize * fpv;
                    self.destination
                        .extend_from_slice(&self.vertices[record..record + fpv]);
                    self.unique_count += 1;
                    self.unique_count - 1
                }
            };

            debug_assert!(self.remap[*id as usize] == UNUSED_VERTEX);
            self.remap[*id as usize] = target as u32;
        }
    }
}

/// Merges numerically equal vertices and returns the compacted vertex buffer
/// together with a remap table from old to new vertex ids.
///
/// Unlike `generate_vertex_remap` this considers vertex records as floats,
/// so records that only differ in padding bits of equal floats (for example
/// `0.0` and `-0.0`) still merge.
pub fn weld_vertices(vertices: &[f32], floats_per_vertex: usize) -> (Vec<f32>, Vec<u32>) {
    assert!(floats_per_vertex > 0);
    assert!(vertices.len() % floats_per_vertex == 0);

    let vertex_count = vertices.len() / floats_per_vertex;

    if vertex_count == 0 {
        return (Vec::new(), Vec::new());
    }

    let mut vertex_ids: Vec<u32> = (0..vertex_count as u32).collect();

    let mut welder = Welder {
        vertices,
        floats_per_vertex,
        destination: Vec::with_capacity(vertices.len()),
        remap: vec![UNUSED_VERTEX; vertex_count],
        unique_count: 0,
    };

    welder.merge(&mut vertex_ids);

    debug_assert!(welder.remap.iter().all(|r| *r != UNUSED_VERTEX));

    (welder.destination, welder.remap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_equal_vertices() {
        let vertices = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ];

        let (welded, remap) = weld_vertices(&vertices, 3);

        assert_eq!(welded.len(), 9);
        assert_eq!(remap.len(), 5);
        assert_eq!(remap[0], remap[2]);
        assert_eq!(remap[1], remap[3]);
        assert_ne!(remap[0], remap[1]);
        assert_ne!(remap[4], remap[0]);

        for (old, new) in remap.iter().enumerate() {
            let old_record = &vertices[old * 3..old * 3 + 3];
            let new_record = &welded[*new as usize * 3..*new as usize * 3 + 3];
            assert_eq!(old_record, new_record);
        }
    }

    #[test]
    fn distinct_vertices_survive() {
        let vertices = [0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0];

        let (welded, remap) = weld_vertices(&vertices, 2);

        assert_eq!(welded.len(), 6);
        let mut seen = remap.to_vec();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn signed_zero_merges() {
        let vertices = [0.0f32, 1.0, -0.0, 1.0];

        let (welded, remap) = weld_vertices(&vertices, 2);

        assert_eq!(welded.len(), 2);
        assert_eq!(remap[0], remap[1]);
    }

    #[test]
    fn empty_input() {
        let (welded, remap) = weld_vertices(&[], 3);
        assert!(welded.is_empty());
        assert!(remap.is_empty());
    }
}
