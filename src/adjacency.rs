//! Per-vertex triangle lists in CSR layout (counts, prefix-sum offsets, flat
//! triangle data), built in two passes over the index buffer.

pub(crate) struct Adjacency {
    pub counts: Vec<u32>,
    pub offsets: Vec<u32>,
    pub data: Vec<u32>,
}

impl Adjacency {
    pub fn build(indices: &[u32], vertex_count: usize) -> Self {
        // fill triangle counts
        let mut counts = vec![0u32; vertex_count];

        for index in indices {
            assert!((*index as usize) < vertex_count);

            counts[*index as usize] += 1;
        }

        // fill offset table
        let mut offsets = vec![0u32; vertex_count];
        let mut offset = 0u32;

        for (slot, count) in offsets.iter_mut().zip(counts.iter()) {
            *slot = offset;
            offset += count;
        }

        // fill triangle data; the fill cursor keeps the final layout equal to
        // the prefix-sum layout
        let mut data = vec![0u32; offset as usize];
        let mut fill = offsets.clone();

        for (triangle, corners) in indices.chunks_exact(3).enumerate() {
            for corner in corners {
                let cursor = &mut fill[*corner as usize];
                data[*cursor as usize] = triangle as u32;
                *cursor += 1;
            }
        }

        Adjacency {
            counts,
            offsets,
            data,
        }
    }

    pub fn triangles(&self, vertex: u32) -> &[u32] {
        let begin = self.offsets[vertex as usize] as usize;
        let end = begin + self.counts[vertex as usize] as usize;
        &self.data[begin..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csr_layout() {
        let indices = [0, 1, 2, 0, 2, 3];
        let adjacency = Adjacency::build(&indices, 4);

        assert_eq!(adjacency.counts.iter().sum::<u32>(), 6);
        assert!(adjacency.offsets.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(adjacency.triangles(0), &[0, 1]);
        assert_eq!(adjacency.triangles(1), &[0]);
        assert_eq!(adjacency.triangles(2), &[0, 1]);
        assert_eq!(adjacency.triangles(3), &[1]);
    }
}
