use crate::hash::BlobMap;
use crate::typed_to_bytes;

/// Remap table entry for a vertex that is never referenced by the index
/// buffer.
pub const UNUSED_VERTEX: u32 = u32::MAX;

/// Generates a vertex remap table that folds byte-identical vertex records.
///
/// The resulting remap table maps old vertices to new vertices and can be
/// used in `remap_vertex_buffer`/`remap_index_buffer`. The returned count is
/// the number of unique vertices; new ids are assigned in order of first
/// reference, and unreferenced vertices map to [`UNUSED_VERTEX`].
///
/// When `indices` is `None` the vertex buffer is treated as an
/// identity-indexed triangle stream (three vertices per triangle, in order).
pub fn generate_vertex_remap<T>(vertices: &[T], indices: Option<&[u32]>) -> (usize, Vec<u32>) {
    generate_vertex_remap_bytes(
        typed_to_bytes(vertices),
        std::mem::size_of::<T>(),
        indices,
    )
}

/// Untyped form of [`generate_vertex_remap`] for callers that hold vertex
/// data as raw bytes with a runtime stride.
pub fn generate_vertex_remap_bytes(
    vertices: &[u8],
    vertex_size: usize,
    indices: Option<&[u32]>,
) -> (usize, Vec<u32>) {
    assert!(vertex_size > 0);
    assert!(vertices.len() % vertex_size == 0);

    let vertex_count = vertices.len() / vertex_size;
    let index_count = indices.map_or(vertex_count, <[u32]>::len);
    assert!(index_count % 3 == 0);

    let mut remap = vec![UNUSED_VERTEX; vertex_count];
    let mut table = BlobMap::with_capacity(vertices, vertex_size, vertex_count);

    let mut next_vertex = 0u32;

    for i in 0..index_count {
        let index = indices.map_or(i as u32, |indices| indices[i]);
        assert!((index as usize) < vertex_count);

        if remap[index as usize] == UNUSED_VERTEX {
            remap[index as usize] = match table.get_or_insert(index, next_vertex) {
                Some(existing) => existing,
                None => {
                    next_vertex += 1;
                    next_vertex - 1
                }
            };
        }
    }

    (next_vertex as usize, remap)
}

/// Generates a compact vertex buffer by permuting vertices with the inverse
/// of the remap table; entries mapped to [`UNUSED_VERTEX`] are dropped.
pub fn remap_vertex_buffer<T: Clone + Default>(
    vertices: &[T],
    unique_vertex_count: usize,
    remap: &[u32],
) -> Vec<T> {
    assert!(remap.len() == vertices.len());

    let mut result = vec![T::default(); unique_vertex_count];

    for (vertex, target) in vertices.iter().zip(remap.iter()) {
        if *target != UNUSED_VERTEX {
            result[*target as usize] = vertex.clone();
        }
    }

    result
}

/// Untyped form of [`remap_vertex_buffer`].
pub fn remap_vertex_buffer_bytes(
    vertices: &[u8],
    vertex_size: usize,
    unique_vertex_count: usize,
    remap: &[u32],
) -> Vec<u8> {
    assert!(vertex_size > 0);
    assert!(remap.len() * vertex_size == vertices.len());

    let mut result = vec![0u8; unique_vertex_count * vertex_size];

    for (vertex, target) in vertices.chunks_exact(vertex_size).zip(remap.iter()) {
        if *target != UNUSED_VERTEX {
            let at = *target as usize * vertex_size;
            result[at..at + vertex_size].copy_from_slice(vertex);
        }
    }

    result
}

/// Rewrites an index buffer through a remap table; `indices` of `None`
/// stands for the identity-indexed stream of `index_count` entries.
pub fn remap_index_buffer(
    indices: Option<&[u32]>,
    index_count: usize,
    remap: &[u32],
) -> Vec<u32> {
    assert!(index_count % 3 == 0);

    let mut result = Vec::with_capacity(index_count);

    match indices {
        Some(indices) => {
            assert!(indices.len() == index_count);
            for index in indices {
                debug_assert!(remap[*index as usize] != UNUSED_VERTEX);
                result.push(remap[*index as usize]);
            }
        }
        None => {
            for i in 0..index_count {
                debug_assert!(remap[i] != UNUSED_VERTEX);
                result.push(remap[i]);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_byte_identical_vertices() {
        // vertices 1 and 3 share identical bytes
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let indices = [0, 1, 2, 0, 3, 4];

        let (unique, remap) = generate_vertex_remap(&vertices, Some(&indices));

        assert_eq!(unique, 4);
        assert_eq!(remap[1], remap[3]);

        let new_indices = remap_index_buffer(Some(&indices), indices.len(), &remap);
        assert_eq!(new_indices[1], new_indices[4]);

        let new_vertices = remap_vertex_buffer(&vertices, unique, &remap);
        assert_eq!(new_vertices.len(), 4);
        assert_eq!(new_vertices[remap[3] as usize], vertices[1]);
    }

    #[test]
    fn remap_is_idempotent() {
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let indices = [0, 2, 3, 1, 2, 3];

        let (unique, remap) = generate_vertex_remap(&vertices, Some(&indices));
        let new_vertices = remap_vertex_buffer(&vertices, unique, &remap);
        let new_indices = remap_index_buffer(Some(&indices), indices.len(), &remap);

        let (unique2, remap2) = generate_vertex_remap(&new_vertices, Some(&new_indices));

        assert_eq!(unique2, unique);
        assert!(remap2.iter().enumerate().all(|(i, r)| *r == i as u32));
    }

    #[test]
    fn unindexed_stream() {
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];

        let (unique, remap) = generate_vertex_remap(&vertices, None);

        assert_eq!(unique, 4);
        assert_eq!(remap[0], remap[3]);
        assert_eq!(remap[2], remap[4]);
    }
}
