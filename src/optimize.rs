use crate::adjacency::Adjacency;
use crate::remap::UNUSED_VERTEX;
use crate::{DecodePosition, VertexDataAdapter};

// This work is based on:
// Pedro Sander, Diego Nehab and Joshua Barcz. Fast Triangle Reordering for Vertex Locality and Reduced Overdraw. 2007

fn get_next_vertex_dead_end(
    dead_end: &[u32],
    dead_end_top: &mut usize,
    input_cursor: &mut usize,
    live_triangles: &[u32],
) -> Option<u32> {
    // check dead-end stack
    while *dead_end_top > 0 {
        *dead_end_top -= 1;
        let vertex = dead_end[*dead_end_top];

        if live_triangles[vertex as usize] > 0 {
            return Some(vertex);
        }
    }

    // input order
    while *input_cursor < live_triangles.len() {
        if live_triangles[*input_cursor] > 0 {
            return Some(*input_cursor as u32);
        }

        *input_cursor += 1;
    }

    None
}

fn get_next_vertex_neighbor(
    next_candidates: &[u32],
    live_triangles: &[u32],
    cache_timestamps: &[u32],
    timestamp: u32,
    cache_size: u32,
) -> Option<u32> {
    let mut best_candidate = None;
    let mut best_priority = None;

    for vertex in next_candidates {
        // otherwise we don't need to process it
        if live_triangles[*vertex as usize] > 0 {
            let age = timestamp - cache_timestamps[*vertex as usize];

            // will it be in cache after fanning?
            let priority = if 2 * live_triangles[*vertex as usize] + age <= cache_size {
                age // position in cache
            } else {
                0
            };

            if best_priority.map_or(true, |best| priority > best) {
                best_candidate = Some(*vertex);
                best_priority = Some(priority);
            }
        }
    }

    best_candidate
}

fn tipsify(
    indices: &[u32],
    vertex_count: usize,
    cache_size: u32,
    mut clusters: Option<&mut Vec<u32>>,
) -> Vec<u32> {
    assert!(indices.len() % 3 == 0);
    assert!(cache_size >= 3);

    // guard for empty meshes
    if indices.is_empty() || vertex_count == 0 {
        return Vec::new();
    }

    // build adjacency information
    let adjacency = Adjacency::build(indices, vertex_count);

    // live triangle counts
    let mut live_triangles = adjacency.counts.clone();

    // cache time stamps
    let mut cache_timestamps = vec![0u32; vertex_count];

    // dead-end stack
    let mut dead_end = vec![0u32; indices.len()];
    let mut dead_end_top = 0usize;

    // emitted flags
    let mut emitted = vec![false; indices.len() / 3];

    if let Some(clusters) = clusters.as_mut() {
        clusters.push(0);
    }

    let mut current_vertex = Some(0u32);

    let mut timestamp = cache_size + 1;
    let mut input_cursor = 1usize; // vertex to restart from in case of dead-end

    let mut result = Vec::with_capacity(indices.len());

    while let Some(vertex) = current_vertex {
        let candidates_begin = dead_end_top;

        // emit all vertex neighbors
        for triangle in adjacency.triangles(vertex) {
            if !emitted[*triangle as usize] {
                let corners = [
                    indices[*triangle as usize * 3],
                    indices[*triangle as usize * 3 + 1],
                    indices[*triangle as usize * 3 + 2],
                ];

                for corner in corners {
                    // output index
                    result.push(corner);

                    // update dead-end stack; the just-pushed entries double
                    // as next-vertex candidates
                    dead_end[dead_end_top] = corner;
                    dead_end_top += 1;

                    // update live triangle counts
                    live_triangles[corner as usize] -= 1;

                    // if vertex is not in cache, put it in cache
                    if timestamp - cache_timestamps[corner as usize] > cache_size {
                        cache_timestamps[corner as usize] = timestamp;
                        timestamp += 1;
                    }
                }

                emitted[*triangle as usize] = true;
            }
        }

        // get next vertex
        current_vertex = get_next_vertex_neighbor(
            &dead_end[candidates_begin..dead_end_top],
            &live_triangles,
            &cache_timestamps,
            timestamp,
            cache_size,
        );

        if current_vertex.is_none() {
            current_vertex = get_next_vertex_dead_end(
                &dead_end,
                &mut dead_end_top,
                &mut input_cursor,
                &live_triangles,
            );

            if current_vertex.is_some() {
                // hard boundary, add cluster information
                if let Some(clusters) = clusters.as_mut() {
                    clusters.push(result.len() as u32 / 3);
                }
            }
        }
    }

    debug_assert!(result.len() == indices.len());

    result
}

/// Reorders indices to reduce the number of GPU vertex shader invocations,
/// using a simulated post-transform FIFO cache of `cache_size` entries
/// (`cache_size` must be at least 3).
///
/// If index buffer contains multiple ranges for multiple draw calls,
/// this function needs to be called on each range individually.
pub fn optimize_vertex_cache(indices: &[u32], vertex_count: usize, cache_size: u32) -> Vec<u32> {
    tipsify(indices, vertex_count, cache_size, None)
}

/// Reorders indices to reduce the number of GPU vertex shader invocations.
///
/// If index buffer contains multiple ranges for multiple draw calls,
/// this function needs to be called on each range individually.
pub fn optimize_vertex_cache_in_place(indices: &mut [u32], vertex_count: usize, cache_size: u32) {
    let result = tipsify(indices, vertex_count, cache_size, None);
    if !result.is_empty() {
        indices.copy_from_slice(&result);
    }
}

/// Reorders indices to reduce the number of GPU vertex shader invocations,
/// and returns the hard cluster boundaries (the first triangle of every
/// cluster) alongside the reordered index buffer.
///
/// A hard boundary is recorded whenever the optimizer restarts from a
/// dead end; the boundaries feed the overdraw optimizer.
pub fn optimize_vertex_cache_with_clusters(
    indices: &[u32],
    vertex_count: usize,
    cache_size: u32,
) -> (Vec<u32>, Vec<u32>) {
    let mut clusters = Vec::with_capacity(16);
    let result = tipsify(indices, vertex_count, cache_size, Some(&mut clusters));
    (result, clusters)
}

/// Reorders vertices and changes indices to reduce the amount of GPU
/// memory fetches during vertex processing.
///
/// This function works for a single vertex stream; for multiple vertex
/// streams, use `optimize_vertex_fetch_remap` + `remap_vertex_buffer` for
/// each stream.
///
/// `indices` is used both as an input and as an output index buffer.
pub fn optimize_vertex_fetch<T: Clone>(indices: &mut [u32], vertices: &[T]) -> Vec<T> {
    assert!(indices.len() % 3 == 0);

    let mut result = Vec::with_capacity(vertices.len());
    let mut remap = vec![UNUSED_VERTEX; vertices.len()];

    for index in indices.iter_mut() {
        let target = &mut remap[*index as usize];

        if *target == UNUSED_VERTEX {
            // vertex was not added to the destination buffer yet
            *target = result.len() as u32;
            result.push(vertices[*index as usize].clone());
        }

        *index = *target;
    }

    result
}

/// Vertex fetch cache optimizer that reorders `vertices` in place and
/// rewrites `indices`; returns the number of vertices that remain in use.
pub fn optimize_vertex_fetch_in_place<T: Copy>(indices: &mut [u32], vertices: &mut [T]) -> usize {
    let result = optimize_vertex_fetch(indices, vertices);
    vertices[..result.len()].copy_from_slice(&result);
    result.len()
}

/// Generates a vertex remap to reduce the amount of GPU memory fetches
/// during vertex processing; vertices are numbered in order of first
/// reference, and unreferenced vertices map to `UNUSED_VERTEX`.
///
/// The resulting remap table should be used with
/// `remap_vertex_buffer`/`remap_index_buffer`.
pub fn optimize_vertex_fetch_remap(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    assert!(indices.len() % 3 == 0);

    let mut remap = vec![UNUSED_VERTEX; vertex_count];
    let mut next_vertex = 0u32;

    for index in indices {
        let target = &mut remap[*index as usize];

        if *target == UNUSED_VERTEX {
            *target = next_vertex;
            next_vertex += 1;
        }
    }

    remap
}

#[derive(Copy, Clone)]
struct ClusterSortData {
    cluster: u32,
    dot_product: f32,
}

fn calculate_sort_data(
    indices: &[u32],
    positions: &[[f32; 3]],
    clusters: &[u32],
) -> Vec<ClusterSortData> {
    let mut mesh_centroid = [0f32; 3];

    for index in indices {
        let p = positions[*index as usize];

        mesh_centroid[0] += p[0];
        mesh_centroid[1] += p[1];
        mesh_centroid[2] += p[2];
    }

    mesh_centroid[0] /= indices.len() as f32;
    mesh_centroid[1] /= indices.len() as f32;
    mesh_centroid[2] /= indices.len() as f32;

    let mut sort_data = Vec::with_capacity(clusters.len());

    for (cluster, start) in clusters.iter().enumerate() {
        let cluster_begin = *start as usize * 3;
        let cluster_end = clusters
            .get(cluster + 1)
            .map_or(indices.len(), |next| *next as usize * 3);

        let mut cluster_area = 0f32;
        let mut cluster_centroid = [0f32; 3];
        let mut cluster_normal = [0f32; 3];

        for triangle in indices[cluster_begin..cluster_end].chunks_exact(3) {
            let p0 = positions[triangle[0] as usize];
            let p1 = positions[triangle[1] as usize];
            let p2 = positions[triangle[2] as usize];

            let p10 = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
            let p20 = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];

            let normal = [
                p10[1] * p20[2] - p10[2] * p20[1],
                p10[2] * p20[0] - p10[0] * p20[2],
                p10[0] * p20[1] - p10[1] * p20[0],
            ];

            let area = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2])
                .sqrt();

            for i in 0..3 {
                cluster_centroid[i] += (p0[i] + p1[i] + p2[i]) * (area / 3.0);
                cluster_normal[i] += normal[i];
            }

            cluster_area += area;
        }

        let inv_cluster_area = if cluster_area == 0f32 {
            0f32
        } else {
            1f32 / cluster_area
        };

        let normal_length = (cluster_normal[0] * cluster_normal[0]
            + cluster_normal[1] * cluster_normal[1]
            + cluster_normal[2] * cluster_normal[2])
            .sqrt();
        let inv_normal_length = if normal_length == 0f32 {
            0f32
        } else {
            1f32 / normal_length
        };

        let mut dot_product = 0f32;
        for i in 0..3 {
            let centroid_vector = cluster_centroid[i] * inv_cluster_area - mesh_centroid[i];
            dot_product += centroid_vector * cluster_normal[i] * inv_normal_length;
        }

        sort_data.push(ClusterSortData {
            cluster: cluster as u32,
            dot_product,
        });
    }

    sort_data
}

fn calculate_acmr(
    indices: &[u32],
    cache_size: u32,
    threshold: f32,
    cache_timestamps: &mut [u32],
    timestamp: &mut u32,
) -> (f32, usize) {
    // ensure that all vertices are evicted before the first triangle
    *timestamp += cache_size + 1;

    let mut acmr = 0f32;
    let mut cache_misses = 0u32;

    let face_count = indices.len() / 3;

    for (face, triangle) in indices.chunks_exact(3).enumerate() {
        for corner in triangle {
            // if vertex is not in cache, put it in cache
            if *timestamp - cache_timestamps[*corner as usize] > cache_size {
                cache_timestamps[*corner as usize] = *timestamp;
                *timestamp += 1;
                cache_misses += 1;
            }
        }

        // update ACMR & check for threshold
        acmr = cache_misses as f32 / (face + 1) as f32;

        if acmr <= threshold {
            return (acmr, face + 1);
        }
    }

    (acmr, face_count)
}

fn generate_soft_boundaries(
    indices: &[u32],
    vertex_count: usize,
    clusters: &[u32],
    cache_size: u32,
    threshold: f32,
) -> Vec<u32> {
    if threshold <= 0f32 {
        // hard boundaries only
        return clusters.to_vec();
    }

    let mut cache_timestamps = vec![0u32; vertex_count];
    let mut timestamp = 0u32;

    let (baseline_acmr, consumed) =
        calculate_acmr(indices, cache_size, 0f32, &mut cache_timestamps, &mut timestamp);
    debug_assert!(consumed == indices.len() / 3);

    let acmr_threshold = baseline_acmr * threshold;

    let mut result = Vec::with_capacity(clusters.len());

    for (cluster, begin) in clusters.iter().enumerate() {
        let mut start = *begin as usize;
        let end = clusters
            .get(cluster + 1)
            .map_or(indices.len() / 3, |next| *next as usize);
        assert!(start <= end);

        while start != end {
            let (_, consumed) = calculate_acmr(
                &indices[start * 3..end * 3],
                cache_size,
                acmr_threshold,
                &mut cache_timestamps,
                &mut timestamp,
            );

            result.push(start as u32);
            start += consumed;
        }
    }

    result
}

fn optimize_overdraw_positions(
    indices: &[u32],
    clusters: &[u32],
    positions: &[[f32; 3]],
    cache_size: u32,
    threshold: f32,
) -> Vec<u32> {
    assert!(indices.len() % 3 == 0);
    assert!(cache_size >= 3);

    // guard for empty meshes
    if indices.is_empty() || positions.is_empty() {
        return Vec::new();
    }

    // we're expecting at least one cluster as an input
    assert!(!clusters.is_empty());

    // generate soft boundaries
    let soft_clusters =
        generate_soft_boundaries(indices, positions.len(), clusters, cache_size, threshold);

    let mut sort_data = calculate_sort_data(indices, positions, &soft_clusters);

    // high product = possible occluder, render early
    sort_data.sort_by(|a, b| b.dot_product.total_cmp(&a.dot_product));

    let mut result = Vec::with_capacity(indices.len());

    for item in &sort_data {
        let cluster = item.cluster as usize;

        let cluster_begin = soft_clusters[cluster] as usize * 3;
        let cluster_end = soft_clusters
            .get(cluster + 1)
            .map_or(indices.len(), |next| *next as usize * 3);

        result.extend_from_slice(&indices[cluster_begin..cluster_end]);
    }

    debug_assert!(result.len() == indices.len());

    result
}

/// Reorders indices to reduce the pixel overdraw while keeping the vertex
/// cache efficiency close to the input order.
///
/// `indices` must contain index data that is the result of
/// `optimize_vertex_cache_with_clusters` (*not* the original mesh indices!)
/// and `clusters` must be the hard boundaries produced alongside it.
///
/// `threshold` indicates how much the overdraw optimizer can degrade vertex
/// cache efficiency (1.05 = up to 5%) to reduce overdraw more efficiently;
/// a threshold of zero or less keeps the hard boundaries intact.
pub fn optimize_overdraw(
    indices: &[u32],
    clusters: &[u32],
    vertices: &VertexDataAdapter<'_>,
    cache_size: u32,
    threshold: f32,
) -> Vec<u32> {
    let positions = vertices.decode_positions();
    optimize_overdraw_positions(indices, clusters, &positions, cache_size, threshold)
}

/// Reorders indices to reduce the pixel overdraw (in place).
///
/// See [`optimize_overdraw`] for the contract on `indices` and `clusters`.
pub fn optimize_overdraw_in_place(
    indices: &mut [u32],
    clusters: &[u32],
    vertices: &VertexDataAdapter<'_>,
    cache_size: u32,
    threshold: f32,
) {
    let result = optimize_overdraw(indices, clusters, vertices, cache_size, threshold);
    if !result.is_empty() {
        indices.copy_from_slice(&result);
    }
}

/// Reorders indices to reduce the pixel overdraw, reading positions through
/// the `DecodePosition` trait.
///
/// See [`optimize_overdraw`] for the contract on `indices` and `clusters`.
pub fn optimize_overdraw_decoder<T: DecodePosition>(
    indices: &[u32],
    clusters: &[u32],
    vertices: &[T],
    cache_size: u32,
    threshold: f32,
) -> Vec<u32> {
    let positions = vertices
        .iter()
        .map(|vertex| vertex.decode_position())
        .collect::<Vec<[f32; 3]>>();
    optimize_overdraw_positions(indices, clusters, &positions, cache_size, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_optimizer_preserves_triangles() {
        let indices = [0, 1, 2, 2, 1, 3, 2, 3, 4, 4, 3, 5];

        let result = optimize_vertex_cache(&indices, 6, 16);
        assert_eq!(result.len(), indices.len());

        let mut before: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|t| {
                let mut t = [t[0], t[1], t[2]];
                let min_idx = t.iter().enumerate().min_by_key(|(_, v)| **v).map_or(0, |(i, _)| i);
                t.rotate_left(min_idx);
                t
            })
            .collect();
        let mut after: Vec<[u32; 3]> = result
            .chunks_exact(3)
            .map(|t| {
                let mut t = [t[0], t[1], t[2]];
                let min_idx = t.iter().enumerate().min_by_key(|(_, v)| **v).map_or(0, |(i, _)| i);
                t.rotate_left(min_idx);
                t
            })
            .collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn cache_optimizer_empty() {
        assert!(optimize_vertex_cache(&[], 0, 16).is_empty());

        let (result, clusters) = optimize_vertex_cache_with_clusters(&[], 0, 16);
        assert!(result.is_empty());
        assert!(clusters.is_empty());
    }

    #[test]
    fn cache_optimizer_emits_clusters() {
        // two islands with no shared vertices force a dead-end restart
        let indices = [0, 1, 2, 3, 4, 5];

        let (result, clusters) = optimize_vertex_cache_with_clusters(&indices, 6, 16);
        assert_eq!(result.len(), 6);
        assert_eq!(clusters[0], 0);
        assert!(clusters.iter().all(|c| (*c as usize) < result.len() / 3 + 1));
    }

    #[test]
    fn fetch_optimizer_reorders_by_first_use() {
        let vertices: Vec<u32> = vec![10, 11, 12, 13];
        let mut indices = vec![2, 1, 3, 2, 3, 0];

        let result = optimize_vertex_fetch(&mut indices, &vertices);

        assert_eq!(result, vec![12, 11, 13, 10]);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn fetch_remap_skips_unreferenced() {
        let indices = [2, 1, 3, 2, 3, 1];
        let remap = optimize_vertex_fetch_remap(&indices, 5);

        assert_eq!(remap[2], 0);
        assert_eq!(remap[1], 1);
        assert_eq!(remap[3], 2);
        assert_eq!(remap[0], UNUSED_VERTEX);
        assert_eq!(remap[4], UNUSED_VERTEX);
    }
}
