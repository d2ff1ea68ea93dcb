use crate::{DecodePosition, VertexDataAdapter};

/// Capacity of the meshlet vertex table.
pub const MESHLET_MAX_VERTICES: usize = 64;

/// Capacity of the meshlet triangle list.
pub const MESHLET_MAX_TRIANGLES: usize = 126;

/// A bounded cluster of triangles with its own compact vertex table.
///
/// `vertices` holds up to [`MESHLET_MAX_VERTICES`] indices into the original
/// vertex buffer; `indices` holds triples of meshlet-local indices into
/// `vertices`. Every local index is below `vertex_count`.
#[derive(Debug, Copy, Clone)]
pub struct Meshlet {
    pub vertices: [u32; MESHLET_MAX_VERTICES],
    pub indices: [[u8; 3]; MESHLET_MAX_TRIANGLES],
    pub vertex_count: u8,
    pub triangle_count: u8,
}

impl Default for Meshlet {
    fn default() -> Self {
        Meshlet {
            vertices: [0; MESHLET_MAX_VERTICES],
            indices: [[0; 3]; MESHLET_MAX_TRIANGLES],
            vertex_count: 0,
            triangle_count: 0,
        }
    }
}

impl Meshlet {
    /// Resolves a meshlet-local triangle back to global vertex indices.
    pub fn global_triangle(&self, triangle: usize) -> [u32; 3] {
        assert!(triangle < self.triangle_count as usize);

        let local = self.indices[triangle];
        [
            self.vertices[local[0] as usize],
            self.vertices[local[1] as usize],
            self.vertices[local[2] as usize],
        ]
    }
}

/// Bounding cone of a triangle cluster, usable for backface culling.
///
/// `cutoff` is the sine of the maximum angular deviation of any triangle
/// normal from `direction`; a cutoff of 1 or more marks a degenerate cone
/// that cannot cull anything. The apex is always the origin: callers are
/// expected to substitute a bounding-sphere center before using apex-based
/// rejection tests.
#[derive(Debug, Copy, Clone)]
pub struct Cone {
    pub apex: [f32; 3],
    pub direction: [f32; 3],
    pub cutoff: f32,
}

/// Returns a conservative upper bound on the number of meshlets produced
/// for an index buffer, so that output storage can be pre-sized.
pub fn build_meshlets_bound(
    index_count: usize,
    max_vertices: usize,
    max_triangles: usize,
) -> usize {
    assert!(index_count % 3 == 0);
    assert!((3..=MESHLET_MAX_VERTICES).contains(&max_vertices));
    assert!((1..=MESHLET_MAX_TRIANGLES).contains(&max_triangles));

    // meshlet construction is limited by max vertices and max triangles per
    // meshlet; the worst case is an unindexed stream which stresses both
    // limits equally. With space for 3 vertices we can pack any triangle, so
    // at worst 2 vertices per meshlet stay unpacked.
    let max_vertices_conservative = max_vertices - 2;
    let meshlet_limit_vertices =
        (index_count + max_vertices_conservative - 1) / max_vertices_conservative;
    let meshlet_limit_triangles = (index_count / 3 + max_triangles - 1) / max_triangles;

    meshlet_limit_vertices.max(meshlet_limit_triangles)
}

/// Splits the mesh into a set of meshlets where each meshlet has a micro
/// index buffer indexing into meshlet vertices that refer to the original
/// vertex buffer.
///
/// The resulting data can be used to render meshes using a programmable
/// mesh shading pipeline, or in other cluster-based renderers.
///
/// Triangles are packed greedily in input order, so for best locality the
/// index buffer should be optimized for vertex cache first. The union of
/// the emitted meshlets covers the input triangles in order.
pub fn build_meshlets(
    indices: &[u32],
    vertex_count: usize,
    max_vertices: usize,
    max_triangles: usize,
) -> Vec<Meshlet> {
    assert!(indices.len() % 3 == 0);
    assert!((3..=MESHLET_MAX_VERTICES).contains(&max_vertices));
    assert!((1..=MESHLET_MAX_TRIANGLES).contains(&max_triangles));

    let mut result =
        Vec::with_capacity(build_meshlets_bound(indices.len(), max_vertices, max_triangles));

    let mut meshlet = Meshlet::default();

    // index of the vertex in the meshlet, 0xff if the vertex isn't used
    let mut used = vec![0xffu8; vertex_count];

    for triangle in indices.chunks_exact(3) {
        let a = triangle[0] as usize;
        let b = triangle[1] as usize;
        let c = triangle[2] as usize;
        assert!(a < vertex_count && b < vertex_count && c < vertex_count);

        let used_extra = (used[a] == 0xff) as usize
            + (used[b] == 0xff) as usize
            + (used[c] == 0xff) as usize;

        if meshlet.vertex_count as usize + used_extra > max_vertices
            || meshlet.triangle_count as usize >= max_triangles
        {
            for vertex in &meshlet.vertices[..meshlet.vertex_count as usize] {
                used[*vertex as usize] = 0xff;
            }

            result.push(meshlet);
            meshlet = Meshlet::default();
        }

        for corner in [a, b, c] {
            if used[corner] == 0xff {
                used[corner] = meshlet.vertex_count;
                meshlet.vertices[meshlet.vertex_count as usize] = corner as u32;
                meshlet.vertex_count += 1;
            }
        }

        meshlet.indices[meshlet.triangle_count as usize] = [used[a], used[b], used[c]];
        meshlet.triangle_count += 1;
    }

    if meshlet.triangle_count > 0 {
        result.push(meshlet);
    }

    debug_assert!(
        result.len() <= build_meshlets_bound(indices.len(), max_vertices, max_triangles)
    );

    result
}

fn compute_cone(indices: &[u32], positions: &[[f32; 3]]) -> Cone {
    assert!(indices.len() % 3 == 0);
    assert!(indices.len() / 3 <= 256);

    let mut normals = [[0f32; 3]; 256];
    let mut triangles = 0usize;

    for triangle in indices.chunks_exact(3) {
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

        let area = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();

        // no need to include degenerate triangles - they will be invisible anyway
        if area == 0f32 {
            continue;
        }

        normals[triangles] = [normal[0] / area, normal[1] / area, normal[2] / area];
        triangles += 1;
    }

    let mut avg_normal = [0f32; 3];

    for normal in &normals[..triangles] {
        avg_normal[0] += normal[0];
        avg_normal[1] += normal[1];
        avg_normal[2] += normal[2];
    }

    let avg_length = (avg_normal[0] * avg_normal[0]
        + avg_normal[1] * avg_normal[1]
        + avg_normal[2] * avg_normal[2])
        .sqrt();
    let inv_avg_length = if avg_length == 0f32 {
        0f32
    } else {
        1f32 / avg_length
    };

    avg_normal[0] *= inv_avg_length;
    avg_normal[1] *= inv_avg_length;
    avg_normal[2] *= inv_avg_length;

    let mut min_dot = 1f32;

    for normal in &normals[..triangles] {
        let dot = normal[0] * avg_normal[0] + normal[1] * avg_normal[1] + normal[2] * avg_normal[2];

        min_dot = min_dot.min(dot);
    }

    Cone {
        apex: [0f32; 3],
        direction: avg_normal,
        cutoff: if min_dot <= 0f32 {
            1f32
        } else {
            (1f32 - min_dot * min_dot).sqrt()
        },
    }
}

/// Computes the bounding cone of a cluster of up to 256 triangles.
///
/// For backface culling with orthographic projection, reject the cluster
/// when `dot(view, cone.direction) >= cone.cutoff`.
pub fn compute_cluster_cone(indices: &[u32], vertices: &VertexDataAdapter<'_>) -> Cone {
    let positions = vertices.decode_positions();
    compute_cone(indices, &positions)
}

/// Computes the bounding cone of a cluster of up to 256 triangles, reading
/// positions through the `DecodePosition` trait.
pub fn compute_cluster_cone_decoder<T: DecodePosition>(indices: &[u32], vertices: &[T]) -> Cone {
    let positions = vertices
        .iter()
        .map(|vertex| vertex.decode_position())
        .collect::<Vec<[f32; 3]>>();
    compute_cone(indices, &positions)
}

/// Computes the bounding cone of a meshlet.
pub fn compute_meshlet_cone(meshlet: &Meshlet, vertices: &VertexDataAdapter<'_>) -> Cone {
    let mut indices = Vec::with_capacity(meshlet.triangle_count as usize * 3);

    for triangle in 0..meshlet.triangle_count as usize {
        indices.extend_from_slice(&meshlet.global_triangle(triangle));
    }

    compute_cluster_cone(&indices, vertices)
}

/// Computes the bounding cone of a meshlet, reading positions through the
/// `DecodePosition` trait.
pub fn compute_meshlet_cone_decoder<T: DecodePosition>(meshlet: &Meshlet, vertices: &[T]) -> Cone {
    let mut indices = Vec::with_capacity(meshlet.triangle_count as usize * 3);

    for triangle in 0..meshlet.triangle_count as usize {
        indices.extend_from_slice(&meshlet.global_triangle(triangle));
    }

    compute_cluster_cone_decoder(&indices, vertices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_strip_into_one_meshlet() {
        let indices = [0, 1, 2, 2, 1, 3, 2, 3, 4, 4, 3, 5];

        let meshlets = build_meshlets(&indices, 6, 64, 126);

        assert_eq!(meshlets.len(), 1);
        assert_eq!(meshlets[0].vertex_count, 6);
        assert_eq!(meshlets[0].triangle_count, 4);

        for triangle in 0..4 {
            let global = meshlets[0].global_triangle(triangle);
            assert_eq!(global.to_vec(), indices[triangle * 3..triangle * 3 + 3].to_vec());
        }
    }

    #[test]
    fn splits_on_vertex_limit() {
        let indices = [0, 1, 2, 2, 1, 3, 2, 3, 4, 4, 3, 5];

        let meshlets = build_meshlets(&indices, 6, 4, 4);

        assert!(meshlets.len() <= 2);
        for meshlet in &meshlets {
            assert!(meshlet.vertex_count <= 4);
            assert!(meshlet.triangle_count <= 4);
            for triangle in meshlet.indices[..meshlet.triangle_count as usize].iter() {
                assert!(triangle.iter().all(|local| *local < meshlet.vertex_count));
            }
        }

        let total: usize = meshlets
            .iter()
            .map(|meshlet| meshlet.triangle_count as usize)
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn planar_cluster_has_tight_cone() {
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let indices = [0, 1, 2, 0, 2, 3];

        let cone = compute_cluster_cone_decoder(&indices, &vertices);

        assert!(cone.cutoff.abs() < 1e-6);
        assert!((cone.direction[2].abs() - 1.0).abs() < 1e-6);
        assert_eq!(cone.apex, [0.0; 3]);
    }

    #[test]
    fn degenerate_cluster_cannot_cull() {
        // two triangles facing opposite directions
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let indices = [0, 1, 2, 0, 2, 1];

        let cone = compute_cluster_cone_decoder(&indices, &vertices);

        assert_eq!(cone.cutoff, 1.0);
    }
}
