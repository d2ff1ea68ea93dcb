use crate::hash::EdgeSet;
use crate::{DecodePosition, VertexDataAdapter};

// This work is based on:
// Michael Garland and Paul S. Heckbert. Surface simplification using quadric error metrics. 1997

#[derive(Debug, Default, Copy, Clone)]
struct Vector3 {
    x: f32,
    y: f32,
    z: f32,
}

impl Vector3 {
    fn new(p: [f32; 3]) -> Self {
        Vector3 {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }

    fn sub(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    fn cross(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    fn normalize(&mut self) -> f32 {
        let length = self.dot(*self).sqrt();

        if length > 0f32 {
            self.x /= length;
            self.y /= length;
            self.z /= length;
        }

        length
    }
}

/// Symmetric 4x4 error matrix stored as ten scalars.
#[derive(Debug, Default, Copy, Clone)]
struct Quadric {
    a00: f32,
    a10: f32,
    a11: f32,
    a20: f32,
    a21: f32,
    a22: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    c: f32,
}

impl Quadric {
    fn add(&mut self, r: &Quadric) {
        self.a00 += r.a00;
        self.a10 += r.a10;
        self.a11 += r.a11;
        self.a20 += r.a20;
        self.a21 += r.a21;
        self.a22 += r.a22;
        self.b0 += r.b0;
        self.b1 += r.b1;
        self.b2 += r.b2;
        self.c += r.c;
    }

    fn mul(&mut self, s: f32) {
        self.a00 *= s;
        self.a10 *= s;
        self.a11 *= s;
        self.a20 *= s;
        self.a21 *= s;
        self.a22 *= s;
        self.b0 *= s;
        self.b1 *= s;
        self.b2 *= s;
        self.c *= s;
    }

    fn error(&self, v: Vector3) -> f32 {
        let vtqv = self.a00 * v.x * v.x
            + self.a10 * v.x * v.y * 2.0
            + self.a11 * v.y * v.y
            + self.a20 * v.x * v.z * 2.0
            + self.a21 * v.y * v.z * 2.0
            + self.a22 * v.z * v.z
            + self.b0 * v.x * 2.0
            + self.b1 * v.y * 2.0
            + self.b2 * v.z * 2.0
            + self.c;

        vtqv.abs()
    }

    fn from_plane(a: f32, b: f32, c: f32, d: f32) -> Quadric {
        Quadric {
            a00: a * a,
            a10: b * a,
            a11: b * b,
            a20: c * a,
            a21: c * b,
            a22: c * c,
            b0: d * a,
            b1: d * b,
            b2: d * c,
            c: d * d,
        }
    }

    fn from_triangle(p0: Vector3, p1: Vector3, p2: Vector3) -> Quadric {
        let p10 = p1.sub(p0);
        let p20 = p2.sub(p0);

        let mut normal = p10.cross(p20);
        let area = normal.normalize();

        let distance = normal.dot(p0);

        let mut q = Quadric::from_plane(normal.x, normal.y, normal.z, -distance);

        // three classical weighting methods are weight=1, weight=area and
        // weight=area^2; we use weight=area
        q.mul(area);

        q
    }

    fn from_triangle_edge(p0: Vector3, p1: Vector3, p2: Vector3) -> Quadric {
        let mut p10 = p1.sub(p0);
        let length = p10.normalize();

        // the plane is through the edge, perpendicular to the triangle
        let p20 = p2.sub(p0);
        let p20p = p20.dot(p10);

        let mut normal = Vector3 {
            x: p20.x - p10.x * p20p,
            y: p20.y - p10.y * p20p,
            z: p20.z - p10.z * p20p,
        };
        normal.normalize();

        let distance = normal.dot(p0);

        let mut q = Quadric::from_plane(normal.x, normal.y, normal.z, -distance);

        // the heavy weight discourages boundary collapses
        q.mul(length * 1000.0);

        q
    }
}

#[derive(Debug, Copy, Clone)]
struct Collapse {
    v0: u32,
    v1: u32,
    error: f32,
}

impl Collapse {
    // to_bits is monotone on non-negative floats, so the radix key orders
    // collapses exactly like the float error does
    fn key(&self) -> u32 {
        self.error.to_bits()
    }
}

fn edge_id(a: u32, b: u32) -> u64 {
    (u64::from(a) << 32) | u64::from(b)
}

const SORT_BITS: u32 = 11;

fn sort_edge_collapses(collapses: &[Collapse]) -> Vec<u32> {
    // fill histogram for counting sort
    let mut histogram = [0u32; 1 << SORT_BITS];

    for collapse in collapses {
        let key = (collapse.key() << 1) >> (32 - SORT_BITS);

        histogram[key as usize] += 1;
    }

    // compute offsets based on histogram data
    let mut histogram_sum = 0u32;

    for count in histogram.iter_mut() {
        let offset = histogram_sum;
        histogram_sum += *count;
        *count = offset;
    }

    debug_assert!(histogram_sum as usize == collapses.len());

    // compute sort order based on offsets
    let mut order = vec![0u32; collapses.len()];

    for (i, collapse) in collapses.iter().enumerate() {
        let key = (collapse.key() << 1) >> (32 - SORT_BITS);

        order[histogram[key as usize] as usize] = i as u32;
        histogram[key as usize] += 1;
    }

    order
}

fn fill_face_quadrics(quadrics: &mut [Quadric], indices: &[u32], positions: &[Vector3]) {
    for triangle in indices.chunks_exact(3) {
        let q = Quadric::from_triangle(
            positions[triangle[0] as usize],
            positions[triangle[1] as usize],
            positions[triangle[2] as usize],
        );

        for corner in triangle {
            quadrics[*corner as usize].add(&q);
        }
    }
}

fn fill_edge_quadrics(quadrics: &mut [Quadric], indices: &[u32], positions: &[Vector3]) {
    let mut edges = EdgeSet::with_capacity(indices.len());

    for triangle in indices.chunks_exact(3) {
        for e in 0..3 {
            let i0 = triangle[e];
            let i1 = triangle[(e + 1) % 3];

            edges.insert(edge_id(i0, i1));
        }
    }

    for triangle in indices.chunks_exact(3) {
        for e in 0..3 {
            let i0 = triangle[e];
            let i1 = triangle[(e + 1) % 3];

            // an edge is a boundary unless the opposite direction is owned
            // by another triangle
            if !edges.contains(edge_id(i1, i0)) {
                let i2 = triangle[(e + 2) % 3];

                let q = Quadric::from_triangle_edge(
                    positions[i0 as usize],
                    positions[i1 as usize],
                    positions[i2 as usize],
                );

                quadrics[i0 as usize].add(&q);
                quadrics[i1 as usize].add(&q);
            }
        }
    }
}

fn simplify_edge_collapse(
    indices: &[u32],
    positions: &[Vector3],
    target_index_count: usize,
) -> (Vec<u32>, f32) {
    let vertex_count = positions.len();

    let mut vertex_quadrics = vec![Quadric::default(); vertex_count];

    fill_face_quadrics(&mut vertex_quadrics, indices, positions);
    fill_edge_quadrics(&mut vertex_quadrics, indices, positions);

    let mut result = indices.to_vec();

    let mut worst_error = 0f32;

    let mut edge_collapses: Vec<Collapse> = Vec::with_capacity(indices.len());
    let mut vertex_remap = vec![0u32; vertex_count];
    let mut vertex_locked = vec![false; vertex_count];

    while result.len() > target_index_count {
        edge_collapses.clear();

        for triangle in result.chunks_exact(3) {
            for e in 0..3 {
                let i0 = triangle[e];
                let i1 = triangle[(e + 1) % 3];

                // direction is chosen by the cheaper quadric error
                let e01 = vertex_quadrics[i0 as usize].error(positions[i1 as usize]);
                let e10 = vertex_quadrics[i1 as usize].error(positions[i0 as usize]);

                let c = if e01 <= e10 {
                    Collapse {
                        v0: i0,
                        v1: i1,
                        error: e01,
                    }
                } else {
                    Collapse {
                        v0: i1,
                        v1: i0,
                        error: e10,
                    }
                };
                debug_assert!(c.error >= 0f32);

                edge_collapses.push(c);
            }
        }

        let collapse_order = sort_edge_collapses(&edge_collapses);

        for (i, target) in vertex_remap.iter_mut().enumerate() {
            *target = i as u32;
        }

        for locked in vertex_locked.iter_mut() {
            *locked = false;
        }

        // each collapse removes 2 triangles
        let edge_collapse_goal = (result.len() - target_index_count) / 6 + 1;

        let goal_at = edge_collapse_goal.min(edge_collapses.len() - 1);
        let error_goal = edge_collapses[collapse_order[goal_at] as usize].error;
        let error_limit = error_goal * 1.5;

        let mut collapses = 0usize;
        let mut pass_error = 0f32;

        for i in &collapse_order {
            let c = edge_collapses[*i as usize];

            if vertex_locked[c.v0 as usize] || vertex_locked[c.v1 as usize] {
                continue;
            }

            if c.error > error_limit {
                break;
            }

            debug_assert!(vertex_remap[c.v0 as usize] == c.v0);
            debug_assert!(vertex_remap[c.v1 as usize] == c.v1);

            let q = vertex_quadrics[c.v0 as usize];
            vertex_quadrics[c.v1 as usize].add(&q);

            vertex_remap[c.v0 as usize] = c.v1;

            vertex_locked[c.v0 as usize] = true;
            vertex_locked[c.v1 as usize] = true;

            collapses += 1;
            pass_error = c.error;

            if collapses >= edge_collapse_goal {
                break;
            }
        }

        worst_error = worst_error.max(pass_error);

        // no edges can be collapsed any more => bail out
        if collapses == 0 {
            break;
        }

        let mut write = 0usize;

        for read in (0..result.len()).step_by(3) {
            let v0 = vertex_remap[result[read] as usize];
            let v1 = vertex_remap[result[read + 1] as usize];
            let v2 = vertex_remap[result[read + 2] as usize];

            // the remap is idempotent within a pass since both collapse
            // endpoints are locked
            debug_assert!(vertex_remap[v0 as usize] == v0);
            debug_assert!(vertex_remap[v1 as usize] == v1);
            debug_assert!(vertex_remap[v2 as usize] == v2);

            if v0 != v1 && v0 != v2 && v1 != v2 {
                result[write] = v0;
                result[write + 1] = v1;
                result[write + 2] = v2;
                write += 3;
            }
        }

        result.truncate(write);
    }

    (result, worst_error)
}

/// Reduces the number of triangles in the mesh, attempting to preserve mesh
/// appearance as much as possible. The resulting index buffer references
/// vertices from the original vertex buffer.
///
/// The simplifier stops when the target index count is reached or when no
/// collapse stays within the per-pass error limit, so the result may contain
/// more than `target_index_count` indices; callers can retry with a larger
/// budget.
///
/// If the original vertex data isn't required, creating a compact vertex
/// buffer using `optimize_vertex_fetch` is recommended.
pub fn simplify(
    indices: &[u32],
    vertices: &VertexDataAdapter<'_>,
    target_index_count: usize,
) -> Vec<u32> {
    simplify_with_error(indices, vertices, target_index_count).0
}

/// Variant of [`simplify`] that also reports the worst quadric error among
/// the collapses that were performed.
pub fn simplify_with_error(
    indices: &[u32],
    vertices: &VertexDataAdapter<'_>,
    target_index_count: usize,
) -> (Vec<u32>, f32) {
    assert!(indices.len() % 3 == 0);
    assert!(target_index_count <= indices.len());

    let positions = vertices
        .decode_positions()
        .iter()
        .map(|p| Vector3::new(*p))
        .collect::<Vec<Vector3>>();

    simplify_edge_collapse(indices, &positions, target_index_count)
}

/// Reduces the number of triangles in the mesh, reading positions through
/// the `DecodePosition` trait.
pub fn simplify_decoder<T: DecodePosition>(
    indices: &[u32],
    vertices: &[T],
    target_index_count: usize,
) -> Vec<u32> {
    assert!(indices.len() % 3 == 0);
    assert!(target_index_count <= indices.len());

    let positions = vertices
        .iter()
        .map(|vertex| Vector3::new(vertex.decode_position()))
        .collect::<Vec<Vector3>>();

    simplify_edge_collapse(indices, &positions, target_index_count).0
}
