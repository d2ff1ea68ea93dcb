use crate::{dequantize_half, quantize_half, quantize_snorm, VertexDataAdapter};
use float_cmp::ApproxEqUlps;

pub trait DecodePosition {
    fn decode_position(&self) -> [f32; 3];
}

impl DecodePosition for [f32; 3] {
    fn decode_position(&self) -> [f32; 3] {
        *self
    }
}

pub trait FromVertex {
    fn fill_from_vertex(&mut self, vertex: &Vertex);
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct PackedVertex {
    /// Unsigned 16-bit value, use `pos_offset/pos_scale` to unpack
    pub p: [u16; 4],

    /// Normalized signed 8-bit value
    pub n: [i8; 4],

    /// Unsigned 16-bit value, use `uv_offset/uv_scale` to unpack
    pub t: [u16; 2],
}

impl FromVertex for PackedVertex {
    fn fill_from_vertex(&mut self, vertex: &Vertex) {
        self.p[0] = quantize_half(vertex.p[0]);
        self.p[1] = quantize_half(vertex.p[1]);
        self.p[2] = quantize_half(vertex.p[2]);
        self.p[3] = 0u16;

        self.n[0] = quantize_snorm(vertex.n[0], 8) as i8;
        self.n[1] = quantize_snorm(vertex.n[1], 8) as i8;
        self.n[2] = quantize_snorm(vertex.n[2], 8) as i8;
        self.n[3] = 0i8;

        self.t[0] = quantize_half(vertex.t[0]);
        self.t[1] = quantize_half(vertex.t[1]);
    }
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct PackedVertexOct {
    pub p: [u16; 3],
    pub n: [u8; 2], // octahedron encoded normal, aliases .pw
    pub t: [u16; 2],
}

impl FromVertex for PackedVertexOct {
    fn fill_from_vertex(&mut self, vertex: &Vertex) {
        self.p[0] = quantize_half(vertex.p[0]);
        self.p[1] = quantize_half(vertex.p[1]);
        self.p[2] = quantize_half(vertex.p[2]);

        let nsum = vertex.n[0].abs() + vertex.n[1].abs() + vertex.n[2].abs();
        let nx = vertex.n[0] / nsum;
        let ny = vertex.n[1] / nsum;
        let nz = vertex.n[2];

        let nu = if nz >= 0f32 {
            nx
        } else {
            (1f32 - ny.abs()) * if nx >= 0f32 { 1f32 } else { -1f32 }
        };

        let nv = if nz >= 0f32 {
            ny
        } else {
            (1f32 - nx.abs()) * if ny >= 0f32 { 1f32 } else { -1f32 }
        };

        self.n[0] = quantize_snorm(nu, 8) as u8;
        self.n[1] = quantize_snorm(nv, 8) as u8;

        self.t[0] = quantize_half(vertex.t[0]);
        self.t[1] = quantize_half(vertex.t[1]);
    }
}

#[derive(Default, Debug, Copy, Clone, PartialOrd)]
#[repr(C)]
/// A basic Vertex type that can be used with most mesh processing functions.
/// You don't _need_ to use this type, you can use your own type by
/// implementing the `DecodePosition` trait and making a [`VertexDataAdapter`]
/// from slices of it.
pub struct Vertex {
    pub p: [f32; 3],
    pub n: [f32; 3],
    pub t: [f32; 2],
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Vertex) -> bool {
        self.p[0].approx_eq_ulps(&other.p[0], 2)
            && self.p[1].approx_eq_ulps(&other.p[1], 2)
            && self.p[2].approx_eq_ulps(&other.p[2], 2)
            && self.n[0].approx_eq_ulps(&other.n[0], 2)
            && self.n[1].approx_eq_ulps(&other.n[1], 2)
            && self.n[2].approx_eq_ulps(&other.n[2], 2)
            && self.t[0].approx_eq_ulps(&other.t[0], 2)
            && self.t[1].approx_eq_ulps(&other.t[1], 2)
    }
}

impl Eq for Vertex {}

impl DecodePosition for Vertex {
    fn decode_position(&self) -> [f32; 3] {
        self.p
    }
}

pub fn pack_vertices<T: FromVertex + Default + Clone>(input: &[Vertex]) -> Vec<T> {
    let mut vertices: Vec<T> = vec![T::default(); input.len()];
    for (packed, vertex) in vertices.iter_mut().zip(input.iter()) {
        packed.fill_from_vertex(vertex);
    }
    vertices
}

/// Mean squared and maximum absolute reconstruction error of a position
/// quantization scheme.
#[derive(Debug, Default, Copy, Clone)]
pub struct QuantizationError {
    pub mean_squared: f32,
    pub max_abs: f32,
}

fn encode_unorm(v: f32, bits: u32) -> i32 {
    let scale = ((1i64 << bits) - 1) as f32;
    let v = v.clamp(0f32, 1f32);

    (v * scale + 0.5) as i32
}

fn decode_unorm(v: i32, bits: u32) -> f32 {
    let scale = ((1i64 << bits) - 1) as f32;

    v as f32 / scale
}

fn pack(f: f32, scale: f32, offset: f32) -> f32 {
    (f - offset) / scale
}

fn unpack(f: f32, scale: f32, offset: f32) -> f32 {
    f * scale + offset
}

fn roughly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

/// Computes the per-axis position bounds of a vertex buffer.
pub fn compute_mesh_bounds(vertices: &VertexDataAdapter<'_>) -> ([f32; 3], [f32; 3]) {
    let mut minv = [f32::MAX; 3];
    let mut maxv = [f32::MIN; 3];

    for i in 0..vertices.vertex_count {
        let v = vertices.position(i);

        for j in 0..3 {
            minv[j] = minv[j].min(v[j]);
            maxv[j] = maxv[j].max(v[j]);
        }
    }

    (minv, maxv)
}

/// Computes the scale and offset that minimize the position error of an
/// N-bit unorm quantization, returning `(scale, offset)` per axis.
///
/// Starting from the bounding box fit, each position is assigned to a
/// quantization interval and the scale/offset are re-solved in the least
/// squares sense under the assumption that the assignment doesn't change;
/// since it usually does, the process repeats until the parameters settle
/// or `iteration_count` is exhausted. With `uniform_scale` all three axes
/// share a single scale (but keep independent offsets), which is what
/// formats with one shared dequantization constant need.
pub fn optimize_unorm_quantization(
    vertices: &VertexDataAdapter<'_>,
    bits: u32,
    uniform_scale: bool,
    iteration_count: usize,
) -> ([f32; 3], [f32; 3]) {
    let (minv, maxv) = compute_mesh_bounds(vertices);
    let n = vertices.vertex_count as f32;

    let mut scale = [0f32; 3];
    let mut offset = minv;

    // initial fit from the bounding box; the floor avoids division by zero
    // on flat axes
    for j in 0..3 {
        scale[j] = (maxv[j] - minv[j]).max(0.01);
    }

    if vertices.vertex_count == 0 {
        return (scale, offset);
    }

    if !uniform_scale {
        // optimize each dimension independently:
        //
        // X = Q * m + a, in the least squares sense:
        //   m = (XQ - SQ*SX/n) / (QQ - SQ*SQ/n)
        //   a = (SX - SQ*m) / n
        for axis in 0..3 {
            let mut best_scale = scale[axis];
            let mut best_offset = offset[axis];

            for _ in 0..iteration_count {
                let mut xq = 0f32;
                let mut sx = 0f32;
                let mut qq = 0f32;
                let mut sq = 0f32;

                for i in 0..vertices.vertex_count {
                    let float_pos = vertices.position(i)[axis];

                    // encode using the current fit, decode without applying
                    // scale/offset
                    let unorm_pos =
                        decode_unorm(encode_unorm(pack(float_pos, best_scale, best_offset), bits), bits);

                    xq += float_pos * unorm_pos;
                    sx += float_pos;
                    qq += unorm_pos * unorm_pos;
                    sq += unorm_pos;
                }

                let denom = qq - sq * sq / n;
                let m = if denom.abs() < 1e-5 {
                    1f32
                } else {
                    (xq - sq * sx / n) / denom
                };
                let a = (sx - sq * m) / n;

                if roughly_equal(best_scale, m) && roughly_equal(best_offset, a) {
                    break;
                }

                best_scale = m;
                best_offset = a;
            }

            scale[axis] = best_scale;
            offset[axis] = best_offset;
        }
    } else {
        let mut best_scale = scale[0].max(scale[1]).max(scale[2]);
        let mut best_offset = offset;

        // one shared scale, three offsets; same least squares derivation
        // with the scale equation summed over all axes
        for _ in 0..iteration_count {
            let mut xq = 0f32;
            let mut sx = [0f32; 3];
            let mut qq = 0f32;
            let mut sq = [0f32; 3];

            for i in 0..vertices.vertex_count {
                let float_pos = vertices.position(i);

                for j in 0..3 {
                    let unorm_pos = decode_unorm(
                        encode_unorm(pack(float_pos[j], best_scale, best_offset[j]), bits),
                        bits,
                    );

                    xq += float_pos[j] * unorm_pos;
                    sx[j] += float_pos[j];
                    qq += unorm_pos * unorm_pos;
                    sq[j] += unorm_pos;
                }
            }

            let denom = qq * n - sq[0] * sq[0] - sq[1] * sq[1] - sq[2] * sq[2];
            if denom.abs() < 1e-4 {
                break;
            }

            let m = (xq * n - sq[0] * sx[0] - sq[1] * sx[1] - sq[2] * sx[2]) / denom;
            let a = [
                (sx[0] - sq[0] * m) / n,
                (sx[1] - sq[1] * m) / n,
                (sx[2] - sq[2] * m) / n,
            ];

            if roughly_equal(best_scale, m)
                && roughly_equal(best_offset[0], a[0])
                && roughly_equal(best_offset[1], a[1])
                && roughly_equal(best_offset[2], a[2])
            {
                break;
            }

            best_scale = m;
            best_offset = a;
        }

        scale = [best_scale; 3];
        offset = best_offset;
    }

    (scale, offset)
}

/// Evaluates the reconstruction error of quantizing positions to N-bit
/// unorm values with the given scale and offset.
pub fn evaluate_unorm_quantization_error(
    vertices: &VertexDataAdapter<'_>,
    bits: u32,
    scale: [f32; 3],
    offset: [f32; 3],
) -> QuantizationError {
    let mut sq_error_sum = 0f64;
    let mut abs_error_max = 0f32;

    for i in 0..vertices.vertex_count {
        let v = vertices.position(i);

        for j in 0..3 {
            let q = encode_unorm(pack(v[j], scale[j], offset[j]), bits);
            let df = unpack(decode_unorm(q, bits), scale[j], offset[j]) - v[j];

            sq_error_sum += f64::from(df) * f64::from(df);
            abs_error_max = abs_error_max.max(df.abs());
        }
    }

    QuantizationError {
        mean_squared: if vertices.vertex_count == 0 {
            0f32
        } else {
            (sq_error_sum / vertices.vertex_count as f64) as f32
        },
        max_abs: abs_error_max,
    }
}

/// Evaluates the reconstruction error of quantizing positions to half
/// floats with the given scale and offset.
pub fn evaluate_half_quantization_error(
    vertices: &VertexDataAdapter<'_>,
    scale: [f32; 3],
    offset: [f32; 3],
) -> QuantizationError {
    let mut sq_error_sum = 0f64;
    let mut abs_error_max = 0f32;

    for i in 0..vertices.vertex_count {
        let v = vertices.position(i);

        for j in 0..3 {
            let h = quantize_half(pack(v[j], scale[j], offset[j]));
            let df = unpack(dequantize_half(h), scale[j], offset[j]) - v[j];

            sq_error_sum += f64::from(df) * f64::from(df);
            abs_error_max = abs_error_max.max(df.abs());
        }
    }

    QuantizationError {
        mean_squared: if vertices.vertex_count == 0 {
            0f32
        } else {
            (sq_error_sum / vertices.vertex_count as f64) as f32
        },
        max_abs: abs_error_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_to_bytes;

    fn adapter_over(positions: &[[f32; 3]]) -> VertexDataAdapter<'_> {
        VertexDataAdapter::new(typed_to_bytes(positions), 12, 0).unwrap()
    }

    #[test]
    fn bounds() {
        let positions: Vec<[f32; 3]> = vec![[0.0, -1.0, 2.0], [3.0, 1.0, -2.0]];
        let (minv, maxv) = compute_mesh_bounds(&adapter_over(&positions));

        assert_eq!(minv, [0.0, -1.0, -2.0]);
        assert_eq!(maxv, [3.0, 1.0, 2.0]);
    }

    #[test]
    fn refined_fit_is_no_worse_than_bounding_box() {
        let positions: Vec<[f32; 3]> = (0..64)
            .map(|i| {
                let f = i as f32 / 63.0;
                [f * f, 1.0 - f, (f * 7.0).sin()]
            })
            .collect();
        let adapter = adapter_over(&positions);

        let (minv, maxv) = compute_mesh_bounds(&adapter);
        let bbox_scale = [
            (maxv[0] - minv[0]).max(0.01),
            (maxv[1] - minv[1]).max(0.01),
            (maxv[2] - minv[2]).max(0.01),
        ];
        let bbox_error = evaluate_unorm_quantization_error(&adapter, 8, bbox_scale, minv);

        let (scale, offset) = optimize_unorm_quantization(&adapter, 8, false, 16);
        let refined_error = evaluate_unorm_quantization_error(&adapter, 8, scale, offset);

        // an 8-bit step over a unit range is about 0.004; both fits must be
        // in that ballpark and the refinement must not blow up
        assert!(bbox_error.max_abs < 0.05);
        assert!(refined_error.max_abs < 0.05);
        assert!(refined_error.mean_squared <= bbox_error.mean_squared * 2.0 + 1e-9);
    }

    #[test]
    fn uniform_scale_is_shared() {
        let positions: Vec<[f32; 3]> = (0..16)
            .map(|i| [i as f32, i as f32 * 0.25, 4.0 - i as f32 * 0.5])
            .collect();
        let adapter = adapter_over(&positions);

        let (scale, _) = optimize_unorm_quantization(&adapter, 10, true, 8);

        assert_eq!(scale[0], scale[1]);
        assert_eq!(scale[1], scale[2]);
    }

    #[test]
    fn half_error_is_small_for_unit_range() {
        let positions: Vec<[f32; 3]> = (0..8)
            .map(|i| [i as f32 / 7.0, 0.5, 1.0 - i as f32 / 7.0])
            .collect();
        let adapter = adapter_over(&positions);

        let error =
            evaluate_half_quantization_error(&adapter, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);

        assert!(error.max_abs < 1e-3);
    }

    #[test]
    fn packed_vertex_roundtrip_positions() {
        let vertices = vec![Vertex {
            p: [0.5, -1.5, 4.0],
            n: [0.0, 0.0, 1.0],
            t: [0.25, 0.75],
        }];

        let packed: Vec<PackedVertex> = pack_vertices(&vertices);

        assert_eq!(dequantize_half(packed[0].p[0]), 0.5);
        assert_eq!(dequantize_half(packed[0].p[1]), -1.5);
        assert_eq!(dequantize_half(packed[0].p[2]), 4.0);
        assert_eq!(packed[0].n[2], 127);
    }
}
