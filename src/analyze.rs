use crate::{DecodePosition, VertexDataAdapter};

/// Post-transform vertex cache statistics.
#[derive(Debug, Default, Copy, Clone)]
pub struct VertexCacheStatistics {
    pub vertices_transformed: u32,
    /// Transformed vertices / triangle count; best case 0.5, worst case 3.0
    pub acmr: f32,
    /// Transformed vertices / vertex count; best case 1.0
    pub atvr: f32,
}

/// Vertex fetch cache statistics.
#[derive(Debug, Default, Copy, Clone)]
pub struct VertexFetchStatistics {
    pub bytes_fetched: usize,
    /// Fetched bytes / total vertex data size; best case 1.0
    pub overfetch: f32,
}

/// Overdraw statistics.
#[derive(Debug, Default, Copy, Clone)]
pub struct OverdrawStatistics {
    pub pixels_covered: u32,
    pub pixels_shaded: u32,
    /// Shaded pixels / covered pixels; best case 1.0
    pub overdraw: f32,
}

/// Simulates a post-transform FIFO cache of `cache_size` entries over the
/// index stream and returns the resulting miss statistics.
pub fn analyze_vertex_cache(
    indices: &[u32],
    vertex_count: usize,
    cache_size: u32,
) -> VertexCacheStatistics {
    assert!(indices.len() % 3 == 0);
    assert!(cache_size >= 3);

    let mut result = VertexCacheStatistics::default();

    let mut cache_timestamps = vec![0u32; vertex_count];
    let mut timestamp = cache_size + 1;

    for index in indices {
        assert!((*index as usize) < vertex_count);

        if timestamp - cache_timestamps[*index as usize] > cache_size {
            // cache miss
            cache_timestamps[*index as usize] = timestamp;
            timestamp += 1;
            result.vertices_transformed += 1;
        }
    }

    result.acmr = if indices.is_empty() {
        0f32
    } else {
        result.vertices_transformed as f32 / (indices.len() / 3) as f32
    };
    result.atvr = if vertex_count == 0 {
        0f32
    } else {
        result.vertices_transformed as f32 / vertex_count as f32
    };

    result
}

const FETCH_CACHE_LINE: usize = 64;
const FETCH_CACHE_SIZE: usize = 128 * 1024;

/// Simulates the amount of memory traffic caused by vertex fetches during
/// vertex processing, using a direct-mapped 128 KiB cache with 64-byte
/// lines; on typical mesh data this is close to a 4-way cache, and the model
/// is a gross approximation anyway.
pub fn analyze_vertex_fetch(
    indices: &[u32],
    vertex_count: usize,
    vertex_size: usize,
) -> VertexFetchStatistics {
    assert!(indices.len() % 3 == 0);
    assert!(vertex_size > 0);

    let mut result = VertexFetchStatistics::default();

    let mut cache = [0usize; FETCH_CACHE_SIZE / FETCH_CACHE_LINE];

    for index in indices {
        assert!((*index as usize) < vertex_count);

        let start_address = *index as usize * vertex_size;
        let end_address = start_address + vertex_size;

        let start_tag = start_address / FETCH_CACHE_LINE;
        let end_tag = (end_address + FETCH_CACHE_LINE - 1) / FETCH_CACHE_LINE;

        for tag in start_tag..end_tag {
            let line = tag % cache.len();

            // we store +1 since the cache is zero-initialized
            if cache[line] != tag + 1 {
                result.bytes_fetched += FETCH_CACHE_LINE;
                cache[line] = tag + 1;
            }
        }
    }

    result.overfetch = if vertex_count == 0 {
        0f32
    } else {
        result.bytes_fetched as f32 / (vertex_count * vertex_size) as f32
    };

    result
}

const VIEWPORT: i32 = 256;

struct OverdrawBuffer {
    // [y][x][2] planes; the second plane holds backfaces at reversed depth
    z: Vec<f32>,
    overdraw: Vec<u32>,
}

impl OverdrawBuffer {
    fn new() -> Self {
        let cells = (VIEWPORT * VIEWPORT * 2) as usize;
        OverdrawBuffer {
            z: vec![0f32; cells],
            overdraw: vec![0u32; cells],
        }
    }

    fn clear(&mut self) {
        self.z.fill(0f32);
        self.overdraw.fill(0);
    }

    #[inline]
    fn cell(y: i32, x: i32, sign: usize) -> usize {
        ((y * VIEWPORT + x) * 2) as usize + sign
    }
}

fn det2x2(a: f32, b: f32, c: f32, d: f32) -> f32 {
    // (a b)
    // (c d)
    a * d - b * c
}

fn compute_depth_gradients(v1: [f32; 3], v2: [f32; 3], v3: [f32; 3]) -> (f32, f32, f32) {
    // z2 = z1 + dzdx * (x2 - x1) + dzdy * (y2 - y1)
    // z3 = z1 + dzdx * (x3 - x1) + dzdy * (y3 - y1)
    // (x2-x1 y2-y1)(dzdx) = (z2-z1)
    // (x3-x1 y3-y1)(dzdy)   (z3-z1)
    // we'll solve it with Cramer's rule
    let det = det2x2(v2[0] - v1[0], v2[1] - v1[1], v3[0] - v1[0], v3[1] - v1[1]);
    let invdet = if det == 0f32 { 0f32 } else { 1f32 / det };

    let dzdx = det2x2(v2[2] - v1[2], v2[1] - v1[1], v3[2] - v1[2], v3[1] - v1[1]) * invdet;
    let dzdy = det2x2(v2[0] - v1[0], v2[2] - v1[2], v3[0] - v1[0], v3[2] - v1[2]) * invdet;

    (det, dzdx, dzdy)
}

// half-space fixed point triangle rasterizer
fn rasterize(buffer: &mut OverdrawBuffer, mut v1: [f32; 3], mut v2: [f32; 3], mut v3: [f32; 3]) {
    // compute depth gradients
    let (det, mut dzx, mut dzy) = compute_depth_gradients(v1, v2, v3);
    let sign = det > 0f32;

    // flip backfacing triangles to simplify rasterization logic
    if sign {
        // flipping v2 & v3 preserves depth gradients since they're based on v1
        std::mem::swap(&mut v2, &mut v3);

        // flip depth since we rasterize backfacing triangles to the second
        // buffer with reverse Z; only v1z is used below
        v1[2] = VIEWPORT as f32 - v1[2];
        dzx = -dzx;
        dzy = -dzy;
    }

    let plane = usize::from(sign);

    // coordinates, 28.4 fixed point
    let x1 = (16.0 * v1[0] + 0.5) as i32;
    let x2 = (16.0 * v2[0] + 0.5) as i32;
    let x3 = (16.0 * v3[0] + 0.5) as i32;

    let y1 = (16.0 * v1[1] + 0.5) as i32;
    let y2 = (16.0 * v2[1] + 0.5) as i32;
    let y3 = (16.0 * v3[1] + 0.5) as i32;

    // bounding rectangle, clipped against viewport
    let minx = ((x1.min(x2).min(x3) + 0xF) >> 4).max(0);
    let maxx = ((x1.max(x2).max(x3) + 0xF) >> 4).min(VIEWPORT);
    let miny = ((y1.min(y2).min(y3) + 0xF) >> 4).max(0);
    let maxy = ((y1.max(y2).max(y3) + 0xF) >> 4).min(VIEWPORT);

    // deltas, 28.4 fixed point
    let dx12 = x1 - x2;
    let dx23 = x2 - x3;
    let dx31 = x3 - x1;

    let dy12 = y1 - y2;
    let dy23 = y2 - y3;
    let dy31 = y3 - y1;

    // fill convention correction
    let tl1 = i32::from(dy12 < 0 || (dy12 == 0 && dx12 > 0));
    let tl2 = i32::from(dy23 < 0 || (dy23 == 0 && dx23 > 0));
    let tl3 = i32::from(dy31 < 0 || (dy31 == 0 && dx31 > 0));

    // half edge equations, 24.8 fixed point
    let mut cy1 = dx12 * ((miny << 4) - y1) - dy12 * ((minx << 4) - x1) + tl1 - 1;
    let mut cy2 = dx23 * ((miny << 4) - y2) - dy23 * ((minx << 4) - x2) + tl2 - 1;
    let mut cy3 = dx31 * ((miny << 4) - y3) - dy31 * ((minx << 4) - x3) + tl3 - 1;
    let mut zy = v1[2] + (dzx * ((minx << 4) - x1) as f32 + dzy * ((miny << 4) - y1) as f32) * (1.0 / 16.0);

    for y in miny..maxy {
        let mut cx1 = cy1;
        let mut cx2 = cy2;
        let mut cx3 = cy3;
        let mut zx = zy;

        for x in minx..maxx {
            // check if all CXn are non-negative
            if (cx1 | cx2 | cx3) >= 0 {
                let cell = OverdrawBuffer::cell(y, x, plane);

                if zx >= buffer.z[cell] {
                    buffer.z[cell] = zx;
                    buffer.overdraw[cell] += 1;
                }
            }

            cx1 -= dy12 << 4;
            cx2 -= dy23 << 4;
            cx3 -= dy31 << 4;
            zx += dzx;
        }

        cy1 += dx12 << 4;
        cy2 += dx23 << 4;
        cy3 += dx31 << 4;
        zy += dzy;
    }
}

fn analyze_overdraw_positions(indices: &[u32], positions: &[[f32; 3]]) -> OverdrawStatistics {
    assert!(indices.len() % 3 == 0);

    let mut result = OverdrawStatistics::default();

    let mut minv = [f32::MAX; 3];
    let mut maxv = [f32::MIN; 3];

    for position in positions {
        for i in 0..3 {
            minv[i] = minv[i].min(position[i]);
            maxv[i] = maxv[i].max(position[i]);
        }
    }

    let extent = (maxv[0] - minv[0])
        .max(maxv[1] - minv[1])
        .max(maxv[2] - minv[2]);
    let scale = VIEWPORT as f32 / extent;

    // normalize all vertices into viewport space once
    let triangles: Vec<[f32; 3]> = indices
        .iter()
        .map(|index| {
            let v = positions[*index as usize];
            [
                (v[0] - minv[0]) * scale,
                (v[1] - minv[1]) * scale,
                (v[2] - minv[2]) * scale,
            ]
        })
        .collect();

    let mut buffer = OverdrawBuffer::new();

    for axis in 0..3 {
        buffer.clear();

        for triangle in triangles.chunks_exact(3) {
            let vn0 = triangle[0];
            let vn1 = triangle[1];
            let vn2 = triangle[2];

            // project along each axis in turn
            match axis {
                0 => rasterize(
                    &mut buffer,
                    [vn0[2], vn0[1], vn0[0]],
                    [vn1[2], vn1[1], vn1[0]],
                    [vn2[2], vn2[1], vn2[0]],
                ),
                1 => rasterize(
                    &mut buffer,
                    [vn0[0], vn0[2], vn0[1]],
                    [vn1[0], vn1[2], vn1[1]],
                    [vn2[0], vn2[2], vn2[1]],
                ),
                _ => rasterize(
                    &mut buffer,
                    [vn0[1], vn0[0], vn0[2]],
                    [vn1[1], vn1[0], vn1[2]],
                    [vn2[1], vn2[0], vn2[2]],
                ),
            }
        }

        for overdraw in &buffer.overdraw {
            result.pixels_covered += u32::from(*overdraw > 0);
            result.pixels_shaded += *overdraw;
        }
    }

    result.overdraw = if result.pixels_covered > 0 {
        result.pixels_shaded as f32 / result.pixels_covered as f32
    } else {
        0f32
    };

    result
}

/// Rasterizes the mesh into three orthographic 256x256 views and returns
/// the ratio of shaded to covered pixels; backfacing triangles land in a
/// separate reversed-depth plane so closed meshes are counted from both
/// sides.
pub fn analyze_overdraw(indices: &[u32], vertices: &VertexDataAdapter<'_>) -> OverdrawStatistics {
    let positions = vertices.decode_positions();
    analyze_overdraw_positions(indices, &positions)
}

/// Variant of [`analyze_overdraw`] that reads positions through the
/// `DecodePosition` trait.
pub fn analyze_overdraw_decoder<T: DecodePosition>(
    indices: &[u32],
    vertices: &[T],
) -> OverdrawStatistics {
    let positions = vertices
        .iter()
        .map(|vertex| vertex.decode_position())
        .collect::<Vec<[f32; 3]>>();
    analyze_overdraw_positions(indices, &positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_acmr() {
        // two triangles sharing an edge: four transforms over two triangles
        let indices = [0, 1, 2, 0, 2, 3];

        let stats = analyze_vertex_cache(&indices, 4, 16);

        assert_eq!(stats.vertices_transformed, 4);
        assert_eq!(stats.acmr, 2.0);
        assert_eq!(stats.atvr, 1.0);
    }

    #[test]
    fn cold_cache_misses_everything() {
        let indices = [0, 1, 2, 3, 4, 5];

        let stats = analyze_vertex_cache(&indices, 6, 4);

        assert_eq!(stats.vertices_transformed, 6);
        assert_eq!(stats.acmr, 3.0);
    }

    #[test]
    fn fetch_sequential_access_is_cheap() {
        let indices: Vec<u32> = (0..32 * 3).collect();

        let stats = analyze_vertex_fetch(&indices, 32 * 3, 16);

        // sequential access touches each 64-byte line once
        assert_eq!(stats.bytes_fetched, 32 * 3 * 16);
        assert_eq!(stats.overfetch, 1.0);
    }

    #[test]
    fn single_triangle_overdraw() {
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let indices = [0, 1, 2];

        let stats = analyze_overdraw_decoder(&indices, &vertices);

        assert!(stats.pixels_covered > 0);
        assert_eq!(stats.pixels_shaded, stats.pixels_covered);
        assert_eq!(stats.overdraw, 1.0);
    }

    #[test]
    fn coplanar_quads_double_overdraw() {
        // two identical quads stacked on top of each other
        let vertices: Vec<[f32; 3]> = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.5],
            [1.0, 0.0, 0.5],
            [1.0, 1.0, 0.5],
            [0.0, 1.0, 0.5],
        ];
        let indices = [0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7];

        let stats = analyze_overdraw_decoder(&indices, &vertices);

        assert!(stats.overdraw > 1.0);
    }
}
