use meshprep::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn encode_index() {
    // note: the 4 6 5 triangle is a combo-breaker for delta-style codecs;
    // keep it in the fixture so the stream exercises non-sequential indices
    let indices = [0u32, 1, 2, 2, 1, 3, 4, 6, 5, 7, 8, 9];

    let encoded = encode_index_buffer(&indices).unwrap();
    let decoded = decode_index_buffer(&encoded, indices.len()).unwrap();
    assert_eq!(decoded, indices);

    // decoder rejects any truncated prefix of a valid stream
    for i in 0..encoded.len() {
        assert!(decode_index_buffer(&encoded[..i], indices.len()).is_err());
    }

    // decoder doesn't accept extra bytes after a valid stream
    let mut larger = encoded.clone();
    larger.push(0);
    assert!(decode_index_buffer(&larger, indices.len()).is_err());

    // decoder doesn't accept malformed headers
    let mut broken = encoded;
    broken[0] = 0xff;
    assert!(decode_index_buffer(&broken, indices.len()).is_err());
}

#[test]
fn encode_vertex() {
    let mut vertices: Vec<PackedVertexOct> = Vec::with_capacity(4);

    vertices.push(PackedVertexOct {
        p: [0, 0, 0],
        n: [0, 0],
        t: [0, 0],
    });

    vertices.push(PackedVertexOct {
        p: [300, 0, 0],
        n: [0, 0],
        t: [500, 0],
    });

    vertices.push(PackedVertexOct {
        p: [0, 300, 0],
        n: [0, 0],
        t: [0, 500],
    });

    vertices.push(PackedVertexOct {
        p: [300, 300, 0],
        n: [0, 0],
        t: [500, 500],
    });

    let encoded = encode_vertex_buffer(&vertices).unwrap();
    let decoded: Vec<PackedVertexOct> = decode_vertex_buffer(&encoded, vertices.len()).unwrap();
    assert_eq!(decoded, vertices);

    // decoder rejects size mismatches and malformed headers
    assert!(decode_vertex_buffer::<PackedVertexOct>(&encoded, vertices.len() - 1).is_err());

    let mut broken = encoded;
    broken[0] = 0xff;
    assert!(decode_vertex_buffer::<PackedVertexOct>(&broken, vertices.len()).is_err());
}

#[test]
fn encode_random_vertex_streams() {
    let mut rng = StdRng::seed_from_u64(20240);

    for _ in 0..8 {
        let count = rng.gen_range(0..256);
        let vertices: Vec<[u16; 8]> = (0..count).map(|_| rng.gen()).collect();

        let encoded = encode_vertex_buffer(&vertices).unwrap();
        assert_eq!(encoded.len(), 1 + count * 16);

        let decoded: Vec<[u16; 8]> = decode_vertex_buffer(&encoded, count).unwrap();
        assert_eq!(decoded, vertices);
    }
}

#[test]
fn meshlet_triangles_survive_the_codec() {
    let mut rng = StdRng::seed_from_u64(555);

    let vertex_count = 64usize;
    let mut indices = Vec::new();
    while indices.len() < 300 {
        let a = rng.gen_range(0..vertex_count as u32);
        let b = rng.gen_range(0..vertex_count as u32);
        let c = rng.gen_range(0..vertex_count as u32);
        if a != b && a != c && b != c {
            indices.extend_from_slice(&[a, b, c]);
        }
    }

    let meshlets = build_meshlets(&indices, vertex_count, 32, 16);

    let mut resolved = Vec::new();
    for meshlet in &meshlets {
        for triangle in 0..meshlet.triangle_count as usize {
            resolved.extend_from_slice(&meshlet.global_triangle(triangle));
        }
    }

    let encoded = encode_index_buffer(&resolved).unwrap();
    let decoded = decode_index_buffer(&encoded, resolved.len()).unwrap();

    // triangles survive exactly, which subsumes equality up to rotation
    assert_eq!(decoded, resolved);

    let rotate = |t: &[u32]| {
        let mut t = [t[0], t[1], t[2]];
        let low = t
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap();
        t.rotate_left(low);
        t
    };

    let before: Vec<[u32; 3]> = indices.chunks_exact(3).map(|t| rotate(t)).collect();
    let after: Vec<[u32; 3]> = decoded.chunks_exact(3).map(|t| rotate(t)).collect();
    assert_eq!(before, after);
}
