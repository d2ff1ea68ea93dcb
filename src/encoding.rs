use crate::utilities::typed_to_bytes_mut;
use crate::{typed_to_bytes, Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};

// Encoded streams carry their format version in the leading byte so that
// persisted buffers stay decodable across library updates.
const ENCODE_VERSION_DEFAULT: u8 = 0;
const ENCODE_VERSION_MAX: u8 = 0;

static ENCODE_VERSION: AtomicU8 = AtomicU8::new(ENCODE_VERSION_DEFAULT);

/// Sets the format version that the encoders stamp into the streams they
/// produce. This is process-wide state intended to be set once during
/// initialization; changing it concurrently with encode calls leaves the
/// version of in-flight streams unspecified.
pub fn set_encode_version(version: u8) {
    assert!(version <= ENCODE_VERSION_MAX);

    ENCODE_VERSION.store(version, Ordering::Relaxed);
}

/// Returns the format version currently stamped into encoded streams.
pub fn encode_version() -> u8 {
    ENCODE_VERSION.load(Ordering::Relaxed)
}

fn check_version(encoded: &[u8]) -> Result<u8> {
    match encoded.first() {
        Some(version) if *version <= ENCODE_VERSION_MAX => Ok(*version),
        Some(version) => Err(Error::decode_dynamic(format!(
            "unsupported stream version {version}"
        ))),
        None => Err(Error::decode("stream is empty")),
    }
}

/// Encodes vertex data into a stream that decompresses with
/// [`decode_vertex_buffer`].
///
/// The stream stores one byte plane after another (all first bytes, then
/// all second bytes, and so on), which groups bytes of similar entropy for
/// a downstream general-purpose compressor. The round-trip is lossless.
pub fn encode_vertex_buffer<T>(vertices: &[T]) -> Result<Vec<u8>> {
    let vertex_size = std::mem::size_of::<T>();
    assert!(vertex_size > 0);

    let data = typed_to_bytes(vertices);
    let vertex_count = vertices.len();

    let mut result = Vec::with_capacity(1 + data.len());
    result.push(encode_version());

    for k in 0..vertex_size {
        for i in 0..vertex_count {
            result.push(data[i * vertex_size + k]);
        }
    }

    Ok(result)
}

/// Decodes a vertex stream produced by [`encode_vertex_buffer`].
///
/// `T` must be a plain-old-data type: every bit pattern a valid value, no
/// padding, matching the type used to encode.
pub fn decode_vertex_buffer<T: Clone + Default>(
    encoded: &[u8],
    vertex_count: usize,
) -> Result<Vec<T>> {
    let vertex_size = std::mem::size_of::<T>();
    assert!(vertex_size > 0);

    check_version(encoded)?;
    let payload = &encoded[1..];

    if payload.len() != vertex_count * vertex_size {
        return Err(Error::decode_dynamic(format!(
            "vertex stream holds {} bytes, expected {}",
            payload.len(),
            vertex_count * vertex_size
        )));
    }

    let mut result: Vec<T> = vec![T::default(); vertex_count];
    let data = typed_to_bytes_mut(&mut result);

    for k in 0..vertex_size {
        for i in 0..vertex_count {
            data[i * vertex_size + k] = payload[k * vertex_count + i];
        }
    }

    Ok(result)
}

/// Encodes an index buffer into a stream that decompresses with
/// [`decode_index_buffer`]; indices are stored as LEB128 varints, so small
/// indices (the common case after cache optimization) take fewer bytes.
/// The round-trip is lossless.
pub fn encode_index_buffer(indices: &[u32]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(1 + indices.len() * 2);
    result.push(encode_version());

    for index in indices {
        let mut value = *index;

        while value >= 0x80 {
            result.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }

        result.push(value as u8);
    }

    Ok(result)
}

/// Decodes an index stream produced by [`encode_index_buffer`].
pub fn decode_index_buffer(encoded: &[u8], index_count: usize) -> Result<Vec<u32>> {
    check_version(encoded)?;
    let payload = &encoded[1..];

    let mut result = Vec::with_capacity(index_count);
    let mut at = 0usize;

    for _ in 0..index_count {
        let mut value = 0u32;
        let mut shift = 0u32;

        loop {
            let byte = match payload.get(at) {
                Some(byte) => *byte,
                None => return Err(Error::decode("index stream is truncated")),
            };
            at += 1;

            if shift == 28 && byte > 0x0f {
                return Err(Error::decode("index value is out of range"));
            }

            value |= u32::from(byte & 0x7f) << shift;

            if byte < 0x80 {
                break;
            }

            shift += 7;

            if shift > 28 {
                return Err(Error::decode("index value is out of range"));
            }
        }

        result.push(value);
    }

    if at != payload.len() {
        return Err(Error::decode("index stream has trailing bytes"));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_byte_is_stamped() {
        assert_eq!(encode_version(), 0);

        let encoded = encode_index_buffer(&[0, 1, 2]).unwrap();
        assert_eq!(encoded[0], 0);
    }

    #[test]
    fn index_round_trip() {
        let indices = [0u32, 1, 2, 2, 1, 3, 127, 128, 70000, u32::MAX];

        let encoded = encode_index_buffer(&indices).unwrap();
        let decoded = decode_index_buffer(&encoded, indices.len()).unwrap();

        assert_eq!(decoded, indices);
    }

    #[test]
    fn index_stream_rejects_tampering() {
        let indices = [0u32, 1, 2];
        let encoded = encode_index_buffer(&indices).unwrap();

        // trailing garbage
        let mut longer = encoded.clone();
        longer.push(0);
        assert!(decode_index_buffer(&longer, indices.len()).is_err());

        // truncation
        assert!(decode_index_buffer(&encoded[..encoded.len() - 1], indices.len()).is_err());

        // unknown version
        let mut wrong_version = encoded;
        wrong_version[0] = 0x7f;
        assert!(decode_index_buffer(&wrong_version, indices.len()).is_err());
    }

    #[test]
    fn vertex_round_trip() {
        let vertices: Vec<[f32; 3]> = vec![[0.0, 1.5, -2.0], [3.25, -0.5, 8.0]];

        let encoded = encode_vertex_buffer(&vertices).unwrap();
        let decoded: Vec<[f32; 3]> = decode_vertex_buffer(&encoded, vertices.len()).unwrap();

        assert_eq!(decoded, vertices);
    }

    #[test]
    fn vertex_stream_rejects_wrong_size() {
        let vertices: Vec<u32> = vec![1, 2, 3];
        let encoded = encode_vertex_buffer(&vertices).unwrap();

        assert!(decode_vertex_buffer::<u32>(&encoded, 2).is_err());
        assert!(decode_vertex_buffer::<u16>(&encoded, 3).is_err());
        assert!(decode_vertex_buffer::<u32>(&[], 0).is_err());
    }
}
