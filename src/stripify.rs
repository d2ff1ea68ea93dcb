/// Restart token emitted between disconnected strips.
pub const RESTART_INDEX: u32 = u32::MAX;

const BUFFER_CAPACITY: usize = 16;

fn find_strip_first(buffer: &[[u32; 3]], valence: &[u32]) -> usize {
    let mut index = 0;
    let mut lowest = u32::MAX;

    for (i, triangle) in buffer.iter().enumerate() {
        let v = triangle
            .iter()
            .map(|vertex| valence[*vertex as usize])
            .min()
            .unwrap_or(u32::MAX);

        if v < lowest {
            index = i;
            lowest = v;
        }
    }

    index
}

fn find_strip_next(buffer: &[[u32; 3]], e0: u32, e1: u32) -> Option<(usize, usize)> {
    for (i, triangle) in buffer.iter().enumerate() {
        let [a, b, c] = *triangle;

        if e0 == a && e1 == b {
            return Some((i, 2));
        } else if e0 == b && e1 == c {
            return Some((i, 0));
        } else if e0 == c && e1 == a {
            return Some((i, 1));
        }
    }

    None
}

/// Converts a triangle list to a triangle strip, stitching strips with the
/// [`RESTART_INDEX`] token.
///
/// For maximum efficiency the index buffer being converted has to be
/// optimized for vertex cache first.
pub fn stripify(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    assert!(indices.len() % 3 == 0);

    let mut buffer: Vec<[u32; 3]> = Vec::with_capacity(BUFFER_CAPACITY);

    let mut input = indices.chunks_exact(3);

    // tail edge of the strip; the parity bit identifies which of the two
    // tail vertices flips every step
    let mut strip = [0u32; 2];
    let mut parity = 0usize;

    // worst case is a restart plus three vertices per triangle
    let mut result = Vec::with_capacity(indices.len() / 3 * 4);

    let mut valence = vec![0u32; vertex_count];

    for index in indices {
        assert!((*index as usize) < vertex_count);

        valence[*index as usize] += 1;
    }

    loop {
        // fill triangle buffer
        while buffer.len() < BUFFER_CAPACITY {
            match input.next() {
                Some(triangle) => buffer.push([triangle[0], triangle[1], triangle[2]]),
                None => break,
            }
        }

        if buffer.is_empty() {
            break;
        }

        // find next triangle; the order of the tail edge flips on every iteration
        if let Some((i, rotation)) = find_strip_next(&buffer, strip[parity], strip[parity ^ 1]) {
            let [a, b, c] = buffer[i];
            let v = buffer[i][rotation];

            // emit the next vertex in the strip
            result.push(v);

            // next triangle has flipped winding
            strip[0] = strip[1];
            strip[1] = v;
            parity ^= 1;

            buffer.swap_remove(i);

            // update vertex valences for strip start heuristic
            valence[a as usize] -= 1;
            valence[b as usize] -= 1;
            valence[c as usize] -= 1;
        } else {
            // we didn't find anything, so we need to find the next new triangle;
            // the lowest-valence heuristic maximizes the strip length
            let i = find_strip_first(&buffer, &valence);
            let [mut a, mut b, mut c] = buffer[i];

            buffer.swap_remove(i);

            // pre-rotate the triangle so that we will find a match in the
            // existing buffer on the next iteration
            if find_strip_next(&buffer, a, c).is_some() {
                // abc -> bca
                let t = a;
                a = b;
                b = c;
                c = t;
            } else if find_strip_next(&buffer, b, a).is_some() {
                // abc -> cab
                let t = c;
                c = b;
                b = a;
                a = t;
            }

            // emit the new strip
            if !result.is_empty() {
                result.push(RESTART_INDEX);
            }

            result.push(a);
            result.push(b);
            result.push(c);

            // new strip always starts with the same edge winding
            strip[0] = b;
            strip[1] = c;
            parity = 1;

            // update vertex valences for strip start heuristic
            valence[a as usize] -= 1;
            valence[b as usize] -= 1;
            valence[c as usize] -= 1;
        }
    }

    result
}

/// Converts a triangle strip to a triangle list, flipping winding on odd
/// strip positions and dropping degenerate triangles.
pub fn unstripify(indices: &[u32]) -> Vec<u32> {
    let mut result = Vec::with_capacity(indices.len().saturating_sub(2) * 3);

    let mut start = 0usize;

    for (i, index) in indices.iter().enumerate() {
        if *index == RESTART_INDEX {
            start = i + 1;
        } else if i - start >= 2 {
            let mut a = indices[i - 2];
            let mut b = indices[i - 1];
            let c = indices[i];

            if (i - start) % 2 == 1 {
                std::mem::swap(&mut a, &mut b);
            }

            if a != b && a != c && b != c {
                result.push(a);
                result.push(b);
                result.push(c);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized_triangles(indices: &[u32]) -> Vec<[u32; 3]> {
        let mut result: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|t| {
                let mut t = [t[0], t[1], t[2]];
                let low = t
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| **v)
                    .map_or(0, |(i, _)| i);
                t.rotate_left(low);
                t
            })
            .collect();
        result.sort_unstable();
        result
    }

    #[test]
    fn round_trip_preserves_triangles() {
        let indices = [0, 1, 2, 1, 3, 2, 2, 3, 4];

        let strip = stripify(&indices, 5);
        let list = unstripify(&strip);

        assert_eq!(normalized_triangles(&indices), normalized_triangles(&list));
    }

    #[test]
    fn restarts_between_islands() {
        let indices = [0, 1, 2, 3, 4, 5];

        let strip = stripify(&indices, 6);
        assert!(strip.contains(&RESTART_INDEX));

        let list = unstripify(&strip);
        assert_eq!(normalized_triangles(&indices), normalized_triangles(&list));
    }

    #[test]
    fn empty_input() {
        assert!(stripify(&[], 0).is_empty());
        assert!(unstripify(&[]).is_empty());
    }
}
