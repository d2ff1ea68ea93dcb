use std::cmp::Reverse;
use std::collections::BinaryHeap;

bitflags::bitflags! {
    /// Heuristic knobs for [`partition_clusters_with_flags`].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct PartitionFlags: u32 {
        /// Score merge candidates by the reduction in external boundary
        /// vertices instead of the shared vertex count.
        const MERGE_SCORE_EXTERNAL = 1 << 0;
        /// Prefer merging with the smallest candidate group.
        const MERGE_SCORE_SMALLEST = 1 << 1;
        /// Order the merge queue by external boundary size instead of the
        /// total unique vertex count.
        const SORT_EXTERNAL = 1 << 2;
    }
}

struct ClusterAdjacency {
    offsets: Vec<u32>,
    clusters: Vec<u32>,
    shared: Vec<u32>,
}

impl ClusterAdjacency {
    fn neighbors(&self, cluster: usize) -> (&[u32], &[u32]) {
        let begin = self.offsets[cluster] as usize;
        let end = self.offsets[cluster + 1] as usize;
        (&self.clusters[begin..end], &self.shared[begin..end])
    }
}

fn build_cluster_adjacency(
    cluster_indices: &[u32],
    cluster_offsets: &[u32],
    vertex_count: usize,
    used: &mut [bool],
) -> ClusterAdjacency {
    let cluster_count = cluster_offsets.len() - 1;

    let cluster = |i: usize| {
        &cluster_indices[cluster_offsets[i] as usize..cluster_offsets[i + 1] as usize]
    };

    // compute number of clusters referenced by each vertex
    let mut ref_offsets = vec![0u32; vertex_count + 1];

    for i in 0..cluster_count {
        for vertex in cluster(i) {
            assert!((*vertex as usize) < vertex_count);

            ref_offsets[*vertex as usize] += u32::from(!used[*vertex as usize]);
            used[*vertex as usize] = true;
        }

        for vertex in cluster(i) {
            used[*vertex as usize] = false;
        }
    }

    // convert ref counts to offsets
    let mut total_refs = 0u32;

    for slot in ref_offsets.iter_mut().take(vertex_count) {
        let count = *slot;
        *slot = total_refs;
        total_refs += count;
    }

    let mut ref_data = vec![0u32; total_refs as usize];

    // fill cluster refs for each vertex
    for i in 0..cluster_count {
        for vertex in cluster(i) {
            if used[*vertex as usize] {
                continue;
            }

            let cursor = &mut ref_offsets[*vertex as usize];
            ref_data[*cursor as usize] = i as u32;
            *cursor += 1;

            used[*vertex as usize] = true;
        }

        for vertex in cluster(i) {
            used[*vertex as usize] = false;
        }
    }

    // the previous pass turned each entry into the end of the vertex's data;
    // shift forward to recover the starts
    ref_offsets.copy_within(0..vertex_count, 1);
    ref_offsets[0] = 0;

    // fill cluster adjacency for each cluster, merging the cluster lists of
    // all its vertices
    let mut offsets = Vec::with_capacity(cluster_count + 1);
    let mut clusters = Vec::new();
    let mut shared = Vec::new();

    offsets.push(0u32);

    for i in 0..cluster_count {
        let begin = offsets[i] as usize;

        for vertex in cluster(i) {
            if used[*vertex as usize] {
                continue;
            }

            let refs = ref_offsets[*vertex as usize] as usize
                ..ref_offsets[*vertex as usize + 1] as usize;

            for other in &ref_data[refs] {
                if *other == i as u32 {
                    continue;
                }

                // if the cluster is already in the list, bump the shared
                // count, otherwise append it
                match clusters[begin..].iter().position(|c| c == other) {
                    Some(at) => shared[begin + at] += 1,
                    None => {
                        clusters.push(*other);
                        shared.push(1);
                    }
                }
            }

            used[*vertex as usize] = true;
        }

        for vertex in cluster(i) {
            used[*vertex as usize] = false;
        }

        offsets.push(clusters.len() as u32);
    }

    ClusterAdjacency {
        offsets,
        clusters,
        shared,
    }
}

fn count_total(
    group: &[u32],
    cluster_indices: &[u32],
    cluster_offsets: &[u32],
    seen: &mut [bool],
) -> u32 {
    let mut total = 0u32;

    for i in group {
        let range = cluster_offsets[*i as usize] as usize..cluster_offsets[*i as usize + 1] as usize;
        for vertex in &cluster_indices[range] {
            total += u32::from(!seen[*vertex as usize]);
            seen[*vertex as usize] = true;
        }
    }

    for i in group {
        let range = cluster_offsets[*i as usize] as usize..cluster_offsets[*i as usize + 1] as usize;
        for vertex in &cluster_indices[range] {
            seen[*vertex as usize] = false;
        }
    }

    total
}

fn count_shared(group1: &[u32], group2: &[u32], adjacency: &ClusterAdjacency) -> u32 {
    let mut total = 0u32;

    for c1 in group1 {
        let (neighbors, shared) = adjacency.neighbors(*c1 as usize);

        for c2 in group2 {
            if let Some(at) = neighbors.iter().position(|c| c == c2) {
                total += shared[at];
            }
        }
    }

    total
}

fn count_external(
    group1: &[u32],
    group2: &[u32],
    cluster_indices: &[u32],
    cluster_offsets: &[u32],
    valence: &mut [u32],
) -> u32 {
    let for_each_vertex = |valence: &mut [u32], f: &mut dyn FnMut(&mut u32)| {
        for i in group1.iter().chain(group2.iter()) {
            let range =
                cluster_offsets[*i as usize] as usize..cluster_offsets[*i as usize + 1] as usize;
            for vertex in &cluster_indices[range] {
                f(&mut valence[*vertex as usize]);
            }
        }
    };

    // a vertex is external if it is still referenced outside the two groups
    for_each_vertex(valence, &mut |v| *v -= 1);

    let mut total = 0u32;
    for_each_vertex(valence, &mut |v| total += u32::from(*v != 0));

    for_each_vertex(valence, &mut |v| *v += 1);

    total
}

struct GroupState<'a> {
    cluster_indices: &'a [u32],
    cluster_offsets: &'a [u32],
    adjacency: ClusterAdjacency,
    valence: Vec<u32>,
    seen: Vec<bool>,
    flags: PartitionFlags,
}

impl GroupState<'_> {
    fn order(&mut self, group: &[u32]) -> u32 {
        if self.flags.contains(PartitionFlags::SORT_EXTERNAL) {
            count_external(
                group,
                &[],
                self.cluster_indices,
                self.cluster_offsets,
                &mut self.valence,
            )
        } else {
            count_total(group, self.cluster_indices, self.cluster_offsets, &mut self.seen)
        }
    }

    fn merge_score(&mut self, group: &[u32], other: &[u32]) -> u32 {
        if self.flags.contains(PartitionFlags::MERGE_SCORE_EXTERNAL) {
            // fewer external vertices is better
            !count_external(
                group,
                other,
                self.cluster_indices,
                self.cluster_offsets,
                &mut self.valence,
            )
        } else {
            count_shared(group, other, &self.adjacency)
        }
    }
}

fn pick_group_to_merge(
    state: &mut GroupState<'_>,
    groups: &[Vec<u32>],
    target: usize,
    part: &[Option<u32>],
    max_group_size: usize,
) -> Option<usize> {
    let group = &groups[target];

    let mut best_group: Option<usize> = None;
    let mut best_score = 0u32;

    for cluster in group {
        let (neighbors, _) = state.adjacency.neighbors(*cluster as usize);

        for neighbor in neighbors.to_vec() {
            let other = match part[neighbor as usize] {
                Some(other) => other as usize,
                None => continue,
            };

            debug_assert!(!groups[other].is_empty());
            if group.len() + groups[other].len() > max_group_size {
                continue;
            }

            if state.flags.contains(PartitionFlags::MERGE_SCORE_SMALLEST) {
                if let Some(best) = best_group {
                    if groups[other].len() > groups[best].len() {
                        continue;
                    }
                }
            }

            let score = state.merge_score(group, &groups[other]);

            if score > best_score {
                best_group = Some(other);
                best_score = score;
            }
        }
    }

    best_group
}

/// Partitions clusters into groups of `target_partition_size` clusters that
/// maximize shared vertices, for hierarchical cluster-based LOD schemes.
///
/// Each cluster is given as a run of vertex ids inside `cluster_indices`;
/// `cluster_index_counts` holds the run lengths in order. Returns dense
/// per-cluster partition ids plus the partition count.
pub fn partition_clusters(
    cluster_indices: &[u32],
    cluster_index_counts: &[u32],
    vertex_count: usize,
    target_partition_size: usize,
) -> (Vec<u32>, usize) {
    partition_clusters_with_flags(
        cluster_indices,
        cluster_index_counts,
        vertex_count,
        target_partition_size,
        PartitionFlags::empty(),
    )
}

/// Variant of [`partition_clusters`] with explicit merge heuristics.
pub fn partition_clusters_with_flags(
    cluster_indices: &[u32],
    cluster_index_counts: &[u32],
    vertex_count: usize,
    target_partition_size: usize,
    flags: PartitionFlags,
) -> (Vec<u32>, usize) {
    assert!(target_partition_size > 0);

    let cluster_count = cluster_index_counts.len();

    // build cluster index offsets as a prefix sum
    let mut cluster_offsets = Vec::with_capacity(cluster_count + 1);
    let mut next_offset = 0u32;

    for count in cluster_index_counts {
        cluster_offsets.push(next_offset);
        next_offset += count;
    }

    assert!(next_offset as usize == cluster_indices.len());
    cluster_offsets.push(next_offset);

    let mut used = vec![false; vertex_count];

    // build cluster adjacency along with edge weights (shared vertex count)
    let adjacency =
        build_cluster_adjacency(cluster_indices, &cluster_offsets, vertex_count, &mut used);

    let mut valence = vec![0u32; vertex_count];
    for vertex in cluster_indices {
        valence[*vertex as usize] += 1;
    }

    let mut state = GroupState {
        cluster_indices,
        cluster_offsets: &cluster_offsets,
        adjacency,
        valence,
        seen: used,
        flags,
    };

    let mut groups: Vec<Vec<u32>> = Vec::with_capacity(cluster_count);
    let mut part: Vec<Option<u32>> = Vec::with_capacity(cluster_count);

    // min-heap of (priority, group); entries are lazily invalidated when a
    // group is merged away
    let mut order: BinaryHeap<Reverse<(u32, u32)>> = BinaryHeap::with_capacity(cluster_count);

    // create a singleton group for each cluster and order them by priority
    for i in 0..cluster_count {
        groups.push(vec![i as u32]);
        part.push(Some(i as u32));

        let priority = state.order(&groups[i]);
        order.push(Reverse((priority, i as u32)));
    }

    // iteratively merge the smallest group with the best group
    while let Some(Reverse((_, id))) = order.pop() {
        let id = id as usize;

        // this group was merged into another group earlier
        if groups[id].is_empty() {
            continue;
        }

        // disassociate clusters from the group to prevent them from being
        // merged again; they are re-associated if the group is reinserted
        for cluster in &groups[id] {
            part[*cluster as usize] = None;
        }

        if groups[id].len() >= target_partition_size {
            continue;
        }

        let max_group_size = target_partition_size + target_partition_size / 2;
        let best_group = match pick_group_to_merge(&mut state, &groups, id, &part, max_group_size) {
            Some(best) => best,
            // we can't grow the group any more, emit as is
            None => continue,
        };

        // combine and reinsert
        let merged = std::mem::take(&mut groups[best_group]);
        groups[id].extend_from_slice(&merged);

        for cluster in &groups[id] {
            part[*cluster as usize] = Some(id as u32);
        }

        let priority = state.order(&groups[id]);
        order.push(Reverse((priority, id as u32)));
    }

    // emit per-cluster partition ids with dense numbering
    let mut result = vec![0u32; cluster_count];
    let mut next = 0u32;

    for group in &groups {
        for cluster in group {
            result[*cluster as usize] = next;
        }

        if !group.is_empty() {
            next += 1;
        }
    }

    (result, next as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_shared_clusters() {
        // four clusters in a row, each sharing two vertices with the next
        let cluster_indices = [
            0, 1, 2, 3, //
            2, 3, 4, 5, //
            4, 5, 6, 7, //
            6, 7, 8, 9,
        ];
        let cluster_counts = [4, 4, 4, 4];

        let (partitions, count) = partition_clusters(&cluster_indices, &cluster_counts, 10, 2);

        assert_eq!(partitions.len(), 4);
        // something merged, and the numbering is dense
        assert!(count < 4);
        assert!(partitions.iter().all(|p| (*p as usize) < count));
        assert_eq!(partitions.iter().max().map(|p| *p as usize + 1), Some(count));

        // the first two clusters share an edge and end up together
        assert_eq!(partitions[0], partitions[1]);
    }

    #[test]
    fn singleton_target_keeps_clusters_apart() {
        let cluster_indices = [0, 1, 2, 2, 3, 4];
        let cluster_counts = [3, 3];

        let (partitions, count) = partition_clusters(&cluster_indices, &cluster_counts, 5, 1);

        assert_eq!(count, 2);
        assert_ne!(partitions[0], partitions[1]);
    }

    #[test]
    fn disjoint_clusters_stay_separate() {
        let cluster_indices = [0, 1, 2, 3, 4, 5];
        let cluster_counts = [3, 3];

        let (partitions, count) = partition_clusters(&cluster_indices, &cluster_counts, 6, 4);

        assert_eq!(count, 2);
        assert_ne!(partitions[0], partitions[1]);
    }

    #[test]
    fn external_flags_partition_everything() {
        let cluster_indices = [0, 1, 2, 3, 2, 3, 4, 5, 4, 5, 6, 7];
        let cluster_counts = [4, 4, 4];

        let (partitions, count) = partition_clusters_with_flags(
            &cluster_indices,
            &cluster_counts,
            8,
            2,
            PartitionFlags::MERGE_SCORE_EXTERNAL | PartitionFlags::SORT_EXTERNAL,
        );

        assert!(count >= 1);
        assert!(partitions.iter().all(|p| (*p as usize) < count));
    }
}
