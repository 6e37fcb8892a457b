use tracing::{debug, warn};

use super::node::{BinNode, NodeId};
use crate::{BuildConfig, GenobinError, Interval, RawNode, Result};

/// Where a reference's records live in the payload area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadExtent {
    pub data_start: u64,
    pub record_count: u64,
    pub record_width: u64,
}
impl PayloadExtent {
    /// First byte past the payload, `None` if the counts overflow a `u64`.
    pub fn end(&self) -> Option<u64> {
        self.record_count
            .checked_mul(self.record_width)?
            .checked_add(self.data_start)
    }
}

/// Hierarchical bin index over one reference.
///
/// Every interval lives in the deepest bin whose range fully contains it, so
/// a bin whose range misses a query range can be skipped together with its
/// whole subtree. Bins with an empty subtree are not materialised. Nodes are
/// stored in pre-order; children are ordered by ascending `range.start` and
/// never overlap each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalBinTree {
    nodes: Vec<BinNode>,
}

/// Intermediate recursive shape produced by the split pass.
struct Draft {
    range: Interval,
    direct: Vec<usize>,
    children: Vec<Draft>,
}

impl IntervalBinTree {
    /// Builds a tree over `intervals`, subdividing `space` recursively.
    ///
    /// Returns the tree together with the order in which the input intervals
    /// must be written: bins in pre-order, ascending `(start, end)` inside a bin.
    /// Every interval must lie within `space`.
    pub fn build(
        intervals: &[Interval],
        space: Interval,
        config: &BuildConfig,
    ) -> Result<(Self, Vec<usize>)> {
        config.validate()?;
        if intervals.len() > i32::MAX as usize {
            return Err(GenobinError::InvalidConfig(format!(
                "{} intervals exceed the per-reference limit of {}",
                intervals.len(),
                i32::MAX
            )));
        }

        if let Some(outside) = intervals.iter().find(|iv| !space.contains(iv)) {
            return Err(GenobinError::OutOfBounds {
                interval: *outside,
                bounds: space,
            });
        }
        let items: Vec<usize> = (0..intervals.len()).collect();
        let draft = split(space, items, intervals, config, 0);

        let mut nodes = Vec::new();
        let mut order = Vec::with_capacity(intervals.len());
        number(draft, None, intervals, &mut nodes, &mut order);

        debug!(
            intervals = intervals.len(),
            bins = nodes.len(),
            root = %space,
            "built interval bin tree"
        );
        Ok((Self { nodes }, order))
    }

    /// Tree with a single empty root bin covering `space`.
    pub fn empty(space: Interval) -> Self {
        Self {
            nodes: vec![BinNode {
                index: 0,
                range: space,
                direct_count: 0,
                subtree_size: 0,
                start_byte: None,
                children: Vec::new(),
                parent: None,
            }],
        }
    }

    /// Assigns each bin's `start_byte`, assuming records are written in the
    /// order returned by [`IntervalBinTree::build`] starting at `base`.
    pub fn assign_start_bytes(&mut self, base: u64, record_width: u64) {
        let mut offset = base;
        for node in &mut self.nodes {
            node.start_byte = (node.direct_count > 0).then_some(offset);
            offset += u64::from(node.direct_count) * record_width;
        }
    }

    pub fn root(&self) -> &BinNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> Option<&BinNode> {
        self.nodes.get(id as usize)
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[BinNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().subtree_size == 0
    }

    pub fn total_records(&self) -> u32 {
        self.root().subtree_size
    }

    /// Walks parent links from `id` (exclusive) up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &BinNode> + '_ {
        let mut current = self.node(id).and_then(BinNode::parent);
        std::iter::from_fn(move || {
            let node = self.node(current?)?;
            current = node.parent;
            Some(node)
        })
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Returns every bin holding records whose range intersects `range`,
    /// top-down and in ascending coordinate order among siblings.
    ///
    /// Subtrees whose range misses the query, or that hold no records, are
    /// skipped without being visited.
    pub fn find_overlapping(&self, range: &Interval) -> Vec<&BinNode> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = vec![0];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.subtree_size == 0 || !node.range.overlaps(range) {
                continue;
            }
            if node.direct_count > 0 {
                found.push(node);
            }
            let candidates = node
                .children
                .partition_point(|&c| self.nodes[c as usize].range.start() < range.end());
            stack.extend(node.children[..candidates].iter().rev());
        }
        found
    }

    /// Serializes the nodes in pre-order.
    pub fn to_raw(&self) -> Vec<RawNode> {
        self.nodes
            .iter()
            .map(|node| RawNode {
                start: node.range.start(),
                end: node.range.end(),
                start_byte: node.start_byte.map_or(-1, |b| b as i64),
                index: node.index as i32,
                parent: node.parent.map_or(-1, |p| p as i32),
                direct_count: node.direct_count as i32,
                subtree_size: node.subtree_size as i32,
            })
            .collect()
    }

    /// Rebuilds a tree from persisted nodes and checks every invariant.
    pub fn from_raw(reference: &str, raw: &[RawNode], extent: PayloadExtent) -> Result<Self> {
        let corrupt = |bin: usize, reason: String| GenobinError::CorruptIndex {
            reference: reference.to_string(),
            bin: bin as u32,
            reason,
        };
        if raw.is_empty() {
            return Err(corrupt(0, "index holds no nodes".to_string()));
        }

        let mut nodes: Vec<BinNode> = Vec::with_capacity(raw.len());
        for (i, entry) in raw.iter().enumerate() {
            if entry.index as i64 != i as i64 {
                return Err(corrupt(i, format!("stored ordinal {} out of order", entry.index)));
            }
            let parent = match (i, entry.parent) {
                (0, -1) => None,
                (0, p) => return Err(corrupt(0, format!("root has parent {p}"))),
                (_, p) if p < 0 || p as usize >= i => {
                    return Err(corrupt(i, format!("parent {p} is not an earlier node")))
                }
                (_, p) => Some(p as NodeId),
            };
            if entry.direct_count < 0 || entry.subtree_size < 0 {
                return Err(corrupt(i, "negative record count".to_string()));
            }
            let range = Interval::new(entry.start, entry.end)
                .map_err(|_| corrupt(i, format!("inverted range [{}, {})", entry.start, entry.end)))?;
            let start_byte = match entry.start_byte {
                -1 => None,
                b if b < 0 => return Err(corrupt(i, format!("negative start byte {b}"))),
                b => Some(b as u64),
            };
            if let Some(p) = parent {
                nodes[p as usize].children.push(i as NodeId);
            }
            nodes.push(BinNode {
                index: i as NodeId,
                range,
                direct_count: entry.direct_count as u32,
                subtree_size: entry.subtree_size as u32,
                start_byte,
                children: Vec::new(),
                parent,
            });
        }

        let tree = Self { nodes };
        if let Err(e) = tree.validate(reference, Some(extent)) {
            warn!(reference, error = %e, "rejecting corrupt bin index");
            return Err(e);
        }
        Ok(tree)
    }

    /// Checks the structural invariants of the tree and, when `extent` is
    /// given, that every bin's records lie inside the reference's payload.
    pub fn validate(&self, reference: &str, extent: Option<PayloadExtent>) -> Result<()> {
        let corrupt = |bin: usize, reason: String| GenobinError::CorruptIndex {
            reference: reference.to_string(),
            bin: bin as u32,
            reason,
        };

        let payload_end = match extent {
            Some(extent) => Some(extent.end().ok_or_else(|| {
                corrupt(
                    0,
                    format!(
                        "{} records of {} bytes overflow the payload",
                        extent.record_count, extent.record_width
                    ),
                )
            })?),
            None => None,
        };

        for (i, node) in self.nodes.iter().enumerate() {
            let child_sum: u64 = node
                .children
                .iter()
                .map(|&c| u64::from(self.nodes[c as usize].subtree_size))
                .sum();
            if u64::from(node.subtree_size) != u64::from(node.direct_count) + child_sum {
                return Err(corrupt(
                    i,
                    format!(
                        "subtree size {} != direct count {} + children {}",
                        node.subtree_size, node.direct_count, child_sum
                    ),
                ));
            }

            let mut previous: Option<Interval> = None;
            for &c in &node.children {
                let child = &self.nodes[c as usize];
                if child.parent != Some(i as NodeId) {
                    return Err(corrupt(c as usize, "parent link mismatch".to_string()));
                }
                if !node.range.contains(&child.range) {
                    return Err(corrupt(
                        c as usize,
                        format!("range {} escapes parent range {}", child.range, node.range),
                    ));
                }
                if let Some(prev) = previous {
                    if child.range.start() < prev.end() {
                        return Err(corrupt(
                            c as usize,
                            format!("range {} overlaps or precedes sibling {}", child.range, prev),
                        ));
                    }
                }
                previous = Some(child.range);
            }

            if let (Some(extent), Some(payload_end)) = (extent, payload_end) {
                match (node.direct_count, node.start_byte) {
                    (0, _) => {}
                    (_, None) => return Err(corrupt(i, "records without a start byte".to_string())),
                    (_, Some(start)) => {
                        let aligned = start >= extent.data_start
                            && (start - extent.data_start) % extent.record_width == 0;
                        let end = node.byte_range(extent.record_width).map(|bytes| bytes.end);
                        if !aligned || end.map_or(true, |end| end > payload_end) {
                            return Err(corrupt(
                                i,
                                format!(
                                    "{} records at byte {start} fall outside payload {}..{payload_end}",
                                    node.direct_count, extent.data_start
                                ),
                            ));
                        }
                    }
                }
            }
        }

        if let Some(extent) = extent {
            if u64::from(self.total_records()) != extent.record_count {
                return Err(corrupt(
                    0,
                    format!(
                        "index covers {} records, reference holds {}",
                        self.total_records(),
                        extent.record_count
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn split(
    range: Interval,
    items: Vec<usize>,
    intervals: &[Interval],
    config: &BuildConfig,
    depth: u32,
) -> Draft {
    let branching = i64::from(config.branching);
    let splittable = items.len() > config.max_records_per_bin as usize
        && depth < config.max_depth
        && range.width() >= branching.saturating_mul(config.min_bin_width);
    if !splittable {
        return Draft {
            range,
            direct: items,
            children: Vec::new(),
        };
    }

    // ceil(width / branching), at least 1; in i128 so that the full i64 space splits evenly
    let (lo, hi, b) = (i128::from(range.start()), i128::from(range.end()), i128::from(branching));
    let step = (hi - lo + b - 1) / b;
    let child_ranges: Vec<Interval> = (0..b)
        .map(|k| lo + k * step)
        .take_while(|&start| start < hi)
        .filter_map(|start| {
            let end = (start + step).min(hi);
            Interval::new(i64::try_from(start).ok()?, i64::try_from(end).ok()?).ok()
        })
        .collect();

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); child_ranges.len()];
    let mut direct = Vec::new();
    for i in items {
        let iv = intervals[i];
        let k = ((i128::from(iv.start()) - lo) / step) as usize;
        match child_ranges.get(k) {
            Some(child) if iv.start() < child.end() && iv.end() <= child.end() => {
                buckets[k].push(i)
            }
            _ => direct.push(i),
        }
    }

    let children = child_ranges
        .into_iter()
        .zip(buckets)
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(child, bucket)| split(child, bucket, intervals, config, depth + 1))
        .collect();
    Draft {
        range,
        direct,
        children,
    }
}

/// Pre-order numbering pass: flattens the draft into the arena and appends
/// each bin's intervals to `order`.
fn number(
    draft: Draft,
    parent: Option<NodeId>,
    intervals: &[Interval],
    nodes: &mut Vec<BinNode>,
    order: &mut Vec<usize>,
) -> NodeId {
    let index = nodes.len() as NodeId;
    let mut direct = draft.direct;
    direct.sort_by_key(|&i| (intervals[i].start(), intervals[i].end()));
    let direct_count = direct.len() as u32;
    order.extend(direct);
    nodes.push(BinNode {
        index,
        range: draft.range,
        direct_count,
        subtree_size: 0,
        start_byte: None,
        children: Vec::new(),
        parent,
    });

    let mut subtree_size = direct_count;
    for child in draft.children {
        let child_id = number(child, Some(index), intervals, nodes, order);
        subtree_size += nodes[child_id as usize].subtree_size;
        nodes[index as usize].children.push(child_id);
    }
    nodes[index as usize].subtree_size = subtree_size;
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn two_bin_config() -> BuildConfig {
        BuildConfig::default()
            .branching(2)
            .max_records_per_bin(2)
            .min_bin_width(1)
            .max_depth(1)
    }

    #[test]
    fn test_two_bin_scenario() {
        let intervals = [iv(0, 10), iv(5, 15), iv(20, 30)];
        let (tree, order) =
            IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().range(), iv(0, 32));
        assert_eq!(tree.root().direct_count(), 0);
        assert_eq!(tree.root().subtree_size(), 3);

        let left = tree.node(1).unwrap();
        let right = tree.node(2).unwrap();
        assert_eq!(left.range(), iv(0, 16));
        assert_eq!(left.direct_count(), 2);
        assert_eq!(right.range(), iv(16, 32));
        assert_eq!(right.direct_count(), 1);
        assert_eq!(order, vec![0, 1, 2]);

        let hits: Vec<u32> = tree
            .find_overlapping(&iv(8, 22))
            .iter()
            .map(|n| n.index())
            .collect();
        assert_eq!(hits, vec![1, 2]);

        assert!(tree.find_overlapping(&iv(40, 50)).is_empty());
    }

    #[test]
    fn test_straddling_interval_stays_in_parent() {
        let intervals = [iv(0, 4), iv(14, 18), iv(20, 24)];
        let (tree, order) =
            IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();
        assert_eq!(tree.root().direct_count(), 1);
        // parent's records are written first
        assert_eq!(order, vec![1, 0, 2]);
        tree.validate("chr1", None).unwrap();
    }

    #[test]
    fn test_subtree_sizes() {
        let intervals: Vec<Interval> = (0..1000).map(|i| iv(i * 37, i * 37 + 50)).collect();
        let config = BuildConfig::default()
            .max_records_per_bin(16)
            .min_bin_width(8);
        let (tree, order) = IntervalBinTree::build(&intervals, iv(0, 40_000), &config).unwrap();
        assert!(tree.len() > 1);
        assert_eq!(order.len(), intervals.len());
        for node in tree.nodes() {
            let children: u32 = node
                .children()
                .iter()
                .map(|&c| tree.node(c).unwrap().subtree_size())
                .sum();
            assert_eq!(node.subtree_size(), node.direct_count() + children);
        }
        tree.validate("chr1", None).unwrap();
    }

    #[test]
    fn test_parent_links_and_depth() {
        let intervals: Vec<Interval> = (0..64).map(|i| iv(i * 4, i * 4 + 1)).collect();
        let config = BuildConfig::default()
            .branching(2)
            .max_records_per_bin(1)
            .min_bin_width(1);
        let (tree, _) = IntervalBinTree::build(&intervals, iv(0, 256), &config).unwrap();
        for node in tree.nodes().iter().skip(1) {
            let parent = tree.node(node.parent().unwrap()).unwrap();
            assert!(parent.children().contains(&node.index()));
            assert!(parent.index() < node.index());
            assert_eq!(tree.depth(node.index()), tree.depth(parent.index()) + 1);
        }
        let leaves = tree.nodes().iter().filter(|n| n.is_leaf()).count();
        assert!(leaves >= 32);
        assert_eq!(tree.ancestors(0).count(), 0);
    }

    #[test]
    fn test_full_range_query_returns_bins_with_records() {
        let intervals = [iv(0, 4), iv(14, 18), iv(20, 24), iv(25, 26)];
        let (tree, _) = IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();
        let hits = tree.find_overlapping(&iv(-100, 100));
        let expected = tree.nodes().iter().filter(|n| n.direct_count() > 0).count();
        assert_eq!(hits.len(), expected);
        assert!(hits.iter().all(|n| n.direct_count() > 0));
    }

    #[test]
    fn test_empty_tree() {
        let (tree, order) = IntervalBinTree::build(&[], iv(0, 1000), &BuildConfig::default()).unwrap();
        assert!(tree.is_empty());
        assert!(order.is_empty());
        assert!(tree.find_overlapping(&iv(0, 1000)).is_empty());
        assert_eq!(tree, IntervalBinTree::empty(iv(0, 1000)));
    }

    #[test]
    fn test_intervals_outside_space_are_rejected() {
        for outside in [iv(90, 150), iv(-10, 5)] {
            let result = IntervalBinTree::build(&[iv(10, 20), outside], iv(0, 100), &BuildConfig::default());
            assert!(matches!(
                result,
                Err(GenobinError::OutOfBounds { interval, bounds }) if interval == outside && bounds == iv(0, 100)
            ));
        }
    }

    #[test]
    fn test_split_of_full_coordinate_space() {
        let config = BuildConfig::default()
            .branching(4)
            .max_records_per_bin(1)
            .min_bin_width(1)
            .max_depth(3);
        let space = iv(i64::MIN, i64::MAX);
        let intervals = [iv(i64::MIN, i64::MIN + 10), iv(-5, 5), iv(0, 1), iv(i64::MAX - 3, i64::MAX)];
        let (tree, order) = IntervalBinTree::build(&intervals, space, &config).unwrap();
        assert_eq!(tree.root().range(), space);
        assert_eq!(order.len(), intervals.len());
        assert!(tree.validate("chr1", None).is_ok());
        // [-5, 5) straddles the middle split and stays in the root
        assert_eq!(tree.root().direct_count(), 1);
        assert_eq!(tree.len(), 4);
        let found: u32 = tree.find_overlapping(&iv(-1, 1)).iter().map(|n| n.direct_count()).sum();
        assert_eq!(found, 2);
    }

    #[test]
    fn test_overflowing_extent_is_corruption() {
        let intervals = [iv(0, 10), iv(5, 15), iv(20, 30)];
        let (mut tree, _) =
            IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();
        tree.assign_start_bytes(64, 16);

        let extent = PayloadExtent {
            data_start: 64,
            record_count: u64::MAX,
            record_width: 16,
        };
        assert_eq!(extent.end(), None);
        assert!(matches!(
            IntervalBinTree::from_raw("chr1", &tree.to_raw(), extent),
            Err(GenobinError::CorruptIndex { bin: 0, .. })
        ));
    }

    #[test]
    fn test_assign_start_bytes() {
        let intervals = [iv(0, 4), iv(14, 18), iv(20, 24)];
        let (mut tree, _) =
            IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();
        assert!(tree.nodes().iter().all(|n| n.start_byte().is_none()));
        tree.assign_start_bytes(100, 16);
        assert_eq!(tree.root().start_byte(), Some(100));
        assert_eq!(tree.node(1).unwrap().start_byte(), Some(116));
        assert_eq!(tree.node(2).unwrap().start_byte(), Some(132));
    }

    #[test]
    fn test_raw_roundtrip_and_corruption() {
        let intervals = [iv(0, 10), iv(5, 15), iv(20, 30)];
        let (mut tree, _) =
            IntervalBinTree::build(&intervals, iv(0, 32), &two_bin_config()).unwrap();
        tree.assign_start_bytes(64, 16);
        let extent = PayloadExtent {
            data_start: 64,
            record_count: 3,
            record_width: 16,
        };
        let raw = tree.to_raw();
        assert_eq!(raw[0].start_byte, -1);
        assert_eq!(IntervalBinTree::from_raw("chr1", &raw, extent).unwrap(), tree);

        let mut bad = raw.clone();
        bad[0].subtree_size = 4;
        assert!(matches!(
            IntervalBinTree::from_raw("chr1", &bad, extent),
            Err(GenobinError::CorruptIndex { bin: 0, .. })
        ));

        let mut bad = raw.clone();
        bad[2].start = 8;
        assert!(matches!(
            IntervalBinTree::from_raw("chr1", &bad, extent),
            Err(GenobinError::CorruptIndex { bin: 2, .. })
        ));

        let mut bad = raw.clone();
        bad[2].start_byte = 1_000;
        assert!(IntervalBinTree::from_raw("chr1", &bad, extent).is_err());

        let mut bad = raw;
        bad[1].parent = 2;
        assert!(IntervalBinTree::from_raw("chr1", &bad, extent).is_err());
    }
}
