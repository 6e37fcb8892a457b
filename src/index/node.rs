use crate::Interval;

/// Ordinal of a node inside its [`IntervalBinTree`](super::IntervalBinTree).
pub type NodeId = u32;

/// One bin of the interval index.
///
/// Nodes are owned by the tree's arena; `children` and `parent` are arena
/// ordinals, so the parent link is a plain back-reference for upward walks.
/// `index` is the node's pre-order ordinal, fixed by the numbering pass that
/// runs once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinNode {
    pub(crate) index: NodeId,
    pub(crate) range: Interval,
    pub(crate) direct_count: u32,
    pub(crate) subtree_size: u32,
    pub(crate) start_byte: Option<u64>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}
impl BinNode {
    pub fn index(&self) -> NodeId {
        self.index
    }

    /// Nominal coordinate range covered by this bin.
    pub fn range(&self) -> Interval {
        self.range
    }

    /// Number of intervals stored directly in this bin.
    pub fn direct_count(&self) -> u32 {
        self.direct_count
    }

    /// Number of intervals stored in this bin and all of its descendants.
    pub fn subtree_size(&self) -> u32 {
        self.subtree_size
    }

    /// Byte offset of this bin's first record, `None` until offsets are assigned
    /// or when the bin holds no records of its own.
    pub fn start_byte(&self) -> Option<u64> {
        self.start_byte
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Byte range `[start_byte, start_byte + direct_count * record_width)`.
    ///
    /// `None` when the bin has no start byte or the range end overflows.
    pub fn byte_range(&self, record_width: u64) -> Option<std::ops::Range<u64>> {
        let start = self.start_byte?;
        let len = u64::from(self.direct_count).checked_mul(record_width)?;
        Some(start..start.checked_add(len)?)
    }
}
