mod node;
mod tree;

pub use node::{BinNode, NodeId};
pub use tree::{IntervalBinTree, PayloadExtent};
