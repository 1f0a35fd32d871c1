//! Messages exchanged between nodes of one roster.
//!
//! Every message is a request from one node to another that is
//! answered with exactly one response. How the bytes travel is up
//! to the [`crate::Transport`] implementation.

use {
  crate::topology::Tree,
  serde::{Deserialize, Serialize},
  std::time::Duration,
  trellis_primitives::{BlockId, ClientTransaction, NodeId},
};

/// Asks a node for its queued transactions and the ones of its
/// subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
  /// Chain for which transactions are collected.
  pub chain_id: BlockId,

  /// Latest block known to the initiator.
  pub latest_id: BlockId,

  /// Node that started the collection. Queues are handed out only
  /// when this node leads the chain.
  pub leader: NodeId,

  /// Tree the request travels along.
  pub tree: Tree,

  /// How long the receiver may take to answer. It waits for its own
  /// children at most half of it.
  pub timeout: Duration,
}

/// Tells a node that a new block was confirmed and should be
/// applied to its local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyNotice {
  pub chain_id: BlockId,
  pub block_id: BlockId,
}

/// Transactions contributed by one node, in its queue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
  pub node: NodeId,
  pub transactions: Vec<ClientTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
  Collect(CollectRequest),
  Apply(ApplyNotice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
  /// Batches of the receiver and of every node of its subtree
  /// that answered in time.
  Collected(Vec<Batch>),

  /// The receiver processed an apply notice.
  Applied,
}
