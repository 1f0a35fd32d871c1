use {
  crate::wire::{ApplyNotice, CollectRequest, Request, Response},
  futures::future::BoxFuture,
  std::sync::Arc,
  thiserror::Error,
  trellis_primitives::{ClientTransaction, NodeId},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  #[error("Unknown peer {0}")]
  UnknownPeer(NodeId),

  #[error("Peer {0} is no longer running")]
  PeerGone(NodeId),

  #[error("Peer {0} answered with an unexpected response")]
  UnexpectedResponse(NodeId),
}

/// Delivers requests between nodes of a roster.
///
/// A request to a peer that never answers may stay pending
/// forever, callers bound every exchange with their own timeout.
pub trait Transport: Send + Sync + 'static {
  fn send(
    &self,
    from: &NodeId,
    to: &NodeId,
    request: Request,
  ) -> BoxFuture<'static, Result<Response, Error>>;
}

/// The node side of the protocol.
pub trait Handler: Send + Sync + 'static {
  /// Transactions queued on this node for the chain named in the
  /// request. Returns nothing unless the requester leads the chain.
  fn pending_transactions(
    &self,
    request: &CollectRequest,
  ) -> Vec<ClientTransaction>;

  /// Applies the block named in the notice, catching up on any
  /// blocks that were missed before it.
  fn apply_notice(self: Arc<Self>, notice: ApplyNotice) -> BoxFuture<'static, ()>;
}
