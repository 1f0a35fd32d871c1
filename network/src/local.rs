use {
  crate::{
    network::serve,
    transport::{Error, Handler, Transport},
    wire::{Request, Response},
  },
  futures::{future::BoxFuture, FutureExt},
  parking_lot::RwLock,
  std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
  },
  tracing::trace,
  trellis_primitives::NodeId,
};

#[derive(Default)]
struct Peers {
  handlers: HashMap<NodeId, Weak<dyn Handler>>,
  paused: HashSet<NodeId>,
}

/// In-process transport connecting nodes that live in the same
/// process.
///
/// Handlers are held weakly, a node that was dropped answers every
/// request with [`Error::PeerGone`]. Paused nodes never answer.
#[derive(Clone, Default)]
pub struct LocalNetwork {
  peers: Arc<RwLock<Peers>>,
}

impl LocalNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, node: NodeId, handler: &Arc<dyn Handler>) {
    self
      .peers
      .write()
      .handlers
      .insert(node, Arc::downgrade(handler));
  }

  pub fn unregister(&self, node: &NodeId) {
    let mut peers = self.peers.write();
    peers.handlers.remove(node);
    peers.paused.remove(node);
  }

  /// Makes `node` unreachable until [`LocalNetwork::resume`].
  pub fn pause(&self, node: &NodeId) {
    self.peers.write().paused.insert(node.clone());
  }

  pub fn resume(&self, node: &NodeId) {
    self.peers.write().paused.remove(node);
  }

  pub fn is_paused(&self, node: &NodeId) -> bool {
    self.peers.read().paused.contains(node)
  }

  pub fn nodes(&self) -> Vec<NodeId> {
    self.peers.read().handlers.keys().cloned().collect()
  }

  fn lookup(&self, node: &NodeId) -> Result<Option<Arc<dyn Handler>>, Error> {
    let peers = self.peers.read();
    let handler = peers
      .handlers
      .get(node)
      .ok_or_else(|| Error::UnknownPeer(node.clone()))?;
    if peers.paused.contains(node) {
      return Ok(None);
    }
    handler
      .upgrade()
      .map(Some)
      .ok_or_else(|| Error::PeerGone(node.clone()))
  }
}

impl Transport for LocalNetwork {
  fn send(
    &self,
    from: &NodeId,
    to: &NodeId,
    request: Request,
  ) -> BoxFuture<'static, Result<Response, Error>> {
    trace!("{from} -> {to}: {request:?}");
    match self.lookup(to) {
      Err(e) => futures::future::ready(Err(e)).boxed(),
      Ok(None) => futures::future::pending().boxed(),
      Ok(Some(handler)) => {
        let transport: Arc<dyn Transport> = Arc::new(self.clone());
        serve(transport, handler, to.clone(), request)
          .map(Ok)
          .boxed()
      }
    }
  }
}

impl std::fmt::Debug for LocalNetwork {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let peers = self.peers.read();
    f.debug_struct("LocalNetwork")
      .field("nodes", &peers.handlers.len())
      .field("paused", &peers.paused)
      .finish()
  }
}
