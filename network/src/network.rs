use {
  crate::{
    collect::{self, Collection},
    propagate::{self, Propagation},
    topology::Tree,
    transport::{Handler, Transport},
    wire::{ApplyNotice, CollectRequest, Request, Response},
    Config,
  },
  futures::{future::BoxFuture, FutureExt},
  std::{sync::Arc, time::Duration},
  trellis_primitives::{BlockId, NodeId, Roster},
};

/// This type is the entrypoint to using the network API.
///
/// It binds a local node identity to a transport and exposes the
/// two tree protocols a node initiates: collecting pending
/// transactions from the roster and announcing confirmed blocks.
#[derive(Clone)]
pub struct Network {
  config: Config,
  local: NodeId,
  transport: Arc<dyn Transport>,
}

impl Network {
  pub fn new(
    config: Config,
    local: NodeId,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      config,
      local,
      transport,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn local(&self) -> &NodeId {
    &self.local
  }

  /// Starts collecting transactions for a chain from every member of
  /// `roster`, with the local node as root of the collection tree.
  ///
  /// `handler` provides the local queue.
  pub fn collect(
    &self,
    handler: &dyn Handler,
    roster: &Roster,
    chain_id: BlockId,
    latest_id: BlockId,
  ) -> Collection {
    let request = CollectRequest {
      chain_id,
      latest_id,
      leader: self.local.clone(),
      tree: Tree::new(roster, &self.local, self.config.branching_factor),
      timeout: self.config.collect_timeout,
    };
    collect::start(
      Arc::clone(&self.transport),
      handler,
      self.local.clone(),
      request,
      self.config.channel_capacity,
    )
  }

  /// Tells every other member of `roster` to apply a confirmed block.
  pub async fn propagate(
    &self,
    roster: &Roster,
    notice: ApplyNotice,
    within: Duration,
  ) -> Propagation {
    propagate::propagate(
      Arc::clone(&self.transport),
      self.local.clone(),
      roster,
      notice,
      within,
    )
    .await
  }
}

impl std::fmt::Debug for Network {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Network")
      .field("local", &self.local)
      .field("config", &self.config)
      .finish()
  }
}

/// Routes an incoming request to the node's handler.
///
/// Transports call this on the receiving side. Collect requests
/// are forwarded further down the tree through `transport`.
pub fn serve(
  transport: Arc<dyn Transport>,
  handler: Arc<dyn Handler>,
  local: NodeId,
  request: Request,
) -> BoxFuture<'static, Response> {
  match request {
    Request::Collect(request) => {
      collect::answer(transport, handler, local, request)
        .map(Response::Collected)
        .boxed()
    }
    Request::Apply(notice) => {
      handler.apply_notice(notice).map(|()| Response::Applied).boxed()
    }
  }
}
