use {
  crate::{
    chain::{ChainLayer, MemoryChain},
    storage::Storage,
    Error,
    Service,
  },
  std::{path::Path, sync::Arc},
  tracing::info,
  trellis_network::{Config, LocalNetwork, Network},
  trellis_primitives::{NodeId, Roster},
  trellis_vm::Executor,
};

/// Connects a node to an in-process transport and consensus layer.
pub fn attach(service: &Service, transport: &LocalNetwork, chain: &MemoryChain) {
  transport.register(service.id().clone(), &service.handler());
  chain.register(service.id().clone(), &service.verifier());
}

/// A set of nodes running in one process.
///
/// All nodes share a [`LocalNetwork`] and a [`MemoryChain`]. With a
/// data directory every node keeps its state in its own
/// subdirectory, otherwise storage is temporary.
pub struct LocalCluster {
  transport: LocalNetwork,
  chain: MemoryChain,
  roster: Roster,
  services: Vec<Service>,
}

impl LocalCluster {
  pub async fn start(
    size: usize,
    config: Config,
    data_dir: Option<&Path>,
  ) -> Result<Self, Error> {
    if size == 0 {
      return Err(Error::EmptyRoster);
    }
    let transport = LocalNetwork::new();
    let chain = MemoryChain::new();
    let roster: Roster = (0..size).map(|i| NodeId::new(format!("node-{i}"))).collect();

    let mut services = Vec::with_capacity(size);
    for id in roster.iter() {
      let storage = match data_dir {
        Some(dir) => Storage::open(dir.join(id.as_str()))?,
        None => Storage::temporary()?,
      };
      let network = Network::new(config.clone(), id.clone(), Arc::new(transport.clone()));
      let ledger: Arc<dyn ChainLayer> = Arc::new(chain.clone());
      let service = Service::open(network, ledger, storage, Executor::default()).await?;
      attach(&service, &transport, &chain);
      services.push(service);
    }

    info!("started a local cluster of {size} nodes");
    Ok(Self {
      transport,
      chain,
      roster,
      services,
    })
  }

  pub fn roster(&self) -> &Roster {
    &self.roster
  }

  pub fn transport(&self) -> &LocalNetwork {
    &self.transport
  }

  pub fn chain(&self) -> &MemoryChain {
    &self.chain
  }

  /// The first node, which leads every chain created with
  /// [`LocalCluster::roster`].
  pub fn leader(&self) -> &Service {
    &self.services[0]
  }

  pub fn services(&self) -> &[Service] {
    &self.services
  }

  pub async fn shutdown(&self) {
    for service in &self.services {
      service.shutdown().await;
    }
  }
}
