#![allow(dead_code)]

use {
  ed25519_dalek::Keypair,
  std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
  },
  trellis_network::{Config, LocalNetwork, Network},
  trellis_primitives::{
    Arguments,
    BlockId,
    ClientTransaction,
    Darc,
    Expr,
    Identity,
    InstanceId,
    Instruction,
    NodeId,
    Roster,
    Rules,
    Signer,
  },
  trellis_validator::{
    attach,
    AddTransactionRequest,
    BuildOutcome,
    ChainLayer,
    CreateGenesisRequest,
    MemoryChain,
    Service,
    Storage,
  },
  trellis_vm::{ChainConfig, Executor},
};

pub fn signer() -> Signer {
  Signer::new(Keypair::generate(&mut rand::thread_rng()))
}

pub fn owners_darc(owners: &[Identity]) -> Darc {
  let expr = Expr::any_of(owners.iter().copied()).expect("at least one owner");
  Darc::new(
    Rules::new()
      .with("spawn:value", expr.clone())
      .with("invoke:value.update", expr.clone())
      .with("invoke:config.update_config", expr),
    "test owners",
  )
}

/// Workers never tick on their own during a test, epochs are run
/// explicitly.
pub fn chain_config() -> ChainConfig {
  ChainConfig {
    block_interval: Duration::from_secs(3600),
    max_block_size: 100,
  }
}

pub fn network_config() -> Config {
  Config {
    collect_timeout: Duration::from_millis(300),
    propagation_timeout: Duration::from_millis(500),
    ..Default::default()
  }
}

pub fn signed(instruction: Instruction, signer: &Signer, counter: u64) -> ClientTransaction {
  let instruction = instruction.with_signers([(signer.identity(), counter)]);
  let mut tx = ClientTransaction::new(vec![instruction]);
  tx.sign(&[signer]);
  tx
}

pub fn spawn_value(darc: &Darc, value: &[u8]) -> Instruction {
  Instruction::spawn(
    darc.instance_id(),
    "value",
    Arguments::new().with("value", value.to_vec()),
  )
}

/// Where the value spawned by the first instruction of `tx` lives.
pub fn value_id(tx: &ClientTransaction) -> InstanceId {
  tx.instructions[0].derive_id("")
}

/// Nodes sharing one transport and one consensus layer, each with
/// its own executor and storage.
pub struct Nodes {
  pub transport: LocalNetwork,
  pub chain: MemoryChain,
  pub roster: Roster,
  pub services: Vec<Service>,
}

impl Nodes {
  pub async fn start(executors: Vec<Executor>) -> anyhow::Result<Self> {
    let storages = executors
      .iter()
      .map(|_| Storage::temporary())
      .collect::<Result<Vec<_>, _>>()?;
    Self::with_storage(MemoryChain::new(), executors, storages).await
  }

  pub async fn on_disk(
    chain: MemoryChain,
    size: usize,
    dir: &Path,
  ) -> anyhow::Result<Self> {
    let storages = (0..size)
      .map(|i| Storage::open(dir.join(format!("node-{i}"))))
      .collect::<Result<Vec<_>, _>>()?;
    let executors = (0..size).map(|_| Executor::default()).collect();
    Self::with_storage(chain, executors, storages).await
  }

  async fn with_storage(
    chain: MemoryChain,
    executors: Vec<Executor>,
    storages: Vec<Storage>,
  ) -> anyhow::Result<Self> {
    let transport = LocalNetwork::new();
    let roster: Roster = (0..executors.len())
      .map(|i| NodeId::new(format!("node-{i}")))
      .collect();

    let mut services = vec![];
    for ((id, executor), storage) in roster.iter().zip(executors).zip(storages) {
      let network = Network::new(
        network_config(),
        id.clone(),
        Arc::new(transport.clone()),
      );
      let ledger: Arc<dyn ChainLayer> = Arc::new(chain.clone());
      let service = Service::open(network, ledger, storage, executor).await?;
      attach(&service, &transport, &chain);
      services.push(service);
    }

    Ok(Self {
      transport,
      chain,
      roster,
      services,
    })
  }

  pub fn leader(&self) -> &Service {
    &self.services[0]
  }

  pub async fn genesis(&self, darc: &Darc) -> anyhow::Result<BlockId> {
    self.genesis_with(darc, chain_config()).await
  }

  pub async fn genesis_with(
    &self,
    darc: &Darc,
    config: ChainConfig,
  ) -> anyhow::Result<BlockId> {
    let request =
      CreateGenesisRequest::new(self.roster.clone(), darc.clone(), config);
    let response = self.leader().create_genesis(request).await?;
    Ok(response.block.chain_id())
  }

  /// Submits `tx` to node `node` and waits until it is queued there.
  pub async fn submit(
    &self,
    node: usize,
    chain_id: BlockId,
    tx: ClientTransaction,
  ) -> anyhow::Result<()> {
    let service = &self.services[node];
    let before = service.queued(&chain_id);
    service
      .add_transaction(AddTransactionRequest::new(chain_id, tx))
      .await?;
    wait_for(|| service.queued(&chain_id) > before).await;
    Ok(())
  }

  /// Runs an epoch on the leader and expects it to build a block.
  pub async fn build(&self, chain_id: BlockId) -> anyhow::Result<BuildOutcome> {
    self
      .leader()
      .epoch(&chain_id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("no block was built"))
  }

  pub async fn shutdown(&self) {
    for service in &self.services {
      service.shutdown().await;
    }
  }
}

/// Polls `condition` until it holds, panics after two seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(2);
  while !condition() {
    assert!(Instant::now() < deadline, "condition not met in time");
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}
