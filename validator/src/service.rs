use {
  crate::{
    api::{
      check_version,
      AddTransactionRequest,
      AddTransactionResponse,
      CreateGenesisRequest,
      CreateGenesisResponse,
      GetProofRequest,
      GetProofResponse,
    },
    chain::{BlockVerifier, ChainLayer},
    storage::Storage,
    worker,
    Error,
  },
  dashmap::DashMap,
  futures::{future::BoxFuture, FutureExt},
  metrics::{counter, histogram, increment_counter},
  parking_lot::{Mutex, RwLock},
  std::{
    sync::{
      atomic::{AtomicBool, Ordering},
      Arc,
      Weak,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
  },
  tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
  },
  tracing::{debug, error, info, warn},
  trellis_network::{
    ApplyNotice,
    CollectRequest,
    Handler,
    History,
    Network,
    Propagation,
  },
  trellis_primitives::{
    Block,
    BlockId,
    ClientTransaction,
    Entry,
    Hash,
    Identity,
    InstanceId,
    NodeId,
    ToBase58String,
    CURRENT_VERSION,
  },
  trellis_vm::{
    get_counter,
    read_config,
    ChainConfig,
    Executor,
    ReadOnlyState,
    StateTrie,
  },
};

/// How long a node remembers transactions submitted to it.
const SEEN_LIFESPAN: Duration = Duration::from_secs(60);

/// Last confirmed block of a chain and the state after it.
#[derive(Clone)]
pub(crate) struct Snapshot {
  pub state: Arc<StateTrie>,
  pub latest: Block,
}

/// Everything a node keeps about one chain.
pub(crate) struct Chain {
  pub id: BlockId,
  snapshot: RwLock<Snapshot>,

  /// Held while the chain state moves to a new block.
  writer: tokio::sync::Mutex<()>,

  queue: Mutex<Vec<ClientTransaction>>,
  seen: Mutex<History>,
  sender: mpsc::Sender<ClientTransaction>,
  diverged: AtomicBool,
}

impl Chain {
  pub fn snapshot(&self) -> Snapshot {
    self.snapshot.read().clone()
  }

  pub fn enqueue(&self, tx: ClientTransaction) {
    self.queue.lock().push(tx);
  }

  fn queued(&self) -> usize {
    self.queue.lock().len()
  }

  fn take_queue(&self) -> Vec<ClientTransaction> {
    std::mem::take(&mut *self.queue.lock())
  }

  /// Puts transactions that did not make it into a block back in
  /// front of the queue.
  fn requeue(&self, txs: impl IntoIterator<Item = ClientTransaction>) {
    let mut queue = self.queue.lock();
    let later = std::mem::take(&mut *queue);
    queue.extend(txs);
    queue.extend(later);
  }

  pub fn block_interval(&self) -> Duration {
    read_config(&*self.snapshot().state)
      .unwrap_or_default()
      .block_interval
  }

  pub fn prune_seen(&self) {
    self.seen.lock().prune();
  }

  fn is_diverged(&self) -> bool {
    self.diverged.load(Ordering::Acquire)
  }
}

/// What one build step produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
  pub block: Block,

  /// Valid transactions in the block.
  pub included: usize,

  /// Transactions in the block that failed execution.
  pub invalid: usize,

  /// Transactions left out because they failed authorization.
  pub dropped: usize,

  pub propagation: Propagation,
}

pub(crate) struct Node {
  id: NodeId,
  this: Weak<Node>,
  executor: Executor,
  network: Network,
  ledger: Arc<dyn ChainLayer>,
  storage: Storage,
  chains: DashMap<BlockId, Arc<Chain>>,
  genesis_lock: tokio::sync::Mutex<()>,
  propagation_timeout: RwLock<Duration>,
  shutdown: watch::Sender<bool>,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
  fn chain(&self, id: &BlockId) -> Option<Arc<Chain>> {
    self.chains.get(id).map(|c| Arc::clone(c.value()))
  }

  fn propagation_timeout(&self) -> Duration {
    *self.propagation_timeout.read()
  }

  /// Starts tracking a chain at `latest` and spawns its worker.
  fn install_chain(&self, latest: Block, state: StateTrie) -> Arc<Chain> {
    let chain_id = latest.chain_id();
    let (sender, receiver) =
      mpsc::channel(self.network.config().channel_capacity.max(1));
    let chain = Arc::new(Chain {
      id: chain_id,
      snapshot: RwLock::new(Snapshot {
        state: Arc::new(state),
        latest,
      }),
      writer: tokio::sync::Mutex::new(()),
      queue: Mutex::new(vec![]),
      seen: Mutex::new(History::new(SEEN_LIFESPAN)),
      sender,
      diverged: AtomicBool::new(false),
    });

    self.chains.insert(chain_id, Arc::clone(&chain));
    let handle = worker::spawn(
      self.this.clone(),
      Arc::clone(&chain),
      receiver,
      self.shutdown.subscribe(),
    );
    self.workers.lock().push(handle);
    info!("{} tracks chain {}", self.id, chain_id.to_b58_short());
    chain
  }

  /// Persists `block` and makes it the latest confirmed block.
  fn commit(
    &self,
    chain: &Chain,
    block: Block,
    state: StateTrie,
  ) -> Result<(), Error> {
    self.storage.store_block(&block, &state)?;
    debug!(
      "{} applied block #{} of chain {}",
      self.id,
      block.index,
      chain.id.to_b58_short()
    );
    *chain.snapshot.write() = Snapshot {
      state: Arc::new(state),
      latest: block,
    };
    increment_counter!("trellis_blocks_applied");
    Ok(())
  }

  fn flag_divergence(&self, chain: &Chain, block: &BlockId, reason: String) -> Error {
    error!(
      "{} diverged from chain {} at block {}: {reason}",
      self.id,
      chain.id.to_b58_short(),
      block.to_b58_short()
    );
    chain.diverged.store(true, Ordering::Release);
    increment_counter!("trellis_divergences");
    Error::Diverged {
      chain: chain.id.to_b58(),
      block: block.to_b58(),
      reason,
    }
  }

  /// One tick of the epoch loop.
  ///
  /// The leader collects transactions from the roster and builds a
  /// block out of them. Other nodes catch up with the consensus
  /// layer in case they missed an apply notice.
  pub(crate) async fn epoch(
    &self,
    chain: &Chain,
  ) -> Result<Option<BuildOutcome>, Error> {
    if chain.is_diverged() {
      return Ok(None);
    }
    let snapshot = chain.snapshot();
    if snapshot.latest.leader() != Some(&self.id) {
      self.catch_up(chain, None).await?;
      return Ok(None);
    }

    let txs = self
      .network
      .collect(
        self,
        &snapshot.latest.roster,
        chain.id,
        *snapshot.latest.hash(),
      )
      .transactions()
      .await;

    if txs.is_empty() {
      return Ok(None);
    }
    self.build(chain, txs).await
  }

  /// The build step: executes `txs` on top of the latest block,
  /// proposes the result, applies it once confirmed and announces it
  /// to the roster.
  async fn build(
    &self,
    chain: &Chain,
    txs: Vec<ClientTransaction>,
  ) -> Result<Option<BuildOutcome>, Error> {
    let started = Instant::now();
    let writer = chain.writer.lock().await;
    let snapshot = chain.snapshot();
    let config = read_config(&*snapshot.state)?;

    let proposal = self.executor.propose(
      &snapshot.state,
      txs,
      config.max_block_size,
      timestamp(),
    );
    counter!("trellis_transactions_dropped", proposal.dropped as u64);
    if !proposal.overflow.is_empty() {
      debug!(
        "{} transactions wait for the next block of chain {}",
        proposal.overflow.len(),
        chain.id.to_b58_short()
      );
      chain.requeue(proposal.overflow.iter().cloned());
    }
    if proposal.body.tx_results.is_empty() {
      debug!("no authorized transactions for chain {}", chain.id.to_b58_short());
      return Ok(None);
    }

    let dropped = proposal.dropped;
    let included = proposal.body.tx_results.iter().filter(|r| r.valid).count();
    let invalid = proposal.body.tx_results.len() - included;
    counter!("trellis_transactions_invalid", invalid as u64);

    let block = Block::new(&snapshot.latest, proposal.header, proposal.body);
    let proposed = *block.hash();
    let confirmed = match self.ledger.propose_block(block.clone()).await {
      Ok(confirmed) => confirmed,
      Err(e) => {
        warn!(
          "block #{} of chain {} was not confirmed, requeueing: {e}",
          block.index,
          chain.id.to_b58_short()
        );
        chain.requeue(block.body.tx_results.into_iter().map(|r| r.transaction));
        return Err(e.into());
      }
    };

    let state = if *confirmed.hash() == proposed {
      proposal.state
    } else {
      warn!("consensus layer confirmed a different block, re-executing it");
      self.executor.verify(&snapshot.state, &confirmed)?
    };
    self.commit(chain, confirmed.clone(), state)?;
    drop(writer);

    increment_counter!("trellis_blocks_built");
    histogram!(
      "trellis_build_duration_seconds",
      started.elapsed().as_secs_f64()
    );
    info!(
      "built block #{} of chain {} with {included} valid, {invalid} invalid \
       and {dropped} dropped transactions",
      confirmed.index,
      chain.id.to_b58_short()
    );

    let notice = ApplyNotice {
      chain_id: chain.id,
      block_id: *confirmed.hash(),
    };
    let propagation = self
      .network
      .propagate(&confirmed.roster, notice, self.propagation_timeout())
      .await;

    Ok(Some(BuildOutcome {
      block: confirmed,
      included,
      invalid,
      dropped,
      propagation,
    }))
  }

  /// Applies confirmed blocks up to `target`, or up to the latest
  /// block of the chain. Returns the number of applied blocks.
  async fn catch_up(
    &self,
    chain: &Chain,
    target: Option<BlockId>,
  ) -> Result<usize, Error> {
    let _writer = chain.writer.lock().await;
    let head = match target {
      Some(id) => self.ledger.get_by_id(&id),
      None => self.ledger.latest(&chain.id),
    };
    let Some(head) = head else {
      return Ok(0);
    };

    let snapshot = chain.snapshot();
    if head.index <= snapshot.latest.index {
      return Ok(0);
    }

    let missing = self.blocks_between(&snapshot.latest, head)?;
    let mut state = (*snapshot.state).clone();
    let mut applied = 0;
    for block in missing {
      let id = *block.hash();
      let next = match self.executor.verify(&state, &block) {
        Ok(next) => next,
        Err(e) => return Err(self.flag_divergence(chain, &id, e.to_string())),
      };
      self.commit(chain, block, next.clone())?;
      state = next;
      applied += 1;
    }
    Ok(applied)
  }

  /// Blocks after `from` up to and including `head`, oldest first.
  fn blocks_between(&self, from: &Block, head: Block) -> Result<Vec<Block>, Error> {
    let mut blocks = vec![];
    let mut current = head;
    while current.hash() != from.hash() {
      let parent = match current.parent {
        Some(parent) if current.index > from.index => parent,
        _ => {
          return Err(Error::UnknownBlock(format!(
            "{} is not an ancestor of {}",
            from.hash().to_b58(),
            current.hash().to_b58()
          )))
        }
      };
      blocks.push(current);
      current = self
        .ledger
        .get_by_id(&parent)
        .ok_or_else(|| Error::UnknownBlock(parent.to_b58()))?;
    }
    blocks.reverse();
    Ok(blocks)
  }

  /// State of a chain after block `target`, computed without
  /// touching the tracked state.
  fn state_after(
    &self,
    chain_id: &BlockId,
    target: &BlockId,
  ) -> Result<StateTrie, Error> {
    let (base, mut state) = match self.chain(chain_id) {
      Some(chain) => {
        let snapshot = chain.snapshot();
        (snapshot.latest, (*snapshot.state).clone())
      }
      None => {
        let genesis = self
          .ledger
          .get_by_id(chain_id)
          .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))?;
        let state = self
          .executor
          .verify(&StateTrie::new(genesis.trie_nonce), &genesis)?;
        (genesis, state)
      }
    };

    if base.hash() != target {
      let head = self
        .ledger
        .get_by_id(target)
        .ok_or_else(|| Error::UnknownBlock(target.to_b58()))?;
      for block in self.blocks_between(&base, head)? {
        state = self.executor.verify(&state, &block)?;
      }
    }
    Ok(state)
  }

  /// Starts tracking a chain this node learned about from a notice.
  async fn join(&self, chain_id: BlockId) -> Result<Arc<Chain>, Error> {
    let _guard = self.genesis_lock.lock().await;
    if let Some(chain) = self.chain(&chain_id) {
      return Ok(chain);
    }

    let genesis = self
      .ledger
      .get_by_id(&chain_id)
      .filter(Block::is_genesis)
      .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))?;
    if !genesis.roster.contains(&self.id) {
      return Err(Error::NotInRoster(self.id.clone()));
    }

    let state = self
      .executor
      .verify(&StateTrie::new(genesis.trie_nonce), &genesis)?;
    self.storage.store_block(&genesis, &state)?;
    Ok(self.install_chain(genesis, state))
  }

  async fn on_notice(&self, notice: ApplyNotice) -> Result<usize, Error> {
    let chain = match self.chain(&notice.chain_id) {
      Some(chain) => chain,
      None => self.join(notice.chain_id).await?,
    };
    if chain.is_diverged() {
      return Ok(0);
    }
    self.catch_up(&chain, Some(notice.block_id)).await
  }
}

impl Handler for Node {
  fn pending_transactions(
    &self,
    request: &CollectRequest,
  ) -> Vec<ClientTransaction> {
    let Some(chain) = self.chain(&request.chain_id) else {
      return vec![];
    };
    let snapshot = chain.snapshot();
    if snapshot.latest.leader() != Some(&request.leader) {
      debug!(
        "{} keeps its queue from {}, who does not lead chain {}",
        self.id,
        request.leader,
        chain.id.to_b58_short()
      );
      return vec![];
    }
    chain.take_queue()
  }

  fn apply_notice(self: Arc<Self>, notice: ApplyNotice) -> BoxFuture<'static, ()> {
    async move {
      match self.on_notice(notice).await {
        Ok(0) => {}
        Ok(applied) => debug!("{} caught up {applied} blocks", self.id),
        Err(e) => warn!("{} failed to apply a notice: {e}", self.id),
      }
    }
    .boxed()
  }
}

impl BlockVerifier for Node {
  fn verify_block(&self, block: &Block) -> bool {
    let result = match block.parent {
      None => self
        .executor
        .verify(&StateTrie::new(block.trie_nonce), block)
        .map(|_| ())
        .map_err(Error::from),
      Some(parent) => self
        .state_after(&block.chain_id(), &parent)
        .and_then(|state| {
          self
            .executor
            .verify(&state, block)
            .map(|_| ())
            .map_err(Error::from)
        }),
    };

    match result {
      Ok(()) => true,
      Err(e) => {
        warn!("{} refuses block {}: {e}", self.id, block.hash().to_b58_short());
        false
      }
    }
  }
}

/// A ledger node.
///
/// Tracks every chain whose roster it belongs to, accepts client
/// requests for them and runs one worker task per chain.
pub struct Service {
  node: Arc<Node>,
}

impl Service {
  /// Opens a node on top of `storage` and resumes every chain
  /// found in it that the consensus layer still knows about.
  ///
  /// Fails if the stored state of a chain cannot be read or does not
  /// match the block it claims to be at.
  pub async fn open(
    network: Network,
    ledger: Arc<dyn ChainLayer>,
    storage: Storage,
    executor: Executor,
  ) -> Result<Self, Error> {
    let propagation_timeout = storage
      .propagation_timeout()?
      .unwrap_or(network.config().propagation_timeout);
    let (shutdown, _) = watch::channel(false);

    let node = Arc::new_cyclic(|this| Node {
      id: network.local().clone(),
      this: this.clone(),
      executor,
      network,
      ledger,
      storage,
      chains: DashMap::new(),
      genesis_lock: tokio::sync::Mutex::new(()),
      propagation_timeout: RwLock::new(propagation_timeout),
      shutdown,
      workers: Mutex::new(vec![]),
    });

    for chain_id in node.storage.chains()? {
      let stored = node.storage.load_chain(&chain_id)?;
      let state = StateTrie::from_entries(stored.nonce, stored.entries)?;
      let Some(latest) = node.ledger.get_by_id(&stored.latest_id) else {
        warn!(
          "consensus layer does not know block {}, chain {} not restored",
          stored.latest_id.to_b58_short(),
          chain_id.to_b58_short()
        );
        continue;
      };
      if state.root() != latest.header.trie_root {
        return Err(Error::CorruptState {
          chain: chain_id.to_b58(),
          block: stored.latest_id.to_b58(),
        });
      }

      info!(
        "{} restored chain {} at block #{}",
        node.id,
        chain_id.to_b58_short(),
        latest.index
      );
      let chain = node.install_chain(latest, state);
      if let Err(e) = node.catch_up(&chain, None).await {
        warn!("chain {} could not catch up: {e}", chain_id.to_b58_short());
      }
    }

    Ok(Self { node })
  }

  pub fn id(&self) -> &NodeId {
    &self.node.id
  }

  /// The side of this node that answers other nodes.
  pub fn handler(&self) -> Arc<dyn Handler> {
    self.node.clone()
  }

  /// The side of this node that checks proposed blocks.
  pub fn verifier(&self) -> Arc<dyn BlockVerifier> {
    self.node.clone()
  }

  pub fn chains(&self) -> Vec<BlockId> {
    self.node.chains.iter().map(|c| *c.key()).collect()
  }

  /// Creates a new chain and its genesis block.
  ///
  /// The genesis block holds a single transaction that stores the
  /// darc and the chain configuration. It is not authorized, there
  /// is no policy yet that could do it.
  pub async fn create_genesis(
    &self,
    request: CreateGenesisRequest,
  ) -> Result<CreateGenesisResponse, Error> {
    check_version(request.version)?;
    if request.roster.is_empty() {
      return Err(Error::EmptyRoster);
    }
    if !request.roster.contains(&self.node.id) {
      return Err(Error::NotInRoster(self.node.id.clone()));
    }
    let config: ChainConfig = request.config();
    config.validate()?;

    let node = &self.node;
    let genesis = {
      let _guard = node.genesis_lock.lock().await;
      let nonce: Hash = rand::random();
      let (state, header, body) =
        node
          .executor
          .genesis(nonce, &request.darc, &config, timestamp())?;
      let block = Block::genesis(
        request.roster.clone(),
        nonce,
        header,
        body,
      );
      let confirmed = node.ledger.propose_block(block).await?;
      node.storage.store_block(&confirmed, &state)?;
      node.install_chain(confirmed.clone(), state);
      confirmed
    };

    info!(
      "created chain {} with roster {:?}",
      genesis.chain_id().to_b58(),
      genesis.roster
    );
    let notice = ApplyNotice {
      chain_id: genesis.chain_id(),
      block_id: *genesis.hash(),
    };
    node
      .network
      .propagate(&genesis.roster, notice, node.propagation_timeout())
      .await;

    Ok(CreateGenesisResponse {
      version: CURRENT_VERSION,
      block: genesis,
    })
  }

  /// Queues a transaction for the next block of its chain.
  ///
  /// Only well-formedness is checked here, authorization happens
  /// when the block is built.
  pub async fn add_transaction(
    &self,
    request: AddTransactionRequest,
  ) -> Result<AddTransactionResponse, Error> {
    check_version(request.version)?;
    request.transaction.validate()?;
    let chain = self
      .node
      .chain(&request.chain_id)
      .ok_or_else(|| Error::UnknownChain(request.chain_id.to_b58()))?;

    let hash = request.transaction.hash();
    let resubmitted = chain.seen.lock().insert(hash);
    if resubmitted {
      debug!("transaction {} was already submitted", hash.to_b58());
    } else {
      chain
        .sender
        .send(request.transaction)
        .await
        .map_err(|_| Error::ShuttingDown)?;
    }

    Ok(AddTransactionResponse {
      version: CURRENT_VERSION,
    })
  }

  /// Proof for a key in the latest confirmed state of a chain.
  pub fn get_proof(
    &self,
    request: GetProofRequest,
  ) -> Result<GetProofResponse, Error> {
    check_version(request.version)?;
    let chain = self
      .node
      .chain(&request.chain_id)
      .ok_or_else(|| Error::UnknownChain(request.chain_id.to_b58()))?;
    let snapshot = chain.snapshot();
    Ok(GetProofResponse {
      version: CURRENT_VERSION,
      proof: snapshot.state.proof(&request.key),
      latest: snapshot.latest,
    })
  }

  /// Reads one entry of the latest confirmed state of a chain.
  pub fn get_instance(
    &self,
    chain_id: &BlockId,
    id: &InstanceId,
  ) -> Result<Entry, Error> {
    let chain = self
      .node
      .chain(chain_id)
      .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))?;
    let entry = chain.snapshot().state.get(id);
    entry.ok_or(Error::InstanceNotFound(*id))
  }

  /// Last counter value `identity` used on a chain. The next
  /// instruction it signs has to present this value plus one.
  pub fn signer_counter(
    &self,
    chain_id: &BlockId,
    identity: &Identity,
  ) -> Result<u64, Error> {
    let chain = self
      .node
      .chain(chain_id)
      .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))?;
    Ok(get_counter(&*chain.snapshot().state, identity)?)
  }

  /// Latest block this node applied for a chain.
  pub fn latest(&self, chain_id: &BlockId) -> Result<Block, Error> {
    self
      .node
      .chain(chain_id)
      .map(|chain| chain.snapshot().latest)
      .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))
  }

  /// Transactions waiting on this node for the next collection.
  pub fn queued(&self, chain_id: &BlockId) -> usize {
    self
      .node
      .chain(chain_id)
      .map(|chain| chain.queued())
      .unwrap_or(0)
  }

  pub fn is_diverged(&self, chain_id: &BlockId) -> bool {
    self
      .node
      .chain(chain_id)
      .map(|chain| chain.is_diverged())
      .unwrap_or(false)
  }

  /// Runs one epoch of a chain right away instead of waiting for
  /// its worker.
  pub async fn epoch(
    &self,
    chain_id: &BlockId,
  ) -> Result<Option<BuildOutcome>, Error> {
    let chain = self
      .node
      .chain(chain_id)
      .ok_or_else(|| Error::UnknownChain(chain_id.to_b58()))?;
    self.node.epoch(&chain).await
  }

  pub fn propagation_timeout(&self) -> Duration {
    self.node.propagation_timeout()
  }

  /// Changes how long the leader waits for apply notices to be
  /// acknowledged. The value survives restarts.
  pub fn set_propagation_timeout(&self, timeout: Duration) -> Result<(), Error> {
    self.node.storage.set_propagation_timeout(timeout)?;
    *self.node.propagation_timeout.write() = timeout;
    Ok(())
  }

  /// Stops every chain worker and waits for them to exit.
  pub async fn shutdown(&self) {
    let _ = self.node.shutdown.send(true);
    let workers = std::mem::take(&mut *self.node.workers.lock());
    for worker in workers {
      if let Err(e) = worker.await {
        warn!("chain worker of {} failed: {e}", self.node.id);
      }
    }
    info!("{} stopped", self.node.id);
  }
}

impl std::fmt::Debug for Service {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Service")
      .field("id", &self.node.id)
      .field("chains", &self.node.chains.len())
      .field("storage", &self.node.storage)
      .finish()
  }
}

fn timestamp() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}
