#![allow(dead_code)]

use {
  futures::{future::BoxFuture, FutureExt},
  parking_lot::Mutex,
  std::{
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc,
    },
    time::Duration,
  },
  trellis_network::{
    ApplyNotice,
    CollectRequest,
    Config,
    Handler,
    LocalNetwork,
    Network,
  },
  trellis_primitives::{
    Arguments,
    Block,
    BlockId,
    ClientTransaction,
    DataBody,
    DataHeader,
    InstanceId,
    Instruction,
    NodeId,
    Roster,
  },
};

/// A node that always has exactly one transaction queued.
pub struct TestNode {
  pub id: NodeId,
  pub timeouts: Mutex<Vec<Duration>>,
  pub applied: AtomicUsize,
}

impl TestNode {
  pub fn transaction(&self) -> ClientTransaction {
    transaction_from(&self.id)
  }

  pub fn applied(&self) -> usize {
    self.applied.load(Ordering::SeqCst)
  }
}

impl Handler for TestNode {
  fn pending_transactions(
    &self,
    request: &CollectRequest,
  ) -> Vec<ClientTransaction> {
    self.timeouts.lock().push(request.timeout);
    vec![self.transaction()]
  }

  fn apply_notice(self: Arc<Self>, _: ApplyNotice) -> BoxFuture<'static, ()> {
    async move {
      self.applied.fetch_add(1, Ordering::SeqCst);
    }
    .boxed()
  }
}

pub fn transaction_from(node: &NodeId) -> ClientTransaction {
  ClientTransaction::new(vec![Instruction::spawn(
    InstanceId::zero(),
    "value",
    Arguments::new().with("from", node.as_str().as_bytes().to_vec()),
  )])
}

pub struct Cluster {
  pub local: LocalNetwork,
  pub nodes: Vec<Arc<TestNode>>,
  pub roster: Roster,
}

impl Cluster {
  pub fn new(n: usize) -> Self {
    let local = LocalNetwork::new();
    let nodes: Vec<_> = (0..n)
      .map(|i| {
        Arc::new(TestNode {
          id: NodeId::new(format!("n{i}")),
          timeouts: Mutex::new(vec![]),
          applied: AtomicUsize::new(0),
        })
      })
      .collect();
    for node in &nodes {
      let handler: Arc<dyn Handler> = node.clone();
      local.register(node.id.clone(), &handler);
    }
    let roster = nodes.iter().map(|n| n.id.clone()).collect();
    Self {
      local,
      nodes,
      roster,
    }
  }

  /// Network handle of the `i`-th node.
  pub fn network(&self, i: usize, config: Config) -> Network {
    Network::new(
      config,
      self.nodes[i].id.clone(),
      Arc::new(self.local.clone()),
    )
  }
}

pub fn config(collect_timeout: Duration, branching_factor: usize) -> Config {
  Config {
    collect_timeout,
    branching_factor,
    ..Config::default()
  }
}

pub fn block_id(seed: u8) -> BlockId {
  let header = DataHeader {
    trie_root: [seed; 32],
    transactions_hash: [seed; 32],
    timestamp: 0,
  };
  *Block::genesis(Roster::default(), [seed; 32], header, DataBody::default())
    .hash()
}
