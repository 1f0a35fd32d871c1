//! The consensus layer as seen by a node.
//!
//! A node hands proposed blocks to a [`ChainLayer`] and gets back
//! the confirmed block. The layer asks the nodes of the roster to
//! check a block through their [`BlockVerifier`] before confirming
//! it.

use {
  futures::{future::BoxFuture, FutureExt},
  parking_lot::RwLock,
  std::{
    collections::HashMap,
    sync::{Arc, Weak},
  },
  thiserror::Error,
  tracing::{debug, info},
  trellis_primitives::{Block, BlockId, NodeId, ToBase58String},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
  #[error("Unknown chain {0}")]
  UnknownChain(String),

  #[error("Chain {0} already exists")]
  ChainExists(String),

  #[error("Block does not extend the latest block {latest}")]
  NotLatest { latest: String },

  #[error("Block got {approvals} approvals, {threshold} are needed")]
  Rejected { approvals: usize, threshold: usize },
}

/// Checks a block proposed to the consensus layer.
pub trait BlockVerifier: Send + Sync {
  fn verify_block(&self, block: &Block) -> bool;
}

/// Orders and stores blocks of all chains.
pub trait ChainLayer: Send + Sync + 'static {
  /// Submits a block and resolves to the block as confirmed.
  fn propose_block(&self, block: Block) -> BoxFuture<'static, Result<Block, ChainError>>;

  /// Latest confirmed block of a chain.
  fn latest(&self, chain_id: &BlockId) -> Option<Block>;

  fn get_by_id(&self, id: &BlockId) -> Option<Block>;
}

/// Number of approvals a block needs from a roster of `n` nodes.
pub fn threshold(n: usize) -> usize {
  n - n.saturating_sub(1) / 3
}

#[derive(Default)]
struct Blocks {
  by_id: HashMap<BlockId, Block>,
  latest: HashMap<BlockId, BlockId>,
  verifiers: HashMap<NodeId, Weak<dyn BlockVerifier>>,
}

/// Consensus layer that keeps every block in memory.
///
/// Blocks are confirmed once enough roster members approve them
/// and they still extend the latest block of their chain. There is
/// no agreement protocol, every node of the process shares the same
/// instance.
#[derive(Clone, Default)]
pub struct MemoryChain {
  blocks: Arc<RwLock<Blocks>>,
}

impl MemoryChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, node: NodeId, verifier: &Arc<dyn BlockVerifier>) {
    self
      .blocks
      .write()
      .verifiers
      .insert(node, Arc::downgrade(verifier));
  }

  fn check_link(blocks: &Blocks, block: &Block) -> Result<(), ChainError> {
    let chain_id = block.chain_id();
    match (block.is_genesis(), blocks.latest.get(&chain_id)) {
      (true, None) => Ok(()),
      (true, Some(_)) => Err(ChainError::ChainExists(chain_id.to_b58())),
      (false, None) => Err(ChainError::UnknownChain(chain_id.to_b58())),
      (false, Some(latest)) => {
        let parent = blocks.by_id.get(latest);
        let extends = block.parent.as_ref() == Some(latest)
          && parent.map(|p| p.index + 1) == Some(block.index);
        if !extends {
          return Err(ChainError::NotLatest {
            latest: latest.to_b58(),
          });
        }
        Ok(())
      }
    }
  }

  fn confirm(&self, block: Block) -> Result<Block, ChainError> {
    // verifiers run without holding the lock, they may read the chain
    let verifiers: Vec<_> = {
      let blocks = self.blocks.read();
      Self::check_link(&blocks, &block)?;
      block
        .roster
        .iter()
        .filter_map(|node| blocks.verifiers.get(node))
        .filter_map(Weak::upgrade)
        .collect()
    };

    let approvals = verifiers
      .iter()
      .filter(|verifier| verifier.verify_block(&block))
      .count();
    let threshold = threshold(block.roster.len());
    if approvals < threshold {
      debug!("block {} rejected: {approvals}/{threshold}", block.hash().to_b58());
      return Err(ChainError::Rejected {
        approvals,
        threshold,
      });
    }

    let mut blocks = self.blocks.write();
    Self::check_link(&blocks, &block)?;
    let (id, chain_id) = (*block.hash(), block.chain_id());
    info!(
      "confirmed block {} #{} of chain {}",
      id.to_b58_short(),
      block.index,
      chain_id.to_b58_short()
    );
    blocks.latest.insert(chain_id, id);
    blocks.by_id.insert(id, block.clone());
    Ok(block)
  }
}

impl ChainLayer for MemoryChain {
  fn propose_block(
    &self,
    block: Block,
  ) -> BoxFuture<'static, Result<Block, ChainError>> {
    let this = self.clone();
    async move { this.confirm(block) }.boxed()
  }

  fn latest(&self, chain_id: &BlockId) -> Option<Block> {
    let blocks = self.blocks.read();
    blocks
      .latest
      .get(chain_id)
      .and_then(|id| blocks.by_id.get(id))
      .cloned()
  }

  fn get_by_id(&self, id: &BlockId) -> Option<Block> {
    self.blocks.read().by_id.get(id).cloned()
  }
}

impl std::fmt::Debug for MemoryChain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let blocks = self.blocks.read();
    f.debug_struct("MemoryChain")
      .field("chains", &blocks.latest.len())
      .field("blocks", &blocks.by_id.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{threshold, BlockVerifier, ChainError, ChainLayer, MemoryChain},
    std::sync::Arc,
    trellis_primitives::{Block, DataBody, DataHeader, NodeId, Roster},
  };

  struct Vote(bool);

  impl BlockVerifier for Vote {
    fn verify_block(&self, _: &Block) -> bool {
      self.0
    }
  }

  fn header(seed: u8) -> DataHeader {
    DataHeader {
      trie_root: [seed; 32],
      transactions_hash: DataBody::default().transactions_hash(),
      timestamp: 0,
    }
  }

  fn chain_with(votes: &[bool]) -> (MemoryChain, Roster, Vec<Arc<dyn BlockVerifier>>) {
    let chain = MemoryChain::new();
    let mut verifiers = vec![];
    let mut nodes = vec![];
    for (i, vote) in votes.iter().enumerate() {
      let node = NodeId::new(format!("n{i}"));
      let verifier: Arc<dyn BlockVerifier> = Arc::new(Vote(*vote));
      chain.register(node.clone(), &verifier);
      verifiers.push(verifier);
      nodes.push(node);
    }
    (chain, Roster::new(nodes), verifiers)
  }

  #[test]
  fn thresholds() {
    assert_eq!(threshold(1), 1);
    assert_eq!(threshold(3), 3);
    assert_eq!(threshold(4), 3);
    assert_eq!(threshold(7), 5);
  }

  #[tokio::test]
  async fn links_blocks() -> anyhow::Result<()> {
    let (chain, roster, _verifiers) = chain_with(&[true, true, true, false]);
    let genesis = Block::genesis(roster, [0; 32], header(1), DataBody::default());
    let genesis = chain.propose_block(genesis).await?;
    assert_eq!(chain.latest(&genesis.chain_id()), Some(genesis.clone()));

    let b1 = Block::new(&genesis, header(2), DataBody::default());
    chain.propose_block(b1.clone()).await?;

    // a second block on the same parent no longer extends the chain
    let fork = Block::new(&genesis, header(3), DataBody::default());
    assert!(matches!(
      chain.propose_block(fork).await,
      Err(ChainError::NotLatest { .. })
    ));
    assert_eq!(chain.latest(&genesis.chain_id()), Some(b1.clone()));
    assert_eq!(chain.get_by_id(b1.hash()), Some(b1));
    Ok(())
  }

  #[tokio::test]
  async fn needs_enough_approvals() -> anyhow::Result<()> {
    let (chain, roster, verifiers) = chain_with(&[true, false, false, true]);
    let genesis = Block::genesis(roster, [0; 32], header(1), DataBody::default());
    assert_eq!(
      chain.propose_block(genesis.clone()).await,
      Err(ChainError::Rejected {
        approvals: 2,
        threshold: 3
      })
    );

    // dropped verifiers do not count
    drop(verifiers);
    assert!(matches!(
      chain.propose_block(genesis).await,
      Err(ChainError::Rejected { approvals: 0, .. })
    ));
    Ok(())
  }
}
