use {
  crate::{
    b58::ToBase58String,
    canonical,
    sha3,
    ClientTransaction,
    Hash,
    NodeId,
    Roster,
    TxResult,
  },
  multihash::{Multihash, MultihashDigest},
  once_cell::sync::OnceCell,
  serde::{Deserialize, Serialize},
};

/// Identifies a block. The genesis block id doubles as chain id.
pub type BlockId = Multihash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHeader {
  /// Root of the state trie after applying the body.
  pub trie_root: Hash,

  /// Hash over all transaction results of the body.
  pub transactions_hash: Hash,

  /// Milliseconds since unix epoch when the block was proposed.
  pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBody {
  pub tx_results: Vec<TxResult>,
}

impl DataBody {
  pub fn new(tx_results: Vec<TxResult>) -> Self {
    Self { tx_results }
  }

  /// Hash of all results in order, validity flags included.
  pub fn transactions_hash(&self) -> Hash {
    sha3(&[&canonical(&self.tx_results)[..]])
  }

  pub fn transactions(&self) -> impl Iterator<Item = &ClientTransaction> {
    self.tx_results.iter().map(|r| &r.transaction)
  }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
  pub index: u64,

  /// None only for the genesis block itself.
  pub genesis: Option<BlockId>,
  pub parent: Option<BlockId>,
  pub roster: Roster,

  /// Nonce of the state trie, fixed for the lifetime of the chain.
  pub trie_nonce: Hash,
  pub header: DataHeader,
  pub body: DataBody,

  #[serde(skip)]
  hash_cache: OnceCell<BlockId>,
}

impl Block {
  pub fn genesis(
    roster: Roster,
    trie_nonce: Hash,
    header: DataHeader,
    body: DataBody,
  ) -> Self {
    Self {
      index: 0,
      genesis: None,
      parent: None,
      roster,
      trie_nonce,
      header,
      body,
      hash_cache: OnceCell::new(),
    }
  }

  /// The next block in the chain of `parent`.
  pub fn new(parent: &Block, header: DataHeader, body: DataBody) -> Self {
    Self {
      index: parent.index + 1,
      genesis: Some(parent.chain_id()),
      parent: Some(*parent.hash()),
      roster: parent.roster.clone(),
      trie_nonce: parent.trie_nonce,
      header,
      body,
      hash_cache: OnceCell::new(),
    }
  }

  pub fn hash(&self) -> &BlockId {
    self
      .hash_cache
      .get_or_init(|| multihash::Code::Sha3_256.digest(&canonical(self)))
  }

  /// Id of the genesis block of the chain this block belongs to.
  pub fn chain_id(&self) -> BlockId {
    match self.genesis {
      Some(genesis) => genesis,
      None => *self.hash(),
    }
  }

  pub fn is_genesis(&self) -> bool {
    self.index == 0 && self.parent.is_none()
  }

  pub fn leader(&self) -> Option<&NodeId> {
    self.roster.leader()
  }
}

impl PartialEq for Block {
  fn eq(&self, other: &Self) -> bool {
    self.hash() == other.hash()
  }
}

impl Eq for Block {}

impl std::fmt::Debug for Block {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Block")
      .field("index", &self.index)
      .field("hash", &self.hash().to_b58())
      .field("parent", &self.parent.map(|p| p.to_b58()))
      .field("chain", &self.chain_id().to_b58())
      .field("trie_root", &self.header.trie_root.to_b58())
      .field("transactions", &self.body.tx_results.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Block, DataBody, DataHeader},
    crate::{NodeId, Roster},
  };

  fn header(root: u8) -> DataHeader {
    DataHeader {
      trie_root: [root; 32],
      transactions_hash: DataBody::default().transactions_hash(),
      timestamp: 0,
    }
  }

  #[test]
  fn chain_links() {
    let roster = Roster::new(vec![NodeId::new("n0"), NodeId::new("n1")]);
    let genesis = Block::genesis(roster, [9; 32], header(1), DataBody::default());
    let b1 = Block::new(&genesis, header(2), DataBody::default());
    let b2 = Block::new(&b1, header(3), DataBody::default());

    assert!(genesis.is_genesis());
    assert_eq!(genesis.chain_id(), *genesis.hash());
    assert_eq!(b1.chain_id(), *genesis.hash());
    assert_eq!(b2.chain_id(), *genesis.hash());
    assert_eq!(b2.parent, Some(*b1.hash()));
    assert_eq!(b2.index, 2);
    assert_eq!(b2.trie_nonce, [9; 32]);
    assert_eq!(b2.leader(), Some(&NodeId::new("n0")));
    assert_ne!(b1.hash(), b2.hash());
  }

  #[test]
  fn hash_survives_serialization() -> anyhow::Result<()> {
    let genesis =
      Block::genesis(Roster::default(), [0; 32], header(1), DataBody::default());
    let bytes = rmp_serde::to_vec(&genesis)?;
    let decoded: Block = rmp_serde::from_slice(&bytes)?;
    assert_eq!(genesis.hash(), decoded.hash());
    Ok(())
  }
}
