use {
  rmp_serde::{from_slice, to_vec},
  serde::{de::DeserializeOwned, Serialize},
  std::{path::Path, time::Duration},
  thiserror::Error,
  trellis_primitives::{
    Block,
    BlockId,
    Entry,
    Hash,
    InstanceId,
    ToBase58String,
  },
  trellis_vm::{ReadOnlyState, StateTrie},
};

const SERVICE_TREE: &str = "service";
const PROPAGATION_TIMEOUT: &[u8] = b"propagation-timeout";
const CHAIN_PREFIX: &[u8] = b"chain/";
const ENTRY_PREFIX: &[u8] = b"entry/";
const NONCE: &[u8] = b"meta/nonce";
const LATEST: &[u8] = b"meta/latest";

#[derive(Debug, Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Db(#[from] sled::Error),

  #[error("Corrupt record '{key}': {reason}")]
  Corrupt { key: String, reason: String },

  #[error("Chain {0} is registered but its state is missing")]
  MissingChain(String),
}

/// What is persisted about one chain.
#[derive(Debug, Clone)]
pub struct StoredChain {
  pub chain_id: BlockId,
  pub nonce: Hash,
  pub latest_id: BlockId,
  pub entries: Vec<(InstanceId, Entry)>,
}

/// On-disk node state.
///
/// The service tree holds node-wide records and the list of known
/// chains. Every chain has its own tree with the trie entries, the
/// trie nonce and the id of the latest applied block.
pub struct Storage {
  db: sled::Db,
  service: sled::Tree,
}

impl Storage {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
    Self::with_db(sled::open(path)?)
  }

  /// Storage that lives in memory and disappears when dropped.
  pub fn temporary() -> Result<Self, Error> {
    Self::with_db(sled::Config::new().temporary(true).open()?)
  }

  fn with_db(db: sled::Db) -> Result<Self, Error> {
    let service = db.open_tree(SERVICE_TREE)?;
    Ok(Self { db, service })
  }

  pub fn propagation_timeout(&self) -> Result<Option<Duration>, Error> {
    self
      .service
      .get(PROPAGATION_TIMEOUT)?
      .map(|bytes| decode(PROPAGATION_TIMEOUT, &bytes))
      .transpose()
  }

  pub fn set_propagation_timeout(&self, timeout: Duration) -> Result<(), Error> {
    self.service.insert(PROPAGATION_TIMEOUT, encode(&timeout)?)?;
    self.service.flush()?;
    Ok(())
  }

  /// Ids of every chain this node has state for.
  pub fn chains(&self) -> Result<Vec<BlockId>, Error> {
    self
      .service
      .scan_prefix(CHAIN_PREFIX)
      .map(|item| {
        let (key, value) = item?;
        decode(&key, &value)
      })
      .collect()
  }

  pub fn load_chain(&self, chain_id: &BlockId) -> Result<StoredChain, Error> {
    let tree = self.chain_tree(chain_id)?;
    let missing = || Error::MissingChain(chain_id.to_b58());
    let nonce = tree.get(NONCE)?.ok_or_else(missing)?;
    let latest = tree.get(LATEST)?.ok_or_else(missing)?;

    let entries = tree
      .scan_prefix(ENTRY_PREFIX)
      .map(|item| {
        let (key, value) = item?;
        let id = <[u8; 32]>::try_from(&key[ENTRY_PREFIX.len()..])
          .map(InstanceId::new)
          .map_err(|e| Error::Corrupt {
            key: String::from_utf8_lossy(&key).into(),
            reason: e.to_string(),
          })?;
        Ok((id, decode(&key, &value)?))
      })
      .collect::<Result<_, Error>>()?;

    Ok(StoredChain {
      chain_id: *chain_id,
      nonce: decode(NONCE, &nonce)?,
      latest_id: decode(LATEST, &latest)?,
      entries,
    })
  }

  /// Persists the effects of `block` on top of what is stored for
  /// its chain, in one atomic batch.
  ///
  /// `state` is the state after the block. A genesis block also
  /// registers the chain.
  pub fn store_block(&self, block: &Block, state: &StateTrie) -> Result<(), Error> {
    let chain_id = block.chain_id();
    let tree = self.chain_tree(&chain_id)?;

    let mut batch = sled::Batch::default();
    let changed = block
      .body
      .tx_results
      .iter()
      .filter(|r| r.valid)
      .flat_map(|r| r.state_changes.iter());
    for change in changed {
      let key = entry_key(&change.instance_id);
      match state.get(&change.instance_id) {
        Some(entry) => batch.insert(key, encode(&entry)?),
        None => batch.remove(key),
      }
    }
    batch.insert(NONCE, encode(&block.trie_nonce)?);
    batch.insert(LATEST, encode(block.hash())?);
    tree.apply_batch(batch)?;
    tree.flush()?;

    if block.is_genesis() {
      self.service.insert(chain_key(&chain_id), encode(&chain_id)?)?;
      self.service.flush()?;
    }
    Ok(())
  }

  fn chain_tree(&self, chain_id: &BlockId) -> Result<sled::Tree, Error> {
    Ok(self.db.open_tree(chain_key(chain_id))?)
  }
}

impl std::fmt::Debug for Storage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Storage")
      .field("trees", &self.db.tree_names().len())
      .finish()
  }
}

fn chain_key(chain_id: &BlockId) -> Vec<u8> {
  [CHAIN_PREFIX, chain_id.to_b58().as_bytes()].concat()
}

fn entry_key(id: &InstanceId) -> Vec<u8> {
  [ENTRY_PREFIX, &id.to_bytes()[..]].concat()
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
  to_vec(value).map_err(|e| Error::Corrupt {
    key: std::any::type_name::<T>().into(),
    reason: e.to_string(),
  })
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, Error> {
  from_slice(bytes).map_err(|e| Error::Corrupt {
    key: String::from_utf8_lossy(key).into(),
    reason: e.to_string(),
  })
}
