use {
  crate::{
    proof::Proof,
    trie::{Trie, TrieError},
  },
  thiserror::Error,
  trellis_primitives::{
    Entry,
    Hash,
    InstanceId,
    StateAction,
    StateChange,
  },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
  #[error("Instance {0} not found")]
  NotFound(InstanceId),

  #[error("Instance {0} already exists")]
  AlreadyExists(InstanceId),

  #[error("Trie error: {0}")]
  Trie(#[from] TrieError),
}

/// Read access to the ledger state.
///
/// Contracts only ever see the state through this trait, they
/// describe their effects as [`StateChange`]s instead of writing.
pub trait ReadOnlyState {
  fn get(&self, id: &InstanceId) -> Option<Entry>;

  /// Like [`ReadOnlyState::get`], but a missing instance is an error.
  fn get_entry(&self, id: &InstanceId) -> Result<Entry, StateError> {
    self.get(id).ok_or(StateError::NotFound(*id))
  }
}

/// The ledger state of one chain.
///
/// Wraps the authenticated trie and enforces the rules of
/// state changes on top of it. Cloning is O(1) and clones are
/// fully independent, which is how speculative execution works:
/// transactions run against a clone that is either kept or
/// dropped as a whole.
#[derive(Debug, Clone)]
pub struct StateTrie {
  trie: Trie,
}

impl StateTrie {
  pub fn new(nonce: Hash) -> Self {
    Self {
      trie: Trie::new(nonce),
    }
  }

  /// Rebuilds a state from persisted entries.
  pub fn from_entries(
    nonce: Hash,
    entries: impl IntoIterator<Item = (InstanceId, Entry)>,
  ) -> Result<Self, StateError> {
    let mut trie = Trie::new(nonce);
    for (id, entry) in entries {
      trie.insert(id, entry)?;
    }
    Ok(Self { trie })
  }

  pub fn root(&self) -> Hash {
    self.trie.root()
  }

  pub fn nonce(&self) -> Hash {
    self.trie.nonce()
  }

  pub fn len(&self) -> usize {
    self.trie.len()
  }

  pub fn is_empty(&self) -> bool {
    self.trie.is_empty()
  }

  pub fn proof(&self, id: &InstanceId) -> Proof {
    self.trie.proof(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&InstanceId, &Entry)> {
    self.trie.iter()
  }

  /// Applies a list of changes in order.
  ///
  /// Either all changes are applied or, on the first invalid
  /// change, none of them.
  pub fn apply(&mut self, changes: &[StateChange]) -> Result<(), StateError> {
    let mut next = self.trie.clone();
    for change in changes {
      Self::apply_one(&mut next, change)?;
    }
    self.trie = next;
    Ok(())
  }

  /// Applies changes to a copy and returns it, leaving `self` as is.
  pub fn staged(&self, changes: &[StateChange]) -> Result<Self, StateError> {
    let mut copy = self.clone();
    copy.apply(changes)?;
    Ok(copy)
  }

  fn apply_one(trie: &mut Trie, change: &StateChange) -> Result<(), StateError> {
    let id = change.instance_id;
    match change.action {
      StateAction::Create => {
        if trie.get(&id).is_some() {
          return Err(StateError::AlreadyExists(id));
        }
        trie.insert(id, Entry {
          value: change.value.clone(),
          contract_id: change.contract_id.clone(),
          darc_id: change.darc_id,
          version: 0,
        })?;
      }
      StateAction::Update => {
        let version = match trie.get(&id) {
          Some(existing) => existing.version + 1,
          None => return Err(StateError::NotFound(id)),
        };
        trie.insert(id, Entry {
          value: change.value.clone(),
          contract_id: change.contract_id.clone(),
          darc_id: change.darc_id,
          version,
        })?;
      }
      StateAction::Remove => {
        if trie.remove(&id).is_none() {
          return Err(StateError::NotFound(id));
        }
      }
    }
    Ok(())
  }
}

impl ReadOnlyState for StateTrie {
  fn get(&self, id: &InstanceId) -> Option<Entry> {
    self.trie.get(id).cloned()
  }
}
