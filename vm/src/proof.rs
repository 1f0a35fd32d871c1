use {
  crate::trie::{bit, hash_empty, hash_interior, hash_leaf, path_of, PATH_BITS},
  serde::{Deserialize, Serialize},
  thiserror::Error,
  trellis_primitives::{Entry, Hash, InstanceId},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
  #[error("Proof has no interior nodes")]
  NoInteriors,

  #[error("Proof is deeper than any trie path")]
  TooDeep,

  #[error("Leaf in the proof does not share the path of the key")]
  WrongPrefix,

  #[error("Node hash does not match its parent at depth {0}")]
  Mismatch(usize),

  #[error("Proof does not lead to the expected root")]
  RootMismatch,
}

/// The node a proof path ends in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofEnd {
  /// No entry lives below the end of the path.
  Empty,

  /// The only entry below the end of the path. If its key differs
  /// from the requested key then the requested key is absent.
  Leaf { key: InstanceId, entry: Entry },
}

/// Outcome of verifying a proof for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
  Present(Entry),
  Absent,
}

/// Inclusion or exclusion evidence for one key under one trie root.
///
/// Holds the left and right child hashes of every interior node
/// on the path of the key, from the root down, and the node the
/// path ends in. Verifying it needs nothing but the expected root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
  pub nonce: Hash,
  pub interiors: Vec<(Hash, Hash)>,
  pub end: ProofEnd,
}

impl Proof {
  /// Checks the proof against `root` and tells whether `key`
  /// is present.
  pub fn verify(
    &self,
    root: &Hash,
    key: &InstanceId,
  ) -> Result<Presence, ProofError> {
    let depth = self.interiors.len();
    if depth == 0 {
      return Err(ProofError::NoInteriors);
    }
    if depth > PATH_BITS {
      return Err(ProofError::TooDeep);
    }

    let path = path_of(&self.nonce, key);
    let (mut expected, presence) = match &self.end {
      ProofEnd::Empty => (hash_empty(&self.nonce, &path, depth), Presence::Absent),
      ProofEnd::Leaf { key: leaf_key, entry } => {
        let leaf_path = path_of(&self.nonce, leaf_key);
        if (0..depth).any(|i| bit(&leaf_path, i) != bit(&path, i)) {
          return Err(ProofError::WrongPrefix);
        }
        let hash = hash_leaf(&self.nonce, &leaf_path, depth, leaf_key, entry);
        match leaf_key == key {
          true => (hash, Presence::Present(entry.clone())),
          false => (hash, Presence::Absent),
        }
      }
    };

    for (index, (left, right)) in self.interiors.iter().enumerate().rev() {
      let child = if bit(&path, index) { right } else { left };
      if *child != expected {
        return Err(ProofError::Mismatch(index + 1));
      }
      expected = hash_interior(left, right);
    }

    match expected == *root {
      true => Ok(presence),
      false => Err(ProofError::RootMismatch),
    }
  }

}

#[cfg(test)]
mod tests {
  use {
    super::{Presence, ProofEnd, ProofError},
    crate::Trie,
    trellis_primitives::{Entry, InstanceId},
  };

  fn key(n: u32) -> InstanceId {
    InstanceId::zero().derive(&[&n.to_be_bytes()])
  }

  fn entry(value: u8) -> Entry {
    Entry {
      value: vec![value],
      contract_id: "value".into(),
      darc_id: InstanceId::zero(),
      version: 0,
    }
  }

  fn populated() -> Trie {
    let mut trie = Trie::new([8; 32]);
    for i in 0..30 {
      trie.insert(key(i), entry(i as u8)).unwrap();
    }
    trie
  }

  #[test]
  fn presence() {
    let trie = populated();
    for i in 0..30 {
      let proof = trie.proof(&key(i));
      assert_eq!(
        proof.verify(&trie.root(), &key(i)),
        Ok(Presence::Present(entry(i as u8)))
      );
    }
  }

  #[test]
  fn absence() {
    let trie = populated();
    for i in 100..130 {
      let proof = trie.proof(&key(i));
      assert_eq!(proof.verify(&trie.root(), &key(i)), Ok(Presence::Absent));
    }

    let empty = Trie::new([8; 32]);
    let proof = empty.proof(&key(1));
    assert_eq!(proof.end, ProofEnd::Empty);
    assert_eq!(proof.verify(&empty.root(), &key(1)), Ok(Presence::Absent));
  }

  #[test]
  fn wrong_root_is_rejected() {
    let trie = populated();
    let mut other = trie.clone();
    other.insert(key(500), entry(1)).unwrap();

    let proof = trie.proof(&key(3));
    assert_eq!(
      proof.verify(&other.root(), &key(3)),
      Err(ProofError::RootMismatch)
    );
  }

  #[test]
  fn tampered_entry_is_rejected() {
    let trie = populated();
    let mut proof = trie.proof(&key(4));
    if let ProofEnd::Leaf { entry, .. } = &mut proof.end {
      entry.value = vec![99];
    }
    assert!(proof.verify(&trie.root(), &key(4)).is_err());
  }

  #[test]
  fn proof_for_another_key_is_not_presence() {
    let trie = populated();
    let proof = trie.proof(&key(5));
    assert!(!matches!(
      proof.verify(&trie.root(), &key(6)),
      Ok(Presence::Present(_))
    ));
  }

  #[test]
  fn stripped_proof_is_rejected() {
    let trie = populated();
    let mut proof = trie.proof(&key(7));
    proof.interiors.clear();
    assert_eq!(
      proof.verify(&trie.root(), &key(7)),
      Err(ProofError::NoInteriors)
    );
  }
}
