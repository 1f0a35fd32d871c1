use {
  crate::proof::{Proof, ProofEnd},
  std::sync::Arc,
  thiserror::Error,
  trellis_primitives::{canonical, sha3, Entry, Hash, InstanceId},
};

const INTERIOR_TAG: u8 = 0x01;
const EMPTY_TAG: u8 = 0x02;
const LEAF_TAG: u8 = 0x03;

/// Number of bits in a key path.
pub(crate) const PATH_BITS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrieError {
  #[error("Keys {0} and {1} map to the same trie path")]
  PathCollision(InstanceId, InstanceId),
}

/// Position of a key in the trie.
pub(crate) fn path_of(nonce: &Hash, key: &InstanceId) -> Hash {
  sha3(&[&nonce[..], key.as_ref()])
}

/// Bit `index` of a path, most significant bit first.
pub(crate) fn bit(path: &Hash, index: usize) -> bool {
  (path[index / 8] >> (7 - index % 8)) & 1 == 1
}

/// First `len` bits of a path, the rest zeroed.
fn masked(path: &Hash, len: usize) -> Hash {
  let mut out = [0u8; 32];
  let full = len / 8;
  out[..full].copy_from_slice(&path[..full]);
  if len % 8 != 0 {
    out[full] = path[full] & (0xffu8 << (8 - len % 8));
  }
  out
}

fn flipped(path: &Hash, index: usize) -> Hash {
  let mut out = *path;
  out[index / 8] ^= 0x80 >> (index % 8);
  out
}

pub(crate) fn hash_interior(left: &Hash, right: &Hash) -> Hash {
  sha3(&[&[INTERIOR_TAG][..], &left[..], &right[..]])
}

pub(crate) fn hash_empty(nonce: &Hash, path: &Hash, len: usize) -> Hash {
  let len_le = (len as u32).to_le_bytes();
  sha3(&[&[EMPTY_TAG][..], &nonce[..], &masked(path, len)[..], &len_le[..]])
}

pub(crate) fn hash_leaf(
  nonce: &Hash,
  path: &Hash,
  len: usize,
  key: &InstanceId,
  entry: &Entry,
) -> Hash {
  let len_le = (len as u32).to_le_bytes();
  sha3(&[
    &[LEAF_TAG][..],
    &nonce[..],
    &masked(path, len)[..],
    &len_le[..],
    key.as_ref(),
    &canonical(entry)[..],
  ])
}

#[derive(Debug)]
struct Leaf {
  key: InstanceId,
  path: Hash,
  entry: Entry,
}

#[derive(Debug)]
enum Node {
  Empty,
  Leaf(Leaf),
  Interior { left: Link, right: Link },
}

/// A node together with its hash.
///
/// Nodes are immutable and shared between all tries cloned from
/// the same ancestor. Changing a trie replaces the nodes on the
/// way from the root to the changed leaf and reuses the rest.
#[derive(Debug, Clone)]
struct Link {
  hash: Hash,
  node: Arc<Node>,
}

/// Binary Merkle trie keyed by instance ids.
///
/// The root is always an interior node. Every other interior node
/// has at least two leaves below it and every leaf sits at the
/// shallowest depth at which it is alone, so the root hash depends
/// only on the set of entries and never on the order in which they
/// were inserted or removed.
///
/// Cloning a trie is O(1).
#[derive(Debug, Clone)]
pub struct Trie {
  nonce: Hash,
  root: Link,
  len: usize,
}

impl Trie {
  pub fn new(nonce: Hash) -> Self {
    let zero = [0u8; 32];
    let root = Self::interior(
      Self::empty(&nonce, &zero, 1),
      Self::empty(&nonce, &flipped(&zero, 0), 1),
    );
    Self {
      nonce,
      root,
      len: 0,
    }
  }

  pub fn nonce(&self) -> Hash {
    self.nonce
  }

  pub fn root(&self) -> Hash {
    self.root.hash
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn get(&self, key: &InstanceId) -> Option<&Entry> {
    let path = path_of(&self.nonce, key);
    let mut node = &*self.root.node;
    let mut depth = 0;
    loop {
      match node {
        Node::Empty => return None,
        Node::Leaf(leaf) => {
          return (leaf.key == *key).then_some(&leaf.entry);
        }
        Node::Interior { left, right } => {
          node = if bit(&path, depth) { &*right.node } else { &*left.node };
          depth += 1;
        }
      }
    }
  }

  /// Inserts or replaces an entry, returning the replaced one.
  pub fn insert(
    &mut self,
    key: InstanceId,
    entry: Entry,
  ) -> Result<Option<Entry>, TrieError> {
    let leaf = Leaf {
      path: path_of(&self.nonce, &key),
      key,
      entry,
    };
    let (root, replaced) = self.insert_at(&self.root, 0, leaf)?;
    self.root = root;
    if replaced.is_none() {
      self.len += 1;
    }
    Ok(replaced)
  }

  /// Removes an entry and restores the canonical shape.
  pub fn remove(&mut self, key: &InstanceId) -> Option<Entry> {
    let path = path_of(&self.nonce, key);
    let (root, removed) = self.remove_at(&self.root, 0, &path, key)?;
    self.root = root;
    self.len -= 1;
    Some(removed)
  }

  /// Evidence of presence or absence of `key` under the current root.
  pub fn proof(&self, key: &InstanceId) -> Proof {
    let path = path_of(&self.nonce, key);
    let mut interiors = vec![];
    let mut node = &*self.root.node;
    loop {
      match node {
        Node::Interior { left, right } => {
          node = if bit(&path, interiors.len()) {
            &*right.node
          } else {
            &*left.node
          };
          interiors.push((left.hash, right.hash));
        }
        Node::Leaf(leaf) => {
          return Proof {
            nonce: self.nonce,
            interiors,
            end: ProofEnd::Leaf {
              key: leaf.key,
              entry: leaf.entry.clone(),
            },
          };
        }
        Node::Empty => {
          return Proof {
            nonce: self.nonce,
            interiors,
            end: ProofEnd::Empty,
          };
        }
      }
    }
  }

  /// All entries in path order.
  pub fn iter(&self) -> Iter<'_> {
    Iter {
      stack: vec![&*self.root.node],
    }
  }

  fn interior(left: Link, right: Link) -> Link {
    Link {
      hash: hash_interior(&left.hash, &right.hash),
      node: Arc::new(Node::Interior { left, right }),
    }
  }

  fn empty(nonce: &Hash, path: &Hash, depth: usize) -> Link {
    Link {
      hash: hash_empty(nonce, path, depth),
      node: Arc::new(Node::Empty),
    }
  }

  fn leaf(nonce: &Hash, depth: usize, leaf: Leaf) -> Link {
    Link {
      hash: hash_leaf(nonce, &leaf.path, depth, &leaf.key, &leaf.entry),
      node: Arc::new(Node::Leaf(leaf)),
    }
  }

  /// Moves an existing leaf node to a different depth.
  fn relocate(nonce: &Hash, depth: usize, leaf: &Leaf) -> Link {
    Self::leaf(nonce, depth, Leaf {
      key: leaf.key,
      path: leaf.path,
      entry: leaf.entry.clone(),
    })
  }

  fn insert_at(
    &self,
    link: &Link,
    depth: usize,
    leaf: Leaf,
  ) -> Result<(Link, Option<Entry>), TrieError> {
    match &*link.node {
      Node::Empty => Ok((Self::leaf(&self.nonce, depth, leaf), None)),
      Node::Leaf(existing) if existing.key == leaf.key => {
        let replaced = existing.entry.clone();
        Ok((Self::leaf(&self.nonce, depth, leaf), Some(replaced)))
      }
      Node::Leaf(existing) => {
        let existing = Leaf {
          key: existing.key,
          path: existing.path,
          entry: existing.entry.clone(),
        };
        Ok((self.split(depth, existing, leaf)?, None))
      }
      Node::Interior { left, right } => {
        if bit(&leaf.path, depth) {
          let (right, replaced) = self.insert_at(right, depth + 1, leaf)?;
          Ok((Self::interior(left.clone(), right), replaced))
        } else {
          let (left, replaced) = self.insert_at(left, depth + 1, leaf)?;
          Ok((Self::interior(left, right.clone()), replaced))
        }
      }
    }
  }

  /// Builds the subtree at `depth` holding exactly two leaves.
  fn split(&self, depth: usize, a: Leaf, b: Leaf) -> Result<Link, TrieError> {
    if depth >= PATH_BITS {
      return Err(TrieError::PathCollision(a.key, b.key));
    }

    let (bit_a, bit_b) = (bit(&a.path, depth), bit(&b.path, depth));
    if bit_a != bit_b {
      let (zero, one) = if bit_a { (b, a) } else { (a, b) };
      return Ok(Self::interior(
        Self::leaf(&self.nonce, depth + 1, zero),
        Self::leaf(&self.nonce, depth + 1, one),
      ));
    }

    let other = Self::empty(&self.nonce, &flipped(&a.path, depth), depth + 1);
    let shared = self.split(depth + 1, a, b)?;
    Ok(match bit_a {
      true => Self::interior(other, shared),
      false => Self::interior(shared, other),
    })
  }

  fn remove_at(
    &self,
    link: &Link,
    depth: usize,
    path: &Hash,
    key: &InstanceId,
  ) -> Option<(Link, Entry)> {
    match &*link.node {
      Node::Empty => None,
      Node::Leaf(leaf) if leaf.key == *key => {
        Some((Self::empty(&self.nonce, path, depth), leaf.entry.clone()))
      }
      Node::Leaf(_) => None,
      Node::Interior { left, right } => {
        let (left, right, removed) = if bit(path, depth) {
          let (right, removed) = self.remove_at(right, depth + 1, path, key)?;
          (left.clone(), right, removed)
        } else {
          let (left, removed) = self.remove_at(left, depth + 1, path, key)?;
          (left, right.clone(), removed)
        };

        if depth == 0 {
          return Some((Self::interior(left, right), removed));
        }
        Some((self.collapse(depth, path, left, right), removed))
      }
    }
  }

  /// Replaces an interior node that no longer has two leaves
  /// below it with its only leaf, or with an empty node.
  fn collapse(&self, depth: usize, path: &Hash, left: Link, right: Link) -> Link {
    match (&*left.node, &*right.node) {
      (Node::Empty, Node::Empty) => Self::empty(&self.nonce, path, depth),
      (Node::Leaf(leaf), Node::Empty) | (Node::Empty, Node::Leaf(leaf)) => {
        Self::relocate(&self.nonce, depth, leaf)
      }
      _ => Self::interior(left, right),
    }
  }
}

pub struct Iter<'a> {
  stack: Vec<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
  type Item = (&'a InstanceId, &'a Entry);

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(node) = self.stack.pop() {
      match node {
        Node::Empty => continue,
        Node::Leaf(leaf) => return Some((&leaf.key, &leaf.entry)),
        Node::Interior { left, right } => {
          self.stack.push(&*right.node);
          self.stack.push(&*left.node);
        }
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{bit, masked, Trie},
    trellis_primitives::{Entry, InstanceId},
  };

  fn key(n: u32) -> InstanceId {
    InstanceId::zero().derive(&[&n.to_le_bytes()])
  }

  fn entry(value: u32) -> Entry {
    Entry {
      value: value.to_le_bytes().to_vec(),
      contract_id: "value".into(),
      darc_id: InstanceId::zero(),
      version: 0,
    }
  }

  #[test]
  fn bits_and_masks() {
    let mut path = [0u8; 32];
    path[0] = 0b1010_0000;
    assert!(bit(&path, 0));
    assert!(!bit(&path, 1));
    assert!(bit(&path, 2));

    let full = [0xffu8; 32];
    let m = masked(&full, 11);
    assert_eq!(m[0], 0xff);
    assert_eq!(m[1], 0b1110_0000);
    assert_eq!(m[2], 0);
  }

  #[test]
  fn insert_get_remove() {
    let mut trie = Trie::new([1; 32]);
    let empty_root = trie.root();
    assert!(trie.is_empty());

    for i in 0..50 {
      assert_eq!(trie.insert(key(i), entry(i)).unwrap(), None);
    }
    assert_eq!(trie.len(), 50);
    for i in 0..50 {
      assert_eq!(trie.get(&key(i)), Some(&entry(i)));
    }
    assert_eq!(trie.get(&key(100)), None);
    assert_eq!(trie.iter().count(), 50);

    assert_eq!(trie.insert(key(3), entry(33)).unwrap(), Some(entry(3)));
    assert_eq!(trie.len(), 50);

    for i in 0..50 {
      assert!(trie.remove(&key(i)).is_some());
    }
    assert_eq!(trie.remove(&key(0)), None);
    assert!(trie.is_empty());
    assert_eq!(trie.root(), empty_root);
  }

  #[test]
  fn root_is_independent_of_operation_order() {
    let mut forward = Trie::new([2; 32]);
    for i in 0..40 {
      forward.insert(key(i), entry(i)).unwrap();
    }

    let mut backward = Trie::new([2; 32]);
    for i in (0..60).rev() {
      backward.insert(key(i), entry(i)).unwrap();
    }
    for i in 40..60 {
      backward.remove(&key(i));
    }

    assert_eq!(forward.root(), backward.root());
    assert_eq!(forward.len(), backward.len());
  }

  #[test]
  fn clones_are_independent() {
    let mut original = Trie::new([3; 32]);
    original.insert(key(1), entry(1)).unwrap();
    let root = original.root();

    let mut copy = original.clone();
    copy.insert(key(2), entry(2)).unwrap();
    copy.remove(&key(1));

    assert_eq!(original.root(), root);
    assert_eq!(original.get(&key(1)), Some(&entry(1)));
    assert_eq!(original.get(&key(2)), None);
    assert_ne!(copy.root(), root);
  }

  #[test]
  fn nonce_changes_root() {
    let mut a = Trie::new([4; 32]);
    let mut b = Trie::new([5; 32]);
    a.insert(key(1), entry(1)).unwrap();
    b.insert(key(1), entry(1)).unwrap();
    assert_ne!(a.root(), b.root());
  }

  #[test]
  fn value_changes_root() {
    let mut trie = Trie::new([6; 32]);
    trie.insert(key(1), entry(1)).unwrap();
    let before = trie.root();
    trie.insert(key(1), entry(2)).unwrap();
    assert_ne!(before, trie.root());
    trie.insert(key(1), entry(1)).unwrap();
    assert_eq!(before, trie.root());
  }
}
