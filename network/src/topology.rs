use {
  serde::{Deserialize, Serialize},
  thiserror::Error,
  trellis_primitives::{NodeId, Roster},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
  #[error("Tree has no nodes")]
  Empty,

  #[error("Tree branching factor must be at least one")]
  ZeroBranching,
}

/// N-ary tree over the members of a roster.
///
/// Nodes are laid out as a heap: the initiator sits at index 0,
/// followed by the remaining roster members in roster order. The
/// children of the node at index `i` are the nodes at indices
/// `i * b + 1 ..= i * b + b` where `b` is the branching factor.
///
/// A tree always has a root and a branching factor of at least one,
/// trees received from peers are checked when they are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct Tree {
  nodes: Vec<NodeId>,
  branching: usize,
}

#[derive(Deserialize)]
struct RawTree {
  nodes: Vec<NodeId>,
  branching: usize,
}

impl TryFrom<RawTree> for Tree {
  type Error = TreeError;

  fn try_from(raw: RawTree) -> Result<Self, Self::Error> {
    if raw.nodes.is_empty() {
      return Err(TreeError::Empty);
    }
    if raw.branching == 0 {
      return Err(TreeError::ZeroBranching);
    }
    Ok(Self {
      nodes: raw.nodes,
      branching: raw.branching,
    })
  }
}

impl Tree {
  pub fn new(roster: &Roster, root: &NodeId, branching: usize) -> Self {
    let nodes = std::iter::once(root.clone())
      .chain(roster.iter().filter(|n| *n != root).cloned())
      .collect();
    Self {
      nodes,
      branching: branching.max(1),
    }
  }

  pub fn root(&self) -> &NodeId {
    &self.nodes[0]
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn nodes(&self) -> &[NodeId] {
    &self.nodes
  }

  pub fn position(&self, node: &NodeId) -> Option<usize> {
    self.nodes.iter().position(|n| n == node)
  }

  /// Direct children of `node`, empty for leaves and for nodes
  /// outside of the tree.
  pub fn children(&self, node: &NodeId) -> &[NodeId] {
    let Some(index) = self.position(node) else {
      return &[];
    };
    let first = (index * self.branching + 1).min(self.nodes.len());
    let last = (first + self.branching).min(self.nodes.len());
    &self.nodes[first..last]
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Tree, TreeError},
    serde::Serialize,
    trellis_primitives::{NodeId, Roster},
  };

  fn roster(n: usize) -> Roster {
    (0..n).map(|i| NodeId::new(format!("n{i}"))).collect()
  }

  fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|n| NodeId::from(*n)).collect()
  }

  #[test]
  fn heap_layout() {
    let tree = Tree::new(&roster(7), &"n0".into(), 2);
    assert_eq!(tree.root(), &NodeId::from("n0"));
    assert_eq!(tree.children(&"n0".into()), ids(&["n1", "n2"]));
    assert_eq!(tree.children(&"n1".into()), ids(&["n3", "n4"]));
    assert_eq!(tree.children(&"n2".into()), ids(&["n5", "n6"]));
    assert!(tree.children(&"n3".into()).is_empty());
    assert!(tree.children(&"n6".into()).is_empty());
  }

  #[test]
  fn initiator_becomes_root() {
    let tree = Tree::new(&roster(4), &"n2".into(), 3);
    assert_eq!(tree.nodes(), ids(&["n2", "n0", "n1", "n3"]));
    assert_eq!(tree.children(&"n2".into()).len(), 3);
    assert!(tree.children(&"unknown".into()).is_empty());
  }

  #[test]
  fn every_node_reachable() {
    let tree = Tree::new(&roster(10), &"n0".into(), 3);
    let mut seen = vec![tree.root().clone()];
    let mut frontier = vec![tree.root().clone()];
    while let Some(node) = frontier.pop() {
      for child in tree.children(&node) {
        seen.push(child.clone());
        frontier.push(child.clone());
      }
    }
    seen.sort();
    let mut all = tree.nodes().to_vec();
    all.sort();
    assert_eq!(seen, all);
  }

  #[derive(Serialize)]
  struct Forged {
    nodes: Vec<NodeId>,
    branching: usize,
  }

  fn decode(forged: &Forged) -> Result<Tree, String> {
    let bytes = rmp_serde::to_vec_named(forged).map_err(|e| e.to_string())?;
    rmp_serde::from_slice(&bytes).map_err(|e| e.to_string())
  }

  #[test]
  fn decoding_rejects_malformed_trees() -> anyhow::Result<()> {
    let tree = Tree::new(&roster(3), &"n0".into(), 2);
    let decoded: Tree = rmp_serde::from_slice(&rmp_serde::to_vec_named(&tree)?)?;
    assert_eq!(decoded, tree);

    let zero = decode(&Forged {
      nodes: ids(&["n0", "n1"]),
      branching: 0,
    });
    assert!(zero
      .unwrap_err()
      .contains(&TreeError::ZeroBranching.to_string()));

    let empty = decode(&Forged {
      nodes: vec![],
      branching: 2,
    });
    assert!(empty.unwrap_err().contains(&TreeError::Empty.to_string()));
    Ok(())
  }
}
