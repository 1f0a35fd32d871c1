use {
  serde::{Deserialize, Serialize},
  std::fmt::{Debug, Display},
};

/// Name of a node in the cluster.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for NodeId {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<String> for NodeId {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl Display for NodeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Debug for NodeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "node({})", self.0)
  }
}

/// Ordered list of the nodes that maintain a chain.
///
/// The first node is the leader and is the only one that
/// builds blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster(Vec<NodeId>);

impl Roster {
  pub fn new(nodes: Vec<NodeId>) -> Self {
    Self(nodes)
  }

  pub fn leader(&self) -> Option<&NodeId> {
    self.0.first()
  }

  pub fn contains(&self, node: &NodeId) -> bool {
    self.0.contains(node)
  }

  pub fn position(&self, node: &NodeId) -> Option<usize> {
    self.0.iter().position(|n| n == node)
  }

  pub fn nodes(&self) -> &[NodeId] {
    &self.0
  }

  pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl FromIterator<NodeId> for Roster {
  fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}
