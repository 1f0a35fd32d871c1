use std::time::Duration;

/// Network wide configuration shared by all chains of a node.
#[derive(Debug, Clone)]
pub struct Config {
  /// How long the root of a collection waits for replies before
  /// closing the stream of batches. Every node further down the
  /// tree waits at most half of the timeout it was given.
  pub collect_timeout: Duration,

  /// Number of children of every interior node of the
  /// collection tree.
  pub branching_factor: usize,

  /// Capacity of the channel that carries collected batches
  /// to the consumer of a collection.
  pub channel_capacity: usize,

  /// How long the leader waits for acknowledgements of an
  /// apply notice. Nodes may override it at runtime.
  pub propagation_timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      collect_timeout: Duration::from_secs(2),
      branching_factor: 4,
      channel_capacity: 64,
      propagation_timeout: Duration::from_secs(10),
    }
  }
}
