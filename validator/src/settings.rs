use {clap::Parser, humantime::Duration, std::path::PathBuf};

/// Trellis Local Cluster
///
/// Runs a roster of ledger nodes in one process, creates a chain
/// on them and keeps submitting transactions to it.
#[derive(Debug, Parser)]
pub struct SystemSettings {
  /// Directory for node state, temporary storage if omitted
  #[clap(long, short, value_name = "PATH")]
  data_dir: Option<PathBuf>,

  /// Number of nodes in the roster
  #[clap(long, short = 'n', default_value = "4", value_name = "COUNT")]
  cluster_size: usize,

  /// Block production interval
  #[clap(long, short = 't', default_value = "2s", value_name = "DURATION")]
  block_time: Duration,

  /// Upper bound on transactions per block
  #[clap(long, default_value = "1000", value_name = "COUNT")]
  max_block_size: usize,

  /// How long nodes answer a transaction collection
  #[clap(long, default_value = "1s", value_name = "DURATION")]
  collect_timeout: Duration,

  /// How long the leader waits for nodes to apply a block
  #[clap(long, default_value = "10s", value_name = "DURATION")]
  propagation_timeout: Duration,

  /// Interval between submitted demo transactions
  #[clap(long, default_value = "500ms", value_name = "DURATION")]
  submit_every: Duration,

  /// TCP port of the Prometheus metrics endpoint
  #[clap(long, short, value_name = "PORT")]
  metrics_port: Option<u16>,
}

impl SystemSettings {
  pub fn data_dir(&self) -> Option<&std::path::Path> {
    self.data_dir.as_deref()
  }

  pub fn cluster_size(&self) -> usize {
    self.cluster_size
  }

  pub fn block_time(&self) -> std::time::Duration {
    self.block_time.into()
  }

  pub fn max_block_size(&self) -> usize {
    self.max_block_size
  }

  pub fn collect_timeout(&self) -> std::time::Duration {
    self.collect_timeout.into()
  }

  pub fn propagation_timeout(&self) -> std::time::Duration {
    self.propagation_timeout.into()
  }

  pub fn submit_every(&self) -> std::time::Duration {
    self.submit_every.into()
  }

  pub fn metrics_port(&self) -> Option<u16> {
    self.metrics_port
  }
}
