use {
  crate::service::{Chain, Node},
  std::sync::{Arc, Weak},
  tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
  },
  tracing::{debug, error},
  trellis_primitives::{ClientTransaction, ToBase58String},
};

/// Drives one chain: queues submitted transactions and runs an
/// epoch every block interval until the node shuts down.
///
/// The worker only holds a weak reference to its node, so a dropped
/// node stops its workers on the next tick.
pub(crate) fn spawn(
  node: Weak<Node>,
  chain: Arc<Chain>,
  mut transactions: mpsc::Receiver<ClientTransaction>,
  mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut period = chain.block_interval();
    let mut ticker = schedule(period);

    while !*shutdown.borrow() {
      tokio::select! {
        Some(tx) = transactions.recv() => {
          chain.enqueue(tx);
        }
        _ = ticker.tick() => {
          let Some(node) = node.upgrade() else {
            break;
          };
          if let Err(e) = node.epoch(&chain).await {
            error!("epoch of chain {} failed: {e}", chain.id.to_b58_short());
          }
          chain.prune_seen();

          // the configuration may change with any block
          let current = chain.block_interval();
          if current != period {
            debug!(
              "block interval of chain {} is now {current:?}",
              chain.id.to_b58_short()
            );
            period = current;
            ticker = schedule(period);
          }
        }
        changed = shutdown.changed() => {
          if changed.is_err() {
            break;
          }
        }
      }
    }
    debug!("worker of chain {} stopped", chain.id.to_b58_short());
  })
}

/// First tick one period from now.
fn schedule(period: std::time::Duration) -> Interval {
  let mut ticker = interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  ticker
}
