use {
  crate::{
    transport::Transport,
    wire::{ApplyNotice, Request, Response},
  },
  futures::{stream::FuturesUnordered, StreamExt},
  metrics::increment_counter,
  std::{sync::Arc, time::Duration},
  tokio::time::timeout,
  tracing::{debug, warn},
  trellis_primitives::{NodeId, Roster, ToBase58String},
};

/// Outcome of announcing a block to the roster.
///
/// A shortfall is not an error: nodes that did not acknowledge the
/// notice catch up with the next one they receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Propagation {
  /// Number of nodes the notice was sent to.
  pub expected: usize,

  /// Number of nodes that acknowledged it in time.
  pub replied: usize,
}

impl Propagation {
  pub fn is_complete(&self) -> bool {
    self.replied >= self.expected
  }

  pub fn missing(&self) -> usize {
    self.expected.saturating_sub(self.replied)
  }
}

/// Sends `notice` to every roster member except `local` and counts
/// the acknowledgements that arrive within `within`.
pub(crate) async fn propagate(
  transport: Arc<dyn Transport>,
  local: NodeId,
  roster: &Roster,
  notice: ApplyNotice,
  within: Duration,
) -> Propagation {
  let targets: Vec<NodeId> =
    roster.iter().filter(|n| **n != local).cloned().collect();

  let mut pending: FuturesUnordered<_> = targets
    .iter()
    .map(|to| {
      let reply = transport.send(&local, to, Request::Apply(notice.clone()));
      async move { (to, reply.await) }
    })
    .collect();

  let mut replied = 0;
  let acknowledged = timeout(within, async {
    while let Some((to, reply)) = pending.next().await {
      match reply {
        Ok(Response::Applied) => replied += 1,
        Ok(other) => warn!("{to} answered an apply notice with {other:?}"),
        Err(e) => debug!("apply notice to {to} failed: {e}"),
      }
    }
  })
  .await;

  let outcome = Propagation {
    expected: targets.len(),
    replied,
  };

  if acknowledged.is_err() || !outcome.is_complete() {
    warn!(
      "block {} reached only {} of {} nodes",
      notice.block_id.to_b58_short(),
      outcome.replied,
      outcome.expected
    );
    increment_counter!("trellis_propagation_shortfalls");
  }
  outcome
}
