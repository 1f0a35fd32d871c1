use {
  crate::{
    transport::{Error, Handler, Transport},
    wire::{Batch, CollectRequest, Request, Response},
  },
  futures::{stream::FuturesUnordered, Stream, StreamExt},
  metrics::{counter, histogram, increment_counter},
  std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
  },
  tokio::{
    sync::{mpsc, oneshot},
    time::sleep,
  },
  tracing::{debug, warn},
  trellis_primitives::{ClientTransaction, NodeId, ToBase58String},
};

/// A running collection of pending transactions.
///
/// Yields one batch per node that answered in time and closes once
/// every node answered, the collection timeout expired or
/// [`Collection::finish`] was called. Batches received before the
/// end are always delivered.
pub struct Collection {
  batches: mpsc::Receiver<Batch>,
  finish: Option<oneshot::Sender<()>>,
}

impl Collection {
  /// Stops waiting for nodes that have not answered yet.
  pub fn finish(&mut self) {
    if let Some(finish) = self.finish.take() {
      let _ = finish.send(());
    }
  }

  /// Waits for the collection to end and returns all collected
  /// transactions, in the order their batches arrived.
  pub async fn transactions(mut self) -> Vec<ClientTransaction> {
    let mut all = vec![];
    while let Some(batch) = self.next().await {
      all.extend(batch.transactions);
    }
    all
  }
}

impl Stream for Collection {
  type Item = Batch;

  fn poll_next(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Option<Self::Item>> {
    self.batches.poll_recv(cx)
  }
}

/// Starts a collection rooted at `local`.
///
/// The local queue is taken right away and is the first batch of
/// the stream. Must be called from within a tokio runtime.
pub(crate) fn start(
  transport: Arc<dyn Transport>,
  handler: &dyn Handler,
  local: NodeId,
  request: CollectRequest,
  capacity: usize,
) -> Collection {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  let (finish_tx, finish_rx) = oneshot::channel();
  let own = Batch {
    node: local.clone(),
    transactions: handler.pending_transactions(&request),
  };

  tokio::spawn(run_root(transport, local, request, own, tx, finish_rx));

  Collection {
    batches: rx,
    finish: Some(finish_tx),
  }
}

async fn run_root(
  transport: Arc<dyn Transport>,
  local: NodeId,
  request: CollectRequest,
  own: Batch,
  tx: mpsc::Sender<Batch>,
  mut finish: oneshot::Receiver<()>,
) {
  let started = Instant::now();
  let chain = request.chain_id.to_b58_short();
  let mut collected = own.transactions.len();
  if !own.transactions.is_empty() && tx.send(own).await.is_err() {
    return; // consumer is gone
  }

  let children = request.tree.children(&local).to_vec();
  let mut pending: FuturesUnordered<_> = children
    .iter()
    .map(|child| ask(&transport, &local, child, request.clone()))
    .collect();

  let deadline = sleep(request.timeout);
  tokio::pin!(deadline);

  while !pending.is_empty() {
    tokio::select! {
      Some(batches) = pending.next() => {
        for batch in batches.into_iter().filter(|b| !b.transactions.is_empty()) {
          collected += batch.transactions.len();
          if tx.send(batch).await.is_err() {
            return;
          }
        }
      }
      _ = &mut deadline => {
        warn!(
          "collection for chain {chain} timed out with {} of {} subtrees missing",
          pending.len(),
          children.len()
        );
        increment_counter!("trellis_collect_timeouts");
        break;
      }
      _ = &mut finish => {
        debug!("collection for chain {chain} finished early");
        break;
      }
    }
  }

  counter!("trellis_collected_transactions", collected as u64);
  histogram!(
    "trellis_collect_duration_seconds",
    started.elapsed().as_secs_f64()
  );
  debug!("collected {collected} transactions for chain {chain}");
}

/// Answers a collect request on a node that is not the root.
///
/// Returns the local batch followed by the batches of the subtree
/// that arrived within half of the request timeout.
pub(crate) async fn answer(
  transport: Arc<dyn Transport>,
  handler: Arc<dyn Handler>,
  local: NodeId,
  request: CollectRequest,
) -> Vec<Batch> {
  let mut batches = vec![Batch {
    node: local.clone(),
    transactions: handler.pending_transactions(&request),
  }];

  let children = request.tree.children(&local).to_vec();
  if children.is_empty() {
    return batches;
  }

  let budget = request.timeout / 2;
  let forwarded = CollectRequest {
    timeout: budget,
    ..request
  };
  let mut pending: FuturesUnordered<_> = children
    .iter()
    .map(|child| ask(&transport, &local, child, forwarded.clone()))
    .collect();

  let deadline = sleep(budget);
  tokio::pin!(deadline);

  while !pending.is_empty() {
    tokio::select! {
      Some(replies) = pending.next() => batches.extend(replies),
      _ = &mut deadline => {
        debug!(
          "{local} stops waiting for {} of its children after {budget:?}",
          pending.len()
        );
        break;
      }
    }
  }
  batches
}

async fn ask(
  transport: &Arc<dyn Transport>,
  from: &NodeId,
  to: &NodeId,
  request: CollectRequest,
) -> Vec<Batch> {
  let result = transport
    .send(from, to, Request::Collect(request))
    .await
    .and_then(|response| match response {
      Response::Collected(batches) => Ok(batches),
      _ => Err(Error::UnexpectedResponse(to.clone())),
    });

  match result {
    Ok(batches) => batches,
    Err(e) => {
      debug!("no transactions from {to}: {e}");
      vec![]
    }
  }
}

