use {
  common::{block_id, config, Cluster},
  futures::StreamExt,
  std::time::{Duration, Instant},
  trellis_network::{Handler, Network},
  trellis_primitives::{NodeId, Roster},
};

mod common;

#[tokio::test]
async fn collects_from_every_node() -> anyhow::Result<()> {
  for n in [2, 3, 10] {
    let cluster = Cluster::new(n);
    let network = cluster.network(0, config(Duration::from_secs(5), 3));
    let root: &dyn Handler = &*cluster.nodes[0];

    let started = Instant::now();
    let txs = network
      .collect(root, &cluster.roster, block_id(1), block_id(2))
      .transactions()
      .await;

    assert_eq!(txs.len(), n);
    assert!(started.elapsed() < Duration::from_secs(5));
    for node in &cluster.nodes {
      assert!(txs.contains(&node.transaction()));
    }
  }
  Ok(())
}

#[tokio::test]
async fn paused_node_contributes_nothing() -> anyhow::Result<()> {
  let cluster = Cluster::new(3);
  cluster.local.pause(&NodeId::from("n1"));
  let timeout = Duration::from_millis(300);
  let network = cluster.network(0, config(timeout, 2));

  let started = Instant::now();
  let txs = network
    .collect(&*cluster.nodes[0], &cluster.roster, block_id(1), block_id(2))
    .transactions()
    .await;

  assert_eq!(txs.len(), 2);
  assert!(!txs.contains(&cluster.nodes[1].transaction()));
  assert!(started.elapsed() >= timeout);
  assert!(started.elapsed() < Duration::from_secs(2));
  Ok(())
}

#[tokio::test]
async fn finish_keeps_received_batches() -> anyhow::Result<()> {
  let cluster = Cluster::new(3);
  cluster.local.pause(&NodeId::from("n1"));
  let network = cluster.network(0, config(Duration::from_secs(30), 2));

  let mut collection = network.collect(
    &*cluster.nodes[0],
    &cluster.roster,
    block_id(1),
    block_id(2),
  );

  let mut txs = vec![];
  while txs.len() < 2 {
    let batch = tokio::time::timeout(Duration::from_secs(1), collection.next())
      .await?
      .ok_or_else(|| anyhow::anyhow!("collection closed too early"))?;
    txs.extend(batch.transactions);
  }

  collection.finish();
  let rest =
    tokio::time::timeout(Duration::from_secs(1), collection.transactions())
      .await?;
  assert!(rest.is_empty());
  assert_eq!(txs.len(), 2);
  Ok(())
}

#[tokio::test]
async fn interior_node_loses_its_subtree() -> anyhow::Result<()> {
  // n0 -> (n1, n2), n1 -> (n3, n4), n2 -> (n5, n6)
  let cluster = Cluster::new(7);
  cluster.local.pause(&NodeId::from("n1"));
  let network = cluster.network(0, config(Duration::from_millis(400), 2));

  let txs = network
    .collect(&*cluster.nodes[0], &cluster.roster, block_id(1), block_id(2))
    .transactions()
    .await;

  let expected: Vec<_> = [0, 2, 5, 6]
    .iter()
    .map(|i| cluster.nodes[*i].transaction())
    .collect();
  assert_eq!(txs.len(), expected.len());
  for tx in &expected {
    assert!(txs.contains(tx));
  }
  Ok(())
}

#[tokio::test]
async fn timeouts_halve_down_the_tree() -> anyhow::Result<()> {
  let cluster = Cluster::new(7);
  let timeout = Duration::from_secs(4);
  let network = cluster.network(0, config(timeout, 2));

  let txs = network
    .collect(&*cluster.nodes[0], &cluster.roster, block_id(1), block_id(2))
    .transactions()
    .await;
  assert_eq!(txs.len(), 7);

  let given = |i: usize| cluster.nodes[i].timeouts.lock().clone();
  assert_eq!(given(0), vec![timeout]);
  assert_eq!(given(1), vec![timeout]);
  assert_eq!(given(2), vec![timeout]);
  assert_eq!(given(3), vec![timeout / 2]);
  assert_eq!(given(6), vec![timeout / 2]);
  Ok(())
}

#[tokio::test]
async fn unknown_peers_do_not_delay_collection() -> anyhow::Result<()> {
  let cluster = Cluster::new(3);
  let roster: Roster = cluster
    .roster
    .iter()
    .cloned()
    .chain([NodeId::from("ghost")])
    .collect();
  let network: Network = cluster.network(0, config(Duration::from_secs(10), 4));

  let started = Instant::now();
  let txs = network
    .collect(&*cluster.nodes[0], &roster, block_id(1), block_id(2))
    .transactions()
    .await;

  assert_eq!(txs.len(), 3);
  assert!(started.elapsed() < Duration::from_secs(2));
  Ok(())
}
