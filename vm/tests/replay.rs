use {
  common::{genesis_state, signed, signer, spawn_value},
  trellis_vm::{get_counter, Executor},
};

mod common;

#[test]
fn replayed_transaction_is_rejected() -> anyhow::Result<()> {
  let executor = Executor::default();
  let (a, b) = (signer(), signer());
  let (state, darc) = genesis_state(&executor, &[a.identity(), b.identity()])?;

  // both signers present counter 1 on first use
  let first = signed(spawn_value(&darc, b"one"), &[(&a, 1), (&b, 1)]);
  let (state, results) = executor.execute(&state, vec![first.clone()]);
  assert!(results[0].valid);
  assert_eq!(get_counter(&state, &a.identity())?, 1);
  assert_eq!(get_counter(&state, &b.identity())?, 1);

  // byte identical replay
  let (after_replay, results) = executor.execute(&state, vec![first]);
  assert!(!results[0].valid);
  assert!(results[0].state_changes.is_empty());
  assert_eq!(after_replay.root(), state.root());

  // stale counters with a fresh payload
  let stale = signed(spawn_value(&darc, b"two"), &[(&a, 1), (&b, 1)]);
  let (_, results) = executor.execute(&state, vec![stale]);
  assert!(!results[0].valid);

  // correct next counters
  let next = signed(spawn_value(&darc, b"two"), &[(&a, 2), (&b, 2)]);
  let (state, results) = executor.execute(&state, vec![next]);
  assert!(results[0].valid);
  assert_eq!(get_counter(&state, &a.identity())?, 2);
  assert_eq!(get_counter(&state, &b.identity())?, 2);
  Ok(())
}

#[test]
fn same_batch_replay_is_rejected() -> anyhow::Result<()> {
  let executor = Executor::default();
  let a = signer();
  let (state, darc) = genesis_state(&executor, &[a.identity()])?;

  let tx = signed(spawn_value(&darc, b"x"), &[(&a, 1)]);
  let (_, results) = executor.execute(&state, vec![tx.clone(), tx]);
  assert!(results[0].valid);
  assert!(!results[1].valid);
  Ok(())
}
