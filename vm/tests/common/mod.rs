#![allow(dead_code)]

use {
  ed25519_dalek::Keypair,
  std::time::Duration,
  trellis_primitives::{
    Arguments,
    ClientTransaction,
    Darc,
    Expr,
    Identity,
    InstanceId,
    Instruction,
    Rules,
    Signer,
  },
  trellis_vm::{ChainConfig, Executor, StateTrie},
};

pub fn signer() -> Signer {
  Signer::new(Keypair::generate(&mut rand::thread_rng()))
}

/// Darc that lets any of `owners` spawn, update and delete values
/// and evolve the darc itself.
pub fn owners_darc(owners: &[Identity]) -> Darc {
  let expr = Expr::any_of(owners.iter().copied()).expect("at least one owner");
  Darc::new(
    Rules::new()
      .with("spawn:value", expr.clone())
      .with("invoke:value.update", expr.clone())
      .with("delete:value", expr.clone())
      .with("spawn:darc", expr.clone())
      .with("invoke:darc.evolve", expr),
    "test owners",
  )
}

pub fn config() -> ChainConfig {
  ChainConfig {
    block_interval: Duration::from_millis(100),
    max_block_size: 100,
  }
}

/// A fresh chain state governed by a darc owned by `owners`.
pub fn genesis_state(
  executor: &Executor,
  owners: &[Identity],
) -> anyhow::Result<(StateTrie, Darc)> {
  let darc = owners_darc(owners);
  let (state, _, _) = executor.genesis([42; 32], &darc, &config(), 0)?;
  Ok((state, darc))
}

/// Signs a single instruction transaction with all given signers,
/// each presenting the counter listed next to it.
pub fn signed(
  instruction: Instruction,
  signers: &[(&Signer, u64)],
) -> ClientTransaction {
  let instruction = instruction
    .with_signers(signers.iter().map(|(s, c)| (s.identity(), *c)));
  let mut tx = ClientTransaction::new(vec![instruction]);
  let keys: Vec<&Signer> = signers.iter().map(|(s, _)| *s).collect();
  tx.sign(&keys);
  tx
}

pub fn spawn_value(darc: &Darc, value: &[u8]) -> Instruction {
  Instruction::spawn(
    darc.instance_id(),
    "value",
    Arguments::new().with("value", value.to_vec()),
  )
}

pub fn update_value(id: InstanceId, value: &[u8]) -> Instruction {
  Instruction::invoke(
    id,
    "value",
    "update",
    Arguments::new().with("value", value.to_vec()),
  )
}
