use {
  crate::{canonical, sha3, Hash, Instruction, Signer, StateChange},
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
  #[error("Transaction carries no instructions")]
  Empty,

  #[error("Instruction {index} repeats argument '{name}'")]
  DuplicateArgument { index: usize, name: String },

  #[error(
    "Instruction {index} has {identities} signers, {counters} counters and \
     {signatures} signatures"
  )]
  SignerMismatch {
    index: usize,
    identities: usize,
    counters: usize,
    signatures: usize,
  },
}

/// An ordered batch of instructions that commits atomically.
///
/// Either every instruction is applied or none of them is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTransaction {
  pub instructions: Vec<Instruction>,
}

impl ClientTransaction {
  pub fn new(instructions: Vec<Instruction>) -> Self {
    Self { instructions }
  }

  /// Hash of the entire transaction including signatures.
  ///
  /// Blocks order their transactions by this value.
  pub fn hash(&self) -> Hash {
    sha3(&[&canonical(self)[..]])
  }

  /// The message every signer of every instruction signs.
  ///
  /// Covers all instructions of the transaction, so a signed
  /// instruction cannot be lifted into a different transaction.
  pub fn signing_hash(&self) -> Hash {
    let hashes: Vec<Hash> =
      self.instructions.iter().map(Instruction::hash).collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| &h[..]).collect();
    sha3(&parts)
  }

  /// Attaches signatures of the given signers.
  ///
  /// Every listed signer identity of every instruction that has a
  /// matching signer gets a signature; the others are left empty and
  /// will fail verification.
  pub fn sign(&mut self, signers: &[&Signer]) {
    let digest = self.signing_hash();
    for instruction in &mut self.instructions {
      instruction.signatures = instruction
        .signer_identities
        .iter()
        .map(|id| {
          signers
            .iter()
            .find(|s| s.identity() == *id)
            .map(|s| s.sign(&digest))
            .unwrap_or_default()
        })
        .collect();
    }
  }

  /// Stateless well-formedness checks.
  ///
  /// Nothing that depends on the ledger state is checked here,
  /// those checks happen during authorization and execution.
  pub fn validate(&self) -> Result<(), TxError> {
    if self.instructions.is_empty() {
      return Err(TxError::Empty);
    }

    for (index, instruction) in self.instructions.iter().enumerate() {
      let identities = instruction.signer_identities.len();
      let counters = instruction.signer_counters.len();
      let signatures = instruction.signatures.len();
      if identities != counters || identities != signatures {
        return Err(TxError::SignerMismatch {
          index,
          identities,
          counters,
          signatures,
        });
      }

      if let Some(name) = instruction.args().and_then(|a| a.first_duplicate())
      {
        return Err(TxError::DuplicateArgument {
          index,
          name: name.to_owned(),
        });
      }
    }
    Ok(())
  }
}

/// Outcome of one transaction inside a block.
///
/// Invalid transactions keep their slot in the block with an
/// empty list of state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
  pub transaction: ClientTransaction,
  pub valid: bool,
  pub state_changes: Vec<StateChange>,
}

impl TxResult {
  pub fn valid(transaction: ClientTransaction, changes: Vec<StateChange>) -> Self {
    Self {
      transaction,
      valid: true,
      state_changes: changes,
    }
  }

  pub fn invalid(transaction: ClientTransaction) -> Self {
    Self {
      transaction,
      valid: false,
      state_changes: vec![],
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{ClientTransaction, TxError},
    crate::{Arguments, InstanceId, Instruction, Signer},
    ed25519_dalek::Keypair,
  };

  fn signer() -> Signer {
    Signer::new(Keypair::generate(&mut rand::thread_rng()))
  }

  #[test]
  fn empty_transaction_is_rejected() {
    assert_eq!(ClientTransaction::default().validate(), Err(TxError::Empty));
  }

  #[test]
  fn sign_fills_all_listed_signers() -> anyhow::Result<()> {
    let (a, b) = (signer(), signer());
    let mut tx = ClientTransaction::new(vec![
      Instruction::spawn(InstanceId::zero(), "value", Arguments::new())
        .with_signers([(a.identity(), 1), (b.identity(), 1)]),
      Instruction::invoke(InstanceId::zero(), "value", "update", Arguments::new())
        .with_signers([(a.identity(), 2)]),
    ]);

    tx.sign(&[&a, &b]);
    tx.validate()?;

    let digest = tx.signing_hash();
    a.identity().verify(&digest, &tx.instructions[0].signatures[0])?;
    b.identity().verify(&digest, &tx.instructions[0].signatures[1])?;
    a.identity().verify(&digest, &tx.instructions[1].signatures[0])?;
    Ok(())
  }

  #[test]
  fn signatures_are_bound_to_the_transaction() {
    let a = signer();
    let instruction =
      Instruction::spawn(InstanceId::zero(), "value", Arguments::new())
        .with_signers([(a.identity(), 1)]);

    let mut single = ClientTransaction::new(vec![instruction]);
    single.sign(&[&a]);

    let lifted = ClientTransaction::new(vec![
      single.instructions[0].clone(),
      Instruction::delete(InstanceId::zero(), "value"),
    ]);

    assert_ne!(single.signing_hash(), lifted.signing_hash());
    assert!(a
      .identity()
      .verify(&lifted.signing_hash(), &lifted.instructions[0].signatures[0])
      .is_err());
  }

  #[test]
  fn malformed_signer_lists_and_arguments() {
    let a = signer();
    let mut tx = ClientTransaction::new(vec![Instruction::spawn(
      InstanceId::zero(),
      "value",
      Arguments::new(),
    )
    .with_signers([(a.identity(), 1)])]);
    assert!(matches!(
      tx.validate(),
      Err(TxError::SignerMismatch { index: 0, .. })
    ));

    let mut tx2 = ClientTransaction::new(vec![Instruction::spawn(
      InstanceId::zero(),
      "value",
      Arguments::new().with("x", vec![1]).with("x", vec![2]),
    )]);
    tx2.sign(&[]);
    assert_eq!(
      tx2.validate(),
      Err(TxError::DuplicateArgument {
        index: 0,
        name: "x".into()
      })
    );

    tx.sign(&[&a]);
    assert!(tx.validate().is_ok());
  }
}
