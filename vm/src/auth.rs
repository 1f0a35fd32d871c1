use {
  crate::{
    contracts::DARC_CONTRACT,
    counters::{verify_counters, CounterError},
    state::ReadOnlyState,
  },
  thiserror::Error,
  trellis_primitives::{
    Darc,
    DarcError,
    Hash,
    IdentityError,
    InstanceId,
    Instruction,
  },
};

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
  #[error("Instance {0} not found")]
  InstanceNotFound(InstanceId),

  #[error("Darc {darc} of instance {instance} not found")]
  DarcNotFound {
    instance: InstanceId,
    darc: InstanceId,
  },

  #[error("Instance {0} does not hold a darc")]
  NotADarc(InstanceId),

  #[error("Invalid darc: {0}")]
  Darc(#[from] DarcError),

  #[error("No rule for action '{action}' in darc {darc}")]
  MissingRule { action: String, darc: InstanceId },

  #[error("Signers do not satisfy the rule for action '{0}'")]
  Unsatisfied(String),

  #[error("Invalid signature: {0}")]
  Signature(String),

  #[error("Replay guard: {0}")]
  Counter(#[from] CounterError),

  #[error(
    "Instruction lists {identities} signers but {signatures} signatures"
  )]
  MalformedSigners { identities: usize, signatures: usize },
}

impl From<IdentityError> for AuthError {
  fn from(e: IdentityError) -> Self {
    AuthError::Signature(e.to_string())
  }
}

fn load_darc(
  state: &(impl ReadOnlyState + ?Sized),
  id: &InstanceId,
) -> Option<Result<Darc, AuthError>> {
  let entry = state.get(id)?;
  if entry.contract_id != DARC_CONTRACT {
    return Some(Err(AuthError::NotADarc(*id)));
  }
  Some(Darc::from_bytes(&entry.value).map_err(AuthError::from))
}

/// Id of the darc that governs `instance`.
///
/// A darc governs itself, any other instance is governed by the
/// darc recorded in its entry.
pub fn policy_of(
  state: &(impl ReadOnlyState + ?Sized),
  instance: &InstanceId,
) -> Result<InstanceId, AuthError> {
  let entry = state
    .get(instance)
    .ok_or(AuthError::InstanceNotFound(*instance))?;
  match entry.contract_id == DARC_CONTRACT {
    true => Ok(*instance),
    false => Ok(entry.darc_id),
  }
}

/// Finds the darc that authorizes `instruction`.
///
/// Follows exactly one indirection: the target instance is either a
/// darc itself or it names the darc that governs it. For spawns the
/// target is the spawning instance, so its policy governs the spawn.
pub fn resolve_darc(
  state: &(impl ReadOnlyState + ?Sized),
  instruction: &Instruction,
) -> Result<Darc, AuthError> {
  let instance = instruction.instance_id;
  let darc_id = policy_of(state, &instance)?;
  load_darc(state, &darc_id).unwrap_or(Err(AuthError::DarcNotFound {
    instance,
    darc: darc_id,
  }))
}

/// Checks the signatures of `instruction` against the rule of
/// `darc` for the instruction's action.
///
/// `digest` is the signing hash of the transaction carrying the
/// instruction. Every listed signature has to be valid and the
/// identities that signed have to satisfy the rule expression.
pub fn authorize(
  darc: &Darc,
  instruction: &Instruction,
  digest: &Hash,
) -> Result<(), AuthError> {
  let identities = &instruction.signer_identities;
  let signatures = &instruction.signatures;
  if identities.len() != signatures.len() {
    return Err(AuthError::MalformedSigners {
      identities: identities.len(),
      signatures: signatures.len(),
    });
  }

  let action = instruction.action();
  let rule = darc
    .rules
    .get(&action)
    .ok_or_else(|| AuthError::MissingRule {
      action: action.clone(),
      darc: darc.instance_id(),
    })?;

  for (identity, signature) in identities.iter().zip(signatures) {
    identity.verify(digest, signature)?;
  }

  match rule.evaluate(&|id| identities.contains(id)) {
    true => Ok(()),
    false => Err(AuthError::Unsatisfied(action)),
  }
}

/// Full authorization of one instruction against `state`:
/// policy resolution, signatures and replay counters.
pub fn check_instruction(
  state: &(impl ReadOnlyState + ?Sized),
  instruction: &Instruction,
  digest: &Hash,
) -> Result<Darc, AuthError> {
  let darc = resolve_darc(state, instruction)?;
  authorize(&darc, instruction, digest)?;
  verify_counters(state, instruction)?;
  Ok(darc)
}
