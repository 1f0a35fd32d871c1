use {
  crate::state::ReadOnlyState,
  thiserror::Error,
  trellis_primitives::{sha3, Identity, InstanceId, Instruction, StateChange},
};

/// Contract id of the entries holding signer counters.
pub const COUNTER_CONTRACT: &str = "_signercounter";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CounterError {
  #[error("Counter of {identity} expected {expected}, got {got}")]
  Mismatch {
    identity: Identity,
    expected: u64,
    got: u64,
  },

  #[error("Instruction lists {identities} signers but {counters} counters")]
  Length { identities: usize, counters: usize },

  #[error("Stored counter of {0} is malformed")]
  Malformed(Identity),

  #[error("Counter of {0} overflows")]
  Overflow(Identity),
}

/// Instance id under which the counter of `identity` is stored.
pub fn counter_id(identity: &Identity) -> InstanceId {
  let name = identity.to_string();
  InstanceId::from(sha3(&[&b"signercounter"[..], name.as_bytes()]))
}

/// Last counter value accepted for `identity`, zero if it never signed.
pub fn get_counter(
  state: &(impl ReadOnlyState + ?Sized),
  identity: &Identity,
) -> Result<u64, CounterError> {
  match state.get(&counter_id(identity)) {
    None => Ok(0),
    Some(entry) => {
      let bytes: [u8; 8] = entry
        .value
        .as_slice()
        .try_into()
        .map_err(|_| CounterError::Malformed(*identity))?;
      Ok(u64::from_le_bytes(bytes))
    }
  }
}

/// Checks that every signer presents exactly its stored counter + 1.
///
/// All signers are checked before anything is written.
pub fn verify_counters(
  state: &(impl ReadOnlyState + ?Sized),
  instruction: &Instruction,
) -> Result<(), CounterError> {
  let identities = &instruction.signer_identities;
  let counters = &instruction.signer_counters;
  if identities.len() != counters.len() {
    return Err(CounterError::Length {
      identities: identities.len(),
      counters: counters.len(),
    });
  }

  for (identity, presented) in identities.iter().zip(counters) {
    let expected = get_counter(state, identity)?
      .checked_add(1)
      .ok_or(CounterError::Overflow(*identity))?;
    if *presented != expected {
      return Err(CounterError::Mismatch {
        identity: *identity,
        expected,
        got: *presented,
      });
    }
  }
  Ok(())
}

/// State changes bumping the counter of every identity by one.
///
/// The first counter of an identity is created, later ones updated.
pub fn increment_counters<'a>(
  state: &(impl ReadOnlyState + ?Sized),
  identities: impl IntoIterator<Item = &'a Identity>,
) -> Result<Vec<StateChange>, CounterError> {
  identities
    .into_iter()
    .map(|identity| {
      let id = counter_id(identity);
      let current = get_counter(state, identity)?;
      let next = current
        .checked_add(1)
        .ok_or(CounterError::Overflow(*identity))?;
      let value = next.to_le_bytes().to_vec();
      Ok(match current {
        0 => StateChange::create(id, COUNTER_CONTRACT, value, InstanceId::zero()),
        _ => StateChange::update(id, COUNTER_CONTRACT, value, InstanceId::zero()),
      })
    })
    .collect()
}
