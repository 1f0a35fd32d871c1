use {
  super::{required, Contract, ContractError, Output},
  crate::{auth::policy_of, state::ReadOnlyState},
  trellis_primitives::{Coin, Instruction, Operation, StateChange},
};

pub const VALUE_CONTRACT: &str = "value";

/// Stores an opaque byte value.
///
/// A spawned value lives under `instruction.derive_id("")` and is
/// governed by the darc of the instance that spawned it.
pub struct ValueContract;

impl Contract for ValueContract {
  fn name(&self) -> &'static str {
    VALUE_CONTRACT
  }

  fn spawn(
    &self,
    state: &dyn ReadOnlyState,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    let value = required(instruction, "value")?;
    let darc_id = policy_of(state, &instruction.instance_id)?;
    let id = instruction.derive_id("");
    if state.get(&id).is_some() {
      return Err(ContractError::AlreadyExists(id));
    }
    Ok((
      vec![StateChange::create(id, VALUE_CONTRACT, value.to_vec(), darc_id)],
      coins,
    ))
  }

  fn invoke(
    &self,
    state: &dyn ReadOnlyState,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    let Operation::Invoke { command, .. } = &instruction.operation else {
      return Err(ContractError::UnknownCommand(instruction.action()));
    };
    if command != "update" {
      return Err(ContractError::UnknownCommand(command.clone()));
    }

    let id = instruction.instance_id;
    let entry = state.get(&id).ok_or(ContractError::NotFound(id))?;
    let value = required(instruction, "value")?;
    Ok((
      vec![StateChange::update(
        id,
        VALUE_CONTRACT,
        value.to_vec(),
        entry.darc_id,
      )],
      coins,
    ))
  }

  fn delete(
    &self,
    state: &dyn ReadOnlyState,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    let id = instruction.instance_id;
    let entry = state.get(&id).ok_or(ContractError::NotFound(id))?;
    Ok((
      vec![StateChange::remove(id, VALUE_CONTRACT, entry.darc_id)],
      coins,
    ))
  }
}

#[cfg(test)]
mod tests {
  use {
    super::ValueContract,
    crate::{
      contracts::{Contract, ContractError, DARC_CONTRACT},
      state::{ReadOnlyState, StateTrie},
    },
    trellis_primitives::{
      Arguments,
      Darc,
      Identity,
      Instruction,
      Rules,
      StateChange,
    },
  };

  #[test]
  fn lifecycle() -> anyhow::Result<()> {
    let darc = Darc::new(
      Rules::new().with("spawn:value", Identity::Ed25519([1; 32]).into()),
      "values",
    );
    let mut state = StateTrie::new([0; 32]);
    state.apply(&[StateChange::create(
      darc.instance_id(),
      DARC_CONTRACT,
      darc.to_bytes(),
      darc.instance_id(),
    )])?;

    let spawn = Instruction::spawn(
      darc.instance_id(),
      "value",
      Arguments::new().with("value", b"hello".to_vec()),
    );
    let id = spawn.derive_id("");
    let (changes, _) = ValueContract.spawn(&state, &spawn, vec![])?;
    state.apply(&changes)?;
    let entry = state.get_entry(&id)?;
    assert_eq!(entry.value, b"hello");
    assert_eq!(entry.darc_id, darc.instance_id());

    let update = Instruction::invoke(
      id,
      "value",
      "update",
      Arguments::new().with("value", b"world".to_vec()),
    );
    let (changes, _) = ValueContract.invoke(&state, &update, vec![])?;
    state.apply(&changes)?;
    assert_eq!(state.get_entry(&id)?.value, b"world");
    assert_eq!(state.get_entry(&id)?.version, 1);

    let unknown = Instruction::invoke(id, "value", "append", Arguments::new());
    assert_eq!(
      ValueContract.invoke(&state, &unknown, vec![]).err(),
      Some(ContractError::UnknownCommand("append".into()))
    );

    let (changes, _) =
      ValueContract.delete(&state, &Instruction::delete(id, "value"), vec![])?;
    state.apply(&changes)?;
    assert!(state.get(&id).is_none());
    Ok(())
  }
}
