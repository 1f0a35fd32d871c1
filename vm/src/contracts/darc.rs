use {
  super::{required, Contract, ContractError, Output},
  crate::state::ReadOnlyState,
  trellis_primitives::{Coin, Darc, Instruction, Operation, StateChange},
};

pub const DARC_CONTRACT: &str = "darc";

/// Stores darcs and evolves them.
///
/// `spawn:darc` stores a new version-0 darc under its base id.
/// `invoke:darc.evolve` replaces a darc with its next version.
pub struct DarcContract;

impl Contract for DarcContract {
  fn name(&self) -> &'static str {
    DARC_CONTRACT
  }

  fn spawn(
    &self,
    state: &dyn ReadOnlyState,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    let darc = Darc::from_bytes(required(instruction, "darc")?)?;
    darc.verify_genesis()?;

    let id = darc.instance_id();
    if state.get(&id).is_some() {
      return Err(ContractError::AlreadyExists(id));
    }
    Ok((
      vec![StateChange::create(id, DARC_CONTRACT, darc.to_bytes(), id)],
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
    if command != "evolve" {
      return Err(ContractError::UnknownCommand(command.clone()));
    }

    let id = instruction.instance_id;
    let current = state
      .get(&id)
      .ok_or(ContractError::NotFound(id))
      .and_then(|entry| Darc::from_bytes(&entry.value).map_err(Into::into))?;
    let next = Darc::from_bytes(required(instruction, "darc")?)?;
    next.verify_evolution(&current)?;

    Ok((
      vec![StateChange::update(id, DARC_CONTRACT, next.to_bytes(), id)],
      coins,
    ))
  }
}
