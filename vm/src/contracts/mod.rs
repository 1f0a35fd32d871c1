mod config;
mod darc;
mod value;

pub use {
  config::{read_config, ChainConfig, ConfigContract, CONFIG_CONTRACT},
  darc::{DarcContract, DARC_CONTRACT},
  value::{ValueContract, VALUE_CONTRACT},
};
use {
  crate::{auth::AuthError, state::ReadOnlyState},
  std::{collections::HashMap, sync::Arc},
  thiserror::Error,
  trellis_primitives::{Coin, DarcError, InstanceId, Instruction, StateChange},
};

#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
  #[error("Contract '{contract}' does not support {operation}")]
  NotSupported {
    contract: String,
    operation: &'static str,
  },

  #[error("Contract '{0}' is already registered")]
  AlreadyRegistered(String),

  #[error("Unknown contract '{0}'")]
  UnknownContract(String),

  #[error("Missing argument '{0}'")]
  MissingArgument(&'static str),

  #[error("Invalid argument '{name}': {reason}")]
  InvalidArgument { name: &'static str, reason: String },

  #[error("Command '{0}' is not known")]
  UnknownCommand(String),

  #[error("Instance {0} already exists")]
  AlreadyExists(InstanceId),

  #[error("Instance {0} not found")]
  NotFound(InstanceId),

  #[error("Darc error: {0}")]
  Darc(#[from] DarcError),

  #[error("Authorization error: {0}")]
  Auth(#[from] AuthError),
}

/// What a contract returns: the state changes it wants applied and
/// the coins it hands on to the next instruction.
pub type Output = (Vec<StateChange>, Vec<Coin>);

/// Behaviour of one kind of instance.
///
/// A contract never writes to the state, it reads through the
/// given view and describes its effect as a list of state changes.
/// Operations a contract does not implement are rejected.
pub trait Contract: Send + Sync {
  fn name(&self) -> &'static str;

  fn spawn(
    &self,
    _state: &dyn ReadOnlyState,
    _instruction: &Instruction,
    _coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    Err(ContractError::NotSupported {
      contract: self.name().into(),
      operation: "spawn",
    })
  }

  fn invoke(
    &self,
    _state: &dyn ReadOnlyState,
    _instruction: &Instruction,
    _coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    Err(ContractError::NotSupported {
      contract: self.name().into(),
      operation: "invoke",
    })
  }

  fn delete(
    &self,
    _state: &dyn ReadOnlyState,
    _instruction: &Instruction,
    _coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    Err(ContractError::NotSupported {
      contract: self.name().into(),
      operation: "delete",
    })
  }
}

/// Maps contract ids to their implementation.
///
/// Kinds are registered once, before the registry is handed to an
/// executor. Registering the same kind twice is an error.
#[derive(Clone, Default)]
pub struct Registry {
  contracts: HashMap<String, Arc<dyn Contract>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with the contracts every chain needs.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    for contract in [
      Arc::new(ConfigContract) as Arc<dyn Contract>,
      Arc::new(DarcContract),
      Arc::new(ValueContract),
    ] {
      let name = contract.name();
      registry.contracts.insert(name.into(), contract);
    }
    registry
  }

  pub fn register(
    &mut self,
    kind: impl Into<String>,
    contract: Arc<dyn Contract>,
  ) -> Result<(), ContractError> {
    let kind = kind.into();
    if self.contracts.contains_key(&kind) {
      return Err(ContractError::AlreadyRegistered(kind));
    }
    self.contracts.insert(kind, contract);
    Ok(())
  }

  pub fn get(&self, kind: &str) -> Result<&Arc<dyn Contract>, ContractError> {
    self
      .contracts
      .get(kind)
      .ok_or_else(|| ContractError::UnknownContract(kind.into()))
  }

  pub fn contains(&self, kind: &str) -> bool {
    self.contracts.contains_key(kind)
  }
}

impl std::fmt::Debug for Registry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut kinds: Vec<_> = self.contracts.keys().collect();
    kinds.sort();
    f.debug_struct("Registry").field("contracts", &kinds).finish()
  }
}

fn required<'a>(
  instruction: &'a Instruction,
  name: &'static str,
) -> Result<&'a [u8], ContractError> {
  instruction
    .args()
    .and_then(|args| args.search(name))
    .ok_or(ContractError::MissingArgument(name))
}
