use {
  super::{required, Contract, ContractError, Output, DARC_CONTRACT},
  crate::state::ReadOnlyState,
  serde::{Deserialize, Serialize},
  std::time::Duration,
  trellis_primitives::{
    canonical,
    Coin,
    Darc,
    InstanceId,
    Instruction,
    Operation,
    StateChange,
  },
};

pub const CONFIG_CONTRACT: &str = "config";

/// Chain wide parameters, stored under [`InstanceId::zero`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
  /// How often the leader tries to build a block.
  pub block_interval: Duration,

  /// Upper bound on the number of transactions in a block.
  pub max_block_size: usize,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      block_interval: Duration::from_secs(5),
      max_block_size: 1000,
    }
  }
}

impl ChainConfig {
  pub fn to_bytes(&self) -> Vec<u8> {
    canonical(self)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
    let config: ChainConfig =
      rmp_serde::from_slice(bytes).map_err(|e| ContractError::InvalidArgument {
        name: "config",
        reason: e.to_string(),
      })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ContractError> {
    if self.block_interval.is_zero() || self.max_block_size == 0 {
      return Err(ContractError::InvalidArgument {
        name: "config",
        reason: "block interval and block size must be positive".into(),
      });
    }
    Ok(())
  }
}

/// Reads the chain configuration from the state.
pub fn read_config(
  state: &(impl ReadOnlyState + ?Sized),
) -> Result<ChainConfig, ContractError> {
  let entry = state
    .get(&InstanceId::zero())
    .ok_or(ContractError::NotFound(InstanceId::zero()))?;
  ChainConfig::from_bytes(&entry.value)
}

/// Holds the chain configuration and bootstraps the genesis darc.
///
/// Spawning it is the one instruction of a genesis block. It takes
/// a `darc` argument with the genesis darc and a `config` argument
/// with the encoded [`ChainConfig`]. Afterwards the configuration
/// can be changed with the `update_config` command.
pub struct ConfigContract;

impl Contract for ConfigContract {
  fn name(&self) -> &'static str {
    CONFIG_CONTRACT
  }

  fn spawn(
    &self,
    state: &dyn ReadOnlyState,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ContractError> {
    let zero = InstanceId::zero();
    if state.get(&zero).is_some() {
      return Err(ContractError::AlreadyExists(zero));
    }

    let darc = Darc::from_bytes(required(instruction, "darc")?)?;
    darc.verify_genesis()?;
    let config_bytes = required(instruction, "config")?;
    ChainConfig::from_bytes(config_bytes)?;

    let darc_id = darc.instance_id();
    Ok((
      vec![
        StateChange::create(darc_id, DARC_CONTRACT, darc.to_bytes(), darc_id),
        StateChange::create(zero, CONFIG_CONTRACT, config_bytes.to_vec(), darc_id),
      ],
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
    if command != "update_config" {
      return Err(ContractError::UnknownCommand(command.clone()));
    }

    let current = state.get_entry(&instruction.instance_id).map_err(|_| {
      ContractError::NotFound(instruction.instance_id)
    })?;
    let config_bytes = required(instruction, "config")?;
    ChainConfig::from_bytes(config_bytes)?;

    Ok((
      vec![StateChange::update(
        instruction.instance_id,
        CONFIG_CONTRACT,
        config_bytes.to_vec(),
        current.darc_id,
      )],
      coins,
    ))
  }
}
