use {
  crate::InstanceId,
  serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateAction {
  Create,
  Update,
  Remove,
}

/// One mutation of the ledger state produced by a contract.
///
/// State changes are the only way the trie is ever modified.
/// They are recorded in the block body, so followers can tell
/// what happened to every instance without re-reading the trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
  pub action: StateAction,
  pub instance_id: InstanceId,
  pub contract_id: String,
  pub value: Vec<u8>,
  pub darc_id: InstanceId,
}

impl StateChange {
  pub fn new(
    action: StateAction,
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    value: Vec<u8>,
    darc_id: InstanceId,
  ) -> Self {
    Self {
      action,
      instance_id,
      contract_id: contract_id.into(),
      value,
      darc_id,
    }
  }

  pub fn create(
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    value: Vec<u8>,
    darc_id: InstanceId,
  ) -> Self {
    Self::new(StateAction::Create, instance_id, contract_id, value, darc_id)
  }

  pub fn update(
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    value: Vec<u8>,
    darc_id: InstanceId,
  ) -> Self {
    Self::new(StateAction::Update, instance_id, contract_id, value, darc_id)
  }

  pub fn remove(
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    darc_id: InstanceId,
  ) -> Self {
    Self::new(StateAction::Remove, instance_id, contract_id, vec![], darc_id)
  }
}

/// What the state keeps under every instance id.
///
/// `version` is zero when the instance is created and grows by
/// one with every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub value: Vec<u8>,
  pub contract_id: String,
  pub darc_id: InstanceId,
  pub version: u64,
}
