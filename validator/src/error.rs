use {
  crate::{chain::ChainError, storage},
  thiserror::Error,
  trellis_primitives::{InstanceId, NodeId, TxError},
  trellis_vm::{
    ContractError,
    CounterError,
    ExecutionError,
    ProofError,
    StateError,
    VerifyError,
  },
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("Request version {got} does not match node version {expected}")]
  VersionMismatch { expected: u32, got: u32 },

  #[error("Unknown chain {0}")]
  UnknownChain(String),

  #[error("Unknown block {0}")]
  UnknownBlock(String),

  #[error("Malformed transaction: {0}")]
  Malformed(#[from] TxError),

  #[error("Roster must not be empty")]
  EmptyRoster,

  #[error("{0} is not a member of the roster")]
  NotInRoster(NodeId),

  #[error("Invalid chain configuration: {0}")]
  InvalidConfig(#[from] ContractError),

  #[error("Execution error: {0}")]
  Execution(#[from] ExecutionError),

  #[error("Block verification failed: {0}")]
  Verify(#[from] VerifyError),

  #[error("State error: {0}")]
  State(#[from] StateError),

  #[error("Replay guard: {0}")]
  Counter(#[from] CounterError),

  #[error("Instance {0} not found")]
  InstanceNotFound(InstanceId),

  #[error("Consensus layer error: {0}")]
  Chain(#[from] ChainError),

  #[error("Storage error: {0}")]
  Storage(#[from] storage::Error),

  #[error("Invalid proof: {0}")]
  Proof(#[from] ProofError),

  #[error("Proof is for chain {got}, expected {expected}")]
  WrongChain { expected: String, got: String },

  #[error("Restored state of chain {chain} does not match block {block}")]
  CorruptState { chain: String, block: String },

  #[error("Chain {chain} diverged at block {block}: {reason}")]
  Diverged {
    chain: String,
    block: String,
    reason: String,
  },

  #[error("Node is shutting down")]
  ShuttingDown,
}
