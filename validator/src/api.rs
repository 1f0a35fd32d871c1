//! Requests and responses of the client facing service calls.
//!
//! Every message carries the protocol version it was created for,
//! requests for another version are refused before anything else
//! is looked at.

use {
  crate::Error,
  serde::{Deserialize, Serialize},
  std::time::Duration,
  trellis_primitives::{
    Block,
    BlockId,
    ClientTransaction,
    Darc,
    InstanceId,
    Roster,
    ToBase58String,
    CURRENT_VERSION,
  },
  trellis_vm::{ChainConfig, Presence, Proof},
};

pub(crate) fn check_version(version: u32) -> Result<(), Error> {
  match version {
    CURRENT_VERSION => Ok(()),
    got => Err(Error::VersionMismatch {
      expected: CURRENT_VERSION,
      got,
    }),
  }
}

/// Creates a new chain governed by `darc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGenesisRequest {
  pub version: u32,

  /// Nodes maintaining the chain, the first one leads it.
  pub roster: Roster,

  /// Policy of the chain, stored in its genesis block.
  pub darc: Darc,

  pub block_interval: Duration,
  pub max_block_size: usize,
}

impl CreateGenesisRequest {
  pub fn new(roster: Roster, darc: Darc, config: ChainConfig) -> Self {
    Self {
      version: CURRENT_VERSION,
      roster,
      darc,
      block_interval: config.block_interval,
      max_block_size: config.max_block_size,
    }
  }

  pub fn config(&self) -> ChainConfig {
    ChainConfig {
      block_interval: self.block_interval,
      max_block_size: self.max_block_size,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGenesisResponse {
  pub version: u32,
  pub block: Block,
}

/// Queues a transaction for inclusion in a future block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTransactionRequest {
  pub version: u32,
  pub chain_id: BlockId,
  pub transaction: ClientTransaction,
}

impl AddTransactionRequest {
  pub fn new(chain_id: BlockId, transaction: ClientTransaction) -> Self {
    Self {
      version: CURRENT_VERSION,
      chain_id,
      transaction,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTransactionResponse {
  pub version: u32,
}

/// Asks for a proof of presence or absence of `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProofRequest {
  pub version: u32,
  pub chain_id: BlockId,
  pub key: InstanceId,
}

impl GetProofRequest {
  pub fn new(chain_id: BlockId, key: InstanceId) -> Self {
    Self {
      version: CURRENT_VERSION,
      chain_id,
      key,
    }
  }
}

/// A proof together with the block whose state it was taken from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProofResponse {
  pub version: u32,
  pub proof: Proof,
  pub latest: Block,
}

impl GetProofResponse {
  /// Checks the proof for `key` against the trie root of the
  /// returned block, which must belong to `chain_id`.
  pub fn verify(
    &self,
    chain_id: &BlockId,
    key: &InstanceId,
  ) -> Result<Presence, Error> {
    check_version(self.version)?;
    if self.latest.chain_id() != *chain_id {
      return Err(Error::WrongChain {
        expected: chain_id.to_b58(),
        got: self.latest.chain_id().to_b58(),
      });
    }
    Ok(self.proof.verify(&self.latest.header.trie_root, key)?)
  }
}
