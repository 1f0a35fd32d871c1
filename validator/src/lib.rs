//! A permissioned ledger node.
//!
//! Each chain is maintained by a fixed roster of nodes. The first
//! node of the roster leads: every block interval it collects
//! pending transactions from the roster, executes them and proposes
//! the resulting block to the consensus layer. The other nodes
//! verify proposed blocks by re-executing them and apply confirmed
//! blocks when the leader announces them.

mod api;
mod chain;
mod cluster;
mod error;
mod service;
mod storage;
mod worker;

pub use {
  api::{
    AddTransactionRequest,
    AddTransactionResponse,
    CreateGenesisRequest,
    CreateGenesisResponse,
    GetProofRequest,
    GetProofResponse,
  },
  chain::{threshold, BlockVerifier, ChainError, ChainLayer, MemoryChain},
  cluster::{attach, LocalCluster},
  error::Error,
  service::{BuildOutcome, Service},
  storage::{Error as StorageError, Storage, StoredChain},
};
