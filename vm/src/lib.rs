mod auth;
mod contracts;
mod counters;
mod execution;
mod proof;
mod state;
mod trie;

pub use {
  auth::{authorize, check_instruction, policy_of, resolve_darc, AuthError},
  contracts::{
    read_config,
    ChainConfig,
    ConfigContract,
    Contract,
    ContractError,
    DarcContract,
    Output,
    Registry,
    ValueContract,
    CONFIG_CONTRACT,
    DARC_CONTRACT,
    VALUE_CONTRACT,
  },
  counters::{
    counter_id,
    get_counter,
    increment_counters,
    verify_counters,
    CounterError,
    COUNTER_CONTRACT,
  },
  execution::{
    genesis_transaction,
    ExecutionError,
    Executor,
    Proposal,
    VerifyError,
  },
  proof::{Presence, Proof, ProofEnd, ProofError},
  state::{ReadOnlyState, StateError, StateTrie},
  trie::{Iter, Trie, TrieError},
};
