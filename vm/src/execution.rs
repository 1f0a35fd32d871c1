use {
  crate::{
    auth::{check_instruction, AuthError},
    contracts::{ChainConfig, ContractError, Output, Registry, CONFIG_CONTRACT},
    counters::{increment_counters, CounterError},
    state::{ReadOnlyState, StateError, StateTrie},
  },
  rayon::prelude::*,
  std::sync::Arc,
  thiserror::Error,
  tracing::{debug, warn},
  trellis_primitives::{
    Arguments,
    Block,
    ClientTransaction,
    Coin,
    DataBody,
    DataHeader,
    Darc,
    Hash,
    InstanceId,
    Instruction,
    Operation,
    StateChange,
    ToBase58String,
    TxError,
    TxResult,
  },
};

#[derive(Debug, Error, PartialEq)]
pub enum ExecutionError {
  #[error("Malformed transaction: {0}")]
  Malformed(#[from] TxError),

  #[error("Unauthorized: {0}")]
  Unauthorized(#[from] AuthError),

  #[error("Replay guard: {0}")]
  Counter(#[from] CounterError),

  #[error("Contract error: {0}")]
  Contract(#[from] ContractError),

  #[error("State error: {0}")]
  State(#[from] StateError),

  #[error("Instance {instance} belongs to '{stored}', not '{requested}'")]
  WrongContract {
    instance: InstanceId,
    stored: String,
    requested: String,
  },

  #[error("Genesis transaction must be a single config spawn")]
  MalformedGenesis,
}

#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
  #[error("Block body does not match its header")]
  BodyMismatch,

  #[error("Block uses trie nonce {got}, chain uses {expected}")]
  NonceMismatch { expected: String, got: String },

  #[error("Trie root mismatch: block has {expected}, execution gives {got}")]
  RootMismatch { expected: String, got: String },

  #[error("Transaction results differ from the ones in the block")]
  TransactionsMismatch,

  #[error("Invalid genesis block: {0}")]
  Genesis(#[from] ExecutionError),
}

/// Output of the deterministic part of building a block.
#[derive(Debug, Clone)]
pub struct Proposal {
  /// State after applying all valid transactions.
  pub state: StateTrie,
  pub header: DataHeader,
  pub body: DataBody,

  /// Transactions that failed authorization and were left out.
  pub dropped: usize,

  /// Authorized transactions that did not fit into the block.
  pub overflow: Vec<ClientTransaction>,
}

/// The transaction that bootstraps a chain.
pub fn genesis_transaction(darc: &Darc, config: &ChainConfig) -> ClientTransaction {
  ClientTransaction::new(vec![Instruction::spawn(
    InstanceId::zero(),
    CONFIG_CONTRACT,
    Arguments::new()
      .with("darc", darc.to_bytes())
      .with("config", config.to_bytes()),
  )])
}

/// Runs transactions against the ledger state.
///
/// Everything here is a pure function of its inputs, so every node
/// that runs the same transactions against the same state ends up
/// with the same trie root and the same transaction results.
#[derive(Debug, Clone)]
pub struct Executor {
  registry: Arc<Registry>,
}

impl Executor {
  pub fn new(registry: Registry) -> Self {
    Self {
      registry: Arc::new(registry),
    }
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  /// Runs one transaction on a copy of `state`.
  ///
  /// Every instruction is authorized against the copy as left by
  /// the instructions before it, its signer counters are bumped,
  /// then its contract runs. The first failure discards the copy.
  pub fn execute_transaction(
    &self,
    state: &StateTrie,
    tx: &ClientTransaction,
  ) -> Result<(StateTrie, Vec<StateChange>), ExecutionError> {
    tx.validate()?;
    let digest = tx.signing_hash();
    let mut scratch = state.clone();
    let mut changes = vec![];
    let mut coins = vec![];

    for instruction in &tx.instructions {
      check_instruction(&scratch, instruction, &digest)?;

      let counters =
        increment_counters(&scratch, &instruction.signer_identities)?;
      scratch.apply(&counters)?;
      changes.extend(counters);

      let (produced, remaining) = self.dispatch(&scratch, instruction, coins)?;
      scratch.apply(&produced)?;
      changes.extend(produced);
      coins = remaining;
    }

    Ok((scratch, changes))
  }

  /// Runs transactions in order, each one seeing the effects of the
  /// valid ones before it. Failing transactions keep their slot as
  /// invalid results without state changes.
  pub fn execute(
    &self,
    state: &StateTrie,
    txs: Vec<ClientTransaction>,
  ) -> (StateTrie, Vec<TxResult>) {
    let mut current = state.clone();
    let mut results = Vec::with_capacity(txs.len());
    for tx in txs {
      match self.execute_transaction(&current, &tx) {
        Ok((next, changes)) => {
          current = next;
          results.push(TxResult::valid(tx, changes));
        }
        Err(ExecutionError::Contract(ContractError::UnknownContract(kind))) => {
          warn!("transaction {} uses unknown contract '{kind}'", tx.hash().to_b58());
          results.push(TxResult::invalid(tx));
        }
        Err(e) => {
          debug!("transaction {} is invalid: {e}", tx.hash().to_b58());
          results.push(TxResult::invalid(tx));
        }
      }
    }
    (current, results)
  }

  /// Keeps transactions that pass authorization against `state`.
  ///
  /// Later instructions of a transaction may depend on the effects
  /// of earlier ones, so only the first instruction is checked
  /// against the state. Signatures and well-formedness are checked
  /// for all of them. Execution repeats every check.
  pub fn filter_authorized(
    &self,
    state: &StateTrie,
    txs: Vec<ClientTransaction>,
  ) -> (Vec<ClientTransaction>, usize) {
    let total = txs.len();
    let accepted: Vec<_> = txs
      .into_par_iter()
      .filter(|tx| match Self::precheck(state, tx) {
        Ok(()) => true,
        Err(e) => {
          debug!("dropping transaction {}: {e}", tx.hash().to_b58());
          false
        }
      })
      .collect();
    let dropped = total - accepted.len();
    (accepted, dropped)
  }

  fn precheck(
    state: &StateTrie,
    tx: &ClientTransaction,
  ) -> Result<(), ExecutionError> {
    tx.validate()?;
    let digest = tx.signing_hash();
    for instruction in &tx.instructions {
      for (id, sig) in instruction
        .signer_identities
        .iter()
        .zip(&instruction.signatures)
      {
        id.verify(&digest, sig).map_err(AuthError::from)?;
      }
    }
    if let Some(first) = tx.instructions.first() {
      check_instruction(state, first, &digest)?;
    }
    Ok(())
  }

  /// The deterministic part of the build step.
  ///
  /// Drops unauthorized transactions, orders the rest by hash,
  /// removes duplicates, cuts the list to `max_block_size` and
  /// executes it on top of `state`. What was cut off is returned
  /// as the overflow for a later block.
  pub fn propose(
    &self,
    state: &StateTrie,
    txs: Vec<ClientTransaction>,
    max_block_size: usize,
    timestamp: i64,
  ) -> Proposal {
    let (accepted, dropped) = self.filter_authorized(state, txs);
    let mut keyed: Vec<(Hash, ClientTransaction)> =
      accepted.into_iter().map(|tx| (tx.hash(), tx)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    let overflow = keyed
      .split_off(max_block_size.min(keyed.len()))
      .into_iter()
      .map(|(_, tx)| tx)
      .collect();

    let ordered = keyed.into_iter().map(|(_, tx)| tx).collect();
    let (state, results) = self.execute(state, ordered);
    let body = DataBody::new(results);
    let header = DataHeader {
      trie_root: state.root(),
      transactions_hash: body.transactions_hash(),
      timestamp,
    };

    Proposal {
      state,
      header,
      body,
      dropped,
      overflow,
    }
  }

  /// Creates the state and block contents of a new chain.
  ///
  /// The genesis transaction is not authorized, there is no
  /// darc yet that could authorize it.
  pub fn genesis(
    &self,
    nonce: Hash,
    darc: &Darc,
    config: &ChainConfig,
    timestamp: i64,
  ) -> Result<(StateTrie, DataHeader, DataBody), ExecutionError> {
    let tx = genesis_transaction(darc, config);
    let (state, changes) = self.bootstrap(nonce, &tx)?;
    let body = DataBody::new(vec![TxResult::valid(tx, changes)]);
    let header = DataHeader {
      trie_root: state.root(),
      transactions_hash: body.transactions_hash(),
      timestamp,
    };
    Ok((state, header, body))
  }

  fn bootstrap(
    &self,
    nonce: Hash,
    tx: &ClientTransaction,
  ) -> Result<(StateTrie, Vec<StateChange>), ExecutionError> {
    let [instruction] = tx.instructions.as_slice() else {
      return Err(ExecutionError::MalformedGenesis);
    };
    let is_config_spawn = matches!(
      &instruction.operation,
      Operation::Spawn { contract_id, .. } if contract_id == CONFIG_CONTRACT
    );
    if !is_config_spawn || instruction.instance_id != InstanceId::zero() {
      return Err(ExecutionError::MalformedGenesis);
    }

    let mut state = StateTrie::new(nonce);
    let (changes, _) = self.dispatch(&state, instruction, vec![])?;
    state.apply(&changes)?;
    Ok((state, changes))
  }

  /// Re-executes `block` on top of `state` and checks that it leads
  /// to the same root and the same transaction results.
  ///
  /// For a genesis block `state` is ignored. Returns the state after
  /// the block.
  pub fn verify(
    &self,
    state: &StateTrie,
    block: &Block,
  ) -> Result<StateTrie, VerifyError> {
    if block.body.transactions_hash() != block.header.transactions_hash {
      return Err(VerifyError::BodyMismatch);
    }

    let (next, body) = if block.is_genesis() {
      let tx = match block.body.tx_results.as_slice() {
        [only] => only.transaction.clone(),
        _ => return Err(ExecutionError::MalformedGenesis.into()),
      };
      let (next, changes) = self.bootstrap(block.trie_nonce, &tx)?;
      (next, DataBody::new(vec![TxResult::valid(tx, changes)]))
    } else {
      if block.trie_nonce != state.nonce() {
        return Err(VerifyError::NonceMismatch {
          expected: state.nonce().to_b58(),
          got: block.trie_nonce.to_b58(),
        });
      }
      let txs = block.body.transactions().cloned().collect();
      let (next, results) = self.execute(state, txs);
      (next, DataBody::new(results))
    };

    if next.root() != block.header.trie_root {
      return Err(VerifyError::RootMismatch {
        expected: block.header.trie_root.to_b58(),
        got: next.root().to_b58(),
      });
    }
    if body.transactions_hash() != block.header.transactions_hash {
      return Err(VerifyError::TransactionsMismatch);
    }
    Ok(next)
  }

  fn dispatch(
    &self,
    state: &StateTrie,
    instruction: &Instruction,
    coins: Vec<Coin>,
  ) -> Result<Output, ExecutionError> {
    if let Operation::Spawn { contract_id, .. } = &instruction.operation {
      let contract = self.registry.get(contract_id)?;
      return Ok(contract.spawn(state, instruction, coins)?);
    }

    let requested = instruction.contract_id();
    let entry = state.get_entry(&instruction.instance_id)?;
    if entry.contract_id != requested {
      return Err(ExecutionError::WrongContract {
        instance: instruction.instance_id,
        stored: entry.contract_id,
        requested: requested.into(),
      });
    }

    let contract = self.registry.get(&entry.contract_id)?;
    let output = match &instruction.operation {
      Operation::Delete { .. } => contract.delete(state, instruction, coins)?,
      _ => contract.invoke(state, instruction, coins)?,
    };
    Ok(output)
  }
}

impl Default for Executor {
  fn default() -> Self {
    Self::new(Registry::with_builtins())
  }
}
