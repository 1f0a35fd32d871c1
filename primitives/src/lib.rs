mod b58;
mod block;
mod coin;
mod darc;
mod hash;
mod identity;
mod instance;
mod instruction;
mod roster;
mod state_change;
mod transaction;

pub use {
  b58::ToBase58String,
  block::{Block, BlockId, DataBody, DataHeader},
  coin::{Coin, CoinError},
  darc::{Darc, DarcError, Expr, Rules},
  hash::{canonical, sha3, Hash},
  identity::{Identity, IdentityError, Signer},
  instance::{Error as InstanceIdError, InstanceId},
  instruction::{Argument, Arguments, Instruction, Operation},
  roster::{NodeId, Roster},
  state_change::{Entry, StateAction, StateChange},
  transaction::{ClientTransaction, TxError, TxResult},
};

/// Protocol version carried by every client request.
///
/// Nodes reject requests created for a different version
/// before looking at their contents.
pub const CURRENT_VERSION: u32 = 1;
