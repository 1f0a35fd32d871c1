use {
  crate::{sha3, Hash},
  serde::{Deserialize, Serialize},
  std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
  },
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid base58 instance id: {0}")]
  Base58(#[from] bs58::decode::Error),

  #[error("Instance ids are 32 bytes long, got {0}")]
  Length(usize),
}

/// Identifies one object in the ledger state.
///
/// Every value stored in the authenticated trie lives under an
/// instance id: darcs, contract instances, the chain configuration
/// and the replay counters of signers.
///
/// New instances get ids that are derived from the instruction that
/// spawned them, so that every node computes the same id for the
/// same spawn without coordination:
///
///   - a darc lives under its base id,
///   - a value instance lives under `instruction.derive_id("")`,
///   - the chain configuration lives under [`InstanceId::zero`].
#[derive(
  Copy,
  Clone,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct InstanceId([u8; 32]);

impl InstanceId {
  pub const fn new(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  /// The instance holding the chain configuration.
  pub const fn zero() -> Self {
    Self([0u8; 32])
  }

  /// Given a list of seeds this method will generate a new
  /// id that is related to the current one.
  ///
  /// The same set of seeds will always return the same
  /// derived id.
  pub fn derive(&self, seeds: &[&[u8]]) -> Self {
    let mut parts = Vec::with_capacity(seeds.len() + 1);
    parts.push(&self.0[..]);
    parts.extend_from_slice(seeds);
    Self(sha3(&parts))
  }

  pub fn to_bytes(self) -> [u8; 32] {
    self.0
  }
}

impl From<Hash> for InstanceId {
  fn from(value: Hash) -> Self {
    Self(value)
  }
}

impl AsRef<[u8]> for InstanceId {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl Deref for InstanceId {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Display for InstanceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", bs58::encode(self.0).into_string())
  }
}

impl Debug for InstanceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "instance({})", bs58::encode(self.0).into_string())
  }
}

impl FromStr for InstanceId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let decoded = bs58::decode(s).into_vec()?;
    let bytes: [u8; 32] = decoded
      .as_slice()
      .try_into()
      .map_err(|_| Error::Length(decoded.len()))?;
    Ok(Self(bytes))
  }
}

impl TryFrom<&str> for InstanceId {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    FromStr::from_str(value)
  }
}
