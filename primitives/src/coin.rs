use {
  crate::InstanceId,
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoinError {
  #[error("Coin {0} would overflow")]
  Overflow(InstanceId),

  #[error("Coin {name} holds {have}, cannot take {want}")]
  Insufficient {
    name: InstanceId,
    have: u64,
    want: u64,
  },
}

/// A typed amount handed from one instruction to the next.
///
/// Contracts receive the coins left over by the previous
/// instruction of the same transaction and return the coins
/// they did not consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
  pub name: InstanceId,
  pub value: u64,
}

impl Coin {
  pub fn new(name: InstanceId, value: u64) -> Self {
    Self { name, value }
  }

  pub fn safe_add(&mut self, amount: u64) -> Result<(), CoinError> {
    self.value = self
      .value
      .checked_add(amount)
      .ok_or(CoinError::Overflow(self.name))?;
    Ok(())
  }

  pub fn safe_sub(&mut self, amount: u64) -> Result<(), CoinError> {
    self.value =
      self
        .value
        .checked_sub(amount)
        .ok_or(CoinError::Insufficient {
          name: self.name,
          have: self.value,
          want: amount,
        })?;
    Ok(())
  }
}
