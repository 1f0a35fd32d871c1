use {
  ed25519_dalek::{
    Keypair,
    PublicKey,
    Signature,
    Signer as _,
    Verifier as _,
  },
  serde::{Deserialize, Serialize},
  std::fmt::{Debug, Display},
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("Malformed ed25519 public key in identity {0}")]
  PublicKey(Identity),

  #[error("Malformed signature from {0}")]
  Signature(Identity),

  #[error("Signature from {0} does not verify")]
  Invalid(Identity),
}

/// The identity of a transaction signer.
///
/// Identities appear in darc rule expressions and in instructions,
/// and they key the replay counters stored in the trie.
#[derive(
  Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Identity {
  Ed25519([u8; 32]),
}

impl Identity {
  /// Checks that `signature` is a valid signature of `message`
  /// made by the private key behind this identity.
  pub fn verify(
    &self,
    message: &[u8],
    signature: &[u8],
  ) -> Result<(), IdentityError> {
    match self {
      Identity::Ed25519(bytes) => {
        let key = PublicKey::from_bytes(bytes)
          .map_err(|_| IdentityError::PublicKey(*self))?;
        let signature = Signature::try_from(signature)
          .map_err(|_| IdentityError::Signature(*self))?;
        key
          .verify(message, &signature)
          .map_err(|_| IdentityError::Invalid(*self))
      }
    }
  }
}

impl From<PublicKey> for Identity {
  fn from(key: PublicKey) -> Self {
    Identity::Ed25519(key.to_bytes())
  }
}

impl Display for Identity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Identity::Ed25519(bytes) => {
        write!(f, "ed25519:{}", bs58::encode(bytes).into_string())
      }
    }
  }
}

impl Debug for Identity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

/// Holds a private key and signs transactions on behalf of
/// its [`Identity`].
pub struct Signer {
  keypair: Keypair,
}

impl Signer {
  pub fn new(keypair: Keypair) -> Self {
    Self { keypair }
  }

  pub fn identity(&self) -> Identity {
    self.keypair.public.into()
  }

  pub fn sign(&self, message: &[u8]) -> Vec<u8> {
    self.keypair.sign(message).to_bytes().to_vec()
  }
}

impl From<Keypair> for Signer {
  fn from(keypair: Keypair) -> Self {
    Self::new(keypair)
  }
}

impl Debug for Signer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Signer")
      .field("identity", &self.identity())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use {super::Signer, ed25519_dalek::Keypair};

  #[test]
  fn sign_and_verify() {
    let signer = Signer::new(Keypair::generate(&mut rand::thread_rng()));
    let other = Signer::new(Keypair::generate(&mut rand::thread_rng()));
    let signature = signer.sign(b"message");

    assert!(signer.identity().verify(b"message", &signature).is_ok());
    assert!(signer.identity().verify(b"other", &signature).is_err());
    assert!(other.identity().verify(b"message", &signature).is_err());
    assert!(signer.identity().verify(b"message", &[1, 2, 3]).is_err());
  }
}
