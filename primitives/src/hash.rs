use {
  multihash::{Hasher, Sha3_256},
  serde::Serialize,
};

/// Raw SHA3-256 digest.
///
/// Used for trie nodes, darc ids, transaction hashes and
/// everything else that is not a block id.
pub type Hash = [u8; 32];

/// Hashes all parts in order as one continuous input.
pub fn sha3(parts: &[&[u8]]) -> Hash {
  let mut hasher = Sha3_256::default();
  for part in parts {
    hasher.update(part);
  }
  let mut output = [0u8; 32];
  output.copy_from_slice(hasher.finalize());
  output
}

/// Deterministic msgpack encoding of a value.
///
/// All hash inputs and all persisted values go through this
/// function, so two nodes always agree on the bytes of the
/// same logical value.
pub fn canonical<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
  rmp_serde::to_vec(value).expect("msgpack encoding of in-memory data")
}
