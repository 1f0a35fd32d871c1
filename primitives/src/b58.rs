pub trait ToBase58String {
  fn to_b58(&self) -> String;

  /// First few characters of the base58 form, enough to tell
  /// blocks and chains apart in log lines.
  fn to_b58_short(&self) -> String {
    self.to_b58().chars().take(8).collect()
  }
}

impl<const S: usize> ToBase58String for multihash::MultihashGeneric<S> {
  fn to_b58(&self) -> String {
    bs58::encode(self.to_bytes()).into_string()
  }
}

impl ToBase58String for &[u8] {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}

impl<const N: usize> ToBase58String for [u8; N] {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}

impl ToBase58String for Vec<u8> {
  fn to_b58(&self) -> String {
    bs58::encode(self).into_string()
  }
}
