use {
  std::{
    collections::{btree_map::Entry, BTreeMap, HashMap, HashSet},
    time::{Duration, Instant},
  },
  trellis_primitives::Hash,
};

/// Time-bucketed set of recently seen hashes.
///
/// Used to ignore transactions that are resubmitted to the same
/// node while they are still waiting for a block.
#[derive(Debug)]
pub struct History {
  lifespan: Duration,
  by_time: BTreeMap<Instant, HashSet<Hash>>,
  by_hash: HashMap<Hash, Instant>,
}

impl History {
  pub fn new(lifespan: Duration) -> Self {
    Self {
      lifespan,
      by_time: BTreeMap::new(),
      by_hash: HashMap::new(),
    }
  }

  /// Records `hash` and returns true if it was already seen
  /// within the lifespan. Expired entries are refreshed and
  /// reported as unseen.
  pub fn insert(&mut self, hash: Hash) -> bool {
    self.insert_at(hash, Instant::now())
  }

  fn insert_at(&mut self, hash: Hash, now: Instant) -> bool {
    if let Some(timestamp) = self.by_hash.get(&hash).copied() {
      if now.saturating_duration_since(timestamp) <= self.lifespan {
        return true;
      }

      // expired, move it to a fresh time bucket
      if let Some(bucket) = self.by_time.get_mut(&timestamp) {
        bucket.remove(&hash);
        if bucket.is_empty() {
          self.by_time.remove(&timestamp);
        }
      }
    }

    match self.by_time.entry(now) {
      Entry::Vacant(v) => {
        v.insert([hash].into_iter().collect());
      }
      Entry::Occupied(mut o) => {
        o.get_mut().insert(hash);
      }
    };
    self.by_hash.insert(hash, now);
    false
  }

  pub fn contains(&self, hash: &Hash) -> bool {
    self.by_hash.contains_key(hash)
  }

  pub fn len(&self) -> usize {
    self.by_hash.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_hash.is_empty()
  }

  /// Drops every entry older than the lifespan.
  pub fn prune(&mut self) {
    self.prune_at(Instant::now())
  }

  fn prune_at(&mut self, now: Instant) {
    let Some(cutoff) = now.checked_sub(self.lifespan) else {
      return;
    };
    let expired: Vec<Instant> =
      self.by_time.range(..cutoff).map(|(t, _)| *t).collect();
    for timestamp in expired {
      if let Some(hashes) = self.by_time.remove(&timestamp) {
        for hash in hashes {
          self.by_hash.remove(&hash);
        }
      }
    }
  }
}
