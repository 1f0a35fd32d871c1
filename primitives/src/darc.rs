use {
  crate::{b58::ToBase58String, canonical, sha3, Hash, Identity, InstanceId},
  serde::{Deserialize, Serialize},
  std::{collections::BTreeMap, fmt::Debug},
  thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DarcError {
  #[error("A darc must carry at least one rule")]
  EmptyRules,

  #[error("Rule for action '{0}' already exists")]
  RuleExists(String),

  #[error("No rule for action '{0}'")]
  RuleMissing(String),

  #[error("A genesis darc must be version 0 without base or previous id")]
  NotGenesis,

  #[error("Expected darc version {expected}, got {got}")]
  Version { expected: u64, got: u64 },

  #[error("Evolved darc does not keep the base id of its predecessor")]
  BaseMismatch,

  #[error("Evolved darc does not point at its predecessor")]
  PrevMismatch,

  #[error("Malformed darc encoding: {0}")]
  Decode(String),
}

/// Boolean expression over signer identities.
///
/// An expression is satisfied when the set of identities
/// that validly signed an instruction makes it true.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
  Id(Identity),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
}

impl Expr {
  pub fn and(self, other: Expr) -> Self {
    Expr::And(Box::new(self), Box::new(other))
  }

  pub fn or(self, other: Expr) -> Self {
    Expr::Or(Box::new(self), Box::new(other))
  }

  /// Satisfied if any of the identities signed.
  pub fn any_of(ids: impl IntoIterator<Item = Identity>) -> Option<Self> {
    ids.into_iter().map(Expr::Id).reduce(Expr::or)
  }

  /// Satisfied only if all of the identities signed.
  pub fn all_of(ids: impl IntoIterator<Item = Identity>) -> Option<Self> {
    ids.into_iter().map(Expr::Id).reduce(Expr::and)
  }

  pub fn evaluate<F>(&self, signed: &F) -> bool
  where
    F: Fn(&Identity) -> bool,
  {
    match self {
      Expr::Id(id) => signed(id),
      Expr::And(l, r) => l.evaluate(signed) && r.evaluate(signed),
      Expr::Or(l, r) => l.evaluate(signed) || r.evaluate(signed),
    }
  }

  /// Visits every identity mentioned by the expression.
  pub fn for_each<F>(&self, op: &mut F)
  where
    F: FnMut(&Identity),
  {
    match self {
      Expr::Id(id) => op(id),
      Expr::And(l, r) | Expr::Or(l, r) => {
        l.for_each(op);
        r.for_each(op);
      }
    }
  }
}

impl From<Identity> for Expr {
  fn from(id: Identity) -> Self {
    Expr::Id(id)
  }
}

/// Action string to expression mapping of a darc.
///
/// Actions are `spawn:<contract>`, `invoke:<contract>.<command>`
/// and `delete:<contract>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules(BTreeMap<String, Expr>);

impl Rules {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder form of [`Rules::set`].
  pub fn with(mut self, action: impl Into<String>, expr: Expr) -> Self {
    self.set(action, expr);
    self
  }

  pub fn add(
    &mut self,
    action: impl Into<String>,
    expr: Expr,
  ) -> Result<(), DarcError> {
    let action = action.into();
    if self.0.contains_key(&action) {
      return Err(DarcError::RuleExists(action));
    }
    self.0.insert(action, expr);
    Ok(())
  }

  pub fn update(
    &mut self,
    action: impl Into<String>,
    expr: Expr,
  ) -> Result<(), DarcError> {
    let action = action.into();
    match self.0.get_mut(&action) {
      Some(existing) => {
        *existing = expr;
        Ok(())
      }
      None => Err(DarcError::RuleMissing(action)),
    }
  }

  pub fn set(&mut self, action: impl Into<String>, expr: Expr) {
    self.0.insert(action.into(), expr);
  }

  pub fn remove(&mut self, action: &str) -> Option<Expr> {
    self.0.remove(action)
  }

  pub fn get(&self, action: &str) -> Option<&Expr> {
    self.0.get(action)
  }

  pub fn contains(&self, action: &str) -> bool {
    self.0.contains_key(action)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Expr)> {
    self.0.iter()
  }
}

/// Distributed access right control.
///
/// A darc is never changed in place. Changing the rules of a darc
/// creates a new version through [`Darc::evolve`] that references
/// its predecessor by id and keeps the base id of the first
/// version. The base id is stable across the whole evolution chain
/// and is used as the instance id the darc is stored under.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darc {
  pub version: u64,
  pub description: Vec<u8>,
  pub base_id: Option<Hash>,
  pub prev_id: Option<Hash>,
  pub rules: Rules,
}

impl Darc {
  pub fn new(rules: Rules, description: impl Into<Vec<u8>>) -> Self {
    Self {
      version: 0,
      description: description.into(),
      base_id: None,
      prev_id: None,
      rules,
    }
  }

  /// Content hash of this darc version.
  pub fn id(&self) -> Hash {
    sha3(&[&canonical(self)[..]])
  }

  /// Id of the first version of this darc.
  pub fn base_id(&self) -> Hash {
    self.base_id.unwrap_or_else(|| self.id())
  }

  pub fn instance_id(&self) -> InstanceId {
    InstanceId::from(self.base_id())
  }

  /// Creates the next version of this darc with a new rule set.
  pub fn evolve(&self, rules: Rules) -> Darc {
    Darc {
      version: self.version + 1,
      description: self.description.clone(),
      base_id: Some(self.base_id()),
      prev_id: Some(self.id()),
      rules,
    }
  }

  pub fn verify_genesis(&self) -> Result<(), DarcError> {
    if self.version != 0 || self.base_id.is_some() || self.prev_id.is_some() {
      return Err(DarcError::NotGenesis);
    }
    if self.rules.is_empty() {
      return Err(DarcError::EmptyRules);
    }
    Ok(())
  }

  /// Checks that `self` is a valid successor of `previous`.
  pub fn verify_evolution(&self, previous: &Darc) -> Result<(), DarcError> {
    if self.version != previous.version + 1 {
      return Err(DarcError::Version {
        expected: previous.version + 1,
        got: self.version,
      });
    }
    if self.base_id != Some(previous.base_id()) {
      return Err(DarcError::BaseMismatch);
    }
    if self.prev_id != Some(previous.id()) {
      return Err(DarcError::PrevMismatch);
    }
    if self.rules.is_empty() {
      return Err(DarcError::EmptyRules);
    }
    Ok(())
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    canonical(self)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, DarcError> {
    rmp_serde::from_slice(bytes).map_err(|e| DarcError::Decode(e.to_string()))
  }
}

impl Debug for Darc {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Darc")
      .field("id", &self.id().to_b58())
      .field("base_id", &self.base_id().to_b58())
      .field("version", &self.version)
      .field("description", &String::from_utf8_lossy(&self.description))
      .field("rules", &self.rules)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Darc, DarcError, Expr, Rules},
    crate::Identity,
  };

  fn id(byte: u8) -> Identity {
    Identity::Ed25519([byte; 32])
  }

  #[test]
  fn expression_evaluation() {
    let expr = Expr::Id(id(1)).and(Expr::Id(id(2)).or(Expr::Id(id(3))));

    assert!(expr.evaluate(&|i| *i == id(1) || *i == id(2)));
    assert!(expr.evaluate(&|i| *i == id(1) || *i == id(3)));
    assert!(!expr.evaluate(&|i| *i == id(1)));
    assert!(!expr.evaluate(&|i| *i == id(2) || *i == id(3)));

    let mut seen = vec![];
    expr.for_each(&mut |i| seen.push(*i));
    assert_eq!(seen, vec![id(1), id(2), id(3)]);
  }

  #[test]
  fn any_and_all_of() {
    let any = Expr::any_of([id(1), id(2)]).unwrap();
    let all = Expr::all_of([id(1), id(2)]).unwrap();
    assert!(any.evaluate(&|i| *i == id(2)));
    assert!(!all.evaluate(&|i| *i == id(2)));
    assert!(Expr::any_of([]).is_none());
  }

  #[test]
  fn rules_add_and_update() {
    let mut rules = Rules::new();
    rules.add("spawn:value", id(1).into()).unwrap();
    assert_eq!(
      rules.add("spawn:value", id(2).into()),
      Err(DarcError::RuleExists("spawn:value".into()))
    );
    rules.update("spawn:value", id(2).into()).unwrap();
    assert_eq!(rules.get("spawn:value"), Some(&Expr::Id(id(2))));
    assert_eq!(
      rules.update("delete:value", id(2).into()),
      Err(DarcError::RuleMissing("delete:value".into()))
    );
  }

  #[test]
  fn evolution_chain() {
    let genesis = Darc::new(
      Rules::new().with("invoke:darc.evolve", id(1).into()),
      "owner",
    );
    assert!(genesis.verify_genesis().is_ok());
    assert_eq!(genesis.base_id(), genesis.id());

    let v1 = genesis.evolve(
      Rules::new()
        .with("invoke:darc.evolve", id(1).into())
        .with("spawn:value", id(2).into()),
    );
    assert_eq!(v1.version, 1);
    assert_eq!(v1.base_id(), genesis.id());
    assert_eq!(v1.instance_id(), genesis.instance_id());
    assert!(v1.verify_evolution(&genesis).is_ok());
    assert_eq!(v1.verify_genesis(), Err(DarcError::NotGenesis));

    let v2 = v1.evolve(v1.rules.clone());
    assert!(v2.verify_evolution(&v1).is_ok());
    assert_eq!(
      v2.verify_evolution(&genesis),
      Err(DarcError::Version {
        expected: 1,
        got: 2
      })
    );

    let mut forged = v1.evolve(v1.rules.clone());
    forged.prev_id = Some(genesis.id());
    assert_eq!(forged.verify_evolution(&v1), Err(DarcError::PrevMismatch));
  }

  #[test]
  fn bytes_roundtrip() {
    let darc = Darc::new(Rules::new().with("spawn:value", id(1).into()), "d");
    let decoded = Darc::from_bytes(&darc.to_bytes()).unwrap();
    assert_eq!(darc, decoded);
    assert_eq!(darc.id(), decoded.id());
    assert!(Darc::from_bytes(&[0xc1]).is_err());
  }
}
