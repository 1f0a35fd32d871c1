use {
  crate::{canonical, sha3, Hash, Identity, InstanceId},
  serde::{Deserialize, Serialize},
  std::fmt::Debug,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
  pub name: String,
  pub value: Vec<u8>,
}

/// Ordered list of named byte arguments passed to a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
    self.0.push(Argument {
      name: name.into(),
      value: value.into(),
    });
    self
  }

  /// Value of the first argument with the given name.
  pub fn search(&self, name: &str) -> Option<&[u8]> {
    self
      .0
      .iter()
      .find(|arg| arg.name == name)
      .map(|arg| arg.value.as_slice())
  }

  /// Name of the first argument that appears more than once.
  pub fn first_duplicate(&self) -> Option<&str> {
    self.0.iter().enumerate().find_map(|(i, arg)| {
      self.0[..i]
        .iter()
        .any(|prev| prev.name == arg.name)
        .then_some(arg.name.as_str())
    })
  }

  pub fn iter(&self) -> impl Iterator<Item = &Argument> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<N: Into<String>, V: Into<Vec<u8>>> FromIterator<(N, V)> for Arguments {
  fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
    iter
      .into_iter()
      .fold(Arguments::new(), |args, (n, v)| args.with(n, v))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
  /// Creates a new instance of `contract_id`.
  Spawn {
    contract_id: String,
    args: Arguments,
  },

  /// Runs `command` on an existing instance.
  Invoke {
    contract_id: String,
    command: String,
    args: Arguments,
  },

  /// Removes an existing instance.
  Delete { contract_id: String },
}

impl Operation {
  pub fn contract_id(&self) -> &str {
    match self {
      Operation::Spawn { contract_id, .. }
      | Operation::Invoke { contract_id, .. }
      | Operation::Delete { contract_id } => contract_id,
    }
  }

  pub fn args(&self) -> Option<&Arguments> {
    match self {
      Operation::Spawn { args, .. } | Operation::Invoke { args, .. } => {
        Some(args)
      }
      Operation::Delete { .. } => None,
    }
  }
}

/// One signed operation on exactly one instance.
///
/// For a spawn the instance id is the instance whose darc
/// authorizes the spawn. For invoke and delete it is the
/// instance being operated on.
///
/// `signer_identities`, `signer_counters` and `signatures` are
/// parallel lists: the n-th identity signs with the n-th
/// signature and presents the n-th counter.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
  pub instance_id: InstanceId,
  pub operation: Operation,
  pub signer_identities: Vec<Identity>,
  pub signer_counters: Vec<u64>,
  pub signatures: Vec<Vec<u8>>,
}

impl Instruction {
  pub fn new(instance_id: InstanceId, operation: Operation) -> Self {
    Self {
      instance_id,
      operation,
      signer_identities: vec![],
      signer_counters: vec![],
      signatures: vec![],
    }
  }

  pub fn spawn(
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    args: Arguments,
  ) -> Self {
    Self::new(instance_id, Operation::Spawn {
      contract_id: contract_id.into(),
      args,
    })
  }

  pub fn invoke(
    instance_id: InstanceId,
    contract_id: impl Into<String>,
    command: impl Into<String>,
    args: Arguments,
  ) -> Self {
    Self::new(instance_id, Operation::Invoke {
      contract_id: contract_id.into(),
      command: command.into(),
      args,
    })
  }

  pub fn delete(instance_id: InstanceId, contract_id: impl Into<String>) -> Self {
    Self::new(instance_id, Operation::Delete {
      contract_id: contract_id.into(),
    })
  }

  /// Declares who signs this instruction and which counter value
  /// each signer presents. Clears any existing signatures.
  pub fn with_signers(
    mut self,
    signers: impl IntoIterator<Item = (Identity, u64)>,
  ) -> Self {
    let (identities, counters) = signers.into_iter().unzip();
    self.signer_identities = identities;
    self.signer_counters = counters;
    self.signatures = vec![];
    self
  }

  pub fn contract_id(&self) -> &str {
    self.operation.contract_id()
  }

  pub fn args(&self) -> Option<&Arguments> {
    self.operation.args()
  }

  /// The action string darc rules are looked up by.
  pub fn action(&self) -> String {
    match &self.operation {
      Operation::Spawn { contract_id, .. } => format!("spawn:{contract_id}"),
      Operation::Invoke {
        contract_id,
        command,
        ..
      } => format!("invoke:{contract_id}.{command}"),
      Operation::Delete { contract_id } => format!("delete:{contract_id}"),
    }
  }

  /// Hash of the instruction without its signatures.
  pub fn hash(&self) -> Hash {
    let bytes = canonical(&(
      &self.instance_id,
      &self.operation,
      &self.signer_identities,
      &self.signer_counters,
    ));
    sha3(&[&bytes[..]])
  }

  /// Deterministic id for an instance created by this instruction.
  ///
  /// Contracts that spawn several instances from one instruction
  /// tell them apart with `what`.
  pub fn derive_id(&self, what: &str) -> InstanceId {
    InstanceId::from(self.hash()).derive(&[what.as_bytes()])
  }
}

impl Debug for Instruction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Instruction")
      .field("instance_id", &self.instance_id)
      .field("action", &self.action())
      .field("args", &self.args())
      .field("signers", &self.signer_identities)
      .field("counters", &self.signer_counters)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Arguments, Instruction},
    crate::{Identity, InstanceId},
  };

  #[test]
  fn action_strings() {
    let id = InstanceId::zero();
    let spawn = Instruction::spawn(id, "value", Arguments::new());
    let invoke = Instruction::invoke(id, "value", "update", Arguments::new());
    let delete = Instruction::delete(id, "value");

    assert_eq!(spawn.action(), "spawn:value");
    assert_eq!(invoke.action(), "invoke:value.update");
    assert_eq!(delete.action(), "delete:value");
  }

  #[test]
  fn arguments_search_and_duplicates() {
    let args = Arguments::new().with("a", b"1".to_vec()).with("b", b"2".to_vec());
    assert_eq!(args.search("b"), Some(&b"2"[..]));
    assert_eq!(args.search("c"), None);
    assert_eq!(args.first_duplicate(), None);

    let dup = args.with("a", b"3".to_vec());
    assert_eq!(dup.first_duplicate(), Some("a"));
  }

  #[test]
  fn hash_ignores_signatures() {
    let signer = Identity::Ed25519([1; 32]);
    let mut instruction =
      Instruction::spawn(InstanceId::zero(), "value", Arguments::new())
        .with_signers([(signer, 1)]);
    let before = instruction.hash();
    let derived = instruction.derive_id("");

    instruction.signatures = vec![vec![1, 2, 3]];
    assert_eq!(before, instruction.hash());
    assert_eq!(derived, instruction.derive_id(""));
    assert_ne!(derived, instruction.derive_id("other"));

    instruction.signer_counters = vec![2];
    assert_ne!(before, instruction.hash());
  }
}
