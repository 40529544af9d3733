use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource kinds known to the reconciler.
///
/// Each kind has its own probe shape and plan policy; see the `probe` and
/// `plan` modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
  Repository,
  SystemUpgrade,
  PackageSet,
  PackageSwap,
  AppRemote,
  AppSet,
  GroupMembership,
  Mount,
  SnapshotConfig,
  Snapshot,
  Hostname,
  Dotfile,
  ServiceState,
}

impl ResourceKind {
  pub const fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::Repository => "repository",
      ResourceKind::SystemUpgrade => "system-upgrade",
      ResourceKind::PackageSet => "package-set",
      ResourceKind::PackageSwap => "package-swap",
      ResourceKind::AppRemote => "app-remote",
      ResourceKind::AppSet => "app-set",
      ResourceKind::GroupMembership => "group-membership",
      ResourceKind::Mount => "mount",
      ResourceKind::SnapshotConfig => "snapshot-config",
      ResourceKind::Snapshot => "snapshot",
      ResourceKind::Hostname => "hostname",
      ResourceKind::Dotfile => "dotfile",
      ResourceKind::ServiceState => "service-state",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Unique key of a resource: kind plus a name unique within the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
  pub kind: ResourceKind,
  pub name: String,
}

impl ResourceId {
  pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
    Self { kind, name: name.into() }
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.kind, self.name)
  }
}

/// Whether a repository spec adds or removes the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoOp {
  #[default]
  Add,
  Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySpec {
  /// Repo file or release-package URL; absent for removals.
  #[serde(default)]
  pub url: Option<String>,

  #[serde(default)]
  pub op: RepoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSetSpec {
  pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSwapSpec {
  pub remove: String,
  pub install: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSpec {
  /// Device reference as it would appear in fstab (`/dev/...`, `UUID=...`,
  /// `LABEL=...`).
  pub device: String,
  pub path: String,
  pub fstype: String,
  #[serde(default = "default_mount_options")]
  pub options: String,
}

fn default_mount_options() -> String {
  "defaults".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfigSpec {
  /// Subvolume path the config covers.
  pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSpec {
  /// Snapshot config label to snapshot under.
  pub config: String,
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotfileSpec {
  /// Target path; may contain `${home}`-style placeholders.
  pub path: String,
  /// Full file content; may contain placeholders.
  pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTarget {
  Enabled,
  Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
  pub state: ServiceTarget,
}

/// Kind-specific parameters of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceParams {
  Repository(RepositorySpec),
  SystemUpgrade,
  PackageSet(PackageSetSpec),
  PackageSwap(PackageSwapSpec),
  AppRemote {
    url: String,
  },
  AppSet {
    apps: Vec<String>,
    /// Also prune unused runtimes after reconciling the set.
    #[serde(default)]
    prune: bool,
  },
  GroupMembership { group: String },
  Mount(MountSpec),
  SnapshotConfig(SnapshotConfigSpec),
  Snapshot(SnapshotSpec),
  Hostname { name: String },
  Dotfile(DotfileSpec),
  ServiceState(ServiceSpec),
}

impl ResourceParams {
  pub fn kind(&self) -> ResourceKind {
    match self {
      ResourceParams::Repository(_) => ResourceKind::Repository,
      ResourceParams::SystemUpgrade => ResourceKind::SystemUpgrade,
      ResourceParams::PackageSet(_) => ResourceKind::PackageSet,
      ResourceParams::PackageSwap(_) => ResourceKind::PackageSwap,
      ResourceParams::AppRemote { .. } => ResourceKind::AppRemote,
      ResourceParams::AppSet { .. } => ResourceKind::AppSet,
      ResourceParams::GroupMembership { .. } => ResourceKind::GroupMembership,
      ResourceParams::Mount(_) => ResourceKind::Mount,
      ResourceParams::SnapshotConfig(_) => ResourceKind::SnapshotConfig,
      ResourceParams::Snapshot(_) => ResourceKind::Snapshot,
      ResourceParams::Hostname { .. } => ResourceKind::Hostname,
      ResourceParams::Dotfile(_) => ResourceKind::Dotfile,
      ResourceParams::ServiceState(_) => ResourceKind::ServiceState,
    }
  }
}

/// Optional predicate over probed host state gating a resource.
///
/// A false precondition turns every action of the resource into a skip
/// with a warning; it never fails the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precondition {
  /// An executable with this name resolves on PATH.
  CommandAvailable(String),
  /// The given path exists.
  FileExists(String),
  /// A GPU of the given vendor ("amd", "intel", "nvidia") is present.
  GpuVendor(String),
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
  /// Name unique within the kind (repo id, group name, mount path, ...).
  pub name: String,

  pub params: ResourceParams,

  #[serde(default)]
  pub precondition: Option<Precondition>,
}

impl ResourceSpec {
  pub fn new(name: impl Into<String>, params: ResourceParams) -> Self {
    Self {
      name: name.into(),
      params,
      precondition: None,
    }
  }

  pub fn with_precondition(mut self, precondition: Precondition) -> Self {
    self.precondition = Some(precondition);
    self
  }

  pub fn id(&self) -> ResourceId {
    ResourceId::new(self.params.kind(), self.name.clone())
  }
}

/// The complete desired state: an ordered list of resource specs.
///
/// Order is the declaration order from the configuration and is preserved
/// into the plan. Two rules are applied on top of raw declaration order:
///
/// - Duplicate identities resolve last-write-wins: the later declaration
///   replaces the earlier one and keeps the later position.
/// - [`DesiredState::normalize`] hoists repository removals ahead of the
///   first repository addition, so a conflicting repo is gone before its
///   replacement lands.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
  specs: Vec<ResourceSpec>,
}

impl DesiredState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a spec, replacing any earlier spec with the same identity.
  pub fn push(&mut self, spec: ResourceSpec) {
    let id = spec.id();
    self.specs.retain(|existing| existing.id() != id);
    self.specs.push(spec);
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
    self.specs.iter()
  }

  /// Reorder repository removals ahead of the first repository addition.
  ///
  /// The move is stable: removals keep their relative order, and nothing
  /// else is displaced.
  pub fn normalize(&mut self) {
    let first_add = self.specs.iter().position(|s| {
      matches!(
        &s.params,
        ResourceParams::Repository(RepositorySpec { op: RepoOp::Add, .. })
      )
    });

    let Some(first_add) = first_add else { return };

    let mut removals = Vec::new();
    let mut rest = Vec::new();
    for (idx, spec) in std::mem::take(&mut self.specs).into_iter().enumerate() {
      let is_late_removal = idx > first_add
        && matches!(
          &spec.params,
          ResourceParams::Repository(RepositorySpec { op: RepoOp::Remove, .. })
        );
      if is_late_removal {
        removals.push(spec);
      } else {
        rest.push(spec);
      }
    }

    self.specs = rest;
    // Splice the hoisted removals back in just before the first addition.
    self.specs.splice(first_add..first_add, removals);
  }
}

impl<'a> IntoIterator for &'a DesiredState {
  type Item = &'a ResourceSpec;
  type IntoIter = std::slice::Iter<'a, ResourceSpec>;

  fn into_iter(self) -> Self::IntoIter {
    self.specs.iter()
  }
}
