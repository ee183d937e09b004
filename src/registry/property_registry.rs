use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::GroupId;
use super::PropertyDefinition;
use super::PropertyGroup;
use super::ValueType;
use super::WireFormat;
use crate::constants::NODES_PLACEHOLDER;
use crate::GroupConfig;
use crate::GroupMemberConfig;
use crate::LockMask;
use crate::PropertyConfig;
use crate::PropertyError;
use crate::ResourceLock;

/// Immutable view of the definitions loaded at one point in time
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    properties: HashMap<Arc<str>, Arc<PropertyDefinition>>,
    groups: HashMap<GroupId, Arc<PropertyGroup>>,
}

impl RegistrySnapshot {
    pub fn property(
        &self,
        name: &str,
    ) -> Option<&Arc<PropertyDefinition>> {
        self.properties.get(name)
    }

    pub fn group(
        &self,
        id: &GroupId,
    ) -> Option<&Arc<PropertyGroup>> {
        self.groups.get(id)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Groups touched by a reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChange {
    pub added: Vec<GroupId>,
    pub removed: Vec<GroupId>,
    pub changed: Vec<GroupId>,
}

type ChangeListener = Box<dyn Fn(&RegistryChange) + Send + Sync>;

/// Property definitions of one provider domain.
pub struct PropertyRegistry {
    domain: String,
    lock: Arc<ResourceLock>,
    snapshot: ArcSwap<RegistrySnapshot>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl PropertyRegistry {
    /// Builds a registry, skipping (and returning) every rejected definition.
    pub fn load(
        domain: impl Into<String>,
        lock: Arc<ResourceLock>,
        properties: &[PropertyConfig],
        groups: &[GroupConfig],
    ) -> (Self, Vec<PropertyError>) {
        let domain = domain.into();
        let (snapshot, errors) = build_snapshot(&domain, properties, groups);
        info!(domain = %domain, properties = snapshot.len(), rejected = errors.len(), "property registry loaded");
        (
            Self {
                domain,
                lock,
                snapshot: ArcSwap::from_pointee(snapshot),
                listeners: Mutex::new(Vec::new()),
            },
            errors,
        )
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Definition of `name` together with the group it is produced by
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<(Arc<PropertyDefinition>, Arc<PropertyGroup>)> {
        let snapshot = self.snapshot.load();
        let def = snapshot.property(name)?.clone();
        let group = snapshot.group(&def.group)?.clone();
        Some((def, group))
    }

    pub fn group(
        &self,
        id: &GroupId,
    ) -> Option<Arc<PropertyGroup>> {
        self.snapshot.load().group(id).cloned()
    }

    pub fn preload_properties(&self) -> Vec<Arc<PropertyDefinition>> {
        let snapshot = self.snapshot.load();
        let mut preload: Vec<_> = snapshot.properties.values().filter(|p| p.preload).cloned().collect();
        preload.sort_by(|a, b| a.name.cmp(&b.name));
        preload
    }

    /// Registers `listener` for reloads.
    ///
    /// Listeners run while the registry is held for write. One that needs
    /// the registry itself must use a non-blocking acquire and defer itself
    /// when it gets LOCK_BUSY.
    pub fn subscribe<F>(
        &self,
        listener: F,
    ) where
        F: Fn(&RegistryChange) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Replaces every definition at once and notifies listeners.
    pub fn reload(
        &self,
        properties: &[PropertyConfig],
        groups: &[GroupConfig],
    ) -> Vec<PropertyError> {
        let (snapshot, errors) = build_snapshot(&self.domain, properties, groups);

        let _write = self.lock.lock(LockMask::REGISTRY_WRITE);
        let previous = self.snapshot.swap(Arc::new(snapshot));
        let current = self.snapshot.load();
        let change = diff(&previous, &current);
        info!(
            domain = %self.domain,
            added = change.added.len(),
            removed = change.removed.len(),
            changed = change.changed.len(),
            "property registry reloaded"
        );

        for listener in self.listeners.lock().iter() {
            listener(&change);
        }
        errors
    }
}

fn diff(
    previous: &RegistrySnapshot,
    current: &RegistrySnapshot,
) -> RegistryChange {
    let mut change = RegistryChange::default();
    for (id, group) in &current.groups {
        match previous.groups.get(id) {
            None => change.added.push(id.clone()),
            Some(old) if old != group => change.changed.push(id.clone()),
            Some(_) => {}
        }
    }
    for id in previous.groups.keys() {
        if !current.groups.contains_key(id) {
            change.removed.push(id.clone());
        }
    }
    change.added.sort();
    change.removed.sort();
    change.changed.sort();
    change
}

fn build_snapshot(
    domain: &str,
    properties: &[PropertyConfig],
    groups: &[GroupConfig],
) -> (RegistrySnapshot, Vec<PropertyError>) {
    let mut snapshot = RegistrySnapshot::default();
    let mut errors = Vec::new();

    let standalone = properties.iter().map(|p| GroupSpec {
        name: &p.name,
        command: &p.command,
        format: &p.format,
        workdir: &p.workdir,
        env: &p.env,
        members: vec![MemberSpec {
            name: &p.name,
            value_type: &p.value_type,
            preload: p.preload,
        }],
    });
    let grouped = groups.iter().map(|g| GroupSpec {
        name: &g.name,
        command: &g.command,
        format: &g.format,
        workdir: &g.workdir,
        env: &g.env,
        members: g.properties.iter().map(MemberSpec::from).collect(),
    });

    for spec in standalone.chain(grouped) {
        if let Err(e) = add_group(&mut snapshot, &spec, &mut errors) {
            errors.push(e);
        }
    }

    for e in &errors {
        warn!(domain, "rejected property definition: {}", e);
    }
    (snapshot, errors)
}

struct GroupSpec<'a> {
    name: &'a str,
    command: &'a str,
    format: &'a str,
    workdir: &'a Option<PathBuf>,
    env: &'a BTreeMap<String, String>,
    members: Vec<MemberSpec<'a>>,
}

struct MemberSpec<'a> {
    name: &'a str,
    value_type: &'a str,
    preload: bool,
}

impl<'a> From<&'a GroupMemberConfig> for MemberSpec<'a> {
    fn from(member: &'a GroupMemberConfig) -> Self {
        Self {
            name: &member.name,
            value_type: &member.value_type,
            preload: member.preload,
        }
    }
}

/// Validates one group; rejected members are pushed to `errors` and skipped.
fn add_group(
    snapshot: &mut RegistrySnapshot,
    spec: &GroupSpec<'_>,
    errors: &mut Vec<PropertyError>,
) -> std::result::Result<(), PropertyError> {
    validate_name(spec.name)?;
    let id = GroupId::new(spec.name);
    if snapshot.groups.contains_key(&id) {
        return Err(PropertyError::DuplicateGroup {
            group: spec.name.to_string(),
        });
    }
    if !spec.command.contains(NODES_PLACEHOLDER) {
        return Err(PropertyError::MissingPlaceholder {
            group: spec.name.to_string(),
            command: spec.command.to_string(),
        });
    }
    let format: WireFormat = spec.format.parse().map_err(|_| PropertyError::UnknownWireFormat {
        group: spec.name.to_string(),
        format: spec.format.to_string(),
    })?;

    let mut members: Vec<Arc<PropertyDefinition>> = Vec::with_capacity(spec.members.len());
    for member in &spec.members {
        match validate_member(snapshot, &members, &id, member) {
            Ok(def) => members.push(Arc::new(def)),
            Err(e) => errors.push(e),
        }
    }
    if members.is_empty() {
        return Err(PropertyError::EmptyGroup {
            group: spec.name.to_string(),
        });
    }

    for def in &members {
        snapshot.properties.insert(def.name.clone(), def.clone());
    }
    debug!(group = %id, properties = members.len(), "property group registered");
    snapshot.groups.insert(
        id.clone(),
        Arc::new(PropertyGroup {
            id,
            command: spec.command.to_string(),
            format,
            workdir: spec.workdir.clone(),
            env: spec.env.clone(),
            properties: members,
        }),
    );
    Ok(())
}

fn validate_member(
    snapshot: &RegistrySnapshot,
    siblings: &[Arc<PropertyDefinition>],
    group: &GroupId,
    member: &MemberSpec<'_>,
) -> std::result::Result<PropertyDefinition, PropertyError> {
    validate_name(member.name)?;
    if snapshot.properties.contains_key(member.name) || siblings.iter().any(|p| &*p.name == member.name) {
        return Err(PropertyError::Duplicate {
            name: member.name.to_string(),
        });
    }
    let value_type: ValueType = member.value_type.parse().map_err(|_| PropertyError::UnknownValueType {
        name: member.name.to_string(),
        value_type: member.value_type.to_string(),
    })?;
    Ok(PropertyDefinition {
        name: Arc::from(member.name),
        value_type,
        preload: member.preload,
        group: group.clone(),
    })
}

fn validate_name(name: &str) -> std::result::Result<(), PropertyError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.contains('|') {
        "contains the field separator"
    } else if name.contains('\0') {
        "contains NUL"
    } else if name.chars().any(char::is_whitespace) {
        "contains whitespace"
    } else {
        return Ok(());
    };
    Err(PropertyError::InvalidName {
        name: name.to_string(),
        reason,
    })
}
