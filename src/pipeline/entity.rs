use std::collections::HashMap;

/// A declared permission reference: a named pointer from one record to
/// another record of `target_kind`, consulted by the permission engine's
/// reference-inheritance rule.
#[derive(Debug, Clone, Copy)]
pub struct PermissionReference {
    pub name: &'static str,
    pub target_kind: &'static str,
}

/// The declarative description of a managed entity kind, composed rather
/// than inherited. A kind is a plain bag of flags and references; behavior
/// is attached separately via the hook registry, never by subclassing
/// this struct.
#[derive(Debug, Clone)]
pub struct EntityDescription {
    pub kind: &'static str,
    /// Only ROOT/SYSTEM may CRUD a system kind.
    pub system: bool,
    /// Whether records of this kind carry a `user_id` owner field.
    pub user_owned: bool,
    /// Whether records of this kind carry a `team_id` owner field.
    pub team_owned: bool,
    pub permission_references: Vec<PermissionReference>,
    /// Name of the reference that must grant EDIT before a new record can
    /// be created against it. Must name an entry in
    /// `permission_references`.
    pub create_permission_reference: Option<&'static str>,
}

impl EntityDescription {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(cpr) = self.create_permission_reference {
            if !self.permission_references.iter().any(|r| r.name == cpr) {
                return Err(format!(
                    "kind '{}': create_permission_reference '{cpr}' is not a declared permission reference",
                    self.kind
                ));
            }
        }
        Ok(())
    }
}

/// The set of entity kinds known to a running instance, assembled from
/// core kinds plus whatever extensions register.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<&'static str, EntityDescription>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: EntityDescription) -> Result<(), String> {
        desc.validate()?;
        self.kinds.insert(desc.kind, desc);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&EntityDescription> {
        self.kinds.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EntityDescription> {
        self.kinds.values()
    }
}
