use crate::config::Config;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated subject: an ordinary user, or one of the three
/// distinguished principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(pub Uuid);

impl Principal {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three fixed principals, resolved from configuration at startup.
/// Cheap to clone; held by every service that needs to recognize
/// ROOT/SYSTEM/TEMPLATE.
#[derive(Debug, Clone, Copy)]
pub struct SystemIds {
    pub root: Uuid,
    pub system: Uuid,
    pub template: Uuid,
}

impl SystemIds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.root_id,
            system: config.system_id,
            template: config.template_id,
        }
    }

    pub fn is_root(&self, p: Principal) -> bool {
        p.0 == self.root
    }

    pub fn is_system(&self, p: Principal) -> bool {
        p.0 == self.system
    }

    pub fn is_template(&self, p: Principal) -> bool {
        p.0 == self.template
    }

    /// Only ROOT and SYSTEM may CRUD kinds flagged `system`.
    pub fn is_root_or_system(&self, p: Principal) -> bool {
        self.is_root(p) || self.is_system(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> SystemIds {
        SystemIds {
            root: Uuid::from_u128(1),
            system: Uuid::from_u128(2),
            template: Uuid::from_u128(3),
        }
    }

    #[test]
    fn recognizes_each_distinguished_principal() {
        let ids = ids();
        assert!(ids.is_root(Principal(Uuid::from_u128(1))));
        assert!(ids.is_system(Principal(Uuid::from_u128(2))));
        assert!(ids.is_template(Principal(Uuid::from_u128(3))));
        assert!(!ids.is_root(Principal(Uuid::from_u128(4))));
    }

    #[test]
    fn root_or_system_excludes_ordinary_and_template() {
        let ids = ids();
        assert!(ids.is_root_or_system(Principal(Uuid::from_u128(1))));
        assert!(ids.is_root_or_system(Principal(Uuid::from_u128(2))));
        assert!(!ids.is_root_or_system(Principal(Uuid::from_u128(3))));
    }
}
