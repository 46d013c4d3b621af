//! Identity & system IDs: the three distinguished principals and the
//! role/team hierarchy caches consulted by the permission engine.

mod principal;
mod role_hierarchy;
mod team_hierarchy;

pub use principal::{Principal, SystemIds};
pub use role_hierarchy::{Role, RoleHierarchy};
pub use team_hierarchy::{Team, TeamHierarchy, TeamMembership};
