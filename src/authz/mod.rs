//! Authorization: role-based permission engine.
//!
//! Roles carry (resource, actions, conditions) entries. A check resolves the
//! user's active roles through a [`RoleRepository`], then grants on the first
//! entry whose conditions (ownership, state, type) hold for the target.
//! Every failure (unknown user, no roles, storage error) is a denial.

pub mod defaults;
mod legacy;
mod manager;
mod permission;
mod principal;
mod repository;

pub use legacy::LegacyRoleFallback;
pub use manager::PermissionManager;
pub use permission::{Action, Conditions, Permission, PermissionContext, Resource};
pub use principal::Principal;
pub use repository::{RoleRepository, SqliteRoleRepository, UserRoles};
