//! Entity mapping contracts shared by both dispatch strategies.
//!
//! # Responsibility
//! - Describe how an entity type maps onto one table (`EntityDescriptor`).
//! - Carry dynamically typed rows between repositories and sessions (`Record`).
//! - Group descriptors by package for bootstrap discovery (`EntityCatalog`).
//!
//! # Invariants
//! - Descriptors are `'static` and validated before any SQL is built from them.
//! - A repository binds its entity type exactly once, at construction.

mod catalog;
mod entity;

pub use catalog::EntityCatalog;
pub use entity::{
    ColumnDef, Entity, EntityDescriptor, EntityId, EntityType, IdStrategy, Record, SqlType, Value,
};
