//! Repository implementations over the local store.
//!
//! Repositories are thin structs over the pool: cheap to create, cheap to
//! clone, no state of their own.

pub mod identity;
pub mod reference;
