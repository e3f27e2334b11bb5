//! # Atlas DB
//!
//! Local durable storage for the terminal: SQLite behind repositories, plus
//! the in-memory read-through cache that order entry actually talks to.
//!
//! ## Crate Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           atlas-db                                      │
//! │                                                                         │
//! │  pool        ── Store: pool setup, WAL, migrations, repo handles        │
//! │  migrations  ── embedded schema migrations                              │
//! │  repository  ── reference datasets + terminal identity over SQLite      │
//! │  cache       ── ReferenceCache: read-through, invalidate-on-sync        │
//! │  error       ── DbError taxonomy                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage is the source of truth on this device; the cache is a fast view
//! of it that the sync layer invalidates after each successful pull.

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use cache::{CachePartition, ReferenceCache};
pub use error::{DbError, DbResult};
pub use pool::{DbConfig, Store};
pub use repository::identity::IdentityRepository;
pub use repository::reference::ReferenceRepository;
