//! Vanish Server Library
//!
//! Ephemeral file store: uploads are stored under a keyed content hash and
//! deleted once their time-to-live passes. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `addressing`: Keyed content identifiers
//! - `storage`: Exclusive-create blob store
//! - `journal`: Append-only TTL journal
//! - `reconciler`: Background deletion of expired blobs
//! - `upload`: Per-request upload coordination
//! - `routes`: HTTP boundary

pub mod addressing;
pub mod config;
pub mod duration;
pub mod error;
pub mod journal;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;
