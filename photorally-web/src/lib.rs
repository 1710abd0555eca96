//! Browser bindings for the PhotoRally engine.
//!
//! `photorally-game` stays platform-agnostic behind its storage traits;
//! this crate supplies the browser implementations (`localStorage` for
//! structured records, IndexedDB for photo payloads) plus the bundled
//! rally catalog and session bootstrap.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod dom;
pub mod photos;
pub mod storage;

pub use bootstrap::{WebSession, builtin_catalog, start_session};
pub use photos::{WebPhotoStore, WebPhotoStores};
pub use storage::WebStateStore;

/// Re-export of the platform-agnostic engine for frontend callers.
pub use photorally_game as game;
