//! Datacache Common Library
//!
//! Shared constants, configuration loading, and wire-protocol types used by
//! every crate in the datacache workspace.
//!
//! # Module Structure
//!
//! - [`config`] - `DaemonConfig` and the `ConfigLoader` trait
//! - [`consts`] - Protocol and default-value constants
//! - [`protocol`] - The `CMD#ARG` request grammar and response formatting
//! - [`shm`] - Shared-memory size/naming constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! datacache_common = { path = "../datacache_common" }
//! ```
//!
//! ```rust
//! use datacache_common::config::{ConfigLoader, DaemonConfig};
//! use datacache_common::protocol::{parse_request, Response};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod protocol;
pub mod shm;
