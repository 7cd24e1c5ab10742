//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use datacache_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use datacache_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DaemonConfig, LogLevel};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{parse_request, Descriptor, ParseError, Request, Response, Shape};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{COMMAND_DELIMITER, DESCRIPTOR_DELIMITER, MAX_REQUEST_LINE_BYTES};

// ─── Shared Memory ──────────────────────────────────────────────────
pub use crate::shm::consts::{SHM_MAX_SIZE, SHM_MIN_SIZE, SHM_NAME_PREFIX};
