//! Request server and lifecycle guard for the `datacached` binary.
//!
//! Split into a library target so integration tests in `tests/` can drive
//! the server and lifecycle guard directly, the same way the rest of the
//! workspace separates its binaries' logic into a lib crate for testing.

pub mod lifecycle_guard;
pub mod server;

pub use lifecycle_guard::{LifecycleError, LifecycleGuard};
