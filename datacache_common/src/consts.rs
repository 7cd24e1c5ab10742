//! System-wide constants for the datacache workspace.
//!
//! Single source of truth for protocol framing and defaults. Imported by
//! all crates — no duplication permitted.

/// Field delimiter separating a command from its dataset identifier
/// (`REQUEST#<id>`), and the delimiter inside a success descriptor
/// (`<name>|<shape>|<dtype>`). Dataset identifiers must not contain either.
pub const COMMAND_DELIMITER: char = '#';

/// Delimiter between descriptor fields in a success response.
pub const DESCRIPTOR_DELIMITER: char = '|';

/// Maximum bytes read from a connection before a request is considered
/// malformed.
pub const MAX_REQUEST_LINE_BYTES: usize = 1024;

/// Default TCP listen port.
pub const DEFAULT_PORT: u16 = 6000;

/// Default cache capacity in GiB.
pub const DEFAULT_CACHE_SIZE_GIB: u64 = 20;

/// Default dataset file extension used to resolve `<data_path>/<id>.<ext>`.
pub const DEFAULT_DATASET_EXTENSION: &str = "parquet";

/// Default advisory lock file name.
pub const DEFAULT_LOCK_FILE: &str = "datacache.lock";

/// Default client polling timeout in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Default client poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MAX_REQUEST_LINE_BYTES > 0);
        assert!(DEFAULT_PORT > 0);
        assert!(DEFAULT_CACHE_SIZE_GIB > 0);
        assert!(DEFAULT_POLL_TIMEOUT_SECS > DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn delimiters_are_distinct() {
        assert_ne!(COMMAND_DELIMITER, DESCRIPTOR_DELIMITER);
    }
}
