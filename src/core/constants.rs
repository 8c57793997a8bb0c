/*!
Constants for the TLS socket wrapper.
*/

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default session timeout in milliseconds (-1 blocks forever)
pub const DEFAULT_TIMEOUT_MS: i32 = -1;

/// Maximum length of a DNS host name used for SNI
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum TLS record plaintext size
pub const TLS_MAX_PLAINTEXT: usize = 16384;

/// Default capacity of one direction of an in-memory pipe (64KB)
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Placeholder server name used when no hostname is configured.
///
/// SNI is disabled in that case and the verifier skips the name check.
pub const PLACEHOLDER_SERVER_NAME: &str = "localhost";
