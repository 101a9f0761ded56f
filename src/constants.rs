/// Source endpoint and request constants shared across the crate.

// Default remote source (CelesTrak general-perturbations query endpoint)
pub const DEFAULT_BASE_URL: &str = "https://celestrak.org/NORAD/elements/gp.php";

// The source rejects requests that carry no client identity
pub const DEFAULT_USER_AGENT: &str = concat!("tle-cache/", env!("CARGO_PKG_VERSION"));

// Query key prefix selecting the GROUP= parameter instead of NAME=
pub const GROUP_KEY_PREFIX: &str = "group:";

// Record parser markers
pub const LINE1_MARKER: &str = "1 ";
pub const LINE2_MARKER: &str = "2 ";
pub const NAME_ZERO_PREFIX: &str = "0 ";

/// Upper-case token identifying debris objects by display name.
pub const DEBRIS_MARKER: &str = "DEB";

// On-disk cache layout
pub const METADATA_VERSION: u32 = 1;
pub const METADATA_EXTENSION: &str = "meta.json";
pub const PAYLOAD_EXTENSION: &str = "payload.bin";
pub const LEGACY_PAYLOAD_EXTENSION: &str = "tle";
pub const EMPTY_KEY_TOKEN: &str = "_empty";

// Policy defaults (seconds)
pub const DEFAULT_STALE_AFTER_SECS: i64 = 6 * 60 * 60;
pub const DEFAULT_MIN_REARM_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_BACKOFF_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
