//! Global configuration constants for the publications service.
//!
//! All validation limits, geodesic parameters, and server defaults are defined here.
//! These are compile-time constants; runtime configuration is handled via CLI arguments
//! and environment variables in the server's `main.rs`.

/// Meters in one kilometer.
///
/// Search radii arrive in kilometers and stored distances are measured in meters.
/// The conversion factor is exact in `f64`.
pub const METERS_PER_KILOMETER: f64 = 1000.0;

/// WGS84 semi-major axis in meters.
pub const WGS84_SEMI_MAJOR_AXIS_M: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Mean Earth radius in meters, used by the spherical fallback.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Maximum iterations of the Vincenty inverse solution before falling back to haversine.
pub const VINCENTY_MAX_ITERATIONS: usize = 200;

/// Convergence threshold (radians) for the Vincenty lambda iteration.
pub const VINCENTY_CONVERGENCE: f64 = 1e-12;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default directory for WAL and snapshot files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// File name of the store snapshot inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "publications.pdb";

/// File name of the write-ahead log inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.bin";

/// Default interval (in seconds) between automatic snapshots. 0 = disabled.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Global rate limit in requests per second.
pub const RATE_LIMIT_RPS: u64 = 200;

/// Maximum HTTP request body size in bytes (1 MB).
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Maximum number of concurrent in-flight requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 512;

/// Maximum length of a publication title in bytes.
pub const MAX_TITLE_LEN: usize = 256;

/// Maximum length of a publication description in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Maximum number of images attached to one publication.
pub const MAX_IMAGES: usize = 64;

/// Maximum length of an image URL in bytes.
pub const MAX_IMAGE_URL_LEN: usize = 2048;

/// Maximum length of a question or a reply in bytes.
pub const MAX_QUESTION_LEN: usize = 4096;

/// Maximum length of a blockchain transaction hash in bytes.
pub const MAX_TRANSACTION_HASH_LEN: usize = 256;

/// Maximum entries per WAL group commit batch before forcing a flush.
pub const WAL_GROUP_COMMIT_MAX_BATCH: usize = 128;

/// Maximum wait time (microseconds) to accumulate WAL entries before flushing.
pub const WAL_GROUP_COMMIT_MAX_WAIT_US: u64 = 1000;

/// Maximum number of days covered by one statistics request.
pub const MAX_STATS_RANGE_DAYS: i64 = 3660;
