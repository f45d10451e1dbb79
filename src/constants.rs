/// Application-wide constants
/// All magic numbers and constant values should be defined here

/// Characters a blob name may contain, besides ASCII letters and digits
pub const NAME_EXTRA_CHARS: &[char] = &['+', '='];

/// Hard upper bound on the name length; a stripped base64 digest is always longer
pub const MAX_NAME_LENGTH: usize = 20;

/// Default minimum name length
pub const DEFAULT_NAME_MIN_LENGTH: usize = 4;

/// Default exclusive upper bound on the name length
pub const DEFAULT_NAME_MAX_LENGTH: usize = 20;

/// Counter values tried at each name length before widening
pub const NAME_ATTEMPTS_PER_LENGTH: u32 = 99;

/// Default maximum declared upload size in bytes (10 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Default listen port
pub const DEFAULT_PORT: u16 = 6542;

/// Default per-connection read/write bound in seconds
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

/// Default rate limiter burst when rate limiting is enabled
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Size of each frame written when sending a blob back to a client
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-flight upload files inside the data directory
pub const STAGING_PREFIX: &str = ".staging-";

/// Form field carrying the payload in URL-encoded uploads
pub const FORM_DATA_FIELD: &str = "data";

/// Emoji used in startup logs
pub const PASTE_EMOJI: &str = "📋";

/// Extra allocation attempts after a create-only write finds its name taken
pub const STORE_COLLISION_RETRIES: u32 = 1;
