//! Shared FTP protocol constants (RFC 959 reply codes, defaults, timeouts)

// Default control port
pub const DEFAULT_PORT: u16 = 21;

// Longest reply line we accept before treating the server as broken
pub const MAX_REPLY_LINE: usize = 8 * 1024;

// Maximum number of names accepted from a single NLST
pub const MAX_LIST_ENTRIES: usize = 100_000;

// Reply codes used by the session (keep numeric; servers vary in text)
pub mod reply {
    pub const COMMAND_OK: u16 = 200;
    pub const SUPERFLUOUS: u16 = 202;
    pub const SERVICE_READY: u16 = 220;
    pub const CLOSING: u16 = 221;
    pub const TRANSFER_COMPLETE: u16 = 226;
    pub const PASSIVE_MODE: u16 = 227;
    pub const EXTENDED_PASSIVE_MODE: u16 = 229;
    pub const LOGGED_IN: u16 = 230;
    pub const FILE_ACTION_OK: u16 = 250;
    pub const PATH_CREATED: u16 = 257;
    pub const NEED_PASSWORD: u16 = 331;
    pub const SERVICE_CLOSING: u16 = 421;
    pub const NOT_LOGGED_IN: u16 = 530;
    pub const FILE_UNAVAILABLE: u16 = 550;

    /// 1xx: preliminary; another reply follows
    pub fn is_preliminary(code: u16) -> bool {
        (100..200).contains(&code)
    }

    /// 2xx
    pub fn is_completion(code: u16) -> bool {
        (200..300).contains(&code)
    }
}

// Centralized timeout constants
pub mod timeouts {
    // Connect/read/write deadline when nothing else is configured (seconds)
    pub const DEFAULT_SECS: u64 = 30;

    // How long QUIT may take before we give up and drop the socket (ms)
    pub const QUIT_MS: u64 = 2_000;
}

// Recursion bound for both remote erase and local upload
pub const DEFAULT_MAX_DEPTH: usize = 64;
