//! Protocol constants and configuration values

/// Default TCP port of a network GI gateway
pub const DEFAULT_GI_PORT: u16 = 4573;

/// URL scheme selecting a network gateway instead of a local program
pub const NETWORK_SCHEME: &str = "gi://";

/// Network connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Default directory relative program paths are resolved against
pub const DEFAULT_SCRIPT_DIR: &str = "/var/lib/pbx/gi-bin";

/// Socket/pipe read chunk for the command stream
pub const READ_CHUNK: usize = 4096;

/// Initial line buffer allocation, grows on demand up to the line limit
pub const BUF_CHUNK: usize = 1024;

/// Default maximum command line length (bytes, excluding the newline)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Maximum number of words kept from one command line
pub const MAX_ARGS: usize = 128;

/// Maximum number of words in a command descriptor
pub const MAX_VERB_WORDS: usize = 4;

/// Consecutive interrupted reads tolerated before the session fails
pub const MAX_INTERRUPT_RETRIES: u32 = 5;

/// Fixed descriptor fd number of the audio side channel in the child
pub const AUDIO_FD: i32 = 3;

/// Protocol line terminator
pub const LINE_TERMINATOR: &str = "\n";

/// Prefix of every preamble key and of the network handshake keys
pub const PREAMBLE_KEY_PREFIX: &str = "gi_";

/// Preamble keys in wire order
pub const PREAMBLE_KEYS: [&str; 18] = [
    "request",
    "channel",
    "language",
    "type",
    "uniqueid",
    "callerid",
    "calleridname",
    "callingpres",
    "callingani2",
    "callington",
    "callingtns",
    "dnid",
    "rdnis",
    "context",
    "extension",
    "priority",
    "enhanced",
    "accountcode",
];

/// Value emitted for absent preamble strings
pub const PREAMBLE_UNKNOWN: &str = "unknown";

/// Success reply status code
pub const REPLY_OK: u16 = 200;

/// Reply lines
pub const REPLY_UNKNOWN_COMMAND: &str = "510 Invalid or unknown command\n";
pub const USAGE_HEADER: &str = "520-Invalid command syntax.  Proper usage follows:\n";
pub const USAGE_TRAILER: &str = "520 End of proper usage.\n";

/// Status handed back when a handler asked for keep-alive continuation
pub const KEEPALIVE_STATUS: i32 = 10;

/// Channel variable reporting how the session ended
pub const STATUS_VARIABLE: &str = "GISTATUS";
