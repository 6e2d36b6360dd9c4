// src/constants.rs

/// Prompt printed before each command is read.
pub const DEFAULT_PROMPT: &str = "$ ";

/// Size of the command slot in bytes: 511 characters, the newline and a
/// terminator, so any read of 513 bytes or more is an overflow.
pub const DEFAULT_SLOT_CAPACITY: usize = 513;

/// Smallest usable slot: one character plus its newline.
pub const MIN_SLOT_CAPACITY: usize = 2;

/// Readiness poll timeout of the reader, and the bound on every monitor wait.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Pause before polling a standard input that is temporarily closed by the
/// executor.
pub const DETACHED_INPUT_BACKOFF_MS: u64 = 10;

/// Device handed to background commands instead of the terminal.
pub const NULL_DEVICE: &str = "/dev/null";

/// Permissions of files created by `>` redirects.
pub const REDIRECT_FILE_MODE: u32 = 0o644;

/// The name of the directory containing tandem configuration (in the system
/// config dir, e.g. `~/.config/tandem`).
pub const CONFIG_DIR_NAME: &str = "tandem";

/// The name of the configuration file inside the config directory.
pub const CONFIG_FILENAME: &str = "config.toml";
