//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                            |
//! |------|----------------------------------------------------|
//! | 0    | Success (unresolved sources are logged, not fatal) |
//! | 2    | Usage error (bad args, missing source list)        |
//! | 60   | Config could not be read, parsed, or validated     |
//! | 61   | Runtime failure (output write, HTTP client setup)  |
//! | 62   | No vote record recovered from any source           |

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required inputs.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (60-69)
// =============================================================================

/// Config file unreadable, malformed, or failing validation.
pub const EXIT_RUN_INVALID_CONFIG: u8 = 60;

/// Failure outside the sources themselves (IO, client setup, CSV write).
pub const EXIT_RUN_RUNTIME: u8 = 61;

/// Every source failed or yielded nothing: there is no table to write.
pub const EXIT_RUN_NO_DATA: u8 = 62;
