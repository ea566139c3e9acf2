//! Line sources: stdin, or the stdout/stderr of a wrapped command, fanned in
//! to one channel for the sequential dispatch loop.

pub mod multiplexer;
pub mod signals;
pub mod subprocess;

pub use multiplexer::{SourceLine, StreamMultiplexer};
pub use subprocess::{ExitCode, ExitWatch, Subprocess};

/// Source index of the primary output (stdin or a command's stdout)
pub const PRIMARY: usize = 0;
/// Source index of a command's stderr
pub const SECONDARY: usize = 1;
