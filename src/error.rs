use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to read {}: {}", .path.display(), .source)]
    ReadFile { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("unexpected end of input: expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("unknown replacement algorithm `{0}` (expected one of f r c e a w)")]
    UnknownAlgorithm(char),

    #[error("frame count must be between 1 and 128, got {0}")]
    FrameCount(usize),

    #[error("instruction {inst}: memory reference with no current process")]
    NoCurrentProcess { inst: u64 },
}
