use std::io::IsTerminal;

use crate::core::error::BundleResult;
use crate::io::file_io::{read_snapshot_from, GraphSnapshot};

/// Reads a snapshot piped on stdin. `None` when stdin is an interactive
/// terminal.
pub fn read_stdin_snapshot() -> BundleResult<Option<GraphSnapshot>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    read_snapshot_from(stdin.lock()).map(Some)
}
