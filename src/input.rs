//! Payload input.
//!
//! The outbound payload comes from the files named on the command line,
//! concatenated in order, or from standard input when no files are given.
//! Input is treated as opaque bytes throughout; embedded NULs and invalid
//! UTF-8 pass through untouched.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// Read the payload to serve.
///
/// With `trim_trailing_newline` set, a single trailing `\n` is dropped,
/// matching the common "pipe in a shell one-liner" case.
pub fn read_payload(files: &[PathBuf], trim_trailing_newline: bool) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    if files.is_empty() {
        io::stdin().read_to_end(&mut payload)?;
    } else {
        for path in files {
            payload.extend_from_slice(&fs::read(path)?);
        }
    }
    if trim_trailing_newline && payload.last() == Some(&b'\n') {
        payload.pop();
    }
    Ok(payload)
}
