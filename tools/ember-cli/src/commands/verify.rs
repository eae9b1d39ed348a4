//! Verify command implementation.

use std::path::Path;

use emberdb::backup;

use crate::error::Result;
use crate::output::format_captures;
use crate::OutputFormat;

/// Run the verify command - checks the chain and lists its captures.
pub fn run(location: &Path, format: OutputFormat) -> Result<()> {
    let captures = backup::verify(location)?;
    println!("{}", format_captures(&captures, format)?);
    Ok(())
}
