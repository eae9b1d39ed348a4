//! Document commands.

use std::path::Path;

use serde_json::Value;

use crate::commands::open_default;
use crate::error::{CliError, Result};
use crate::output::format_documents;
use crate::OutputFormat;

/// Store a document and print its etag.
pub fn put(path: Option<&Path>, key: &str, json: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CliError::InvalidInput("document key must not be empty".into()));
    }
    let body: Value = serde_json::from_str(json)
        .map_err(|e| CliError::InvalidInput(format!("document is not valid JSON: {e}")))?;
    let db = open_default(path)?;
    let etag = db.put(key, &body)?;
    println!("{etag}");
    Ok(())
}

/// Print one document.
pub fn get(path: Option<&Path>, key: &str, format: OutputFormat) -> Result<()> {
    let db = open_default(path)?;
    let Some(document) = db.get(key)? else {
        return Err(CliError::InvalidInput(format!("no document with key {key}")));
    };
    println!("{}", format_documents(&[document], format)?);
    Ok(())
}

/// Remove a document.
pub fn delete(path: Option<&Path>, key: &str) -> Result<()> {
    let db = open_default(path)?;
    let txid = db.delete(key)?;
    println!("{txid}");
    Ok(())
}

/// List every document.
pub fn list(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let db = open_default(path)?;
    println!("{}", format_documents(&db.documents()?, format)?);
    Ok(())
}
