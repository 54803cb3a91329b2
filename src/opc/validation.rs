//! Part name rules

use crate::error::{Error, Result};

/// Check a part name against the OPC naming constraints
///
/// Non-ASCII characters are accepted as UTF-8; many producers write them
/// unencoded.
pub(crate) fn validate_part_name(part_name: &str) -> Result<()> {
    if part_name.chars().any(char::is_control) {
        return Err(Error::InvalidPackage(format!(
            "part name contains control characters: {}",
            part_name.escape_debug()
        )));
    }
    if part_name.contains('#') || part_name.contains('?') {
        return Err(Error::InvalidPackage(format!(
            "part name contains a fragment or query: {}",
            part_name
        )));
    }

    let body = part_name.strip_prefix('/').unwrap_or(part_name);
    if body.is_empty() {
        return Err(Error::InvalidPackage("empty part name".to_string()));
    }
    for segment in body.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidPackage(format!(
                "part name has an empty segment: {}",
                part_name
            )));
        }
        if segment == "." || segment == ".." || segment.ends_with('.') {
            return Err(Error::InvalidPackage(format!(
                "part name segment '{}' is not allowed: {}",
                segment, part_name
            )));
        }
    }
    Ok(())
}

/// ZIP entry name of a part
pub(crate) fn entry_name(part_name: &str) -> &str {
    part_name.strip_prefix('/').unwrap_or(part_name)
}

/// Case-insensitive identity of a part
pub(crate) fn part_key(part_name: &str) -> String {
    format!("/{}", entry_name(part_name)).to_lowercase()
}
