//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Every entry names exactly one destination
//! - Detect shadowed routes (reported as lints, never rejected)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before any listener binds

use thiserror::Error;

use crate::config::schema::{Entry, ProxyConfig};
use crate::routing::matcher::HostPattern;

/// A semantic problem that prevents the proxy from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no entries configured")]
    NoEntries,

    #[error("entry #{index}: empty host pattern")]
    EmptyPattern { index: usize },

    #[error("entry {host}: {reason}")]
    InvalidPattern { host: String, reason: String },

    #[error("entry {host}: no dest or dest_folder provided")]
    MissingDestination { host: String },

    #[error("entry {host}: both dest and dest_folder provided")]
    AmbiguousDestination { host: String },

    #[error("plaintext listener address is empty")]
    EmptyAddress,

    #[error("ca_cert_file is set but ca_key_file is missing")]
    CaCertWithoutKey,
}

/// An entry that can never be selected because an earlier one matches first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedEntry {
    /// Position of the unreachable entry.
    pub index: usize,
    /// Position of the entry that wins instead.
    pub shadowed_by: usize,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.addr.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    }

    let has_key = config.ca_key_file.as_deref().is_some_and(|k| !k.is_empty());
    let has_cert = config.ca_cert_file.as_deref().is_some_and(|c| !c.is_empty());
    if has_cert && !has_key {
        errors.push(ValidationError::CaCertWithoutKey);
    }

    if config.entries.is_empty() {
        errors.push(ValidationError::NoEntries);
    }

    for (index, entry) in config.entries.iter().enumerate() {
        if let Err(e) = validate_entry(index, entry) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check the destination invariant of a single entry.
pub fn validate_entry(index: usize, entry: &Entry) -> Result<(), ValidationError> {
    if entry.host.trim().is_empty() {
        return Err(ValidationError::EmptyPattern { index });
    }
    if let Err(e) = HostPattern::compile(&entry.host) {
        return Err(ValidationError::InvalidPattern {
            host: entry.host.clone(),
            reason: e.to_string(),
        });
    }
    let dest = entry.dest.as_deref().is_some_and(|d| !d.is_empty());
    let folder = entry.dest_folder.as_deref().is_some_and(|f| !f.is_empty());
    match (dest, folder) {
        (true, false) | (false, true) => Ok(()),
        (false, false) => Err(ValidationError::MissingDestination {
            host: entry.host.clone(),
        }),
        (true, true) => Err(ValidationError::AmbiguousDestination {
            host: entry.host.clone(),
        }),
    }
}

/// Report entries that an earlier entry fully covers.
///
/// Covers exact duplicates and literal patterns that an earlier wildcard
/// pattern already matches. Overlapping wildcards are not detected.
pub fn find_shadowed(entries: &[Entry]) -> Vec<ShadowedEntry> {
    let patterns: Vec<Option<HostPattern>> = entries
        .iter()
        .map(|e| HostPattern::compile(&e.host).ok())
        .collect();

    let mut shadowed = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let host = entry.host.to_ascii_lowercase();
        let winner = patterns[..index].iter().position(|earlier| match earlier {
            Some(p) => p.source() == host || (!host.contains('*') && p.matches(&host)),
            None => false,
        });
        if let Some(shadowed_by) = winner {
            shadowed.push(ShadowedEntry { index, shadowed_by });
        }
    }
    shadowed
}
