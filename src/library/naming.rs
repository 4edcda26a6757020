//! Turning user supplied titles into file-safe identifiers.

use crate::error::{MusicError, MusicResult};

/// Replaces each run of whitespace inside an identifier.
pub const FILL_CHAR: char = '_';
/// Longest identifier kept, in characters.
pub const MAX_ID_LEN: usize = 100;

fn is_safe(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Maps a raw title onto the identifier used for file and playlist names.
///
/// Characters outside the safe set are dropped, whitespace runs collapse to
/// [`FILL_CHAR`] and leading/trailing whitespace disappears. Leading dots are
/// stripped so an identifier can never name a hidden file or `..`.
/// Applying it to its own output returns the same string.
pub fn resolve_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_fill = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_fill = true;
            continue;
        }
        if !is_safe(c) {
            continue;
        }
        if pending_fill && !out.is_empty() {
            out.push(FILL_CHAR);
        }
        pending_fill = false;
        out.push(c);
    }

    let trimmed = out.trim_start_matches('.');
    trimmed.chars().take(MAX_ID_LEN).collect()
}

/// Like [`resolve_identifier`], but rejects names that sanitize to nothing.
pub fn sanitize(raw: &str) -> MusicResult<String> {
    let id = resolve_identifier(raw);
    if id.is_empty() {
        return Err(MusicError::InvalidName(raw.to_string()));
    }
    Ok(id)
}
