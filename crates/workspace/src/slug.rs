// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slugify titles and goals for use as working-space filenames.

/// Maximum slug length used for working-space filenames.
pub const MAX_SLUG_LEN: usize = 100;

/// Slugify a string for use as a filename component.
///
/// Lowercases, collapses any run of non-alphanumeric characters into a single
/// hyphen, trims leading/trailing hyphens, and truncates to `max_len`
/// characters (preferring a word boundary, never ending on a hyphen).
pub fn slugify(input: &str, max_len: usize) -> String {
    let lower = input.to_lowercase();

    let mut slug = String::with_capacity(lower.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    // Truncate at a word boundary where possible
    if slug.len() > max_len {
        if let Some(pos) = slug[..max_len].rfind('-') {
            slug.truncate(pos);
        } else {
            slug.truncate(max_len);
        }
    }

    let trimmed = slug.trim_end_matches('-');
    if trimmed.len() != slug.len() {
        slug.truncate(trimmed.len());
    }

    slug
}

#[cfg(test)]
#[path = "slug_tests.rs"]
mod tests;
