//! Identifier normalization for titles.
//!
//! Turns a display title into a lowercase slug made of alphanumerics and
//! underscores, usable both as a file name and as a de-duplication key.
//!
//! Two titles that differ only in punctuation or case map to the same
//! identifier ("What's New?" and "whats new" both become `whats_new`).
//! Callers that key output directories on identifiers share that collision.

/// Symbols spelled out before filtering, since they carry meaning in titles.
const SUBSTITUTIONS: &[(char, &str)] = &[('§', "section")];

/// Normalize a display title into a stable identifier.
///
/// Pure and idempotent: `normalize_identifier(&normalize_identifier(x)) == normalize_identifier(x)`.
pub fn normalize_identifier(title: &str) -> String {
    let mut expanded = String::with_capacity(title.len());
    for ch in title.chars() {
        match SUBSTITUTIONS.iter().find(|(symbol, _)| *symbol == ch) {
            Some((_, word)) => expanded.push_str(word),
            None => expanded.push(ch),
        }
    }

    expanded
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}
