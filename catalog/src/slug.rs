//! URL slug derivation for catalog entries.

/// Maximum slug length after normalization.
pub const MAX_SLUG_LEN: usize = 50;

/// Derives a URL-safe slug from a display name.
///
/// Lowercases, strips characters that are not alphanumeric, underscore,
/// whitespace, or hyphen, collapses runs of whitespace and hyphens into a
/// single hyphen, and truncates to [`MAX_SLUG_LEN`] characters. Collision
/// handling is the store's job, not this function's.
pub fn slugify(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' || c.is_whitespace() {
            cleaned.push(c);
        }
    }

    let mut slug = String::with_capacity(cleaned.len());
    let mut pending_separator = false;
    for c in cleaned.trim().chars() {
        if c.is_whitespace() || c == '-' {
            pending_separator = !slug.is_empty();
        } else {
            if pending_separator {
                slug.push('-');
                pending_separator = false;
            }
            slug.push(c);
        }
    }

    slug.chars().take(MAX_SLUG_LEN).collect()
}
