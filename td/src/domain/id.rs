//! Id and slug generation.
//!
//! Projects get a stable id plus a filesystem-safe sanitized name. Tasks get
//! a short slug derived from a hash of their origin so the same
//! `{area, index, title}` always produces the same id across re-analysis.

use taskstore::content_hash;

/// Derive a short (~8 hex char) stable slug from arbitrary parts.
///
/// Used for task ids (`{area, index, title}`) and kobold-plan file names
/// (`{area}-{index}-{slug}-{hash}`).
pub fn short_slug(parts: &[&str]) -> String {
    let joined = parts.join("\u{1f}");
    let hash = content_hash(joined.as_bytes());
    hash[..8].to_string()
}

/// Sanitize a project name into a filesystem-safe directory component.
///
/// Lowercase, non-alphanumeric runs collapse to a single `-`, leading and
/// trailing `-` trimmed.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Generate a fresh, globally-unique id for a runtime entity (kobold, plan,
/// agent registration). Not content-derived - two calls always differ.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_slug_is_stable() {
        let a = short_slug(&["backend", "0", "Add login endpoint"]);
        let b = short_slug(&["backend", "0", "Add login endpoint"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn short_slug_differs_on_any_part() {
        let a = short_slug(&["backend", "0", "Add login endpoint"]);
        let b = short_slug(&["backend", "1", "Add login endpoint"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_name_collapses_and_trims() {
        assert_eq!(sanitize_name("My Cool Project!!"), "my-cool-project");
        assert_eq!(sanitize_name("  leading-and-trailing  "), "leading-and-trailing");
    }
}
