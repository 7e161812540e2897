//! Identity normalization.
//!
//! Identities are user names or peer ids declared by a connection. They are
//! compared case-insensitively, so every registry key goes through
//! [`normalize`] first.

/// Lower-case an identity for use as a registry key.
///
/// Only case is folded; surrounding whitespace is part of the identity.
/// Returns `None` for empty or whitespace-only identities, which the router
/// treats the same as a missing field.
pub fn normalize(identity: &str) -> Option<String> {
    if identity.trim().is_empty() {
        None
    } else {
        Some(identity.to_lowercase())
    }
}

/// Shorten an identity for log output.
///
/// Peer ids are often full public keys; logging the first few characters is
/// enough to correlate lines.
pub fn short_identity(identity: &str) -> &str {
    const SHORT_LEN: usize = 10;
    match identity.char_indices().nth(SHORT_LEN) {
        Some((idx, _)) => &identity[..idx],
        None => identity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize("Alice").as_deref(), Some("alice"));
        assert_eq!(normalize("BOB").as_deref(), Some("bob"));
    }

    #[test]
    fn normalize_keeps_surrounding_whitespace() {
        assert_eq!(normalize(" Carol ").as_deref(), Some(" carol "));
        assert_ne!(normalize(" carol "), normalize("carol"));
    }

    #[test]
    fn normalize_rejects_blank() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn short_identity_truncates_long_ids() {
        assert_eq!(short_identity("04a1b2c3d4e5f60718293a"), "04a1b2c3d4");
        assert_eq!(short_identity("alice"), "alice");
    }

    #[test]
    fn short_identity_respects_char_boundaries() {
        let id = "ñññññññññññññ";
        assert_eq!(short_identity(id).chars().count(), 10);
    }
}
