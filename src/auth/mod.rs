mod middleware;
pub mod token;

pub use middleware::{AuthError, RequireAuth, RequireUser};
pub use token::{TokenCodec, TokenError};

/// Extracts the token from a Basic auth header. The password field carries
/// the JWT; the username is ignored.
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (_username, password) = credentials.split_once(':')?;
    Some(password.to_string())
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    #[test]
    fn test_extract_basic_auth_token() {
        let header = format!("Basic {}", STANDARD.encode("builder:tok123"));
        assert_eq!(extract_basic_auth_token(&header).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_basic_auth_token_ignores_username() {
        let header = format!("Basic {}", STANDARD.encode("anything:tok123"));
        assert_eq!(extract_basic_auth_token(&header).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_basic_auth_token_rejects_other_schemes() {
        assert!(extract_basic_auth_token("Bearer tok123").is_none());
        assert!(extract_basic_auth_token("Basic not-base64!").is_none());
    }
}
