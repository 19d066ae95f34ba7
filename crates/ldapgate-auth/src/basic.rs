//! HTTP Basic-Auth credential extraction

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;

/// Username/password pair taken from an `Authorization` header.
///
/// Lives for a single request. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse an `Authorization: Basic <base64(username:password)>` header value.
///
/// Returns `None` when the header is missing, uses another scheme, or does
/// not decode to `username:password`. The first colon separates the two
/// parts, so passwords may contain colons. An empty username is rejected.
pub fn extract_credentials(header: Option<&str>) -> Option<Credentials> {
    let header = header?.trim();
    let (scheme, payload) = header.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    if username.is_empty() {
        return None;
    }

    Some(Credentials::new(username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", BASE64.encode(raw))
    }

    #[test]
    fn test_extracts_username_and_password() {
        let header = basic("username:password");
        let credentials = extract_credentials(Some(&header)).unwrap();
        assert_eq!(credentials.username, "username");
        assert_eq!(credentials.password, "password");
    }

    #[test]
    fn test_password_may_contain_colons() {
        let header = basic("alice@example.com:pa:ss:word");
        let credentials = extract_credentials(Some(&header)).unwrap();
        assert_eq!(credentials.username, "alice@example.com");
        assert_eq!(credentials.password, "pa:ss:word");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = format!("basic {}", BASE64.encode("bob:secret"));
        assert!(extract_credentials(Some(&header)).is_some());
    }

    #[test]
    fn test_missing_header() {
        assert!(extract_credentials(None).is_none());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(extract_credentials(Some("Basicabcd")).is_none());
        assert!(extract_credentials(Some("Basic foo")).is_none());
        assert!(extract_credentials(Some("Basic")).is_none());
        assert!(extract_credentials(Some("")).is_none());
    }

    #[test]
    fn test_other_scheme_is_ignored() {
        let header = format!("Bearer {}", BASE64.encode("bob:secret"));
        assert!(extract_credentials(Some(&header)).is_none());
    }

    #[test]
    fn test_payload_without_separator() {
        assert!(extract_credentials(Some(&basic("nocolon"))).is_none());
    }

    #[test]
    fn test_empty_username_rejected() {
        assert!(extract_credentials(Some(&basic(":password"))).is_none());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let header = format!("Basic {}", BASE64.encode([0xff, 0xfe, b':', b'x']));
        assert!(extract_credentials(Some(&header)).is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("alice", "hunter2");
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }
}
