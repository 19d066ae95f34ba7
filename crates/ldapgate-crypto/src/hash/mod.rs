//! Hash utilities

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed digest of a `username:password` pair, used as an opaque cache key.
///
/// The pair is fed to the MAC in pieces so no joined copy of the password
/// is ever allocated.
pub fn credentials_digest(secret: &str, username: &str, password: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(username.as_bytes());
    mac.update(b":");
    mac.update(password.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
