//! Cookie baker: mints and verifies HMAC-SHA256-authenticated opaque
//! auth cookies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;

use crate::identity::IdentityKey;

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("cookie is not valid base64")]
    BadEncoding,
    #[error("cookie is malformed")]
    Malformed,
    #[error("cookie signature does not match")]
    BadSignature,
}

/// Mints and verifies cookies of the form `base64(identity || ':' ||
/// issued_at_secs || ':' || mac)`, where `mac` authenticates everything
/// before it under a server-held HMAC key. Opaque to clients; the
/// identity and issue time are recovered only by a server holding the
/// same key.
pub struct CookieBaker {
    key: hmac::Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieClaims {
    pub identity: IdentityKey,
    pub issued_at_secs: u64,
}

impl CookieBaker {
    pub fn new(secret: &[u8]) -> CookieBaker {
        CookieBaker {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// A key drawn from the OS RNG, for deployments that don't pin a
    /// persistent secret across restarts (every previously minted cookie
    /// is invalidated when the process restarts).
    pub fn random() -> CookieBaker {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        CookieBaker::new(&secret)
    }

    pub fn mint(&self, identity: &IdentityKey, issued_at_secs: u64) -> String {
        let payload = format!("{}:{}", identity.as_str(), issued_at_secs);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        let mut raw = payload.into_bytes();
        raw.push(b':');
        raw.extend_from_slice(tag.as_ref());
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn verify(&self, cookie: &str) -> Result<CookieClaims, CookieError> {
        let raw = URL_SAFE_NO_PAD
            .decode(cookie)
            .map_err(|_| CookieError::BadEncoding)?;
        // Split off the trailing HMAC-SHA256 tag (32 bytes) and its
        // separating colon.
        if raw.len() < 33 {
            return Err(CookieError::Malformed);
        }
        let split = raw.len() - 32;
        let (payload_with_colon, tag) = raw.split_at(split);
        let payload = payload_with_colon
            .strip_suffix(b":")
            .ok_or(CookieError::Malformed)?;
        hmac::verify(&self.key, payload, tag).map_err(|_| CookieError::BadSignature)?;
        let payload_str = std::str::from_utf8(payload).map_err(|_| CookieError::Malformed)?;
        let (identity, issued_at) = payload_str
            .rsplit_once(':')
            .ok_or(CookieError::Malformed)?;
        let issued_at_secs: u64 = issued_at.parse().map_err(|_| CookieError::Malformed)?;
        Ok(CookieClaims {
            identity: IdentityKey::from_display(identity),
            issued_at_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_recovers_identity() {
        let baker = CookieBaker::new(b"test-secret");
        let ident = IdentityKey::from_display("SuperUser");
        let cookie = baker.mint(&ident, 1_700_000_000);
        let claims = baker.verify(&cookie).unwrap();
        assert_eq!(claims.identity, ident);
        assert_eq!(claims.issued_at_secs, 1_700_000_000);
    }

    #[test]
    fn tampered_cookie_fails_verification() {
        let baker = CookieBaker::new(b"test-secret");
        let ident = IdentityKey::from_display("SuperUser");
        let mut cookie = baker.mint(&ident, 1_700_000_000);
        cookie.push('x');
        assert!(baker.verify(&cookie).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let baker = CookieBaker::new(b"key-one");
        let other = CookieBaker::new(b"key-two");
        let ident = IdentityKey::from_display("SuperUser");
        let cookie = baker.mint(&ident, 1);
        assert!(matches!(
            other.verify(&cookie),
            Err(CookieError::BadSignature)
        ));
    }
}
