/*
[INPUT]:  API key, secret, passphrase and signature algorithm from the caller
[OUTPUT]: Immutable credential bundle used by the login handshake
[POS]:    Auth layer - credential ownership
[UPDATE]: When adding signature algorithms or credential fields
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signature algorithm used for the login credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SignType {
    /// HMAC-SHA256 keyed by the API secret
    #[default]
    #[serde(rename = "SHA256", alias = "sha256", alias = "hmac")]
    HmacSha256,
    /// RSA PKCS#1 v1.5 over SHA-256, secret is a PEM private key
    #[serde(rename = "RSA", alias = "rsa")]
    Rsa,
}

impl SignType {
    /// Wire value of the `signType` login field
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::HmacSha256 => "SHA256",
            SignType::Rsa => "RSA",
        }
    }
}

/// Credentials for private channels
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
    pub sign_type: SignType,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
        sign_type: SignType,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
            sign_type,
        }
    }

    /// HMAC-SHA256 credentials
    pub fn hmac(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self::new(api_key, secret, passphrase, SignType::HmacSha256)
    }

    /// RSA credentials, `private_key_pem` in PKCS#8 or PKCS#1 form
    pub fn rsa(
        api_key: impl Into<String>,
        private_key_pem: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self::new(api_key, private_key_pem, passphrase, SignType::Rsa)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("sign_type", &self.sign_type)
            .finish()
    }
}
