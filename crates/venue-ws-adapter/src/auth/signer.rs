/*
[INPUT]:  Canonical request parts (timestamp, method, path, body) and credentials
[OUTPUT]: Base64-encoded HMAC-SHA256 or RSA-SHA256 signatures
[POS]:    Auth layer - cryptographic signing for the login credential
[UPDATE]: When changing signing algorithm, key format, or canonical string
*/

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};

use super::{Credentials, SignType};
use crate::error::{Result, WsError};

type HmacSha256 = Hmac<Sha256>;

/// Placeholder some callers pass for "no query string"
const EMPTY_QUERY_PLACEHOLDER: &str = "?";

/// Build the string that gets signed: `timestamp + method + path [+ body]`
pub fn canonical_message(method: &str, path: &str, body: &str, timestamp: &str) -> String {
    let mut message = String::with_capacity(timestamp.len() + method.len() + path.len() + body.len());
    message.push_str(timestamp);
    message.push_str(method);
    message.push_str(path);
    if !body.is_empty() && body != EMPTY_QUERY_PLACEHOLDER {
        message.push_str(body);
    }
    message
}

/// Keyed signer built once from [`Credentials`]
pub enum Signer {
    Hmac { secret: Vec<u8> },
    Rsa { key: Box<RsaPrivateKey> },
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Signer::Hmac { .. } => "Hmac",
            Signer::Rsa { .. } => "Rsa",
        };
        f.debug_struct("Signer").field("kind", &kind).finish()
    }
}

impl Signer {
    /// Create a signer for the credential's algorithm.
    ///
    /// RSA keys are parsed here, so an unusable key fails before any frame is sent.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        match credentials.sign_type {
            SignType::HmacSha256 => Ok(Self::hmac(credentials.secret.as_bytes())),
            SignType::Rsa => Self::rsa_from_pem(&credentials.secret),
        }
    }

    pub fn hmac(secret: &[u8]) -> Self {
        Signer::Hmac {
            secret: secret.to_vec(),
        }
    }

    /// Parse an RSA private key, PKCS#8 first then PKCS#1.
    ///
    /// A bare base64 body without PEM armor is accepted as DER.
    pub fn rsa_from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = if pem.starts_with("-----BEGIN") {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
                .map_err(|e| WsError::Signing(format!("unparsable RSA private key: {e}")))?
        } else {
            let der: String = pem.split_whitespace().collect();
            let der = BASE64
                .decode(der)
                .map_err(|e| WsError::Signing(format!("private key is not PEM or base64: {e}")))?;
            RsaPrivateKey::from_pkcs8_der(&der)
                .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
                .map_err(|e| WsError::Signing(format!("unparsable RSA private key: {e}")))?
        };
        Ok(Signer::Rsa { key: Box::new(key) })
    }

    pub fn sign_type(&self) -> SignType {
        match self {
            Signer::Hmac { .. } => SignType::HmacSha256,
            Signer::Rsa { .. } => SignType::Rsa,
        }
    }

    /// Sign `timestamp + method + path [+ body]` and return base64
    pub fn sign(&self, method: &str, path: &str, body: &str, timestamp: &str) -> Result<String> {
        let message = canonical_message(method, path, body, timestamp);
        self.sign_message(message.as_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<String> {
        match self {
            Signer::Hmac { secret } => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .map_err(|e| WsError::Signing(format!("HMAC key error: {e}")))?;
                mac.update(message);
                Ok(BASE64.encode(mac.finalize().into_bytes()))
            }
            Signer::Rsa { key } => {
                let digest = Sha256::digest(message);
                let signature = key
                    .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .map_err(|e| WsError::Signing(format!("RSA signing failed: {e}")))?;
                Ok(BASE64.encode(signature))
            }
        }
    }
}
