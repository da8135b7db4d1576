use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token does not decode to UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Reversible, URL-safe codec for the proxy capability tokens.
///
/// A token is the unpadded URL-safe base64 of the input masked with a
/// cycling XOR keystream. Tokens are opaque, not secret: authorization
/// rests on the allowlist, the mask only keeps the target URL from being
/// read or forged casually. Encoding is deterministic so the same URL
/// always yields the same token, which is what allowlist membership
/// checks compare against.
#[derive(Clone)]
pub struct TokenCodec {
    key: Vec<u8>,
}

impl TokenCodec {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "token key must not be empty");
        Self { key }
    }

    pub fn encode(&self, plain: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.mask(plain.as_bytes()))
    }

    pub fn decode(&self, token: &str) -> Result<String, TokenError> {
        let masked = URL_SAFE_NO_PAD.decode(token)?;
        Ok(String::from_utf8(self.mask(&masked))?)
    }

    fn mask(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .zip(self.key.iter().cycle())
            .map(|(byte, key)| byte ^ key)
            .collect()
    }
}
