//! Request signing for the EcoFlow open API
//!
//! Every REST call carries `accessKey`, `nonce`, `timestamp` and `sign`
//! headers. The signature is an HMAC-SHA256 over the flattened request
//! parameters followed by the access key, nonce and timestamp, keyed by the
//! developer secret. The server recomputes it bit for bit, so the flattening
//! rules in [`flatten`] must not drift.

pub mod flatten;

pub use flatten::{flatten_fields, flatten_params};

use crate::config::{ApiConfig, CredentialsConfig, NonceSetting};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::fmt;

/// Content type sent with signed POST bodies
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Developer credentials and the device they are bound to
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
    device_sn: String,
}

impl Credentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        device_sn: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            device_sn: device_sn.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn device_sn(&self) -> &str {
        &self.device_sn
    }
}

impl From<&CredentialsConfig> for Credentials {
    fn from(cfg: &CredentialsConfig) -> Self {
        Self::new(
            cfg.access_key.trim(),
            cfg.secret_key.trim(),
            cfg.device_sn.trim(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("device_sn", &self.device_sn)
            .finish()
    }
}

/// Nonce strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonceMode {
    /// Six random decimal digits per request
    Random,
    /// The same value on every request
    Fixed(String),
}

impl From<&ApiConfig> for NonceMode {
    fn from(cfg: &ApiConfig) -> Self {
        match cfg.nonce {
            NonceSetting::Random => Self::Random,
            NonceSetting::Fixed => Self::Fixed(cfg.fixed_nonce.clone()),
        }
    }
}

impl NonceMode {
    fn next(&self) -> String {
        match self {
            Self::Random => random_nonce(),
            Self::Fixed(nonce) => nonce.clone(),
        }
    }
}

/// Authentication headers for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub nonce: String,
    pub timestamp: String,
    pub sign: String,
    pub content_type: Option<&'static str>,
}

impl SignedHeaders {
    /// Header name/value pairs in the order they are sent
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("accessKey", self.access_key.as_str()),
            ("nonce", self.nonce.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("sign", self.sign.as_str()),
        ];
        if let Some(ct) = self.content_type {
            pairs.push(("Content-Type", ct));
        }
        pairs
    }

    /// Attach the headers to an outgoing request
    pub fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (name, value) in self.pairs() {
            builder = builder.header(name, value);
        }
        builder
    }
}

/// Signs request payloads with the developer secret
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    nonce: NonceMode,
}

impl RequestSigner {
    pub fn new(credentials: Credentials, nonce: NonceMode) -> Self {
        Self { credentials, nonce }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign a request using the current time and the configured nonce strategy
    ///
    /// `path` does not take part in the signature; it is only logged.
    pub fn sign(&self, payload: &Value, method: &Method, path: &str) -> SignedHeaders {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let nonce = self.nonce.next();
        tracing::trace!(%method, path, %nonce, timestamp_ms, "signing request");
        self.sign_at(payload, method, &nonce, timestamp_ms)
    }

    /// Deterministic signing primitive with an explicit nonce and timestamp
    pub fn sign_at(
        &self,
        payload: &Value,
        method: &Method,
        nonce: &str,
        timestamp_ms: i64,
    ) -> SignedHeaders {
        let base = self.base_string(payload, nonce, timestamp_ms);
        let sign = hmac_hex(self.credentials.secret_key.as_bytes(), base.as_bytes());
        SignedHeaders {
            access_key: self.credentials.access_key.clone(),
            nonce: nonce.to_string(),
            timestamp: timestamp_ms.to_string(),
            sign,
            content_type: (*method == Method::POST).then_some(JSON_CONTENT_TYPE),
        }
    }

    /// The exact string the HMAC is computed over
    pub fn base_string(&self, payload: &Value, nonce: &str, timestamp_ms: i64) -> String {
        let auth = format!(
            "accessKey={}&nonce={}&timestamp={}",
            self.credentials.access_key, nonce, timestamp_ms
        );
        let params = flatten_params(payload);
        if params.is_empty() {
            auth
        } else {
            format!("{}&{}", params, auth)
        }
    }
}

/// Lower-case hex HMAC-SHA256
pub fn hmac_hex(key: &[u8], message: &[u8]) -> String {
    let mac = hmac_sha256::HMAC::mac(message, key);
    mac.iter().map(|b| format!("{:02x}", b)).collect()
}

fn random_nonce() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 900_000 + 100_000;
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ACCESS: &str = "Fp4SvIprYSDPXtYJidEtUAd1o";
    const SECRET: &str = "WIbFEKre0s6sLnh4ei7SPUeYnptHG6V";

    fn signer(nonce: NonceMode) -> RequestSigner {
        RequestSigner::new(Credentials::new(ACCESS, SECRET, "HJ31ZDH4ZF6N0123"), nonce)
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        assert_eq!(
            hmac_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn base_string_for_query_payload() {
        let s = signer(NonceMode::Random);
        assert_eq!(
            s.base_string(&json!({"sn": "HJ31ZDH4ZF6N0123"}), "123456", 1_718_000_000_000),
            "sn=HJ31ZDH4ZF6N0123&accessKey=Fp4SvIprYSDPXtYJidEtUAd1o&nonce=123456&timestamp=1718000000000"
        );
    }

    #[test]
    fn base_string_without_params() {
        let s = signer(NonceMode::Random);
        assert_eq!(
            s.base_string(&json!({}), "123456", 1_718_000_000_000),
            "accessKey=Fp4SvIprYSDPXtYJidEtUAd1o&nonce=123456&timestamp=1718000000000"
        );
    }

    #[test]
    fn sign_at_known_vectors() {
        let s = signer(NonceMode::Random);
        let get = s.sign_at(
            &json!({"sn": "HJ31ZDH4ZF6N0123"}),
            &Method::GET,
            "123456",
            1_718_000_000_000,
        );
        assert_eq!(
            get.sign,
            "26daf80da0ab3f70cd9d5281bcaee49ef1a59078991dcb2e45272b1da4c6e1b2"
        );
        assert_eq!(get.content_type, None);
        assert_eq!(get.timestamp, "1718000000000");

        let cert = s.sign_at(&json!({}), &Method::GET, "123456", 1_718_000_000_000);
        assert_eq!(
            cert.sign,
            "7de62e46fdab3b39367d008d7134230db90f98c4e4f390eed7944c0332911c2a"
        );
    }

    #[test]
    fn sign_is_deterministic_given_nonce_and_timestamp() {
        let s = signer(NonceMode::Random);
        let body = json!({"sn": "X", "params": {"code": "C", "beginTime": "a"}});
        let a = s.sign_at(&body, &Method::POST, "42", 1);
        let b = s.sign_at(&body, &Method::POST, "42", 1);
        assert_eq!(a, b);
        assert_eq!(a.content_type, Some(JSON_CONTENT_TYPE));

        let c = s.sign_at(&body, &Method::POST, "43", 1);
        assert_ne!(a.sign, c.sign);
    }

    #[test]
    fn fixed_nonce_is_used_verbatim() {
        let s = signer(NonceMode::Fixed("123456".to_string()));
        let headers = s.sign(&json!({}), &Method::GET, "/iot-open/sign/certification");
        assert_eq!(headers.nonce, "123456");
        assert_eq!(headers.access_key, ACCESS);
        assert_eq!(headers.sign.len(), 64);
    }

    #[test]
    fn random_nonce_is_six_digits() {
        for _ in 0..32 {
            let n = random_nonce();
            assert_eq!(n.len(), 6);
            assert!(n.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn header_pairs_include_content_type_for_post() {
        let s = signer(NonceMode::Random);
        let headers = s.sign_at(&json!({"a": 1}), &Method::POST, "1", 2);
        let names: Vec<&str> = headers.pairs().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["accessKey", "nonce", "timestamp", "sign", "Content-Type"]
        );
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new(ACCESS, SECRET, "SN");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains(SECRET));
    }
}
