// SPDX-License-Identifier: MIT

//! OAuth1 request signing (RFC 5849, HMAC-SHA1).
//!
//! The signature is a pure function of its inputs: nonce and timestamp are
//! supplied by the caller, never generated here.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::borrow::Cow;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const OAUTH_CONSUMER_KEY: &str = "oauth_consumer_key";
pub const OAUTH_NONCE: &str = "oauth_nonce";
pub const OAUTH_SIGNATURE: &str = "oauth_signature";
pub const OAUTH_SIGNATURE_METHOD: &str = "oauth_signature_method";
pub const OAUTH_SIGNATURE_METHOD_VALUE: &str = "HMAC-SHA1";
pub const OAUTH_TIMESTAMP: &str = "oauth_timestamp";
pub const OAUTH_ACCESS_TOKEN: &str = "oauth_token";
pub const OAUTH_VERSION: &str = "oauth_version";
pub const OAUTH_VERSION_VALUE: &str = "1.0";

/// Percent-encode per the RFC 3986 unreserved set (OAuth1 rules).
pub fn percent_encode(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// The parameter set of a request to be signed: base URL, HTTP method and
/// all query/OAuth parameters. Signing produces a new value; the input is
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequestParams {
    pub url: String,
    pub method: String,
    pub parameters: BTreeMap<String, String>,
}

impl SignRequestParams {
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            parameters,
        }
    }
}

/// One OAuth1 signature computation over a canonicalized parameter set.
pub struct OauthSignature<'a> {
    url: &'a str,
    method: &'a str,
    parameters: &'a BTreeMap<String, String>,
    consumer_secret: &'a str,
    token_secret: Option<&'a str>,
}

impl<'a> OauthSignature<'a> {
    pub fn new(
        url: &'a str,
        method: &'a str,
        parameters: &'a BTreeMap<String, String>,
        consumer_secret: &'a str,
        token_secret: Option<&'a str>,
    ) -> Self {
        Self {
            url,
            method,
            parameters,
            consumer_secret,
            token_secret,
        }
    }

    /// Canonical parameter string: pairs percent-encoded, then sorted by
    /// encoded key (ties broken by encoded value), joined as `k=v` with `&`.
    fn canonical_parameters(&self) -> String {
        let mut encoded: Vec<(String, String)> = self
            .parameters
            .iter()
            .map(|(key, value)| {
                (
                    percent_encode(key).into_owned(),
                    percent_encode(value).into_owned(),
                )
            })
            .collect();
        encoded.sort();

        encoded
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signature base string: `METHOD&enc(url)&enc(params)`.
    pub fn base_string(&self) -> String {
        format!(
            "{}&{}&{}",
            self.method.to_uppercase(),
            percent_encode(self.url),
            percent_encode(&self.canonical_parameters())
        )
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            percent_encode(self.consumer_secret),
            percent_encode(self.token_secret.unwrap_or(""))
        )
    }

    /// Base64-encoded HMAC-SHA1 over the base string.
    pub fn signature(&self) -> String {
        let mut mac = HmacSha1::new_from_slice(self.signing_key().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(self.base_string().as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Percent-encoded signature, ready to be placed in a parameter set.
    pub fn encoded_signature(&self) -> String {
        percent_encode(&self.signature()).into_owned()
    }
}

/// Format signed parameters as an `Authorization: OAuth …` header value:
/// `OAuth k1="v1", k2="v2"`.
pub fn oauth_header(parameters: &BTreeMap<String, String>) -> String {
    let joined = parameters
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {joined}")
}

/// Random nonce for OAuth1 parameters: 16 bytes, hex-encoded.
pub fn generate_nonce() -> String {
    use ring::rand::{SecureRandom, SystemRandom};

    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .expect("system RNG unavailable");
    hex::encode(bytes)
}
