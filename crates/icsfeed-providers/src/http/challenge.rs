//! `Authorization` header values for Basic (RFC 7617), Digest (RFC 7616,
//! MD5 only) and Bearer credentials.

use std::collections::HashMap;

use base64::Engine;
use rand::Rng;

use crate::auth::{AuthMethod, FeedAuth};

/// State of a Digest challenge received in a `WWW-Authenticate` header.
///
/// Kept between requests so later retrievals can answer the same nonce
/// without another round-trip; the nonce count advances on every use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// The server offered `qop=auth`.
    pub qop_auth: bool,
    pub algorithm: String,
    nonce_count: u32,
}

impl DigestChallenge {
    /// Reads a `Digest ...` challenge. Returns `None` for other schemes,
    /// for algorithms other than MD5, or when `realm` or `nonce` is missing.
    pub fn from_header(header: &str) -> Option<Self> {
        let (scheme, rest) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let mut params = challenge_params(rest);
        if params
            .get("algorithm")
            .is_some_and(|algorithm| !algorithm.eq_ignore_ascii_case("MD5"))
        {
            return None;
        }

        Some(Self {
            realm: params.remove("realm")?,
            nonce: params.remove("nonce")?,
            opaque: params.remove("opaque"),
            qop_auth: params
                .get("qop")
                .is_some_and(|qop| qop.split(',').any(|q| q.trim() == "auth")),
            algorithm: params
                .remove("algorithm")
                .unwrap_or_else(|| "MD5".to_string()),
            nonce_count: 0,
        })
    }

    /// Builds the `Authorization` value for one request.
    pub fn respond(&mut self, method: &str, uri: &str, user: &str, pass: &str) -> String {
        let cnonce = client_nonce();
        self.respond_with_cnonce(method, uri, user, pass, &cnonce)
    }

    fn respond_with_cnonce(
        &mut self,
        method: &str,
        uri: &str,
        user: &str,
        pass: &str,
        cnonce: &str,
    ) -> String {
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);

        let ha1 = md5_hex(&format!("{}:{}:{}", user, self.realm, pass));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let response = if self.qop_auth {
            md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2))
        } else {
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut value = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            user, self.realm, self.nonce, uri, response, self.algorithm
        );
        if self.qop_auth {
            value.push_str(&format!(", qop=auth, nc={}, cnonce=\"{}\"", nc, cnonce));
        }
        if let Some(ref opaque) = self.opaque {
            value.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        value
    }
}

/// `Basic base64(user:pass)`.
pub fn basic_header(user: &str, pass: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
    format!("Basic {}", encoded)
}

/// `Bearer <token>`.
pub fn bearer_header(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Header value that can be sent before any challenge, if the scheme allows it.
pub fn preemptive_header(auth: &FeedAuth) -> Option<String> {
    match auth.method {
        AuthMethod::Basic => Some(basic_header(&auth.user, &auth.pass)),
        AuthMethod::Bearer => Some(bearer_header(&auth.pass)),
        AuthMethod::Digest => None,
    }
}

/// Splits `key=value, key="quoted value"` pairs. Keys are lowercased.
fn challenge_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut escaped = false;
            let mut consumed = quoted.len();
            for (i, c) in quoted.char_indices() {
                match c {
                    _ if escaped => {
                        value.push(c);
                        escaped = false;
                    }
                    '\\' => escaped = true,
                    '"' => {
                        consumed = i + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            rest = &quoted[consumed..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        if !key.is_empty() {
            params.insert(key, value);
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }
    params
}

fn client_nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
