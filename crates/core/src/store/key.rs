//! Request keys and content fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::exchange::Request;

/// Normalized `(method, absolute URL)` key of a stored entry.
///
/// The fragment is never part of the key; the query string is kept as sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &url::Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { method: method.to_ascii_uppercase(), url: url.into() }
    }
}

impl From<&Request> for RequestKey {
    fn from(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Content-derived identity of a captured request.
///
/// Covers method, URL, every header and the body, so two captures only
/// collide when they would replay identically.
pub fn fingerprint(request: &Request) -> String {
    let key = RequestKey::from(request);
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_bytes());
    hasher.update(b"\n");
    hasher.update(key.url.as_bytes());
    hasher.update(b"\n");
    for (name, value) in &request.headers {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\n");
    hasher.update(&request.body);
    hex::encode(hasher.finalize())
}
