//! Request and response types exchanged between the host, the agent and the
//! network.
//!
//! These are deliberately small: the agent only ever looks at the method,
//! URL, headers, body, status and content type of a message.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// Header map with lower-cased names, sorted for stable hashing.
pub type Headers = BTreeMap<String, String>;

/// An intercepted (or replayed) HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(deserialize_with = "de_method")]
    pub method: String,
    pub url: Url,
    #[serde(default, deserialize_with = "de_headers")]
    pub headers: Headers,
    #[serde(default)]
    pub body: Bytes,
    /// Host-reported request mode; `navigate` marks a top-level page load.
    #[serde(default)]
    pub mode: Option<String>,
}

impl Request {
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.to_ascii_uppercase(), url, headers: Headers::new(), body: Bytes::new(), mode: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), ..Self::new("POST", url) }
    }

    /// Builder-style header setter; names are stored lower-case.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Whether the caller would accept an HTML page as the response.
    pub fn accepts_html(&self) -> bool {
        self.mode.as_deref() == Some("navigate") || self.header("accept").is_some_and(|a| a.contains("text/html"))
    }
}

/// A response, either live from the network or replayed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default, deserialize_with = "de_headers")]
    pub headers: Headers,
    #[serde(default)]
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: Headers::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Pages, stylesheets and scripts are the only runtime-cacheable types.
    pub fn is_cacheable_type(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("text/css") || ct.contains("javascript")
        })
    }
}

fn de_method<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let method = String::deserialize(deserializer)?;
    Ok(method.to_ascii_uppercase())
}

fn de_headers<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
}
