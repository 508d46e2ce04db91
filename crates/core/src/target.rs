//! Scrape target descriptions and normalization.
//!
//! A [`TargetItem`] is what clients submit. [`TargetSpec::from_item`] turns it
//! into the normalized form the registry stores and fingerprints: defaults are
//! applied, the scheme is split off the address, the timeout is clamped to the
//! interval, and a single credential is kept.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::kv::{KeyValue, KvKind, pairs_from_map};
use crate::{DEFAULT_METRIC_PATH, DEFAULT_SCRAPE_INTERVAL_SECS, DEFAULT_SCRAPE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// URL scheme used to scrape a target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Well-known port for the scheme.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("http") {
            Ok(Self::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(Self::Https)
        } else {
            Err(Error::UnsupportedScheme(s.to_string()))
        }
    }
}

/// Split an optional `scheme://` prefix off an address.
pub fn split_scheme(raw: &str) -> Result<(Option<Scheme>, &str)> {
    match raw.split_once("://") {
        Some((scheme, rest)) => Ok((Some(scheme.parse()?), rest)),
        None => Ok((None, raw)),
    }
}

/// Split `host:port` when the address has exactly that shape.
///
/// The host must be a DNS name or IPv4 literal and the port one to five digits.
/// Anything else (bare hosts, IPv6 literals, paths) yields `None`.
pub fn split_host_port(address: &str) -> Option<(&str, &str)> {
    let (host, port) = address.rsplit_once(':')?;
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    let port_ok = (1..=5).contains(&port.len()) && port.bytes().all(|b| b.is_ascii_digit());
    (host_ok && port_ok).then_some((host, port))
}

/// Host and port to hand to the proxy, falling back to the scheme's default port.
pub fn proxy_host_port(address: &str, scheme: Scheme) -> (String, String) {
    match split_host_port(address) {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (address.to_string(), scheme.default_port().to_string()),
    }
}

/// Reject empty addresses, anything carrying a path, query or fragment, and
/// a `:port` suffix that is not a port in 1..=65535.
pub fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::MissingField("address"));
    }
    if address
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
    {
        return Err(Error::InvalidAddress(format!(
            "'{address}' must be host[:port] without path or query"
        )));
    }
    if address.contains(':') {
        let port = split_host_port(address)
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .filter(|port| *port != 0);
        if port.is_none() {
            return Err(Error::InvalidAddress(format!(
                "'{address}' must be host:port with a port between 1 and 65535"
            )));
        }
    }
    Ok(())
}

/// Authentication material submitted with a target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAuth {
    /// Raw `user:password` string for basic auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl TargetAuth {
    pub fn is_empty(&self) -> bool {
        non_empty(self.base.as_deref()).is_none() && non_empty(self.bearer_token.as_deref()).is_none()
    }
}

/// The credential actually used for a target. Bearer wins over basic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    /// Raw `user:password`; encoding happens at the edge.
    Basic(String),
}

impl Credentials {
    pub fn select(bearer: Option<&str>, base: Option<&str>) -> Option<Self> {
        if let Some(token) = non_empty(bearer) {
            Some(Self::Bearer(token.to_string()))
        } else {
            non_empty(base).map(|b| Self::Basic(b.to_string()))
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// A target description as submitted by clients.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetItem {
    pub address: String,
    #[serde(default)]
    pub metric_path: Option<String>,
    #[serde(default, alias = "scrape_time")]
    pub scrape_interval: Option<i64>,
    #[serde(default)]
    pub scrape_timeout: Option<i64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<TargetAuth>,
}

impl TargetItem {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Clamp a scrape timeout so it never exceeds the interval.
pub fn clamp_timeout(interval_secs: i64, timeout_secs: i64) -> i64 {
    timeout_secs.min(interval_secs)
}

/// Normalize a metric path so it always starts with `/`.
pub fn normalize_metric_path(path: &str) -> String {
    if path.is_empty() {
        DEFAULT_METRIC_PATH.to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn seconds_or_default(field: &'static str, value: Option<i64>, default: i64) -> Result<i64> {
    match value {
        None | Some(0) => Ok(default),
        Some(v) if v > 0 => Ok(v),
        Some(v) => Err(Error::InvalidValue(format!("{field} must be positive, got {v}"))),
    }
}

/// Normalized target ready for storage and fingerprinting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    pub scheme: Scheme,
    pub address: String,
    pub metric_path: String,
    pub scrape_interval_secs: i64,
    pub scrape_timeout_secs: i64,
    pub bearer_token: Option<String>,
    pub base_auth: Option<String>,
    pub labels: Vec<KeyValue>,
    pub params: Vec<KeyValue>,
}

impl TargetSpec {
    pub fn from_item(item: &TargetItem) -> Result<Self> {
        let (scheme, address) = split_scheme(item.address.trim())?;
        validate_address(address)?;

        let metric_path = normalize_metric_path(item.metric_path.as_deref().unwrap_or_default());
        let interval = seconds_or_default(
            "scrape_interval",
            item.scrape_interval,
            DEFAULT_SCRAPE_INTERVAL_SECS,
        )?;
        let timeout = seconds_or_default(
            "scrape_timeout",
            item.scrape_timeout,
            DEFAULT_SCRAPE_TIMEOUT_SECS,
        )?;

        let (bearer_token, base_auth) = match item.auth.as_ref().and_then(|a| {
            Credentials::select(a.bearer_token.as_deref(), a.base.as_deref())
        }) {
            Some(Credentials::Bearer(token)) => (Some(token), None),
            Some(Credentials::Basic(base)) => (None, Some(base)),
            None => (None, None),
        };

        Ok(Self {
            scheme: scheme.unwrap_or_default(),
            address: address.to_string(),
            metric_path,
            scrape_interval_secs: interval,
            scrape_timeout_secs: clamp_timeout(interval, timeout),
            bearer_token,
            base_auth,
            labels: pairs_from_map(KvKind::Label, &item.labels)?,
            params: pairs_from_map(KvKind::Param, &item.params)?,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(
            self.scheme,
            &self.address,
            &self.metric_path,
            self.params.iter().map(|p| (p.key.as_str(), p.value.as_str())),
        )
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::select(self.bearer_token.as_deref(), self.base_auth.as_deref())
    }
}
