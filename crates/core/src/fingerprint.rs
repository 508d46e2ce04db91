//! Scrape-identity fingerprints.
//!
//! A fingerprint is the SHA-256 of `scheme://address/path?query`, where the
//! query is the target's params sorted by key and percent-encoded. Labels and
//! selectors do not participate.

use crate::target::Scheme;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unreserved characters per RFC 3986 stay literal.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A SHA-256 fingerprint represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a target's scrape identity.
    ///
    /// Params may arrive in any order.
    pub fn compute<'a, I>(scheme: Scheme, address: &str, metric_path: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut hasher = Sha256::new();
        hasher.update(canonical_form(scheme, address, metric_path, params).as_bytes());
        Self(hasher.finalize().into())
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// The string that gets hashed.
pub fn canonical_form<'a, I>(scheme: Scheme, address: &str, metric_path: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut params = params.into_iter().collect::<Vec<_>>();
    params.sort();
    let query = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, QUERY_ENCODE),
                utf8_percent_encode(v, QUERY_ENCODE)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{scheme}://{address}{metric_path}?{query}")
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
