use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content-address URI pointing at one immutable stored payload.
///
/// Internally a locator is written `ar://<txid>`. Before fetching it is
/// translated into a gateway URL (`https://<gateway>/<txid>`). A locator is
/// never reused for different content: the storage network mints a fresh
/// transaction id for every upload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentLocator {
    txid: String,
}

impl ContentLocator {
    /// URI scheme used for internal references.
    pub const SCHEME: &'static str = "ar";

    /// Build a locator from a storage transaction id.
    pub fn from_txid(txid: impl Into<String>) -> Result<Self, TypeError> {
        let txid = txid.into();
        validate_txid(&txid)?;
        Ok(Self { txid })
    }

    /// Parse an `ar://<txid>` URI.
    pub fn parse(uri: &str) -> Result<Self, TypeError> {
        let txid = uri
            .strip_prefix("ar://")
            .ok_or_else(|| TypeError::InvalidLocator(format!("missing ar:// scheme in {uri:?}")))?;
        Self::from_txid(txid)
    }

    /// The storage transaction id.
    pub fn txid(&self) -> &str {
        &self.txid
    }

    /// The internal `ar://<txid>` form.
    pub fn to_uri(&self) -> String {
        format!("{}://{}", Self::SCHEME, self.txid)
    }

    /// Fetchable location of the payload behind `gateway`
    /// (e.g. `https://arweave.net`).
    pub fn to_gateway_url(&self, gateway: &str) -> String {
        format!("{}/{}", gateway.trim_end_matches('/'), self.txid)
    }
}

fn validate_txid(txid: &str) -> Result<(), TypeError> {
    if txid.is_empty() {
        return Err(TypeError::InvalidLocator("empty transaction id".into()));
    }
    if let Some(c) = txid
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(TypeError::InvalidLocator(format!(
            "unexpected character {c:?} in transaction id"
        )));
    }
    Ok(())
}

impl FromStr for ContentLocator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentLocator({})", self.to_uri())
    }
}

impl fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl Serialize for ContentLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for ContentLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_format() {
        let locator = ContentLocator::parse("ar://abc_DEF-123").unwrap();
        assert_eq!(locator.txid(), "abc_DEF-123");
        assert_eq!(locator.to_uri(), "ar://abc_DEF-123");
        assert_eq!(format!("{locator}"), "ar://abc_DEF-123");
    }

    #[test]
    fn gateway_translation() {
        let locator = ContentLocator::from_txid("tx1").unwrap();
        assert_eq!(
            locator.to_gateway_url("https://arweave.net"),
            "https://arweave.net/tx1"
        );
        assert_eq!(
            locator.to_gateway_url("https://arweave.net/"),
            "https://arweave.net/tx1"
        );
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(ContentLocator::parse("https://arweave.net/tx1").is_err());
        assert!(ContentLocator::parse("ipfs://tx1").is_err());
    }

    #[test]
    fn rejects_empty_and_invalid_txid() {
        assert!(ContentLocator::parse("ar://").is_err());
        assert!(ContentLocator::parse("ar://a/b").is_err());
        assert!(ContentLocator::parse("ar://a b").is_err());
    }

    #[test]
    fn serde_uses_uri_form() {
        let locator = ContentLocator::from_txid("tx42").unwrap();
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"ar://tx42\"");
        let parsed: ContentLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, locator);
    }

    proptest! {
        #[test]
        fn any_base64url_txid_roundtrips(txid in "[A-Za-z0-9_-]{1,64}") {
            let locator = ContentLocator::from_txid(txid.clone()).unwrap();
            let reparsed = ContentLocator::parse(&locator.to_uri()).unwrap();
            prop_assert_eq!(reparsed.txid(), txid.as_str());
        }
    }
}
