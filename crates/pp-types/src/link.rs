use std::fmt;

use url::Url;

use crate::error::TypeError;
use crate::locator::ContentLocator;

/// Default app scheme written into QR codes and NFC tags.
pub const DEFAULT_APP_SCHEME: &str = "com.permapass.app";

const READ_ACTION: &str = "read";
const METADATA_PARAM: &str = "metadataURI";

/// Deep link carried by a physical data carrier:
/// `<scheme>://read?metadataURI=<content-locator>`.
///
/// The locator names the stored identity metadata document, not the passport
/// data itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataCarrierLink {
    scheme: String,
    metadata: ContentLocator,
}

impl DataCarrierLink {
    pub fn new(scheme: impl Into<String>, metadata: ContentLocator) -> Self {
        Self {
            scheme: scheme.into(),
            metadata,
        }
    }

    pub fn with_default_scheme(metadata: ContentLocator) -> Self {
        Self::new(DEFAULT_APP_SCHEME, metadata)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn metadata_locator(&self) -> &ContentLocator {
        &self.metadata
    }

    pub fn encode(&self) -> String {
        format!(
            "{}://{READ_ACTION}?{METADATA_PARAM}={}",
            self.scheme,
            self.metadata.to_uri()
        )
    }

    pub fn parse(link: &str) -> Result<Self, TypeError> {
        let url = Url::parse(link).map_err(|e| TypeError::InvalidLink(e.to_string()))?;
        if url.host_str() != Some(READ_ACTION) {
            return Err(TypeError::InvalidLink(format!(
                "expected the {READ_ACTION:?} action in {link:?}"
            )));
        }
        let uri = url
            .query_pairs()
            .find(|(k, _)| k == METADATA_PARAM)
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| TypeError::InvalidLink(format!("missing {METADATA_PARAM} in {link:?}")))?;
        let metadata = ContentLocator::parse(&uri)?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            metadata,
        })
    }
}

impl fmt::Display for DataCarrierLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_format() {
        let link = DataCarrierLink::with_default_scheme(ContentLocator::from_txid("meta1").unwrap());
        assert_eq!(
            link.encode(),
            "com.permapass.app://read?metadataURI=ar://meta1"
        );
    }

    #[test]
    fn parse_roundtrip() {
        let link = DataCarrierLink::parse("com.permapass.app://read?metadataURI=ar://Xy-_9").unwrap();
        assert_eq!(link.scheme(), "com.permapass.app");
        assert_eq!(link.metadata_locator().txid(), "Xy-_9");
        assert_eq!(DataCarrierLink::parse(&link.encode()).unwrap(), link);
    }

    #[test]
    fn parse_percent_encoded_locator() {
        let link = DataCarrierLink::parse("com.permapass.app://read?metadataURI=ar%3A%2F%2Fabc").unwrap();
        assert_eq!(link.metadata_locator().txid(), "abc");
    }

    #[test]
    fn rejects_other_actions_and_missing_param() {
        assert!(DataCarrierLink::parse("com.permapass.app://write?metadataURI=ar://a").is_err());
        assert!(DataCarrierLink::parse("com.permapass.app://read?other=1").is_err());
        assert!(DataCarrierLink::parse("not a link").is_err());
    }
}
