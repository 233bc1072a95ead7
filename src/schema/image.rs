use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

const TEXT_URI_PREFIX: &str = "data:text/plain,";

/// An opaque captured image.
///
/// The payload is never decoded as pixels here; vision backends decide how to
/// interpret it. A payload that is printable UTF-8 exposes a text layer, which
/// is how screenshots of text and test fixtures are fed through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImagePayload {
    data: Bytes,
}

impl ImagePayload {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(text.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Recognisable text carried by the payload, if any.
    ///
    /// `data:text/plain,` URIs yield their body; other `data:` URIs are treated
    /// as encoded pixels and yield nothing. Bare payloads qualify when they are
    /// valid UTF-8 without control characters other than whitespace.
    pub fn text_layer(&self) -> Option<&str> {
        let text = std::str::from_utf8(&self.data).ok()?;
        if let Some(body) = text.strip_prefix(TEXT_URI_PREFIX) {
            return Some(body);
        }
        if text.starts_with("data:") {
            return None;
        }
        let printable = text
            .chars()
            .all(|c| !c.is_control() || c.is_whitespace());
        printable.then_some(text)
    }

    /// Stable 64-bit fingerprint: the leading bytes of the payload's SHA-256.
    pub fn fingerprint(&self) -> u64 {
        let digest = Sha256::digest(&self.data);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(head)
    }
}

impl From<&str> for ImagePayload {
    fn from(value: &str) -> Self {
        Self::from_text(value.to_string())
    }
}

impl From<Vec<u8>> for ImagePayload {
    fn from(value: Vec<u8>) -> Self {
        Self::from_bytes(value)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PayloadRepr {
    Text(String),
    Binary(Vec<u8>),
}

impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.data) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(self.data.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PayloadRepr::deserialize(deserializer)? {
            PayloadRepr::Text(text) => Self::from_text(text),
            PayloadRepr::Binary(bytes) => Self::from_bytes(bytes),
        })
    }
}
