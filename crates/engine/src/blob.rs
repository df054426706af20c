use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Process-local reference used to display or play back a binary payload.
///
/// Handles are short `blob:` tokens computed from the payload bytes, so equal
/// payloads get equal handles and a reload yields the same handle again.
/// They are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransientHandle(Arc<str>);

impl TransientHandle {
    /// Computes the handle for a payload.
    ///
    /// # Example
    /// ```
    /// use engine::blob::TransientHandle;
    ///
    /// let handle = TransientHandle::for_payload(&[1, 2, 3]);
    /// assert!(handle.as_str().starts_with("blob:cutline/"));
    /// assert_eq!(handle, TransientHandle::for_payload(&[1, 2, 3]));
    /// ```
    pub fn for_payload(bytes: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Self(Arc::from(format!(
            "blob:cutline/{:016x}-{:x}",
            hasher.finish(),
            bytes.len()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransientHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owned binary payload plus its optional transient handle.
///
/// The bytes are reference counted: clips derived from one source by a split
/// share the same allocation. Payloads are never mutated in place.
///
/// Inside a [`PayloadTable`]-backed record a blob may be stored detached: its
/// bytes live in the table and the blob keeps only the table index.
#[derive(Clone, Serialize, Deserialize)]
pub struct MediaBlob {
    pub mime: String,
    #[serde(
        with = "base64_bytes",
        default = "empty_payload",
        skip_serializing_if = "is_detached_payload"
    )]
    bytes: Arc<[u8]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stored: Option<usize>,
    #[serde(skip)]
    handle: Option<TransientHandle>,
}

fn empty_payload() -> Arc<[u8]> {
    Arc::from(Vec::new())
}

fn is_detached_payload(bytes: &Arc<[u8]>) -> bool {
    bytes.is_empty()
}

impl MediaBlob {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
            stored: None,
            handle: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true when both blobs point at the same allocation.
    pub fn shares_payload_with(&self, other: &MediaBlob) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn handle(&self) -> Option<&TransientHandle> {
        self.handle.as_ref()
    }

    /// Recomputes the transient handle from the owned payload.
    pub fn regenerate(&mut self) -> &TransientHandle {
        self.handle.insert(TransientHandle::for_payload(&self.bytes))
    }

    /// Returns the blob with a handle, computing one only when missing.
    pub fn with_handle(mut self) -> Self {
        if self.handle.is_none() {
            self.regenerate();
        }
        self
    }
}

// Handles are derived data and do not take part in equality.
impl PartialEq for MediaBlob {
    fn eq(&self, other: &Self) -> bool {
        self.mime == other.mime && self.stored == other.stored && self.bytes == other.bytes
    }
}

impl Debug for MediaBlob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .field("stored", &self.stored)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

/// Deduplicated payload store used by project records.
///
/// Capturing detaches every blob into the table, so a payload shared by a
/// library item and its split fragments is written once. Restoring attaches
/// blobs back so equal payloads share one allocation and one handle.
#[derive(Debug, Default)]
pub struct PayloadTable {
    payloads: Vec<MediaBlob>,
    by_content: HashMap<Arc<[u8]>, usize>,
}

impl PayloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from persisted payloads, computing their handles.
    pub fn from_payloads(payloads: Vec<MediaBlob>) -> Self {
        let mut table = Self::new();
        for payload in payloads {
            // Indices must stay stable, so duplicates are kept as entries.
            let index = table.payloads.len();
            table
                .by_content
                .entry(Arc::clone(&payload.bytes))
                .or_insert(index);
            table.payloads.push(payload.with_handle());
        }
        table
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Moves the blob's bytes into the table and leaves the index behind.
    pub fn detach(&mut self, blob: &mut MediaBlob) {
        if blob.stored.is_some() {
            return;
        }
        let index = self.intern(&blob.mime, &blob.bytes);
        blob.bytes = empty_payload();
        blob.stored = Some(index);
        blob.handle = None;
    }

    /// Points a blob read from a record at the shared allocation and handle.
    ///
    /// Inline blobs are interned by content, so records written without a
    /// table still come back sharing payloads.
    pub fn attach(&mut self, blob: &mut MediaBlob) -> Result<()> {
        let index = match blob.stored.take() {
            Some(index) if index < self.payloads.len() => index,
            Some(index) => {
                return Err(EngineError::DanglingPayload {
                    index,
                    available: self.payloads.len(),
                });
            }
            None => {
                let bytes = Arc::clone(&blob.bytes);
                self.intern(&blob.mime, &bytes)
            }
        };
        let entry = &mut self.payloads[index];
        if entry.handle.is_none() {
            entry.regenerate();
        }
        blob.handle = entry.handle.clone();
        blob.bytes = Arc::clone(&entry.bytes);
        Ok(())
    }

    /// Consumes the table, returning the payloads in index order.
    pub fn into_payloads(self) -> Vec<MediaBlob> {
        self.payloads
    }

    fn intern(&mut self, mime: &str, bytes: &Arc<[u8]>) -> usize {
        if let Some(index) = self.by_content.get(bytes) {
            return *index;
        }
        let index = self.payloads.len();
        self.payloads.push(MediaBlob::new(mime, Arc::clone(bytes)));
        self.by_content.insert(Arc::clone(bytes), index);
        index
    }
}

mod base64_bytes {
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<[u8]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Arc::from)
            .map_err(serde::de::Error::custom)
    }
}
