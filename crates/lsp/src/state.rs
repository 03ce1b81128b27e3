// ==============================================================================
// Document identity, versions and the open-document text store
// ==============================================================================
//
// The text store is owned by the reactor and only ever touched from its
// sequential loop, so it needs no locking. Everything shared with background
// workers lives in `cache` and `supervisor`.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use crate::analysis::AnalysisError;
use crate::convert::apply_change;

/// Client-assigned edit counter. `None` means the flow is not versioned.
pub type Version = Option<i32>;

/// Session counter handed out by the cache each time a document is opened.
pub type Generation = u64;

/// True iff both versions are known and `incoming` is older than `stored`.
/// An unversioned side is never outdated.
pub fn outdated(stored: Version, incoming: Version) -> bool {
    matches!((stored, incoming), (Some(s), Some(i)) if i < s)
}

/// A normalized document identifier. Two URIs naming the same file compare
/// equal even when the client spelled them differently.
#[derive(Clone)]
pub struct DocumentId {
    key: Arc<str>,
    uri: Url,
}

impl DocumentId {
    pub fn new(uri: &Url) -> Self {
        let normalized = if uri.scheme() == "file" {
            uri.to_file_path()
                .ok()
                .and_then(|path| Url::from_file_path(path).ok())
                .unwrap_or_else(|| uri.clone())
        } else {
            uri.clone()
        };
        DocumentId {
            key: normalized.as_str().into(),
            uri: normalized,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl PartialEq for DocumentId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DocumentId {}

impl Hash for DocumentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.key)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Current text of one open document.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub text: Arc<str>,
    pub version: Version,
    pub generation: Generation,
}

#[derive(Debug, Default)]
pub struct Documents {
    docs: HashMap<DocumentId, OpenDocument>,
}

impl Documents {
    /// Opening an already open document replaces its text.
    pub fn open(&mut self, doc: DocumentId, text: String, version: Version, generation: Generation) {
        self.docs.insert(
            doc,
            OpenDocument {
                text: text.into(),
                version,
                generation,
            },
        );
    }

    /// Apply content changes in order and bump the version.
    pub fn change(
        &mut self,
        uri: &Url,
        version: Version,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<(DocumentId, OpenDocument), AnalysisError> {
        let doc = DocumentId::new(uri);
        let open = self
            .docs
            .get_mut(&doc)
            .ok_or_else(|| AnalysisError::DocumentNotOpen(uri.clone()))?;
        let mut text = open.text.to_string();
        for change in changes {
            text = apply_change(&text, change);
        }
        open.text = text.into();
        open.version = version;
        let open = open.clone();
        Ok((doc, open))
    }

    pub fn close(&mut self, uri: &Url) -> Option<(DocumentId, OpenDocument)> {
        let doc = DocumentId::new(uri);
        let open = self.docs.remove(&doc)?;
        Some((doc, open))
    }

    pub fn get(&self, doc: &DocumentId) -> Option<&OpenDocument> {
        self.docs.get(doc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &OpenDocument)> {
        self.docs.iter()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
