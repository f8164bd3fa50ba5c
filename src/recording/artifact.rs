//! Session-scoped blob registry addressed by reference URLs.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Ephemeral reference URL (`blob:wavemesh/<uuid>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable in-memory binary with a MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    mime: &'static str,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, mime: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Blobs registered for this session; references stay valid until revoked
#[derive(Debug, Default)]
pub struct ArtifactStore {
    blobs: HashMap<ArtifactRef, Blob>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob and mint a fresh reference for it
    pub fn create_url(&mut self, blob: Blob) -> ArtifactRef {
        let url = ArtifactRef(format!("blob:wavemesh/{}", Uuid::new_v4()));
        debug!("Registered {} ({} bytes, {})", url, blob.len(), blob.mime());
        self.blobs.insert(url.clone(), blob);
        url
    }

    pub fn resolve(&self, url: &ArtifactRef) -> Option<&Blob> {
        self.blobs.get(url)
    }

    /// Drop a reference; returns whether it was live
    pub fn revoke(&mut self, url: &ArtifactRef) -> bool {
        let live = self.blobs.remove(url).is_some();
        if live {
            debug!("Revoked {}", url);
        }
        live
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_revoke() {
        let mut store = ArtifactStore::new();
        let url = store.create_url(Blob::new(vec![1, 2, 3], "audio/wav"));

        assert!(url.as_str().starts_with("blob:wavemesh/"));
        assert_eq!(store.resolve(&url).map(|b| b.bytes()), Some(&[1, 2, 3][..]));

        assert!(store.revoke(&url));
        assert!(!store.revoke(&url));
        assert!(store.resolve(&url).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_urls_are_unique() {
        let mut store = ArtifactStore::new();
        let a = store.create_url(Blob::new(vec![0], "audio/wav"));
        let b = store.create_url(Blob::new(vec![0], "audio/wav"));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
