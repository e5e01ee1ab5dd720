//! ResourceProvider trait for abstracting resource loading.
//!
//! Every external fetch the system performs goes through this trait: external DTD
//! subsets, external parsed entities, XInclude targets and `xsl:import`/`xsl:include`
//! stylesheets. All of it happens while documents are parsed or compiled, never while
//! a transformation is running.

use crate::uri::normalize_path;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to load resource '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("Invalid resource format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

/// Shared resource data type (reference-counted bytes).
pub type SharedResourceData = Arc<Vec<u8>>;

/// A source of documents referenced by URI from other documents.
///
/// Implementations must be thread-safe: a compiled stylesheet keeps its provider and
/// may be used from several threads at once.
pub trait ResourceProvider: Send + Sync + Debug {
    /// Load a resource by its path/URI.
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError>;

    /// Check if a resource exists.
    fn exists(&self, path: &str) -> bool;

    /// Load a resource and decode it as UTF-8 text, dropping a leading byte order mark.
    fn load_text(&self, path: &str) -> Result<String, ResourceError> {
        let bytes = self.load(path)?;
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
        String::from_utf8(body.to_vec())
            .map_err(|e| ResourceError::InvalidFormat(format!("{}: {}", path, e)))
    }

    /// Get the base path for resolving relative resources.
    ///
    /// Returns `None` if the provider doesn't use path-based resolution.
    fn base_path(&self) -> Option<&str> {
        None
    }

    /// Returns a human-readable name for this provider (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// A provider backed by a map populated up front.
///
/// Keys are normalized paths, so `./parts/a.xml` and `parts//a.xml` name the same entry
/// as `parts/a.xml`. Useful for tests and for hosts that hand documents over as strings.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    resources: RwLock<HashMap<String, SharedResourceData>>,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`add`](Self::add) for fixtures.
    pub fn with(self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        if let Err(e) = self.add(path.clone(), data.into()) {
            log::warn!("dropping in-memory resource '{}': {}", path, e);
        }
        self
    }

    /// Add a resource to the in-memory store, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::LoadFailed` if the internal lock is poisoned.
    pub fn add(&self, path: impl Into<String>, data: Vec<u8>) -> Result<(), ResourceError> {
        self.add_shared(path, Arc::new(data))
    }

    /// Add a resource from shared data.
    pub fn add_shared(
        &self,
        path: impl Into<String>,
        data: SharedResourceData,
    ) -> Result<(), ResourceError> {
        let path_string = normalize_path(&path.into());
        let mut resources = self
            .resources
            .write()
            .map_err(|_| ResourceError::LoadFailed {
                path: path_string.clone(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources.insert(path_string, data);
        Ok(())
    }

    /// Remove a resource from the store.
    pub fn remove(&self, path: &str) -> Option<SharedResourceData> {
        self.resources.write().ok()?.remove(&normalize_path(path))
    }

    pub fn clear(&self) {
        if let Ok(mut resources) = self.resources.write() {
            resources.clear();
        }
    }

    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError> {
        let resources = self
            .resources
            .read()
            .map_err(|_| ResourceError::LoadFailed {
                path: path.to_string(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.resources
            .read()
            .map(|r| r.contains_key(&normalize_path(path)))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryResourceProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_provider_add_and_load() {
        let provider = InMemoryResourceProvider::new();
        provider.add("chapter.xml", b"<chapter/>".to_vec()).unwrap();

        let data = provider.load("chapter.xml").unwrap();
        assert_eq!(&*data, b"<chapter/>");
        assert!(provider.exists("chapter.xml"));
    }

    #[test]
    fn test_in_memory_provider_not_found() {
        let provider = InMemoryResourceProvider::new();
        let result = provider.load("missing.dtd");
        assert_eq!(result, Err(ResourceError::NotFound("missing.dtd".into())));
        assert!(!provider.exists("missing.dtd"));
    }

    #[test]
    fn test_builder_style_fixture() {
        let provider = InMemoryResourceProvider::new()
            .with("a.xsl", "<a/>")
            .with("b.xsl", "<b/>");
        assert_eq!(provider.len(), 2);
        provider.clear();
        assert!(provider.is_empty());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let provider = InMemoryResourceProvider::new();
        provider.add("doc.xml", b"original".to_vec()).unwrap();
        provider.add("doc.xml", b"updated".to_vec()).unwrap();
        assert_eq!(provider.len(), 1);

        let removed = provider.remove("doc.xml").unwrap();
        assert_eq!(&*removed, b"updated");
        assert!(provider.remove("doc.xml").is_none());
    }

    #[test]
    fn test_keys_are_normalized() {
        let provider = InMemoryResourceProvider::new().with("./parts//intro.xml", "<intro/>");
        assert!(provider.exists("parts/intro.xml"));
        assert_eq!(&*provider.load("parts/./intro.xml").unwrap(), b"<intro/>");
        assert!(provider.remove("parts/intro.xml").is_some());
    }

    #[test]
    fn test_load_text_strips_bom() {
        let provider = InMemoryResourceProvider::new().with("bom.txt", b"\xEF\xBB\xBFhello".to_vec());
        assert_eq!(provider.load_text("bom.txt").unwrap(), "hello");
    }

    #[test]
    fn test_load_text_rejects_invalid_utf8() {
        let provider = InMemoryResourceProvider::new().with("bin.dat", vec![0xff, 0xfe, 0x00]);
        assert!(matches!(
            provider.load_text("bin.dat"),
            Err(ResourceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_resource_error_display() {
        let err = ResourceError::LoadFailed {
            path: "entities.ent".to_string(),
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("entities.ent"));
        assert!(err.to_string().contains("permission denied"));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let resource_err: ResourceError = io_err.into();
        assert!(matches!(resource_err, ResourceError::Io(_)));
    }
}
