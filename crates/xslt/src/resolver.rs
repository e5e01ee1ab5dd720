use crate::error::XsltError;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use xsltr_dom::{Document, ParseOptions};
use xsltr_traits::ResourceProvider;

/// How deeply `xsl:import` / `xsl:include` may nest.
pub const MAX_IMPORT_DEPTH: usize = 100;

/// Loads the stylesheet modules a stylesheet imports or includes.
pub trait StylesheetResolver: Send + Sync + Debug {
    /// Returns the parsed module at `uri`, already resolved against the referring module.
    fn resolve(&self, uri: &str) -> Result<Arc<Document>, XsltError>;
}

/// Resolves modules through a `ResourceProvider`, keeping each parsed module so a
/// module shared by several stylesheets is read once.
pub struct CachingStylesheetResolver {
    resource_provider: Arc<dyn ResourceProvider>,
    cache: RwLock<HashMap<String, Arc<Document>>>,
}

impl Debug for CachingStylesheetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingStylesheetResolver")
            .field("provider", &self.resource_provider.name())
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

impl CachingStylesheetResolver {
    pub fn new(resource_provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            resource_provider,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    fn load(&self, uri: &str) -> Result<Document, XsltError> {
        let source = self
            .resource_provider
            .load_text(uri)
            .map_err(|e| XsltError::fetch(uri, e))?;
        let options = ParseOptions {
            base_uri: Some(uri.to_string()),
            ..ParseOptions::default()
        };
        let doc = xsltr_dom::parse(&source, &options, self.resource_provider.as_ref())?;
        log::debug!("Loaded stylesheet module '{}'", uri);
        Ok(doc)
    }
}

impl StylesheetResolver for CachingStylesheetResolver {
    fn resolve(&self, uri: &str) -> Result<Arc<Document>, XsltError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| XsltError::runtime("Failed to acquire stylesheet cache lock"))?;
            if let Some(cached) = cache.get(uri) {
                log::trace!("Stylesheet module cache hit for '{}'", uri);
                return Ok(Arc::clone(cached));
            }
        }

        let doc = Arc::new(self.load(uri)?);

        let mut cache = self
            .cache
            .write()
            .map_err(|_| XsltError::runtime("Failed to acquire stylesheet cache lock"))?;
        cache.insert(uri.to_string(), Arc::clone(&doc));
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltr_traits::InMemoryResourceProvider;

    const MODULE: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"/>"#;

    #[test]
    fn test_resolver_caches_parsed_modules() {
        let provider = InMemoryResourceProvider::new().with("styles/common.xsl", MODULE);
        let resolver = CachingStylesheetResolver::new(Arc::new(provider));

        let first = resolver.resolve("styles/common.xsl").unwrap();
        let second = resolver.resolve("styles/common.xsl").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cache_size(), 1);
        assert_eq!(first.uri(), Some("styles/common.xsl"));

        resolver.clear_cache();
        assert_eq!(resolver.cache_size(), 0);
    }

    #[test]
    fn test_missing_module_is_a_fetch_error() {
        let resolver = CachingStylesheetResolver::new(Arc::new(InMemoryResourceProvider::new()));
        let err = resolver.resolve("nowhere.xsl").unwrap_err();
        assert!(matches!(err, XsltError::ResourceFetch { ref uri, .. } if uri == "nowhere.xsl"));
    }

    #[test]
    fn test_malformed_module_is_a_document_error() {
        let provider = InMemoryResourceProvider::new().with("bad.xsl", "<xsl:stylesheet");
        let resolver = CachingStylesheetResolver::new(Arc::new(provider));
        assert!(matches!(
            resolver.resolve("bad.xsl"),
            Err(XsltError::Document(_))
        ));
        assert_eq!(resolver.cache_size(), 0);
    }
}
