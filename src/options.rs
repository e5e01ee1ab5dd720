use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use xsltr_resource::FilesystemResourceProvider;
use xsltr_traits::ResourceProvider;
use xsltr_xslt::ExecutionConfig;
use xsltr_xslt::executor::DEFAULT_MAX_DEPTH;

/// Stack reserved for the worker thread that runs a transformation.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Settings for one transformation, or for every run of a compiled [`crate::Transformer`].
///
/// The three flags of the call contract only affect how the source document is read;
/// the stylesheet itself is always parsed with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Resolve XInclude directives in the source document.
    pub process_includes: bool,
    /// Fetch the external DTD subset and external entities of the source document.
    pub load_external_subsets: bool,
    /// Validate the source document against its DTD before transforming.
    pub validate_xml: bool,
    /// Nested template invocations allowed before the run fails.
    pub max_depth: usize,
    pub stack_size: usize,
    /// URI of both documents, for resolving relative references.
    pub base_uri: Option<String>,
    /// Values for the stylesheet's top-level parameters.
    pub params: HashMap<String, String>,
    #[serde(skip, default = "default_provider")]
    pub resource_provider: Arc<dyn ResourceProvider>,
}

fn default_provider() -> Arc<dyn ResourceProvider> {
    Arc::new(FilesystemResourceProvider::new("."))
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            process_includes: false,
            load_external_subsets: false,
            validate_xml: false,
            max_depth: DEFAULT_MAX_DEPTH,
            stack_size: DEFAULT_STACK_SIZE,
            base_uri: None,
            params: HashMap::new(),
            resource_provider: default_provider(),
        }
    }
}

impl TransformOptions {
    /// Options with the three call-contract flags set and defaults for the rest.
    pub fn new(process_includes: bool, load_external_subsets: bool, validate_xml: bool) -> Self {
        Self {
            process_includes,
            load_external_subsets,
            validate_xml,
            ..Self::default()
        }
    }

    /// Reads options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, TransformError> {
        let options: Self = serde_json::from_str(json)?;
        options.check()?;
        Ok(options)
    }

    pub fn with_resource_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resource_provider = provider;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub(crate) fn check(&self) -> Result<(), TransformError> {
        if self.max_depth == 0 {
            return Err(TransformError::Config("max_depth must be at least 1".into()));
        }
        if self.stack_size < 64 * 1024 {
            return Err(TransformError::Config(format!(
                "stack_size of {} bytes is too small for a transformation",
                self.stack_size
            )));
        }
        Ok(())
    }

    pub(crate) fn source_parse_options(&self) -> xsltr_dom::ParseOptions {
        xsltr_dom::ParseOptions {
            process_xincludes: self.process_includes,
            load_external_subsets: self.load_external_subsets,
            validate: self.validate_xml,
            base_uri: self.base_uri.clone(),
        }
    }

    pub(crate) fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            params: self.params.clone(),
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_fills_defaults() {
        let options = TransformOptions::from_json(
            r#"{ "validate_xml": true, "params": { "title": "Report" } }"#,
        )
        .unwrap();
        assert!(options.validate_xml);
        assert!(!options.process_includes);
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(options.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(options.params["title"], "Report");
        assert_eq!(options.resource_provider.name(), "FilesystemResourceProvider");
    }

    #[test]
    fn test_invalid_json_and_limits_are_config_errors() {
        assert!(matches!(
            TransformOptions::from_json("{ not json"),
            Err(TransformError::Config(_))
        ));
        assert!(matches!(
            TransformOptions::from_json(r#"{ "max_depth": 0 }"#),
            Err(TransformError::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let options = TransformOptions::new(true, false, true)
            .with_param("a", "1")
            .with_max_depth(10)
            .with_base_uri("docs/in.xml");
        assert!(options.process_includes && options.validate_xml);
        assert_eq!(options.execution_config().max_depth, 10);
        assert_eq!(options.source_parse_options().base_uri.as_deref(), Some("docs/in.xml"));
    }
}
