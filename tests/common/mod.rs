#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use xsltr::{InMemoryResourceProvider, TransformError, TransformOptions};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Options reading external resources from `provider` instead of the filesystem.
pub fn options_with(provider: InMemoryResourceProvider) -> TransformOptions {
    TransformOptions::default().with_resource_provider(Arc::new(provider))
}

/// Runs a transformation with every flag off and no external resources.
pub fn run(xslt: &str, xml: &str) -> Result<String, TransformError> {
    init_logging();
    xsltr::transform_with_options(xslt, xml, &options_with(InMemoryResourceProvider::new()))
}

/// Wraps templates in a stylesheet with the given `xsl:output` attributes.
pub fn stylesheet(output: &str, body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:output {output}/>
            {body}
        </xsl:stylesheet>"#
    )
}
