//! XSLT 1.0 stylesheet compiler, transformation engine and result serializer.
//!
//! ```text
//! stylesheet Document ──compiler──▶ CompiledStylesheet ─┐
//!                                                      ├─executor──▶ ResultTree ──serializer──▶ String
//! source Document ────(strip-space)────────────────────┘
//! ```
//!
//! [`XsltParser`] compiles a stylesheet once; the resulting [`XsltTemplate`] transforms any
//! number of source documents and is safe to share between threads.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod functions;
pub mod number;
pub mod output;
pub mod parser;
pub mod pattern;
pub mod processor;
pub mod resolver;
pub mod result_tree;
pub mod serializer;

mod compiler_handlers;
mod executor_handlers;


pub use ast::{CompiledStylesheet, OutputDeclaration, OutputMethod};
pub use error::XsltError;
pub use processor::{ExecutionConfig, XsltParser, XsltTemplate};
pub use resolver::{CachingStylesheetResolver, MAX_IMPORT_DEPTH, StylesheetResolver};
pub use result_tree::ResultTree;
pub use serializer::serialize;

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::error::XsltError;
    use crate::processor::{ExecutionConfig, XsltParser, XsltTemplate};
    use std::sync::Arc;
    use xsltr_dom::ParseOptions;
    use xsltr_traits::InMemoryResourceProvider;

    pub fn parse_stylesheet(xslt_source: &str) -> Result<XsltTemplate, XsltError> {
        XsltParser::new(Arc::new(InMemoryResourceProvider::new())).parse(xslt_source, None)
    }

    pub fn transform_with(
        provider: InMemoryResourceProvider,
        xslt_source: &str,
        base_uri: Option<&str>,
        xml_data: &str,
    ) -> Result<String, XsltError> {
        let provider = Arc::new(provider);
        let template = XsltParser::new(provider.clone()).parse(xslt_source, base_uri)?;
        let source = xsltr_dom::parse(xml_data, &ParseOptions::default(), provider.as_ref())?;
        template.transform(source, &ExecutionConfig::default())
    }

    pub fn transform(xslt_source: &str, xml_data: &str) -> Result<String, XsltError> {
        transform_with(InMemoryResourceProvider::new(), xslt_source, None, xml_data)
    }

    /// Wraps templates in a stylesheet that writes text output.
    pub fn text_stylesheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:output method="text"/>
                {}
            </xsl:stylesheet>"#,
            body
        )
    }

    /// Wraps templates in a stylesheet that writes XML without a declaration.
    pub fn xml_stylesheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:output omit-xml-declaration="yes"/>
                {}
            </xsl:stylesheet>"#,
            body
        )
    }

    pub fn text(body: &str, xml_data: &str) -> String {
        match transform(&text_stylesheet(body), xml_data) {
            Ok(out) => out,
            Err(e) => panic!("transformation failed: {}", e),
        }
    }

    pub fn xml(body: &str, xml_data: &str) -> String {
        match transform(&xml_stylesheet(body), xml_data) {
            Ok(out) => out.trim_end().to_string(),
            Err(e) => panic!("transformation failed: {}", e),
        }
    }
}
