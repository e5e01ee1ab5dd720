use crate::ast::CompiledStylesheet;
use crate::compiler::CompilerBuilder;
use crate::error::XsltError;
use crate::executor::{DEFAULT_MAX_DEPTH, TemplateExecutor};
use crate::resolver::{CachingStylesheetResolver, StylesheetResolver};
use crate::result_tree::ResultTree;
use crate::serializer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use xsltr_dom::{Document, ParseOptions};
use xsltr_traits::ResourceProvider;

/// Per-transformation settings.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Values for top-level `xsl:param`s, by expanded name.
    pub params: HashMap<String, String>,
    /// Nested template invocations allowed before the transformation fails.
    pub max_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A compiled stylesheet ready to transform any number of source documents.
#[derive(Debug, Clone)]
pub struct XsltTemplate {
    compiled: Arc<CompiledStylesheet>,
}

impl XsltTemplate {
    pub fn new(compiled: CompiledStylesheet) -> Self {
        Self {
            compiled: Arc::new(compiled),
        }
    }

    pub fn stylesheet(&self) -> &CompiledStylesheet {
        &self.compiled
    }

    /// Runs the transformation and returns the result tree. Whitespace is stripped from
    /// `source` first as `xsl:strip-space` asks.
    pub fn apply(&self, mut source: Document, config: &ExecutionConfig) -> Result<ResultTree, XsltError> {
        let start = Instant::now();
        if self.compiled.has_strip_rules() {
            let compiled = &self.compiled;
            source.strip_whitespace(&|name| compiled.strips_whitespace(name));
        }

        let mut executor = TemplateExecutor::new(&self.compiled, source.root())?
            .with_params(config.params.clone())
            .with_max_depth(config.max_depth);
        let mut tree = ResultTree::new();
        executor.execute(&mut tree)?;
        log::debug!("Transformation finished in {:?}", start.elapsed());
        Ok(tree)
    }

    /// Runs the transformation and serializes the result with the stylesheet's
    /// `xsl:output` settings.
    pub fn transform(&self, source: Document, config: &ExecutionConfig) -> Result<String, XsltError> {
        let tree = self.apply(source, config)?;
        serializer::serialize(&tree, &self.compiled.output)
    }
}

/// Compiles stylesheets, fetching imported and included modules through a
/// `ResourceProvider`.
#[derive(Debug, Clone)]
pub struct XsltParser {
    resources: Arc<dyn ResourceProvider>,
}

impl XsltParser {
    pub fn new(resources: Arc<dyn ResourceProvider>) -> Self {
        Self { resources }
    }

    /// Parses and compiles stylesheet text. `base_uri` locates relative `href`s.
    pub fn parse(&self, source: &str, base_uri: Option<&str>) -> Result<XsltTemplate, XsltError> {
        let options = ParseOptions {
            base_uri: base_uri.map(str::to_string),
            ..ParseOptions::default()
        };
        let doc = xsltr_dom::parse(source, &options, self.resources.as_ref())?;
        self.compile(&doc)
    }

    /// Compiles an already parsed stylesheet document.
    pub fn compile(&self, doc: &Document) -> Result<XsltTemplate, XsltError> {
        let resolver: Arc<dyn StylesheetResolver> =
            Arc::new(CachingStylesheetResolver::new(Arc::clone(&self.resources)));
        let compiled = CompilerBuilder::new(Some(resolver)).compile(doc)?;
        Ok(XsltTemplate::new(compiled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltr_traits::InMemoryResourceProvider;

    fn parser() -> XsltParser {
        XsltParser::new(Arc::new(InMemoryResourceProvider::new()))
    }

    fn source(xml: &str) -> Document {
        xsltr_dom::parse(xml, &ParseOptions::default(), &InMemoryResourceProvider::new()).unwrap()
    }

    #[test]
    fn test_compiled_template_is_reusable() {
        let template = parser()
            .parse(
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                    <xsl:output omit-xml-declaration="yes"/>
                    <xsl:template match="/"><n><xsl:value-of select="count(//x)"/></n></xsl:template>
                </xsl:stylesheet>"#,
                None,
            )
            .unwrap();
        let config = ExecutionConfig::default();
        assert_eq!(template.transform(source("<r><x/></r>"), &config).unwrap(), "<n>1</n>\n");
        assert_eq!(
            template.transform(source("<r><x/><x/><x/></r>"), &config).unwrap(),
            "<n>3</n>\n"
        );
    }

    #[test]
    fn test_params_override_global_defaults() {
        let template = parser()
            .parse(
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                    <xsl:output method="text"/>
                    <xsl:param name="greeting" select="'hello'"/>
                    <xsl:template match="/"><xsl:value-of select="$greeting"/></xsl:template>
                </xsl:stylesheet>"#,
                None,
            )
            .unwrap();
        let mut config = ExecutionConfig::default();
        assert_eq!(template.transform(source("<r/>"), &config).unwrap(), "hello");
        config.params.insert("greeting".into(), "bonjour".into());
        assert_eq!(template.transform(source("<r/>"), &config).unwrap(), "bonjour");
    }

    #[test]
    fn test_imports_resolve_through_provider() {
        let provider = InMemoryResourceProvider::new().with(
            "lib/base.xsl",
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="item">base</xsl:template>
            </xsl:stylesheet>"#,
        );
        let template = XsltParser::new(Arc::new(provider))
            .parse(
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                    <xsl:import href="base.xsl"/>
                    <xsl:output method="text"/>
                    <xsl:template match="item">[<xsl:apply-imports/>]</xsl:template>
                </xsl:stylesheet>"#,
                Some("lib/main.xsl"),
            )
            .unwrap();
        let out = template
            .transform(source("<r><item/></r>"), &ExecutionConfig::default())
            .unwrap();
        assert_eq!(out, "[base]");
    }
}
