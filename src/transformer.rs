use crate::error::TransformError;
use crate::options::TransformOptions;
use std::thread;
use std::time::Instant;
use xsltr_xslt::{XsltParser, XsltTemplate};

/// A compiled stylesheet bound to its options. Compile once, then transform any number
/// of source documents, from any number of threads.
#[derive(Debug, Clone)]
pub struct Transformer {
    template: XsltTemplate,
    options: TransformOptions,
}

impl Transformer {
    /// Parses and compiles `xslt_doc`; relative `xsl:import`/`xsl:include` hrefs are
    /// resolved against `options.base_uri` through the options' resource provider.
    pub fn compile(xslt_doc: &str, options: &TransformOptions) -> Result<Self, TransformError> {
        options.check()?;
        let template = run_on_worker(options.stack_size, || compile_stylesheet(xslt_doc, options))?;
        Ok(Self {
            template,
            options: options.clone(),
        })
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Parses `xml_doc` with the call-contract flags and runs the transformation.
    /// Either the complete serialized result is returned or nothing is.
    pub fn transform(&self, xml_doc: &str) -> Result<String, TransformError> {
        run_on_worker(self.options.stack_size, || {
            transform_document(&self.template, xml_doc, &self.options)
        })
    }
}

fn compile_stylesheet(xslt_doc: &str, options: &TransformOptions) -> Result<XsltTemplate, TransformError> {
    let start = Instant::now();
    let parse_options = xsltr_dom::ParseOptions {
        base_uri: options.base_uri.clone(),
        ..xsltr_dom::ParseOptions::default()
    };
    let doc = xsltr_dom::parse(xslt_doc, &parse_options, options.resource_provider.as_ref())
        .map_err(TransformError::stylesheet)?;
    let template = XsltParser::new(options.resource_provider.clone()).compile(&doc)?;
    log::debug!("Stylesheet ready in {:?}", start.elapsed());
    Ok(template)
}

fn transform_document(
    template: &XsltTemplate,
    xml_doc: &str,
    options: &TransformOptions,
) -> Result<String, TransformError> {
    let start = Instant::now();
    let source = xsltr_dom::parse(
        xml_doc,
        &options.source_parse_options(),
        options.resource_provider.as_ref(),
    )
    .map_err(TransformError::source_document)?;
    log::debug!("Source document parsed in {:?}", start.elapsed());
    let output = template.transform(source, &options.execution_config())?;
    log::debug!("Transformation complete: {} bytes in {:?}", output.len(), start.elapsed());
    Ok(output)
}

/// Runs `job` on a scoped thread with `stack_size` bytes of stack, so deep but legal
/// recursion reaches the depth cap before it reaches the end of the stack.
fn run_on_worker<T, F>(stack_size: usize, job: F) -> Result<T, TransformError>
where
    T: Send,
    F: FnOnce() -> Result<T, TransformError> + Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("xsltr-worker".into())
            .stack_size(stack_size)
            .spawn_scoped(scope, job)
            .map_err(|e| TransformError::Worker(format!("could not start worker thread: {}", e)))?;
        handle
            .join()
            .map_err(|_| TransformError::Worker("worker thread panicked".into()))?
    })
}

/// One-shot form of [`Transformer`]: compile, parse and transform in a single worker run.
pub(crate) fn transform_once(
    xslt_doc: &str,
    xml_doc: &str,
    options: &TransformOptions,
) -> Result<String, TransformError> {
    options.check()?;
    run_on_worker(options.stack_size, || {
        let template = compile_stylesheet(xslt_doc, options)?;
        transform_document(&template, xml_doc, options)
    })
}
