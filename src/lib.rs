//! XSLT 1.0 transformations behind one call.
//!
//! ```text
//! transform(xslt, xml, process_includes, load_external_subsets, validate_xml)
//!     xslt ── xsltr-dom ── xsltr-xslt compiler ──▶ CompiledStylesheet
//!     xml  ── xsltr-dom (XInclude / DTD / validation) ──▶ Document
//!          ── engine ──▶ ResultTree ── serializer ──▶ String
//! ```
//!
//! [`transform`] is the whole call contract. [`Transformer`] keeps the compiled stylesheet
//! for repeated or concurrent runs, and [`TransformOptions`] carries everything else.

mod error;
mod options;
mod transformer;

pub use error::{ErrorKind, TransformError};
pub use options::{DEFAULT_STACK_SIZE, TransformOptions};
pub use transformer::Transformer;

pub use xsltr_resource::{FilesystemResourceProvider, InMemoryResourceProvider};
pub use xsltr_traits::{ResourceError, ResourceProvider};
pub use xsltr_xslt::{OutputMethod, XsltError};

/// Transforms `xml_doc` with the stylesheet `xslt_doc`.
///
/// The flags control how `xml_doc` is read: XInclude resolution, fetching the external
/// DTD subset, and DTD validation. External resources are read relative to the
/// current directory; use [`transform_with_options`] for anything else.
pub fn transform(
    xslt_doc: &str,
    xml_doc: &str,
    process_includes: bool,
    load_external_subsets: bool,
    validate_xml: bool,
) -> Result<String, TransformError> {
    let options = TransformOptions::new(process_includes, load_external_subsets, validate_xml);
    transform_with_options(xslt_doc, xml_doc, &options)
}

pub fn transform_with_options(
    xslt_doc: &str,
    xml_doc: &str,
    options: &TransformOptions,
) -> Result<String, TransformError> {
    transformer::transform_once(xslt_doc, xml_doc, options)
}
