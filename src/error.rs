use std::fmt;
use thiserror::Error;
use xsltr_dom::DomError;
use xsltr_xslt::XsltError;

/// The failure categories a transformation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Validation,
    Compile,
    UndefinedReference,
    ResourceExhaustion,
    Serialization,
    ResourceFetch,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Compile => "CompileError",
            ErrorKind::UndefinedReference => "UndefinedReferenceError",
            ErrorKind::ResourceExhaustion => "ResourceExhaustionError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::ResourceFetch => "ResourceFetchError",
            ErrorKind::Runtime => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// A comprehensive error type for a failed transformation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Failed to read the {role}: {source}")]
    Document {
        /// `"stylesheet"` or `"source document"`.
        role: &'static str,
        #[source]
        source: DomError,
    },

    #[error(transparent)]
    Xslt(#[from] XsltError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transformation worker failed: {0}")]
    Worker(String),
}

impl TransformError {
    pub(crate) fn stylesheet(source: DomError) -> Self {
        TransformError::Document {
            role: "stylesheet",
            source,
        }
    }

    pub(crate) fn source_document(source: DomError) -> Self {
        TransformError::Document {
            role: "source document",
            source,
        }
    }

    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::Document { source, .. } => dom_kind(source),
            TransformError::Xslt(e) => match e {
                XsltError::Document(source) => dom_kind(source),
                XsltError::Compile { .. } | XsltError::XPath(_) | XsltError::CircularImport(_) => {
                    ErrorKind::Compile
                }
                XsltError::ResourceFetch { .. } => ErrorKind::ResourceFetch,
                XsltError::UndefinedReference { .. } => ErrorKind::UndefinedReference,
                XsltError::ResourceExhaustion(_) => ErrorKind::ResourceExhaustion,
                XsltError::Serialization(_) => ErrorKind::Serialization,
                XsltError::Terminated(_) | XsltError::Runtime(_) => ErrorKind::Runtime,
            },
            TransformError::Config(_) | TransformError::Worker(_) => ErrorKind::Runtime,
        }
    }
}

fn dom_kind(e: &DomError) -> ErrorKind {
    match e {
        DomError::Parse { .. } => ErrorKind::Parse,
        DomError::Validation(_) => ErrorKind::Validation,
        DomError::ResourceFetch { .. } => ErrorKind::ResourceFetch,
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(e: serde_json::Error) -> Self {
        TransformError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltr_dom::Location;

    #[test]
    fn test_kinds_follow_the_taxonomy() {
        let parse = TransformError::source_document(DomError::parse("bad", Location { line: 1, col: 1 }));
        assert_eq!(parse.kind(), ErrorKind::Parse);
        assert!(parse.to_string().starts_with("Failed to read the source document"));

        let validation = TransformError::source_document(DomError::Validation(vec!["x".into()]));
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let circular = TransformError::from(XsltError::circular_import("a.xsl"));
        assert_eq!(circular.kind(), ErrorKind::Compile);

        let exhausted = TransformError::from(XsltError::ResourceExhaustion("deep".into()));
        assert_eq!(exhausted.kind(), ErrorKind::ResourceExhaustion);
        assert_eq!(exhausted.kind().to_string(), "ResourceExhaustionError");
    }
}
