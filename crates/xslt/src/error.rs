use thiserror::Error;
use xsltr_dom::{DomError, Location};
use xsltr_traits::ResourceError;
use xsltr_xpath1::XPathError;

fn at(location: &Option<Location>) -> String {
    location.map(|l| format!(" at {}", l)).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XsltError {
    /// The stylesheet or source document could not be read as XML.
    #[error(transparent)]
    Document(#[from] DomError),

    #[error("Stylesheet compile error{}: {message}", at(.location))]
    Compile {
        message: String,
        location: Option<Location>,
    },

    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error("Circular import or include of '{0}'")]
    CircularImport(String),

    #[error("Failed to load stylesheet module '{uri}': {source}")]
    ResourceFetch {
        uri: String,
        #[source]
        source: ResourceError,
    },

    #[error("Undefined {kind} '{name}'")]
    UndefinedReference { kind: &'static str, name: String },

    #[error("Resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transformation terminated by xsl:message: {0}")]
    Terminated(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl XsltError {
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile {
            message: msg.into(),
            location: None,
        }
    }

    pub fn compile_at(msg: impl Into<String>, location: Location) -> Self {
        Self::Compile {
            message: msg.into(),
            location: Some(location),
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn undefined(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UndefinedReference {
            kind,
            name: name.into(),
        }
    }

    pub fn circular_import(uri: impl Into<String>) -> Self {
        Self::CircularImport(uri.into())
    }

    pub fn fetch(uri: impl Into<String>, source: ResourceError) -> Self {
        Self::ResourceFetch {
            uri: uri.into(),
            source,
        }
    }

    /// Attaches a location to a compile error that does not carry one yet.
    pub(crate) fn located(self, location: Location) -> Self {
        match self {
            Self::Compile {
                message,
                location: None,
            } => Self::Compile {
                message,
                location: Some(location),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let plain = XsltError::compile("bad pattern");
        assert_eq!(plain.to_string(), "Stylesheet compile error: bad pattern");

        let located = plain.located(Location { line: 3, col: 7 });
        assert_eq!(
            located.to_string(),
            "Stylesheet compile error at line 3, column 7: bad pattern"
        );
    }

    #[test]
    fn test_undefined_reference_display() {
        let err = XsltError::undefined("variable", "total");
        assert_eq!(err.to_string(), "Undefined variable 'total'");
    }

    #[test]
    fn test_located_keeps_existing_location() {
        let err = XsltError::compile_at("x", Location { line: 1, col: 2 });
        let err = err.located(Location { line: 9, col: 9 });
        assert!(err.to_string().contains("line 1, column 2"));
    }
}
