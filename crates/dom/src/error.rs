use std::fmt;
use thiserror::Error;
use xsltr_traits::ResourceError;

/// A 1-based line and column in a source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location { line, col }
    }
}

/// Calculates the 1-based line and column for a byte offset into `source`.
pub fn get_line_col_from_pos(source: &str, pos: usize) -> (usize, usize) {
    let mut end = pos.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line = before.matches('\n').count() + 1;
    let col = before
        .rfind('\n')
        .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
        + 1;
    (line, col)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    #[error("XML parse error at {location}: {message}")]
    Parse { message: String, location: Location },

    #[error("Document is not valid: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Failed to fetch '{uri}': {source}")]
    ResourceFetch {
        uri: String,
        #[source]
        source: ResourceError,
    },
}

impl DomError {
    pub fn parse(message: impl Into<String>, location: Location) -> Self {
        DomError::Parse {
            message: message.into(),
            location,
        }
    }

    pub fn fetch(uri: impl Into<String>, source: ResourceError) -> Self {
        DomError::ResourceFetch {
            uri: uri.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let src = "<a>\n  <b/>\n</a>";
        assert_eq!(get_line_col_from_pos(src, 0), (1, 1));
        assert_eq!(get_line_col_from_pos(src, 6), (2, 3));
        assert_eq!(get_line_col_from_pos(src, 999), (3, 5));
    }
}
