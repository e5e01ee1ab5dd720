//! Relative reference resolution for documents that point at other documents.

use std::path::Path;

/// Resolves `href` against the URI of the document that contains it.
///
/// Absolute paths and URIs with a scheme are returned unchanged. Without a base the
/// reference is taken as-is (relative to the provider's own root).
pub fn resolve_uri(href: &str, base_uri: Option<&str>) -> String {
    if href.starts_with('/') || href.contains("://") {
        return href.to_string();
    }

    match base_uri {
        Some(base) if !base.is_empty() => {
            let base_dir = Path::new(base).parent().unwrap_or(Path::new(""));
            normalize_path(&base_dir.join(href).to_string_lossy())
        }
        _ => normalize_path(href),
    }
}

/// Collapses `.` and `..` segments and duplicate separators.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !path.starts_with('/') {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_base() {
        assert_eq!(resolve_uri("common.xsl", Some("styles/main.xsl")), "styles/common.xsl");
        assert_eq!(resolve_uri("../dtd/doc.dtd", Some("data/in/doc.xml")), "data/dtd/doc.dtd");
        assert_eq!(resolve_uri("./a.xml", None), "a.xml");
    }

    #[test]
    fn test_resolve_absolute_untouched() {
        assert_eq!(resolve_uri("/etc/x.dtd", Some("a/b.xml")), "/etc/x.dtd");
        assert_eq!(
            resolve_uri("http://example.com/x.dtd", Some("a/b.xml")),
            "http://example.com/x.dtd"
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent_segments() {
        assert_eq!(normalize_path("../x/./y//z"), "../x/y/z");
        assert_eq!(normalize_path("/a/../b"), "/b");
    }
}
