//! XInclude processing.
//!
//! Inclusion rebuilds the document into a fresh arena so that node ids of the result
//! stay in document order.

use crate::document::{Document, ExpandedName, Node, NodeId, NodeKind};
use crate::error::DomError;
use crate::parser::{self, ParseOptions};
use xsltr_traits::{ResourceError, ResourceProvider, resolve_uri};
use xsltr_xpath1::DataSourceNode;

pub const XINCLUDE_NAMESPACE: &str = "http://www.w3.org/2001/XInclude";
pub const XINCLUDE_NAMESPACE_2003: &str = "http://www.w3.org/2003/XInclude";

const MAX_INCLUDE_DEPTH: usize = 64;

fn is_xinclude(name: &ExpandedName, local: &str) -> bool {
    name.is(XINCLUDE_NAMESPACE, local) || name.is(XINCLUDE_NAMESPACE_2003, local)
}

/// Replaces every `xi:include` in `doc` with the content it references.
pub fn process(
    doc: Document,
    options: &ParseOptions,
    resources: &dyn ResourceProvider,
) -> Result<Document, DomError> {
    let has_includes = (0..doc.len()).any(|i| match &doc.get(NodeId(i)).kind {
        NodeKind::Element { name, .. } => {
            name.namespace.as_deref() == Some(XINCLUDE_NAMESPACE)
                || name.namespace.as_deref() == Some(XINCLUDE_NAMESPACE_2003)
        }
        _ => false,
    });
    if !has_includes {
        return Ok(doc);
    }

    let mut out = Document::new().with_uri(doc.uri().map(str::to_string));
    out.set_dtd(doc.dtd().cloned());
    let mut includer = Includer {
        options,
        resources,
        open: doc.uri().map(|u| vec![u.to_string()]).unwrap_or_default(),
        depth: 0,
        count: 0,
    };
    includer.copy_children(doc.root(), &mut out, NodeId::ROOT)?;
    log::debug!("Resolved {} XInclude elements", includer.count);
    Ok(out)
}

struct Includer<'o> {
    options: &'o ParseOptions,
    resources: &'o dyn ResourceProvider,
    /// URIs of the documents currently being included, outermost first.
    open: Vec<String>,
    depth: usize,
    count: usize,
}

impl Includer<'_> {
    fn copy_children(
        &mut self,
        source: Node<'_>,
        out: &mut Document,
        parent: NodeId,
    ) -> Result<(), DomError> {
        for child in source.child_nodes() {
            self.copy_node(child, out, parent, false)?;
        }
        Ok(())
    }

    /// Copies `source` under `parent`. `top` marks the root of an included subtree,
    /// which takes its inherited namespace declarations along.
    fn copy_node(
        &mut self,
        source: Node<'_>,
        out: &mut Document,
        parent: NodeId,
        top: bool,
    ) -> Result<(), DomError> {
        let loc = source.location();
        match source.kind() {
            NodeKind::Root => self.copy_children(source, out, parent),
            NodeKind::Element { name, namespaces } => {
                if is_xinclude(name, "include") {
                    return self.include(source, out, parent);
                }
                if is_xinclude(name, "fallback") {
                    return Err(DomError::parse(
                        "xi:fallback must be a child of xi:include",
                        loc,
                    ));
                }
                let mut declared = namespaces.clone();
                if top {
                    for (prefix, uri) in source.in_scope_namespaces() {
                        if !declared.iter().any(|(p, _)| p == prefix) {
                            declared.push((prefix.to_string(), uri.to_string()));
                        }
                    }
                }
                let id = out.append_element(parent, name.clone(), declared, loc);
                for attr in source.attribute_nodes() {
                    if let NodeKind::Attribute { name, value, is_id } = attr.kind() {
                        out.append_attribute(id, name.clone(), value.clone(), *is_id, loc);
                    }
                }
                self.copy_children(source, out, id)
            }
            NodeKind::Attribute { .. } => Ok(()),
            NodeKind::Text(text) => {
                out.append_text(parent, text, loc);
                Ok(())
            }
            NodeKind::Comment(text) => {
                out.append_comment(parent, text.clone(), loc);
                Ok(())
            }
            NodeKind::ProcessingInstruction { target, data } => {
                out.append_processing_instruction(parent, target.clone(), data.clone(), loc);
                Ok(())
            }
        }
    }

    fn include(
        &mut self,
        element: Node<'_>,
        out: &mut Document,
        parent: NodeId,
    ) -> Result<(), DomError> {
        let loc = element.location();
        let href = element.attribute(None, "href").unwrap_or("");
        let xpointer = element.attribute(None, "xpointer");
        if href.is_empty() && xpointer.is_none() {
            return Err(DomError::parse(
                "xi:include needs an href or an xpointer attribute",
                loc,
            ));
        }
        if href.contains('#') {
            return Err(DomError::parse(
                format!("xi:include href '{}' must not contain a fragment", href),
                loc,
            ));
        }
        let fallback = element
            .child_nodes()
            .find(|c| c.expanded_name().is_some_and(|n| is_xinclude(n, "fallback")));

        self.depth += 1;
        if self.depth > MAX_INCLUDE_DEPTH {
            return Err(DomError::parse("XInclude nesting is too deep", loc));
        }
        let result = match element.attribute(None, "parse").unwrap_or("xml") {
            "xml" => self.include_xml(element, href, xpointer, out, parent),
            "text" => self.include_text(element, href, out, parent),
            other => Err(DomError::parse(
                format!("xi:include parse=\"{}\" is not 'xml' or 'text'", other),
                loc,
            )),
        };
        self.depth -= 1;

        match result {
            Ok(()) => {
                self.count += 1;
                Ok(())
            }
            Err(err @ DomError::ResourceFetch { .. }) => match fallback {
                Some(fallback) => {
                    log::debug!("Using xi:fallback after: {}", err);
                    self.copy_children(fallback, out, parent)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn include_text(
        &mut self,
        element: Node<'_>,
        href: &str,
        out: &mut Document,
        parent: NodeId,
    ) -> Result<(), DomError> {
        let uri = resolve_uri(href, element.document().uri());
        let text = self
            .resources
            .load_text(&uri)
            .map_err(|e| DomError::fetch(&uri, e))?;
        out.append_text(parent, &parser::normalize_newlines(&text), element.location());
        Ok(())
    }

    fn include_xml(
        &mut self,
        element: Node<'_>,
        href: &str,
        xpointer: Option<&str>,
        out: &mut Document,
        parent: NodeId,
    ) -> Result<(), DomError> {
        let loc = element.location();
        if href.is_empty() {
            let doc = element.document();
            let target = select(doc, xpointer.unwrap_or_default(), doc.uri().unwrap_or(""))?;
            let mut ancestor = Some(element);
            while let Some(node) = ancestor {
                if node == target {
                    return Err(DomError::parse("xi:include includes its own ancestor", loc));
                }
                ancestor = node.parent();
            }
            return self.copy_node(target, out, parent, true);
        }

        let uri = resolve_uri(href, element.document().uri());
        if self.open.contains(&uri) {
            return Err(DomError::parse(format!("inclusion loop through '{}'", uri), loc));
        }
        let text = self
            .resources
            .load_text(&uri)
            .map_err(|e| DomError::fetch(&uri, e))?;
        let options = ParseOptions {
            base_uri: Some(uri.clone()),
            load_external_subsets: self.options.load_external_subsets,
            validate: false,
            process_xincludes: false,
        };
        let included = parser::parse_tree(&text, &options, self.resources)?;
        let nodes: Vec<Node<'_>> = match xpointer {
            Some(pointer) => vec![select(&included, pointer, &uri)?],
            None => included.root().child_nodes().collect(),
        };

        self.open.push(uri);
        let result = nodes
            .into_iter()
            .try_for_each(|node| self.copy_node(node, out, parent, true));
        self.open.pop();
        result
    }
}

/// Resolves a shorthand pointer (`chapter2`) or an `element()` scheme pointer
/// (`element(/1/3)`, `element(intro/2)`). Several parts are tried in order.
fn select<'d>(doc: &'d Document, pointer: &str, uri: &str) -> Result<Node<'d>, DomError> {
    let not_found = || {
        DomError::fetch(
            uri,
            ResourceError::NotFound(format!("xpointer '{}' selects nothing", pointer)),
        )
    };
    let pointer = pointer.trim();
    if !pointer.contains('(') {
        return doc
            .element_by_id(pointer)
            .map(|id| doc.node(id))
            .ok_or_else(not_found);
    }

    let mut rest = pointer;
    while let Some(open) = rest.find('(') {
        let scheme = rest[..open].trim();
        let close = rest[open..]
            .find(')')
            .map(|c| open + c)
            .ok_or_else(|| DomError::parse(format!("malformed xpointer '{}'", pointer), Default::default()))?;
        let body = &rest[open + 1..close];
        rest = &rest[close + 1..];
        if scheme != "element" {
            log::warn!("Unsupported xpointer scheme '{}' skipped", scheme);
            continue;
        }
        if let Some(node) = element_scheme(doc, body) {
            return Ok(node);
        }
    }
    Err(not_found())
}

fn element_scheme<'d>(doc: &'d Document, body: &str) -> Option<Node<'d>> {
    let mut parts = body.split('/');
    let head = parts.next()?;
    let mut current = if head.is_empty() {
        doc.root()
    } else {
        doc.node(doc.element_by_id(head)?)
    };
    for part in parts {
        let index: usize = part.parse().ok()?;
        current = current.child_nodes().filter(|c| c.is_element()).nth(index.checked_sub(1)?)?;
    }
    current.is_element().then_some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use xsltr_traits::InMemoryResourceProvider;

    fn include_options() -> ParseOptions {
        ParseOptions {
            process_xincludes: true,
            ..ParseOptions::default()
        }
    }

    const XI: &str = r#"xmlns:xi="http://www.w3.org/2001/XInclude""#;

    #[test]
    fn test_xml_and_text_inclusion() {
        let provider = InMemoryResourceProvider::new()
            .with("part.xml", r#"<part n="1"><xi:include href="inner.xml" xmlns:xi="http://www.w3.org/2001/XInclude"/></part>"#)
            .with("inner.xml", "<inner/>")
            .with("note.txt", "a < b");
        let text = format!(
            r#"<doc {XI}><xi:include href="part.xml"/><t><xi:include href="note.txt" parse="text"/></t></doc>"#
        );
        let doc = parse(&text, &include_options(), &provider).unwrap();
        let root = doc.document_element().unwrap();
        let kids: Vec<_> = root.child_nodes().collect();
        assert_eq!(kids[0].expanded_name().unwrap().local, "part");
        assert_eq!(
            kids[0].child_nodes().next().unwrap().expanded_name().unwrap().local,
            "inner"
        );
        assert_eq!(kids[1].string_value(), "a < b");
    }

    #[test]
    fn test_flag_off_keeps_directives() {
        let text = format!(r#"<doc {XI}><xi:include href="missing.xml"/></doc>"#);
        let doc = parse(&text, &ParseOptions::default(), &InMemoryResourceProvider::new()).unwrap();
        let include = doc.document_element().unwrap().child_nodes().next().unwrap();
        assert!(include.expanded_name().unwrap().is(XINCLUDE_NAMESPACE, "include"));
    }

    #[test]
    fn test_fallback_and_fetch_errors() {
        let provider = InMemoryResourceProvider::new();
        let text = format!(
            r#"<doc {XI}><xi:include href="missing.xml"><xi:fallback><alt/></xi:fallback></xi:include></doc>"#
        );
        let doc = parse(&text, &include_options(), &provider).unwrap();
        let alt = doc.document_element().unwrap().child_nodes().next().unwrap();
        assert_eq!(alt.expanded_name().unwrap().local, "alt");

        let text = format!(r#"<doc {XI}><xi:include href="missing.xml"/></doc>"#);
        let err = parse(&text, &include_options(), &provider).unwrap_err();
        assert!(matches!(err, DomError::ResourceFetch { .. }));
    }

    #[test]
    fn test_inclusion_loops_are_errors() {
        let provider = InMemoryResourceProvider::new().with(
            "self.xml",
            format!(r#"<x {XI}><xi:include href="self.xml"/></x>"#),
        );
        let text = format!(r#"<doc {XI}><xi:include href="self.xml"/></doc>"#);
        let err = parse(&text, &include_options(), &provider).unwrap_err();
        assert!(matches!(err, DomError::Parse { .. }));
    }

    #[test]
    fn test_xpointer_selection() {
        let provider = InMemoryResourceProvider::new().with(
            "book.xml",
            r#"<!DOCTYPE book [<!ATTLIST ch id ID #IMPLIED>]><book><ch id="c1">one</ch><ch id="c2">two</ch></book>"#,
        );
        let text = format!(
            r#"<doc {XI}><xi:include href="book.xml" xpointer="c2"/><xi:include href="book.xml" xpointer="element(/1/1)"/></doc>"#
        );
        let doc = parse(&text, &include_options(), &provider).unwrap();
        assert_eq!(doc.document_element().unwrap().string_value(), "twoone");
    }

    #[test]
    fn test_result_ids_stay_in_document_order() {
        let provider = InMemoryResourceProvider::new().with("a.xml", "<a><b/></a>");
        let text = format!(r#"<doc {XI}><first/><xi:include href="a.xml"/><last/></doc>"#);
        let doc = parse(&text, &include_options(), &provider).unwrap();
        let names: Vec<String> = (0..doc.len())
            .filter_map(|i| doc.node(NodeId(i)).expanded_name().map(|n| n.local.clone()))
            .collect();
        assert_eq!(names, vec!["doc", "first", "a", "b", "last"]);
    }
}
