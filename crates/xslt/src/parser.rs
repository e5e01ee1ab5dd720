//! Drives a `StylesheetBuilder` over a parsed stylesheet document.
//!
//! The stylesheet is read by `xsltr-dom` like any other document (entities and DTD
//! defaults resolved, namespaces expanded), then replayed here as element and text
//! events. Comments and processing instructions carry no meaning in a stylesheet and
//! are not reported.

use crate::error::XsltError;
use xsltr_dom::{Document, ExpandedName, Location, Node, NodeKind};

/// Attributes of an element, expanded names with their values.
pub type OwnedAttributes = Vec<(ExpandedName, String)>;

/// An element start as the compiler sees it.
#[derive(Debug, Clone)]
pub struct ElementStart<'d> {
    pub name: &'d ExpandedName,
    pub attributes: OwnedAttributes,
    /// Namespace declarations made on this element, `("", uri)` for the default namespace.
    pub namespaces: &'d [(String, String)],
    pub location: Location,
}

/// The callbacks the replay driver uses to build a stylesheet.
pub trait StylesheetBuilder {
    fn start_element(&mut self, e: ElementStart<'_>) -> Result<(), XsltError>;
    fn end_element(&mut self, name: &ExpandedName, location: Location) -> Result<(), XsltError>;
    fn text(&mut self, text: &str) -> Result<(), XsltError>;
}

/// Replays every element and text node of `doc` into `builder`, in document order.
pub fn replay(doc: &Document, builder: &mut dyn StylesheetBuilder) -> Result<(), XsltError> {
    for child in doc.root().child_nodes() {
        replay_node(child, builder)?;
    }
    Ok(())
}

fn replay_node(node: Node<'_>, builder: &mut dyn StylesheetBuilder) -> Result<(), XsltError> {
    match node.kind() {
        NodeKind::Element { name, namespaces } => {
            let attributes = node
                .attribute_nodes()
                .filter_map(|attr| match attr.kind() {
                    NodeKind::Attribute { name, value, .. } => Some((name.clone(), value.clone())),
                    _ => None,
                })
                .collect();
            let location = node.location();
            builder.start_element(ElementStart {
                name,
                attributes,
                namespaces,
                location,
            })?;
            for child in node.child_nodes() {
                replay_node(child, builder)?;
            }
            builder.end_element(name, location)
        }
        NodeKind::Text(text) => builder.text(text),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltr_dom::ParseOptions;
    use xsltr_traits::InMemoryResourceProvider;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl StylesheetBuilder for Recorder {
        fn start_element(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
            let attrs: Vec<String> = e
                .attributes
                .iter()
                .map(|(n, v)| format!("{}={}", n.qualified(), v))
                .collect();
            self.0.push(format!(
                "<{} ns={:?} [{}]",
                e.name.qualified(),
                e.name.namespace,
                attrs.join(",")
            ));
            Ok(())
        }
        fn end_element(&mut self, name: &ExpandedName, _: Location) -> Result<(), XsltError> {
            self.0.push(format!("</{}", name.qualified()));
            Ok(())
        }
        fn text(&mut self, text: &str) -> Result<(), XsltError> {
            self.0.push(format!("text {:?}", text));
            Ok(())
        }
    }

    #[test]
    fn test_replay_reports_elements_and_text_only() {
        let xml = r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"><!--skip--><xsl:template match="/">hi<?pi x?></xsl:template></xsl:stylesheet>"#;
        let doc = xsltr_dom::parse(xml, &ParseOptions::default(), &InMemoryResourceProvider::new())
            .unwrap();
        let mut recorder = Recorder::default();
        replay(&doc, &mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                r#"<xsl:stylesheet ns=Some("http://www.w3.org/1999/XSL/Transform") [version=1.0]"#,
                r#"<xsl:template ns=Some("http://www.w3.org/1999/XSL/Transform") [match=/]"#,
                r#"text "hi""#,
                "</xsl:template",
                "</xsl:stylesheet",
            ]
        );
    }
}
