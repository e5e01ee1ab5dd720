//! Writes a [`ResultTree`] as text according to an `xsl:output` declaration.
//!
//! # Output methods
//!
//! | Method | Notes |
//! |--------|-------|
//! | `xml`  | XML declaration, optional DOCTYPE, minimal namespace declarations, CDATA sections |
//! | `html` | HTML 4 rules: void elements, raw `script`/`style`, minimized boolean attributes, `META` |
//! | `text` | The concatenated text nodes, unescaped |
//!
//! Without an explicit method, `html` is chosen when the first element of the result is
//! `html` in no namespace and no non-whitespace text precedes it.
//!
//! The result is a Rust string; the declared encoding decides which characters may be
//! written literally. Others become character references where XML allows them and are
//! an error everywhere else.

use crate::ast::{OutputDeclaration, OutputMethod};
use crate::error::XsltError;
use crate::result_tree::{ResultAttribute, ResultNode, ResultNodeKind, ResultTree};
use std::fmt::Write as _;
use std::time::Instant;
use xsltr_dom::ExpandedName;
use xsltr_xpath1::XML_NAMESPACE;

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "br", "col", "embed", "frame", "hr", "img", "input", "isindex",
    "link", "meta", "param", "source", "track", "wbr",
];

const HTML_BOOLEAN_ATTRIBUTES: &[&str] = &[
    "checked", "compact", "declare", "defer", "disabled", "ismap", "multiple", "nohref",
    "noresize", "noshade", "nowrap", "readonly", "selected",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Utf16,
    Latin1,
    Ascii,
}

impl Encoding {
    fn parse(name: &str) -> Result<Self, XsltError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(Encoding::Utf8),
            "UTF-16" | "UTF16" => Ok(Encoding::Utf16),
            "ISO-8859-1" | "ISO_8859-1" | "LATIN1" | "LATIN-1" => Ok(Encoding::Latin1),
            "US-ASCII" | "ASCII" => Ok(Encoding::Ascii),
            _ => Err(XsltError::serialization(format!(
                "Unsupported output encoding '{}'",
                name
            ))),
        }
    }

    fn can_encode(self, c: char) -> bool {
        match self {
            Encoding::Utf8 | Encoding::Utf16 => true,
            Encoding::Latin1 => (c as u32) < 0x100,
            Encoding::Ascii => c.is_ascii(),
        }
    }
}

/// The output method used for `tree`: the declared one, else detected from the tree.
pub fn resolve_method(tree: &ResultTree, output: &OutputDeclaration) -> OutputMethod {
    if let Some(method) = output.method {
        return method;
    }
    for &child in &tree.root().children {
        match &tree.node(child).kind {
            ResultNodeKind::Text { text, .. } if !text.trim().is_empty() => return OutputMethod::Xml,
            ResultNodeKind::Element { name, .. } => {
                let is_html = name.namespace.is_none() && name.local.eq_ignore_ascii_case("html");
                return if is_html {
                    OutputMethod::Html
                } else {
                    OutputMethod::Xml
                };
            }
            _ => {}
        }
    }
    OutputMethod::Xml
}

/// Serializes a complete result tree.
pub fn serialize(tree: &ResultTree, output: &OutputDeclaration) -> Result<String, XsltError> {
    let start = Instant::now();
    let method = resolve_method(tree, output);
    let encoding_name = output.encoding.clone().unwrap_or_else(|| "UTF-8".to_string());
    let mut serializer = Serializer {
        tree,
        output,
        method,
        encoding: Encoding::parse(&encoding_name)?,
        encoding_name,
        indent: output.indent.unwrap_or(method == OutputMethod::Html),
        out: String::new(),
        scopes: vec![vec![("xml".to_string(), XML_NAMESPACE.to_string())]],
        generated_prefixes: 0,
    };
    match method {
        OutputMethod::Text => serializer.write_text_method()?,
        OutputMethod::Xml => serializer.write_xml_document()?,
        OutputMethod::Html => serializer.write_html_document()?,
    }
    log::debug!(
        "Serialized result as {:?} ({} bytes) in {:?}",
        method,
        serializer.out.len(),
        start.elapsed()
    );
    Ok(serializer.out)
}

struct Serializer<'t> {
    tree: &'t ResultTree,
    output: &'t OutputDeclaration,
    method: OutputMethod,
    encoding: Encoding,
    encoding_name: String,
    indent: bool,
    out: String,
    /// Namespace bindings in effect, one frame per open element.
    scopes: Vec<Vec<(String, String)>>,
    generated_prefixes: usize,
}

impl Serializer<'_> {
    fn write_text_method(&mut self) -> Result<(), XsltError> {
        let text = self.tree.string_value();
        self.check_encodable(&text, "text output")?;
        self.out.push_str(&text);
        Ok(())
    }

    fn write_xml_document(&mut self) -> Result<(), XsltError> {
        if !self.output.omit_xml_declaration.unwrap_or(false) {
            let version = self.output.version.as_deref().unwrap_or("1.0");
            let _ = write!(self.out, "<?xml version=\"{}\"", version);
            if self.output.encoding.is_some() {
                let _ = write!(self.out, " encoding=\"{}\"", self.encoding_name);
            }
            if let Some(standalone) = self.output.standalone {
                let _ = write!(
                    self.out,
                    " standalone=\"{}\"",
                    if standalone { "yes" } else { "no" }
                );
            }
            self.out.push_str("?>\n");
        }

        let tree = self.tree;
        let mut wrote_doctype = false;
        for &child in &tree.root().children {
            let node = tree.node(child);
            if let ResultNodeKind::Element { name, .. } = &node.kind
                && !wrote_doctype
            {
                wrote_doctype = true;
                if let Some(system) = &self.output.doctype_system {
                    let _ = write!(self.out, "<!DOCTYPE {}", name.qualified());
                    match &self.output.doctype_public {
                        Some(public) => {
                            let _ = write!(self.out, " PUBLIC \"{}\" \"{}\"", public, system);
                        }
                        None => {
                            let _ = write!(self.out, " SYSTEM \"{}\"", system);
                        }
                    }
                    self.out.push_str(">\n");
                }
            }
            self.write_xml_node(child, 0)?;
            if !matches!(node.kind, ResultNodeKind::Text { .. }) {
                self.out.push('\n');
            }
        }
        Ok(())
    }

    fn write_html_document(&mut self) -> Result<(), XsltError> {
        let public = self.output.doctype_public.as_deref();
        let system = self.output.doctype_system.as_deref();
        if public.is_some() || system.is_some() {
            self.out.push_str("<!DOCTYPE html");
            match (public, system) {
                (Some(public), Some(system)) => {
                    let _ = write!(self.out, " PUBLIC \"{}\" \"{}\"", public, system);
                }
                (Some(public), None) => {
                    let _ = write!(self.out, " PUBLIC \"{}\"", public);
                }
                (None, Some(system)) => {
                    let _ = write!(self.out, " SYSTEM \"{}\"", system);
                }
                (None, None) => {}
            }
            self.out.push_str(">\n");
        }
        let tree = self.tree;
        for &child in &tree.root().children {
            self.write_html_node(child, 0, false)?;
            if matches!(tree.node(child).kind, ResultNodeKind::Element { .. }) {
                self.out.push('\n');
            }
        }
        Ok(())
    }

    // --- XML ---

    fn write_xml_node(&mut self, index: usize, depth: usize) -> Result<(), XsltError> {
        let tree = self.tree;
        let node = tree.node(index);
        match &node.kind {
            ResultNodeKind::Root => {
                for &child in &node.children {
                    self.write_xml_node(child, depth)?;
                }
            }
            ResultNodeKind::Element {
                name,
                namespaces,
                attributes,
            } => self.write_xml_element(node, name, namespaces, attributes, depth)?,
            ResultNodeKind::Text { text, escape: true } => self.write_escaped_text(text)?,
            ResultNodeKind::Text { text, escape: false } => {
                self.check_encodable(text, "unescaped text")?;
                self.out.push_str(text);
            }
            ResultNodeKind::Comment(text) => self.write_comment(text)?,
            ResultNodeKind::ProcessingInstruction { target, data } => {
                self.check_encodable(target, "a processing instruction")?;
                self.check_encodable(data, "a processing instruction")?;
                if data.is_empty() {
                    let _ = write!(self.out, "<?{}?>", target);
                } else {
                    let _ = write!(self.out, "<?{} {}?>", target, data);
                }
            }
        }
        Ok(())
    }

    fn write_xml_element(
        &mut self,
        node: &ResultNode,
        name: &ExpandedName,
        namespaces: &[(String, String)],
        attributes: &[ResultAttribute],
        depth: usize,
    ) -> Result<(), XsltError> {
        let (qname, declarations, attributes) = self.fix_namespaces(name, namespaces, attributes);
        self.check_encodable(&qname, "an element name")?;
        let _ = write!(self.out, "<{}", qname);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                let _ = write!(self.out, " xmlns:{}=\"", prefix);
            }
            self.write_escaped_attribute(uri)?;
            self.out.push('"');
        }
        for (attr_name, value) in &attributes {
            self.check_encodable(attr_name, "an attribute name")?;
            let _ = write!(self.out, " {}=\"", attr_name);
            self.write_escaped_attribute(value)?;
            self.out.push('"');
        }

        if node.children.is_empty() {
            self.out.push_str("/>");
            self.scopes.pop();
            return Ok(());
        }
        self.out.push('>');

        let cdata = self.output.cdata_section_elements.iter().any(|c| {
            c.local == name.local && c.namespace == name.namespace
        });
        let indent_children = self.indent && self.element_only(node);
        let tree = self.tree;
        for &child in &node.children {
            if indent_children {
                self.newline(depth + 1);
            }
            match &tree.node(child).kind {
                ResultNodeKind::Text { text, escape: true } if cdata => self.write_cdata(text)?,
                _ => self.write_xml_node(child, depth + 1)?,
            }
        }
        if indent_children {
            self.newline(depth);
        }
        let _ = write!(self.out, "</{}>", qname);
        self.scopes.pop();
        Ok(())
    }

    /// Works out the namespace declarations an element needs, given the bindings already
    /// in scope, and pushes the element's bindings. Returns the element's qualified name,
    /// the declarations to write and the attributes with their final qualified names.
    fn fix_namespaces(
        &mut self,
        name: &ExpandedName,
        namespaces: &[(String, String)],
        attributes: &[ResultAttribute],
    ) -> (String, Vec<(String, String)>, Vec<(String, String)>) {
        let mut declarations: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in namespaces {
            if prefix == "xml" || prefix == "xmlns" {
                continue;
            }
            if self.lookup(&declarations, prefix) != Some(uri.as_str()) {
                bind(&mut declarations, prefix, uri);
            }
        }

        let qname = match &name.namespace {
            Some(uri) => {
                let prefix = name.prefix.as_deref().unwrap_or("");
                if prefix != "xml" && self.lookup(&declarations, prefix) != Some(uri.as_str()) {
                    bind(&mut declarations, prefix, uri);
                }
                name.qualified()
            }
            None => {
                if self.lookup(&declarations, "").is_some_and(|uri| !uri.is_empty()) {
                    bind(&mut declarations, "", "");
                }
                name.local.clone()
            }
        };

        let mut written = Vec::with_capacity(attributes.len());
        for attr in attributes {
            let attr_name = match &attr.name.namespace {
                None => attr.name.local.clone(),
                Some(uri) if uri == XML_NAMESPACE => format!("xml:{}", attr.name.local),
                Some(uri) => {
                    let prefix = self.attribute_prefix(&mut declarations, attr.name.prefix.as_deref(), uri);
                    format!("{}:{}", prefix, attr.name.local)
                }
            };
            written.push((attr_name, attr.value.clone()));
        }

        self.scopes.push(declarations.clone());
        (qname, declarations, written)
    }

    /// A non-empty prefix bound to `uri` for an attribute, declaring one when needed.
    fn attribute_prefix(
        &mut self,
        declarations: &mut Vec<(String, String)>,
        preferred: Option<&str>,
        uri: &str,
    ) -> String {
        if let Some(prefix) = preferred.filter(|p| !p.is_empty() && *p != "xmlns") {
            match self.lookup(declarations, prefix) {
                Some(bound) if bound == uri => return prefix.to_string(),
                None => {
                    bind(declarations, prefix, uri);
                    return prefix.to_string();
                }
                Some(_) => {}
            }
        }
        let existing = declarations
            .iter()
            .chain(self.scopes.iter().rev().flatten())
            .find(|(prefix, bound)| !prefix.is_empty() && bound == uri)
            .map(|(prefix, _)| prefix.clone());
        if let Some(prefix) = existing
            && self.lookup(declarations, &prefix) == Some(uri)
        {
            return prefix;
        }
        loop {
            let prefix = format!("ns{}", self.generated_prefixes);
            self.generated_prefixes += 1;
            if self.lookup(declarations, &prefix).is_none() {
                bind(declarations, &prefix, uri);
                return prefix;
            }
        }
    }

    /// The URI `prefix` is bound to by the pending declarations or the enclosing scopes.
    fn lookup<'d>(&'d self, declarations: &'d [(String, String)], prefix: &str) -> Option<&'d str> {
        declarations
            .iter()
            .chain(self.scopes.iter().rev().flat_map(|frame| frame.iter().rev()))
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !(prefix.is_empty() && uri.is_empty()))
    }

    fn element_only(&self, node: &ResultNode) -> bool {
        node.children
            .iter()
            .all(|&c| !matches!(self.tree.node(c).kind, ResultNodeKind::Text { .. }))
    }

    fn newline(&mut self, depth: usize) {
        self.out.push('\n');
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn write_cdata(&mut self, text: &str) -> Result<(), XsltError> {
        self.check_encodable(text, "a CDATA section")?;
        self.out.push_str("<![CDATA[");
        self.out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
        self.out.push_str("]]>");
        Ok(())
    }

    fn write_comment(&mut self, text: &str) -> Result<(), XsltError> {
        self.check_encodable(text, "a comment")?;
        let _ = write!(self.out, "<!--{}-->", text);
        Ok(())
    }

    // --- HTML ---

    fn write_html_node(&mut self, index: usize, depth: usize, raw: bool) -> Result<(), XsltError> {
        let tree = self.tree;
        let node = tree.node(index);
        match &node.kind {
            ResultNodeKind::Root => {
                for &child in &node.children {
                    self.write_html_node(child, depth, raw)?;
                }
            }
            ResultNodeKind::Element {
                name,
                namespaces,
                attributes,
            } => {
                if name.namespace.is_some() {
                    return self.write_xml_element(node, name, namespaces, attributes, depth);
                }
                self.write_html_element(node, name, attributes, depth)?;
            }
            ResultNodeKind::Text { text, escape } => {
                if raw || !escape {
                    self.check_encodable(text, "unescaped text")?;
                    self.out.push_str(text);
                } else {
                    self.write_escaped_text(text)?;
                }
            }
            ResultNodeKind::Comment(text) => self.write_comment(text)?,
            ResultNodeKind::ProcessingInstruction { target, data } => {
                self.check_encodable(data, "a processing instruction")?;
                if data.is_empty() {
                    let _ = write!(self.out, "<?{}>", target);
                } else {
                    let _ = write!(self.out, "<?{} {}>", target, data);
                }
            }
        }
        Ok(())
    }

    fn write_html_element(
        &mut self,
        node: &ResultNode,
        name: &ExpandedName,
        attributes: &[ResultAttribute],
        depth: usize,
    ) -> Result<(), XsltError> {
        let local = name.local.to_ascii_lowercase();
        self.check_encodable(&name.local, "an element name")?;
        let _ = write!(self.out, "<{}", name.local);
        for attr in attributes {
            let attr_name = match &attr.name.namespace {
                Some(uri) if uri == XML_NAMESPACE => format!("xml:{}", attr.name.local),
                _ => attr.name.qualified(),
            };
            let is_boolean = HTML_BOOLEAN_ATTRIBUTES.contains(&attr_name.to_ascii_lowercase().as_str())
                && attr.value.eq_ignore_ascii_case(&attr_name);
            if is_boolean {
                let _ = write!(self.out, " {}", attr_name);
                continue;
            }
            let _ = write!(self.out, " {}=\"", attr_name);
            self.write_html_attribute(&attr.value)?;
            self.out.push('"');
        }
        self.out.push('>');

        if HTML_VOID_ELEMENTS.contains(&local.as_str()) {
            return Ok(());
        }

        let raw = local == "script" || local == "style";
        let tree = self.tree;
        let indent_children = self.indent && !raw && self.element_only(node) && !node.children.is_empty();
        let mut wrote_meta = false;
        if local == "head" {
            if indent_children {
                self.newline(depth + 1);
            }
            let media_type = self.output.media_type.as_deref().unwrap_or("text/html");
            let _ = write!(
                self.out,
                "<meta http-equiv=\"Content-Type\" content=\"{}; charset={}\">",
                media_type, self.encoding_name
            );
            wrote_meta = true;
        }
        for &child in &node.children {
            if wrote_meta && is_content_type_meta(tree.node(child)) {
                continue;
            }
            if indent_children {
                self.newline(depth + 1);
            }
            self.write_html_node(child, depth + 1, raw)?;
        }
        if indent_children {
            self.newline(depth);
        }
        let _ = write!(self.out, "</{}>", name.local);
        Ok(())
    }

    /// Like XML attribute escaping, but `<` stays literal and `&{` is left alone.
    fn write_html_attribute(&mut self, value: &str) -> Result<(), XsltError> {
        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '&' if chars.peek() == Some(&'{') => self.out.push('&'),
                '&' => self.out.push_str("&amp;"),
                '"' => self.out.push_str("&quot;"),
                c => self.push_char(c),
            }
        }
        Ok(())
    }

    // --- Escaping ---

    fn write_escaped_text(&mut self, text: &str) -> Result<(), XsltError> {
        for c in text.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                '\r' => self.out.push_str("&#13;"),
                c => self.push_char(c),
            }
        }
        Ok(())
    }

    fn write_escaped_attribute(&mut self, value: &str) -> Result<(), XsltError> {
        for c in value.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '"' => self.out.push_str("&quot;"),
                '\n' => self.out.push_str("&#10;"),
                '\r' => self.out.push_str("&#13;"),
                '\t' => self.out.push_str("&#9;"),
                c => self.push_char(c),
            }
        }
        Ok(())
    }

    /// Writes `c`, as a character reference when the encoding cannot represent it.
    fn push_char(&mut self, c: char) {
        if self.encoding.can_encode(c) {
            self.out.push(c);
        } else {
            let _ = write!(self.out, "&#{};", c as u32);
        }
    }

    fn check_encodable(&self, text: &str, what: &str) -> Result<(), XsltError> {
        match text.chars().find(|&c| !self.encoding.can_encode(c)) {
            Some(c) => Err(XsltError::serialization(format!(
                "Character U+{:04X} in {} cannot be written in encoding {} ({:?} output)",
                c as u32, what, self.encoding_name, self.method
            ))),
            None => Ok(()),
        }
    }
}

/// Adds or replaces the pending declaration for `prefix`.
fn bind(declarations: &mut Vec<(String, String)>, prefix: &str, uri: &str) {
    match declarations.iter_mut().find(|(p, _)| p == prefix) {
        Some(existing) => existing.1 = uri.to_string(),
        None => declarations.push((prefix.to_string(), uri.to_string())),
    }
}

fn is_content_type_meta(node: &ResultNode) -> bool {
    match &node.kind {
        ResultNodeKind::Element {
            name, attributes, ..
        } => {
            name.namespace.is_none()
                && name.local.eq_ignore_ascii_case("meta")
                && attributes.iter().any(|a| {
                    a.name.local.eq_ignore_ascii_case("http-equiv")
                        && a.value.eq_ignore_ascii_case("content-type")
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputBuilder;

    fn xml_output() -> OutputDeclaration {
        OutputDeclaration {
            omit_xml_declaration: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_xml_declaration_and_escaping() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("out"));
        tree.add_attribute(&ExpandedName::local("a"), "x\"<&\n");
        tree.add_text("1 < 2 & 3 > 2");
        tree.end_element();
        let out = serialize(&tree, &OutputDeclaration::default()).unwrap();
        assert_eq!(
            out,
            "<?xml version=\"1.0\"?>\n<out a=\"x&quot;&lt;&amp;&#10;\">1 &lt; 2 &amp; 3 &gt; 2</out>\n"
        );
    }

    #[test]
    fn test_empty_element_and_encoding_declaration() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("e"));
        tree.end_element();
        let output = OutputDeclaration {
            encoding: Some("ISO-8859-1".into()),
            standalone: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serialize(&tree, &output).unwrap(),
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" standalone=\"yes\"?>\n<e/>\n"
        );
    }

    #[test]
    fn test_namespace_declarations_are_minimal() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::new(Some("p"), "a", Some("urn:p")));
        tree.add_namespace("p", "urn:p");
        tree.start_element(&ExpandedName::new(Some("p"), "b", Some("urn:p")));
        tree.add_namespace("p", "urn:p");
        tree.end_element();
        tree.start_element(&ExpandedName::local("c"));
        tree.add_attribute(&ExpandedName::new(None, "k", Some("urn:q")), "v");
        tree.end_element();
        tree.end_element();
        let out = serialize(&tree, &xml_output()).unwrap();
        assert_eq!(
            out,
            "<p:a xmlns:p=\"urn:p\"><p:b/><c xmlns:ns0=\"urn:q\" ns0:k=\"v\"/></p:a>\n"
        );
    }

    #[test]
    fn test_default_namespace_undeclared_for_unqualified_child() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::new(None, "a", Some("urn:d")));
        tree.start_element(&ExpandedName::local("b"));
        tree.end_element();
        tree.end_element();
        let out = serialize(&tree, &xml_output()).unwrap();
        assert_eq!(out, "<a xmlns=\"urn:d\"><b xmlns=\"\"/></a>\n");
    }

    #[test]
    fn test_cdata_sections_and_indent() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("doc"));
        tree.start_element(&ExpandedName::local("code"));
        tree.add_text("a]]>b");
        tree.end_element();
        tree.end_element();
        let output = OutputDeclaration {
            omit_xml_declaration: Some(true),
            indent: Some(true),
            cdata_section_elements: vec![ExpandedName::local("code")],
            ..Default::default()
        };
        assert_eq!(
            serialize(&tree, &output).unwrap(),
            "<doc>\n  <code><![CDATA[a]]]]><![CDATA[>b]]></code>\n</doc>\n"
        );
    }

    #[test]
    fn test_unrepresentable_characters() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("e"));
        tree.add_text("caf\u{e9}");
        tree.end_element();
        let ascii = OutputDeclaration {
            omit_xml_declaration: Some(true),
            encoding: Some("US-ASCII".into()),
            ..Default::default()
        };
        assert_eq!(serialize(&tree, &ascii).unwrap(), "<e>caf&#233;</e>\n");

        let mut comment = ResultTree::new();
        comment.add_comment("\u{e9}");
        assert!(matches!(
            serialize(&comment, &ascii),
            Err(XsltError::Serialization(_))
        ));

        let unknown = OutputDeclaration {
            encoding: Some("EBCDIC".into()),
            ..Default::default()
        };
        assert!(matches!(
            serialize(&tree, &unknown),
            Err(XsltError::Serialization(_))
        ));
    }

    #[test]
    fn test_html_detection_and_rules() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("HTML"));
        tree.start_element(&ExpandedName::local("head"));
        tree.end_element();
        tree.start_element(&ExpandedName::local("body"));
        tree.start_element(&ExpandedName::local("br"));
        tree.end_element();
        tree.start_element(&ExpandedName::local("input"));
        tree.add_attribute(&ExpandedName::local("checked"), "checked");
        tree.add_attribute(&ExpandedName::local("value"), "a<b&{c}");
        tree.end_element();
        tree.start_element(&ExpandedName::local("script"));
        tree.add_text("if (a < b) {}");
        tree.end_element();
        tree.end_element();
        tree.end_element();

        let output = OutputDeclaration {
            indent: Some(false),
            ..Default::default()
        };
        assert_eq!(resolve_method(&tree, &output), OutputMethod::Html);
        assert_eq!(
            serialize(&tree, &output).unwrap(),
            "<HTML><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\"></head>\
             <body><br><input checked value=\"a<b&{c}\"><script>if (a < b) {}</script></body></HTML>\n"
        );
    }

    #[test]
    fn test_text_method() {
        let mut tree = ResultTree::new();
        tree.start_element(&ExpandedName::local("a"));
        tree.add_text("x < y");
        tree.end_element();
        tree.add_text(" & z");
        let output = OutputDeclaration {
            method: Some(OutputMethod::Text),
            ..Default::default()
        };
        assert_eq!(serialize(&tree, &output).unwrap(), "x < y & z");
    }

    #[test]
    fn test_leading_text_prevents_html_detection() {
        let mut tree = ResultTree::new();
        tree.add_text("hi");
        tree.start_element(&ExpandedName::local("html"));
        tree.end_element();
        assert_eq!(
            resolve_method(&tree, &OutputDeclaration::default()),
            OutputMethod::Xml
        );
    }
}
