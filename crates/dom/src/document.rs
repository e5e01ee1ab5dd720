//! An arena-allocated, namespace-resolved XML node tree.

use crate::dtd::Dtd;
use crate::error::Location;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use xsltr_xpath1::datasource::{DataSourceNode, NodeType, QName};

/// Index of a node in its document's arena. Ids are handed out in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// A name with its prefix as written and the namespace URI it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl ExpandedName {
    pub fn new(prefix: Option<&str>, local: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    /// A name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new(None, local, None)
    }

    /// The name as written in the source, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element {
        name: ExpandedName,
        /// Namespace declarations made on this element, `("", uri)` for the default namespace.
        namespaces: Vec<(String, String)>,
    },
    Attribute {
        name: ExpandedName,
        value: String,
        is_id: bool,
    },
    Text(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    ids: HashMap<String, NodeId>,
    dtd: Option<Dtd>,
    uri: Option<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
                location: Location { line: 1, col: 1 },
            }],
            ids: HashMap::new(),
            dtd: None,
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn dtd(&self) -> Option<&Dtd> {
        self.dtd.as_ref()
    }

    pub(crate) fn set_dtd(&mut self, dtd: Option<Dtd>) {
        self.dtd = dtd;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { doc: self, id }
    }

    pub fn root(&self) -> Node<'_> {
        self.node(NodeId::ROOT)
    }

    /// The single element child of the root, if the document has one.
    pub fn document_element(&self) -> Option<Node<'_>> {
        self.nodes[0]
            .children
            .iter()
            .find(|id| matches!(self.nodes[id.0].kind, NodeKind::Element { .. }))
            .map(|&id| self.node(id))
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    // --- Construction ---

    fn push(&mut self, parent: NodeId, kind: NodeKind, location: Location) -> NodeId {
        let id = NodeId(self.nodes.len());
        let is_attribute = matches!(kind, NodeKind::Attribute { .. });
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
            location,
        });
        if is_attribute {
            self.nodes[parent.0].attributes.push(id);
        } else {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: ExpandedName,
        namespaces: Vec<(String, String)>,
        location: Location,
    ) -> NodeId {
        self.push(parent, NodeKind::Element { name, namespaces }, location)
    }

    /// Adds an attribute. An ID attribute registers its element for `id()` lookups;
    /// the first element to claim a value keeps it.
    pub fn append_attribute(
        &mut self,
        element: NodeId,
        name: ExpandedName,
        value: String,
        is_id: bool,
        location: Location,
    ) -> NodeId {
        if is_id {
            self.ids.entry(value.clone()).or_insert(element);
        }
        self.push(
            element,
            NodeKind::Attribute {
                name,
                value,
                is_id,
            },
            location,
        )
    }

    /// Appends text, merging it into a directly preceding text sibling.
    pub fn append_text(&mut self, parent: NodeId, text: &str, location: Location) {
        if text.is_empty() {
            return;
        }
        let last = self.nodes[parent.0].children.last().copied();
        if let Some(last) = last
            && let NodeKind::Text(existing) = &mut self.nodes[last.0].kind
        {
            existing.push_str(text);
            return;
        }
        self.push(parent, NodeKind::Text(text.to_string()), location);
    }

    pub fn append_comment(&mut self, parent: NodeId, text: String, location: Location) {
        self.push(parent, NodeKind::Comment(text), location);
    }

    pub fn append_processing_instruction(
        &mut self,
        parent: NodeId,
        target: String,
        data: String,
        location: Location,
    ) {
        self.push(
            parent,
            NodeKind::ProcessingInstruction { target, data },
            location,
        );
    }

    /// Deep-copies `source` from another document under `parent`.
    pub fn append_copy(&mut self, parent: NodeId, source: Node<'_>) -> Option<NodeId> {
        let data = source.data();
        match &data.kind {
            NodeKind::Root => {
                for child in source.child_nodes() {
                    self.append_copy(parent, child);
                }
                None
            }
            NodeKind::Element { name, namespaces } => {
                // Keep every namespace the copy relies on visible at its new position.
                let mut declared = namespaces.clone();
                for (prefix, uri) in source.in_scope_namespaces() {
                    if !declared.iter().any(|(p, _)| p == prefix) {
                        declared.push((prefix.to_string(), uri.to_string()));
                    }
                }
                let id = self.append_element(parent, name.clone(), declared, data.location);
                for attr in source.attribute_nodes() {
                    if let NodeKind::Attribute {
                        name,
                        value,
                        is_id,
                    } = &attr.data().kind
                    {
                        self.append_attribute(id, name.clone(), value.clone(), *is_id, attr.data().location);
                    }
                }
                for child in source.child_nodes() {
                    self.append_copy(id, child);
                }
                Some(id)
            }
            NodeKind::Attribute { .. } => None,
            NodeKind::Text(text) => {
                self.append_text(parent, text, data.location);
                None
            }
            NodeKind::Comment(text) => {
                self.append_comment(parent, text.clone(), data.location);
                None
            }
            NodeKind::ProcessingInstruction { target, data: pi } => {
                self.append_processing_instruction(parent, target.clone(), pi.clone(), data.location);
                None
            }
        }
    }

    /// Removes whitespace-only text children of the elements `strip` selects.
    /// `xml:space="preserve"` on an element or its ancestors keeps its text;
    /// `xml:space="default"` re-enables stripping below it.
    pub fn strip_whitespace(&mut self, strip: &dyn Fn(&ExpandedName) -> bool) {
        let mut removed = 0usize;
        let mut stack = vec![(NodeId::ROOT, false)];
        while let Some((id, inherited_preserve)) = stack.pop() {
            let preserve = match self.xml_space(id) {
                Some(value) => value == "preserve",
                None => inherited_preserve,
            };
            let strip_here = match &self.nodes[id.0].kind {
                NodeKind::Element { name, .. } => !preserve && strip(name),
                _ => false,
            };
            if strip_here {
                let nodes = &self.nodes;
                let before = self.nodes[id.0].children.len();
                let kept: Vec<NodeId> = nodes[id.0]
                    .children
                    .iter()
                    .copied()
                    .filter(|c| match &nodes[c.0].kind {
                        NodeKind::Text(t) => !t.chars().all(|ch| matches!(ch, ' ' | '\t' | '\n' | '\r')),
                        _ => true,
                    })
                    .collect();
                removed += before - kept.len();
                self.nodes[id.0].children = kept;
            }
            for &child in self.nodes[id.0].children.iter().rev() {
                if matches!(self.nodes[child.0].kind, NodeKind::Element { .. }) {
                    stack.push((child, preserve));
                }
            }
        }
        if removed > 0 {
            log::debug!("Stripped {} whitespace-only text nodes", removed);
        }
    }

    fn xml_space(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].attributes.iter().find_map(|a| match &self.nodes[a.0].kind {
            NodeKind::Attribute { name, value, .. }
                if name.is(xsltr_xpath1::XML_NAMESPACE, "space") =>
            {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    pub fn string_value(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in &self.nodes[id.0].children {
            match &self.nodes[child.0].kind {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => self.collect_text(child, out),
                _ => {}
            }
        }
    }
}

/// A lightweight handle to a node, navigable through `DataSourceNode`.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id.0]
    }

    pub fn kind(&self) -> &'a NodeKind {
        &self.data().kind
    }

    pub fn expanded_name(&self) -> Option<&'a ExpandedName> {
        match self.kind() {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind(), NodeKind::Element { .. })
    }

    pub fn child_nodes(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        self.data().children.iter().map(move |&id| Node { doc, id })
    }

    pub fn attribute_nodes(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        self.data().attributes.iter().map(move |&id| Node { doc, id })
    }

    /// The value of the attribute with the given local name and namespace.
    pub fn attribute(&self, namespace: Option<&str>, local: &str) -> Option<&'a str> {
        self.attribute_nodes().find_map(|a| match a.kind() {
            NodeKind::Attribute { name, value, .. }
                if name.local == local && name.namespace.as_deref() == namespace =>
            {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    pub fn location(&self) -> Location {
        self.data().location
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.doc, other.doc)
    }
}

impl Eq for Node<'_> {}

impl PartialOrd for Node<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let doc_order = (self.doc as *const Document).cmp(&(other.doc as *const Document));
        doc_order.then(self.id.cmp(&other.id))
    }
}

impl Hash for Node<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<'a> DataSourceNode<'a> for Node<'a> {
    fn node_type(&self) -> NodeType {
        match self.kind() {
            NodeKind::Root => NodeType::Root,
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Attribute { .. } => NodeType::Attribute,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self.kind() {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(QName {
                prefix: name.prefix.as_deref(),
                local_part: &name.local,
            }),
            NodeKind::ProcessingInstruction { target, .. } => Some(QName {
                prefix: None,
                local_part: target,
            }),
            _ => None,
        }
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        self.expanded_name().and_then(|n| n.namespace.as_deref())
    }

    fn string_value(&self) -> String {
        self.doc.string_value(self.id)
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        Box::new(self.attribute_nodes())
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        Box::new(self.child_nodes())
    }

    fn parent(&self) -> Option<Self> {
        self.data().parent.map(|id| Node { doc: self.doc, id })
    }

    fn namespace_declarations(&self) -> Vec<(&'a str, &'a str)> {
        match self.kind() {
            NodeKind::Element { namespaces, .. } => namespaces
                .iter()
                .map(|(p, u)| (p.as_str(), u.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_id(&self) -> bool {
        matches!(self.kind(), NodeKind::Attribute { is_id: true, .. })
    }

    fn element_by_id(&self, id: &str) -> Option<Self> {
        self.doc.element_by_id(id).map(|id| self.doc.node(id))
    }

    fn unparsed_entity_uri(&self, name: &str) -> Option<String> {
        let entity = self.doc.dtd()?.entities.get(name)?;
        entity.notation.as_ref()?;
        let system = entity.system_id.as_deref()?;
        let base = entity.base_uri.as_deref().or(self.doc.uri());
        Some(xsltr_traits::resolve_uri(system, base))
    }

    fn root(&self) -> Self {
        self.doc.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        let loc = Location::default();
        let root = doc.append_element(NodeId::ROOT, ExpandedName::local("list"), vec![], loc);
        doc.append_attribute(root, ExpandedName::local("id"), "l1".into(), true, loc);
        let a = doc.append_element(root, ExpandedName::local("item"), vec![], loc);
        doc.append_text(a, "one", loc);
        doc.append_text(a, " more", loc);
        doc.append_text(root, "\n  ", loc);
        let b = doc.append_element(root, ExpandedName::local("item"), vec![], loc);
        doc.append_text(b, "two", loc);
        doc
    }

    #[test]
    fn test_ids_follow_document_order() {
        let doc = sample();
        let mut all = Vec::new();
        let mut stack = vec![doc.root()];
        while let Some(n) = stack.pop() {
            all.push(n.id());
            all.extend(n.attribute_nodes().map(|a| a.id()));
            let mut kids: Vec<_> = n.child_nodes().collect();
            kids.reverse();
            stack.extend(kids);
        }
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let doc = sample();
        let list = doc.document_element().unwrap();
        let first = list.child_nodes().next().unwrap();
        assert_eq!(first.string_value(), "one more");
        assert_eq!(first.child_nodes().count(), 1);
        assert_eq!(list.string_value(), "one more\n  two");
    }

    #[test]
    fn test_id_lookup_and_attribute_access() {
        let doc = sample();
        let list = doc.document_element().unwrap();
        assert_eq!(list.element_by_id("l1"), Some(list));
        assert_eq!(list.attribute(None, "id"), Some("l1"));
        assert!(list.attribute_nodes().next().unwrap().is_id());
    }

    #[test]
    fn test_strip_whitespace() {
        let mut doc = sample();
        doc.strip_whitespace(&|name| name.local == "list");
        let list = doc.document_element().unwrap();
        assert_eq!(list.child_nodes().count(), 2);
        assert_eq!(list.string_value(), "one moretwo");
    }

    #[test]
    fn test_xml_space_preserve_blocks_stripping() {
        let mut doc = sample();
        let list = doc.document_element().unwrap().id();
        doc.append_attribute(
            list,
            ExpandedName::new(Some("xml"), "space", Some(xsltr_xpath1::XML_NAMESPACE)),
            "preserve".into(),
            false,
            Location::default(),
        );
        doc.strip_whitespace(&|_| true);
        assert_eq!(doc.document_element().unwrap().child_nodes().count(), 3);
    }

    #[test]
    fn test_copy_between_documents() {
        let source = sample();
        let mut target = Document::new();
        let wrapper = target.append_element(
            NodeId::ROOT,
            ExpandedName::local("wrapper"),
            vec![],
            Location::default(),
        );
        let copied = target
            .append_copy(wrapper, source.document_element().unwrap())
            .unwrap();
        assert_eq!(target.string_value(copied), "one more\n  two");
        assert_eq!(target.element_by_id("l1"), Some(copied));
    }
}
