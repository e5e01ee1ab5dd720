//! Defines the core abstraction for a navigable, read-only data source tree.
use std::hash::Hash;

/// The namespace the `xml` prefix is permanently bound to.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

impl std::fmt::Display for QName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_part),
            None => f.write_str(self.local_part),
        }
    }
}

/// The type of a node in the data source tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The universal contract for a node in a read-only, hierarchical data source.
///
/// The XPath engine and the XSLT processor are written exclusively against this trait.
/// `Ord` must be document order: a node sorts before its attributes, its attributes
/// before its children.
///
/// `'a` is the lifetime of the underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    fn node_type(&self) -> NodeType;

    /// The qualified name of elements and attributes, or the target of a
    /// processing-instruction. `None` for other node types.
    fn name(&self) -> Option<QName<'a>>;

    /// The namespace URI of an element or attribute name, if it is in a namespace.
    fn namespace_uri(&self) -> Option<&'a str> {
        None
    }

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    fn string_value(&self) -> String;

    /// The attribute nodes of an element. Empty for every other node type.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The parent node. An attribute's parent is its owning element.
    fn parent(&self) -> Option<Self>;

    /// The namespace declarations made on this element, as `(prefix, uri)` pairs.
    /// The default namespace uses the empty prefix.
    fn namespace_declarations(&self) -> Vec<(&'a str, &'a str)> {
        Vec::new()
    }

    /// Whether this attribute node is of type ID.
    fn is_id(&self) -> bool {
        self.node_type() == NodeType::Attribute
            && self
                .name()
                .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "id")
    }

    /// Finds the element carrying an ID attribute with the given value.
    fn element_by_id(&self, id: &str) -> Option<Self> {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if node.node_type() == NodeType::Element
                && node
                    .attributes()
                    .any(|attr| attr.is_id() && attr.string_value() == id)
            {
                return Some(node);
            }
            let mark = stack.len();
            stack.extend(node.children());
            stack[mark..].reverse();
        }
        None
    }

    /// The URI of an unparsed entity declared in the document's DTD.
    fn unparsed_entity_uri(&self, _name: &str) -> Option<String> {
        None
    }

    fn root(&self) -> Self {
        let mut current = *self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// The in-scope namespaces of an element, nearest declaration first wins.
    fn in_scope_namespaces(&self) -> Vec<(&'a str, &'a str)> {
        let mut result: Vec<(&'a str, &'a str)> = Vec::new();
        let mut current = Some(*self);
        while let Some(node) = current {
            if node.node_type() == NodeType::Element {
                for (prefix, uri) in node.namespace_declarations() {
                    if !result.iter().any(|(p, _)| *p == prefix) {
                        result.push((prefix, uri));
                    }
                }
            }
            current = node.parent();
        }
        // An undeclaration (`xmlns=""`) hides the default namespace.
        result.retain(|(_, uri)| !uri.is_empty());
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData<'a> {
        node_type: NodeType,
        name: Option<QName<'a>>,
        namespace_uri: Option<&'a str>,
        value: String,
        parent: Option<usize>,
        children: Vec<usize>,
        attributes: Vec<usize>,
    }

    /// A small arena whose node ids are allocated in document order.
    #[derive(Debug, Default)]
    pub struct MockTree<'a> {
        nodes: Vec<MockNodeData<'a>>,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree<'a>,
    }

    impl PartialEq for MockNode<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl Eq for MockNode<'_> {}

    impl PartialOrd for MockNode<'_> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for MockNode<'_> {
        fn cmp(&self, other: &Self) -> Ordering {
            self.id.cmp(&other.id)
        }
    }

    impl Hash for MockNode<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl<'a> MockTree<'a> {
        pub fn node(&'a self, id: usize) -> MockNode<'a> {
            MockNode { id, tree: self }
        }

        fn push(
            &mut self,
            parent: Option<usize>,
            node_type: NodeType,
            name: Option<QName<'a>>,
            value: &str,
        ) -> usize {
            let id = self.nodes.len();
            self.nodes.push(MockNodeData {
                node_type,
                name,
                namespace_uri: None,
                value: value.to_string(),
                parent,
                children: vec![],
                attributes: vec![],
            });
            if let Some(p) = parent {
                if node_type == NodeType::Attribute {
                    self.nodes[p].attributes.push(id);
                } else {
                    self.nodes[p].children.push(id);
                }
            }
            id
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.nodes[self.id].node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            self.tree.nodes[self.id].name
        }

        fn namespace_uri(&self) -> Option<&'a str> {
            self.tree.nodes[self.id].namespace_uri
        }

        fn string_value(&self) -> String {
            match self.node_type() {
                NodeType::Root | NodeType::Element => {
                    let mut out = String::new();
                    let mut stack = vec![*self];
                    while let Some(node) = stack.pop() {
                        if node.node_type() == NodeType::Text {
                            out.push_str(&self.tree.nodes[node.id].value);
                        }
                        let mark = stack.len();
                        stack.extend(node.children());
                        stack[mark..].reverse();
                    }
                    out
                }
                _ => self.tree.nodes[self.id].value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(
                tree.nodes[self.id]
                    .attributes
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(
                tree.nodes[self.id]
                    .children
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn parent(&self) -> Option<Self> {
            self.tree.nodes[self.id].parent.map(|id| MockNode {
                id,
                tree: self.tree,
            })
        }
    }

    fn qname(local_part: &str) -> Option<QName<'_>> {
        Some(QName {
            prefix: None,
            local_part,
        })
    }

    /// Creates a simple mock tree for testing:
    /// ```text
    /// <root>                                    <!-- 0 root, 1 element -->
    ///   <para id="p1" xml:lang="en">Hello</para> <!-- 2, attrs 3 4, text 5 -->
    ///   <!-- comment node -->                    <!-- 6 -->
    ///   <div/>                                   <!-- 7 -->
    ///   <?pi-target pi-value?>                   <!-- 8 -->
    ///   <para>World</para>                       <!-- 9, text 10 -->
    /// </root>
    /// ```
    pub fn create_test_tree<'a>() -> MockTree<'a> {
        let mut tree = MockTree::default();
        let doc = tree.push(None, NodeType::Root, None, "");
        let root = tree.push(Some(doc), NodeType::Element, qname("root"), "");
        let para = tree.push(Some(root), NodeType::Element, qname("para"), "");
        tree.push(Some(para), NodeType::Attribute, qname("id"), "p1");
        let lang = tree.push(
            Some(para),
            NodeType::Attribute,
            Some(QName {
                prefix: Some("xml"),
                local_part: "lang",
            }),
            "en",
        );
        tree.nodes[lang].namespace_uri = Some(XML_NAMESPACE);
        tree.push(Some(para), NodeType::Text, None, "Hello");
        tree.push(Some(root), NodeType::Comment, None, " comment node ");
        tree.push(Some(root), NodeType::Element, qname("div"), "");
        tree.push(
            Some(root),
            NodeType::ProcessingInstruction,
            qname("pi-target"),
            "pi-value",
        );
        let para2 = tree.push(Some(root), NodeType::Element, qname("para"), "");
        tree.push(Some(para2), NodeType::Text, None, "World");
        tree
    }
}
