//! The in-memory result tree: what templates build, what variables hold as result tree
//! fragments, and what the serializer writes.

use crate::output::OutputBuilder;
use xsltr_dom::ExpandedName;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultAttribute {
    pub name: ExpandedName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultNodeKind {
    Root,
    Element {
        name: ExpandedName,
        namespaces: Vec<(String, String)>,
        attributes: Vec<ResultAttribute>,
    },
    Text {
        text: String,
        escape: bool,
    },
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultNode {
    pub kind: ResultNodeKind,
    pub children: Vec<usize>,
}

/// An append-only arena; index 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTree {
    nodes: Vec<ResultNode>,
    open: Vec<usize>,
}

impl Default for ResultTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultTree {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![ResultNode {
                kind: ResultNodeKind::Root,
                children: Vec::new(),
            }],
            open: vec![Self::ROOT],
        }
    }

    pub fn node(&self, index: usize) -> &ResultNode {
        &self.nodes[index]
    }

    pub fn root(&self) -> &ResultNode {
        &self.nodes[Self::ROOT]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[Self::ROOT].children.is_empty()
    }

    /// The first element child of the root, if any.
    pub fn document_element(&self) -> Option<&ResultNode> {
        self.root()
            .children
            .iter()
            .map(|&i| &self.nodes[i])
            .find(|n| matches!(n.kind, ResultNodeKind::Element { .. }))
    }

    /// Concatenated text descendants, the string value of the fragment.
    pub fn string_value(&self) -> String {
        let mut out = String::new();
        self.collect_text(Self::ROOT, &mut out);
        out
    }

    fn collect_text(&self, index: usize, out: &mut String) {
        for &child in &self.nodes[index].children {
            match &self.nodes[child].kind {
                ResultNodeKind::Text { text, .. } => out.push_str(text),
                ResultNodeKind::Element { .. } => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Text of the top-level text nodes only. Content that may only produce text
    /// (attribute values, comments) is read this way.
    pub fn text_content(&self) -> (String, bool) {
        let mut out = String::new();
        let mut dropped = false;
        for &child in &self.root().children {
            match &self.nodes[child].kind {
                ResultNodeKind::Text { text, .. } => out.push_str(text),
                _ => dropped = true,
            }
        }
        (out, dropped)
    }

    /// Writes the children of the root into another builder.
    pub fn replay_into(&self, builder: &mut dyn OutputBuilder) {
        for &child in &self.root().children {
            self.replay_node(child, builder);
        }
    }

    fn replay_node(&self, index: usize, builder: &mut dyn OutputBuilder) {
        let node = &self.nodes[index];
        match &node.kind {
            ResultNodeKind::Root => self.replay_into(builder),
            ResultNodeKind::Element {
                name,
                namespaces,
                attributes,
            } => {
                builder.start_element(name);
                for (prefix, uri) in namespaces {
                    builder.add_namespace(prefix, uri);
                }
                for attr in attributes {
                    builder.add_attribute(&attr.name, &attr.value);
                }
                for &child in &node.children {
                    self.replay_node(child, builder);
                }
                builder.end_element();
            }
            ResultNodeKind::Text { text, escape: true } => builder.add_text(text),
            ResultNodeKind::Text { text, escape: false } => builder.add_unescaped_text(text),
            ResultNodeKind::Comment(text) => builder.add_comment(text),
            ResultNodeKind::ProcessingInstruction { target, data } => {
                builder.add_processing_instruction(target, data)
            }
        }
    }

    fn current(&self) -> usize {
        self.open.last().copied().unwrap_or(Self::ROOT)
    }

    fn append(&mut self, kind: ResultNodeKind) -> usize {
        let index = self.nodes.len();
        self.nodes.push(ResultNode {
            kind,
            children: Vec::new(),
        });
        let parent = self.current();
        self.nodes[parent].children.push(index);
        index
    }

    fn push_text(&mut self, text: &str, escape: bool) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(&last) = self.nodes[parent].children.last()
            && let ResultNodeKind::Text {
                text: existing,
                escape: existing_escape,
            } = &mut self.nodes[last].kind
            && *existing_escape == escape
        {
            existing.push_str(text);
            return;
        }
        self.append(ResultNodeKind::Text {
            text: text.to_string(),
            escape,
        });
    }
}

impl OutputBuilder for ResultTree {
    fn start_element(&mut self, name: &ExpandedName) {
        let index = self.append(ResultNodeKind::Element {
            name: name.clone(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
        });
        self.open.push(index);
    }

    fn end_element(&mut self) {
        if self.open.len() > 1 {
            self.open.pop();
        }
    }

    fn add_namespace(&mut self, prefix: &str, uri: &str) {
        let current = self.current();
        let has_children = !self.nodes[current].children.is_empty();
        match &mut self.nodes[current].kind {
            ResultNodeKind::Element { namespaces, .. } if !has_children => {
                match namespaces.iter_mut().find(|(p, _)| p == prefix) {
                    Some(existing) => existing.1 = uri.to_string(),
                    None => namespaces.push((prefix.to_string(), uri.to_string())),
                }
            }
            _ => log::warn!("Namespace node '{}' has no element to attach to; ignored", prefix),
        }
    }

    fn add_attribute(&mut self, name: &ExpandedName, value: &str) {
        let current = self.current();
        let has_children = !self.nodes[current].children.is_empty();
        match &mut self.nodes[current].kind {
            ResultNodeKind::Element { attributes, .. } if !has_children => {
                let same_name = |a: &&mut ResultAttribute| {
                    a.name.local == name.local && a.name.namespace == name.namespace
                };
                match attributes.iter_mut().find(same_name) {
                    Some(existing) => {
                        existing.name = name.clone();
                        existing.value = value.to_string();
                    }
                    None => attributes.push(ResultAttribute {
                        name: name.clone(),
                        value: value.to_string(),
                    }),
                }
            }
            ResultNodeKind::Element { .. } => log::warn!(
                "Attribute '{}' added after child nodes; ignored",
                name.qualified()
            ),
            _ => log::warn!(
                "Attribute '{}' has no element to attach to; ignored",
                name.qualified()
            ),
        }
    }

    fn add_text(&mut self, text: &str) {
        self.push_text(text, true);
    }

    fn add_unescaped_text(&mut self, text: &str) {
        self.push_text(text, false);
    }

    fn add_comment(&mut self, text: &str) {
        self.append(ResultNodeKind::Comment(text.to_string()));
    }

    fn add_processing_instruction(&mut self, target: &str, data: &str) {
        self.append(ResultNodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
    }
}
