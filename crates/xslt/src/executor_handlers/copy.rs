//! `xsl:copy` and `xsl:copy-of`: copying source nodes into the result.

use crate::ast::{CompiledXPath, PreparsedTemplate};
use crate::error::XsltError;
use crate::executor::{Binding, TemplateExecutor};
use crate::executor_handlers::literals;
use crate::output::OutputBuilder;
use xsltr_dom::ExpandedName;
use xsltr_xpath1::XPathValue;
use xsltr_xpath1::datasource::{DataSourceNode, NodeType};

/// The name of an element, attribute or processing instruction as a result name.
pub(crate) fn expanded_name<'a, N: DataSourceNode<'a>>(node: N) -> ExpandedName {
    match node.name() {
        Some(q) => ExpandedName::new(q.prefix, q.local_part, node.namespace_uri()),
        None => ExpandedName::local(""),
    }
}

pub(crate) fn handle_copy_of<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: &CompiledXPath,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    if let Some(name) = select.as_variable() {
        executor.ensure_globals(&select.variables)?;
        if let Some(Binding::Fragment(tree)) = executor.lookup_binding(name) {
            tree.replay_into(builder);
            return Ok(());
        }
    }
    match executor.evaluate_xpath(select, context_node, context_position, context_size)? {
        XPathValue::NodeSet(nodes) => {
            for node in nodes {
                copy_node(node, builder);
            }
        }
        result => builder.add_text(&result.to_string()),
    }
    Ok(())
}

/// Deep copy of a source node with its namespace nodes and attributes.
fn copy_node<'a, N: DataSourceNode<'a> + 'a>(node: N, builder: &mut dyn OutputBuilder) {
    match node.node_type() {
        NodeType::Root => {
            for child in node.children() {
                copy_node(child, builder);
            }
        }
        NodeType::Element => {
            builder.start_element(&expanded_name(node));
            for (prefix, uri) in node.in_scope_namespaces() {
                builder.add_namespace(prefix, uri);
            }
            for attr in node.attributes() {
                builder.add_attribute(&expanded_name(attr), &attr.string_value());
            }
            for child in node.children() {
                copy_node(child, builder);
            }
            builder.end_element();
        }
        _ => copy_leaf(node, builder),
    }
}

/// Copies the nodes that have no children of their own.
fn copy_leaf<'a, N: DataSourceNode<'a> + 'a>(node: N, builder: &mut dyn OutputBuilder) {
    match node.node_type() {
        NodeType::Attribute => builder.add_attribute(&expanded_name(node), &node.string_value()),
        NodeType::Text => builder.add_text(&node.string_value()),
        NodeType::Comment => builder.add_comment(&node.string_value()),
        NodeType::ProcessingInstruction => {
            let target = node.name().map_or("", |q| q.local_part);
            builder.add_processing_instruction(target, &node.string_value());
        }
        NodeType::Root | NodeType::Element => {}
    }
}

/// Shallow copy of the context node: elements keep their namespace nodes, and their
/// content comes from the body.
pub(crate) fn handle_copy<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    match context_node.node_type() {
        NodeType::Element => {
            builder.start_element(&expanded_name(context_node));
            for (prefix, uri) in context_node.in_scope_namespaces() {
                builder.add_namespace(prefix, uri);
            }
            literals::apply_attribute_sets(
                executor,
                use_attribute_sets,
                context_node,
                context_position,
                context_size,
                builder,
            )?;
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
            builder.end_element();
        }
        NodeType::Root => {
            executor.execute_template(body, context_node, context_position, context_size, builder)?;
        }
        _ => copy_leaf(context_node, builder),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_tree::{ResultNodeKind, ResultTree};
    use xsltr_dom::{ParseOptions, parse};
    use xsltr_traits::InMemoryResourceProvider;

    #[test]
    fn test_deep_copy_keeps_namespaces_and_attributes() {
        let doc = parse(
            r#"<a xmlns:p="urn:p"><p:b k="v">t<!--c--><?pi d?></p:b></a>"#,
            &ParseOptions::default(),
            &InMemoryResourceProvider::new(),
        )
        .unwrap();
        let b = doc.document_element().unwrap().child_nodes().next().unwrap();
        let mut tree = ResultTree::new();
        copy_node(b, &mut tree);

        let element = tree.document_element().unwrap();
        match &element.kind {
            ResultNodeKind::Element {
                name,
                namespaces,
                attributes,
            } => {
                assert_eq!(name.qualified(), "p:b");
                assert_eq!(name.namespace.as_deref(), Some("urn:p"));
                assert_eq!(namespaces, &vec![("p".to_string(), "urn:p".to_string())]);
                assert_eq!(attributes[0].value, "v");
            }
            other => panic!("expected an element, got {:?}", other),
        }
        assert_eq!(element.children.len(), 3);
        assert_eq!(tree.string_value(), "t");
    }
}
