//! Collects the nodes of each XPath axis in axis order: document order for
//! forward axes, nearest-first for reverse axes.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

pub fn collect<'a, N: DataSourceNode<'a>>(axis: Axis, node: N, out: &mut Vec<N>) {
    match axis {
        Axis::SelfAxis => out.push(node),
        Axis::Child => out.extend(node.children()),
        Axis::Attribute => {
            if node.node_type() == NodeType::Element {
                out.extend(node.attributes());
            }
        }
        Axis::Descendant => collect_descendants(node, out),
        Axis::DescendantOrSelf => {
            out.push(node);
            collect_descendants(node, out);
        }
        Axis::Parent => out.extend(node.parent()),
        Axis::Ancestor => collect_ancestors(node, out),
        Axis::AncestorOrSelf => {
            out.push(node);
            collect_ancestors(node, out);
        }
        Axis::FollowingSibling => collect_following_siblings(node, out),
        Axis::PrecedingSibling => collect_preceding_siblings(node, out),
        Axis::Following => collect_following(node, out),
        Axis::Preceding => collect_preceding(node, out),
        // Namespace nodes are not materialized by any data source.
        Axis::Namespace => {}
    }
}

fn is_attribute<'a, N: DataSourceNode<'a>>(node: N) -> bool {
    node.node_type() == NodeType::Attribute
}

/// Pre-order walk of `node`'s subtree, excluding `node` itself.
fn collect_descendants<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        out.push(current);
        let mark = stack.len();
        stack.extend(current.children());
        stack[mark..].reverse();
    }
}

fn collect_ancestors<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        out.push(p);
        current = p.parent();
    }
}

fn collect_following_siblings<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    if is_attribute(node) {
        return;
    }
    if let Some(parent) = node.parent() {
        out.extend(parent.children().skip_while(|s| *s != node).skip(1));
    }
}

fn collect_preceding_siblings<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    if is_attribute(node) {
        return;
    }
    if let Some(parent) = node.parent() {
        let mark = out.len();
        out.extend(parent.children().take_while(|s| *s != node));
        out[mark..].reverse();
    }
}

fn collect_following<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node;
    if is_attribute(node) {
        // Everything inside the owning element comes after its attributes.
        match node.parent() {
            Some(owner) => {
                collect_descendants(owner, out);
                current = owner;
            }
            None => return,
        }
    }
    while let Some(parent) = current.parent() {
        for sibling in parent.children().skip_while(|s| *s != current).skip(1) {
            out.push(sibling);
            collect_descendants(sibling, out);
        }
        current = parent;
    }
}

fn collect_preceding<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = match (is_attribute(node), node.parent()) {
        (true, Some(owner)) => owner,
        (true, None) => return,
        (false, _) => node,
    };
    while let Some(parent) = current.parent() {
        let siblings: Vec<N> = parent.children().take_while(|s| *s != current).collect();
        for sibling in siblings.into_iter().rev() {
            let mark = out.len();
            out.push(sibling);
            collect_descendants(sibling, out);
            out[mark..].reverse();
        }
        current = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    fn ids(axis: Axis, node: MockNode<'_>) -> Vec<usize> {
        let mut out = Vec::new();
        collect(axis, node, &mut out);
        out.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_collect_child_and_descendant() {
        let tree = create_test_tree();
        let root = tree.node(1);
        assert_eq!(ids(Axis::Child, root), vec![2, 6, 7, 8, 9]);
        // Attributes are not descendants.
        assert_eq!(ids(Axis::Descendant, root), vec![2, 5, 6, 7, 8, 9, 10]);
        assert_eq!(ids(Axis::DescendantOrSelf, tree.node(9)), vec![9, 10]);
    }

    #[test]
    fn test_collect_ancestor() {
        let tree = create_test_tree();
        assert_eq!(ids(Axis::Ancestor, tree.node(5)), vec![2, 1, 0]);
        assert_eq!(ids(Axis::AncestorOrSelf, tree.node(3)), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_collect_siblings() {
        let tree = create_test_tree();
        assert_eq!(ids(Axis::FollowingSibling, tree.node(2)), vec![6, 7, 8, 9]);
        assert_eq!(ids(Axis::PrecedingSibling, tree.node(9)), vec![8, 7, 6, 2]);
        assert!(ids(Axis::PrecedingSibling, tree.node(3)).is_empty());
    }

    #[test]
    fn test_collect_following_preceding() {
        let tree = create_test_tree();
        assert_eq!(ids(Axis::Following, tree.node(5)), vec![6, 7, 8, 9, 10]);
        assert_eq!(ids(Axis::Preceding, tree.node(7)), vec![6, 5, 2]);
        // Preceding excludes ancestors.
        assert_eq!(ids(Axis::Preceding, tree.node(10)), vec![8, 7, 6, 5, 2]);
        assert_eq!(ids(Axis::Following, tree.node(4)), vec![5, 6, 7, 8, 9, 10]);
    }
}
