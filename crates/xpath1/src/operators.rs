//! Comparison, arithmetic and union operators with XPath 1.0 coercion rules.

use crate::ast::BinaryOperator;
use crate::datasource::DataSourceNode;
use crate::engine::{XPathValue, number_to_string, string_to_number};
use crate::error::XPathError;
use std::collections::HashSet;

pub fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    use BinaryOperator::*;
    let value = match op {
        Or => XPathValue::Boolean(left.to_bool() || right.to_bool()),
        And => XPathValue::Boolean(left.to_bool() && right.to_bool()),
        Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            XPathValue::Boolean(compare(op, &left, &right))
        }
        Plus => XPathValue::Number(left.to_number() + right.to_number()),
        Minus => XPathValue::Number(left.to_number() - right.to_number()),
        Multiply => XPathValue::Number(left.to_number() * right.to_number()),
        Divide => XPathValue::Number(left.to_number() / right.to_number()),
        // `%` truncates, so the result takes the sign of the dividend.
        Modulo => XPathValue::Number(left.to_number() % right.to_number()),
        Union => {
            let mut nodes = left.into_node_set("The left operand of '|'")?;
            nodes.extend(right.into_node_set("The right operand of '|'")?);
            nodes.sort();
            nodes.dedup();
            XPathValue::NodeSet(nodes)
        }
    };
    Ok(value)
}

/// A non-node-set operand of a comparison.
enum Atom {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Atom {
    fn from_value<'a, N: DataSourceNode<'a>>(value: &XPathValue<N>) -> Self {
        match value {
            XPathValue::String(s) => Atom::Str(s.clone()),
            XPathValue::Number(n) => Atom::Num(*n),
            XPathValue::Boolean(b) => Atom::Bool(*b),
            XPathValue::NodeSet(_) => Atom::Str(value.to_string()),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Atom::Str(s) => string_to_number(s),
            Atom::Num(n) => *n,
            Atom::Bool(b) => f64::from(u8::from(*b)),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            Atom::Str(s) => !s.is_empty(),
            Atom::Num(n) => *n != 0.0 && !n.is_nan(),
            Atom::Bool(b) => *b,
        }
    }

    fn to_text(&self) -> String {
        match self {
            Atom::Str(s) => s.clone(),
            Atom::Num(n) => number_to_string(*n),
            Atom::Bool(b) => b.to_string(),
        }
    }
}

fn compare_atoms(op: BinaryOperator, left: &Atom, right: &Atom) -> bool {
    use BinaryOperator::*;
    match op {
        Equals | NotEquals => {
            let equal = match (left, right) {
                (Atom::Bool(_), _) | (_, Atom::Bool(_)) => left.to_bool() == right.to_bool(),
                (Atom::Num(_), _) | (_, Atom::Num(_)) => left.to_number() == right.to_number(),
                _ => left.to_text() == right.to_text(),
            };
            (op == Equals) == equal
        }
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            match op {
                LessThan => l < r,
                LessThanOrEqual => l <= r,
                GreaterThan => l > r,
                _ => l >= r,
            }
        }
    }
}

/// Compares two values. A node-set operand compares true when any of its
/// members does.
pub fn compare<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let right_values: Vec<String> = r.iter().map(|n| n.string_value()).collect();
            if op == BinaryOperator::Equals {
                let lookup: HashSet<&str> = right_values.iter().map(String::as_str).collect();
                return l.iter().any(|n| lookup.contains(n.string_value().as_str()));
            }
            l.iter().any(|n| {
                let a = Atom::Str(n.string_value());
                right_values
                    .iter()
                    .any(|b| compare_atoms(op, &a, &Atom::Str(b.clone())))
            })
        }
        (XPathValue::NodeSet(l), XPathValue::Boolean(b)) => {
            compare_atoms(op, &Atom::Bool(!l.is_empty()), &Atom::Bool(*b))
        }
        (XPathValue::Boolean(b), XPathValue::NodeSet(r)) => {
            compare_atoms(op, &Atom::Bool(*b), &Atom::Bool(!r.is_empty()))
        }
        (XPathValue::NodeSet(l), other) => {
            let b = Atom::from_value(other);
            l.iter()
                .any(|n| compare_atoms(op, &Atom::Str(n.string_value()), &b))
        }
        (other, XPathValue::NodeSet(r)) => {
            let a = Atom::from_value(other);
            r.iter()
                .any(|n| compare_atoms(op, &a, &Atom::Str(n.string_value())))
        }
        (l, r) => compare_atoms(op, &Atom::from_value(l), &Atom::from_value(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    type V<'a> = XPathValue<MockNode<'a>>;

    fn cmp(op: BinaryOperator, l: V<'_>, r: V<'_>) -> bool {
        compare(op, &l, &r)
    }

    #[test]
    fn test_scalar_equality_coercion() {
        use BinaryOperator::*;
        assert!(cmp(Equals, V::Number(1.0), V::String("1.0".into())));
        assert!(cmp(Equals, V::Boolean(true), V::String("x".into())));
        assert!(!cmp(Equals, V::String("1".into()), V::String("1.0".into())));
        assert!(cmp(NotEquals, V::Number(f64::NAN), V::Number(f64::NAN)));
        assert!(cmp(LessThan, V::String("2".into()), V::String("10".into())));
    }

    #[test]
    fn test_node_set_comparisons_are_existential() {
        use BinaryOperator::*;
        let tree = create_test_tree();
        let paras = V::NodeSet(vec![tree.node(2), tree.node(9)]);
        assert!(cmp(Equals, paras.clone(), V::String("World".into())));
        assert!(cmp(NotEquals, paras.clone(), V::String("World".into())));
        assert!(!cmp(Equals, V::NodeSet(vec![]), V::String("".into())));
        assert!(cmp(Equals, V::NodeSet(vec![]), V::Boolean(false)));
        let hello = V::NodeSet(vec![tree.node(5)]);
        assert!(cmp(Equals, paras, hello));
    }

    #[test]
    fn test_arithmetic_and_union() {
        use BinaryOperator::*;
        let rem = evaluate(Modulo, V::Number(-5.0), V::Number(2.0)).unwrap();
        assert_eq!(rem.to_number(), -1.0);
        let quotient = evaluate(Divide, V::Number(1.0), V::Number(0.0)).unwrap();
        assert_eq!(quotient.to_number(), f64::INFINITY);

        let tree = create_test_tree();
        let union = evaluate(
            Union,
            V::NodeSet(vec![tree.node(9), tree.node(2)]),
            V::NodeSet(vec![tree.node(2)]),
        )
        .unwrap();
        assert_eq!(union, V::NodeSet(vec![tree.node(2), tree.node(9)]));
        assert!(evaluate(Union, V::Number(1.0), V::NodeSet(vec![])).is_err());
    }
}
