//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.

use super::ast::{
    Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step, UnaryOperator,
};
use super::functions::{self, FunctionRegistry};
use super::{axes, operators};
use crate::datasource::{DataSourceNode, NodeType, XML_NAMESPACE};
use crate::error::XPathError;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Represents the possible result types of an XPath expression evaluation.
///
/// Node-sets produced by the engine are in document order without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<N> {
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, N: DataSourceNode<'a>> XPathValue<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map_or(f64::NAN, |n| string_to_number(&n.string_value())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }

    pub fn into_node_set(self, what: &str) -> Result<Vec<N>, XPathError> {
        match self {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::TypeError(format!(
                "{} must be a node-set, got a {}",
                what,
                other.type_name()
            ))),
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for XPathValue<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => match nodes.first() {
                Some(n) => f.write_str(&n.string_value()),
                None => Ok(()),
            },
            XPathValue::String(s) => f.write_str(s),
            XPathValue::Number(n) => f.write_str(&number_to_string(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Converts a string to a number: optional whitespace, an optional minus sign,
/// digits with an optional fraction. Anything else is `NaN`.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_xml_whitespace);
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut digits = 0;
    let mut dots = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Converts a number to its XPath string form: no exponent, integers without a
/// fractional part, `NaN` and `Infinity` spelled out.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        // `Display` for f64 prints the shortest round-trip digits without an exponent.
        format!("{}", n)
    }
}

/// Resolves variable references during evaluation.
pub trait VariableScope<N> {
    /// `Ok(None)` means the variable is not bound in this scope.
    fn lookup(&self, name: &str) -> Result<Option<XPathValue<N>>, XPathError>;
}

impl<N: Clone> VariableScope<N> for HashMap<String, XPathValue<N>> {
    fn lookup(&self, name: &str) -> Result<Option<XPathValue<N>>, XPathError> {
        Ok(self.get(name).cloned())
    }
}

/// Functions supplied by the host language on top of the core library.
pub trait ExtensionFunctions<'a, N: DataSourceNode<'a>> {
    /// Whether `name` is implemented by this provider.
    fn provides(&self, name: &str) -> bool;

    /// Evaluates `name`, or returns `None` when it is not provided.
    fn call(
        &self,
        name: &str,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Option<Result<XPathValue<N>, XPathError>>;
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying data source.
/// `'d` is the lifetime of the evaluation context itself.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    pub root_node: N,
    pub functions: &'d FunctionRegistry,
    pub context_position: usize, // 1-based index
    pub context_size: usize,
    pub variables: &'d dyn VariableScope<N>,
    /// Prefix to namespace URI bindings used by name tests.
    pub namespaces: &'d HashMap<String, String>,
    pub extensions: Option<&'d dyn ExtensionFunctions<'a, N>>,
    _marker: PhantomData<&'a ()>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(
        context_node: N,
        root_node: N,
        functions: &'d FunctionRegistry,
        variables: &'d dyn VariableScope<N>,
        namespaces: &'d HashMap<String, String>,
    ) -> Self {
        Self {
            context_node,
            root_node,
            functions,
            context_position: 1,
            context_size: 1,
            variables,
            namespaces,
            extensions: None,
            _marker: PhantomData,
        }
    }

    pub fn with_extensions(mut self, extensions: &'d dyn ExtensionFunctions<'a, N>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_position(mut self, position: usize, size: usize) -> Self {
        self.context_position = position;
        self.context_size = size;
        self
    }

    /// A copy of this context focused on another node.
    pub fn at(&self, node: N, position: usize, size: usize) -> Self {
        Self {
            context_node: node,
            context_position: position,
            context_size: size,
            ..*self
        }
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Result<&str, XPathError> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE);
        }
        self.namespaces
            .get(prefix)
            .map(String::as_str)
            .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => {
            let nodes = evaluate_location_path(path, e_ctx)?;
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Variable(name) => e_ctx
            .variables
            .lookup(name)?
            .ok_or_else(|| XPathError::UnknownVariable(name.clone())),
        Expression::FunctionCall { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::evaluate_function(name, evaluated_args, e_ctx)
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            let nodes = evaluate(primary, e_ctx)?.into_node_set("A filtered expression")?;
            let filtered = apply_predicates(nodes, predicates, e_ctx)?;
            Ok(XPathValue::NodeSet(filtered))
        }
        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Ok(XPathValue::Boolean(
                evaluate(left, e_ctx)?.to_bool() && evaluate(right, e_ctx)?.to_bool(),
            )),
            BinaryOperator::Or => Ok(XPathValue::Boolean(
                evaluate(left, e_ctx)?.to_bool() || evaluate(right, e_ctx)?.to_bool(),
            )),
            _ => {
                let left_val = evaluate(left, e_ctx)?;
                let right_val = evaluate(right, e_ctx)?;
                operators::evaluate(*op, left_val, right_val)
            }
        },
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let initial_context = if let Some(start_expr) = &path.start_point {
        evaluate(start_expr, e_ctx)?.into_node_set("The start of a path")?
    } else if path.is_absolute {
        vec![e_ctx.context_node.root()]
    } else {
        vec![e_ctx.context_node]
    };

    let mut current_nodes = initial_context;
    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(current_nodes)
}

/// Evaluates one step from every node of the context set. Predicates see each
/// context node's candidates in axis order; the union is returned in document order.
pub fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let test = ResolvedNodeTest::new(&step.node_test, step.axis, e_ctx)?;
    let mut result = Vec::new();
    let mut candidates = Vec::new();

    for &node in context_nodes {
        candidates.clear();
        axes::collect(step.axis, node, &mut candidates);
        if step.predicates.is_empty() {
            result.extend(candidates.iter().copied().filter(|n| test.matches(n)));
        } else {
            let tested: Vec<N> = candidates.iter().copied().filter(|n| test.matches(n)).collect();
            result.extend(apply_predicates(tested, &step.predicates, e_ctx)?);
        }
    }

    if context_nodes.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

/// A node test whose prefix, if any, has been resolved against the context.
pub struct ResolvedNodeTest<'t> {
    test: &'t NodeTest,
    principal: NodeType,
    local: &'t str,
    uri: Option<String>,
}

impl<'t> ResolvedNodeTest<'t> {
    pub fn new<'a, N: DataSourceNode<'a>>(
        test: &'t NodeTest,
        axis: Axis,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<Self, XPathError> {
        let principal = if axis == Axis::Attribute {
            NodeType::Attribute
        } else {
            NodeType::Element
        };
        let (local, uri) = match test {
            NodeTest::Name(qname) => match qname.split_once(':') {
                Some((prefix, local)) => (local, Some(e_ctx.resolve_prefix(prefix)?.to_string())),
                None => (qname.as_str(), None),
            },
            NodeTest::NamespaceWildcard(prefix) => {
                ("", Some(e_ctx.resolve_prefix(prefix)?.to_string()))
            }
            _ => ("", None),
        };
        Ok(Self {
            test,
            principal,
            local,
            uri,
        })
    }

    pub fn matches<'a, N: DataSourceNode<'a>>(&self, node: &N) -> bool {
        match self.test {
            NodeTest::Wildcard => node.node_type() == self.principal,
            NodeTest::Name(_) => {
                node.node_type() == self.principal
                    && node.name().is_some_and(|q| q.local_part == self.local)
                    && node.namespace_uri() == self.uri.as_deref()
            }
            NodeTest::NamespaceWildcard(_) => {
                node.node_type() == self.principal && node.namespace_uri() == self.uri.as_deref()
            }
            NodeTest::NodeType(ntt) => match ntt {
                NodeTypeTest::Text => node.node_type() == NodeType::Text,
                NodeTypeTest::Comment => node.node_type() == NodeType::Comment,
                NodeTypeTest::ProcessingInstruction => {
                    node.node_type() == NodeType::ProcessingInstruction
                }
                NodeTypeTest::Node => true,
            },
            NodeTest::ProcessingInstruction(target) => {
                node.node_type() == NodeType::ProcessingInstruction
                    && node.name().is_some_and(|q| q.local_part == target)
            }
        }
    }
}

/// Filters a set of nodes by applying a series of predicates, each one numbering
/// the survivors of the previous one.
pub fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut final_nodes = nodes;
    for predicate in predicates {
        let context_size = final_nodes.len();
        let mut predicate_results = Vec::with_capacity(context_size);
        for (i, node) in final_nodes.iter().enumerate() {
            let predicate_e_ctx = e_ctx.at(*node, i + 1, context_size);
            let keep = match evaluate(predicate, &predicate_e_ctx)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                predicate_results.push(*node);
            }
        }
        final_nodes = predicate_results;
    }
    Ok(final_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::parser::parse_expression;

    fn eval<'a>(
        tree: &'a MockTree<'a>,
        vars: &HashMap<String, XPathValue<MockNode<'a>>>,
        expr: &str,
    ) -> Result<XPathValue<MockNode<'a>>, XPathError> {
        let funcs = FunctionRegistry::default();
        let namespaces = HashMap::new();
        let root = tree.node(0);
        let e_ctx = EvaluationContext::new(root, root, &funcs, vars, &namespaces);
        evaluate(&parse_expression(expr)?, &e_ctx)
    }

    fn ids(value: XPathValue<MockNode<'_>>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.into_iter().map(|n| n.id).collect(),
            other => panic!("Expected a NodeSet, got {:?}", other),
        }
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1e21), "1000000000000000000000");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number("-1.5"), -1.5);
        assert_eq!(string_to_number(".5"), 0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("").is_nan());
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "root/para[@id='p1']").unwrap()), vec![2]);
    }

    #[test]
    fn test_predicate_by_position() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "root/para[2]").unwrap()), vec![9]);
        assert_eq!(ids(eval(&tree, &vars, "root/para[position()=1]").unwrap()), vec![2]);
        assert_eq!(ids(eval(&tree, &vars, "root/*[last()]").unwrap()), vec![9]);
        assert!(ids(eval(&tree, &vars, "root/para[1.5]").unwrap()).is_empty());
    }

    #[test]
    fn test_reverse_axis_positions_are_proximity_based() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        // The nearest preceding sibling element of the second para is the div.
        assert_eq!(
            ids(eval(&tree, &vars, "root/para[2]/preceding-sibling::*[1]").unwrap()),
            vec![7]
        );
        assert_eq!(ids(eval(&tree, &vars, "//text()/ancestor::*[last()]").unwrap()), vec![1]);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "//para").unwrap()), vec![2, 9]);
        assert_eq!(ids(eval(&tree, &vars, "//text()").unwrap()), vec![5, 10]);
        assert_eq!(
            ids(eval(&tree, &vars, "//para | //div | /root").unwrap()),
            vec![1, 2, 7, 9]
        );
    }

    #[test]
    fn test_filter_expression_positions() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "(//para)[last()]").unwrap()), vec![9]);
        assert_eq!(ids(eval(&tree, &vars, "(//node())[1]").unwrap()), vec![1]);
    }

    #[test]
    fn test_variable_evaluation() {
        let tree = create_test_tree();
        let mut vars = HashMap::new();
        vars.insert(
            "myVar".to_string(),
            XPathValue::String("test-value".to_string()),
        );
        assert_eq!(eval(&tree, &vars, "$myVar").unwrap().to_string(), "test-value");
        assert_eq!(
            eval(&tree, &vars, "$missing"),
            Err(XPathError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn test_path_from_variable_node_set() {
        let tree = create_test_tree();
        let mut vars = HashMap::new();
        vars.insert("para_node".to_string(), XPathValue::NodeSet(vec![tree.node(2)]));
        let result = eval(&tree, &vars, "$para_node/text()").unwrap();
        assert_eq!(result.to_string(), "Hello");
        assert_eq!(ids(result), vec![5]);
    }

    #[test]
    fn test_path_from_non_node_set_is_an_error() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert!(matches!(
            eval(&tree, &vars, "string(.)/foo"),
            Err(XPathError::TypeError(_))
        ));
    }

    #[test]
    fn test_namespaced_name_tests() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "//@xml:lang").unwrap()), vec![4]);
        assert_eq!(ids(eval(&tree, &vars, "//@xml:*").unwrap()), vec![4]);
        // An unprefixed name only matches names in no namespace.
        assert_eq!(ids(eval(&tree, &vars, "//@lang").unwrap()), Vec::<usize>::new());
        assert_eq!(
            eval(&tree, &vars, "//svg:rect"),
            Err(XPathError::UnboundPrefix("svg".to_string()))
        );
    }

    #[test]
    fn test_attribute_axes() {
        let tree = create_test_tree();
        let vars = HashMap::new();
        assert_eq!(ids(eval(&tree, &vars, "//para/@*").unwrap()), vec![3, 4]);
        assert_eq!(ids(eval(&tree, &vars, "//@id/..").unwrap()), vec![2]);
        assert!(ids(eval(&tree, &vars, "//@id/following-sibling::node()").unwrap()).is_empty());
        assert_eq!(ids(eval(&tree, &vars, "//@id/following::text()").unwrap()), vec![5, 10]);
    }
}
