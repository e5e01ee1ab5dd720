//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    /// A primary expression narrowed by predicates, e.g. `$items[2]` or `(//a)[last()]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    /// Checks if the expression is a `BinaryOp` variant.
    pub fn is_binary_op(&self) -> bool {
        matches!(self, Expression::BinaryOp { .. })
    }

    /// Visits every function call in the expression tree, outermost first.
    pub fn for_each_function_call<'e>(&'e self, visit: &mut dyn FnMut(&'e str, usize)) {
        match self {
            Expression::Literal(_) | Expression::Number(_) | Expression::Variable(_) => {}
            Expression::FunctionCall { name, args } => {
                visit(name, args.len());
                for arg in args {
                    arg.for_each_function_call(visit);
                }
            }
            Expression::Filter {
                primary,
                predicates,
            } => {
                primary.for_each_function_call(visit);
                for p in predicates {
                    p.for_each_function_call(visit);
                }
            }
            Expression::LocationPath(path) => {
                if let Some(start) = &path.start_point {
                    start.for_each_function_call(visit);
                }
                for step in &path.steps {
                    for p in &step.predicates {
                        p.for_each_function_call(visit);
                    }
                }
            }
            Expression::BinaryOp { left, right, .. } => {
                left.for_each_function_call(visit);
                right.for_each_function_call(visit);
            }
            Expression::UnaryOp { expr, .. } => expr.for_each_function_call(visit),
        }
    }

    /// Visits the name of every variable reference in the expression tree.
    pub fn for_each_variable<'e>(&'e self, visit: &mut dyn FnMut(&'e str)) {
        match self {
            Expression::Literal(_) | Expression::Number(_) => {}
            Expression::Variable(name) => visit(name),
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.for_each_variable(visit);
                }
            }
            Expression::Filter {
                primary,
                predicates,
            } => {
                primary.for_each_variable(visit);
                for p in predicates {
                    p.for_each_variable(visit);
                }
            }
            Expression::LocationPath(path) => {
                if let Some(start) = &path.start_point {
                    start.for_each_variable(visit);
                }
                for step in &path.steps {
                    for p in &step.predicates {
                        p.for_each_variable(visit);
                    }
                }
            }
            Expression::BinaryOp { left, right, .. } => {
                left.for_each_variable(visit);
                right.for_each_variable(visit);
            }
            Expression::UnaryOp { expr, .. } => expr.for_each_variable(visit),
        }
    }
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

/// Represents a full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `func()/foo`.
    /// If `None`, the path starts from the context node or root.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root (e.g., `/foo`).
    /// Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Self {
            axis,
            node_test,
            predicates: vec![],
        }
    }

    /// The `descendant-or-self::node()` step that `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::NodeType(NodeTypeTest::Node))
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Namespace,
}

impl Axis {
    /// Reverse axes number their nodes in reverse document order for predicates.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// A qualified name test (e.g., `foo`, `xsl:if`).
    Name(String),
    /// Any name in the namespace bound to the prefix (`svg:*`).
    NamespaceWildcard(String),
    /// A wildcard test (`*`).
    Wildcard,
    /// A node type test (e.g., `text()`, `node()`).
    NodeType(NodeTypeTest),
    /// `processing-instruction('target')`.
    ProcessingInstruction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    ProcessingInstruction,
}
