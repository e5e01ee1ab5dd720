pub mod ast;
pub mod axes;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step};
pub use datasource::{DataSourceNode, NodeType, QName, XML_NAMESPACE};
pub use engine::{
    EvaluationContext, ExtensionFunctions, VariableScope, XPathValue, evaluate, number_to_string,
    string_to_number,
};
pub use functions::FunctionRegistry;

pub use error::XPathError;
pub use parser::parse_expression;
