//! A `nom`-based parser for the XPath 1.0 expression language.

use super::ast::*;
use crate::error::XPathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

type PResult<'a, O> = IResult<&'a str, O>;

// --- Main Public Parser ---

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input) {
        Ok((rem, expr)) if rem.trim().is_empty() => Ok(expr),
        Ok((rem, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("unexpected input at '{}'", rem.trim()),
        )),
        Err(e) => Err(XPathError::XPathParse(input.to_string(), e.to_string())),
    }
}

// --- Combinators & Helpers ---

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// An operator name such as `and` or `div`, which must not run into a following name.
fn keyword<'a>(word: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> + Clone {
    move |input| terminated(tag(word), not(satisfy(is_name_char))).parse(input)
}

fn build_binary_expr_parser<'a, F, G>(
    sub_expr_parser: F,
    op_parser: G,
) -> impl FnMut(&'a str) -> PResult<'a, Expression>
where
    F: Parser<&'a str, Output = Expression, Error = nom::error::Error<&'a str>> + Clone,
    G: Parser<&'a str, Output = BinaryOperator, Error = nom::error::Error<&'a str>> + Clone,
{
    move |input: &str| {
        let (input, mut left) = sub_expr_parser.clone().parse(input)?;
        let (input, remainder) =
            many0(pair(ws(op_parser.clone()), sub_expr_parser.clone())).parse(input)?;

        for (op, right) in remainder {
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok((input, left))
    }
}

// --- Expression Parsers (in order of precedence) ---

fn expression(input: &str) -> PResult<'_, Expression> {
    or_expr(input)
}

fn or_op(input: &str) -> PResult<'_, BinaryOperator> {
    value(BinaryOperator::Or, keyword("or")).parse(input)
}

fn and_op(input: &str) -> PResult<'_, BinaryOperator> {
    value(BinaryOperator::And, keyword("and")).parse(input)
}

fn equality_op(input: &str) -> PResult<'_, BinaryOperator> {
    alt((
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::Equals, tag("=")),
    ))
    .parse(input)
}

fn relational_op(input: &str) -> PResult<'_, BinaryOperator> {
    alt((
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::LessThan, tag("<")),
        value(BinaryOperator::GreaterThan, tag(">")),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> PResult<'_, BinaryOperator> {
    alt((
        value(BinaryOperator::Plus, char('+')),
        value(BinaryOperator::Minus, char('-')),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> PResult<'_, BinaryOperator> {
    alt((
        value(BinaryOperator::Multiply, char('*')),
        value(BinaryOperator::Divide, keyword("div")),
        value(BinaryOperator::Modulo, keyword("mod")),
    ))
    .parse(input)
}

fn union_op(input: &str) -> PResult<'_, BinaryOperator> {
    value(BinaryOperator::Union, char('|')).parse(input)
}

fn or_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(and_expr, or_op)(input)
}

fn and_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(equality_expr, and_op)(input)
}

fn equality_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(relational_expr, equality_op)(input)
}

fn relational_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(additive_expr, relational_op)(input)
}

fn additive_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(multiplicative_expr, additive_op)(input)
}

fn multiplicative_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(unary_expr, multiplicative_op)(input)
}

fn unary_expr(input: &str) -> PResult<'_, Expression> {
    alt((
        map(preceded(ws(char('-')), unary_expr), |expr| {
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            }
        }),
        union_expr,
    ))
    .parse(input)
}

fn union_expr(input: &str) -> PResult<'_, Expression> {
    build_binary_expr_parser(path_expr, union_op)(input)
}

/// Either a location path, or a filter expression optionally continued by `/` steps.
fn path_expr(input: &str) -> PResult<'_, Expression> {
    let (input, _) = multispace0(input)?;

    // Primary expressions first: `position()` must not be read as a step named `position`.
    if let Ok((rest, primary)) = filter_expr(input) {
        let (rest, tail) = many0(pair(ws(path_separator), step)).parse(rest)?;
        if tail.is_empty() {
            return Ok((rest, primary));
        }
        let mut steps = Vec::new();
        append_steps(&mut steps, tail);
        let path = LocationPath {
            start_point: Some(Box::new(primary)),
            is_absolute: false,
            steps,
        };
        return Ok((rest, Expression::LocationPath(path)));
    }

    map(location_path, Expression::LocationPath).parse(input)
}

fn filter_expr(input: &str) -> PResult<'_, Expression> {
    let (input, primary) = primary_expr(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    if predicates.is_empty() {
        Ok((input, primary))
    } else {
        Ok((
            input,
            Expression::Filter {
                primary: Box::new(primary),
                predicates,
            },
        ))
    }
}

fn primary_expr(input: &str) -> PResult<'_, Expression> {
    alt((
        variable_reference,
        delimited(char('('), ws(expression), char(')')),
        map(string_literal, Expression::Literal),
        map(number_literal, Expression::Number),
        function_call,
    ))
    .parse(input)
}

// --- Literal Parsers ---

pub fn string_literal(input: &str) -> PResult<'_, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

/// `Digits ('.' Digits?)? | '.' Digits`; no sign, exponent or `NaN`/`Infinity` spellings.
fn number_literal(input: &str) -> PResult<'_, f64> {
    map_res(
        recognize(alt((
            value((), pair(digit1, opt(pair(char('.'), digit0)))),
            value((), pair(char('.'), digit1)),
        ))),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

// --- Variable Reference Parser ---

fn variable_reference(input: &str) -> PResult<'_, Expression> {
    map(preceded(char('$'), q_name), Expression::Variable).parse(input)
}

// --- Name and NodeTest Parsers ---

fn nc_name(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(is_name_start_char),
        take_while(is_name_char),
    ))
    .parse(input)
}

fn q_name(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(nc_name, opt(pair(char(':'), nc_name)))),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn is_node_type_name(name: &str) -> bool {
    matches!(
        name,
        "text" | "node" | "comment" | "processing-instruction"
    )
}

fn node_type_test(input: &str) -> PResult<'_, NodeTest> {
    map(
        terminated(
            alt((
                tag("text"),
                tag("node"),
                tag("comment"),
                tag("processing-instruction"),
            )),
            pair(ws(char('(')), char(')')),
        ),
        |node_type: &str| match node_type {
            "text" => NodeTest::NodeType(NodeTypeTest::Text),
            "comment" => NodeTest::NodeType(NodeTypeTest::Comment),
            "processing-instruction" => NodeTest::NodeType(NodeTypeTest::ProcessingInstruction),
            _ => NodeTest::NodeType(NodeTypeTest::Node),
        },
    )
    .parse(input)
}

fn pi_target_test(input: &str) -> PResult<'_, NodeTest> {
    map(
        delimited(
            pair(tag("processing-instruction"), ws(char('('))),
            string_literal,
            ws(char(')')),
        ),
        NodeTest::ProcessingInstruction,
    )
    .parse(input)
}

pub fn node_test(input: &str) -> PResult<'_, NodeTest> {
    alt((
        value(NodeTest::Wildcard, char('*')),
        pi_target_test,
        node_type_test,
        map(terminated(nc_name, tag(":*")), |prefix: &str| {
            NodeTest::NamespaceWildcard(prefix.to_string())
        }),
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

// --- Path Parsers ---

fn axis(input: &str) -> PResult<'_, Axis> {
    alt((
        value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
        value(Axis::Ancestor, tag("ancestor")),
        value(Axis::Attribute, tag("attribute")),
        value(Axis::Child, tag("child")),
        value(Axis::DescendantOrSelf, tag("descendant-or-self")),
        value(Axis::Descendant, tag("descendant")),
        value(Axis::FollowingSibling, tag("following-sibling")),
        value(Axis::Following, tag("following")),
        value(Axis::Namespace, tag("namespace")),
        value(Axis::Parent, tag("parent")),
        value(Axis::PrecedingSibling, tag("preceding-sibling")),
        value(Axis::Preceding, tag("preceding")),
        value(Axis::SelfAxis, tag("self")),
    ))
    .parse(input)
}

fn predicate(input: &str) -> PResult<'_, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

fn path_separator(input: &str) -> PResult<'_, &str> {
    alt((tag("//"), tag("/"))).parse(input)
}

pub fn step(input: &str) -> PResult<'_, Step> {
    let (input, _) = multispace0(input)?;
    alt((
        value(
            Step::new(Axis::Parent, NodeTest::NodeType(NodeTypeTest::Node)),
            tag(".."),
        ),
        value(
            Step::new(Axis::SelfAxis, NodeTest::NodeType(NodeTypeTest::Node)),
            terminated(char('.'), not(satisfy(|c| c.is_ascii_digit()))),
        ),
        full_step,
    ))
    .parse(input)
}

fn full_step(input: &str) -> PResult<'_, Step> {
    let (input, (axis, node_test)) = alt((
        map(preceded(terminated(char('@'), multispace0), node_test), |nt| {
            (Axis::Attribute, nt)
        }),
        map(
            pair(opt(terminated(axis, ws(tag("::")))), node_test),
            |(ax, nt)| (ax.unwrap_or(Axis::Child), nt),
        ),
    ))
    .parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        Step {
            axis,
            node_test,
            predicates,
        },
    ))
}

fn append_steps(steps: &mut Vec<Step>, tail: Vec<(&str, Step)>) {
    for (sep, next_step) in tail {
        if sep == "//" {
            steps.push(Step::descendant_or_self());
        }
        steps.push(next_step);
    }
}

fn relative_steps(input: &str) -> PResult<'_, Vec<Step>> {
    let (input, first) = step(input)?;
    let (input, tail) = many0(pair(ws(path_separator), step)).parse(input)?;
    let mut steps = vec![first];
    append_steps(&mut steps, tail);
    Ok((input, steps))
}

fn location_path(input: &str) -> PResult<'_, LocationPath> {
    alt((
        map(preceded(tag("//"), relative_steps), |mut steps| {
            steps.insert(0, Step::descendant_or_self());
            LocationPath {
                start_point: None,
                is_absolute: true,
                steps,
            }
        }),
        map(preceded(char('/'), opt(relative_steps)), |steps| {
            LocationPath {
                start_point: None,
                is_absolute: true,
                steps: steps.unwrap_or_default(),
            }
        }),
        map(relative_steps, |steps| LocationPath {
            start_point: None,
            is_absolute: false,
            steps,
        }),
    ))
    .parse(input)
}

// --- Function Call Parser ---

fn function_call(input: &str) -> PResult<'_, Expression> {
    let (i, name) = q_name(input)?;

    // Node-type tests like text() are not functions. They are handled by the step parser.
    if is_node_type_name(&name) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    let (i, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expression),
        ws(char(')')),
    )
    .parse(i)?;

    Ok((i, Expression::FunctionCall { name, args }))
}
