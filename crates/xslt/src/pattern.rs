//! A dedicated engine for parsing and evaluating XSLT `match` patterns.
//!
//! A pattern is a union of location path patterns. Each alternative is matched right to
//! left: the last step is tested against the candidate node, then every earlier step
//! against its parent (`/`) or some ancestor (`//`).
use crate::error::XsltError;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, opt, value};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Parser};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use xsltr_xpath1::ast::{Axis, NodeTest, Step};
use xsltr_xpath1::datasource::{DataSourceNode, NodeType};
use xsltr_xpath1::engine::{EvaluationContext, ResolvedNodeTest, XPathValue, evaluate_step};
use xsltr_xpath1::parser as xpath_parser;
use xsltr_xpath1::XPathError;

type PResult<'a, O> = IResult<&'a str, O>;

/// How a step relates to the step (or head) on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
struct PatternStep {
    separator: Separator,
    step: Step,
}

#[derive(Debug, Clone, PartialEq)]
enum PatternHead {
    Relative,
    Root,
    Id(String),
    Key(String, String),
}

/// A single location path within a pattern, e.g. `/doc//section/para[1]`.
#[derive(Debug, Clone, PartialEq)]
struct PathPattern {
    head: PatternHead,
    steps: Vec<PatternStep>,
}

/// A compiled representation of an XSLT match pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    alternatives: Vec<PathPattern>,
    text: String,
    namespaces: Arc<HashMap<String, String>>,
    variables: Vec<String>,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Pattern {
    /// The prefix bindings name tests and `key()` names are resolved against.
    pub fn namespaces(&self) -> &HashMap<String, String> {
        &self.namespaces
    }

    /// Variables referenced from predicates.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Splits a union into one pattern per alternative, each keeping the source text.
    pub fn into_alternatives(self) -> Vec<Pattern> {
        let Pattern {
            alternatives,
            text,
            namespaces,
            variables,
        } = self;
        alternatives
            .into_iter()
            .map(|path| Pattern {
                alternatives: vec![path],
                text: text.clone(),
                namespaces: Arc::clone(&namespaces),
                variables: variables.clone(),
            })
            .collect()
    }

    /// The default priority of the highest-priority alternative.
    pub fn default_priority(&self) -> f64 {
        self.alternatives
            .iter()
            .map(PathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The local name every match must have, when the pattern ends in a plain name test.
    pub fn name_key(&self) -> Option<&str> {
        match self.alternatives.as_slice() {
            [only] => only.name_key(),
            _ => None,
        }
    }

    /// Evaluates whether `node` matches the pattern. The context must carry this
    /// pattern's namespaces.
    pub fn matches<'a, N>(
        &self,
        node: N,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        for path in &self.alternatives {
            if path.matches(node, e_ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl PathPattern {
    fn default_priority(&self) -> f64 {
        match (&self.head, self.steps.as_slice()) {
            (PatternHead::Relative, [only]) if only.step.predicates.is_empty() => {
                match &only.step.node_test {
                    NodeTest::Name(_) | NodeTest::ProcessingInstruction(_) => 0.0,
                    NodeTest::NamespaceWildcard(_) => -0.25,
                    NodeTest::Wildcard | NodeTest::NodeType(_) => -0.5,
                }
            }
            _ => 0.5,
        }
    }

    fn name_key(&self) -> Option<&str> {
        match &self.steps.last()?.step.node_test {
            NodeTest::Name(qname) => Some(qname.rsplit(':').next().unwrap_or(qname)),
            _ => None,
        }
    }

    fn matches<'a, N>(&self, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        if self.steps.is_empty() {
            return match &self.head {
                PatternHead::Root => Ok(node.node_type() == NodeType::Root),
                PatternHead::Relative => Ok(false),
                head => head_contains(head, node, e_ctx),
            };
        }
        self.matches_steps(self.steps.len(), node, e_ctx)
    }

    /// Whether `steps[..count]` match with the last of them at `node`.
    fn matches_steps<'a, N>(
        &self,
        count: usize,
        node: N,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        let PatternStep { separator, step } = &self.steps[count - 1];
        if !step_matches(step, node, e_ctx)? {
            return Ok(false);
        }
        let Some(parent) = node.parent() else {
            return Ok(false);
        };

        if count == 1 {
            if self.head == PatternHead::Relative {
                return Ok(true);
            }
            return match separator {
                Separator::Child => head_contains(&self.head, parent, e_ctx),
                Separator::Descendant => {
                    let mut current = Some(parent);
                    while let Some(ancestor) = current {
                        if head_contains(&self.head, ancestor, e_ctx)? {
                            return Ok(true);
                        }
                        current = ancestor.parent();
                    }
                    Ok(false)
                }
            };
        }

        match separator {
            Separator::Child => self.matches_steps(count - 1, parent, e_ctx),
            Separator::Descendant => {
                let mut current = Some(parent);
                while let Some(ancestor) = current {
                    if self.matches_steps(count - 1, ancestor, e_ctx)? {
                        return Ok(true);
                    }
                    current = ancestor.parent();
                }
                Ok(false)
            }
        }
    }
}

fn step_matches<'a, N>(step: &Step, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let node_type = node.node_type();
    let right_kind = match step.axis {
        Axis::Attribute => node_type == NodeType::Attribute,
        _ => node_type != NodeType::Attribute && node_type != NodeType::Root,
    };
    if !right_kind {
        return Ok(false);
    }
    let test = ResolvedNodeTest::new(&step.node_test, step.axis, e_ctx)?;
    if !test.matches(&node) {
        return Ok(false);
    }
    if step.predicates.is_empty() {
        return Ok(true);
    }
    // Predicates are positional, so evaluate the step from the parent and look for the node.
    let Some(parent) = node.parent() else {
        return Ok(false);
    };
    Ok(evaluate_step(step, &[parent], e_ctx)?.contains(&node))
}

fn head_contains<'a, N>(
    head: &PatternHead,
    node: N,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<bool, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match head {
        PatternHead::Relative => Ok(true),
        PatternHead::Root => Ok(node.node_type() == NodeType::Root),
        PatternHead::Id(ids) => Ok(node.node_type() == NodeType::Element
            && ids
                .split_whitespace()
                .any(|id| node.element_by_id(id) == Some(node))),
        PatternHead::Key(name, key_value) => {
            let Some(extensions) = e_ctx.extensions else {
                return Err(XPathError::UnknownFunction("key".to_string()));
            };
            let args = vec![
                XPathValue::String(name.clone()),
                XPathValue::String(key_value.clone()),
            ];
            match extensions.call("key", args, e_ctx) {
                Some(result) => Ok(result?.into_node_set("key()")?.contains(&node)),
                None => Err(XPathError::UnknownFunction("key".to_string())),
            }
        }
    }
}

// --- Parser ---

/// Parses `text` with prefixes resolved through `namespaces`.
pub fn parse(text: &str, namespaces: Arc<HashMap<String, String>>) -> Result<Pattern, XsltError> {
    let alternatives = match separated_list1(ws(char('|')), path_pattern).parse(text) {
        Ok((rest, alternatives)) if rest.trim().is_empty() => alternatives,
        Ok((rest, _)) => {
            return Err(XsltError::compile(format!(
                "Invalid pattern '{}': unexpected input at '{}'",
                text,
                rest.trim()
            )));
        }
        Err(e) => {
            return Err(XsltError::compile(format!("Invalid pattern '{}': {}", text, e)));
        }
    };

    let mut variables = Vec::new();
    for path in &alternatives {
        for PatternStep { step, .. } in &path.steps {
            if !matches!(step.axis, Axis::Child | Axis::Attribute) {
                return Err(XsltError::compile(format!(
                    "Invalid pattern '{}': only the child and attribute axes are allowed",
                    text
                )));
            }
            for predicate in &step.predicates {
                predicate.for_each_variable(&mut |name| variables.push(name.to_string()));
            }
        }
    }
    variables.dedup();

    Ok(Pattern {
        alternatives,
        text: text.to_string(),
        namespaces,
        variables,
    })
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn separator(input: &str) -> PResult<'_, Separator> {
    alt((
        value(Separator::Descendant, tag("//")),
        value(Separator::Child, tag("/")),
    ))
    .parse(input)
}

fn relative_steps(input: &str) -> PResult<'_, Vec<PatternStep>> {
    let (input, first) = xpath_parser::step(input)?;
    let (input, rest) = many0(pair(ws(separator), xpath_parser::step)).parse(input)?;
    let mut steps = vec![PatternStep {
        separator: Separator::Child,
        step: first,
    }];
    steps.extend(
        rest.into_iter()
            .map(|(separator, step)| PatternStep { separator, step }),
    );
    Ok((input, steps))
}

fn id_key_head(input: &str) -> PResult<'_, PatternHead> {
    alt((
        map(
            (
                tag("id"),
                ws(char('(')),
                xpath_parser::string_literal,
                ws(char(')')),
            ),
            |(_, _, ids, _)| PatternHead::Id(ids),
        ),
        map(
            (
                tag("key"),
                ws(char('(')),
                xpath_parser::string_literal,
                ws(char(',')),
                xpath_parser::string_literal,
                ws(char(')')),
            ),
            |(_, _, name, _, key_value, _)| PatternHead::Key(name, key_value),
        ),
    ))
    .parse(input)
}

fn path_pattern(input: &str) -> PResult<'_, PathPattern> {
    let (input, _) = multispace0(input)?;
    alt((
        map(
            pair(id_key_head, opt(pair(ws(separator), relative_steps))),
            |(head, tail)| match tail {
                Some((separator, mut steps)) => {
                    steps[0].separator = separator;
                    PathPattern { head, steps }
                }
                None => PathPattern {
                    head,
                    steps: Vec::new(),
                },
            },
        ),
        map(preceded(tag("//"), relative_steps), |mut steps| {
            steps[0].separator = Separator::Descendant;
            PathPattern {
                head: PatternHead::Root,
                steps,
            }
        }),
        map(preceded(char('/'), opt(relative_steps)), |steps| PathPattern {
            head: PatternHead::Root,
            steps: steps.unwrap_or_default(),
        }),
        map(relative_steps, |steps| PathPattern {
            head: PatternHead::Relative,
            steps,
        }),
    ))
    .parse(input)
}
