//! `xsl:number`: computing the number list for a node and formatting it.

use crate::ast::{NumberInstruction, NumberLevel};
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::number::{Grouping, NumberFormat};
use crate::output::OutputBuilder;
use xsltr_xpath1::datasource::{DataSourceNode, NodeType};
use xsltr_xpath1::number_to_string;

pub(crate) fn handle_number<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let numbers = match &number.value {
        Some(value) => {
            let n = executor
                .evaluate_xpath(value, context_node, context_position, context_size)?
                .to_number();
            let rounded = (n + 0.5).floor();
            if !rounded.is_finite() || rounded < 0.0 {
                builder.add_text(&number_to_string(n));
                return Ok(());
            }
            vec![rounded as u64]
        }
        None => match number.level {
            NumberLevel::Single => count_single(executor, number, context_node)?,
            NumberLevel::Multiple => count_multiple(executor, number, context_node)?,
            NumberLevel::Any => count_any(executor, number, context_node)?,
        },
    };

    let format = executor.evaluate_avt(&number.format, context_node, context_position, context_size)?;
    let grouping = match (&number.grouping_separator, &number.grouping_size) {
        (Some(separator), Some(size)) => {
            let separator =
                executor.evaluate_avt(separator, context_node, context_position, context_size)?;
            let size = executor.evaluate_avt(size, context_node, context_position, context_size)?;
            match (separator.chars().next(), size.trim().parse::<usize>()) {
                (Some(separator), Ok(size)) if size > 0 => Some(Grouping { separator, size }),
                _ => None,
            }
        }
        _ => None,
    };
    for avt in [&number.lang, &number.letter_value].into_iter().flatten() {
        let value = executor.evaluate_avt(avt, context_node, context_position, context_size)?;
        log::trace!("xsl:number ignores lang/letter-value '{}'", value);
    }

    builder.add_text(&NumberFormat::parse(&format).format(&numbers, grouping));
    Ok(())
}

/// Whether `node` is counted: it matches `count`, or without one it has the type and
/// expanded name of the context node.
fn matches_count<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    node: N,
    context_node: N,
) -> Result<bool, XsltError> {
    match &number.count {
        Some(pattern) => executor.pattern_matches(pattern, node),
        None => Ok(node.node_type() == context_node.node_type()
            && node.name().map(|q| q.local_part) == context_node.name().map(|q| q.local_part)
            && node.namespace_uri() == context_node.namespace_uri()),
    }
}

fn matches_from<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    node: N,
) -> Result<bool, XsltError> {
    match &number.from {
        Some(pattern) => executor.pattern_matches(pattern, node),
        None => Ok(false),
    }
}

/// The counted ancestors-or-self of `context_node`, nearest first, stopping at the
/// nearest ancestor matching `from`.
fn counted_ancestors<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    context_node: N,
    first_only: bool,
) -> Result<Vec<N>, XsltError> {
    let mut found = Vec::new();
    let mut current = Some(context_node);
    while let Some(node) = current {
        if matches_from(executor, number, node)? {
            break;
        }
        if matches_count(executor, number, node, context_node)? {
            found.push(node);
            if first_only {
                break;
            }
        }
        current = node.parent();
    }
    Ok(found)
}

/// One plus the number of preceding siblings of `node` that are counted.
fn sibling_position<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    node: N,
    context_node: N,
) -> Result<u64, XsltError> {
    let Some(parent) = node.parent() else {
        return Ok(1);
    };
    if node.node_type() == NodeType::Attribute {
        return Ok(1);
    }
    let mut position = 1;
    for sibling in parent.children() {
        if sibling == node {
            break;
        }
        if matches_count(executor, number, sibling, context_node)? {
            position += 1;
        }
    }
    Ok(position)
}

fn count_single<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    context_node: N,
) -> Result<Vec<u64>, XsltError> {
    match counted_ancestors(executor, number, context_node, true)?.first() {
        Some(&node) => Ok(vec![sibling_position(executor, number, node, context_node)?]),
        None => Ok(Vec::new()),
    }
}

fn count_multiple<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    context_node: N,
) -> Result<Vec<u64>, XsltError> {
    let ancestors = counted_ancestors(executor, number, context_node, false)?;
    let mut numbers = Vec::with_capacity(ancestors.len());
    for &node in ancestors.iter().rev() {
        numbers.push(sibling_position(executor, number, node, context_node)?);
    }
    Ok(numbers)
}

/// Counts the matching nodes that precede `context_node` in document order or are its
/// ancestors-or-self, restarting after each node matching `from`.
fn count_any<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    number: &NumberInstruction,
    context_node: N,
) -> Result<Vec<u64>, XsltError> {
    let mut count = 0;
    let owner = match context_node.node_type() {
        NodeType::Attribute => context_node.parent(),
        _ => None,
    };
    let mut stack = vec![context_node.root()];
    while let Some(node) = stack.pop() {
        if matches_from(executor, number, node)? {
            count = 0;
        } else if matches_count(executor, number, node, context_node)? {
            count += 1;
        }
        if node == context_node {
            break;
        }
        if Some(node) == owner {
            stack.clear();
            stack.push(context_node);
            continue;
        }
        let mark = stack.len();
        stack.extend(node.children());
        stack[mark..].reverse();
    }
    Ok(if count > 0 { vec![count] } else { Vec::new() })
}
