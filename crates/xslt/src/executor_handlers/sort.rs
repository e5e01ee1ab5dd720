//! `xsl:sort`: ordering the nodes selected by `xsl:apply-templates` and `xsl:for-each`.

use crate::ast::SortKey;
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use std::cmp::Ordering;
use xsltr_xpath1::datasource::DataSourceNode;
use xsltr_xpath1::string_to_number;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortDataType {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Ascending,
    Descending,
}

/// A sort key with its attribute value templates evaluated.
#[derive(Debug, Clone, Copy)]
struct ResolvedKey {
    data_type: SortDataType,
    order: SortOrder,
    upper_first: bool,
}

#[derive(Debug, Clone)]
enum SortValue {
    Text(String),
    Number(f64),
}

/// Sorts `nodes` in place. The sort is stable, so nodes with equal keys stay in
/// document order. Keys are evaluated with each node as context, its position being
/// its place in the unsorted list.
pub(crate) fn sort_node_set<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    nodes: &mut Vec<N>,
    sort_keys: &[SortKey],
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<(), XsltError> {
    if sort_keys.is_empty() || nodes.len() < 2 {
        return Ok(());
    }

    let mut resolved = Vec::with_capacity(sort_keys.len());
    for key in sort_keys {
        resolved.push(resolve_key(executor, key, context_node, context_position, context_size)?);
    }

    let size = nodes.len();
    let mut rows = Vec::with_capacity(size);
    for (i, &node) in nodes.iter().enumerate() {
        let mut values = Vec::with_capacity(sort_keys.len());
        for (key, spec) in sort_keys.iter().zip(&resolved) {
            let text = executor.evaluate_string(&key.select, node, i + 1, size)?;
            values.push(match spec.data_type {
                SortDataType::Number => SortValue::Number(string_to_number(&text)),
                SortDataType::Text => SortValue::Text(text),
            });
        }
        rows.push((node, values));
    }

    rows.sort_by(|(_, a), (_, b)| {
        for ((value_a, value_b), spec) in a.iter().zip(b).zip(&resolved) {
            let ordering = compare(value_a, value_b, spec.upper_first);
            let final_ordering = if spec.order == SortOrder::Descending {
                ordering.reverse()
            } else {
                ordering
            };
            if final_ordering != Ordering::Equal {
                return final_ordering;
            }
        }
        Ordering::Equal
    });

    nodes.clear();
    nodes.extend(rows.into_iter().map(|(node, _)| node));
    Ok(())
}

fn resolve_key<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    key: &SortKey,
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<ResolvedKey, XsltError> {
    let order = executor.evaluate_avt(&key.order, context_node, context_position, context_size)?;
    let order = match order.trim() {
        "ascending" => SortOrder::Ascending,
        "descending" => SortOrder::Descending,
        other => {
            return Err(XsltError::runtime(format!(
                "xsl:sort order must be ascending or descending, got '{}'",
                other
            )));
        }
    };

    let data_type =
        executor.evaluate_avt(&key.data_type, context_node, context_position, context_size)?;
    let data_type = match data_type.trim() {
        "text" => SortDataType::Text,
        "number" => SortDataType::Number,
        other if other.contains(':') => {
            log::warn!("Unsupported xsl:sort data-type '{}'; sorting as text", other);
            SortDataType::Text
        }
        other => {
            return Err(XsltError::runtime(format!(
                "xsl:sort data-type must be text or number, got '{}'",
                other
            )));
        }
    };

    let case_order =
        executor.evaluate_avt(&key.case_order, context_node, context_position, context_size)?;
    let upper_first = match case_order.trim() {
        "upper-first" => true,
        "lower-first" => false,
        other => {
            return Err(XsltError::runtime(format!(
                "xsl:sort case-order must be upper-first or lower-first, got '{}'",
                other
            )));
        }
    };

    if let Some(lang) = &key.lang {
        let lang = executor.evaluate_avt(lang, context_node, context_position, context_size)?;
        log::trace!("xsl:sort lang '{}' has no collation of its own", lang);
    }

    Ok(ResolvedKey {
        data_type,
        order,
        upper_first,
    })
}

fn compare(a: &SortValue, b: &SortValue, upper_first: bool) -> Ordering {
    match (a, b) {
        (SortValue::Number(a), SortValue::Number(b)) => compare_numbers(*a, *b),
        (SortValue::Text(a), SortValue::Text(b)) => compare_text(a, b, upper_first),
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
    }
}

/// NaN sorts before every number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Case-insensitive comparison; strings equal but for case are ordered by the first
/// character whose case differs.
fn compare_text(a: &str, b: &str, upper_first: bool) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    for (x, y) in a.chars().zip(b.chars()) {
        if x == y {
            continue;
        }
        let ordering = match (x.is_uppercase(), y.is_uppercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => x.cmp(&y),
        };
        return if upper_first { ordering } else { ordering.reverse() };
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_comparison_folds_case() {
        assert_eq!(compare_text("apple", "Banana", true), Ordering::Less);
        assert_eq!(compare_text("Apple", "apple", true), Ordering::Less);
        assert_eq!(compare_text("Apple", "apple", false), Ordering::Greater);
        assert_eq!(compare_text("same", "same", true), Ordering::Equal);
    }

    #[test]
    fn test_nan_sorts_first() {
        let mut values = vec![3.0, f64::NAN, -1.0, 10.0];
        values.sort_by(|a, b| compare_numbers(*a, *b));
        assert!(values[0].is_nan());
        assert_eq!(&values[1..], &[-1.0, 3.0, 10.0]);
    }
}
