use crate::ast::{CompiledXPath, PreparsedTemplate, SortKey};
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::executor_handlers::sort;
use crate::output::OutputBuilder;
use xsltr_xpath1::datasource::DataSourceNode;

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_for_each<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: &CompiledXPath,
    sort_keys: &[SortKey],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let mut nodes =
        executor.evaluate_node_set(select, context_node, context_position, context_size)?;
    sort::sort_node_set(
        executor,
        &mut nodes,
        sort_keys,
        context_node,
        context_position,
        context_size,
    )?;

    // There is no current template rule inside xsl:for-each.
    let saved_rule = executor.current_rule.take();
    let inner_context_size = nodes.len();
    let mut result = Ok(());
    for (i, node) in nodes.into_iter().enumerate() {
        result = executor.execute_template(body, node, i + 1, inner_context_size, builder);
        if result.is_err() {
            break;
        }
    }
    executor.current_rule = saved_rule;
    result
}
