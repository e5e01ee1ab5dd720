use crate::ast::{CompiledXPath, SortKey, WithParam};
use crate::error::XsltError;
use crate::executor::{CurrentRule, TemplateExecutor};
use crate::executor_handlers::sort;
use crate::output::OutputBuilder;
use std::collections::HashMap;
use xsltr_xpath1::datasource::DataSourceNode;

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_apply_templates<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    select: Option<&CompiledXPath>,
    mode: &Option<String>,
    sort_keys: &[SortKey],
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let mut nodes_to_process = match select {
        Some(select) => {
            executor.evaluate_node_set(select, context_node, context_position, context_size)?
        }
        None => context_node.children().collect(),
    };
    sort::sort_node_set(
        executor,
        &mut nodes_to_process,
        sort_keys,
        context_node,
        context_position,
        context_size,
    )?;
    let params = executor.evaluate_params(params, context_node, context_position, context_size)?;
    executor.apply_templates_to_nodes(&nodes_to_process, mode, &params, builder)
}

/// Instantiates the best rule for the context node among those imported into the
/// module of the current rule, falling back to the built-in rule.
pub(crate) fn handle_apply_imports<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let Some(current) = executor.current_rule else {
        return Err(XsltError::runtime(
            "xsl:apply-imports used where there is no current template rule",
        ));
    };
    let range = Some((current.floor, current.precedence));
    match executor.find_rule(current.rules, context_node, range)? {
        Some(rule) => {
            let next = CurrentRule {
                rules: current.rules,
                mode: current.mode,
                precedence: rule.import_precedence,
                floor: rule.import_floor,
            };
            executor.invoke_template(
                &rule.template,
                HashMap::new(),
                context_node,
                context_position,
                context_size,
                Some(next),
                builder,
            )
        }
        None => executor.apply_builtin_template(context_node, current.mode, builder),
    }
}
