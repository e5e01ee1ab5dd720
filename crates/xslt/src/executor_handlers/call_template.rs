use crate::ast::WithParam;
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::output::OutputBuilder;
use xsltr_xpath1::datasource::DataSourceNode;

/// Calls a named template. Parameters are evaluated in the caller's scope; the current
/// template rule and the context node carry over unchanged.
pub(crate) fn handle_call_template<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    params: &[WithParam],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let stylesheet = executor.stylesheet;
    let Some(template) = stylesheet.named_templates.get(name) else {
        return Err(XsltError::undefined("template", name));
    };
    let passed_params =
        executor.evaluate_params(params, context_node, context_position, context_size)?;
    for passed in passed_params.keys() {
        if !template.params.iter().any(|p| &p.name == passed) {
            log::debug!(
                "Parameter '{}' passed to template '{}' is not declared; ignored",
                passed,
                name
            );
        }
    }
    executor.invoke_template(
        template,
        passed_params,
        context_node,
        context_position,
        context_size,
        None,
        builder,
    )
}
