use crate::ast::{PreparsedTemplate, When};
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::output::OutputBuilder;
use xsltr_xpath1::datasource::DataSourceNode;

pub(crate) fn handle_if<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    condition: bool,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    if condition {
        executor.execute_template(body, context_node, context_position, context_size, builder)?;
    }
    Ok(())
}

pub(crate) fn handle_choose<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    whens: &[When],
    otherwise: Option<&PreparsedTemplate>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    for when_block in whens {
        if executor
            .evaluate_xpath(&when_block.test, context_node, context_position, context_size)?
            .to_bool()
        {
            return executor.execute_template(
                &when_block.body,
                context_node,
                context_position,
                context_size,
                builder,
            );
        }
    }
    if let Some(otherwise_body) = otherwise {
        executor.execute_template(
            otherwise_body,
            context_node,
            context_position,
            context_size,
            builder,
        )?;
    }
    Ok(())
}

/// Logs the message text; with `terminate="yes"` the transformation stops with it.
pub(crate) fn handle_message<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    body: &PreparsedTemplate,
    terminate: bool,
    context_node: N,
    context_position: usize,
    context_size: usize,
) -> Result<(), XsltError> {
    let message = executor.text_content(
        body,
        "xsl:message",
        context_node,
        context_position,
        context_size,
    )?;
    if terminate {
        log::error!("xsl:message (terminate): {}", message);
        return Err(XsltError::Terminated(message));
    }
    log::info!("xsl:message: {}", message);
    Ok(())
}
