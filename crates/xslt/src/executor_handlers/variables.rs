use crate::error::XsltError;
use crate::executor::{Binding, TemplateExecutor};
use xsltr_xpath1::datasource::DataSourceNode;

/// Binds a local variable for the rest of the enclosing sequence constructor. A binding
/// of the same name in an outer scope is shadowed.
pub(crate) fn handle_variable<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &str,
    value: Binding<N>,
) -> Result<(), XsltError> {
    if executor.lookup_binding(name).is_some() {
        log::trace!("Variable '{}' shadows an outer binding", name);
    }
    executor.set_variable(name.to_string(), value);
    Ok(())
}
