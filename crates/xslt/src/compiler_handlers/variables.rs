//! Handlers for `<xsl:variable>`, `<xsl:param>`, and `<xsl:with-param>`.

use crate::ast::{Param, PreparsedTemplate, VariableValue, WithParam, XsltInstruction};
use crate::compiler::{BuilderState, CompilerBuilder, VariableKind, get_attr_optional, get_attr_required};
use crate::error::XsltError;
use crate::parser::OwnedAttributes;
use xsltr_dom::Location;

impl CompilerBuilder {
    pub(crate) fn handle_variable_end(
        &mut self,
        attrs: OwnedAttributes,
        kind: VariableKind,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let element = match kind {
            VariableKind::Variable => "variable",
            VariableKind::Param => "param",
            VariableKind::WithParam => "with-param",
        };
        let name = get_attr_required(&attrs, "name", element, location)?
            .trim()
            .to_string();
        let value = match get_attr_optional(&attrs, "select") {
            Some(_) if !body.is_empty() => {
                return Err(XsltError::compile(format!(
                    "xsl:{} '{}' has both a 'select' attribute and content",
                    element, name
                )));
            }
            Some(select) => VariableValue::Select(self.parse_xpath(&select)?),
            None if body.is_empty() => VariableValue::Empty,
            None => VariableValue::Content(PreparsedTemplate(body)),
        };

        let duplicate = || {
            XsltError::compile(format!("Duplicate xsl:{} '{}'", element, name))
        };
        match (kind, self.state_stack.last_mut()) {
            (_, Some(BuilderState::Stylesheet)) => {
                let is_param = kind == VariableKind::Param;
                self.add_global_variable(name, value, is_param, location);
            }
            (VariableKind::Param, Some(BuilderState::Template { params, .. })) => {
                if params.iter().any(|p| p.name == name) {
                    return Err(duplicate());
                }
                params.push(Param { name, value });
            }
            (
                VariableKind::WithParam,
                Some(
                    BuilderState::ApplyTemplates { params, .. }
                    | BuilderState::CallTemplate { params, .. },
                ),
            ) => {
                if params.iter().any(|p| p.name == name) {
                    return Err(duplicate());
                }
                params.push(WithParam { name, value });
            }
            (VariableKind::Variable, _) => {
                self.push_instruction(XsltInstruction::Variable { name, value });
            }
            _ => {
                return Err(XsltError::compile(format!(
                    "xsl:{} is not allowed here",
                    element
                )));
            }
        }
        Ok(())
    }
}
