//! Per-element handlers of the `CompilerBuilder`, implemented as methods on it.
//!
//! `*_start` handlers push the state their element needs; `*_end` handlers receive the
//! popped state and compiled body and push the finished instruction (or declaration).

pub(crate) mod control_flow;
pub(crate) mod literals;
pub(crate) mod stylesheet;
pub(crate) mod variables;

use crate::compiler::{BuilderState, CompilerBuilder, VariableKind};
use crate::error::XsltError;
use crate::parser::{ElementStart, OwnedAttributes};
use crate::ast::XsltInstruction;
use xsltr_dom::Location;

/// Instruction names an XSLT 1.0 processor must know, `fallback` included.
pub(crate) const INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

impl CompilerBuilder {
    /// Dispatches an XSLT element met inside a template body.
    pub(crate) fn handle_instruction_start(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
        let local = e.name.local.as_str();
        let attrs = e.attributes;
        let state = match local {
            "apply-templates" => BuilderState::ApplyTemplates {
                attrs,
                sort_keys: Vec::new(),
                params: Vec::new(),
            },
            "call-template" => BuilderState::CallTemplate {
                attrs,
                params: Vec::new(),
            },
            "for-each" => BuilderState::ForEach {
                attrs,
                sort_keys: Vec::new(),
            },
            "choose" => BuilderState::Choose {
                whens: Vec::new(),
                otherwise: None,
            },
            "when" | "otherwise" => {
                self.check_choose_child(local)?;
                BuilderState::Instruction(attrs)
            }
            "sort" => {
                self.check_sort_position()?;
                BuilderState::Instruction(attrs)
            }
            "with-param" => match self.state_stack.last() {
                Some(BuilderState::ApplyTemplates { .. } | BuilderState::CallTemplate { .. }) => {
                    BuilderState::Variable {
                        attrs,
                        kind: VariableKind::WithParam,
                    }
                }
                _ => {
                    return Err(XsltError::compile(
                        "xsl:with-param must be a child of xsl:apply-templates or xsl:call-template",
                    ));
                }
            },
            "param" => {
                let leading = matches!(self.state_stack.last(), Some(BuilderState::Template { .. }))
                    && self.parent_body_is_empty();
                if !leading {
                    return Err(XsltError::compile(
                        "xsl:param must be a top-level element or lead the body of xsl:template",
                    ));
                }
                BuilderState::Variable {
                    attrs,
                    kind: VariableKind::Param,
                }
            }
            "variable" => BuilderState::Variable {
                attrs,
                kind: VariableKind::Variable,
            },
            "text" => BuilderState::XslText {
                disable_escaping: crate::compiler::parse_yes_no(&attrs, "disable-output-escaping")?
                    .unwrap_or(false),
            },
            "fallback" => BuilderState::Fallback,
            name if INSTRUCTIONS.contains(&name) => BuilderState::Instruction(attrs),
            name if stylesheet::DECLARATIONS.contains(&name) => {
                return Err(XsltError::compile(format!(
                    "xsl:{} is only allowed at the top level",
                    name
                )));
            }
            name if self.forwards_compatible() => {
                log::warn!("Unknown instruction 'xsl:{}' in forwards-compatible mode", name);
                BuilderState::Unsupported {
                    name: e.name.qualified(),
                    fallback: None,
                }
            }
            name => {
                return Err(XsltError::compile(format!("Unknown XSLT instruction 'xsl:{}'", name)));
            }
        };
        self.state_stack.push(state);
        Ok(())
    }

    /// Finishes an instruction that only needed its attributes kept until its end.
    pub(crate) fn handle_instruction_end(
        &mut self,
        local: &str,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        match local {
            "when" => self.handle_when_end(attrs, body, location),
            "otherwise" => self.handle_otherwise_end(body),
            "sort" => self.handle_sort_end(attrs),
            "apply-imports" => {
                self.push_instruction(XsltInstruction::ApplyImports);
                Ok(())
            }
            "if" => self.handle_if_end(attrs, body, location),
            "value-of" => self.handle_value_of_end(attrs, location),
            "copy-of" => self.handle_copy_of_end(attrs, location),
            "copy" => self.handle_copy_end(attrs, body, location),
            "element" => self.handle_element_end(attrs, body, location),
            "attribute" => self.handle_attribute_end(attrs, body, location),
            "comment" => {
                self.push_instruction(XsltInstruction::Comment {
                    body: crate::ast::PreparsedTemplate(body),
                });
                Ok(())
            }
            "processing-instruction" => self.handle_processing_instruction_end(attrs, body, location),
            "number" => self.handle_number_end(attrs, location),
            "message" => self.handle_message_end(attrs, body),
            other => Err(XsltError::compile(format!("Unexpected element 'xsl:{}'", other))),
        }
    }

    /// Whether the element that encloses the one just started has compiled nothing yet.
    pub(crate) fn parent_body_is_empty(&self) -> bool {
        let depth = self.instruction_stack.len();
        depth < 2 || self.instruction_stack[depth - 2].is_empty()
    }
}
