//! Handlers for conditionals, iteration and template invocation.

use crate::ast::{Avt, PreparsedTemplate, SortKey, When, WithParam, XsltInstruction};
use crate::compiler::{BuilderState, CompilerBuilder, get_attr_optional, get_attr_required};
use crate::error::XsltError;
use crate::parser::OwnedAttributes;
use xsltr_dom::Location;

impl CompilerBuilder {
    pub(crate) fn check_choose_child(&self, local: &str) -> Result<(), XsltError> {
        match self.state_stack.last() {
            Some(BuilderState::Choose { otherwise: Some(_), .. }) => Err(XsltError::compile(
                format!("xsl:{} may not follow xsl:otherwise", local),
            )),
            Some(BuilderState::Choose { whens, .. }) if local == "otherwise" && whens.is_empty() => {
                Err(XsltError::compile("xsl:otherwise must follow at least one xsl:when"))
            }
            Some(BuilderState::Choose { .. }) => Ok(()),
            _ => Err(XsltError::compile(format!(
                "xsl:{} must be a child of xsl:choose",
                local
            ))),
        }
    }

    pub(crate) fn check_sort_position(&self) -> Result<(), XsltError> {
        match self.state_stack.last() {
            Some(BuilderState::ApplyTemplates { .. }) => Ok(()),
            Some(BuilderState::ForEach { .. }) if self.parent_body_is_empty() => Ok(()),
            Some(BuilderState::ForEach { .. }) => Err(XsltError::compile(
                "xsl:sort must come before the other content of xsl:for-each",
            )),
            _ => Err(XsltError::compile(
                "xsl:sort must be a child of xsl:apply-templates or xsl:for-each",
            )),
        }
    }

    pub(crate) fn handle_when_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let test = self.parse_xpath(&get_attr_required(&attrs, "test", "when", location)?)?;
        if let Some(BuilderState::Choose { whens, .. }) = self.state_stack.last_mut() {
            whens.push(When {
                test,
                body: PreparsedTemplate(body),
            });
        }
        Ok(())
    }

    pub(crate) fn handle_otherwise_end(&mut self, body: Vec<XsltInstruction>) -> Result<(), XsltError> {
        if let Some(BuilderState::Choose { otherwise, .. }) = self.state_stack.last_mut() {
            *otherwise = Some(PreparsedTemplate(body));
        }
        Ok(())
    }

    pub(crate) fn handle_choose_end(
        &mut self,
        whens: Vec<When>,
        otherwise: Option<PreparsedTemplate>,
    ) -> Result<(), XsltError> {
        if whens.is_empty() {
            return Err(XsltError::compile("xsl:choose must contain at least one xsl:when"));
        }
        self.push_instruction(XsltInstruction::Choose { whens, otherwise });
        Ok(())
    }

    pub(crate) fn handle_if_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let test = self.parse_xpath(&get_attr_required(&attrs, "test", "if", location)?)?;
        self.push_instruction(XsltInstruction::If {
            test,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    pub(crate) fn handle_sort_end(&mut self, attrs: OwnedAttributes) -> Result<(), XsltError> {
        let avt_or = |builder: &Self, name: &str, default: &str| -> Result<Avt, XsltError> {
            match get_attr_optional(&attrs, name) {
                Some(value) => builder.parse_avt(&value),
                None => Ok(Avt::Static(default.to_string())),
            }
        };
        let select = get_attr_optional(&attrs, "select").unwrap_or_else(|| ".".to_string());
        let key = SortKey {
            select: self.parse_xpath(&select)?,
            order: avt_or(self, "order", "ascending")?,
            data_type: avt_or(self, "data-type", "text")?,
            case_order: avt_or(self, "case-order", "upper-first")?,
            lang: get_attr_optional(&attrs, "lang")
                .map(|l| self.parse_avt(&l))
                .transpose()?,
        };
        match self.state_stack.last_mut() {
            Some(
                BuilderState::ApplyTemplates { sort_keys, .. }
                | BuilderState::ForEach { sort_keys, .. },
            ) => sort_keys.push(key),
            _ => return Err(XsltError::compile("xsl:sort is not allowed here")),
        }
        Ok(())
    }

    pub(crate) fn handle_apply_templates_end(
        &mut self,
        attrs: OwnedAttributes,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
        _location: Location,
    ) -> Result<(), XsltError> {
        let select = get_attr_optional(&attrs, "select")
            .map(|s| self.parse_xpath(&s))
            .transpose()?;
        let mode = get_attr_optional(&attrs, "mode")
            .map(|m| self.expand_qname(&m))
            .transpose()?;
        self.push_instruction(XsltInstruction::ApplyTemplates {
            select,
            mode,
            sort_keys,
            params,
        });
        Ok(())
    }

    pub(crate) fn handle_call_template_end(
        &mut self,
        attrs: OwnedAttributes,
        params: Vec<WithParam>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = self.expand_qname(&get_attr_required(&attrs, "name", "call-template", location)?)?;
        self.template_references.push((name.clone(), location));
        self.push_instruction(XsltInstruction::CallTemplate { name, params });
        Ok(())
    }

    pub(crate) fn handle_for_each_end(
        &mut self,
        attrs: OwnedAttributes,
        sort_keys: Vec<SortKey>,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let select = self.parse_xpath(&get_attr_required(&attrs, "select", "for-each", location)?)?;
        self.push_instruction(XsltInstruction::ForEach {
            select,
            sort_keys,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }
}
