//! Handlers for instructions that create result nodes: literal result elements,
//! `xsl:element`, `xsl:attribute`, `xsl:text`, `xsl:value-of`, `xsl:copy` and friends.

use crate::ast::{
    Avt, LiteralAttribute, NumberInstruction, NumberLevel, PreparsedTemplate, XSLT_NAMESPACE,
    XsltInstruction,
};
use crate::compiler::{
    BuilderState, CompilerBuilder, get_attr_optional, get_attr_required, parse_yes_no,
};
use crate::error::XsltError;
use crate::parser::{ElementStart, OwnedAttributes};
use xsltr_dom::{ExpandedName, Location};

impl CompilerBuilder {
    pub(crate) fn handle_literal_element_start(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
        let scope = self.scope();
        let mut namespaces: Vec<(String, String)> = scope
            .namespaces
            .iter()
            .filter(|(_, uri)| {
                uri.as_str() != XSLT_NAMESPACE
                    && !scope.excluded.contains(*uri)
                    && !scope.extension.contains(*uri)
            })
            .map(|(prefix, uri)| (prefix.clone(), uri.clone()))
            .collect();
        namespaces.sort();
        self.state_stack.push(BuilderState::LiteralElement {
            name: e.name.clone(),
            attrs: e.attributes,
            namespaces,
        });
        Ok(())
    }

    pub(crate) fn handle_literal_element_end(
        &mut self,
        name: ExpandedName,
        attrs: OwnedAttributes,
        namespaces: Vec<(String, String)>,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let use_attribute_sets = self.use_attribute_sets(&attrs, true, location)?;
        let attributes = attrs
            .iter()
            .filter(|(attr, _)| attr.namespace.as_deref() != Some(XSLT_NAMESPACE))
            .map(|(attr, value)| {
                Ok(LiteralAttribute {
                    name: attr.clone(),
                    value: self.parse_avt(value)?,
                })
            })
            .collect::<Result<Vec<_>, XsltError>>()?;
        self.push_instruction(XsltInstruction::LiteralElement {
            name,
            namespaces,
            attributes,
            use_attribute_sets,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    pub(crate) fn handle_text_end(&mut self, disable_escaping: bool, body: Vec<XsltInstruction>) {
        let text: String = body
            .into_iter()
            .filter_map(|instr| match instr {
                XsltInstruction::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        if !text.is_empty() {
            self.push_instruction(XsltInstruction::Text {
                text,
                disable_escaping,
            });
        }
    }

    pub(crate) fn handle_fallback_end(&mut self, body: Vec<XsltInstruction>) {
        if let Some(BuilderState::Unsupported { fallback, .. }) = self.state_stack.last_mut() {
            fallback.get_or_insert_with(Vec::new).extend(body);
        }
    }

    pub(crate) fn handle_unsupported_end(
        &mut self,
        name: String,
        fallback: Option<Vec<XsltInstruction>>,
        location: Location,
    ) {
        self.push_instruction(XsltInstruction::Unsupported {
            name,
            fallback: fallback.map(PreparsedTemplate),
            location,
        });
    }

    pub(crate) fn handle_value_of_end(
        &mut self,
        attrs: OwnedAttributes,
        location: Location,
    ) -> Result<(), XsltError> {
        let select = self.parse_xpath(&get_attr_required(&attrs, "select", "value-of", location)?)?;
        self.push_instruction(XsltInstruction::ValueOf {
            select,
            disable_escaping: parse_yes_no(&attrs, "disable-output-escaping")?.unwrap_or(false),
        });
        Ok(())
    }

    pub(crate) fn handle_copy_of_end(
        &mut self,
        attrs: OwnedAttributes,
        location: Location,
    ) -> Result<(), XsltError> {
        let select = self.parse_xpath(&get_attr_required(&attrs, "select", "copy-of", location)?)?;
        self.push_instruction(XsltInstruction::CopyOf { select });
        Ok(())
    }

    pub(crate) fn handle_copy_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let use_attribute_sets = self.use_attribute_sets(&attrs, false, location)?;
        self.push_instruction(XsltInstruction::Copy {
            use_attribute_sets,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    /// Parses a `name` AVT, rejecting a static value that is not a QName.
    fn parse_name_avt(&self, value: &str, element: &str) -> Result<Avt, XsltError> {
        let avt = self.parse_avt(value)?;
        if let Some(name) = avt.as_static()
            && !is_qname(name)
        {
            return Err(XsltError::compile(format!(
                "'{}' is not a valid name for xsl:{}",
                name, element
            )));
        }
        Ok(avt)
    }

    pub(crate) fn handle_element_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = self.parse_name_avt(&get_attr_required(&attrs, "name", "element", location)?, "element")?;
        let namespace = get_attr_optional(&attrs, "namespace")
            .map(|n| self.parse_avt(&n))
            .transpose()?;
        let use_attribute_sets = self.use_attribute_sets(&attrs, false, location)?;
        self.push_instruction(XsltInstruction::Element {
            name,
            namespace,
            in_scope: self.namespaces(),
            use_attribute_sets,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    pub(crate) fn handle_attribute_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = self.parse_name_avt(
            &get_attr_required(&attrs, "name", "attribute", location)?,
            "attribute",
        )?;
        let namespace = get_attr_optional(&attrs, "namespace")
            .map(|n| self.parse_avt(&n))
            .transpose()?;
        self.push_instruction(XsltInstruction::Attribute {
            name,
            namespace,
            in_scope: self.namespaces(),
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    pub(crate) fn handle_processing_instruction_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = self.parse_avt(&get_attr_required(&attrs, "name", "processing-instruction", location)?)?;
        self.push_instruction(XsltInstruction::ProcessingInstruction {
            name,
            body: PreparsedTemplate(body),
        });
        Ok(())
    }

    pub(crate) fn handle_number_end(
        &mut self,
        attrs: OwnedAttributes,
        _location: Location,
    ) -> Result<(), XsltError> {
        let level = match get_attr_optional(&attrs, "level").as_deref().map(str::trim) {
            None | Some("single") => NumberLevel::Single,
            Some("multiple") => NumberLevel::Multiple,
            Some("any") => NumberLevel::Any,
            Some(other) => {
                return Err(XsltError::compile(format!(
                    "xsl:number level must be single, multiple or any, got '{}'",
                    other
                )));
            }
        };
        let pattern_attr = |builder: &Self, name: &str| {
            get_attr_optional(&attrs, name)
                .map(|p| builder.parse_pattern(&p))
                .transpose()
        };
        let avt_attr = |builder: &Self, name: &str| {
            get_attr_optional(&attrs, name)
                .map(|v| builder.parse_avt(&v))
                .transpose()
        };
        let number = NumberInstruction {
            level,
            count: pattern_attr(self, "count")?,
            from: pattern_attr(self, "from")?,
            value: get_attr_optional(&attrs, "value")
                .map(|v| self.parse_xpath(&v))
                .transpose()?,
            format: avt_attr(self, "format")?.unwrap_or_else(|| Avt::Static("1".to_string())),
            lang: avt_attr(self, "lang")?,
            letter_value: avt_attr(self, "letter-value")?,
            grouping_separator: avt_attr(self, "grouping-separator")?,
            grouping_size: avt_attr(self, "grouping-size")?,
        };
        self.push_instruction(XsltInstruction::Number(Box::new(number)));
        Ok(())
    }

    pub(crate) fn handle_message_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
    ) -> Result<(), XsltError> {
        let terminate = parse_yes_no(&attrs, "terminate")?.unwrap_or(false);
        self.push_instruction(XsltInstruction::Message {
            body: PreparsedTemplate(body),
            terminate,
        });
        Ok(())
    }
}

fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Whether `name` is a QName: an NCName, optionally prefixed by another.
pub(crate) fn is_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(name),
    }
}
