//! Handlers for `xsl:stylesheet` and the top-level declarations.

use crate::ast::{
    AttributeSet, DecimalFormatDeclaration, GlobalVariable, KeyDeclaration, NameTest,
    NamespaceAlias, OutputDeclaration, OutputMethod, Param, PreparsedTemplate, Template,
    TemplateRule, VariableValue, XsltInstruction,
};
use crate::compiler::{
    BuilderState, CompilerBuilder, Declared, VariableKind, get_attr_optional, get_attr_required,
    parse_yes_no,
};
use crate::error::XsltError;
use crate::parser::{ElementStart, OwnedAttributes};
use std::sync::Arc;
use xsltr_dom::Location;

pub(crate) const DECLARATIONS: &[&str] = &[
    "attribute-set",
    "decimal-format",
    "import",
    "include",
    "key",
    "namespace-alias",
    "output",
    "param",
    "preserve-space",
    "strip-space",
    "template",
    "variable",
];

impl CompilerBuilder {
    pub(crate) fn handle_stylesheet_start(&mut self, e: &ElementStart<'_>) -> Result<(), XsltError> {
        let version = get_attr_required(&e.attributes, "version", &e.name.local, e.location)?;
        if self.documents.len() == 1 {
            self.version = Some(version.trim().to_string());
        }
        self.state_stack.push(BuilderState::Stylesheet);
        Ok(())
    }

    pub(crate) fn handle_declaration_start(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
        let local = e.name.local.as_str();
        let location = e.location;
        if local == "import" {
            let declared = self.documents.last().is_some_and(|d| d.saw_declaration);
            if declared {
                return Err(XsltError::compile(
                    "xsl:import must come before every other top-level element",
                ));
            }
            let href = get_attr_required(&e.attributes, "href", local, location)?;
            self.load_module(&href, true)?;
            self.state_stack.push(BuilderState::Declaration);
            return Ok(());
        }
        if let Some(frame) = self.documents.last_mut() {
            frame.saw_declaration = true;
        }

        let attrs = e.attributes;
        let state = match local {
            "include" => {
                let href = get_attr_required(&attrs, "href", local, location)?;
                self.load_module(&href, false)?;
                BuilderState::Declaration
            }
            "template" => BuilderState::Template {
                attrs,
                params: Vec::new(),
            },
            "variable" => BuilderState::Variable {
                attrs,
                kind: VariableKind::Variable,
            },
            "param" => BuilderState::Variable {
                attrs,
                kind: VariableKind::Param,
            },
            "attribute-set" => BuilderState::AttributeSet(attrs),
            "output" => {
                self.handle_output(&attrs, location)?;
                BuilderState::Declaration
            }
            "key" => {
                self.handle_key(&attrs, location)?;
                BuilderState::Declaration
            }
            "strip-space" | "preserve-space" => {
                self.handle_space_rules(&attrs, local == "strip-space", location)?;
                BuilderState::Declaration
            }
            "decimal-format" => {
                self.handle_decimal_format(&attrs, location)?;
                BuilderState::Declaration
            }
            "namespace-alias" => {
                self.handle_namespace_alias(&attrs, location)?;
                BuilderState::Declaration
            }
            other if self.forwards_compatible() && !super::INSTRUCTIONS.contains(&other) => {
                log::warn!("Ignoring unknown top-level element 'xsl:{}'", other);
                BuilderState::Ignored
            }
            other => {
                return Err(XsltError::compile(format!(
                    "'xsl:{}' is not allowed as a top-level element",
                    other
                )));
            }
        };
        self.state_stack.push(state);
        Ok(())
    }

    pub(crate) fn handle_template_end(
        &mut self,
        attrs: OwnedAttributes,
        params: Vec<Param>,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = get_attr_optional(&attrs, "name")
            .map(|n| self.expand_qname(&n))
            .transpose()?;
        let pattern = get_attr_optional(&attrs, "match")
            .map(|m| self.parse_pattern(&m))
            .transpose()?;
        let mode = get_attr_optional(&attrs, "mode")
            .map(|m| self.expand_qname(&m))
            .transpose()?;
        let priority = get_attr_optional(&attrs, "priority")
            .map(|p| {
                p.trim().parse::<f64>().map_err(|_| {
                    XsltError::compile(format!("Invalid template priority '{}'", p))
                })
            })
            .transpose()?;

        if pattern.is_none() {
            if name.is_none() {
                return Err(XsltError::compile(
                    "xsl:template needs a 'match' or a 'name' attribute",
                ));
            }
            if mode.is_some() || priority.is_some() {
                return Err(XsltError::compile(
                    "'mode' and 'priority' are only allowed on templates with a 'match' attribute",
                ));
            }
        }

        let template = Arc::new(Template {
            name: name.clone(),
            params,
            body: PreparsedTemplate(body),
            location,
        });
        let module = self.current_module();
        if name.is_some() {
            self.named_templates.push(Declared {
                item: Arc::clone(&template),
                module,
                location,
            });
        }
        if let Some(pattern) = pattern {
            if pattern.has_variables() {
                return Err(XsltError::compile(format!(
                    "Template pattern '{}' may not reference variables",
                    pattern
                )));
            }
            let order = self.next_order();
            for alternative in pattern.into_alternatives() {
                self.template_rules.push(TemplateRule {
                    priority: priority.unwrap_or_else(|| alternative.default_priority()),
                    pattern: alternative,
                    mode: mode.clone(),
                    import_precedence: module,
                    import_floor: 0,
                    order,
                    template: Arc::clone(&template),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn add_global_variable(
        &mut self,
        name: String,
        value: VariableValue,
        is_param: bool,
        location: Location,
    ) {
        self.global_variables.push(Declared {
            item: GlobalVariable {
                name,
                value,
                is_param,
                import_precedence: 0,
            },
            module: self.current_module(),
            location,
        });
    }

    pub(crate) fn handle_attribute_set_end(
        &mut self,
        attrs: OwnedAttributes,
        body: Vec<XsltInstruction>,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = self.expand_qname(&get_attr_required(&attrs, "name", "attribute-set", location)?)?;
        let use_attribute_sets = self.use_attribute_sets(&attrs, false, location)?;
        if use_attribute_sets.contains(&name) {
            return Err(XsltError::compile(format!(
                "Attribute set '{}' uses itself",
                name
            )));
        }
        self.attribute_sets.push(Declared {
            item: (
                name,
                AttributeSet {
                    use_attribute_sets,
                    attributes: body,
                },
            ),
            module: self.current_module(),
            location,
        });
        Ok(())
    }

    /// Reads a `use-attribute-sets` list (`xsl:use-attribute-sets` on literal result
    /// elements) and records it for the undefined-set check.
    pub(crate) fn use_attribute_sets(
        &mut self,
        attrs: &OwnedAttributes,
        literal: bool,
        location: Location,
    ) -> Result<Vec<String>, XsltError> {
        let value = if literal {
            crate::compiler::get_xslt_attr(attrs, "use-attribute-sets")
        } else {
            get_attr_optional(attrs, "use-attribute-sets")
        };
        let names = match value {
            Some(list) => self.expand_qname_list(&list)?,
            None => Vec::new(),
        };
        for name in &names {
            self.attribute_set_references.push((name.clone(), location));
        }
        Ok(names)
    }

    fn handle_output(&mut self, attrs: &OwnedAttributes, location: Location) -> Result<(), XsltError> {
        let method = match get_attr_optional(attrs, "method").as_deref().map(str::trim) {
            None => None,
            Some("xml") => Some(OutputMethod::Xml),
            Some("html") => Some(OutputMethod::Html),
            Some("text") => Some(OutputMethod::Text),
            Some(other) if other.contains(':') => {
                log::warn!("Output method '{}' is not supported; using the default", other);
                None
            }
            Some(other) => {
                return Err(XsltError::compile(format!("Unknown output method '{}'", other)));
            }
        };
        let cdata_section_elements = match get_attr_optional(attrs, "cdata-section-elements") {
            Some(list) => list
                .split_whitespace()
                .map(|q| self.resolve_name(q, true))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let declaration = OutputDeclaration {
            method,
            version: get_attr_optional(attrs, "version"),
            encoding: get_attr_optional(attrs, "encoding").map(|e| e.trim().to_string()),
            omit_xml_declaration: parse_yes_no(attrs, "omit-xml-declaration")?,
            standalone: parse_yes_no(attrs, "standalone")?,
            doctype_public: get_attr_optional(attrs, "doctype-public"),
            doctype_system: get_attr_optional(attrs, "doctype-system"),
            cdata_section_elements,
            indent: parse_yes_no(attrs, "indent")?,
            media_type: get_attr_optional(attrs, "media-type"),
        };
        self.outputs.push(Declared {
            item: declaration,
            module: self.current_module(),
            location,
        });
        Ok(())
    }

    fn handle_key(&mut self, attrs: &OwnedAttributes, location: Location) -> Result<(), XsltError> {
        let name = self.expand_qname(&get_attr_required(attrs, "name", "key", location)?)?;
        let pattern = self.parse_pattern(&get_attr_required(attrs, "match", "key", location)?)?;
        let use_expr = self.parse_xpath(&get_attr_required(attrs, "use", "key", location)?)?;
        if pattern.has_variables() || !use_expr.variables.is_empty() {
            return Err(XsltError::compile(format!(
                "xsl:key '{}' may not reference variables",
                name
            )));
        }
        self.keys.push(KeyDeclaration {
            name,
            pattern,
            use_expr,
        });
        Ok(())
    }

    fn handle_space_rules(
        &mut self,
        attrs: &OwnedAttributes,
        strip: bool,
        location: Location,
    ) -> Result<(), XsltError> {
        let element = if strip { "strip-space" } else { "preserve-space" };
        let elements = get_attr_required(attrs, "elements", element, location)?;
        for token in elements.split_whitespace() {
            let test = match token.split_once(':') {
                _ if token == "*" => NameTest::Any,
                Some((prefix, "*")) => {
                    let uri = self.resolve_name(&format!("{}:x", prefix), false)?.namespace;
                    NameTest::Namespace(uri.unwrap_or_default())
                }
                _ => {
                    let name = self.resolve_name(token, false)?;
                    NameTest::Name {
                        namespace: name.namespace,
                        local: name.local,
                    }
                }
            };
            self.space_rules.push(Declared {
                item: (test, strip),
                module: self.current_module(),
                location,
            });
        }
        Ok(())
    }

    fn handle_decimal_format(
        &mut self,
        attrs: &OwnedAttributes,
        location: Location,
    ) -> Result<(), XsltError> {
        let name = get_attr_optional(attrs, "name")
            .map(|n| self.expand_qname(&n))
            .transpose()?;
        let mut format = DecimalFormatDeclaration::default();
        let single_char = |attribute: &str, target: &mut char| -> Result<(), XsltError> {
            if let Some(value) = get_attr_optional(attrs, attribute) {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => *target = c,
                    _ => {
                        return Err(XsltError::compile(format!(
                            "xsl:decimal-format '{}' must be a single character, got '{}'",
                            attribute, value
                        )));
                    }
                }
            }
            Ok(())
        };
        single_char("decimal-separator", &mut format.decimal_separator)?;
        single_char("grouping-separator", &mut format.grouping_separator)?;
        single_char("minus-sign", &mut format.minus_sign)?;
        single_char("percent", &mut format.percent)?;
        single_char("per-mille", &mut format.per_mille)?;
        single_char("zero-digit", &mut format.zero_digit)?;
        single_char("digit", &mut format.digit)?;
        single_char("pattern-separator", &mut format.pattern_separator)?;
        if let Some(infinity) = get_attr_optional(attrs, "infinity") {
            format.infinity = infinity;
        }
        if let Some(nan) = get_attr_optional(attrs, "NaN") {
            format.nan = nan;
        }
        self.decimal_formats.push(Declared {
            item: (name, format),
            module: self.current_module(),
            location,
        });
        Ok(())
    }

    fn handle_namespace_alias(
        &mut self,
        attrs: &OwnedAttributes,
        location: Location,
    ) -> Result<(), XsltError> {
        let stylesheet_prefix = get_attr_required(attrs, "stylesheet-prefix", "namespace-alias", location)?;
        let result_prefix = get_attr_required(attrs, "result-prefix", "namespace-alias", location)?;
        let namespace_of = |prefix: &str| -> Result<Option<String>, XsltError> {
            if prefix == "#default" {
                return Ok(self.scope().namespaces.get("").cloned());
            }
            Ok(self.resolve_name(&format!("{}:x", prefix), false)?.namespace)
        };
        let stylesheet_uri = namespace_of(stylesheet_prefix.trim())?.unwrap_or_default();
        let result_namespace = namespace_of(result_prefix.trim())?;
        let result_prefix = match result_prefix.trim() {
            "#default" => None,
            prefix => Some(prefix.to_string()),
        };
        self.namespace_aliases.push(Declared {
            item: (
                stylesheet_uri,
                NamespaceAlias {
                    result_prefix,
                    result_namespace,
                    import_precedence: 0,
                },
            ),
            module: self.current_module(),
            location,
        });
        Ok(())
    }
}
