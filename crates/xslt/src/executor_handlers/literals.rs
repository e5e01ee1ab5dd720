//! Handlers for instructions that create result nodes: text, literal result elements,
//! attribute sets, and the computed `xsl:element`, `xsl:attribute`, `xsl:comment` and
//! `xsl:processing-instruction`.

use crate::ast::{Avt, LiteralAttribute, NamespaceAlias, PreparsedTemplate};
use crate::compiler_handlers::literals::is_qname;
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::output::OutputBuilder;
use std::collections::HashMap;
use xsltr_dom::ExpandedName;
use xsltr_xpath1::XML_NAMESPACE;
use xsltr_xpath1::datasource::DataSourceNode;

pub(crate) fn handle_text(text: &str, disable_escaping: bool, builder: &mut dyn OutputBuilder) {
    if disable_escaping {
        builder.add_unescaped_text(text);
    } else {
        builder.add_text(text);
    }
}

/// The parts of a literal result element instruction.
pub(crate) struct LiteralElement<'i> {
    pub name: &'i ExpandedName,
    pub namespaces: &'i [(String, String)],
    pub attributes: &'i [LiteralAttribute],
    pub use_attribute_sets: &'i [String],
    pub body: &'i PreparsedTemplate,
}

/// Rewrites a stylesheet name into the namespace `xsl:namespace-alias` maps it to.
fn alias_name(aliases: &HashMap<String, NamespaceAlias>, name: &ExpandedName) -> ExpandedName {
    let key = name.namespace.as_deref().unwrap_or("");
    match aliases.get(key) {
        Some(alias) => ExpandedName {
            prefix: alias.result_prefix.clone(),
            local: name.local.clone(),
            namespace: alias.result_namespace.clone(),
        },
        None => name.clone(),
    }
}

pub(crate) fn handle_literal_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    element: LiteralElement<'_>,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let stylesheet = executor.stylesheet;
    let aliases = &stylesheet.namespace_aliases;
    builder.start_element(&alias_name(aliases, element.name));
    for (prefix, uri) in element.namespaces {
        match aliases.get(uri) {
            Some(alias) => {
                if let Some(result_uri) = &alias.result_namespace {
                    let result_prefix = alias.result_prefix.as_deref().unwrap_or("");
                    builder.add_namespace(result_prefix, result_uri);
                }
            }
            None => builder.add_namespace(prefix, uri),
        }
    }

    apply_attribute_sets(
        executor,
        element.use_attribute_sets,
        context_node,
        context_position,
        context_size,
        builder,
    )?;
    for attribute in element.attributes {
        let value = executor.evaluate_avt(
            &attribute.value,
            context_node,
            context_position,
            context_size,
        )?;
        let name = if attribute.name.namespace.is_some() {
            alias_name(aliases, &attribute.name)
        } else {
            attribute.name.clone()
        };
        builder.add_attribute(&name, &value);
    }

    executor.execute_template(
        element.body,
        context_node,
        context_position,
        context_size,
        builder,
    )?;
    builder.end_element();
    Ok(())
}

/// Adds the attributes of the named sets, each set's own `use-attribute-sets` first.
/// Attribute sets see global variables only.
pub(crate) fn apply_attribute_sets<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    names: &[String],
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let stylesheet = executor.stylesheet;
    for name in names {
        let Some(set) = stylesheet.attribute_sets.get(name) else {
            return Err(XsltError::undefined("attribute set", name.clone()));
        };
        if executor.attribute_set_stack.contains(name) {
            return Err(XsltError::runtime(format!(
                "Attribute set '{}' uses itself",
                name
            )));
        }
        executor.attribute_set_stack.push(name.clone());
        let saved_floor =
            std::mem::replace(&mut executor.scope_floor, executor.variable_stack.len());

        let mut result = apply_attribute_sets(
            executor,
            &set.use_attribute_sets,
            context_node,
            context_position,
            context_size,
            builder,
        );
        if result.is_ok() {
            executor.push_scope();
            for instruction in &set.attributes {
                result = executor.execute_instruction(
                    instruction,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                );
                if result.is_err() {
                    break;
                }
            }
            executor.pop_scope();
        }

        executor.scope_floor = saved_floor;
        executor.attribute_set_stack.pop();
        result?;
    }
    Ok(())
}

/// The name and namespace attributes of `xsl:element` / `xsl:attribute`.
pub(crate) struct ComputedName<'i> {
    pub name: &'i Avt,
    pub namespace: Option<&'i Avt>,
    pub in_scope: &'i HashMap<String, String>,
}

impl ComputedName<'_> {
    /// Evaluates the name. Without a `namespace` attribute a prefix resolves against the
    /// instruction's in-scope namespaces, and an unprefixed element name takes the
    /// default namespace.
    fn evaluate<'s, 'a, N: DataSourceNode<'a> + 'a>(
        &self,
        executor: &mut TemplateExecutor<'s, 'a, N>,
        what: &str,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<ExpandedName, XsltError> {
        let qname = executor.evaluate_avt(self.name, context_node, context_position, context_size)?;
        let qname = qname.trim();
        if !is_qname(qname) {
            return Err(XsltError::runtime(format!(
                "'{}' is not a valid {} name",
                qname, what
            )));
        }
        let (prefix, local) = match qname.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, qname),
        };

        if let Some(namespace) = self.namespace {
            let uri = executor.evaluate_avt(namespace, context_node, context_position, context_size)?;
            if uri.is_empty() {
                return Ok(ExpandedName::local(local));
            }
            return Ok(ExpandedName::new(prefix, local, Some(uri.as_str())));
        }

        let namespace = match prefix {
            Some("xml") => Some(XML_NAMESPACE),
            Some(prefix) => match self.in_scope.get(prefix) {
                Some(uri) => Some(uri.as_str()),
                None => {
                    return Err(XsltError::runtime(format!(
                        "Namespace prefix '{}' of {} name '{}' is not declared",
                        prefix, what, qname
                    )));
                }
            },
            None if what == "element" => self
                .in_scope
                .get("")
                .map(String::as_str)
                .filter(|uri| !uri.is_empty()),
            None => None,
        };
        Ok(ExpandedName::new(prefix, local, namespace))
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: ComputedName<'_>,
    use_attribute_sets: &[String],
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let name = name.evaluate(executor, "element", context_node, context_position, context_size)?;
    builder.start_element(&name);
    if let Some(uri) = &name.namespace {
        builder.add_namespace(name.prefix.as_deref().unwrap_or(""), uri);
    }
    apply_attribute_sets(
        executor,
        use_attribute_sets,
        context_node,
        context_position,
        context_size,
        builder,
    )?;
    executor.execute_template(body, context_node, context_position, context_size, builder)?;
    builder.end_element();
    Ok(())
}

pub(crate) fn handle_attribute<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: ComputedName<'_>,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let name = name.evaluate(executor, "attribute", context_node, context_position, context_size)?;
    if name.prefix.as_deref() == Some("xmlns") || (name.prefix.is_none() && name.local == "xmlns")
    {
        log::warn!("xsl:attribute cannot create namespace declaration '{}'; ignored", name.qualified());
        return Ok(());
    }
    let value = executor.text_content(
        body,
        "xsl:attribute",
        context_node,
        context_position,
        context_size,
    )?;
    builder.add_attribute(&name, &value);
    Ok(())
}

/// Comment text may not contain `--` or end in `-`; a space is inserted to keep it
/// well-formed.
fn sanitize_comment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

pub(crate) fn handle_comment<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let text = executor.text_content(body, "xsl:comment", context_node, context_position, context_size)?;
    builder.add_comment(&sanitize_comment(&text));
    Ok(())
}

pub(crate) fn handle_processing_instruction<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &mut TemplateExecutor<'s, 'a, N>,
    name: &Avt,
    body: &PreparsedTemplate,
    context_node: N,
    context_position: usize,
    context_size: usize,
    builder: &mut dyn OutputBuilder,
) -> Result<(), XsltError> {
    let target = executor.evaluate_avt(name, context_node, context_position, context_size)?;
    let target = target.trim();
    if !is_qname(target) || target.contains(':') || target.eq_ignore_ascii_case("xml") {
        return Err(XsltError::runtime(format!(
            "'{}' is not a valid processing instruction target",
            target
        )));
    }
    let data = executor.text_content(
        body,
        "xsl:processing-instruction",
        context_node,
        context_position,
        context_size,
    )?;
    let data = data.replace("?>", "? >");
    builder.add_processing_instruction(target, data.trim_start());
    Ok(())
}
