//! XSLT 1.0 template execution engine.
//!
//! This module provides [`TemplateExecutor`], which interprets a [`CompiledStylesheet`]
//! against a source tree and writes the result through an [`OutputBuilder`].
//!
//! # Execution Model
//!
//! The executor maintains:
//! - **Variable stack**: one frame per executing sequence constructor. A template
//!   invocation raises `scope_floor` so the caller's locals are hidden from the callee.
//! - **Globals**: evaluated on first reference; a reference met while the same global
//!   is being evaluated is a circular definition.
//! - **Key indexes**: built once over the source tree before execution starts.
//! - **Current template rule**: the rule `xsl:apply-imports` continues from.
//!
//! Nested template invocations are counted against `max_depth`; running past it is a
//! `ResourceExhaustion` error.

use crate::ast::{
    Avt, AvtPart, CompiledStylesheet, CompiledXPath, GlobalVariable, ModeRules, PreparsedTemplate,
    Template, TemplateRule, VariableValue, WithParam, XsltInstruction,
};
use crate::error::XsltError;
use crate::executor_handlers::{
    apply_templates, call_template, control_flow, copy, for_each, literals, number, variables,
};
use crate::functions::{KeyIndex, XsltFunctions};
use crate::output::OutputBuilder;
use crate::pattern::Pattern;
use crate::result_tree::ResultTree;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use xsltr_xpath1::engine::{EvaluationContext, VariableScope, XPathValue, evaluate};
use xsltr_xpath1::{DataSourceNode, NodeType, XPathError};

pub const DEFAULT_MAX_DEPTH: usize = 3000;

/// A variable's value. Result tree fragments keep their tree so `xsl:copy-of` can copy
/// it; everywhere else they behave as their string value.
#[derive(Debug, Clone)]
pub enum Binding<N> {
    Value(XPathValue<N>),
    Fragment(Arc<ResultTree>),
}

impl<N: Clone> Binding<N> {
    pub fn to_xpath(&self) -> XPathValue<N> {
        match self {
            Binding::Value(value) => value.clone(),
            Binding::Fragment(tree) => XPathValue::String(tree.string_value()),
        }
    }
}

#[derive(Debug)]
pub(crate) enum GlobalSlot<N> {
    Pending,
    Ready(Binding<N>),
}

/// The variables visible to one expression.
struct Scope<'e, N> {
    frames: &'e [HashMap<String, Binding<N>>],
    globals: &'e HashMap<String, GlobalSlot<N>>,
}

impl<N: Clone> VariableScope<N> for Scope<'_, N> {
    fn lookup(&self, name: &str) -> Result<Option<XPathValue<N>>, XPathError> {
        if let Some(binding) = self.frames.iter().rev().find_map(|f| f.get(name)) {
            return Ok(Some(binding.to_xpath()));
        }
        Ok(match self.globals.get(name) {
            Some(GlobalSlot::Ready(binding)) => Some(binding.to_xpath()),
            _ => None,
        })
    }
}

/// The template rule being instantiated, as `xsl:apply-imports` needs it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CurrentRule<'s> {
    pub rules: &'s ModeRules,
    pub mode: &'s Option<String>,
    pub precedence: usize,
    pub floor: usize,
}

pub(crate) fn xpath_error(e: XPathError) -> XsltError {
    match e {
        XPathError::UnknownVariable(name) => XsltError::undefined("variable", name),
        other => XsltError::XPath(other),
    }
}

pub struct TemplateExecutor<'s, 'a, N: DataSourceNode<'a>> {
    pub(crate) stylesheet: &'s CompiledStylesheet,
    pub(crate) root_node: N,
    pub(crate) variable_stack: Vec<HashMap<String, Binding<N>>>,
    /// Frames below this index belong to callers and are not visible.
    pub(crate) scope_floor: usize,
    pub(crate) globals: HashMap<String, GlobalSlot<N>>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) key_indexes: KeyIndex<N>,
    pub(crate) current_rule: Option<CurrentRule<'s>>,
    pub(crate) attribute_set_stack: Vec<String>,
    pub(crate) depth: usize,
    pub(crate) max_depth: usize,
    _marker: PhantomData<&'a ()>,
}

impl<'s, 'a, N: DataSourceNode<'a> + 'a> TemplateExecutor<'s, 'a, N> {
    pub fn new(stylesheet: &'s CompiledStylesheet, root_node: N) -> Result<Self, XsltError> {
        let mut executor = Self {
            stylesheet,
            root_node,
            variable_stack: Vec::new(),
            scope_floor: 0,
            globals: HashMap::new(),
            params: HashMap::new(),
            key_indexes: HashMap::new(),
            current_rule: None,
            attribute_set_stack: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            _marker: PhantomData,
        };
        executor.build_key_indexes()?;
        Ok(executor)
    }

    /// Values for top-level `xsl:param`s, used instead of their declared defaults.
    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Applies templates to the root node in the default mode.
    pub fn execute(&mut self, builder: &mut dyn OutputBuilder) -> Result<(), XsltError> {
        for name in self.params.keys() {
            let declared = self
                .stylesheet
                .global_variables
                .get(name)
                .is_some_and(|g| g.is_param);
            if !declared {
                log::debug!("Stylesheet parameter '{}' is not declared; ignored", name);
            }
        }
        let root = self.root_node;
        self.apply_templates_to_nodes(&[root], &None, &HashMap::new(), builder)
    }

    fn build_key_indexes(&mut self) -> Result<(), XsltError> {
        if self.stylesheet.keys.is_empty() {
            return Ok(());
        }
        let mut nodes = Vec::new();
        let mut stack = vec![self.root_node];
        while let Some(node) = stack.pop() {
            nodes.push(node);
            nodes.extend(node.attributes());
            let mark = stack.len();
            stack.extend(node.children());
            stack[mark..].reverse();
        }

        let globals = HashMap::new();
        let scope = Scope {
            frames: &[],
            globals: &globals,
        };
        let mut indexes: KeyIndex<N> = HashMap::new();
        for (name, declarations) in &self.stylesheet.keys {
            let index = indexes.entry(name.clone()).or_default();
            for declaration in declarations {
                for &node in &nodes {
                    let functions = XsltFunctions {
                        stylesheet: self.stylesheet,
                        current: node,
                        keys: None,
                    };
                    let pattern_ctx = EvaluationContext::new(
                        node,
                        self.root_node,
                        &self.stylesheet.functions,
                        &scope,
                        declaration.pattern.namespaces(),
                    )
                    .with_extensions(&functions);
                    if !declaration.pattern.matches(node, &pattern_ctx).map_err(xpath_error)? {
                        continue;
                    }
                    let use_ctx = EvaluationContext::new(
                        node,
                        self.root_node,
                        &self.stylesheet.functions,
                        &scope,
                        &declaration.use_expr.namespaces,
                    )
                    .with_extensions(&functions);
                    match evaluate(&declaration.use_expr.expr, &use_ctx).map_err(xpath_error)? {
                        XPathValue::NodeSet(values) => {
                            for value in values {
                                index.entry(value.string_value()).or_default().push(node);
                            }
                        }
                        other => index.entry(other.to_string()).or_default().push(node),
                    }
                }
            }
        }
        log::debug!(
            "Built {} key index(es) over {} nodes",
            indexes.len(),
            nodes.len()
        );
        self.key_indexes = indexes;
        Ok(())
    }

    // --- Variables ---

    fn visible_frames(&self) -> &[HashMap<String, Binding<N>>] {
        let floor = self.scope_floor.min(self.variable_stack.len());
        &self.variable_stack[floor..]
    }

    pub(crate) fn push_scope(&mut self) {
        self.variable_stack.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.variable_stack.pop();
    }

    pub(crate) fn set_variable(&mut self, name: String, value: Binding<N>) {
        if let Some(scope) = self.variable_stack.last_mut() {
            scope.insert(name, value);
        }
    }

    pub(crate) fn lookup_binding(&self, name: &str) -> Option<&Binding<N>> {
        if let Some(binding) = self.visible_frames().iter().rev().find_map(|f| f.get(name)) {
            return Some(binding);
        }
        match self.globals.get(name) {
            Some(GlobalSlot::Ready(binding)) => Some(binding),
            _ => None,
        }
    }

    /// Evaluates the globals among `names` that are not shadowed by a local variable.
    pub(crate) fn ensure_globals(&mut self, names: &[String]) -> Result<(), XsltError> {
        for name in names {
            if self.visible_frames().iter().any(|f| f.contains_key(name)) {
                continue;
            }
            match self.globals.get(name) {
                Some(GlobalSlot::Ready(_)) => continue,
                Some(GlobalSlot::Pending) => {
                    return Err(XsltError::runtime(format!(
                        "Circular definition of global variable '{}'",
                        name
                    )));
                }
                None => {}
            }
            let stylesheet = self.stylesheet;
            if let Some(global) = stylesheet.global_variables.get(name) {
                self.evaluate_global(global)?;
            }
        }
        Ok(())
    }

    fn evaluate_global(&mut self, global: &'s GlobalVariable) -> Result<(), XsltError> {
        self.globals.insert(global.name.clone(), GlobalSlot::Pending);
        let binding = match self.params.get(&global.name) {
            Some(value) if global.is_param => Binding::Value(XPathValue::String(value.clone())),
            _ => {
                let saved_floor = std::mem::replace(&mut self.scope_floor, self.variable_stack.len());
                let saved_rule = self.current_rule.take();
                let result = self.evaluate_variable_value(&global.value, self.root_node, 1, 1);
                self.scope_floor = saved_floor;
                self.current_rule = saved_rule;
                result?
            }
        };
        log::trace!("Evaluated global variable '{}'", global.name);
        self.globals
            .insert(global.name.clone(), GlobalSlot::Ready(binding));
        Ok(())
    }

    pub(crate) fn evaluate_variable_value(
        &mut self,
        value: &VariableValue,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<Binding<N>, XsltError> {
        match value {
            VariableValue::Select(select) => Ok(Binding::Value(self.evaluate_xpath(
                select,
                context_node,
                context_position,
                context_size,
            )?)),
            VariableValue::Content(body) => {
                let mut fragment = ResultTree::new();
                self.execute_template(body, context_node, context_position, context_size, &mut fragment)?;
                Ok(Binding::Fragment(Arc::new(fragment)))
            }
            VariableValue::Empty => Ok(Binding::Value(XPathValue::String(String::new()))),
        }
    }

    pub(crate) fn evaluate_params(
        &mut self,
        params: &[WithParam],
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<HashMap<String, Binding<N>>, XsltError> {
        let mut values = HashMap::with_capacity(params.len());
        for param in params {
            let value = self.evaluate_variable_value(
                &param.value,
                context_node,
                context_position,
                context_size,
            )?;
            values.insert(param.name.clone(), value);
        }
        Ok(values)
    }

    // --- Expressions ---

    pub(crate) fn evaluate_xpath(
        &mut self,
        xpath: &CompiledXPath,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<XPathValue<N>, XsltError> {
        self.ensure_globals(&xpath.variables)?;
        let scope = Scope {
            frames: self.visible_frames(),
            globals: &self.globals,
        };
        let functions = XsltFunctions {
            stylesheet: self.stylesheet,
            current: context_node,
            keys: Some(&self.key_indexes),
        };
        let e_ctx = EvaluationContext::new(
            context_node,
            self.root_node,
            &self.stylesheet.functions,
            &scope,
            &xpath.namespaces,
        )
        .with_extensions(&functions)
        .with_position(context_position, context_size);
        evaluate(&xpath.expr, &e_ctx).map_err(|e| {
            log::debug!("Evaluation of '{}' failed: {}", xpath.text, e);
            xpath_error(e)
        })
    }

    pub(crate) fn evaluate_string(
        &mut self,
        xpath: &CompiledXPath,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<String, XsltError> {
        Ok(self
            .evaluate_xpath(xpath, context_node, context_position, context_size)?
            .to_string())
    }

    pub(crate) fn evaluate_node_set(
        &mut self,
        xpath: &CompiledXPath,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<Vec<N>, XsltError> {
        self.evaluate_xpath(xpath, context_node, context_position, context_size)?
            .into_node_set(&format!("The expression '{}'", xpath.text))
            .map_err(xpath_error)
    }

    pub(crate) fn evaluate_avt(
        &mut self,
        avt: &Avt,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<String, XsltError> {
        match avt {
            Avt::Static(s) => Ok(s.clone()),
            Avt::Dynamic(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        AvtPart::Static(s) => out.push_str(s),
                        AvtPart::Dynamic(xpath) => out.push_str(&self.evaluate_string(
                            xpath,
                            context_node,
                            context_position,
                            context_size,
                        )?),
                    }
                }
                Ok(out)
            }
        }
    }

    /// Whether `node` matches `pattern`; `current()` in predicates is `node` itself.
    pub(crate) fn pattern_matches(&mut self, pattern: &Pattern, node: N) -> Result<bool, XsltError> {
        if pattern.has_variables() {
            self.ensure_globals(pattern.variables())?;
        }
        let scope = Scope {
            frames: self.visible_frames(),
            globals: &self.globals,
        };
        let functions = XsltFunctions {
            stylesheet: self.stylesheet,
            current: node,
            keys: Some(&self.key_indexes),
        };
        let e_ctx = EvaluationContext::new(
            node,
            self.root_node,
            &self.stylesheet.functions,
            &scope,
            pattern.namespaces(),
        )
        .with_extensions(&functions);
        pattern.matches(node, &e_ctx).map_err(xpath_error)
    }

    // --- Template dispatch ---

    /// The best rule for `node`. `range` limits candidates to import precedences in
    /// `[floor, below)`, as `xsl:apply-imports` requires.
    pub(crate) fn find_rule(
        &mut self,
        rules: &'s ModeRules,
        node: N,
        range: Option<(usize, usize)>,
    ) -> Result<Option<&'s TemplateRule>, XsltError> {
        let named: &[usize] = match node.node_type() {
            NodeType::Element | NodeType::Attribute => node
                .name()
                .and_then(|q| rules.by_name.get(q.local_part))
                .map_or(&[], Vec::as_slice),
            _ => &[],
        };
        let generic = rules.generic.as_slice();

        let (mut i, mut j) = (0, 0);
        while i < named.len() || j < generic.len() {
            let index = match (named.get(i), generic.get(j)) {
                (Some(&a), Some(&b)) if a < b => {
                    i += 1;
                    a
                }
                (Some(_), Some(&b)) => {
                    j += 1;
                    b
                }
                (Some(&a), None) => {
                    i += 1;
                    a
                }
                (None, Some(&b)) => {
                    j += 1;
                    b
                }
                (None, None) => break,
            };
            let rule = &rules.rules[index];
            if let Some((floor, below)) = range
                && !(floor..below).contains(&rule.import_precedence)
            {
                continue;
            }
            if self.pattern_matches(&rule.pattern, node)? {
                log::trace!(
                    "Node {:?} matched template '{}' (priority {})",
                    node.name().map(|q| q.to_string()),
                    rule.pattern,
                    rule.priority
                );
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    pub(crate) fn apply_templates_to_nodes(
        &mut self,
        nodes: &[N],
        mode: &Option<String>,
        params: &HashMap<String, Binding<N>>,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet;
        let rules = stylesheet.modes.get(mode);
        let size = nodes.len();
        for (i, &node) in nodes.iter().enumerate() {
            let rule = match rules {
                Some(rules) => self.find_rule(rules, node, None)?.map(|r| (rules, r)),
                None => None,
            };
            match rule {
                Some((rules, rule)) => {
                    let current = CurrentRule {
                        rules,
                        mode: &rule.mode,
                        precedence: rule.import_precedence,
                        floor: rule.import_floor,
                    };
                    self.invoke_template(&rule.template, params.clone(), node, i + 1, size, Some(current), builder)?;
                }
                None => self.apply_builtin_template(node, mode, builder)?,
            }
        }
        Ok(())
    }

    /// The built-in rules: recurse into roots and elements, copy text and attribute values.
    pub(crate) fn apply_builtin_template(
        &mut self,
        node: N,
        mode: &Option<String>,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        match node.node_type() {
            NodeType::Root | NodeType::Element => {
                let children: Vec<N> = node.children().collect();
                self.apply_templates_to_nodes(&children, mode, &HashMap::new(), builder)
            }
            NodeType::Text | NodeType::Attribute => {
                builder.add_text(&node.string_value());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Runs a template body in a fresh variable scope with its parameters bound.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn invoke_template(
        &mut self,
        template: &'s Template,
        mut params: HashMap<String, Binding<N>>,
        context_node: N,
        context_position: usize,
        context_size: usize,
        rule: Option<CurrentRule<'s>>,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        if self.depth >= self.max_depth {
            return Err(XsltError::ResourceExhaustion(format!(
                "Template recursion exceeded {} nested invocations",
                self.max_depth
            )));
        }
        self.depth += 1;
        let saved_floor = std::mem::replace(&mut self.scope_floor, self.variable_stack.len());
        let saved_rule = match rule {
            Some(rule) => self.current_rule.replace(rule),
            None => self.current_rule,
        };
        self.push_scope();

        let mut result = Ok(());
        for param in &template.params {
            let value = match params.remove(&param.name) {
                Some(value) => value,
                None => match self.evaluate_variable_value(
                    &param.value,
                    context_node,
                    context_position,
                    context_size,
                ) {
                    Ok(value) => value,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                },
            };
            self.set_variable(param.name.clone(), value);
        }
        if result.is_ok() {
            result = self.execute_template(&template.body, context_node, context_position, context_size, builder);
        }

        self.pop_scope();
        self.current_rule = saved_rule;
        self.scope_floor = saved_floor;
        self.depth -= 1;
        result
    }

    // --- Instructions ---

    pub(crate) fn execute_template(
        &mut self,
        template: &PreparsedTemplate,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        self.push_scope();
        let mut result = Ok(());
        for instruction in &template.0 {
            result = self.execute_instruction(instruction, context_node, context_position, context_size, builder);
            if result.is_err() {
                break;
            }
        }
        self.pop_scope();
        result
    }

    pub(crate) fn execute_instruction(
        &mut self,
        instruction: &XsltInstruction,
        context_node: N,
        context_position: usize,
        context_size: usize,
        builder: &mut dyn OutputBuilder,
    ) -> Result<(), XsltError> {
        match instruction {
            XsltInstruction::Text {
                text,
                disable_escaping,
            } => {
                literals::handle_text(text, *disable_escaping, builder);
                Ok(())
            }
            XsltInstruction::LiteralElement {
                name,
                namespaces,
                attributes,
                use_attribute_sets,
                body,
            } => literals::handle_literal_element(
                self,
                literals::LiteralElement {
                    name,
                    namespaces,
                    attributes,
                    use_attribute_sets,
                    body,
                },
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ValueOf {
                select,
                disable_escaping,
            } => {
                let text = self.evaluate_string(select, context_node, context_position, context_size)?;
                literals::handle_text(&text, *disable_escaping, builder);
                Ok(())
            }
            XsltInstruction::CopyOf { select } => copy::handle_copy_of(
                self,
                select,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Copy {
                use_attribute_sets,
                body,
            } => copy::handle_copy(
                self,
                use_attribute_sets,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
                params,
            } => apply_templates::handle_apply_templates(
                self,
                select.as_ref(),
                mode,
                sort_keys,
                params,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ApplyImports => apply_templates::handle_apply_imports(
                self,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::CallTemplate { name, params } => call_template::handle_call_template(
                self,
                name,
                params,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ForEach {
                select,
                sort_keys,
                body,
            } => for_each::handle_for_each(
                self,
                select,
                sort_keys,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::If { test, body } => {
                let condition = self
                    .evaluate_xpath(test, context_node, context_position, context_size)?
                    .to_bool();
                control_flow::handle_if(
                    self,
                    condition,
                    body,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )
            }
            XsltInstruction::Choose { whens, otherwise } => control_flow::handle_choose(
                self,
                whens,
                otherwise.as_ref(),
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Variable { name, value } => {
                let value =
                    self.evaluate_variable_value(value, context_node, context_position, context_size)?;
                variables::handle_variable(self, name, value)
            }
            XsltInstruction::Element {
                name,
                namespace,
                in_scope,
                use_attribute_sets,
                body,
            } => literals::handle_element(
                self,
                literals::ComputedName {
                    name,
                    namespace: namespace.as_ref(),
                    in_scope,
                },
                use_attribute_sets,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Attribute {
                name,
                namespace,
                in_scope,
                body,
            } => literals::handle_attribute(
                self,
                literals::ComputedName {
                    name,
                    namespace: namespace.as_ref(),
                    in_scope,
                },
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Comment { body } => literals::handle_comment(
                self,
                body,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::ProcessingInstruction { name, body } => {
                literals::handle_processing_instruction(
                    self,
                    name,
                    body,
                    context_node,
                    context_position,
                    context_size,
                    builder,
                )
            }
            XsltInstruction::Number(number) => number::handle_number(
                self,
                number,
                context_node,
                context_position,
                context_size,
                builder,
            ),
            XsltInstruction::Message { body, terminate } => control_flow::handle_message(
                self,
                body,
                *terminate,
                context_node,
                context_position,
                context_size,
            ),
            XsltInstruction::Unsupported {
                name,
                fallback,
                location,
            } => match fallback {
                Some(fallback) => {
                    self.execute_template(fallback, context_node, context_position, context_size, builder)
                }
                None => Err(XsltError::runtime(format!(
                    "Instruction '{}' at {} is not supported and has no xsl:fallback",
                    name, location
                ))),
            },
        }
    }

    /// Runs `body` into a detached tree and returns its text, for instructions whose
    /// content may only produce text.
    pub(crate) fn text_content(
        &mut self,
        body: &PreparsedTemplate,
        what: &str,
        context_node: N,
        context_position: usize,
        context_size: usize,
    ) -> Result<String, XsltError> {
        let mut content = ResultTree::new();
        self.execute_template(body, context_node, context_position, context_size, &mut content)?;
        let (text, dropped) = content.text_content();
        if dropped {
            log::warn!("Non-text content of {} was ignored", what);
        }
        Ok(text)
    }
}
