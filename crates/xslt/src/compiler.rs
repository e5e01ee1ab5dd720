//! XSLT 1.0 compiler that builds a `CompiledStylesheet` from stylesheet events.
//!
//! The builder keeps two stacks: `state_stack` remembers what kind of element is open,
//! `instruction_stack` collects the compiled children of every open element. Imported
//! and included modules are replayed into the same builder when their `xsl:import` or
//! `xsl:include` element is met; import precedence is assigned once every module is
//! known, in `finalize`.

use crate::ast::{
    AttributeSet, Avt, AvtPart, CompiledStylesheet, CompiledXPath, DecimalFormatDeclaration,
    GlobalVariable, KeyDeclaration, ModeRules, NameTest, NamespaceAlias, OutputDeclaration, Param,
    SortKey, SpaceRule, Template, TemplateRule, When, WithParam, XSLT_NAMESPACE, XsltInstruction,
};
use crate::error::XsltError;
use crate::functions::xslt_function_registry;
use crate::parser::{self, ElementStart, OwnedAttributes, StylesheetBuilder};
use crate::pattern::{self, Pattern};
use crate::resolver::{MAX_IMPORT_DEPTH, StylesheetResolver};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use xsltr_dom::{Document, ExpandedName, Location};
use xsltr_traits::resolve_uri;
use xsltr_xpath1::{FunctionRegistry, XML_NAMESPACE, parse_expression};

/// What kind of element is open, with whatever it collects from its children.
#[derive(Debug)]
pub enum BuilderState {
    /// Before the document element of a stylesheet module.
    Document,
    Stylesheet,
    /// A literal result element used as the whole stylesheet: its body is the `/` template.
    SimplifiedRoot,
    /// A subtree whose events are dropped.
    Ignored,
    /// `xsl:import` / `xsl:include`, already processed when they started.
    Declaration,
    Template {
        attrs: OwnedAttributes,
        params: Vec<Param>,
    },
    AttributeSet(OwnedAttributes),
    Variable {
        attrs: OwnedAttributes,
        kind: VariableKind,
    },
    ApplyTemplates {
        attrs: OwnedAttributes,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
    },
    CallTemplate {
        attrs: OwnedAttributes,
        params: Vec<WithParam>,
    },
    ForEach {
        attrs: OwnedAttributes,
        sort_keys: Vec<SortKey>,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<crate::ast::PreparsedTemplate>,
    },
    XslText {
        disable_escaping: bool,
    },
    LiteralElement {
        name: ExpandedName,
        attrs: OwnedAttributes,
        namespaces: Vec<(String, String)>,
    },
    Unsupported {
        name: String,
        fallback: Option<Vec<XsltInstruction>>,
    },
    Fallback,
    /// Any other instruction; its attributes are read when it ends.
    Instruction(OwnedAttributes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Variable,
    Param,
    WithParam,
}

/// Lexical settings in effect on an element, inherited by its descendants.
#[derive(Debug, Clone, Default)]
pub(crate) struct ElementScope {
    pub namespaces: Arc<HashMap<String, String>>,
    /// Namespace URIs never copied to literal results.
    pub excluded: Arc<Vec<String>>,
    pub extension: Arc<Vec<String>>,
    pub forwards_compatible: bool,
    pub preserve_space: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ModuleInfo {
    pub imports: Vec<usize>,
}

/// A stylesheet document being compiled. Included documents share their includer's
/// module.
#[derive(Debug)]
pub(crate) struct DocumentFrame {
    pub uri: Option<String>,
    pub module: usize,
    pub saw_declaration: bool,
    pub saw_root: bool,
}

#[derive(Debug)]
pub(crate) struct Declared<T> {
    pub item: T,
    pub module: usize,
    pub location: Location,
}

pub struct CompilerBuilder {
    pub(crate) resolver: Option<Arc<dyn StylesheetResolver>>,
    pub(crate) functions: Arc<FunctionRegistry>,
    pub(crate) version: Option<String>,
    pub(crate) modules: Vec<ModuleInfo>,
    pub(crate) documents: Vec<DocumentFrame>,
    pub(crate) scopes: Vec<ElementScope>,
    /// Rule `import_precedence` holds the module id until `finalize`.
    pub(crate) template_rules: Vec<TemplateRule>,
    pub(crate) named_templates: Vec<Declared<Arc<Template>>>,
    pub(crate) global_variables: Vec<Declared<GlobalVariable>>,
    pub(crate) keys: Vec<KeyDeclaration>,
    pub(crate) attribute_sets: Vec<Declared<(String, AttributeSet)>>,
    pub(crate) outputs: Vec<Declared<OutputDeclaration>>,
    pub(crate) decimal_formats: Vec<Declared<(Option<String>, DecimalFormatDeclaration)>>,
    pub(crate) space_rules: Vec<Declared<(NameTest, bool)>>,
    pub(crate) namespace_aliases: Vec<Declared<(String, NamespaceAlias)>>,
    /// `call-template` and `use-attribute-sets` targets, checked in `finalize`.
    pub(crate) template_references: Vec<(String, Location)>,
    pub(crate) attribute_set_references: Vec<(String, Location)>,
    pub(crate) instruction_stack: Vec<Vec<XsltInstruction>>,
    pub(crate) state_stack: Vec<BuilderState>,
    pub(crate) next_order: usize,
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CompilerBuilder {
    pub fn new(resolver: Option<Arc<dyn StylesheetResolver>>) -> Self {
        Self {
            resolver,
            functions: Arc::new(xslt_function_registry()),
            version: None,
            modules: vec![ModuleInfo::default()],
            documents: Vec::new(),
            scopes: Vec::new(),
            template_rules: Vec::new(),
            named_templates: Vec::new(),
            global_variables: Vec::new(),
            keys: Vec::new(),
            attribute_sets: Vec::new(),
            outputs: Vec::new(),
            decimal_formats: Vec::new(),
            space_rules: Vec::new(),
            namespace_aliases: Vec::new(),
            template_references: Vec::new(),
            attribute_set_references: Vec::new(),
            instruction_stack: Vec::new(),
            state_stack: Vec::new(),
            next_order: 0,
        }
    }

    /// Compiles the principal stylesheet module and everything it imports.
    pub fn compile(mut self, doc: &Document) -> Result<CompiledStylesheet, XsltError> {
        let start = Instant::now();
        self.compile_document(doc, doc.uri().map(str::to_string), 0)?;
        let stylesheet = self.finalize()?;
        log::debug!(
            "Compiled stylesheet: {} template rules across {} modes, {} named templates in {:?}",
            stylesheet.modes.values().map(|m| m.rules.len()).sum::<usize>(),
            stylesheet.modes.len(),
            stylesheet.named_templates.len(),
            start.elapsed()
        );
        Ok(stylesheet)
    }

    pub(crate) fn compile_document(
        &mut self,
        doc: &Document,
        uri: Option<String>,
        module: usize,
    ) -> Result<(), XsltError> {
        self.documents.push(DocumentFrame {
            uri,
            module,
            saw_declaration: false,
            saw_root: false,
        });
        self.scopes.push(ElementScope::default());
        self.state_stack.push(BuilderState::Document);

        let result = parser::replay(doc, self);

        self.state_stack.pop();
        self.scopes.pop();
        let frame = self.documents.pop();
        result?;
        match frame {
            Some(frame) if frame.saw_root => Ok(()),
            _ => Err(XsltError::compile("The stylesheet document has no document element")),
        }
    }

    /// Loads an imported or included module and replays it into this builder.
    pub(crate) fn load_module(&mut self, href: &str, import: bool) -> Result<(), XsltError> {
        let resolver = self.resolver.clone().ok_or_else(|| {
            XsltError::compile(format!(
                "Cannot load '{}': no stylesheet resolver is configured",
                href
            ))
        })?;
        let base = self.documents.last().and_then(|d| d.uri.clone());
        let uri = resolve_uri(href, base.as_deref());
        if self.documents.iter().any(|d| d.uri.as_deref() == Some(uri.as_str())) {
            return Err(XsltError::circular_import(uri));
        }
        if self.documents.len() >= MAX_IMPORT_DEPTH {
            return Err(XsltError::compile(format!(
                "Maximum import depth ({}) exceeded loading '{}'",
                MAX_IMPORT_DEPTH, uri
            )));
        }

        let doc = resolver.resolve(&uri)?;
        let module = if import {
            let id = self.modules.len();
            self.modules.push(ModuleInfo::default());
            let parent = self.current_module();
            self.modules[parent].imports.push(id);
            id
        } else {
            self.current_module()
        };
        log::debug!(
            "{} stylesheet module '{}'",
            if import { "Importing" } else { "Including" },
            uri
        );
        self.compile_document(&doc, Some(uri), module)
    }

    pub(crate) fn current_module(&self) -> usize {
        self.documents.last().map_or(0, |d| d.module)
    }

    pub(crate) fn scope(&self) -> &ElementScope {
        static EMPTY: std::sync::OnceLock<ElementScope> = std::sync::OnceLock::new();
        match self.scopes.last() {
            Some(scope) => scope,
            None => EMPTY.get_or_init(ElementScope::default),
        }
    }

    pub(crate) fn namespaces(&self) -> Arc<HashMap<String, String>> {
        Arc::clone(&self.scope().namespaces)
    }

    pub(crate) fn forwards_compatible(&self) -> bool {
        self.scope().forwards_compatible
    }

    pub(crate) fn next_order(&mut self) -> usize {
        self.next_order += 1;
        self.next_order
    }

    pub(crate) fn push_instruction(&mut self, instr: XsltInstruction) {
        if let Some(parent) = self.instruction_stack.last_mut() {
            parent.push(instr);
        }
    }

    pub(crate) fn parse_xpath(&self, text: &str) -> Result<CompiledXPath, XsltError> {
        let expr = parse_expression(text).map_err(|e| XsltError::compile(e.to_string()))?;
        if !self.forwards_compatible() {
            self.functions
                .check_expression(&expr)
                .map_err(|e| XsltError::compile(format!("In expression '{}': {}", text, e)))?;
        }
        let mut variables: Vec<String> = Vec::new();
        expr.for_each_variable(&mut |name| {
            if !variables.iter().any(|v| v == name) {
                variables.push(name.to_string());
            }
        });
        Ok(CompiledXPath {
            expr,
            text: text.to_string(),
            namespaces: self.namespaces(),
            variables,
        })
    }

    pub(crate) fn parse_pattern(&self, text: &str) -> Result<Pattern, XsltError> {
        pattern::parse(text, self.namespaces())
    }

    /// Parses an attribute value template: `{expr}` parts are expressions, `{{` and
    /// `}}` stand for literal braces.
    pub(crate) fn parse_avt(&self, text: &str) -> Result<Avt, XsltError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut expr = String::new();
                    let mut quote: Option<char> = None;
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match (quote, c) {
                            (None, '}') => {
                                closed = true;
                                break;
                            }
                            (None, '"' | '\'') => quote = Some(c),
                            (Some(q), _) if q == c => quote = None,
                            _ => {}
                        }
                        expr.push(c);
                    }
                    if !closed {
                        return Err(XsltError::compile(format!(
                            "Unterminated expression in attribute value template '{}'",
                            text
                        )));
                    }
                    if !literal.is_empty() {
                        parts.push(AvtPart::Static(std::mem::take(&mut literal)));
                    }
                    parts.push(AvtPart::Dynamic(self.parse_xpath(&expr)?));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(XsltError::compile(format!(
                        "Unescaped '}}' in attribute value template '{}'",
                        text
                    )));
                }
                _ => literal.push(c),
            }
        }
        if parts.is_empty() {
            return Ok(Avt::Static(literal));
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Static(literal));
        }
        Ok(Avt::Dynamic(parts))
    }

    /// Expands a QName naming a template, mode, key, attribute set or decimal format.
    /// Prefixed names become `{uri}local`; unprefixed names stay as they are.
    pub(crate) fn expand_qname(&self, qname: &str) -> Result<String, XsltError> {
        expand_qname(qname, &self.scope().namespaces)
    }

    pub(crate) fn expand_qname_list(&self, list: &str) -> Result<Vec<String>, XsltError> {
        list.split_whitespace().map(|q| self.expand_qname(q)).collect()
    }

    /// Resolves a QName to an expanded name, using the default namespace when `use_default`.
    pub(crate) fn resolve_name(&self, qname: &str, use_default: bool) -> Result<ExpandedName, XsltError> {
        let namespaces = &self.scope().namespaces;
        match qname.split_once(':') {
            Some((prefix, local)) => {
                let uri = lookup_prefix(prefix, namespaces)?;
                Ok(ExpandedName::new(Some(prefix), local, Some(uri)))
            }
            None => {
                let uri = if use_default {
                    namespaces.get("").map(String::as_str)
                } else {
                    None
                };
                Ok(ExpandedName::new(None, qname, uri))
            }
        }
    }

    fn enter_scope(&mut self, e: &ElementStart<'_>, is_xslt: bool) -> Result<(), XsltError> {
        let parent = self.scope().clone();
        let mut scope = parent.clone();
        if !e.namespaces.is_empty() {
            let mut map = (*parent.namespaces).clone();
            for (prefix, uri) in e.namespaces {
                if uri.is_empty() {
                    map.remove(prefix);
                } else {
                    map.insert(prefix.clone(), uri.clone());
                }
            }
            scope.namespaces = Arc::new(map);
        }

        let is_stylesheet =
            is_xslt && matches!(e.name.local.as_str(), "stylesheet" | "transform");
        let setting = |local: &str| -> Option<String> {
            if is_stylesheet {
                get_attr_optional(&e.attributes, local)
            } else if !is_xslt {
                get_xslt_attr(&e.attributes, local)
            } else {
                None
            }
        };
        if let Some(version) = setting("version") {
            scope.forwards_compatible = version.trim() != "1.0";
        }
        if let Some(list) = setting("extension-element-prefixes") {
            let mut extension = (*parent.extension).clone();
            extension.extend(resolve_prefix_list(&list, &scope.namespaces)?);
            scope.extension = Arc::new(extension);
        }
        if let Some(list) = setting("exclude-result-prefixes") {
            let mut excluded = (*parent.excluded).clone();
            excluded.extend(resolve_prefix_list(&list, &scope.namespaces)?);
            scope.excluded = Arc::new(excluded);
        }
        if let Some(space) = e
            .attributes
            .iter()
            .find(|(n, _)| n.is(XML_NAMESPACE, "space"))
            .map(|(_, v)| v.as_str())
        {
            scope.preserve_space = space == "preserve";
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn start_element_inner(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
        if matches!(self.state_stack.last(), Some(BuilderState::Ignored)) {
            self.scopes.push(self.scope().clone());
            self.instruction_stack.push(Vec::new());
            self.state_stack.push(BuilderState::Ignored);
            return Ok(());
        }

        let is_xslt = e.name.namespace.as_deref() == Some(XSLT_NAMESPACE);
        self.enter_scope(&e, is_xslt)?;
        self.instruction_stack.push(Vec::new());

        match self.state_stack.last() {
            Some(BuilderState::Document) => return self.handle_document_element_start(e, is_xslt),
            Some(BuilderState::Stylesheet) => {
                if is_xslt {
                    return self.handle_declaration_start(e);
                }
                if e.name.namespace.is_none() {
                    return Err(XsltError::compile(format!(
                        "Top-level element '{}' must be in a namespace",
                        e.name.qualified()
                    )));
                }
                log::debug!("Ignoring top-level element '{}'", e.name.qualified());
                self.state_stack.push(BuilderState::Ignored);
                return Ok(());
            }
            Some(BuilderState::XslText { .. }) => {
                return Err(XsltError::compile("xsl:text may only contain text"));
            }
            Some(BuilderState::Declaration) => {
                return Err(XsltError::compile(format!(
                    "Element '{}' is not allowed inside a top-level declaration",
                    e.name.qualified()
                )));
            }
            Some(BuilderState::AttributeSet(_)) if !(is_xslt && e.name.local == "attribute") => {
                return Err(XsltError::compile(
                    "xsl:attribute-set may only contain xsl:attribute elements",
                ));
            }
            _ => {}
        }

        if is_xslt {
            return self.handle_instruction_start(e);
        }
        if let Some(uri) = &e.name.namespace
            && self.scope().extension.contains(uri)
        {
            self.state_stack.push(BuilderState::Unsupported {
                name: e.name.qualified(),
                fallback: None,
            });
            return Ok(());
        }
        self.handle_literal_element_start(e)
    }

    fn handle_document_element_start(
        &mut self,
        e: ElementStart<'_>,
        is_xslt: bool,
    ) -> Result<(), XsltError> {
        if let Some(frame) = self.documents.last_mut() {
            frame.saw_root = true;
        }
        if is_xslt && matches!(e.name.local.as_str(), "stylesheet" | "transform") {
            return self.handle_stylesheet_start(&e);
        }
        if !is_xslt && get_xslt_attr(&e.attributes, "version").is_some() {
            // The frame pushed for this element becomes the `/` template body.
            self.state_stack.push(BuilderState::SimplifiedRoot);
            self.scopes.push(self.scope().clone());
            self.instruction_stack.push(Vec::new());
            if self.version.is_none() && self.documents.len() == 1 {
                self.version = get_xslt_attr(&e.attributes, "version");
            }
            return self.handle_literal_element_start(e);
        }
        Err(XsltError::compile(format!(
            "'{}' is neither an xsl:stylesheet element nor a literal result element with xsl:version",
            e.name.qualified()
        )))
    }

    fn finish_simplified_root(&mut self, location: Location) -> Result<(), XsltError> {
        self.state_stack.pop();
        self.scopes.pop();
        let body = self.instruction_stack.pop().unwrap_or_default();
        let pattern = self.parse_pattern("/")?;
        let template = Arc::new(Template {
            name: None,
            params: Vec::new(),
            body: crate::ast::PreparsedTemplate(body),
            location,
        });
        let order = self.next_order();
        self.template_rules.push(TemplateRule {
            priority: pattern.default_priority(),
            pattern,
            mode: None,
            import_precedence: self.current_module(),
            import_floor: 0,
            order,
            template,
        });
        Ok(())
    }

    fn end_element_inner(&mut self, name: &ExpandedName, location: Location) -> Result<(), XsltError> {
        let body = self.instruction_stack.pop().unwrap_or_default();
        let state = self.state_stack.pop().unwrap_or(BuilderState::Stylesheet);

        let result = match state {
            BuilderState::Document
            | BuilderState::Stylesheet
            | BuilderState::SimplifiedRoot
            | BuilderState::Ignored
            | BuilderState::Declaration => Ok(()),
            BuilderState::Template { attrs, params } => {
                self.handle_template_end(attrs, params, body, location)
            }
            BuilderState::AttributeSet(attrs) => self.handle_attribute_set_end(attrs, body, location),
            BuilderState::Variable { attrs, kind } => self.handle_variable_end(attrs, kind, body, location),
            BuilderState::ApplyTemplates {
                attrs,
                sort_keys,
                params,
            } => self.handle_apply_templates_end(attrs, sort_keys, params, location),
            BuilderState::CallTemplate { attrs, params } => {
                self.handle_call_template_end(attrs, params, location)
            }
            BuilderState::ForEach { attrs, sort_keys } => {
                self.handle_for_each_end(attrs, sort_keys, body, location)
            }
            BuilderState::Choose { whens, otherwise } => self.handle_choose_end(whens, otherwise),
            BuilderState::XslText { disable_escaping } => {
                self.handle_text_end(disable_escaping, body);
                Ok(())
            }
            BuilderState::LiteralElement {
                name,
                attrs,
                namespaces,
            } => self.handle_literal_element_end(name, attrs, namespaces, body, location),
            BuilderState::Unsupported { name, fallback } => {
                self.handle_unsupported_end(name, fallback, location);
                Ok(())
            }
            BuilderState::Fallback => {
                self.handle_fallback_end(body);
                Ok(())
            }
            BuilderState::Instruction(attrs) => {
                self.handle_instruction_end(&name.local, attrs, body, location)
            }
        };
        self.scopes.pop();
        result?;

        if matches!(self.state_stack.last(), Some(BuilderState::SimplifiedRoot)) {
            self.finish_simplified_root(location)?;
        }
        Ok(())
    }

    /// Headings appear in the order declarations must be resolved: precedence first.
    pub fn finalize(self) -> Result<CompiledStylesheet, XsltError> {
        let (precedence, floor) = import_precedences(&self.modules);

        // Template rules
        let mut by_mode: HashMap<Option<String>, Vec<TemplateRule>> = HashMap::new();
        for mut rule in self.template_rules {
            let module = rule.import_precedence;
            rule.import_precedence = precedence[module];
            rule.import_floor = floor[module];
            by_mode.entry(rule.mode.clone()).or_default().push(rule);
        }
        let modes = by_mode
            .into_iter()
            .map(|(mode, rules)| (mode, index_rules(rules)))
            .collect();

        // Named templates
        let mut named_templates: HashMap<String, (usize, Arc<Template>)> = HashMap::new();
        for declared in self.named_templates {
            let prec = precedence[declared.module];
            let Some(name) = declared.item.name.clone() else {
                continue;
            };
            match named_templates.get(&name) {
                Some((existing, _)) if *existing == prec => {
                    return Err(XsltError::compile_at(
                        format!("Duplicate named template '{}'", name),
                        declared.location,
                    ));
                }
                Some((existing, _)) if *existing > prec => {}
                _ => {
                    named_templates.insert(name, (prec, declared.item));
                }
            }
        }
        for (name, location) in &self.template_references {
            if !named_templates.contains_key(name) {
                return Err(XsltError::undefined("template", name.clone()).located(*location));
            }
        }

        // Global variables and parameters
        let mut global_variables: HashMap<String, GlobalVariable> = HashMap::new();
        for declared in self.global_variables {
            let mut global = declared.item;
            global.import_precedence = precedence[declared.module];
            match global_variables.get(&global.name) {
                Some(existing) if existing.import_precedence == global.import_precedence => {
                    return Err(XsltError::compile_at(
                        format!("Duplicate global variable '{}'", global.name),
                        declared.location,
                    ));
                }
                Some(existing) if existing.import_precedence > global.import_precedence => {}
                _ => {
                    global_variables.insert(global.name.clone(), global);
                }
            }
        }

        let mut keys: HashMap<String, Vec<KeyDeclaration>> = HashMap::new();
        for key in self.keys {
            keys.entry(key.name.clone()).or_default().push(key);
        }

        // Attribute sets merge in ascending precedence so later attributes win.
        let mut sets = self.attribute_sets;
        sets.sort_by_key(|d| precedence[d.module]);
        let mut attribute_sets: HashMap<String, AttributeSet> = HashMap::new();
        for declared in sets {
            let (name, set) = declared.item;
            let merged = attribute_sets.entry(name).or_default();
            merged.use_attribute_sets.extend(set.use_attribute_sets);
            merged.attributes.extend(set.attributes);
        }
        for (name, location) in &self.attribute_set_references {
            if !attribute_sets.contains_key(name) {
                return Err(XsltError::undefined("attribute-set", name.clone()).located(*location));
            }
        }

        let mut decimal_formats: HashMap<Option<String>, (usize, DecimalFormatDeclaration)> =
            HashMap::new();
        for declared in self.decimal_formats {
            let prec = precedence[declared.module];
            let (name, format) = declared.item;
            match decimal_formats.get(&name) {
                Some((existing, current)) if *existing == prec && *current != format => {
                    return Err(XsltError::compile_at(
                        "Conflicting xsl:decimal-format declarations",
                        declared.location,
                    ));
                }
                Some((existing, _)) if *existing >= prec => {}
                _ => {
                    decimal_formats.insert(name, (prec, format));
                }
            }
        }
        let mut decimal_formats: HashMap<Option<String>, DecimalFormatDeclaration> = decimal_formats
            .into_iter()
            .map(|(name, (_, format))| (name, format))
            .collect();
        decimal_formats.entry(None).or_default();

        let mut outputs = self.outputs;
        outputs.sort_by_key(|d| precedence[d.module]);
        let mut output = OutputDeclaration::default();
        for declared in &outputs {
            output.merge_from(&declared.item);
        }

        let space_rules = self
            .space_rules
            .into_iter()
            .map(|d| SpaceRule {
                test: d.item.0,
                strip: d.item.1,
                import_precedence: precedence[d.module],
            })
            .collect();

        let mut namespace_aliases: HashMap<String, NamespaceAlias> = HashMap::new();
        for declared in self.namespace_aliases {
            let (stylesheet_uri, mut alias) = declared.item;
            alias.import_precedence = precedence[declared.module];
            match namespace_aliases.get(&stylesheet_uri) {
                Some(existing) if existing.import_precedence > alias.import_precedence => {}
                _ => {
                    namespace_aliases.insert(stylesheet_uri, alias);
                }
            }
        }

        Ok(CompiledStylesheet {
            version: self.version.unwrap_or_else(|| "1.0".to_string()),
            modes,
            named_templates: named_templates
                .into_iter()
                .map(|(name, (_, template))| (name, template))
                .collect(),
            global_variables,
            keys,
            attribute_sets,
            decimal_formats,
            output,
            space_rules,
            namespace_aliases,
            functions: self.functions,
        })
    }
}

impl StylesheetBuilder for CompilerBuilder {
    fn start_element(&mut self, e: ElementStart<'_>) -> Result<(), XsltError> {
        let location = e.location;
        self.start_element_inner(e).map_err(|err| err.located(location))
    }

    fn end_element(&mut self, name: &ExpandedName, location: Location) -> Result<(), XsltError> {
        self.end_element_inner(name, location)
            .map_err(|err| err.located(location))
    }

    fn text(&mut self, text: &str) -> Result<(), XsltError> {
        let accepts_text = match self.state_stack.last() {
            None | Some(BuilderState::Document) | Some(BuilderState::Ignored) => return Ok(()),
            Some(BuilderState::XslText { .. }) => {
                self.push_instruction(XsltInstruction::Text {
                    text: text.to_string(),
                    disable_escaping: false,
                });
                return Ok(());
            }
            Some(
                BuilderState::Stylesheet
                | BuilderState::Declaration
                | BuilderState::AttributeSet(_)
                | BuilderState::Choose { .. }
                | BuilderState::ApplyTemplates { .. }
                | BuilderState::CallTemplate { .. },
            ) => false,
            Some(_) => true,
        };

        let whitespace = text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
        if whitespace && !(accepts_text && self.scope().preserve_space) {
            return Ok(());
        }
        if !accepts_text {
            return Err(XsltError::compile(format!(
                "Text '{}' is not allowed here",
                text.trim()
            )));
        }
        self.push_instruction(XsltInstruction::Text {
            text: text.to_string(),
            disable_escaping: false,
        });
        Ok(())
    }
}

/// Assigns import precedence by a post-order walk of the import tree: a module's
/// imports rank below it, later imports above earlier ones. Also returns, per module,
/// the lowest precedence within its import subtree.
fn import_precedences(modules: &[ModuleInfo]) -> (Vec<usize>, Vec<usize>) {
    fn visit(
        modules: &[ModuleInfo],
        module: usize,
        next: &mut usize,
        precedence: &mut [usize],
        floor: &mut [usize],
    ) {
        let first = *next;
        for &child in &modules[module].imports {
            visit(modules, child, next, precedence, floor);
        }
        floor[module] = first;
        precedence[module] = *next;
        *next += 1;
    }

    let mut precedence = vec![0; modules.len()];
    let mut floor = vec![0; modules.len()];
    let mut next = 1;
    if !modules.is_empty() {
        visit(modules, 0, &mut next, &mut precedence, &mut floor);
    }
    (precedence, floor)
}

/// Sorts rules best first (precedence, then priority, then later declaration) and
/// buckets them by the local name their pattern requires.
pub(crate) fn index_rules(mut rules: Vec<TemplateRule>) -> ModeRules {
    rules.sort_by(|a, b| {
        b.import_precedence
            .cmp(&a.import_precedence)
            .then(
                b.priority
                    .partial_cmp(&a.priority)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(b.order.cmp(&a.order))
    });
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    let mut generic = Vec::new();
    for (index, rule) in rules.iter().enumerate() {
        match rule.pattern.name_key() {
            Some(name) => by_name.entry(name.to_string()).or_default().push(index),
            None => generic.push(index),
        }
    }
    ModeRules {
        rules,
        by_name,
        generic,
    }
}

fn lookup_prefix<'m>(prefix: &str, namespaces: &'m HashMap<String, String>) -> Result<&'m str, XsltError> {
    if prefix == "xml" {
        return Ok(XML_NAMESPACE);
    }
    namespaces
        .get(prefix)
        .map(String::as_str)
        .ok_or_else(|| XsltError::compile(format!("Namespace prefix '{}' is not declared", prefix)))
}

pub(crate) fn expand_qname(
    qname: &str,
    namespaces: &HashMap<String, String>,
) -> Result<String, XsltError> {
    let qname = qname.trim();
    match qname.split_once(':') {
        Some((prefix, local)) => Ok(format!("{{{}}}{}", lookup_prefix(prefix, namespaces)?, local)),
        None => Ok(qname.to_string()),
    }
}

fn resolve_prefix_list(
    list: &str,
    namespaces: &HashMap<String, String>,
) -> Result<Vec<String>, XsltError> {
    list.split_whitespace()
        .filter_map(|prefix| {
            if prefix == "#default" {
                namespaces.get("").cloned().map(Ok)
            } else {
                Some(lookup_prefix(prefix, namespaces).map(str::to_string))
            }
        })
        .collect()
}

/// An unprefixed attribute of an XSLT element.
pub fn get_attr_optional(attrs: &OwnedAttributes, name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key.namespace.is_none() && key.local == name)
        .map(|(_, value)| value.clone())
}

pub fn get_attr_required(
    attrs: &OwnedAttributes,
    name: &str,
    element: &str,
    location: Location,
) -> Result<String, XsltError> {
    get_attr_optional(attrs, name).ok_or_else(|| {
        XsltError::compile_at(
            format!(
                "Required attribute '{}' missing on element 'xsl:{}'",
                name, element
            ),
            location,
        )
    })
}

/// An `xsl:`-namespaced attribute of a literal result element.
pub fn get_xslt_attr(attrs: &OwnedAttributes, name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key.is(XSLT_NAMESPACE, name))
        .map(|(_, value)| value.clone())
}

/// `yes` / `no` attribute values.
pub(crate) fn parse_yes_no(
    attrs: &OwnedAttributes,
    name: &str,
) -> Result<Option<bool>, XsltError> {
    match get_attr_optional(attrs, name).as_deref().map(str::trim) {
        None => Ok(None),
        Some("yes") => Ok(Some(true)),
        Some("no") => Ok(Some(false)),
        Some(other) => Err(XsltError::compile(format!(
            "Attribute '{}' must be 'yes' or 'no', got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with(namespaces: &[(&str, &str)]) -> CompilerBuilder {
        let mut builder = CompilerBuilder::default();
        let map = namespaces
            .iter()
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect();
        builder.scopes.push(ElementScope {
            namespaces: Arc::new(map),
            ..ElementScope::default()
        });
        builder
    }

    #[test]
    fn test_parse_avt_parts() {
        let builder = builder_with(&[]);
        assert_eq!(builder.parse_avt("plain").unwrap(), Avt::Static("plain".into()));
        assert_eq!(
            builder.parse_avt("{{literal}}").unwrap(),
            Avt::Static("{literal}".into())
        );
        match builder.parse_avt("a-{@id}-{concat('}', 'x')}").unwrap() {
            Avt::Dynamic(parts) => {
                assert_eq!(parts.len(), 4);
                assert!(matches!(&parts[0], AvtPart::Static(s) if s == "a-"));
                assert!(matches!(&parts[1], AvtPart::Dynamic(x) if x.text == "@id"));
                assert!(matches!(&parts[3], AvtPart::Dynamic(x) if x.text == "concat('}', 'x')"));
            }
            other => panic!("expected a dynamic AVT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_avt_errors() {
        let builder = builder_with(&[]);
        assert!(builder.parse_avt("{@id").is_err());
        assert!(builder.parse_avt("a}b").is_err());
        assert!(builder.parse_avt("{ 1 + }").is_err());
    }

    #[test]
    fn test_expand_qname() {
        let builder = builder_with(&[("m", "urn:modes")]);
        assert_eq!(builder.expand_qname("toc").unwrap(), "toc");
        assert_eq!(builder.expand_qname("m:toc").unwrap(), "{urn:modes}toc");
        assert!(builder.expand_qname("q:toc").is_err());
    }

    #[test]
    fn test_parse_xpath_collects_variables_and_checks_functions() {
        let builder = builder_with(&[]);
        let xpath = builder.parse_xpath("$a + count($b/x) + $a").unwrap();
        assert_eq!(xpath.variables, vec!["a".to_string(), "b".to_string()]);
        assert!(builder.parse_xpath("no-such-function()").is_err());
        assert!(builder.parse_xpath("key('k')").is_err());
        assert!(builder.parse_xpath("current()").is_ok());
    }

    #[test]
    fn test_import_precedence_is_post_order() {
        // 0 imports 1 and 2; 1 imports 3.
        let modules = vec![
            ModuleInfo { imports: vec![1, 2] },
            ModuleInfo { imports: vec![3] },
            ModuleInfo::default(),
            ModuleInfo::default(),
        ];
        let (precedence, floor) = import_precedences(&modules);
        assert_eq!(precedence, vec![4, 2, 3, 1]);
        assert_eq!(floor, vec![1, 1, 3, 1]);
    }
}
