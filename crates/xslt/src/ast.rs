//! XSLT 1.0 abstract syntax tree types.
//!
//! The compiler turns stylesheet documents into these types and the executor interprets
//! them against a source tree.
//!
//! # Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CompiledStylesheet`] | Everything the executor needs, merged across imported modules |
//! | [`XsltInstruction`] | One instruction of a template body |
//! | [`TemplateRule`] | A match template for one pattern alternative |
//! | [`ModeRules`] | The template rules of one mode, pre-sorted for dispatch |
//! | [`CompiledXPath`] | An expression with the namespace context it was written in |
//! | [`Avt`] | Attribute value template (static or dynamic) |

use crate::pattern::Pattern;
use std::collections::HashMap;
use std::sync::Arc;
use xsltr_dom::{ExpandedName, Location};
use xsltr_xpath1::{Expression, FunctionRegistry};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// An XPath expression compiled in the namespace context of the stylesheet element
/// that held it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledXPath {
    pub expr: Expression,
    pub text: String,
    /// In-scope prefixes, `""` holding the default namespace. XPath itself never
    /// consults the default namespace.
    pub namespaces: Arc<HashMap<String, String>>,
    /// Names of the variables referenced anywhere in the expression.
    pub variables: Vec<String>,
}

impl CompiledXPath {
    /// The variable name when the whole expression is a single `$name`.
    pub fn as_variable(&self) -> Option<&str> {
        match &self.expr {
            Expression::Variable(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Avt {
    Static(String),
    Dynamic(Vec<AvtPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Static(String),
    Dynamic(CompiledXPath),
}

impl Avt {
    pub fn as_static(&self) -> Option<&str> {
        match self {
            Avt::Static(s) => Some(s),
            Avt::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparsedTemplate(pub Vec<XsltInstruction>);

impl PreparsedTemplate {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How a variable, parameter or passed parameter gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Select(CompiledXPath),
    /// A result tree fragment built from the content.
    Content(PreparsedTemplate),
    /// Neither `select` nor content: the empty string.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithParam {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: CompiledXPath,
    pub order: Avt,
    pub data_type: Avt,
    pub case_order: Avt,
    pub lang: Option<Avt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub test: CompiledXPath,
    pub body: PreparsedTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralAttribute {
    pub name: ExpandedName,
    pub value: Avt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLevel {
    Single,
    Multiple,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberInstruction {
    pub level: NumberLevel,
    pub count: Option<Pattern>,
    pub from: Option<Pattern>,
    pub value: Option<CompiledXPath>,
    pub format: Avt,
    pub lang: Option<Avt>,
    pub letter_value: Option<Avt>,
    pub grouping_separator: Option<Avt>,
    pub grouping_size: Option<Avt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XsltInstruction {
    Text {
        text: String,
        disable_escaping: bool,
    },
    LiteralElement {
        name: ExpandedName,
        /// Namespace nodes to copy, excluding the XSLT namespace and excluded prefixes.
        namespaces: Vec<(String, String)>,
        attributes: Vec<LiteralAttribute>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    ValueOf {
        select: CompiledXPath,
        disable_escaping: bool,
    },
    CopyOf {
        select: CompiledXPath,
    },
    Copy {
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    ApplyTemplates {
        select: Option<CompiledXPath>,
        mode: Option<String>,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam>,
    },
    CallTemplate {
        name: String,
        params: Vec<WithParam>,
    },
    ApplyImports,
    ForEach {
        select: CompiledXPath,
        sort_keys: Vec<SortKey>,
        body: PreparsedTemplate,
    },
    If {
        test: CompiledXPath,
        body: PreparsedTemplate,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<PreparsedTemplate>,
    },
    Variable {
        name: String,
        value: VariableValue,
    },
    Element {
        name: Avt,
        namespace: Option<Avt>,
        /// Prefix bindings for resolving a prefixed computed name.
        in_scope: Arc<HashMap<String, String>>,
        use_attribute_sets: Vec<String>,
        body: PreparsedTemplate,
    },
    Attribute {
        name: Avt,
        namespace: Option<Avt>,
        in_scope: Arc<HashMap<String, String>>,
        body: PreparsedTemplate,
    },
    Comment {
        body: PreparsedTemplate,
    },
    ProcessingInstruction {
        name: Avt,
        body: PreparsedTemplate,
    },
    Number(Box<NumberInstruction>),
    Message {
        body: PreparsedTemplate,
        terminate: bool,
    },
    /// An instruction this processor does not implement, met in forwards-compatible
    /// mode or in an extension namespace. Its `xsl:fallback` children run in its place.
    Unsupported {
        name: String,
        fallback: Option<PreparsedTemplate>,
        location: Location,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: PreparsedTemplate,
    pub location: Location,
}

/// One alternative of a template's match pattern, with everything dispatch needs.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    pub pattern: Pattern,
    pub priority: f64,
    pub mode: Option<String>,
    pub import_precedence: usize,
    /// The lowest precedence among the modules imported, directly or not, by the
    /// module this rule belongs to. `xsl:apply-imports` searches `[floor, precedence)`.
    pub import_floor: usize,
    /// Declaration order across the whole stylesheet.
    pub order: usize,
    pub template: Arc<Template>,
}

/// The rules of one mode, each index list sorted best candidate first.
#[derive(Debug, Clone, Default)]
pub struct ModeRules {
    pub rules: Vec<TemplateRule>,
    /// Rules whose pattern ends in a name test, keyed by local name.
    pub by_name: HashMap<String, Vec<usize>>,
    /// Every other rule.
    pub generic: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub value: VariableValue,
    pub is_param: bool,
    pub import_precedence: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyDeclaration {
    pub name: String,
    pub pattern: Pattern,
    pub use_expr: CompiledXPath,
}

/// An attribute set: its `xsl:attribute` instructions plus the sets it uses, applied
/// first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeSet {
    pub use_attribute_sets: Vec<String>,
    pub attributes: Vec<XsltInstruction>,
}

/// `xsl:namespace-alias`: the namespace literal results are written in, by the
/// stylesheet namespace that stands for it.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceAlias {
    pub result_prefix: Option<String>,
    pub result_namespace: Option<String>,
    pub import_precedence: usize,
}

/// The element names an `xsl:strip-space` / `xsl:preserve-space` entry covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    Namespace(String),
    Name {
        namespace: Option<String>,
        local: String,
    },
}

impl NameTest {
    pub fn matches(&self, name: &ExpandedName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.namespace.as_deref() == Some(uri.as_str()),
            NameTest::Name { namespace, local } => {
                name.local == *local && name.namespace == *namespace
            }
        }
    }

    /// Default priority, as for the equivalent pattern.
    pub fn priority(&self) -> f64 {
        match self {
            NameTest::Any => -0.5,
            NameTest::Namespace(_) => -0.25,
            NameTest::Name { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpaceRule {
    pub test: NameTest,
    pub strip: bool,
    pub import_precedence: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMethod {
    Xml,
    Html,
    Text,
}

/// `xsl:output`, merged across declarations: later and higher-precedence values win.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputDeclaration {
    /// `None` picks html or xml from the result tree.
    pub method: Option<OutputMethod>,
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub omit_xml_declaration: Option<bool>,
    pub standalone: Option<bool>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub cdata_section_elements: Vec<ExpandedName>,
    pub indent: Option<bool>,
    pub media_type: Option<String>,
}

impl OutputDeclaration {
    /// Overlays the attributes `other` sets. CDATA section lists accumulate.
    pub fn merge_from(&mut self, other: &OutputDeclaration) {
        fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }
        overlay(&mut self.method, &other.method);
        overlay(&mut self.version, &other.version);
        overlay(&mut self.encoding, &other.encoding);
        overlay(&mut self.omit_xml_declaration, &other.omit_xml_declaration);
        overlay(&mut self.standalone, &other.standalone);
        overlay(&mut self.doctype_public, &other.doctype_public);
        overlay(&mut self.doctype_system, &other.doctype_system);
        overlay(&mut self.indent, &other.indent);
        overlay(&mut self.media_type, &other.media_type);
        for name in &other.cdata_section_elements {
            if !self.cdata_section_elements.contains(name) {
                self.cdata_section_elements.push(name.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecimalFormatDeclaration {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormatDeclaration {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

/// A fully compiled stylesheet, shareable across threads and transformations.
#[derive(Debug, Clone)]
pub struct CompiledStylesheet {
    pub version: String,
    pub modes: HashMap<Option<String>, ModeRules>,
    pub named_templates: HashMap<String, Arc<Template>>,
    pub global_variables: HashMap<String, GlobalVariable>,
    pub keys: HashMap<String, Vec<KeyDeclaration>>,
    pub attribute_sets: HashMap<String, AttributeSet>,
    /// Keyed by expanded name, `None` for the unnamed format.
    pub decimal_formats: HashMap<Option<String>, DecimalFormatDeclaration>,
    pub output: OutputDeclaration,
    pub space_rules: Vec<SpaceRule>,
    /// Keyed by stylesheet namespace URI, `""` for no namespace.
    pub namespace_aliases: HashMap<String, NamespaceAlias>,
    /// Core functions plus the XSLT additions, for compile-time checks.
    pub functions: Arc<FunctionRegistry>,
}

impl CompiledStylesheet {
    /// Whether whitespace-only text children of `name` are stripped from the source.
    /// The best rule by precedence, then priority, then declaration order decides.
    pub fn strips_whitespace(&self, name: &ExpandedName) -> bool {
        let mut best: Option<(&SpaceRule, usize)> = None;
        for (index, rule) in self.space_rules.iter().enumerate() {
            if !rule.test.matches(name) {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, _)) => {
                    (rule.import_precedence, rule.test.priority())
                        >= (current.import_precedence, current.test.priority())
                }
            };
            if better {
                best = Some((rule, index));
            }
        }
        best.is_some_and(|(rule, _)| rule.strip)
    }

    pub fn has_strip_rules(&self) -> bool {
        self.space_rules.iter().any(|r| r.strip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stylesheet_with(space_rules: Vec<SpaceRule>) -> CompiledStylesheet {
        CompiledStylesheet {
            version: "1.0".to_string(),
            modes: HashMap::new(),
            named_templates: HashMap::new(),
            global_variables: HashMap::new(),
            keys: HashMap::new(),
            attribute_sets: HashMap::new(),
            decimal_formats: HashMap::new(),
            output: OutputDeclaration::default(),
            space_rules,
            namespace_aliases: HashMap::new(),
            functions: Arc::new(FunctionRegistry::default()),
        }
    }

    fn rule(test: NameTest, strip: bool, import_precedence: usize) -> SpaceRule {
        SpaceRule {
            test,
            strip,
            import_precedence,
        }
    }

    #[test]
    fn test_specific_preserve_beats_strip_all() {
        let s = stylesheet_with(vec![
            rule(NameTest::Any, true, 1),
            rule(
                NameTest::Name {
                    namespace: None,
                    local: "pre".into(),
                },
                false,
                1,
            ),
        ]);
        assert!(s.strips_whitespace(&ExpandedName::local("p")));
        assert!(!s.strips_whitespace(&ExpandedName::local("pre")));
    }

    #[test]
    fn test_higher_precedence_space_rule_wins() {
        let name = NameTest::Name {
            namespace: None,
            local: "p".into(),
        };
        let s = stylesheet_with(vec![rule(NameTest::Any, false, 2), rule(name, true, 1)]);
        assert!(!s.strips_whitespace(&ExpandedName::local("p")));
        assert!(s.has_strip_rules());
    }

    #[test]
    fn test_output_merge_overlays_set_values() {
        let mut base = OutputDeclaration {
            method: Some(OutputMethod::Xml),
            indent: Some(false),
            cdata_section_elements: vec![ExpandedName::local("a")],
            ..Default::default()
        };
        let later = OutputDeclaration {
            indent: Some(true),
            encoding: Some("ISO-8859-1".into()),
            cdata_section_elements: vec![ExpandedName::local("a"), ExpandedName::local("b")],
            ..Default::default()
        };
        base.merge_from(&later);
        assert_eq!(base.method, Some(OutputMethod::Xml));
        assert_eq!(base.indent, Some(true));
        assert_eq!(base.encoding.as_deref(), Some("ISO-8859-1"));
        assert_eq!(base.cdata_section_elements.len(), 2);
    }
}
