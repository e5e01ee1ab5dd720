//! Defines the registry and built-in implementations for XPath 1.0 functions.

use super::engine::{EvaluationContext, XPathValue, string_to_number};
use crate::ast::Expression;
use crate::datasource::{DataSourceNode, XML_NAMESPACE};
use crate::error::XPathError;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arity {
    min: usize,
    max: Option<usize>,
}

/// The names and arities of the functions an expression may call.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arity>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registers a function taking between `min` and `max` arguments (`None` = unbounded).
    pub fn register(&mut self, name: &str, min: usize, max: Option<usize>) {
        self.functions.insert(name.to_string(), Arity { min, max });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn check_call(&self, name: &str, arg_count: usize) -> Result<(), XPathError> {
        let arity = self
            .functions
            .get(name)
            .ok_or_else(|| XPathError::UnknownFunction(name.to_string()))?;
        let too_many = arity.max.is_some_and(|max| arg_count > max);
        if arg_count < arity.min || too_many {
            let expected = match arity.max {
                Some(max) if max == arity.min => format!("{} argument(s), got {}", max, arg_count),
                Some(max) => format!("{} to {} arguments, got {}", arity.min, max, arg_count),
                None => format!("at least {} arguments, got {}", arity.min, arg_count),
            };
            return Err(XPathError::arity(name, &expected));
        }
        Ok(())
    }

    /// Checks every unprefixed function call in `expr`. Prefixed names belong to
    /// extension namespaces and are only resolved when called.
    pub fn check_expression(&self, expr: &Expression) -> Result<(), XPathError> {
        let mut first_error = None;
        expr.for_each_function_call(&mut |name, arg_count| {
            if first_error.is_none() && !name.contains(':') {
                first_error = self.check_call(name, arg_count).err();
            }
        });
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        let one = Some(1);
        // Node-set
        registry.register("last", 0, Some(0));
        registry.register("position", 0, Some(0));
        registry.register("count", 1, one);
        registry.register("id", 1, one);
        registry.register("local-name", 0, one);
        registry.register("namespace-uri", 0, one);
        registry.register("name", 0, one);
        registry.register("generate-id", 0, one);
        // String
        registry.register("string", 0, one);
        registry.register("concat", 2, None);
        registry.register("starts-with", 2, Some(2));
        registry.register("contains", 2, Some(2));
        registry.register("substring-before", 2, Some(2));
        registry.register("substring-after", 2, Some(2));
        registry.register("substring", 2, Some(3));
        registry.register("string-length", 0, one);
        registry.register("normalize-space", 0, one);
        registry.register("translate", 3, Some(3));
        // Boolean
        registry.register("boolean", 1, one);
        registry.register("not", 1, one);
        registry.register("true", 0, Some(0));
        registry.register("false", 0, Some(0));
        registry.register("lang", 1, one);
        // Number
        registry.register("number", 0, one);
        registry.register("sum", 1, one);
        registry.register("floor", 1, one);
        registry.register("ceiling", 1, one);
        registry.register("round", 1, one);
        registry
    }
}

/// Dispatches a function call to the correct implementation.
pub fn evaluate_function<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    match name {
        // Node-set
        "last" => {
            let [] = fixed::<_, 0>(name, args)?;
            Ok(XPathValue::Number(e_ctx.context_size as f64))
        }
        "position" => {
            let [] = fixed::<_, 0>(name, args)?;
            Ok(XPathValue::Number(e_ctx.context_position as f64))
        }
        "count" => {
            let [nodes] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Number(nodes.into_node_set("count()")?.len() as f64))
        }
        "id" => func_id(args, e_ctx),
        "local-name" => {
            let name = target_node(name, args, e_ctx)?
                .and_then(|n| n.name())
                .map(|q| q.local_part.to_string());
            Ok(XPathValue::String(name.unwrap_or_default()))
        }
        "namespace-uri" => {
            let uri = target_node(name, args, e_ctx)?.and_then(|n| n.namespace_uri());
            Ok(XPathValue::String(uri.unwrap_or_default().to_string()))
        }
        "name" => {
            let name = target_node(name, args, e_ctx)?
                .and_then(|n| n.name())
                .map(|q| q.to_string());
            Ok(XPathValue::String(name.unwrap_or_default()))
        }
        "generate-id" => func_generate_id(args, e_ctx),

        // String
        "string" => Ok(XPathValue::String(string_arg(name, args, e_ctx)?)),
        "concat" => {
            if args.len() < 2 {
                return Err(XPathError::arity(name, "at least 2 arguments"));
            }
            Ok(XPathValue::String(args.iter().map(|v| v.to_string()).collect()))
        }
        "starts-with" => {
            let [s1, s2] = fixed::<_, 2>(name, args)?;
            Ok(XPathValue::Boolean(s1.to_string().starts_with(&s2.to_string())))
        }
        "contains" => {
            let [s1, s2] = fixed::<_, 2>(name, args)?;
            Ok(XPathValue::Boolean(s1.to_string().contains(&s2.to_string())))
        }
        "substring-before" => {
            let [s1, s2] = fixed::<_, 2>(name, args)?;
            let (s1, s2) = (s1.to_string(), s2.to_string());
            let before = s1.find(&s2).map_or("", |index| &s1[..index]);
            Ok(XPathValue::String(before.to_string()))
        }
        "substring-after" => {
            let [s1, s2] = fixed::<_, 2>(name, args)?;
            let (s1, s2) = (s1.to_string(), s2.to_string());
            let after = s1.find(&s2).map_or("", |index| &s1[index + s2.len()..]);
            Ok(XPathValue::String(after.to_string()))
        }
        "substring" => func_substring(args),
        "string-length" => {
            let s = string_arg(name, args, e_ctx)?;
            Ok(XPathValue::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            let s = string_arg(name, args, e_ctx)?;
            Ok(XPathValue::String(normalize_space(&s)))
        }
        "translate" => {
            let [source, from, to] = fixed::<_, 3>(name, args)?;
            Ok(XPathValue::String(translate(
                &source.to_string(),
                &from.to_string(),
                &to.to_string(),
            )))
        }

        // Boolean
        "boolean" => {
            let [value] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Boolean(value.to_bool()))
        }
        "not" => {
            let [value] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Boolean(!value.to_bool()))
        }
        "true" => {
            let [] = fixed::<_, 0>(name, args)?;
            Ok(XPathValue::Boolean(true))
        }
        "false" => {
            let [] = fixed::<_, 0>(name, args)?;
            Ok(XPathValue::Boolean(false))
        }
        "lang" => {
            let [lang] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Boolean(func_lang(&lang.to_string(), e_ctx.context_node)))
        }

        // Number
        "number" => {
            let n = match optional(name, args)? {
                Some(value) => value.to_number(),
                None => string_to_number(&e_ctx.context_node.string_value()),
            };
            Ok(XPathValue::Number(n))
        }
        "sum" => {
            let [nodes] = fixed::<_, 1>(name, args)?;
            let sum = nodes
                .into_node_set("sum()")?
                .iter()
                .map(|node| string_to_number(&node.string_value()))
                .sum();
            Ok(XPathValue::Number(sum))
        }
        "floor" => {
            let [n] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Number(n.to_number().floor()))
        }
        "ceiling" => {
            let [n] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Number(n.to_number().ceil()))
        }
        "round" => {
            let [n] = fixed::<_, 1>(name, args)?;
            Ok(XPathValue::Number(round(n.to_number())))
        }

        _ => match e_ctx.extensions {
            Some(ext) if ext.provides(name) => ext
                .call(name, args, e_ctx)
                .unwrap_or_else(|| Err(XPathError::UnknownFunction(name.to_string()))),
            _ => Err(XPathError::UnknownFunction(name.to_string())),
        },
    }
}

// --- Argument helpers ---

/// Takes exactly `K` arguments.
pub fn fixed<N, const K: usize>(
    function: &str,
    args: Vec<XPathValue<N>>,
) -> Result<[XPathValue<N>; K], XPathError> {
    let count = args.len();
    <[XPathValue<N>; K]>::try_from(args)
        .map_err(|_| XPathError::arity(function, &format!("{} argument(s), got {}", K, count)))
}

/// Takes zero or one argument.
pub fn optional<N>(
    function: &str,
    args: Vec<XPathValue<N>>,
) -> Result<Option<XPathValue<N>>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity(function, "0 or 1 arguments"));
    }
    Ok(args.into_iter().next())
}

/// The string of the single optional argument, defaulting to the context node.
fn string_arg<'a, N: DataSourceNode<'a>>(
    function: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<String, XPathError> {
    Ok(match optional(function, args)? {
        Some(value) => value.to_string(),
        None => e_ctx.context_node.string_value(),
    })
}

/// The first node of the optional node-set argument, defaulting to the context node.
fn target_node<'a, N: DataSourceNode<'a>>(
    function: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Option<N>, XPathError> {
    match optional(function, args)? {
        Some(value) => Ok(value
            .into_node_set(&format!("The argument of {}()", function))?
            .into_iter()
            .min()),
        None => Ok(Some(e_ctx.context_node)),
    }
}

// --- Implementations ---

fn func_id<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    let [arg] = fixed::<_, 1>("id", args)?;
    let tokens = match arg {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .map(|n| n.string_value())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    let mut results: Vec<N> = tokens
        .split_ascii_whitespace()
        .filter_map(|id| e_ctx.context_node.element_by_id(id))
        .collect();
    results.sort();
    results.dedup();
    Ok(XPathValue::NodeSet(results))
}

fn func_generate_id<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    match target_node("generate-id", args, e_ctx)? {
        Some(node) => {
            // DefaultHasher::new() uses fixed keys, so ids are stable across runs.
            let mut hasher = DefaultHasher::new();
            node.hash(&mut hasher);
            // Prefix with a letter to ensure it's a valid XML NCName.
            Ok(XPathValue::String(format!("id{:x}", hasher.finish())))
        }
        None => Ok(XPathValue::String(String::new())),
    }
}

fn func_substring<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let mut args = args.into_iter();
    let (Some(s), Some(start), length, None) = (args.next(), args.next(), args.next(), args.next())
    else {
        return Err(XPathError::arity("substring", "2 or 3 arguments"));
    };
    let s = s.to_string();
    let first = round(start.to_number());
    let last = length.map_or(f64::INFINITY, |l| first + round(l.to_number()));

    let result = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (i + 1) as f64; // XPath positions are 1-based
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XPathValue::String(result))
}

pub fn normalize_space(s: &str) -> String {
    s.split([' ', '\t', '\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn translate(source: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    source
        .chars()
        .filter_map(|c| match from.iter().position(|&fc| fc == c) {
            Some(pos) => to.get(pos).copied(),
            None => Some(c),
        })
        .collect()
}

fn func_lang<'a, N: DataSourceNode<'a>>(lang: &str, context: N) -> bool {
    let test_lang = lang.to_lowercase();
    let mut current = Some(context);
    while let Some(node) = current {
        let declared = node.attributes().find(|attr| {
            attr.name().is_some_and(|q| q.local_part == "lang")
                && (attr.namespace_uri() == Some(XML_NAMESPACE)
                    || attr.name().is_some_and(|q| q.prefix == Some("xml")))
        });
        if let Some(attr) = declared {
            let node_lang = attr.string_value().to_lowercase();
            // "en" matches "en" and "en-GB"; the nearest xml:lang decides.
            return node_lang == test_lang
                || node_lang
                    .strip_prefix(test_lang.as_str())
                    .is_some_and(|rest| rest.starts_with('-'));
        }
        current = node.parent();
    }
    false
}

/// Rounds halves towards positive infinity, preserving NaN, infinities and zero.
pub fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        return n;
    }
    let floor = n.floor();
    let rounded = if n - floor >= 0.5 { floor + 1.0 } else { floor };
    if rounded == 0.0 && n < 0.0 {
        -0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::engine::{ExtensionFunctions, evaluate};
    use crate::parser::parse_expression;

    fn eval_at<'a>(
        tree: &'a MockTree<'a>,
        context_id: usize,
        expr: &str,
    ) -> Result<XPathValue<MockNode<'a>>, XPathError> {
        let funcs = FunctionRegistry::default();
        let vars: HashMap<String, XPathValue<MockNode<'a>>> = HashMap::new();
        let namespaces = HashMap::new();
        let e_ctx = EvaluationContext::new(
            tree.node(context_id),
            tree.node(0),
            &funcs,
            &vars,
            &namespaces,
        );
        evaluate(&parse_expression(expr)?, &e_ctx)
    }

    fn string_of(tree: &MockTree<'_>, expr: &str) -> String {
        eval_at(tree, 0, expr).unwrap().to_string()
    }

    // --- String Function Tests ---

    #[test]
    fn test_string_functions() {
        let tree = create_test_tree();
        assert_eq!(string_of(&tree, "concat('Hello', ' ', 'World', 42)"), "Hello World42");
        assert_eq!(string_of(&tree, "substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(string_of(&tree, "substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(string_of(&tree, "substring-after('abc', 'x')"), "");
        assert_eq!(string_of(&tree, "translate('bar', 'abc', 'ABC')"), "BAr");
        assert_eq!(string_of(&tree, "translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(string_of(&tree, "normalize-space('  a \t b\n ')"), "a b");
        assert_eq!(string_of(&tree, "string-length('héllo')"), "5");
        assert_eq!(string_of(&tree, "starts-with('xslt', 'xs')"), "true");
        assert_eq!(string_of(&tree, "contains('xslt', 'lt')"), "true");
    }

    #[test]
    fn test_substring_edge_cases() {
        let tree = create_test_tree();
        assert_eq!(string_of(&tree, "substring('12345', 2, 3)"), "234");
        assert_eq!(string_of(&tree, "substring('12345', 2)"), "2345");
        assert_eq!(string_of(&tree, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string_of(&tree, "substring('12345', 0, 3)"), "12");
        assert_eq!(string_of(&tree, "substring('12345', 0 div 0, 3)"), "");
        assert_eq!(string_of(&tree, "substring('12345', -42, 1 div 0)"), "12345");
        assert_eq!(string_of(&tree, "substring('12345', -1 div 0, 1 div 0)"), "");
    }

    #[test]
    fn test_node_set_functions() {
        let tree = create_test_tree();
        assert_eq!(string_of(&tree, "count(//para)"), "2");
        assert_eq!(string_of(&tree, "name(//@xml:lang)"), "xml:lang");
        assert_eq!(string_of(&tree, "local-name(//@xml:lang)"), "lang");
        assert_eq!(
            string_of(&tree, "namespace-uri(//@xml:lang)"),
            "http://www.w3.org/XML/1998/namespace"
        );
        assert_eq!(string_of(&tree, "name(/)"), "");
        assert_eq!(string_of(&tree, "sum(//para[1]/@id)"), "NaN");
        assert!(matches!(
            eval_at(&tree, 0, "count('x')"),
            Err(XPathError::TypeError(_))
        ));
    }

    #[test]
    fn test_generate_id_is_stable_and_distinct() {
        let tree = create_test_tree();
        let first = string_of(&tree, "generate-id(//para)");
        assert_eq!(first, string_of(&tree, "generate-id(//para[1])"));
        assert_ne!(first, string_of(&tree, "generate-id(//para[2])"));
        assert!(first.starts_with("id"));
        assert_eq!(string_of(&tree, "generate-id(//missing)"), "");
    }

    #[test]
    fn test_lang() {
        let tree = create_test_tree();
        assert_eq!(eval_at(&tree, 5, "lang('en')").unwrap().to_string(), "true");
        assert_eq!(eval_at(&tree, 5, "lang('EN')").unwrap().to_string(), "true");
        assert_eq!(eval_at(&tree, 5, "lang('e')").unwrap().to_string(), "false");
        assert_eq!(eval_at(&tree, 10, "lang('en')").unwrap().to_string(), "false");
    }

    #[test]
    fn test_number_functions() {
        let tree = create_test_tree();
        assert_eq!(string_of(&tree, "round(2.5)"), "3");
        assert_eq!(string_of(&tree, "round(-2.5)"), "-2");
        assert_eq!(string_of(&tree, "round(-0.2)"), "0");
        assert_eq!(string_of(&tree, "floor(-1.5)"), "-2");
        assert_eq!(string_of(&tree, "ceiling(1.2)"), "2");
        assert_eq!(string_of(&tree, "number('  12 ')"), "12");
        assert_eq!(string_of(&tree, "number('twelve')"), "NaN");
        assert_eq!(string_of(&tree, "boolean(0)"), "false");
        assert_eq!(string_of(&tree, "not(//missing)"), "true");
    }

    #[test]
    fn test_arity_errors() {
        let tree = create_test_tree();
        assert!(matches!(
            eval_at(&tree, 0, "concat('a')"),
            Err(XPathError::FunctionError { .. })
        ));
        assert!(matches!(
            eval_at(&tree, 0, "true(1)"),
            Err(XPathError::FunctionError { .. })
        ));
        assert_eq!(
            eval_at(&tree, 0, "no-such-function()"),
            Err(XPathError::UnknownFunction("no-such-function".to_string()))
        );
    }

    #[test]
    fn test_registry_checks_expressions() {
        let registry = FunctionRegistry::default();
        let ok = parse_expression("count(//a) + string-length(name())").unwrap();
        assert!(registry.check_expression(&ok).is_ok());

        let unknown = parse_expression("//a[frobnicate(.)]").unwrap();
        assert_eq!(
            registry.check_expression(&unknown),
            Err(XPathError::UnknownFunction("frobnicate".to_string()))
        );

        let bad_arity = parse_expression("substring('a')").unwrap();
        assert!(registry.check_expression(&bad_arity).is_err());

        let prefixed = parse_expression("ext:thing()").unwrap();
        assert!(registry.check_expression(&prefixed).is_ok());
    }

    struct Upper;

    impl<'a> ExtensionFunctions<'a, MockNode<'a>> for Upper {
        fn provides(&self, name: &str) -> bool {
            name == "upper"
        }

        fn call(
            &self,
            name: &str,
            args: Vec<XPathValue<MockNode<'a>>>,
            _e_ctx: &EvaluationContext<'a, '_, MockNode<'a>>,
        ) -> Option<Result<XPathValue<MockNode<'a>>, XPathError>> {
            if name != "upper" {
                return None;
            }
            Some(fixed::<_, 1>(name, args).map(|[s]| XPathValue::String(s.to_string().to_uppercase())))
        }
    }

    #[test]
    fn test_extension_functions() {
        let tree = create_test_tree();
        let funcs = FunctionRegistry::default();
        let vars: HashMap<String, XPathValue<MockNode<'_>>> = HashMap::new();
        let namespaces = HashMap::new();
        let upper = Upper;
        let e_ctx = EvaluationContext::new(tree.node(0), tree.node(0), &funcs, &vars, &namespaces)
            .with_extensions(&upper);
        let expr = parse_expression("upper(//para[2])").unwrap();
        assert_eq!(evaluate(&expr, &e_ctx).unwrap().to_string(), "WORLD");
    }
}
