//! The functions XSLT adds to the XPath core library.
//!
//! `generate-id()`, `id()` and `lang()` are already part of the core library; everything
//! else that depends on the stylesheet or the current transformation lives here and is
//! supplied to the evaluator through `ExtensionFunctions`.

use crate::ast::{CompiledStylesheet, DecimalFormatDeclaration, XSLT_NAMESPACE};
use crate::compiler_handlers::INSTRUCTIONS;
use std::collections::HashMap;
use xsltr_xpath1::engine::{EvaluationContext, ExtensionFunctions, XPathValue};
use xsltr_xpath1::functions::fixed;
use xsltr_xpath1::{DataSourceNode, FunctionRegistry, XPathError};

/// Key name to key value to matching nodes, in document order.
pub type KeyIndex<N> = HashMap<String, HashMap<String, Vec<N>>>;

const PROVIDED: &[&str] = &[
    "current",
    "document",
    "element-available",
    "format-number",
    "function-available",
    "key",
    "system-property",
    "unparsed-entity-uri",
];

/// The core library plus the XSLT functions, used to check expressions at compile time.
pub fn xslt_function_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::default();
    let one = Some(1);
    registry.register("current", 0, Some(0));
    registry.register("document", 1, Some(2));
    registry.register("element-available", 1, one);
    registry.register("format-number", 2, Some(3));
    registry.register("function-available", 1, one);
    registry.register("key", 2, Some(2));
    registry.register("system-property", 1, one);
    registry.register("unparsed-entity-uri", 1, one);
    registry
}

/// XSLT functions bound to one point of a transformation.
pub struct XsltFunctions<'s, 'k, N> {
    pub stylesheet: &'s CompiledStylesheet,
    /// The node `current()` returns: the context node of the enclosing instruction.
    pub current: N,
    /// `None` while the key indexes are being built.
    pub keys: Option<&'k KeyIndex<N>>,
}

fn error(function: &str, message: impl Into<String>) -> XPathError {
    XPathError::FunctionError {
        function: format!("{}()", function),
        message: message.into(),
    }
}

/// Expands a QName argument the way stylesheet QNames are expanded.
fn expand_name<'a, N: DataSourceNode<'a>>(
    qname: &str,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<String, XPathError> {
    let qname = qname.trim();
    match qname.split_once(':') {
        Some((prefix, local)) => Ok(format!("{{{}}}{}", e_ctx.resolve_prefix(prefix)?, local)),
        None => Ok(qname.to_string()),
    }
}

impl<'a, N: DataSourceNode<'a> + 'a> ExtensionFunctions<'a, N> for XsltFunctions<'_, '_, N> {
    fn provides(&self, name: &str) -> bool {
        PROVIDED.contains(&name)
    }

    fn call(
        &self,
        name: &str,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Option<Result<XPathValue<N>, XPathError>> {
        let result = match name {
            "current" => fixed::<N, 0>(name, args).map(|_| XPathValue::NodeSet(vec![self.current])),
            "key" => self.key(args, e_ctx),
            "format-number" => self.format_number(args, e_ctx),
            "system-property" => system_property(args, e_ctx),
            "element-available" => element_available(args, e_ctx),
            "function-available" => fixed::<N, 1>(name, args).map(|[arg]| {
                let name = arg.to_string();
                let name = name.trim();
                XPathValue::Boolean(!name.contains(':') && self.stylesheet.functions.contains(name))
            }),
            "unparsed-entity-uri" => fixed::<N, 1>(name, args).map(|[arg]| {
                XPathValue::String(
                    e_ctx
                        .root_node
                        .unparsed_entity_uri(&arg.to_string())
                        .unwrap_or_default(),
                )
            }),
            "document" => Err(error(
                name,
                "loading documents during a transformation is not supported",
            )),
            _ => return None,
        };
        Some(result)
    }
}

impl<'a, N: DataSourceNode<'a> + 'a> XsltFunctions<'_, '_, N> {
    fn key(
        &self,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<XPathValue<N>, XPathError> {
        let [key_name, value] = fixed::<N, 2>("key", args)?;
        let Some(keys) = self.keys else {
            return Err(error("key", "key() may not be used in a key definition"));
        };
        let key_name = expand_name(&key_name.to_string(), e_ctx)?;
        if !self.stylesheet.keys.contains_key(&key_name) {
            return Err(error("key", format!("No xsl:key named '{}'", key_name)));
        }
        let Some(index) = keys.get(&key_name) else {
            return Ok(XPathValue::NodeSet(Vec::new()));
        };
        let lookups: Vec<String> = match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
            other => vec![other.to_string()],
        };
        let mut result: Vec<N> = lookups
            .iter()
            .filter_map(|v| index.get(v))
            .flatten()
            .copied()
            .collect();
        result.sort();
        result.dedup();
        Ok(XPathValue::NodeSet(result))
    }

    fn format_number(
        &self,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<XPathValue<N>, XPathError> {
        let count = args.len();
        let mut args = args.into_iter();
        let (Some(number), Some(picture)) = (args.next(), args.next()) else {
            return Err(error("format-number", format!("Expected 2 or 3 arguments, got {}", count)));
        };
        let format_name = args
            .next()
            .map(|n| expand_name(&n.to_string(), e_ctx))
            .transpose()?;
        let format = self
            .stylesheet
            .decimal_formats
            .get(&format_name)
            .ok_or_else(|| {
                error(
                    "format-number",
                    format!("No xsl:decimal-format named '{}'", format_name.unwrap_or_default()),
                )
            })?;
        format_number(number.to_number(), &picture.to_string(), format)
            .map(XPathValue::String)
    }
}

fn system_property<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    let [arg] = fixed::<N, 1>("system-property", args)?;
    let name = arg.to_string();
    let Some((prefix, local)) = name.trim().split_once(':') else {
        return Ok(XPathValue::String(String::new()));
    };
    if e_ctx.resolve_prefix(prefix)? != XSLT_NAMESPACE {
        return Ok(XPathValue::String(String::new()));
    }
    Ok(match local {
        "version" => XPathValue::Number(1.0),
        "vendor" => XPathValue::String("xsltr".to_string()),
        "vendor-url" => XPathValue::String(env!("CARGO_PKG_REPOSITORY").to_string()),
        _ => XPathValue::String(String::new()),
    })
}

fn element_available<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    let [arg] = fixed::<N, 1>("element-available", args)?;
    let name = arg.to_string();
    let (namespace, local) = match name.trim().split_once(':') {
        Some((prefix, local)) => (Some(e_ctx.resolve_prefix(prefix)?), local),
        None => (e_ctx.namespaces.get("").map(String::as_str), name.trim()),
    };
    Ok(XPathValue::Boolean(
        namespace == Some(XSLT_NAMESPACE) && INSTRUCTIONS.contains(&local),
    ))
}

/// One half of a `format-number` picture.
#[derive(Debug, Default)]
struct SubPicture {
    prefix: String,
    suffix: String,
    min_integer: usize,
    min_fraction: usize,
    max_fraction: usize,
    grouping: Option<usize>,
    multiplier: f64,
}

fn parse_sub_picture(picture: &str, f: &DecimalFormatDeclaration) -> Result<SubPicture, XPathError> {
    let is_active =
        |c: char| c == f.digit || c == f.zero_digit || c == f.grouping_separator || c == f.decimal_separator;
    let chars: Vec<char> = picture.chars().collect();
    let start = chars.iter().position(|&c| is_active(c)).unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|&c| is_active(c))
        .map_or(start, |i| i + 1);

    let mut sub = SubPicture {
        prefix: chars[..start].iter().collect(),
        suffix: chars[end..].iter().collect(),
        multiplier: 1.0,
        ..SubPicture::default()
    };
    if start == end {
        return Err(error(
            "format-number",
            format!("Picture '{}' has no digit placeholders", picture),
        ));
    }
    for c in sub.prefix.chars().chain(sub.suffix.chars()) {
        if c == f.percent {
            sub.multiplier = 100.0;
        } else if c == f.per_mille {
            sub.multiplier = 1000.0;
        }
    }

    let mut seen_decimal = false;
    let mut since_group: Option<usize> = None;
    for &c in &chars[start..end] {
        if c == f.decimal_separator {
            if seen_decimal {
                return Err(error(
                    "format-number",
                    format!("Picture '{}' has more than one decimal separator", picture),
                ));
            }
            seen_decimal = true;
        } else if c == f.grouping_separator {
            if !seen_decimal {
                since_group = Some(0);
            }
        } else if seen_decimal {
            if c == f.zero_digit {
                sub.min_fraction += 1;
            }
            sub.max_fraction += 1;
        } else {
            if c == f.zero_digit {
                sub.min_integer += 1;
            }
            if let Some(n) = since_group.as_mut() {
                *n += 1;
            }
        }
    }
    sub.grouping = since_group.filter(|&n| n > 0);
    Ok(sub)
}

/// Formats `value` with a JDK-style decimal picture, as `format-number()` does.
pub fn format_number(
    value: f64,
    picture: &str,
    f: &DecimalFormatDeclaration,
) -> Result<String, XPathError> {
    if value.is_nan() {
        return Ok(f.nan.clone());
    }
    let mut parts = picture.split(f.pattern_separator);
    let positive = parse_sub_picture(parts.next().unwrap_or_default(), f)?;
    let negative = parts.next().map(|p| parse_sub_picture(p, f)).transpose()?;
    if parts.next().is_some() {
        return Err(error(
            "format-number",
            format!("Picture '{}' has more than one pattern separator", picture),
        ));
    }

    let is_negative = value < 0.0;
    let (prefix, suffix) = match (&negative, is_negative) {
        (Some(neg), true) => (neg.prefix.clone(), neg.suffix.clone()),
        (None, true) => (format!("{}{}", f.minus_sign, positive.prefix), positive.suffix.clone()),
        (_, false) => (positive.prefix.clone(), positive.suffix.clone()),
    };

    let scaled = value.abs() * positive.multiplier;
    if scaled.is_infinite() {
        return Ok(format!("{}{}{}", prefix, f.infinity, suffix));
    }

    let factor = 10f64.powi(positive.max_fraction as i32);
    let rounded = (scaled * factor).round();
    let digits = format!("{:.0}", rounded);
    let digits = if digits.len() <= positive.max_fraction {
        format!("{}{}", "0".repeat(positive.max_fraction + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (integer, fraction) = digits.split_at(digits.len() - positive.max_fraction);

    let mut integer = integer.trim_start_matches('0').to_string();
    if integer.len() < positive.min_integer {
        integer = format!("{}{}", "0".repeat(positive.min_integer - integer.len()), integer);
    }
    let mut fraction = fraction.to_string();
    while fraction.len() > positive.min_fraction && fraction.ends_with('0') {
        fraction.pop();
    }
    if integer.is_empty() && fraction.is_empty() {
        integer.push('0');
    }

    let localize = |d: char| -> char {
        d.to_digit(10)
            .and_then(|n| char::from_u32(f.zero_digit as u32 + n))
            .unwrap_or(d)
    };
    let mut out = prefix;
    let len = integer.len();
    for (i, d) in integer.chars().enumerate() {
        out.push(localize(d));
        let remaining = len - i - 1;
        if let Some(size) = positive.grouping
            && remaining > 0
            && remaining % size == 0
        {
            out.push(f.grouping_separator);
        }
    }
    if !fraction.is_empty() {
        out.push(f.decimal_separator);
        out.extend(fraction.chars().map(localize));
    }
    out.push_str(&suffix);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: f64, picture: &str) -> String {
        format_number(value, picture, &DecimalFormatDeclaration::default()).unwrap()
    }

    #[test]
    fn test_format_number_pictures() {
        assert_eq!(fmt(1234.5, "#,##0.00"), "1,234.50");
        assert_eq!(fmt(0.5, "#.00"), ".50");
        assert_eq!(fmt(3.0, "000"), "003");
        assert_eq!(fmt(2.346, "0.##"), "2.35");
        assert_eq!(fmt(2.5, "0.##"), "2.5");
        assert_eq!(fmt(0.25, "0%"), "25%");
        assert_eq!(fmt(1234567.0, "#,###"), "1,234,567");
        assert_eq!(fmt(12.0, "#"), "12");
    }

    #[test]
    fn test_format_number_negative_and_special() {
        assert_eq!(fmt(-5.0, "0.0"), "-5.0");
        assert_eq!(fmt(-5.0, "0;(0)"), "(5)");
        assert_eq!(fmt(f64::NAN, "0"), "NaN");
        assert_eq!(fmt(f64::INFINITY, "0"), "Infinity");
        assert_eq!(fmt(f64::NEG_INFINITY, "0"), "-Infinity");
    }

    #[test]
    fn test_format_number_custom_symbols() {
        let european = DecimalFormatDeclaration {
            decimal_separator: ',',
            grouping_separator: '.',
            ..DecimalFormatDeclaration::default()
        };
        assert_eq!(
            format_number(1234.5, "#.##0,00", &european).unwrap(),
            "1.234,50"
        );
    }

    #[test]
    fn test_bad_pictures_are_errors() {
        let f = DecimalFormatDeclaration::default();
        assert!(format_number(1.0, "abc", &f).is_err());
        assert!(format_number(1.0, "0.0.0", &f).is_err());
        assert!(format_number(1.0, "0;0;0", &f).is_err());
    }

    #[test]
    fn test_registry_knows_xslt_functions() {
        let registry = xslt_function_registry();
        for name in PROVIDED {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert!(registry.check_call("key", 1).is_err());
        assert!(registry.contains("concat"));
    }
}
