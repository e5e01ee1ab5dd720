//! Character references, predefined entities and attribute-value normalization.

use crate::dtd::{AttType, Dtd};

/// Nested entity references deeper than this are rejected.
pub const MAX_ENTITY_DEPTH: usize = 64;

/// Total characters produced by entity expansion within one document.
pub const MAX_EXPANSION_SIZE: usize = 10 * 1024 * 1024;

pub fn predefined(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => None,
    }
}

/// Decodes the body of a character reference, `#x2F` or `#47` without `&#`.
pub fn char_reference(body: &str) -> Option<char> {
    let code = match body.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => body.parse::<u32>().ok()?,
    };
    char::from_u32(code).filter(|&c| is_xml_char(c))
}

pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Tracks entity expansion within one parse to detect recursion and runaway growth.
#[derive(Debug, Default)]
pub struct ExpansionGuard {
    open: Vec<String>,
    produced: usize,
}

impl ExpansionGuard {
    pub fn enter(&mut self, name: &str, replacement_len: usize) -> Result<(), String> {
        if self.open.iter().any(|n| n == name) {
            return Err(format!("recursive reference to entity '{}'", name));
        }
        if self.open.len() >= MAX_ENTITY_DEPTH {
            return Err(format!("entity '{}' nests too deeply", name));
        }
        self.produced += replacement_len;
        if self.produced > MAX_EXPANSION_SIZE {
            return Err("entity expansion exceeds the size limit".to_string());
        }
        self.open.push(name.to_string());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.open.pop();
    }
}

/// Applies attribute-value normalization to a raw attribute value.
///
/// References are expanded, literal whitespace becomes a space, and values of any
/// type other than CDATA are trimmed with internal runs of spaces collapsed.
pub fn normalize_attribute_value(
    raw: &str,
    att_type: Option<&AttType>,
    dtd: Option<&Dtd>,
    guard: &mut ExpansionGuard,
) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    expand_attribute_text(raw, dtd, guard, &mut out)?;
    match att_type {
        None | Some(AttType::CData) => Ok(out),
        Some(_) => Ok(out.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")),
    }
}

fn expand_attribute_text(
    raw: &str,
    dtd: Option<&Dtd>,
    guard: &mut ExpansionGuard,
    out: &mut String,
) -> Result<(), String> {
    let mut rest = raw;
    while let Some(pos) = rest.find(['&', '\t', '\n', '\r', '<']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with('<') {
            return Err("'<' is not allowed in attribute values".to_string());
        }
        if !tail.starts_with('&') {
            out.push(' ');
            rest = &tail[1..];
            continue;
        }
        let end = tail
            .find(';')
            .ok_or_else(|| "unterminated reference in attribute value".to_string())?;
        let name = &tail[1..end];
        rest = &tail[end + 1..];

        if let Some(body) = name.strip_prefix('#') {
            let c = char_reference(body)
                .ok_or_else(|| format!("invalid character reference '&{};'", name))?;
            out.push(c);
        } else if let Some(c) = predefined(name) {
            out.push(c);
        } else {
            let decl = dtd
                .and_then(|d| d.entities.get(name))
                .ok_or_else(|| format!("undeclared entity '{}'", name))?;
            let Some(text) = decl.value.as_deref() else {
                return Err(format!(
                    "external entity '{}' cannot be referenced in an attribute value",
                    name
                ));
            };
            guard.enter(name, text.len())?;
            let result = expand_attribute_text(text, dtd, guard, out);
            guard.leave();
            result?;
        }
    }
    out.push_str(rest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtd::EntityDecl;

    fn dtd_with(entities: &[(&str, &str)]) -> Dtd {
        let mut dtd = Dtd::default();
        for (name, value) in entities {
            dtd.entities.insert(
                name.to_string(),
                EntityDecl {
                    value: Some(value.to_string()),
                    ..EntityDecl::default()
                },
            );
        }
        dtd
    }

    #[test]
    fn test_char_references() {
        assert_eq!(char_reference("x41"), Some('A'));
        assert_eq!(char_reference("169"), Some('\u{a9}'));
        assert_eq!(char_reference("0"), None);
        assert_eq!(char_reference("xZZ"), None);
    }

    #[test]
    fn test_attribute_normalization() {
        let mut guard = ExpansionGuard::default();
        let v = normalize_attribute_value("a\tb\n&lt;&#x20;c", None, None, &mut guard).unwrap();
        assert_eq!(v, "a b < c");
        let v = normalize_attribute_value("  x   y ", Some(&AttType::NmTokens), None, &mut guard)
            .unwrap();
        assert_eq!(v, "x y");
    }

    #[test]
    fn test_entities_in_attributes() {
        let dtd = dtd_with(&[("who", "&me; too"), ("me", "I")]);
        let mut guard = ExpansionGuard::default();
        let v = normalize_attribute_value("&who;!", None, Some(&dtd), &mut guard).unwrap();
        assert_eq!(v, "I too!");
        assert!(normalize_attribute_value("&nope;", None, Some(&dtd), &mut guard).is_err());
    }

    #[test]
    fn test_recursive_entities_are_rejected() {
        let dtd = dtd_with(&[("a", "&b;"), ("b", "&a;")]);
        let mut guard = ExpansionGuard::default();
        let err = normalize_attribute_value("&a;", None, Some(&dtd), &mut guard).unwrap_err();
        assert!(err.contains("recursive"));
    }
}
