//! DTD declarations and a `nom` parser for internal and external subsets.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{map, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
};
use std::collections::HashMap;

type PResult<'a, O> = IResult<&'a str, O>;

/// Nesting limit for parameter entities and conditional sections.
const MAX_SUBSET_DEPTH: usize = 16;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dtd {
    /// The name given in `<!DOCTYPE name ...>`, which the root element must carry.
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub elements: HashMap<String, ContentSpec>,
    pub attlists: HashMap<String, Vec<AttDef>>,
    pub entities: HashMap<String, EntityDecl>,
    pub parameter_entities: HashMap<String, EntityDecl>,
    pub notations: HashMap<String, NotationDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA | a | b)*`; the names that may be mixed with text.
    Mixed(Vec<String>),
    Children(ContentParticle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentParticle {
    pub kind: ParticleKind,
    pub occurrence: Occurrence,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParticleKind {
    Name(String),
    Seq(Vec<ContentParticle>),
    Choice(Vec<ContentParticle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttDef {
    pub name: String,
    pub att_type: AttType,
    pub default: AttDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

impl AttDefault {
    pub fn value(&self) -> Option<&str> {
        match self {
            AttDefault::Fixed(v) | AttDefault::Default(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDecl {
    /// Replacement text of an internal entity, with character references expanded.
    pub value: Option<String>,
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    /// `NDATA` notation of an unparsed entity.
    pub notation: Option<String>,
    /// URI of the subset the declaration came from, for resolving `system_id`.
    pub base_uri: Option<String>,
}

impl EntityDecl {
    pub fn is_external(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotationDecl {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
}

/// The parts of a `<!DOCTYPE ...>` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctypeDecl<'s> {
    pub name: &'s str,
    pub public_id: Option<&'s str>,
    pub system_id: Option<&'s str>,
    pub internal_subset: Option<&'s str>,
}

impl Dtd {
    pub fn attribute(&self, element: &str, attribute: &str) -> Option<&AttDef> {
        self.attlists
            .get(element)?
            .iter()
            .find(|def| def.name == attribute)
    }

    /// Whether any element declares `attribute` as type ID.
    pub fn id_attribute(&self, element: &str) -> Option<&str> {
        self.attlists
            .get(element)?
            .iter()
            .find(|def| def.att_type == AttType::Id)
            .map(|def| def.name.as_str())
    }

    fn add(&mut self, decl: Markup, base_uri: Option<&str>) {
        // The first declaration of anything wins; the internal subset is read first.
        match decl {
            Markup::Element(name, spec) => {
                self.elements.entry(name).or_insert(spec);
            }
            Markup::AttList(element, defs) => {
                let list = self.attlists.entry(element).or_default();
                for def in defs {
                    if !list.iter().any(|d| d.name == def.name) {
                        list.push(def);
                    }
                }
            }
            Markup::Entity {
                name,
                parameter,
                mut decl,
            } => {
                decl.base_uri = base_uri.map(str::to_string);
                let map = if parameter {
                    &mut self.parameter_entities
                } else {
                    &mut self.entities
                };
                map.entry(name).or_insert(decl);
            }
            Markup::Notation(name, decl) => {
                self.notations.entry(name).or_insert(decl);
            }
        }
    }
}

/// Loads external parameter entities during subset parsing.
pub type ExternalLoader<'l> = dyn FnMut(&EntityDecl) -> Result<Option<String>, String> + 'l;

/// Parses the declarations of a subset into `dtd`.
///
/// `base_uri` is the URI of the subset itself. External parameter entities are
/// fetched through `load`, which returns `None` when loading is disabled.
pub fn parse_subset(
    input: &str,
    dtd: &mut Dtd,
    base_uri: Option<&str>,
    load: &mut ExternalLoader<'_>,
) -> Result<(), String> {
    parse_subset_at(input, dtd, base_uri, load, 0)
}

fn parse_subset_at(
    input: &str,
    dtd: &mut Dtd,
    base_uri: Option<&str>,
    load: &mut ExternalLoader<'_>,
    depth: usize,
) -> Result<(), String> {
    if depth > MAX_SUBSET_DEPTH {
        return Err("parameter entities nest too deeply".to_string());
    }
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(is_xml_space);
        if rest.is_empty() {
            return Ok(());
        }

        if let Some(after) = rest.strip_prefix('%') {
            let (after, name) = terminated(xml_name, char(';'))
                .parse(after)
                .map_err(|_| format!("malformed parameter entity reference near '{}'", snippet(rest)))?;
            let text = parameter_entity_text(name, dtd, load)?;
            parse_subset_at(&text, dtd, base_uri, load, depth + 1)?;
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix("<![") {
            let (after, include, body) = conditional_section(after, dtd, load)?;
            if include {
                parse_subset_at(body, dtd, base_uri, load, depth + 1)?;
            }
            rest = after;
            continue;
        }

        if rest.starts_with("<!--") {
            let (after, _) = comment(rest).map_err(|_| unterminated(rest))?;
            rest = after;
            continue;
        }
        if rest.starts_with("<?") {
            let (after, _) = processing_instruction(rest).map_err(|_| unterminated(rest))?;
            rest = after;
            continue;
        }

        if !rest.starts_with("<!") {
            return Err(format!("unexpected content in DTD near '{}'", snippet(rest)));
        }
        let end = declaration_end(rest).ok_or_else(|| unterminated(rest))?;
        let raw = &rest[..end];
        let expanded;
        let text = if has_parameter_reference(raw) {
            expanded = expand_parameter_references(raw, dtd, load, depth)?;
            expanded.as_str()
        } else {
            raw
        };
        match markup_declaration(text) {
            Ok((remaining, decl)) if remaining.trim_matches(is_xml_space).is_empty() => {
                dtd.add(decl, base_uri)
            }
            _ => return Err(format!("malformed declaration '{}'", snippet(raw))),
        }
        rest = &rest[end..];
    }
}

fn snippet(s: &str) -> String {
    s.chars().take(40).collect()
}

fn unterminated(s: &str) -> String {
    format!("unterminated declaration '{}'", snippet(s))
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn parameter_entity_text(
    name: &str,
    dtd: &Dtd,
    load: &mut ExternalLoader<'_>,
) -> Result<String, String> {
    let decl = dtd
        .parameter_entities
        .get(name)
        .ok_or_else(|| format!("undeclared parameter entity '%{};'", name))?;
    match &decl.value {
        Some(v) => Ok(v.clone()),
        None => Ok(load(decl)?.unwrap_or_default()),
    }
}

/// The byte offset just past the `>` that closes the declaration starting `s`.
fn declaration_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Whether a declaration contains `%name;` outside of the `<!ENTITY %` keyword.
fn has_parameter_reference(decl: &str) -> bool {
    decl.char_indices()
        .any(|(i, c)| c == '%' && decl[i + 1..].starts_with(|n: char| is_name_start(n)))
}

fn expand_parameter_references(
    decl: &str,
    dtd: &Dtd,
    load: &mut ExternalLoader<'_>,
    depth: usize,
) -> Result<String, String> {
    if depth > MAX_SUBSET_DEPTH {
        return Err("parameter entities nest too deeply".to_string());
    }
    let mut out = String::with_capacity(decl.len());
    let mut rest = decl;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match terminated(xml_name, char(';')).parse(after) {
            Ok((tail, name)) => {
                let text = parameter_entity_text(name, dtd, load)?;
                let text = expand_parameter_references(&text, dtd, load, depth + 1)?;
                out.push(' ');
                out.push_str(&text);
                out.push(' ');
                rest = tail;
            }
            Err(_) => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Parses the keyword and body of `<![INCLUDE[ ... ]]>`, with `<![` already consumed.
fn conditional_section<'s>(
    input: &'s str,
    dtd: &Dtd,
    load: &mut ExternalLoader<'_>,
) -> Result<(&'s str, bool, &'s str), String> {
    let open = input
        .find('[')
        .ok_or_else(|| "malformed conditional section".to_string())?;
    let keyword = input[..open].trim_matches(is_xml_space);
    let keyword = match keyword.strip_prefix('%').and_then(|k| k.strip_suffix(';')) {
        Some(pe) => parameter_entity_text(pe, dtd, load)?.trim().to_string(),
        None => keyword.to_string(),
    };
    let include = match keyword.as_str() {
        "INCLUDE" => true,
        "IGNORE" => false,
        other => return Err(format!("unknown conditional section keyword '{}'", other)),
    };
    let body_start = open + 1;
    let mut depth = 1;
    let mut i = body_start;
    while i < input.len() {
        let rest = &input[i..];
        if rest.starts_with("<![") {
            depth += 1;
            i += 3;
        } else if rest.starts_with("]]>") {
            depth -= 1;
            if depth == 0 {
                return Ok((&input[i + 3..], include, &input[body_start..i]));
            }
            i += 3;
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    Err("unterminated conditional section".to_string())
}

/// Expands character references in an entity literal; other references stay as written.
fn expand_char_refs(literal: &str) -> Result<String, String> {
    let mut out = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        let end = after
            .find(';')
            .ok_or_else(|| format!("unterminated character reference in '{}'", literal))?;
        let c = crate::entities::char_reference(&after[2..end])
            .ok_or_else(|| format!("invalid character reference '{}'", &after[..=end]))?;
        out.push(c);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// --- Parsers ---

enum Markup {
    Element(String, ContentSpec),
    AttList(String, Vec<AttDef>),
    Entity {
        name: String,
        parameter: bool,
        decl: EntityDecl,
    },
    Notation(String, NotationDecl),
}

pub(crate) fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.' | '\u{B7}')
}

fn xml_name(input: &str) -> PResult<'_, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(input)
}

fn nmtoken(input: &str) -> PResult<'_, &str> {
    take_while1(is_name_char).parse(input)
}

fn quoted(input: &str) -> PResult<'_, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))
    .parse(input)
}

fn comment(input: &str) -> PResult<'_, &str> {
    delimited(tag("<!--"), take_until("-->"), tag("-->")).parse(input)
}

fn processing_instruction(input: &str) -> PResult<'_, &str> {
    delimited(tag("<?"), take_until("?>"), tag("?>")).parse(input)
}

fn markup_declaration(input: &str) -> PResult<'_, Markup> {
    alt((element_decl, attlist_decl, entity_decl, notation_decl)).parse(input)
}

fn element_decl(input: &str) -> PResult<'_, Markup> {
    let (input, _) = pair(tag("<!ELEMENT"), multispace1).parse(input)?;
    let (input, name) = xml_name(input)?;
    let (input, _) = multispace1(input)?;
    let (input, spec) = content_spec(input)?;
    let (input, _) = pair(multispace0, char('>')).parse(input)?;
    Ok((input, Markup::Element(name.to_string(), spec)))
}

fn content_spec(input: &str) -> PResult<'_, ContentSpec> {
    alt((
        value(ContentSpec::Empty, tag("EMPTY")),
        value(ContentSpec::Any, tag("ANY")),
        mixed,
        map(content_particle, ContentSpec::Children),
    ))
    .parse(input)
}

fn mixed(input: &str) -> PResult<'_, ContentSpec> {
    let (input, _) = (char('('), multispace0, tag("#PCDATA")).parse(input)?;
    let (input, names) = many0(preceded(
        (multispace0, char('|'), multispace0),
        xml_name,
    ))
    .parse(input)?;
    let (input, _) = pair(multispace0, char(')')).parse(input)?;
    let (input, star) = opt(char('*')).parse(input)?;
    if !names.is_empty() && star.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }
    Ok((
        input,
        ContentSpec::Mixed(names.into_iter().map(str::to_string).collect()),
    ))
}

fn occurrence(input: &str) -> PResult<'_, Occurrence> {
    map(opt(alt((char('?'), char('*'), char('+')))), |c| match c {
        Some('?') => Occurrence::Optional,
        Some('*') => Occurrence::ZeroOrMore,
        Some('+') => Occurrence::OneOrMore,
        _ => Occurrence::Once,
    })
    .parse(input)
}

fn content_particle(input: &str) -> PResult<'_, ContentParticle> {
    let (input, kind) = alt((
        map(xml_name, |n| ParticleKind::Name(n.to_string())),
        group,
    ))
    .parse(input)?;
    let (input, occurrence) = occurrence(input)?;
    Ok((input, ContentParticle { kind, occurrence }))
}

fn group(input: &str) -> PResult<'_, ParticleKind> {
    let (input, _) = pair(char('('), multispace0).parse(input)?;
    let (input, first) = content_particle(input)?;
    let (input, rest) = many0(pair(
        delimited(multispace0, alt((char('|'), char(','))), multispace0),
        content_particle,
    ))
    .parse(input)?;
    let (input, _) = pair(multispace0, char(')')).parse(input)?;

    let separator = rest.first().map(|(sep, _)| *sep);
    if rest.iter().any(|(sep, _)| Some(*sep) != separator) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let mut particles = vec![first];
    particles.extend(rest.into_iter().map(|(_, cp)| cp));
    Ok((
        input,
        if separator == Some('|') {
            ParticleKind::Choice(particles)
        } else {
            ParticleKind::Seq(particles)
        },
    ))
}

fn attlist_decl(input: &str) -> PResult<'_, Markup> {
    let (input, _) = pair(tag("<!ATTLIST"), multispace1).parse(input)?;
    let (input, element) = xml_name(input)?;
    let (input, defs) = many0(preceded(multispace1, att_def)).parse(input)?;
    let (input, _) = pair(multispace0, char('>')).parse(input)?;
    Ok((input, Markup::AttList(element.to_string(), defs)))
}

fn att_def(input: &str) -> PResult<'_, AttDef> {
    let (input, name) = xml_name(input)?;
    let (input, _) = multispace1(input)?;
    let (input, att_type) = att_type(input)?;
    let (input, _) = multispace1(input)?;
    let (input, default) = att_default(input)?;
    Ok((
        input,
        AttDef {
            name: name.to_string(),
            att_type,
            default,
        },
    ))
}

fn enumeration(input: &str) -> PResult<'_, Vec<String>> {
    let (input, _) = pair(char('('), multispace0).parse(input)?;
    let (input, first) = nmtoken(input)?;
    let (input, rest) =
        many0(preceded((multispace0, char('|'), multispace0), nmtoken)).parse(input)?;
    let (input, _) = pair(multispace0, char(')')).parse(input)?;
    let mut values = vec![first.to_string()];
    values.extend(rest.into_iter().map(str::to_string));
    Ok((input, values))
}

fn att_type(input: &str) -> PResult<'_, AttType> {
    alt((
        value(AttType::CData, tag("CDATA")),
        value(AttType::IdRefs, tag("IDREFS")),
        value(AttType::IdRef, tag("IDREF")),
        value(AttType::Id, tag("ID")),
        value(AttType::Entities, tag("ENTITIES")),
        value(AttType::Entity, tag("ENTITY")),
        value(AttType::NmTokens, tag("NMTOKENS")),
        value(AttType::NmToken, tag("NMTOKEN")),
        map(
            preceded(pair(tag("NOTATION"), multispace1), enumeration),
            AttType::Notation,
        ),
        map(enumeration, AttType::Enumeration),
    ))
    .parse(input)
}

fn att_default(input: &str) -> PResult<'_, AttDefault> {
    alt((
        value(AttDefault::Required, tag("#REQUIRED")),
        value(AttDefault::Implied, tag("#IMPLIED")),
        map(preceded(pair(tag("#FIXED"), multispace1), quoted), |v| {
            AttDefault::Fixed(v.to_string())
        }),
        map(quoted, |v| AttDefault::Default(v.to_string())),
    ))
    .parse(input)
}

/// `SYSTEM "uri"` or `PUBLIC "id" "uri"`; notations may omit the PUBLIC system literal.
fn external_id(input: &str) -> PResult<'_, (Option<&str>, Option<&str>)> {
    alt((
        map(preceded(pair(tag("SYSTEM"), multispace1), quoted), |s| {
            (None, Some(s))
        }),
        map(
            (
                preceded(pair(tag("PUBLIC"), multispace1), quoted),
                opt(preceded(multispace1, quoted)),
            ),
            |(p, s)| (Some(p), s),
        ),
    ))
    .parse(input)
}

fn entity_decl(input: &str) -> PResult<'_, Markup> {
    let (input, _) = pair(tag("<!ENTITY"), multispace1).parse(input)?;
    let (input, parameter) = opt(terminated(char('%'), multispace1)).parse(input)?;
    let (input, name) = xml_name(input)?;
    let (input, _) = multispace1(input)?;

    if let Ok((input, literal)) = quoted(input) {
        let (input, _) = pair(multispace0, char('>')).parse(input)?;
        let value = expand_char_refs(literal).map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
        })?;
        return Ok((
            input,
            Markup::Entity {
                name: name.to_string(),
                parameter: parameter.is_some(),
                decl: EntityDecl {
                    value: Some(value),
                    ..EntityDecl::default()
                },
            },
        ));
    }

    let (input, (public_id, system_id)) = external_id(input)?;
    let (input, notation) = opt(preceded(
        (multispace1, tag("NDATA"), multispace1),
        xml_name,
    ))
    .parse(input)?;
    let (input, _) = pair(multispace0, char('>')).parse(input)?;
    Ok((
        input,
        Markup::Entity {
            name: name.to_string(),
            parameter: parameter.is_some(),
            decl: EntityDecl {
                value: None,
                system_id: system_id.map(str::to_string),
                public_id: public_id.map(str::to_string),
                notation: notation.map(str::to_string),
                base_uri: None,
            },
        },
    ))
}

fn notation_decl(input: &str) -> PResult<'_, Markup> {
    let (input, _) = pair(tag("<!NOTATION"), multispace1).parse(input)?;
    let (input, name) = xml_name(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (public_id, system_id)) = external_id(input)?;
    let (input, _) = pair(multispace0, char('>')).parse(input)?;
    Ok((
        input,
        Markup::Notation(
            name.to_string(),
            NotationDecl {
                system_id: system_id.map(str::to_string),
                public_id: public_id.map(str::to_string),
            },
        ),
    ))
}

/// Parses the body of a DOCTYPE declaration, everything between `<!DOCTYPE` and the final `>`.
pub fn parse_doctype(input: &str) -> Result<DoctypeDecl<'_>, String> {
    let body = input.trim_matches(is_xml_space);
    let parsed: PResult<'_, (&str, Option<(Option<&str>, Option<&str>)>)> =
        (xml_name, opt(preceded(multispace1, external_id))).parse(body);
    let (rest, (name, ids)) =
        parsed.map_err(|_| format!("malformed DOCTYPE declaration '{}'", snippet(body)))?;
    let (public_id, system_id) = ids.unwrap_or((None, None));

    let rest = rest.trim_matches(is_xml_space);
    let internal_subset = if rest.is_empty() {
        None
    } else if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(inner)
    } else {
        return Err(format!("unexpected content in DOCTYPE: '{}'", snippet(rest)));
    };

    Ok(DoctypeDecl {
        name,
        public_id,
        system_id,
        internal_subset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Dtd {
        let mut dtd = Dtd::default();
        parse_subset(input, &mut dtd, None, &mut |_| Ok(None)).unwrap();
        dtd
    }

    #[test]
    fn test_element_declarations() {
        let dtd = parse(
            r#"<!ELEMENT doc (head, body+)>
               <!ELEMENT head (#PCDATA)>
               <!ELEMENT body (#PCDATA | em | b)*>
               <!ELEMENT br EMPTY>
               <!ELEMENT any ANY>
               <!ELEMENT list ((item | sep)*, end?)>"#,
        );
        assert_eq!(dtd.elements["br"], ContentSpec::Empty);
        assert_eq!(dtd.elements["any"], ContentSpec::Any);
        assert_eq!(dtd.elements["head"], ContentSpec::Mixed(vec![]));
        assert_eq!(
            dtd.elements["body"],
            ContentSpec::Mixed(vec!["em".to_string(), "b".to_string()])
        );
        let ContentSpec::Children(doc) = &dtd.elements["doc"] else {
            panic!("Expected a children model");
        };
        let ParticleKind::Seq(parts) = &doc.kind else {
            panic!("Expected a sequence");
        };
        assert_eq!(parts[1].occurrence, Occurrence::OneOrMore);
        assert!(matches!(&dtd.elements["list"], ContentSpec::Children(_)));
    }

    #[test]
    fn test_attlist_declarations() {
        let dtd = parse(
            r#"<!ATTLIST item
                 id ID #REQUIRED
                 kind (a|b|c) "a"
                 version CDATA #FIXED "1.0"
                 refs IDREFS #IMPLIED>"#,
        );
        let defs = &dtd.attlists["item"];
        assert_eq!(defs.len(), 4);
        assert_eq!(dtd.id_attribute("item"), Some("id"));
        assert_eq!(dtd.attribute("item", "kind").unwrap().default.value(), Some("a"));
        assert_eq!(
            dtd.attribute("item", "version").unwrap().default,
            AttDefault::Fixed("1.0".to_string())
        );
        assert_eq!(dtd.attribute("item", "refs").unwrap().att_type, AttType::IdRefs);
    }

    #[test]
    fn test_entity_declarations() {
        let dtd = parse(
            r#"<!ENTITY copy "&#169; 2024">
               <!ENTITY chap SYSTEM "chap1.xml">
               <!ENTITY logo SYSTEM "logo.gif" NDATA gif>
               <!NOTATION gif PUBLIC "-//GIF//EN">
               <!ENTITY copy "ignored">"#,
        );
        assert_eq!(dtd.entities["copy"].value.as_deref(), Some("\u{a9} 2024"));
        assert!(dtd.entities["chap"].is_external());
        assert_eq!(dtd.entities["logo"].notation.as_deref(), Some("gif"));
        assert!(dtd.notations.contains_key("gif"));
    }

    #[test]
    fn test_parameter_entities() {
        let dtd = parse(
            r#"<!ENTITY % inline "em | b">
               <!ENTITY % decls "<!ELEMENT em (#PCDATA)>">
               %decls;
               <!ELEMENT p (#PCDATA | %inline;)*>"#,
        );
        assert_eq!(dtd.elements["em"], ContentSpec::Mixed(vec![]));
        assert_eq!(
            dtd.elements["p"],
            ContentSpec::Mixed(vec!["em".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_conditional_sections() {
        let dtd = parse(
            r#"<![INCLUDE[ <!ELEMENT a EMPTY> ]]>
               <![IGNORE[ <!ELEMENT b EMPTY> ]]>"#,
        );
        assert!(dtd.elements.contains_key("a"));
        assert!(!dtd.elements.contains_key("b"));
    }

    #[test]
    fn test_comments_and_errors() {
        let dtd = parse("<!-- note --> <?pi data?> <!ELEMENT a EMPTY>");
        assert!(dtd.elements.contains_key("a"));

        let mut dtd = Dtd::default();
        assert!(parse_subset("<!ELEMENT a (b, c | d)>", &mut dtd, None, &mut |_| Ok(None)).is_err());
        assert!(parse_subset("%undeclared;", &mut dtd, None, &mut |_| Ok(None)).is_err());
        assert!(parse_subset("<!ELEMENT a", &mut dtd, None, &mut |_| Ok(None)).is_err());
    }

    #[test]
    fn test_parse_doctype() {
        let d = parse_doctype(r#" doc SYSTEM "doc.dtd" [ <!ENTITY x "y"> ]"#).unwrap();
        assert_eq!(d.name, "doc");
        assert_eq!(d.system_id, Some("doc.dtd"));
        assert_eq!(d.internal_subset.map(str::trim), Some(r#"<!ENTITY x "y">"#));

        let d = parse_doctype(r#"html PUBLIC "-//W3C//DTD XHTML 1.0//EN" "x.dtd""#).unwrap();
        assert_eq!(d.public_id, Some("-//W3C//DTD XHTML 1.0//EN"));
        assert!(d.internal_subset.is_none());
    }
}
