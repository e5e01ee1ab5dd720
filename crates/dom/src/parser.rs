//! Drives `quick-xml` over a document and builds the resolved node tree.
//!
//! The reader reports raw events; everything the XML and Namespaces recommendations
//! layer on top (entity expansion, attribute defaults and normalization, namespace
//! resolution, ID registration) happens here.

use crate::document::{Document, ExpandedName, NodeId};
use crate::dtd::{self, Dtd, EntityDecl};
use crate::entities::{self, ExpansionGuard};
use crate::error::{DomError, Location};
use crate::{validate, xinclude};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use std::borrow::Cow;
use std::time::Instant;
use xsltr_traits::{ResourceProvider, resolve_uri};
use xsltr_xpath1::XML_NAMESPACE;

const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// How a document is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Replace XInclude elements with the content they reference.
    pub process_xincludes: bool,
    /// Fetch the external DTD subset and external entities.
    pub load_external_subsets: bool,
    /// Validate against the document's DTD. Implies loading the external subset.
    pub validate: bool,
    /// URI of the document, for resolving relative references.
    pub base_uri: Option<String>,
}

impl ParseOptions {
    fn loads_external(&self) -> bool {
        self.load_external_subsets || self.validate
    }
}

/// Parses, validates and XInclude-processes a document according to `options`.
pub fn parse(
    text: &str,
    options: &ParseOptions,
    resources: &dyn ResourceProvider,
) -> Result<Document, DomError> {
    let start = Instant::now();
    let mut doc = parse_tree(text, options, resources)?;
    if options.validate {
        validate::validate(&doc)?;
    }
    if options.process_xincludes {
        doc = xinclude::process(doc, options, resources)?;
    }
    log::debug!(
        "Parsed document {:?} into {} nodes in {:?}",
        options.base_uri.as_deref().unwrap_or("<string>"),
        doc.len(),
        start.elapsed()
    );
    Ok(doc)
}

/// Well-formedness parsing only: no validation and no XInclude processing.
pub(crate) fn parse_tree(
    text: &str,
    options: &ParseOptions,
    resources: &dyn ResourceProvider,
) -> Result<Document, DomError> {
    let text = normalize_newlines(text.strip_prefix('\u{FEFF}').unwrap_or(text));
    let mut builder = TreeBuilder::new(&text, options, resources);
    builder.feed(&text, None)?;
    builder.finish()
}

pub(crate) fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Splits `prefix:local`. Names with an empty part or more than one colon are rejected.
pub(crate) fn split_qname(qname: &str) -> Result<(Option<&str>, &str), String> {
    match qname.split_once(':') {
        None => Ok((None, qname)),
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() && !local.contains(':') => {
            Ok((Some(prefix), local))
        }
        Some(_) => Err(format!("'{}' is not a valid qualified name", qname)),
    }
}

/// Byte offsets of line starts, for turning reader positions into locations.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn locate(&self, text: &str, pos: usize) -> Location {
        let line = self.starts.partition_point(|&s| s <= pos);
        let line_start = self.starts[line.saturating_sub(1)];
        let col = text
            .get(line_start..pos)
            .map_or(pos - line_start, |s| s.chars().count());
        Location { line, col: col + 1 }
    }
}

struct OpenElement {
    id: NodeId,
    scope_mark: usize,
}

struct TreeBuilder<'o> {
    doc: Document,
    dtd: Option<Dtd>,
    options: &'o ParseOptions,
    resources: &'o dyn ResourceProvider,
    index: LineIndex,
    open: Vec<OpenElement>,
    /// In-scope namespace bindings, innermost last.
    scopes: Vec<(String, String)>,
    guard: ExpansionGuard,
    seen_root: bool,
}

impl<'o> TreeBuilder<'o> {
    fn new(text: &str, options: &'o ParseOptions, resources: &'o dyn ResourceProvider) -> Self {
        Self {
            doc: Document::new().with_uri(options.base_uri.clone()),
            dtd: None,
            options,
            resources,
            index: LineIndex::new(text),
            open: Vec::new(),
            scopes: Vec::new(),
            guard: ExpansionGuard::default(),
            seen_root: false,
        }
    }

    fn finish(mut self) -> Result<Document, DomError> {
        if !self.seen_root {
            return Err(DomError::parse(
                "document has no root element",
                self.index.locate("", 0),
            ));
        }
        self.doc.set_dtd(self.dtd.take());
        Ok(self.doc)
    }

    /// Reads `text` as content. `at` is `Some` when the text is the replacement text of
    /// an entity; every node it produces takes the location of the reference.
    fn feed(&mut self, text: &str, at: Option<Location>) -> Result<(), DomError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_comments = true;
        let depth_at_start = self.open.len();
        let mut buf = Vec::new();

        loop {
            let pos = reader.buffer_position() as usize;
            let loc = at.unwrap_or_else(|| self.index.locate(text, pos));
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    let err_pos = reader.error_position() as usize;
                    let err_loc = at.unwrap_or_else(|| self.index.locate(text, err_pos));
                    return Err(DomError::parse(e.to_string(), err_loc));
                }
            };
            match event {
                XmlEvent::Start(e) => self.start_element(&e, loc)?,
                XmlEvent::Empty(e) => {
                    self.start_element(&e, loc)?;
                    self.end_element(depth_at_start, loc)?;
                }
                XmlEvent::End(_) => self.end_element(depth_at_start, loc)?,
                XmlEvent::Text(e) => self.text(utf8(&e, loc)?, loc)?,
                XmlEvent::CData(e) => self.character_data(utf8(&e, loc)?, loc)?,
                XmlEvent::GeneralRef(e) => self.reference(utf8(&e, loc)?, loc)?,
                XmlEvent::Comment(e) => {
                    let parent = self.current_parent();
                    self.doc.append_comment(parent, utf8(&e, loc)?.to_string(), loc);
                }
                XmlEvent::PI(e) => {
                    let raw = utf8(&e, loc)?;
                    let (target, data) = raw
                        .split_once(|c: char| c.is_ascii_whitespace())
                        .unwrap_or((raw, ""));
                    let parent = self.current_parent();
                    self.doc.append_processing_instruction(
                        parent,
                        target.to_string(),
                        data.trim_start().to_string(),
                        loc,
                    );
                }
                XmlEvent::DocType(e) => {
                    if at.is_some() || self.seen_root || self.dtd.is_some() {
                        return Err(DomError::parse("misplaced DOCTYPE declaration", loc));
                    }
                    self.doctype(utf8(&e, loc)?, loc)?;
                }
                XmlEvent::Decl(_) => {}
                XmlEvent::Eof => break,
            }
            buf.clear();
        }

        if self.open.len() != depth_at_start {
            let message = if at.is_some() {
                "entity replacement text is not balanced content"
            } else {
                "unclosed element at end of document"
            };
            let loc = at.unwrap_or_else(|| self.index.locate(text, text.len()));
            return Err(DomError::parse(message, loc));
        }
        Ok(())
    }

    fn current_parent(&self) -> NodeId {
        self.open.last().map_or(NodeId::ROOT, |e| e.id)
    }

    fn doctype(&mut self, body: &str, loc: Location) -> Result<(), DomError> {
        let decl = dtd::parse_doctype(body).map_err(|m| DomError::parse(m, loc))?;
        let mut dtd = Dtd {
            name: decl.name.to_string(),
            public_id: decl.public_id.map(str::to_string),
            system_id: decl.system_id.map(str::to_string),
            ..Dtd::default()
        };

        let base = self.options.base_uri.clone();
        let loads_external = self.options.loads_external();
        let resources = self.resources;
        let mut fetch_error = None;
        let mut load = |entity: &EntityDecl| -> Result<Option<String>, String> {
            let Some(system) = entity.system_id.as_deref().filter(|_| loads_external) else {
                return Ok(None);
            };
            let uri = resolve_uri(system, entity.base_uri.as_deref().or(base.as_deref()));
            log::debug!("Loading external parameter entity '{}'", uri);
            match resources.load_text(&uri) {
                Ok(text) => Ok(Some(normalize_newlines(&text).into_owned())),
                Err(e) => {
                    let message = e.to_string();
                    fetch_error = Some(DomError::fetch(uri, e));
                    Err(message)
                }
            }
        };

        if let Some(subset) = decl.internal_subset {
            dtd::parse_subset(subset, &mut dtd, base.as_deref(), &mut load)
                .map_err(|m| DomError::parse(m, loc))?;
        }

        if let Some(system) = decl.system_id {
            if loads_external {
                let uri = resolve_uri(system, base.as_deref());
                log::debug!("Loading external DTD subset '{}'", uri);
                let text = resources
                    .load_text(&uri)
                    .map_err(|e| DomError::fetch(&uri, e))?;
                let text = normalize_newlines(&text);
                dtd::parse_subset(&text, &mut dtd, Some(&uri), &mut load)
                    .map_err(|m| DomError::parse(format!("in '{}': {}", uri, m), loc))?;
            } else {
                log::debug!("External DTD subset '{}' not loaded", system);
            }
        }

        if let Some(err) = fetch_error {
            return Err(err);
        }
        self.dtd = Some(dtd);
        Ok(())
    }

    fn start_element(&mut self, e: &BytesStart<'_>, loc: Location) -> Result<(), DomError> {
        let qname = utf8(e.name().into_inner(), loc)?.to_string();
        if self.open.is_empty() {
            if self.seen_root {
                return Err(DomError::parse(
                    format!("content after the document element: <{}>", qname),
                    loc,
                ));
            }
            self.seen_root = true;
        }

        let dtd = self.dtd.as_ref();
        let mut raw: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| DomError::parse(err.to_string(), loc))?;
            let key = utf8(attr.key.into_inner(), loc)?;
            let value = utf8(&attr.value, loc)?;
            let att_type = dtd.and_then(|d| d.attribute(&qname, key)).map(|d| &d.att_type);
            let value = entities::normalize_attribute_value(value, att_type, dtd, &mut self.guard)
                .map_err(|m| DomError::parse(m, loc))?;
            raw.push((key.to_string(), value));
        }
        if let Some(defs) = dtd.and_then(|d| d.attlists.get(&qname)) {
            for def in defs {
                if let Some(default) = def.default.value()
                    && !raw.iter().any(|(k, _)| *k == def.name)
                {
                    let value = entities::normalize_attribute_value(
                        default,
                        Some(&def.att_type),
                        dtd,
                        &mut self.guard,
                    )
                    .map_err(|m| DomError::parse(m, loc))?;
                    raw.push((def.name.clone(), value));
                }
            }
        }

        let scope_mark = self.scopes.len();
        let mut declared = Vec::new();
        let mut attributes = Vec::new();
        for (key, value) in raw {
            let prefix = if key == "xmlns" {
                Some("")
            } else {
                key.strip_prefix("xmlns:")
            };
            match prefix {
                Some(prefix) => {
                    check_binding(prefix, &value).map_err(|m| DomError::parse(m, loc))?;
                    self.scopes.push((prefix.to_string(), value.clone()));
                    declared.push((prefix.to_string(), value));
                }
                None => attributes.push((key, value)),
            }
        }

        let (prefix, local) = split_qname(&qname).map_err(|m| DomError::parse(m, loc))?;
        let namespace = self.resolve(prefix, false, loc)?;
        let name = ExpandedName::new(prefix, local, namespace.as_deref());

        let mut resolved = Vec::with_capacity(attributes.len());
        for (key, value) in attributes {
            let (prefix, local) = split_qname(&key).map_err(|m| DomError::parse(m, loc))?;
            let namespace = self.resolve(prefix, true, loc)?;
            let attr_name = ExpandedName::new(prefix, local, namespace.as_deref());
            if resolved
                .iter()
                .any(|(n, _, _): &(ExpandedName, String, bool)| {
                    n.local == attr_name.local && n.namespace == attr_name.namespace
                })
            {
                return Err(DomError::parse(
                    format!("duplicate attribute '{}' on <{}>", key, qname),
                    loc,
                ));
            }
            let is_id = attr_name.is(XML_NAMESPACE, "id")
                || self
                    .dtd
                    .as_ref()
                    .and_then(|d| d.attribute(&qname, &key))
                    .is_some_and(|d| d.att_type == dtd::AttType::Id);
            resolved.push((attr_name, value, is_id));
        }

        let parent = self.current_parent();
        let id = self.doc.append_element(parent, name, declared, loc);
        for (name, value, is_id) in resolved {
            self.doc.append_attribute(id, name, value, is_id, loc);
        }
        self.open.push(OpenElement { id, scope_mark });
        Ok(())
    }

    fn end_element(&mut self, floor: usize, loc: Location) -> Result<(), DomError> {
        if self.open.len() <= floor {
            return Err(DomError::parse(
                "end tag does not match an element opened in the same entity",
                loc,
            ));
        }
        if let Some(element) = self.open.pop() {
            self.scopes.truncate(element.scope_mark);
        }
        Ok(())
    }

    fn resolve(
        &self,
        prefix: Option<&str>,
        is_attribute: bool,
        loc: Location,
    ) -> Result<Option<String>, DomError> {
        match prefix {
            None if is_attribute => Ok(None),
            None => Ok(self
                .scopes
                .iter()
                .rev()
                .find(|(p, _)| p.is_empty())
                .map(|(_, uri)| uri.clone())
                .filter(|uri| !uri.is_empty())),
            Some("xml") => Ok(Some(XML_NAMESPACE.to_string())),
            Some(prefix) => self
                .scopes
                .iter()
                .rev()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| Some(uri.clone()))
                .ok_or_else(|| {
                    DomError::parse(format!("namespace prefix '{}' is not bound", prefix), loc)
                }),
        }
    }

    fn text(&mut self, raw: &str, loc: Location) -> Result<(), DomError> {
        // References normally arrive as separate events; handle any left in the text.
        let mut rest = raw;
        while let Some(pos) = rest.find('&') {
            self.character_data(&rest[..pos], loc)?;
            let tail = &rest[pos + 1..];
            let end = tail
                .find(';')
                .ok_or_else(|| DomError::parse("unterminated entity reference", loc))?;
            self.reference(&tail[..end], loc)?;
            rest = &tail[end + 1..];
        }
        self.character_data(rest, loc)
    }

    fn character_data(&mut self, text: &str, loc: Location) -> Result<(), DomError> {
        match self.open.last() {
            Some(top) => {
                self.doc.append_text(top.id, text, loc);
                Ok(())
            }
            None if text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')) => Ok(()),
            None => Err(DomError::parse(
                "text is not allowed outside the document element",
                loc,
            )),
        }
    }

    fn reference(&mut self, name: &str, loc: Location) -> Result<(), DomError> {
        if let Some(body) = name.strip_prefix('#') {
            let c = entities::char_reference(body).ok_or_else(|| {
                DomError::parse(format!("invalid character reference '&{};'", name), loc)
            })?;
            return self.character_data(c.encode_utf8(&mut [0; 4]), loc);
        }
        if let Some(c) = entities::predefined(name) {
            return self.character_data(c.encode_utf8(&mut [0; 4]), loc);
        }
        if self.open.is_empty() {
            return Err(DomError::parse(
                format!("entity reference '&{};' outside the document element", name),
                loc,
            ));
        }

        let decl = self
            .dtd
            .as_ref()
            .and_then(|d| d.entities.get(name))
            .cloned()
            .ok_or_else(|| DomError::parse(format!("undeclared entity '{}'", name), loc))?;
        if decl.notation.is_some() {
            return Err(DomError::parse(
                format!("reference to unparsed entity '{}'", name),
                loc,
            ));
        }
        let text = match decl.value {
            Some(value) => value,
            None => match self.load_external_entity(name, &decl)? {
                Some(text) => text,
                None => return Ok(()),
            },
        };

        self.guard
            .enter(name, text.len())
            .map_err(|m| DomError::parse(m, loc))?;
        let result = self.feed(&text, Some(loc));
        self.guard.leave();
        result
    }

    fn load_external_entity(
        &self,
        name: &str,
        decl: &EntityDecl,
    ) -> Result<Option<String>, DomError> {
        let system = match decl.system_id.as_deref() {
            Some(system) if self.options.loads_external() => system,
            _ => {
                log::warn!("External entity '{}' not loaded; reference dropped", name);
                return Ok(None);
            }
        };
        let base = decl.base_uri.as_deref().or(self.options.base_uri.as_deref());
        let uri = resolve_uri(system, base);
        let text = self
            .resources
            .load_text(&uri)
            .map_err(|e| DomError::fetch(&uri, e))?;
        Ok(Some(normalize_newlines(&text).into_owned()))
    }
}

fn check_binding(prefix: &str, uri: &str) -> Result<(), String> {
    if prefix == "xmlns" || uri == XMLNS_NAMESPACE {
        return Err("the 'xmlns' prefix and namespace cannot be declared".to_string());
    }
    if (prefix == "xml") != (uri == XML_NAMESPACE) {
        return Err("the 'xml' prefix is bound to the XML namespace only".to_string());
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(format!("prefix '{}' cannot be undeclared", prefix));
    }
    Ok(())
}

fn utf8(bytes: &[u8], loc: Location) -> Result<&str, DomError> {
    std::str::from_utf8(bytes).map_err(|e| DomError::parse(e.to_string(), loc))
}
