//! DTD validation of a parsed document.

use crate::document::{Document, Node, NodeKind};
use crate::dtd::{
    AttDefault, AttType, ContentParticle, ContentSpec, Dtd, Occurrence, ParticleKind,
};
use crate::error::DomError;
use std::collections::{BTreeSet, HashSet};

/// Validation stops collecting after this many violations.
const MAX_REPORTED: usize = 10;

/// Checks `doc` against its DTD. A document without a DOCTYPE passes.
pub fn validate(doc: &Document) -> Result<(), DomError> {
    let Some(dtd) = doc.dtd() else {
        log::warn!("Validation requested but the document has no DOCTYPE; nothing to check");
        return Ok(());
    };

    let mut validator = Validator {
        dtd,
        errors: Vec::new(),
        ids: HashSet::new(),
        idrefs: Vec::new(),
    };

    if let Some(root) = doc.document_element() {
        let name = root.expanded_name().map(|n| n.qualified()).unwrap_or_default();
        if name != dtd.name {
            validator.report(format!(
                "root element <{}> does not match DOCTYPE name '{}'",
                name, dtd.name
            ));
        }
        validator.element(root);
    }

    let Validator {
        mut errors,
        ids,
        idrefs,
        ..
    } = validator;
    for (value, loc) in idrefs {
        if !ids.contains(&value) && errors.len() < MAX_REPORTED {
            errors.push(format!("IDREF '{}' at {} matches no ID", value, loc));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        log::debug!("Validation failed with {} violations", errors.len());
        Err(DomError::Validation(errors))
    }
}

struct Validator<'d> {
    dtd: &'d Dtd,
    errors: Vec<String>,
    ids: HashSet<String>,
    idrefs: Vec<(String, crate::error::Location)>,
}

impl Validator<'_> {
    fn report(&mut self, message: String) {
        if self.errors.len() < MAX_REPORTED {
            self.errors.push(message);
        }
    }

    fn element(&mut self, node: Node<'_>) {
        let (name, declared_namespaces) = match node.kind() {
            NodeKind::Element { name, namespaces } => (name.qualified(), namespaces),
            _ => return,
        };
        let loc = node.location();
        let dtd = self.dtd;

        match dtd.elements.get(&name) {
            None => self.report(format!("element <{}> at {} is not declared", name, loc)),
            Some(spec) => self.content(node, &name, spec),
        }

        for attr in node.attribute_nodes() {
            self.attribute(&name, attr);
        }

        if let Some(defs) = dtd.attlists.get(&name) {
            for def in defs.iter().filter(|d| d.default == AttDefault::Required) {
                let present = match def.name.strip_prefix("xmlns") {
                    Some("") => declared_namespaces.iter().any(|(p, _)| p.is_empty()),
                    Some(rest) if rest.starts_with(':') => {
                        declared_namespaces.iter().any(|(p, _)| *p == rest[1..])
                    }
                    _ => node
                        .attribute_nodes()
                        .any(|a| a.expanded_name().is_some_and(|n| n.qualified() == def.name)),
                };
                if !present {
                    self.report(format!(
                        "element <{}> at {} lacks required attribute '{}'",
                        name, loc, def.name
                    ));
                }
            }
        }

        for child in node.child_nodes() {
            self.element(child);
        }
    }

    fn content(&mut self, node: Node<'_>, name: &str, spec: &ContentSpec) {
        let mut children = Vec::new();
        let mut has_text = false;
        let mut has_any = false;
        for child in node.child_nodes() {
            match child.kind() {
                NodeKind::Element { name, .. } => {
                    has_any = true;
                    children.push(name.qualified());
                }
                NodeKind::Text(t) => {
                    has_any = true;
                    if !t.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')) {
                        has_text = true;
                    }
                }
                _ => {}
            }
        }
        let loc = node.location();

        match spec {
            ContentSpec::Any => {}
            ContentSpec::Empty => {
                if has_any {
                    self.report(format!("element <{}> at {} must be empty", name, loc));
                }
            }
            ContentSpec::Mixed(allowed) => {
                for child in &children {
                    if !allowed.contains(child) {
                        self.report(format!(
                            "element <{}> is not allowed in <{}> at {}",
                            child, name, loc
                        ));
                    }
                }
            }
            ContentSpec::Children(model) => {
                if has_text {
                    self.report(format!(
                        "element <{}> at {} has text in element-only content",
                        name, loc
                    ));
                }
                if !matches_model(model, &children) {
                    self.report(format!(
                        "content of <{}> at {} ({}) does not match its declaration",
                        name,
                        loc,
                        children.join(", ")
                    ));
                }
            }
        }
    }

    fn attribute(&mut self, element: &str, attr: Node<'_>) {
        let NodeKind::Attribute { name, value, .. } = attr.kind() else {
            return;
        };
        let attr_name = name.qualified();
        let loc = attr.location();
        let dtd = self.dtd;
        let Some(def) = dtd.attribute(element, &attr_name) else {
            self.report(format!(
                "attribute '{}' of <{}> at {} is not declared",
                attr_name, element, loc
            ));
            return;
        };

        if let AttDefault::Fixed(fixed) = &def.default
            && fixed != value
        {
            self.report(format!(
                "attribute '{}' of <{}> must have the fixed value '{}'",
                attr_name, element, fixed
            ));
        }

        match &def.att_type {
            AttType::CData => {}
            AttType::Id => {
                if !is_name(value) {
                    self.report(format!("ID value '{}' at {} is not a name", value, loc));
                } else if !self.ids.insert(value.clone()) {
                    self.report(format!("ID value '{}' at {} is not unique", value, loc));
                }
            }
            AttType::IdRef => self.idrefs.push((value.clone(), loc)),
            AttType::IdRefs => {
                for token in value.split(' ').filter(|t| !t.is_empty()) {
                    self.idrefs.push((token.to_string(), loc));
                }
            }
            AttType::Entity | AttType::Entities => {
                for token in value.split(' ').filter(|t| !t.is_empty()) {
                    let unparsed = dtd
                        .entities
                        .get(token)
                        .is_some_and(|e| e.notation.is_some());
                    if !unparsed {
                        self.report(format!(
                            "attribute '{}' names '{}', which is not an unparsed entity",
                            attr_name, token
                        ));
                    }
                }
            }
            AttType::NmToken | AttType::NmTokens => {
                if value.is_empty()
                    || !value
                        .split(' ')
                        .all(|t| !t.is_empty() && t.chars().all(crate::dtd::is_name_char))
                {
                    self.report(format!(
                        "attribute '{}' value '{}' is not a name token",
                        attr_name, value
                    ));
                }
            }
            AttType::Notation(allowed) | AttType::Enumeration(allowed) => {
                if !allowed.contains(value) {
                    self.report(format!(
                        "attribute '{}' of <{}> has value '{}', expected one of {}",
                        attr_name,
                        element,
                        value,
                        allowed.join("|")
                    ));
                }
            }
        }
    }
}

fn is_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(crate::dtd::is_name_start) && chars.all(crate::dtd::is_name_char)
}

/// Whether the element names `children` form a sentence of the content model.
fn matches_model(model: &ContentParticle, children: &[String]) -> bool {
    let start = BTreeSet::from([0]);
    advance(model, children, &start).contains(&children.len())
}

/// The positions reachable by matching `particle` from each position in `from`.
fn advance(particle: &ContentParticle, names: &[String], from: &BTreeSet<usize>) -> BTreeSet<usize> {
    let once = |set: &BTreeSet<usize>| -> BTreeSet<usize> {
        match &particle.kind {
            ParticleKind::Name(n) => set
                .iter()
                .filter(|&&i| names.get(i) == Some(n))
                .map(|i| i + 1)
                .collect(),
            ParticleKind::Seq(parts) => parts
                .iter()
                .fold(set.clone(), |acc, p| advance(p, names, &acc)),
            ParticleKind::Choice(parts) => parts
                .iter()
                .flat_map(|p| advance(p, names, set))
                .collect(),
        }
    };
    let repeat = |seed: BTreeSet<usize>| {
        let mut reached = seed.clone();
        let mut frontier = seed;
        loop {
            let next: BTreeSet<usize> = once(&frontier).difference(&reached).copied().collect();
            if next.is_empty() {
                return reached;
            }
            reached.extend(next.iter().copied());
            frontier = next;
        }
    };

    match particle.occurrence {
        Occurrence::Once => once(from),
        Occurrence::Optional => from.union(&once(from)).copied().collect(),
        Occurrence::ZeroOrMore => repeat(from.clone()),
        Occurrence::OneOrMore => repeat(once(from)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse};
    use xsltr_traits::InMemoryResourceProvider;

    fn check(text: &str) -> Result<(), DomError> {
        let options = ParseOptions {
            validate: true,
            ..ParseOptions::default()
        };
        parse(text, &options, &InMemoryResourceProvider::new()).map(|_| ())
    }

    const DTD: &str = r#"<!DOCTYPE book [
        <!ELEMENT book (title, chapter+, appendix?)>
        <!ELEMENT title (#PCDATA)>
        <!ELEMENT chapter (#PCDATA | em)*>
        <!ELEMENT appendix EMPTY>
        <!ELEMENT em (#PCDATA)>
        <!ATTLIST book lang (en|fr) "en">
        <!ATTLIST chapter id ID #REQUIRED see IDREF #IMPLIED>
    ]>"#;

    #[test]
    fn test_valid_document() {
        let doc = format!(
            "{}<book><title>T</title><chapter id='c1'>a <em>b</em></chapter>\
             <chapter id='c2' see='c1'/><appendix/></book>",
            DTD
        );
        assert!(check(&doc).is_ok());
    }

    #[test]
    fn test_missing_required_attribute() {
        let doc = format!("{}<book><title>T</title><chapter/></book>", DTD);
        let Err(DomError::Validation(errors)) = check(&doc) else {
            panic!("Expected a validation error");
        };
        assert!(errors[0].contains("required attribute 'id'"));
    }

    #[test]
    fn test_content_model_violations() {
        let no_chapter = format!("{}<book><title>T</title></book>", DTD);
        assert!(check(&no_chapter).is_err());
        let wrong_order = format!("{}<book><chapter id='a'/><title>T</title></book>", DTD);
        assert!(check(&wrong_order).is_err());
        let text_in_elements = format!("{}<book>oops<title/><chapter id='a'/></book>", DTD);
        assert!(check(&text_in_elements).is_err());
        let not_empty = format!("{}<book><title/><chapter id='a'/><appendix>x</appendix></book>", DTD);
        assert!(check(&not_empty).is_err());
    }

    #[test]
    fn test_attribute_violations() {
        let bad_enum = format!("{}<book lang='de'><title/><chapter id='a'/></book>", DTD);
        assert!(check(&bad_enum).is_err());
        let dup_id = format!("{}<book><title/><chapter id='a'/><chapter id='a'/></book>", DTD);
        assert!(check(&dup_id).is_err());
        let dangling = format!("{}<book><title/><chapter id='a' see='zz'/></book>", DTD);
        assert!(check(&dangling).is_err());
        let undeclared = format!("{}<book extra='1'><title/><chapter id='a'/></book>", DTD);
        assert!(check(&undeclared).is_err());
    }

    #[test]
    fn test_root_name_must_match_doctype() {
        assert!(check("<!DOCTYPE a [<!ELEMENT b EMPTY>]><b/>").is_err());
    }

    #[test]
    fn test_document_without_doctype_passes() {
        assert!(check("<anything><goes/></anything>").is_ok());
    }

    #[test]
    fn test_model_matching() {
        let spec = |text: &str| {
            let mut dtd = Dtd::default();
            crate::dtd::parse_subset(text, &mut dtd, None, &mut |_| Ok(None)).unwrap();
            match dtd.elements.remove("x") {
                Some(ContentSpec::Children(cp)) => cp,
                other => panic!("unexpected {:?}", other),
            }
        };
        let names = |s: &str| s.split(' ').filter(|n| !n.is_empty()).map(String::from).collect::<Vec<_>>();

        let model = spec("<!ELEMENT x ((a | b)*, c)>");
        assert!(matches_model(&model, &names("c")));
        assert!(matches_model(&model, &names("a b a c")));
        assert!(!matches_model(&model, &names("a b")));

        let model = spec("<!ELEMENT x (a?, b+)>");
        assert!(matches_model(&model, &names("b b")));
        assert!(matches_model(&model, &names("a b")));
        assert!(!matches_model(&model, &names("a")));
        assert!(!matches_model(&model, &names("a a b")));
    }
}
