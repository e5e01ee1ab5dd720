//! Defines the `OutputBuilder` trait, which decouples the executor from the concrete
//! result tree.

use xsltr_dom::ExpandedName;

/// The semantic actions of building a result tree, without exposing its node types.
pub trait OutputBuilder {
    fn start_element(&mut self, name: &ExpandedName);
    fn end_element(&mut self);

    /// Adds a namespace node to the currently open element.
    fn add_namespace(&mut self, prefix: &str, uri: &str);

    /// Sets an attribute on the currently open element, replacing one of the same name.
    /// Ignored once the element has children.
    fn add_attribute(&mut self, name: &ExpandedName, value: &str);

    fn add_text(&mut self, text: &str);

    /// Text written to the output exactly as given (`disable-output-escaping`).
    fn add_unescaped_text(&mut self, text: &str);

    fn add_comment(&mut self, text: &str);
    fn add_processing_instruction(&mut self, target: &str, data: &str);
}
