//! Instruction handlers for the template executor, one module per instruction family.

pub(crate) mod apply_templates;
pub(crate) mod call_template;
pub(crate) mod control_flow;
pub(crate) mod copy;
pub(crate) mod for_each;
pub(crate) mod literals;
pub(crate) mod number;
pub(crate) mod sort;
pub(crate) mod variables;
