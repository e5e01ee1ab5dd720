//! The XML parser collaborator: turns document text into a namespace-resolved node tree.
//!
//! ```text
//! text ──quick-xml──▶ parser (entities, defaults, namespaces) ──▶ Document
//!                         │                                          │
//!                   dtd (nom subset parser)          validate ◀──────┤
//!                                                    xinclude ◀──────┘
//! ```

pub mod document;
pub mod dtd;
pub mod entities;
pub mod error;
pub mod parser;
pub mod validate;
pub mod xinclude;

pub use document::{Document, ExpandedName, Node, NodeData, NodeId, NodeKind};
pub use dtd::Dtd;
pub use error::{DomError, Location, get_line_col_from_pos};
pub use parser::{ParseOptions, parse};
