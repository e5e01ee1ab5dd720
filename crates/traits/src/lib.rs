pub mod resource;
pub mod uri;

pub use resource::{InMemoryResourceProvider, ResourceError, ResourceProvider, SharedResourceData};
pub use uri::{normalize_path, resolve_uri};
