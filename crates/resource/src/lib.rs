//! Resource providers backed by the host platform.
//!
//! - [`FilesystemResourceProvider`]: documents under a base directory
//! - [`InMemoryResourceProvider`]: re-exported from `xsltr-traits`

mod filesystem;

pub use filesystem::FilesystemResourceProvider;
pub use xsltr_traits::InMemoryResourceProvider;
