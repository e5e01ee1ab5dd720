//! Filesystem-based resource provider.
//!
//! References are resolved under a base directory. Absolute paths, `..` segments that
//! climb out of the base and symlinks pointing outside it are all refused, so a hostile
//! document cannot pull arbitrary files in through an external entity or an XInclude.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use xsltr_traits::{ResourceError, ResourceProvider, SharedResourceData};

#[derive(Debug)]
pub struct FilesystemResourceProvider {
    base_path: PathBuf,
    canonical_base: Option<PathBuf>,
}

impl FilesystemResourceProvider {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base = base_path.as_ref().to_path_buf();
        let canonical = base.canonicalize().ok();
        Self {
            base_path: base,
            canonical_base: canonical,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base_path
    }

    /// Maps a reference onto a file under the base, or `None` when it would escape.
    fn resolve_path_safe(&self, reference: &str) -> Option<PathBuf> {
        let relative = reference.strip_prefix("file:").unwrap_or(reference);
        let relative = Path::new(relative);
        if relative.is_absolute() || relative.has_root() {
            return None;
        }
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }

        let full_path = self.base_path.join(relative);
        match (full_path.canonicalize(), &self.canonical_base) {
            (Ok(canonical), Some(base)) if canonical.starts_with(base) => Some(canonical),
            (Ok(_), Some(_)) => None,
            _ => Some(full_path),
        }
    }
}

impl ResourceProvider for FilesystemResourceProvider {
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError> {
        let full_path = self
            .resolve_path_safe(path)
            .ok_or_else(|| ResourceError::NotFound(format!("{} (outside base directory)", path)))?;

        log::debug!("loading '{}' from {}", path, full_path.display());
        std::fs::read(&full_path).map(Arc::new).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(path.to_string())
            } else {
                ResourceError::LoadFailed {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path_safe(path).is_some_and(|p| p.is_file())
    }

    fn base_path(&self) -> Option<&str> {
        self.base_path.to_str()
    }

    fn name(&self) -> &'static str {
        "FilesystemResourceProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_nested_file() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("dtd")).unwrap();
        fs::write(dir.path().join("dtd/book.dtd"), b"<!ELEMENT book ANY>").unwrap();

        let provider = FilesystemResourceProvider::new(dir.path());
        let data = provider.load("dtd/book.dtd").unwrap();
        assert_eq!(&*data, b"<!ELEMENT book ANY>");
        assert!(provider.exists("dtd/book.dtd"));
        assert!(provider.exists("file:dtd/book.dtd"));
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let provider = FilesystemResourceProvider::new(dir.path());
        assert!(matches!(
            provider.load("missing.xml"),
            Err(ResourceError::NotFound(_))
        ));
        assert!(!provider.exists("missing.xml"));
    }

    #[test]
    fn test_blocks_traversal_and_absolute_paths() {
        let dir = tempdir().unwrap();
        let provider = FilesystemResourceProvider::new(dir.path());

        assert!(provider.load("../../../etc/passwd").is_err());
        assert!(provider.load("/etc/passwd").is_err());
        assert!(!provider.exists("a/../../b"));
        assert!(!provider.exists(".."));
    }

    #[test]
    fn test_directories_do_not_exist_as_resources() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let provider = FilesystemResourceProvider::new(dir.path());
        assert!(!provider.exists("sub"));
        assert!(provider.base_path().is_some());
    }
}
