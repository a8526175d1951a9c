use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Ordered list of directories searched for data files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathResolver {
    paths: Vec<PathBuf>,
}

impl PathResolver {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn append(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.paths.retain(|p| p != &path);
        self.paths.push(path);
    }

    pub fn prepend(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.paths.retain(|p| p != &path);
        self.paths.insert(0, path);
    }

    /// First existing candidate for `path`: the path itself if it exists
    /// (absolute paths always resolve to themselves), then each search
    /// directory in order.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        if path.exists() {
            return Some(path.to_path_buf());
        }
        self.paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
    }

    /// Like [`resolve`](Self::resolve), failing on missing files.
    pub fn resolve_existing(&self, path: &Path) -> Result<PathBuf> {
        self.resolve(path)
            .filter(|p| p.exists())
            .ok_or_else(|| Error::Data(format!("cannot find data file '{}'", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        std::fs::write(a.path().join("x.csv"), "w\n1\n").unwrap();
        std::fs::write(b.path().join("x.csv"), "w\n2\n").unwrap();

        let mut r = PathResolver::default();
        r.append(a.path());
        r.append(b.path());
        assert_eq!(r.resolve(Path::new("x.csv")), Some(a.path().join("x.csv")));

        r.prepend(b.path());
        assert_eq!(r.paths().len(), 2);
        assert_eq!(r.resolve(Path::new("x.csv")), Some(b.path().join("x.csv")));
    }

    #[test]
    fn existing_file_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bins.parquet"), b"").unwrap();

        let mut r = PathResolver::default();
        assert!(r.resolve_existing(Path::new("bins.parquet")).is_err());
        r.append(dir.path());
        assert_eq!(
            r.resolve_existing(Path::new("bins.parquet")).unwrap(),
            dir.path().join("bins.parquet")
        );
    }

    #[test]
    fn missing_file() {
        let r = PathResolver::default();
        assert!(r.resolve(Path::new("no/such/file.parquet")).is_none());
        assert!(r.resolve_existing(Path::new("/no/such/file.parquet")).is_err());
    }
}
