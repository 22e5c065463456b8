use crate::error::Result;
use crate::error::WorkflowError;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

pub const DEFAULT_STORE_FILE: &str = "user_details.json";
pub const DEFAULT_REPORT_FILE: &str = "user_details_report.csv";

/// Where session records and generated reports live on disk.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
    store_file: PathBuf,
    report_file: PathBuf,
}

impl DataLayout {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            store_file: PathBuf::from(DEFAULT_STORE_FILE),
            report_file: PathBuf::from(DEFAULT_REPORT_FILE),
        }
    }

    pub fn with_files(mut self, store_file: PathBuf, report_file: PathBuf) -> Self {
        self.store_file = store_file;
        self.report_file = report_file;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| WorkflowError::storage(&self.root, err))
    }

    /// Absolute file names are used as given.
    pub fn store_file(&self) -> PathBuf {
        self.root.join(&self.store_file)
    }

    pub fn report_file(&self) -> PathBuf {
        self.root.join(&self.report_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn files_resolve_under_root() {
        let layout = DataLayout::new(PathBuf::from("/tmp/bench"));
        assert_eq!(layout.store_file(), PathBuf::from("/tmp/bench/user_details.json"));
        assert_eq!(
            layout.report_file(),
            PathBuf::from("/tmp/bench/user_details_report.csv")
        );
    }

    #[test]
    fn absolute_overrides_escape_root() {
        let layout = DataLayout::new(PathBuf::from("/tmp/bench"))
            .with_files(PathBuf::from("records.json"), PathBuf::from("/srv/out.csv"));
        assert_eq!(layout.store_file(), PathBuf::from("/tmp/bench/records.json"));
        assert_eq!(layout.report_file(), PathBuf::from("/srv/out.csv"));
    }

    #[test]
    fn ensure_root_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(dir.path().join("a").join("b"));
        layout.ensure_root().expect("ensure");
        assert!(layout.root().is_dir());
    }
}
