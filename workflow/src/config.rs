use crate::catalog::SetupCatalog;
use crate::error::Result;
use crate::error::WorkflowError;
use crate::layout::DEFAULT_REPORT_FILE;
use crate::layout::DEFAULT_STORE_FILE;
use crate::layout::DataLayout;
use crate::report::HeaderPolicy;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

/// Engine settings, read from a TOML file.
///
/// ```toml
/// data_dir = "/var/lib/testbench"
/// store_file = "user_details.json"
/// report_file = "reports/latest.csv"
/// catalog = "/etc/testbench/catalog.yaml"
/// header_policy = "first_record"
/// ```
///
/// A relative `catalog` is taken relative to the directory holding the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub store_file: PathBuf,
    pub report_file: PathBuf,
    pub catalog: Option<PathBuf>,
    pub header_policy: HeaderPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            data_dir: PathBuf::from("."),
            store_file: PathBuf::from(DEFAULT_STORE_FILE),
            report_file: PathBuf::from(DEFAULT_REPORT_FILE),
            catalog: None,
            header_policy: HeaderPolicy::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |message: String| WorkflowError::Config {
            path: path.to_path_buf(),
            message,
        };
        let contents = fs::read_to_string(path).map_err(|err| config_error(err.to_string()))?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|err| config_error(err.to_string()))?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, or `.` for defaults.
    pub fn config_dir(&self) -> PathBuf {
        self.source_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.as_ref().map(|catalog| self.config_dir().join(catalog))
    }

    /// Like [`WorkflowConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            _ => Self::load(path),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(self.data_dir.clone())
            .with_files(self.store_file.clone(), self.report_file.clone())
    }

    /// The configured catalog file, or the built-in catalog when none is set.
    pub fn load_catalog(&self) -> Result<SetupCatalog> {
        match self.catalog_path() {
            Some(path) => SetupCatalog::load(&path),
            None => Ok(SetupCatalog::builtin()),
        }
    }
}
