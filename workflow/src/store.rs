use crate::error::Result;
use crate::error::WorkflowError;
use crate::record::Answers;
use crate::record::FlatRecord;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

/// Durable list of session records kept as a JSON array.
///
/// Every mutation reloads the whole file, applies the change and writes the
/// full collection back through a sibling temp file, so the stored list is
/// either the old one or the new one. There is no locking: one operator
/// process is assumed to own the file. Values edited in by hand may be
/// strings, booleans, numbers or null; anything else makes the file corrupt.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty store.
    pub fn load_all(&self) -> Result<Vec<FlatRecord>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(WorkflowError::storage(&self.path, err)),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data).map_err(|source| WorkflowError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends a record and returns its index.
    pub fn append(&self, record: FlatRecord) -> Result<usize> {
        let mut records = self.load_all()?;
        records.push(record);
        self.save(&records)?;
        let index = records.len() - 1;
        tracing::info!(path = %self.path.display(), index, "appended session record");
        Ok(index)
    }

    /// Merges `delta` into the record at `index`, which must still be the
    /// last stored record.
    pub fn patch_record(&self, index: usize, delta: &Answers) -> Result<()> {
        let mut records = self.load_all()?;
        let len = records.len();
        if len == 0 || index != len - 1 {
            return Err(WorkflowError::StaleTarget { index, len });
        }
        let target = &mut records[index];
        for (key, value) in delta {
            target.insert(key.clone(), value.clone());
        }
        self.save(&records)?;
        tracing::info!(path = %self.path.display(), index, keys = delta.len(), "patched session record");
        Ok(())
    }

    /// Merges `delta` into whatever record is currently last.
    pub fn patch_last(&self, delta: &Answers) -> Result<usize> {
        let len = self.len()?;
        if len == 0 {
            return Err(WorkflowError::NoData);
        }
        self.patch_record(len - 1, delta)?;
        Ok(len - 1)
    }

    fn save(&self, records: &[FlatRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| WorkflowError::storage(parent, err))?;
        }
        let data = serde_json::to_vec_pretty(records).map_err(|source| WorkflowError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        write_atomically(&self.path, &data)
    }
}

pub(crate) fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = tmp_path(path);
    fs::write(&tmp_path, data).map_err(|err| WorkflowError::storage(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        WorkflowError::storage(path, err)
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let mut file_name = path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    file_name.push(".tmp");
    tmp.set_file_name(file_name);
    tmp
}
