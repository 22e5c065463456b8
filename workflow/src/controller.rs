use crate::catalog::Setup;
use crate::catalog::SetupCatalog;
use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::error::WorkflowError;
use crate::record::Intake;
use crate::record::SessionRecord;
use crate::report::HeaderPolicy;
use crate::report::Report;
use crate::runner::SetupRunner;
use crate::store::SessionStore;
use chrono::NaiveDate;
use indexmap::IndexSet;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

/// Operator-facing outcome of a controller action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    IntakeSaved,
    /// The setup's answers were stored; the front end returns to the main screen.
    SetupRecorded {
        setup_id: String,
        display_name: String,
    },
    ReportWritten {
        path: PathBuf,
        rows: usize,
    },
    NoData,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::IntakeSaved => f.write_str("Data Saved! Setups enabled now"),
            Notice::SetupRecorded { display_name, .. } => write!(f, "Recorded {display_name}"),
            Notice::ReportWritten { path, .. } => {
                write!(f, "Report generated successfully: {}", path.display())
            }
            Notice::NoData => f.write_str("No data available to generate report."),
        }
    }
}

/// What a front end needs to render one setup button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStatus {
    pub setup_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    /// Setups of the current session that have not been completed yet.
    pub missing_setups: Vec<String>,
}

impl ExportSummary {
    pub fn notice(&self) -> Notice {
        Notice::ReportWritten {
            path: self.path.clone(),
            rows: self.rows,
        }
    }
}

#[derive(Debug)]
struct ActiveSession {
    record: SessionRecord,
    index: usize,
    generation: u64,
}

/// Owns the session in progress: its record, the stored position that record
/// is patched at, and the setups completed so far.
#[derive(Debug)]
pub struct WorkflowController {
    catalog: SetupCatalog,
    store: SessionStore,
    header_policy: HeaderPolicy,
    session: Option<ActiveSession>,
    /// Number of intakes accepted so far; tags the runners each session hands out.
    generations: u64,
    completed: IndexSet<String>,
}

impl WorkflowController {
    pub fn new(catalog: SetupCatalog, store: SessionStore, header_policy: HeaderPolicy) -> Self {
        Self {
            catalog,
            store,
            header_policy,
            session: None,
            generations: 0,
            completed: IndexSet::new(),
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let layout = config.layout();
        layout.ensure_root()?;
        Ok(Self::new(
            config.load_catalog()?,
            SessionStore::new(layout.store_file()),
            config.header_policy,
        ))
    }

    pub fn catalog(&self) -> &SetupCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Forgets the current session and its completions. Stored records stay.
    pub fn start_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                device_sn = %session.record.intake.device_sn,
                completed = self.completed.len(),
                "closing session"
            );
        }
        self.completed.clear();
    }

    pub fn submit_intake(
        &mut self,
        device_sn: &str,
        operator: &str,
        date: NaiveDate,
    ) -> Result<Notice> {
        let intake = Intake::new(device_sn, operator, date)?;
        self.submit(intake)
    }

    /// Same as [`WorkflowController::submit_intake`] with the date as typed
    /// by the operator (`YYYY-MM-DD`).
    pub fn submit_intake_text(&mut self, device_sn: &str, operator: &str, date: &str) -> Result<Notice> {
        let intake = Intake::parse(device_sn, operator, date)?;
        self.submit(intake)
    }

    fn submit(&mut self, intake: Intake) -> Result<Notice> {
        if let Some(session) = &self.session {
            return Err(WorkflowError::validation(format!(
                "intake already submitted for {}; start a new session first",
                session.record.intake.device_sn
            )));
        }
        let record = SessionRecord::new(intake, self.catalog.placeholder_keys());
        let index = self.store.append(record.to_flat())?;
        tracing::info!(
            device_sn = %record.intake.device_sn,
            operator = %record.intake.operator,
            index,
            "intake submitted"
        );
        self.generations += 1;
        self.session = Some(ActiveSession {
            record,
            index,
            generation: self.generations,
        });
        Ok(Notice::IntakeSaved)
    }

    pub fn intake_submitted(&self) -> bool {
        self.session.is_some()
    }

    pub fn record(&self) -> Option<&SessionRecord> {
        self.session.as_ref().map(|session| &session.record)
    }

    /// Index of the stored record this session patches.
    pub fn record_index(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.index)
    }

    /// Hands out a runner for `setup_id`. The caller drives it and passes it
    /// back to [`WorkflowController::finish`]; dropping it abandons the setup.
    pub fn dispatch(&self, setup_id: &str) -> Result<SetupRunner> {
        let Some(session) = &self.session else {
            return Err(WorkflowError::IntakeRequired);
        };
        let setup = self.catalog.get(setup_id)?;
        tracing::debug!(setup = %setup.id, kind = setup.kind_name(), "dispatching setup");
        Ok(SetupRunner::new(setup.clone()).for_session(session.generation))
    }

    /// Stores a completed runner's answers and marks its setup complete. The
    /// runner must come from [`WorkflowController::dispatch`] in this session.
    pub fn finish(&mut self, runner: SetupRunner) -> Result<Notice> {
        if !runner.is_completed() {
            return Err(WorkflowError::InvalidTransition {
                action: "finish",
                state: runner.state().to_string(),
            });
        }
        let Some(session) = self.session.as_mut() else {
            return Err(WorkflowError::IntakeRequired);
        };
        if runner.session() != Some(session.generation) {
            return Err(WorkflowError::ForeignRunner {
                setup_id: runner.setup().id.clone(),
            });
        }
        let (setup, delta) = runner.into_parts();
        let delta = delta.unwrap_or_default();
        if !delta.is_empty() {
            self.store.patch_record(session.index, &delta)?;
            session.record.merge(&delta);
        }
        self.completed.insert(setup.id.clone());
        tracing::info!(setup = %setup.id, keys = delta.len(), "setup completed");
        Ok(Notice::SetupRecorded {
            setup_id: setup.id,
            display_name: setup.display_name,
        })
    }

    pub fn is_complete(&self, setup_id: &str) -> bool {
        self.completed.contains(setup_id)
    }

    /// Completed setup ids in completion order.
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.completed.iter().map(String::as_str)
    }

    pub fn missing_setups(&self) -> Vec<&Setup> {
        self.catalog
            .list_setups()
            .iter()
            .filter(|setup| !self.is_complete(&setup.id))
            .collect()
    }

    /// Every catalog setup has been completed in this session.
    pub fn is_whole(&self) -> bool {
        self.missing_setups().is_empty()
    }

    pub fn setup_states(&self) -> Vec<SetupStatus> {
        let enabled = self.intake_submitted();
        self.catalog
            .list_setups()
            .iter()
            .map(|setup| SetupStatus {
                setup_id: setup.id.clone(),
                display_name: setup.display_name.clone(),
                enabled,
                completed: self.is_complete(&setup.id),
            })
            .collect()
    }

    pub fn report(&self) -> Result<Report> {
        Report::from_records(&self.store.load_all()?, self.header_policy)
    }

    /// Writes every stored session to `destination` as CSV. Fails with
    /// [`WorkflowError::NoData`] and writes nothing when the store is empty.
    pub fn export(&self, destination: &Path) -> Result<ExportSummary> {
        let report = self.report()?;
        let missing_setups: Vec<String> = if self.intake_submitted() {
            self.missing_setups()
                .into_iter()
                .map(|setup| setup.id.clone())
                .collect()
        } else {
            Vec::new()
        };
        if !missing_setups.is_empty() {
            tracing::warn!(
                missing = %missing_setups.join(", "),
                "exporting before every setup of the current session is complete"
            );
        }
        report.write_to(destination)?;
        Ok(ExportSummary {
            path: destination.to_path_buf(),
            rows: report.len(),
            missing_setups,
        })
    }
}
