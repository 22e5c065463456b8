use crate::interactive::Console;
use anyhow::Result;
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use testbench_workflow::AnswerValue;
use testbench_workflow::HeaderPolicy;
use testbench_workflow::Notice;
use testbench_workflow::SessionRecord;
use testbench_workflow::SessionStore;
use testbench_workflow::SetupCatalog;
use testbench_workflow::SetupKind;
use testbench_workflow::WorkflowConfig;
use testbench_workflow::WorkflowController;
use testbench_workflow::WorkflowError;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Where to write the CSV report. Defaults to the configured report file.
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Column selection: `union` of all keys, or `first-record` keys only.
    #[arg(long = "header-policy", value_name = "POLICY")]
    pub header_policy: Option<HeaderPolicy>,
}

pub fn setups(config: &WorkflowConfig) -> Result<()> {
    let catalog = config.load_catalog()?;
    let mut stdout = std::io::stdout().lock();
    print_catalog(&catalog, &mut stdout)?;
    Ok(())
}

pub fn session(config: &WorkflowConfig) -> Result<()> {
    let mut controller = WorkflowController::from_config(config)?;
    let report_path = config.layout().report_file();
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    Console::new(stdin, stdout).run_session(&mut controller, &report_path)
}

pub fn export(config: &WorkflowConfig, args: ExportArgs) -> Result<()> {
    let mut config = config.clone();
    if let Some(policy) = args.header_policy {
        config.header_policy = policy;
    }
    let controller = WorkflowController::from_config(&config)?;
    let output = args.output.unwrap_or_else(|| config.layout().report_file());
    match controller.export(&output) {
        Ok(summary) => {
            println!("{}", summary.notice());
            println!("Rows written: {}", summary.rows);
            Ok(())
        }
        Err(WorkflowError::NoData) => {
            println!("{}", Notice::NoData);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn records(config: &WorkflowConfig) -> Result<()> {
    let store = SessionStore::new(config.layout().store_file());
    let records = store.load_all()?;
    if records.is_empty() {
        println!("No sessions stored in {}", store.path().display());
        return Ok(());
    }
    println!("Session store: {}", store.path().display());
    for (index, flat) in records.iter().enumerate() {
        match SessionRecord::from_flat(flat) {
            Ok(record) => {
                let answered = record
                    .answers
                    .values()
                    .filter(|value| is_answered(value))
                    .count();
                println!(
                    "- #{:<3} {:<16} {:<16} {}  {answered}/{} answers recorded",
                    index + 1,
                    record.intake.device_sn,
                    record.intake.operator,
                    record.intake.date,
                    record.answers.len(),
                );
            }
            Err(err) => println!("- #{:<3} unreadable record: {err}", index + 1),
        }
    }
    Ok(())
}

fn is_answered(value: &AnswerValue) -> bool {
    !matches!(value, AnswerValue::Null | AnswerValue::Bool(false))
}

pub(crate) fn print_catalog(catalog: &SetupCatalog, out: &mut impl Write) -> std::io::Result<()> {
    for setup in catalog.list_setups() {
        let detail = match &setup.kind {
            SetupKind::SingleQuestion(question) => {
                format!("question: {} ({})", question.marker, question.options.join(" / "))
            }
            SetupKind::SteppedChecklist { steps } => format!("checklist: {} steps", steps.len()),
            SetupKind::Unimplemented => "no procedure yet".to_string(),
        };
        writeln!(out, "{:<8} {:<56} {detail}", setup.id, setup.display_name)?;
    }
    Ok(())
}
