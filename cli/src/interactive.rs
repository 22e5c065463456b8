//! Line-oriented terminal front end for a test session.
//!
//! Reads operator answers from any [`BufRead`] and writes prompts to any
//! [`Write`], so the same loop serves the real terminal and tests.

use anyhow::Result;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use testbench_workflow::Notice;
use testbench_workflow::RunnerAction;
use testbench_workflow::SetupRunner;
use testbench_workflow::WorkflowController;
use testbench_workflow::WorkflowError;

const WRAP_WIDTH: usize = 72;
const BACK: &str = "b";

pub struct Console<R, W> {
    input: R,
    output: W,
}

enum MenuChoice {
    Setup(String),
    Report,
    Quit,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs intake, then the setup menu until the operator quits or input ends.
    pub fn run_session(&mut self, controller: &mut WorkflowController, report_path: &Path) -> Result<()> {
        controller.start_session();
        if !self.collect_intake(controller)? {
            return Ok(());
        }
        loop {
            let Some(choice) = self.menu(controller)? else {
                return Ok(());
            };
            match choice {
                MenuChoice::Quit => return Ok(()),
                MenuChoice::Report => self.export(controller, report_path)?,
                MenuChoice::Setup(setup_id) => {
                    let runner = controller.dispatch(&setup_id)?;
                    match self.drive(runner)? {
                        Some(runner) => {
                            let notice = controller.finish(runner)?;
                            writeln!(self.output, "{notice}")?;
                        }
                        None => writeln!(self.output, "Back to main screen; nothing recorded.")?,
                    }
                }
            }
        }
    }

    fn collect_intake(&mut self, controller: &mut WorkflowController) -> Result<bool> {
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        loop {
            let Some(device_sn) = self.prompt("Device SN: ")? else {
                return Ok(false);
            };
            let Some(operator) = self.prompt("Operator: ")? else {
                return Ok(false);
            };
            let Some(date) = self.prompt(&format!("Date [{today}]: "))? else {
                return Ok(false);
            };
            let date = if date.is_empty() { today.as_str() } else { date.as_str() };
            match controller.submit_intake_text(&device_sn, &operator, date) {
                Ok(notice) => {
                    writeln!(self.output, "{notice}")?;
                    return Ok(true);
                }
                Err(err @ WorkflowError::Validation(_)) => writeln!(self.output, "{err}")?,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn menu(&mut self, controller: &WorkflowController) -> Result<Option<MenuChoice>> {
        loop {
            writeln!(self.output)?;
            writeln!(self.output, "Select Test Setup")?;
            let states = controller.setup_states();
            for (position, state) in states.iter().enumerate() {
                let mark = if state.completed { "x" } else { " " };
                writeln!(self.output, "  {:>2}. [{mark}] {}", position + 1, state.display_name)?;
            }
            let Some(answer) = self.prompt("Setup number, r = generate report, q = quit: ")? else {
                return Ok(None);
            };
            match answer.as_str() {
                "q" => return Ok(Some(MenuChoice::Quit)),
                "r" => return Ok(Some(MenuChoice::Report)),
                other => {
                    let picked = other
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|index| states.get(index))
                        .or_else(|| states.iter().find(|state| state.setup_id == other));
                    match picked {
                        Some(state) => return Ok(Some(MenuChoice::Setup(state.setup_id.clone()))),
                        None => writeln!(self.output, "No setup {other:?}.")?,
                    }
                }
            }
        }
    }

    fn export(&mut self, controller: &WorkflowController, report_path: &Path) -> Result<()> {
        match controller.export(report_path) {
            Ok(summary) => {
                writeln!(self.output, "{}", summary.notice())?;
                if !summary.missing_setups.is_empty() {
                    writeln!(
                        self.output,
                        "Not yet completed: {}",
                        summary.missing_setups.join(", ")
                    )?;
                }
            }
            Err(WorkflowError::NoData) => writeln!(self.output, "{}", Notice::NoData)?,
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Drives `runner` to completion. `None` means the operator went back.
    fn drive(&mut self, mut runner: SetupRunner) -> Result<Option<SetupRunner>> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", textwrap::fill(&runner.setup().display_name, WRAP_WIDTH))?;
        if runner.is_completed() {
            writeln!(self.output, "This setup has no procedure yet.")?;
            return Ok(Some(runner));
        }
        if let Some(question) = runner.question() {
            if let Some(visual_aid) = &question.visual_aid {
                writeln!(self.output, "See {visual_aid}")?;
            }
        }
        while !runner.is_completed() {
            let proceed = if runner.question().is_some() {
                self.answer_question(&mut runner)?
            } else {
                self.work_step(&mut runner)?
            };
            if !proceed {
                return Ok(None);
            }
        }
        Ok(Some(runner))
    }

    fn answer_question(&mut self, runner: &mut SetupRunner) -> Result<bool> {
        let Some(question) = runner.question().cloned() else {
            return Ok(true);
        };
        if runner.can(RunnerAction::ProvideDetail) {
            let Some(value) = self.prompt(&format!("{}: ", question.detail))? else {
                return Ok(false);
            };
            if value == BACK {
                return Ok(false);
            }
            if let Err(err) = runner.provide_detail(&value) {
                recoverable(&err)?;
                writeln!(self.output, "{err}")?;
            }
            return Ok(true);
        }
        let prompt = format!(
            "{} ({}, {BACK} = back): ",
            question.marker,
            question.options.join(" / ")
        );
        let Some(choice) = self.prompt(&prompt)? else {
            return Ok(false);
        };
        if choice == BACK {
            return Ok(false);
        }
        if let Err(err) = runner.select(&choice) {
            recoverable(&err)?;
            writeln!(self.output, "{err}")?;
        }
        Ok(true)
    }

    fn work_step(&mut self, runner: &mut SetupRunner) -> Result<bool> {
        if let (Some(step), Some((position, total))) = (runner.step(), runner.step_position()) {
            let text = textwrap::fill(&format!("[{position}/{total}] {}", step.prompt), WRAP_WIDTH);
            writeln!(self.output, "{text}")?;
            writeln!(self.output, "See {}", step.visual_aid)?;
        }
        let next = if runner.is_last_step() { "submit" } else { "next" };
        loop {
            let Some(answer) = self.prompt(&format!("y = check, n = {next}, {BACK} = back: "))? else {
                return Ok(false);
            };
            match answer.as_str() {
                BACK => return Ok(false),
                "y" => runner.acknowledge()?,
                "n" if runner.can(RunnerAction::Advance) => {
                    runner.advance()?;
                    return Ok(true);
                }
                "n" => writeln!(self.output, "Check the step (y) before moving on.")?,
                other => writeln!(self.output, "Unknown answer {other:?}.")?,
            }
        }
    }

    /// Prints `text` and reads one trimmed line; `None` at end of input.
    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

fn recoverable(err: &WorkflowError) -> Result<()> {
    if err.is_recoverable() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{err}"))
    }
}
