//! Per-dispatch state machine for a single setup.
//!
//! A runner starts in the state its setup kind dictates and only moves
//! forward. Operations that the current state does not offer fail with
//! [`WorkflowError::InvalidTransition`] and leave the runner untouched, so a
//! front end can rely on [`SetupRunner::available_actions`] to decide which
//! controls to enable.

use crate::catalog::PLACEHOLDER_OPTION;
use crate::catalog::QuestionSpec;
use crate::catalog::Setup;
use crate::catalog::SetupKind;
use crate::catalog::StepSpec;
use crate::error::Result;
use crate::error::WorkflowError;
use crate::record::AnswerValue;
use crate::record::Answers;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    AwaitingSelection,
    AwaitingDetail { option: String },
    StepInProgress { index: usize, acknowledged: bool },
    Completed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::AwaitingSelection => f.write_str("awaiting selection"),
            RunnerState::AwaitingDetail { option } => write!(f, "awaiting detail for {option:?}"),
            RunnerState::StepInProgress {
                index,
                acknowledged: false,
            } => write!(f, "on unacknowledged step {}", index + 1),
            RunnerState::StepInProgress { index, .. } => write!(f, "on step {}", index + 1),
            RunnerState::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerAction {
    Select,
    ProvideDetail,
    Acknowledge,
    Advance,
}

impl RunnerAction {
    pub fn name(self) -> &'static str {
        match self {
            RunnerAction::Select => "select",
            RunnerAction::ProvideDetail => "provide detail",
            RunnerAction::Acknowledge => "acknowledge",
            RunnerAction::Advance => "advance",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupRunner {
    setup: Setup,
    state: RunnerState,
    delta: Option<Answers>,
    /// Session that dispatched this runner; `None` for free-standing runners.
    session: Option<u64>,
}

impl SetupRunner {
    pub fn new(setup: Setup) -> Self {
        let (state, delta) = match &setup.kind {
            SetupKind::SingleQuestion(_) => (RunnerState::AwaitingSelection, None),
            SetupKind::SteppedChecklist { .. } => (
                RunnerState::StepInProgress {
                    index: 0,
                    acknowledged: false,
                },
                None,
            ),
            SetupKind::Unimplemented => (RunnerState::Completed, Some(Answers::new())),
        };
        Self {
            setup,
            state,
            delta,
            session: None,
        }
    }

    pub(crate) fn for_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn session(&self) -> Option<u64> {
        self.session
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunnerState::Completed
    }

    /// Answer delta, available once the runner has completed.
    pub fn delta(&self) -> Option<&Answers> {
        self.delta.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Setup, Option<Answers>) {
        (self.setup, self.delta)
    }

    pub fn available_actions(&self) -> Vec<RunnerAction> {
        match &self.state {
            RunnerState::AwaitingSelection => vec![RunnerAction::Select],
            RunnerState::AwaitingDetail { .. } => {
                vec![RunnerAction::Select, RunnerAction::ProvideDetail]
            }
            RunnerState::StepInProgress {
                acknowledged: false,
                ..
            } => vec![RunnerAction::Acknowledge],
            RunnerState::StepInProgress { .. } => {
                vec![RunnerAction::Acknowledge, RunnerAction::Advance]
            }
            RunnerState::Completed => Vec::new(),
        }
    }

    pub fn can(&self, action: RunnerAction) -> bool {
        self.available_actions().contains(&action)
    }

    pub fn question(&self) -> Option<&QuestionSpec> {
        match &self.setup.kind {
            SetupKind::SingleQuestion(question) => Some(question),
            _ => None,
        }
    }

    /// Whether a submit control showing `choice` should be enabled.
    pub fn can_submit(&self, choice: &str) -> bool {
        self.can(RunnerAction::Select)
            && self
                .question()
                .is_some_and(|question| question.options.iter().any(|option| option == choice))
    }

    pub fn step(&self) -> Option<&StepSpec> {
        match (&self.state, &self.setup.kind) {
            (RunnerState::StepInProgress { index, .. }, SetupKind::SteppedChecklist { steps }) => {
                steps.get(*index)
            }
            _ => None,
        }
    }

    /// One-based position of the current step and the step count.
    pub fn step_position(&self) -> Option<(usize, usize)> {
        match (&self.state, &self.setup.kind) {
            (RunnerState::StepInProgress { index, .. }, SetupKind::SteppedChecklist { steps }) => {
                Some((index + 1, steps.len()))
            }
            _ => None,
        }
    }

    pub fn is_last_step(&self) -> bool {
        self.step_position()
            .is_some_and(|(position, total)| position == total)
    }

    /// Chooses an option. Re-selecting while a detail is pending replaces the
    /// earlier choice.
    pub fn select(&mut self, option: &str) -> Result<()> {
        if !self.can(RunnerAction::Select) {
            return Err(self.invalid(RunnerAction::Select));
        }
        let Some(question) = self.question() else {
            return Err(self.invalid(RunnerAction::Select));
        };
        let option = option.trim();
        if option.is_empty() || option == PLACEHOLDER_OPTION {
            return Err(WorkflowError::validation(format!(
                "choose {} before submitting: {}",
                question.marker,
                question.options.join(" / ")
            )));
        }
        if !question.options.iter().any(|candidate| candidate == option) {
            return Err(WorkflowError::validation(format!(
                "{option:?} is not a {} option ({})",
                question.marker,
                question.options.join(" / ")
            )));
        }
        if question.requires_detail(option) {
            tracing::debug!(setup = %self.setup.id, option, "selection requires detail");
            self.state = RunnerState::AwaitingDetail {
                option: option.to_string(),
            };
            return Ok(());
        }
        let delta = question_delta(&self.setup, question, option, AnswerValue::Null);
        self.complete(delta);
        Ok(())
    }

    pub fn provide_detail(&mut self, value: &str) -> Result<()> {
        let RunnerState::AwaitingDetail { option } = &self.state else {
            return Err(self.invalid(RunnerAction::ProvideDetail));
        };
        let Some(question) = self.question() else {
            return Err(self.invalid(RunnerAction::ProvideDetail));
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(WorkflowError::validation(format!(
                "{} is required when {} is {option}",
                question.detail, question.marker
            )));
        }
        let delta = question_delta(&self.setup, question, option, value.into());
        self.complete(delta);
        Ok(())
    }

    /// Selects `option` and, only when that option calls for one, records
    /// `detail`. Options that need no detail always store null, whatever
    /// leftover value the caller passes.
    pub fn submit(&mut self, option: &str, detail: Option<&str>) -> Result<()> {
        self.select(option)?;
        if matches!(self.state, RunnerState::AwaitingDetail { .. }) {
            return self.provide_detail(detail.unwrap_or_default());
        }
        if detail.is_some_and(|value| !value.trim().is_empty()) {
            tracing::debug!(setup = %self.setup.id, option, "discarding detail for affirmative answer");
        }
        Ok(())
    }

    /// Confirms the checklist item for the current step. Repeating it has no
    /// further effect.
    pub fn acknowledge(&mut self) -> Result<()> {
        if let RunnerState::StepInProgress { acknowledged, .. } = &mut self.state {
            *acknowledged = true;
            return Ok(());
        }
        Err(self.invalid(RunnerAction::Acknowledge))
    }

    pub fn advance(&mut self) -> Result<()> {
        if !self.can(RunnerAction::Advance) {
            return Err(self.invalid(RunnerAction::Advance));
        }
        let (RunnerState::StepInProgress { index, .. }, SetupKind::SteppedChecklist { steps }) =
            (&self.state, &self.setup.kind)
        else {
            return Err(self.invalid(RunnerAction::Advance));
        };
        let next = index + 1;
        if next < steps.len() {
            tracing::debug!(setup = %self.setup.id, step = next + 1, "advanced to next step");
            self.state = RunnerState::StepInProgress {
                index: next,
                acknowledged: false,
            };
            return Ok(());
        }
        let delta = steps
            .iter()
            .filter_map(|step| step.answer.as_deref())
            .map(|answer| (self.setup.answer_key(answer), AnswerValue::Bool(true)))
            .collect();
        self.complete(delta);
        Ok(())
    }

    fn complete(&mut self, delta: Answers) {
        tracing::debug!(setup = %self.setup.id, keys = delta.len(), "runner completed");
        self.delta = Some(delta);
        self.state = RunnerState::Completed;
    }

    fn invalid(&self, action: RunnerAction) -> WorkflowError {
        WorkflowError::InvalidTransition {
            action: action.name(),
            state: self.state.to_string(),
        }
    }
}

fn question_delta(
    setup: &Setup,
    question: &QuestionSpec,
    option: &str,
    detail: AnswerValue,
) -> Answers {
    let mut delta = Answers::new();
    delta.insert(setup.answer_key(&question.marker), option.into());
    delta.insert(setup.answer_key(&question.detail), detail);
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SetupCatalog;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn runner(id: &str) -> SetupRunner {
        let catalog = SetupCatalog::builtin();
        SetupRunner::new(catalog.get(id).expect("setup").clone())
    }

    fn answers(pairs: &[(&str, AnswerValue)]) -> Answers {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn detail_option_waits_for_measurement() {
        let mut runner = runner("setup2");
        assert_eq!(runner.state(), &RunnerState::AwaitingSelection);
        runner.select("No").expect("select");
        assert_eq!(
            runner.state(),
            &RunnerState::AwaitingDetail {
                option: "No".into()
            }
        );
        runner.provide_detail("12.5").expect("detail");
        assert!(runner.is_completed());
        assert_eq!(
            runner.delta(),
            Some(&answers(&[
                ("Setup2 - Unit Reach Marker", "No".into()),
                ("Setup2 - Measured Max Height", "12.5".into()),
            ]))
        );
    }

    #[test]
    fn blank_detail_is_rejected() {
        let mut runner = runner("setup2");
        runner.select("No").expect("select");
        assert_matches!(runner.provide_detail("   "), Err(WorkflowError::Validation(_)));
        assert_matches!(runner.state(), RunnerState::AwaitingDetail { .. });
        assert_matches!(runner.submit("No", None), Err(WorkflowError::Validation(_)));
        assert!(runner.delta().is_none());
    }

    #[test]
    fn affirmative_answer_never_stores_a_measurement() {
        let mut runner = runner("setup3");
        runner.submit("Yes", Some("99.0")).expect("submit");
        assert_eq!(
            runner.delta(),
            Some(&answers(&[
                ("Setup3 - Unit Reach Marker", "Yes".into()),
                ("Setup3 - Measured Max Height", AnswerValue::Null),
            ]))
        );
    }

    #[test]
    fn changing_mind_before_detail_is_allowed() {
        let mut runner = runner("setup2");
        runner.select("No").expect("select");
        runner.select("Yes").expect("reselect");
        assert!(runner.is_completed());
        assert_eq!(
            runner.delta().and_then(|d| d.get("Setup2 - Unit Reach Marker")),
            Some(&AnswerValue::from("Yes"))
        );
    }

    #[test]
    fn placeholder_and_unknown_options_cannot_be_submitted() {
        let mut runner = runner("setup2");
        assert!(!runner.can_submit(PLACEHOLDER_OPTION));
        assert!(runner.can_submit("No"));
        assert_matches!(runner.select(PLACEHOLDER_OPTION), Err(WorkflowError::Validation(_)));
        assert_matches!(runner.select("Maybe"), Err(WorkflowError::Validation(_)));
        assert_eq!(runner.state(), &RunnerState::AwaitingSelection);
        assert_matches!(
            runner.provide_detail("1"),
            Err(WorkflowError::InvalidTransition { action: "provide detail", .. })
        );
    }

    #[test]
    fn checklist_needs_exactly_one_advance_per_step() {
        let mut runner = runner("setup4");
        let (_, total) = runner.step_position().expect("position");
        assert_eq!(total, 3);
        for step in 0..total {
            assert!(!runner.is_completed(), "completed early at step {step}");
            assert_eq!(runner.is_last_step(), step + 1 == total);
            runner.acknowledge().expect("acknowledge");
            runner.advance().expect("advance");
        }
        assert!(runner.is_completed());
        assert_eq!(
            runner.delta(),
            Some(&answers(&[
                ("Setup4 - Click to Zero Vertical Position Dial", AnswerValue::Bool(true)),
                ("Setup4 - Click to record vertical deflection", AnswerValue::Bool(true)),
            ]))
        );
    }

    #[test]
    fn advance_without_acknowledgement_is_unavailable() {
        let mut runner = runner("setup4");
        assert_eq!(runner.available_actions(), vec![RunnerAction::Acknowledge]);
        assert!(!runner.can(RunnerAction::Advance));
        assert_matches!(
            runner.advance(),
            Err(WorkflowError::InvalidTransition { action: "advance", .. })
        );
        assert_eq!(
            runner.state(),
            &RunnerState::StepInProgress {
                index: 0,
                acknowledged: false
            }
        );
    }

    #[test]
    fn acknowledgement_does_not_carry_over() {
        let mut runner = runner("setup4");
        runner.acknowledge().expect("acknowledge");
        runner.acknowledge().expect("acknowledge again");
        assert_eq!(runner.step_position(), Some((1, 3)));
        runner.advance().expect("advance");
        assert_eq!(runner.step_position(), Some((2, 3)));
        assert!(!runner.can(RunnerAction::Advance));
        assert_eq!(
            runner.step().map(|s| s.visual_aid.as_str()),
            Some("img_3.png")
        );
    }

    #[test]
    fn unimplemented_setup_completes_immediately() {
        let runner = runner("setup7");
        assert!(runner.is_completed());
        assert_eq!(runner.delta(), Some(&Answers::new()));
        assert!(runner.available_actions().is_empty());
    }

    #[test]
    fn completed_runner_rejects_everything() {
        let mut runner = runner("setup3");
        runner.select("Yes").expect("select");
        assert_matches!(runner.select("No"), Err(WorkflowError::InvalidTransition { .. }));
        assert_matches!(runner.acknowledge(), Err(WorkflowError::InvalidTransition { .. }));
        assert!(!runner.can_submit("No"));
    }
}
