use crate::error::Result;
use crate::error::WorkflowError;
use crate::record::AnswerValue;
use crate::record::Answers;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

/// Option text a front end shows before the operator has chosen anything.
pub const PLACEHOLDER_OPTION: &str = "---";

#[derive(Debug, Clone, Deserialize)]
pub struct SetupCatalog {
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    #[serde(default)]
    setups: Vec<Setup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Setup {
    pub id: String,
    pub display_name: String,
    pub key_prefix: String,
    #[serde(flatten)]
    pub kind: SetupKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetupKind {
    SingleQuestion(QuestionSpec),
    SteppedChecklist { steps: Vec<StepSpec> },
    Unimplemented,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionSpec {
    #[serde(default)]
    pub visual_aid: Option<String>,
    pub marker: String,
    pub detail: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub detail_options: Vec<String>,
}

impl QuestionSpec {
    pub fn requires_detail(&self, option: &str) -> bool {
        self.detail_options.iter().any(|candidate| candidate == option)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepSpec {
    pub prompt: String,
    pub visual_aid: String,
    #[serde(default)]
    pub answer: Option<String>,
}

impl Setup {
    pub fn answer_key(&self, suffix: &str) -> String {
        format!("{} - {suffix}", self.key_prefix)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SetupKind::SingleQuestion(_) => "single_question",
            SetupKind::SteppedChecklist { .. } => "stepped_checklist",
            SetupKind::Unimplemented => "unimplemented",
        }
    }

    /// Answer-keys this setup writes, paired with the value a fresh record holds.
    pub fn placeholder_keys(&self) -> Vec<(String, AnswerValue)> {
        match &self.kind {
            SetupKind::SingleQuestion(question) => vec![
                (self.answer_key(&question.marker), AnswerValue::Null),
                (self.answer_key(&question.detail), AnswerValue::Null),
            ],
            SetupKind::SteppedChecklist { steps } => steps
                .iter()
                .filter_map(|step| step.answer.as_deref())
                .map(|answer| (self.answer_key(answer), AnswerValue::Bool(false)))
                .collect(),
            SetupKind::Unimplemented => Vec::new(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("setup id must not be empty".to_string());
        }
        match &self.kind {
            SetupKind::SingleQuestion(question) => {
                if question.options.is_empty() {
                    return Err(format!("setup {} declares no options", self.id));
                }
                if question.options.iter().any(|option| option == PLACEHOLDER_OPTION) {
                    return Err(format!(
                        "setup {} uses the placeholder {PLACEHOLDER_OPTION:?} as an option",
                        self.id
                    ));
                }
                if question.marker == question.detail {
                    return Err(format!(
                        "setup {} uses {:?} as both marker and detail",
                        self.id, question.marker
                    ));
                }
                if let Some(unknown) = question
                    .detail_options
                    .iter()
                    .find(|option| !question.options.contains(option))
                {
                    return Err(format!(
                        "setup {} detail option {unknown:?} is not one of its options",
                        self.id
                    ));
                }
            }
            SetupKind::SteppedChecklist { steps } => {
                if steps.is_empty() {
                    return Err(format!("setup {} declares no steps", self.id));
                }
                let mut answers: HashSet<&str> = HashSet::new();
                if let Some(repeated) = steps
                    .iter()
                    .filter_map(|step| step.answer.as_deref())
                    .find(|answer| !answers.insert(*answer))
                {
                    return Err(format!(
                        "setup {} records {repeated:?} on more than one step",
                        self.id
                    ));
                }
            }
            SetupKind::Unimplemented => {}
        }
        Ok(())
    }
}

impl SetupCatalog {
    pub fn new(setups: Vec<Setup>) -> Result<Self> {
        let catalog = Self {
            source_path: None,
            setups,
        };
        catalog.validate().map_err(WorkflowError::Validation)?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let catalog_error = |message: String| WorkflowError::Catalog {
            path: path.to_path_buf(),
            message,
        };
        let contents = fs::read_to_string(path).map_err(|err| catalog_error(err.to_string()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed: std::result::Result<SetupCatalog, String> = match ext.as_str() {
            "yml" | "yaml" => serde_yaml::from_str(&contents).map_err(|err| err.to_string()),
            "toml" | "tml" => toml::from_str(&contents).map_err(|err| err.to_string()),
            _ => serde_yaml::from_str(&contents)
                .or_else(|_| toml::from_str(&contents))
                .map_err(|err| format!("parse catalog (yaml or toml): {err}")),
        };
        let mut catalog = parsed.map_err(catalog_error)?;
        catalog.validate().map_err(catalog_error)?;
        catalog.source_path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), setups = catalog.setups.len(), "loaded setup catalog");
        Ok(catalog)
    }

    /// The fixed procedure list operators run on every device.
    pub fn builtin() -> Self {
        let reach_question = |visual_aid: &str| {
            SetupKind::SingleQuestion(QuestionSpec {
                visual_aid: Some(visual_aid.to_string()),
                marker: "Unit Reach Marker".to_string(),
                detail: "Measured Max Height".to_string(),
                options: vec!["No".to_string(), "Yes".to_string()],
                detail_options: vec!["No".to_string()],
            })
        };
        let step = |prompt: &str, visual_aid: &str, answer: Option<&str>| StepSpec {
            prompt: prompt.to_string(),
            visual_aid: visual_aid.to_string(),
            answer: answer.map(str::to_string),
        };
        let setup = |number: u8, title: &str, kind: SetupKind| Setup {
            id: format!("setup{number}"),
            display_name: format!("Test Setup #{number}:{title}"),
            key_prefix: format!("Setup{number}"),
            kind,
        };
        Self {
            source_path: None,
            setups: vec![
                setup(2, "Telescope: Range, manual.", reach_question("img.png")),
                setup(3, "Lift: Range, powered", reach_question("img.png")),
                setup(
                    4,
                    "Deflection, vertical",
                    SetupKind::SteppedChecklist {
                        steps: vec![
                            step("Step 1: Check this first.", "img_2.png", None),
                            step(
                                "Step 2: Click to Zero Vertical Position Dial.",
                                "img_3.png",
                                Some("Click to Zero Vertical Position Dial"),
                            ),
                            step(
                                "Click to record vertical deflection.",
                                "img_4.png",
                                Some("Click to record vertical deflection"),
                            ),
                        ],
                    },
                ),
                setup(5, "(Right Bracket) Deflection, horizontal", SetupKind::Unimplemented),
                setup(6, "(Right Bracket) Lift: Behavior, motion", SetupKind::Unimplemented),
                setup(7, "(Left Bracket) Deflection, horizontal", SetupKind::Unimplemented),
                setup(8, "(Left Bracket) Lift: Behavior, motion", SetupKind::Unimplemented),
            ],
        }
    }

    pub fn list_setups(&self) -> &[Setup] {
        &self.setups
    }

    pub fn get(&self, id: &str) -> Result<&Setup> {
        self.setups
            .iter()
            .find(|setup| setup.id == id)
            .ok_or_else(|| WorkflowError::NotFound {
                setup_id: id.to_string(),
            })
    }

    /// Every answer-key in catalog order with the value a fresh record holds.
    pub fn placeholder_keys(&self) -> Answers {
        self.setups
            .iter()
            .flat_map(Setup::placeholder_keys)
            .collect()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.setups.is_empty() {
            return Err("setup catalog must contain at least one setup".to_string());
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut keys: HashSet<String> = HashSet::new();
        for setup in &self.setups {
            if !seen.insert(setup.id.as_str()) {
                return Err(format!("duplicate setup id {}", setup.id));
            }
            setup.validate()?;
            for (key, _) in setup.placeholder_keys() {
                if !keys.insert(key.clone()) {
                    return Err(format!(
                        "setup {} writes answer-key {key:?}, which is already taken",
                        setup.id
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for SetupCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
