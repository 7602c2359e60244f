use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    SingleChoice,
    SingleChoiceUnique,
    MultipleChoice,
    TextInput,
    NumberInput,
    FileUpload,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::SingleChoice => "single_choice",
            ElementKind::SingleChoiceUnique => "single_choice_unique",
            ElementKind::MultipleChoice => "multiple_choice",
            ElementKind::TextInput => "text_input",
            ElementKind::NumberInput => "number_input",
            ElementKind::FileUpload => "file_upload",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "single_choice" => Some(ElementKind::SingleChoice),
            "single_choice_unique" => Some(ElementKind::SingleChoiceUnique),
            "multiple_choice" => Some(ElementKind::MultipleChoice),
            "text_input" => Some(ElementKind::TextInput),
            "number_input" => Some(ElementKind::NumberInput),
            "file_upload" => Some(ElementKind::FileUpload),
            _ => None,
        }
    }

    pub fn has_choices(self) -> bool {
        matches!(
            self,
            ElementKind::SingleChoice | ElementKind::SingleChoiceUnique | ElementKind::MultipleChoice
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// Comparison applied between the dependency's recorded answer and the rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    ChoiceSelected,
    ChoiceNotSelected,
    /// Stored rules written by a newer client; never matches.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalLogic {
    pub enabled: bool,
    pub depends_on_element_id: String,
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Persisted shape of an answer: four optional slots, one per element family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSlots {
    #[serde(default)]
    pub text_value: Option<String>,
    #[serde(default)]
    pub number_value: Option<f64>,
    #[serde(default)]
    pub choice_ids: Option<Vec<String>>,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseValue {
    Text(String),
    Number(f64),
    Choices(Vec<String>),
    File(String),
}

impl ResponseSlots {
    pub fn populated(&self) -> usize {
        [
            self.text_value.is_some(),
            self.number_value.is_some(),
            self.choice_ids.is_some(),
            self.file_id.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// The answer as seen through the element's type. `None` unless the slot
    /// matching `kind` is the only one populated.
    pub fn typed(&self, kind: ElementKind) -> Option<ResponseValue> {
        if self.populated() != 1 {
            return None;
        }
        match kind {
            ElementKind::TextInput => self.text_value.clone().map(ResponseValue::Text),
            ElementKind::NumberInput => self.number_value.map(ResponseValue::Number),
            ElementKind::FileUpload => self.file_id.clone().map(ResponseValue::File),
            ElementKind::SingleChoice
            | ElementKind::SingleChoiceUnique
            | ElementKind::MultipleChoice => self.choice_ids.clone().map(ResponseValue::Choices),
        }
    }

    /// The first submitted choice, which is the claim for `single_choice_unique`.
    pub fn first_choice(&self) -> Option<&str> {
        self.choice_ids
            .as_ref()
            .and_then(|ids| ids.first())
            .map(|s| s.as_str())
    }

    pub fn has_choice(&self, choice_id: &str) -> bool {
        self.choice_ids
            .as_ref()
            .map(|ids| ids.iter().any(|c| c == choice_id))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: String,
    #[serde(rename = "isActive")]
    pub active: bool,
    pub session_code: String,
    pub results_public: Option<bool>,
    pub results_pin_code: Option<String>,
    pub completion_title: Option<String>,
    pub completion_subtitle: Option<String>,
    pub completion_description: Option<String>,
    pub completion_image_id: Option<String>,
    pub bg_color: Option<String>,
    pub accent_color: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub image_id: Option<String>,
    pub order: i64,
    #[serde(rename = "isActive")]
    pub active: bool,
    pub choices: Option<Vec<Choice>>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub step: Option<f64>,
    pub conditional_logic: Option<ConditionalLogic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub session_id: String,
    pub element_id: String,
    pub participant_id: String,
    #[serde(flatten)]
    pub slots: ResponseSlots,
    pub created_at: String,
    pub updated_at: String,
}
