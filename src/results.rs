//! Aggregated results for a session, as shown on the results board.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::model::{Element, ElementKind, Response, Session};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceTally {
    pub choice_id: String,
    pub text: Option<String>,
    pub is_correct: bool,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberStats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnswer {
    pub participant_id: String,
    pub file_id: String,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSummary {
    pub element_id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub title: String,
    pub respondents: usize,
    pub choices: Vec<ChoiceTally>,
    pub numbers: Option<NumberStats>,
    pub texts: Vec<String>,
    pub files: Vec<FileAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_participants: usize,
    pub elements: Vec<ElementSummary>,
}

/// Outcome of checking a results request against the session's sharing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    SessionNotFound,
    PinRequired,
    InvalidPin,
}

impl Access {
    pub fn message(self) -> Option<&'static str> {
        match self {
            Access::Granted => None,
            Access::SessionNotFound => Some("Session not found"),
            Access::PinRequired => Some("Pin code required"),
            Access::InvalidPin => Some("Invalid pin code"),
        }
    }
}

/// Public results need nothing; otherwise the pin must match exactly.
/// An unset `results_public` counts as private.
pub fn check_access(session: Option<&Session>, pin_code: Option<&str>) -> Access {
    let Some(session) = session else {
        return Access::SessionNotFound;
    };
    if session.results_public.unwrap_or(false) {
        return Access::Granted;
    }
    match pin_code.filter(|p| !p.is_empty()) {
        None => Access::PinRequired,
        Some(pin) if session.results_pin_code.as_deref() == Some(pin) => Access::Granted,
        Some(_) => Access::InvalidPin,
    }
}

fn number_stats(values: &[f64]) -> Option<NumberStats> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(NumberStats {
        count: values.len(),
        average: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

fn summarize_element(element: &Element, responses: &[&Response]) -> ElementSummary {
    let respondents = responses.len();

    let mut choices = Vec::new();
    if element.kind.has_choices() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for r in responses {
            for id in r.slots.choice_ids.iter().flatten() {
                *counts.entry(id.as_str()).or_default() += 1;
            }
        }
        for choice in element.choices.iter().flatten() {
            let count = counts.get(choice.id.as_str()).copied().unwrap_or(0);
            let percentage = if respondents > 0 {
                count as f64 / respondents as f64 * 100.0
            } else {
                0.0
            };
            choices.push(ChoiceTally {
                choice_id: choice.id.clone(),
                text: choice.text.clone(),
                is_correct: choice.is_correct.unwrap_or(false),
                count,
                percentage,
            });
        }
    }

    let numbers = if element.kind == ElementKind::NumberInput {
        let values: Vec<f64> = responses.iter().filter_map(|r| r.slots.number_value).collect();
        number_stats(&values)
    } else {
        None
    };

    let texts = if element.kind == ElementKind::TextInput {
        responses
            .iter()
            .filter_map(|r| r.slots.text_value.clone())
            .filter(|t| !t.is_empty())
            .collect()
    } else {
        Vec::new()
    };

    let files = if element.kind == ElementKind::FileUpload {
        responses
            .iter()
            .filter_map(|r| {
                r.slots.file_id.as_ref().map(|file_id| FileAnswer {
                    participant_id: r.participant_id.clone(),
                    file_id: file_id.clone(),
                    file_url: None,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    ElementSummary {
        element_id: element.id.clone(),
        kind: element.kind,
        title: element.title.clone(),
        respondents,
        choices,
        numbers,
        texts,
        files,
    }
}

/// Tallies every element in the given order. File URLs are left for the
/// caller to resolve.
pub fn summarize(elements: &[Element], responses: &[Response]) -> Summary {
    let mut by_element: HashMap<&str, Vec<&Response>> = HashMap::new();
    for r in responses {
        by_element.entry(r.element_id.as_str()).or_default().push(r);
    }
    let total_participants = responses
        .iter()
        .map(|r| r.participant_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let elements = elements
        .iter()
        .map(|e| {
            let rs = by_element.get(e.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            summarize_element(e, rs)
        })
        .collect();

    Summary {
        total_participants,
        elements,
    }
}
