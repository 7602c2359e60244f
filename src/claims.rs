//! Exclusive choices on `single_choice_unique` elements.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Element, ElementKind, Response};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubleClaim {
    pub element_id: String,
    pub choice_id: String,
    pub participant_ids: Vec<String>,
}

/// True when anyone other than `participant_id` has recorded `choice_id`.
pub fn claimed_by_other(responses: &[Response], participant_id: &str, choice_id: &str) -> bool {
    responses
        .iter()
        .any(|r| r.participant_id != participant_id && r.slots.has_choice(choice_id))
}

/// Choice ids held by participants other than `participant_id`, in response order.
pub fn taken_by_others(responses: &[Response], participant_id: &str) -> Vec<String> {
    responses
        .iter()
        .filter(|r| r.participant_id != participant_id)
        .filter_map(|r| r.slots.choice_ids.as_ref())
        .flatten()
        .cloned()
        .collect()
}

/// Every exclusive choice currently recorded by more than one participant.
pub fn double_claims(elements: &[Element], responses: &[Response]) -> Vec<DoubleClaim> {
    let mut out = Vec::new();
    for element in elements
        .iter()
        .filter(|e| e.kind == ElementKind::SingleChoiceUnique)
    {
        let mut holders: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for r in responses.iter().filter(|r| r.element_id == element.id) {
            for choice in r.slots.choice_ids.iter().flatten() {
                let entry = holders.entry(choice.as_str()).or_default();
                if !entry.contains(&r.participant_id) {
                    entry.push(r.participant_id.clone());
                }
            }
        }
        for (choice, participants) in holders {
            if participants.len() > 1 {
                out.push(DoubleClaim {
                    element_id: element.id.clone(),
                    choice_id: choice.to_string(),
                    participant_ids: participants,
                });
            }
        }
    }
    out
}
