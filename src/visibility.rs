use std::collections::HashMap;

use crate::model::{Condition, Element, ResponseSlots};

/// Evaluates one rule against the dependency's recorded answer.
///
/// Mismatched slot types, empty rule values and unknown conditions all
/// evaluate to `false`, which keeps the dependent element hidden.
pub fn evaluate_condition(condition: Condition, value: Option<&str>, response: &ResponseSlots) -> bool {
    let filled = value.filter(|v| !v.is_empty());
    match condition {
        Condition::Equals => {
            if let Some(text) = response.text_value.as_deref() {
                return value == Some(text);
            }
            if let Some(n) = response.number_value {
                return value == Some(number_string(n).as_str());
            }
            false
        }
        Condition::NotEquals => {
            if let Some(text) = response.text_value.as_deref() {
                return value != Some(text);
            }
            if let Some(n) = response.number_value {
                return value != Some(number_string(n).as_str());
            }
            false
        }
        Condition::Contains => match (response.text_value.as_deref(), filled) {
            (Some(text), Some(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
        Condition::GreaterThan => match (response.number_value, filled.and_then(parse_leading_float)) {
            (Some(n), Some(bound)) => n > bound,
            _ => false,
        },
        Condition::LessThan => match (response.number_value, filled.and_then(parse_leading_float)) {
            (Some(n), Some(bound)) => n < bound,
            _ => false,
        },
        Condition::ChoiceSelected => match (response.choice_ids.as_ref(), filled) {
            (Some(ids), Some(choice)) => ids.iter().any(|id| id == choice),
            _ => false,
        },
        Condition::ChoiceNotSelected => match (response.choice_ids.as_ref(), filled) {
            (Some(ids), Some(choice)) => !ids.iter().any(|id| id == choice),
            _ => false,
        },
        Condition::Unknown => false,
    }
}

/// Filters `elements` (already in display order) down to what this
/// participant should currently see. Inactive elements are dropped.
pub fn visible_elements<'a>(
    elements: &'a [Element],
    responses: &HashMap<String, ResponseSlots>,
) -> Vec<&'a Element> {
    elements
        .iter()
        .filter(|element| element.active)
        .filter(|element| match element.conditional_logic.as_ref() {
            Some(logic) if logic.enabled => responses
                .get(&logic.depends_on_element_id)
                .map(|answer| evaluate_condition(logic.condition, logic.value.as_deref(), answer))
                .unwrap_or(false),
            _ => true,
        })
        .collect()
}

/// Shortest form of a recorded number, as clients display it: plain decimal
/// for 1e-6 <= |n| < 1e21, exponent form (`1e+21`, `1.5e-7`) outside that.
pub fn number_string(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let exp = format!("{:e}", n);
        return match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        };
    }
    format!("{}", n)
}

/// Parses the longest numeric prefix of `raw`, ignoring leading whitespace
/// ("3.5kg" -> 3.5). Returns `None` when no digits lead the string.
pub fn parse_leading_float(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        return s[..end + "Infinity".len()].replace("Infinity", "inf").parse().ok();
    }

    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionalLogic, ElementKind};

    fn text(v: &str) -> ResponseSlots {
        ResponseSlots {
            text_value: Some(v.to_string()),
            ..Default::default()
        }
    }

    fn number(v: f64) -> ResponseSlots {
        ResponseSlots {
            number_value: Some(v),
            ..Default::default()
        }
    }

    fn choices(ids: &[&str]) -> ResponseSlots {
        ResponseSlots {
            choice_ids: Some(ids.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    fn element(id: &str, order: i64, logic: Option<ConditionalLogic>) -> Element {
        Element {
            id: id.to_string(),
            session_id: "s1".to_string(),
            kind: ElementKind::TextInput,
            title: id.to_uppercase(),
            subtitle: None,
            description: None,
            image_id: None,
            order,
            active: true,
            choices: None,
            min_value: None,
            max_value: None,
            step: None,
            conditional_logic: logic,
        }
    }

    fn rule(depends_on: &str, condition: Condition, value: &str) -> Option<ConditionalLogic> {
        Some(ConditionalLogic {
            enabled: true,
            depends_on_element_id: depends_on.to_string(),
            condition,
            value: Some(value.to_string()),
        })
    }

    #[test]
    fn numeric_comparisons() {
        assert!(evaluate_condition(Condition::GreaterThan, Some("3"), &number(5.0)));
        assert!(!evaluate_condition(Condition::LessThan, Some("3"), &number(5.0)));
        assert!(evaluate_condition(Condition::LessThan, Some("10kg"), &number(5.0)));
        assert!(!evaluate_condition(Condition::GreaterThan, Some("abc"), &number(5.0)));
        assert!(!evaluate_condition(Condition::GreaterThan, Some("3"), &text("5")));
    }

    #[test]
    fn contains_is_case_insensitive_and_needs_a_value() {
        assert!(evaluate_condition(Condition::Contains, Some("whale"), &text("Blue Whale")));
        assert!(!evaluate_condition(Condition::Contains, Some(""), &text("Blue Whale")));
        assert!(!evaluate_condition(Condition::Contains, None, &text("Blue Whale")));
        assert!(!evaluate_condition(Condition::Contains, Some("5"), &number(5.0)));
    }

    #[test]
    fn equality_on_text_and_numbers() {
        assert!(evaluate_condition(Condition::Equals, Some("Blue"), &text("Blue")));
        assert!(!evaluate_condition(Condition::Equals, Some("blue"), &text("Blue")));
        assert!(evaluate_condition(Condition::Equals, Some("5"), &number(5.0)));
        assert!(evaluate_condition(Condition::Equals, Some("2.5"), &number(2.5)));
        assert!(!evaluate_condition(Condition::Equals, Some("5.0"), &number(5.0)));
        assert!(evaluate_condition(Condition::NotEquals, Some("Red"), &text("Blue")));
        assert!(!evaluate_condition(Condition::NotEquals, Some("5"), &number(5.0)));
        // No text or number slot at all.
        assert!(!evaluate_condition(Condition::Equals, Some("a"), &choices(&["a"])));
        assert!(!evaluate_condition(Condition::NotEquals, Some("a"), &choices(&["a"])));
    }

    #[test]
    fn number_text_switches_to_exponent_form_at_the_extremes() {
        assert_eq!(number_string(-0.0), "0");
        assert_eq!(number_string(123.5), "123.5");
        assert_eq!(number_string(1e20), "100000000000000000000");
        assert_eq!(number_string(1e21), "1e+21");
        assert_eq!(number_string(-2.5e30), "-2.5e+30");
        assert_eq!(number_string(0.000001), "0.000001");
        assert_eq!(number_string(1e-7), "1e-7");
        assert_eq!(number_string(1.5e-7), "1.5e-7");
        assert_eq!(number_string(f64::INFINITY), "Infinity");
        assert!(evaluate_condition(Condition::Equals, Some("1e+21"), &number(1e21)));
        assert!(!evaluate_condition(Condition::Equals, Some("1000000000000000000000"), &number(1e21)));
    }

    #[test]
    fn choice_membership() {
        let answer = choices(&["red", "green"]);
        assert!(evaluate_condition(Condition::ChoiceSelected, Some("red"), &answer));
        assert!(!evaluate_condition(Condition::ChoiceSelected, Some("blue"), &answer));
        assert!(evaluate_condition(Condition::ChoiceNotSelected, Some("blue"), &answer));
        assert!(!evaluate_condition(Condition::ChoiceNotSelected, Some("red"), &answer));
        assert!(evaluate_condition(Condition::ChoiceNotSelected, Some("red"), &choices(&[])));
        assert!(!evaluate_condition(Condition::ChoiceSelected, Some("red"), &text("red")));
    }

    #[test]
    fn unknown_condition_never_matches() {
        assert!(!evaluate_condition(Condition::Unknown, Some("x"), &text("x")));
    }

    #[test]
    fn unanswered_dependency_hides_element_for_every_condition() {
        for condition in [
            Condition::Equals,
            Condition::NotEquals,
            Condition::Contains,
            Condition::GreaterThan,
            Condition::LessThan,
            Condition::ChoiceSelected,
            Condition::ChoiceNotSelected,
        ] {
            let elements = vec![element("a", 0, None), element("b", 1, rule("a", condition, "x"))];
            let visible = visible_elements(&elements, &HashMap::new());
            let ids: Vec<&str> = visible.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["a"], "condition {:?}", condition);
        }
    }

    #[test]
    fn visibility_keeps_input_order_and_skips_inactive() {
        let mut inactive = element("c", 2, None);
        inactive.active = false;
        let mut disabled = element("d", 3, rule("zzz", Condition::Equals, "x"));
        if let Some(logic) = disabled.conditional_logic.as_mut() {
            logic.enabled = false;
        }
        let elements = vec![
            element("a", 0, None),
            element("b", 1, rule("a", Condition::Contains, "whale")),
            inactive,
            disabled,
            element("e", 4, rule("a", Condition::Equals, "nope")),
        ];
        let mut answers = HashMap::new();
        answers.insert("a".to_string(), text("Blue Whale"));

        let ids: Vec<&str> = visible_elements(&elements, &answers)
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
    }

    #[test]
    fn leading_float_parsing() {
        assert_eq!(parse_leading_float("3"), Some(3.0));
        assert_eq!(parse_leading_float("  -2.5e1x"), Some(-25.0));
        assert_eq!(parse_leading_float(".5"), Some(0.5));
        assert_eq!(parse_leading_float("7e"), Some(7.0));
        assert_eq!(parse_leading_float("Infinity"), Some(f64::INFINITY));
        assert_eq!(parse_leading_float("abc"), None);
        assert_eq!(parse_leading_float("-"), None);
        assert_eq!(number_string(5.0), "5");
        assert_eq!(number_string(-0.0), "0");
        assert_eq!(number_string(0.25), "0.25");
    }
}
