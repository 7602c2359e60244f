mod test_support;

use serde_json::json;
use test_support::{
    create_element, error_code, open_with_session, request_err_as, request_ok, request_ok_as,
    spawn_sidecar, str_field, OTHER_TEACHER, TEACHER,
};

#[test]
fn sessions_are_listed_per_teacher_newest_first() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, first_id, first_code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-list", "First");
    assert_eq!(first_code.len(), 6);
    assert!(first_code.chars().all(|c| c.is_ascii_digit()));

    let second = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "second",
        "sessions.create",
        json!({ "title": "Second", "resultsPublic": false, "resultsPinCode": "4321" }),
    );
    assert_ne!(str_field(&second, "sessionCode"), first_code);
    let _ = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(OTHER_TEACHER),
        "foreign",
        "sessions.create",
        json!({ "title": "Someone else" }),
    );

    let listed = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "list",
        "sessions.list",
        json!({}),
    );
    let ids: Vec<String> = listed
        .as_array()
        .expect("array")
        .iter()
        .map(|s| str_field(s, "id"))
        .collect();
    assert_eq!(ids, vec![str_field(&second, "sessionId"), first_id.clone()]);
    assert_eq!(listed[1]["isActive"], json!(true));
    assert_eq!(listed[1]["resultsPublic"], json!(true));
    assert_eq!(listed[0]["resultsPublic"], json!(false));

    let anonymous = request_ok(&mut stdin, &mut reader, "anon", "sessions.list", json!({}));
    assert_eq!(anonymous, json!([]));

    let e = request_err_as(
        &mut stdin,
        &mut reader,
        None,
        "anon-create",
        "sessions.create",
        json!({ "title": "Nope" }),
    );
    assert_eq!(error_code(&e), "unauthenticated");
}

#[test]
fn foreign_and_missing_sessions_look_the_same() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, session_id, _code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-hide", "Mine");

    let foreign = request_err_as(
        &mut stdin,
        &mut reader,
        Some(OTHER_TEACHER),
        "foreign",
        "sessions.update",
        json!({ "sessionId": session_id, "title": "Hijacked" }),
    );
    let missing = request_err_as(
        &mut stdin,
        &mut reader,
        Some(OTHER_TEACHER),
        "missing",
        "sessions.update",
        json!({ "sessionId": "no-such-session", "title": "Hijacked" }),
    );
    assert_eq!(error_code(&foreign), "unauthorized");
    assert_eq!(foreign, missing);
}

#[test]
fn update_and_toggle_touch_only_what_is_given() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, session_id, code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-update", "Before");

    let updated = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "update",
        "sessions.update",
        json!({ "sessionId": session_id, "title": "After", "bgColor": "#101010" }),
    );
    assert_eq!(updated["fieldsUpdated"], json!(2));
    let _ = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "toggle",
        "sessions.setActive",
        json!({ "sessionId": session_id, "active": false }),
    );

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "by-code",
        "sessions.byCode",
        json!({ "sessionCode": code }),
    );
    assert_eq!(found["title"], json!("After"));
    assert_eq!(found["bgColor"], json!("#101010"));
    assert_eq!(found["isActive"], json!(false));
    assert!(found["completionImageUrl"].is_null());

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "no-code",
        "sessions.byCode",
        json!({ "sessionCode": "000000" }),
    );
    assert!(none.is_null());
}

#[test]
fn results_access_follows_sharing_settings() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, _public_id, public_code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-access", "Public");
    let private = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "private",
        "sessions.create",
        json!({ "title": "Private", "resultsPublic": false, "resultsPinCode": "1234" }),
    );
    let private_code = str_field(&private, "sessionCode");

    let mut check = |id: &str, code: &str, pin: Option<&str>| {
        let mut params = json!({ "sessionCode": code });
        if let Some(pin) = pin {
            params["pinCode"] = json!(pin);
        }
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "sessions.verifyResultsAccess",
            params,
        )
    };

    assert_eq!(check("a", &public_code, None), json!({ "success": true }));
    assert_eq!(
        check("b", "999999x", None),
        json!({ "success": false, "error": "Session not found" })
    );
    assert_eq!(
        check("c", &private_code, None),
        json!({ "success": false, "error": "Pin code required" })
    );
    assert_eq!(
        check("d", &private_code, Some("0000")),
        json!({ "success": false, "error": "Invalid pin code" })
    );
    assert_eq!(check("e", &private_code, Some("1234")), json!({ "success": true }));
}

#[test]
fn deleting_a_session_cascades_to_elements_and_responses() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, session_id, code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-cascade", "Doomed");
    let q1 = create_element(
        &mut stdin,
        &mut reader,
        "q1",
        &session_id,
        json!({ "type": "text_input", "title": "Q1" }),
    );
    let q2 = create_element(
        &mut stdin,
        &mut reader,
        "q2",
        &session_id,
        json!({ "type": "number_input", "title": "Q2" }),
    );
    for (i, participant) in ["p1", "p2"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("t{}", i),
            "responses.submit",
            json!({ "sessionId": session_id, "elementId": q1, "participantId": participant, "textValue": "hi" }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("n{}", i),
            "responses.submit",
            json!({ "sessionId": session_id, "elementId": q2, "participantId": participant, "numberValue": 1 }),
        );
    }

    let deleted = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "delete",
        "sessions.delete",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(deleted["responsesDeleted"], json!(4));
    assert_eq!(deleted["elementsDeleted"], json!(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "elements.list",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(listed, json!([]));
    let responses = request_ok(
        &mut stdin,
        &mut reader,
        "responses",
        "responses.forParticipant",
        json!({ "sessionId": session_id, "participantId": "p1" }),
    );
    assert_eq!(responses, json!([]));
    let by_code = request_ok(
        &mut stdin,
        &mut reader,
        "by-code",
        "sessions.byCode",
        json!({ "sessionCode": code }),
    );
    assert!(by_code.is_null());

    let e = request_err_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "element-gone",
        "elements.update",
        json!({ "elementId": q1, "title": "ghost" }),
    );
    assert_eq!(error_code(&e), "not_found");
}

#[test]
fn cloning_copies_elements_and_remaps_logic() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (_ws, session_id, code) =
        open_with_session(&mut stdin, &mut reader, "pollupd-sessions-clone", "Quiz");
    let gate = create_element(
        &mut stdin,
        &mut reader,
        "gate",
        &session_id,
        json!({
            "type": "single_choice",
            "title": "Continue?",
            "choices": [{ "id": "yes", "text": "Yes" }, { "id": "no", "text": "No" }]
        }),
    );
    let follow = create_element(
        &mut stdin,
        &mut reader,
        "follow",
        &session_id,
        json!({ "type": "text_input", "title": "Why?" }),
    );
    let _ = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "logic",
        "elements.setConditionalLogic",
        json!({
            "elementId": follow,
            "conditionalLogic": {
                "enabled": true,
                "dependsOnElementId": gate,
                "condition": "choice_selected",
                "value": "yes"
            }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "answer",
        "responses.submit",
        json!({ "sessionId": session_id, "elementId": gate, "participantId": "p1", "choiceIds": ["yes"] }),
    );

    let cloned = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "clone",
        "sessions.clone",
        json!({ "sessionId": session_id }),
    );
    let clone_id = str_field(&cloned, "sessionId");
    let clone_code = str_field(&cloned, "sessionCode");
    assert_ne!(clone_id, session_id);
    assert_ne!(clone_code, code);

    let copy = request_ok(
        &mut stdin,
        &mut reader,
        "copy",
        "sessions.byCode",
        json!({ "sessionCode": clone_code }),
    );
    assert_eq!(copy["title"], json!("Quiz (Copy)"));
    assert_eq!(copy["isActive"], json!(false));
    assert_eq!(copy["teacherId"], json!(TEACHER));

    let elements = request_ok(
        &mut stdin,
        &mut reader,
        "copied",
        "elements.list",
        json!({ "sessionId": clone_id }),
    );
    let elements = elements.as_array().expect("array");
    assert_eq!(elements.len(), 2);
    let new_gate = str_field(&elements[0], "id");
    assert_ne!(new_gate, gate);
    assert_eq!(elements[0]["order"], json!(0));
    assert_eq!(elements[1]["order"], json!(1));
    assert_eq!(elements[1]["title"], json!("Why?"));
    assert_eq!(
        elements[1]["conditionalLogic"],
        json!({
            "enabled": true,
            "dependsOnElementId": new_gate,
            "condition": "choice_selected",
            "value": "yes"
        })
    );

    // Responses stay with the original session.
    let copied_responses = request_ok_as(
        &mut stdin,
        &mut reader,
        Some(TEACHER),
        "copied-responses",
        "responses.forSession",
        json!({ "sessionId": clone_id }),
    );
    assert_eq!(copied_responses, json!([]));
}
