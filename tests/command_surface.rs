use board_engine_lib::boards::BoardService;
use board_engine_lib::commands::{dispatch, serve, AppState, CommandRequest, CommandResponse};
use board_engine_lib::db::Database;
use serde_json::{json, Value};
use std::sync::Arc;

fn state(dir: &tempfile::TempDir) -> AppState {
    let db = Database::new(&dir.path().join("boards.sqlite")).expect("db");
    AppState::new(BoardService::new(Arc::new(db)))
}

async fn call(state: &AppState, command: &str, payload: Value) -> CommandResponse {
    let request: CommandRequest = serde_json::from_value(json!({
        "id": command,
        "command": command,
        "payload": payload,
        "context": { "userId": "user-1", "userAgent": "Mozilla/5.0 (X11; Linux x86_64)" }
    }))
    .expect("request");
    dispatch(state, request).await
}

fn data(response: CommandResponse) -> Value {
    assert!(response.ok, "command failed: {:?}", response.error);
    response.data.expect("data")
}

#[tokio::test]
async fn board_lifecycle_through_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(&dir);

    let available = data(call(&state, "board.checkNameAvailable", json!({ "boardName": "home" })).await);
    assert_eq!(available, json!(true));

    let layout = data(
        call(
            &state,
            "board.create",
            json!({ "boardName": "home", "pageTitle": "Home", "allowGuests": false }),
        )
        .await,
    );
    assert_eq!(layout["kind"], "desktop");
    let board_id = layout["boardId"].as_str().expect("board id").to_string();
    let layout_id = layout["id"].as_str().expect("layout id").to_string();

    let summary = data(
        call(
            &state,
            "board.save",
            json!({
                "boardId": board_id,
                "layoutId": layout_id,
                "sections": [
                    { "id": "s1", "kind": "category", "position": 0, "name": "Media", "items": [
                        { "id": "i1", "kind": "app", "name": "Plex", "url": "http://plex.local",
                          "network": { "pingEnabled": true, "statusCodes": [200, 401] } },
                        { "id": "w1", "kind": "widget", "sort": "clock", "options": { "clock": { "is24Hour": true } } }
                    ] },
                    { "id": "left", "kind": "sidebar-left", "position": "left", "items": [] }
                ]
            }),
        )
        .await,
    );
    assert_eq!(summary["sectionsCreated"], 2);
    assert_eq!(summary["itemsCreated"], 2);

    let view = data(call(&state, "board.byName", json!({ "boardName": "home" })).await);
    assert_eq!(view["name"], "home");
    assert_eq!(view["layoutId"], layout_id.as_str());
    assert_eq!(view["layoutKind"], "desktop");
    let sections = view["sections"].as_array().expect("sections");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0]["id"], "s1");
    assert_eq!(sections[0]["items"][0]["network"]["statusCodes"], json!([200, 401]));
    assert_eq!(sections[0]["items"][1]["options"]["clock"]["is24Hour"], true);

    let customized = data(
        call(
            &state,
            "board.updateCustomization",
            json!({
                "boardName": "home",
                "customization": {
                    "access": { "allowGuests": true },
                    "appearance": { "opacity": 60, "shade": 6 },
                    "pageMetadata": { "metaTitle": "My homelab" }
                }
            }),
        )
        .await,
    );
    assert_eq!(customized["allowGuests"], true);
    assert_eq!(customized["appOpacity"], 60);

    let simple = data(call(&state, "board.byNameSimple", json!({ "boardName": "home" })).await);
    assert_eq!(simple["metaTitle"], "My homelab");

    let boards = data(call(&state, "board.all", Value::Null).await);
    assert_eq!(boards[0]["countApps"], 1);
    assert_eq!(boards[0]["countWidgets"], 1);
    assert_eq!(boards[0]["countCategories"], 1);
    assert_eq!(boards[0]["ownerId"], "user-1");

    let taken = data(call(&state, "board.checkNameAvailable", json!({ "boardName": "home" })).await);
    assert_eq!(taken, json!(false));
}

#[tokio::test]
async fn invalid_payloads_report_every_field_and_change_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(&dir);
    let layout = data(call(&state, "board.create", json!({ "boardName": "home" })).await);

    let response = call(
        &state,
        "board.save",
        json!({
            "boardId": layout["boardId"],
            "layoutId": layout["id"],
            "sections": [
                { "id": "s1", "kind": "category", "position": 0, "items": [
                    { "id": "i1", "kind": "app", "url": "http://plex.local" }
                ] }
            ]
        }),
    )
    .await;
    assert!(!response.ok);
    let error = response.error.expect("error");
    assert_eq!(error.code, "VALIDATION_FAILED");
    assert!(!error.retryable);
    assert!(error.fields.as_ref().map(Vec::len).unwrap_or(0) >= 2);

    let view = data(call(&state, "board.byName", json!({ "boardName": "home" })).await);
    assert!(view["sections"].as_array().expect("sections").is_empty());

    let response = call(&state, "board.create", json!({ "boardName": "has spaces" })).await;
    assert_eq!(response.error.expect("error").code, "VALIDATION_FAILED");

    let response = call(&state, "board.create", json!({ "boardName": "home" })).await;
    assert_eq!(response.error.expect("error").code, "CONFLICT");

    let response = call(&state, "board.byName", json!({ "boardName": "missing" })).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, "NOT_FOUND");
    assert!(!error.retryable);

    let response = call(&state, "board.rename", json!({})).await;
    assert_eq!(response.error.expect("error").code, "VALIDATION_FAILED");
}

#[tokio::test]
async fn json_lines_loop_answers_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(&dir);
    let input = concat!(
        "{\"id\":1,\"command\":\"board.create\",\"payload\":{\"boardName\":\"home\"},",
        "\"context\":{\"userAgent\":\"Mozilla/5.0 (Linux; Android 14) Mobile\"}}\n",
        "\n",
        "not json\n",
        "{\"id\":2,\"command\":\"board.all\"}\n",
    );

    let output = serve(&state, input.as_bytes(), Vec::new()).await.expect("serve");
    let responses: Vec<Value> = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("response json"))
        .collect();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["data"]["kind"], "mobile");
    assert_eq!(responses[1]["id"], Value::Null);
    assert_eq!(responses[1]["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(responses[2]["id"], 2);
    assert_eq!(responses[2]["data"][0]["name"], "home");
}
