//! Payload validation.
//!
//! Each command payload is checked against a compiled JSON Schema first so
//! that every offending field is reported at once, then deserialised into its
//! typed form and checked for cross-field rules the schema cannot express.

use crate::errors::{AppError, AppResult, ValidationErrors};
use crate::models::{
    BoardByNamePayload, BoardItem, BoardNamePayload, CreateBoardPayload, SaveBoardPayload, SectionKind,
    UpdateCustomizationPayload,
};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashSet;

pub const BOARD_NAME_PATTERN: &str = "^[a-zA-Z0-9_-]{1,64}$";

static BOARD_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(BOARD_NAME_PATTERN).expect("valid board name regex"));

static MOBILE_USER_AGENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini").expect("valid user agent regex")
});

fn board_name_schema() -> Value {
    json!({ "type": "string", "pattern": BOARD_NAME_PATTERN })
}

fn nullable_string() -> Value {
    json!({ "type": ["string", "null"] })
}

fn grid_properties() -> Value {
    json!({
        "x": { "type": ["integer", "null"], "minimum": 0 },
        "y": { "type": ["integer", "null"], "minimum": 0 },
        "width": { "type": ["integer", "null"], "minimum": 1 },
        "height": { "type": ["integer", "null"], "minimum": 1 }
    })
}

fn app_schema() -> Value {
    let mut properties = json!({
        "id": { "type": "string", "minLength": 1 },
        "name": { "type": "string", "minLength": 1 },
        "url": { "type": "string" },
        "externalUrl": nullable_string(),
        "iconUrl": nullable_string(),
        "description": nullable_string(),
        "behaviour": {
            "type": "object",
            "properties": {
                "openInNewTab": { "type": "boolean" },
                "tooltipDescription": nullable_string()
            }
        },
        "appearance": {
            "type": "object",
            "properties": {
                "nameStyle": { "enum": ["normal", "hover", "hidden"] },
                "namePosition": { "enum": ["column", "row", "column-reverse", "row-reverse"] },
                "fontSize": { "type": "integer", "minimum": 1 },
                "nameLineClamp": { "type": "integer", "minimum": 0 }
            }
        },
        "network": {
            "type": "object",
            "properties": {
                "pingEnabled": { "type": "boolean" },
                "statusCodes": {
                    "type": "array",
                    "uniqueItems": true,
                    "items": { "type": "integer", "minimum": 100, "maximum": 599 }
                }
            }
        }
    });
    merge_properties(&mut properties, grid_properties());
    json!({
        "type": "object",
        "required": ["id", "name", "url"],
        "properties": properties
    })
}

fn widget_schema() -> Value {
    let mut properties = json!({
        "id": { "type": "string", "minLength": 1 },
        "sort": { "type": "string", "pattern": "^[a-zA-Z][a-zA-Z0-9/_-]*$" },
        "options": { "type": "object" }
    });
    merge_properties(&mut properties, grid_properties());
    json!({
        "type": "object",
        "required": ["id", "sort"],
        "properties": properties
    })
}

fn item_schema() -> Value {
    json!({
        "type": "object",
        "required": ["kind"],
        "properties": {
            "kind": { "enum": ["app", "widget"] }
        },
        "allOf": [
            {
                "if": { "required": ["kind"], "properties": { "kind": { "const": "app" } } },
                "then": app_schema()
            },
            {
                "if": { "required": ["kind"], "properties": { "kind": { "const": "widget" } } },
                "then": widget_schema()
            }
        ]
    })
}

fn section_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "kind", "position"],
        "properties": {
            "id": { "type": "string", "minLength": 1 },
            "kind": { "enum": ["category", "row", "sidebar-left", "sidebar-right"] },
            "position": {
                "anyOf": [
                    { "type": "integer", "minimum": 0 },
                    { "enum": ["left", "right"] }
                ]
            },
            "name": nullable_string(),
            "items": { "type": "array", "items": item_schema() }
        },
        "if": { "required": ["kind"], "properties": { "kind": { "const": "category" } } },
        "then": {
            "required": ["name"],
            "properties": { "name": { "type": "string", "minLength": 1 } }
        }
    })
}

fn compile(mut schema: Value) -> JSONSchema {
    if let Value::Object(root) = &mut schema {
        root.insert("$schema".to_string(), json!("http://json-schema.org/draft-07/schema#"));
    }
    JSONSchema::compile(&schema).expect("valid payload schema")
}

fn merge_properties(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}

static SAVE_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["boardId", "layoutId", "sections"],
        "properties": {
            "boardId": { "type": "string", "minLength": 1 },
            "layoutId": { "type": "string", "minLength": 1 },
            "sections": { "type": "array", "items": section_schema() }
        }
    }))
});

static BY_NAME_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["boardName"],
        "properties": {
            "boardName": board_name_schema(),
            "layoutId": nullable_string()
        }
    }))
});

static BOARD_NAME_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["boardName"],
        "properties": { "boardName": board_name_schema() }
    }))
});

static CREATE_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["boardName"],
        "properties": {
            "boardName": board_name_schema(),
            "pageTitle": nullable_string(),
            "allowGuests": { "type": "boolean" }
        }
    }))
});

static CUSTOMIZATION_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    compile(json!({
        "type": "object",
        "required": ["boardName", "customization"],
        "properties": {
            "boardName": board_name_schema(),
            "customization": {
                "type": "object",
                "properties": {
                    "access": {
                        "type": "object",
                        "properties": { "allowGuests": { "type": "boolean" } }
                    },
                    "network": {
                        "type": "object",
                        "properties": { "pingsEnabled": { "type": "boolean" } }
                    },
                    "appearance": {
                        "type": "object",
                        "properties": {
                            "opacity": { "type": ["integer", "null"], "minimum": 0, "maximum": 100 },
                            "backgroundSrc": nullable_string(),
                            "primaryColor": nullable_string(),
                            "secondaryColor": nullable_string(),
                            "shade": { "type": ["integer", "null"], "minimum": 0, "maximum": 9 },
                            "customCss": nullable_string()
                        }
                    },
                    "pageMetadata": {
                        "type": "object",
                        "properties": {
                            "pageTitle": nullable_string(),
                            "metaTitle": nullable_string(),
                            "logoSrc": nullable_string(),
                            "faviconSrc": nullable_string()
                        }
                    }
                }
            }
        }
    }))
});

fn schema_errors(schema: &JSONSchema, value: &Value) -> ValidationErrors {
    let mut collected = ValidationErrors::default();
    if let Err(errors) = schema.validate(value) {
        for error in errors {
            collected.push(error.instance_path.to_string(), error.to_string());
        }
    }
    collected
}

fn parse_with<T: DeserializeOwned>(schema: &JSONSchema, value: Value) -> AppResult<T> {
    schema_errors(schema, &value).into_result()?;
    serde_json::from_value(value).map_err(|error| AppError::validation("", error.to_string()))
}

pub fn parse_save_payload(value: Value) -> AppResult<SaveBoardPayload> {
    let payload: SaveBoardPayload = parse_with(&SAVE_SCHEMA, value)?;
    check_save_payload(&payload)?;
    Ok(payload)
}

pub fn parse_by_name_payload(value: Value) -> AppResult<BoardByNamePayload> {
    parse_with(&BY_NAME_SCHEMA, value)
}

pub fn parse_board_name_payload(value: Value) -> AppResult<BoardNamePayload> {
    parse_with(&BOARD_NAME_SCHEMA, value)
}

pub fn parse_create_payload(value: Value) -> AppResult<CreateBoardPayload> {
    parse_with(&CREATE_SCHEMA, value)
}

pub fn parse_customization_payload(value: Value) -> AppResult<UpdateCustomizationPayload> {
    parse_with(&CUSTOMIZATION_SCHEMA, value)
}

pub fn check_board_name(name: &str) -> AppResult<()> {
    if BOARD_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(AppError::validation(
            "/boardName",
            format!("'{}' does not match {}", name, BOARD_NAME_PATTERN),
        ))
    }
}

/// Rules spanning several fields of a typed save payload.
///
/// Typed callers skip the JSON Schema, so the per-field rules they would miss
/// (category names, status code range) are repeated here.
pub fn check_save_payload(payload: &SaveBoardPayload) -> AppResult<()> {
    let mut errors = ValidationErrors::default();
    let mut section_ids = HashSet::new();
    let mut item_ids = HashSet::new();

    for (section_index, section) in payload.sections.iter().enumerate() {
        let section_path = format!("/sections/{}", section_index);
        if !section_ids.insert(section.id.as_str()) {
            errors.push(format!("{}/id", section_path), format!("duplicate section id '{}'", section.id));
        }
        if section.position.to_index() < 0 {
            errors.push(format!("{}/position", section_path), "must not be negative");
        }
        if section.kind == SectionKind::Category && section.name.as_deref().map_or(true, str::is_empty) {
            errors.push(format!("{}/name", section_path), "is required for category sections");
        }

        for (item_index, item) in section.items.iter().enumerate() {
            let item_path = format!("{}/items/{}", section_path, item_index);
            if !item_ids.insert(item.id()) {
                errors.push(
                    format!("{}/id", item_path),
                    format!("item '{}' is placed more than once in this layout", item.id()),
                );
            }
            match item {
                BoardItem::App(app) => {
                    let mut seen = HashSet::new();
                    for code in &app.network.status_codes {
                        if !(100..=599).contains(code) {
                            errors.push(format!("{}/network/statusCodes", item_path), format!("{} is not an HTTP status", code));
                        }
                        if !seen.insert(code) {
                            errors.push(format!("{}/network/statusCodes", item_path), format!("duplicate status code {}", code));
                        }
                    }
                }
                BoardItem::Widget(widget) => {
                    check_option_keys(&widget.options, &format!("{}/options", item_path), &mut errors);
                }
            }
        }
    }

    errors.into_result()
}

fn check_option_keys(options: &serde_json::Map<String, Value>, path: &str, errors: &mut ValidationErrors) {
    for (key, value) in options {
        if key.is_empty() || key.contains('.') {
            errors.push(path, format!("option key '{}' must be non-empty and must not contain '.'", key));
        }
        if let Value::Object(nested) = value {
            check_option_keys(nested, &format!("{}/{}", path, key), errors);
        }
    }
}

pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    MOBILE_USER_AGENT_RE.is_match(user_agent)
}
