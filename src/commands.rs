//! JSON command surface: untyped payloads in, typed results or client errors out.

use crate::boards::{BoardService, RequestContext};
use crate::errors::{AppError, AppResult, FieldError};
use crate::validation::{
    parse_board_name_payload, parse_by_name_payload, parse_create_payload, parse_customization_payload,
    parse_save_payload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Clone)]
pub struct AppState {
    pub boards: BoardService,
}

impl AppState {
    pub fn new(boards: BoardService) -> Self {
        Self { boards }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default)]
    pub id: Value,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub context: RequestContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClientError>,
}

impl CommandResponse {
    fn success(id: Value, data: Value) -> Self {
        Self {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(id: Value, error: ClientError) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

pub fn to_client_error(error: &AppError) -> ClientError {
    let fields = match error {
        AppError::Validation(errors) => Some(errors.fields().to_vec()),
        _ => None,
    };
    // Storage details stay in the logs.
    let message = match error {
        AppError::Transaction { step, .. } => format!("saving the board failed at step {}", step),
        AppError::Io(_) | AppError::Internal(_) => "internal error".to_string(),
        other => other.to_string(),
    };
    ClientError {
        code: error.code().to_string(),
        message,
        retryable: error.is_retryable(),
        fields,
    }
}

fn to_data<T: Serialize>(result: AppResult<T>) -> AppResult<Value> {
    Ok(serde_json::to_value(result?)?)
}

async fn board_by_name(state: &AppState, payload: Value) -> AppResult<Value> {
    let payload = parse_by_name_payload(payload)?;
    to_data(state.boards.by_name(payload).await)
}

async fn board_by_name_simple(state: &AppState, payload: Value) -> AppResult<Value> {
    let payload = parse_board_name_payload(payload)?;
    to_data(state.boards.by_name_simple(payload.board_name).await)
}

async fn board_save(state: &AppState, payload: Value) -> AppResult<Value> {
    let payload = parse_save_payload(payload)?;
    to_data(state.boards.save(payload).await)
}

async fn board_create(state: &AppState, payload: Value, context: RequestContext) -> AppResult<Value> {
    let payload = parse_create_payload(payload)?;
    to_data(state.boards.create(payload, context).await)
}

async fn board_update_customization(state: &AppState, payload: Value) -> AppResult<Value> {
    let payload = parse_customization_payload(payload)?;
    to_data(state.boards.update_customization(payload).await)
}

async fn board_check_name_available(state: &AppState, payload: Value) -> AppResult<Value> {
    let payload = parse_board_name_payload(payload)?;
    to_data(state.boards.check_name_available(payload.board_name).await)
}

async fn board_all(state: &AppState) -> AppResult<Value> {
    to_data(state.boards.list().await)
}

pub async fn dispatch(state: &AppState, request: CommandRequest) -> CommandResponse {
    let CommandRequest {
        id,
        command,
        payload,
        context,
    } = request;
    let result = match command.as_str() {
        "board.byName" => board_by_name(state, payload).await,
        "board.byNameSimple" => board_by_name_simple(state, payload).await,
        "board.save" => board_save(state, payload).await,
        "board.create" => board_create(state, payload, context).await,
        "board.updateCustomization" => board_update_customization(state, payload).await,
        "board.checkNameAvailable" => board_check_name_available(state, payload).await,
        "board.all" => board_all(state).await,
        other => Err(AppError::validation("/command", format!("unknown command '{}'", other))),
    };
    match result {
        Ok(data) => CommandResponse::success(id, data),
        Err(error) => {
            if error.is_retryable() {
                tracing::error!(command = %command, error = %error, "command failed");
            } else {
                tracing::debug!(command = %command, error = %error, "command rejected");
            }
            CommandResponse::failure(id, to_client_error(&error))
        }
    }
}

/// Decodes one JSON line and dispatches it. Malformed lines answer with a null id.
pub async fn handle_line(state: &AppState, line: &str) -> CommandResponse {
    match serde_json::from_str::<CommandRequest>(line) {
        Ok(request) => dispatch(state, request).await,
        Err(error) => CommandResponse::failure(
            Value::Null,
            to_client_error(&AppError::validation("", format!("malformed request: {}", error))),
        ),
    }
}

/// JSON-lines loop: one request per input line, one response per output line, in order.
pub async fn serve<R, W>(state: &AppState, reader: R, mut writer: W) -> std::io::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(state, &line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(writer)
}
