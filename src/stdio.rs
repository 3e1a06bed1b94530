//! Line-delimited JSON transport.
//!
//! One request object per input line, one response object per output line,
//! processed strictly in order. Logging must go to stderr while this runs.

use miette::Diagnostic;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument};

use crate::db::{Database, GLOBAL_USER, Params};
use crate::dispatch::{DispatchError, DispatchRequest, Dispatcher};
use crate::upstream::Upstream;

#[derive(Error, Diagnostic, Debug)]
pub enum StdioError {
    #[error("I/O error on stdio transport: {0}")]
    #[diagnostic(code(opgate::stdio::io))]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    #[diagnostic(code(opgate::stdio::encode))]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct LineRequest {
    tool: String,
    #[serde(default)]
    params: Option<Params>,
    #[serde(default)]
    user_id: Option<String>,
}

impl LineRequest {
    fn into_dispatch(self) -> DispatchRequest {
        let user_id = self
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| GLOBAL_USER.to_string());
        DispatchRequest::new(user_id, self.tool, self.params.unwrap_or_default())
    }
}

/// Answer every request line from `reader` on `writer` until EOF.
///
/// Returns the number of requests answered.
pub async fn serve_lines<D, U, R, W>(
    dispatcher: &Dispatcher<D, U>,
    mut reader: R,
    mut writer: W,
) -> Result<usize, StdioError>
where
    D: Database,
    U: Upstream,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut answered = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => answer(dispatcher, line).await,
            Err(e) => {
                DispatchError::Validation(format!("invalid request line: {}", e)).payload()
            }
        };
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        answered += 1;
    }

    debug!(answered, "Input closed");
    Ok(answered)
}

async fn answer<D: Database, U: Upstream>(dispatcher: &Dispatcher<D, U>, line: &str) -> Value {
    let request = match serde_json::from_str::<LineRequest>(line) {
        Ok(request) => request,
        Err(e) => {
            return DispatchError::Validation(format!("invalid request line: {}", e)).payload();
        }
    };

    match dispatcher.dispatch(request.into_dispatch()).await {
        Ok(outcome) => json!({ "data": outcome.payload() }),
        Err(err) => err.payload(),
    }
}

/// Serve the process's stdin/stdout.
#[instrument(skip(dispatcher))]
pub async fn run<D: Database, U: Upstream>(dispatcher: Dispatcher<D, U>) -> Result<(), StdioError> {
    info!("Serving tool calls on stdio");
    let stdin = BufReader::new(tokio::io::stdin());
    let answered = serve_lines(&dispatcher, stdin, tokio::io::stdout()).await?;
    info!(answered, "stdio transport finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::db::{
        ConfigStore, ExecutionLog, ExecutionQuery, ServiceConfig, SqliteDatabase,
    };
    use crate::render::TemplateRenderer;
    use crate::upstream::{Tool, UpstreamError};

    struct FixedUpstream;

    impl Upstream for FixedUpstream {
        async fn invoke(
            &self,
            _config: &ServiceConfig,
            tool: Tool,
            params: &Params,
        ) -> Result<Value, UpstreamError> {
            match tool {
                Tool::ListProjects => Ok(json!([{"id": 1, "name": "Demo"}])),
                _ => Ok(Value::Object(params.clone())),
            }
        }
    }

    async fn dispatcher() -> Dispatcher<SqliteDatabase, FixedUpstream> {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        for user in ["u1", GLOBAL_USER] {
            db.configs()
                .upsert(&ServiceConfig::new(
                    user,
                    "list-projects",
                    "https://op.example",
                    "secret-api-key-1234",
                ))
                .await
                .unwrap();
        }
        Dispatcher::new(Arc::new(db), FixedUpstream, Arc::new(TemplateRenderer::new()))
    }

    async fn exchange(input: impl AsRef<[u8]>) -> (usize, Vec<Value>) {
        let dispatcher = dispatcher().await;
        let mut output = Vec::new();
        let answered = serve_lines(&dispatcher, input.as_ref(), &mut output)
            .await
            .unwrap();
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (answered, lines)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn answers_each_line_in_order() {
        let input = concat!(
            "{\"tool\": \"list-projects\", \"user_id\": \"u1\"}\n",
            "\n",
            "{\"tool\": \"list-projects\", \"user_id\": \"nobody\"}\n",
            "{\"tool\": \"list_projects\", \"params\": {}}\n",
        );

        let (answered, lines) = exchange(input).await;

        assert_eq!(answered, 3);
        assert_eq!(
            lines[0],
            json!({"data": {"result": [{"id": 1, "name": "Demo"}], "tool": "list-projects", "params": {}}})
        );
        assert_eq!(lines[1]["kind"], "ConfigNotFound");
        assert!(lines[1]["error"].as_str().unwrap().contains("nobody"));
        assert_eq!(lines[2]["data"]["tool"], "list-projects");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unparsable_line_gets_validation_error_and_loop_continues() {
        let input = "not json\n{\"params\": {}}\n{\"tool\": \"list-projects\"}\n";

        let (answered, lines) = exchange(input).await;

        assert_eq!(answered, 3);
        assert_eq!(lines[0]["kind"], "ValidationError");
        assert_eq!(lines[1]["kind"], "ValidationError");
        assert!(lines[2].get("data").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_utf8_line_gets_validation_error_and_loop_continues() {
        let mut input = b"{\"tool\": \"list-\xff\"}\n".to_vec();
        input.extend_from_slice(b"{\"tool\": \"list-projects\", \"user_id\": \"u1\"}\n");

        let (answered, lines) = exchange(input).await;

        assert_eq!(answered, 2);
        assert_eq!(lines[0]["kind"], "ValidationError");
        assert!(lines[0]["error"].as_str().unwrap().contains("invalid request line"));
        assert_eq!(lines[1]["data"]["tool"], "list-projects");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_line_without_newline_is_answered() {
        let (answered, lines) = exchange("{\"tool\": \"list-projects\"}").await;

        assert_eq!(answered, 1);
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn payload_matches_http_shape() {
        let dispatcher = dispatcher().await;
        let mut output = Vec::new();
        serve_lines(
            &dispatcher,
            "{\"tool\": \"list-projects\", \"user_id\": \"u1\"}\n".as_bytes(),
            &mut output,
        )
        .await
        .unwrap();

        let line: Value = serde_json::from_slice(&output).unwrap();
        let direct = dispatcher
            .dispatch(DispatchRequest::new("u1", "list-projects", Params::new()))
            .await
            .unwrap();
        assert_eq!(line["data"], direct.payload());

        let records = dispatcher
            .db()
            .executions()
            .list(&ExecutionQuery::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }
}
