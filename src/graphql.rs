use crate::config::ApiConfig;
use crate::error::PollError;
use crate::util::truncate_to_millis;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Memory,
    Cpu,
    Storage,
    Interfaces,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::Memory,
        QueryKind::Cpu,
        QueryKind::Storage,
        QueryKind::Interfaces,
    ];

    /// GraphQL field name on the router's query root.
    pub fn operation(self) -> &'static str {
        match self {
            QueryKind::Memory => "ShowMemory",
            QueryKind::Cpu => "ShowCpu",
            QueryKind::Storage => "ShowStorage",
            QueryKind::Interfaces => "ShowInterfaces",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Memory => "memory",
            QueryKind::Cpu => "cpu",
            QueryKind::Storage => "storage",
            QueryKind::Interfaces => "interfaces",
        }
    }
}

pub fn build_query(kind: QueryKind, api_key: &str) -> String {
    format!("{{\n{}}}", selection(kind, api_key, None))
}

/// One document selecting several categories, each aliased by its short name.
pub fn build_batch_query(kinds: &[QueryKind], api_key: &str) -> String {
    let body: String = kinds
        .iter()
        .map(|kind| selection(*kind, api_key, Some(kind.as_str())))
        .collect();
    format!("{{\n{body}}}")
}

fn selection(kind: QueryKind, api_key: &str, alias: Option<&str>) -> String {
    let alias = alias.map(|a| format!("{a}: ")).unwrap_or_default();
    format!(
        "  {alias}{op}(data: {{key: \"{key}\"}}) {{\n    success\n    errors\n    data {{\n      result\n    }}\n  }}\n",
        op = kind.operation(),
        key = escape_graphql_string(api_key),
    )
}

fn escape_graphql_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl GraphqlClient {
    pub fn new(cfg: &ApiConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(concat!("routerwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.request_timeout());
        if cfg.insecure {
            warn!(endpoint = %cfg.endpoint, "проверка TLS-сертификата роутера отключена");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: cfg.endpoint.trim().to_string(),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Runs the category query and returns its `data.result` payload.
    pub async fn execute(&self, kind: QueryKind) -> Result<Value, PollError> {
        let query = build_query(kind, &self.api_key);
        let body = self.execute_raw(&query).await?;
        extract_result(kind, &body)
    }

    /// Runs an arbitrary query and returns the whole parsed response body.
    pub async fn execute_raw(&self, query: &str) -> Result<Value, PollError> {
        let start = Instant::now();
        let request_body = json!({ "query": query }).to_string();
        debug!(endpoint = %self.endpoint, bytes = request_body.len(), "отправка GraphQL-запроса");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(request_body)
            .send()
            .await
            .map_err(|err| {
                let err = PollError::from_transport(&err);
                warn!(endpoint = %self.endpoint, error = %err, "GraphQL-запрос не выполнен");
                err
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| PollError::from_transport(&err))?;
        debug!(
            status = status.as_u16(),
            bytes = text.len(),
            elapsed = %humantime::format_duration(truncate_to_millis(start.elapsed())),
            "получен ответ GraphQL"
        );

        parse_response(status, &text).map_err(|err| {
            warn!(endpoint = %self.endpoint, kind = %err.kind, error = %err.message, "ошибка ответа GraphQL");
            err
        })
    }
}

/// Classifies an HTTP response: non-2xx, non-JSON and top-level GraphQL `errors`
/// are failures, anything else is returned as parsed JSON.
pub fn parse_response(status: StatusCode, body: &str) -> Result<Value, PollError> {
    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        let mut message = format!(
            "API-запрос завершился со статусом {}: {}",
            status.as_u16(),
            reason
        );
        let body = body.trim();
        if !body.is_empty() {
            message.push_str(" - ");
            message.extend(body.chars().take(MAX_ERROR_BODY_CHARS));
        }
        return Err(PollError::http_status(status.as_u16(), message));
    }

    let value: Value = serde_json::from_str(body).map_err(|err| {
        PollError::parse(format!("не удалось разобрать ответ API как JSON: {err}"))
    })?;

    if let Some(errors) = value.get("errors") {
        if !errors.is_null() {
            return Err(PollError::graphql(format!(
                "GraphQL Error: {}",
                join_error_messages(errors)
            )));
        }
    }

    Ok(value)
}

/// Pulls `data.<Operation>.data.result` out of a parsed body, enforcing `success`.
pub fn extract_result(kind: QueryKind, body: &Value) -> Result<Value, PollError> {
    let op = kind.operation();
    let field = body
        .get("data")
        .and_then(|data| data.get(op))
        .filter(|field| field.is_object())
        .ok_or_else(|| PollError::parse(format!("в ответе отсутствует объект data.{op}")))?;

    let success = field.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let reason = field
            .get("errors")
            .map(join_error_messages)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "причина не указана".to_string());
        return Err(PollError::graphql(format!(
            "не удалось получить данные {op}: {reason}"
        )));
    }

    Ok(field
        .get("data")
        .and_then(|data| data.get("result"))
        .cloned()
        .unwrap_or(Value::Null))
}

fn join_error_messages(errors: &Value) -> String {
    match errors {
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(error_message)
            .collect::<Vec<_>>()
            .join(", "),
        other => error_message(other),
    }
}

fn error_message(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => item.to_string(),
        },
        other => other.to_string(),
    }
}
