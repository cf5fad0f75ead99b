use crate::config::ApiConfig;
use crate::error::{PollError, PollErrorKind};
use crate::graphql::{extract_result, QueryKind};
use clap::ValueEnum;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Human,
}

/// Renders a raw GraphQL response for the one-shot query mode.
/// `human` only has a dedicated layout for a single memory query.
pub fn render(body: &Value, format: OutputFormat, kinds: &[QueryKind]) -> String {
    match format {
        OutputFormat::Json => body.to_string(),
        OutputFormat::Pretty => pretty(body),
        OutputFormat::Human => match kinds {
            [QueryKind::Memory] => format_memory_human(body).unwrap_or_else(|| pretty(body)),
            _ => pretty(body),
        },
    }
}

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

pub fn format_memory_human(body: &Value) -> Option<String> {
    let result = extract_result(QueryKind::Memory, body).ok()?;
    let field = |name: &str| result.get(name).and_then(Value::as_i64);
    let total = field("total")?;
    let used = field("used")?;
    let free = field("free")?;
    let buffers = field("buffers")?;
    let cached = field("cached")?;

    let actual_used = used - buffers - cached;
    let buffers_cache = buffers + cached;

    let mut out = String::new();
    out.push_str("Сводка по памяти\n");
    out.push_str(&format!("  Всего: {}\n", bytes_human(total)));
    out.push_str(&format!(
        "  Используется (без буферов/кэша): {} ({:.1}%)\n",
        bytes_human(actual_used),
        percent(actual_used, total)
    ));
    out.push_str(&format!(
        "  Буферы/кэш: {} ({:.1}%)\n",
        bytes_human(buffers_cache),
        percent(buffers_cache, total)
    ));
    out.push_str(&format!("  Свободно: {}\n", bytes_human(free)));
    out.push_str("Подробно\n");
    out.push_str(&format!("  Буферы: {}\n", bytes_human(buffers)));
    out.push_str(&format!("  Кэш: {}\n", bytes_human(cached)));
    out.push_str(&format!(
        "  Используется (с буферами/кэшем): {}",
        bytes_human(used)
    ));
    Some(out)
}

fn percent(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn bytes_human(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let v = bytes as f64;
    if v < KB {
        format!("{bytes} B")
    } else if v < MB {
        format!("{:.2} KB", v / KB)
    } else if v < GB {
        format!("{:.2} MB", v / MB)
    } else {
        format!("{:.2} GB", v / GB)
    }
}

/// Troubleshooting steps shown next to a failed poll.
pub fn troubleshooting_hints(err: &PollError, api: &ApiConfig) -> Vec<String> {
    let mut hints = vec![
        format!(
            "Проверьте, что роутер VyOS запущен и доступен по адресу: {}",
            api.endpoint
        ),
        "Убедитесь, что на роутере включен GraphQL API".to_string(),
    ];

    match err.kind {
        PollErrorKind::Network => {
            if api.is_https() && !api.insecure {
                hints.push(
                    "Если роутер использует самоподписанный сертификат, задайте api.insecure: true или VYOS_API_INSECURE=true"
                        .to_string(),
                );
            }
        }
        PollErrorKind::HttpStatus | PollErrorKind::GraphqlError => {
            if err.kind == PollErrorKind::GraphqlError || err.is_auth_rejection() {
                hints.push(
                    "Проверьте правильность API-ключа (api.api_key или VYOS_API_KEY)".to_string(),
                );
            }
        }
        PollErrorKind::ParseError => {
            hints.push(
                "Убедитесь, что адрес указывает на GraphQL-эндпоинт, а не на веб-интерфейс"
                    .to_string(),
            );
        }
    }

    hints.push(format!("Проверьте API напрямую: {}", curl_command(api)));
    hints
}

/// Reproduces the memory query with curl; the key is masked.
pub fn curl_command(api: &ApiConfig) -> String {
    let insecure = if api.is_https() { "-k " } else { "" };
    format!(
        r#"curl {insecure}--raw '{}' -H 'Content-Type: application/json' -d '{{"query":"{{ ShowMemory(data: {{key: \"<API_KEY>\"}}) {{success errors data {{result}}}}}}"}}'"#,
        api.endpoint
    )
}
