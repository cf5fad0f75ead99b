mod config;
mod error;
mod graphql;
mod http;
mod metrics;
mod normalize;
mod poller;
mod report;
mod snapshot;
mod state;
#[cfg(test)]
mod test_support;
mod util;

use axum::serve;
use clap::{Parser, ValueEnum};
use config::Config;
use error::PollError;
use graphql::{build_batch_query, build_query, GraphqlClient, QueryKind};
use metrics::Metrics;
use poller::{PollOutcome, Poller};
use report::OutputFormat;
use state::{DashboardState, Transition};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use util::now_unix;

#[derive(Parser, Debug)]
#[command(name = "routerwatch")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "placeholder")]
    real_api: bool,
    #[arg(long, conflicts_with = "real_api")]
    placeholder: bool,
    /// Accept self-signed router certificates.
    #[arg(long)]
    insecure: bool,
    /// Run a single query, print the raw response and exit.
    #[arg(long, value_enum)]
    query: Option<QueryArg>,
    #[arg(long, value_enum, default_value = "pretty")]
    format: OutputFormat,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryArg {
    Memory,
    Cpu,
    Storage,
    Interfaces,
    All,
}

impl QueryArg {
    fn kinds(self) -> Vec<QueryKind> {
        match self {
            QueryArg::Memory => vec![QueryKind::Memory],
            QueryArg::Cpu => vec![QueryKind::Cpu],
            QueryArg::Storage => vec![QueryKind::Storage],
            QueryArg::Interfaces => vec![QueryKind::Interfaces],
            QueryArg::All => QueryKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Error)]
enum QueryError {
    #[error("не удалось создать HTTP-клиент: {0}")]
    Client(#[from] reqwest::Error),
    #[error("запрос не выполнен: {0}")]
    Poll(#[from] PollError),
    #[error("не удалось записать результат в {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if cli.real_api {
        cfg.api.use_real_api = true;
    } else if cli.placeholder {
        cfg.api.use_real_api = false;
    }
    if cli.insecure {
        cfg.api.insecure = true;
    }

    if let Some(query) = cli.query {
        if let Err(err) = run_query(&cfg, query, cli.format, cli.output.as_deref()).await {
            error!(error = %err, "разовый запрос завершился ошибкой");
            std::process::exit(1);
        }
        return;
    }

    info!(
        listen = %cfg.listen,
        endpoint = %cfg.api.endpoint,
        use_real_api = cfg.api.use_real_api,
        insecure = cfg.api.insecure,
        interval = %humantime::format_duration(cfg.poll_interval()),
        "запуск routerwatch"
    );
    if !cfg.api.use_real_api {
        warn!("реальный API отключен, публикуются нулевые значения (USE_REAL_API=true для опроса роутера)");
    }

    let shared_state = Arc::new(RwLock::new(DashboardState::new(now_unix())));
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };
    metrics.update_from_state(&*shared_state.read().await);

    let poller = match Poller::new(&cfg) {
        Ok(p) => p.with_metrics(metrics.clone()),
        Err(err) => {
            error!(error = %err, "не удалось создать HTTP-клиент для GraphQL API");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let http_state = shared_state.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, http_state, Arc::new(cfg.api.clone()));
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let (updates_tx, updates_rx) = mpsc::unbounded_channel::<PollOutcome>();
    let poll_handle = poller.start(move |outcome| {
        let _ = updates_tx.send(outcome);
    });

    let consumer_task = {
        let metrics = metrics.clone();
        let shared_state = shared_state.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(consume_updates(updates_rx, shared_state, metrics, shutdown))
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    poll_handle.stop().await;
    let _ = consumer_task.await;
    let _ = http_task.await;
}

async fn consume_updates(
    mut updates: mpsc::UnboundedReceiver<PollOutcome>,
    shared_state: Arc<RwLock<DashboardState>>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("получен сигнал остановки обработки результатов опроса");
                break;
            }
            received = updates.recv() => {
                let Some(outcome) = received else {
                    break;
                };
                metrics.record_outcome(&outcome);

                let mut guard = shared_state.write().await;
                let transition = guard.apply(outcome, now_unix());
                metrics.update_from_state(&guard);

                match transition {
                    Some(Transition::Lost) => {
                        if let Some(err) = guard.current.error() {
                            warn!(kind = %err.kind, error = %err.message, "данные роутера недоступны");
                        }
                    }
                    Some(Transition::Recovered) => {
                        info!(
                            failed_polls = guard.failed_polls,
                            "связь с роутером восстановлена"
                        );
                    }
                    None => {
                        debug!(state = guard.current.as_str(), "состояние обновлено");
                    }
                }
            }
        }
    }
}

async fn run_query(
    cfg: &Config,
    query: QueryArg,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), QueryError> {
    let kinds = query.kinds();
    let client = GraphqlClient::new(&cfg.api)?;
    let text = match kinds.as_slice() {
        [kind] => build_query(*kind, client.api_key()),
        _ => build_batch_query(&kinds, client.api_key()),
    };
    info!(endpoint = %client.endpoint(), query = ?query, "выполняется разовый запрос");

    let body = client.execute_raw(&text).await?;
    let rendered = report::render(&body, format, &kinds);

    match output {
        Some(path) => std::fs::write(path, rendered).map_err(|source| QueryError::Write {
            path: path.display().to_string(),
            source,
        })?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use std::time::Duration;

    #[test]
    fn cli_parses_one_shot_query() {
        let cli = Cli::try_parse_from([
            "routerwatch",
            "--query",
            "all",
            "--format",
            "json",
            "--insecure",
        ])
        .unwrap();
        assert_eq!(cli.query, Some(QueryArg::All));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.insecure);
        assert_eq!(QueryArg::All.kinds(), QueryKind::ALL.to_vec());
    }

    #[test]
    fn cli_rejects_conflicting_modes() {
        assert!(Cli::try_parse_from(["routerwatch", "--real-api", "--placeholder"]).is_err());
    }

    #[tokio::test]
    async fn consumer_applies_updates_until_shutdown() {
        let state = Arc::new(RwLock::new(DashboardState::new(0)));
        let metrics = Metrics::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consume_updates(rx, state.clone(), metrics, shutdown_rx));

        tx.send(Ok(Snapshot::placeholder())).unwrap();
        tx.send(Err(PollError::network("refused"))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let guard = state.read().await;
            assert_eq!(guard.current.as_str(), "error");
            assert_eq!(guard.successful_polls, 1);
            assert_eq!(guard.failed_polls, 1);
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
