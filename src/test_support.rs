//! Local stand-in for the router's GraphQL endpoint.

use crate::config::ApiConfig;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub async fn spawn_graphql(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/graphql")
}

/// Endpoint on a port nobody listens on.
pub async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/graphql")
}

pub fn api_config(endpoint: &str) -> ApiConfig {
    ApiConfig {
        endpoint: endpoint.to_string(),
        api_key: "test123".to_string(),
        use_real_api: true,
        insecure: false,
        request_timeout_ms: Some(2_000),
    }
}

pub fn success_body(operation: &str, result: Value) -> Value {
    json!({
        "data": {
            operation: {
                "success": true,
                "errors": null,
                "data": { "result": result }
            }
        }
    })
}

/// Which `Show*` operation a posted `{"query": ...}` body asks for.
pub fn requested_operation(body: &Value) -> Option<&'static str> {
    let query = body.get("query")?.as_str()?;
    ["ShowMemory", "ShowCpu", "ShowStorage", "ShowInterfaces"]
        .into_iter()
        .find(|op| query.contains(op))
}
