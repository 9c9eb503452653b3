// Copyright 2025 OpsAgent Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use axum::{extract::State, response::Json, routing::get, routing::post, Router};
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use opsagent::{Agent, LlmClient, QueryTrace};

#[derive(Parser)]
#[command(name = "opsagent-server")]
#[command(about = "HTTP service for the OpsAgent natural-language query agent")]
#[command(long_about = "
OpsAgent server exposes the query agent over HTTP.

Routes:
    POST /agent/query        {\"userId\": ..., \"query\": ...} -> answer
    POST /agent/query/trace  same body -> full per-request trace
    GET  /health

Environment Variables:
    OPSAGENT_HOST        Server host (default: 127.0.0.1)
    OPSAGENT_PORT        Server port (default: 3000)
    OPSAGENT_CORS_ALL    Enable CORS for all origins (default: false)
    OA_DATABASE_URL      Postgres connection string (or DATABASE_URL)
    OA_DB_POOL_SIZE      Connection pool size (default: 5)
    OA_LLM_URL           OpenAI-compatible gateway base URL (required)
    OA_LLM_MODEL         Chat model (default: gpt-4o)
    OA_EMBED_MODEL       Embedding model (default: text-embedding-3-small)
    OA_OPENAI_API_KEY    Bearer token (or OPENAI_API_KEY)
    OA_MATCH_TOPK        Tables matched per question (default: 2)
")]
struct Args {
    /// Server host to bind to
    #[arg(long, help = "Server host (env: OPSAGENT_HOST)")]
    host: Option<String>,

    /// Server port to listen on
    #[arg(long, help = "Server port (env: OPSAGENT_PORT)")]
    port: Option<u16>,

    /// Enable CORS for all origins (useful for development)
    #[arg(long, help = "Enable CORS for all origins (env: OPSAGENT_CORS_ALL)")]
    cors_all: bool,
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    cors_all: bool,
}

impl Config {
    fn from_args(args: Args) -> Self {
        Self {
            host: args.host.unwrap_or_else(|| {
                std::env::var("OPSAGENT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
            }),
            port: args.port.unwrap_or_else(|| {
                std::env::var("OPSAGENT_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3000)
            }),
            cors_all: args.cors_all
                || std::env::var("OPSAGENT_CORS_ALL")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
        }
    }
}

#[derive(Clone)]
struct AppState {
    agent: Arc<Agent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    user_id: String,
    query: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Json<serde_json::Value> {
    let answer = state.agent.query(&req.user_id, &req.query).await;
    Json(serde_json::json!({
        "userId": req.user_id,
        "query": req.query,
        "response": answer,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_query_trace(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Json<QueryTrace> {
    Json(state.agent.handle(&req.user_id, &req.query).await)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = Config::from_args(Args::parse());

    let pool = opsagent::db::connect_pool().await?;
    let llm = LlmClient::from_env()?;
    let state = AppState {
        agent: Arc::new(Agent::new(pool, llm)),
    };

    let mut app = Router::new()
        .route("/agent/query", post(handle_query))
        .route("/agent/query/trace", post(handle_query_trace))
        .route("/health", get(handle_health))
        .with_state(state);
    if config.cors_all {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        );
    }

    let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid OPSAGENT_HOST/OPSAGENT_PORT");
    log::info!("opsagent-server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
