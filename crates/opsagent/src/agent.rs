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

// Orchestrates one request: embed the question, match tables, synthesize a
// candidate query, screen it, execute under the caller's RLS context, and
// answer. Every stage's outcome lands in the QueryTrace regardless of
// success; the caller always gets a conversational answer.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::answer;
use crate::db;
use crate::guard::{self, Verdict};
use crate::llm::LlmClient;
use crate::rls;
use crate::similarity::{TableIndex, TableMatch};
use crate::sqlgen;

/// Fallback answer when even answer synthesis fails. The caller never
/// sees a raw technical error.
const FALLBACK_ANSWER: &str =
    "I wasn't able to look that up just now. Please try again in a moment.";

/// Full record of one request. Owned and written exclusively by the
/// orchestrator; returned to the caller, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTrace {
    pub caller_id: String,
    pub caller: Option<serde_json::Value>,
    pub question: String,
    pub query_embedding: Vec<f64>,
    pub matched_tables: Vec<TableMatch>,
    pub generated_sql: Option<String>,
    pub normalized_sql: Option<String>,
    pub verdict: String,
    pub rejection_reason: Option<String>,
    pub execution_error: Option<String>,
    pub rows: Vec<serde_json::Value>,
    pub answer: String,
    pub timestamp: String,
}

pub struct Agent {
    pool: PgPool,
    llm: LlmClient,
    index: TableIndex,
}

impl Agent {
    pub fn new(pool: PgPool, llm: LlmClient) -> Self {
        let index = TableIndex::new(pool.clone());
        Self { pool, llm, index }
    }

    /// Caller-facing convenience: run the pipeline and return only the
    /// answer text.
    pub async fn query(&self, caller_id: &str, question: &str) -> String {
        self.handle(caller_id, question).await.answer
    }

    /// Run the full pipeline for one request. Never returns an error:
    /// every failure class degrades per design and is recorded in the
    /// trace. Nothing is retried.
    pub async fn handle(&self, caller_id: &str, question: &str) -> QueryTrace {
        log::info!("handling query for caller {}: {:?}", caller_id, question);

        let caller = db::fetch_caller(&self.pool, caller_id).await;

        // Stage 1: embed the question. A generation failure here empties
        // the downstream stages rather than failing the request.
        let query_embedding = match self.llm.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("question embedding failed: {}", e);
                Vec::new()
            }
        };

        // Stage 2: semantic table matching. Index failures degrade to zero
        // matches inside the index itself.
        let k = TableIndex::top_k_from_env();
        let matched_tables = self.index.find_top_matches(&query_embedding, k).await;
        log::info!(
            "matched {} table(s): [{}]",
            matched_tables.len(),
            matched_tables
                .iter()
                .map(|t| format!("{} ({:.2}%)", t.name, t.similarity * 100.0))
                .collect::<Vec<_>>()
                .join(", ")
        );

        // Stages 3-4: synthesize a candidate query and screen it. With no
        // matched tables there is nothing to generate against, so the
        // request is treated as rejected without a generation call.
        let mut generated_sql = None;
        let verdict = if matched_tables.is_empty() {
            Verdict::Rejected("no tables matched the question".to_string())
        } else {
            match sqlgen::synthesize(&self.llm, question, &matched_tables).await {
                Ok(sql) => {
                    generated_sql = Some(sql.clone());
                    guard::check(&sql)
                }
                Err(e) => {
                    log::warn!("query generation failed: {}", e);
                    Verdict::Rejected("query generation failed".to_string())
                }
            }
        };

        // Stage 5: execute only an approved query, under the caller's RLS
        // context. Execution errors are caught into the trace as empty
        // rows.
        let verdict_label = match &verdict {
            Verdict::Executable(_) => "executable",
            Verdict::Rejected(_) => "rejected",
        };
        let mut normalized_sql = None;
        let mut rejection_reason = None;
        let mut execution_error = None;
        let rows = match &verdict {
            Verdict::Executable(sql) => {
                normalized_sql = Some(sql.clone());
                match rls::execute_scoped(&self.pool, caller_id, sql).await {
                    Ok(rows) => {
                        log::info!("scoped execution returned {} row(s)", rows.len());
                        rows
                    }
                    Err(e) => {
                        log::warn!("scoped execution failed: {}", e);
                        execution_error = Some(e.to_string());
                        Vec::new()
                    }
                }
            }
            Verdict::Rejected(reason) => {
                log::warn!("candidate query rejected: {}", reason);
                rejection_reason = Some(reason.clone());
                Vec::new()
            }
        };

        // Stage 6: answer synthesis always runs, with whatever rows
        // (possibly none) were obtained.
        let sanitized = answer::sanitize_rows(&rows);
        let answer = match answer::synthesize(&self.llm, question, &matched_tables, &rows).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("answer synthesis failed: {}", e);
                FALLBACK_ANSWER.to_string()
            }
        };

        QueryTrace {
            caller_id: caller_id.to_string(),
            caller,
            question: question.to_string(),
            query_embedding,
            matched_tables,
            generated_sql,
            normalized_sql,
            verdict: verdict_label.to_string(),
            rejection_reason,
            execution_error,
            rows: sanitized,
            answer,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
