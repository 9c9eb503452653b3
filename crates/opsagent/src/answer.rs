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

// Turns result rows plus the original question into a conversational
// answer. Pure text transform plus one completion call.

use anyhow::Result;
use serde_json::Value;

use crate::llm::LlmClient;
use crate::similarity::TableMatch;

/// Remove the internal similarity-embedding field from every row before
/// it can reach a prompt or a caller-visible trace.
pub fn sanitize_rows(rows: &[Value]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            let mut cleaned = row.clone();
            if let Some(obj) = cleaned.as_object_mut() {
                obj.remove("embed");
            }
            cleaned
        })
        .collect()
}

/// Build the answering prompt: the question, the cleaned rows, and the
/// conversational-agent instructions, including graceful degradation when
/// no data was found.
pub fn build_answer_prompt(question: &str, rows: &[Value]) -> String {
    let results_context =
        serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are a helpful customer service agent. Answer the user's question naturally and conversationally.\n\n\
         Question: \"{}\"\n\n\
         Here is the information I found:\n{}\n\n\
         Instructions:\n\
         - Respond as a friendly agent, not as a technical assistant\n\
         - DO NOT mention databases, tables, columns, or any technical details\n\
         - DO NOT mention user IDs, user roles, or any system information\n\
         - Just provide the answer in natural, conversational language\n\
         - If no data was found, explain what you would need to help them (in natural language, not technical terms)\n\
         - Be concise and helpful\n\
         - Format the response to be easy to read and understand",
        question, results_context
    )
}

/// Generate the final answer. Rows are sanitized here before they reach
/// the prompt; callers may pass the raw execution result.
pub async fn synthesize(
    llm: &LlmClient,
    question: &str,
    tables: &[TableMatch],
    rows: &[Value],
) -> Result<String> {
    let cleaned = sanitize_rows(rows);
    log::debug!(
        "answering question {:?} with {} row(s) from {} matched table(s)",
        question,
        cleaned.len(),
        tables.len()
    );
    let prompt = build_answer_prompt(question, &cleaned);
    llm.complete(&prompt).await
}
