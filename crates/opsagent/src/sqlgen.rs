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

// Constrained natural-language-to-SQL synthesis over the matched tables.
// Pure text transform plus one completion call; nothing here executes.

use anyhow::Result;

use crate::llm::LlmClient;
use crate::similarity::TableMatch;

/// Build the generation prompt: per matched table its exact name,
/// description (or an explicit not-available marker), exact column list
/// and similarity percentage, followed by the strict rules the generator
/// must obey.
pub fn build_sql_prompt(question: &str, tables: &[TableMatch]) -> String {
    let tables_context = tables
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "Table {}: {}\nDescription: {}\nColumns: {}\nRelevance Score: {:.2}%",
                i + 1,
                t.name,
                t.description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or("not available"),
                t.columns.join(", "),
                t.similarity * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a SQL expert. Generate a SQL query to answer the user's question.\n\n\
         IMPORTANT - STRICT RULES:\n\
         1. ONLY use the exact table names and column names provided below\n\
         2. NEVER make up or guess table names or column names\n\
         3. NEVER use tables or columns not listed below\n\
         4. NEVER select the 'embed' column (it is internal; use it only inside a vector similarity expression)\n\
         5. If the question cannot be answered with the provided tables, return an empty SELECT instead\n\
         6. Return ONLY the SQL query, nothing else - no markdown, no explanations, no comments\n\n\
         User Query: \"{}\"\n\n\
         Available Tables (use EXACT names and columns):\n{}\n\n\
         Generate the SQL query:",
        question, tables_context
    )
}

/// Strip markdown code fencing from a model reply and trim it.
pub fn extract_sql(response: &str) -> String {
    response
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Ask the generator for a candidate query against the matched tables.
/// Returns the de-fenced, trimmed candidate; the guard decides whether it
/// may execute.
pub async fn synthesize(
    llm: &LlmClient,
    question: &str,
    tables: &[TableMatch],
) -> Result<String> {
    let prompt = build_sql_prompt(question, tables);
    log::debug!(
        "generating SQL for question {:?} over {} matched table(s)",
        question,
        tables.len()
    );
    let response = llm.complete(&prompt).await?;
    let sql = extract_sql(&response);
    log::info!("generated candidate SQL: {}", sql);
    Ok(sql)
}
