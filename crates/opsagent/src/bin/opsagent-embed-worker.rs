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

// Out-of-band indexing job: (re)generates the stored embedding for every
// described table. This is the only writer of descriptor embeddings; the
// query path reads them and nothing else.

use anyhow::Result;
use clap::Parser;
use sqlx::{PgPool, Row};
use std::time::Duration;

use opsagent::db;
use opsagent::similarity::descriptor_text;
use opsagent::LlmClient;

#[derive(Parser)]
#[command(name = "opsagent-embed-worker")]
#[command(about = "Regenerate embeddings for described tables")]
#[command(long_about = "
Renders the canonical description text for every row of table_semantics,
embeds it through the configured gateway, and overwrites the stored
embedding. Runs once by default; pass --loop-seconds to keep refreshing.

Environment Variables:
    OA_DATABASE_URL      Postgres connection string (or DATABASE_URL)
    OA_LLM_URL           OpenAI-compatible gateway base URL (required)
    OA_EMBED_MODEL       Embedding model (default: text-embedding-3-small)
    OA_OPENAI_API_KEY    Bearer token (or OPENAI_API_KEY)
")]
struct Args {
    /// Refresh interval; omit to run a single pass and exit
    #[arg(long, help = "Seconds between refresh passes")]
    loop_seconds: Option<u64>,
}

async fn refresh_descriptors(pool: &PgPool, llm: &LlmClient) -> Result<(usize, usize)> {
    let rows = opsagent::similarity::fetch_descriptors(pool).await?;
    let mut updated = 0usize;
    let mut failed = 0usize;
    for row in rows.iter() {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let kind: String = row.try_get("kind")?;
        let description: Option<String> = row.try_get("description")?;
        let columns = db::decode_column_list(row);

        let text = descriptor_text(&name, &kind, description.as_deref(), &columns);
        match llm.embed(&text).await {
            Ok(vector) => {
                let encoded = serde_json::to_string(&vector)?;
                let res = sqlx::query(
                    "UPDATE table_semantics SET embed = $1, updated_at = now() WHERE id = $2::uuid",
                )
                .bind(&encoded)
                .bind(&id)
                .execute(pool)
                .await;
                match res {
                    Ok(_) => {
                        log::info!(
                            "embedding updated for table '{}' ({} dimensions)",
                            name,
                            vector.len()
                        );
                        updated += 1;
                    }
                    Err(e) => {
                        log::error!("failed to store embedding for table '{}': {}", name, e);
                        failed += 1;
                    }
                }
            }
            Err(e) => {
                log::error!("embedding generation failed for table '{}': {}", name, e);
                failed += 1;
            }
        }
    }
    Ok((updated, failed))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let pool = db::connect_pool().await?;
    let llm = LlmClient::from_env()?;

    loop {
        let (updated, failed) = refresh_descriptors(&pool, &llm).await?;
        log::info!(
            "descriptor refresh pass complete: {} updated, {} failed",
            updated,
            failed
        );
        match args.loop_seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => break,
        }
    }
    Ok(())
}
