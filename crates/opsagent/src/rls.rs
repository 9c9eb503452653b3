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

// Row-level-security execution context. The administrative connection that
// opens sessions is exempt from RLS policies, so every caller-supplied
// query runs under a de-escalated role with the caller's identity bound
// into the session, and the prior privilege state is restored on every
// exit path before the connection can return to the pool.
//
// Sequence per execution, on one dedicated connection:
//   1. SELECT set_config('app.current_user_id', $caller, false)
//   2. SET ROLE app_user
//   3. run the guard-approved query
//   4. RESET ROLE and clear the identity variable, unconditionally
//
// Failure in 1 or 2 aborts before 3 ever runs. If 4 cannot be confirmed
// the connection is detached from the pool and closed instead of reused.

use anyhow::{anyhow, Context, Result};
use sqlx::{Connection, Executor, PgConnection, PgPool};

use crate::db;

/// Session variable the storage engine's policies read the caller from.
pub const SESSION_USER_VAR: &str = "app.current_user_id";

/// Restricted role that is subject to the RLS policies.
pub const RESTRICTED_ROLE: &str = "app_user";

/// Execute one guard-approved query under the caller's RLS context and
/// return the visible rows as JSON objects.
///
/// The whole bind/de-escalate/execute/restore sequence runs on a spawned
/// task so that caller cancellation (a dropped request future) can never
/// skip privilege restoration.
pub async fn execute_scoped(
    pool: &PgPool,
    caller_id: &str,
    sql: &str,
) -> Result<Vec<serde_json::Value>> {
    let pool = pool.clone();
    let caller_id = caller_id.to_string();
    let sql = sql.to_string();
    tokio::spawn(async move { run_scoped(pool, caller_id, sql).await })
        .await
        .map_err(|e| anyhow!("scoped execution task panicked: {}", e))?
}

async fn run_scoped(
    pool: PgPool,
    caller_id: String,
    sql: String,
) -> Result<Vec<serde_json::Value>> {
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for scoped execution")?;

    let result = match bind_and_deescalate(&mut conn, &caller_id).await {
        Ok(()) => execute_rows(&mut conn, &sql).await,
        // Never execute under an unknown or still-elevated context.
        Err(e) => Err(e),
    };

    match restore(&mut conn).await {
        Ok(()) => result,
        Err(e) => {
            // Restoration unconfirmed: this connection must never serve
            // another caller. Detach it from the pool and close it.
            log::error!(
                "privilege restoration failed, discarding connection: {}",
                e
            );
            let detached = conn.detach();
            if let Err(close_err) = detached.close().await {
                log::warn!("error closing discarded connection: {}", close_err);
            }
            result
        }
    }
}

async fn bind_and_deescalate(conn: &mut PgConnection, caller_id: &str) -> Result<()> {
    sqlx::query("SELECT set_config($1, $2, false)")
        .bind(SESSION_USER_VAR)
        .bind(caller_id)
        .execute(&mut *conn)
        .await
        .context("failed to bind caller identity into session")?;
    let set_role = format!("SET ROLE {}", RESTRICTED_ROLE);
    conn.execute(set_role.as_str())
        .await
        .context("failed to de-escalate to restricted role")?;
    Ok(())
}

async fn execute_rows(conn: &mut PgConnection, sql: &str) -> Result<Vec<serde_json::Value>> {
    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .context("scoped query execution failed")?;
    Ok(db::rows_to_json(&rows))
}

async fn restore(conn: &mut PgConnection) -> Result<()> {
    conn.execute("RESET ROLE")
        .await
        .context("failed to restore prior role")?;
    sqlx::query("SELECT set_config($1, '', false)")
        .bind(SESSION_USER_VAR)
        .execute(&mut *conn)
        .await
        .context("failed to clear session identity")?;
    Ok(())
}
