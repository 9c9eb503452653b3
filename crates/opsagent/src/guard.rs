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

// Fail-closed screening of generated SQL. Generated text is untrusted: it
// reaches an execution capability only as `Verdict::Executable`, which
// carries the casing-normalized query and nothing else does.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Mutating/DDL keywords that must never appear as standalone tokens.
const DENYLIST: [&str; 9] = [
    "CREATE", "DROP", "ALTER", "DELETE", "INSERT", "UPDATE", "TRUNCATE", "EXEC", "EXECUTE",
];

/// Known mixed-case and underscored identifiers requiring exact-case
/// quoting to resolve against the physical schema. Fixed allow-list: a new
/// mixed-case column added later must be added here too.
const QUOTED_IDENTIFIERS: [&str; 36] = [
    "createdAt",
    "created_at",
    "updatedAt",
    "updated_at",
    "vendorLocation",
    "vendor_location",
    "vendorId",
    "vendor_id",
    "customerId",
    "customer_id",
    "driverId",
    "driver_id",
    "vendorLocationId",
    "vendor_location_id",
    "isActive",
    "is_active",
    "isAvailable",
    "is_available",
    "firstName",
    "first_name",
    "lastName",
    "last_name",
    "licenseNumber",
    "license_number",
    "licenseExpiryDate",
    "license_expiry_date",
    "vehicleNumber",
    "vehicle_number",
    "vehicleType",
    "vehicle_type",
    "orderNumber",
    "order_number",
    "totalAmount",
    "total_amount",
    "userId",
    "user_id",
];

static DENY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DENYLIST.join("|"))).expect("denylist regex")
});

// Alternation order matters twice over: quoted spans and string literals
// come first so their contents pass through untouched (which also makes
// normalization idempotent), and identifiers are sorted longest-first so
// e.g. `vendorLocationId` is never half-matched as `vendorLocation`.
static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut idents: Vec<&str> = QUOTED_IDENTIFIERS.to_vec();
    idents.sort_by_key(|s| std::cmp::Reverse(s.len()));
    Regex::new(&format!(
        r#"'[^']*'|"[^"]*"|\b(?:{})\b"#,
        idents.join("|")
    ))
    .expect("quoting regex")
});

/// Outcome of screening one generated query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum Verdict {
    /// Safe to execute; carries the casing-normalized query text.
    Executable(String),
    /// Refused; carries the reason.
    Rejected(String),
}

/// Screen a candidate query: shape check, denylist check, then identifier
/// normalization. Fail-closed: anything not positively identified as a
/// read-only SELECT is rejected.
pub fn check(sql: &str) -> Verdict {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Verdict::Rejected("empty query".to_string());
    }
    if !trimmed.to_uppercase().starts_with("SELECT") {
        return Verdict::Rejected("only SELECT queries are allowed".to_string());
    }
    if let Some(caps) = DENY_RE.captures(trimmed) {
        return Verdict::Rejected(format!(
            "forbidden keyword '{}' detected",
            caps[1].to_uppercase()
        ));
    }
    Verdict::Executable(normalize(trimmed))
}

/// True when the query would be accepted for execution.
pub fn validate(sql: &str) -> bool {
    matches!(check(sql), Verdict::Executable(_))
}

/// Quote every standalone occurrence of a known mixed-case/underscored
/// identifier to its exact-case form. Already-quoted spans and string
/// literal contents are left untouched; the pass is idempotent.
pub fn normalize(sql: &str) -> String {
    QUOTE_RE
        .replace_all(sql, |caps: &regex::Captures| {
            let m = &caps[0];
            if m.starts_with('\'') || m.starts_with('"') {
                m.to_string()
            } else {
                format!("\"{}\"", m)
            }
        })
        .into_owned()
}
