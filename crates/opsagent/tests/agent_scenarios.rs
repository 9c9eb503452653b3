// End-to-end behavior of the text stages: what the generator returns is
// de-fenced, screened, and normalized exactly as it would be inside one
// request, without needing a live gateway or database.

use opsagent::answer::{build_answer_prompt, sanitize_rows};
use opsagent::guard::{check, Verdict};
use opsagent::sqlgen::extract_sql;

#[test]
fn scenario_fenced_select_is_accepted_and_normalized() {
    // Generator wraps its reply in a ```sql fence; after de-fencing the
    // guard accepts it and quotes the mixed-case physical identifier.
    let generated = "```sql\nSELECT id, status, total_amount FROM orders\n```";
    let candidate = extract_sql(generated);
    match check(&candidate) {
        Verdict::Executable(sql) => {
            assert_eq!(sql, "SELECT id, status, \"total_amount\" FROM orders");
        }
        Verdict::Rejected(reason) => panic!("unexpected rejection: {}", reason),
    }
}

#[test]
fn scenario_stacked_mutation_is_rejected_before_execution() {
    // Generator was fooled into stacking a mutating statement; the guard
    // refuses it and the request proceeds with empty rows.
    let generated = "SELECT * FROM orders; DROP TABLE orders;";
    let candidate = extract_sql(generated);
    match check(&candidate) {
        Verdict::Rejected(reason) => assert!(reason.contains("DROP")),
        Verdict::Executable(sql) => panic!("must not execute: {}", sql),
    }
}

#[test]
fn scenario_empty_generation_is_rejected() {
    let candidate = extract_sql("```sql\n```");
    assert_eq!(candidate, "");
    assert!(matches!(check(&candidate), Verdict::Rejected(_)));
}

#[test]
fn sanitize_removes_internal_embedding_field() {
    let rows = vec![
        serde_json::json!({"id": "o1", "status": "pending", "embed": [0.1, 0.2]}),
        serde_json::json!({"id": "o2", "status": "shipped"}),
    ];
    let cleaned = sanitize_rows(&rows);
    assert_eq!(cleaned.len(), 2);
    for row in &cleaned {
        assert!(row.get("embed").is_none());
    }
    assert_eq!(cleaned[0]["id"], "o1");
    assert_eq!(cleaned[1]["status"], "shipped");
}

#[test]
fn answer_prompt_contains_question_and_rows() {
    let rows = vec![serde_json::json!({"order_number": "ORD-1001", "status": "pending"})];
    let prompt = build_answer_prompt("show my orders", &rows);
    assert!(prompt.contains("\"show my orders\""));
    assert!(prompt.contains("ORD-1001"));
    assert!(prompt.contains("DO NOT mention databases"));
}

#[test]
fn answer_prompt_handles_empty_rows() {
    let prompt = build_answer_prompt("show my orders", &[]);
    assert!(prompt.contains("[]"));
    assert!(prompt.contains("If no data was found"));
}
