use opsagent::similarity::TableMatch;
use opsagent::sqlgen::{build_sql_prompt, extract_sql};

fn orders_match() -> TableMatch {
    TableMatch {
        id: "t1".to_string(),
        name: "orders".to_string(),
        kind: "table".to_string(),
        description: Some("Customer orders".to_string()),
        columns: vec![
            "id".to_string(),
            "status".to_string(),
            "total_amount".to_string(),
        ],
        similarity: 0.8734,
    }
}

#[test]
fn extract_sql_strips_sql_fence() {
    let fenced = "```sql\nSELECT id, status, total_amount FROM orders\n```";
    assert_eq!(
        extract_sql(fenced),
        "SELECT id, status, total_amount FROM orders"
    );
}

#[test]
fn extract_sql_strips_bare_fence() {
    let fenced = "```\nSELECT 1\n```";
    assert_eq!(extract_sql(fenced), "SELECT 1");
}

#[test]
fn extract_sql_is_noop_on_plain_text() {
    assert_eq!(extract_sql("SELECT 1"), "SELECT 1");
    assert_eq!(extract_sql("  SELECT 1\n"), "SELECT 1");
}

#[test]
fn prompt_lists_exact_names_columns_and_score() {
    let prompt = build_sql_prompt("show my orders", &[orders_match()]);
    assert!(prompt.contains("Table 1: orders"));
    assert!(prompt.contains("Columns: id, status, total_amount"));
    assert!(prompt.contains("Relevance Score: 87.34%"));
    assert!(prompt.contains("User Query: \"show my orders\""));
}

#[test]
fn prompt_marks_missing_description() {
    let mut t = orders_match();
    t.description = None;
    let prompt = build_sql_prompt("anything", &[t.clone()]);
    assert!(prompt.contains("Description: not available"));

    t.description = Some("   ".to_string());
    let prompt = build_sql_prompt("anything", &[t]);
    assert!(prompt.contains("Description: not available"));
}

#[test]
fn prompt_carries_strict_rules() {
    let prompt = build_sql_prompt("show my orders", &[orders_match()]);
    assert!(prompt.contains("ONLY use the exact table names"));
    assert!(prompt.contains("empty SELECT"));
    assert!(prompt.contains("Return ONLY the SQL query"));
}

#[test]
fn prompt_separates_multiple_tables() {
    let mut second = orders_match();
    second.name = "customers".to_string();
    let prompt = build_sql_prompt("who ordered most", &[orders_match(), second]);
    assert!(prompt.contains("Table 1: orders"));
    assert!(prompt.contains("Table 2: customers"));
}
