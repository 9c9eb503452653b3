use opsagent::guard::{check, normalize, validate, Verdict};

#[test]
fn accepts_plain_select() {
    assert!(validate("SELECT id FROM orders"));
}

#[test]
fn accepts_lowercase_and_padded_select() {
    assert!(validate("  select id from orders  "));
}

#[test]
fn rejects_non_select() {
    assert!(!validate("DROP TABLE orders;"));
    assert!(!validate("WITH x AS (SELECT 1) SELECT * FROM x"));
    assert!(!validate(""));
    assert!(!validate("   "));
}

#[test]
fn rejects_denylisted_keyword_anywhere() {
    let sql = "SELECT * FROM orders; DROP TABLE orders;";
    match check(sql) {
        Verdict::Rejected(reason) => assert!(reason.contains("DROP"), "reason: {}", reason),
        Verdict::Executable(_) => panic!("multi-statement drop must be rejected"),
    }
    assert!(!validate("SELECT id FROM orders WHERE id IN (SELECT id FROM x); DELETE FROM orders"));
}

#[test]
fn keyword_inside_identifier_does_not_trip_denylist() {
    // updatedAt contains UPDATE, createdAt contains no keyword but keeps
    // company; neither may be mistaken for the keyword itself.
    assert!(validate("SELECT updatedAt FROM orders"));
    assert!(validate("SELECT id FROM orders WHERE updatedAt > '2024-01-01'"));
    assert!(validate("SELECT \"updatedAt\", \"createdAt\" FROM orders"));
}

#[test]
fn standalone_keyword_still_trips_with_identifier_nearby() {
    assert!(!validate("SELECT updatedAt FROM orders; UPDATE orders SET status = 'x'"));
}

#[test]
fn normalize_quotes_known_identifiers() {
    assert_eq!(
        normalize("SELECT id, createdAt FROM orders"),
        "SELECT id, \"createdAt\" FROM orders"
    );
    assert_eq!(
        normalize("SELECT total_amount FROM orders ORDER BY order_number"),
        "SELECT \"total_amount\" FROM orders ORDER BY \"order_number\""
    );
}

#[test]
fn normalize_prefers_longest_identifier() {
    assert_eq!(
        normalize("SELECT vendorLocationId FROM vendor_locations"),
        "SELECT \"vendorLocationId\" FROM vendor_locations"
    );
}

#[test]
fn normalize_is_idempotent() {
    let once = normalize("SELECT createdAt, total_amount FROM orders WHERE userId = 'u1'");
    let twice = normalize(&once);
    assert_eq!(once, twice);
}

#[test]
fn normalize_leaves_string_literals_alone() {
    let sql = "SELECT id FROM orders WHERE status = 'createdAt'";
    assert_eq!(normalize(sql), sql);
}

#[test]
fn normalize_leaves_unknown_identifiers_alone() {
    let sql = "SELECT id, status FROM orders";
    assert_eq!(normalize(sql), sql);
}

#[test]
fn check_executable_carries_normalized_query() {
    match check("SELECT id, total_amount FROM orders") {
        Verdict::Executable(sql) => {
            assert_eq!(sql, "SELECT id, \"total_amount\" FROM orders");
        }
        Verdict::Rejected(reason) => panic!("unexpected rejection: {}", reason),
    }
}

#[test]
fn rejection_reasons_are_informative() {
    match check("TRUNCATE orders") {
        Verdict::Rejected(reason) => assert!(!reason.is_empty()),
        Verdict::Executable(_) => panic!("truncate must be rejected"),
    }
    match check("") {
        Verdict::Rejected(reason) => assert!(!reason.is_empty()),
        Verdict::Executable(_) => panic!("empty query must be rejected"),
    }
}
