use crate::cli::utils::*;
use serde_json::json;

#[test]
fn test_truncate_with_ellipsis_short_string() {
    let result = truncate_with_ellipsis("hello", 10);
    assert_eq!(result, "hello");
}

#[test]
fn test_truncate_with_ellipsis_long_string() {
    let result = truncate_with_ellipsis("hello world this is a long string", 10);
    assert_eq!(result, "hello w...");
}

#[test]
fn test_truncate_with_ellipsis_unicode() {
    let result = truncate_with_ellipsis("hello 世界", 8);
    assert_eq!(result, "hello 世界");

    let result2 = truncate_with_ellipsis("hello 世界", 7);
    assert_eq!(result2, "hell...");
}

#[test]
fn test_or_dash() {
    assert_eq!(or_dash(None), "-");
    assert_eq!(or_dash(Some("")), "-");
    assert_eq!(or_dash(Some("x")), "x");
}

#[test]
fn test_join_or_dash() {
    assert_eq!(join_or_dash(&[]), "-");
    assert_eq!(
        join_or_dash(&["a".to_string(), "b".to_string()]),
        "a, b"
    );
}

#[test]
fn test_build_params_merges_pairs_over_json() {
    let params = build_params(
        Some(r#"{"project_id": 1, "week": "2025-W01"}"#),
        &["week=2025-W07".to_string(), "page_size=20".to_string()],
    )
    .unwrap();

    assert_eq!(
        serde_json::Value::Object(params),
        json!({"project_id": 1, "week": "2025-W07", "page_size": 20})
    );
}

#[test]
fn test_build_params_keeps_key_order() {
    let params = build_params(None, &["b=1".to_string(), "a=2".to_string()]).unwrap();
    let keys: Vec<&String> = params.keys().collect();
    assert_eq!(keys, vec!["b", "a"]);
}

#[test]
fn test_build_params_rejects_bad_input() {
    assert!(build_params(Some("[1, 2]"), &[]).is_err());
    assert!(build_params(Some("{not json"), &[]).is_err());
    assert!(build_params(None, &["novalue".to_string()]).is_err());
    assert!(build_params(None, &["=1".to_string()]).is_err());
}
