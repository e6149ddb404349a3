use jetbridge::{JetConfig, JetConnection, MarkerStyle};
use serde_json::json;

fn positional_conn() -> JetConnection {
    let config = JetConfig {
        marker_style: MarkerStyle::Positional,
        ..JetConfig::default()
    };
    let conn = JetConnection::open_in_memory_with(config).unwrap();
    conn.command("CREATE TABLE source (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)")
        .execute_non_query()
        .unwrap();
    conn
}

#[test]
fn test_named_markers_work_under_positional_style() {
    let conn = positional_conn();
    conn.command("INSERT INTO source (name) VALUES (@name)")
        .param("name", "Ada")
        .execute_non_query()
        .unwrap();
    let found = conn
        .command("SELECT name FROM source WHERE name = @name")
        .param("name", "Ada")
        .execute_scalar()
        .unwrap();
    assert_eq!(found, Some(json!("Ada")));
}

#[test]
fn test_repeated_name_expands_to_one_marker_each() {
    let conn = positional_conn();
    conn.command("INSERT INTO source (name) VALUES (@n)")
        .param("n", "x")
        .execute_non_query()
        .unwrap();
    // @n occurs twice; under positional style both become ? with their own copy
    let hits = conn
        .command("SELECT COUNT(*) FROM source WHERE name = @n OR name = upper(@n)")
        .param("n", "x")
        .execute_scalar()
        .unwrap();
    assert_eq!(hits, Some(json!(1)));
}

#[test]
fn test_question_marks_accepted_under_both_styles() {
    for style in [MarkerStyle::Named, MarkerStyle::Positional] {
        let config = JetConfig {
            marker_style: style,
            ..JetConfig::default()
        };
        let conn = JetConnection::open_in_memory_with(config).unwrap();
        conn.command("CREATE TABLE t (a INTEGER, b TEXT)")
            .execute_non_query()
            .unwrap();
        conn.command("INSERT INTO t VALUES (?, ?)")
            .positional(5)
            .positional("five")
            .execute_non_query()
            .unwrap();
        let b = conn
            .command("SELECT b FROM t WHERE a = ?")
            .positional(5)
            .execute_scalar()
            .unwrap();
        assert_eq!(b, Some(json!("five")));
    }
}

#[test]
fn test_batch_with_globals_under_positional_style() {
    let conn = positional_conn();
    let id = conn
        .command("INSERT INTO source (name) VALUES (@name); SELECT @@identity")
        .param("name", "first")
        .execute_scalar()
        .unwrap();
    assert_eq!(id, Some(json!(1)));
}

#[test]
fn test_config_from_json() {
    let config = JetConfig::from_json(json!({
        "marker_style": "positional",
        "identity_query": "SELECT 741"
    }))
    .unwrap();
    assert_eq!(config.marker_style, MarkerStyle::Positional);
    assert_eq!(config.identity_query, "SELECT 741");
}

#[test]
fn test_config_from_file() {
    let config = JetConfig::from_file("test_json/config.json").unwrap();
    assert_eq!(config.marker_style, MarkerStyle::Positional);
    assert_eq!(config.identity_query, "SELECT last_insert_rowid()");
}

#[test]
fn test_config_serializes_back_to_json() {
    let json = serde_json::to_value(JetConfig::default()).unwrap();
    assert_eq!(json["marker_style"], json!("named"));
}

#[test]
fn test_identity_query_override() {
    let config = JetConfig {
        identity_query: "SELECT 741".to_string(),
        ..JetConfig::default()
    };
    let conn = JetConnection::open_in_memory_with(config).unwrap();
    let id = conn.command("SELECT @@identity").execute_scalar().unwrap();
    assert_eq!(id, Some(json!(741)));
}
