use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn desk_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("desk");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // CSV fixtures
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("tickets.csv"),
        "id,title,category,status,account,created_at,closed_at,assignee,root_cause,description,resolution\n\
         T-100,Password reset for new starter,Accounts,Closed,Acme,2025-01-05 09:00:00,2025-01-05 09:30:00,sam,,User locked out on first login,Reset password and walked user through login\n\
         T-101,VPN tunnel drops hourly,Network,Closed,Acme,2025-01-06 10:00:00,2025-01-08 16:00:00,lee,Firewall misconfiguration,Remote users lose VPN connectivity every hour,Corrected firewall keepalive configuration\n\
         T-102,Billing export crashes,Software,Open,Globex,2025-01-07 11:00:00,,dana,,Export job dies with a stack trace halfway through,\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("comments.csv"),
        "id,ticket_id,author,body,visibility,created_at\n\
         C-1,T-100,sam,Your password has been reset. Please try logging in again.,public,2025-01-05 09:20:00\n\
         C-2,T-101,lee,We identified a firewall issue and are working on it.,public,2025-01-07 09:00:00\n\
         C-3,T-101,lee,Keepalive was set to 0 on the secondary node.,internal,2025-01-07 09:05:00\n\
         C-4,T-101,lee,This is now fixed. Apologies for the disruption.,public,2025-01-08 16:00:00\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("timesheet.csv"),
        "id,ticket_id,user,hours,entry_date,notes\n\
         TS-1,T-100,sam,0.5,2025-01-05,\n\
         TS-2,T-101,lee,3.0,2025-01-07,diagnosis\n\
         TS-3,T-101,lee,1.5,2025-01-08,fix and verify\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/desk.sqlite"

[retrieval]
final_limit = 12

[server]
bind = "127.0.0.1:7410"
"#,
        root.display()
    );

    let config_path = config_dir.join("desk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_desk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = desk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run desk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn import_all(tmp: &TempDir, config_path: &Path) {
    let files = tmp.path().join("files");
    run_desk(config_path, &["init"]);
    for (entity, file) in [
        ("tickets", "tickets.csv"),
        ("comments", "comments.csv"),
        ("timesheet", "timesheet.csv"),
    ] {
        let path = files.join(file);
        let (stdout, stderr, success) =
            run_desk(config_path, &["import", entity, path.to_str().unwrap()]);
        assert!(
            success,
            "import {} failed: stdout={}, stderr={}",
            entity, stdout, stderr
        );
    }
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_desk(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_desk(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_desk(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_tickets() {
    let (tmp, config_path) = setup_test_env();
    run_desk(&config_path, &["init"]);

    let path = tmp.path().join("files").join("tickets.csv");
    let (stdout, stderr, success) =
        run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rows read: 3"));
    assert!(stdout.contains("inserted: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_import_unchanged_rows_skipped() {
    let (tmp, config_path) = setup_test_env();
    run_desk(&config_path, &["init"]);

    let path = tmp.path().join("files").join("tickets.csv");
    run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);
    let (stdout, _, success) =
        run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("inserted: 0"));
    assert!(stdout.contains("unchanged (skipped): 3"));
}

#[test]
fn test_reimport_identical_comments_and_timesheet_skipped() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let files = tmp.path().join("files");
    let comments = files.join("comments.csv");
    let (stdout, _, success) = run_desk(
        &config_path,
        &["import", "comments", comments.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("inserted: 0"));
    assert!(stdout.contains("updated: 0"));
    assert!(stdout.contains("unchanged (skipped): 4"));

    let timesheet = files.join("timesheet.csv");
    let (stdout, _, success) = run_desk(
        &config_path,
        &["import", "timesheet", timesheet.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("inserted: 0"));
    assert!(stdout.contains("unchanged (skipped): 3"));
}

#[test]
fn test_reimport_changed_assignee_updates_ticket() {
    let (tmp, config_path) = setup_test_env();
    run_desk(&config_path, &["init"]);

    let path = tmp.path().join("files").join("one_ticket.csv");
    let header = "id,title,created_at,assignee\n";
    fs::write(&path, format!("{}T-300,Printer jam,2025-02-01,sam\n", header)).unwrap();
    run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);

    // Same row with only the assignee changed must count as updated,
    // not unchanged.
    fs::write(&path, format!("{}T-300,Printer jam,2025-02-01,lee\n", header)).unwrap();
    let (stdout, _, success) =
        run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("updated: 1"));
    assert!(stdout.contains("unchanged (skipped): 0"));
}

#[test]
fn test_import_rejects_malformed_rows_non_fatally() {
    let (tmp, config_path) = setup_test_env();
    run_desk(&config_path, &["init"]);

    // Second row has no title, third has an unparseable timestamp.
    let path = tmp.path().join("files").join("bad_tickets.csv");
    fs::write(
        &path,
        "id,title,created_at\n\
         T-200,Valid row,2025-01-01\n\
         T-201,,2025-01-02\n\
         T-202,Broken date,next tuesday\n",
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_desk(&config_path, &["import", "tickets", path.to_str().unwrap()]);
    assert!(success, "import should not abort on bad rows: {}", stderr);
    assert!(stdout.contains("rows read: 3"));
    assert!(stdout.contains("inserted: 1"));
    assert!(stdout.contains("rejected: 2"));
    assert!(stderr.contains("rejected ticket row"));
}

#[test]
fn test_import_unknown_entity_fails() {
    let (tmp, config_path) = setup_test_env();
    run_desk(&config_path, &["init"]);

    let path = tmp.path().join("files").join("tickets.csv");
    let (_, stderr, success) =
        run_desk(&config_path, &["import", "incidents", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Unknown import entity"));
}

#[test]
fn test_tier_backfill_labels_tickets() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, stderr, success) = run_desk(&config_path, &["tier", "backfill"]);
    assert!(success, "backfill failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("candidates: 3"));
    // T-100 has no keywords (L1), T-101 mentions vpn/firewall (L2),
    // T-102 mentions a stack trace (L3).
    assert!(stdout.contains("L1: 1"));
    assert!(stdout.contains("L2: 1"));
    assert!(stdout.contains("L3: 1"));
    assert!(stdout.contains("labeled: 3"));
}

#[test]
fn test_tier_backfill_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, _, success) = run_desk(&config_path, &["tier", "backfill", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));

    // Nothing was labeled, so a second dry run still sees all candidates.
    let (stdout, _, _) = run_desk(&config_path, &["tier", "backfill", "--dry-run"]);
    assert!(stdout.contains("candidates: 3"));
}

#[test]
fn test_tier_backfill_skips_labeled_without_full() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    run_desk(&config_path, &["tier", "backfill"]);
    let (stdout, _, success) = run_desk(&config_path, &["tier", "backfill"]);
    assert!(success);
    assert!(stdout.contains("candidates: 0"));

    let (stdout, _, _) = run_desk(&config_path, &["tier", "backfill", "--full"]);
    assert!(stdout.contains("candidates: 3"));
}

#[test]
fn test_tier_show_distribution() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);
    run_desk(&config_path, &["tier", "backfill"]);

    let (stdout, _, success) = run_desk(&config_path, &["tier", "show"]);
    assert!(success);
    assert!(stdout.contains("3 tickets"));
    assert!(stdout.contains("L1"));
    assert!(stdout.contains("L3"));
}

#[test]
fn test_search_keyword() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, stderr, success) = run_desk(&config_path, &["search", "vpn"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("T-101"));
    assert!(!stdout.contains("T-100"));
}

#[test]
fn test_search_status_filter() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, _, success) = run_desk(
        &config_path,
        &["search", "vpn", "--status", "Open"],
    );
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_semantic_requires_embeddings() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) =
        run_desk(&config_path, &["search", "vpn", "--mode", "semantic"]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_search_invalid_since_date_fails() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) =
        run_desk(&config_path, &["search", "vpn", "--since", "last week"]);
    assert!(!success);
    assert!(stderr.contains("Invalid since date"));
}

#[test]
fn test_search_unknown_mode_fails() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) =
        run_desk(&config_path, &["search", "vpn", "--mode", "fuzzy"]);
    assert!(!success);
    assert!(stderr.contains("Unknown search mode"));
}

#[test]
fn test_get_ticket_detail() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, stderr, success) = run_desk(&config_path, &["get", "T-101"]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("VPN tunnel drops hourly"));
    assert!(stdout.contains("Comments (3)"));
    assert!(stdout.contains("hours:       4.50"));
}

#[test]
fn test_get_missing_ticket_fails() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) = run_desk(&config_path, &["get", "T-999"]);
    assert!(!success);
    assert!(stderr.contains("ticket not found"));
}

#[test]
fn test_stats_reports_counts_and_fcr() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (stdout, stderr, success) = run_desk(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Tickets:     3"));
    assert!(stdout.contains("Comments:    4"));
    // Two closed tickets; T-100 has one public comment (FCR), T-101 has
    // three public comments (not FCR).
    assert!(stdout.contains("FCR:         1 / 2"));
}

#[test]
fn test_index_requires_embedding_provider() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) = run_desk(&config_path, &["index", "pending"]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"));
}

#[test]
fn test_score_requires_llm_provider() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) = run_desk(&config_path, &["score", "run", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("LLM provider is disabled"));
}

#[test]
fn test_etl_dry_run_counts_without_warehouse() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    // Dry run only reads the local store, so it works with no warehouse
    // configured.
    let (stdout, stderr, success) = run_desk(&config_path, &["etl", "run", "--dry-run"]);
    assert!(success, "etl dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("tickets to copy: 3"));
    assert!(stdout.contains("comments to copy: 4"));
    assert!(stdout.contains("timesheet entries to copy: 3"));
}

#[test]
fn test_etl_run_without_warehouse_fails() {
    let (tmp, config_path) = setup_test_env();
    import_all(&tmp, &config_path);

    let (_, stderr, success) = run_desk(&config_path, &["etl", "run"]);
    assert!(!success);
    assert!(stderr.contains("Warehouse is not configured"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_desk(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
