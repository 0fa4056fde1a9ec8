use std::path::PathBuf;
use std::process::Command;

const CORPUS: &str = r#"{
    "build_number": "cli-fixture",
    "data": [
        {"type": "GENERIC", "abstract": "junk_base", "weight": "10 g"},
        {"type": "GENERIC", "id": "bottle_cap", "copy-from": "junk_base"},
        {"type": "TOOL", "id": "hammer", "weight": "1 kg"},
        {"type": "item_group", "id": "trash", "subtype": "collection", "entries": [
            {"item": "bottle_cap", "prob": 80},
            {"item": "hammer", "prob": 10, "event": "halloween"}
        ]}
    ]
}"#;

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "cataguide-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn write_corpus(label: &str, contents: &str) -> PathBuf {
    let path = temp_path(label);
    std::fs::write(&path, contents).expect("write corpus");
    path
}

#[test]
fn cli_get_writes_flattened_record() {
    let exe = env!("CARGO_BIN_EXE_cataguide");
    let corpus = write_corpus("get-corpus", CORPUS);
    let output_path = temp_path("get");
    let status = Command::new(exe)
        .arg("--corpus")
        .arg(&corpus)
        .args(["--report", "json", "--output"])
        .arg(&output_path)
        .args(["get", "--kind", "GENERIC", "--id", "bottle_cap"])
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    let value: serde_json::Value = serde_json::from_str(&content).expect("json output");
    assert_eq!(value["command"], "get");
    assert_eq!(value["fields"]["weight"], "10 g");
}

#[test]
fn cli_spawn_honors_events() {
    let exe = env!("CARGO_BIN_EXE_cataguide");
    let corpus = write_corpus("spawn-corpus", CORPUS);

    let quiet = temp_path("spawn-quiet");
    let status = Command::new(exe)
        .arg("--corpus")
        .arg(&corpus)
        .args(["--report", "csv", "--output"])
        .arg(&quiet)
        .args(["spawn", "--root", "trash"])
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(quiet).expect("read output");
    assert!(content.contains("bottle_cap,0.8,0.8"));
    assert!(!content.contains("hammer"));

    let festive = temp_path("spawn-festive");
    let status = Command::new(exe)
        .arg("--corpus")
        .arg(&corpus)
        .args(["--report", "csv", "--output"])
        .arg(&festive)
        .args(["spawn", "--root", "trash", "--events", "halloween"])
        .args(["--sample", "500", "--seed", "9"])
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(festive).expect("read output");
    assert!(content.contains("hammer,0.1,0.1"));
}

#[test]
fn cli_check_fails_on_cycles() {
    let exe = env!("CARGO_BIN_EXE_cataguide");
    let corpus = write_corpus(
        "check-corpus",
        r#"{"data": [
            {"type": "MONSTER", "id": "a", "copy-from": "b"},
            {"type": "MONSTER", "id": "b", "copy-from": "a"}
        ]}"#,
    );
    let output_path = temp_path("check");
    let status = Command::new(exe)
        .arg("--corpus")
        .arg(&corpus)
        .args(["--report", "markdown", "--output"])
        .arg(&output_path)
        .arg("check")
        .status()
        .expect("run cli");
    assert_eq!(status.code(), Some(1));
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("# Corpus check"));
    assert!(content.contains("**Structural errors**: 2"));
}

#[test]
fn cli_check_passes_on_clean_corpus() {
    let exe = env!("CARGO_BIN_EXE_cataguide");
    let corpus = write_corpus("clean-corpus", CORPUS);
    let output = Command::new(exe)
        .arg("--corpus")
        .arg(&corpus)
        .args(["--report", "json", "check"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cli-fixture"));
}

#[test]
fn cli_reports_missing_corpus() {
    let exe = env!("CARGO_BIN_EXE_cataguide");
    let output = Command::new(exe)
        .arg("--corpus")
        .arg(temp_path("absent"))
        .arg("check")
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read corpus"));
}
