//! CLI end-to-end tests.
//!
//! These tests spawn the actual `xindex` binary against sidecar fixtures in
//! a temp directory and validate stdout and exit codes.
//!
//! Exit code expectations:
//! - 0: Success
//! - 2: Invalid arguments (bad position, missing path)
//! - 3: File not indexed in time
//! - 5: Position cannot be mapped

mod support;

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

use support::units::{foo_main, FOO_MAIN};
use xindex::config::{
    ENV_BACKLOG_TIMEOUT_MS, ENV_BATCH_SIZE, ENV_CACHE_DIR, ENV_THREADS, ENV_TICK_MS,
};
use xindex::parser::SidecarParser;

/// Run xindex in `dir` and return (stdout json, exit code).
fn run_xindex(dir: &Path, args: &[&str]) -> (Value, i32) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_xindex"));
    command.args(args).current_dir(dir).env_remove("RUST_LOG");
    for var in [
        ENV_THREADS,
        ENV_BATCH_SIZE,
        ENV_TICK_MS,
        ENV_BACKLOG_TIMEOUT_MS,
        ENV_CACHE_DIR,
    ] {
        command.env_remove(var);
    }
    let output = command.output().expect("failed to execute xindex");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout should be valid JSON ({e}): {stdout}"));
    (json, output.status.code().unwrap_or(-1))
}

/// `src/a.cc` with its sidecar index, plus a file without one.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.cc"), FOO_MAIN).unwrap();
    // Paths in the sidecar are relative to the working directory.
    let record = foo_main("src/a.cc");
    fs::write(
        dir.path().join(SidecarParser::sidecar_path("src/a.cc")),
        serde_json::to_string_pretty(&vec![record]).unwrap(),
    )
    .unwrap();
    fs::write(src.join("notes.txt"), "not indexed\n").unwrap();
    dir
}

// ============================================================================
// index / dump
// ============================================================================

#[test]
fn index_reports_merged_files_and_counts() {
    let dir = fixture();
    let (json, code) = run_xindex(dir.path(), &["--no-cache", "index", "src"]);
    assert_eq!(code, 0, "{json}");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["schema_version"], "1");

    let files = json["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["path"], "src/a.cc");
    assert_eq!(files[0]["state"], "merged");
    assert_eq!(json["store"]["files"], 1);
    assert_eq!(json["store"]["funcs"], 2);
}

#[test]
fn disk_cache_is_written_and_reused() {
    let dir = fixture();
    let cache = dir.path().join("cache");
    let cache_arg = cache.to_string_lossy().into_owned();

    let (first, code) = run_xindex(dir.path(), &["--cache-dir", &cache_arg, "dump", "src"]);
    assert_eq!(code, 0, "{first}");
    let entries = fs::read_dir(&cache).unwrap().count();
    assert_eq!(entries, 1);

    let (second, code) = run_xindex(dir.path(), &["--cache-dir", &cache_arg, "dump", "src"]);
    assert_eq!(code, 0, "{second}");
    assert_eq!(second["files"][0]["state"], "merged");
    assert_eq!(first["dump"], second["dump"]);
}

#[test]
fn missing_path_returns_exit_2() {
    let dir = fixture();
    let (json, code) = run_xindex(dir.path(), &["--no-cache", "index", "nowhere"]);
    assert_eq!(code, 2);
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"]["code"], 2);
}

// ============================================================================
// refs
// ============================================================================

#[test]
fn refs_finds_definition_and_calls() {
    let dir = fixture();
    let (json, code) = run_xindex(
        dir.path(),
        &["--no-cache", "refs", "src/a.cc", "--at", "2:15"],
    );
    assert_eq!(code, 0, "{json}");
    assert_eq!(json["at"], "2:15");

    let defs = json["definitions"].as_array().unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0]["path"], "src/a.cc");
    assert_eq!(defs[0]["range"], "1:5-1:8");

    let refs = json["references"].as_array().unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0]["range"], "2:14-2:17");
    assert_eq!(refs[0]["roles"], serde_json::json!(["reference", "call"]));
}

#[test]
fn refs_include_decls_adds_the_spelling() {
    let dir = fixture();
    let (json, code) = run_xindex(
        dir.path(),
        &["--no-cache", "refs", "src/a.cc", "--at", "2:15", "--include-decls"],
    );
    assert_eq!(code, 0, "{json}");
    assert_eq!(json["references"].as_array().unwrap().len(), 2);
}

#[test]
fn refs_on_unindexable_file_returns_exit_3() {
    let dir = fixture();
    let (json, code) = run_xindex(
        dir.path(),
        &[
            "--no-cache",
            "--backlog-timeout-ms",
            "100",
            "refs",
            "src/missing.cc",
            "--at",
            "1:1",
        ],
    );
    assert_eq!(code, 3, "{json}");
    assert_eq!(json["error"]["code"], 3);
}

#[test]
fn refs_rejects_bad_position() {
    let dir = fixture();
    let (json, code) = run_xindex(dir.path(), &["--no-cache", "refs", "src/a.cc", "--at", "x"]);
    assert_eq!(code, 2);
    assert_eq!(json["status"], "error");
}

// ============================================================================
// map
// ============================================================================

#[test]
fn map_follows_inserted_lines() {
    let dir = fixture();
    fs::write(dir.path().join("edited.cc"), format!("// new\n{FOO_MAIN}")).unwrap();

    let (json, code) = run_xindex(
        dir.path(),
        &["map", "--indexed", "src/a.cc", "--buffer", "edited.cc", "--at", "2:14"],
    );
    assert_eq!(code, 0, "{json}");
    assert_eq!(json["direction"], "index_to_buffer");
    assert_eq!(json["to"], "3:14");

    let (json, code) = run_xindex(
        dir.path(),
        &[
            "map", "--indexed", "src/a.cc", "--buffer", "edited.cc", "--at", "1:1", "--reverse",
        ],
    );
    assert_eq!(code, 5, "{json}");
}
