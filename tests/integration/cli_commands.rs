#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const EDGES: &str = "2 1 subcat\n3 1 subcat\n100 2 file\n100 3 file\n101 3 file\n";

fn setup_graph() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("edges.txt");
    fs::write(&input, EDGES).expect("write edges");
    let out = dir.path().join("db");
    cargo_bin_cmd!("catgraph")
        .args(["build", "--quiet", "--input"])
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    (dir, out)
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

#[test]
fn build_reads_stdin_and_reports_json() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("db");
    let output = cargo_bin_cmd!("catgraph")
        .args(["--format", "json", "build", "--quiet", "--out"])
        .arg(&out)
        .write_stdin(EDGES)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary = stdout_json(&output);
    assert_eq!(summary["groups"], 3);
    assert_eq!(summary["max_node"], 102);
    assert!(out.join("done").exists());
}

#[test]
fn build_rejects_unsorted_input() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("catgraph")
        .args(["build", "--quiet", "--out"])
        .arg(dir.path().join("db"))
        .write_stdin("2 5 subcat\n3 1 subcat\n")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn stats_json_counts_links() {
    let (_dir, db) = setup_graph();
    let output = cargo_bin_cmd!("catgraph")
        .args(["--format", "json", "stats"])
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = stdout_json(&output);
    assert_eq!(report["graph"]["subcat_links"], 2);
    assert_eq!(report["graph"]["file_links"], 3);
    assert_eq!(report["filesystem"]["done_marker"], true);
}

#[test]
fn verify_passes_then_flags_corruption() {
    let (_dir, db) = setup_graph();
    cargo_bin_cmd!("catgraph")
        .args(["verify", "--level", "full"])
        .arg(&db)
        .assert()
        .success();

    corrupt_first_file_entry(&db);
    cargo_bin_cmd!("catgraph")
        .args(["--format", "json", "verify"])
        .arg(&db)
        .assert()
        .code(2);
}

#[test]
fn offline_query_prints_protocol_lines() {
    let (_dir, db) = setup_graph();
    let output = cargo_bin_cmd!("catgraph")
        .arg("query")
        .arg(&db)
        .args(["--c1", "3", "--c2", "2", "--kind", "not"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(&lines[..3], ["COMPUTE_START", "RESULT 101,0,0", "OUTOF 1"]);
    assert!(lines[3].starts_with("DBAGE "));
    assert_eq!(lines[4], "DONE");
}

#[test]
fn offline_query_rejects_files_as_roots() {
    let (_dir, db) = setup_graph();
    cargo_bin_cmd!("catgraph")
        .arg("query")
        .arg(&db)
        .args(["--c1", "100"])
        .assert()
        .failure();
}

/// Points the first file of category 3 at category 2, which verify must
/// report as a category listed among files.
fn corrupt_first_file_entry(db: &Path) {
    let tree = db.join("catgraph.tree");
    let mut words: Vec<i32> = fs::read(&tree)
        .expect("read tree")
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let cat: Vec<i32> = fs::read(db.join("catgraph.cat"))
        .expect("read cat")
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let off = cat[3] as usize;
    let subcat_end = words[off] as usize;
    words[subcat_end] = 2;
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(&tree, bytes).expect("write tree");
}
