//! CLI integration tests.
//!
//! Tests the command-line interface by running the binary as a subprocess.
//! Every test runs with `--offline`, so only fabricated-link patterns decide
//! removal and no network is touched.

mod common;

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use common::{read, section_dir};

/// Path to the compiled binary
fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cite-lifecycle"))
}

fn run(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute command")
}

const GROWTH: &str = "Revenue grew 40%. [^3]\n\n[^3]: [TechCrunch](https://techcrunch.com/x)\n";
const FUNDING: &str = "Funding of $10M. [^1]\n\n[^1]: [Fake](https://example.com/fake)\n";

// ============================================
// Tests for CLI argument parsing
// ============================================

#[test]
fn test_cli_help() {
    // Given: The CLI binary
    let output = run(&["--help"]);

    // Then: Help is displayed with every subcommand
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cite-lifecycle"), "{}", stdout);
    for command in ["validate", "clean", "consolidate", "run"] {
        assert!(stdout.contains(command), "help should list {}: {}", command, stdout);
    }
    assert!(output.status.success(), "Help should exit with success");
}

#[test]
fn test_cli_missing_dir_argument() {
    let output = run(&["validate"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("Usage"),
        "Should indicate missing required arguments: {}",
        stderr
    );
}

// ============================================
// Tests for validate
// ============================================

#[test]
fn test_validate_reports_and_counts() {
    // Given: One real and one fabricated citation
    let dir = section_dir(&[("01_growth.md", GROWTH), ("02_funding.md", FUNDING)]);

    // When: We validate offline
    let output = run(&["validate", dir.path().to_str().unwrap(), "--offline"]);

    // Then: The report flags the fabricated link and counts are on stderr
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("02_funding [^1]  invalid  https://example.com/fake"), "{}", stdout);
    assert!(stdout.contains("01_growth [^3]  uncertain"), "{}", stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("citations: 2 total, 0 removed, 2 remaining"), "{}", stderr);

    // And: Nothing was modified
    assert_eq!(read(&dir, "02_funding.md"), FUNDING);
}

#[test]
fn test_validate_json() {
    let dir = section_dir(&[("01_growth.md", GROWTH), ("02_funding.md", FUNDING)]);

    let output = run(&["validate", dir.path().to_str().unwrap(), "--json", "--offline"]);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["invalid"], 1);
    assert_eq!(report["citations"][1]["status"], "invalid");
    assert_eq!(report["citations"][1]["key"]["section"], "02_funding");
}

#[test]
fn test_zero_citations_still_reports_counts() {
    let dir = section_dir(&[("01_plain.md", "No sources at all.\n")]);

    let output = run(&["validate", dir.path().to_str().unwrap(), "--offline"]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("citations: 0 total, 0 removed, 0 remaining"), "{}", stderr);
}

// ============================================
// Tests for clean
// ============================================

#[test]
fn test_clean_rewrites_sections_in_place() {
    // Given: Section b loses its only citation, section a has a gap
    let dir = section_dir(&[("01_growth.md", GROWTH), ("02_funding.md", FUNDING)]);

    // When: We clean offline
    let output = run(&["clean", dir.path().to_str().unwrap(), "--offline"]);

    // Then: Files are rewritten and counts reported
    assert!(output.status.success());
    assert_eq!(read(&dir, "02_funding.md"), "Funding of $10M.\n\n");
    assert_eq!(
        read(&dir, "01_growth.md"),
        "Revenue grew 40%. [^1]\n\n[^1]: [TechCrunch](https://techcrunch.com/x)\n"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("citations: 2 total, 1 removed, 1 remaining"), "{}", stderr);
    assert!(stderr.contains("01_growth: renumbered 3->1"), "{}", stderr);
}

#[test]
fn test_clean_keeps_header_when_a_section_shares_its_name() {
    // Given: A section file called header.md citing a fabricated link,
    // and the real header elsewhere citing a live one under the same label
    let stray = "Stray [^1].\n\n[^1]: [Fake](https://example.com/fake)\n";
    let dir = section_dir(&[("header.md", stray), ("01_growth.md", GROWTH)]);
    let title_text = "# Report [^1]\n\n[^1]: [Real](https://news.org/real)\n";
    let title_dir = section_dir(&[("title.md", title_text)]);
    let title = title_dir.path().join("title.md");

    // When: We clean with the separate header
    let output = run(&[
        "clean",
        dir.path().to_str().unwrap(),
        "--header",
        title.to_str().unwrap(),
        "--offline",
    ]);

    // Then: The real header keeps its citation and the colliding file is skipped
    assert!(output.status.success());
    assert_eq!(read(&title_dir, "title.md"), title_text);
    assert_eq!(read(&dir, "header.md"), stray);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("skipped"), "{}", stderr);
    assert!(stderr.contains("header.md"), "{}", stderr);
}

#[test]
fn test_clean_dry_run_writes_nothing() {
    let dir = section_dir(&[("01_growth.md", GROWTH), ("02_funding.md", FUNDING)]);

    let output = run(&["clean", dir.path().to_str().unwrap(), "--dry-run", "--offline"]);

    assert!(output.status.success());
    assert_eq!(read(&dir, "01_growth.md"), GROWTH);
    assert_eq!(read(&dir, "02_funding.md"), FUNDING);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 removed"), "{}", stderr);
}

// ============================================
// Tests for consolidate and run
// ============================================

#[test]
fn test_consolidate_to_stdout() {
    let dir = section_dir(&[
        ("01_a.md", "Alpha [^1].\n\n[^1]: Source A.\n"),
        ("02_b.md", "Beta [^1].\n\n[^1]: Source B.\n"),
    ]);

    let output = run(&["consolidate", dir.path().to_str().unwrap()]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Alpha [^1].\n\nBeta [^2].\n\n---\n\n### Citations\n\n[^1]: Source A.\n[^2]: Source B.\n"
    );
}

#[test]
fn test_consolidate_with_header_to_file() {
    let dir = section_dir(&[
        ("header.md", "# Report [^1]\n\n[^1]: Header source.\n"),
        ("01_a.md", "Alpha [^1].\n\n[^1]: Source A.\n"),
    ]);
    let out = dir.path().join("out.txt");
    let header = dir.path().join("header.md");

    let output = run(&[
        "consolidate",
        dir.path().to_str().unwrap(),
        "--header",
        header.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "# Report [^1]\n\nAlpha [^2].\n\n---\n\n### Citations\n\n[^1]: Header source.\n[^2]: Source A.\n"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("listed 2 citation(s)"), "{}", stderr);
}

#[test]
fn test_run_writes_document_and_report_leaving_sections() {
    // Given: The worked example
    let dir = section_dir(&[("01_growth.md", GROWTH), ("02_funding.md", FUNDING)]);
    let out = tempfile::TempDir::new().unwrap();
    let document = out.path().join("report.md");
    let report = out.path().join("report.json");

    // When: The full pipeline runs
    let output = run(&[
        "run",
        dir.path().to_str().unwrap(),
        "-o",
        document.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
        "--offline",
    ]);

    // Then: The document is consolidated without the fabricated citation
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&document).unwrap(),
        "Revenue grew 40%. [^1]\n\nFunding of $10M.\n\n---\n\n### Citations\n\n\
         [^1]: [TechCrunch](https://techcrunch.com/x)\n"
    );

    // And: The JSON report carries the counts
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["counts"]["removed"], 1);
    assert_eq!(json["counts"]["remaining"], 1);
    assert_eq!(json["consolidation"]["citations"][0]["source"]["section"], "01_growth");
    assert_eq!(json["renumbered"][0]["mapping"]["3"], 1);

    // And: The sections themselves are untouched
    assert_eq!(read(&dir, "02_funding.md"), FUNDING);
}

// ============================================
// Tests for exit codes and error hints
// ============================================

#[test]
fn test_exit_code_10_input_dir_not_found() {
    let output = run(&["validate", "/nonexistent/sections", "--offline"]);

    assert_eq!(output.status.code(), Some(10));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hint:"), "{}", stderr);
}

#[test]
fn test_exit_code_10_no_sections() {
    let dir = section_dir(&[("notes.txt", "not markdown")]);

    let output = run(&["consolidate", dir.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(10));
}

#[test]
fn test_exit_code_11_invalid_config() {
    let dir = section_dir(&[("01_a.md", "Alpha.\n"), ("config.json", "{\"workers\": \"many\"}")]);
    let config = dir.path().join("config.json");

    let output = run(&[
        "validate",
        dir.path().to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(11));
}

#[test]
fn test_exit_code_11_zero_workers() {
    let dir = section_dir(&[("01_a.md", "Alpha.\n")]);

    let output = run(&["validate", dir.path().to_str().unwrap(), "--workers", "0", "--offline"]);

    assert_eq!(output.status.code(), Some(11));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("workers"), "{}", stderr);
}

#[test]
fn test_exit_code_15_output_dir_missing() {
    let dir = section_dir(&[("01_a.md", "Alpha.\n")]);

    let output = run(&[
        "consolidate",
        dir.path().to_str().unwrap(),
        "-o",
        "/nonexistent/dir/out.md",
    ]);

    assert_eq!(output.status.code(), Some(15));
}

#[test]
fn test_invalid_utf8_section_skipped() {
    // Given: One readable section and one with invalid bytes
    let dir = section_dir(&[("01_a.md", "Alpha.\n")]);
    fs::write(dir.path().join("02_bad.md"), [0x66, 0x6f, 0xff, 0xfe]).unwrap();

    // When: We consolidate
    let output = run(&["consolidate", dir.path().to_str().unwrap()]);

    // Then: The bad section is reported and the rest still processed
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("skipped"), "{}", stderr);
    assert!(stderr.contains("invalid UTF-8"), "{}", stderr);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Alpha.\n");
}
