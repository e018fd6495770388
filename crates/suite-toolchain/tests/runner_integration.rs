//! Integration tests for stage execution against real subprocesses.

use std::time::Duration;

use suite_toolchain::{parse_tsc_output, ProcessRunner, StageConfig, Toolchain};

/// Test: the stage runs inside its working directory
#[tokio::test]
async fn test_stage_runs_in_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("marker.txt"), "here").expect("write marker");

    let config = StageConfig::custom(
        "ls".to_string(),
        vec!["ls".to_string()],
        30,
    )
    .in_dir(dir.path());

    let result = ProcessRunner::new().execute(&config).await.expect("execute");
    assert!(result.passed());
    assert!(result.stdout.contains("marker.txt"));
}

/// Test: a stage exceeding its bound is reported as a timed-out failure
#[tokio::test]
async fn test_stage_timeout_is_failure() {
    let config = StageConfig::custom(
        "sleepy".to_string(),
        vec!["sleep".to_string(), "5".to_string()],
        1,
    );

    let started = std::time::Instant::now();
    let result = ProcessRunner::execute_stage(&config).await.expect("execute");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(result.timed_out);
    assert!(!result.passed());
    assert!(result.combined_output().contains("timed out after 1 seconds"));
}

/// Test: combined output of a failing stage is parseable
#[tokio::test]
async fn test_failing_stage_output_feeds_parser() {
    let config = StageConfig::custom(
        "fake_tsc".to_string(),
        vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"src/a.ts(3,7): error TS2304: Cannot find name 'foo'.\" >&2; exit 2".to_string(),
        ],
        30,
    );

    let result = ProcessRunner::execute_stage(&config).await.expect("execute");
    assert_eq!(result.exit_code, 2);
    let diags = parse_tsc_output(&result.combined_output());
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].file, "src/a.ts");
    assert_eq!(diags[0].line, 3);
}
