use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::{PredicateBooleanExt, predicate};
use tempfile::tempdir;

#[test]
fn prints_help() {
    let mut cmd = cargo_bin_cmd!("lockutils");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage").or(predicate::str::contains("USAGE")));
}

#[test]
fn workers_prints_a_positive_count() {
    let out = cargo_bin_cmd!("lockutils")
        .arg("workers")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let n: usize = String::from_utf8(out).unwrap().trim().parse().unwrap();
    assert!(n >= 1);
}

#[test]
fn wrap_exports_lock_dir_and_removes_it() {
    let td = tempdir().unwrap();
    let record = td.path().join("seen");
    let script = format!(
        "test -d \"$LOCKUTILS_LOCK_PATH\" && echo \"$LOCKUTILS_LOCK_PATH\" > {}",
        record.display()
    );

    cargo_bin_cmd!("lockutils")
        .env_remove("LOCKUTILS_LOCK_PATH")
        .args(["wrap", "--", "sh", "-c", &script])
        .assert()
        .success();

    let seen = std::fs::read_to_string(&record).unwrap();
    let dir = std::path::PathBuf::from(seen.trim());
    assert!(!dir.as_os_str().is_empty());
    assert!(!dir.exists(), "lock dir should be removed after the child exits");
}

#[test]
fn wrap_propagates_exit_code() {
    cargo_bin_cmd!("lockutils")
        .args(["wrap", "--", "sh", "-c", "exit 5"])
        .assert()
        .code(5);
}

#[test]
fn run_prints_output_of_successful_command() {
    cargo_bin_cmd!("lockutils")
        .args(["run", "--", "echo", "hello"])
        .assert()
        .success()
        .stdout("hello\n");
}

#[test]
fn run_reports_failure_and_exit_code() {
    cargo_bin_cmd!("lockutils")
        .args(["run", "-o", "attempts=2", "-o", "delay_on_retry=false", "--"])
        .args(["sh", "-c", "exit 4"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Exit code: 4"));
}

#[test]
fn run_rejects_unknown_options() {
    cargo_bin_cmd!("lockutils")
        .args(["run", "-o", "retries=3", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown keyword"));
}

#[test]
fn run_with_external_lock_creates_lock_file() {
    let td = tempdir().unwrap();
    cargo_bin_cmd!("lockutils")
        .env_remove("LOCKUTILS_DISABLE_PROCESS_LOCKING")
        .args(["run", "--lock", "job", "--external", "--prefix", "app"])
        .arg("--lock-path")
        .arg(td.path())
        .args(["--", "true"])
        .assert()
        .success();

    assert!(td.path().join("app-job").exists());
}

#[test]
fn run_with_external_lock_needs_a_directory() {
    cargo_bin_cmd!("lockutils")
        .env_remove("LOCKUTILS_LOCK_PATH")
        .env_remove("LOCKUTILS_DISABLE_PROCESS_LOCKING")
        .args(["run", "--lock", "job", "--external", "--", "true"])
        .assert()
        .failure();
}

#[test]
fn run_lock_path_requires_a_lock() {
    let td = tempdir().unwrap();
    cargo_bin_cmd!("lockutils")
        .arg("run")
        .arg("--lock-path")
        .arg(td.path())
        .args(["--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--lock"));
}

#[test]
fn trycmd_discards_warnings() {
    cargo_bin_cmd!("lockutils")
        .args(["run", "--trycmd", "--discard-warnings", "--"])
        .args(["sh", "-c", "echo out; echo warn >&2"])
        .assert()
        .success()
        .stdout("out\n")
        .stderr(predicate::str::contains("warn").not());
}

#[test]
fn remove_lock_deletes_the_file() {
    let td = tempdir().unwrap();
    let file = td.path().join("app-job");
    std::fs::write(&file, "").unwrap();

    cargo_bin_cmd!("lockutils")
        .args(["remove-lock", "job", "--prefix", "app"])
        .arg("--lock-path")
        .arg(td.path())
        .assert()
        .success();

    assert!(!file.exists());
}
