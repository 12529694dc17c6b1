use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use lockutils::{Error, ExecuteOptions, LogErrors, execute, trycmd};
use tempfile::tempdir;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with every log record written to a buffer, and return the text.
fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer.contents())
}

fn failure_blocks(logs: &str) -> usize {
    logs.matches("exit code: Some(").count()
}

#[test]
fn retries_exactly_the_requested_number_of_attempts() {
    let spawns = Arc::new(AtomicUsize::new(0));
    let completions = Arc::new(AtomicUsize::new(0));
    let spawned = Arc::clone(&spawns);
    let completed = Arc::clone(&completions);
    let opts = ExecuteOptions::new()
        .attempts(3)
        .delay_on_retry(false)
        .on_execute(move |_| {
            spawned.fetch_add(1, Ordering::SeqCst);
        })
        .on_completion(move |_| {
            completed.fetch_add(1, Ordering::SeqCst);
        });

    match execute(&["false"], &opts) {
        Err(Error::Execution(e)) => assert_eq!(e.exit_code, Some(1)),
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_eq!(spawns.load(Ordering::SeqCst), 3);
    assert_eq!(completions.load(Ordering::SeqCst), 3);
}

#[test]
fn completion_callback_sees_the_exited_child() {
    let exited = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&exited);
    let opts = ExecuteOptions::new().on_completion(move |child| {
        *seen.lock().unwrap() = Some(child.id());
    });

    execute(&["true"], &opts).expect("true");
    assert!(exited.lock().unwrap().is_some());
}

#[test]
fn failure_logs_mask_secrets() {
    let cmd = ["sh", "-c", "echo password=hunter2; exit 3"];
    let opts = ExecuteOptions::new()
        .log_errors(LogErrors::All)
        .loglevel(Level::INFO);

    let (result, logs) = capture_logs(|| execute(&cmd, &opts));

    assert!(matches!(result, Err(Error::Execution(_))));
    assert!(logs.contains("password=***"), "{logs}");
    assert!(!logs.contains("hunter2"), "{logs}");
}

#[test]
fn final_policy_logs_only_the_last_failure() {
    let opts = ExecuteOptions::new()
        .attempts(3)
        .delay_on_retry(false)
        .log_errors(LogErrors::Final);

    let (result, logs) = capture_logs(|| execute(&["false"], &opts));

    assert!(result.is_err());
    assert_eq!(failure_blocks(&logs), 1, "{logs}");
    assert_eq!(logs.matches("failed. Retrying.").count(), 2, "{logs}");
    assert_eq!(logs.matches("failed. Not Retrying.").count(), 1, "{logs}");
}

#[test]
fn all_policy_logs_every_failure() {
    let opts = ExecuteOptions::new()
        .attempts(3)
        .delay_on_retry(false)
        .log_errors(LogErrors::All);

    let (result, logs) = capture_logs(|| execute(&["false"], &opts));

    assert!(result.is_err());
    assert_eq!(failure_blocks(&logs), 3, "{logs}");
}

#[test]
fn never_policy_logs_no_failure_block() {
    let opts = ExecuteOptions::new().attempts(2).delay_on_retry(false);

    let (result, logs) = capture_logs(|| execute(&["false"], &opts));

    assert!(result.is_err());
    assert_eq!(failure_blocks(&logs), 0, "{logs}");
}

#[test]
fn success_stops_retrying() {
    let spawns = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&spawns);
    let opts = ExecuteOptions::new()
        .attempts(5)
        .delay_on_retry(false)
        .on_execute(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    execute(&["true"], &opts).expect("true succeeds");
    assert_eq!(spawns.load(Ordering::SeqCst), 1);
}

#[test]
fn exit_code_must_be_in_accepted_set() {
    let strict = ExecuteOptions::new().check_exit_code([1, 2]);
    assert!(matches!(
        execute(&["true"], &strict),
        Err(Error::Execution(_))
    ));

    let result = execute(&["true"], &ExecuteOptions::new()).expect("true");
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert_eq!(result.exit_code, Some(0));
}

#[test]
fn unchecked_exit_code_is_returned() {
    let opts = ExecuteOptions::new().check_exit_code(false);
    let result = execute(&["sh", "-c", "exit 7"], &opts).expect("unchecked");
    assert_eq!(result.exit_code, Some(7));
}

#[test]
fn trycmd_keeps_or_discards_warnings() {
    let cmd = ["sh", "-c", "echo out; echo err >&2"];
    let opts = ExecuteOptions::new();

    let (out, err) = trycmd(&cmd, &opts, false).expect("trycmd");
    assert_eq!(out, "out\n");
    assert_eq!(err, "err\n");

    let (out, err) = trycmd(&cmd, &opts, true).expect("trycmd");
    assert_eq!(out, "out\n");
    assert_eq!(err, "");
}

#[test]
fn trycmd_reports_failure_as_text() {
    let (out, err) = trycmd(&["false"], &ExecuteOptions::new(), true).expect("trycmd");
    assert_eq!(out, "");
    assert!(err.contains("Exit code: 1"), "{err}");
}

#[test]
fn secrets_are_masked_only_in_errors() {
    let ok = execute(&["echo", "password=hunter2"], &ExecuteOptions::new()).expect("echo");
    assert_eq!(ok.stdout.to_text(), "password=hunter2\n");

    let failing = ["sh", "-c", "echo password=hunter2; exit 3"];
    match execute(&failing, &ExecuteOptions::new()) {
        Err(Error::Execution(e)) => {
            assert_eq!(e.exit_code, Some(3));
            assert!(e.stdout.contains("password=***"), "{}", e.stdout);
            assert!(!e.to_string().contains("hunter2"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[test]
fn env_variables_replace_the_environment() {
    let env = HashMap::from([("GREETING".to_string(), "hello".to_string())]);
    let opts = ExecuteOptions::new().shell(true).env_variables(env);

    let result = execute(&["echo \"$GREETING:${HOME:-unset}\""], &opts).expect("shell");
    assert_eq!(result.stdout.to_text(), "hello:unset\n");
}

#[test]
fn runs_in_requested_directory() {
    let td = tempdir().unwrap();
    std::fs::write(td.path().join("marker.txt"), "x").unwrap();
    let opts = ExecuteOptions::new().cwd(td.path());

    let result = execute(&["ls"], &opts).expect("ls");
    assert!(result.stdout.to_text().contains("marker.txt"));
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let opts = ExecuteOptions::new().delay_on_retry(false);
    assert!(matches!(
        execute(&["/nonexistent/lockutils-test-binary"], &opts),
        Err(Error::Spawn { .. })
    ));
}

#[test]
fn zero_attempts_is_rejected() {
    let opts = ExecuteOptions::new().attempts(0);
    assert!(matches!(
        execute(&["true"], &opts),
        Err(Error::InvalidArgument(_))
    ));
}
