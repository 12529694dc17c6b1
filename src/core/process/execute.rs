use std::{
    borrow::Cow,
    io::{self, Read, Write},
    num::NonZeroUsize,
    os::unix::process::ExitStatusExt,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{sys::signal::Signal, unistd::geteuid};
use rand::Rng;

use super::{mask::mask_password, options::ExecuteOptions};
use crate::error::{Error, ProcessExecutionError, Result};

/// Log at a level chosen at runtime.
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level: ::tracing::Level = $level;
        if level == ::tracing::Level::ERROR {
            ::tracing::error!($($arg)+);
        } else if level == ::tracing::Level::WARN {
            ::tracing::warn!($($arg)+);
        } else if level == ::tracing::Level::INFO {
            ::tracing::info!($($arg)+);
        } else if level == ::tracing::Level::DEBUG {
            ::tracing::debug!($($arg)+);
        } else {
            ::tracing::trace!($($arg)+);
        }
    }};
}

/// Shell used when `shell` is set.
const SHELL: &str = "/bin/sh";

/// Retry backoff bounds, in hundredths of a second.
const RETRY_DELAY_CENTIS: std::ops::RangeInclusive<u64> = 20..=200;

/// Captured stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stream {
    Text(String),
    Binary(Vec<u8>),
}

impl Stream {
    pub(crate) fn new(bytes: Vec<u8>, binary: bool) -> Self {
        if binary {
            Self::Binary(bytes)
        } else {
            Self::Text(decode(bytes))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Text view; binary content is decoded lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Binary(b) => decode(b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Output of a command whose exit code was accepted. Not masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Stream,
    pub stderr: Stream,
    /// Exit code, negative signal number if killed, `None` if unknown.
    pub exit_code: Option<i32>,
}

/// Run an external command, retrying failed attempts.
///
/// A failed attempt is a spawn/wait error or an exit code rejected by
/// `check_exit_code`. Output attached to errors and logs is masked; the
/// returned output is not.
///
/// # Errors
/// - [`Error::InvalidArgument`] / [`Error::NoRootHelper`] before anything runs.
/// - [`Error::Execution`] or [`Error::Spawn`] from the last attempt.
pub fn execute<S: AsRef<str>>(cmd: &[S], options: &ExecuteOptions) -> Result<ExecutionResult> {
    options.validate()?;
    let cmd: Vec<String> = cmd.iter().map(|c| c.as_ref().to_string()).collect();
    if cmd.is_empty() {
        return Err(Error::InvalidArgument("no command given".to_string()));
    }
    let cmd = resolve_command(cmd, options, geteuid().is_root())?;
    let sanitized = mask_password(&cmd.join(" "));

    let mut attempts = options.attempts;
    loop {
        attempts -= 1;

        let err = match run_once(&cmd, &sanitized, options) {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        if options.log_errors.should_log(attempts == 0) {
            log_failure(options, &sanitized, &err);
        }
        if attempts == 0 {
            log_at!(options.loglevel, "{:?} failed. Not Retrying.", sanitized);
            return Err(err);
        }
        log_at!(options.loglevel, "{:?} failed. Retrying.", sanitized);
        if options.delay_on_retry {
            thread::sleep(retry_delay());
        }
    }
}

/// Run `cmd` and return `(stdout, stderr)` as text, turning an execution
/// failure into `("", <error text>)`.
///
/// With `discard_warnings`, stderr of a successful command is cleared.
///
/// # Errors
/// Everything except [`Error::Execution`] is still returned as an error.
pub fn trycmd<S: AsRef<str>>(
    cmd: &[S],
    options: &ExecuteOptions,
    discard_warnings: bool,
) -> Result<(String, String)> {
    match execute(cmd, options) {
        Ok(result) => {
            let out = result.stdout.into_string();
            let mut err = result.stderr.into_string();
            if discard_warnings {
                err.clear();
            }
            Ok((out, err))
        }
        Err(Error::Execution(e)) => Ok((String::new(), e.to_string())),
        Err(e) => Err(e),
    }
}

/// Number of available CPUs, or 1 if it cannot be determined.
pub fn get_worker_count() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Apply root escalation to `cmd`. `privileged` is whether we already run as root.
pub(crate) fn resolve_command(
    mut cmd: Vec<String>,
    options: &ExecuteOptions,
    privileged: bool,
) -> Result<Vec<String>> {
    if !options.run_as_root || privileged {
        return Ok(cmd);
    }
    if options.root_helper.trim().is_empty() {
        return Err(Error::NoRootHelper);
    }

    if options.shell {
        // The helper shares the shell invocation.
        if let Some(first) = cmd.first_mut() {
            *first = format!("{} {first}", options.root_helper);
        }
        return Ok(cmd);
    }

    let mut argv = shell_words::split(&options.root_helper).map_err(|e| {
        Error::InvalidArgument(format!(
            "failed to parse root_helper {:?}: {e}",
            options.root_helper
        ))
    })?;
    argv.append(&mut cmd);
    Ok(argv)
}

fn run_once(cmd: &[String], sanitized: &str, options: &ExecuteOptions) -> Result<ExecutionResult> {
    let spawn_err = |source: io::Error| Error::Spawn {
        cmd: sanitized.to_string(),
        source,
    };

    log_at!(options.loglevel, "Running cmd (subprocess): {}", sanitized);
    let started = Instant::now();

    let mut child = build_command(cmd, options)?.spawn().map_err(spawn_err)?;
    if let Some(on_execute) = &options.on_execute {
        on_execute(&child);
    }

    let (stdout, stderr, status) =
        communicate(&mut child, options.process_input.as_deref()).map_err(spawn_err)?;
    let exit_code = exit_code(status);
    log_at!(
        options.loglevel,
        "CMD \"{}\" returned: {} in {:.3}s",
        sanitized,
        describe_exit(status),
        started.elapsed().as_secs_f64()
    );

    if let Some(on_completion) = &options.on_completion {
        on_completion(&child);
    }

    if !options.check_exit_code.accepts(exit_code) {
        return Err(ProcessExecutionError {
            exit_code,
            stdout: mask_password(&decode(stdout)),
            stderr: mask_password(&decode(stderr)),
            cmd: sanitized.to_string(),
            description: None,
        }
        .into());
    }

    Ok(ExecutionResult {
        stdout: Stream::new(stdout, options.binary),
        stderr: Stream::new(stderr, options.binary),
        exit_code,
    })
}

fn build_command(cmd: &[String], options: &ExecuteOptions) -> Result<Command> {
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| Error::InvalidArgument("no command given".to_string()))?;

    let mut command = if options.shell {
        let mut c = Command::new(SHELL);
        c.arg("-c").arg(program).args(args);
        c
    } else {
        let mut c = Command::new(program);
        c.args(args);
        c
    };

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &options.cwd {
        command.current_dir(cwd);
    }
    if let Some(env) = &options.env_variables {
        command.env_clear().envs(env);
    }
    Ok(command)
}

/// Write `input` to the child while draining stdout and stderr, then wait.
fn communicate(child: &mut Child, input: Option<&[u8]>) -> io::Result<(Vec<u8>, Vec<u8>, ExitStatus)> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|s| {
        let out = s.spawn(move || read_all(stdout));
        let err = s.spawn(move || read_all(stderr));

        let written = stdin.map_or(Ok(()), |mut pipe| match input {
            // A child that exits without reading its input is not an error.
            Some(bytes) => match pipe.write_all(bytes) {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            },
            None => Ok(()),
        });

        let status = child.wait();
        let out = out
            .join()
            .map_err(|_| io::Error::other("stdout reader panicked"))??;
        let err = err
            .join()
            .map_err(|_| io::Error::other("stderr reader panicked"))??;
        written?;
        Ok((out, err, status?))
    })
}

fn read_all(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|sig| -sig))
}

fn describe_exit(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => code.to_string(),
        (None, Some(sig)) => Signal::try_from(sig)
            .map_or_else(|_| format!("signal {sig}"), |s| s.as_str().to_string()),
        (None, None) => "unknown".to_string(),
    }
}

pub(crate) fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn retry_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(RETRY_DELAY_CENTIS) * 10)
}

fn log_failure(options: &ExecuteOptions, sanitized: &str, err: &Error) {
    match err {
        Error::Execution(e) => log_at!(
            options.loglevel,
            "{:?}\ncommand: {:?}\nexit code: {:?}\nstdout: {:?}\nstderr: {:?}",
            e.description(),
            e.cmd,
            e.exit_code,
            e.stdout,
            e.stderr
        ),
        Error::Spawn { source, .. } => log_at!(
            options.loglevel,
            "Got an OSError\ncommand: {:?}\nerrno: {:?}",
            sanitized,
            source.raw_os_error()
        ),
        other => log_at!(options.loglevel, "{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn root_helper_is_tokenized_without_shell() {
        let opts = ExecuteOptions::new().run_as_root("sudo -n 'root wrap'");
        let cmd = resolve_command(argv(&["ls", "/root"]), &opts, false).expect("resolve");
        assert_eq!(cmd, argv(&["sudo", "-n", "root wrap", "ls", "/root"]));
    }

    #[test]
    fn root_helper_is_spliced_into_shell_command() {
        let opts = ExecuteOptions::new().run_as_root("sudo").shell(true);
        let cmd = resolve_command(argv(&["ls /root", "x"]), &opts, false).expect("resolve");
        assert_eq!(cmd, argv(&["sudo ls /root", "x"]));
    }

    #[test]
    fn missing_root_helper_is_an_error() {
        let opts = ExecuteOptions::new().run_as_root("");
        let err = resolve_command(argv(&["ls"]), &opts, false).unwrap_err();
        assert!(matches!(err, Error::NoRootHelper));
    }

    #[test]
    fn privileged_callers_skip_the_helper() {
        let opts = ExecuteOptions::new().run_as_root("");
        let cmd = resolve_command(argv(&["ls"]), &opts, true).expect("resolve");
        assert_eq!(cmd, argv(&["ls"]));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = execute::<&str>(&[], &ExecuteOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn stdin_is_passed_through() {
        let opts = ExecuteOptions::new().process_input("hello\n");
        let result = execute(&["cat"], &opts).expect("cat");
        assert_eq!(result.stdout.to_text(), "hello\n");
    }

    #[test]
    fn binary_mode_keeps_raw_bytes() {
        let opts = ExecuteOptions::new().binary(true).process_input(vec![0xff, 0x00, 0x41]);
        let result = execute(&["cat"], &opts).expect("cat");
        assert_eq!(result.stdout, Stream::Binary(vec![0xff, 0x00, 0x41]));
    }

    #[test]
    fn text_mode_replaces_invalid_utf8() {
        let opts = ExecuteOptions::new().process_input(vec![0x41, 0xff]);
        let result = execute(&["cat"], &opts).expect("cat");
        assert_eq!(result.stdout, Stream::Text("A\u{fffd}".to_string()));
    }

    #[test]
    fn signal_exit_is_negative() {
        let opts = ExecuteOptions::new().shell(true).check_exit_code(false);
        let result = execute(&["kill -9 $$"], &opts).expect("kill");
        assert_eq!(result.exit_code, Some(-9));
    }

    #[test]
    fn worker_count_is_positive() {
        assert!(get_worker_count() >= 1);
    }
}
