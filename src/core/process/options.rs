use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    path::PathBuf,
    process::Child,
    str::FromStr,
    sync::Arc,
};

use tracing::Level;

use crate::{
    config::parse_bool,
    error::{Error, Result},
};

/// Which exit codes count as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckExitCode {
    /// Every exit code is accepted.
    Any,
    /// Only these codes are accepted.
    Codes(BTreeSet<i32>),
}

impl CheckExitCode {
    /// Whether `code` is accepted. An unknown code is only accepted by `Any`.
    pub fn accepts(&self, code: Option<i32>) -> bool {
        match self {
            Self::Any => true,
            Self::Codes(codes) => code.is_some_and(|c| codes.contains(&c)),
        }
    }
}

impl Default for CheckExitCode {
    fn default() -> Self {
        Self::Codes(BTreeSet::from([0]))
    }
}

impl From<bool> for CheckExitCode {
    fn from(check: bool) -> Self {
        if check { Self::default() } else { Self::Any }
    }
}

impl From<i32> for CheckExitCode {
    fn from(code: i32) -> Self {
        Self::Codes(BTreeSet::from([code]))
    }
}

impl From<&[i32]> for CheckExitCode {
    fn from(codes: &[i32]) -> Self {
        Self::Codes(codes.iter().copied().collect())
    }
}

impl<const N: usize> From<[i32; N]> for CheckExitCode {
    fn from(codes: [i32; N]) -> Self {
        Self::Codes(BTreeSet::from(codes))
    }
}

impl From<Vec<i32>> for CheckExitCode {
    fn from(codes: Vec<i32>) -> Self {
        Self::Codes(codes.into_iter().collect())
    }
}

impl FromStr for CheckExitCode {
    type Err = Error;

    /// `true`, `false`, a code, or a comma-separated list of codes.
    fn from_str(raw: &str) -> Result<Self> {
        if let Some(flag) = parse_bool(raw)
            && !raw.trim().chars().all(|c| c.is_ascii_digit())
        {
            return Ok(flag.into());
        }
        raw.split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Self::from)
            .map_err(|_| Error::InvalidArgument(format!("Got invalid arg check_exit_code: {raw:?}")))
    }
}

/// When failed attempts are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogErrors {
    #[default]
    Never,
    /// Only the attempt that exhausts the retries.
    Final,
    /// Every failed attempt.
    All,
}

impl LogErrors {
    pub const fn should_log(self, last_attempt: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Final => last_attempt,
            Self::All => true,
        }
    }
}

impl FromStr for LogErrors {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "never" => Ok(Self::Never),
            "final" | "2" => Ok(Self::Final),
            "all" | "1" => Ok(Self::All),
            _ => Err(Error::InvalidArgument(format!(
                "Got invalid arg log_errors: {raw:?}"
            ))),
        }
    }
}

/// Hook called with the child process right after spawn or right after exit.
pub type ProcessCallback = Arc<dyn Fn(&Child) + Send + Sync>;

/// Options for [`execute`](super::execute).
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Working directory of the child.
    pub cwd: Option<PathBuf>,
    /// Bytes written to the child's stdin.
    pub process_input: Option<Vec<u8>>,
    /// Replaces the child's entire environment when set.
    pub env_variables: Option<HashMap<String, String>>,
    pub check_exit_code: CheckExitCode,
    /// Sleep a random 0.2-2.0s between attempts.
    pub delay_on_retry: bool,
    /// Total number of attempts, at least one.
    pub attempts: u32,
    pub run_as_root: bool,
    /// Command prefixed to the command line when escalating to root.
    pub root_helper: String,
    /// Run `argv[0]` through `/bin/sh -c`.
    pub shell: bool,
    /// Level for the run/return/retry log lines.
    pub loglevel: Level,
    pub log_errors: LogErrors,
    /// Return raw bytes instead of decoded text.
    pub binary: bool,
    pub on_execute: Option<ProcessCallback>,
    pub on_completion: Option<ProcessCallback>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            process_input: None,
            env_variables: None,
            check_exit_code: CheckExitCode::default(),
            delay_on_retry: true,
            attempts: 1,
            run_as_root: false,
            root_helper: String::new(),
            shell: false,
            loglevel: Level::DEBUG,
            log_errors: LogErrors::Never,
            binary: false,
            on_execute: None,
            on_completion: None,
        }
    }
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("cwd", &self.cwd)
            .field("process_input", &self.process_input.as_ref().map(Vec::len))
            .field("env_variables", &self.env_variables)
            .field("check_exit_code", &self.check_exit_code)
            .field("delay_on_retry", &self.delay_on_retry)
            .field("attempts", &self.attempts)
            .field("run_as_root", &self.run_as_root)
            .field("root_helper", &self.root_helper)
            .field("shell", &self.shell)
            .field("loglevel", &self.loglevel)
            .field("log_errors", &self.log_errors)
            .field("binary", &self.binary)
            .field("on_execute", &self.on_execute.is_some())
            .field("on_completion", &self.on_completion.is_some())
            .finish()
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from textual `key=value` pairs. See [`ExecuteOptions::set`].
    ///
    /// # Errors
    /// Fails on the first unknown key or invalid value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Self::default();
        for (key, value) in pairs {
            out.set(key.as_ref(), value.as_ref())?;
        }
        Ok(out)
    }

    /// Set one option from its textual form.
    ///
    /// # Errors
    /// [`Error::UnknownArgument`] for an unrecognized key,
    /// [`Error::InvalidArgument`] for a value that does not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "cwd" => self.cwd = Some(PathBuf::from(value)),
            "process_input" => self.process_input = Some(value.as_bytes().to_vec()),
            "env_variables" => self.env_variables = Some(parse_env(value)?),
            "check_exit_code" => self.check_exit_code = value.parse()?,
            "delay_on_retry" => self.delay_on_retry = parse_flag(key, value)?,
            "attempts" => {
                self.attempts = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(key, value))?;
            }
            "run_as_root" => self.run_as_root = parse_flag(key, value)?,
            "root_helper" => self.root_helper = value.to_string(),
            "shell" => self.shell = parse_flag(key, value)?,
            "loglevel" => self.loglevel = value.trim().parse().map_err(|_| invalid(key, value))?,
            "log_errors" => self.log_errors = value.parse()?,
            "binary" => self.binary = parse_flag(key, value)?,
            _ => {
                return Err(Error::UnknownArgument(format!(
                    "Got unknown keyword args: {key:?}"
                )));
            }
        }
        Ok(())
    }

    /// Check option combinations that cannot be rejected at `set` time.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when `attempts` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::InvalidArgument(
                "Got invalid arg attempts: 0 (must be at least 1)".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn process_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.process_input = Some(input.into());
        self
    }

    #[must_use]
    pub fn env_variables(mut self, env: HashMap<String, String>) -> Self {
        self.env_variables = Some(env);
        self
    }

    #[must_use]
    pub fn check_exit_code(mut self, check: impl Into<CheckExitCode>) -> Self {
        self.check_exit_code = check.into();
        self
    }

    #[must_use]
    pub const fn delay_on_retry(mut self, delay: bool) -> Self {
        self.delay_on_retry = delay;
        self
    }

    #[must_use]
    pub const fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn run_as_root(mut self, root_helper: impl Into<String>) -> Self {
        self.run_as_root = true;
        self.root_helper = root_helper.into();
        self
    }

    #[must_use]
    pub const fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    #[must_use]
    pub const fn loglevel(mut self, level: Level) -> Self {
        self.loglevel = level;
        self
    }

    #[must_use]
    pub const fn log_errors(mut self, policy: LogErrors) -> Self {
        self.log_errors = policy;
        self
    }

    #[must_use]
    pub const fn binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    #[must_use]
    pub fn on_execute(mut self, f: impl Fn(&Child) + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_completion(mut self, f: impl Fn(&Child) + Send + Sync + 'static) -> Self {
        self.on_completion = Some(Arc::new(f));
        self
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidArgument(format!("Got invalid arg {key}: {value:?}"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    parse_bool(value).ok_or_else(|| invalid(key, value))
}

fn parse_env(value: &str) -> Result<HashMap<String, String>> {
    value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| invalid("env_variables", value))
        })
        .collect()
}
