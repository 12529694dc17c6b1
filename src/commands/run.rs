use std::{
    io::{self, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};

use super::Command;
use crate::{
    app::context::AppContext,
    core::{
        lock::{LockOptions, NamedLock},
        process::{ExecuteOptions, execute, trycmd},
    },
    error::Error,
};

pub struct RunCommand<'a> {
    pub lock: Option<&'a str>,
    pub external: bool,
    pub prefix: Option<&'a str>,
    pub lock_path: Option<&'a Path>,
    pub options: &'a [String],
    pub trycmd: bool,
    pub discard_warnings: bool,
    pub command: &'a [String],
}

impl RunCommand<'_> {
    fn lock_options(&self, ctx: &AppContext) -> LockOptions {
        let mut options = LockOptions::new()
            .external(self.external)
            .config(ctx.cfg.clone());
        if let Some(prefix) = self.prefix {
            options = options.prefix(prefix);
        }
        if let Some(dir) = self.lock_path {
            options = options.lock_path(dir);
        }
        options
    }
}

impl Command for RunCommand<'_> {
    fn run(&self, ctx: &AppContext) -> Result<i32> {
        let exec_options = parse_options(self.options)?;

        let _guard = match self.lock {
            Some(name) => Some(
                NamedLock::acquire(name, &self.lock_options(ctx))
                    .with_context(|| format!("failed to acquire lock {name:?}"))?,
            ),
            None => None,
        };

        if self.trycmd {
            let (out, err) = trycmd(self.command, &exec_options, self.discard_warnings)?;
            print!("{out}");
            eprint!("{err}");
            return Ok(i32::from(!err.is_empty()));
        }

        match execute(self.command, &exec_options) {
            Ok(result) => {
                io::stdout()
                    .write_all(result.stdout.as_bytes())
                    .context("failed to write stdout")?;
                io::stderr()
                    .write_all(result.stderr.as_bytes())
                    .context("failed to write stderr")?;
                Ok(0)
            }
            Err(Error::Execution(e)) => {
                eprintln!("{e}");
                Ok(match e.exit_code {
                    Some(code) if code > 0 => code,
                    Some(code) if code < 0 => 128 - code,
                    _ => 1,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_options(raw: &[String]) -> Result<ExecuteOptions> {
    let mut pairs = Vec::with_capacity(raw.len());
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("expected KEY=VALUE, got {item:?}");
        };
        pairs.push((key.trim(), value));
    }
    Ok(ExecuteOptions::from_pairs(pairs)?)
}
