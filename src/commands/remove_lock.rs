use std::path::Path;

use anyhow::Result;

use super::Command;
use crate::{
    app::context::AppContext,
    core::lock::{LockOptions, remove_external_lock_file},
};

pub struct RemoveLockCommand<'a> {
    pub name: &'a str,
    pub prefix: Option<&'a str>,
    pub lock_path: Option<&'a Path>,
}

impl Command for RemoveLockCommand<'_> {
    fn run(&self, ctx: &AppContext) -> Result<i32> {
        let mut options = LockOptions::new().config(ctx.cfg.clone());
        if let Some(prefix) = self.prefix {
            options = options.prefix(prefix);
        }
        if let Some(dir) = self.lock_path {
            options = options.lock_path(dir);
        }

        remove_external_lock_file(self.name, &options)?;
        Ok(0)
    }
}
