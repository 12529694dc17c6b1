use anyhow::Result;

use super::Command;
use crate::{app::context::AppContext, core::process::get_worker_count};

pub struct WorkersCommand;

impl Command for WorkersCommand {
    fn run(&self, _ctx: &AppContext) -> Result<i32> {
        println!("{}", get_worker_count());
        Ok(0)
    }
}
