use super::workspace::LocalWorkspace;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

#[derive(Debug, Args)]
pub struct ResetArgs {}

pub async fn reset(_args: ResetArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let workspace = LocalWorkspace::open(&config, cwd, "");

    workspace.handle.reset()?;
    workspace.handle.snapshot().await?;
    workspace.close().await?;

    println!("{} Session cleared", "✓".green());
    Ok(())
}
