use super::workspace::{InputArgs, LocalWorkspace};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct BundleArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the bundle here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub async fn bundle(args: BundleArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let workspace = LocalWorkspace::open(&config, cwd, &args.input.query);

    workspace.apply(&args.input).await?;
    workspace.handle.bundle()?;
    let snapshot = workspace.settle().await;
    workspace.close().await?;
    let snapshot = snapshot?;

    // Assembly failures leave no bundle and a visible error
    let Some(bundle) = &snapshot.bundle else {
        return Err(match snapshot.state.last_error() {
            Some(error) => anyhow!("{}", error),
            None => anyhow!("No bundle was produced"),
        });
    };
    let json = serde_json::to_string_pretty(bundle)?;

    match args.out {
        Some(out) => {
            std::fs::write(&out, json)?;
            println!("{} {}", "✓".green(), out.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
