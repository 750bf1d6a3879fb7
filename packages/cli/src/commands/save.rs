use super::workspace::{InputArgs, LocalWorkspace};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use nextbin_workspace::Visibility;
use std::path::Path;

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Save as a secret snippet
    #[arg(long)]
    pub secret: bool,
}

pub async fn save(args: SaveArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let workspace = LocalWorkspace::open(&config, cwd, &args.input.query);
    let visibility = if args.secret {
        Visibility::Secret
    } else {
        Visibility::Public
    };

    workspace.apply(&args.input).await?;
    workspace.handle.save(visibility)?;
    let snapshot = workspace.settle().await;
    workspace.close().await?;
    let snapshot = snapshot?;

    if snapshot.builds == 0 {
        return Err(match snapshot.state.last_error() {
            Some(error) => anyhow!("{}", error),
            None => anyhow!("Snippet was not saved"),
        });
    }
    let id = snapshot
        .snippet_id
        .ok_or_else(|| anyhow!("Snippet was not saved"))?;

    println!(
        "{} Saved {} snippet {}",
        "✓".green(),
        visibility.as_str(),
        id.bold()
    );
    println!("   Open with: --query \"?gist={}\"", id);
    Ok(())
}
