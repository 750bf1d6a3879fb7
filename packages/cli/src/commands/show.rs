use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use nextbin_workspace::{DirSnippetStore, RemoteSnippets, SnippetRef};
use std::path::Path;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Snippet id
    pub id: String,

    /// Revision to show (defaults to the latest)
    #[arg(long)]
    pub rev: Option<String>,

    /// Print the raw record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn show(args: ShowArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let store = DirSnippetStore::new(config.snippet_dir(cwd), config.user.clone());

    let record = store
        .fetch(SnippetRef {
            id: args.id,
            revision: args.rev,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!(
        "{} {} @ {}",
        "Snippet".bright_blue().bold(),
        record.id.as_deref().unwrap_or("-"),
        record.revision.as_deref().unwrap_or("-")
    );
    for (label, body) in [
        ("code", &record.code),
        ("markup", &record.markup),
        ("manifest", &record.manifest_json),
    ] {
        println!();
        println!("{}", format!("── {} ──", label).dimmed());
        println!("{}", body);
    }
    Ok(())
}
