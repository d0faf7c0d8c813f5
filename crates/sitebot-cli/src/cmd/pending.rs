use crate::cmd::with_engine;
use crate::output::print_json;
use clap::Subcommand;
use sitebot_core::config::Config;

#[derive(Subcommand)]
pub enum PendingSubcommand {
    /// Delete proposals older than the confirmation window
    Purge,
}

pub fn run(config: Config, subcmd: PendingSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PendingSubcommand::Purge => purge(config, json),
    }
}

fn purge(config: Config, json: bool) -> anyhow::Result<()> {
    with_engine(config, |engine| async move {
        let ttl = engine.state.pending_ttl();
        let removed = engine.state.pending()?.purge_expired(ttl).await?;
        if json {
            print_json(&serde_json::json!({ "removed": removed }))
        } else {
            println!("Removed {removed} expired pending action(s).");
            Ok(())
        }
    })
}
