use crate::cmd::with_engine;
use crate::output::{print_json, print_table};
use sitebot_core::config::Config;
use sitebot_core::revert::revert_commit;

pub fn list(config: Config, path: Option<String>, limit: usize, json: bool) -> anyhow::Result<()> {
    with_engine(config, |engine| async move {
        let commits = engine
            .state
            .repo()?
            .list_commits(path.as_deref(), limit)
            .await?;
        if json {
            return print_json(&commits);
        }
        if commits.is_empty() {
            println!("No commits.");
            return Ok(());
        }
        let rows = commits
            .iter()
            .map(|c| {
                vec![
                    c.sha.chars().take(7).collect(),
                    c.date.clone().unwrap_or_default(),
                    c.author.clone().unwrap_or_default(),
                    c.message.lines().next().unwrap_or_default().to_string(),
                ]
            })
            .collect();
        print_table(&["SHA", "DATE", "AUTHOR", "MESSAGE"], rows);
        Ok(())
    })
}

pub fn revert(config: Config, sha: &str, json: bool) -> anyhow::Result<()> {
    with_engine(config, |engine| async move {
        let report = revert_commit(engine.state.repo()?.as_ref(), sha).await?;
        if json {
            return print_json(&report);
        }
        for (path, commit) in report.reverted.iter().zip(&report.commits) {
            println!("reverted {path} ({})", &commit[..commit.len().min(7)]);
        }
        if report.reverted.is_empty() {
            println!("Nothing to revert.");
        }
        Ok(())
    })
}
