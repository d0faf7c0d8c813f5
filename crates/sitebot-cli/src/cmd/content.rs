use crate::cmd::{with_engine, Engine};
use crate::output::{print_json, print_table};
use anyhow::Context;
use serde_json::Value;
use sitebot_core::action::Action;
use sitebot_core::config::Config;
use sitebot_core::dispatch::ActionResult;

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

pub fn status(config: Config, json: bool) -> anyhow::Result<()> {
    with_engine(config, |engine| async move {
        let status = engine.state.dispatcher()?.status().await?;
        if json {
            return print_json(&status);
        }
        let rows = status["counts"]
            .as_object()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(table, n)| vec![table.clone(), n.to_string()])
                    .collect()
            })
            .unwrap_or_default();
        print_table(&["COLLECTION", "ROWS"], rows);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// exec / undo
// ---------------------------------------------------------------------------

pub fn exec(config: Config, raw: &str, json: bool) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(raw).context("action is not valid JSON")?;
    let action = Action::from_value(value)?;
    with_engine(config, |engine| run(engine, action, json))
}

pub fn undo(config: Config, json: bool) -> anyhow::Result<()> {
    with_engine(config, |engine| run(engine, Action::Undo, json))
}

async fn run(engine: Engine, action: Action, json: bool) -> anyhow::Result<()> {
    let result = engine.state.dispatcher()?.run(&action).await?;
    if action.is_mutation() {
        engine.revalidate().await;
    }
    let result = ActionResult::ok(result);
    if json {
        print_json(&result)
    } else {
        println!("{}", result.message().unwrap_or("Done."));
        Ok(())
    }
}
