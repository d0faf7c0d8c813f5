use sitebot_core::config::Config;
use sitebot_server::AppState;

pub fn run(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let (state, worker) = AppState::from_config(config);
        sitebot_server::serve(state, port).await?;

        if let Some(worker) = worker {
            let report = worker.finish().await;
            tracing::info!(
                committed = report.committed,
                failed = report.failed,
                "snapshot mirror drained"
            );
        }
        Ok(())
    })
}
