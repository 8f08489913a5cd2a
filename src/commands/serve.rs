use std::sync::Arc;

use clap::ArgMatches;
use execgate_runtime::{ExecutionGateway, JsonlFileAuditSink};

use crate::{logging, server};

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut config = super::load_config(matches)?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.api.port = *port;
    }
    if let Some(host) = matches.get_one::<String>("host") {
        config.api.host = host.clone();
    }

    logging::init(&config.logging);

    let mut builder = ExecutionGateway::builder(config);
    if let Some(path) = matches.get_one::<String>("audit-log") {
        tracing::info!("Writing audit entries to {}", path);
        builder = builder.audit_sink(Arc::new(JsonlFileAuditSink::new(path)));
    }
    let gateway = Arc::new(builder.build()?);

    tracing::info!(
        max_cpu = %gateway.config().policy.max_cpu,
        max_memory = %gateway.config().policy.max_memory,
        max_timeout_ms = gateway.config().policy.max_timeout_ms,
        "Starting execgate v{}",
        crate::VERSION
    );

    gateway.sweeper().start().await;

    let result = server::serve(gateway.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await;

    gateway.sweeper().stop().await;
    tracing::info!("Execution gateway stopped");
    result
}
