//! oa-bulkfix -- standalone MCP server for bulk document fixes.
//!
//! Usage: oa-bulkfix --workspace <path>
//!
//! With the `http` feature and `OA_BULKFIX_API_KEY` set, directives without
//! an exact hit fall back to the semantic ranking backend.

use anyhow::Context;
use oa_bulkfix::engine::Engine;
use oa_bulkfix::server::McpServerConfig;

fn main() -> anyhow::Result<()> {
    // stdout carries JSON-RPC; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let workspace = std::env::args()
        .skip_while(|a| a != "--workspace")
        .nth(1)
        .unwrap_or_else(|| ".".to_owned());
    let workspace = std::path::Path::new(&workspace)
        .canonicalize()
        .with_context(|| format!("workspace {workspace} not found"))?;

    oa_bulkfix::run_mcp_server(McpServerConfig { workspace }, build_engine()?)
}

#[cfg(feature = "http")]
fn build_engine() -> anyhow::Result<Engine> {
    use oa_bulkfix::config::{RankerConfig, SemanticConfig};
    use oa_bulkfix::semantic::SemanticMatcher;
    use oa_bulkfix::semantic::http::HttpRanker;

    let Some(config) = RankerConfig::from_env() else {
        tracing::info!("OA_BULKFIX_API_KEY not set, semantic fallback disabled");
        return Ok(Engine::new());
    };
    tracing::info!(url = config.url, model = config.model, "semantic fallback enabled");
    let ranker = HttpRanker::new(config).context("failed to build ranking client")?;
    Ok(Engine::new().with_semantic(SemanticMatcher::new(
        Box::new(ranker),
        SemanticConfig::default(),
    )))
}

#[cfg(not(feature = "http"))]
#[allow(clippy::unnecessary_wraps)]
fn build_engine() -> anyhow::Result<Engine> {
    Ok(Engine::new())
}
