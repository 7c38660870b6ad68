// Path: crates/node/src/commands/serve.rs
use anyhow::Result;
use artifex_cache::ArtifactCache;
use artifex_control::{load_node_config, ControlPlane};
use artifex_gateway::http::run_server;
use artifex_gateway::{Gateway, GatewayDeps};
use artifex_index::{IndexNaming, ManifestIndex};
use artifex_resolver::peer::IpfsBlockStore;
use artifex_resolver::Resolver;
use artifex_telemetry::prometheus::PrometheusSink;
use artifex_vm_wasm::WasmExecutor;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_node_config(config_path)?;
    PrometheusSink::install()?;

    let index = Arc::new(ManifestIndex::new());
    let loaded = index.load_dirs(&config.manifest_dirs)?;
    tracing::info!(target: "node", records = loaded, "manifest index ready");

    let cache = Arc::new(ArtifactCache::new(&config.cache_root));
    let network: Option<Arc<dyn artifex_api::ContentNetwork>> =
        match &config.resolver.peer_endpoint {
            Some(endpoint) => Some(Arc::new(IpfsBlockStore::new(
                endpoint.clone(),
                config.resolver.fetch_timeout_ms,
            )?)),
            None => None,
        };
    let resolver = Arc::new(Resolver::new(
        index.clone(),
        cache.clone(),
        network,
        config.resolver.clone(),
    )?);
    let executor = Arc::new(WasmExecutor::new(config.node_name.clone())?);
    let naming = Arc::new(IndexNaming::new(index.clone()));
    let control = Arc::new(ControlPlane::new(config.control.clone()));

    let gateway = Arc::new(Gateway::new(GatewayDeps {
        control,
        index,
        cache,
        resolver,
        executor,
        naming,
        policy: config.policy.clone(),
        trusted_signers: config.trusted_signers.iter().cloned().collect(),
        params: config.gateway.clone(),
        node_name: config.node_name.clone(),
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "node", "shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    run_server(
        gateway,
        config.listen_addr,
        config.gateway.body_limit_kb,
        config.gateway.concurrency,
        shutdown_rx,
    )
    .await
}
