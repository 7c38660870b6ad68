// Path: crates/node/src/commands/resolve.rs
use anyhow::{anyhow, Result};
use artifex_api::naming::NAME_SCHEME;
use artifex_cache::ArtifactCache;
use artifex_cid::ByteCid;
use artifex_control::load_node_config;
use artifex_index::ManifestIndex;
use artifex_resolver::peer::IpfsBlockStore;
use artifex_resolver::{ResolveMode, ResolveOutcome, ResolveTarget, Resolver};
use std::path::Path;
use std::sync::Arc;

pub async fn run(target: &str, config_path: Option<&Path>, dry_run: bool) -> Result<()> {
    let config = load_node_config(config_path)?;

    let index = Arc::new(ManifestIndex::new());
    index.load_dirs(&config.manifest_dirs)?;
    let cache = Arc::new(ArtifactCache::new(&config.cache_root));
    let network: Option<Arc<dyn artifex_api::ContentNetwork>> =
        match &config.resolver.peer_endpoint {
            Some(endpoint) => Some(Arc::new(IpfsBlockStore::new(
                endpoint.clone(),
                config.resolver.fetch_timeout_ms,
            )?)),
            None => None,
        };
    let resolver = Resolver::new(index.clone(), cache, network, config.resolver)?;

    let cid = if let Some(logical) = target.strip_prefix(NAME_SCHEME) {
        let record = index
            .snapshot()
            .find_by_name(logical)
            .ok_or_else(|| anyhow!("unknown logical name {:?}", logical))?;
        ByteCid::parse(&record.cid)?
    } else {
        ByteCid::parse(target)?
    };

    let mode = if dry_run {
        ResolveMode::DryRun
    } else {
        ResolveMode::Full
    };
    match resolver
        .resolve(
            &ResolveTarget {
                cid: Some(cid),
                structural: None,
            },
            mode,
        )
        .await?
    {
        ResolveOutcome::Resolved(resolution) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "cid": resolution.record.cid,
                    "path": resolution.path,
                    "source": resolution.source,
                    "verified": resolution.verified,
                }))?
            );
        }
        ResolveOutcome::Plan(steps) => {
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }
        ResolveOutcome::Candidates(records) => {
            let views: Vec<_> = records.iter().map(|r| r.as_ref()).collect();
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
    }
    Ok(())
}
