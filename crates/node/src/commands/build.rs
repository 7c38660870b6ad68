// Path: crates/node/src/commands/build.rs
use anyhow::{Context, Result};
use artifex_builder::{append_manifest, build, describe_source, BuildOptions};
use std::path::Path;

pub fn run(
    source_path: &Path,
    out_dir: &Path,
    manifest: &Path,
    compute_structural: bool,
    labels: Vec<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(source_path)
        .with_context(|| format!("reading {}", source_path.display()))?;
    let source = describe_source(&text)?;
    let output = build(
        &source,
        &BuildOptions {
            compute_structural,
            labels,
            out_dir: Some(out_dir.to_path_buf()),
        },
    )?;
    append_manifest(manifest, &output.record)?;

    tracing::info!(
        target: "node",
        name = %output.record.name,
        cid = %output.record.cid,
        manifest = %manifest.display(),
        "artifact built"
    );
    println!("{}", serde_json::to_string_pretty(&output.record)?);
    Ok(())
}
