// Path: crates/node/src/commands/hash.rs
use anyhow::{Context, Result};
use artifex_lang::LANG_TAG;
use artifex_phash::ProteinHasher;
use std::path::Path;

pub fn run(source_path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(source_path)
        .with_context(|| format!("reading {}", source_path.display()))?;
    let hash = ProteinHasher::default().hash(&text, LANG_TAG)?;
    println!("{}", serde_json::to_string_pretty(&hash)?);
    Ok(())
}
