//! Writes the turnstile OpenAPI document for client generation.
//!
//! ```bash
//! cargo run --bin gen-openapi -p turnstile-server            # <workspace>/openapi.json
//! cargo run --bin gen-openapi -p turnstile-server -- out.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let output = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => default_output()?,
    };

    let json = turnstile_server::api::get_openapi_json()?;
    std::fs::write(&output, &json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let doc: serde_json::Value = serde_json::from_str(&json)?;
    let operations: usize = doc["paths"]
        .as_object()
        .map_or(0, |paths| {
            paths
                .values()
                .filter_map(serde_json::Value::as_object)
                .map(serde_json::Map::len)
                .sum()
        });
    let schemas = doc["components"]["schemas"]
        .as_object()
        .map_or(0, serde_json::Map::len);

    println!(
        "Wrote {} ({operations} operations, {schemas} schemas)",
        output.display()
    );
    Ok(())
}

fn default_output() -> anyhow::Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(|root| root.join("openapi.json"))
        .context("Could not locate the workspace root")
}
