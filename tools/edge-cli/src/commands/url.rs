//! Fragment path commands.

use anyhow::{Context as _, Result};
use serde_json::json;

use super::{DecodeArgs, EncodeArgs};
use crate::context::Context;

/// Run the encode command.
pub fn encode(args: EncodeArgs, ctx: &Context) -> Result<()> {
    let location = args.fragment.location()?;
    let path = ctx
        .codec()
        .encode(
            &args.fragment.component,
            &location,
            args.fragment.vary(),
            args.fragment.page.as_deref(),
        )
        .context("Failed to encode fragment path")?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "path": path }));
    } else {
        ctx.output.plain(&path);
    }
    Ok(())
}

/// Run the decode command.
pub fn decode(args: DecodeArgs, ctx: &Context) -> Result<()> {
    let request = ctx
        .codec()
        .decode(&args.path)
        .with_context(|| format!("Not a fragment path: {}", args.path))?;
    let page = request.page_path()?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "component": request.component_key,
            "location": request.location,
            "page": page,
            "scope": request.cache_scope,
        }));
        return Ok(());
    }

    ctx.output.header("Fragment");
    ctx.output.kv("component", &request.component_key);
    ctx.output.kv("theme", &request.location.theme);
    ctx.output.kv("region", &request.location.region);
    ctx.output.kv("module", &request.location.module);
    ctx.output.kv("delta", &request.location.delta);
    ctx.output.kv("page", page.as_deref().unwrap_or("-"));
    ctx.output.kv(
        "scope",
        &request
            .cache_scope
            .map_or_else(|| "global".to_string(), |scope| scope.to_string()),
    );
    Ok(())
}
