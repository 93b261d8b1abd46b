//! Inclusion tag command.

use anyhow::{bail, Context as _, Result};
use serde_json::json;

use super::TagArgs;
use crate::context::Context;

/// Run the tag command.
pub fn run(args: TagArgs, ctx: &Context) -> Result<()> {
    let tags = ctx.tag_renderer();
    let mode = args.mode.as_deref();

    let html = match &args.url {
        Some(url) => tags.render(url, mode),
        None => {
            let location = args.fragment.location()?;
            tags.embed(
                &args.fragment.component,
                &location,
                args.fragment.vary(),
                args.fragment.page.as_deref(),
                mode,
            )
            .context("Failed to encode fragment path")?
        }
    };

    if html.is_empty() {
        bail!(
            "Unknown render mode: {}",
            mode.unwrap_or(&ctx.config.esi.render_mode)
        );
    }

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "tag": html }));
    } else {
        ctx.output.plain(&html);
    }
    Ok(())
}
