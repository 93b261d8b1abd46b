//! Seed commands.

use anyhow::{Context as _, Result};
use edge_security::Clock;
use serde_json::json;

use super::{SeedArgs, SeedCommand};
use crate::context::Context;
use crate::output::{format_duration, status_badge};

/// Run the seed command.
pub fn run(args: SeedArgs, ctx: &Context) -> Result<()> {
    match args.command {
        SeedCommand::Status => status(ctx),
        SeedCommand::Rotate { if_due } => rotate(if_due, ctx),
    }
}

fn status(ctx: &Context) -> Result<()> {
    let seeds = ctx.seed_store()?;
    let interval = seeds.rotation_interval();
    let now = seeds.clock().now();
    let seed = seeds.peek().context("Failed to read seed")?;

    let (state, age) = match &seed {
        Some(seed) if seed.is_due(now, interval) => ("due", Some(now.saturating_sub(seed.last_changed()))),
        Some(seed) => ("fresh", Some(now.saturating_sub(seed.last_changed()))),
        None => ("missing", None),
    };

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "state": state,
            "last_changed": seed.as_ref().map(|s| s.last_changed()),
            "age_secs": age,
            "rotation_interval": interval,
        }));
        return Ok(());
    }

    ctx.output.header("Context seed");
    ctx.output.kv("state", &status_badge(state));
    if let Some(seed) = &seed {
        ctx.output.kv("last changed", &seed.last_changed().to_string());
    }
    if let Some(age) = age {
        ctx.output.kv("age", &format_duration(age));
    }
    ctx.output.kv("rotation interval", &format_duration(interval));
    if state != "fresh" {
        ctx.output.warn("Run `edge seed rotate` to issue a new seed");
    }
    Ok(())
}

fn rotate(if_due: bool, ctx: &Context) -> Result<()> {
    let seeds = ctx.seed_store()?;

    let rotated = if if_due {
        seeds.rotate_if_due().context("Failed to rotate seed")?
    } else {
        seeds.rotate_seed().context("Failed to rotate seed")?;
        true
    };
    let current = seeds.get_seed().context("Failed to read seed")?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "rotated": rotated,
            "last_changed": current.last_changed(),
        }));
    } else if rotated {
        ctx.output.success("Seed rotated; previously issued context cookies are now invalid");
    } else {
        ctx.output.info("Seed is not due for rotation");
    }
    Ok(())
}
