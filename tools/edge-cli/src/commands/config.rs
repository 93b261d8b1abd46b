//! Configuration management commands.

use anyhow::{bail, Context as _, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig};
use crate::context::Context;

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Init { force } => init_config(force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    let esi = &ctx.config.esi;
    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    ctx.output.info("");
    ctx.output.kv("render_mode", &esi.render_mode);
    ctx.output.kv("default_ttl", &esi.default_ttl.to_string());
    ctx.output.kv("url_prefix", &esi.url_prefix);
    ctx.output.kv("ajax_fallback", &esi.ajax_fallback.to_string());
    ctx.output.kv(
        "ajax_fallback_contextualize",
        &esi.ajax_fallback_contextualize.to_string(),
    );
    ctx.output.kv("absolute_urls", &esi.absolute_urls.to_string());
    if let Some(base) = &esi.base_url {
        ctx.output.kv("base_url", base);
    }
    ctx.output.kv(
        "seed_rotation_interval",
        &esi.seed_rotation_interval.to_string(),
    );

    ctx.output.info("");
    ctx.output.info("[cookie]");
    ctx.output.kv("prefix", &esi.cookie.prefix);
    ctx.output.kv("hardening", &esi.cookie.hardening.to_string());
    ctx.output.kv("path", &esi.cookie.path);
    if let Some(domain) = &esi.cookie.domain {
        ctx.output.kv("domain", domain);
    }
    ctx.output.kv("secure", &esi.cookie.secure.to_string());
    ctx.output.kv("http_only", &esi.cookie.http_only.to_string());
    ctx.output.kv("lifetime", &esi.cookie.lifetime.to_string());

    ctx.output.info("");
    ctx.output.info("[state]");
    ctx.output
        .kv("seed_file", &ctx.config.state.seed_file.display().to_string());

    Ok(())
}

fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let path = ctx.cwd.join("edge.toml");
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(&path, generate_default_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    ctx.output.success(&format!("Created {}", path.display()));
    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    let Some(path) = &ctx.config_path else {
        bail!("No config file found (looked for edge.toml, .edge.toml, edge.json)");
    };

    // Context::load already validated; reload so errors carry the file name.
    let config = CliConfig::load(path)?;
    let modes = ["esi", "ssi", "ssi_remote"];
    if !modes.contains(&config.esi.render_mode.as_str()) {
        ctx.output.warn(&format!(
            "render_mode {:?} is not built in; tags render empty unless an extension registers it",
            config.esi.render_mode
        ));
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "valid": true, "file": path }));
    } else {
        ctx.output.success(&format!("{} is valid", path.display()));
        for mode in modes {
            ctx.output.list_item(&format!("render mode available: {}", mode));
        }
    }
    Ok(())
}
