//! CLI command implementations.

pub mod config;
pub mod cookies;
pub mod seed;
pub mod tag;
pub mod url;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use edge_cache::{BlockLocation, VaryFlags};
use edge_core::Principal;

/// Personalization scope of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Role,
    User,
}

/// Arguments naming one fragment.
#[derive(Args)]
pub struct FragmentArgs {
    /// Component key.
    #[arg(default_value = "block")]
    pub component: String,

    /// Location as theme:region:module:delta.
    #[arg(short, long, required = true)]
    pub location: Option<String>,

    /// Originating page path; embedded when the fragment varies per page.
    #[arg(short, long)]
    pub page: Option<String>,

    /// Personalization scope.
    #[arg(short, long, value_enum)]
    pub scope: Option<ScopeArg>,
}

impl FragmentArgs {
    pub fn location(&self) -> Result<BlockLocation> {
        // Only absent when a conflicting argument such as `tag --url` was given.
        let location = self
            .location
            .as_deref()
            .context("no fragment location given")?;
        let parts: Vec<&str> = location.split(':').collect();
        match parts.as_slice() {
            [theme, region, module, delta] => Ok(BlockLocation::new(*theme, *region, *module, *delta)),
            _ => bail!(
                "Location must be theme:region:module:delta, got {:?}",
                location
            ),
        }
    }

    pub fn vary(&self) -> VaryFlags {
        let flags = match self.scope {
            Some(ScopeArg::Role) => VaryFlags::per_role(),
            Some(ScopeArg::User) => VaryFlags::per_user(),
            None => VaryFlags::global(),
        };
        if self.page.is_some() {
            flags.with_page()
        } else {
            flags
        }
    }
}

/// Arguments for the encode command.
#[derive(Args)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub fragment: FragmentArgs,
}

/// Arguments for the decode command.
#[derive(Args)]
pub struct DecodeArgs {
    /// Fragment path or URL path.
    pub path: String,
}

/// Arguments for the tag command.
#[derive(Args)]
pub struct TagArgs {
    #[command(flatten)]
    pub fragment: FragmentArgs,

    /// Render mode (default from config).
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Render an already encoded URL instead of a fragment.
    #[arg(long, conflicts_with = "location")]
    pub url: Option<String>,
}

/// Arguments for the seed command.
#[derive(Args)]
pub struct SeedArgs {
    #[command(subcommand)]
    pub command: SeedCommand,
}

#[derive(Subcommand)]
pub enum SeedCommand {
    /// Show seed age and rotation state.
    Status,
    /// Rotate the seed.
    Rotate {
        /// Rotate only when the interval has elapsed.
        #[arg(long)]
        if_due: bool,
    },
}

/// Arguments naming a principal.
#[derive(Args)]
pub struct PrincipalArgs {
    /// Session identifier.
    #[arg(long)]
    pub session: String,

    /// User identifier; omit for an anonymous principal.
    #[arg(long)]
    pub user: Option<String>,

    /// Role identifiers (repeatable).
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

impl PrincipalArgs {
    pub fn principal(&self) -> Principal {
        match &self.user {
            Some(user) => Principal::authenticated(user, &self.session, &self.roles),
            None => Principal::anonymous(&self.session),
        }
    }
}

/// Arguments for the cookies command.
#[derive(Args)]
pub struct CookiesArgs {
    #[command(subcommand)]
    pub command: CookiesCommand,
}

#[derive(Subcommand)]
pub enum CookiesCommand {
    /// Print the Set-Cookie headers issued after login.
    Issue(PrincipalArgs),
    /// Print the Set-Cookie headers clearing every context cookie.
    Revoke(PrincipalArgs),
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
