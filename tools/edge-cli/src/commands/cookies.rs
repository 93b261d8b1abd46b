//! Context cookie commands.

use anyhow::{Context as _, Result};
use edge_security::CookieDescriptor;
use serde_json::json;

use super::{CookiesArgs, CookiesCommand};
use crate::context::Context;

/// Run the cookies command.
pub fn run(args: CookiesArgs, ctx: &Context) -> Result<()> {
    let cookies = ctx.cookie_manager()?;

    let issued = match args.command {
        CookiesCommand::Issue(principal) => cookies
            .issue_cookies(&principal.principal())
            .context("Failed to issue cookies")?,
        CookiesCommand::Revoke(principal) => cookies.revoke_cookies(&principal.principal()),
    };

    print_cookies(&issued, ctx);
    Ok(())
}

fn print_cookies(cookies: &[CookieDescriptor], ctx: &Context) {
    if ctx.output.is_json() {
        let headers: Vec<_> = cookies
            .iter()
            .map(|cookie| {
                json!({
                    "name": cookie.name,
                    "value": cookie.value,
                    "set_cookie": cookie.to_set_cookie(),
                })
            })
            .collect();
        ctx.output.json(&headers);
        return;
    }

    for cookie in cookies {
        ctx.output.plain(&format!("Set-Cookie: {}", cookie.to_set_cookie()));
    }
}
