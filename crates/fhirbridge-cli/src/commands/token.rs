use anyhow::Result;
use serde_json::json;

use super::Context;
use crate::cli::{OutputFormat, TokenArgs};
use crate::output::{print_fields, print_json, print_success};

pub async fn token(ctx: &Context, args: &TokenArgs, format: OutputFormat) -> Result<()> {
    let token = ctx.authenticator()?.access_token().await?;

    if args.raw {
        println!("{}", token.as_str());
        return Ok(());
    }

    print_success("Access token obtained");
    let expires_at = token.expires_at().map(|t| t.to_string());
    match format {
        OutputFormat::Json => print_json(&json!({
            "token": token.preview(),
            "token_type": token.token_type(),
            "expires_in": token.expires_in(),
            "expires_at": expires_at,
            "scope": token.scope(),
        })),
        OutputFormat::Table => print_fields(&[
            ("token", token.preview()),
            ("token_type", token.token_type().unwrap_or("-").to_string()),
            (
                "expires_in",
                token
                    .expires_in()
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
            ),
            ("expires_at", expires_at.unwrap_or_else(|| "-".to_string())),
            ("scope", token.scope().unwrap_or("-").to_string()),
        ]),
    }
    Ok(())
}
