use anyhow::Result;
use colored::Colorize;
use fhirbridge_auth::TokenEndpointAuthMethod;
use fhirbridge_auth::bootstrap::register_client;
use fhirbridge_auth::store::keys;

use super::Context;
use crate::cli::{AuthMethodArg, OutputFormat};
use crate::output::{print_fields, print_json, print_success, print_warning};

impl From<AuthMethodArg> for TokenEndpointAuthMethod {
    fn from(arg: AuthMethodArg) -> Self {
        match arg {
            AuthMethodArg::PrivateKeyJwt => Self::PrivateKeyJwt,
            AuthMethodArg::ClientSecretBasic => Self::ClientSecretBasic,
            AuthMethodArg::ClientSecretPost => Self::ClientSecretPost,
        }
    }
}

pub async fn register(ctx: &Context, method: AuthMethodArg, format: OutputFormat) -> Result<()> {
    let auth = ctx.authenticator()?;
    let method = TokenEndpointAuthMethod::from(method);
    let registered = register_client(auth.http(), &ctx.config, &ctx.store, method).await?;
    let registration = &registered.registration;

    print_success(&format!(
        "Registered client {} ({})",
        registration.client_id.cyan(),
        method
    ));
    eprintln!(
        "Saved {}",
        ctx.store.dir().join(keys::REGISTRATION).display()
    );
    if method != TokenEndpointAuthMethod::PrivateKeyJwt {
        print_warning("The client secret is stored in registration.json");
    }
    print_warning("The client may need to be enabled by an administrator before use");

    match format {
        OutputFormat::Json => match serde_json::from_slice(&registered.raw) {
            Ok(value) => print_json(&value),
            Err(_) => println!("{}", String::from_utf8_lossy(&registered.raw)),
        },
        OutputFormat::Table => print_fields(&[
            ("client_id", registration.client_id.clone()),
            (
                "client_name",
                registration.client_name.clone().unwrap_or_default(),
            ),
            (
                "token_endpoint_auth_method",
                registration
                    .token_endpoint_auth_method
                    .clone()
                    .unwrap_or_default(),
            ),
            ("scope", registration.scope.clone().unwrap_or_default()),
        ]),
    }
    Ok(())
}
