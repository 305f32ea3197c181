use anyhow::{Context as _, Result};
use colored::Colorize;
use fhirbridge_auth::bootstrap::{generate_keys, publish_jwks};
use fhirbridge_auth::store::{keys, load_required};
use fhirbridge_auth::{ClientRegistration, KeySet, SigningAlgorithm, verify_assertion};

use super::Context;
use crate::cli::{KeygenArgs, OutputFormat};
use crate::output::{print_fields, print_json, print_success, print_warning};

pub async fn keygen(ctx: &Context, args: &KeygenArgs) -> Result<()> {
    let algorithm: SigningAlgorithm = match &args.algorithm {
        Some(alg) => alg.parse()?,
        None => ctx.config.client.algorithm,
    };

    let pair = generate_keys(&ctx.store, algorithm, args.bits, args.force).await?;
    let jwks = publish_jwks(&ctx.store).await?;
    let kid = jwks.active_key()?.resolved_kid()?;

    print_success(&format!(
        "Generated {} key for {} in {}",
        pair.kind,
        algorithm.to_string().cyan(),
        ctx.store.dir().display()
    ));
    println!("{}: {}", "kid".cyan(), kid);
    if let Some(warning) = algorithm_mismatch(algorithm, ctx.config.client.algorithm) {
        print_warning(&warning);
    }
    Ok(())
}

/// Warns when the new key's algorithm is not the one `sign` and `token` use.
fn algorithm_mismatch(generated: SigningAlgorithm, configured: SigningAlgorithm) -> Option<String> {
    (generated != configured).then(|| {
        format!(
            "Key was generated for {generated} but client.algorithm is {configured}; \
             set client.algorithm = \"{generated}\" (or FHIRBRIDGE__CLIENT__ALGORITHM={generated}) \
             before signing"
        )
    })
}

pub async fn jwks(ctx: &Context) -> Result<()> {
    let jwks = publish_jwks(&ctx.store).await?;
    print_json(&serde_json::to_value(&jwks)?);
    print_success(&format!("Wrote {}", ctx.store.dir().join(keys::JWKS).display()));
    Ok(())
}

pub async fn sign(ctx: &Context, format: OutputFormat) -> Result<()> {
    let assertion = ctx.authenticator()?.assertion().await?;
    match format {
        OutputFormat::Json => println!("{}", assertion.as_str()),
        OutputFormat::Table => {
            let claims = assertion.claims();
            print_fields(&[
                ("kid", assertion.kid().to_string()),
                ("alg", assertion.algorithm().to_string()),
                ("iss", claims.iss.clone()),
                ("aud", claims.aud.clone()),
                ("jti", claims.jti.clone()),
                ("exp", claims.exp.to_string()),
            ]);
        }
    }
    Ok(())
}

pub async fn verify(ctx: &Context, assertion: &str, format: OutputFormat) -> Result<()> {
    let jwks = KeySet::from_json(&load_required(&ctx.store, keys::JWKS).await?)?;
    let registration =
        ClientRegistration::from_json(&load_required(&ctx.store, keys::REGISTRATION).await?)
            .context("Client is not registered")?;
    let token_url = ctx.config.endpoints.token_url()?;

    let claims = verify_assertion(
        assertion.trim(),
        jwks.active_key()?,
        &registration.client_id,
        token_url.as_str(),
    )?;

    print_success("Assertion is valid");
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&claims)?),
        OutputFormat::Table => print_fields(&[
            ("iss", claims.iss.clone()),
            ("sub", claims.sub.clone()),
            ("aud", claims.aud.clone()),
            ("jti", claims.jti.clone()),
            ("iat", claims.iat.to_string()),
            ("exp", claims.exp.to_string()),
        ]),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_algorithm_has_no_warning() {
        assert!(algorithm_mismatch(SigningAlgorithm::RS384, SigningAlgorithm::RS384).is_none());
    }

    #[test]
    fn test_mismatched_algorithm_names_the_setting() {
        let warning =
            algorithm_mismatch(SigningAlgorithm::ES384, SigningAlgorithm::RS384).unwrap();
        assert!(warning.contains("ES384"));
        assert!(warning.contains("RS384"));
        assert!(warning.contains("FHIRBRIDGE__CLIENT__ALGORITHM=ES384"));
    }
}
