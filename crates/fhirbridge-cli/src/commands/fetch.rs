use anyhow::{Result, bail};

use super::Context;
use crate::cli::OutputFormat;
use crate::output::print_value;

pub async fn fetch(
    ctx: &Context,
    resource_type: &str,
    raw_params: &[String],
    count: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let params = parse_params(raw_params, count)?;
    let bundle = ctx.authenticator()?.fetch(resource_type, &params).await?;
    print_value(&bundle, format);
    Ok(())
}

fn parse_params(raw_params: &[String], count: Option<u32>) -> Result<Vec<(String, String)>> {
    let mut params = Vec::with_capacity(raw_params.len() + 1);
    for raw in raw_params {
        match raw.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                params.push((key.to_string(), value.to_string()));
            }
            _ => bail!("Invalid search parameter {raw:?}: expected key=value"),
        }
    }

    if let Some(c) = count {
        params.push(("_count".to_string(), c.to_string()));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let raw = vec!["family=Smith".to_string(), "birthdate=gt1990-01-01".to_string()];
        let params = parse_params(&raw, Some(5)).unwrap();
        assert_eq!(
            params,
            vec![
                ("family".to_string(), "Smith".to_string()),
                ("birthdate".to_string(), "gt1990-01-01".to_string()),
                ("_count".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let params = parse_params(&["identifier=urn:x|a=b".to_string()], None).unwrap();
        assert_eq!(params[0].1, "urn:x|a=b");
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let params = parse_params(&["_summary=".to_string()], None).unwrap();
        assert_eq!(params, vec![("_summary".to_string(), String::new())]);
    }

    #[test]
    fn test_malformed_pairs_are_rejected() {
        for raw in ["Smith", "=Smith", ""] {
            let err = parse_params(&[raw.to_string()], None).unwrap_err();
            assert!(err.to_string().contains("key=value"), "{raw}");
        }
    }
}
