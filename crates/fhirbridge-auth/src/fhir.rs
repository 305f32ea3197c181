//! Minimal FHIR REST client for bearer-authorized reads and searches.

use serde_json::Value;
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::AccessToken;

const FHIR_JSON: &str = "application/fhir+json";

/// Reads FHIR resources with a bearer token.
#[derive(Debug, Clone)]
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
}

impl FhirClient {
    /// Creates a client for the FHIR base URL.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &Url) -> Self {
        Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, url: &str, token: &AccessToken) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(token.as_str())
            .header(reqwest::header::ACCEPT, FHIR_JSON)
    }

    /// Searches `resource_type` and returns the result bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The resource type is not a valid FHIR type name (`Configuration`)
    /// - The server cannot be reached (`NetworkError`)
    /// - The server answers with a non-success status (`ResourceRequestFailed`)
    /// - The body is not JSON (`MalformedResponse`)
    pub async fn search(
        &self,
        resource_type: &str,
        params: &[(String, String)],
        token: &AccessToken,
    ) -> AuthResult<Value> {
        check_resource_type(resource_type)?;
        let url = self.resource_url(resource_type);
        tracing::debug!(%url, params = params.len(), "FHIR search");

        let resp = self.request(&url, token).query(params).send().await?;
        handle_response(resp).await
    }

    /// Reads a single resource by id.
    pub async fn read(
        &self,
        resource_type: &str,
        id: &str,
        token: &AccessToken,
    ) -> AuthResult<Value> {
        check_resource_type(resource_type)?;
        if id.is_empty() || id.contains('/') {
            return Err(AuthError::configuration(format!("Invalid resource id: {id:?}")));
        }
        let url = self.resource_url(&format!("{resource_type}/{id}"));
        tracing::debug!(%url, "FHIR read");

        let resp = self.request(&url, token).send().await?;
        handle_response(resp).await
    }
}

fn check_resource_type(resource_type: &str) -> AuthResult<()> {
    let valid = resource_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
        && resource_type.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(AuthError::configuration(format!(
            "Invalid resource type: {resource_type:?}"
        )))
    }
}

async fn handle_response(resp: reqwest::Response) -> AuthResult<Value> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "FHIR request failed");
        let message = operation_outcome_diagnostics(&body).unwrap_or(body);
        return Err(AuthError::resource_request_failed(status.as_u16(), message));
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| AuthError::malformed_response(format!("FHIR response is not JSON: {e}")))
}

/// Joins the `diagnostics` of an OperationOutcome body, if it is one.
fn operation_outcome_diagnostics(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    if json.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return None;
    }
    let msgs: Vec<&str> = json
        .get("issue")?
        .as_array()?
        .iter()
        .filter_map(|i| i.get("diagnostics").and_then(Value::as_str))
        .collect();
    (!msgs.is_empty()).then(|| msgs.join("; "))
}
