use super::ProvideToken;
use crate::token::AccessToken;
use blobrelay_core::time::{now, parse_rfc3339};
use blobrelay_core::{Context, Error, Result};

const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

/// Fetches a managed-identity token from the Azure Instance Metadata
/// Service, available on VMs and other compute resources.
///
/// Reference: <https://learn.microsoft.com/en-us/azure/app-service/overview-managed-identity?tabs=portal,http#using-the-rest-protocol>
#[derive(Debug, Default)]
pub struct ImdsTokenProvider {
    endpoint: Option<String>,
    client_id: Option<String>,
    object_id: Option<String>,
    msi_secret: Option<String>,
}

impl ImdsTokenProvider {
    /// Create a new IMDS provider with the default metadata endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the metadata endpoint. Hosted environments publish their
    /// own endpoint through `IDENTITY_ENDPOINT`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Select a user-assigned identity by client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Select a user-assigned identity by object id.
    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Supply the identity header secret some hosts require.
    pub fn with_msi_secret(mut self, msi_secret: impl Into<String>) -> Self {
        self.msi_secret = Some(msi_secret.into());
        self
    }
}

#[derive(serde::Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_on: String,
}

#[async_trait::async_trait]
impl ProvideToken for ImdsTokenProvider {
    async fn provide_token(&self, ctx: &Context) -> Result<Option<AccessToken>> {
        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| ctx.env_var("IDENTITY_ENDPOINT").filter(|e| !e.is_empty()))
            .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string());

        let mut url = format!("{endpoint}?api-version=2018-02-01&resource={STORAGE_RESOURCE}");
        if let Some(object_id) = &self.object_id {
            url.push_str(&format!("&object_id={object_id}"));
        } else if let Some(client_id) = &self.client_id {
            url.push_str(&format!("&client_id={client_id}"));
        }

        let mut req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&url)
            .header("Metadata", "true");
        if let Some(msi_secret) = &self.msi_secret {
            req = req.header("X-IDENTITY-HEADER", msi_secret);
        }

        let req = req.body(bytes::Bytes::new())?;

        let resp = ctx
            .http_send(req)
            .await
            .map_err(|e| Error::authorization("identity metadata service unreachable").with_source(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = String::from_utf8_lossy(resp.body());
            return Err(Error::authorization(format!(
                "identity metadata request failed with status {status}: {body}"
            )));
        }

        let token: AccessTokenResponse = serde_json::from_slice(resp.body())
            .map_err(|e| Error::authorization("malformed identity metadata response").with_source(e))?;

        // The expiry comes back either as unix seconds or RFC 3339,
        // depending on the host.
        let expires_on = if token.expires_on.is_empty() {
            now() + chrono::TimeDelta::try_minutes(10).expect("in bounds")
        } else if let Ok(secs) = token.expires_on.parse::<i64>() {
            chrono::DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| Error::authorization("identity token expiry out of range"))?
        } else {
            parse_rfc3339(&token.expires_on)
                .map_err(|e| Error::authorization("invalid identity token expiry").with_source(e))?
        };

        Ok(Some(AccessToken::new(token.access_token, Some(expires_on))))
    }
}
