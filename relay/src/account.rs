use crate::constants::*;
use crate::provide_token::ProvideToken;
use crate::sas::{SasPermissions, UserDelegationKey, UserDelegationSas};
use crate::token::AccessToken;
use blobrelay_core::time::{format_rfc3339, now, DateTime};
use blobrelay_core::{Context, Error, Result};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Client for one storage account, authenticated through the ambient
/// identity.
///
/// One instance exists per account per invocation. The bearer token is
/// cached and only refreshed once it stops being valid; delegation keys
/// are never cached, each token request gets a fresh one.
#[derive(Clone, Debug)]
pub struct StorageAccount {
    ctx: Context,
    endpoint: String,
    provider: Arc<dyn ProvideToken>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl StorageAccount {
    /// Create a client for the account behind `endpoint`
    /// (`https://{account}.{suffix}`, no trailing slash required).
    pub fn new(ctx: Context, endpoint: impl Into<String>, provider: Arc<dyn ProvideToken>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            ctx,
            endpoint,
            provider,
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// The account endpoint, `scheme://host`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The account name, taken from the first host label.
    pub fn account_name(&self) -> &str {
        let host = self
            .endpoint
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.endpoint);
        host.split('.').next().unwrap_or(host)
    }

    async fn bearer(&self) -> Result<HeaderValue> {
        let cached = self.token.lock().expect("lock poisoned").clone();
        let token = match cached {
            Some(token) if token.is_valid() => token,
            _ => {
                let fresh = self
                    .provider
                    .provide_token(&self.ctx)
                    .await?
                    .ok_or_else(|| {
                        Error::authorization(format!(
                            "no identity credential available for account {}",
                            self.account_name()
                        ))
                    })?;
                *self.token.lock().expect("lock poisoned") = Some(fresh.clone());
                fresh
            }
        };

        let mut value: HeaderValue = format!("Bearer {}", token.token).parse()?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Request a delegation key valid for exactly `[start, expiry]`.
    ///
    /// - [Get User Delegation Key](https://learn.microsoft.com/en-us/rest/api/storageservices/get-user-delegation-key)
    pub async fn user_delegation_key(
        &self,
        start: DateTime,
        expiry: DateTime,
    ) -> Result<UserDelegationKey> {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
            format_rfc3339(start),
            format_rfc3339(expiry),
        );

        let req = http::Request::post(format!(
            "{}/?restype=service&comp=userdelegationkey",
            self.endpoint
        ))
        .header(header::AUTHORIZATION, self.bearer().await?)
        .header(header::CONTENT_TYPE, "application/xml")
        .header(X_MS_VERSION, STORAGE_VERSION)
        .body(Bytes::from(body))?;

        let resp = self.ctx.http_send_as_string(req).await.map_err(|e| {
            Error::authorization(format!(
                "control plane for account {} unreachable",
                self.account_name()
            ))
            .with_source(e)
        })?;

        if !resp.status().is_success() {
            return Err(Error::authorization(format!(
                "delegation key request for account {} failed with status {}: {}",
                self.account_name(),
                resp.status(),
                resp.body(),
            )));
        }

        let key: UserDelegationKey = quick_xml::de::from_str(resp.body()).map_err(|e| {
            Error::authorization("malformed delegation key response").with_source(e)
        })?;

        debug!(
            "obtained delegation key for account {} valid until {}",
            self.account_name(),
            key.signed_expiry
        );

        Ok(key)
    }

    /// Issue a token URI scoped to one blob (or, without a blob name, a
    /// whole container), restricted to exactly `permissions` and valid for
    /// `[now, now + valid_for]`.
    ///
    /// A fresh delegation key backs every call; the token window equals
    /// the key window, so the token can never outlive its key.
    pub async fn issue_delegation_sas(
        &self,
        container: &str,
        blob: Option<&str>,
        permissions: SasPermissions,
        valid_for: Duration,
    ) -> Result<String> {
        let start = now();
        let expiry = start
            + chrono::TimeDelta::from_std(valid_for)
                .map_err(|e| Error::unexpected("token validity out of range").with_source(e))?;

        let key = self.user_delegation_key(start, expiry).await?;

        let (sas, base) = match blob {
            Some(blob) => (
                UserDelegationSas::for_blob(
                    self.account_name(),
                    key,
                    container,
                    blob,
                    permissions,
                    start,
                    expiry,
                ),
                format!("{}/{}/{}", self.endpoint, container, blob),
            ),
            None => (
                UserDelegationSas::for_container(
                    self.account_name(),
                    key,
                    container,
                    permissions,
                    start,
                    expiry,
                ),
                format!("{}/{}", self.endpoint, container),
            ),
        };

        debug!(
            "issued sas for {}/{} permissions={} expires={}",
            self.account_name(),
            container,
            permissions.as_str(),
            format_rfc3339(expiry),
        );

        sas.token_uri(&base)
    }

    /// Ensure a container exists. Returns whether this call created it.
    ///
    /// Creation racing an existing container reports 409
    /// `ContainerAlreadyExists`, which counts as success here.
    pub async fn create_container_if_absent(&self, name: &str) -> Result<bool> {
        let req = http::Request::put(format!("{}/{}?restype=container", self.endpoint, name))
            .header(header::AUTHORIZATION, self.bearer().await?)
            .header(X_MS_VERSION, STORAGE_VERSION)
            .body(Bytes::new())?;

        let resp = self.ctx.http_send_as_string(req).await.map_err(|e| {
            Error::container_provision(format!("container creation for {name} unreachable"))
                .with_source(e)
        })?;

        match resp.status() {
            StatusCode::CREATED => {
                debug!("created container {} on account {}", name, self.account_name());
                Ok(true)
            }
            StatusCode::CONFLICT
                if error_code(&resp) == Some(ERROR_CONTAINER_ALREADY_EXISTS) =>
            {
                Ok(false)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::authorization(format!(
                "not allowed to create container {} on account {}",
                name,
                self.account_name()
            ))),
            status => Err(Error::container_provision(format!(
                "container creation for {name} failed with status {status}: {}",
                resp.body(),
            ))),
        }
    }

    /// Delete a blob, treating an already-absent blob as success. Returns
    /// whether the blob existed.
    pub async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> Result<bool> {
        let req = http::Request::delete(format!("{}/{}/{}", self.endpoint, container, blob))
            .header(header::AUTHORIZATION, self.bearer().await?)
            .header(X_MS_VERSION, STORAGE_VERSION)
            .body(Bytes::new())?;

        let resp = self
            .ctx
            .http_send_as_string(req)
            .await
            .map_err(|e| Error::delete(format!("delete for {container}/{blob} unreachable")).with_source(e))?;

        match resp.status() {
            StatusCode::ACCEPTED => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::delete(format!(
                "delete for {container}/{blob} failed with status {status}: {}",
                resp.body(),
            ))),
        }
    }
}

fn error_code(resp: &http::Response<String>) -> Option<&str> {
    resp.headers()
        .get(X_MS_ERROR_CODE)
        .and_then(|v| v.to_str().ok())
}
