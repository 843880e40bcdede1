//! User delegation SAS construction.
//!
//! A delegation key signs scoped access tokens without ever exposing a
//! long-lived account key. The string-to-sign follows the documented
//! layout for service version 2022-11-02.
//!
//! - [Create a user delegation SAS](https://learn.microsoft.com/en-us/rest/api/storageservices/create-user-delegation-sas)

use crate::constants::STORAGE_VERSION;
use blobrelay_core::time::{format_rfc3339, parse_rfc3339, DateTime};
use blobrelay_core::utils::Redact;
use blobrelay_core::{hash, Error, Result};
use serde::Deserialize;
use std::fmt::{Debug, Formatter};

/// A time-bounded delegation key issued by the storage control plane.
///
/// Held in memory only for the duration of one SAS derivation; never
/// persisted, never reused across invocations.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDelegationKey {
    /// Object id of the principal the key was issued to.
    pub signed_oid: String,
    /// Tenant of that principal.
    pub signed_tid: String,
    /// Start of the key validity window, as the service returned it.
    pub signed_start: String,
    /// End of the key validity window, as the service returned it.
    pub signed_expiry: String,
    /// Service the key is good for, `b` for blobs.
    pub signed_service: String,
    /// Service version the key was issued under.
    pub signed_version: String,
    /// The key material, base64 encoded.
    pub value: String,
}

impl Debug for UserDelegationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDelegationKey")
            .field("signed_oid", &self.signed_oid)
            .field("signed_tid", &self.signed_tid)
            .field("signed_start", &self.signed_start)
            .field("signed_expiry", &self.signed_expiry)
            .field("signed_service", &self.signed_service)
            .field("signed_version", &self.signed_version)
            .field("value", &Redact::from(&self.value))
            .finish()
    }
}

/// The permission bits a token grants. Only the bits the relay actually
/// requests are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct SasPermissions {
    pub read: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl SasPermissions {
    /// Read-only, the source side of a transfer.
    pub const READ: Self = Self {
        read: true,
        create: false,
        write: false,
        delete: false,
        list: false,
    };

    /// Read/write, the destination side of a transfer.
    pub const READ_WRITE: Self = Self {
        read: true,
        create: false,
        write: true,
        delete: false,
        list: false,
    };

    /// The `sp` field in the canonical order the service requires.
    pub fn as_str(&self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.create {
            s.push('c');
        }
        if self.write {
            s.push('w');
        }
        if self.delete {
            s.push('d');
        }
        if self.list {
            s.push('l');
        }
        s
    }

    /// Whether no bits are set.
    pub fn is_empty(&self) -> bool {
        !(self.read || self.create || self.write || self.delete || self.list)
    }
}

/// What a token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SasResource {
    Container,
    Blob,
}

impl SasResource {
    /// The `sr` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SasResource::Container => "c",
            SasResource::Blob => "b",
        }
    }
}

/// Builds the token query for one scope, one permission set and one
/// validity window, signed with a delegation key.
pub struct UserDelegationSas {
    account: String,
    key: UserDelegationKey,
    resource: SasResource,
    container: String,
    blob: Option<String>,
    permissions: SasPermissions,
    start: DateTime,
    expiry: DateTime,
}

impl UserDelegationSas {
    /// A token scoped to a whole container.
    pub fn for_container(
        account: impl Into<String>,
        key: UserDelegationKey,
        container: impl Into<String>,
        permissions: SasPermissions,
        start: DateTime,
        expiry: DateTime,
    ) -> Self {
        Self {
            account: account.into(),
            key,
            resource: SasResource::Container,
            container: container.into(),
            blob: None,
            permissions,
            start,
            expiry,
        }
    }

    /// A token scoped to a single blob.
    pub fn for_blob(
        account: impl Into<String>,
        key: UserDelegationKey,
        container: impl Into<String>,
        blob: impl Into<String>,
        permissions: SasPermissions,
        start: DateTime,
        expiry: DateTime,
    ) -> Self {
        Self {
            account: account.into(),
            key,
            resource: SasResource::Blob,
            container: container.into(),
            blob: Some(blob.into()),
            permissions,
            start,
            expiry,
        }
    }

    // The token must not outlive the key that signs it, and an empty
    // permission set signs nothing useful.
    fn validate(&self) -> Result<()> {
        if self.permissions.is_empty() {
            return Err(Error::unexpected("refusing to sign a token with no permissions"));
        }

        let key_start = parse_rfc3339(&self.key.signed_start)?;
        let key_expiry = parse_rfc3339(&self.key.signed_expiry)?;
        if self.start < key_start || self.expiry > key_expiry {
            return Err(Error::unexpected(format!(
                "token window [{}, {}] outlives delegation key window [{}, {}]",
                format_rfc3339(self.start),
                format_rfc3339(self.expiry),
                self.key.signed_start,
                self.key.signed_expiry,
            )));
        }

        Ok(())
    }

    fn canonicalized_resource(&self) -> String {
        match &self.blob {
            Some(blob) => format!("/blob/{}/{}/{}", self.account, self.container, blob),
            None => format!("/blob/{}/{}", self.account, self.container),
        }
    }

    // Layout for service version 2020-12-06 and later: permissions,
    // window, resource, the six signed key fields, the three delegated
    // user fields, ip, protocol, version, resource type, snapshot,
    // encryption scope, and the five response header overrides.
    fn string_to_sign(&self) -> String {
        [
            self.permissions.as_str().as_str(),
            &format_rfc3339(self.start),
            &format_rfc3339(self.expiry),
            &self.canonicalized_resource(),
            &self.key.signed_oid,
            &self.key.signed_tid,
            &self.key.signed_start,
            &self.key.signed_expiry,
            &self.key.signed_service,
            &self.key.signed_version,
            "", // saoid
            "", // suoid
            "", // scid
            "", // sip
            "", // spr
            STORAGE_VERSION,
            self.resource.as_str(),
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n")
    }

    fn signature(&self) -> Result<String> {
        let key = hash::base64_decode(&self.key.value)?;
        Ok(hash::base64_hmac_sha256(&key, self.string_to_sign().as_bytes()))
    }

    /// The token as query pairs, values already percent encoded.
    pub fn token(&self) -> Result<Vec<(String, String)>> {
        self.validate()?;

        let mut elements: Vec<(String, String)> = vec![
            ("sv".to_string(), STORAGE_VERSION.to_string()),
            ("sr".to_string(), self.resource.as_str().to_string()),
            ("st".to_string(), urlencoded(format_rfc3339(self.start))),
            ("se".to_string(), urlencoded(format_rfc3339(self.expiry))),
            ("sp".to_string(), self.permissions.as_str()),
            ("skoid".to_string(), self.key.signed_oid.clone()),
            ("sktid".to_string(), self.key.signed_tid.clone()),
            ("skt".to_string(), urlencoded(self.key.signed_start.clone())),
            ("ske".to_string(), urlencoded(self.key.signed_expiry.clone())),
            ("sks".to_string(), self.key.signed_service.clone()),
            ("skv".to_string(), self.key.signed_version.clone()),
        ];

        let sig = self.signature()?;
        elements.push(("sig".to_string(), urlencoded(sig)));

        Ok(elements)
    }

    /// Embed the token as the query component of `base`.
    pub fn token_uri(&self, base: &str) -> Result<String> {
        let query = self
            .token()?
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<String>>()
            .join("&");

        Ok(format!("{base}?{query}"))
    }
}

fn urlencoded(s: String) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobrelay_core::time::parse_rfc3339;
    use pretty_assertions::assert_eq;

    fn test_key() -> UserDelegationKey {
        UserDelegationKey {
            signed_oid: "f0f51068-7c3c-4d4a-9575-0e8f25a30ac1".to_string(),
            signed_tid: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
            signed_start: "2024-05-01T09:00:00Z".to_string(),
            signed_expiry: "2024-05-01T11:00:00Z".to_string(),
            signed_service: "b".to_string(),
            signed_version: STORAGE_VERSION.to_string(),
            value: hash::base64_encode(b"delegation-key"),
        }
    }

    fn test_window() -> (DateTime, DateTime) {
        (
            parse_rfc3339("2024-05-01T10:00:00Z").unwrap(),
            parse_rfc3339("2024-05-01T10:10:00Z").unwrap(),
        )
    }

    #[test]
    fn test_permission_string_order() {
        assert_eq!(SasPermissions::READ.as_str(), "r");
        assert_eq!(SasPermissions::READ_WRITE.as_str(), "rw");

        let all = SasPermissions {
            read: true,
            create: true,
            write: true,
            delete: true,
            list: true,
        };
        assert_eq!(all.as_str(), "rcwdl");
    }

    #[test]
    fn test_canonicalized_resource() {
        let (start, expiry) = test_window();

        let container =
            UserDelegationSas::for_container("acct", test_key(), "cont", SasPermissions::READ, start, expiry);
        assert_eq!(container.canonicalized_resource(), "/blob/acct/cont");

        let blob = UserDelegationSas::for_blob(
            "acct",
            test_key(),
            "cont",
            "file.bin",
            SasPermissions::READ,
            start,
            expiry,
        );
        assert_eq!(blob.canonicalized_resource(), "/blob/acct/cont/file.bin");
    }

    #[test]
    fn test_can_generate_blob_token() {
        let (start, expiry) = test_window();
        let sign = UserDelegationSas::for_blob(
            "acct",
            test_key(),
            "cont",
            "file.bin",
            SasPermissions::READ,
            start,
            expiry,
        );

        let token = sign
            .token()
            .expect("token signing failed")
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<String>>()
            .join("&");

        assert_eq!(
            token,
            "sv=2022-11-02&sr=b&st=2024-05-01T10%3A00%3A00Z&se=2024-05-01T10%3A10%3A00Z&sp=r\
             &skoid=f0f51068-7c3c-4d4a-9575-0e8f25a30ac1&sktid=72f988bf-86f1-41af-91ab-2d7cd011db47\
             &skt=2024-05-01T09%3A00%3A00Z&ske=2024-05-01T11%3A00%3A00Z&sks=b&skv=2022-11-02\
             &sig=OY%2BmfwyMW5WB0eQP8PefHIEOS3aOyD57MJWdvwrUKXI%3D"
        );
    }

    #[test]
    fn test_token_uri_embeds_query() {
        let (start, expiry) = test_window();
        let sign = UserDelegationSas::for_blob(
            "acct",
            test_key(),
            "cont",
            "file.bin",
            SasPermissions::READ,
            start,
            expiry,
        );

        let uri = sign
            .token_uri("https://acct.blob.core.example/cont/file.bin")
            .unwrap();
        assert!(uri.starts_with("https://acct.blob.core.example/cont/file.bin?sv="));
        assert!(uri.contains("&sig="));
    }

    #[test]
    fn test_permissions_change_the_signature() {
        let (start, expiry) = test_window();
        let read = UserDelegationSas::for_blob(
            "acct", test_key(), "cont", "file.bin", SasPermissions::READ, start, expiry,
        );
        let write = UserDelegationSas::for_blob(
            "acct", test_key(), "cont", "file.bin", SasPermissions::READ_WRITE, start, expiry,
        );

        assert_ne!(read.signature().unwrap(), write.signature().unwrap());
    }

    #[test]
    fn test_window_outliving_key_is_rejected() {
        let start = parse_rfc3339("2024-05-01T10:00:00Z").unwrap();
        let expiry = parse_rfc3339("2024-05-01T12:00:00Z").unwrap(); // past key expiry

        let sign = UserDelegationSas::for_blob(
            "acct", test_key(), "cont", "file.bin", SasPermissions::READ, start, expiry,
        );
        assert!(sign.token().is_err());
    }

    #[test]
    fn test_empty_permissions_are_rejected() {
        let (start, expiry) = test_window();
        let sign = UserDelegationSas::for_blob(
            "acct", test_key(), "cont", "file.bin", SasPermissions::default(), start, expiry,
        );
        assert!(sign.token().is_err());
    }
}
