/// Service version sent with every storage request and signed into tokens.
pub const STORAGE_VERSION: &str = "2022-11-02";

pub const X_MS_VERSION: &str = "x-ms-version";
pub const X_MS_COPY_SOURCE: &str = "x-ms-copy-source";
pub const X_MS_COPY_ID: &str = "x-ms-copy-id";
pub const X_MS_COPY_STATUS: &str = "x-ms-copy-status";
pub const X_MS_COPY_STATUS_DESCRIPTION: &str = "x-ms-copy-status-description";
pub const X_MS_ERROR_CODE: &str = "x-ms-error-code";

/// Error code the service reports when container creation races an
/// existing container. Treated as success by the resolver.
pub const ERROR_CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";
