//! Object path model.
//!
//! Tenant objects live at `{bucket}/tenant/{tenant_id}/{relative}`.
//! Public buckets hold objects directly at `{bucket}/{relative}`.

use thiserror::Error;

use tenantguard_core::TenantId;

pub const TENANT_SEGMENT: &str = "tenant";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path must not start with '/'")]
    Absolute,

    #[error("invalid bucket name '{0}'")]
    InvalidBucket(String),

    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),

    #[error("malformed tenant segment '{0}'")]
    MalformedTenant(String),

    #[error("path names no object")]
    MissingObject,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PathScope {
    Tenant(TenantId),
    Public,
}

/// A validated object location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    bucket: String,
    scope: PathScope,
    relative: String,
}

/// A validated listing prefix. `relative` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPrefix {
    bucket: String,
    scope: PathScope,
    relative: String,
}

fn validate_bucket(bucket: &str) -> Result<(), PathError> {
    let ok = !bucket.is_empty()
        && bucket.len() <= 63
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok { Ok(()) } else { Err(PathError::InvalidBucket(bucket.to_string())) }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    let ok = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.chars().any(|c| c.is_control() || matches!(c, '\\' | '?' | '#'));
    if ok { Ok(()) } else { Err(PathError::InvalidSegment(segment.to_string())) }
}

/// Validate a relative path: one or more `/`-separated segments.
fn validate_relative(relative: &str) -> Result<(), PathError> {
    relative.split('/').try_for_each(validate_segment)
}

/// Split `raw` into bucket, scope and the remaining segments.
fn split(raw: &str) -> Result<(String, PathScope, Vec<&str>), PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.starts_with('/') {
        return Err(PathError::Absolute);
    }

    let mut segments = raw.split('/');
    let bucket = segments.next().ok_or(PathError::Empty)?;
    validate_bucket(bucket)?;

    let rest: Vec<&str> = segments.collect();
    if rest.first() == Some(&TENANT_SEGMENT) {
        let raw_tenant = rest.get(1).copied().unwrap_or_default();
        let tenant = raw_tenant
            .parse::<TenantId>()
            .map_err(|_| PathError::MalformedTenant(raw_tenant.to_string()))?;
        return Ok((bucket.to_string(), PathScope::Tenant(tenant), rest[2..].to_vec()));
    }
    Ok((bucket.to_string(), PathScope::Public, rest))
}

impl ObjectPath {
    /// Parse a client-supplied path. Parsing says nothing about whether the
    /// caller may touch it.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let (bucket, scope, rest) = split(raw)?;
        if rest.is_empty() {
            return Err(PathError::MissingObject);
        }
        let relative = rest.join("/");
        validate_relative(&relative)?;
        Ok(Self { bucket, scope, relative })
    }

    pub(crate) fn in_tenant(bucket: &str, tenant_id: TenantId, relative: &str) -> Result<Self, PathError> {
        validate_bucket(bucket)?;
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            return Err(PathError::MissingObject);
        }
        validate_relative(relative)?;
        Ok(Self {
            bucket: bucket.to_string(),
            scope: PathScope::Tenant(tenant_id),
            relative: relative.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn scope(&self) -> PathScope {
        self.scope
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self.scope {
            PathScope::Tenant(t) => Some(t),
            PathScope::Public => None,
        }
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }
}

impl core::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.scope {
            PathScope::Tenant(t) => write!(f, "{}/{TENANT_SEGMENT}/{t}/{}", self.bucket, self.relative),
            PathScope::Public => write!(f, "{}/{}", self.bucket, self.relative),
        }
    }
}

impl ObjectPrefix {
    /// Parse a listing prefix. A trailing `/` is allowed.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let (bucket, scope, rest) = split(raw)?;
        let mut relative = rest.join("/");
        let trailing = relative.ends_with('/');
        let trimmed = relative.trim_end_matches('/');
        if !trimmed.is_empty() {
            validate_relative(trimmed)?;
        }
        if !trailing {
            relative = trimmed.to_string();
        }
        Ok(Self { bucket, scope, relative })
    }

    /// Every object of `tenant_id` in `bucket`.
    pub fn tenant_root(bucket: &str, tenant_id: TenantId) -> Self {
        Self {
            bucket: bucket.to_string(),
            scope: PathScope::Tenant(tenant_id),
            relative: String::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn scope(&self) -> PathScope {
        self.scope
    }

    /// Whether `path` falls under this prefix.
    pub fn contains(&self, path: &ObjectPath) -> bool {
        path.bucket == self.bucket && path.scope == self.scope && path.relative.starts_with(&self.relative)
    }
}

impl core::fmt::Display for ObjectPrefix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.scope {
            PathScope::Tenant(t) => write!(f, "{}/{TENANT_SEGMENT}/{t}/{}", self.bucket, self.relative),
            PathScope::Public => write!(f, "{}/{}", self.bucket, self.relative),
        }
    }
}
