//! Build request and result types exchanged with the serving layer.
//!
//! A [`BuildRequest`] arrives as JSON from whatever front end accepts build
//! submissions. It is validated once, up front, before any filesystem or
//! subprocess work happens, so the pipeline can trust identities and
//! certificate names when it derives paths from them.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Longest device identity accepted as a workspace path segment.
pub const MAX_IDENTITY_LEN: usize = 128;

/// A single build submission.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildRequest {
    /// Repository to check out.
    pub repository: Repository,
    /// Target device; its attributes feed the profile template.
    pub device: Device,
    /// Device profile carrying the build descriptor template.
    pub profile: Profile,
    /// Certificate files keyed by bare file name.
    #[serde(default)]
    pub certificates: BTreeMap<String, String>,
}

/// Remote repository reference.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Repository {
    /// Clone URL understood by the checkout tool.
    pub url: String,
    /// Branch to check out.
    pub branch: String,
    /// Optional private key granting read access to `url`.
    #[serde(default, rename = "sshKey")]
    pub ssh_key: Option<String>,
}

/// Device description. Everything except `identity` is free-form.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Device {
    /// Stable device identifier, reused for workspace and archive names.
    pub identity: String,
    /// Remaining attributes, available to the profile template.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Device {
    /// Device fields as one JSON object, identity included.
    #[must_use]
    pub fn as_object(&self) -> Map<String, Value> {
        let mut fields = self.attributes.clone();
        fields.insert(
            String::from("identity"),
            Value::String(self.identity.clone()),
        );
        fields
    }
}

/// Device profile.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Build descriptor template rendered against the device.
    #[serde(rename = "scriptTemplate", alias = "script")]
    pub script_template: String,
}

/// Errors raised when a request is unusable as submitted.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when the device identity cannot be used as a path segment.
    #[error("invalid device identity {identity:?}: {reason}")]
    InvalidIdentity {
        /// Identity as submitted.
        identity: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Raised when a repository field is blank or looks like an option.
    #[error("invalid repository {field}: {reason}")]
    InvalidRepository {
        /// Offending field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Raised when a certificate name is not a bare relative file name.
    #[error("invalid certificate name {name:?}: must be a bare file name")]
    InvalidCertificateName {
        /// Name as submitted.
        name: String,
    },
    /// Raised when the JSON payload cannot be decoded.
    #[error("malformed build request: {0}")]
    Malformed(String),
    /// Raised when the request cannot be read from its source.
    #[error("failed to read build request from {source_name}: {message}")]
    Unreadable {
        /// File path, or `stdin`.
        source_name: String,
        /// Operating system error string.
        message: String,
    },
}

impl BuildRequest {
    /// Decodes a request from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Malformed`] when the payload does not match the
    /// expected shape.
    pub fn from_json(payload: &str) -> Result<Self, RequestError> {
        serde_json::from_str(payload).map_err(|err| RequestError::Malformed(err.to_string()))
    }

    /// Checks every field the pipeline later turns into a path or argument.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] found.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_identity(&self.device.identity)?;
        require_argument("url", &self.repository.url)?;
        require_argument("branch", &self.repository.branch)?;
        for name in self.certificates.keys() {
            if !is_bare_file_name(name) {
                return Err(RequestError::InvalidCertificateName { name: name.clone() });
            }
        }
        Ok(())
    }

    /// The SSH key, if one was supplied with any content.
    #[must_use]
    pub fn ssh_key(&self) -> Option<&str> {
        self.repository
            .ssh_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Validates a device identity for use as a single path segment.
///
/// # Errors
///
/// Returns [`RequestError::InvalidIdentity`] describing the first violation.
pub fn validate_identity(identity: &str) -> Result<(), RequestError> {
    let reject = |reason: &str| {
        Err(RequestError::InvalidIdentity {
            identity: identity.to_owned(),
            reason: reason.to_owned(),
        })
    };

    if identity.is_empty() {
        return reject("must not be empty");
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return reject("must be at most 128 bytes");
    }
    if identity == "." || identity == ".." {
        return reject("must not be a relative directory reference");
    }
    if !identity
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return reject("only ASCII letters, digits, '.', '_' and '-' are allowed");
    }
    Ok(())
}

fn require_argument(field: &'static str, value: &str) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        return Err(RequestError::InvalidRepository {
            field,
            reason: String::from("must not be empty"),
        });
    }
    if value.starts_with('-') {
        return Err(RequestError::InvalidRepository {
            field,
            reason: String::from("must not start with '-'"),
        });
    }
    Ok(())
}

fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Terminal status of a successful build.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Every step completed.
    Done,
}

/// Result descriptor returned on success.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BuildResult {
    /// Always [`BuildStatus::Done`].
    pub status: BuildStatus,
    /// Location of the packaged archive.
    pub artifact: Utf8PathBuf,
    /// Entry names stored in the archive.
    pub entries: Vec<String>,
}
