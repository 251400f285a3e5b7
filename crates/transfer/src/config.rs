//! Transfer settings supplied by the caller for each upload.

use std::fmt;
use std::path::PathBuf;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::validation::is_executable_file;

/// Connection parameters for the remote server and the transfer tool.
///
/// The value is read-only for the duration of an upload; the orchestrator
/// snapshots what it needs before spawning the tool.
#[derive(Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    /// Never logged; `Debug` prints a placeholder.
    #[serde(default)]
    pub password: String,

    /// Remote directory, e.g. `/var/www/uploads`.
    #[serde(default)]
    pub remote_path: String,

    /// URL prefix under which uploaded files are served.
    #[serde(default)]
    pub public_base_url: String,

    #[serde(default = "default_tool_path")]
    pub transfer_tool_path: PathBuf,

    /// Skip certificate and host key verification.
    #[serde(default)]
    pub allow_insecure: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u32>,
}

fn default_port() -> u16 {
    22
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("/usr/bin/curl")
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            remote_path: String::new(),
            public_base_url: String::new(),
            transfer_tool_path: default_tool_path(),
            allow_insecure: false,
            connect_timeout_secs: None,
        }
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_path", &self.remote_path)
            .field("public_base_url", &self.public_base_url)
            .field("transfer_tool_path", &self.transfer_tool_path)
            .field("allow_insecure", &self.allow_insecure)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl TransferConfig {
    /// Checks that every required field is present and the tool is usable.
    ///
    /// Fails with the first problem found, in field order: host, port,
    /// username, password, public base URL, transfer tool.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.host.trim().is_empty() {
            return Err(TransferError::MissingSettings("host"));
        }
        if self.port == 0 {
            return Err(TransferError::MissingSettings("port"));
        }
        if self.username.is_empty() {
            return Err(TransferError::MissingSettings("username"));
        }
        if self.password.is_empty() {
            return Err(TransferError::MissingSettings("password"));
        }
        if self.public_base_url.trim().is_empty() {
            return Err(TransferError::MissingSettings("public_base_url"));
        }
        if self.transfer_tool_path.as_os_str().is_empty() {
            return Err(TransferError::MissingSettings("transfer_tool_path"));
        }
        if !is_executable_file(&self.transfer_tool_path) {
            return Err(TransferError::InvalidToolPath(
                self.transfer_tool_path.clone(),
            ));
        }
        Ok(())
    }

    /// Remote directory with a single leading slash and no trailing slash.
    pub fn normalized_remote_path(&self) -> String {
        normalize_remote_path(&self.remote_path)
    }

    /// Public base URL guaranteed to end with `/`.
    pub fn normalized_base_url(&self) -> String {
        normalize_base_url(&self.public_base_url)
    }
}

/// Normalizes a remote directory: `"uploads/"` becomes `"/uploads"`, `""` becomes `"/"`.
pub fn normalize_remote_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Appends a trailing `/` to a non-empty base URL that lacks one.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Everything except RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes one URL path segment, so `#`, `?`, `%` and spaces in a
/// file name stay part of the name.
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Percent-encodes each segment of a `/`-separated path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}
