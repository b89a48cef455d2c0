// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the ESXi service
//!
//! All configuration comes from environment variables, read once at
//! startup. Nothing here is reloadable at runtime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use secrecy::SecretString;

/// Service configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct EsxiConfig {
    /// Base URL of the vCenter Automation API (e.g. "https://vcenter.local")
    pub vcenter_url: String,

    /// vCenter account the service authenticates as
    pub vcenter_user: String,

    /// Password for `vcenter_user`
    pub vcenter_password: SecretString,

    /// Name of the content library used to stage OVA deployments
    pub vcenter_library: String,

    /// Directory holding the `esxi-<version>.ova` image catalog
    pub images_dir: PathBuf,

    /// Externally visible base URL of this service, used to build the
    /// `Link` header on enqueue responses. Stored without a trailing slash.
    pub external_url: String,

    /// HMAC secret shared with the token issuer for `X-Auth` verification
    pub auth_secret: SecretString,

    /// Timeout for individual vCenter HTTP requests, in seconds
    pub http_timeout_secs: u64,

    /// How long finished task records remain pollable, in seconds
    pub task_retention_secs: u64,
}

impl EsxiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let vcenter_url =
            std::env::var("VCENTER_URL").context("VCENTER_URL environment variable required")?;

        let vcenter_user =
            std::env::var("VCENTER_USER").context("VCENTER_USER environment variable required")?;

        let vcenter_password = std::env::var("VCENTER_PASSWORD")
            .context("VCENTER_PASSWORD environment variable required")?
            .into();

        let vcenter_library =
            std::env::var("VCENTER_LIBRARY").unwrap_or_else(|_| "esxi".to_string());

        let images_dir = std::env::var("IMAGES_DIR")
            .unwrap_or_else(|_| "/opt/images/esxi".to_string())
            .into();

        let external_url = normalize_external_url(
            &std::env::var("EXTERNAL_URL").context("EXTERNAL_URL environment variable required")?,
        );

        let auth_secret = std::env::var("AUTH_SECRET")
            .context("AUTH_SECRET environment variable required")?
            .into();

        let http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("Invalid HTTP_TIMEOUT_SECS")?;

        let task_retention_secs = std::env::var("TASK_RETENTION_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("Invalid TASK_RETENTION_SECS")?;

        Ok(Self {
            vcenter_url,
            vcenter_user,
            vcenter_password,
            vcenter_library,
            images_dir,
            external_url,
            auth_secret,
            http_timeout_secs,
            task_retention_secs,
        })
    }
}

/// Strip any trailing slashes so `Link` headers can always be built as
/// `<base>/api/...` without doubling separators.
fn normalize_external_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    // =========================================================================
    // Configuration Tests
    // =========================================================================
    //
    // Note: We deliberately avoid testing `from_env()` directly because:
    //
    // 1. In Rust 2024 edition, `std::env::set_var` and `std::env::remove_var`
    //    are marked as `unsafe` due to potential data races with other threads
    //    reading environment variables.
    //
    // 2. The `from_env()` function is straightforward - it reads env vars and
    //    parses them. The interesting logic lives in the pure helpers.
    //
    // =========================================================================

    #[test]
    fn external_url_trailing_slash_is_stripped() {
        assert_eq!(
            normalize_external_url("https://localhost/"),
            "https://localhost"
        );
        assert_eq!(
            normalize_external_url("https://lab.example.com///"),
            "https://lab.example.com"
        );
    }

    #[test]
    fn external_url_without_trailing_slash_is_unchanged() {
        assert_eq!(
            normalize_external_url("https://localhost"),
            "https://localhost"
        );
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let config = EsxiConfig {
            vcenter_url: "https://vcenter.local".to_string(),
            vcenter_user: "svc-esxi".to_string(),
            vcenter_password: "supersecretpassword".to_string().into(),
            vcenter_library: "esxi".to_string(),
            images_dir: PathBuf::from("/opt/images/esxi"),
            external_url: "https://localhost".to_string(),
            auth_secret: "hmac-signing-secret".to_string().into(),
            http_timeout_secs: 300,
            task_retention_secs: 3600,
        };

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("supersecretpassword"));
        assert!(!rendered.contains("hmac-signing-secret"));
        assert!(rendered.contains("svc-esxi"));
    }
}
