// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Description of the application and device a crash or log entry came from.
//!
//! The crashtracker stamps this block into every crash record, and the file
//! logger uses the version/platform fields for its session marker.  Both
//! consume it through [`AppMetadataProvider`] so tests can substitute a
//! canned value.

use serde::{Deserialize, Serialize};

/// Identifying information about the running application and host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Human-facing application name.
    pub display_name: String,
    /// Marketing version, e.g. "2.1.0".
    pub short_version: String,
    /// Build number, e.g. "2104".
    pub build_version: String,
    /// Device or machine model.
    pub device_model: String,
    /// Operating system name.
    pub os_name: String,
    /// Operating system version.
    pub os_version: String,
}

impl AppMetadata {
    /// Renders the block attached to crash records.
    pub fn summary(&self) -> String {
        format!(
            "App: {} {}({})\nDevice:{}\nOS Version:{} {}",
            self.display_name,
            self.short_version,
            self.build_version,
            self.device_model,
            self.os_name,
            self.os_version,
        )
    }
}

/// Source of [`AppMetadata`].  Implementations must be pure: no side
/// effects, safe to call at any point before a fault.
pub trait AppMetadataProvider: Send + Sync {
    fn app_metadata(&self) -> AppMetadata;
}

/// Provider that takes the application fields from its constructor and
/// fills the OS fields from the host at call time.
pub struct HostMetadataProvider {
    display_name: String,
    short_version: String,
    build_version: String,
    device_model: String,
}

impl HostMetadataProvider {
    pub fn new(
        display_name: impl Into<String>,
        short_version: impl Into<String>,
        build_version: impl Into<String>,
        device_model: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            short_version: short_version.into(),
            build_version: build_version.into(),
            device_model: device_model.into(),
        }
    }
}

impl AppMetadataProvider for HostMetadataProvider {
    fn app_metadata(&self) -> AppMetadata {
        let info = os_info::get();
        AppMetadata {
            display_name: self.display_name.clone(),
            short_version: self.short_version.clone(),
            build_version: self.build_version.clone(),
            device_model: self.device_model.clone(),
            os_name: info.os_type().to_string(),
            os_version: info.version().to_string(),
        }
    }
}
