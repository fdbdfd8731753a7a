//! Boot catalog types
//!
//! A configuration is a named, already rendered boot profile bound to exactly
//! one bootloader. Both are loaded from the daemon configuration and are
//! read-only afterwards.

use serde::{Deserialize, Serialize};

/// A network bootloader served from the TFTP root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootloader {
    /// Unique bootloader name (e.g. `pxelinux`)
    pub name: String,

    /// Bootloader image, relative to the TFTP root (e.g. `pxelinux.0`)
    pub file: String,

    /// Directory, relative to the TFTP root, holding per-host config files
    pub config_path: String,
}

/// A named boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Unique configuration name
    pub name: String,

    /// Name of the bootloader this configuration is written for
    pub bootloader: String,

    /// Rendered configuration file content
    pub content: String,
}
