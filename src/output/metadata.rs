//! Information about the program and platform, stored alongside the results of a calculation.
use anyhow::{Result, anyhow};
use chrono::prelude::*;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::{Deserialize, Serialize};

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Get information about program version from git
fn get_git_hash() -> String {
    let Some(hash) = built_info::GIT_COMMIT_HASH_SHORT else {
        return "unknown".into();
    };

    if built_info::GIT_DIRTY == Some(true) {
        format!("{hash}-dirty")
    } else {
        hash.into()
    }
}

/// Metadata written to the info document of a calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the results were saved
    pub saved_at: String,
    /// Information about the program
    pub program: ProgramMetadata,
    /// Information about the platform
    pub platform: PlatformMetadata,
}

impl Metadata {
    /// Collect the metadata for the running program
    pub fn collect() -> Result<Self> {
        Ok(Self {
            saved_at: Local::now().to_rfc2822(),
            program: ProgramMetadata::default(),
            platform: PlatformMetadata::collect()?,
        })
    }
}

/// Information about the program build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMetadata {
    /// The program name
    pub name: String,
    /// The program version as specified in Cargo.toml
    pub version: String,
    /// The target architecture for the build (e.g. x86_64-unknown-linux-gnu)
    pub target: String,
    /// Whether it is a debug build
    pub is_debug: bool,
    /// The version of rustc used to compile the program
    pub rustc_version: String,
    /// When the program was built
    pub build_time_utc: String,
    /// The git commit hash of the build (if known)
    pub git_commit_hash: String,
}

impl Default for ProgramMetadata {
    fn default() -> Self {
        Self {
            name: built_info::PKG_NAME.into(),
            version: built_info::PKG_VERSION.into(),
            target: built_info::TARGET.into(),
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION.into(),
            build_time_utc: built_info::BUILT_TIME_UTC.into(),
            git_commit_hash: get_git_hash(),
        }
    }
}

/// Information about the platform the program is running on.
///
/// The fields correspond to different data available from the [`PlatformInfo`] struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetadata {
    sysname: String,
    nodename: String,
    release: String,
    version: String,
    machine: String,
    osname: String,
}

impl PlatformMetadata {
    fn collect() -> Result<Self> {
        let info =
            PlatformInfo::new().map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;

        Ok(Self {
            sysname: info.sysname().to_string_lossy().into(),
            nodename: info.nodename().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            version: info.version().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            osname: info.osname().to_string_lossy().into(),
        })
    }
}
