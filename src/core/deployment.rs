//! Deployment records
//!
//! A deployment is a bootable checkout of one commit for one OS name. It is
//! identified by `(osname, checksum, serial)`; the serial disambiguates
//! multiple checkouts of the same commit.

use serde::{Deserialize, Serialize};

use crate::config::defaults::CHECKSUM_LEN;
use crate::core::origin::OriginDescriptor;
use crate::error::DeploymentError;

/// Whether a deployment's `/usr` has been made writable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockedState {
    /// Read-only, the normal state
    #[default]
    None,
    /// Writable, persisting across reboots
    Hotfix,
    /// Writable overlay discarded on reboot
    Development,
}

impl UnlockedState {
    /// Display name used in status output
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hotfix => "hotfix",
            Self::Development => "development",
        }
    }
}

/// One bootable deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    osname: String,
    checksum: String,
    serial: u32,
    unlocked: UnlockedState,
    origin: OriginDescriptor,
}

/// Whether `s` is a 64-character lowercase hex checksum
pub fn is_valid_checksum(s: &str) -> bool {
    s.len() == CHECKSUM_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl DeploymentRecord {
    /// Create a deployment record
    ///
    /// # Arguments
    /// * `osname` - OS the deployment belongs to
    /// * `checksum` - Deployed commit, 64 lowercase hex characters
    /// * `serial` - Disambiguator among deployments of the same commit
    /// * `origin` - What the deployment tracks
    ///
    /// # Returns
    /// The record, or `InvalidChecksum` for a malformed checksum
    pub fn new(
        osname: &str,
        checksum: &str,
        serial: u32,
        origin: OriginDescriptor,
    ) -> Result<Self, DeploymentError> {
        if !is_valid_checksum(checksum) {
            return Err(DeploymentError::InvalidChecksum {
                checksum: checksum.to_string(),
            });
        }
        Ok(Self {
            osname: osname.to_string(),
            checksum: checksum.to_string(),
            serial,
            unlocked: UnlockedState::None,
            origin,
        })
    }

    /// Same record with a different unlocked state
    #[must_use]
    pub fn with_unlocked(mut self, unlocked: UnlockedState) -> Self {
        self.unlocked = unlocked;
        self
    }

    /// Same record with a different origin
    #[must_use]
    pub fn with_origin(mut self, origin: OriginDescriptor) -> Self {
        self.origin = origin;
        self
    }

    pub fn osname(&self) -> &str {
        &self.osname
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn unlocked(&self) -> UnlockedState {
        self.unlocked
    }

    /// Origin captured when the record was loaded
    ///
    /// Liveness and layering decisions must re-read the persisted origin
    /// through the sysroot instead.
    pub fn origin(&self) -> &OriginDescriptor {
        &self.origin
    }

    /// Stable identifier `osname-checksum.serial`
    pub fn id(&self) -> String {
        format!("{}-{}.{}", self.osname, self.checksum, self.serial)
    }

    /// Whether both records name the same deployment
    pub fn is_same(&self, other: &Self) -> bool {
        self.osname == other.osname && self.checksum == other.checksum && self.serial == other.serial
    }
}

/// Find a deployment by its id
pub fn find_by_id<'a>(
    deployments: &'a [DeploymentRecord],
    id: &str,
) -> Result<&'a DeploymentRecord, DeploymentError> {
    deployments
        .iter()
        .find(|d| d.id() == id)
        .ok_or_else(|| DeploymentError::NotFound { id: id.to_string() })
}

/// Find a deployment by a user-supplied index string
pub fn find_by_index<'a>(
    deployments: &'a [DeploymentRecord],
    index: &str,
) -> Result<&'a DeploymentRecord, DeploymentError> {
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DeploymentError::InvalidIndex {
            index: index.to_string(),
        });
    }
    let parsed: usize = index.parse().map_err(|_| DeploymentError::InvalidIndex {
        index: index.to_string(),
    })?;

    deployments
        .get(parsed)
        .ok_or(DeploymentError::IndexOutOfRange {
            index: parsed,
            len: deployments.len(),
        })
}

/// Deployment whose configuration a new deployment of `osname` inherits
///
/// The first deployment of that OS in boot order. The booted deployment
/// gets no preference, so a pending deployment's changes carry forward.
pub fn origin_merge_deployment<'a>(
    deployments: &'a [DeploymentRecord],
    osname: &str,
) -> Option<&'a DeploymentRecord> {
    deployments.iter().find(|d| d.osname() == osname)
}

/// Serial for a new deployment of `checksum` under `osname`
pub fn next_serial(deployments: &[DeploymentRecord], osname: &str, checksum: &str) -> u32 {
    deployments
        .iter()
        .filter(|d| d.osname() == osname && d.checksum() == checksum)
        .map(|d| d.serial() + 1)
        .max()
        .unwrap_or(0)
}
