//! Origin descriptors
//!
//! An origin records what a deployment *should* track: the base refspec,
//! requested package layering, base overrides, initramfs settings and any
//! live-modification state. It is persisted as a TOML document with a
//! single `[origin]` table.
//!
//! Optional collections are `Option`s so that an explicitly empty list and
//! an absent key survive a round-trip as different values.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::defaults::{ORIGIN_SECTION, ROJIG_PREFIX};
use crate::core::deployment::is_valid_checksum;
use crate::error::OriginError;

/// Kind of a [`Refspec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefspecType {
    /// A plain ostree ref, optionally remote-qualified
    Ostree,
    /// A rojig package-delivered tree
    Rojig,
    /// A pinned commit checksum
    Checksum,
}

/// What a deployment tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Refspec {
    /// `[remote:]ref`
    Ostree(String),
    /// `rojig://[remote:]package`
    Rojig(String),
    /// A 64-character commit checksum
    Checksum(String),
}

impl Refspec {
    /// The refspec kind
    pub fn kind(&self) -> RefspecType {
        match self {
            Self::Ostree(_) => RefspecType::Ostree,
            Self::Rojig(_) => RefspecType::Rojig,
            Self::Checksum(_) => RefspecType::Checksum,
        }
    }

    /// Remote name, if the refspec is remote-qualified
    pub fn remote(&self) -> Option<&str> {
        match self {
            Self::Ostree(r) | Self::Rojig(r) => r.split_once(':').map(|(remote, _)| remote),
            Self::Checksum(_) => None,
        }
    }

    /// Whether garbage collection needs the full installed package set
    pub fn requires_package_enumeration(&self) -> bool {
        matches!(self, Self::Rojig(_))
    }
}

impl FromStr for Refspec {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| OriginError::InvalidRefspec {
            refspec: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("empty refspec"));
        }
        if let Some(rest) = s.strip_prefix(ROJIG_PREFIX) {
            if rest.is_empty() {
                return Err(invalid("empty rojig package"));
            }
            return Ok(Self::Rojig(rest.to_string()));
        }
        if is_valid_checksum(s) {
            return Ok(Self::Checksum(s.to_string()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(invalid("whitespace in ref"));
        }
        if s.ends_with(':') || s.starts_with(':') {
            return Err(invalid("empty remote or ref"));
        }
        Ok(Self::Ostree(s.to_string()))
    }
}

impl TryFrom<String> for Refspec {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Refspec> for String {
    fn from(value: Refspec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ostree(r) | Self::Checksum(r) => f.write_str(r),
            Self::Rojig(r) => write!(f, "{ROJIG_PREFIX}{r}"),
        }
    }
}

/// Live-modification checksums of a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveState {
    /// Commit a live apply is currently writing
    pub inprogress: Option<String>,
    /// Commit that replaced the deployment's content at runtime
    pub replaced: Option<String>,
}

impl LiveState {
    /// Whether either checksum is present
    pub fn is_live(&self) -> bool {
        self.inprogress.is_some() || self.replaced.is_some()
    }
}

/// Parsed origin of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginDescriptor {
    /// Base to track
    pub refspec: Refspec,

    /// Requested packages, by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<BTreeSet<String>>,

    /// Requested locally-cached packages, by NEVRA
    #[serde(
        rename = "local-packages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub local_packages: Option<BTreeSet<String>>,

    /// Base packages to remove, by name
    #[serde(
        rename = "override-remove",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub overrides_remove: Option<BTreeSet<String>>,

    /// Local packages replacing base packages, by NEVRA
    #[serde(
        rename = "override-replace-local",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub overrides_local_replace: Option<BTreeSet<String>>,

    /// Regenerate the initramfs client-side
    #[serde(rename = "initramfs-regenerate", default)]
    pub regenerate_initramfs: bool,

    /// Extra initramfs arguments, in order
    #[serde(
        rename = "initramfs-args",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub initramfs_args: Option<Vec<String>>,

    /// Commit being written by an in-progress live apply
    #[serde(
        rename = "live-inprogress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub live_inprogress: Option<String>,

    /// Commit that replaced the content at runtime
    #[serde(
        rename = "live-replaced",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub live_replaced: Option<String>,
}

#[derive(Serialize)]
struct OriginDocumentRef<'a> {
    origin: &'a OriginDescriptor,
}

impl OriginDescriptor {
    /// Origin tracking `refspec` with nothing layered
    pub fn new(refspec: Refspec) -> Self {
        Self {
            refspec,
            packages: None,
            local_packages: None,
            overrides_remove: None,
            overrides_local_replace: None,
            regenerate_initramfs: false,
            initramfs_args: None,
            live_inprogress: None,
            live_replaced: None,
        }
    }

    /// Parse a persisted origin document
    pub fn from_toml(content: &str) -> Result<Self, OriginError> {
        let mut table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| OriginError::Parse(e.to_string()))?;

        let section = table
            .remove(ORIGIN_SECTION)
            .ok_or_else(|| OriginError::MissingSection {
                section: ORIGIN_SECTION.to_string(),
            })?;

        if section.get("refspec").is_none() {
            return Err(OriginError::MissingKey {
                key: "refspec".to_string(),
            });
        }

        section
            .try_into()
            .map_err(|e: toml::de::Error| OriginError::Parse(e.to_string()))
    }

    /// Serialize to a persisted origin document
    pub fn to_toml(&self) -> Result<String, OriginError> {
        toml::to_string_pretty(&OriginDocumentRef { origin: self })
            .map_err(|e| OriginError::Serialize(e.to_string()))
    }

    /// Live-modification state recorded in this origin
    pub fn live_state(&self) -> LiveState {
        LiveState {
            inprogress: self.live_inprogress.clone(),
            replaced: self.live_replaced.clone(),
        }
    }

    /// Requested packages, empty when absent
    pub fn requested_packages(&self) -> Vec<String> {
        set_to_vec(self.packages.as_ref())
    }

    /// Requested local packages, empty when absent
    pub fn requested_local_packages(&self) -> Vec<String> {
        set_to_vec(self.local_packages.as_ref())
    }

    /// Requested base removals, empty when absent
    pub fn requested_removals(&self) -> Vec<String> {
        set_to_vec(self.overrides_remove.as_ref())
    }

    /// Requested local replacements, empty when absent
    pub fn requested_local_replacements(&self) -> Vec<String> {
        set_to_vec(self.overrides_local_replace.as_ref())
    }

    /// Whether the deployment needs client-side assembly on top of its base
    ///
    /// Local replacements only take effect through layering, so a plain
    /// ostree-ref origin with replacements still counts as layered.
    pub fn requires_layering(&self) -> bool {
        let non_empty = |set: &Option<BTreeSet<String>>| set.as_ref().is_some_and(|s| !s.is_empty());
        non_empty(&self.packages)
            || non_empty(&self.local_packages)
            || non_empty(&self.overrides_remove)
            || non_empty(&self.overrides_local_replace)
            || self.regenerate_initramfs
    }
}

fn set_to_vec(set: Option<&BTreeSet<String>>) -> Vec<String> {
    set.map(|s| s.iter().cloned().collect()).unwrap_or_default()
}
