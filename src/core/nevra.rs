//! Package identities (name-epoch:version-release.arch)
//!
//! Parses NEVRA strings and derives the package cache ref name for a
//! package. The ref name is a pure function of the identity so lookups are
//! reproducible across runs.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::defaults::PKG_REF_PREFIX;
use crate::error::DeploymentError;

/// A fully qualified package identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nevra {
    /// Package name
    pub name: String,
    /// Epoch, 0 when absent
    pub epoch: u64,
    /// Upstream version
    pub version: String,
    /// Distribution release
    pub release: String,
    /// Architecture
    pub arch: String,
}

fn nevra_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>.+)-(?:(?P<epoch>[0-9]+):)?(?P<version>[^-:]+)-(?P<release>[^-:]+)\.(?P<arch>[^.\-:]+)$",
        )
        .ok()
    })
    .as_ref()
}

impl Nevra {
    /// Epoch-version-release; the epoch is omitted when zero
    pub fn evr(&self) -> String {
        if self.epoch > 0 {
            format!("{}:{}-{}", self.epoch, self.version, self.release)
        } else {
            format!("{}-{}", self.version, self.release)
        }
    }

    /// Package cache ref for this package
    ///
    /// Layout is `rpmostree/pkg/<name>/<evr>.<arch>` with each component
    /// quoted so the result is a valid ref name.
    pub fn cache_branch(&self) -> String {
        let mut out = String::from(PKG_REF_PREFIX);
        out.push('/');
        append_quoted(&mut out, &self.name);
        out.push('/');
        append_quoted(&mut out, &self.evr());
        out.push('.');
        append_quoted(&mut out, &self.arch);
        out
    }
}

/// Quote a ref component: `_` doubles, anything outside `[A-Za-z0-9.-]`
/// becomes `_XX`.
fn append_quoted(out: &mut String, value: &str) {
    for byte in value.bytes() {
        match byte {
            b'.' | b'-' => out.push(char::from(byte)),
            b'_' => out.push_str("__"),
            b if b.is_ascii_alphanumeric() => out.push(char::from(b)),
            b => out.push_str(&format!("_{b:02X}")),
        }
    }
}

impl FromStr for Nevra {
    type Err = DeploymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = nevra_regex()
            .and_then(|re| re.captures(s))
            .ok_or_else(|| DeploymentError::InvalidNevra {
                nevra: s.to_string(),
                reason: "expected name-[epoch:]version-release.arch".to_string(),
            })?;

        let epoch = match caps.name("epoch") {
            Some(m) => m
                .as_str()
                .parse::<u64>()
                .map_err(|e| DeploymentError::InvalidNevra {
                    nevra: s.to_string(),
                    reason: e.to_string(),
                })?,
            None => 0,
        };

        Ok(Self {
            name: caps["name"].to_string(),
            epoch,
            version: caps["version"].to_string(),
            release: caps["release"].to_string(),
            arch: caps["arch"].to_string(),
        })
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr(), self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_without_epoch() {
        let nevra: Nevra = "vim-enhanced-9.0.2081-1.fc39.x86_64".parse().unwrap();
        assert_eq!(nevra.name, "vim-enhanced");
        assert_eq!(nevra.epoch, 0);
        assert_eq!(nevra.version, "9.0.2081");
        assert_eq!(nevra.release, "1.fc39");
        assert_eq!(nevra.arch, "x86_64");
    }

    #[test]
    fn test_parse_with_epoch() {
        let nevra: Nevra = "vim-enhanced-2:9.0.2081-1.fc39.x86_64".parse().unwrap();
        assert_eq!(nevra.epoch, 2);
        assert_eq!(nevra.evr(), "2:9.0.2081-1.fc39");
        assert_eq!(nevra.to_string(), "vim-enhanced-2:9.0.2081-1.fc39.x86_64");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("vim".parse::<Nevra>().is_err());
        assert!("vim-9.0".parse::<Nevra>().is_err());
        assert!("".parse::<Nevra>().is_err());
    }

    #[test]
    fn test_cache_branch_quoting() {
        let nevra: Nevra = "foo_bar-1:1.0-1.fc39.x86_64".parse().unwrap();
        assert_eq!(
            nevra.cache_branch(),
            "rpmostree/pkg/foo__bar/1_3A1.0-1.fc39.x86__64"
        );
    }

    #[test]
    fn test_cache_branch_plus_in_name() {
        let nevra: Nevra = "libstdc++-13.2.1-4.fc39.x86_64".parse().unwrap();
        assert_eq!(
            nevra.cache_branch(),
            "rpmostree/pkg/libstdc_2B_2B/13.2.1-4.fc39.x86__64"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Display output parses back to the same identity
        #[test]
        fn prop_display_parses_back(
            name in "[a-z][a-z0-9+_-]{0,12}[a-z0-9]",
            epoch in 0u64..5,
            version in "[0-9][0-9.]{0,6}",
            release in "[0-9][a-z0-9.]{0,6}[a-z0-9]",
            arch in prop_oneof![Just("x86_64"), Just("aarch64"), Just("noarch")],
        ) {
            let nevra = Nevra {
                name,
                epoch,
                version,
                release,
                arch: arch.to_string(),
            };
            let parsed: Nevra = nevra.to_string().parse().unwrap();
            prop_assert_eq!(parsed.cache_branch(), nevra.cache_branch());
            prop_assert_eq!(parsed, nevra);
        }
    }
}
