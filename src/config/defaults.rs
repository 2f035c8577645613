//! Default configuration values and fixed names

/// Namespace of the anti-GC refs protecting base commits of layered deployments
pub const BASE_REF_PREFIX: &str = "rpmostree/base";

/// Namespace of the package cache refs
pub const PKG_REF_PREFIX: &str = "rpmostree/pkg";

/// Scratch ref cleared at the start of every cleanup pass
pub const TMP_BASE_REF: &str = "rpmostree/tmp/base";

/// Leftover checkout directory, relative to the repo
pub const TMP_ROOTFS_DIR: &str = "extensions/rpmostree/commit";

/// Section name of the origin document
pub const ORIGIN_SECTION: &str = "origin";

/// Refspec prefix selecting rojig mode
pub const ROJIG_PREFIX: &str = "rojig://";

/// Repository name of packages installed in a root
pub const SYSTEM_REPO_NAME: &str = "@System";

/// Length of a content checksum in hex characters
pub const CHECKSUM_LEN: usize = 64;

/// Number of checksum characters shown in tabular status
pub const CSUM_DISPLAY_LEN: usize = 10;

/// Default system root
pub const DEFAULT_SYSROOT: &str = "/";

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/treedeploy/config.toml";

/// Environment variable overriding the config file location
pub const ENV_CONFIG_PATH: &str = "TREEDEPLOY_CONFIG";

/// Namespace of the refs that keep deployed commits alive
pub const DEPLOY_REF_PREFIX: &str = "ostree/deploy/";
