//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use crate::core::deployment::DeploymentRecord;
    use crate::core::origin::{OriginDescriptor, Refspec};

    /// Generate a valid commit checksum (64 lowercase hex characters)
    pub fn checksum() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate an OS name from a small pool so lists share osnames
    pub fn osname() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("fedora".to_string()),
            Just("centos".to_string()),
            Just("rhcos".to_string()),
        ]
    }

    /// Generate a NEVRA string, with or without an epoch
    pub fn nevra() -> impl Strategy<Value = String> {
        (
            "[a-z][a-z0-9]{1,8}",
            prop::option::of(1u32..4),
            "[0-9]{1,2}\\.[0-9]{1,2}",
            "[0-9]{1,2}\\.fc3[89]",
            prop_oneof![Just("x86_64"), Just("aarch64"), Just("noarch")],
        )
            .prop_map(|(name, epoch, version, release, arch)| match epoch {
                Some(epoch) => format!("{name}-{epoch}:{version}-{release}.{arch}"),
                None => format!("{name}-{version}-{release}.{arch}"),
            })
    }

    /// Generate a refspec of any kind
    pub fn refspec() -> impl Strategy<Value = Refspec> {
        prop_oneof![
            ("[a-z]{2,6}", "[a-z0-9]{1,6}(/[a-z0-9_]{1,6}){0,3}")
                .prop_map(|(remote, r)| Refspec::Ostree(format!("{remote}:{r}"))),
            "[a-z0-9]{1,6}(/[a-z0-9]{1,6}){0,2}".prop_map(Refspec::Ostree),
            ("[a-z]{2,6}", "[a-z][a-z-]{0,10}")
                .prop_map(|(remote, pkg)| Refspec::Rojig(format!("{remote}:{pkg}"))),
            checksum().prop_map(Refspec::Checksum),
        ]
    }

    fn name_set() -> impl Strategy<Value = Option<BTreeSet<String>>> {
        prop::option::of(prop::collection::btree_set("[a-z][a-z0-9-]{0,8}", 0..4))
    }

    fn nevra_set() -> impl Strategy<Value = Option<BTreeSet<String>>> {
        prop::option::of(prop::collection::btree_set(nevra(), 0..3))
    }

    /// Generate an origin descriptor with every field independently set
    pub fn origin_descriptor() -> impl Strategy<Value = OriginDescriptor> {
        (
            refspec(),
            name_set(),
            nevra_set(),
            name_set(),
            nevra_set(),
            any::<bool>(),
            prop::option::of(prop::collection::vec("--?[a-zA-Z][a-zA-Z0-9=/]{0,10}", 0..3)),
            prop::option::of(checksum()),
            prop::option::of(checksum()),
        )
            .prop_map(
                |(
                    refspec,
                    packages,
                    local_packages,
                    overrides_remove,
                    overrides_local_replace,
                    regenerate_initramfs,
                    initramfs_args,
                    live_inprogress,
                    live_replaced,
                )| OriginDescriptor {
                    refspec,
                    packages,
                    local_packages,
                    overrides_remove,
                    overrides_local_replace,
                    regenerate_initramfs,
                    initramfs_args,
                    live_inprogress,
                    live_replaced,
                },
            )
    }

    /// Generate a boot list with unique ids plus an optional booted index
    pub fn deployment_list() -> impl Strategy<Value = (Vec<DeploymentRecord>, Option<usize>)> {
        prop::collection::vec((osname(), 0u8..3), 1..8).prop_flat_map(|specs| {
            let len = specs.len();
            let records: Vec<DeploymentRecord> = specs
                .iter()
                .zip(0u32..)
                .map(|((os, fill), serial)| {
                    DeploymentRecord::new(
                        os,
                        &format!("{fill:064x}"),
                        serial,
                        OriginDescriptor::new(Refspec::Ostree(format!("{os}:{os}/stable"))),
                    )
                    .expect("generated deployment should be valid")
                })
                .collect();
            (Just(records), prop::option::of(0..len))
        })
    }

    /// Which base, if any, each deployment in a list is layered on
    #[derive(Debug, Clone)]
    pub struct LayeringPlan {
        /// Number of distinct base commits
        pub base_count: usize,
        /// Per deployment: index of its base, or `None` for unlayered
        pub entries: Vec<Option<usize>>,
    }

    /// Generate a layering plan over up to three bases
    pub fn layering_plan() -> impl Strategy<Value = LayeringPlan> {
        (
            1usize..4,
            prop::collection::vec(prop::option::of(0usize..4), 0..8),
        )
            .prop_map(|(base_count, entries)| LayeringPlan {
                base_count,
                entries,
            })
    }

    /// Generate cached packages and the installed set of one deployment,
    /// drawn from a shared pool
    pub fn package_universe() -> impl Strategy<Value = (Vec<String>, BTreeSet<String>)> {
        prop::collection::btree_set(nevra(), 1..10).prop_flat_map(|pool| {
            let pool: Vec<String> = pool.into_iter().collect();
            let len = pool.len();
            (
                prop::sample::subsequence(pool.clone(), 0..=len),
                prop::sample::subsequence(pool, 0..=len)
                    .prop_map(|installed| installed.into_iter().collect::<BTreeSet<_>>()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::deployment::is_valid_checksum;
    use crate::core::nevra::Nevra;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_checksum_generator(csum in checksum()) {
            prop_assert!(is_valid_checksum(&csum));
        }

        #[test]
        fn test_nevra_generator(nevra in nevra()) {
            prop_assert!(nevra.parse::<Nevra>().is_ok());
        }

        #[test]
        fn test_deployment_list_ids_unique((list, booted) in deployment_list()) {
            let mut ids: Vec<String> = list.iter().map(|d| d.id()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), list.len());
            if let Some(i) = booted {
                prop_assert!(i < list.len());
            }
        }
    }
}
