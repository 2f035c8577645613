//! Live-modification state
//!
//! Reads the in-progress and replaced checksums from a deployment's
//! persisted origin. Setting them belongs to the live-apply path.

use crate::core::deployment::DeploymentRecord;
use crate::core::origin::LiveState;
use crate::error::Result;
use crate::infra::store::Sysroot;

/// Live state of `deployment`, from a single origin read
pub fn get_live(sysroot: &dyn Sysroot, deployment: &DeploymentRecord) -> Result<LiveState> {
    let origin = sysroot.read_origin(deployment)?;
    Ok(origin.live_state())
}

/// Whether `deployment` carries live modifications
pub fn is_live(sysroot: &dyn Sysroot, deployment: &DeploymentRecord) -> Result<bool> {
    Ok(get_live(sysroot, deployment)?.is_live())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::origin::OriginDescriptor;
    use crate::infra::memory::{MemoryRepo, MemorySysroot};
    use crate::infra::store::Commit;

    #[test]
    fn test_live_state_reads_persisted_origin() {
        let repo = MemoryRepo::new();
        let csum = repo.write_commit(Commit::default()).unwrap();
        let sysroot = MemorySysroot::new(repo);

        let origin = OriginDescriptor::new("fedora:fedora/39".parse().unwrap());
        let d = DeploymentRecord::new("fedora", &csum, 0, origin.clone()).unwrap();
        sysroot.add_deployment(d.clone(), true);
        assert!(!is_live(&sysroot, &d).unwrap());

        // The record's captured origin is stale; the persisted one wins
        let mut updated = origin;
        updated.live_inprogress = Some("a".repeat(64));
        sysroot.set_origin(&d, updated);

        let state = get_live(&sysroot, &d).unwrap();
        assert_eq!(state.inprogress, Some("a".repeat(64)));
        assert_eq!(state.replaced, None);
        assert!(is_live(&sysroot, &d).unwrap());
    }
}
