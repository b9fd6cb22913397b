use std::fmt;

use crate::{HarvestItem, HarvestState};

/// Capability version of a worker build.
///
/// A major bump means output of every earlier worker is stale, so even
/// finished items get redone. A minor bump only retries items that failed
/// under an older minor version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HarvesterVersion {
    pub major: u32,
    pub minor: u32,
}

impl HarvesterVersion {
    pub const CURRENT: HarvesterVersion = HarvesterVersion { major: 1, minor: 2 };

    pub fn needs_harvest(&self, item: &HarvestItem) -> bool {
        match item.harvest_state {
            None | Some(HarvestState::New) | Some(HarvestState::Updated) | Some(HarvestState::Requested) => true,
            // another worker owns it (or crashed); the external scheduler decides
            Some(HarvestState::InProgress) | Some(HarvestState::Unknown) => false,
            Some(HarvestState::Done) => item.harvester_major_version < self.major,
            Some(HarvestState::Failed) => {
                item.harvester_major_version < self.major
                    || (item.harvester_major_version == self.major && item.harvester_minor_version < self.minor)
            }
        }
    }
}

impl fmt::Display for HarvesterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(state: HarvestState, major: u32, minor: u32) -> HarvestItem {
        HarvestItem {
            harvest_state: Some(state),
            harvester_major_version: major,
            harvester_minor_version: minor,
            ..Default::default()
        }
    }

    #[test]
    fn requests_always_need_harvest() {
        let v = HarvesterVersion { major: 2, minor: 0 };
        assert!(v.needs_harvest(&HarvestItem::default()));
        assert!(v.needs_harvest(&item(HarvestState::New, 9, 9)));
        assert!(v.needs_harvest(&item(HarvestState::Updated, 2, 0)));
    }

    #[test]
    fn done_redone_only_on_major_bump() {
        let v = HarvesterVersion { major: 2, minor: 3 };
        assert!(v.needs_harvest(&item(HarvestState::Done, 1, 9)));
        assert!(!v.needs_harvest(&item(HarvestState::Done, 2, 0)));
    }

    #[test]
    fn failed_retried_on_minor_bump() {
        let v = HarvesterVersion { major: 2, minor: 3 };
        assert!(v.needs_harvest(&item(HarvestState::Failed, 2, 2)));
        assert!(!v.needs_harvest(&item(HarvestState::Failed, 2, 3)));
        assert!(v.needs_harvest(&item(HarvestState::Failed, 1, 5)));
    }

    #[test]
    fn in_progress_is_left_alone() {
        let v = HarvesterVersion::CURRENT;
        assert!(!v.needs_harvest(&item(HarvestState::InProgress, 0, 0)));
    }
}
