use serde::{Deserialize, Serialize};

use crate::instance::{INSTANCE_LEN_V1, INSTANCE_LEN_V2};
use crate::metric::{METRIC_LEN_V1, METRIC_LEN_V2, MetricNameValidator};

/// On-disk format variant, selected once at writer construction.
///
/// Each variant supplies its own record sizes, name limits, and encode
/// rules; v1 inlines names into fixed-width fields while v2 interns them
/// into the string section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MmvVersion {
    V1,
    V2,
}

impl MmvVersion {
    /// The version number written into the region header.
    pub fn code(&self) -> u32 {
        match self {
            MmvVersion::V1 => 1,
            MmvVersion::V2 => 2,
        }
    }

    pub fn metric_record_len(&self) -> usize {
        match self {
            MmvVersion::V1 => METRIC_LEN_V1,
            MmvVersion::V2 => METRIC_LEN_V2,
        }
    }

    pub fn instance_record_len(&self) -> usize {
        match self {
            MmvVersion::V1 => INSTANCE_LEN_V1,
            MmvVersion::V2 => INSTANCE_LEN_V2,
        }
    }

    pub fn name_validator(&self) -> MetricNameValidator {
        match self {
            MmvVersion::V1 => MetricNameValidator::for_v1(),
            MmvVersion::V2 => MetricNameValidator::for_v2(),
        }
    }

    /// Whether metric and instance names live in the string section.
    pub(crate) fn interns_names(&self) -> bool {
        matches!(self, MmvVersion::V2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_are_version_exact() {
        assert_eq!(MmvVersion::V2.metric_record_len(), 48);
        assert_eq!(MmvVersion::V2.instance_record_len(), 24);
        assert_eq!(MmvVersion::V1.metric_record_len(), 104);
        assert_eq!(MmvVersion::V1.instance_record_len(), 80);
    }
}
