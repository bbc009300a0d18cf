//! Target profiles: which context layout and TCB offsets apply to a core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RtosError};
use crate::stacking::riot::{RIOT_CORTEX_M0_STACKING, RIOT_CORTEX_M3_STACKING};
use crate::stacking::StackingDescriptor;

/// CPU core families RIOT thread awareness understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchitectureVariant {
    /// ARMv6-M: Cortex-M0, Cortex-M0+.
    CortexM0,
    /// ARMv7-M / ARMv7E-M: Cortex-M3, Cortex-M4, Cortex-M7.
    CortexM3,
}

impl fmt::Display for ArchitectureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CortexM0 => write!(f, "Cortex-M0 (ARMv6-M)"),
            Self::CortexM3 => write!(f, "Cortex-M3/M4 (ARMv7-M)"),
        }
    }
}

impl FromStr for ArchitectureVariant {
    type Err = RtosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "cortex-m0" | "cortex-m0+" | "cortex-m0plus" | "armv6m" | "armv6-m" => {
                Ok(Self::CortexM0)
            }
            "cortex-m3" | "cortex-m4" | "cortex-m7" | "armv7m" | "armv7-m" | "armv7em"
            | "armv7e-m" => Ok(Self::CortexM3),
            _ => Err(RtosError::UnsupportedArchitecture(s.to_string())),
        }
    }
}

#[cfg(feature = "hardware")]
impl TryFrom<probe_rs::CoreType> for ArchitectureVariant {
    type Error = RtosError;

    fn try_from(core_type: probe_rs::CoreType) -> Result<Self> {
        use probe_rs::CoreType;
        match core_type {
            CoreType::Armv6m => Ok(Self::CortexM0),
            CoreType::Armv7m | CoreType::Armv7em => Ok(Self::CortexM3),
            other => Err(RtosError::UnsupportedArchitecture(format!("{other:?}"))),
        }
    }
}

/// Per-core facts needed to read RIOT's thread control blocks.
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile {
    /// Core family this profile applies to.
    pub variant: ArchitectureVariant,
    /// Offset of the saved stack pointer in `thread_t`.
    pub thread_sp_offset: u32,
    /// Offset of the status field in `thread_t`.
    pub thread_status_offset: u32,
    /// Context layout left on the thread's stack.
    pub stacking: &'static StackingDescriptor,
}

static PROFILES: [TargetProfile; 2] = [
    TargetProfile {
        variant: ArchitectureVariant::CortexM0,
        thread_sp_offset: 0x00,
        thread_status_offset: 0x04,
        stacking: &RIOT_CORTEX_M0_STACKING,
    },
    TargetProfile {
        variant: ArchitectureVariant::CortexM3,
        thread_sp_offset: 0x00,
        thread_status_offset: 0x04,
        stacking: &RIOT_CORTEX_M3_STACKING,
    },
];

impl TargetProfile {
    /// Select the profile for `variant`.
    pub fn resolve(variant: ArchitectureVariant) -> Result<&'static Self> {
        PROFILES
            .iter()
            .find(|p| p.variant == variant)
            .ok_or_else(|| RtosError::UnsupportedArchitecture(variant.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_a_profile() {
        for variant in [ArchitectureVariant::CortexM0, ArchitectureVariant::CortexM3] {
            let profile = TargetProfile::resolve(variant).unwrap();
            assert_eq!(profile.variant, variant);
            assert_eq!(profile.thread_sp_offset, 0x00);
            assert_eq!(profile.thread_status_offset, 0x04);
        }
    }

    #[test]
    fn test_variants_use_distinct_layouts() {
        let m0 = TargetProfile::resolve(ArchitectureVariant::CortexM0).unwrap();
        let m3 = TargetProfile::resolve(ArchitectureVariant::CortexM3).unwrap();
        assert!(!std::ptr::eq(m0.stacking, m3.stacking));
        assert_eq!(m0.stacking.frame_size, m3.stacking.frame_size);
    }

    #[test]
    fn test_parse_names() {
        let cases = [
            ("cortex-m0+", ArchitectureVariant::CortexM0),
            ("ARMv6M", ArchitectureVariant::CortexM0),
            ("cortex_m4", ArchitectureVariant::CortexM3),
            ("armv7em", ArchitectureVariant::CortexM3),
        ];
        for (name, expected) in cases {
            assert_eq!(name.parse::<ArchitectureVariant>().unwrap(), expected);
        }
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let err = "riscv32".parse::<ArchitectureVariant>().unwrap_err();
        assert!(matches!(err, RtosError::UnsupportedArchitecture(name) if name == "riscv32"));
    }

    #[cfg(feature = "hardware")]
    #[test]
    fn test_core_type_detection() {
        use probe_rs::CoreType;
        let detect = |core: CoreType| ArchitectureVariant::try_from(core).unwrap();
        assert_eq!(detect(CoreType::Armv6m), ArchitectureVariant::CortexM0);
        assert_eq!(detect(CoreType::Armv7em), ArchitectureVariant::CortexM3);
        assert!(ArchitectureVariant::try_from(CoreType::Riscv).is_err());
    }
}
