//! Cache and compression policy for stateful arguments, and the debug
//! switches that override it.
use std::env;

use serde::{Deserialize, Serialize};

use crate::descriptor::{AddressingMode, ArgDescriptor};
use crate::surface::AuxMode;

/// Debug overrides applied on top of the policy a bind computes. The
/// defaults leave the computed policy untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub force_non_aux_mode: Option<bool>,
    pub disable_l3_for_stateful_args: bool,
    pub disable_compression: bool,
    pub force_addressing_mode: Option<AddressingMode>,
}

fn env_flag(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(s) => Some(s == "1"),
        Err(_) => None,
    }
}

impl DebugSettings {
    pub fn from_env() -> Self {
        let force_addressing_mode = match env::var("KERNEL_PAYLOAD_ADDRESSING_MODE") {
            Ok(s) => match serde_json::from_value(serde_json::Value::String(s.clone())) {
                Ok(mode) => Some(mode),
                Err(_) => {
                    log::warn!("ignoring unknown addressing mode {:?}", s);
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            force_non_aux_mode: env_flag("KERNEL_PAYLOAD_FORCE_NON_AUX"),
            disable_l3_for_stateful_args: env_flag("KERNEL_PAYLOAD_DISABLE_L3").unwrap_or(false),
            disable_compression: env_flag("KERNEL_PAYLOAD_DISABLE_COMPRESSION").unwrap_or(false),
            force_addressing_mode,
        }
    }
}

/// Which argument of the aux translation builtin is the compressed side.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxTranslationDirection {
    #[default]
    None,
    AuxToNonAux,
    NonAuxToAux,
}

impl AuxTranslationDirection {
    /// `(force_non_aux, disable_l3)` for argument `index` of an aux
    /// translation kernel, `None` for regular kernels.
    pub fn policy_for(self, index: u32) -> Option<(bool, bool)> {
        match self {
            AuxTranslationDirection::None => None,
            AuxTranslationDirection::AuxToNonAux => Some((index == 1, index == 0)),
            AuxTranslationDirection::NonAuxToAux => Some((index == 0, index == 0)),
        }
    }
}

/// Cache policy a surface state is programmed with; the device maps it to
/// a MOCS index.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum CacheUsage {
    Default,
    ReadOnly,
    L3Disabled,
    Uncached,
}

/// Properties of the memory object being bound that feed the policy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectPolicy {
    pub read_only: bool,
    pub uncacheable: bool,
    pub compressed: bool,
}

/// Surface programming decisions for one bind.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct SurfaceStateArgs {
    pub force_non_aux: bool,
    pub disable_l3: bool,
    pub read_only: bool,
    pub uncacheable: bool,
    pub compressed: bool,
}

impl SurfaceStateArgs {
    pub fn resolve(
        index: u32,
        arg: &ArgDescriptor,
        object: ObjectPolicy,
        direction: AuxTranslationDirection,
        settings: &DebugSettings,
    ) -> Self {
        let mut compressed = object.compressed;
        if settings.disable_compression && compressed {
            log::warn!("compression disabled for argument {}", index);
            compressed = false;
        }
        let (mut force_non_aux, mut disable_l3) = match direction.policy_for(index) {
            Some(p) => p,
            // stateless access cannot read compressed memory
            None => (compressed && !arg.pure_stateful, false),
        };
        if let Some(force) = settings.force_non_aux_mode {
            if force != force_non_aux {
                log::warn!("force_non_aux overridden to {} for argument {}", force, index);
            }
            force_non_aux = force;
        }
        if settings.disable_l3_for_stateful_args && !disable_l3 {
            log::warn!("L3 disabled for argument {}", index);
            disable_l3 = true;
        }
        Self {
            force_non_aux,
            disable_l3,
            read_only: arg.read_only || object.read_only,
            uncacheable: object.uncacheable,
            compressed,
        }
    }

    pub fn aux_mode(&self) -> AuxMode {
        if self.compressed && !self.force_non_aux {
            AuxMode::CcsE
        } else {
            AuxMode::None
        }
    }

    pub fn cache_usage(&self) -> CacheUsage {
        if self.uncacheable {
            CacheUsage::Uncached
        } else if self.disable_l3 {
            CacheUsage::L3Disabled
        } else if self.read_only {
            CacheUsage::ReadOnly
        } else {
            CacheUsage::Default
        }
    }
}
