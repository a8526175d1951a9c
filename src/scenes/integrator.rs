//! Integrators: the kernel's light transport algorithms.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::kernel::KernelDict;
use crate::scenes::core::{from_config_via_serde, tagged_config, FromConfig, KernelDictContext, SceneElement};

pub trait Integrator: SceneElement {
    /// Kernel plugin name.
    fn plugin(&self) -> &'static str;
}

/// Parameters shared by all path tracers. Unset values are left to the
/// kernel's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratorParams {
    #[serde(default = "default_id")]
    pub id: String,
    /// Longest path depth; -1 means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<i64>,
    /// Depth at which Russian roulette starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rr_depth: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_emitters: Option<bool>,
}

fn default_id() -> String {
    "integrator".to_string()
}

impl Default for IntegratorParams {
    fn default() -> Self {
        Self {
            id: default_id(),
            max_depth: None,
            rr_depth: None,
            hide_emitters: None,
        }
    }
}

impl IntegratorParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth.is_some_and(|d| d < -1) {
            return Err(Error::validation("integrator: max_depth must be -1 or positive"));
        }
        if self.rr_depth.is_some_and(|d| d <= 0) {
            return Err(Error::validation("integrator: rr_depth must be strictly positive"));
        }
        Ok(())
    }

    fn kernel_dict(&self, plugin: &str) -> KernelDict {
        let mut d = json!({ "type": plugin });
        if let Some(obj) = d.as_object_mut() {
            if let Some(v) = self.max_depth {
                obj.insert("max_depth".into(), json!(v));
            }
            if let Some(v) = self.rr_depth {
                obj.insert("rr_depth".into(), json!(v));
            }
            if let Some(v) = self.hide_emitters {
                obj.insert("hide_emitters".into(), json!(v));
            }
        }
        KernelDict::from_pairs([(self.id.clone(), d)])
    }
}

macro_rules! integrator {
    ($(#[$meta:meta])* $name:ident, $type_id:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub IntegratorParams);

        impl $name {
            pub fn validate(&self) -> Result<()> {
                self.0.validate()
            }
        }

        impl SceneElement for $name {
            fn id(&self) -> &str {
                &self.0.id
            }

            fn kernel_dict(&self, _ctx: &KernelDictContext) -> Result<KernelDict> {
                Ok(self.0.kernel_dict($type_id))
            }

            fn to_config(&self) -> Result<Value> {
                tagged_config($type_id, self)
            }
        }

        impl Integrator for $name {
            fn plugin(&self) -> &'static str {
                $type_id
            }
        }
    };
}

integrator!(
    /// Path tracer for surfaces only.
    PathIntegrator,
    "path"
);
integrator!(
    /// Volumetric path tracer.
    VolPathIntegrator,
    "volpath"
);
integrator!(
    /// Volumetric path tracer with spectral multiple importance sampling.
    VolPathMisIntegrator,
    "volpathmis"
);

from_config_via_serde!(PathIntegrator, VolPathIntegrator, VolPathMisIntegrator);

fn ctor<I: Integrator + FromConfig + 'static>(config: &Value) -> Result<Box<dyn Integrator>> {
    Ok(Box::new(I::from_config(config)?))
}

/// Process-wide integrator factory.
pub fn integrator_factory() -> &'static Factory<dyn Integrator> {
    static FACTORY: OnceLock<Factory<dyn Integrator>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let f = Factory::new("integrator");
        for (type_id, c) in [
            ("path", ctor::<PathIntegrator> as fn(&Value) -> Result<Box<dyn Integrator>>),
            ("volpath", ctor::<VolPathIntegrator>),
            ("volpathmis", ctor::<VolPathMisIntegrator>),
        ] {
            if let Err(e) = f.register(type_id, c) {
                log::error!("{e}");
            }
        }
        f
    })
}
