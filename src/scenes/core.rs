use std::fmt;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::kernel::KernelDict;
use crate::mode::SpectralContext;
use crate::units::{Length, UnitContext};

// ---------------------------------------------------------------------------
// SceneElement
// ---------------------------------------------------------------------------

/// A configurable component of a scene which knows how to describe itself
/// to the rendering kernel.
pub trait SceneElement: fmt::Debug + Send + Sync {
    /// Identifier used as the element's kernel dictionary key.
    fn id(&self) -> &str;

    /// Kernel dictionary representation in the given context.
    fn kernel_dict(&self, ctx: &KernelDictContext) -> Result<KernelDict>;

    /// Configuration descriptor (with its `type` tag) from which the
    /// element's factory rebuilds an equivalent element.
    fn to_config(&self) -> Result<Value>;
}

/// Construction from a configuration object.
pub trait FromConfig: Sized {
    fn from_config(config: &Value) -> Result<Self>;
}

/// Implement [`FromConfig`] by deserializing with serde, then calling the
/// type's inherent `validate()`.
macro_rules! from_config_via_serde {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::scenes::core::FromConfig for $ty {
                fn from_config(config: &serde_json::Value) -> $crate::error::Result<Self> {
                    let this = <$ty as serde::Deserialize>::deserialize(config)?;
                    this.validate()?;
                    Ok(this)
                }
            }
        )+
    };
}
pub(crate) use from_config_via_serde;

/// Serialize `element` and attach its `type` tag.
pub(crate) fn tagged_config<S: Serialize>(type_id: &str, element: &S) -> Result<Value> {
    crate::factory::tagged(type_id, serde_json::to_value(element)?)
}

// ---------------------------------------------------------------------------
// KernelDictContext
// ---------------------------------------------------------------------------

/// Parameters relevant to kernel dictionary generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelDictContext {
    pub spectral_ctx: SpectralContext,
    /// Emit references to shared objects instead of inlining them.
    pub use_refs: bool,
    /// Forces the width of surfaces and canopies.
    pub override_scene_width: Option<Length>,
    pub units: UnitContext,
}

impl KernelDictContext {
    pub fn new(spectral_ctx: SpectralContext) -> Self {
        Self {
            spectral_ctx,
            ..Default::default()
        }
    }

    pub fn with_refs(mut self, use_refs: bool) -> Self {
        self.use_refs = use_refs;
        self
    }

    pub fn with_scene_width(mut self, width: Option<Length>) -> Self {
        self.override_scene_width = width;
        self
    }

    pub fn with_units(mut self, units: UnitContext) -> Self {
        self.units = units;
        self
    }
}

// ---------------------------------------------------------------------------
// Auto – a value resolved during kernel dictionary generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Auto<T> {
    Auto,
    Value(T),
}

impl<T> Default for Auto<T> {
    fn default() -> Self {
        Auto::Auto
    }
}

impl<T> Auto<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Auto::Auto)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Auto::Auto => None,
            Auto::Value(v) => Some(v),
        }
    }
}

impl<T: Copy> Auto<T> {
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Auto::Auto => default,
            Auto::Value(v) => v,
        }
    }
}

impl<T: Serialize> Serialize for Auto<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Auto::Auto => serializer.serialize_str("auto"),
            Auto::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Auto<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        if raw.as_str().is_some_and(|s| s.eq_ignore_ascii_case("auto")) {
            return Ok(Auto::Auto);
        }
        T::deserialize(raw).map(Auto::Value).map_err(D::Error::custom)
    }
}
