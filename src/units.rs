use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// PhysicalQuantity – the quantities known to configuration and kernel units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalQuantity {
    Albedo,
    Angle,
    CollisionCoefficient,
    Dimensionless,
    Irradiance,
    Length,
    Pressure,
    Radiance,
    Reflectance,
    Temperature,
    Transmittance,
    Wavelength,
}

impl PhysicalQuantity {
    /// Unit in which bare numbers are interpreted in configuration.
    pub fn config_units(self) -> &'static str {
        use PhysicalQuantity::*;
        match self {
            Albedo | Dimensionless | Reflectance | Transmittance => "",
            Angle => "deg",
            CollisionCoefficient => "m^-1",
            Irradiance => "W/m^2/nm",
            Length => "m",
            Pressure => "Pa",
            Radiance => "W/m^2/sr/nm",
            Temperature => "K",
            Wavelength => "nm",
        }
    }

    /// Quantities a spectrum may carry.
    pub fn is_spectral(self) -> bool {
        use PhysicalQuantity::*;
        matches!(
            self,
            Albedo
                | CollisionCoefficient
                | Dimensionless
                | Irradiance
                | Radiance
                | Reflectance
                | Transmittance
        )
    }

    /// Conversion factor from `units` to the configuration unit.
    pub fn factor(self, units: &str) -> Result<f64> {
        use PhysicalQuantity::*;
        let units = units.trim();
        let factor = match (self, units) {
            (_, u) if u == self.config_units() => Some(1.0),
            (Albedo | Dimensionless | Reflectance | Transmittance, "dimensionless") => Some(1.0),
            (Angle, "degree") => Some(1.0),
            (Angle, "rad" | "radian") => Some(180.0 / std::f64::consts::PI),
            (Length, "km") => Some(1e3),
            (Length, "cm") => Some(1e-2),
            (Length, "mm") => Some(1e-3),
            (Wavelength, "um" | "micron") => Some(1e3),
            (Wavelength, "m") => Some(1e9),
            (CollisionCoefficient, "km^-1" | "1/km") => Some(1e-3),
            (CollisionCoefficient, "cm^-1" | "1/cm") => Some(1e2),
            (CollisionCoefficient, "1/m") => Some(1.0),
            (Pressure, "hPa") => Some(1e2),
            (Pressure, "atm") => Some(101_325.0),
            (Irradiance, "W/m^2/um") => Some(1e-3),
            (Radiance, "W/m^2/sr/um") => Some(1e-3),
            _ => None,
        };
        factor.ok_or_else(|| Error::Config(format!("unknown {self} units '{units}'")))
    }
}

impl fmt::Display for PhysicalQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Raw configuration values
// ---------------------------------------------------------------------------

/// Accepted spellings of a quantity in configuration:
/// `1.5`, `"1.5 km"`, `{ "value": 1.5, "units": "km" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(f64),
    Text(String),
    Object { value: f64, units: String },
}

impl RawQuantity {
    fn resolve(self, kind: PhysicalQuantity) -> Result<f64> {
        match self {
            RawQuantity::Number(v) => Ok(v),
            RawQuantity::Object { value, units } => Ok(value * kind.factor(&units)?),
            RawQuantity::Text(text) => {
                let text = text.trim();
                let (value, units) = match text.split_once(char::is_whitespace) {
                    Some((v, u)) => (v, u),
                    None => (text, ""),
                };
                let value: f64 = value
                    .parse()
                    .map_err(|_| Error::Config(format!("cannot parse quantity '{text}'")))?;
                if units.is_empty() {
                    Ok(value)
                } else {
                    Ok(value * kind.factor(units)?)
                }
            }
        }
    }
}

macro_rules! quantity {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
        pub struct $name(pub f64);

        impl $name {
            pub const KIND: PhysicalQuantity = $kind;

            pub fn new(value: f64) -> Self {
                Self(value)
            }

            /// Build from a magnitude expressed in `units`.
            pub fn from_units(value: f64, units: &str) -> Result<Self> {
                Ok(Self(value * Self::KIND.factor(units)?))
            }

            /// Magnitude in configuration units.
            pub fn value(self) -> f64 {
                self.0
            }

            /// Magnitude converted to `units`.
            pub fn to_units(self, units: &str) -> Result<f64> {
                Ok(self.0 / Self::KIND.factor(units)?)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_f64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                RawQuantity::deserialize(deserializer)?
                    .resolve(Self::KIND)
                    .map(Self)
                    .map_err(D::Error::custom)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.0, Self::KIND.config_units())
            }
        }
    };
}

quantity!(
    /// Length in metres.
    Length,
    PhysicalQuantity::Length
);
quantity!(
    /// Wavelength in nanometres.
    Wavelength,
    PhysicalQuantity::Wavelength
);
quantity!(
    /// Angle in degrees.
    Angle,
    PhysicalQuantity::Angle
);
quantity!(
    /// Collision coefficient in m^-1.
    CollisionCoefficient,
    PhysicalQuantity::CollisionCoefficient
);
quantity!(
    /// Pressure in pascals.
    Pressure,
    PhysicalQuantity::Pressure
);
quantity!(
    /// Temperature in kelvins.
    Temperature,
    PhysicalQuantity::Temperature
);

impl Length {
    pub fn km(value: f64) -> Self {
        Self(value * 1e3)
    }
}

impl Angle {
    pub fn to_radians(self) -> f64 {
        self.0.to_radians()
    }
}

/// Parse a quantity value out of a free-form JSON value.
pub fn quantity_from_value(kind: PhysicalQuantity, value: &serde_json::Value) -> Result<f64> {
    let raw = RawQuantity::deserialize(value)?;
    raw.resolve(kind)
}

// ---------------------------------------------------------------------------
// UnitContext – units used when writing kernel dictionaries
// ---------------------------------------------------------------------------

/// Kernel unit context. Only the length unit is configurable; collision
/// coefficients follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitContext {
    length_units: String,
    length_scale: f64,
}

impl Default for UnitContext {
    fn default() -> Self {
        Self {
            length_units: "m".to_string(),
            length_scale: 1.0,
        }
    }
}

impl UnitContext {
    pub fn with_length_units(units: &str) -> Result<Self> {
        let length_scale = PhysicalQuantity::Length.factor(units)?;
        Ok(Self {
            length_units: units.to_string(),
            length_scale,
        })
    }

    pub fn length_units(&self) -> &str {
        &self.length_units
    }

    /// Length magnitude in kernel units.
    pub fn length(&self, l: Length) -> f64 {
        l.0 / self.length_scale
    }

    /// Collision coefficient magnitude in kernel units.
    pub fn collision_coefficient(&self, c: CollisionCoefficient) -> f64 {
        c.0 * self.length_scale
    }

    /// Convert a magnitude in configuration units of `quantity` to kernel
    /// units.
    pub fn kernel_value(&self, quantity: PhysicalQuantity, value: f64) -> f64 {
        match quantity {
            PhysicalQuantity::Length => value / self.length_scale,
            PhysicalQuantity::CollisionCoefficient => value * self.length_scale,
            PhysicalQuantity::Irradiance | PhysicalQuantity::Radiance => {
                value * self.length_scale * self.length_scale
            }
            _ => value,
        }
    }
}
