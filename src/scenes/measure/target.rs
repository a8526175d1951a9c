//! Ray targets of distant measures.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::kernel::{Transform4, Vector3};
use crate::scenes::core::KernelDictContext;
use crate::units::Length;

/// Region of the scene targeted by the rays a distant sensor traces.
///
/// Deserializes from `{"type": "point", "xyz": [...]}`, from a bare
/// 3-vector (a point) or from
/// `{"type": "rectangle", "xmin", "xmax", "ymin", "ymax", "z"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Point {
        xyz: [Length; 3],
    },
    /// Axis-aligned horizontal rectangle.
    Rectangle {
        xmin: Length,
        xmax: Length,
        ymin: Length,
        ymax: Length,
        z: Length,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TargetDef {
    Point {
        xyz: [Length; 3],
    },
    Rectangle {
        xmin: Length,
        xmax: Length,
        ymin: Length,
        ymax: Length,
        #[serde(default)]
        z: Length,
    },
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(d)?;
        let target = if raw.is_array() {
            let xyz = <[Length; 3]>::deserialize(&raw).map_err(D::Error::custom)?;
            Target::Point { xyz }
        } else {
            match TargetDef::deserialize(&raw).map_err(D::Error::custom)? {
                TargetDef::Point { xyz } => Target::Point { xyz },
                TargetDef::Rectangle {
                    xmin,
                    xmax,
                    ymin,
                    ymax,
                    z,
                } => Target::Rectangle {
                    xmin,
                    xmax,
                    ymin,
                    ymax,
                    z,
                },
            }
        };
        target.validate().map_err(D::Error::custom)?;
        Ok(target)
    }
}

impl Target {
    /// Rectangle of the given width centred on the origin at altitude `z`.
    pub fn centred_rectangle(width: Length, z: Length) -> Self {
        let half = 0.5 * width.0;
        Target::Rectangle {
            xmin: Length(-half),
            xmax: Length(half),
            ymin: Length(-half),
            ymax: Length(half),
            z,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Target::Rectangle {
            xmin,
            xmax,
            ymin,
            ymax,
            ..
        } = self
        {
            if xmin.0 >= xmax.0 || ymin.0 >= ymax.0 {
                return Err(Error::validation(
                    "rectangle target: lower bounds must be smaller than upper bounds",
                ));
            }
        }
        Ok(())
    }

    /// Kernel description: a point, or a `rectangle` shape.
    pub fn kernel_item(&self, ctx: &KernelDictContext) -> Value {
        match *self {
            Target::Point { xyz } => json!(xyz.map(|c| ctx.units.length(c))),
            Target::Rectangle {
                xmin,
                xmax,
                ymin,
                ymax,
                z,
            } => {
                let l = |v: Length| ctx.units.length(v);
                let (xc, yc) = (0.5 * (l(xmin) + l(xmax)), 0.5 * (l(ymin) + l(ymax)));
                let (dx, dy) = (l(xmax) - l(xmin), l(ymax) - l(ymin));
                let to_world =
                    Transform4::translate(Vector3::new(xc, yc, l(z))) * Transform4::scale(Vector3::new(0.5 * dx, 0.5 * dy, 1.0));
                json!({ "type": "rectangle", "to_world": to_world.to_value() })
            }
        }
    }
}
