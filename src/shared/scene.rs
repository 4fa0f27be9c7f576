/**
 * Scene Object Model
 *
 * This module defines the shared data model for scene content: spatial
 * transforms, the fixed set of object kinds, the per-kind property records,
 * and the full `SceneObject` record with its audit fields.
 *
 * # Property Shapes
 *
 * `properties` is a tagged-by-kind record: the JSON shape a client may send
 * is fixed by the object's `type`. Cameras and lights carry their own
 * records; primitives and asset references carry an empty record `{}`.
 * Shape and range violations are validation errors (`MALFORMED` on the
 * wire), never panics.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::SharedError;

/// Spatial transform: position, Euler rotation (radians), scale.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Transform {
    /// The identity transform (origin, no rotation, unit scale).
    pub fn identity() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

/// The fixed set of object kinds a client may create.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Cube,
    Sphere,
    Cylinder,
    Camera,
    PointLight,
    SunLight,
    /// A reference to an asset inside a library
    AssetRef,
}

impl ObjectKind {
    /// Whether this kind requires `asset_id` / `asset_library`.
    pub fn is_asset_ref(&self) -> bool {
        matches!(self, ObjectKind::AssetRef)
    }
}

/// Kind-specific property record.
///
/// Untagged on the wire: the shape itself identifies the variant, and the
/// server cross-checks it against the object kind. `Empty` must stay the
/// last variant so it only matches when no typed shape does.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ObjectProperties {
    Camera {
        focal_length_mm: f64,
        sensor_width_mm: f64,
        clip_start: f64,
        clip_end: f64,
    },
    PointLight {
        color_rgb: [f32; 3],
        power_watts: f32,
        radius: f32,
    },
    SunLight {
        color_rgb: [f32; 3],
        intensity: f32,
        angle_rad: f32,
    },
    Empty {},
}

impl Default for ObjectProperties {
    fn default() -> Self {
        ObjectProperties::Empty {}
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), SharedError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SharedError::validation(field, "must be positive and finite"))
    }
}

fn check_non_negative(field: &str, value: f32) -> Result<(), SharedError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SharedError::validation(
            field,
            "must be non-negative and finite",
        ))
    }
}

fn check_unit_rgb(field: &str, rgb: &[f32; 3]) -> Result<(), SharedError> {
    if rgb.iter().all(|c| c.is_finite() && (0.0..=1.0).contains(c)) {
        Ok(())
    } else {
        Err(SharedError::validation(field, "components must be in [0, 1]"))
    }
}

impl ObjectProperties {
    /// Validate this record's shape and value ranges against an object kind.
    pub fn validate_for(&self, kind: ObjectKind) -> Result<(), SharedError> {
        match (kind, self) {
            (
                ObjectKind::Camera,
                ObjectProperties::Camera {
                    focal_length_mm,
                    sensor_width_mm,
                    clip_start,
                    clip_end,
                },
            ) => {
                check_positive("focal_length_mm", *focal_length_mm)?;
                check_positive("sensor_width_mm", *sensor_width_mm)?;
                check_positive("clip_start", *clip_start)?;
                check_positive("clip_end", *clip_end)?;
                Ok(())
            }
            (
                ObjectKind::PointLight,
                ObjectProperties::PointLight {
                    color_rgb,
                    power_watts,
                    radius,
                },
            ) => {
                check_unit_rgb("color_rgb", color_rgb)?;
                check_non_negative("power_watts", *power_watts)?;
                check_non_negative("radius", *radius)?;
                Ok(())
            }
            (
                ObjectKind::SunLight,
                ObjectProperties::SunLight {
                    color_rgb,
                    intensity,
                    angle_rad,
                },
            ) => {
                check_unit_rgb("color_rgb", color_rgb)?;
                check_non_negative("intensity", *intensity)?;
                if angle_rad.is_finite() && (0.0..=std::f32::consts::PI).contains(angle_rad) {
                    Ok(())
                } else {
                    Err(SharedError::validation("angle_rad", "must be in [0, pi]"))
                }
            }
            (
                ObjectKind::Cube
                | ObjectKind::Sphere
                | ObjectKind::Cylinder
                | ObjectKind::AssetRef,
                ObjectProperties::Empty {},
            ) => Ok(()),
            (kind, _) => Err(SharedError::validation(
                "properties",
                format!("shape does not match object type {kind:?}"),
            )),
        }
    }
}

/// Check the asset-reference invariant: `asset_id` and `asset_library` are
/// required iff `kind = asset_ref`, and must be absent otherwise.
pub fn validate_asset_fields(
    kind: ObjectKind,
    asset_id: &Option<String>,
    asset_library: &Option<String>,
) -> Result<(), SharedError> {
    if kind.is_asset_ref() {
        if asset_id.is_none() || asset_library.is_none() {
            return Err(SharedError::validation(
                "asset_id",
                "required for asset_ref objects",
            ));
        }
    } else if asset_id.is_some() || asset_library.is_some() {
        return Err(SharedError::validation(
            "asset_id",
            "only allowed on asset_ref objects",
        ));
    }
    Ok(())
}

/// A single object in the canonical scene, with audit fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub object_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub asset_id: Option<String>,
    pub asset_library: Option<String>,
    pub transform: Transform,
    pub properties: ObjectProperties,
    pub created_by: String,
    pub created_at: u64,
    pub last_updated_by: String,
    pub last_updated_at: u64,
}
