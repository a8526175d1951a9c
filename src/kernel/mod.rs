/// Kernel-facing data: scene dictionaries and transforms.
///
/// ```text
///  SceneElement ──kernel_dict(ctx)──▶ KernelDict ──to_value()──▶ JSON scene
///                                          ▲
///                                    Transform4 (to_world)
/// ```

pub mod dict;
pub mod gridvolume;
pub mod transform;

pub use dict::KernelDict;
pub use gridvolume::{read_binary_grid3d, write_binary_grid3d, GridVolume};
pub use transform::{coordinate_system, Transform4, Vector3};
