//! Domain core for knee rehabilitation angle measurement.
//!
//! Building blocks shared by every estimation path, free of network I/O:
//! value types, the error taxonomy, the geometric knee-angle calculator,
//! keypoint selection, image preparation, and recovery timeline helpers.
//! Network I/O lives in `kneeflex-estimation`.

pub mod error;
pub mod geometry;
pub mod image_prep;
pub mod measurement;
pub mod recovery;
pub mod selection;
pub mod types;
