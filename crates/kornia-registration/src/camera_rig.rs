use std::collections::HashMap;

use kornia_pnp::CameraModel;

use crate::error::RegistrationError;
use crate::keyframe::CameraId;

/// Camera models indexed by camera identity.
///
/// The rig is read-only once handed to a [`crate::Registrator`], which keeps it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct CameraRig {
    cameras: HashMap<CameraId, CameraModel>,
}

impl CameraRig {
    /// Create an empty rig.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a camera, builder style.
    pub fn with_camera(mut self, id: CameraId, camera: CameraModel) -> Self {
        self.cameras.insert(id, camera);
        self
    }

    /// Add or replace a camera, returning the previous model.
    pub fn insert(&mut self, id: CameraId, camera: CameraModel) -> Option<CameraModel> {
        self.cameras.insert(id, camera)
    }

    /// Look up a camera.
    pub fn get(&self, id: CameraId) -> Result<&CameraModel, RegistrationError> {
        self.cameras
            .get(&id)
            .ok_or(RegistrationError::UnknownCamera(id))
    }

    /// Number of cameras in the rig.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Whether the rig has no cameras.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

impl FromIterator<(CameraId, CameraModel)> for CameraRig {
    fn from_iter<T: IntoIterator<Item = (CameraId, CameraModel)>>(iter: T) -> Self {
        Self {
            cameras: iter.into_iter().collect(),
        }
    }
}
