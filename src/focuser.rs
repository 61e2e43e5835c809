//! Companion focuser exposed for cameras whose vendor binds the lens-drive
//! capability. The focuser has no transport of its own; it submits requests
//! through the camera, so its moves serialize with camera operations under
//! the same message lock.

use crate::camera::{CameraDevice, Request};
use crate::{PtpError, Result};
use std::sync::{Arc, Weak};

/// Handle for driving the lens of a connected camera.
pub struct FocuserLink {
    name: String,
    camera: Weak<CameraDevice>,
}

impl FocuserLink {
    /// Bind a focuser to a camera. Returns `None` when the vendor leaves
    /// the focus capability unbound for this model.
    pub fn bind(camera: &Arc<CameraDevice>) -> Option<FocuserLink> {
        if !camera.has_focuser() {
            return None;
        }
        Some(FocuserLink {
            name: camera.shared().focuser_name(),
            camera: Arc::downgrade(camera),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Move the lens by a signed step count. Negative steps move inward.
    pub fn move_steps(&self, steps: i32) -> Result<()> {
        let camera = self.camera.upgrade().ok_or(PtpError::DeviceNotFound)?;
        camera.request(Request::FocusMove(steps))
    }
}
