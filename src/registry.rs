//! Bounded pool of managed devices, fed by hotplug arrivals and departures.
//!
//! Slots are keyed by the physical position of the USB device so that a
//! camera and the focuser bound to it share one key and are torn down
//! together when the hardware goes away.

use crate::camera::{CameraDevice, DeviceEvent, TransportFactory};
use crate::focuser::FocuserLink;
use crate::model::CameraModel;
use crate::{PtpError, Result};
use crossbeam_channel::Sender;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Maximum number of simultaneously managed cameras.
pub const MAX_DEVICES: usize = 4;

/// Physical identity of a USB device: bus number plus port path. Stable
/// across the whole attach/detach cycle, unlike the device address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(bus: u8, ports: &[u8]) -> DeviceKey {
        let path: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
        DeviceKey(format!("{}-{}", bus, path.join(".")))
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide set of claimed device keys. Connecting takes a claim so two
/// driver instances cannot talk to the same camera at once.
fn claims() -> &'static Mutex<HashSet<DeviceKey>> {
    static CLAIMS: OnceLock<Mutex<HashSet<DeviceKey>>> = OnceLock::new();
    CLAIMS.get_or_init(|| Mutex::new(HashSet::new()))
}

fn lock_claims() -> MutexGuard<'static, HashSet<DeviceKey>> {
    claims().lock().unwrap_or_else(|e| e.into_inner())
}

/// Advisory exclusive claim on a physical device. Released on drop.
pub struct ClaimGuard {
    key: DeviceKey,
}

pub fn claim(key: &DeviceKey) -> Result<ClaimGuard> {
    let mut claimed = lock_claims();
    if !claimed.insert(key.clone()) {
        return Err(PtpError::AlreadyClaimed);
    }
    Ok(ClaimGuard { key: key.clone() })
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        lock_claims().remove(&self.key);
    }
}

struct Slot {
    camera: Arc<CameraDevice>,
    focuser: Option<FocuserLink>,
}

/// The device pool. One per driver instance.
pub struct DeviceRegistry {
    slots: Mutex<Vec<Slot>>,
    updates: Sender<DeviceEvent>,
}

impl DeviceRegistry {
    pub fn new(updates: Sender<DeviceEvent>) -> DeviceRegistry {
        DeviceRegistry {
            slots: Mutex::new(Vec::with_capacity(MAX_DEVICES)),
            updates,
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle a USB arrival. Devices without a model descriptor are ignored;
    /// arrivals beyond the pool bound are dropped without disturbing the
    /// devices already managed.
    pub fn device_arrived(
        &self,
        model: &'static CameraModel,
        key: DeviceKey,
        factory: TransportFactory,
    ) -> Result<()> {
        let mut slots = self.lock_slots();
        if slots.iter().any(|s| s.camera.key() == &key) {
            log::debug!("{}: already managed, ignoring duplicate arrival", key);
            return Ok(());
        }
        if slots.len() >= MAX_DEVICES {
            log::warn!("{}: device pool full, ignoring {}", key, model.name);
            return Err(PtpError::PoolFull);
        }
        let camera = Arc::new(CameraDevice::new(
            model,
            key,
            self.updates.clone(),
            factory,
        ));
        let focuser = FocuserLink::bind(&camera);
        slots.push(Slot { camera, focuser });
        Ok(())
    }

    /// Handle a USB departure. The focuser link is dropped before the camera
    /// so the lens handle never outlives the session that backs it.
    pub fn device_left(&self, key: &DeviceKey) {
        let slot = {
            let mut slots = self.lock_slots();
            slots
                .iter()
                .position(|s| s.camera.key() == key)
                .map(|i| slots.remove(i))
        };
        match slot {
            Some(mut slot) => {
                slot.focuser.take();
                drop(slot); // disconnects and joins the worker
            }
            None => log::debug!("{}: departure for unmanaged device", key),
        }
    }

    /// Number of managed devices.
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// Look up a managed camera by key.
    pub fn camera(&self, key: &DeviceKey) -> Option<Arc<CameraDevice>> {
        self.lock_slots()
            .iter()
            .find(|s| s.camera.key() == key)
            .map(|s| s.camera.clone())
    }

    /// Whether a focuser is bound for the device at `key`.
    pub fn has_focuser(&self, key: &DeviceKey) -> bool {
        self.lock_slots()
            .iter()
            .any(|s| s.camera.key() == key && s.focuser.is_some())
    }

    /// Tear down every managed device, focusers first.
    pub fn shutdown(&self) {
        let slots: Vec<Slot> = self.lock_slots().drain(..).collect();
        for mut slot in slots {
            slot.focuser.take();
            drop(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_formatting() {
        let key = DeviceKey::new(1, &[4, 2]);
        assert_eq!(key.to_string(), "1-4.2");
        assert_eq!(DeviceKey::new(3, &[]).to_string(), "3-");
    }

    #[test]
    fn test_claim_is_exclusive_and_released_on_drop() {
        let key = DeviceKey::new(250, &[9]);
        let guard = claim(&key).unwrap();
        assert!(matches!(claim(&key), Err(PtpError::AlreadyClaimed)));
        drop(guard);
        // Released exactly once; a fresh claim succeeds.
        let again = claim(&key).unwrap();
        drop(again);
    }
}
