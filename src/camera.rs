//! Per-camera device object and property/command dispatcher.
//!
//! Every property-change request follows one protocol: validate that the
//! target property exists and its capability is bound, copy the submitted
//! value, mark the property busy, and hand the vendor operation to the
//! device's worker thread. The worker runs it under the message lock (so at
//! most one operation is in flight per physical camera), sets the terminal
//! ok/alert state from the vendor outcome and publishes the update upstream.

use crate::codes::Resolver;
use crate::model::CameraModel;
use crate::registry::{claim, ClaimGuard, DeviceKey};
use crate::session::PtpSession;
use crate::transport::Transport;
use crate::vendor::{ops_for, Capabilities, Capability, Vendor, VendorOps};
use crate::{PtpError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Upper bound on dynamically defined vendor properties per device.
pub const MAX_VENDOR_PROPERTIES: usize = 32;

/// Opens the byte transport for a camera at connect time.
pub type TransportFactory = Box<dyn Fn() -> Result<Box<dyn Transport>> + Send + Sync>;

/// Property lifecycle state reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    Ok,
    Busy,
    Alert,
}

/// Identity of an upstream property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Connection,
    Exposure,
    AbortExposure,
    Streaming,
    DeleteImage,
    MirrorLockup,
    ZoomPreview,
    Lock,
    Autofocus,
    SetHostTime,
    FocuserSteps,
    /// Dynamically defined vendor device property.
    Vendor(u16),
}

/// One upstream property record. `hidden` marks features whose capability
/// slot is unbound for this vendor; hidden properties reject requests.
#[derive(Debug, Clone)]
pub struct Property {
    pub key: PropertyKey,
    pub label: String,
    pub state: PropertyState,
    pub hidden: bool,
    pub value: u32,
}

/// Events published to the upstream framework.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Attached { device: String },
    Detached { device: String },
    PropertyDefined { device: String, property: Property },
    PropertyUpdated { device: String, property: Property },
    PropertyDeleted { device: String, key: PropertyKey },
}

/// A property-change request from the upstream framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Connect,
    Disconnect,
    StartExposure,
    AbortExposure,
    Streaming(bool),
    DeleteImage(bool),
    MirrorLockup(bool),
    ZoomPreview(bool),
    Lock(bool),
    Autofocus,
    SetHostTime,
    SetVendorProperty { code: u16, value: u32 },
    FocusMove(i32),
}

impl Request {
    fn key(&self) -> PropertyKey {
        match self {
            Request::Connect | Request::Disconnect => PropertyKey::Connection,
            Request::StartExposure => PropertyKey::Exposure,
            Request::AbortExposure => PropertyKey::AbortExposure,
            Request::Streaming(_) => PropertyKey::Streaming,
            Request::DeleteImage(_) => PropertyKey::DeleteImage,
            Request::MirrorLockup(_) => PropertyKey::MirrorLockup,
            Request::ZoomPreview(_) => PropertyKey::ZoomPreview,
            Request::Lock(_) => PropertyKey::Lock,
            Request::Autofocus => PropertyKey::Autofocus,
            Request::SetHostTime => PropertyKey::SetHostTime,
            Request::SetVendorProperty { code, .. } => PropertyKey::Vendor(*code),
            Request::FocusMove(_) => PropertyKey::FocuserSteps,
        }
    }

    /// The capability slot this request needs, if it is an optional one.
    fn capability(&self) -> Option<Capability> {
        match self {
            Request::StartExposure => Some(Capability::Exposure),
            Request::Streaming(_) => Some(Capability::Liveview),
            Request::ZoomPreview(_) => Some(Capability::Zoom),
            Request::Lock(_) => Some(Capability::Lock),
            Request::Autofocus => Some(Capability::Autofocus),
            Request::SetHostTime => Some(Capability::SetHostTime),
            Request::SetVendorProperty { .. } => Some(Capability::SetProperty),
            Request::FocusMove(_) => Some(Capability::Focus),
            _ => None,
        }
    }
}

/// Mutable per-device state behind the message lock.
struct DeviceCore {
    session: Option<PtpSession>,
    claim: Option<ClaimGuard>,
    properties: Vec<Property>,
}

impl DeviceCore {
    fn property_mut(&mut self, key: PropertyKey) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.key == key)
    }

    fn property(&self, key: PropertyKey) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// State shared between the device handle, its worker thread and the
/// focuser link. Capability and resolver bindings are immutable after
/// creation; everything mutable sits behind the message lock.
pub(crate) struct DeviceShared {
    pub(crate) name: String,
    pub(crate) key: DeviceKey,
    pub(crate) model: &'static CameraModel,
    ops: &'static dyn VendorOps,
    resolver: &'static Resolver,
    caps: Capabilities,
    message: Mutex<DeviceCore>,
    abort_capture: AtomicBool,
    updates: Sender<DeviceEvent>,
    factory: TransportFactory,
}

impl DeviceShared {
    fn lock_core(&self) -> MutexGuard<'_, DeviceCore> {
        self.message.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: DeviceEvent) {
        if self.updates.send(event).is_err() {
            log::trace!("{}: upstream receiver gone", self.name);
        }
    }

    fn publish_update(&self, property: &Property) {
        self.publish(DeviceEvent::PropertyUpdated {
            device: self.name.clone(),
            property: property.clone(),
        });
    }

    fn set_state(&self, core: &mut DeviceCore, key: PropertyKey, state: PropertyState) {
        if let Some(property) = core.property_mut(key) {
            property.state = state;
            let snapshot = property.clone();
            self.publish_update(&snapshot);
        }
    }

    pub(crate) fn focuser_name(&self) -> String {
        format!("{} (focuser) #{}", self.model.name, self.key)
    }

    fn has_focuser(&self) -> bool {
        self.caps.contains(Capabilities::FOCUS)
    }

    /// Run one queued request under the message lock.
    fn handle(&self, request: Request) {
        let mut core = self.lock_core();
        match request {
            Request::Connect => self.handle_connect(&mut core),
            Request::Disconnect => self.handle_disconnect(&mut core),
            Request::AbortExposure => {} // handled synchronously at submit
            Request::DeleteImage(value) | Request::MirrorLockup(value) => {
                // Pass-through switches: recorded, no vendor traffic.
                let key = request.key();
                if let Some(property) = core.property_mut(key) {
                    property.value = u32::from(value);
                    property.state = PropertyState::Ok;
                    let snapshot = property.clone();
                    self.publish_update(&snapshot);
                }
            }
            Request::StartExposure => {
                let abort = &self.abort_capture;
                self.run_vendor_op(&mut core, PropertyKey::Exposure, |ops, session| {
                    ops.exposure(session, abort)
                });
            }
            Request::Streaming(start) => {
                self.run_vendor_op(&mut core, PropertyKey::Streaming, |ops, session| {
                    ops.liveview(session, start)
                });
            }
            Request::ZoomPreview(on) => {
                self.run_vendor_op(&mut core, PropertyKey::ZoomPreview, |ops, session| {
                    ops.zoom(session, on)
                });
            }
            Request::Lock(lock) => {
                self.run_vendor_op(&mut core, PropertyKey::Lock, |ops, session| {
                    ops.lock(session, lock)
                });
            }
            Request::Autofocus => {
                self.run_vendor_op(&mut core, PropertyKey::Autofocus, |ops, session| {
                    ops.autofocus(session)
                });
            }
            Request::SetHostTime => {
                self.run_vendor_op(&mut core, PropertyKey::SetHostTime, |ops, session| {
                    ops.set_host_time(session)
                });
            }
            Request::SetVendorProperty { code, value } => {
                self.run_vendor_op(&mut core, PropertyKey::Vendor(code), |ops, session| {
                    ops.set_property(session, code, value)
                });
            }
            Request::FocusMove(steps) => {
                self.run_vendor_op(&mut core, PropertyKey::FocuserSteps, |ops, session| {
                    ops.focus(session, steps)
                });
            }
        }
    }

    /// Shared busy→ok/alert tail of every vendor-backed handler.
    fn run_vendor_op<F>(&self, core: &mut DeviceCore, key: PropertyKey, f: F)
    where
        F: FnOnce(&'static dyn VendorOps, &mut PtpSession) -> Result<()>,
    {
        let outcome = match core.session.as_mut() {
            Some(session) => f(self.ops, session),
            None => Err(PtpError::NoSession),
        };
        let state = match outcome {
            Ok(()) => PropertyState::Ok,
            Err(e) => {
                log::warn!("{}: {:?} failed: {}", self.name, key, e);
                PropertyState::Alert
            }
        };
        self.set_state(core, key, state);
    }

    fn handle_connect(&self, core: &mut DeviceCore) {
        if core.session.is_some() {
            self.set_state(core, PropertyKey::Connection, PropertyState::Ok);
            return;
        }
        match self.try_connect(core) {
            Ok(()) => {
                log::info!("{}: connected", self.name);
                // Vendor properties become visible only once connected.
                for property in core.properties.iter().filter(|p| !p.hidden) {
                    self.publish(DeviceEvent::PropertyDefined {
                        device: self.name.clone(),
                        property: property.clone(),
                    });
                }
                if self.has_focuser() {
                    self.publish(DeviceEvent::Attached {
                        device: self.focuser_name(),
                    });
                }
                self.set_state(core, PropertyKey::Connection, PropertyState::Ok);
            }
            Err(e) => {
                log::warn!("{}: connect failed: {}", self.name, e);
                core.session = None;
                core.claim = None;
                self.set_state(core, PropertyKey::Connection, PropertyState::Alert);
            }
        }
    }

    fn try_connect(&self, core: &mut DeviceCore) -> Result<()> {
        core.claim = Some(claim(&self.key)?);
        let transport = (self.factory)()?;
        let mut session = PtpSession::new(transport, self.ops.vendor());
        session.open_session()?;
        let vendor_codes = match self.ops.initialise(&mut session) {
            Ok(codes) => codes,
            Err(e) => {
                session.close_session();
                return Err(e);
            }
        };
        for code in vendor_codes.into_iter().take(MAX_VENDOR_PROPERTIES) {
            let label = self
                .resolver
                .property_name(code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("0x{:04x}", code));
            core.properties.push(Property {
                key: PropertyKey::Vendor(code),
                label,
                state: PropertyState::Ok,
                hidden: false,
                value: 0,
            });
        }
        core.session = Some(session);
        Ok(())
    }

    fn handle_disconnect(&self, core: &mut DeviceCore) {
        // Focuser goes first; it must never outlive the master session.
        if self.has_focuser() && core.session.is_some() {
            self.publish(DeviceEvent::Detached {
                device: self.focuser_name(),
            });
        }
        if let Some(mut session) = core.session.take() {
            session.close_session();
        }
        let vendor_keys: Vec<PropertyKey> = core
            .properties
            .iter()
            .filter(|p| matches!(p.key, PropertyKey::Vendor(_)))
            .map(|p| p.key)
            .collect();
        core.properties
            .retain(|p| !matches!(p.key, PropertyKey::Vendor(_)));
        for key in vendor_keys {
            self.publish(DeviceEvent::PropertyDeleted {
                device: self.name.clone(),
                key,
            });
        }
        core.claim = None; // releases the advisory claim
        self.set_state(core, PropertyKey::Connection, PropertyState::Ok);
        log::info!("{}: disconnected", self.name);
    }
}

/// A managed camera: property records plus a worker thread draining the
/// request queue. Dropping the device disconnects and joins the worker.
pub struct CameraDevice {
    shared: Arc<DeviceShared>,
    jobs: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
}

impl CameraDevice {
    pub fn new(
        model: &'static CameraModel,
        key: DeviceKey,
        updates: Sender<DeviceEvent>,
        factory: TransportFactory,
    ) -> CameraDevice {
        let vendor = Vendor::from_vid(model.vendor_id);
        let ops = ops_for(vendor);
        let caps = ops.capabilities(model);
        let name = format!("{} #{}", model.name, key);
        let properties = attach_properties(caps);
        let shared = Arc::new(DeviceShared {
            name: name.clone(),
            key,
            model,
            ops,
            resolver: crate::codes::resolver_for(vendor),
            caps,
            message: Mutex::new(DeviceCore {
                session: None,
                claim: None,
                properties,
            }),
            abort_capture: AtomicBool::new(false),
            updates,
            factory,
        });

        let (jobs, queue) = crossbeam_channel::bounded::<Request>(16);
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name(format!("ptpcam-{}", model.name))
            .spawn(move || worker_loop(worker_shared, queue))
            .ok();
        if worker.is_none() {
            log::error!("{}: failed to spawn device worker", name);
        }

        shared.publish(DeviceEvent::Attached {
            device: name.clone(),
        });
        log::info!("{}: attached ({:?})", name, vendor);

        CameraDevice {
            shared,
            jobs: Some(jobs),
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn key(&self) -> &DeviceKey {
        &self.shared.key
    }

    pub fn model(&self) -> &'static CameraModel {
        self.shared.model
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.caps
    }

    /// Whether a companion focuser is bound to this camera.
    pub fn has_focuser(&self) -> bool {
        self.shared.has_focuser()
    }

    pub(crate) fn shared(&self) -> Arc<DeviceShared> {
        self.shared.clone()
    }

    /// Snapshot of one property record.
    pub fn property(&self, key: PropertyKey) -> Option<Property> {
        self.shared.lock_core().property(key).cloned()
    }

    pub fn connected(&self) -> bool {
        self.shared.lock_core().session.is_some()
    }

    /// Submit a property-change request.
    ///
    /// Validates the target, marks it busy and queues the vendor operation;
    /// the terminal ok/alert state arrives as a `PropertyUpdated` event.
    /// Requests against hidden properties fail with `CapabilityAbsent`
    /// without ever being scheduled.
    pub fn request(&self, request: Request) -> Result<()> {
        let key = request.key();
        {
            let mut core = self.shared.lock_core();
            let Some(property) = core.property_mut(key) else {
                return Err(PtpError::DeviceNotFound);
            };
            if property.hidden {
                let capability = request.capability().unwrap_or(Capability::SetProperty);
                return Err(PtpError::CapabilityAbsent(capability));
            }
            if request == Request::AbortExposure {
                // Cooperative cancel: flag only, observed by capture loops.
                self.shared.abort_capture.store(true, Ordering::Relaxed);
                property.state = PropertyState::Ok;
                let snapshot = property.clone();
                drop(core);
                self.shared.publish_update(&snapshot);
                return Ok(());
            }
            if matches!(request, Request::StartExposure | Request::Streaming(true)) {
                self.shared.abort_capture.store(false, Ordering::Relaxed);
            }
            if let Request::SetVendorProperty { value, .. } = request {
                property.value = value;
            }
            property.state = PropertyState::Busy;
            let snapshot = property.clone();
            drop(core);
            self.shared.publish_update(&snapshot);
        }
        if let Some(jobs) = self.jobs.as_ref() {
            if jobs.send(request).is_ok() {
                return Ok(());
            }
        }
        // Worker gone: the property must still reach a terminal state.
        let mut core = self.shared.lock_core();
        self.shared.set_state(&mut core, key, PropertyState::Alert);
        Err(PtpError::ChannelDisconnected)
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        self.shared.abort_capture.store(true, Ordering::Relaxed);
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.send(Request::Disconnect);
            drop(jobs);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared.publish(DeviceEvent::Detached {
            device: self.shared.name.clone(),
        });
        log::info!("{}: detached", self.shared.name);
    }
}

fn worker_loop(shared: Arc<DeviceShared>, queue: Receiver<Request>) {
    for request in queue.iter() {
        shared.handle(request);
    }
}

/// Build the attach-time property set. Optional features whose capability
/// slot is unbound are created hidden so the framework never requests them.
fn attach_properties(caps: Capabilities) -> Vec<Property> {
    let hidden = |cap: Capabilities| !caps.contains(cap);
    let entries: [(PropertyKey, &str, bool); 11] = [
        (PropertyKey::Connection, "Connection", false),
        (PropertyKey::Exposure, "Start exposure", hidden(Capabilities::EXPOSURE)),
        (PropertyKey::AbortExposure, "Abort exposure", false),
        (PropertyKey::Streaming, "CCD streaming", hidden(Capabilities::LIVEVIEW)),
        (PropertyKey::DeleteImage, "Delete downloaded image", false),
        (PropertyKey::MirrorLockup, "Use mirror lockup", false),
        (PropertyKey::ZoomPreview, "Zoom preview", hidden(Capabilities::ZOOM)),
        (PropertyKey::Lock, "Lock camera GUI", hidden(Capabilities::LOCK)),
        (PropertyKey::Autofocus, "Autofocus", hidden(Capabilities::AUTOFOCUS)),
        (PropertyKey::SetHostTime, "Set host time", hidden(Capabilities::SET_HOST_TIME)),
        (PropertyKey::FocuserSteps, "Focuser steps", hidden(Capabilities::FOCUS)),
    ];
    entries
        .into_iter()
        .map(|(key, label, hidden)| Property {
            key,
            label: label.to_string(),
            state: PropertyState::Ok,
            hidden,
            value: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_properties_hidden_follows_capabilities() {
        let caps = Capabilities::EXPOSURE | Capabilities::LIVEVIEW;
        let properties = attach_properties(caps);
        let hidden = |key: PropertyKey| {
            properties
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.hidden)
                .unwrap_or(true)
        };
        assert!(!hidden(PropertyKey::Connection));
        assert!(!hidden(PropertyKey::Exposure));
        assert!(!hidden(PropertyKey::Streaming));
        assert!(hidden(PropertyKey::Lock));
        assert!(hidden(PropertyKey::Autofocus));
        assert!(hidden(PropertyKey::FocuserSteps));
    }

    #[test]
    fn test_request_alerts_when_worker_is_gone() {
        let (updates, events) = crossbeam_channel::unbounded();
        let model = crate::model::lookup(crate::model::CANON_VID, 0x3145).unwrap();
        let factory: TransportFactory = Box::new(|| Err(PtpError::DeviceNotFound));
        let mut camera = CameraDevice::new(model, DeviceKey::new(250, &[1]), updates, factory);
        // Dropping the sender drains the queue and ends the worker.
        camera.jobs.take();

        let err = camera.request(Request::Autofocus).unwrap_err();
        assert!(matches!(err, PtpError::ChannelDisconnected));
        // The property is not left busy.
        assert_eq!(
            camera.property(PropertyKey::Autofocus).unwrap().state,
            PropertyState::Alert
        );
        let states: Vec<PropertyState> = events
            .try_iter()
            .filter_map(|e| match e {
                DeviceEvent::PropertyUpdated { property, .. }
                    if property.key == PropertyKey::Autofocus =>
                {
                    Some(property.state)
                }
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![PropertyState::Busy, PropertyState::Alert]);
    }

    #[test]
    fn test_request_key_mapping() {
        assert_eq!(Request::Connect.key(), PropertyKey::Connection);
        assert_eq!(Request::Lock(true).key(), PropertyKey::Lock);
        assert_eq!(
            Request::SetVendorProperty { code: 0xD101, value: 4 }.key(),
            PropertyKey::Vendor(0xD101)
        );
        assert_eq!(Request::Connect.capability(), None);
        assert_eq!(Request::Autofocus.capability(), Some(Capability::Autofocus));
    }
}
