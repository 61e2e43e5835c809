//! End-to-end lifecycle tests against a scripted fake camera transport.

use ptpcam::codes::{event, op, rsp};
use ptpcam::protocol::{self, Container, ContainerKind};
use ptpcam::{
    model, DeviceEvent, DeviceKey, DeviceRegistry, PropertyKey, PropertyState, PtpError, Request,
    Transport,
};
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shared state of one fake camera, visible to both the device worker (via
/// the transport) and the test body.
#[derive(Default)]
struct FakeState {
    pending: Mutex<VecDeque<Vec<u8>>>,
    interrupt: Mutex<VecDeque<Vec<u8>>>,
    operations: Mutex<Vec<u16>>,
    fail_writes: AtomicBool,
}

impl FakeState {
    fn seen(&self, code: u16) -> bool {
        self.operations.lock().unwrap().contains(&code)
    }
}

/// Transport double that answers every command with OK, plus a data phase
/// for the operations that have one. Canon event polls report one freshly
/// added object so captures complete immediately.
struct FakeCamera {
    state: Arc<FakeState>,
}

impl FakeCamera {
    fn respond(&self, command: &Container) {
        let tid = command.transaction_id;
        let mut pending = self.state.pending.lock().unwrap();
        match command.code {
            op::CANON_GET_EVENT => {
                let mut blob = Vec::new();
                blob.extend_from_slice(&12u32.to_le_bytes());
                blob.extend_from_slice(&(event::CANON_OBJECT_ADDED_EX as u32).to_le_bytes());
                blob.extend_from_slice(&1u32.to_le_bytes());
                pending.push_back(protocol::build_data_container(command.code, tid, &blob));
            }
            op::GET_DEVICE_INFO => {
                pending.push_back(protocol::build_data_container(command.code, tid, &[]));
            }
            op::INITIATE_CAPTURE => {
                // Completion arrives on the interrupt pipe for generic PTP.
                self.state.interrupt.lock().unwrap().push_back(protocol::build_container(
                    ContainerKind::Event,
                    event::OBJECT_ADDED,
                    tid,
                    &[1],
                ));
            }
            _ => {}
        }
        pending.push_back(protocol::build_container(
            ContainerKind::Response,
            rsp::OK,
            tid,
            &[],
        ));
    }
}

impl Transport for FakeCamera {
    fn write(&mut self, buf: &[u8]) -> ptpcam::Result<()> {
        if self.state.fail_writes.load(Ordering::Relaxed) {
            return Err(PtpError::Transport("cable pulled".into()));
        }
        let container = protocol::parse_container(buf)?;
        if container.kind == ContainerKind::Command {
            self.state.operations.lock().unwrap().push(container.code);
            self.respond(&container);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> ptpcam::Result<usize> {
        let data = self
            .state
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PtpError::Transport("nothing to read".into()))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn read_event(&mut self, buf: &mut [u8]) -> ptpcam::Result<usize> {
        match self.state.interrupt.lock().unwrap().pop_front() {
            Some(data) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            None => Ok(0),
        }
    }
}

fn fake_factory(state: Arc<FakeState>) -> ptpcam::camera::TransportFactory {
    Box::new(move || {
        Ok(Box::new(FakeCamera {
            state: state.clone(),
        }))
    })
}

/// Block until the given property reaches a terminal state, skipping
/// unrelated events on the way.
fn wait_for_state(events: &Receiver<DeviceEvent>, key: PropertyKey) -> PropertyState {
    let deadline = Duration::from_secs(5);
    loop {
        match events.recv_timeout(deadline).expect("event before timeout") {
            DeviceEvent::PropertyUpdated { property, .. }
                if property.key == key && property.state != PropertyState::Busy =>
            {
                return property.state;
            }
            _ => {}
        }
    }
}

fn wait_for_detach(events: &Receiver<DeviceEvent>, name_part: &str) {
    let deadline = Duration::from_secs(5);
    loop {
        if let DeviceEvent::Detached { device } =
            events.recv_timeout(deadline).expect("detach before timeout")
        {
            if device.contains(name_part) {
                return;
            }
        }
    }
}

fn canon_450d() -> &'static model::CameraModel {
    model::lookup(model::CANON_VID, 0x3145).unwrap()
}

#[test]
fn test_pool_full_arrival_is_dropped() {
    init_logging();
    let (updates, _events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    for port in 1..=4u8 {
        let key = DeviceKey::new(1, &[port]);
        registry
            .device_arrived(canon_450d(), key, fake_factory(Arc::new(FakeState::default())))
            .unwrap();
    }
    assert_eq!(registry.len(), 4);

    let overflow = registry.device_arrived(
        canon_450d(),
        DeviceKey::new(1, &[5]),
        fake_factory(Arc::new(FakeState::default())),
    );
    assert!(matches!(overflow, Err(PtpError::PoolFull)));
    // Existing slots are untouched.
    assert_eq!(registry.len(), 4);
    registry.shutdown();
}

#[test]
fn test_duplicate_arrival_is_ignored() {
    init_logging();
    let (updates, _events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(2, &[1]);
    let state = Arc::new(FakeState::default());
    registry
        .device_arrived(canon_450d(), key.clone(), fake_factory(state.clone()))
        .unwrap();
    registry
        .device_arrived(canon_450d(), key, fake_factory(state))
        .unwrap();
    assert_eq!(registry.len(), 1);
    registry.shutdown();
}

#[test]
fn test_canon_connect_capture_and_departure() {
    init_logging();
    let (updates, events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(3, &[1]);
    let state = Arc::new(FakeState::default());
    registry
        .device_arrived(canon_450d(), key.clone(), fake_factory(state.clone()))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    // Live-view model gets a companion focuser.
    assert!(registry.has_focuser(&key));

    camera.request(Request::Connect).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Connection), PropertyState::Ok);
    assert!(camera.connected());
    assert!(state.seen(op::OPEN_SESSION));
    assert!(state.seen(op::CANON_SET_REMOTE_MODE));
    // Streaming is visible for this model and works end to end.
    let streaming = camera.property(PropertyKey::Streaming).unwrap();
    assert!(!streaming.hidden);
    camera.request(Request::Streaming(true)).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Streaming), PropertyState::Ok);
    assert!(state.seen(op::CANON_INITIATE_VIEWFINDER));

    // Capture completes once the fake reports an added object.
    camera.request(Request::StartExposure).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Exposure), PropertyState::Ok);
    assert!(state.seen(op::CANON_REMOTE_RELEASE_ON));
    assert!(state.seen(op::CANON_GET_EVENT));

    // Departure tears down focuser and camera and closes the session.
    drop(camera);
    registry.device_left(&key);
    assert_eq!(registry.len(), 0);
    wait_for_detach(&events, "focuser");
    wait_for_detach(&events, "Canon EOS 450D");
    assert!(state.seen(op::CLOSE_SESSION));
    // The advisory claim was released; a fresh claim succeeds.
    let reclaim = ptpcam::registry::claim(&key).unwrap();
    drop(reclaim);
}

#[test]
fn test_generic_ptp_device_connects_and_captures() {
    init_logging();
    let (updates, events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(8, &[1]);
    let state = Arc::new(FakeState::default());
    // No vendor extension: the generic PTP fallback drives this device.
    let phone = model::lookup(0x05AC, 0x12A8).unwrap();
    registry
        .device_arrived(phone, key.clone(), fake_factory(state.clone()))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    assert!(!registry.has_focuser(&key));
    assert!(camera.property(PropertyKey::Streaming).unwrap().hidden);

    camera.request(Request::Connect).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Connection), PropertyState::Ok);
    assert!(state.seen(op::GET_DEVICE_INFO));

    // Capture completes through the interrupt-pipe ObjectAdded event.
    camera.request(Request::StartExposure).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Exposure), PropertyState::Ok);
    assert!(state.seen(op::INITIATE_CAPTURE));
    drop(camera);
    registry.shutdown();
}

#[test]
fn test_hidden_capability_is_never_scheduled() {
    init_logging();
    let (updates, _events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(4, &[1]);
    let state = Arc::new(FakeState::default());
    // Sony binds no lock slot at all.
    let sony = model::lookup(model::SONY_VID, 0x096f).unwrap();
    registry
        .device_arrived(sony, key.clone(), fake_factory(state.clone()))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    assert!(camera.property(PropertyKey::Lock).unwrap().hidden);
    assert!(matches!(
        camera.request(Request::Lock(true)),
        Err(PtpError::CapabilityAbsent(_))
    ));
    // Nothing reached the wire.
    assert!(state.operations.lock().unwrap().is_empty());
    registry.shutdown();
}

#[test]
fn test_no_liveview_model_hides_streaming() {
    init_logging();
    let (updates, _events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(5, &[1]);
    let nikon = model::lookup(model::NIKON_VID, 0x0424).unwrap(); // D3000, no live view
    registry
        .device_arrived(nikon, key.clone(), fake_factory(Arc::new(FakeState::default())))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    assert!(!registry.has_focuser(&key));
    assert!(camera.property(PropertyKey::Streaming).unwrap().hidden);
    assert!(matches!(
        camera.request(Request::Streaming(true)),
        Err(PtpError::CapabilityAbsent(_))
    ));
    registry.shutdown();
}

#[test]
fn test_transport_failure_alerts_without_wedging() {
    init_logging();
    let (updates, events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(6, &[1]);
    let state = Arc::new(FakeState::default());
    registry
        .device_arrived(canon_450d(), key.clone(), fake_factory(state.clone()))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    camera.request(Request::Connect).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Connection), PropertyState::Ok);

    // A dead cable turns the in-flight request into an alert.
    state.fail_writes.store(true, Ordering::Relaxed);
    camera.request(Request::Autofocus).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Autofocus), PropertyState::Alert);

    // The dispatcher is not wedged: once the transport recovers, the next
    // request on the same property goes through.
    state.fail_writes.store(false, Ordering::Relaxed);
    camera.request(Request::Autofocus).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Autofocus), PropertyState::Ok);
    drop(camera);
    registry.shutdown();
}

#[test]
fn test_vendor_properties_defined_on_connect_and_deleted_on_disconnect() {
    init_logging();
    let (updates, events) = crossbeam_channel::unbounded();
    let registry = DeviceRegistry::new(updates);
    let key = DeviceKey::new(7, &[1]);
    let state = Arc::new(FakeState::default());
    registry
        .device_arrived(canon_450d(), key.clone(), fake_factory(state.clone()))
        .unwrap();
    let camera = registry.camera(&key).unwrap();
    camera.request(Request::Connect).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Connection), PropertyState::Ok);
    let aperture = camera
        .property(PropertyKey::Vendor(ptpcam::codes::prop::CANON_APERTURE))
        .unwrap();
    assert!(!aperture.hidden);

    camera.request(Request::Disconnect).unwrap();
    assert_eq!(wait_for_state(&events, PropertyKey::Connection), PropertyState::Ok);
    assert!(!camera.connected());
    assert!(camera
        .property(PropertyKey::Vendor(ptpcam::codes::prop::CANON_APERTURE))
        .is_none());
    drop(camera);
    registry.shutdown();
}
