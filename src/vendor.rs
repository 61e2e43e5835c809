//! Vendor capability tables.
//!
//! Each manufacturer implements a different subset of the high-level camera
//! features, with incompatible operation and property codes. A `VendorOps`
//! implementation is bound once per device at attach time, chosen by USB
//! vendor id, and never changed; the `capabilities` set is the first-class
//! "is this feature available" query — the dispatcher hides the upstream
//! property for anything absent and never schedules it.

use crate::codes::{event, op, prop};
use crate::model::{CameraModel, CANON_VID, NIKON_VID, SONY_VID};
use crate::protocol;
use crate::session::{PtpEvent, PtpSession};
use crate::{PtpError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long an exposure waits for a completion event before giving up.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Camera manufacturer, selected from the USB vendor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Canon,
    Nikon,
    Sony,
    GenericPtp,
}

impl Vendor {
    pub fn from_vid(vendor_id: u16) -> Vendor {
        match vendor_id {
            CANON_VID => Vendor::Canon,
            NIKON_VID => Vendor::Nikon,
            SONY_VID => Vendor::Sony,
            _ => Vendor::GenericPtp,
        }
    }
}

/// One optional high-level camera feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Exposure,
    Liveview,
    Lock,
    Autofocus,
    Zoom,
    Focus,
    SetHostTime,
    SetProperty,
}

bitflags::bitflags! {
    /// The set of capabilities bound for one device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u16 {
        const EXPOSURE      = 1 << 0;
        const LIVEVIEW      = 1 << 1;
        const LOCK          = 1 << 2;
        const AUTOFOCUS     = 1 << 3;
        const ZOOM          = 1 << 4;
        const FOCUS         = 1 << 5;
        const SET_HOST_TIME = 1 << 6;
        const SET_PROPERTY  = 1 << 7;
    }
}

impl Capability {
    pub fn mask(self) -> Capabilities {
        match self {
            Capability::Exposure => Capabilities::EXPOSURE,
            Capability::Liveview => Capabilities::LIVEVIEW,
            Capability::Lock => Capabilities::LOCK,
            Capability::Autofocus => Capabilities::AUTOFOCUS,
            Capability::Zoom => Capabilities::ZOOM,
            Capability::Focus => Capabilities::FOCUS,
            Capability::SetHostTime => Capabilities::SET_HOST_TIME,
            Capability::SetProperty => Capabilities::SET_PROPERTY,
        }
    }
}

/// Vendor-specific implementations of the optional capability slots.
///
/// Methods not overridden report `CapabilityAbsent`; the dispatcher must
/// never reach them because the corresponding property is hidden, so the
/// defaults are a backstop, not a code path.
pub trait VendorOps: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Capabilities this vendor binds for the given model.
    fn capabilities(&self, model: &CameraModel) -> Capabilities;

    /// Put the camera into remote-control mode and return the vendor
    /// device-property codes to publish upstream.
    fn initialise(&self, session: &mut PtpSession) -> Result<Vec<u16>>;

    /// Trigger a capture and wait for completion, polling `abort`.
    fn exposure(&self, session: &mut PtpSession, abort: &AtomicBool) -> Result<()>;

    /// Start or stop the live preview stream.
    fn liveview(&self, _session: &mut PtpSession, _start: bool) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::Liveview))
    }

    /// Lock or unlock the camera's own UI.
    fn lock(&self, _session: &mut PtpSession, _lock: bool) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::Lock))
    }

    /// Trigger one autofocus cycle.
    fn autofocus(&self, _session: &mut PtpSession) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::Autofocus))
    }

    /// Toggle zoom preview.
    fn zoom(&self, _session: &mut PtpSession, _on: bool) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::Zoom))
    }

    /// Relative focus motor move; negative steps move inward.
    fn focus(&self, _session: &mut PtpSession, _steps: i32) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::Focus))
    }

    /// Push the host clock to the camera.
    fn set_host_time(&self, _session: &mut PtpSession) -> Result<()> {
        Err(PtpError::CapabilityAbsent(Capability::SetHostTime))
    }

    /// Apply a device-property edit using the vendor encoding.
    fn set_property(&self, session: &mut PtpSession, code: u16, value: u32) -> Result<()>;

    /// Poll for one pending event, translated to generic PTP event codes.
    /// Generic PTP reads the interrupt pipe; Canon/Nikon poll their
    /// get-event operation; Sony reports none.
    fn poll_event(&self, _session: &mut PtpSession) -> Result<Option<PtpEvent>> {
        Ok(None)
    }
}

/// Select the capability table for a vendor. Bound once, immutable.
pub fn ops_for(vendor: Vendor) -> &'static dyn VendorOps {
    match vendor {
        Vendor::Canon => &CanonOps,
        Vendor::Nikon => &NikonOps,
        Vendor::Sony => &SonyOps,
        Vendor::GenericPtp => &GenericOps,
    }
}

/// Wait for an object-added or capture-complete event, polling the abort
/// flag between checks. Cancellation is cooperative: an in-flight USB
/// exchange is never interrupted.
fn wait_for_capture(
    ops: &dyn VendorOps,
    session: &mut PtpSession,
    abort: &AtomicBool,
) -> Result<()> {
    let deadline = Instant::now() + CAPTURE_TIMEOUT;
    loop {
        if abort.load(Ordering::Relaxed) {
            return Err(PtpError::Aborted);
        }
        if let Some(ev) = ops.poll_event(session)? {
            match ev.code {
                event::OBJECT_ADDED | event::CAPTURE_COMPLETE => return Ok(()),
                _ => {}
            }
        }
        if Instant::now() >= deadline {
            return Err(PtpError::Timeout);
        }
        std::thread::sleep(CAPTURE_POLL_INTERVAL);
    }
}

// -- Generic PTP --

struct GenericOps;

impl VendorOps for GenericOps {
    fn vendor(&self) -> Vendor {
        Vendor::GenericPtp
    }

    fn capabilities(&self, _model: &CameraModel) -> Capabilities {
        Capabilities::EXPOSURE | Capabilities::SET_PROPERTY | Capabilities::SET_HOST_TIME
    }

    fn initialise(&self, session: &mut PtpSession) -> Result<Vec<u16>> {
        session.execute(op::GET_DEVICE_INFO, &[])?.require_ok()?;
        Ok(Vec::new())
    }

    fn exposure(&self, session: &mut PtpSession, abort: &AtomicBool) -> Result<()> {
        session.execute(op::INITIATE_CAPTURE, &[0, 0])?.require_ok()?;
        wait_for_capture(self, session, abort)
    }

    fn set_host_time(&self, session: &mut PtpSession) -> Result<()> {
        let now = chrono::Local::now().format("%Y%m%dT%H%M%S").to_string();
        let payload = protocol::encode_string(&now);
        session
            .execute_with_data(
                op::SET_DEVICE_PROP_VALUE,
                &[prop::DATE_TIME as u32],
                Some(&payload),
            )?
            .require_ok()?;
        Ok(())
    }

    fn set_property(&self, session: &mut PtpSession, code: u16, value: u32) -> Result<()> {
        session
            .execute_with_data(
                op::SET_DEVICE_PROP_VALUE,
                &[code as u32],
                Some(&value.to_le_bytes()),
            )?
            .require_ok()?;
        Ok(())
    }

    fn poll_event(&self, session: &mut PtpSession) -> Result<Option<PtpEvent>> {
        session.poll_interrupt_event()
    }
}

// -- Canon EOS --

struct CanonOps;

impl VendorOps for CanonOps {
    fn vendor(&self) -> Vendor {
        Vendor::Canon
    }

    fn capabilities(&self, model: &CameraModel) -> Capabilities {
        let mut caps = Capabilities::EXPOSURE
            | Capabilities::LOCK
            | Capabilities::AUTOFOCUS
            | Capabilities::SET_HOST_TIME
            | Capabilities::SET_PROPERTY;
        if model.live_view() {
            caps |= Capabilities::LIVEVIEW | Capabilities::ZOOM | Capabilities::FOCUS;
        }
        caps
    }

    fn initialise(&self, session: &mut PtpSession) -> Result<Vec<u16>> {
        session.execute(op::CANON_SET_REMOTE_MODE, &[1])?.require_ok()?;
        session.execute(op::CANON_SET_EVENT_MODE, &[1])?.require_ok()?;
        Ok(vec![
            prop::CANON_APERTURE,
            prop::CANON_SHUTTER_SPEED,
            prop::CANON_ISO,
            prop::CANON_WHITE_BALANCE,
        ])
    }

    fn exposure(&self, session: &mut PtpSession, abort: &AtomicBool) -> Result<()> {
        session.execute(op::CANON_REMOTE_RELEASE_ON, &[1, 0])?.require_ok()?;
        session.execute(op::CANON_REMOTE_RELEASE_OFF, &[1])?.require_ok()?;
        wait_for_capture(self, session, abort)
    }

    fn liveview(&self, session: &mut PtpSession, start: bool) -> Result<()> {
        let code = if start {
            op::CANON_INITIATE_VIEWFINDER
        } else {
            op::CANON_TERMINATE_VIEWFINDER
        };
        session.execute(code, &[])?.require_ok()?;
        Ok(())
    }

    fn lock(&self, session: &mut PtpSession, lock: bool) -> Result<()> {
        let code = if lock {
            op::CANON_SET_UI_LOCK
        } else {
            op::CANON_RESET_UI_LOCK
        };
        session.execute(code, &[])?.require_ok()?;
        Ok(())
    }

    fn autofocus(&self, session: &mut PtpSession) -> Result<()> {
        session.execute(op::CANON_DO_AF, &[])?.require_ok()?;
        Ok(())
    }

    fn zoom(&self, session: &mut PtpSession, on: bool) -> Result<()> {
        // EOS zoom factor: 1 = full frame, 5 = magnified preview.
        let factor = if on { 5 } else { 1 };
        session.execute(op::CANON_ZOOM, &[factor])?.require_ok()?;
        Ok(())
    }

    fn focus(&self, session: &mut PtpSession, steps: i32) -> Result<()> {
        // DriveLens: low bits are the step size, bit 15 selects direction.
        let magnitude = steps.unsigned_abs().min(3);
        let param = if steps < 0 { magnitude } else { 0x8000 | magnitude };
        session.execute(op::CANON_DRIVE_LENS, &[param])?.require_ok()?;
        Ok(())
    }

    fn set_host_time(&self, session: &mut PtpSession) -> Result<()> {
        let now = chrono::Local::now().timestamp() as u32;
        self.set_property(session, prop::CANON_UTC_TIME, now)
    }

    fn set_property(&self, session: &mut PtpSession, code: u16, value: u32) -> Result<()> {
        // EOS carries the edit in the data phase: u32 size, u32 code, value.
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&12u32.to_le_bytes());
        payload.extend_from_slice(&(code as u32).to_le_bytes());
        payload.extend_from_slice(&value.to_le_bytes());
        session
            .execute_with_data(op::CANON_SET_DEVICE_PROP_VALUE, &[], Some(&payload))?
            .require_ok()?;
        Ok(())
    }

    fn poll_event(&self, session: &mut PtpSession) -> Result<Option<PtpEvent>> {
        let data = session.execute(op::CANON_GET_EVENT, &[])?.require_ok()?;
        Ok(parse_canon_events(&data).into_iter().next())
    }
}

/// Decode the EOS event blob: records of u32 length, u32 event code, then
/// parameters. Codes are translated to generic PTP event codes.
fn parse_canon_events(payload: &[u8]) -> Vec<PtpEvent> {
    let mut events = Vec::new();
    let mut rest = payload;
    while rest.len() >= 8 {
        let length = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if length < 8 || length > rest.len() {
            break;
        }
        let code = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as u16;
        let params = protocol::parse_params(&rest[8..length]);
        let translated = match code {
            event::CANON_OBJECT_ADDED_EX => Some(event::OBJECT_ADDED),
            event::CANON_PROP_VALUE_CHANGED => Some(event::DEVICE_PROP_CHANGED),
            0 => None, // terminator record
            _ => Some(code),
        };
        if let Some(code) = translated {
            events.push(PtpEvent { code, params });
        }
        rest = &rest[length..];
    }
    events
}

// -- Nikon --

struct NikonOps;

impl VendorOps for NikonOps {
    fn vendor(&self) -> Vendor {
        Vendor::Nikon
    }

    fn capabilities(&self, model: &CameraModel) -> Capabilities {
        // No autofocus slot on Nikon.
        let mut caps = Capabilities::EXPOSURE
            | Capabilities::LOCK
            | Capabilities::SET_HOST_TIME
            | Capabilities::SET_PROPERTY;
        if model.live_view() {
            caps |= Capabilities::LIVEVIEW | Capabilities::ZOOM | Capabilities::FOCUS;
        }
        caps
    }

    fn initialise(&self, session: &mut PtpSession) -> Result<Vec<u16>> {
        session.execute(op::GET_DEVICE_INFO, &[])?.require_ok()?;
        Ok(vec![
            prop::NIKON_SHOOTING_MODE,
            prop::NIKON_EXPOSURE_DELAY,
        ])
    }

    fn exposure(&self, session: &mut PtpSession, abort: &AtomicBool) -> Result<()> {
        session
            .execute(op::NIKON_INITIATE_CAPTURE_SDRAM, &[0xFFFF_FFFF])?
            .require_ok()?;
        wait_for_capture(self, session, abort)
    }

    fn liveview(&self, session: &mut PtpSession, start: bool) -> Result<()> {
        let code = if start {
            op::NIKON_START_LIVE_VIEW
        } else {
            op::NIKON_END_LIVE_VIEW
        };
        session.execute(code, &[])?.require_ok()?;
        Ok(())
    }

    fn lock(&self, session: &mut PtpSession, lock: bool) -> Result<()> {
        session
            .execute(op::NIKON_CHANGE_CAMERA_MODE, &[u32::from(lock)])?
            .require_ok()?;
        Ok(())
    }

    fn zoom(&self, session: &mut PtpSession, on: bool) -> Result<()> {
        self.set_property(session, prop::NIKON_LIVE_VIEW_ZOOM, u32::from(on))
    }

    fn focus(&self, session: &mut PtpSession, steps: i32) -> Result<()> {
        // MfDrive direction: 1 = closer, 2 = toward infinity.
        let direction = if steps < 0 { 1 } else { 2 };
        session
            .execute(op::NIKON_MF_DRIVE, &[direction, steps.unsigned_abs()])?
            .require_ok()?;
        Ok(())
    }

    fn set_host_time(&self, session: &mut PtpSession) -> Result<()> {
        GenericOps.set_host_time(session)
    }

    fn set_property(&self, session: &mut PtpSession, code: u16, value: u32) -> Result<()> {
        GenericOps.set_property(session, code, value)
    }

    fn poll_event(&self, session: &mut PtpSession) -> Result<Option<PtpEvent>> {
        let data = session.execute(op::NIKON_GET_EVENT, &[])?.require_ok()?;
        Ok(parse_nikon_events(&data).into_iter().next())
    }
}

/// Decode the Nikon event queue: u16 record count, then u16 code + u32
/// parameter per record. Vendor codes are translated to generic ones.
fn parse_nikon_events(payload: &[u8]) -> Vec<PtpEvent> {
    if payload.len() < 2 {
        return Vec::new();
    }
    let count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let mut events = Vec::new();
    for record in payload[2..].chunks_exact(6).take(count) {
        let code = u16::from_le_bytes([record[0], record[1]]);
        let param = u32::from_le_bytes([record[2], record[3], record[4], record[5]]);
        let code = match code {
            event::NIKON_OBJECT_ADDED_SDRAM => event::OBJECT_ADDED,
            event::NIKON_CAPTURE_COMPLETE_SDRAM => event::CAPTURE_COMPLETE,
            other => other,
        };
        events.push(PtpEvent {
            code,
            params: vec![param],
        });
    }
    events
}

// -- Sony --

struct SonyOps;

impl SonyOps {
    /// Sony routes button-style controls through SetControlDeviceB with the
    /// property code as parameter and the value in the data phase.
    fn control_device_b(&self, session: &mut PtpSession, code: u16, value: u16) -> Result<()> {
        session
            .execute_with_data(
                op::SONY_SET_CONTROL_DEVICE_B,
                &[code as u32],
                Some(&value.to_le_bytes()),
            )?
            .require_ok()?;
        Ok(())
    }
}

impl VendorOps for SonyOps {
    fn vendor(&self) -> Vendor {
        Vendor::Sony
    }

    fn capabilities(&self, _model: &CameraModel) -> Capabilities {
        // No lock, zoom, focus or host-time slot; liveview is unconditional.
        Capabilities::EXPOSURE
            | Capabilities::AUTOFOCUS
            | Capabilities::SET_PROPERTY
            | Capabilities::LIVEVIEW
    }

    fn initialise(&self, session: &mut PtpSession) -> Result<Vec<u16>> {
        // Three-phase SDIO handshake with a device-info probe in between.
        session.execute(op::SONY_SDIO_CONNECT, &[1, 0, 0])?.require_ok()?;
        session.execute(op::SONY_SDIO_CONNECT, &[2, 0, 0])?.require_ok()?;
        session
            .execute(op::SONY_GET_SDIO_EXT_DEVICE_INFO, &[0xC8])?
            .require_ok()?;
        session.execute(op::SONY_SDIO_CONNECT, &[3, 0, 0])?.require_ok()?;
        Ok(vec![prop::SONY_SHUTTER_SPEED, prop::SONY_ISO])
    }

    fn exposure(&self, session: &mut PtpSession, _abort: &AtomicBool) -> Result<()> {
        // Press and release the virtual shutter button; Sony reports no
        // completion event over this path.
        self.control_device_b(session, prop::SONY_CAPTURE, 2)?;
        self.control_device_b(session, prop::SONY_CAPTURE, 1)
    }

    fn liveview(&self, session: &mut PtpSession, start: bool) -> Result<()> {
        // Preview is toggled through the display property; frames then
        // arrive as objects on the bulk pipe.
        self.set_property(session, prop::SONY_LIVE_VIEW_DISPLAY, u32::from(start))
    }

    fn autofocus(&self, session: &mut PtpSession) -> Result<()> {
        self.control_device_b(session, prop::SONY_AUTOFOCUS, 2)?;
        self.control_device_b(session, prop::SONY_AUTOFOCUS, 1)
    }

    fn set_property(&self, session: &mut PtpSession, code: u16, value: u32) -> Result<()> {
        session
            .execute_with_data(
                op::SONY_SET_CONTROL_DEVICE_A,
                &[code as u32],
                Some(&value.to_le_bytes()),
            )?
            .require_ok()?;
        Ok(())
    }
}
