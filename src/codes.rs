//! PTP and vendor-extension code tables.
//!
//! Each manufacturer layers thousands of 16-bit operation/response/event/
//! property codes with incompatible meanings on top of generic PTP. The
//! tables here are representative subsets; resolving codes centrally keeps
//! vendor conditionals out of the transaction engine. Unknown codes fall
//! back to a hex label.

use crate::vendor::Vendor;

// -- Generic PTP operation codes --
pub mod op {
    pub const GET_DEVICE_INFO: u16 = 0x1001;
    pub const OPEN_SESSION: u16 = 0x1002;
    pub const CLOSE_SESSION: u16 = 0x1003;
    pub const GET_STORAGE_IDS: u16 = 0x1004;
    pub const GET_OBJECT: u16 = 0x1009;
    pub const INITIATE_CAPTURE: u16 = 0x100E;
    pub const GET_DEVICE_PROP_VALUE: u16 = 0x1015;
    pub const SET_DEVICE_PROP_VALUE: u16 = 0x1016;

    // Canon EOS
    pub const CANON_GET_DEVICE_INFO_EX: u16 = 0x9103;
    pub const CANON_SET_REMOTE_MODE: u16 = 0x9114;
    pub const CANON_SET_EVENT_MODE: u16 = 0x9115;
    pub const CANON_GET_EVENT: u16 = 0x9116;
    pub const CANON_SET_DEVICE_PROP_VALUE: u16 = 0x9110;
    pub const CANON_REMOTE_RELEASE_ON: u16 = 0x9128;
    pub const CANON_REMOTE_RELEASE_OFF: u16 = 0x9129;
    pub const CANON_INITIATE_VIEWFINDER: u16 = 0x9151;
    pub const CANON_TERMINATE_VIEWFINDER: u16 = 0x9152;
    pub const CANON_GET_VIEWFINDER_DATA: u16 = 0x9153;
    pub const CANON_DO_AF: u16 = 0x9154;
    pub const CANON_DRIVE_LENS: u16 = 0x9155;
    pub const CANON_ZOOM: u16 = 0x9158;
    pub const CANON_SET_UI_LOCK: u16 = 0x911B;
    pub const CANON_RESET_UI_LOCK: u16 = 0x911C;

    // Nikon
    pub const NIKON_INITIATE_CAPTURE_SDRAM: u16 = 0x90C0;
    pub const NIKON_AF_DRIVE: u16 = 0x90C1;
    pub const NIKON_CHANGE_CAMERA_MODE: u16 = 0x90C2;
    pub const NIKON_GET_EVENT: u16 = 0x90C7;
    pub const NIKON_DEVICE_READY: u16 = 0x90C8;
    pub const NIKON_START_LIVE_VIEW: u16 = 0x9201;
    pub const NIKON_END_LIVE_VIEW: u16 = 0x9202;
    pub const NIKON_GET_LIVE_VIEW_IMAGE: u16 = 0x9203;
    pub const NIKON_MF_DRIVE: u16 = 0x9204;
    pub const NIKON_CHANGE_AF_AREA: u16 = 0x9205;

    // Sony
    pub const SONY_SDIO_CONNECT: u16 = 0x9201;
    pub const SONY_GET_SDIO_EXT_DEVICE_INFO: u16 = 0x9202;
    pub const SONY_SET_CONTROL_DEVICE_A: u16 = 0x9205;
    pub const SONY_SET_CONTROL_DEVICE_B: u16 = 0x9207;
    pub const SONY_GET_ALL_DEVICE_PROP_DATA: u16 = 0x9209;
}

// -- Generic PTP response codes --
pub mod rsp {
    pub const OK: u16 = 0x2001;
    pub const GENERAL_ERROR: u16 = 0x2002;
    pub const SESSION_NOT_OPEN: u16 = 0x2003;
    pub const OPERATION_NOT_SUPPORTED: u16 = 0x2005;
    pub const INCOMPLETE_TRANSFER: u16 = 0x2007;
    pub const DEVICE_BUSY: u16 = 0x2019;
    pub const SESSION_ALREADY_OPEN: u16 = 0x201E;

    pub const NIKON_NOT_LIVE_VIEW: u16 = 0xA00B;
    pub const NIKON_OUT_OF_FOCUS: u16 = 0xA002;
}

// -- Generic PTP event codes --
pub mod event {
    pub const CANCEL_TRANSACTION: u16 = 0x4001;
    pub const OBJECT_ADDED: u16 = 0x4002;
    pub const DEVICE_PROP_CHANGED: u16 = 0x4006;
    pub const CAPTURE_COMPLETE: u16 = 0x400D;

    pub const CANON_OBJECT_ADDED_EX: u16 = 0xC181;
    pub const CANON_PROP_VALUE_CHANGED: u16 = 0xC189;
    pub const NIKON_OBJECT_ADDED_SDRAM: u16 = 0xC101;
    pub const NIKON_CAPTURE_COMPLETE_SDRAM: u16 = 0xC102;
}

// -- Device property codes --
pub mod prop {
    pub const BATTERY_LEVEL: u16 = 0x5001;
    pub const EXPOSURE_PROGRAM_MODE: u16 = 0x500E;
    pub const EXPOSURE_INDEX: u16 = 0x500F;
    pub const DATE_TIME: u16 = 0x5011;

    pub const CANON_APERTURE: u16 = 0xD101;
    pub const CANON_SHUTTER_SPEED: u16 = 0xD102;
    pub const CANON_ISO: u16 = 0xD103;
    pub const CANON_WHITE_BALANCE: u16 = 0xD106;
    pub const CANON_UTC_TIME: u16 = 0xD113;

    pub const NIKON_SHOOTING_MODE: u16 = 0xD090;
    pub const NIKON_EXPOSURE_DELAY: u16 = 0xD06A;
    pub const NIKON_LIVE_VIEW_ZOOM: u16 = 0xD1A3;

    pub const SONY_SHUTTER_SPEED: u16 = 0xD20D;
    pub const SONY_LIVE_VIEW_DISPLAY: u16 = 0xD221;
    pub const SONY_ISO: u16 = 0xD21E;
    pub const SONY_CAPTURE: u16 = 0xD2C1;
    pub const SONY_AUTOFOCUS: u16 = 0xD2C2;
}

/// Code class discriminator for diagnostic resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    Operation,
    Response,
    Event,
    Property,
    PropertyValue,
}

type Table = &'static [(u16, &'static str)];
type ValueTable = &'static [(u16, u32, &'static str)];

/// Per-vendor code-to-label mapping for diagnostics.
///
/// One resolver is bound per device session at attach time and never
/// mutated. Vendor tables shadow the generic ones; anything unknown gets a
/// hex fallback rather than a failure.
pub struct Resolver {
    operations: Table,
    responses: Table,
    events: Table,
    properties: Table,
    property_values: ValueTable,
}

impl Resolver {
    /// Human-readable label for a code in the given class.
    pub fn label(&self, class: CodeClass, code: u16) -> String {
        let table = match class {
            CodeClass::Operation => self.operations,
            CodeClass::Response => self.responses,
            CodeClass::Event => self.events,
            CodeClass::Property | CodeClass::PropertyValue => self.properties,
        };
        lookup(table, code)
            .or_else(|| lookup(generic_table(class), code))
            .map(str::to_string)
            .unwrap_or_else(|| format!("PTP 0x{:04x}", code))
    }

    /// Symbolic name for a device property code, if the table knows it.
    pub fn property_name(&self, code: u16) -> Option<&'static str> {
        lookup(self.properties, code).or_else(|| lookup(GENERIC_PROPERTIES, code))
    }

    /// Label for a specific value of an enumerated property.
    pub fn property_value_label(&self, property: u16, value: u32) -> String {
        self.property_values
            .iter()
            .find(|(p, v, _)| *p == property && *v == value)
            .map(|(_, _, label)| (*label).to_string())
            .unwrap_or_else(|| format!("{}", value))
    }
}

fn lookup(table: Table, code: u16) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

fn generic_table(class: CodeClass) -> Table {
    match class {
        CodeClass::Operation => GENERIC_OPERATIONS,
        CodeClass::Response => GENERIC_RESPONSES,
        CodeClass::Event => GENERIC_EVENTS,
        CodeClass::Property | CodeClass::PropertyValue => GENERIC_PROPERTIES,
    }
}

/// Select the resolver set for a vendor. Bound once per device session.
pub fn resolver_for(vendor: Vendor) -> &'static Resolver {
    match vendor {
        Vendor::Canon => &CANON_RESOLVER,
        Vendor::Nikon => &NIKON_RESOLVER,
        Vendor::Sony => &SONY_RESOLVER,
        Vendor::GenericPtp => &GENERIC_RESOLVER,
    }
}

static GENERIC_OPERATIONS: Table = &[
    (op::GET_DEVICE_INFO, "GetDeviceInfo"),
    (op::OPEN_SESSION, "OpenSession"),
    (op::CLOSE_SESSION, "CloseSession"),
    (op::GET_STORAGE_IDS, "GetStorageIDs"),
    (op::GET_OBJECT, "GetObject"),
    (op::INITIATE_CAPTURE, "InitiateCapture"),
    (op::GET_DEVICE_PROP_VALUE, "GetDevicePropValue"),
    (op::SET_DEVICE_PROP_VALUE, "SetDevicePropValue"),
];

static GENERIC_RESPONSES: Table = &[
    (rsp::OK, "OK"),
    (rsp::GENERAL_ERROR, "GeneralError"),
    (rsp::SESSION_NOT_OPEN, "SessionNotOpen"),
    (rsp::OPERATION_NOT_SUPPORTED, "OperationNotSupported"),
    (rsp::INCOMPLETE_TRANSFER, "IncompleteTransfer"),
    (rsp::DEVICE_BUSY, "DeviceBusy"),
    (rsp::SESSION_ALREADY_OPEN, "SessionAlreadyOpen"),
];

static GENERIC_EVENTS: Table = &[
    (event::CANCEL_TRANSACTION, "CancelTransaction"),
    (event::OBJECT_ADDED, "ObjectAdded"),
    (event::DEVICE_PROP_CHANGED, "DevicePropChanged"),
    (event::CAPTURE_COMPLETE, "CaptureComplete"),
];

static GENERIC_PROPERTIES: Table = &[
    (prop::BATTERY_LEVEL, "BatteryLevel"),
    (prop::EXPOSURE_PROGRAM_MODE, "ExposureProgramMode"),
    (prop::EXPOSURE_INDEX, "ExposureIndex"),
    (prop::DATE_TIME, "DateTime"),
];

static GENERIC_RESOLVER: Resolver = Resolver {
    operations: GENERIC_OPERATIONS,
    responses: GENERIC_RESPONSES,
    events: GENERIC_EVENTS,
    properties: GENERIC_PROPERTIES,
    property_values: &[],
};

static CANON_RESOLVER: Resolver = Resolver {
    operations: &[
        (op::CANON_GET_DEVICE_INFO_EX, "EOS GetDeviceInfoEx"),
        (op::CANON_SET_REMOTE_MODE, "EOS SetRemoteMode"),
        (op::CANON_SET_EVENT_MODE, "EOS SetEventMode"),
        (op::CANON_GET_EVENT, "EOS GetEvent"),
        (op::CANON_SET_DEVICE_PROP_VALUE, "EOS SetDevicePropValue"),
        (op::CANON_REMOTE_RELEASE_ON, "EOS RemoteReleaseOn"),
        (op::CANON_REMOTE_RELEASE_OFF, "EOS RemoteReleaseOff"),
        (op::CANON_INITIATE_VIEWFINDER, "EOS InitiateViewfinder"),
        (op::CANON_TERMINATE_VIEWFINDER, "EOS TerminateViewfinder"),
        (op::CANON_GET_VIEWFINDER_DATA, "EOS GetViewFinderData"),
        (op::CANON_DO_AF, "EOS DoAf"),
        (op::CANON_DRIVE_LENS, "EOS DriveLens"),
        (op::CANON_ZOOM, "EOS Zoom"),
        (op::CANON_SET_UI_LOCK, "EOS SetUILock"),
        (op::CANON_RESET_UI_LOCK, "EOS ResetUILock"),
    ],
    responses: &[],
    events: &[
        (event::CANON_OBJECT_ADDED_EX, "EOS ObjectAddedEx"),
        (event::CANON_PROP_VALUE_CHANGED, "EOS PropValueChanged"),
    ],
    properties: &[
        (prop::CANON_APERTURE, "Aperture"),
        (prop::CANON_SHUTTER_SPEED, "ShutterSpeed"),
        (prop::CANON_ISO, "ISO"),
        (prop::CANON_WHITE_BALANCE, "WhiteBalance"),
        (prop::CANON_UTC_TIME, "UTCTime"),
    ],
    property_values: &[
        (prop::CANON_WHITE_BALANCE, 0, "Auto"),
        (prop::CANON_WHITE_BALANCE, 1, "Daylight"),
        (prop::CANON_WHITE_BALANCE, 2, "Cloudy"),
        (prop::CANON_WHITE_BALANCE, 3, "Tungsten"),
        (prop::CANON_WHITE_BALANCE, 4, "Fluorescent"),
        (prop::CANON_ISO, 0x48, "100"),
        (prop::CANON_ISO, 0x50, "200"),
        (prop::CANON_ISO, 0x58, "400"),
        (prop::CANON_ISO, 0x60, "800"),
    ],
};

static NIKON_RESOLVER: Resolver = Resolver {
    operations: &[
        (op::NIKON_INITIATE_CAPTURE_SDRAM, "Nikon InitiateCaptureRecInSdram"),
        (op::NIKON_AF_DRIVE, "Nikon AfDrive"),
        (op::NIKON_CHANGE_CAMERA_MODE, "Nikon ChangeCameraMode"),
        (op::NIKON_GET_EVENT, "Nikon GetEvent"),
        (op::NIKON_DEVICE_READY, "Nikon DeviceReady"),
        (op::NIKON_START_LIVE_VIEW, "Nikon StartLiveView"),
        (op::NIKON_END_LIVE_VIEW, "Nikon EndLiveView"),
        (op::NIKON_GET_LIVE_VIEW_IMAGE, "Nikon GetLiveViewImage"),
        (op::NIKON_MF_DRIVE, "Nikon MfDrive"),
        (op::NIKON_CHANGE_AF_AREA, "Nikon ChangeAfArea"),
    ],
    responses: &[
        (rsp::NIKON_NOT_LIVE_VIEW, "Nikon NotLiveView"),
        (rsp::NIKON_OUT_OF_FOCUS, "Nikon OutOfFocus"),
    ],
    events: &[
        (event::NIKON_OBJECT_ADDED_SDRAM, "Nikon ObjectAddedInSdram"),
        (event::NIKON_CAPTURE_COMPLETE_SDRAM, "Nikon CaptureCompleteRecInSdram"),
    ],
    properties: &[
        (prop::NIKON_SHOOTING_MODE, "ShootingMode"),
        (prop::NIKON_EXPOSURE_DELAY, "ExposureDelay"),
        (prop::NIKON_LIVE_VIEW_ZOOM, "LiveViewZoom"),
    ],
    property_values: &[],
};

static SONY_RESOLVER: Resolver = Resolver {
    operations: &[
        (op::SONY_SDIO_CONNECT, "Sony SDIOConnect"),
        (op::SONY_GET_SDIO_EXT_DEVICE_INFO, "Sony GetSDIOGetExtDeviceInfo"),
        (op::SONY_SET_CONTROL_DEVICE_A, "Sony SetControlDeviceA"),
        (op::SONY_SET_CONTROL_DEVICE_B, "Sony SetControlDeviceB"),
        (op::SONY_GET_ALL_DEVICE_PROP_DATA, "Sony GetAllDevicePropData"),
    ],
    responses: &[],
    events: &[],
    properties: &[
        (prop::SONY_SHUTTER_SPEED, "ShutterSpeed"),
        (prop::SONY_LIVE_VIEW_DISPLAY, "LiveViewDisplay"),
        (prop::SONY_ISO, "ISO"),
        (prop::SONY_CAPTURE, "Capture"),
        (prop::SONY_AUTOFOCUS, "Autofocus"),
    ],
    property_values: &[],
};
