//! # ptpcam - tethered camera control over USB PTP
//!
//! Drives DSLR/mirrorless cameras through the Picture Transfer Protocol with
//! Canon/Nikon/Sony vendor extensions. Provides:
//! - Hotplug-driven device lifecycle with a bounded slot pool
//! - A PTP transaction engine (session lifecycle, monotonic transaction ids)
//! - Per-vendor capability tables and code-table resolvers
//! - A property/command dispatcher reporting busy/ok/alert state upstream
//!
//! ## Quick Start
//! ```no_run
//! use ptpcam::{DriverAction, PtpDriver};
//!
//! let (mut driver, events) = PtpDriver::new();
//! driver.run(DriverAction::Init).unwrap();
//! for event in events.iter() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod error;
pub mod codes;
pub mod protocol;
pub mod transport;
pub mod session;
pub mod vendor;
pub mod model;
pub mod camera;
pub mod focuser;
pub mod registry;
pub mod hotplug;
pub mod driver;

pub use camera::{CameraDevice, DeviceEvent, Property, PropertyKey, PropertyState, Request};
pub use driver::{DriverAction, DriverInfo, PtpDriver};
pub use error::PtpError;
pub use focuser::FocuserLink;
pub use model::{CameraModel, ModelFlags};
pub use registry::{DeviceKey, DeviceRegistry};
pub use session::{PtpEvent, PtpSession, TransactionOutcome};
pub use transport::Transport;
pub use vendor::{Capabilities, Capability, Vendor};

/// Result type alias for ptpcam operations.
pub type Result<T> = std::result::Result<T, PtpError>;
