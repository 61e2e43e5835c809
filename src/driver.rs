//! Driver entry point: owns the registry and the hotplug monitor, and
//! exposes the init/shutdown lifecycle to the hosting framework.

use crate::camera::DeviceEvent;
use crate::hotplug::HotplugMonitor;
use crate::registry::DeviceRegistry;
use crate::Result;
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// Lifecycle actions the hosting framework can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    Init,
    Shutdown,
    Info,
}

/// Static driver identification.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
}

/// The PTP camera driver. Create one per process; `run(Init)` starts USB
/// monitoring and `run(Shutdown)` tears everything down.
pub struct PtpDriver {
    registry: Arc<DeviceRegistry>,
    monitor: Option<HotplugMonitor>,
    last_action: DriverAction,
}

impl PtpDriver {
    /// Build the driver and the event stream it publishes device and
    /// property updates on.
    pub fn new() -> (PtpDriver, Receiver<DeviceEvent>) {
        let (updates, events) = crossbeam_channel::unbounded();
        let driver = PtpDriver {
            registry: Arc::new(DeviceRegistry::new(updates)),
            monitor: None,
            last_action: DriverAction::Shutdown,
        };
        (driver, events)
    }

    pub fn info(&self) -> DriverInfo {
        DriverInfo {
            name: "PTP Camera",
            description: "USB PTP tethered camera driver",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// The device pool, for direct lookups by the hosting framework.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Run one lifecycle action. Repeating the last action is a no-op, so
    /// double init or double shutdown is harmless.
    pub fn run(&mut self, action: DriverAction) -> Result<()> {
        if action == self.last_action {
            return Ok(());
        }
        match action {
            DriverAction::Init => {
                log::info!("{} {}: init", self.info().name, self.info().version);
                self.monitor = Some(HotplugMonitor::start(self.registry.clone())?);
                self.last_action = DriverAction::Init;
            }
            DriverAction::Shutdown => {
                log::info!("{}: shutdown", self.info().name);
                if let Some(mut monitor) = self.monitor.take() {
                    monitor.stop();
                }
                self.registry.shutdown();
                self.last_action = DriverAction::Shutdown;
            }
            DriverAction::Info => {
                let info = self.info();
                log::info!("{} {} ({})", info.name, info.version, info.description);
            }
        }
        Ok(())
    }
}

impl Drop for PtpDriver {
    fn drop(&mut self) {
        let _ = self.run(DriverAction::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut driver, _events) = PtpDriver::new();
        // Fresh driver starts shut down; repeating the action is a no-op.
        assert!(driver.run(DriverAction::Shutdown).is_ok());
        assert!(driver.run(DriverAction::Shutdown).is_ok());
        assert_eq!(driver.info().name, "PTP Camera");
    }
}
