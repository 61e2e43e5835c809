//! USB hotplug monitoring. Arrivals are matched against the model table and
//! handed to the registry; departures tear the matching slot down. A pump
//! thread drives libusb event delivery until the monitor is stopped.

use crate::camera::TransportFactory;
use crate::model;
use crate::registry::{DeviceKey, DeviceRegistry};
use crate::transport::UsbTransport;
use crate::{PtpError, Result};
use rusb::UsbContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

fn device_key(device: &rusb::Device<rusb::Context>) -> DeviceKey {
    let ports = device.port_numbers().unwrap_or_default();
    DeviceKey::new(device.bus_number(), &ports)
}

struct PlugHandler {
    registry: Arc<DeviceRegistry>,
}

impl rusb::Hotplug<rusb::Context> for PlugHandler {
    fn device_arrived(&mut self, device: rusb::Device<rusb::Context>) {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                log::warn!("arrived device without descriptor: {}", e);
                return;
            }
        };
        let vid = descriptor.vendor_id();
        let pid = descriptor.product_id();
        let Some(found) = model::lookup(vid, pid) else {
            log::debug!("ignoring USB device {:04x}:{:04x}", vid, pid);
            return;
        };
        let key = device_key(&device);
        log::info!("{} arrived at {}", found.name, key);
        let factory: TransportFactory =
            Box::new(move || Ok(Box::new(UsbTransport::open(&device)?)));
        if let Err(e) = self.registry.device_arrived(found, key, factory) {
            log::warn!("cannot manage {}: {}", found.name, e);
        }
    }

    fn device_left(&mut self, device: rusb::Device<rusb::Context>) {
        self.registry.device_left(&device_key(&device));
    }
}

/// Owns the libusb hotplug registration and the event pump thread.
pub struct HotplugMonitor {
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    // Dropped before the context it is registered on.
    registration: Option<rusb::Registration<rusb::Context>>,
    context: rusb::Context,
}

impl HotplugMonitor {
    /// Register for camera arrivals and start the event pump. Devices
    /// already present are reported through the same arrival path.
    pub fn start(registry: Arc<DeviceRegistry>) -> Result<HotplugMonitor> {
        if !rusb::has_hotplug() {
            return Err(PtpError::Transport(
                "libusb was built without hotplug support".to_string(),
            ));
        }
        let context = rusb::Context::new()?;
        let registration = rusb::HotplugBuilder::new()
            .enumerate(true)
            .register(context.clone(), Box::new(PlugHandler { registry }))?;

        let stop = Arc::new(AtomicBool::new(false));
        let pump_stop = stop.clone();
        let pump_context = context.clone();
        let pump = std::thread::Builder::new()
            .name("ptpcam-hotplug".to_string())
            .spawn(move || {
                while !pump_stop.load(Ordering::Relaxed) {
                    if let Err(e) = pump_context.handle_events(Some(Duration::from_millis(250))) {
                        log::error!("usb event pump: {}", e);
                        break;
                    }
                }
            })
            .map_err(|e| PtpError::Transport(format!("spawn event pump: {}", e)))?;

        Ok(HotplugMonitor {
            stop,
            pump: Some(pump),
            registration: Some(registration),
            context,
        })
    }

    /// Deregister and stop the pump thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.context.unregister_callback(registration);
        }
        self.stop.store(true, Ordering::Relaxed);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl Drop for HotplugMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
