//! Raw HID access to the rat — device selection, liveness probe and
//! host messages.
//!
//! The rat exposes several USB interfaces; only the raw HID one accepts
//! host packets. `DeviceFilter` picks it out of the enumeration, and every
//! write goes through a short-lived handle that closes on drop.

mod backend;

pub use backend::HidApiBackend;

use std::fmt;

use serde::Deserialize;

/// Probe string written by `poke`, null-terminated.
pub const PROBE_PAYLOAD: &[u8] = b"you there?\0";

/// HID errors.
#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[error(
        "no HID device {vendor_id:04x}:{product_id:04x} on interface {interface_number} matches the filter"
    )]
    DeviceNotFound {
        vendor_id: u16,
        product_id: u16,
        interface_number: i32,
    },
    #[error("hidapi: {0}")]
    Backend(String),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

/// Which device to talk to.
///
/// The interface number is always matched; serial number and product
/// string only when set. Fields missing from a config file keep their
/// defaults (the rat's raw HID interface).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: i32,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            vendor_id: 0x16c0,
            product_id: 0x0487,
            interface_number: 6,
            serial_number: None,
            product_string: None,
        }
    }
}

impl DeviceFilter {
    /// Whether `device` is the one this filter selects.
    ///
    /// Vendor and product ids are left to enumeration.
    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        device.interface_number == self.interface_number
            && optional_match(self.serial_number.as_deref(), device.serial_number.as_deref())
            && optional_match(
                self.product_string.as_deref(),
                device.product_string.as_deref(),
            )
    }

    fn not_found(&self) -> HidError {
        HidError::DeviceNotFound {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            interface_number: self.interface_number,
        }
    }
}

fn optional_match(wanted: Option<&str>, actual: Option<&str>) -> bool {
    wanted.is_none_or(|w| actual == Some(w))
}

/// One enumerated HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: i32,
    pub path: String,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} interface {} at {}",
            self.vendor_id, self.product_id, self.interface_number, self.path
        )?;
        if let Some(serial) = &self.serial_number {
            write!(f, " serial {serial:?}")?;
        }
        if let Some(product) = &self.product_string {
            write!(f, " product {product:?}")?;
        }
        Ok(())
    }
}

/// Packets the host can send to the rat's raw HID interface.
///
/// The firmware numbers packet types from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    /// Greeting; the type byte alone.
    Hello,
    /// Screen size in pixels.
    Layout { width: u16, height: u16 },
}

impl HostMessage {
    const HELLO: u8 = 1;
    const LAYOUT: u8 = 2;

    /// Encode as the firmware's packed little-endian struct: type byte,
    /// then for layout one pad byte and the 16-bit fields.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Hello => vec![Self::HELLO],
            Self::Layout { width, height } => {
                let mut buf = vec![Self::LAYOUT, 0];
                buf.extend_from_slice(&width.to_le_bytes());
                buf.extend_from_slice(&height.to_le_bytes());
                buf
            }
        }
    }
}

/// HID enumeration and open, as consumed by the prober.
pub trait HidBackend {
    type Device: HidDevice;

    /// Every interface of devices with the given vendor and product ids.
    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceDescriptor>, HidError>;

    /// Open the interface at `path`. The handle closes on drop.
    fn open(&self, path: &str) -> Result<Self::Device, HidError>;
}

/// An open HID interface.
pub trait HidDevice {
    /// Write one output report; returns the number of bytes written.
    fn write(&self, data: &[u8]) -> Result<usize, HidError>;
}

/// Select the first enumerated interface the filter accepts.
pub fn find_device<B: HidBackend>(
    backend: &B,
    filter: &DeviceFilter,
) -> Result<DeviceDescriptor, HidError> {
    backend
        .enumerate(filter.vendor_id, filter.product_id)?
        .into_iter()
        .find(|d| filter.matches(d))
        .ok_or_else(|| filter.not_found())
}

/// Open the filtered device, write `data` and close it again.
pub fn send<B: HidBackend>(
    backend: &B,
    filter: &DeviceFilter,
    data: &[u8],
) -> Result<DeviceDescriptor, HidError> {
    let descriptor = find_device(backend, filter)?;
    tracing::info!(path = %descriptor.path, bytes = data.len(), "writing to device");

    let device = backend.open(&descriptor.path)?;
    let written = device.write(data)?;
    drop(device);

    if written < data.len() {
        return Err(HidError::ShortWrite {
            written,
            expected: data.len(),
        });
    }
    Ok(descriptor)
}

/// Liveness probe: write `PROBE_PAYLOAD` to the filtered device.
pub fn probe<B: HidBackend>(
    backend: &B,
    filter: &DeviceFilter,
) -> Result<DeviceDescriptor, HidError> {
    send(backend, filter, PROBE_PAYLOAD)
}

/// `poke`: probe the configured device.
pub fn poke(filter: &DeviceFilter) -> Result<(), HidError> {
    let backend = HidApiBackend::new()?;
    let device = probe(&backend, filter)?;
    println!("poked {device}");
    Ok(())
}

/// `devices`: list interfaces for the configured vendor/product pair,
/// starring the ones the filter selects.
pub fn list_devices(filter: &DeviceFilter) -> Result<(), HidError> {
    let backend = HidApiBackend::new()?;
    let devices = backend.enumerate(filter.vendor_id, filter.product_id)?;
    if devices.is_empty() {
        eprintln!(
            "no HID devices with id {:04x}:{:04x}",
            filter.vendor_id, filter.product_id
        );
    }
    for device in &devices {
        let marker = if filter.matches(device) { '*' } else { ' ' };
        println!("{marker} {device}");
    }
    Ok(())
}

/// `hello`: greet the rat.
pub fn send_hello(filter: &DeviceFilter) -> Result<(), HidError> {
    let backend = HidApiBackend::new()?;
    let device = send(&backend, filter, &HostMessage::Hello.encode())?;
    println!("said hello to {device}");
    Ok(())
}

/// `layout`: tell the rat how large the screen is.
pub fn send_layout(filter: &DeviceFilter, width: u16, height: u16) -> Result<(), HidError> {
    let backend = HidApiBackend::new()?;
    let message = HostMessage::Layout { width, height };
    let device = send(&backend, filter, &message.encode())?;
    println!("sent {width}x{height} to {device}");
    Ok(())
}
