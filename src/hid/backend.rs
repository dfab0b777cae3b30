//! `hidapi` implementation of the HID backend.

use std::ffi::CString;

use hidapi::{DeviceInfo, HidApi};

use super::{DeviceDescriptor, HidBackend, HidDevice, HidError};

/// HID access through the system hidapi library.
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    /// Initialise hidapi and take a snapshot of attached devices.
    pub fn new() -> Result<Self, HidError> {
        let api = HidApi::new().map_err(backend_error)?;
        Ok(Self { api })
    }
}

impl HidBackend for HidApiBackend {
    type Device = HidApiDevice;

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceDescriptor>, HidError> {
        let devices: Vec<_> = self
            .api
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .map(descriptor)
            .collect();

        tracing::debug!(
            vendor_id = format_args!("{vendor_id:04x}"),
            product_id = format_args!("{product_id:04x}"),
            count = devices.len(),
            "enumerated HID interfaces"
        );
        Ok(devices)
    }

    fn open(&self, path: &str) -> Result<HidApiDevice, HidError> {
        let c_path = CString::new(path)
            .map_err(|e| HidError::Backend(format!("invalid device path {path:?}: {e}")))?;
        let device = self.api.open_path(&c_path).map_err(backend_error)?;
        Ok(HidApiDevice { device })
    }
}

/// An open hidapi handle; hidapi closes it on drop.
pub struct HidApiDevice {
    device: hidapi::HidDevice,
}

impl HidDevice for HidApiDevice {
    fn write(&self, data: &[u8]) -> Result<usize, HidError> {
        self.device.write(data).map_err(backend_error)
    }
}

fn descriptor(info: &DeviceInfo) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        interface_number: info.interface_number(),
        path: info.path().to_string_lossy().into_owned(),
        serial_number: info.serial_number().map(str::to_owned),
        product_string: info.product_string().map(str::to_owned),
    }
}

fn backend_error(e: hidapi::HidError) -> HidError {
    HidError::Backend(e.to_string())
}
