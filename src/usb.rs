//! USB bulk endpoint of the charger, backed by `nusb`.
//!
//! Transfers are driven to completion on a private current-thread Tokio runtime so the
//! rest of the crate stays blocking. The claimed interface is released when the
//! endpoint is dropped.

use crate::transport::Endpoint;
use crate::Error;
use nusb::transfer::RequestBuffer;
use std::{io, time::Duration};

/// Vendor id the iMAX B6 mini enumerates with.
pub const VID: u16 = 0x0000;
/// Product id the iMAX B6 mini enumerates with.
pub const PID: u16 = 0x0001;

const CONFIGURATION: u8 = 1;
const INTERFACE: u8 = 0;

pub struct UsbEndpoint {
    interface: nusb::Interface,
    runtime: tokio::runtime::Runtime,
}

impl std::fmt::Debug for UsbEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbEndpoint").finish_non_exhaustive()
    }
}

impl UsbEndpoint {
    /// Finds the device, selects its first configuration and claims its interface.
    pub fn open(vid: u16, pid: u16) -> Result<Self, Error> {
        let configuration_error = |source: io::Error| Error::ConfigurationError { vid, pid, source };

        let device_info = nusb::list_devices()
            .map_err(|err| {
                log::warn!("Cannot enumerate USB devices: {err}");
                Error::DeviceNotFound { vid, pid }
            })?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(Error::DeviceNotFound { vid, pid })?;
        log::debug!(
            "Found device {:04x}:{:04x} on bus {} addr {}",
            vid,
            pid,
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open().map_err(configuration_error)?;
        device
            .set_configuration(CONFIGURATION)
            .map_err(configuration_error)?;
        let interface = device
            .detach_and_claim_interface(INTERFACE)
            .map_err(configuration_error)?;
        log::debug!("Interface {INTERFACE} claimed");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        Ok(Self { interface, runtime })
    }
}

fn timed_out(direction: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("bulk {direction} transfer timed out"),
    )
}

impl Endpoint for UsbEndpoint {
    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> io::Result<usize> {
        let transfer = self.interface.bulk_out(endpoint, data.to_vec());
        // dropping the transfer on timeout cancels it
        let completion = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| timed_out("out"))?;
        let response = completion.into_result().map_err(io::Error::from)?;
        Ok(response.actual_length())
    }

    fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let transfer = self
            .interface
            .bulk_in(endpoint, RequestBuffer::new(max_len));
        let completion = self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| timed_out("in"))?;
        completion.into_result().map_err(io::Error::from)
    }
}
