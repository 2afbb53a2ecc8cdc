use crate::protocol::*;
use crate::transport::{Endpoint, Transport};
use crate::Error;
use std::time::Duration;

type Result<T> = std::result::Result<T, Error>;

/// Client for one charger, owning its endpoint for its whole lifetime.
///
/// Every call performs exactly one exchange; concurrent use has to be serialized by
/// the caller.
#[derive(Debug)]
pub struct Charger<E> {
    transport: Transport<E>,
    validation: Validation,
}

impl<E: Endpoint> Charger<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            transport: Transport::new(endpoint),
            validation: Validation::default(),
        }
    }

    /// Sets the timeout of a single frame write and of a single reply read.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.transport.set_timeout(timeout);
    }

    /// Sets the total number of attempts per exchange.
    pub fn set_retries(&mut self, retries: u8) {
        self.transport.set_retries(retries);
    }

    pub fn set_validation(&mut self, validation: Validation) {
        log::trace!("set validation to {validation:?}");
        self.validation = validation;
    }

    pub fn endpoint(&self) -> &E {
        self.transport.endpoint()
    }

    pub fn stop(&mut self) -> Result<()> {
        log::trace!("stop");
        self.transport.exchange(&Stop::request())?;
        Ok(())
    }

    /// Starts an arbitrary program, values are in amps and volts.
    pub fn start(&mut self, program: &Program) -> Result<()> {
        log::debug!("start {program:?}");
        let tx_buffer = program.request()?;
        self.transport.exchange(&tx_buffer)?;
        Ok(())
    }

    pub fn charge(
        &mut self,
        battery: Battery,
        cells: u8,
        current: f64,
        max_voltage: f64,
    ) -> Result<()> {
        self.start(&Program::charge(battery, cells, current, max_voltage))
    }

    pub fn fast_charge(
        &mut self,
        battery: Battery,
        cells: u8,
        current: f64,
        max_voltage: f64,
    ) -> Result<()> {
        self.start(&Program::fast_charge(battery, cells, current, max_voltage))
    }

    pub fn discharge(
        &mut self,
        battery: Battery,
        cells: u8,
        current: f64,
        min_voltage: f64,
    ) -> Result<()> {
        self.start(&Program::discharge(battery, cells, current, min_voltage))
    }

    pub fn get_charge_info(&mut self) -> Result<ChargeInfo> {
        log::trace!("get charge info");
        let rx_buffer = self.transport.exchange(&ChargeInfo::request())?;
        ChargeInfo::decode_with(&rx_buffer, self.validation)
    }

    pub fn get_system_info(&mut self) -> Result<SystemInfo> {
        log::trace!("get system info");
        let rx_buffer = self.transport.exchange(&SystemInfo::request())?;
        SystemInfo::decode_with(&rx_buffer, self.validation)
    }

    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        log::trace!("get device info");
        let rx_buffer = self.transport.exchange(&DeviceInfo::request())?;
        DeviceInfo::decode_with(&rx_buffer, self.validation)
    }
}

#[cfg(feature = "usb")]
impl Charger<crate::usb::UsbEndpoint> {
    /// Finds, configures and claims the charger with the given USB ids.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        Ok(Self::new(crate::usb::UsbEndpoint::open(vid, pid)?))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(crate::usb::VID, crate::usb::PID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::FakeEndpoint;

    fn fake_charger(endpoint: FakeEndpoint) -> Charger<FakeEndpoint> {
        Charger::new(endpoint)
    }

    #[test]
    fn test_charge_command() {
        let mut charger = fake_charger(FakeEndpoint::default());
        charger.charge(Battery::LiPo, 2, 1.5, 8.4).unwrap();
        let (endpoint, frame) = &charger.endpoint().writes[0];
        assert_eq!(*endpoint, ENDPOINT_OUT);
        assert_eq!(
            frame,
            &vec![
                0x0f, 0x16, 0x05, 0x00, 0x00, 0x02, 0x00, 0x05, 0xdc, 0x00, 0x00, 0x00, 0x00,
                0x20, 0xd0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xd8, 0xff, 0xff,
            ]
        );
    }

    #[test]
    fn test_discharge_and_fast_charge_modes() {
        let mut charger = fake_charger(FakeEndpoint::default());
        charger.discharge(Battery::LiFe, 4, 0.5, 2.8).unwrap();
        charger.fast_charge(Battery::LiHv, 1, 2.0, 4.2).unwrap();
        charger
            .start(&Program {
                battery: Battery::LiIon,
                cells: 3,
                mode: Mode::Storage,
                charge_current: 1.0,
                discharge_current: 1.0,
                voltage_low: 3.8,
                voltage_high: 3.8,
            })
            .unwrap();
        let writes = &charger.endpoint().writes;
        assert_eq!(&writes[0].1[4..7], &[0x02, 0x04, 0x01]);
        assert_eq!(u16::from_be_bytes([writes[0].1[9], writes[0].1[10]]), 500);
        assert_eq!(u16::from_be_bytes([writes[0].1[11], writes[0].1[12]]), 2800);
        assert_eq!(&writes[1].1[4..7], &[0x03, 0x01, 0x03]);
        assert_eq!(u16::from_be_bytes([writes[1].1[13], writes[1].1[14]]), 4200);
        assert_eq!(&writes[2].1[4..7], &[0x01, 0x03, 0x02]);
    }

    #[test]
    fn test_out_of_range_is_not_sent() {
        let mut charger = fake_charger(FakeEndpoint::default());
        assert!(matches!(
            charger.charge(Battery::LiPo, 2, 100.0, 8.4),
            Err(Error::RangeError)
        ));
        assert!(charger.endpoint().writes.is_empty());
    }

    #[test]
    fn test_stop() {
        let mut charger = fake_charger(FakeEndpoint::default());
        charger.stop().unwrap();
        assert_eq!(charger.endpoint().writes[0].1, Stop::request());
    }

    #[test]
    fn test_stop_reports_transport_failure() {
        let mut charger = fake_charger(FakeEndpoint::failing(5));
        assert!(matches!(
            charger.stop(),
            Err(Error::TransportError { attempts: 5, .. })
        ));
    }

    #[test]
    fn test_get_charge_info() {
        let mut reply = vec![0x0f, 0x22, 0x55, 0x00, 0x01, 0x00, 0x64];
        reply.resize(REPLY_BUFFER_LENGTH, 0);
        let mut charger = fake_charger(FakeEndpoint::failing(2).with_reply(reply));
        let info = charger.get_charge_info().unwrap();
        assert_eq!(info.state_str(), "BUSY");
        assert_eq!(info.capacity_mah, 100);
        assert_eq!(charger.endpoint().writes.len(), 3);
        assert_eq!(charger.endpoint().writes[2].1, ChargeInfo::request());
    }

    #[test]
    fn test_short_reply_is_not_retried() {
        let mut charger = fake_charger(FakeEndpoint::default().with_reply(vec![0x0f; 12]));
        assert!(matches!(
            charger.get_system_info(),
            Err(Error::ShortReply {
                required: 33,
                received: 12
            })
        ));
        assert_eq!(charger.endpoint().writes.len(), 1);
    }

    #[test]
    fn test_strict_validation() {
        let mut charger = fake_charger(FakeEndpoint::default());
        charger.set_validation(Validation::Strict);
        assert!(matches!(
            charger.get_device_info(),
            Err(Error::InvalidEnvelope {
                sync: 0x00,
                length: 0x00,
                received: 64
            })
        ));

        let mut charger = fake_charger(FakeEndpoint::default());
        let info = charger.get_device_info().unwrap();
        assert_eq!(info.customer_id, 0);
        assert_eq!(info.software_version, 0.0);
    }
}
