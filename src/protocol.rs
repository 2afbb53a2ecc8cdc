use crate::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Bulk OUT endpoint the charger listens on.
pub const ENDPOINT_OUT: u8 = 0x01;
/// Bulk IN endpoint the charger replies on.
pub const ENDPOINT_IN: u8 = 0x81;

/// Every reply is read into a buffer of this size, only a prefix is meaningful.
pub const REPLY_BUFFER_LENGTH: usize = 64;
/// Number of cell voltages reported by the charger, regardless of the pack's cell count.
pub const CELL_COUNT: usize = 6;

/// Largest parameter block a frame's LEN byte can describe.
pub const MAX_PARAMS: usize = u8::MAX as usize - 3;

const SYNC_BYTE: u8 = 0x0f;
const TRAILER: [u8; 2] = [0xff, 0xff];
// charge/discharge programs always carry this many trailing zero bytes
const PROGRAM_PADDING: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Program = 0x05,
    GetChargeInfo = 0x55,
    GetDeviceInfo = 0x57,
    GetSystemInfo = 0x5a,
    // Listed by the vendor tool, meaning unknown.
    Reserved = 0x5f,
    Stop = 0xfe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum Battery {
    LiPo = 0,
    LiIon = 1,
    LiFe = 2,
    LiHv = 3,
    NiMh = 4,
    NiCd = 5,
    Pb = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum Mode {
    Charge = 0,
    Discharge = 1,
    Storage = 2,
    FastCharge = 3,
}

/// How strictly the reply envelope is checked before the payload is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Envelope checksum problems are logged and otherwise ignored.
    #[default]
    Lenient,
    /// Envelope checksum problems fail the decode.
    Strict,
}

/// Sums every byte after the two byte frame prefix (sync and length), truncated to 8 bits.
pub fn checksum(buffer: &[u8]) -> u8 {
    buffer
        .iter()
        .skip(2)
        .fold(0u8, |checksum, b| checksum.wrapping_add(*b))
}

/// Builds `[SYNC, LEN, opcode, subcode, params.., CHECKSUM, 0xFF, 0xFF]`.
///
/// `LEN` counts opcode, subcode, params and the checksum byte. Parameter values are
/// not validated here.
///
/// # Panics
///
/// Panics if `params` is longer than [`MAX_PARAMS`], LEN would not fit its byte.
pub fn encode(opcode: u8, subcode: u8, params: &[u8]) -> Vec<u8> {
    let length = u8::try_from(params.len() + 3).expect("params exceed frame length byte");
    let mut tx_buffer = Vec::with_capacity(params.len() + 7);
    tx_buffer.push(SYNC_BYTE);
    tx_buffer.push(length);
    tx_buffer.push(opcode);
    tx_buffer.push(subcode);
    tx_buffer.extend_from_slice(params);
    tx_buffer.push(checksum(&tx_buffer));
    tx_buffer.extend_from_slice(&TRAILER);
    tx_buffer
}

/// Outbound intent, consumed by [`Command::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    pub subcode: u8,
    pub params: Vec<u8>,
}

impl Command {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode: opcode as u8,
            subcode: 0x00,
            params: Vec::new(),
        }
    }

    pub fn with_params(opcode: Opcode, params: Vec<u8>) -> Self {
        Self {
            params,
            ..Self::new(opcode)
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self.opcode, self.subcode, &self.params)
    }
}

fn validate_len(buffer: &[u8], reply_size: usize) -> std::result::Result<(), Error> {
    if buffer.len() < reply_size {
        log::warn!(
            "Invalid buffer size - required={} received={}",
            reply_size,
            buffer.len()
        );
        return Err(Error::ShortReply {
            required: reply_size,
            received: buffer.len(),
        });
    }
    Ok(())
}

// The reply mirrors the outbound framing: LEN at index 1, checksum right after the
// LEN - 1 covered bytes.
fn validate_checksum(buffer: &[u8]) -> std::result::Result<(), Error> {
    let sync = buffer.first().copied().unwrap_or(0);
    let length = buffer.get(1).copied().unwrap_or(0);
    let checksum_index = 1 + usize::from(length);
    if sync != SYNC_BYTE || checksum_index >= buffer.len() {
        return Err(Error::InvalidEnvelope {
            sync,
            length,
            received: buffer.len(),
        });
    }
    let calculated = checksum(&buffer[..checksum_index]);
    let received = buffer[checksum_index];
    if calculated != received {
        return Err(Error::ChecksumError {
            calculated,
            received,
        });
    }
    Ok(())
}

/// Checks the reply and returns the payload window starting at `payload_offset`.
///
/// A reply shorter than `reply_size` always fails. Envelope checksum problems only
/// fail under [`Validation::Strict`].
pub fn decode_envelope(
    rx_buffer: &[u8],
    payload_offset: usize,
    reply_size: usize,
    validation: Validation,
) -> std::result::Result<&[u8], Error> {
    validate_len(rx_buffer, reply_size.max(payload_offset))?;
    if let Err(err) = validate_checksum(rx_buffer) {
        match validation {
            Validation::Strict => {
                log::warn!("Rejecting reply {:02X?}: {}", rx_buffer, err);
                return Err(err);
            }
            Validation::Lenient => log::warn!("Ignoring reply envelope problem: {}", err),
        }
    }
    Ok(&rx_buffer[payload_offset..])
}

/// Sequential big-endian reader over a payload window.
struct PayloadReader<'a> {
    payload: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            position: 0,
        }
    }

    fn u8(&mut self) -> std::result::Result<u8, Error> {
        let byte = *self
            .payload
            .get(self.position)
            .ok_or(Error::ShortReply {
                required: self.position + 1,
                received: self.payload.len(),
            })?;
        self.position += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> std::result::Result<u16, Error> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn volts(&mut self) -> std::result::Result<f32, Error> {
        Ok(self.u16()? as f32 / 1000.0)
    }

    fn skip(&mut self, n: usize) -> std::result::Result<(), Error> {
        for _ in 0..n {
            self.u8()?;
        }
        Ok(())
    }

    fn cells(&mut self) -> std::result::Result<[f32; CELL_COUNT], Error> {
        let mut cells = [0.0; CELL_COUNT];
        for cell in cells.iter_mut() {
            *cell = self.volts()?;
        }
        Ok(cells)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ChargeState {
    Zero,
    Busy,
    Idle,
    Finish,
    Error,
    Other(u8),
}

impl From<u8> for ChargeState {
    fn from(value: u8) -> Self {
        match value {
            0 => ChargeState::Zero,
            1 => ChargeState::Busy,
            2 => ChargeState::Idle,
            3 => ChargeState::Finish,
            4 => ChargeState::Error,
            n => ChargeState::Other(n),
        }
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChargeState::Zero => write!(f, "0"),
            ChargeState::Busy => write!(f, "BUSY"),
            ChargeState::Idle => write!(f, "IDLE"),
            ChargeState::Finish => write!(f, "FINISH"),
            ChargeState::Error => write!(f, "ERROR"),
            ChargeState::Other(n) => write!(f, "<{}>", n),
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ChargeInfo {
    pub state: ChargeState,
    pub capacity_mah: u16,
    pub time_sec: u16,
    pub voltage: f32,
    pub current: u16, // device native units
    pub temperature_ext: u8,
    pub temperature_int: u8,
    pub impedance_int: u16,
    pub cells: [f32; CELL_COUNT],
}

impl ChargeInfo {
    pub const PAYLOAD_OFFSET: usize = 4;

    pub fn request() -> Vec<u8> {
        Command::new(Opcode::GetChargeInfo).encode()
    }

    pub fn reply_size() -> usize {
        30
    }

    pub fn decode(rx_buffer: &[u8]) -> std::result::Result<Self, Error> {
        Self::decode_with(rx_buffer, Validation::Lenient)
    }

    pub fn decode_with(
        rx_buffer: &[u8],
        validation: Validation,
    ) -> std::result::Result<Self, Error> {
        let payload = decode_envelope(
            rx_buffer,
            Self::PAYLOAD_OFFSET,
            Self::reply_size(),
            validation,
        )?;
        let mut p = PayloadReader::new(payload);
        Ok(Self {
            state: ChargeState::from(p.u8()?),
            capacity_mah: p.u16()?,
            time_sec: p.u16()?,
            voltage: p.volts()?,
            current: p.u16()?,
            temperature_ext: p.u8()?,
            temperature_int: p.u8()?,
            impedance_int: p.u16()?,
            cells: p.cells()?,
        })
    }

    pub fn state_str(&self) -> String {
        self.state.to_string()
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SystemInfo {
    pub cycle_time: u8,
    // flags are kept as sent, non-zero means on
    pub time_limit_on: u8,
    pub time_limit: u16,
    pub capacity_limit_on: u8,
    pub capacity_limit: u16,
    pub key_beep: u8,
    pub system_beep: u8,
    pub input_low_voltage: f32,
    pub temperature_limit: u8,
    pub voltage: f32,
    pub cells: [f32; CELL_COUNT],
}

impl SystemInfo {
    pub const PAYLOAD_OFFSET: usize = 4;

    pub fn request() -> Vec<u8> {
        Command::new(Opcode::GetSystemInfo).encode()
    }

    pub fn reply_size() -> usize {
        33
    }

    pub fn decode(rx_buffer: &[u8]) -> std::result::Result<Self, Error> {
        Self::decode_with(rx_buffer, Validation::Lenient)
    }

    pub fn decode_with(
        rx_buffer: &[u8],
        validation: Validation,
    ) -> std::result::Result<Self, Error> {
        let payload = decode_envelope(
            rx_buffer,
            Self::PAYLOAD_OFFSET,
            Self::reply_size(),
            validation,
        )?;
        let mut p = PayloadReader::new(payload);
        let cycle_time = p.u8()?;
        let time_limit_on = p.u8()?;
        let time_limit = p.u16()?;
        let capacity_limit_on = p.u8()?;
        let capacity_limit = p.u16()?;
        let key_beep = p.u8()?;
        let system_beep = p.u8()?;
        let input_low_voltage = p.volts()?;
        // two reserved bytes
        p.skip(2)?;
        Ok(Self {
            cycle_time,
            time_limit_on,
            time_limit,
            capacity_limit_on,
            capacity_limit,
            key_beep,
            system_beep,
            input_low_voltage,
            temperature_limit: p.u8()?,
            voltage: p.volts()?,
            cells: p.cells()?,
        })
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceInfo {
    pub core_type: [u8; 6],
    pub upgrade_type: u8,
    pub encrypted: bool,
    pub customer_id: u16,
    pub language_id: u8,
    pub software_version: f32,
    pub hardware_version: u8,
}

impl DeviceInfo {
    pub const PAYLOAD_OFFSET: usize = 5;

    pub fn request() -> Vec<u8> {
        Command::new(Opcode::GetDeviceInfo).encode()
    }

    pub fn reply_size() -> usize {
        20
    }

    pub fn decode(rx_buffer: &[u8]) -> std::result::Result<Self, Error> {
        Self::decode_with(rx_buffer, Validation::Lenient)
    }

    pub fn decode_with(
        rx_buffer: &[u8],
        validation: Validation,
    ) -> std::result::Result<Self, Error> {
        let payload = decode_envelope(
            rx_buffer,
            Self::PAYLOAD_OFFSET,
            Self::reply_size(),
            validation,
        )?;
        let mut p = PayloadReader::new(payload);
        let mut core_type = [0; 6];
        for b in core_type.iter_mut() {
            *b = p.u8()?;
        }
        Ok(Self {
            core_type,
            upgrade_type: p.u8()?,
            encrypted: p.u8()? != 0,
            customer_id: p.u16()?,
            language_id: p.u8()?,
            // major + minor / 100
            software_version: p.u8()? as f32 + p.u8()? as f32 / 100.0,
            hardware_version: p.u8()?,
        })
    }
}

pub struct Stop;

impl Stop {
    pub fn request() -> Vec<u8> {
        Command::new(Opcode::Stop).encode()
    }
}

/// A charge/discharge program in device native units (amps and volts).
///
/// Slots the mode does not use are expected to be zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub battery: Battery,
    pub cells: u8,
    pub mode: Mode,
    pub charge_current: f64,
    pub discharge_current: f64,
    pub voltage_low: f64,
    pub voltage_high: f64,
}

impl Program {
    pub fn charge(battery: Battery, cells: u8, current: f64, max_voltage: f64) -> Self {
        Self {
            battery,
            cells,
            mode: Mode::Charge,
            charge_current: current,
            discharge_current: 0.0,
            voltage_low: 0.0,
            voltage_high: max_voltage,
        }
    }

    pub fn fast_charge(battery: Battery, cells: u8, current: f64, max_voltage: f64) -> Self {
        Self {
            mode: Mode::FastCharge,
            ..Self::charge(battery, cells, current, max_voltage)
        }
    }

    pub fn discharge(battery: Battery, cells: u8, current: f64, min_voltage: f64) -> Self {
        Self {
            battery,
            cells,
            mode: Mode::Discharge,
            charge_current: 0.0,
            discharge_current: current,
            voltage_low: min_voltage,
            voltage_high: 0.0,
        }
    }

    /// Encodes the program, failing with [`Error::RangeError`] for values that do not
    /// fit a 2 byte milli-unit field.
    pub fn request(&self) -> std::result::Result<Vec<u8>, Error> {
        let mut params = vec![self.battery as u8, self.cells, self.mode as u8];
        for value in [
            self.charge_current,
            self.discharge_current,
            self.voltage_low,
            self.voltage_high,
        ] {
            params.extend_from_slice(&to_milli(value)?.to_be_bytes());
        }
        params.extend_from_slice(&[0x00; PROGRAM_PADDING]);
        Ok(Command::with_params(Opcode::Program, params).encode())
    }
}

/// Scales to milli-units, truncating like the vendor tool does.
fn to_milli(value: f64) -> std::result::Result<u16, Error> {
    let milli = value * 1000.0;
    if !milli.is_finite() || milli < 0.0 || milli >= 65536.0 {
        log::warn!("Value {} out of range", value);
        return Err(Error::RangeError);
    }
    Ok(milli as u16)
}
