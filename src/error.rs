use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No USB device with the requested vendor/product id is attached.
    #[error("Device {vid:04x}:{pid:04x} not found")]
    DeviceNotFound { vid: u16, pid: u16 },
    /// The device was found but could not be opened, configured or claimed.
    #[error("Cannot set configuration on device {vid:04x}:{pid:04x}: {source}")]
    ConfigurationError {
        vid: u16,
        pid: u16,
        #[source]
        source: io::Error,
    },
    /// Every attempt of a request/reply exchange failed with an I/O error.
    #[error("Transport failed after {attempts} attempts: {source}")]
    TransportError {
        attempts: u8,
        #[source]
        source: io::Error,
    },
    /// The endpoint accepted fewer bytes than the frame holds.
    #[error("Short write - expected={expected} written={written}")]
    WriteLengthMismatch { expected: usize, written: usize },
    #[error("Reply too short - required={required} received={received}")]
    ShortReply { required: usize, received: usize },
    /// The reply does not start with the sync byte or its LEN byte points past the buffer.
    #[error("Invalid reply envelope - sync={sync:02X} length={length} received={received}")]
    InvalidEnvelope { sync: u8, length: u8, received: usize },
    #[error("Invalid checksum - calculated={calculated:02X} received={received:02X}")]
    ChecksumError { calculated: u8, received: u8 },
    #[error("Value out of range")]
    RangeError,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
