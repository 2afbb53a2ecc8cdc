//! Single request/reply exchange with the charger.
//!
//! The charger is driven strictly one frame at a time: a frame is written to the bulk OUT
//! endpoint and one reply of at most [`REPLY_BUFFER_LENGTH`] bytes is read back from the
//! bulk IN endpoint. I/O failures of either step are retried right away, without backoff,
//! until the configured number of attempts is used up.

use crate::protocol::{ENDPOINT_IN, ENDPOINT_OUT, REPLY_BUFFER_LENGTH};
use crate::Error;
use std::{io, time::Duration};

/// Timeout of a single frame write and of a single reply read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Total number of write+read attempts of one exchange.
pub const DEFAULT_RETRIES: u8 = 5;

/// An opened and configured duplex byte endpoint pair.
pub trait Endpoint {
    /// Writes `data` to `endpoint`, returning the number of bytes the device accepted.
    /// Fails after `timeout`.
    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> io::Result<usize>;
    /// Reads up to `max_len` bytes from `endpoint`, failing after `timeout`.
    fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>>;
}

impl<E: Endpoint + ?Sized> Endpoint for Box<E> {
    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).write(endpoint, data, timeout)
    }

    fn read(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        (**self).read(endpoint, max_len, timeout)
    }
}

#[derive(Debug)]
pub struct Transport<E> {
    endpoint: E,
    timeout: Duration,
    retries: u8,
}

impl<E: Endpoint> Transport<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set timeout to {timeout:?}");
        self.timeout = timeout;
    }

    /// Sets the total number of attempts, at least one attempt is always made.
    pub fn set_retries(&mut self, retries: u8) {
        if retries == 0 {
            log::warn!("retries must be at least 1, use 1");
        }
        self.retries = retries.max(1);
        log::trace!("set retries to {}", self.retries);
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    fn send_and_receive(&mut self, tx_buffer: &[u8]) -> Result<Vec<u8>, Error> {
        log::trace!("write bytes: {tx_buffer:02X?}");
        let written = self.endpoint.write(ENDPOINT_OUT, tx_buffer, self.timeout)?;
        if written != tx_buffer.len() {
            return Err(Error::WriteLengthMismatch {
                expected: tx_buffer.len(),
                written,
            });
        }

        let rx_buffer = self
            .endpoint
            .read(ENDPOINT_IN, REPLY_BUFFER_LENGTH, self.timeout)?;
        log::trace!("receive_bytes: {rx_buffer:02X?}");
        Ok(rx_buffer)
    }

    /// Writes `tx_buffer` and returns the raw reply.
    ///
    /// I/O errors are retried immediately. After the last attempt the final I/O error is
    /// returned as [`Error::TransportError`]. A short write is never retried.
    pub fn exchange(&mut self, tx_buffer: &[u8]) -> Result<Vec<u8>, Error> {
        let mut last_error = None;
        for attempt in 1..=self.retries {
            match self.send_and_receive(tx_buffer) {
                Ok(rx_buffer) => return Ok(rx_buffer),
                Err(Error::Io(err)) => {
                    log::warn!(
                        "Send failed, try {} of {} ({err})",
                        attempt,
                        self.retries
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::TransportError {
            attempts: self.retries,
            source: last_error.unwrap_or_else(|| io::Error::other("no attempt made")),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeEndpoint;
    use super::*;

    const FRAME: [u8; 7] = [0x0f, 0x03, 0x55, 0x00, 0x55, 0xff, 0xff];

    #[test]
    fn test_exchange_returns_reply_unmodified() {
        let reply = vec![0x0f, 0x22, 0x55, 0x00, 0x01, 0x02];
        let mut transport = Transport::new(FakeEndpoint::default().with_reply(reply.clone()));
        assert_eq!(transport.exchange(&FRAME).unwrap(), reply);
        assert_eq!(transport.endpoint().writes, vec![(ENDPOINT_OUT, FRAME.to_vec())]);
    }

    #[test]
    fn test_exchange_succeeds_on_last_attempt() {
        let reply = vec![0xab; REPLY_BUFFER_LENGTH];
        let mut transport = Transport::new(FakeEndpoint::failing(4).with_reply(reply.clone()));
        assert_eq!(transport.exchange(&FRAME).unwrap(), reply);
        assert_eq!(transport.endpoint().writes.len(), 5);
        assert_eq!(transport.endpoint().reads, 5);
    }

    #[test]
    fn test_exchange_gives_up_after_five_attempts() {
        let mut transport = Transport::new(FakeEndpoint::failing(5));
        let err = transport.exchange(&FRAME).unwrap_err();
        match err {
            Error::TransportError { attempts, source } => {
                assert_eq!(attempts, 5);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(transport.endpoint().writes.len(), 5);
        assert_eq!(transport.endpoint().failures, 0);
    }

    #[test]
    fn test_failed_writes_are_retried() {
        let reply = vec![0xcd; REPLY_BUFFER_LENGTH];
        let mut transport =
            Transport::new(FakeEndpoint::failing_writes(3).with_reply(reply.clone()));
        assert_eq!(transport.exchange(&FRAME).unwrap(), reply);
        assert_eq!(transport.endpoint().writes.len(), 4);
        assert_eq!(transport.endpoint().reads, 1);
    }

    #[test]
    fn test_failed_writes_give_up_after_five_attempts() {
        let mut transport = Transport::new(FakeEndpoint::failing_writes(5));
        match transport.exchange(&FRAME).unwrap_err() {
            Error::TransportError { attempts, source } => {
                assert_eq!(attempts, 5);
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(transport.endpoint().writes.len(), 5);
        assert_eq!(transport.endpoint().reads, 0);
    }

    #[test]
    fn test_mixed_write_and_read_failures() {
        let mut transport = Transport::new(FakeEndpoint {
            write_failures: 2,
            failures: 2,
            ..Default::default()
        });
        assert!(transport.exchange(&FRAME).is_ok());
        assert_eq!(transport.endpoint().writes.len(), 5);
        assert_eq!(transport.endpoint().reads, 3);
    }

    #[test]
    fn test_timeout_applies_to_write_and_read() {
        let mut transport = Transport::new(FakeEndpoint::default());
        transport.exchange(&FRAME).unwrap();
        transport.set_timeout(Duration::from_secs(2));
        transport.exchange(&FRAME).unwrap();
        assert_eq!(
            transport.endpoint().timeouts,
            vec![
                DEFAULT_TIMEOUT,
                DEFAULT_TIMEOUT,
                Duration::from_secs(2),
                Duration::from_secs(2)
            ]
        );
    }

    #[test]
    fn test_short_write_is_not_retried() {
        let mut transport = Transport::new(FakeEndpoint {
            short_write: true,
            ..Default::default()
        });
        assert!(matches!(
            transport.exchange(&FRAME),
            Err(Error::WriteLengthMismatch {
                expected: 7,
                written: 6
            })
        ));
        assert_eq!(transport.endpoint().writes.len(), 1);
        assert_eq!(transport.endpoint().reads, 0);
    }

    #[test]
    fn test_retries_setting() {
        let mut transport = Transport::new(FakeEndpoint::failing(10));
        transport.set_retries(2);
        assert!(matches!(
            transport.exchange(&FRAME),
            Err(Error::TransportError { attempts: 2, .. })
        ));
        assert_eq!(transport.endpoint().writes.len(), 2);

        transport.set_retries(0);
        assert!(transport.exchange(&FRAME).is_err());
        assert_eq!(transport.endpoint().writes.len(), 3);
    }
}
