//! Errors surfaced while composing or decoding bus traffic.

use thiserror::Error;

/// Failure modes of the framing and dispatch engine.
///
/// Every error propagates to the caller; nothing is swallowed inside the
/// engine. After [`BusError::UnknownResponse`] the frame boundaries are no
/// longer known, so the caller shall flush the response stream and resend
/// outstanding queries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Read past the last instruction word.
    #[error("end of buffer while reading response")]
    EndOfBuffer,

    /// Frame CRC doesn't match the CRC accumulated over its data bytes.
    #[error("invalid CRC - expected 0x{calculated:04x}, got 0x{received:04x}")]
    CrcError { calculated: u16, received: u16 },

    /// No decoder or error decoder is registered for this function code.
    #[error("unknown function {function} (0x{function:02x}) in ModBus response for address {address}")]
    UnknownResponse { address: u8, function: u8 },

    /// ModBus error reply without a custom error handler registered.
    #[error("ModBus exception {exception} (ModBus address {address}, ModBus response function {function} (0x{function:02x}))")]
    Exception {
        address: u8,
        function: u8,
        exception: u8,
    },

    /// A reply arrived when nothing was expected.
    #[error("received response {function} (0x{function:02x}) with address {address} without matching send function")]
    UnmatchedFunction { address: u8, function: u8 },

    /// A reply arrived out of order with respect to the sent calls.
    #[error("invalid response received - expected {expected_function} (0x{expected_function:02x}) from {expected_address}, got {function} (0x{function:02x}) from {address}")]
    UnexpectedResponse {
        address: u8,
        function: u8,
        expected_address: u8,
        expected_function: u8,
    },

    /// A control word (end of frame, delay, wait for Rx) was expected and
    /// something else was found.
    #[error("expected {expected}, finds 0x{word:04x} (@ offset {offset})")]
    Framing {
        expected: &'static str,
        word: u16,
        offset: usize,
    },

    /// Outstanding `address:function` pairs remained after all responses
    /// were processed.
    #[error("responses for those <address:function> pairs weren't received: {0}")]
    CommandedNonEmpty(String),

    /// A reply payload is shorter than the function requires.
    #[error("invalid ILC function {function} response length - expected at least {minimum}, got {actual}")]
    ResponseTooShort {
        function: u8,
        minimum: u8,
        actual: u8,
    },

    /// The FPGA driver failed to move data through a FIFO.
    #[error("FPGA driver error: {0}")]
    Driver(String),
}
