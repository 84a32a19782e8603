//! Mapping from ModBus function codes to response decoders.

use std::collections::BTreeMap;

use crate::error::BusError;

use super::ModbusBuffer;

/// Decoder for a normal response. Receives the dispatch context, the buffer
/// positioned just past the function byte, and the sender address. It shall
/// consume exactly the payload bytes followed by
/// [`ModbusBuffer::check_crc`].
pub type Action<C> = fn(&mut C, &mut ModbusBuffer, u8) -> Result<(), BusError>;

/// Handler for an error response, called with (context, address, exception
/// code) after the dispatch loop has already consumed the exception byte
/// and verified the CRC. It must not touch the buffer.
pub type ErrorAction<C> = fn(&mut C, u8, u8) -> Result<(), BusError>;

struct ErrorEntry<C> {
    /// The normal function code this error response pairs with.
    function: u8,
    action: Option<ErrorAction<C>>,
}

/// Registered response decoders, keyed by function code.
///
/// Every registration pairs a normal response code with the error response
/// code the device uses for it; the pairing lets the dispatch loop validate
/// the commanded queue before the error payload is decoded.
pub struct ResponseRegistry<C> {
    actions: BTreeMap<u8, Action<C>>,
    error_actions: BTreeMap<u8, ErrorEntry<C>>,
}

impl<C> Default for ResponseRegistry<C> {
    fn default() -> Self {
        Self {
            actions: BTreeMap::new(),
            error_actions: BTreeMap::new(),
        }
    }
}

impl<C> ResponseRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register callbacks for a function code and its paired error response
    /// code. When `error_action` is `None`, an error response raises
    /// [`BusError::Exception`].
    pub fn add_response(
        &mut self,
        function: u8,
        action: Action<C>,
        error_response: u8,
        error_action: Option<ErrorAction<C>>,
    ) {
        self.actions.insert(function, action);
        self.error_actions.insert(
            error_response,
            ErrorEntry {
                function,
                action: error_action,
            },
        );
    }

    /// Decoder registered for a normal response code.
    pub fn action(&self, function: u8) -> Option<Action<C>> {
        self.actions.get(&function).copied()
    }

    /// `(paired normal code, handler)` registered for an error response code.
    pub fn error_action(&self, function: u8) -> Option<(u8, Option<ErrorAction<C>>)> {
        self.error_actions
            .get(&function)
            .map(|entry| (entry.function, entry.action))
    }

    /// The function code the commanded queue should be checked against:
    /// the paired normal code for a registered error response, otherwise the
    /// received code itself.
    pub fn expected_function(&self, function: u8) -> u8 {
        self.error_actions
            .get(&function)
            .map_or(function, |entry| entry.function)
    }
}
