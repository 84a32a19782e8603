//! Generic ILC (Inner-Loop Controller) functions.
//!
//! [`Ilc`] composes request frames for one bus subnet and decodes the reply
//! stream back into the callbacks of an [`IlcHandler`]. Event-like replies
//! (server ID, server status, mode change) are fingerprinted so the handler
//! only hears about them when the payload actually changed; telemetry-like
//! replies always fire.

mod electromechanical;
mod firmware;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::enum_with_unknown;
use crate::error::BusError;
use crate::modbus::{FrameDialect, ModbusBuffer, ResponseRegistry};

pub use electromechanical::{CalibrationData, ElectromechanicalPneumaticHandler};
pub use firmware::FirmwareUpdateHandler;

/// ILC function codes and their paired error response codes.
pub mod function_codes {
    // Generic functions, answered by every ILC.
    pub const SERVER_ID: u8 = 17;
    pub const SERVER_ID_ERROR: u8 = 145;

    pub const SERVER_STATUS: u8 = 18;
    pub const SERVER_STATUS_ERROR: u8 = 146;

    pub const CHANGE_ILC_MODE: u8 = 65;
    pub const CHANGE_ILC_MODE_ERROR: u8 = 193;

    pub const SET_TEMP_ILC_ADDRESS: u8 = 72;
    pub const SET_TEMP_ILC_ADDRESS_ERROR: u8 = 200;

    pub const RESET_SERVER: u8 = 107;
    pub const RESET_SERVER_ERROR: u8 = 235;

    // Electromechanical and pneumatic ILCs.
    pub const HARDPOINT_FORCE_STATUS: u8 = 67;
    pub const HARDPOINT_FORCE_STATUS_ERROR: u8 = 195;

    pub const SET_OFFSET_AND_SENSITIVITY: u8 = 81;
    pub const SET_OFFSET_AND_SENSITIVITY_ERROR: u8 = 209;

    pub const REPORT_CALIBRATION_DATA: u8 = 110;
    pub const REPORT_CALIBRATION_DATA_ERROR: u8 = 238;

    pub const REPORT_MEZZANINE_PRESSURE: u8 = 119;
    pub const REPORT_MEZZANINE_PRESSURE_ERROR: u8 = 247;

    // Application programming.
    pub const WRITE_APPLICATION_STATS: u8 = 100;
    pub const WRITE_APPLICATION_STATS_ERROR: u8 = 228;

    pub const ERASE_APPLICATION: u8 = 101;
    pub const ERASE_APPLICATION_ERROR: u8 = 229;

    pub const WRITE_APPLICATION_PAGE: u8 = 102;
    pub const WRITE_APPLICATION_PAGE_ERROR: u8 = 230;

    pub const VERIFY_USER_APPLICATION: u8 = 103;
    pub const VERIFY_USER_APPLICATION_ERROR: u8 = 231;
}

enum_with_unknown! {
    /// ILC operating mode, as reported in server status and mode change
    /// replies.
    #[derive(Serialize, Deserialize)]
    pub enum IlcMode(u8) {
        Standby = 0,
        Disabled = 1,
        Enabled = 2,
        FirmwareUpdate = 3,
        Fault = 4,
    }
}

impl fmt::Display for IlcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlcMode::Standby => write!(f, "Standby"),
            IlcMode::Disabled => write!(f, "Disabled"),
            IlcMode::Enabled => write!(f, "Enabled"),
            IlcMode::FirmwareUpdate => write!(f, "Firmware Update"),
            IlcMode::Fault => write!(f, "Fault"),
            IlcMode::Unknown(value) => write!(f, "unknown ({value})"),
        }
    }
}

/// Decoded server ID reply (function 17).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerId {
    /// 48-bit unique node identifier.
    pub unique_id: u64,
    pub application_type: u8,
    pub network_node_type: u8,
    pub selected_options: u8,
    pub network_node_options: u8,
    pub major_revision: u8,
    pub minor_revision: u8,
    pub firmware_name: String,
}

/// Callbacks invoked as replies to the generic ILC functions are decoded.
///
/// Event-shaped callbacks (`process_server_id`, `process_server_status`,
/// `process_change_ilc_mode`) only fire when the reply payload differs from
/// the previously observed one, unless the always-trigger override is set.
/// All methods default to no-ops so handlers implement only what they
/// consume.
pub trait IlcHandler {
    /// Called before any response in a batch is decoded.
    fn pre_process(&mut self) {}

    /// Called after all responses in a batch were decoded.
    fn post_process(&mut self) {}

    /// Server ID reply (function 17).
    fn process_server_id(&mut self, address: u8, server_id: &ServerId) {
        let _ = (address, server_id);
    }

    /// Server status reply (function 18).
    fn process_server_status(&mut self, address: u8, mode: IlcMode, status: u16, faults: u16) {
        let _ = (address, mode, status, faults);
    }

    /// Mode change acknowledgement (function 65).
    fn process_change_ilc_mode(&mut self, address: u8, mode: IlcMode) {
        let _ = (address, mode);
    }

    /// Temporary address assignment acknowledgement (function 72).
    fn process_temp_ilc_address(&mut self, address: u8, new_address: u8) {
        let _ = (address, new_address);
    }

    /// Server reset acknowledgement (function 107).
    fn process_reset_server(&mut self, address: u8) {
        let _ = address;
    }
}

/// Per-instance dispatch state handed to response decoders: the handler,
/// the per-address mode cache and the cached reply fingerprints.
///
/// Kept separate from the function registry so decoders are plain functions
/// with no captured references.
pub struct IlcContext<H> {
    handler: H,
    last_mode: BTreeMap<u8, IlcMode>,
    cached_response: BTreeMap<(u8, u8), Vec<u8>>,
    always_trigger: bool,
}

impl<H> IlcContext<H> {
    fn new(handler: H) -> Self {
        Self {
            handler,
            last_mode: BTreeMap::new(),
            cached_response: BTreeMap::new(),
            always_trigger: false,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Compare the payload just recorded in `buffer` against the cached one
    /// for `(address, function)`, replacing the cache. Returns true iff the
    /// payload matched (no change) and the always-trigger override is off.
    pub fn response_match_cached(
        &mut self,
        buffer: &mut ModbusBuffer,
        address: u8,
        function: u8,
    ) -> bool {
        let cached = self.cached_response.entry((address, function)).or_default();
        buffer.check_recording(cached) && !self.always_trigger
    }
}

/// Framing and dispatch engine for the ILCs on one bus subnet.
///
/// Requests are composed into the internal buffer with the `report_*` /
/// `change_*` wrappers or with [`Ilc::call_function_with`]; the caller
/// hands [`Ilc::buffer`] words to the FPGA and feeds the returned stream to
/// [`Ilc::process_response`].
pub struct Ilc<H> {
    bus: u8,
    buffer: ModbusBuffer,
    registry: ResponseRegistry<IlcContext<H>>,
    ctx: IlcContext<H>,
    broadcast_counter: u8,
}

impl<H: IlcHandler> Ilc<H> {
    /// Construct an engine for the given bus (1-based subnet number) with
    /// decoders for the generic ILC functions pre-registered.
    pub fn new(bus: u8, handler: H) -> Self {
        let mut registry = ResponseRegistry::new();
        registry.add_response(
            function_codes::SERVER_ID,
            decode_server_id::<H>,
            function_codes::SERVER_ID_ERROR,
            None,
        );
        registry.add_response(
            function_codes::SERVER_STATUS,
            decode_server_status::<H>,
            function_codes::SERVER_STATUS_ERROR,
            None,
        );
        registry.add_response(
            function_codes::CHANGE_ILC_MODE,
            decode_change_ilc_mode::<H>,
            function_codes::CHANGE_ILC_MODE_ERROR,
            None,
        );
        registry.add_response(
            function_codes::SET_TEMP_ILC_ADDRESS,
            decode_temp_ilc_address::<H>,
            function_codes::SET_TEMP_ILC_ADDRESS_ERROR,
            None,
        );
        registry.add_response(
            function_codes::RESET_SERVER,
            decode_reset_server::<H>,
            function_codes::RESET_SERVER_ERROR,
            None,
        );

        Self {
            bus,
            buffer: ModbusBuffer::new(FrameDialect::ILC),
            registry,
            ctx: IlcContext::new(handler),
            broadcast_counter: 0,
        }
    }

    /// The bus subnet this engine serves.
    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn handler(&self) -> &H {
        self.ctx.handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.ctx.handler_mut()
    }

    /// The frame buffer, holding the composed request (or, after
    /// [`Ilc::process_response`], the seated reply words).
    pub fn buffer(&self) -> &ModbusBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ModbusBuffer {
        &mut self.buffer
    }

    /// Force event emission even when a reply payload did not change.
    pub fn set_always_trigger(&mut self, always_trigger: bool) {
        self.ctx.always_trigger = always_trigger;
    }

    /// The most recently observed mode of the ILC at `address`, if any
    /// status or mode change reply has been decoded for it.
    pub fn last_mode(&self, address: u8) -> Option<IlcMode> {
        self.ctx.last_mode.get(&address).copied()
    }

    /// Register callbacks for an additional function code. See
    /// [`ResponseRegistry::add_response`].
    pub fn add_response(
        &mut self,
        function: u8,
        action: crate::modbus::Action<IlcContext<H>>,
        error_response: u8,
        error_action: Option<crate::modbus::ErrorAction<IlcContext<H>>>,
    ) {
        self.registry
            .add_response(function, action, error_response, error_action);
    }

    /// Rewind the buffer cursor; see [`ModbusBuffer::reset`].
    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    /// Drop buffered words, keeping the commanded queue.
    pub fn clear_buffers(&mut self) {
        self.buffer.clear_buffers();
    }

    /// Drop buffered words and the commanded queue.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Compose a parameter-less function call.
    pub fn call_function(&mut self, address: u8, function: u8, timeout_us: u32) {
        self.call_function_with(address, function, timeout_us, |_| {});
    }

    /// Compose a function call whose parameters are written by `params`.
    /// The frame is `[address][function][params][CRC]` followed by the
    /// end-of-frame word and the wait-for-reply timeout; non-broadcast
    /// calls are entered into the commanded queue.
    pub fn call_function_with(
        &mut self,
        address: u8,
        function: u8,
        timeout_us: u32,
        params: impl FnOnce(&mut ModbusBuffer),
    ) {
        self.buffer.write(address);
        self.buffer.write(function);
        params(&mut self.buffer);
        self.buffer.write_crc();
        self.buffer.write_end_of_frame();
        self.buffer.write_wait_for_rx(timeout_us);

        self.buffer.push_commanded(address, function);
    }

    /// Compose a broadcast call. Broadcasts produce no reply; the bus is
    /// held silent for `delay_us` so the devices can process the frame, and
    /// `counter` lets a later unicast status read verify delivery.
    pub fn broadcast_function(
        &mut self,
        address: u8,
        function: u8,
        counter: u8,
        delay_us: u32,
        data: &[u8],
    ) {
        self.buffer.write(address);
        self.buffer.write(function);
        self.buffer.write(counter);
        self.buffer.write_bytes(data);
        self.buffer.write_crc();
        self.buffer.write_end_of_frame();
        self.buffer.write_delay(delay_us);
    }

    /// Increment the 4-bit broadcast counter, wrapping at 15, and return
    /// the new value.
    pub fn next_broadcast_counter(&mut self) -> u8 {
        self.broadcast_counter = (self.broadcast_counter + 1) & 0x0F;
        self.broadcast_counter
    }

    /// Unicast server ID request (function 17).
    pub fn report_server_id(&mut self, address: u8) {
        self.call_function(address, function_codes::SERVER_ID, 335);
    }

    /// Unicast server status request (function 18).
    pub fn report_server_status(&mut self, address: u8) {
        self.call_function(address, function_codes::SERVER_STATUS, 270);
    }

    /// Command a mode transition (function 65). Transitions into and out of
    /// firmware update stall the ILC while it reprograms flash, so those
    /// get a much longer reply timeout.
    pub fn change_ilc_mode(&mut self, address: u8, mode: IlcMode) {
        let last = self.ctx.last_mode.get(&address).copied();
        let timeout = match last {
            Some(IlcMode::Standby) if mode == IlcMode::FirmwareUpdate => 100_000,
            Some(IlcMode::FirmwareUpdate) if mode == IlcMode::Standby => 100_000,
            _ => 335,
        };
        debug!(bus = self.bus, address, %mode, timeout, "changing ILC mode");
        let mode_word = u16::from(u8::from(mode));
        self.call_function_with(address, function_codes::CHANGE_ILC_MODE, timeout, |buffer| {
            buffer.write(mode_word)
        });
    }

    /// Assign a temporary address to the (single) ILC listening on the
    /// temporary-address target 255 (function 72).
    pub fn set_temp_ilc_address(&mut self, temporary_address: u8) {
        self.call_function_with(255, function_codes::SET_TEMP_ILC_ADDRESS, 250, |buffer| {
            buffer.write(temporary_address)
        });
    }

    /// Reboot the ILC at `address` (function 107).
    pub fn reset_server(&mut self, address: u8) {
        self.call_function(address, function_codes::RESET_SERVER, 86840);
    }

    /// Decode a stream of reply words.
    ///
    /// Seats `words` into the buffer and repeats: read address and function
    /// byte, match against the commanded queue (an error response is
    /// matched through its paired normal code), then run the registered
    /// decoder. May be called multiple times as chunks arrive; call
    /// [`Ilc::check_commanded_empty`] once all data was processed.
    pub fn process_response(&mut self, words: &[u16]) -> Result<(), BusError> {
        trace!(bus = self.bus, words = words.len(), "processing response");
        self.ctx.handler.pre_process();
        self.buffer.set_words(words);

        while !self.buffer.end_of_buffer() {
            let address: u8 = self.buffer.read()?;
            let function: u8 = self.buffer.read()?;

            // Either a function response or an error response was received.
            // For an error response, the commanded queue holds the function
            // for which it was sent.
            let expected = self.registry.expected_function(function);
            self.buffer.check_commanded(address, expected)?;

            if let Some(action) = self.registry.action(function) {
                action(&mut self.ctx, &mut self.buffer, address)?;
            } else if let Some((_, error_action)) = self.registry.error_action(function) {
                let exception: u8 = self.buffer.read()?;
                self.buffer.check_crc()?;
                match error_action {
                    Some(action) => action(&mut self.ctx, address, exception)?,
                    None => {
                        return Err(BusError::Exception {
                            address,
                            function,
                            exception,
                        })
                    }
                }
            } else {
                return Err(BusError::UnknownResponse { address, function });
            }
        }

        self.ctx.handler.post_process();
        Ok(())
    }

    /// Check that every commanded call received its reply.
    pub fn check_commanded_empty(&mut self) -> Result<(), BusError> {
        self.buffer.check_commanded_empty()
    }
}

fn decode_server_id<H: IlcHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.record_changes();
    let length: u8 = buffer.read()?;
    if length < 12 {
        return Err(BusError::ResponseTooShort {
            function: function_codes::SERVER_ID,
            minimum: 12,
            actual: length,
        });
    }

    let server_id = ServerId {
        unique_id: buffer.read_u48()?,
        application_type: buffer.read()?,
        network_node_type: buffer.read()?,
        selected_options: buffer.read()?,
        network_node_options: buffer.read()?,
        major_revision: buffer.read()?,
        minor_revision: buffer.read()?,
        firmware_name: buffer.read_string(usize::from(length - 12))?,
    };
    buffer.check_crc()?;

    if !ctx.response_match_cached(buffer, address, function_codes::SERVER_ID) {
        ctx.handler.process_server_id(address, &server_id);
    }
    Ok(())
}

fn decode_server_status<H: IlcHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.record_changes();
    let mode = IlcMode::from(buffer.read::<u8>()?);
    let status: u16 = buffer.read()?;
    let faults: u16 = buffer.read()?;
    buffer.check_crc()?;

    if !ctx.response_match_cached(buffer, address, function_codes::SERVER_STATUS) {
        trace!(address, %mode, status, faults, "server status");
        ctx.last_mode.insert(address, mode);
        ctx.handler.process_server_status(address, mode, status, faults);
    }
    Ok(())
}

fn decode_change_ilc_mode<H: IlcHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.record_changes();
    let mode = IlcMode::from(buffer.read::<u16>()? as u8);
    buffer.check_crc()?;

    if !ctx.response_match_cached(buffer, address, function_codes::CHANGE_ILC_MODE) {
        ctx.last_mode.insert(address, mode);
        ctx.handler.process_change_ilc_mode(address, mode);
    }
    Ok(())
}

fn decode_temp_ilc_address<H: IlcHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    let new_address: u8 = buffer.read()?;
    buffer.check_crc()?;
    ctx.handler.process_temp_ilc_address(address, new_address);
    Ok(())
}

fn decode_reset_server<H: IlcHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.check_crc()?;
    ctx.handler.process_reset_server(address);
    Ok(())
}
