//! ILC application (firmware) programming functions.
//!
//! Reprogramming walks the ILC through firmware-update mode: erase the
//! application flash, stream it page by page, write the application stats
//! and ask the ILC to verify the result.

use crate::error::BusError;
use crate::modbus::ModbusBuffer;

use super::{function_codes, Ilc, IlcContext, IlcHandler};

/// Reply timeout for stats and verification requests, in microseconds.
const APPLICATION_ACK_TIMEOUT: u32 = 10_000;

/// Reply timeout for flash erase and page programming, in microseconds.
/// Flash operations stall the ILC.
const APPLICATION_FLASH_TIMEOUT: u32 = 500_000;

/// Callbacks for application-programming replies. Programming traffic is
/// acknowledgement-shaped, so every reply fires.
pub trait FirmwareUpdateHandler: IlcHandler {
    /// Application stats written (function 100).
    fn process_write_application_stats(&mut self, address: u8) {
        let _ = address;
    }

    /// Application flash erased (function 101).
    fn process_erase_application(&mut self, address: u8) {
        let _ = address;
    }

    /// Application page programmed (function 102).
    fn process_write_application_page(&mut self, address: u8) {
        let _ = address;
    }

    /// Application verification result (function 103).
    fn process_verify_user_application(&mut self, address: u8, status: u16) {
        let _ = (address, status);
    }
}

impl<H: FirmwareUpdateHandler> Ilc<H> {
    /// Register decoders for functions 100 to 103.
    pub fn register_firmware_update(&mut self) {
        self.add_response(
            function_codes::WRITE_APPLICATION_STATS,
            decode_write_application_stats::<H>,
            function_codes::WRITE_APPLICATION_STATS_ERROR,
            None,
        );
        self.add_response(
            function_codes::ERASE_APPLICATION,
            decode_erase_application::<H>,
            function_codes::ERASE_APPLICATION_ERROR,
            None,
        );
        self.add_response(
            function_codes::WRITE_APPLICATION_PAGE,
            decode_write_application_page::<H>,
            function_codes::WRITE_APPLICATION_PAGE_ERROR,
            None,
        );
        self.add_response(
            function_codes::VERIFY_USER_APPLICATION,
            decode_verify_user_application::<H>,
            function_codes::VERIFY_USER_APPLICATION_ERROR,
            None,
        );
    }

    /// Write application statistics (function 100): CRC of the application
    /// data, its start address and length, and the CRC of the stats record
    /// itself.
    pub fn write_application_stats(
        &mut self,
        address: u8,
        data_crc: u16,
        start_address: u16,
        data_length: u16,
        stats_crc: u16,
    ) {
        self.call_function_with(
            address,
            function_codes::WRITE_APPLICATION_STATS,
            APPLICATION_ACK_TIMEOUT,
            |buffer| {
                buffer.write(data_crc);
                buffer.write(start_address);
                buffer.write(data_length);
                buffer.write(stats_crc);
            },
        );
    }

    /// Erase the ILC application flash (function 101).
    pub fn erase_application(&mut self, address: u8) {
        self.call_function(
            address,
            function_codes::ERASE_APPLICATION,
            APPLICATION_FLASH_TIMEOUT,
        );
    }

    /// Program one application page (function 102).
    pub fn write_application_page(&mut self, address: u8, start_address: u16, page: &[u8]) {
        self.call_function_with(
            address,
            function_codes::WRITE_APPLICATION_PAGE,
            APPLICATION_FLASH_TIMEOUT,
            |buffer| {
                buffer.write(start_address);
                buffer.write(page.len() as u16);
                buffer.write_bytes(page);
            },
        );
    }

    /// Ask the ILC to verify the programmed application (function 103).
    pub fn verify_user_application(&mut self, address: u8) {
        self.call_function(
            address,
            function_codes::VERIFY_USER_APPLICATION,
            APPLICATION_ACK_TIMEOUT,
        );
    }
}

fn decode_write_application_stats<H: FirmwareUpdateHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.check_crc()?;
    ctx.handler_mut().process_write_application_stats(address);
    Ok(())
}

fn decode_erase_application<H: FirmwareUpdateHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.check_crc()?;
    ctx.handler_mut().process_erase_application(address);
    Ok(())
}

fn decode_write_application_page<H: FirmwareUpdateHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    buffer.check_crc()?;
    ctx.handler_mut().process_write_application_page(address);
    Ok(())
}

fn decode_verify_user_application<H: FirmwareUpdateHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    let status: u16 = buffer.read()?;
    buffer.check_crc()?;
    ctx.handler_mut()
        .process_verify_user_application(address, status);
    Ok(())
}
