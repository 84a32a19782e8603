//! Boundary to the FPGA FIFOs.
//!
//! The concrete driver lives outside this crate; it moves 16-bit words in
//! and out of the command and response FIFOs and enforces the per-frame
//! waits encoded in the instruction stream. [`ilc_commands`] drives one
//! full request/response cycle through that boundary.

pub mod simulator;

use tracing::trace;

use crate::error::BusError;
use crate::ilc::{Ilc, IlcHandler};
use crate::modbus::fifo;
use crate::timestamp;

pub use simulator::{SimulatedFpga, SimulatedIlc};

/// Word-level access to the FPGA FIFOs.
pub trait FpgaDriver {
    /// Push an instruction-word request frame into the command FIFO.
    fn write_command_fifo(&mut self, words: &[u16], timeout_ms: u32) -> Result<(), BusError>;

    /// Signal the FPGA to prepare a response.
    fn write_request_fifo(&mut self, words: &[u16], timeout_ms: u32) -> Result<(), BusError>;

    /// Read response words. The contract is two-phase: a first call with a
    /// one-word buffer returns the number of words available, the second
    /// call with a buffer of that length copies them out.
    fn read_u16_response_fifo(&mut self, words: &mut [u16], timeout_ms: u32)
        -> Result<(), BusError>;
}

/// Run the commands composed in `ilc` through the FPGA and decode the
/// returned bus transcript.
///
/// The response stream starts with a 4-word timestamp preamble; each reply
/// frame is followed by an 8-word receive timestamp and an end-of-frame
/// word. Those are stripped here (and logged at trace level); the remaining
/// data words go through [`Ilc::process_response`]. The cycle ends with a
/// check that every commanded call was answered.
pub fn ilc_commands<H, F>(fpga: &mut F, ilc: &mut Ilc<H>, timeout_ms: u32) -> Result<(), BusError>
where
    H: IlcHandler,
    F: FpgaDriver + ?Sized,
{
    fpga.write_command_fifo(ilc.buffer().words(), timeout_ms)?;
    fpga.write_request_fifo(&[], timeout_ms)?;

    let mut length = [0_u16; 1];
    fpga.read_u16_response_fifo(&mut length, timeout_ms)?;
    let mut response = vec![0_u16; usize::from(length[0])];
    fpga.read_u16_response_fifo(&mut response, timeout_ms)?;

    if response.is_empty() {
        ilc.check_commanded_empty()?;
        ilc.clear_buffers();
        return Ok(());
    }
    if response.len() < 4 {
        return Err(BusError::Driver(format!(
            "response of {} words is shorter than the timestamp preamble",
            response.len()
        )));
    }

    let begin_raw = response[..4]
        .iter()
        .rev()
        .fold(0_u64, |acc, &word| (acc << 16) | u64::from(word));
    trace!(
        begin = timestamp::from_raw(begin_raw),
        "bus transcript started"
    );

    let mut data = Vec::with_capacity(response.len());
    let mut end_raw = 0_u64;
    let mut end_shift = 0_u32;
    for &word in &response[4..] {
        match word & fifo::CMD_MASK {
            fifo::RX_TIMESTAMP => {
                end_raw |= u64::from(word & 0x00FF) << end_shift;
                end_shift += 8;
                if end_shift == 64 {
                    trace!(end = timestamp::from_raw(end_raw), "frame received");
                    end_raw = 0;
                    end_shift = 0;
                }
            }
            fifo::RX_ENDFRAME => {}
            _ => data.push(word),
        }
    }

    ilc.process_response(&data)?;
    ilc.check_commanded_empty()?;
    ilc.clear_buffers();
    Ok(())
}
