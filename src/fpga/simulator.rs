//! Software ILC subnet behind the FIFO driver contract.
//!
//! [`SimulatedFpga`] parses the command FIFO stream the way the bus
//! hardware would, answers from per-address [`SimulatedIlc`] state, and
//! serves the composed transcript through the two-phase response-FIFO
//! read. It exists so the full request/response cycle can be exercised
//! without a cRIO attached.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::BusError;
use crate::ilc::{function_codes, CalibrationData, IlcMode};
use crate::modbus::{fifo, is_broadcast, FrameDialect, ModbusBuffer};

use super::FpgaDriver;

/// State of one simulated ILC node.
#[derive(Debug, Clone)]
pub struct SimulatedIlc {
    pub mode: IlcMode,
    pub status: u16,
    pub faults: u16,

    pub unique_id: u64,
    pub application_type: u8,
    pub network_node_type: u8,
    pub selected_options: u8,
    pub network_node_options: u8,
    pub major_revision: u8,
    pub minor_revision: u8,
    pub firmware_name: String,

    pub hardpoint_status: u8,
    pub encoder_position: i32,
    pub load_cell_force: f32,
    pub calibration: CalibrationData,
    /// Mezzanine pressures in wire order: primary push, primary pull,
    /// secondary pull, secondary push.
    pub mezzanine_pressure: [f32; 4],

    pub verify_status: u16,
    /// Pages programmed since the last erase, keyed by start address.
    pub application_pages: BTreeMap<u16, Vec<u8>>,
}

impl Default for SimulatedIlc {
    fn default() -> Self {
        Self {
            mode: IlcMode::Standby,
            status: 0,
            faults: 0,
            unique_id: 0,
            application_type: 0,
            network_node_type: 0,
            selected_options: 0,
            network_node_options: 0,
            major_revision: 0,
            minor_revision: 0,
            firmware_name: String::new(),
            hardpoint_status: 0,
            encoder_position: 0,
            load_cell_force: 0.0,
            calibration: CalibrationData::default(),
            mezzanine_pressure: [0.0; 4],
            verify_status: 0,
            application_pages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FifoState {
    Idle,
    Length,
    Data,
}

/// FPGA driver double emulating a subnet of ILCs.
pub struct SimulatedFpga {
    ilcs: BTreeMap<u8, SimulatedIlc>,
    response: ModbusBuffer,
    state: FifoState,
    clock: u64,
}

impl Default for SimulatedFpga {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedFpga {
    pub fn new() -> Self {
        Self {
            ilcs: BTreeMap::new(),
            response: ModbusBuffer::new(FrameDialect::RX),
            state: FifoState::Idle,
            clock: 0,
        }
    }

    /// Attach a simulated ILC at the given bus address.
    pub fn add_ilc(&mut self, address: u8, ilc: SimulatedIlc) {
        self.ilcs.insert(address, ilc);
    }

    pub fn ilc(&self, address: u8) -> Option<&SimulatedIlc> {
        self.ilcs.get(&address)
    }

    pub fn ilc_mut(&mut self, address: u8) -> Option<&mut SimulatedIlc> {
        self.ilcs.get_mut(&address)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Walk the transmitted instruction stream, answering each frame.
    fn simulate_bus(&mut self, words: &[u16]) -> Result<(), BusError> {
        let preamble = self.tick();
        self.response.write_fpga_timestamp(preamble);

        let mut request = ModbusBuffer::with_words(FrameDialect::ILC, words);
        while let Some(word) = request.peek() {
            if word & fifo::CMD_MASK != fifo::WRITE {
                request.next()?;
                continue;
            }

            let address: u8 = request.read()?;
            let function: u8 = request.read()?;
            debug!(address, function, "simulating ILC call");
            self.answer(&mut request, address, function)?;

            let received = self.tick();
            self.response.write_rx_timestamp(received);
            self.response.write_rx_end_frame();
        }
        Ok(())
    }

    fn answer(
        &mut self,
        request: &mut ModbusBuffer,
        address: u8,
        function: u8,
    ) -> Result<(), BusError> {
        if is_broadcast(address) {
            return Err(BusError::Driver(format!(
                "broadcast function {function} is not simulated"
            )));
        }

        let response = &mut self.response;

        // The temporary-address target answers before any node owns the
        // address; echo the assignment.
        if address == 255 && function == function_codes::SET_TEMP_ILC_ADDRESS {
            let new_address: u8 = request.read()?;
            request.check_crc()?;
            response.write(address);
            response.write(function);
            response.write(new_address);
            response.write_crc();
            return Ok(());
        }

        let ilc = self
            .ilcs
            .get_mut(&address)
            .ok_or_else(|| BusError::Driver(format!("no simulated ILC at address {address}")))?;

        match function {
            function_codes::SERVER_ID => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                response.write(12 + ilc.firmware_name.len() as u8);
                response.write_bytes(&ilc.unique_id.to_be_bytes()[2..]);
                response.write(ilc.application_type);
                response.write(ilc.network_node_type);
                response.write(ilc.selected_options);
                response.write(ilc.network_node_options);
                response.write(ilc.major_revision);
                response.write(ilc.minor_revision);
                response.write_bytes(ilc.firmware_name.as_bytes());
                response.write_crc();
            }
            function_codes::SERVER_STATUS => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                response.write(u8::from(ilc.mode));
                response.write(ilc.status);
                response.write(ilc.faults);
                response.write_crc();
            }
            function_codes::CHANGE_ILC_MODE => {
                let mode: u16 = request.read()?;
                request.check_crc()?;
                ilc.mode = IlcMode::from(mode as u8);
                response.write(address);
                response.write(function);
                response.write(mode);
                response.write_crc();
            }
            function_codes::RESET_SERVER => {
                request.check_crc()?;
                ilc.mode = IlcMode::Standby;
                response.write(address);
                response.write(function);
                response.write_crc();
            }
            function_codes::HARDPOINT_FORCE_STATUS => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                response.write(ilc.hardpoint_status);
                response.write(ilc.encoder_position);
                response.write(ilc.load_cell_force);
                response.write_crc();
            }
            function_codes::SET_OFFSET_AND_SENSITIVITY => {
                let channel: u8 = request.read()?;
                let offset: f32 = request.read()?;
                let sensitivity: f32 = request.read()?;
                request.check_crc()?;
                if let Some(index) = (channel as usize).checked_sub(1) {
                    if index < 4 {
                        ilc.calibration.main_offset[index] = offset;
                        ilc.calibration.main_sensitivity[index] = sensitivity;
                    }
                }
                response.write(address);
                response.write(function);
                response.write_crc();
            }
            function_codes::REPORT_CALIBRATION_DATA => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                let groups = [
                    ilc.calibration.main_adc_k,
                    ilc.calibration.main_offset,
                    ilc.calibration.main_sensitivity,
                    ilc.calibration.backup_adc_k,
                    ilc.calibration.backup_offset,
                    ilc.calibration.backup_sensitivity,
                ];
                for group in groups {
                    for value in group {
                        response.write(value);
                    }
                }
                response.write_crc();
            }
            function_codes::REPORT_MEZZANINE_PRESSURE => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                for value in ilc.mezzanine_pressure {
                    response.write(value);
                }
                response.write_crc();
            }
            function_codes::WRITE_APPLICATION_STATS => {
                let _data_crc: u16 = request.read()?;
                let _start_address: u16 = request.read()?;
                let _data_length: u16 = request.read()?;
                let _stats_crc: u16 = request.read()?;
                request.check_crc()?;
                response.write(address);
                response.write(function);
                response.write_crc();
            }
            function_codes::ERASE_APPLICATION => {
                request.check_crc()?;
                ilc.application_pages.clear();
                response.write(address);
                response.write(function);
                response.write_crc();
            }
            function_codes::WRITE_APPLICATION_PAGE => {
                let start_address: u16 = request.read()?;
                let length: u16 = request.read()?;
                let page = request.read_bytes(usize::from(length))?;
                request.check_crc()?;
                ilc.application_pages.insert(start_address, page);
                response.write(address);
                response.write(function);
                response.write_crc();
            }
            function_codes::VERIFY_USER_APPLICATION => {
                request.check_crc()?;
                response.write(address);
                response.write(function);
                response.write(ilc.verify_status);
                response.write_crc();
            }
            _ => {
                return Err(BusError::Driver(format!(
                    "unimplemented simulated function {function}"
                )))
            }
        }
        Ok(())
    }
}

impl FpgaDriver for SimulatedFpga {
    fn write_command_fifo(&mut self, words: &[u16], _timeout_ms: u32) -> Result<(), BusError> {
        self.simulate_bus(words)
    }

    fn write_request_fifo(&mut self, _words: &[u16], _timeout_ms: u32) -> Result<(), BusError> {
        self.state = FifoState::Length;
        Ok(())
    }

    fn read_u16_response_fifo(
        &mut self,
        words: &mut [u16],
        _timeout_ms: u32,
    ) -> Result<(), BusError> {
        match self.state {
            FifoState::Idle => Err(BusError::Driver(
                "response FIFO read out of order".to_string(),
            )),
            FifoState::Length => {
                if words.len() != 1 {
                    return Err(BusError::Driver(format!(
                        "length read expects 1 word, got a buffer of {}",
                        words.len()
                    )));
                }
                words[0] = self.response.len() as u16;
                self.state = FifoState::Data;
                Ok(())
            }
            FifoState::Data => {
                if words.len() != self.response.len() {
                    return Err(BusError::Driver(format!(
                        "data read expects {} words, got a buffer of {}",
                        self.response.len(),
                        words.len()
                    )));
                }
                words.copy_from_slice(self.response.words());
                self.response.clear_buffers();
                self.state = FifoState::Idle;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_fifo_enforces_read_order() {
        let mut fpga = SimulatedFpga::new();
        let mut length = [0_u16; 1];
        assert!(matches!(
            fpga.read_u16_response_fifo(&mut length, 10),
            Err(BusError::Driver(_))
        ));

        fpga.write_request_fifo(&[], 10).unwrap();
        fpga.read_u16_response_fifo(&mut length, 10).unwrap();
        assert_eq!(length[0], 0);
    }

    #[test]
    fn unknown_address_is_a_driver_error() {
        let mut fpga = SimulatedFpga::new();
        let mut request = ModbusBuffer::new(FrameDialect::ILC);
        request.write(9_u8);
        request.write(function_codes::SERVER_STATUS);
        request.write_crc();
        request.write_end_of_frame();
        request.write_wait_for_rx(270);

        assert!(matches!(
            fpga.write_command_fifo(request.words(), 10),
            Err(BusError::Driver(_))
        ));
    }
}
