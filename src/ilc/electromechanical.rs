//! Electromechanical and pneumatic ILC functions: hardpoint force
//! readout, ADC calibration and mezzanine pressure.

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::modbus::ModbusBuffer;

use super::{function_codes, Ilc, IlcContext, IlcHandler};

/// ADC calibration as reported by function 110: four channels each for the
/// main and backup measurement chains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationData {
    pub main_adc_k: [f32; 4],
    pub main_offset: [f32; 4],
    pub main_sensitivity: [f32; 4],
    pub backup_adc_k: [f32; 4],
    pub backup_offset: [f32; 4],
    pub backup_sensitivity: [f32; 4],
}

/// Callbacks for electromechanical and pneumatic ILC replies. These carry
/// telemetry, so they fire on every decoded reply.
pub trait ElectromechanicalPneumaticHandler: IlcHandler {
    /// Hardpoint force and status reply (function 67).
    fn process_hardpoint_force_status(
        &mut self,
        address: u8,
        status: u8,
        encoder_position: i32,
        load_cell_force: f32,
    ) {
        let _ = (address, status, encoder_position, load_cell_force);
    }

    /// Calibration data reply (function 110).
    fn process_calibration_data(&mut self, address: u8, calibration: &CalibrationData) {
        let _ = (address, calibration);
    }

    /// Mezzanine pressure reply (function 119), in the push/pull order of
    /// the two actuator circuits.
    fn process_mezzanine_pressure(
        &mut self,
        address: u8,
        primary_push: f32,
        primary_pull: f32,
        secondary_push: f32,
        secondary_pull: f32,
    ) {
        let _ = (
            address,
            primary_push,
            primary_pull,
            secondary_push,
            secondary_pull,
        );
    }
}

impl<H: ElectromechanicalPneumaticHandler> Ilc<H> {
    /// Construct an engine with the electromechanical/pneumatic decoders
    /// registered on top of the generic ILC set.
    pub fn electromechanical_pneumatic(bus: u8, handler: H) -> Self {
        let mut ilc = Self::new(bus, handler);
        ilc.register_electromechanical_pneumatic();
        ilc
    }

    /// Register decoders for functions 67, 81, 110 and 119.
    pub fn register_electromechanical_pneumatic(&mut self) {
        self.add_response(
            function_codes::HARDPOINT_FORCE_STATUS,
            decode_hardpoint_force_status::<H>,
            function_codes::HARDPOINT_FORCE_STATUS_ERROR,
            None,
        );
        self.add_response(
            function_codes::SET_OFFSET_AND_SENSITIVITY,
            decode_offset_sensitivity_ack::<H>,
            function_codes::SET_OFFSET_AND_SENSITIVITY_ERROR,
            None,
        );
        self.add_response(
            function_codes::REPORT_CALIBRATION_DATA,
            decode_calibration_data::<H>,
            function_codes::REPORT_CALIBRATION_DATA_ERROR,
            None,
        );
        self.add_response(
            function_codes::REPORT_MEZZANINE_PRESSURE,
            decode_mezzanine_pressure::<H>,
            function_codes::REPORT_MEZZANINE_PRESSURE_ERROR,
            None,
        );
    }

    /// Unicast hardpoint force [N] and status request (function 67).
    pub fn report_hardpoint_force_status(&mut self, address: u8) {
        self.call_function(address, function_codes::HARDPOINT_FORCE_STATUS, 1800);
    }

    /// Set ADC channel offset and sensitivity (function 81). The ILC
    /// rewrites its calibration store, hence the long reply timeout.
    ///
    /// `channel` is the ADC channel, 1 to 4.
    pub fn set_offset_and_sensitivity(
        &mut self,
        address: u8,
        channel: u8,
        offset: f32,
        sensitivity: f32,
    ) {
        self.call_function_with(
            address,
            function_codes::SET_OFFSET_AND_SENSITIVITY,
            36500,
            |buffer| {
                buffer.write(channel);
                buffer.write(offset);
                buffer.write(sensitivity);
            },
        );
    }

    /// Read ILC calibration data (function 110).
    pub fn report_calibration_data(&mut self, address: u8) {
        self.call_function(address, function_codes::REPORT_CALIBRATION_DATA, 1800);
    }

    /// Read ILC mezzanine pressures (function 119).
    pub fn report_mezzanine_pressure(&mut self, address: u8) {
        self.call_function(address, function_codes::REPORT_MEZZANINE_PRESSURE, 1800);
    }
}

fn decode_hardpoint_force_status<H: ElectromechanicalPneumaticHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    let status: u8 = buffer.read()?;
    let encoder_position: i32 = buffer.read()?;
    let load_cell_force: f32 = buffer.read()?;
    buffer.check_crc()?;
    ctx.handler_mut()
        .process_hardpoint_force_status(address, status, encoder_position, load_cell_force);
    Ok(())
}

fn decode_offset_sensitivity_ack<H: ElectromechanicalPneumaticHandler>(
    _ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    _address: u8,
) -> Result<(), BusError> {
    buffer.check_crc()
}

fn decode_calibration_data<H: ElectromechanicalPneumaticHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    let mut groups = [[0_f32; 4]; 6];
    for group in groups.iter_mut() {
        for value in group.iter_mut() {
            *value = buffer.read()?;
        }
    }
    buffer.check_crc()?;

    let calibration = CalibrationData {
        main_adc_k: groups[0],
        main_offset: groups[1],
        main_sensitivity: groups[2],
        backup_adc_k: groups[3],
        backup_offset: groups[4],
        backup_sensitivity: groups[5],
    };
    ctx.handler_mut()
        .process_calibration_data(address, &calibration);
    Ok(())
}

fn decode_mezzanine_pressure<H: ElectromechanicalPneumaticHandler>(
    ctx: &mut IlcContext<H>,
    buffer: &mut ModbusBuffer,
    address: u8,
) -> Result<(), BusError> {
    // Wire order is primary push, primary pull, secondary pull, secondary
    // push.
    let primary_push: f32 = buffer.read()?;
    let primary_pull: f32 = buffer.read()?;
    let secondary_pull: f32 = buffer.read()?;
    let secondary_push: f32 = buffer.read()?;
    buffer.check_crc()?;
    ctx.handler_mut().process_mezzanine_pressure(
        address,
        primary_push,
        primary_pull,
        secondary_push,
        secondary_pull,
    );
    Ok(())
}
