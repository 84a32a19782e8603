//! Frame layout and parse coverage for the electromechanical and pneumatic
//! ILC functions.

use crio_ilc::ilc::{function_codes, CalibrationData, ElectromechanicalPneumaticHandler};
use crio_ilc::{BusError, FrameDialect, Ilc, IlcHandler, ModbusBuffer};

#[derive(Default)]
struct Recorder {
    hardpoints: Vec<(u8, u8, i32, f32)>,
    calibrations: Vec<(u8, CalibrationData)>,
    pressures: Vec<(u8, [f32; 4])>,
}

impl IlcHandler for Recorder {}

impl ElectromechanicalPneumaticHandler for Recorder {
    fn process_hardpoint_force_status(
        &mut self,
        address: u8,
        status: u8,
        encoder_position: i32,
        load_cell_force: f32,
    ) {
        self.hardpoints
            .push((address, status, encoder_position, load_cell_force));
    }

    fn process_calibration_data(&mut self, address: u8, calibration: &CalibrationData) {
        self.calibrations.push((address, *calibration));
    }

    fn process_mezzanine_pressure(
        &mut self,
        address: u8,
        primary_push: f32,
        primary_pull: f32,
        secondary_push: f32,
        secondary_pull: f32,
    ) {
        self.pressures.push((
            address,
            [primary_push, primary_pull, secondary_push, secondary_pull],
        ));
    }
}

#[test]
fn set_offset_and_sensitivity_request_layout() {
    let mut ilc = Ilc::electromechanical_pneumatic(1, Recorder::default());
    ilc.set_offset_and_sensitivity(231, 1, 2.34, -4.56);

    let buffer = ilc.buffer_mut();
    buffer.reset();
    assert_eq!(buffer.read::<u8>().unwrap(), 231);
    assert_eq!(buffer.read::<u8>().unwrap(), 81);
    assert_eq!(buffer.read::<u8>().unwrap(), 1);
    assert_eq!(buffer.read::<f32>().unwrap(), 2.34);
    assert_eq!(buffer.read::<f32>().unwrap(), -4.56);
    buffer.check_crc().unwrap();
    buffer.read_end_of_frame().unwrap();
    assert_eq!(buffer.read_wait_for_rx().unwrap(), 37000);
}

#[test]
fn calibration_data_request_and_parse() {
    let mut ilc = Ilc::electromechanical_pneumatic(1, Recorder::default());
    ilc.report_calibration_data(17);

    {
        let buffer = ilc.buffer_mut();
        buffer.reset();
        assert_eq!(buffer.read::<u8>().unwrap(), 17);
        assert_eq!(buffer.read::<u8>().unwrap(), 110);
        buffer.check_crc().unwrap();
        buffer.read_end_of_frame().unwrap();
        assert_eq!(buffer.read_wait_for_rx().unwrap(), 1800);
    }

    let bases = [
        3.141592_f32,
        2.0,
        -56.3211,
        2021.5788,
        789_564_687.4545,
        -478_967.445_456,
    ];
    let mut response = ModbusBuffer::new(FrameDialect::ILC);
    response.write(17_u8);
    response.write(110_u8);
    for base in bases {
        for i in 0..4 {
            response.write(base * i as f32);
        }
    }
    response.write_crc();

    ilc.process_response(response.words()).unwrap();
    ilc.check_commanded_empty().unwrap();

    let (address, calibration) = &ilc.handler().calibrations[0];
    assert_eq!(*address, 17);
    let groups = [
        calibration.main_adc_k,
        calibration.main_offset,
        calibration.main_sensitivity,
        calibration.backup_adc_k,
        calibration.backup_offset,
        calibration.backup_sensitivity,
    ];
    for (group, base) in groups.iter().zip(bases) {
        for (i, value) in group.iter().enumerate() {
            assert_eq!(*value, base * i as f32);
        }
    }
}

#[test]
fn mezzanine_pressure_parse_reorders_secondary_circuit() {
    let mut ilc = Ilc::electromechanical_pneumatic(1, Recorder::default());
    ilc.report_mezzanine_pressure(18);

    {
        let buffer = ilc.buffer_mut();
        buffer.reset();
        assert_eq!(buffer.read::<u8>().unwrap(), 18);
        assert_eq!(buffer.read::<u8>().unwrap(), 119);
        buffer.check_crc().unwrap();
        buffer.read_end_of_frame().unwrap();
        assert_eq!(buffer.read_wait_for_rx().unwrap(), 1800);
    }

    let mut response = ModbusBuffer::new(FrameDialect::ILC);
    response.write(18_u8);
    response.write(119_u8);
    response.write(3.141592_f32);
    response.write(1.3456_f32);
    response.write(-127.657_f32);
    response.write(-3.1468_f32);
    response.write_crc();

    ilc.process_response(response.words()).unwrap();
    ilc.check_commanded_empty().unwrap();

    assert_eq!(
        ilc.handler().pressures,
        vec![(18, [3.141592, 1.3456, -3.1468, -127.657])]
    );
}

#[test]
fn hardpoint_force_status_parse() {
    let mut ilc = Ilc::electromechanical_pneumatic(1, Recorder::default());
    ilc.report_hardpoint_force_status(8);

    let mut response = ModbusBuffer::new(FrameDialect::ILC);
    response.write(8_u8);
    response.write(67_u8);
    response.write(0x10_u8);
    response.write(-12345_i32);
    response.write(512.5_f32);
    response.write_crc();

    ilc.process_response(response.words()).unwrap();
    ilc.check_commanded_empty().unwrap();

    assert_eq!(ilc.handler().hardpoints, vec![(8, 0x10, -12345, 512.5)]);
}

#[test]
fn calibration_error_response_raises_exception() {
    let mut ilc = Ilc::electromechanical_pneumatic(1, Recorder::default());
    ilc.report_calibration_data(17);

    let mut response = ModbusBuffer::new(FrameDialect::ILC);
    response.write(17_u8);
    response.write(function_codes::REPORT_CALIBRATION_DATA_ERROR);
    response.write(3_u8);
    response.write_crc();

    assert_eq!(
        ilc.process_response(response.words()),
        Err(BusError::Exception {
            address: 17,
            function: function_codes::REPORT_CALIBRATION_DATA_ERROR,
            exception: 3,
        })
    );
    // The error response consumed the queued call.
    ilc.check_commanded_empty().unwrap();
}
