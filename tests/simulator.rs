//! End-to-end request/response cycles through the simulated FPGA.

use crio_ilc::fpga::{ilc_commands, SimulatedFpga, SimulatedIlc};
use crio_ilc::ilc::{ElectromechanicalPneumaticHandler, FirmwareUpdateHandler};
use crio_ilc::{BusError, Ilc, IlcHandler, IlcMode, ServerId};

#[derive(Default)]
struct Station {
    server_ids: Vec<(u8, ServerId)>,
    statuses: Vec<(u8, IlcMode, u16, u16)>,
    mode_changes: Vec<(u8, IlcMode)>,
    temp_addresses: Vec<(u8, u8)>,
    resets: Vec<u8>,
    pressures: Vec<(u8, [f32; 4])>,
    page_acks: Vec<u8>,
    verifications: Vec<(u8, u16)>,
}

impl IlcHandler for Station {
    fn process_server_id(&mut self, address: u8, server_id: &ServerId) {
        self.server_ids.push((address, server_id.clone()));
    }

    fn process_server_status(&mut self, address: u8, mode: IlcMode, status: u16, faults: u16) {
        self.statuses.push((address, mode, status, faults));
    }

    fn process_change_ilc_mode(&mut self, address: u8, mode: IlcMode) {
        self.mode_changes.push((address, mode));
    }

    fn process_temp_ilc_address(&mut self, address: u8, new_address: u8) {
        self.temp_addresses.push((address, new_address));
    }

    fn process_reset_server(&mut self, address: u8) {
        self.resets.push(address);
    }
}

impl ElectromechanicalPneumaticHandler for Station {
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

impl FirmwareUpdateHandler for Station {
    fn process_write_application_page(&mut self, address: u8) {
        self.page_acks.push(address);
    }

    fn process_verify_user_application(&mut self, address: u8, status: u16) {
        self.verifications.push((address, status));
    }
}

fn hardpoint(firmware_name: &str) -> SimulatedIlc {
    SimulatedIlc {
        unique_id: 0x0011_2233_4455,
        application_type: 7,
        network_node_type: 2,
        major_revision: 1,
        minor_revision: 4,
        firmware_name: firmware_name.to_string(),
        ..SimulatedIlc::default()
    }
}

#[test]
fn status_and_mode_change_cycle() {
    let mut fpga = SimulatedFpga::new();
    fpga.add_ilc(8, hardpoint("hp 2.1"));
    let mut ilc = Ilc::electromechanical_pneumatic(1, Station::default());

    ilc.report_server_id(8);
    ilc.report_server_status(8);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();

    assert_eq!(ilc.handler().server_ids.len(), 1);
    let (address, server_id) = &ilc.handler().server_ids[0];
    assert_eq!(*address, 8);
    assert_eq!(server_id.unique_id, 0x0011_2233_4455);
    assert_eq!(server_id.firmware_name, "hp 2.1");
    assert_eq!(ilc.handler().statuses, vec![(8, IlcMode::Standby, 0, 0)]);
    assert_eq!(ilc.last_mode(8), Some(IlcMode::Standby));

    ilc.change_ilc_mode(8, IlcMode::Enabled);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();
    assert_eq!(ilc.handler().mode_changes, vec![(8, IlcMode::Enabled)]);
    assert_eq!(ilc.last_mode(8), Some(IlcMode::Enabled));
    assert_eq!(fpga.ilc(8).unwrap().mode, IlcMode::Enabled);

    // The first status read after the transition reports the new mode; an
    // identical repeat is suppressed by change detection.
    ilc.report_server_status(8);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();
    assert_eq!(ilc.handler().statuses.len(), 2);
    assert_eq!(ilc.handler().statuses[1], (8, IlcMode::Enabled, 0, 0));

    ilc.report_server_status(8);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();
    assert_eq!(ilc.handler().statuses.len(), 2);

    ilc.reset_server(8);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();
    assert_eq!(ilc.handler().resets, vec![8]);
    assert_eq!(fpga.ilc(8).unwrap().mode, IlcMode::Standby);
}

#[test]
fn mezzanine_pressure_cycle() {
    let mut fpga = SimulatedFpga::new();
    let mut pneumatic = hardpoint("fa 3.0");
    pneumatic.mezzanine_pressure = [3.141592, 1.3456, -127.657, -3.1468];
    fpga.add_ilc(18, pneumatic);

    let mut ilc = Ilc::electromechanical_pneumatic(1, Station::default());
    ilc.report_mezzanine_pressure(18);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();

    assert_eq!(
        ilc.handler().pressures,
        vec![(18, [3.141592, 1.3456, -3.1468, -127.657])]
    );
}

#[test]
fn firmware_programming_cycle() {
    let mut fpga = SimulatedFpga::new();
    fpga.add_ilc(21, hardpoint("boot 0.9"));

    let mut ilc = Ilc::electromechanical_pneumatic(1, Station::default());
    ilc.register_firmware_update();

    let page: Vec<u8> = (0..192).map(|i| i as u8).collect();
    ilc.change_ilc_mode(21, IlcMode::FirmwareUpdate);
    ilc.erase_application(21);
    ilc.write_application_page(21, 0, &page);
    ilc.write_application_stats(21, 0x0495, 0, 192, 0x3BAB);
    ilc.verify_user_application(21);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();

    assert_eq!(ilc.handler().mode_changes, vec![(21, IlcMode::FirmwareUpdate)]);
    assert_eq!(ilc.handler().page_acks, vec![21]);
    assert_eq!(ilc.handler().verifications, vec![(21, 0)]);
    assert_eq!(fpga.ilc(21).unwrap().mode, IlcMode::FirmwareUpdate);
    assert_eq!(fpga.ilc(21).unwrap().application_pages[&0], page);
}

#[test]
fn temp_address_assignment() {
    let mut fpga = SimulatedFpga::new();
    let mut ilc = Ilc::new(1, Station::default());

    ilc.set_temp_ilc_address(17);
    ilc_commands(&mut fpga, &mut ilc, 100).unwrap();

    assert_eq!(ilc.handler().temp_addresses, vec![(255, 17)]);
}

#[test]
fn unknown_address_surfaces_as_driver_error() {
    let mut fpga = SimulatedFpga::new();
    let mut ilc = Ilc::new(1, Station::default());

    ilc.report_server_status(9);
    assert!(matches!(
        ilc_commands(&mut fpga, &mut ilc, 100),
        Err(BusError::Driver(_))
    ));
}
