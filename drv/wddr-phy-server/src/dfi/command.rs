// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C4: encodes LPDDR4 command frames into the 6-bit CA-pin fields of a
//! four-frame command template, per JEDEC 209-4C.

/// Maximum number of DQ bytes' worth of data a single command can carry
/// (two bytes times the deepest burst, 32 beats).
pub const MAX_DATA_SIZE: usize = 32;
pub const MAX_COMMAND_FRAMES: usize = 4;

const CS_LOW: u8 = 0;
const CS_HIGH: u8 = 1;

const WR_1_CA_PINS: u8 = 0b000100;
const RD_1_CA_PINS: u8 = 0b000010;
const MPC_1_CA_PINS: u8 = 0b100000;
const WRFIFO_2_CA_PINS: u8 = 0b000111;
const RDFIFO_2_CA_PINS: u8 = 0b000001;
const RDDQ_2_CA_PINS: u8 = 0b000011;
const CAS_2_CA_PINS: u8 = 0b010010;
const MRW_1_CA_PINS: u8 = 0b000110;
const MRW_2_CA_PINS: u8 = 0b010110;
const MRR_1_CA_PINS: u8 = 0b001110;
const SRE_1_CA_PINS: u8 = 0b011000;
const SRX_1_CA_PINS: u8 = 0b010100;
const RFAB_1_CA_PINS: u8 = 0b101000;

/// Per section 3.4.1 of JEDEC 209-4C.
const MODE_REGISTER_NUM_MAX: u8 = 0x28;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Chipselect {
    Cs0 = 0,
    Cs1 = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BurstLength {
    Bl16 = 16,
    Bl32 = 32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandType {
    Write,
    Read,
    Mrw,
    Mrr,
    Cbt,
    SelfRefresh,
}

/// One of the four phases of a command's CA-bus frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandFrame {
    pub cs: u8,
    pub ca_pins: u8,
}

/// Per-DQ-byte write/expected-read data lanes for a command.
#[derive(Clone)]
pub struct CommandData {
    pub dq: [[u8; MAX_DATA_SIZE]; 2],
}

impl Default for CommandData {
    fn default() -> Self {
        CommandData { dq: [[0; MAX_DATA_SIZE]; 2] }
    }
}

#[derive(Clone)]
pub struct Command {
    pub command_type: CommandType,
    pub address: [CommandFrame; MAX_COMMAND_FRAMES],
}

impl Default for Command {
    fn default() -> Self {
        Command { command_type: CommandType::Mrw, address: Default::default() }
    }
}

fn set_command_chipselect(frame: &mut [CommandFrame; MAX_COMMAND_FRAMES], cs: Chipselect) {
    let cs = cs as u8;
    frame[0].cs = CS_HIGH << cs;
    frame[1].cs = 0;
    frame[2].cs = CS_HIGH << cs;
    frame[3].cs = 0;
}

fn self_refresh_entry_frame(cs: Chipselect) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame { cs: 0, ca_pins: 0 }; MAX_COMMAND_FRAMES];
    frame[0].ca_pins = SRE_1_CA_PINS;
    frame[0].cs = CS_HIGH << cs as u8;
    frame
}

fn self_refresh_exit_frame(cs: Chipselect) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame { cs: 0, ca_pins: 0 }; MAX_COMMAND_FRAMES];
    frame[0].ca_pins = SRX_1_CA_PINS;
    frame[0].cs = CS_HIGH << cs as u8;
    frame
}

fn refresh_all_banks_frame(cs: Chipselect) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame { cs: 0, ca_pins: 0 }; MAX_COMMAND_FRAMES];
    frame[0].ca_pins = RFAB_1_CA_PINS;
    frame[0].cs = CS_HIGH << cs as u8;
    frame
}

fn mode_register_write_frame(
    cs: Chipselect,
    mode_address: u8,
    op: u8,
) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    frame[0].ca_pins = MRW_1_CA_PINS | ((op & 0x80) >> 2);
    frame[1].ca_pins = mode_address & 0x3F;
    frame[2].ca_pins = MRW_2_CA_PINS | ((op & 0x40) >> 1);
    frame[3].ca_pins = op & 0x3F;
    set_command_chipselect(&mut frame, cs);
    frame
}

fn mode_register_read_frame(cs: Chipselect, mode_address: u8) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    // Per JEDEC 209-4C §4.46.1 note 8: C[8:2] are assumed zero for MRR.
    frame[0].ca_pins = MRR_1_CA_PINS;
    frame[1].ca_pins = mode_address & 0x3F;
    frame[2].ca_pins = CAS_2_CA_PINS;
    frame[3].ca_pins = 0;
    set_command_chipselect(&mut frame, cs);
    frame
}

fn cbt_write_frame(cs: Chipselect, ca_val: u8) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    frame[1].ca_pins = ca_val;
    frame[0].cs = CS_LOW;
    frame[1].cs = CS_HIGH << cs as u8;
    frame[2].cs = CS_LOW;
    frame[3].cs = CS_LOW;
    frame
}

fn write_frame(
    cs: Chipselect,
    bank_address: u8,
    column_address: u8,
    ap: u8,
    bl: BurstLength,
) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let bl = if bl == BurstLength::Bl32 { 1 } else { 0 };
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    frame[0].ca_pins = WR_1_CA_PINS | (bl << 5);
    frame[1].ca_pins =
        (0x7 & bank_address) | ((column_address & 0x80) >> 3) | (ap << 5);
    frame[2].ca_pins = CAS_2_CA_PINS | ((column_address & 0x40) >> 1);
    frame[3].ca_pins = column_address & 0x3F;
    set_command_chipselect(&mut frame, cs);
    frame
}

fn read_frame(
    cs: Chipselect,
    bank_address: u8,
    column_address: u8,
    ap: u8,
    bl: BurstLength,
) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let bl = if bl == BurstLength::Bl32 { 1 } else { 0 };
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    frame[0].ca_pins = RD_1_CA_PINS | (bl << 5);
    frame[1].ca_pins =
        (0x7 & bank_address) | ((column_address & 0x80) >> 3) | (ap << 5);
    frame[2].ca_pins = CAS_2_CA_PINS | ((column_address & 0x40) >> 1);
    frame[3].ca_pins = column_address & 0x3F;
    set_command_chipselect(&mut frame, cs);
    frame
}

fn mpc_frame(cs: Chipselect, op: u8) -> [CommandFrame; MAX_COMMAND_FRAMES] {
    let mut frame = [CommandFrame::default(); MAX_COMMAND_FRAMES];
    frame[0].ca_pins = MPC_1_CA_PINS;
    frame[1].ca_pins = op & 0x3F;
    frame[2].ca_pins = CAS_2_CA_PINS;
    set_command_chipselect(&mut frame, cs);
    frame
}

impl Command {
    pub fn write(
        data: &CommandData,
        bl: BurstLength,
        cs: Chipselect,
        bank_address: u8,
        column_address: u8,
        ap: u8,
    ) -> (Self, CommandData) {
        let _ = data;
        (
            Command {
                command_type: CommandType::Write,
                address: write_frame(cs, bank_address, column_address, ap, bl),
            },
            data.clone(),
        )
    }

    pub fn read(
        bl: BurstLength,
        cs: Chipselect,
        bank_address: u8,
        column_address: u8,
        ap: u8,
    ) -> Self {
        Command {
            command_type: CommandType::Read,
            address: read_frame(cs, bank_address, column_address, ap, bl),
        }
    }

    /// Silently a no-op (per §4.4) if `mode_register` exceeds the JEDEC
    /// maximum -- returns `None` instead of encoding garbage.
    pub fn write_mode_register(cs: Chipselect, mode_register: u8, op: u8) -> Option<Self> {
        if mode_register > MODE_REGISTER_NUM_MAX {
            return None;
        }
        Some(Command {
            command_type: CommandType::Mrw,
            address: mode_register_write_frame(cs, mode_register, op),
        })
    }

    pub fn read_mode_register(cs: Chipselect, mode_register: u8) -> Option<Self> {
        if mode_register > MODE_REGISTER_NUM_MAX {
            return None;
        }
        Some(Command {
            command_type: CommandType::Mrr,
            address: mode_register_read_frame(cs, mode_register),
        })
    }

    pub fn cbt(cs: Chipselect, vref_ca: u8, ca_val: u8) -> (Self, CommandData) {
        let mut data = CommandData::default();
        for byte in data.dq[0].iter_mut() {
            *byte = vref_ca;
        }
        (
            Command { command_type: CommandType::Cbt, address: cbt_write_frame(cs, ca_val) },
            data,
        )
    }

    pub fn wrfifo(cs: Chipselect) -> Self {
        Command { command_type: CommandType::Write, address: mpc_frame(cs, WRFIFO_2_CA_PINS) }
    }

    pub fn rdfifo(cs: Chipselect) -> Self {
        Command { command_type: CommandType::Read, address: mpc_frame(cs, RDFIFO_2_CA_PINS) }
    }

    pub fn rddq(cs: Chipselect) -> Self {
        Command { command_type: CommandType::Read, address: mpc_frame(cs, RDDQ_2_CA_PINS) }
    }

    pub fn self_refresh_entry(cs: Chipselect) -> Self {
        Command { command_type: CommandType::SelfRefresh, address: self_refresh_entry_frame(cs) }
    }

    pub fn self_refresh_exit(cs: Chipselect) -> Self {
        Command { command_type: CommandType::SelfRefresh, address: self_refresh_exit_frame(cs) }
    }

    pub fn refresh_all_banks(cs: Chipselect) -> Self {
        Command { command_type: CommandType::SelfRefresh, address: refresh_all_banks_frame(cs) }
    }
}

impl CommandData {
    /// Copies `src` into DQ byte `dq_byte`'s lane array at `offset`,
    /// clamping the copy length to never write past `MAX_DATA_SIZE`.
    pub fn fill(&mut self, dq_byte: usize, src: &[u8], offset: usize) {
        let offset = offset.min(MAX_DATA_SIZE);
        let len = src.len().min(MAX_DATA_SIZE - offset);
        self.dq[dq_byte][offset..offset + len].copy_from_slice(&src[..len]);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_register_write_rejects_out_of_range() {
        assert!(Command::write_mode_register(Chipselect::Cs0, 0x29, 0x00).is_none());
        assert!(Command::write_mode_register(Chipselect::Cs0, 0x28, 0x00).is_some());
    }

    #[test]
    fn data_frame_clamps_length() {
        let mut data = CommandData::default();
        let src = [0xAAu8; MAX_DATA_SIZE];
        data.fill(0, &src, MAX_DATA_SIZE - 4);
        assert_eq!(&data.dq[0][MAX_DATA_SIZE - 4..], &[0xAA; 4]);
    }

    #[test]
    fn cbt_chipselect_pattern_differs_from_shared_pattern() {
        let (cmd, _) = Command::cbt(Chipselect::Cs0, 0x2A, 0x34);
        assert_eq!(cmd.address[0].cs, CS_LOW);
        assert_eq!(cmd.address[1].cs, CS_HIGH);
        let mrw = Command::write_mode_register(Chipselect::Cs0, 2, 0).unwrap();
        assert_eq!(mrw.address[0].cs, CS_HIGH);
        assert_eq!(mrw.address[1].cs, 0);
    }
}
