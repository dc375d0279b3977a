// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data model shared by every component: the frequency table, per-channel
//! calibration state, and the small mirror of DRAM mode-register bits the
//! firmware must keep consistent.

/// Index into the frequency table. Index 0 is always the boot frequency:
/// a low, stable setting used for bring-up and as CBT's "safe" operating
/// point.
pub type PhyFrequencyId = u8;

pub const BOOT_FREQ_ID: PhyFrequencyId = 0;

/// Number of configured frequencies in this image's table. A real board
/// image sets this from its own board support constants; the default here
/// covers the common four-frequency LPDDR4 configuration.
pub const MAX_FREQUENCIES: usize = 4;

pub const NUM_CHANNELS: usize = 2;
pub const NUM_DQ_BYTES: usize = 2;
pub const NUM_RANKS: usize = 2;

/// DFI clock ratio between the DRAM command clock and the PHY's internal
/// processing clock. Centralises the `MAX_COMMAND_FRAMES >> ratio` and
/// `1 << ratio` arithmetic used throughout the packet engine and command
/// builder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FreqRatio {
    OneToOne,
    OneToTwo,
    OneToFour,
}

impl FreqRatio {
    /// Number of 4-frame command templates a fully-encoded address
    /// sequence collapses into at this ratio.
    pub fn command_frame_packets(self, max_command_frames: u8) -> u8 {
        max_command_frames >> self.shift()
    }

    /// Number of PHY-clock cycles that elapse per DRAM command-clock
    /// cycle at this ratio.
    pub fn cycles_per_packet(self) -> u8 {
        1 << self.shift()
    }

    fn shift(self) -> u32 {
        match self {
            FreqRatio::OneToOne => 0,
            FreqRatio::OneToTwo => 1,
            FreqRatio::OneToFour => 2,
        }
    }
}

/// Three VCO instances; exactly one is current at any time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PllVcoId {
    Vco0 = 0,
    Vco1 = 1,
    Vco2 = 2,
}

/// FLL (frequency-lock loop) calibration search state for one VCO at one
/// frequency.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PllCal {
    pub band: u8,
    pub fine: u8,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PllCfg {
    pub vco_id_hint: Option<PllVcoIdRepr>,
    pub lock_count_threshold: u16,
    pub refclk_count: u16,
    pub vco_count_target: u16,
}

/// `PllVcoId` without the enum's niche, so it round-trips through
/// `#[derive(Default)]` containers (a plain frequency table entry has no
/// natural "default VCO").
pub type PllVcoIdRepr = u8;

/// Per-clock-domain phase-interpolator code.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PiCodes {
    pub odr: u8,
    pub qdr: u8,
    pub ddr: u8,
    pub rt: u8,
    pub sdr: u8,
    pub dfi: u8,
    pub ren: u8,
    pub rcs: u8,
    pub rdqs: u8,
}

/// Low-power delay element, one per bit lane.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LpdeCodes {
    pub bits: [u8; 8],
}

/// Per-side (T/C, P/N) receiver trim.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ReceiverTrim {
    pub tc_delay: u8,
    pub p_delay: u8,
    pub n_delay: u8,
    pub vref_code: u8,
}

/// SDR pipeline staging for a signal launched through the gearbox: how many
/// whole cycles to hold (`pipe_en`), which phase-select tap to launch from
/// (`x_sel`), and the remaining fine delay (`fc_delay`).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SdrPipeline {
    pub pipe_en: u8,
    pub x_sel: u8,
    pub fc_delay: u8,
}

/// Per-rank datapath state for one DQ byte of one channel.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DqByteState {
    pub tx_pi: PiCodes,
    pub rx_pi: PiCodes,
    pub tx_lpde: LpdeCodes,
    pub rx_lpde: LpdeCodes,
    pub driver_impedance: u8,
    pub driver_pn_cal: u8,
    pub rx_trim: [ReceiverTrim; 2], // [T, C] side
    pub sense_amp_cal: [u8; 8],
    pub ie_pipeline: SdrPipeline,
    pub re_pipeline: SdrPipeline,
    pub ren_pipeline: SdrPipeline,
    pub oe_pipeline: SdrPipeline,
    pub gearbox_ratio: FreqRatio,
}

impl Default for FreqRatio {
    fn default() -> Self {
        FreqRatio::OneToTwo
    }
}

/// Per-channel aggregate datapath state across both DQ bytes and the CA
/// lane, replicated per rank where the hardware replicates it.
#[derive(Clone, Debug, Default)]
pub struct ChannelState {
    pub dq: [[DqByteState; NUM_DQ_BYTES]; NUM_RANKS],
    pub ca_pi: PiCodes,
    pub ca_lpde: LpdeCodes,
}

/// The small mirror of LPDDR4 mode-register bits the firmware must keep
/// consistent. Mutated only via DFI-MRW packets, never written directly.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DramState {
    pub mr1: u8,
    pub mr2: u8,
    pub mr11: u8,
    pub mr12: u8,
    pub mr13: u8,
    pub mr14: u8,
}

impl DramState {
    pub const MR2_WRLVL_BIT: u8 = 1 << 7;
    pub const MR13_VRCG_BIT: u8 = 1 << 3;
    pub const MR13_CBT_BIT: u8 = 1 << 4;

    pub fn write_level_enabled(&self) -> bool {
        self.mr2 & Self::MR2_WRLVL_BIT != 0
    }

    pub fn cbt_enabled(&self) -> bool {
        self.mr13 & Self::MR13_CBT_BIT != 0
    }
}

/// DFI timing parameters for one frequency: read/write latency in DFI
/// clocks, chip-select assertion windows, and clock-enable windows.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DfiTiming {
    pub read_latency: u8,
    pub write_latency: u8,
    pub cs_window: u8,
    pub ck_enable_window: u8,
}

/// Everything needed to prep and train one frequency point.
#[derive(Clone, Debug, Default)]
pub struct FrequencyEntry {
    pub pll_cfg: PllCfg,
    pub pll_cal: [PllCal; 3], // indexed by PllVcoId
    pub vco_id: PllVcoIdRepr,
    pub ratio: FreqRatio,
    pub channel: [ChannelState; NUM_CHANNELS],
    pub common_vref: u8,
    pub zqcal_code: u8,
    pub dram: DramState,
    pub dfi: DfiTiming,
}

/// Owns the per-frequency configuration the rest of the firmware prepares
/// from and trains into. Mutated only from the coordinator task, during
/// training or during prep — never concurrently (§5).
pub struct FrequencyTable {
    entries: [FrequencyEntry; MAX_FREQUENCIES],
}

impl FrequencyTable {
    pub const fn boot_id() -> PhyFrequencyId {
        BOOT_FREQ_ID
    }

    pub fn get(&self, id: PhyFrequencyId) -> Option<&FrequencyEntry> {
        self.entries.get(id as usize)
    }

    pub fn get_mut(&mut self, id: PhyFrequencyId) -> Option<&mut FrequencyEntry> {
        self.entries.get_mut(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        FrequencyTable {
            entries: Default::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ratio_arithmetic() {
        assert_eq!(FreqRatio::OneToOne.command_frame_packets(4), 4);
        assert_eq!(FreqRatio::OneToTwo.command_frame_packets(4), 2);
        assert_eq!(FreqRatio::OneToFour.command_frame_packets(4), 1);
        assert_eq!(FreqRatio::OneToOne.cycles_per_packet(), 1);
        assert_eq!(FreqRatio::OneToTwo.cycles_per_packet(), 2);
        assert_eq!(FreqRatio::OneToFour.cycles_per_packet(), 4);
    }

    #[test]
    fn table_indexing() {
        let table = FrequencyTable::default();
        assert!(table.get(0).is_some());
        assert!(table.get(MAX_FREQUENCIES as u8).is_none());
    }

    #[test]
    fn write_level_bit() {
        let mut d = DramState::default();
        assert!(!d.write_level_enabled());
        d.mr2 |= DramState::MR2_WRLVL_BIT;
        assert!(d.write_level_enabled());
    }
}
