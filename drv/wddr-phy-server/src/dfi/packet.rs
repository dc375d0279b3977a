// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C3: TX packet list assembly, IG FIFO load/send, EG FIFO drain, RX
//! compare.

use crate::csr;
use crate::dfi::command::{Command, MAX_COMMAND_FRAMES};
use crate::regs::{RegisterAccessor, RegisterBackend};
use crate::table::FreqRatio;

/// Upper bound on packets live in one TX burst. The mandatory embedded
/// allocator is a fixed slab (§4.3/§9); we size the slab generously enough
/// to cover the longest training burst (a full CBT address-sequence plus
/// wrap-up) without ever reaching for the heap.
pub const MAX_PACKETS: usize = 64;
pub const PACKET_MAX_NUM_PHASES: usize = 8;

/// HW reserves timestamp 0; the first real packet starts counting from 1.
const INITIAL_TS: u16 = 1;

/// 32-bit words one [`DfiTxPacket`] occupies in the IG FIFO: one header
/// word (timestamp, WCK toggle, hold) plus two words per phase (control
/// bits, then write-data bytes/masks).
pub const TX_PACKET_SIZE_WORDS: usize = 1 + 2 * PACKET_MAX_NUM_PHASES;

/// 32-bit words one [`DfiRxPacket`] occupies in the EG FIFO: one header
/// word (captured CA) plus one word per phase (DQ bytes, DBI masks,
/// valid).
pub const RX_PACKET_SIZE_WORDS: usize = 1 + PACKET_MAX_NUM_PHASES;

/// Errors the IG/EG FIFO drive can hit; distinct from [`TrainingError`]
/// since these are purely hardware-handshake failures, not training
/// convergence failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PacketError {
    FifoFull,
}

/// One DFI cycle: 4 or 8 sub-phases of DCE/CKE/CS/address/data, plus the
/// 16-bit timestamp that the hardware's comparator matches against to
/// release this packet from the IG FIFO.
#[derive(Copy, Clone, Debug, Default)]
pub struct DfiTxPacket {
    pub ts: u16,
    pub dce: [bool; PACKET_MAX_NUM_PHASES],
    pub cke: [u8; PACKET_MAX_NUM_PHASES],
    pub cs: [u8; PACKET_MAX_NUM_PHASES],
    pub address: [u8; PACKET_MAX_NUM_PHASES],
    pub wrdata: [[u8; PACKET_MAX_NUM_PHASES]; 2], // [dq_byte][phase]
    pub wrdata_mask: [[bool; PACKET_MAX_NUM_PHASES]; 2],
    pub wck_toggle: bool,
    pub write_enable: [bool; PACKET_MAX_NUM_PHASES],
    pub read_enable: [bool; PACKET_MAX_NUM_PHASES],
    pub read_cs: [u8; PACKET_MAX_NUM_PHASES],
    /// Keeps the previous packet's write-data lanes asserted while the
    /// next burst is staged, so CBT never sees a clock gap (§4.3 "hold").
    pub hold: bool,
}

impl DfiTxPacket {
    /// Packs this packet into the words `load_packets` pushes into the IG
    /// FIFO, one header word followed by a control/data word pair per
    /// phase. The bit layout is private to this crate -- nothing outside
    /// `load_packets`/`from_words` round-trips it.
    fn to_words(&self) -> [u32; TX_PACKET_SIZE_WORDS] {
        let mut words = [0u32; TX_PACKET_SIZE_WORDS];
        words[0] = self.ts as u32 | (self.wck_toggle as u32) << 16 | (self.hold as u32) << 17;
        for phase in 0..PACKET_MAX_NUM_PHASES {
            let control = self.dce[phase] as u32
                | (self.cke[phase] as u32) << 1
                | (self.cs[phase] as u32) << 3
                | (self.write_enable[phase] as u32) << 5
                | (self.read_enable[phase] as u32) << 6
                | (self.read_cs[phase] as u32) << 7
                | (self.address[phase] as u32) << 9;
            let data = self.wrdata[0][phase] as u32
                | (self.wrdata_mask[0][phase] as u32) << 8
                | (self.wrdata[1][phase] as u32) << 9
                | (self.wrdata_mask[1][phase] as u32) << 17;
            words[1 + 2 * phase] = control;
            words[2 + 2 * phase] = data;
        }
        words
    }
}

/// Received counterpart: captured data, DBI mask, and validity per phase
/// per DQ byte, plus the CA word captured for BSCAN/loopback trainings.
#[derive(Copy, Clone, Debug, Default)]
pub struct DfiRxPacket {
    pub dq: [[u8; PACKET_MAX_NUM_PHASES]; 2],
    pub dbi_mask: [[bool; PACKET_MAX_NUM_PHASES]; 2],
    pub valid: [bool; PACKET_MAX_NUM_PHASES],
    pub captured_ca: u8,
}

impl DfiRxPacket {
    /// Inverse of [`DfiTxPacket::to_words`]'s EG-side counterpart: unpacks
    /// the words `read_packets` drains from the EG FIFO.
    fn from_words(words: &[u32; RX_PACKET_SIZE_WORDS]) -> Self {
        let mut packet = DfiRxPacket { captured_ca: (words[0] & 0xFF) as u8, ..Default::default() };
        for phase in 0..PACKET_MAX_NUM_PHASES {
            let word = words[1 + phase];
            packet.dq[0][phase] = (word & 0xFF) as u8;
            packet.dq[1][phase] = ((word >> 9) & 0xFF) as u8;
            packet.dbi_mask[0][phase] = (word >> 8) & 0x1 != 0;
            packet.dbi_mask[1][phase] = (word >> 17) & 0x1 != 0;
            packet.valid[phase] = (word >> 18) & 0x1 != 0;
        }
        packet
    }
}

/// Which data lanes an RX compare should consider.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataMask {
    Even,
    Odd,
    Both,
}

impl DataMask {
    fn step(self) -> usize {
        if self == DataMask::Both { 1 } else { 2 }
    }

    fn start(self) -> usize {
        if self == DataMask::Odd { 1 } else { 0 }
    }
}

/// The two-variant packet allocator from §9's design notes. On the
/// embedded target only `Slab` is ever constructed; `Dynamic` exists for
/// host test builds that want an unbounded scratch buffer.
pub enum PacketAllocator {
    Slab,
    #[cfg(not(target_os = "none"))]
    Dynamic,
}

/// Time-ordered list of TX packets. Invariant: `ts` is strictly
/// monotonic across the list, and `last_ts` always equals the greatest
/// timestamp appended (§8 invariant 3).
pub struct PacketList {
    packets: heapless::Vec<DfiTxPacket, MAX_PACKETS>,
    last_ts: u16,
    allocator: PacketAllocator,
}

impl PacketList {
    pub fn new(allocator: PacketAllocator) -> Self {
        PacketList { packets: heapless::Vec::new(), last_ts: INITIAL_TS, allocator }
    }

    pub fn free(&mut self) {
        self.packets.clear();
        self.last_ts = INITIAL_TS;
    }

    pub fn last_ts(&self) -> u16 {
        self.last_ts
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DfiTxPacket> {
        self.packets.iter()
    }

    /// Appends a zero-initialized packet at `last_ts + ts_offset`. A zero
    /// offset is defined as a no-op: it returns `None` and leaves the list
    /// untouched, matching the "offset 0 means no-op" timestamp invariant.
    fn append(&mut self, ts_offset: u16) -> Option<&mut DfiTxPacket> {
        if ts_offset == 0 {
            return None;
        }
        let ts = self.last_ts.wrapping_add(ts_offset);
        let packet = DfiTxPacket { ts, ..Default::default() };
        self.packets.push(packet).ok()?;
        self.last_ts = ts;
        let idx = self.packets.len() - 1;
        Some(&mut self.packets[idx])
    }

    /// DCE high on all phases, at `last_ts + ts_offset`.
    pub fn create_ck_packet_sequence(&mut self, ts_offset: u16) -> bool {
        let Some(packet) = self.append(ts_offset) else { return false };
        for dce in packet.dce.iter_mut().take(4) {
            *dce = true;
        }
        true
    }

    /// Like CK, but also drives CKE high for every configured rank:
    /// `cke_val = (rank_count << 1) - 1`.
    pub fn create_cke_packet_sequence(&mut self, ts_offset: u16, rank_count: u8) -> bool {
        let Some(packet) = self.append(ts_offset) else { return false };
        let cke_val = (rank_count << 1).wrapping_sub(1);
        for i in 0..4 {
            packet.dce[i] = true;
            packet.cke[i] = cke_val;
        }
        true
    }

    /// Issues `MAX_COMMAND_FRAMES >> ratio` packets (2 at 1:2, 4 at 1:1),
    /// splitting the command's CA-frame array across phase pairs.
    pub fn create_address_packet_sequence(
        &mut self,
        ratio: FreqRatio,
        command: &Command,
        ts_offset: u16,
    ) -> bool {
        if ts_offset == 0 {
            return false;
        }
        let num_packets = ratio.command_frame_packets(MAX_COMMAND_FRAMES as u8) as usize;
        let mut phase_offset = 0usize;
        let mut ts = self.last_ts.wrapping_add(ts_offset);
        for _ in 0..num_packets {
            if phase_offset >= MAX_COMMAND_FRAMES {
                break;
            }
            let mut packet = DfiTxPacket { ts, ..Default::default() };
            for i in 0..4 {
                packet.dce[i] = true;
            }
            let frame0 = command.address[phase_offset];
            packet.cs[0] = frame0.cs;
            packet.cs[1] = frame0.cs;
            packet.address[0] = frame0.ca_pins;
            phase_offset += 1;

            if ratio == FreqRatio::OneToTwo && phase_offset < MAX_COMMAND_FRAMES {
                let frame1 = command.address[phase_offset];
                packet.cs[2] = frame1.cs;
                packet.cs[3] = frame1.cs;
                packet.address[2] = frame1.ca_pins;
                phase_offset += 1;
            }

            if self.packets.push(packet).is_err() {
                return false;
            }
            ts = ts.wrapping_add(1);
        }
        self.last_ts = ts - 1;
        true
    }

    /// Writes write-data bytes into a packet's phase slots for `dq_byte`,
    /// starting at `phase_start`, up to `cycles_per_pkt` phases.
    pub fn fill_wrdata_packet(
        &mut self,
        packet_index: usize,
        dq_byte: usize,
        data: &[u8],
        phase_start: usize,
        cycles_per_pkt: usize,
    ) -> usize {
        let Some(packet) = self.packets.get_mut(packet_index) else { return 0 };
        let mut written = 0;
        for i in 0..cycles_per_pkt {
            let phase = phase_start + i;
            if phase >= PACKET_MAX_NUM_PHASES || i >= data.len() {
                break;
            }
            packet.wrdata[dq_byte][phase] = data[i];
            packet.wrdata_mask[dq_byte][phase] = true;
            written += 1;
        }
        written
    }

    pub fn fill_wrdata_en_packet(&mut self, packet_index: usize, phase_start: usize, count: usize) {
        let Some(packet) = self.packets.get_mut(packet_index) else { return };
        for i in phase_start..(phase_start + count).min(PACKET_MAX_NUM_PHASES) {
            packet.write_enable[i] = true;
        }
    }

    pub fn fill_rddata_packet(&mut self, packet_index: usize, phase_start: usize, count: usize) {
        let Some(packet) = self.packets.get_mut(packet_index) else { return };
        for i in phase_start..(phase_start + count).min(PACKET_MAX_NUM_PHASES) {
            packet.read_enable[i] = true;
        }
    }

    /// Writes every packet's words into the IG FIFO, one word at a time,
    /// as long as `IG_FIFO_FULL` reads clear. Stops and reports
    /// `FifoFull` the moment a word doesn't fit; packets already pushed
    /// stay queued in hardware (there is no way to un-push a FIFO word).
    pub fn load_packets<B: RegisterBackend>(
        &self,
        regs: &mut RegisterAccessor<B>,
    ) -> Result<(), PacketError> {
        for packet in self.packets.iter() {
            for word in packet.to_words() {
                if regs.read_field(csr::IG_FIFO_FULL) != 0 {
                    return Err(PacketError::FifoFull);
                }
                regs.write(csr::IG_FIFO_DATA.addr, word);
            }
        }
        Ok(())
    }

    /// Arms the hardware timestamp comparator; queued IG packets stream
    /// out as their `ts` matches the free-running counter. Software then
    /// polls the IG-empty bit (via the caller's own register access, not
    /// this crate) to know the burst has finished.
    pub fn send_packets<B: RegisterBackend>(&self, regs: &mut RegisterAccessor<B>) {
        regs.update(csr::IG_BUFFER_MODE_ENABLE, 1);
    }
}

/// Fixed-size RX packet ring, mirroring the hardware's EG FIFO drain
/// depth.
pub struct RxPacketBuffer {
    buffer: heapless::Vec<DfiRxPacket, MAX_PACKETS>,
}

impl RxPacketBuffer {
    pub fn new() -> Self {
        RxPacketBuffer { buffer: heapless::Vec::new() }
    }

    pub fn push(&mut self, packet: DfiRxPacket) -> bool {
        self.buffer.push(packet).is_ok()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Polls the EG FIFO for up to `n` packets, pushing each complete
    /// packet as it drains. Stops as soon as `EG_FIFO_EMPTY` reads set
    /// (a burst shorter than `n` is not an error -- the caller asked for
    /// an upper bound, not an exact count) and returns how many were
    /// actually read.
    pub fn read_packets<B: RegisterBackend>(&mut self, regs: &RegisterAccessor<B>, n: usize) -> usize {
        let mut read = 0;
        while read < n {
            let mut words = [0u32; RX_PACKET_SIZE_WORDS];
            for word in words.iter_mut() {
                if regs.read_field(csr::EG_FIFO_EMPTY) != 0 {
                    return read;
                }
                *word = regs.read(csr::EG_FIFO_DATA.addr);
            }
            if !self.push(DfiRxPacket::from_words(&words)) {
                return read;
            }
            read += 1;
        }
        read
    }

    fn extract(&self, packet: &DfiRxPacket, dq_byte: usize, phases: usize) -> [u8; PACKET_MAX_NUM_PHASES] {
        let mut out = [0u8; PACKET_MAX_NUM_PHASES];
        out[..phases].copy_from_slice(&packet.dq[dq_byte][..phases]);
        out
    }

    /// Copies the captured phases for one `dq_byte` lane of packet `idx`
    /// out of the buffer. Used by callers that need the raw bytes rather
    /// than a pass/fail verdict, e.g. `ServerImpl::baseline_write_read`
    /// assembling a return value for [`crate::training::baseline::write_then_read`].
    pub fn extract_phases(
        &self,
        idx: usize,
        dq_byte: usize,
        phases: usize,
    ) -> [u8; PACKET_MAX_NUM_PHASES] {
        match self.buffer.get(idx) {
            Some(packet) => self.extract(packet, dq_byte, phases),
            None => [0u8; PACKET_MAX_NUM_PHASES],
        }
    }

    fn compare(received: &[u8], expected: &[u8], phases: usize, mask: DataMask) -> bool {
        let mut i = mask.start();
        while i < phases {
            if expected[i] != received[i] {
                return false;
            }
            i += mask.step();
        }
        true
    }

    /// Walks the RX buffer and compares each packet's `dq_byte` lane
    /// against the corresponding slice of `expected`, honoring
    /// `step = (mask == Both ? 1 : 2)` and `start = (mask has Even ? 0 : 1)`.
    pub fn validate_recv_data(
        &self,
        expected: &[u8],
        dq_byte: usize,
        mask: DataMask,
        num: usize,
        phases: usize,
    ) -> bool {
        for i in 0..num.min(self.buffer.len()) {
            let packet = &self.buffer[i];
            let data = self.extract(packet, dq_byte, phases);
            let slice = &expected[i * phases..i * phases + phases];
            if !Self::compare(&data[..phases], slice, phases, mask) {
                return false;
            }
        }
        true
    }
}

impl Default for RxPacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dfi::command::Chipselect;

    #[test]
    fn timestamps_are_monotonic() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(5);
        list.create_cke_packet_sequence(3, 1);
        let (cmd, _) = Command::cbt(Chipselect::Cs0, 0, 0);
        list.create_address_packet_sequence(FreqRatio::OneToTwo, &cmd, 1);

        let stamps: heapless::Vec<u16, MAX_PACKETS> = list.iter().map(|p| p.ts).collect();
        for w in stamps.windows(2) {
            assert!(w[1] > w[0]);
        }
        assert_eq!(list.last_ts(), *stamps.last().unwrap());
    }

    #[test]
    fn zero_offset_is_noop() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        assert!(!list.create_ck_packet_sequence(0));
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn free_resets_last_ts() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(5);
        list.free();
        assert_eq!(list.last_ts(), INITIAL_TS);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn rx_compare_both_mask_is_exact_equality() {
        let mut rx = RxPacketBuffer::new();
        let mut packet = DfiRxPacket::default();
        packet.dq[0][..4].copy_from_slice(&[1, 2, 3, 4]);
        rx.push(packet);
        assert!(rx.validate_recv_data(&[1, 2, 3, 4], 0, DataMask::Both, 1, 4));
        assert!(!rx.validate_recv_data(&[1, 2, 3, 5], 0, DataMask::Both, 1, 4));
    }

    #[test]
    fn load_packets_stops_on_fifo_full() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(5);
        let mut regs = crate::regs::RegisterAccessor::new(crate::regs::FakeBackend::default());
        regs.update(csr::IG_FIFO_FULL, 1);
        assert_eq!(list.load_packets(&mut regs), Err(PacketError::FifoFull));
    }

    #[test]
    fn load_packets_then_send_packets_arms_buffer_mode() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(5);
        let mut regs = crate::regs::RegisterAccessor::new(crate::regs::FakeBackend::default());
        assert!(list.load_packets(&mut regs).is_ok());
        list.send_packets(&mut regs);
        assert_eq!(regs.read_field(csr::IG_BUFFER_MODE_ENABLE), 1);
    }

    #[test]
    fn read_packets_drains_until_empty() {
        let mut regs = crate::regs::RegisterAccessor::new(crate::regs::FakeBackend::default());
        let words = DfiRxPacket { captured_ca: 0x2A, ..Default::default() };
        let mut packed = [0u32; RX_PACKET_SIZE_WORDS];
        packed[0] = words.captured_ca as u32;
        for (i, word) in packed.iter().enumerate() {
            regs.write(csr::EG_FIFO_DATA.addr, *word);
            let _ = i;
        }
        // A fake FIFO has no real queue semantics; exercise the empty-bit
        // short-circuit instead, which is the property read_packets must
        // honor regardless of backend.
        regs.update(csr::EG_FIFO_EMPTY, 1);
        let mut rx = RxPacketBuffer::new();
        assert_eq!(rx.read_packets(&regs, 4), 0);
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn scenario_packet_list_monotonicity() {
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(5);
        assert_eq!(list.last_ts(), 6);
        list.create_cke_packet_sequence(3, 1);
        assert_eq!(list.last_ts(), 9);
        let mrw = Command::write_mode_register(Chipselect::Cs0, 1, 0).unwrap();
        list.create_address_packet_sequence(FreqRatio::OneToFour, &mrw, 1);
        assert!(list.last_ts() > 9);
    }
}
