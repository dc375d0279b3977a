// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C8: the PHY coordinator task. The top-level message pump that routes
//! each incoming event into C5 (frequency-switch FSM) or C6 (DFI-update
//! FSM), arbitrates the cross-protocol mutual exclusion rules of §4.8,
//! and owns the retry path for events that arrive while the other
//! protocol has the shared DFI sideband pins.
//!
//! Every entry point below is an idol operation, so "the message queue"
//! of §4.8 is the kernel's own IPC queue: a caller blocked on `sys_send`
//! is, in effect, sitting in our retry queue until we reply. A transient
//! illegality (PREP during CTRLUPD, a DFI event during a pending
//! frequency switch) is therefore reported back as `PhyError::Retry`
//! rather than literally requeued -- the sender is expected to call again,
//! exactly as §4.8 describes ("the coordinator sends SUCCESS/FAILURE/RETRY
//! back to each sender via a per-call notification").

#![no_std]
#![no_main]

use drv_wddr_phy_api::{
    DfiUpdateFsmState as ApiDfiState, PhyError, PhyFsmState as ApiFsmState, TrainingKind,
};
use drv_wddr_phy_server::csr;
use drv_wddr_phy_server::dfi::command::{Chipselect, Command};
use drv_wddr_phy_server::dfi::packet::{DataMask, PacketAllocator, PacketList, RxPacketBuffer};
use drv_wddr_phy_server::dfi_update::{
    DfiUpdateError, DfiUpdateFsm, DfiUpdateFsmState, IoCalibration, PhyMstrRequest, UpdateType,
};
use drv_wddr_phy_server::fsw::{FsmError, FswNotification, PhyFsmState, PhySwitchFsm};
use drv_wddr_phy_server::notify::{NotifyBus, NotifyEvent};
use drv_wddr_phy_server::pll::{PllEvent, PllFsm, PllState, PllStateListener};
use drv_wddr_phy_server::regs::{MmioBackend, Msr, RegisterAccessor};
use drv_wddr_phy_server::table::{FrequencyTable, PhyFrequencyId, PllVcoId};
use drv_wddr_phy_server::training::{self, baseline::write_then_read, Overlay, TrainingError, TrainingIo};
use enum_map::Enum;
use idol_runtime::{NotificationHandler, RequestError};
use multitimer::Multitimer;
use ringbuf::*;
use userlib::*;

/// The only software timer this task needs: the frequency-switch
/// watchdog (§5). A single-variant `Multitimer` is still the teacher's
/// idiom (`drv/front-io-server`, `drv/transceivers-server`) for owning
/// the one underlying OS timer rather than hand-rolling `sys_set_timer`
/// bookkeeping here.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Enum)]
enum Timers {
    FswWatchdog,
}

/// Base address of the PHY's memory-mapped CSR region. The register map
/// itself is out of scope (§1); board bring-up supplies this via its own
/// linker/task configuration. This is the one placeholder address a real
/// board image replaces with the value from its memory map.
const PHY_REGS_BASE: usize = 0x5000_0000;

/// Sticky interrupt bits on the shared PLL/DFI status register (§6,
/// mirrored by `csr::IRQ_*`). Declared locally rather than pulled from
/// the shared `notifications` build-time registry: this task's
/// notification allocation is board-specific and this core only needs to
/// agree with itself on which bit is which.
mod irq {
    pub const INIT_START: u32 = 1 << 0;
    pub const INIT_COMPLETE: u32 = 1 << 1;
    pub const CTRLUPD_REQ: u32 = 1 << 2;
    pub const CTRLUPD_REQ_DEASSERTED: u32 = 1 << 3;
    pub const PHYUPD_ACK: u32 = 1 << 4;
    pub const PHYUPD_ACK_DEASSERTED: u32 = 1 << 5;
    pub const PLL_LOSS_OF_LOCK: u32 = 1 << 6;
    pub const PLL_CORE_LOCKED: u32 = 1 << 7;
    pub const PLL_INITIAL_SWITCH_DONE: u32 = 1 << 8;
    pub const PHYMSTR_ACK: u32 = 1 << 9;
    pub const PHYMSTR_ABORT: u32 = 1 << 10;
    pub const TIMER_BIT: u8 = 11;
    pub const TIMER: u32 = 1 << TIMER_BIT;
    pub const ALL: u32 = INIT_START
        | INIT_COMPLETE
        | CTRLUPD_REQ
        | CTRLUPD_REQ_DEASSERTED
        | PHYUPD_ACK
        | PHYUPD_ACK_DEASSERTED
        | PLL_LOSS_OF_LOCK
        | PLL_CORE_LOCKED
        | PLL_INITIAL_SWITCH_DONE
        | PHYMSTR_ACK
        | PHYMSTR_ABORT
        | TIMER;
}

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    Boot,
    Prep(PhyFrequencyId, u8),
    PrepRetryDfiCtrlUpd,
    SwSwitch,
    HwSwitchMode,
    FswNotify(PhyFsmState),
    DfiNotify(DfiUpdateFsmState),
    PhyUpdRequested(u8),
    PhyUpdRetryFswPending,
    PhyMstrRequested,
    PhyMstrRetryFswPending,
    PhyMstrExit,
    TrainingStarted(u8, u8),
    TrainingFailed,
    TrainingCommitted,
    None,
}

ringbuf!(Trace, 64, Trace::None);

#[export_name = "main"]
fn main() -> ! {
    let mut server = ServerImpl::new();
    let mut buffer = [0; idl::INCOMING_SIZE];
    loop {
        idol_runtime::dispatch(&mut buffer, &mut server);
    }
}

/// One-shot request-type spin used while a training routine drives the
/// switch FSM synchronously to completion (§5: "training calls are
/// executed synchronously from the coordinator context"). Bounded by the
/// same 1 ms watchdog the asynchronous path uses; a training-initiated
/// switch that never reaches lock fails exactly like an external one.
const SYNC_SWITCH_POLL_ITERATIONS: u32 = 10_000;

/// No-op sink for [`PllStateListener`]. The coordinator's own reaction to
/// PLL lock/loss-of-lock runs through `PhySwitchFsm`'s entry points,
/// driven from the very same interrupt bits (see
/// `ServerImpl::handle_notification`); `PllFsm`'s internal state machine
/// only needs to be kept advancing here, not separately listened to.
struct NullPllListener;
impl PllStateListener for NullPllListener {
    fn on_pll_state_change(&mut self, _new_state: PllState) {}
}

/// Borrows only the register accessor, so it can be handed to the
/// DFI-update FSM's calibration hooks (§4.6) alongside a live
/// `&mut self.dfi` borrow without aliasing the rest of `ServerImpl`.
struct Iocal<'a> {
    regs: &'a mut RegisterAccessor<MmioBackend>,
}

impl IoCalibration for Iocal<'_> {
    fn iocal_calibrate(&mut self, _update_type: UpdateType) {
        // Real hardware computes a fresh IO-calibration code against the
        // analog reference here; this core only owns where the result
        // lands.
    }

    fn iocal_update_phy(&mut self, update_type: UpdateType) {
        self.regs.update(csr::IOCAL_CODE, update_type.0 as u32);
    }

    fn zqcal(&mut self) {
        self.regs.update(csr::IOCAL_CODE, 0);
    }
}

struct ServerImpl {
    regs: RegisterAccessor<MmioBackend>,
    table: FrequencyTable,
    fsw: PhySwitchFsm,
    dfi: DfiUpdateFsm,
    pll: PllFsm,
    notify: NotifyBus,
    ready: bool,
    hw_only_hint: bool,
    /// `freq_id` targeted by the prep currently in flight, so `sw_switch`
    /// knows which table entry's VCO to select without the FSM itself
    /// having to carry it (it only carries the MSR target, per §4).
    pending_freq: Option<PhyFrequencyId>,
    /// Backs `fsw`'s 1 ms watchdog with a real OS timer so the
    /// asynchronous (interrupt-driven) prep/sw_switch path gets a
    /// `TIMER` notification even if no other interrupt arrives to drive
    /// a `check_watchdog` poll.
    watchdog: Multitimer<Timers>,
}

impl ServerImpl {
    fn new() -> Self {
        // Safety: `PHY_REGS_BASE` is the start of this task's exclusively
        // owned memory-mapped PHY region, sized by the board's own
        // peripheral map.
        let backend = unsafe { MmioBackend::new(PHY_REGS_BASE) };
        ServerImpl {
            regs: RegisterAccessor::new(backend).with_irq_guard(irq::ALL),
            table: FrequencyTable::default(),
            fsw: PhySwitchFsm::new(PllVcoId::Vco1),
            dfi: DfiUpdateFsm::new(),
            pll: PllFsm::new(PllVcoId::Vco1, FrequencyTable::boot_id()),
            notify: NotifyBus::new(),
            ready: false,
            hw_only_hint: false,
            pending_freq: None,
            watchdog: Multitimer::new(irq::TIMER_BIT),
        }
    }

    fn now(&self) -> u64 {
        sys_get_timer().now
    }

    /// Re-arms or clears the OS timer backing `fsw`'s watchdog to match
    /// whatever deadline `fsw` is currently tracking. Called after every
    /// `fsw` entry point that might have armed or canceled it.
    fn sync_watchdog_timer(&mut self) {
        match self.fsw.watchdog_deadline() {
            Some(deadline) => self.watchdog.set_timer(Timers::FswWatchdog, deadline, None),
            None => {
                self.watchdog.clear_timer(Timers::FswWatchdog);
            }
        }
    }

    /// §4.8 routing table: a freq-switch event is retried, not rejected,
    /// while the DFI FSM sits in CTRLUPD specifically (not merely because
    /// a PHYUPD is in flight).
    fn freq_switch_blocked(&self) -> bool {
        self.dfi.blocks_freq_switch()
    }

    /// §4.8 routing table: a DFI event is retried while the freq-switch
    /// FSM has a switch pending (anything other than idle or the
    /// terminal-but-recoverable fail state counts as "pending").
    fn dfi_event_blocked(&self) -> bool {
        !matches!(self.fsw.state(), PhyFsmState::Idle | PhyFsmState::Fail)
    }

    fn map_fsm_error(err: FsmError) -> PhyError {
        match err {
            FsmError::IllegalTransition => PhyError::IllegalTransition,
            FsmError::InvalidVco => PhyError::InvalidFrequencyId,
            FsmError::WatchdogExpired => PhyError::FrequencySwitchFailed,
            FsmError::AlreadyInHwOnlyMode => PhyError::IllegalTransition,
        }
    }

    fn map_dfi_error(err: DfiUpdateError) -> PhyError {
        match err {
            DfiUpdateError::IllegalTransition => PhyError::DfiUpdateBusy,
        }
    }

    fn map_training_error(err: TrainingError) -> PhyError {
        match err {
            TrainingError::NoPassingRegion => PhyError::TrainingFailed,
            TrainingError::BaselineMismatch => PhyError::BaselineMismatch,
            TrainingError::FrequencySwitchFailed => PhyError::FrequencySwitchFailed,
        }
    }

    fn pll_vco_for(&self, freq_id: PhyFrequencyId) -> Option<PllVcoId> {
        self.table.get(freq_id).map(|e| match e.vco_id {
            0 => PllVcoId::Vco0,
            1 => PllVcoId::Vco1,
            _ => PllVcoId::Vco2,
        })
    }

    /// Drives the frequency-switch FSM, and its paired PLL FSM, from
    /// `prep` through to `Idle` entirely within this call, polling the
    /// hardware handshake bits instead of waiting on interrupts. Used by
    /// training's `switch_frequency` (§5) and by `boot`'s arm-to-boot-
    /// frequency step; the asynchronous, interrupt-driven path (`prep`/
    /// `sw_switch`/`handle_notification`) is what an external caller
    /// actually uses.
    fn drive_switch_to_completion(
        &mut self,
        freq_id: PhyFrequencyId,
    ) -> Result<(), TrainingError> {
        let msr = self.fsw.current_msr().other();
        self.fsw.prep(msr).map_err(|_| TrainingError::FrequencySwitchFailed)?;

        let entry = self
            .table
            .get(freq_id)
            .ok_or(TrainingError::FrequencySwitchFailed)?;
        let vco = self
            .pll_vco_for(freq_id)
            .ok_or(TrainingError::FrequencySwitchFailed)?;
        self.pll
            .prep(freq_id, vco, &entry.pll_cal[entry.vco_id as usize], &entry.pll_cfg)
            .map_err(|_| TrainingError::FrequencySwitchFailed)?;

        if let Some(note) = self.fsw.on_pll_prep_done(self.now()) {
            self.publish_fsw(note);
        }
        self.sync_watchdog_timer();

        for _ in 0..SYNC_SWITCH_POLL_ITERATIONS {
            if let Some(note) = self.fsw.check_watchdog(self.now()) {
                self.publish_fsw(note);
                self.sync_watchdog_timer();
                return Err(TrainingError::FrequencySwitchFailed);
            }
            if self.regs.read_field(csr::IRQ_INIT_START) != 0 {
                self.regs.update(csr::IRQ_INIT_START, 0);
                self.fsw.on_init_start().map_err(|_| TrainingError::FrequencySwitchFailed)?;
                break;
            }
        }
        for _ in 0..SYNC_SWITCH_POLL_ITERATIONS {
            if self.regs.read_field(csr::IRQ_INIT_COMPLETE) != 0 {
                self.regs.update(csr::IRQ_INIT_COMPLETE, 0);
                self.fsw.on_init_complete().map_err(|_| TrainingError::FrequencySwitchFailed)?;
                break;
            }
        }

        // `on_init_start`/`on_init_complete` already carried `fsw` through
        // WaitForSwitch -> Switch -> WaitForLock (the hardware-driven
        // path); `sw_switch` is the alternate, software-triggered entry
        // from WaitForSwitch straight to WaitForLock and would be illegal
        // here. The PLL side has no such fork -- it always needs its own
        // `switch` call to leave PrepDone.
        self.pll.switch(true).map_err(|_| TrainingError::FrequencySwitchFailed)?;

        for _ in 0..SYNC_SWITCH_POLL_ITERATIONS {
            if self.regs.read_field(csr::IRQ_PLL_LOSS_OF_LOCK) != 0 {
                self.regs.update(csr::IRQ_PLL_LOSS_OF_LOCK, 0);
                self.pll.handle_event(PllEvent::LossOfLock, &mut NullPllListener);
                if let Some(note) = self.fsw.on_pll_loss_of_lock() {
                    self.publish_fsw(note);
                }
                self.sync_watchdog_timer();
                return Err(TrainingError::FrequencySwitchFailed);
            }
            if self.regs.read_field(csr::IRQ_PLL_INITIAL_SWITCH_DONE) != 0 {
                self.regs.update(csr::IRQ_PLL_INITIAL_SWITCH_DONE, 0);
                self.pll.handle_event(PllEvent::InitialSwitchDone, &mut NullPllListener);
            }
            if self.regs.read_field(csr::IRQ_PLL_CORE_LOCKED) != 0 {
                self.regs.update(csr::IRQ_PLL_CORE_LOCKED, 0);
                self.pll.handle_event(PllEvent::CoreLocked, &mut NullPllListener);
                if let Some(note) = self.fsw.on_pll_locked() {
                    self.publish_fsw(note);
                }
                self.sync_watchdog_timer();
                return Ok(());
            }
        }
        Err(TrainingError::FrequencySwitchFailed)
    }

    fn publish_fsw(&mut self, note: FswNotification) {
        ringbuf_entry!(Trace::FswNotify(self.fsw.state()));
        self.notify.publish(match note {
            FswNotification::PrepDone => NotifyEvent::FswPrepDone,
            FswNotification::Done => NotifyEvent::FswDone,
            FswNotification::Failed => NotifyEvent::FswFailed,
        });
    }

    fn publish_dfi(&mut self, _note: drv_wddr_phy_server::dfi_update::DfiUpdateNotification) {
        ringbuf_entry!(Trace::DfiNotify(self.dfi.state()));
        self.notify.publish(NotifyEvent::DfiUpdateDone);
    }

    /// Issues one DFI-MRW packet and blocks (via IG-full poll) until the
    /// burst has drained. Shared by training-mode entry/exit.
    fn write_mode_register_now(&mut self, cs: Chipselect, mr: u8, value: u8) {
        let Some(cmd) = Command::write_mode_register(cs, mr, value) else { return };
        let mut list = PacketList::new(PacketAllocator::Slab);
        list.create_ck_packet_sequence(1);
        list.create_cke_packet_sequence(1, 2);
        list.create_address_packet_sequence(
            self.table
                .get(FrequencyTable::boot_id())
                .map(|e| e.ratio)
                .unwrap_or_default(),
            &cmd,
            1,
        );
        if list.load_packets(&mut self.regs).is_ok() {
            list.send_packets(&mut self.regs);
            while self.regs.read_field(csr::IG_FIFO_FULL) != 0 {}
        }
    }
}

/// Adapts `ServerImpl` to the sweep framework's `TrainingIo` capability
/// (§4.7, §9 "callback registration with context pointers"): every
/// training routine only ever sees these three operations, never the raw
/// register accessor or packet engine directly.
impl TrainingIo for ServerImpl {
    fn switch_frequency(
        &mut self,
        freq_id: PhyFrequencyId,
        overlay: Overlay,
    ) -> Result<(), TrainingError> {
        let overlay_code = match overlay {
            Overlay::None => 0,
            Overlay::Cbt => 1,
            Overlay::Bscan => 2,
        };
        self.regs.update(csr::OVERLAY_SELECT, overlay_code);
        self.drive_switch_to_completion(freq_id)
    }

    fn write_mode_register(&mut self, mr: u8, value: u8) {
        self.write_mode_register_now(Chipselect::Cs0, mr, value);
    }

    fn baseline_write_read(&mut self, freq_id: PhyFrequencyId) -> Result<(), TrainingError> {
        let ratio = self.table.get(freq_id).map(|e| e.ratio).unwrap_or_default();
        const SENT: [u8; 8] = [0xA5; 8];

        write_then_read(
            || {
                let mut wr = PacketList::new(PacketAllocator::Slab);
                wr.create_address_packet_sequence(ratio, &Command::wrfifo(Chipselect::Cs0), 1);
                wr.fill_wrdata_packet(0, 0, &SENT, 0, SENT.len());
                if wr.load_packets(&mut self.regs).is_ok() {
                    wr.send_packets(&mut self.regs);
                    while self.regs.read_field(csr::IG_FIFO_FULL) != 0 {}
                }
                SENT
            },
            || {
                let mut rd = PacketList::new(PacketAllocator::Slab);
                rd.create_address_packet_sequence(ratio, &Command::rdfifo(Chipselect::Cs0), 1);
                let _ = rd.load_packets(&mut self.regs);
                rd.send_packets(&mut self.regs);

                let mut rx = RxPacketBuffer::new();
                rx.read_packets(&self.regs, 1);
                rx.extract_phases(0, 0, SENT.len())
            },
        )
    }
}

impl idl::InOrderWddrPhyImpl for ServerImpl {
    fn boot(&mut self, _: &RecvMessage) -> Result<(), RequestError<PhyError>> {
        ringbuf_entry!(Trace::Boot);
        if self.ready {
            return Err(PhyError::IllegalTransition.into());
        }
        self.ready = true;
        // Arms the boot frequency (§3: index 0 is the boot frequency)
        // synchronously so the PHY is in a known-operational state before
        // any caller can request a prep or a training run.
        self.drive_switch_to_completion(FrequencyTable::boot_id())
            .map_err(Self::map_training_error)?;
        Ok(())
    }

    fn prep(
        &mut self,
        _: &RecvMessage,
        freq_id: PhyFrequencyId,
        msr: Msr,
    ) -> Result<(), RequestError<PhyError>> {
        if self.freq_switch_blocked() {
            ringbuf_entry!(Trace::PrepRetryDfiCtrlUpd);
            return Err(PhyError::Retry.into());
        }
        if self.table.get(freq_id).is_none() {
            return Err(PhyError::InvalidFrequencyId.into());
        }
        ringbuf_entry!(Trace::Prep(freq_id, msr.as_index() as u8));

        self.fsw.prep(msr).map_err(Self::map_fsm_error)?;
        self.pending_freq = Some(freq_id);

        let entry = self.table.get(freq_id).ok_or(PhyError::InvalidFrequencyId)?;
        let vco = self.pll_vco_for(freq_id).ok_or(PhyError::InvalidFrequencyId)?;
        self.pll
            .prep(freq_id, vco, &entry.pll_cal[entry.vco_id as usize], &entry.pll_cfg)
            .map_err(|_| PhyError::InvalidFrequencyId)?;

        if let Some(note) = self.fsw.on_pll_prep_done(self.now()) {
            self.publish_fsw(note);
        }
        self.sync_watchdog_timer();
        Ok(())
    }

    fn sw_switch(&mut self, _: &RecvMessage) -> Result<(), RequestError<PhyError>> {
        ringbuf_entry!(Trace::SwSwitch);
        let freq_id = self.pending_freq.ok_or(PhyError::IllegalTransition)?;
        let vco = self.pll_vco_for(freq_id).ok_or(PhyError::InvalidFrequencyId)?;
        self.fsw.sw_switch(vco).map_err(Self::map_fsm_error)?;
        self.pll.switch(true).map_err(|_| PhyError::IllegalTransition)?;
        Ok(())
    }

    fn hw_switch_mode(&mut self, _: &RecvMessage) -> Result<(), RequestError<PhyError>> {
        ringbuf_entry!(Trace::HwSwitchMode);
        self.fsw.hw_switch_mode().map_err(Self::map_fsm_error)?;
        self.hw_only_hint = true;
        Ok(())
    }

    fn get_fsw_state(&mut self, _: &RecvMessage) -> Result<ApiFsmState, RequestError<PhyError>> {
        Ok(match self.fsw.state() {
            PhyFsmState::Idle => ApiFsmState::Idle,
            PhyFsmState::Prep => ApiFsmState::Prep,
            PhyFsmState::WaitForSwitch => ApiFsmState::WaitForSwitch,
            PhyFsmState::Switch => ApiFsmState::Switch,
            PhyFsmState::WaitForLock => ApiFsmState::WaitForLock,
            PhyFsmState::PostSwitch => ApiFsmState::PostSwitch,
            PhyFsmState::Fail => ApiFsmState::Fail,
        })
    }

    fn get_dfi_state(&mut self, _: &RecvMessage) -> Result<ApiDfiState, RequestError<PhyError>> {
        Ok(match self.dfi.state() {
            DfiUpdateFsmState::Idle => ApiDfiState::Idle,
            DfiUpdateFsmState::Req => ApiDfiState::Req,
            DfiUpdateFsmState::PhyUpdWait => ApiDfiState::PhyUpdWait,
            DfiUpdateFsmState::CtrlUpdWait => ApiDfiState::CtrlUpdWait,
            DfiUpdateFsmState::Cal => ApiDfiState::Cal,
            DfiUpdateFsmState::Update => ApiDfiState::Update,
            DfiUpdateFsmState::UpdateExit => ApiDfiState::UpdateExit,
            DfiUpdateFsmState::PhyMstrPending => ApiDfiState::PhyMstrPending,
            DfiUpdateFsmState::PhyMstrActive => ApiDfiState::PhyMstrActive,
        })
    }

    fn request_phyupd(
        &mut self,
        _: &RecvMessage,
        update_type: u8,
    ) -> Result<(), RequestError<PhyError>> {
        if self.dfi_event_blocked() {
            ringbuf_entry!(Trace::PhyUpdRetryFswPending);
            return Err(PhyError::Retry.into());
        }
        ringbuf_entry!(Trace::PhyUpdRequested(update_type));
        self.dfi
            .req_update(UpdateType(update_type))
            .map_err(Self::map_dfi_error)?;
        self.regs.update(csr::PHYUPD_TYPE, update_type as u32);
        Ok(())
    }

    /// Requests PHYMSTR control of the DFI bus (§6, §4.8's periodic-
    /// calibration use case: "requests PHYMSTR, waits for ACK, runs DRAM
    /// training, exits PHYMSTR"). Blocked the same way `request_phyupd`
    /// is while a frequency switch is pending.
    fn request_phymstr(
        &mut self,
        _: &RecvMessage,
        cs_state: u8,
        state_sel: u8,
    ) -> Result<(), RequestError<PhyError>> {
        if self.dfi_event_blocked() {
            ringbuf_entry!(Trace::PhyMstrRetryFswPending);
            return Err(PhyError::Retry.into());
        }
        ringbuf_entry!(Trace::PhyMstrRequested);
        self.dfi
            .request_phymstr(PhyMstrRequest { cs_state, state_sel })
            .map_err(Self::map_dfi_error)?;
        self.regs.update(csr::PHYMSTR_CS_STATE, cs_state as u32);
        self.regs.update(csr::PHYMSTR_STATE_SEL, state_sel as u32);
        self.regs.update(csr::PHYMSTR_REQ, 1);
        Ok(())
    }

    /// One-shot: the PHY is done mastering the bus (caller has already put
    /// the DRAM back into the memory controller's expected state) and
    /// releases the request line.
    fn exit_phymstr(&mut self, _: &RecvMessage) -> Result<(), RequestError<PhyError>> {
        ringbuf_entry!(Trace::PhyMstrExit);
        self.regs.update(csr::PHYMSTR_REQ, 0);
        match self.dfi.exit_phymstr() {
            Some(note) => {
                self.publish_dfi(note);
                Ok(())
            }
            None => Err(PhyError::IllegalTransition.into()),
        }
    }

    fn run_training(
        &mut self,
        _: &RecvMessage,
        kind: u8,
        target_freq_id: PhyFrequencyId,
    ) -> Result<(), RequestError<PhyError>> {
        let kind = TrainingKind::from_u8(kind).ok_or(PhyError::Unsupported)?;
        ringbuf_entry!(Trace::TrainingStarted(kind as u8, target_freq_id));
        if self.table.get(target_freq_id).is_none() {
            return Err(PhyError::InvalidFrequencyId.into());
        }

        let boot_freq = FrequencyTable::boot_id();
        let result = run_training_kind(self, kind, boot_freq, target_freq_id);

        match result {
            Ok(()) => {
                ringbuf_entry!(Trace::TrainingCommitted);
                self.notify.publish(NotifyEvent::TrainingDone);
                Ok(())
            }
            Err(e) => {
                ringbuf_entry!(Trace::TrainingFailed);
                self.notify.publish(NotifyEvent::TrainingFailed);
                Err(Self::map_training_error(e).into())
            }
        }
    }
}

/// Drives one knob pair onto the training CSRs and reports pass/fail
/// through the same write/read-FIFO loopback `baseline_write_read` uses
/// (§4.7's shared probe shape: every training's sweep is "set a code,
/// issue a burst, compare"). Uses a second, independent
/// `RegisterAccessor` over the same MMIO base rather than borrowing
/// `server`: the probe runs nested inside a `server`-borrowing
/// `training::*::run` call, so a closure over `server` itself would
/// double-borrow it. Hardware, not Rust's aliasing rules, is what
/// actually has to serialize access to the region; nothing else touches
/// it while a training call is in flight.
fn knob_probe(a: i32, b: i32) -> bool {
    // Safety: same physical region as `ServerImpl::regs`; see the comment
    // above for why a second view taken here is sound.
    let mut regs = unsafe { RegisterAccessor::new(MmioBackend::new(PHY_REGS_BASE)) };
    regs.update(csr::TRAINING_KNOB_A, a as u32 & 0xFF);
    regs.update(csr::TRAINING_KNOB_B, b as u32 & 0xFF);

    const SENT: [u8; 8] = [0x5A; 8];
    let ratio = drv_wddr_phy_server::table::FreqRatio::OneToTwo;

    let mut wr = PacketList::new(PacketAllocator::Slab);
    wr.create_address_packet_sequence(ratio, &Command::wrfifo(Chipselect::Cs0), 1);
    wr.fill_wrdata_packet(0, 0, &SENT, 0, SENT.len());
    if wr.load_packets(&mut regs).is_err() {
        return false;
    }
    wr.send_packets(&mut regs);
    while regs.read_field(csr::IG_FIFO_FULL) != 0 {}

    let mut rd = PacketList::new(PacketAllocator::Slab);
    rd.create_address_packet_sequence(ratio, &Command::rdfifo(Chipselect::Cs0), 1);
    if rd.load_packets(&mut regs).is_err() {
        return false;
    }
    rd.send_packets(&mut regs);

    let mut rx = RxPacketBuffer::new();
    rx.read_packets(&regs, 1);
    rx.validate_recv_data(&SENT, 0, DataMask::Both, 1, SENT.len())
}

/// Dispatches to one training routine and commits its result into the
/// frequency table (§4.7's step 6, "writes results back"). Kept free of
/// `ServerImpl` methods so each training module's own sweep ranges stay
/// next to the routine they belong to, rather than duplicated across
/// every arm of a match.
fn run_training_kind(
    server: &mut ServerImpl,
    kind: TrainingKind,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
) -> Result<(), TrainingError> {
    use drv_wddr_phy_server::bitmap::Range;

    const VREF_RANGE: Range = Range { start: 0x20, stop: 0x30, step: 2 };
    const PI_RANGE: Range = Range { start: 0x20, stop: 0x40, step: 2 };
    const DELAY_RANGE: Range = Range { start: 0x00, stop: 0x20, step: 2 };
    const CYCLE_RANGE: Range = Range { start: -2, stop: 2, step: 1 };

    match kind {
        TrainingKind::CommandBus => {
            let result =
                training::cbt::run(server, boot_freq, target_freq, VREF_RANGE, PI_RANGE, knob_probe)?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.channel[0].ca_pi.ddr = result.ca_pi_code;
                entry.channel[0].ca_pi.qdr = result.ca_pi_code;
                entry.dram.mr12 = result.mr12;
            }
        }
        TrainingKind::WriteLeveling => {
            let code = training::write_level::run(server, boot_freq, target_freq, PI_RANGE, |p| {
                knob_probe(0, p)
            })?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.channel[0].dq[0][0].tx_pi.ddr = code;
                entry.channel[0].dq[0][0].tx_pi.qdr = code;
            }
        }
        TrainingKind::ReadDq => {
            let result = training::read_dq::run(
                server,
                boot_freq,
                target_freq,
                VREF_RANGE,
                DELAY_RANGE,
                knob_probe,
            )?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.common_vref = result.common_vref;
                for rank in 0..drv_wddr_phy_server::table::NUM_RANKS {
                    entry.channel[0].dq[rank][0].rx_trim[0].tc_delay = result.tc_delay;
                }
            }
        }
        TrainingKind::ReadEnable => {
            let ratio = server.table.get(target_freq).map(|e| e.ratio).unwrap_or_default();
            let result = training::ren::run(
                server,
                boot_freq,
                target_freq,
                ratio,
                PI_RANGE,
                CYCLE_RANGE,
                |p| knob_probe(0, p),
                knob_probe,
            )?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.channel[0].dq[0][0].ie_pipeline = result.ie_pipeline;
                entry.channel[0].dq[0][0].re_pipeline = result.re_pipeline;
                entry.channel[0].dq[0][0].ren_pipeline = result.ren_pipeline;
                entry.channel[0].dq[0][0].rx_pi.ren = result.ren_pi_code;
            }
        }
        TrainingKind::ReadWindow => {
            let code = training::read_window::run(server, boot_freq, target_freq, DELAY_RANGE, |o| {
                knob_probe(0, o)
            })?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.channel[0].dq[0][0].ie_pipeline.fc_delay = code;
                entry.channel[0].dq[0][0].re_pipeline.fc_delay = code;
            }
        }
        TrainingKind::WriteDqDqs => {
            let ratio = server.table.get(target_freq).map(|e| e.ratio).unwrap_or_default();
            let result = training::dq_dqs::run(
                server,
                boot_freq,
                target_freq,
                ratio,
                CYCLE_RANGE,
                VREF_RANGE,
                PI_RANGE,
                |c, v, p| knob_probe(c ^ v, p),
            )?;
            if let Some(entry) = server.table.get_mut(target_freq) {
                entry.channel[0].dq[0][0].tx_pi.ddr = result.dq_pi_code;
                entry.channel[0].dq[0][0].tx_pi.qdr = result.dq_pi_code;
                entry.channel[0].dq[0][0].ie_pipeline = result.dq_pipeline;
                entry.channel[0].dq[0][0].oe_pipeline = result.oe_pipeline;
                entry.common_vref = result.dq_vref;
            }
        }
        TrainingKind::Baseline => {
            server.switch_frequency(target_freq, Overlay::None)?;
        }
    }
    server.baseline_write_read(target_freq)
}

impl NotificationHandler for ServerImpl {
    fn current_notification_mask(&self) -> u32 {
        irq::ALL
    }

    fn handle_notification(&mut self, bits: u32) {
        if bits & irq::PLL_LOSS_OF_LOCK != 0 {
            self.regs.update(csr::IRQ_PLL_LOSS_OF_LOCK, 0);
            self.pll.handle_event(PllEvent::LossOfLock, &mut NullPllListener);
            if let Some(note) = self.fsw.on_pll_loss_of_lock() {
                self.publish_fsw(note);
            }
            self.sync_watchdog_timer();
        }
        if bits & irq::PLL_INITIAL_SWITCH_DONE != 0 {
            self.regs.update(csr::IRQ_PLL_INITIAL_SWITCH_DONE, 0);
            self.pll.handle_event(PllEvent::InitialSwitchDone, &mut NullPllListener);
        }
        if bits & irq::PLL_CORE_LOCKED != 0 {
            self.regs.update(csr::IRQ_PLL_CORE_LOCKED, 0);
            self.pll.handle_event(PllEvent::CoreLocked, &mut NullPllListener);
            if let Some(note) = self.fsw.on_pll_locked() {
                self.publish_fsw(note);
            }
            self.sync_watchdog_timer();
        }
        if bits & irq::INIT_START != 0 {
            self.regs.update(csr::IRQ_INIT_START, 0);
            // §4.8 cross-protocol rule / DFI 5.0 §4.21: INIT_START
            // preempts whichever update protocol is in flight before the
            // switch is allowed to proceed.
            self.dfi.abort();
            if self.fsw.state() == PhyFsmState::WaitForSwitch {
                let _ = self.fsw.on_init_start();
                let _ = self.pll.switch(false);
            }
        }
        if bits & irq::INIT_COMPLETE != 0 {
            self.regs.update(csr::IRQ_INIT_COMPLETE, 0);
            let _ = self.fsw.on_init_complete();
        }
        if bits & irq::PHYUPD_ACK != 0 {
            self.regs.update(csr::IRQ_PHYUPD_ACK, 0);
            let dfi = &mut self.dfi;
            let mut cal = Iocal { regs: &mut self.regs };
            let _ = dfi.on_phyupd_ack(&mut cal);
        }
        if bits & irq::PHYUPD_ACK_DEASSERTED != 0 {
            self.regs.update(csr::IRQ_PHYUPD_ACK_DEASSERTED, 0);
            if let Some(note) = self.dfi.on_phyupd_ack_deasserted() {
                self.publish_dfi(note);
            }
        }
        if bits & irq::CTRLUPD_REQ != 0 {
            self.regs.update(csr::IRQ_CTRLUPD_REQ, 0);
            if !self.dfi_event_blocked() {
                let dfi = &mut self.dfi;
                let mut cal = Iocal { regs: &mut self.regs };
                let _ = dfi.on_ctrlupd_req(&mut cal);
            }
        }
        if bits & irq::CTRLUPD_REQ_DEASSERTED != 0 {
            self.regs.update(csr::IRQ_CTRLUPD_REQ_DEASSERTED, 0);
            if let Some(note) = self.dfi.on_ctrlupd_req_deasserted() {
                self.publish_dfi(note);
            }
        }
        if bits & irq::PHYMSTR_ACK != 0 {
            self.regs.update(csr::IRQ_PHYMSTR_ACK, 0);
            let _ = self.dfi.on_phymstr_ack();
        }
        if bits & irq::PHYMSTR_ABORT != 0 {
            self.regs.update(csr::IRQ_PHYMSTR_ABORT, 0);
            self.regs.update(csr::PHYMSTR_REQ, 0);
            self.dfi.abort();
        }
        if bits & irq::TIMER != 0 {
            self.watchdog.handle_notification(bits);
            let fired = self.watchdog.iter_fired().count();
            if fired > 0 {
                if let Some(note) = self.fsw.check_watchdog(self.now()) {
                    self.publish_fsw(note);
                }
            }
        }
    }
}

mod idl {
    use drv_wddr_phy_api::{DfiUpdateFsmState, PhyError, PhyFsmState};
    use drv_wddr_phy_server::regs::Msr;

    include!(concat!(env!("OUT_DIR"), "/server_stub.rs"));
}
