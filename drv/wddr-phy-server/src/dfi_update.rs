// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C6: DFI update FSM. Handles PHYUPD request cycles (PHY-initiated) and
//! CTRLUPD assertion cycles (controller-initiated) with a calibration
//! hook shared between the two protocols (§4.6).

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DfiUpdateFsmState {
    Idle,
    Req,
    PhyUpdWait,
    CtrlUpdWait,
    Cal,
    Update,
    UpdateExit,
    PhyMstrPending,
    PhyMstrActive,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DfiUpdateError {
    IllegalTransition,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DfiUpdateNotification {
    Done,
}

/// Which of the three hardware sideband protocols this FSM is currently
/// running. `None` outside of a live request; distinguishes PHYUPD's
/// `Update`/`UpdateExit` tail from CTRLUPD's, which share state names but
/// not behavior, and gates PHYMSTR's pending/active pair against stray
/// acks arriving for a different protocol.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Protocol {
    PhyUpd,
    CtrlUpd,
    PhyMstr,
}

/// A PHYMSTR request's hardware parameters (§6 "PHYMSTR `req/type/
/// cs_state/state_sel`"): which chip-select state and interface state the
/// PHY is asking to assert while it holds the DFI bus.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhyMstrRequest {
    pub cs_state: u8,
    pub state_sel: u8,
}

/// `req_update`'s requested update type; carried through to the
/// calibration-apply hook.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UpdateType(pub u8);

/// The two capabilities the FSM varies at runtime (§4.6): computing new
/// IO-calibration codes, and committing them into the PHY's CSRs. Kept as
/// a trait rather than bare function pointers so a caller can carry
/// whatever context (register accessor, frequency table handle) the
/// computation needs.
pub trait IoCalibration {
    fn iocal_calibrate(&mut self, update_type: UpdateType);
    fn iocal_update_phy(&mut self, update_type: UpdateType);
    /// CTRLUPD's `Cal` state additionally runs a ZQCAL pass before the
    /// shared apply hook.
    fn zqcal(&mut self) {}
}

pub struct DfiUpdateFsm {
    state: DfiUpdateFsmState,
    protocol: Option<Protocol>,
    update_type: UpdateType,
    /// Forced low on construction (§4.6): a CTRLUPD request arriving
    /// before the rest of firmware is up must never be answered with a
    /// garbage ACK.
    ctrlupd_ack: bool,
    phyupd_req: bool,
    phymstr_req: bool,
    phymstr_active: bool,
    phymstr_request: PhyMstrRequest,
}

impl DfiUpdateFsm {
    pub fn new() -> Self {
        DfiUpdateFsm {
            state: DfiUpdateFsmState::Idle,
            protocol: None,
            update_type: UpdateType(0),
            ctrlupd_ack: false,
            phyupd_req: false,
            phymstr_req: false,
            phymstr_active: false,
            phymstr_request: PhyMstrRequest::default(),
        }
    }

    pub fn state(&self) -> DfiUpdateFsmState {
        self.state
    }

    pub fn phyupd_req_asserted(&self) -> bool {
        self.phyupd_req
    }

    pub fn ctrlupd_ack_asserted(&self) -> bool {
        self.ctrlupd_ack
    }

    pub fn phymstr_req_asserted(&self) -> bool {
        self.phymstr_req
    }

    pub fn phymstr_active(&self) -> bool {
        self.phymstr_active
    }

    /// §8 invariant 6: `phyupd_req` and `ctrlupd_ack` are never asserted
    /// at the same time -- a single shared FSM with one `Protocol` slot
    /// makes this true by construction, but we check it explicitly
    /// anywhere the two signals are read together.
    pub fn signals_mutually_exclusive(&self) -> bool {
        !(self.phyupd_req && self.ctrlupd_ack)
    }

    /// PHY-initiated update request. IDLE -> REQ: drives the REQ line
    /// high with `update_type`, then immediately enters PHYUPD_WAIT with
    /// the ACK interrupt enabled (the caller arms the IRQ; this only
    /// records the intent to wait for it).
    pub fn req_update(&mut self, update_type: UpdateType) -> Result<(), DfiUpdateError> {
        if self.state != DfiUpdateFsmState::Idle {
            return Err(DfiUpdateError::IllegalTransition);
        }
        self.protocol = Some(Protocol::PhyUpd);
        self.update_type = update_type;
        self.phyupd_req = true;
        self.state = DfiUpdateFsmState::PhyUpdWait;
        Ok(())
    }

    /// PHYUPD_ACK interrupt: runs the calibration-apply hook, then moves
    /// to UPDATE_EXIT which drops REQ and waits for the ACK line to
    /// deassert.
    pub fn on_phyupd_ack(
        &mut self,
        cal: &mut impl IoCalibration,
    ) -> Result<(), DfiUpdateError> {
        if self.state != DfiUpdateFsmState::PhyUpdWait || self.protocol != Some(Protocol::PhyUpd) {
            return Err(DfiUpdateError::IllegalTransition);
        }
        self.state = DfiUpdateFsmState::Update;
        cal.iocal_update_phy(self.update_type);
        self.phyupd_req = false;
        self.state = DfiUpdateFsmState::UpdateExit;
        Ok(())
    }

    /// PHYUPD_ACK deasserted: the protocol is done, back to IDLE.
    pub fn on_phyupd_ack_deasserted(&mut self) -> Option<DfiUpdateNotification> {
        if self.state != DfiUpdateFsmState::UpdateExit || self.protocol != Some(Protocol::PhyUpd) {
            return None;
        }
        self.protocol = None;
        self.state = DfiUpdateFsmState::Idle;
        Some(DfiUpdateNotification::Done)
    }

    /// CTRLUPD_REQ assertion interrupt: runs ZQCAL plus the shared apply
    /// hook, pulses ACK, and waits for the controller to drop REQ.
    pub fn on_ctrlupd_req(&mut self, cal: &mut impl IoCalibration) -> Result<(), DfiUpdateError> {
        if self.state != DfiUpdateFsmState::Idle {
            return Err(DfiUpdateError::IllegalTransition);
        }
        self.protocol = Some(Protocol::CtrlUpd);
        self.state = DfiUpdateFsmState::Cal;
        cal.zqcal();
        cal.iocal_calibrate(self.update_type);
        cal.iocal_update_phy(self.update_type);
        self.ctrlupd_ack = true;
        self.state = DfiUpdateFsmState::CtrlUpdWait;
        Ok(())
    }

    /// CTRLUPD_REQ deassertion interrupt: the controller has seen our
    /// ACK and dropped REQ; drop ACK and return to IDLE.
    pub fn on_ctrlupd_req_deasserted(&mut self) -> Option<DfiUpdateNotification> {
        if self.state != DfiUpdateFsmState::CtrlUpdWait || self.protocol != Some(Protocol::CtrlUpd)
        {
            return None;
        }
        self.ctrlupd_ack = false;
        self.protocol = None;
        self.state = DfiUpdateFsmState::Idle;
        Some(DfiUpdateNotification::Done)
    }

    /// PHY-initiated master request (§6 "PHYMSTR `req/type/cs_state/
    /// state_sel`"): IDLE -> PHYMSTR_PENDING, drives the request CSR with
    /// `req`, then waits for the controller's ACK.
    pub fn request_phymstr(&mut self, req: PhyMstrRequest) -> Result<(), DfiUpdateError> {
        if self.state != DfiUpdateFsmState::Idle {
            return Err(DfiUpdateError::IllegalTransition);
        }
        self.protocol = Some(Protocol::PhyMstr);
        self.phymstr_request = req;
        self.phymstr_req = true;
        self.state = DfiUpdateFsmState::PhyMstrPending;
        Ok(())
    }

    /// PHYMSTR_ACK interrupt: the controller granted the request; the PHY
    /// now owns the DFI bus until it calls `exit_phymstr`.
    pub fn on_phymstr_ack(&mut self) -> Result<(), DfiUpdateError> {
        if self.state != DfiUpdateFsmState::PhyMstrPending || self.protocol != Some(Protocol::PhyMstr)
        {
            return Err(DfiUpdateError::IllegalTransition);
        }
        self.phymstr_active = true;
        self.state = DfiUpdateFsmState::PhyMstrActive;
        Ok(())
    }

    /// Software-driven exit: the PHY is done mastering the bus and has put
    /// the DRAM back into the state the memory controller expects (caller's
    /// responsibility, per the hardware's own note that whoever ends
    /// mastering owns restoring DRAM state). Drops the request line and
    /// returns to IDLE.
    pub fn exit_phymstr(&mut self) -> Option<DfiUpdateNotification> {
        if self.state != DfiUpdateFsmState::PhyMstrActive || self.protocol != Some(Protocol::PhyMstr)
        {
            return None;
        }
        self.phymstr_req = false;
        self.phymstr_active = false;
        self.protocol = None;
        self.state = DfiUpdateFsmState::Idle;
        Some(DfiUpdateNotification::Done)
    }

    /// Forcible abort: an `INIT_START` preempts whichever update protocol
    /// is in flight (§4.8 cross-protocol rule, DFI 5.0 §4.21). Drops
    /// whichever signal was asserted and disables the ACK interrupt the
    /// caller had armed; always succeeds, including as a no-op from
    /// IDLE.
    pub fn abort(&mut self) {
        self.phyupd_req = false;
        self.ctrlupd_ack = false;
        self.phymstr_req = false;
        self.phymstr_active = false;
        self.protocol = None;
        self.state = DfiUpdateFsmState::Idle;
    }

    /// True while a freq-switch event would have to be queued behind this
    /// FSM: the coordinator's routing table only blocks freq-switch
    /// events on CTRLUPD specifically (§4.8), not on an in-flight PHYUPD.
    pub fn blocks_freq_switch(&self) -> bool {
        matches!(
            self.state,
            DfiUpdateFsmState::Cal | DfiUpdateFsmState::CtrlUpdWait
        )
    }
}

impl Default for DfiUpdateFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Spy {
        calibrate_calls: u32,
        update_calls: u32,
        zqcal_calls: u32,
    }

    impl IoCalibration for Spy {
        fn iocal_calibrate(&mut self, _update_type: UpdateType) {
            self.calibrate_calls += 1;
        }
        fn iocal_update_phy(&mut self, _update_type: UpdateType) {
            self.update_calls += 1;
        }
        fn zqcal(&mut self) {
            self.zqcal_calls += 1;
        }
    }

    #[test]
    fn starts_with_ctrlupd_ack_forced_low() {
        let fsm = DfiUpdateFsm::new();
        assert!(!fsm.ctrlupd_ack_asserted());
    }

    #[test]
    fn scenario_phyupd_happy_path() {
        let mut fsm = DfiUpdateFsm::new();
        let mut spy = Spy::default();
        fsm.req_update(UpdateType(0)).unwrap();
        assert_eq!(fsm.state(), DfiUpdateFsmState::PhyUpdWait);
        fsm.on_phyupd_ack(&mut spy).unwrap();
        assert_eq!(spy.update_calls, 1);
        assert!(!fsm.phyupd_req_asserted());
        assert_eq!(fsm.state(), DfiUpdateFsmState::UpdateExit);
        assert_eq!(
            fsm.on_phyupd_ack_deasserted(),
            Some(DfiUpdateNotification::Done)
        );
        assert_eq!(fsm.state(), DfiUpdateFsmState::Idle);
    }

    #[test]
    fn scenario_ctrlupd_runs_zqcal_before_apply() {
        let mut fsm = DfiUpdateFsm::new();
        let mut spy = Spy::default();
        fsm.on_ctrlupd_req(&mut spy).unwrap();
        assert_eq!(spy.zqcal_calls, 1);
        assert_eq!(spy.calibrate_calls, 1);
        assert_eq!(spy.update_calls, 1);
        assert!(fsm.ctrlupd_ack_asserted());
        assert_eq!(fsm.state(), DfiUpdateFsmState::CtrlUpdWait);
        assert_eq!(
            fsm.on_ctrlupd_req_deasserted(),
            Some(DfiUpdateNotification::Done)
        );
        assert!(!fsm.ctrlupd_ack_asserted());
    }

    #[test]
    fn scenario_init_start_aborts_phyupd() {
        let mut fsm = DfiUpdateFsm::new();
        let mut spy = Spy::default();
        fsm.req_update(UpdateType(0)).unwrap();
        fsm.abort();
        assert_eq!(fsm.state(), DfiUpdateFsmState::Idle);
        assert!(!fsm.phyupd_req_asserted());
        // A fresh request is legal again immediately.
        fsm.req_update(UpdateType(1)).unwrap();
        fsm.on_phyupd_ack(&mut spy).unwrap();
    }

    #[test]
    fn phyupd_and_ctrlupd_ack_never_overlap() {
        let mut fsm = DfiUpdateFsm::new();
        let mut spy = Spy::default();
        fsm.req_update(UpdateType(0)).unwrap();
        assert!(fsm.signals_mutually_exclusive());
        fsm.abort();
        fsm.on_ctrlupd_req(&mut spy).unwrap();
        assert!(fsm.signals_mutually_exclusive());
    }

    #[test]
    fn second_request_rejected_while_in_flight() {
        let mut fsm = DfiUpdateFsm::new();
        fsm.req_update(UpdateType(0)).unwrap();
        assert_eq!(
            fsm.req_update(UpdateType(1)),
            Err(DfiUpdateError::IllegalTransition)
        );
    }

    #[test]
    fn blocks_freq_switch_only_during_ctrlupd() {
        let mut fsm = DfiUpdateFsm::new();
        let mut spy = Spy::default();
        assert!(!fsm.blocks_freq_switch());
        fsm.req_update(UpdateType(0)).unwrap();
        assert!(!fsm.blocks_freq_switch());
        fsm.on_phyupd_ack(&mut spy).unwrap();
        fsm.on_phyupd_ack_deasserted();
        fsm.on_ctrlupd_req(&mut spy).unwrap();
        assert!(fsm.blocks_freq_switch());
    }

    #[test]
    fn scenario_phymstr_happy_path() {
        let mut fsm = DfiUpdateFsm::new();
        let req = PhyMstrRequest { cs_state: 1, state_sel: 0 };
        fsm.request_phymstr(req).unwrap();
        assert_eq!(fsm.state(), DfiUpdateFsmState::PhyMstrPending);
        assert!(fsm.phymstr_req_asserted());
        fsm.on_phymstr_ack().unwrap();
        assert_eq!(fsm.state(), DfiUpdateFsmState::PhyMstrActive);
        assert!(fsm.phymstr_active());
        assert_eq!(fsm.exit_phymstr(), Some(DfiUpdateNotification::Done));
        assert_eq!(fsm.state(), DfiUpdateFsmState::Idle);
        assert!(!fsm.phymstr_req_asserted());
        assert!(!fsm.phymstr_active());
    }

    #[test]
    fn phymstr_pending_does_not_block_freq_switch() {
        let mut fsm = DfiUpdateFsm::new();
        fsm.request_phymstr(PhyMstrRequest::default()).unwrap();
        assert!(!fsm.blocks_freq_switch());
        fsm.on_phymstr_ack().unwrap();
        assert!(!fsm.blocks_freq_switch());
    }

    #[test]
    fn init_start_aborts_pending_phymstr() {
        let mut fsm = DfiUpdateFsm::new();
        fsm.request_phymstr(PhyMstrRequest::default()).unwrap();
        fsm.abort();
        assert_eq!(fsm.state(), DfiUpdateFsmState::Idle);
        assert!(!fsm.phymstr_req_asserted());
        // A fresh PHYMSTR request is legal again immediately.
        fsm.request_phymstr(PhyMstrRequest::default()).unwrap();
    }
}
