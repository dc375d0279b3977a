// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C5: frequency-switch FSM. Drives the PHY through a
//! prep/switch/post-switch protocol, synchronising with DFI init and PLL
//! lock (§4.5).

use crate::regs::Msr;
use crate::table::{PhyFrequencyId, PllVcoId};

/// The 1 ms watchdog armed on entry to `WaitForSwitch`; any state other
/// than Idle/PostSwitch that outlives it transitions to Fail (§5).
pub const WATCHDOG_TICKS: u64 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhyFsmState {
    Idle,
    Prep,
    WaitForSwitch,
    Switch,
    WaitForLock,
    PostSwitch,
    Fail,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FsmError {
    IllegalTransition,
    InvalidVco,
    WatchdogExpired,
    AlreadyInHwOnlyMode,
}

/// Notification emitted on the completion bus (C9) as a side effect of a
/// transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FswNotification {
    PrepDone,
    Done,
    Failed,
}

pub struct PhySwitchFsm {
    state: PhyFsmState,
    current_msr: Msr,
    prep_msr: Option<Msr>,
    current_vco: PllVcoId,
    hw_only: bool,
    watchdog_deadline: Option<u64>,
}

impl PhySwitchFsm {
    pub fn new(boot_vco: PllVcoId) -> Self {
        PhySwitchFsm {
            state: PhyFsmState::Idle,
            current_msr: Msr::Bank0,
            prep_msr: None,
            current_vco: boot_vco,
            hw_only: false,
            watchdog_deadline: None,
        }
    }

    pub fn state(&self) -> PhyFsmState {
        self.state
    }

    pub fn current_msr(&self) -> Msr {
        self.current_msr
    }

    pub fn current_vco(&self) -> PllVcoId {
        self.current_vco
    }

    /// The deadline armed on entry to `WaitForSwitch`, if any. The
    /// coordinator reads this right after a successful `prep`/
    /// `on_pll_prep_done` to program the real OS timer backing the
    /// notification `check_watchdog` is polled from; `fsw` itself only
    /// tracks the deadline value, not the underlying timer.
    pub fn watchdog_deadline(&self) -> Option<u64> {
        self.watchdog_deadline
    }

    fn arm_watchdog(&mut self, now: u64) {
        self.watchdog_deadline = Some(now + WATCHDOG_TICKS);
    }

    fn cancel_watchdog(&mut self) {
        self.watchdog_deadline = None;
    }

    /// Checked on every tick the coordinator processes while not Idle or
    /// PostSwitch; an exactly-1-tick-overdue watchdog causes `Fail`
    /// (§8 boundary behavior).
    pub fn check_watchdog(&mut self, now: u64) -> Option<FswNotification> {
        if let Some(deadline) = self.watchdog_deadline {
            if now > deadline {
                self.state = PhyFsmState::Fail;
                self.cancel_watchdog();
                return Some(FswNotification::Failed);
            }
        }
        None
    }

    /// External entry point. Allowed from {Idle, WaitForSwitch}. Writes
    /// the next-MSR override, disables MSR toggle if `msr == current_msr`,
    /// invokes the PLL `prep` driver (modeled here as already having
    /// succeeded by the time this returns -- the caller runs
    /// `pll.prep(...)` and passes the resulting PREP_DONE through
    /// `on_pll_prep_done`), and arms the watchdog on entry to
    /// WaitForSwitch.
    pub fn prep(&mut self, msr: Msr) -> Result<(), FsmError> {
        match self.state {
            PhyFsmState::Idle | PhyFsmState::WaitForSwitch => {
                self.prep_msr = Some(msr);
                self.state = PhyFsmState::Prep;
                Ok(())
            }
            _ => Err(FsmError::IllegalTransition),
        }
    }

    /// Internal entry point: fired as a direct consequence of the PLL FSM
    /// reaching PREP_DONE. Sets the hardware prep-done bit (caller's
    /// responsibility via the register accessor) and transitions to
    /// WaitForSwitch, emitting FSW_PREP_DONE.
    pub fn on_pll_prep_done(&mut self, now: u64) -> Option<FswNotification> {
        if self.state != PhyFsmState::Prep {
            return None;
        }
        self.state = PhyFsmState::WaitForSwitch;
        self.arm_watchdog(now);
        Some(FswNotification::PrepDone)
    }

    /// Interrupt entry point: `dfi_init_start` asserted (HW-driven
    /// switch). Must not block; the caller is responsible for waiting for
    /// deassertion and enabling `init_complete` before calling
    /// `on_init_complete`.
    pub fn on_init_start(&mut self) -> Result<(), FsmError> {
        if self.state != PhyFsmState::WaitForSwitch {
            return Err(FsmError::IllegalTransition);
        }
        self.state = PhyFsmState::Switch;
        Ok(())
    }

    /// Interrupt entry point: `dfi_init_complete` asserted after
    /// `init_start` deasserted.
    pub fn on_init_complete(&mut self) -> Result<(), FsmError> {
        if self.state != PhyFsmState::Switch {
            return Err(FsmError::IllegalTransition);
        }
        self.state = PhyFsmState::WaitForLock;
        Ok(())
    }

    /// External entry point: software-driven switch trigger. Only legal
    /// while not yet latched into hardware-only mode.
    pub fn sw_switch(&mut self, vco: PllVcoId) -> Result<(), FsmError> {
        if self.hw_only {
            return Err(FsmError::IllegalTransition);
        }
        if self.state != PhyFsmState::WaitForSwitch {
            return Err(FsmError::IllegalTransition);
        }
        if let Some(msr) = self.prep_msr {
            if msr != self.current_msr {
                self.current_msr = msr;
            }
        }
        self.current_vco = vco;
        self.state = PhyFsmState::WaitForLock;
        Ok(())
    }

    /// Internal entry point: PLL reported LOCKED while we were waiting for
    /// it. Cancels the watchdog and transitions to PostSwitch, which
    /// immediately completes (writes the hardware post-work-done pulse)
    /// and returns to Idle, emitting FSW_DONE. Flips `current_msr` iff the
    /// prep targeted a different bank than the one that was current
    /// (§8 invariant 2).
    pub fn on_pll_locked(&mut self) -> Option<FswNotification> {
        if self.state != PhyFsmState::WaitForLock {
            return None;
        }
        self.cancel_watchdog();
        self.state = PhyFsmState::PostSwitch;
        if let Some(msr) = self.prep_msr.take() {
            self.current_msr = msr;
        }
        self.state = PhyFsmState::Idle;
        Some(FswNotification::Done)
    }

    /// Any loss-of-lock outside the switch window, or an invalid VCO
    /// selection, transitions to Fail.
    pub fn on_pll_loss_of_lock(&mut self) -> Option<FswNotification> {
        if matches!(self.state, PhyFsmState::Idle | PhyFsmState::PostSwitch) {
            return None;
        }
        self.cancel_watchdog();
        self.state = PhyFsmState::Fail;
        Some(FswNotification::Failed)
    }

    /// Re-preps from Fail; the only way out of the terminal (recoverable)
    /// state.
    pub fn recover_from_fail(&mut self) -> Result<(), FsmError> {
        if self.state != PhyFsmState::Fail {
            return Err(FsmError::IllegalTransition);
        }
        self.state = PhyFsmState::Idle;
        Ok(())
    }

    /// One-shot: verifies the PHY is on VCO1/MSR0, disables the VCO/MSR
    /// overrides, releases `init_complete`, waits for `init_start` to
    /// deassert (caller's responsibility), and latches the FSM into
    /// hardware-only mode so subsequent `sw_switch` calls are rejected.
    pub fn hw_switch_mode(&mut self) -> Result<(), FsmError> {
        if self.hw_only {
            return Err(FsmError::AlreadyInHwOnlyMode);
        }
        if self.current_vco != PllVcoId::Vco1 || self.current_msr != Msr::Bank0 {
            return Err(FsmError::InvalidVco);
        }
        self.hw_only = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn happy_path(msr: Msr) -> PhySwitchFsm {
        let mut fsm = PhySwitchFsm::new(PllVcoId::Vco1);
        fsm.prep(msr).unwrap();
        assert_eq!(fsm.on_pll_prep_done(0), Some(FswNotification::PrepDone));
        assert_eq!(fsm.state(), PhyFsmState::WaitForSwitch);
        fsm.on_init_start().unwrap();
        fsm.on_init_complete().unwrap();
        assert_eq!(fsm.state(), PhyFsmState::WaitForLock);
        fsm
    }

    #[test]
    fn scenario_boot_then_first_prep() {
        let mut fsm = happy_path(Msr::Bank1);
        assert_eq!(fsm.on_pll_locked(), Some(FswNotification::Done));
        assert_eq!(fsm.state(), PhyFsmState::Idle);
        assert_eq!(fsm.current_msr(), Msr::Bank1);
    }

    #[test]
    fn msr_unchanged_when_prep_targets_current_bank() {
        let mut fsm = happy_path(Msr::Bank0);
        fsm.on_pll_locked();
        assert_eq!(fsm.current_msr(), Msr::Bank0);
    }

    #[test]
    fn prep_permitted_exactly_once_after_prep_done() {
        let mut fsm = PhySwitchFsm::new(PllVcoId::Vco1);
        fsm.prep(Msr::Bank1).unwrap();
        fsm.on_pll_prep_done(0);
        fsm.on_init_start().unwrap();
        fsm.on_init_complete().unwrap();
        // A second prep is illegal until this switch resolves.
        assert_eq!(fsm.prep(Msr::Bank0), Err(FsmError::IllegalTransition));
    }

    #[test]
    fn watchdog_exactly_one_tick_over_fails() {
        let mut fsm = PhySwitchFsm::new(PllVcoId::Vco1);
        fsm.prep(Msr::Bank1).unwrap();
        fsm.on_pll_prep_done(0);
        assert_eq!(fsm.check_watchdog(WATCHDOG_TICKS), None);
        assert_eq!(
            fsm.check_watchdog(WATCHDOG_TICKS + 1),
            Some(FswNotification::Failed)
        );
        assert_eq!(fsm.state(), PhyFsmState::Fail);
    }

    #[test]
    fn loss_of_lock_mid_switch_fails() {
        let mut fsm = happy_path(Msr::Bank1);
        assert_eq!(fsm.on_pll_loss_of_lock(), Some(FswNotification::Failed));
        assert_eq!(fsm.state(), PhyFsmState::Fail);
        fsm.recover_from_fail().unwrap();
        assert_eq!(fsm.state(), PhyFsmState::Idle);
    }

    #[test]
    fn hw_switch_mode_rejects_sw_switch_afterward() {
        let mut fsm = PhySwitchFsm::new(PllVcoId::Vco1);
        fsm.hw_switch_mode().unwrap();
        fsm.prep(Msr::Bank1).unwrap();
        fsm.on_pll_prep_done(0);
        assert_eq!(fsm.sw_switch(PllVcoId::Vco0), Err(FsmError::IllegalTransition));
    }
}
