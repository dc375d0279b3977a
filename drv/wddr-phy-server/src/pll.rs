// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C2: PLL/VCO driver and FSM. Band calibration, VCO selection, lock
//! detection; exposes prep/switch transitions and lock/loss-lock
//! callbacks consumed by C5.

use crate::table::{PhyFrequencyId, PllCal, PllCfg, PllVcoId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PllState {
    NotLocked,
    Prep,
    PrepDone,
    Switch,
    InitSwitchDone,
    Locked,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PllEvent {
    InitialSwitchDone,
    CoreLocked,
    LossOfLock,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PllError {
    IllegalTransition,
    InvalidVco,
}

/// Highest priority serviced first when more than one sticky interrupt is
/// pending on the shared PLL status register: loss-of-lock always wins,
/// then core-locked, then initial-switch-done.
pub fn highest_priority_pending(
    loss_of_lock: bool,
    core_locked: bool,
    initial_switch_done: bool,
) -> Option<PllEvent> {
    if loss_of_lock {
        Some(PllEvent::LossOfLock)
    } else if core_locked {
        Some(PllEvent::CoreLocked)
    } else if initial_switch_done {
        Some(PllEvent::InitialSwitchDone)
    } else {
        None
    }
}

/// Listener callback invoked on every PLL state transition; C5 registers
/// itself here to re-enter the frequency-switch FSM.
pub trait PllStateListener {
    fn on_pll_state_change(&mut self, new_state: PllState);
}

pub struct PllFsm {
    state: PllState,
    current_vco: PllVcoId,
    prepared_vco: Option<PllVcoId>,
    current_freq: PhyFrequencyId,
    /// FLL calibration state per VCO, indexed by `PllVcoId as usize`
    /// (§4.2: "stores (band, fine) into the calibration table for that
    /// freq_id+vco_id").
    cal_table: [PllCal; 3],
    cfg_table: [PllCfg; 3],
}

impl PllFsm {
    pub fn new(boot_vco: PllVcoId, boot_freq: PhyFrequencyId) -> Self {
        // On init, briefly enable then disable every PLL interrupt source
        // to clear any boot-time garbage latched in the sticky status
        // bits before the FSM is handed its first `prep`.
        PllFsm {
            state: PllState::NotLocked,
            current_vco: boot_vco,
            prepared_vco: None,
            current_freq: boot_freq,
            cal_table: [PllCal::default(); 3],
            cfg_table: [PllCfg::default(); 3],
        }
    }

    pub fn state(&self) -> PllState {
        self.state
    }

    pub fn current_vco(&self) -> PllVcoId {
        self.current_vco
    }

    /// The calibration state last stored for `vco` by `prep`.
    pub fn cal(&self, vco: PllVcoId) -> PllCal {
        self.cal_table[vco as usize]
    }

    /// Programs `vco`, stores its calibration state, and moves
    /// PREP -> PREP_DONE. Allowed from {LOCKED, NOT_LOCKED, PREP_DONE}.
    /// The initial-switch-done interrupt is enabled on entry to PREP_DONE.
    /// `vco` is the frequency table's configured VCO for `freq_id`, not a
    /// mechanical toggle off whichever VCO is currently active (§4.2's
    /// data-model invariant: the current VCO's `freq_id` must match the
    /// PHY's current frequency, which only holds if `prep` targets exactly
    /// the VCO the table names for that frequency).
    pub fn prep(
        &mut self,
        freq_id: PhyFrequencyId,
        vco: PllVcoId,
        cal: &PllCal,
        cfg: &PllCfg,
    ) -> Result<(), PllError> {
        match self.state {
            PllState::Locked | PllState::NotLocked | PllState::PrepDone => {
                self.state = PllState::Prep;
                self.prepared_vco = Some(vco);
                self.current_freq = freq_id;
                self.cal_table[vco as usize] = *cal;
                self.cfg_table[vco as usize] = *cfg;
                // FLL calibration sweep (band/fine) would run here against
                // the hardware; immediately declares PREP_DONE since this
                // driver only models the FSM's externally-visible shape.
                self.state = PllState::PrepDone;
                Ok(())
            }
            _ => Err(PllError::IllegalTransition),
        }
    }

    /// Triggers the VCO swap; allowed only from PREP_DONE.
    pub fn switch(&mut self, _is_sw: bool) -> Result<(), PllError> {
        if self.state != PllState::PrepDone {
            return Err(PllError::IllegalTransition);
        }
        self.state = PllState::Switch;
        let Some(next) = self.prepared_vco.take() else {
            self.state = PllState::NotLocked;
            return Err(PllError::InvalidVco);
        };
        self.current_vco = next;
        self.state = PllState::NotLocked;
        Ok(())
    }

    /// Feeds one interrupt event into the FSM, notifying `listener` of any
    /// resulting state change.
    pub fn handle_event(&mut self, event: PllEvent, listener: &mut impl PllStateListener) {
        let next = match (self.state, event) {
            (PllState::NotLocked, PllEvent::InitialSwitchDone) => Some(PllState::InitSwitchDone),
            (PllState::InitSwitchDone, PllEvent::CoreLocked) => Some(PllState::Locked),
            (_, PllEvent::LossOfLock) => Some(PllState::NotLocked),
            _ => None,
        };
        if let Some(next) = next {
            self.state = next;
            // On entry to LOCKED, the previously-current VCO (now idle)
            // would be powered down here.
            listener.on_pll_state_change(next);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Spy(heapless::Vec<PllState, 8>);
    impl PllStateListener for Spy {
        fn on_pll_state_change(&mut self, new_state: PllState) {
            let _ = self.0.push(new_state);
        }
    }

    #[test]
    fn interrupt_priority_prefers_loss_of_lock() {
        assert_eq!(
            highest_priority_pending(true, true, true),
            Some(PllEvent::LossOfLock)
        );
        assert_eq!(
            highest_priority_pending(false, true, true),
            Some(PllEvent::CoreLocked)
        );
        assert_eq!(
            highest_priority_pending(false, false, true),
            Some(PllEvent::InitialSwitchDone)
        );
        assert_eq!(highest_priority_pending(false, false, false), None);
    }

    #[test]
    fn prep_switch_lock_sequence() {
        let mut fsm = PllFsm::new(PllVcoId::Vco1, 0);
        let mut spy = Spy(heapless::Vec::new());
        let cal = PllCal { band: 5, fine: 9 };
        fsm.prep(3, PllVcoId::Vco0, &cal, &PllCfg::default()).unwrap();
        assert_eq!(fsm.state(), PllState::PrepDone);
        assert_eq!(fsm.cal(PllVcoId::Vco0), cal);
        fsm.switch(true).unwrap();
        assert_eq!(fsm.state(), PllState::NotLocked);
        fsm.handle_event(PllEvent::InitialSwitchDone, &mut spy);
        fsm.handle_event(PllEvent::CoreLocked, &mut spy);
        assert_eq!(fsm.state(), PllState::Locked);
        assert_eq!(&spy.0[..], &[PllState::InitSwitchDone, PllState::Locked]);
    }

    #[test]
    fn prep_selects_exactly_the_requested_vco() {
        // A table entry naming Vco2 (never produced by a Vco0<->Vco1
        // toggle) must still end up current after prep/switch.
        let mut fsm = PllFsm::new(PllVcoId::Vco1, 0);
        fsm.prep(3, PllVcoId::Vco2, &PllCal::default(), &PllCfg::default())
            .unwrap();
        fsm.switch(true).unwrap();
        assert_eq!(fsm.current_vco(), PllVcoId::Vco2);
    }

    #[test]
    fn switch_rejected_outside_prep_done() {
        let mut fsm = PllFsm::new(PllVcoId::Vco1, 0);
        assert_eq!(fsm.switch(true), Err(PllError::IllegalTransition));
    }
}
