// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared sweep framework every training routine builds its 2-D scan on
//! top of (§4.7): drive the DUT overlay, switch to boot/target frequency,
//! issue the mode-register writes that enter/exit training mode, and gate
//! the whole thing on a post-training baseline loopback.

use crate::bitmap::{BitArray, Range};
use crate::table::PhyFrequencyId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrainingError {
    /// No all-passing rectangle survived the sweep.
    NoPassingRegion,
    /// The post-training baseline write/read loopback did not match.
    BaselineMismatch,
    /// A frequency switch required by the training contract failed.
    FrequencySwitchFailed,
}

/// HiZ's DQ/DQS or puts a byte into loopback during the sweep switch
/// (§4.7); `None` is the ordinary operating overlay.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Overlay {
    None,
    Cbt,
    Bscan,
}

/// The capabilities every training routine needs from its environment,
/// injected so the sweep logic itself stays hardware-agnostic and
/// host-testable (§9 "callback registration with context pointers").
pub trait TrainingIo {
    /// Switches the PHY to `freq_id`, applying `overlay` for the duration
    /// of the switch (CBT/BSCAN HiZ DQ/DQS or loop a byte back).
    fn switch_frequency(
        &mut self,
        freq_id: PhyFrequencyId,
        overlay: Overlay,
    ) -> Result<(), TrainingError>;

    /// Issues the DFI-MRW packets needed to enter or exit a training
    /// mode.
    fn write_mode_register(&mut self, mr: u8, value: u8);

    /// Baseline write-then-read-FIFO burst; the post-training gate every
    /// routine returns through (§8 invariant 5).
    fn baseline_write_read(&mut self, freq_id: PhyFrequencyId) -> Result<(), TrainingError>;
}

/// Runs a `row_range x col_range` 2-D pass/fail sweep by calling `probe`
/// once per coordinate. `probe` returns `true` on pass.
pub fn run_sweep(
    row_range: Range,
    col_range: Range,
    mut probe: impl FnMut(i32, i32) -> bool,
) -> BitArray {
    let rows = row_range.len();
    let cols = col_range.len();
    let mut bits = BitArray::new(rows, cols);
    for r in 0..rows {
        let row_code = row_range.code_at(r);
        for c in 0..cols {
            let col_code = col_range.code_at(c);
            bits.set(r, c, probe(row_code, col_code));
        }
    }
    bits
}

/// Common bookkeeping every training's steps (1), (2), (3), (5), (6), (7)
/// share: boot-frequency entry/exit bracketing a caller-supplied sweep
/// closure, ending in the baseline gate at `target_freq`.
pub fn with_training_mode<Io: TrainingIo, T>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    overlay: Overlay,
    enter_mrs: &[(u8, u8)],
    exit_mrs: &[(u8, u8)],
    sweep: impl FnOnce(&mut Io) -> T,
) -> Result<T, TrainingError> {
    io.switch_frequency(boot_freq, Overlay::None)?;
    for &(mr, value) in enter_mrs {
        io.write_mode_register(mr, value);
    }
    io.switch_frequency(target_freq, overlay)?;
    let result = sweep(io);
    io.switch_frequency(boot_freq, Overlay::None)?;
    for &(mr, value) in exit_mrs {
        io.write_mode_register(mr, value);
    }
    io.switch_frequency(target_freq, Overlay::None)?;
    io.baseline_write_read(target_freq)?;
    Ok(result)
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    #[derive(Default)]
    pub struct FakeIo {
        pub switches: heapless::Vec<(PhyFrequencyId, Overlay), 16>,
        pub mrs: heapless::Vec<(u8, u8), 16>,
        pub baseline_calls: u32,
        pub fail_baseline: bool,
        pub fail_switch_to: Option<PhyFrequencyId>,
    }

    impl TrainingIo for FakeIo {
        fn switch_frequency(
            &mut self,
            freq_id: PhyFrequencyId,
            overlay: Overlay,
        ) -> Result<(), TrainingError> {
            if self.fail_switch_to == Some(freq_id) {
                return Err(TrainingError::FrequencySwitchFailed);
            }
            let _ = self.switches.push((freq_id, overlay));
            Ok(())
        }

        fn write_mode_register(&mut self, mr: u8, value: u8) {
            let _ = self.mrs.push((mr, value));
        }

        fn baseline_write_read(&mut self, _freq_id: PhyFrequencyId) -> Result<(), TrainingError> {
            self.baseline_calls += 1;
            if self.fail_baseline {
                Err(TrainingError::BaselineMismatch)
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::fakes::FakeIo;
    use super::*;

    #[test]
    fn sweep_dimensions_match_ranges() {
        let rows = Range { start: 0, stop: 4, step: 2 };
        let cols = Range { start: 0, stop: 6, step: 2 };
        let bits = run_sweep(rows, cols, |_, _| true);
        assert_eq!(bits.rows(), rows.len());
        assert_eq!(bits.cols(), cols.len());
    }

    #[test]
    fn training_mode_brackets_boot_and_target() {
        let mut io = FakeIo::default();
        with_training_mode(
            &mut io,
            0,
            3,
            Overlay::Cbt,
            &[(12, 1)],
            &[(12, 0)],
            |_io| (),
        )
        .unwrap();
        assert_eq!(
            &io.switches[..],
            &[(0, Overlay::None), (3, Overlay::Cbt), (0, Overlay::None), (3, Overlay::None)]
        );
        assert_eq!(&io.mrs[..], &[(12, 1), (12, 0)]);
        assert_eq!(io.baseline_calls, 1);
    }

    #[test]
    fn baseline_mismatch_propagates() {
        let mut io = FakeIo { fail_baseline: true, ..Default::default() };
        let result =
            with_training_mode(&mut io, 0, 3, Overlay::None, &[], &[], |_io| ());
        assert_eq!(result, Err(TrainingError::BaselineMismatch));
    }
}
