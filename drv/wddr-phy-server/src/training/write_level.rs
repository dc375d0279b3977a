// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Write-Leveling (§4.7): with `MR2[WRLVL]` asserted, sweeps the DQS
//! phase-interpolator code against the rising CK edge the DRAM reports
//! seeing.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::{DramState, PhyFrequencyId};
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

/// A single axis, swept at row 0; `find_midpoint_and_convert` still gives
/// the physical code since a width-one row range always mids to row 0.
const SINGLE_ROW: Range = Range { start: 0, stop: 0, step: 1 };

pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    dqs_pi_range: Range,
    mut sample: impl FnMut(i32) -> bool,
) -> Result<u8, TrainingError> {
    let bits = with_training_mode(
        io,
        boot_freq,
        target_freq,
        Overlay::None,
        &[(2, DramState::MR2_WRLVL_BIT)],
        &[(2, 0)],
        |_io| run_sweep(SINGLE_ROW, dqs_pi_range, |_row, pi| sample(pi)),
    )?;

    let rect = max_rect(&bits);
    if rect.area() == 0 {
        return Err(TrainingError::NoPassingRegion);
    }
    let (_row, pi_mid) = find_midpoint_and_convert(&rect, &SINGLE_ROW, &dqs_pi_range);
    Ok(pi_mid as u8)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn finds_center_of_passing_window() {
        let pi_range = Range { start: 0, stop: 0x20, step: 1 };
        let mut io = FakeIo::default();
        let code = run(&mut io, 0, 2, pi_range, |pi| (0x10..=0x14).contains(&pi)).unwrap();
        assert_eq!(code, 0x12);
        assert_eq!(io.mrs[0], (2, DramState::MR2_WRLVL_BIT));
        assert_eq!(io.mrs[1], (2, 0));
    }

    #[test]
    fn no_passing_window_is_an_error() {
        let pi_range = Range { start: 0, stop: 4, step: 1 };
        let mut io = FakeIo::default();
        let result = run(&mut io, 0, 2, pi_range, |_| false);
        assert_eq!(result, Err(TrainingError::NoPassingRegion));
    }
}
