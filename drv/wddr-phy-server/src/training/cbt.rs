// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-Bus Training (§4.7): sweeps CA-VREF x CA-PI code, reading the CA
//! word the DRAM captured back over a BSCAN loopback on DQ byte 1.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::{DramState, PhyFrequencyId};
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

/// The codes this training commits: `ca_pi_code` into both the DDR and QDR
/// CA phase-interpolator slots, `mr12` into the DRAM CA-VREF mirror.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CbtResult {
    pub ca_pi_code: u8,
    pub mr12: u8,
}

/// Runs the sweep and returns the codes to commit; does not touch the
/// frequency table itself, so the caller decides how (and whether) to
/// apply the result.
///
/// `probe(vref_code, pi_code)` drives `vref_code` onto DQ0..6 via TX-driver
/// override, issues the CBT address word at `pi_code`, and reports whether
/// the BSCAN readback on DQ byte 1 matched what was sent.
pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    vref_range: Range,
    pi_range: Range,
    probe: impl FnMut(i32, i32) -> bool,
) -> Result<CbtResult, TrainingError> {
    let bits = with_training_mode(
        io,
        boot_freq,
        target_freq,
        Overlay::Cbt,
        &[(13, DramState::MR13_CBT_BIT)],
        &[(13, 0)],
        |_io| run_sweep(vref_range, pi_range, probe),
    )?;

    let rect = max_rect(&bits);
    if rect.area() == 0 {
        return Err(TrainingError::NoPassingRegion);
    }
    let (vref_mid, pi_mid) = find_midpoint_and_convert(&rect, &vref_range, &pi_range);
    Ok(CbtResult { ca_pi_code: pi_mid as u8, mr12: vref_mid as u8 })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn scenario_commits_midpoint_codes() {
        let vref_range = Range { start: 0x20, stop: 0x30, step: 2 };
        let pi_range = Range { start: 0x20, stop: 0x40, step: 2 };
        let mut io = FakeIo::default();
        let result = run(&mut io, 0, 3, vref_range, pi_range, |vref, pi| {
            (0x30..=0x38).contains(&pi) && (0x28..=0x2C).contains(&vref)
        })
        .unwrap();
        assert_eq!(result.mr12, 0x2A);
        assert_eq!(result.ca_pi_code, 0x34);
        assert_eq!(io.baseline_calls, 1);
    }

    #[test]
    fn empty_passing_region_is_an_error() {
        let vref_range = Range { start: 0x20, stop: 0x24, step: 2 };
        let pi_range = Range { start: 0x20, stop: 0x24, step: 2 };
        let mut io = FakeIo::default();
        let result = run(&mut io, 0, 3, vref_range, pi_range, |_, _| false);
        assert_eq!(result, Err(TrainingError::NoPassingRegion));
    }
}
