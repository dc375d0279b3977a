// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-enable (REN) training (§4.7): a coarse sampler walk finds a REN PI
//! code that samples cleanly at all, then a REN-cycle x REN-PI sweep finds
//! the cycle offset and fine code that center the eye. The cycle offset is
//! converted into SDR-pipeline codes for the IE/RE/REN gearbox stages.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::{FreqRatio, PhyFrequencyId, SdrPipeline};
use crate::training::delay::convert_dram_delay_to_sdr_delay;
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RenResult {
    pub ren_pi_code: u8,
    pub ie_pipeline: SdrPipeline,
    pub re_pipeline: SdrPipeline,
    pub ren_pipeline: SdrPipeline,
}

/// Coarse walk: the first PI code (in sweep order) that `sample` reports
/// as a clean capture. Not a sweep over a rectangle -- REN's sampler walk
/// only needs one working point to seed the fine sweep.
fn align_ren_pi(range: Range, mut sample: impl FnMut(i32) -> bool) -> Option<i32> {
    (0..range.len()).map(|i| range.code_at(i)).find(|&code| sample(code))
}

/// `sample(pi_code)` is the coarse REN_PI_PHASE walk; `probe(cycle_offset,
/// pi_code)` is the fine REN-cycle x REN-PI sweep once a seed point has
/// been found.
pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    ratio: FreqRatio,
    pi_range: Range,
    cycle_range: Range,
    sample: impl FnMut(i32) -> bool,
    probe: impl FnMut(i32, i32) -> bool,
) -> Result<RenResult, TrainingError> {
    if align_ren_pi(pi_range, sample).is_none() {
        return Err(TrainingError::NoPassingRegion);
    }

    let bits = with_training_mode(io, boot_freq, target_freq, Overlay::None, &[], &[], |_io| {
        run_sweep(cycle_range, pi_range, probe)
    })?;

    let rect = max_rect(&bits);
    if rect.area() == 0 {
        return Err(TrainingError::NoPassingRegion);
    }
    let (cycle_mid, pi_mid) = find_midpoint_and_convert(&rect, &cycle_range, &pi_range);
    let pipeline = convert_dram_delay_to_sdr_delay(cycle_mid, ratio);
    Ok(RenResult {
        ren_pi_code: pi_mid as u8,
        ie_pipeline: pipeline,
        re_pipeline: pipeline,
        ren_pipeline: pipeline,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn coarse_walk_failure_aborts_before_the_fine_sweep() {
        let pi_range = Range { start: 0, stop: 4, step: 1 };
        let cycle_range = Range { start: 0, stop: 4, step: 1 };
        let mut io = FakeIo::default();
        let result = run(
            &mut io,
            0,
            1,
            FreqRatio::OneToTwo,
            pi_range,
            cycle_range,
            |_| false,
            |_, _| true,
        );
        assert_eq!(result, Err(TrainingError::NoPassingRegion));
        assert!(io.switches.is_empty());
    }

    #[test]
    fn fine_sweep_converts_cycle_offset_to_pipeline() {
        let pi_range = Range { start: 0, stop: 4, step: 1 };
        let cycle_range = Range { start: 0, stop: 6, step: 1 };
        let mut io = FakeIo::default();
        let result = run(
            &mut io,
            0,
            1,
            FreqRatio::OneToTwo,
            pi_range,
            cycle_range,
            |pi| pi == 2,
            |cycle, pi| (2..=4).contains(&cycle) && (1..=3).contains(&pi),
        )
        .unwrap();
        assert_eq!(result.ren_pi_code, 2);
        // cycle_mid = 3, ratio 1:2 => 2 cycles per stage: pipe_en=1, x_sel=1.
        assert_eq!(result.ie_pipeline.pipe_en, 1);
        assert_eq!(result.ie_pipeline.x_sel, 1);
        assert_eq!(result.re_pipeline, result.ie_pipeline);
        assert_eq!(result.ren_pipeline, result.ie_pipeline);
    }
}
