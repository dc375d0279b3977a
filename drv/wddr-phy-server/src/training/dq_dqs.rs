// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DQ-DQS training (§4.7): with `MR13[VRCG]` asserted, sweeps DQ-VREF x
//! DQ-PI code at each candidate write-cycle offset, keeping the offset
//! whose rectangle is largest. Commits the DQ PI code plus the per-bit DQ
//! and OE/DQS SDR pipeline codes the winning cycle offset converts to.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::{DramState, FreqRatio, PhyFrequencyId, SdrPipeline};
use crate::training::delay::convert_dram_delay_to_sdr_delay;
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DqDqsResult {
    pub dq_vref: u8,
    pub dq_pi_code: u8,
    pub dq_pipeline: SdrPipeline,
    pub oe_pipeline: SdrPipeline,
}

/// `probe(cycle_offset, vref_code, pi_code)` drives the write-cycle
/// offset, the DQ VREF code, and the DQ PI code, then reports whether the
/// byte written back matched.
pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    ratio: FreqRatio,
    cycle_range: Range,
    vref_range: Range,
    pi_range: Range,
    mut probe: impl FnMut(i32, i32, i32) -> bool,
) -> Result<DqDqsResult, TrainingError> {
    let mut best_area = 0usize;
    let mut best: Option<(i32, i32, i32)> = None;

    for cycle_index in 0..cycle_range.len() {
        let cycle_offset = cycle_range.code_at(cycle_index);
        let bits = with_training_mode(
            io,
            boot_freq,
            target_freq,
            Overlay::None,
            &[(13, DramState::MR13_VRCG_BIT)],
            &[(13, 0)],
            |_io| run_sweep(vref_range, pi_range, |vref, pi| probe(cycle_offset, vref, pi)),
        )?;
        let rect = max_rect(&bits);
        if rect.area() > best_area {
            let (vref_mid, pi_mid) = find_midpoint_and_convert(&rect, &vref_range, &pi_range);
            best_area = rect.area();
            best = Some((cycle_offset, vref_mid, pi_mid));
        }
    }

    let (cycle_offset, vref_mid, pi_mid) = best.ok_or(TrainingError::NoPassingRegion)?;
    let pipeline = convert_dram_delay_to_sdr_delay(cycle_offset, ratio);
    Ok(DqDqsResult {
        dq_vref: vref_mid as u8,
        dq_pi_code: pi_mid as u8,
        dq_pipeline: pipeline,
        oe_pipeline: pipeline,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn picks_cycle_offset_with_largest_rectangle() {
        let cycle_range = Range { start: 0, stop: 2, step: 1 };
        let vref_range = Range { start: 0, stop: 4, step: 1 };
        let pi_range = Range { start: 0, stop: 4, step: 1 };
        let mut io = FakeIo::default();
        let result = run(
            &mut io,
            0,
            1,
            FreqRatio::OneToOne,
            cycle_range,
            vref_range,
            pi_range,
            |cycle, vref, pi| cycle == 1 && (1..=3).contains(&vref) && (1..=3).contains(&pi),
        )
        .unwrap();
        assert_eq!(result.dq_vref, 2);
        assert_eq!(result.dq_pi_code, 2);
        assert_eq!(result.dq_pipeline.pipe_en, 1);
    }

    #[test]
    fn no_offset_passes_is_an_error() {
        let cycle_range = Range { start: 0, stop: 1, step: 1 };
        let vref_range = Range { start: 0, stop: 2, step: 1 };
        let pi_range = Range { start: 0, stop: 2, step: 1 };
        let mut io = FakeIo::default();
        let result = run(
            &mut io,
            0,
            1,
            FreqRatio::OneToOne,
            cycle_range,
            vref_range,
            pi_range,
            |_, _, _| false,
        );
        assert_eq!(result, Err(TrainingError::NoPassingRegion));
    }
}
