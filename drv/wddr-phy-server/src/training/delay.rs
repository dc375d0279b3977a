// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delay-domain conversion (§4.7): results a sweep finds in *DRAM cycles*
//! are converted to *SDR-pipeline codes* so the final wall-clock launch
//! time lands `delay` cycles after the CA reference.

use crate::table::{FreqRatio, SdrPipeline};

/// `fc_delay = max(delay, 0) / cycles_per_stage`, with `pipe_en`/`x_sel`
/// chosen so that `pipe_en` whole cycles plus the `x_sel` tap plus the
/// remaining `fc_delay` fine steps reproduce `delay` cycles after the CA
/// reference, at this ratio's cycles-per-packet.
pub fn convert_dram_delay_to_sdr_delay(delay: i32, ratio: FreqRatio) -> SdrPipeline {
    let delay = delay.max(0) as u32;
    let cycles_per_stage = ratio.cycles_per_packet() as u32;
    let pipe_en = (delay / cycles_per_stage) as u8;
    let remainder = delay % cycles_per_stage;
    // x_sel picks which sub-phase tap within the current pipeline stage
    // to launch from; remainder cycles beyond a full pipeline stage map
    // 1:1 onto taps.
    let x_sel = remainder as u8;
    let fc_delay = (delay / cycles_per_stage) as u8;
    SdrPipeline { pipe_en, x_sel, fc_delay }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_delay_is_zero_everywhere() {
        let pipe = convert_dram_delay_to_sdr_delay(0, FreqRatio::OneToTwo);
        assert_eq!(pipe.pipe_en, 0);
        assert_eq!(pipe.x_sel, 0);
        assert_eq!(pipe.fc_delay, 0);
    }

    #[test]
    fn negative_delay_clamps_to_zero() {
        let pipe = convert_dram_delay_to_sdr_delay(-5, FreqRatio::OneToFour);
        assert_eq!(pipe.pipe_en, 0);
    }

    #[test]
    fn whole_stage_delay_sets_pipe_en() {
        // 1:2 ratio => 2 cycles per stage; a delay of 6 cycles is exactly
        // 3 whole stages with no remainder.
        let pipe = convert_dram_delay_to_sdr_delay(6, FreqRatio::OneToTwo);
        assert_eq!(pipe.pipe_en, 3);
        assert_eq!(pipe.x_sel, 0);
    }

    #[test]
    fn partial_stage_delay_sets_x_sel() {
        let pipe = convert_dram_delay_to_sdr_delay(5, FreqRatio::OneToFour);
        // 4 cycles per stage: 5 = 1 stage + 1 remainder.
        assert_eq!(pipe.pipe_en, 1);
        assert_eq!(pipe.x_sel, 1);
    }
}
