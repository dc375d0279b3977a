// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-DQ training (§4.7): sweeps common VREF against receiver delay to
//! find the DQ eye's center, committing a single common VREF code and the
//! T/C receiver delay that centers the eye.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::PhyFrequencyId;
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReadDqResult {
    pub common_vref: u8,
    pub tc_delay: u8,
}

/// `probe(vref_code, delay_code)` drives common VREF and the receiver's
/// T/C delay, issues a read burst, and reports whether the captured DQ
/// word matched what was written.
pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    vref_range: Range,
    delay_range: Range,
    probe: impl FnMut(i32, i32) -> bool,
) -> Result<ReadDqResult, TrainingError> {
    let bits = with_training_mode(
        io,
        boot_freq,
        target_freq,
        Overlay::None,
        &[],
        &[],
        |_io| run_sweep(vref_range, delay_range, probe),
    )?;

    let rect = max_rect(&bits);
    if rect.area() == 0 {
        return Err(TrainingError::NoPassingRegion);
    }
    let (vref_mid, delay_mid) = find_midpoint_and_convert(&rect, &vref_range, &delay_range);
    Ok(ReadDqResult { common_vref: vref_mid as u8, tc_delay: delay_mid as u8 })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn centers_on_passing_rectangle() {
        let vref_range = Range { start: 0x10, stop: 0x20, step: 2 };
        let delay_range = Range { start: 0, stop: 0x10, step: 1 };
        let mut io = FakeIo::default();
        let result = run(&mut io, 0, 1, vref_range, delay_range, |vref, delay| {
            (0x14..=0x18).contains(&vref) && (4..=8).contains(&delay)
        })
        .unwrap();
        assert_eq!(result.common_vref, 0x16);
        assert_eq!(result.tc_delay, 6);
    }
}
