// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-window training (§4.7): walks the `paden_pext` read-enable/
//! input-enable extension down from its widest setting, looking for the
//! point where the RDFIFO stops draining empty entries, and commits the
//! midpoint of the passing offset window.

use crate::bitmap::{find_midpoint_and_convert, max_rect, Range};
use crate::table::PhyFrequencyId;
use crate::training::sweep::{run_sweep, with_training_mode, Overlay, TrainingError, TrainingIo};

const SINGLE_ROW: Range = Range { start: 0, stop: 0, step: 1 };

/// `probe(offset)` sets `paden_pext.rd.ie`/`.re` to `offset` and reports
/// whether the RDFIFO drained a full, non-empty burst.
pub fn run<Io: TrainingIo>(
    io: &mut Io,
    boot_freq: PhyFrequencyId,
    target_freq: PhyFrequencyId,
    offset_range: Range,
    mut probe: impl FnMut(i32) -> bool,
) -> Result<u8, TrainingError> {
    let bits = with_training_mode(io, boot_freq, target_freq, Overlay::None, &[], &[], |_io| {
        run_sweep(SINGLE_ROW, offset_range, |_row, offset| probe(offset))
    })?;

    let rect = max_rect(&bits);
    if rect.area() == 0 {
        return Err(TrainingError::NoPassingRegion);
    }
    let (_row, offset_mid) = find_midpoint_and_convert(&rect, &SINGLE_ROW, &offset_range);
    Ok(offset_mid as u8)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::training::sweep::fakes::FakeIo;

    #[test]
    fn finds_midpoint_of_nonempty_window() {
        let offset_range = Range { start: 0, stop: 10, step: 1 };
        let mut io = FakeIo::default();
        let offset = run(&mut io, 0, 1, offset_range, |o| (2..=6).contains(&o)).unwrap();
        assert_eq!(offset, 4);
    }

    #[test]
    fn never_drains_is_an_error() {
        let offset_range = Range { start: 0, stop: 10, step: 1 };
        let mut io = FakeIo::default();
        let result = run(&mut io, 0, 1, offset_range, |_| false);
        assert_eq!(result, Err(TrainingError::NoPassingRegion));
    }
}
