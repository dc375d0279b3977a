// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C7: the training suite (§4.7). Each submodule runs one training's 2-D
//! (or 1-D) sweep over the shared `sweep`/`bitmap` framework and returns
//! the codes to commit; none of them touch the frequency table directly,
//! so the coordinator decides how a result is applied to which channel.

pub mod baseline;
pub mod cbt;
pub mod delay;
pub mod dq_dqs;
pub mod read_dq;
pub mod read_window;
pub mod ren;
pub mod sweep;
pub mod write_level;

pub use sweep::{Overlay, TrainingError, TrainingIo};

/// When `true`, a training that runs per-channel commits channel 0's
/// result from channel 1's converged sweep rather than running its own
/// (§9: channel 0's CA/DQ routing is a strict subset of channel 1's, so a
/// passing region for channel 1 always passes for channel 0 too). Default
/// is `false` -- each channel trains independently unless a board asks for
/// this.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MirrorChannel0(pub bool);

impl MirrorChannel0 {
    /// Given channel 1's already-committed result, returns what channel
    /// 0's should be: its own training result while mirroring is off, or
    /// channel 1's when it's on.
    pub fn resolve<T: Copy>(self, channel0_result: T, channel1_result: T) -> T {
        if self.0 {
            channel1_result
        } else {
            channel0_result
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mirroring_off_keeps_channel0_own_result() {
        assert_eq!(MirrorChannel0(false).resolve(1u8, 2u8), 1);
    }

    #[test]
    fn mirroring_on_overwrites_with_channel1() {
        assert_eq!(MirrorChannel0(true).resolve(1u8, 2u8), 2);
    }
}
