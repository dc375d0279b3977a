// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Baseline gate (§4.7, §8 invariant 5): a single write-FIFO burst
//! followed by a read-FIFO burst, compared byte for byte. Every training
//! routine returns through this gate via `TrainingIo::baseline_write_read`;
//! this module is the one place that shared implementation lives.

use crate::training::sweep::TrainingError;

/// Compares a write burst against what came back from the read burst.
/// `write` issues the write-FIFO burst and returns the pattern sent;
/// `read` issues the read-FIFO burst and returns what was captured.
pub fn write_then_read<const N: usize>(
    write: impl FnOnce() -> [u8; N],
    read: impl FnOnce() -> [u8; N],
) -> Result<(), TrainingError> {
    let sent = write();
    let captured = read();
    if sent == captured {
        Ok(())
    } else {
        Err(TrainingError::BaselineMismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matching_burst_passes() {
        let result = write_then_read(|| [0xA5u8; 8], || [0xA5u8; 8]);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn mismatched_burst_fails() {
        let result = write_then_read(|| [0xA5u8; 8], || [0x5Au8; 8]);
        assert_eq!(result, Err(TrainingError::BaselineMismatch));
    }
}
