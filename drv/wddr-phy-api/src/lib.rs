// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! API crate for the LPDDR4 PHY coordinator server.

#![no_std]

use counters::Count;
use derive_idol_err::IdolError;
use userlib::{sys_send, FromPrimitive};

/// Errors returned across the IPC boundary. Every public FSM entry point
/// described in the core resolves to one of these on failure.
#[derive(
    Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, IdolError, Count,
)]
pub enum PhyError {
    /// Event arrived in a state where it is momentarily forbidden; caller
    /// should expect us to process it once the blocking FSM exits.
    Retry = 1,
    /// Event is out of range, unsupported, or a one-shot precondition was
    /// already consumed (e.g. a second `boot`).
    IllegalTransition,
    /// Frequency switch watchdog fired or an unexpected loss-of-lock
    /// occurred mid-switch; the freq-switch FSM is parked in FAIL.
    FrequencySwitchFailed,
    /// `freq_id` does not index the frequency table.
    InvalidFrequencyId,
    /// The DFI update FSM rejected the request (e.g. a PHYUPD request
    /// while CTRLUPD is in flight).
    DfiUpdateBusy,
    /// A training routine could not find a passing region of its sweep.
    TrainingFailed,
    /// The post-training baseline write/read loopback did not match.
    BaselineMismatch,
    /// Requested operation is not implemented by this firmware image.
    Unsupported,

    #[idol(server_death)]
    ServerRestarted,
}

/// Frequency-switch FSM state, mirrored out over IPC for introspection.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, zerocopy::IntoBytes, zerocopy::FromBytes, zerocopy::Immutable)]
#[repr(u8)]
pub enum PhyFsmState {
    Idle = 0,
    Prep = 1,
    WaitForSwitch = 2,
    Switch = 3,
    WaitForLock = 4,
    PostSwitch = 5,
    Fail = 6,
}

/// DFI-update FSM state, mirrored out over IPC for introspection.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, zerocopy::IntoBytes, zerocopy::FromBytes, zerocopy::Immutable)]
#[repr(u8)]
pub enum DfiUpdateFsmState {
    Idle = 0,
    Req = 1,
    PhyUpdWait = 2,
    CtrlUpdWait = 3,
    Cal = 4,
    Update = 5,
    UpdateExit = 6,
    PhyMstrPending = 7,
    PhyMstrActive = 8,
}

/// Selects which training routine `run_training` executes.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum TrainingKind {
    CommandBus = 0,
    WriteLeveling = 1,
    ReadDq = 2,
    ReadEnable = 3,
    ReadWindow = 4,
    WriteDqDqs = 5,
    Baseline = 6,
}

include!(concat!(env!("OUT_DIR"), "/client_stub.rs"));
