//! Physical binding between NFC security chips and ledger accounts.
//!
//! A chip proves possession by signing `keccak256(caller ‖ blockhash)` for a
//! block at most a fixed depth below the inclusion height. This crate runs
//! that challenge/response against a [`ChipDriver`], normalizes the chip's
//! DER output into a compact low-`s` signature, and checks it the way the
//! on-ledger registries do.
//!
//! # Key Types
//!
//! - [`ChipBinder`]: attest / verify / authenticate
//! - [`ChipSession`]: exclusive scoped access; cancels the radio on drop
//! - [`SoftwareChip`]: key-backed driver for dev and tests

pub mod binder;
pub mod driver;
pub mod error;
pub mod software;

pub use binder::{ChipBinder, ChipConfig};
pub use driver::{ChipDriver, ChipSession};
pub use error::{ChipError, ChipResult};
pub use software::{ChipBehavior, SoftwareChip};
