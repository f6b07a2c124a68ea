use std::io;

use thiserror::Error;

use crate::psx::scheduler::EventKind;

/// Host-side failures. Guest faults are CPU exceptions and never surface here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("BIOS image must be {expected} bytes, found {found}")]
    BiosSize { expected: usize, found: usize },

    #[error("invalid PS-EXE: {0}")]
    InvalidExe(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("save state encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("save state decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid save state: {0}")]
    InvalidState(&'static str),

    #[error("save state references {0:?} but no callback is registered for it")]
    UnboundEvent(EventKind),
}

pub type Result<T> = std::result::Result<T, Error>;
