pub mod event;
pub mod log;

#[cfg(feature = "merkle-audit")]
pub mod merkle;

pub use event::*;
pub use log::*;

#[cfg(feature = "merkle-audit")]
pub use merkle::*;
