//! Logging shim (§10.3).
//!
//! The rest of the crate calls `crate::log::warn!`/`info!` regardless of
//! which backend is active. Under `std` this forwards to `tracing` (as used
//! throughout `klipper-host` and `sim`); under `no_std` with the `defmt`
//! feature it forwards to `defmt` (as used throughout
//! `klipper-mcu-firmware` and the `mcu-drivers` family). With neither
//! backend enabled the macros compile away to nothing, which keeps this
//! crate usable on targets with no logging story at all.

#[cfg(feature = "std")]
macro_rules! warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! warn {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "std")]
macro_rules! info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! info {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "std")]
macro_rules! debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(all(not(feature = "std"), feature = "defmt"))]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

#[cfg(not(any(feature = "std", feature = "defmt")))]
macro_rules! debug {
    ($($arg:tt)*) => {{}};
}

pub(crate) use debug;
pub(crate) use info;
pub(crate) use warn;
