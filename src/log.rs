//! Logging interface, contingent on the `defmt` feature
//!
//! Without the feature every macro expands to nothing. Don't route `defmt`
//! output over this same port; the logger would re-enter the transport.

macro_rules! trace {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($args)*)
    };
}

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($args)*)
    };
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($args)*)
    };
}
