// Logging shims: forward to the `log` crate when the `log` feature is on,
// otherwise type-check the arguments and emit nothing.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)+) => { log::trace!($($arg)+) };
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => { log::debug!($($arg)+) };
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:tt)+) => { log::warn!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)+) => {
        if false {
            let _ = ::std::format!($($arg)+);
        }
    };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {
        if false {
            let _ = ::std::format!($($arg)+);
        }
    };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)+) => {
        if false {
            let _ = ::std::format!($($arg)+);
        }
    };
}
