#[cfg(feature = "log")]
#[macro_use]
mod log {
    macro_rules! kvat_log {
        (trace, $($arg:expr),*) => { log::trace!($($arg),*); };
        (debug, $($arg:expr),*) => { log::debug!($($arg),*); };
        (warn, $($arg:expr),*) => { log::warn!($($arg),*); };
        (error, $($arg:expr),*) => { log::error!($($arg),*); };
    }
}

#[cfg(not(feature = "log"))]
#[macro_use]
mod log {
    macro_rules! kvat_log {
        ($level:ident, $($arg:expr),*) => { $( let _ = $arg; )* }
    }
}

macro_rules! kvat_trace {
    ($($arg:expr),*) => (kvat_log!(trace, $($arg),*));
}

macro_rules! kvat_debug {
    ($($arg:expr),*) => (kvat_log!(debug, $($arg),*));
}

macro_rules! kvat_warn {
    ($($arg:expr),*) => (kvat_log!(warn, $($arg),*));
}

macro_rules! kvat_error {
    ($($arg:expr),*) => (kvat_log!(error, $($arg),*));
}
