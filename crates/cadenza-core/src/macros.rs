//! Logging helpers usable on the audio thread.

/// Log a `tracing::warn!` the first time this call site is reached, then stay silent.
///
/// Used for recoverable range errors on the real-time path, where logging on every
/// block would flood the subscriber.
///
/// ```
/// for i in 0..3 {
///     cadenza_core::warn_once!("index {} out of range", i);
/// }
/// ```
#[macro_export]
macro_rules! warn_once {
    ($($arg:tt)+) => {{
        static WARNED: ::std::sync::atomic::AtomicBool = ::std::sync::atomic::AtomicBool::new(false);
        if !WARNED.swap(true, ::std::sync::atomic::Ordering::Relaxed) {
            $crate::tracing::warn!($($arg)+);
        }
    }};
}
