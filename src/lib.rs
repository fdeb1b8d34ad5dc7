pub mod ai;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log on every `every`-th decision turn when the `perf_stats` feature is enabled.
///
/// `every` defaults to 100 and must be nonzero. Without `perf_stats` this
/// expands to nothing and the arguments (e.g. `batch.len()`) are not evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(clock, "Applied {} events", batch.len());
/// profile_log!(clock, every = 64, "Applied {} events", batch.len());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($clock:expr, every = $every:expr, $($arg:tt)*) => {
        if $clock.turn % $every == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
    ($clock:expr, $($arg:tt)*) => {
        $crate::profile_log!($clock, every = 100, $($arg)*)
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {};
}
