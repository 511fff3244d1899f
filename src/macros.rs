/// Checks a condition that correct callers always satisfy.
///
/// A violation is logged and panics in debug builds. In release builds
/// the macro only logs and evaluates to `false`, so the caller can bail out.
#[macro_export]
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {{
        let ok = $cond;
        if !ok {
            $crate::tracing::error!("precondition failed: {}", format_args!($($arg)+));
            debug_assert!(ok, $($arg)+);
        }
        ok
    }};
}
