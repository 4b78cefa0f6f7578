//! Environment-variable tunables.
//!
//! Every env-var read goes through these helpers so the truthy/falsey
//! parsing rules live in one place.

/// Worker count for the shared default encode pool.
pub(crate) const WORKERS_VAR: &str = "JPEG_STACK_WORKERS";

/// Forces pixel conversion onto the calling thread.
pub(crate) const DISABLE_PARALLEL_CONVERT_VAR: &str = "JPEG_STACK_DISABLE_PARALLEL_CONVERT";

/// Returns `true` when the environment variable is set to `1`, `true`,
/// `yes` or `on` (case-insensitive, trimmed).
#[inline]
pub(crate) fn env_var_truthy(var_name: &str) -> bool {
    std::env::var(var_name)
        .map(|raw| parse_truthy(&raw))
        .unwrap_or(false)
}

/// Parses the environment variable as a `u64`, returning `Some` only when
/// the value is a valid positive (> 0) integer.
#[inline]
pub(crate) fn env_var_positive_u64(var_name: &str) -> Option<u64> {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| parse_positive_u64(&raw))
}

fn parse_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

fn parse_positive_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

/// Declares a cached boolean feature flag backed by a `OnceLock<bool>`.
///
/// `enabled_unless(fn_name, "ENV_VAR")` is on by default and turned off
/// by a truthy env var.
macro_rules! define_env_flag {
    (enabled_unless($fn_name:ident, $var:expr)) => {
        #[inline]
        fn $fn_name() -> bool {
            static VALUE: ::std::sync::OnceLock<bool> = ::std::sync::OnceLock::new();
            *VALUE.get_or_init(|| !$crate::env_config::env_var_truthy($var))
        }
    };
}

pub(crate) use define_env_flag;
