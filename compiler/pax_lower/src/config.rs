//! Lowering configuration.

/// Knobs for a lowering session.
///
/// `Default` gives the production settings. [`LowerConfig::from_env`]
/// enables the debugging aids from environment variables: the presence of
/// `PAX_VERIFY_IR` turns on verification and `PAX_TRACE_CLEANUPS` turns on
/// cleanup-stack tracing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LowerConfig {
    /// Run the IR verifier on every finished function and panic on failure.
    pub verify_on_finish: bool,
    /// Log the whole cleanup stack (at `debug`) whenever it changes.
    pub trace_cleanups: bool,
}

impl LowerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            verify_on_finish: std::env::var_os("PAX_VERIFY_IR").is_some(),
            trace_cleanups: std::env::var_os("PAX_TRACE_CLEANUPS").is_some(),
        }
    }

    /// Configuration used by tests: verification on, tracing off.
    pub fn checked() -> Self {
        Self {
            verify_on_finish: true,
            trace_cleanups: false,
        }
    }
}
