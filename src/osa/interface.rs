use crate::error::OsaError;
use crate::types::{SweepRequest, Trace};

/// Capability shared by every spectrum acquisition backend
///
/// A backend is configured for one sweep and then asked for its trace. The
/// pair forms one acquisition; any link resource opened by `configure` is
/// released by the time `acquire_trace` returns, whether it succeeded or not.
///
/// # Errors
/// Connection class errors ([`OsaError::is_connection`]) mean the instrument
/// could not be reached. Protocol class errors ([`OsaError::is_protocol`])
/// mean it answered with something unusable. Callers typically retry both.
pub trait SpectrumAnalyzer {
    /// Prepare the instrument for a sweep described by `request` and start it
    fn configure(&mut self, request: &SweepRequest) -> Result<(), OsaError>;

    /// Fetch the trace of the sweep started by the last `configure`
    fn acquire_trace(&mut self) -> Result<Trace, OsaError>;

    /// Release anything left over from an unfinished acquisition
    fn abort(&mut self) {}
}

impl<A: SpectrumAnalyzer + ?Sized> SpectrumAnalyzer for Box<A> {
    fn configure(&mut self, request: &SweepRequest) -> Result<(), OsaError> {
        (**self).configure(request)
    }

    fn acquire_trace(&mut self) -> Result<Trace, OsaError> {
        (**self).acquire_trace()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}
