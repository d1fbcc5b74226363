//! Acquisition of optical spectra from a networked spectrum analyzer.
//!
//! The [`osa`] module speaks the analyzer's line protocol over a short-lived
//! connection per sweep. [`session`] repeats sweeps until enough traces of a
//! consistent length have been collected and hands each accepted trace to the
//! [`sink`]s.

pub mod config;
pub mod error;
pub mod logger;
pub mod osa;
pub mod plotting;
pub mod session;
pub mod sink;
pub mod types;

pub use config::{load_config, load_config_or_default, AppConfig};
pub use error::OsaError;
pub use logger::Logger;
pub use osa::{
    ConnectionConfig, DecodePolicy, DeviceEndpoint, OsaClient, OsaClientBuilder,
    ScriptedResponse, ScriptedTransport, SpectrumAnalyzer, TcpTransport, Transport,
};
pub use plotting::{plot_trace, TerminalPlotter};
pub use session::{
    AcquisitionSession, DiscardReason, IterationOutcome, IterationRecord, SessionConfig,
    SessionReport, SessionState,
};
pub use sink::{CsvTraceWriter, TraceSink};
pub use types::{
    RawResponse, Sensitivity, SweepMode, SweepRequest, SweepSpeed, Trace, WavelengthRange,
};
