use crate::types::{Sensitivity, SweepMode, SweepRequest, SweepSpeed};
use std::fmt;

/// Every command line ends with CRLF
pub const TERMINATOR: &str = "\r\n";

/// Marks the start of the numeric payload in a response
pub const SENTINEL: &str = "ready";

/// Query for the Y values of trace A
pub const TRACE_QUERY: &str = ":TRACE:Y? TRA";

/// Remote commands understood by the analyzer
#[derive(Debug, Clone, PartialEq)]
pub enum OsaCommand {
    /// Log in as the anonymous remote user
    OpenAnonymous,
    Reset,
    /// Select the GPIB-compatible command format
    CommandFormat,
    WavelengthStart(f64),
    WavelengthStop(f64),
    WavelengthSpan(f64),
    Resolution(f64),
    Sensitivity(Sensitivity),
    SweepSpeed(SweepSpeed),
    AutoSamplingPoints(bool),
    SweepMode(SweepMode),
    ClearStatus,
    Initiate,
    QueryTrace,
}

impl fmt::Display for OsaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsaCommand::OpenAnonymous => write!(f, "open \"anonymous\""),
            OsaCommand::Reset => write!(f, "*RST"),
            OsaCommand::CommandFormat => write!(f, "CFORM1"),
            OsaCommand::WavelengthStart(nm) => write!(f, ":sens:wav:start {nm}nm"),
            OsaCommand::WavelengthStop(nm) => write!(f, ":sens:wav:stop {nm}nm"),
            OsaCommand::WavelengthSpan(nm) => write!(f, ":sens:wav:span {nm}nm"),
            OsaCommand::Resolution(nm) => write!(f, ":sens:band:res {nm}nm"),
            OsaCommand::Sensitivity(level) => write!(f, ":sens:sens {}", level.as_scpi()),
            OsaCommand::SweepSpeed(speed) => write!(f, ":sens:sens:speed {}", speed.as_scpi()),
            OsaCommand::AutoSamplingPoints(on) => {
                write!(f, ":sens:sweep:points:auto {}", if *on { "on" } else { "off" })
            }
            OsaCommand::SweepMode(mode) => write!(f, ":init:smode {}", u8::from(*mode)),
            OsaCommand::ClearStatus => write!(f, "*CLS"),
            OsaCommand::Initiate => write!(f, ":init"),
            OsaCommand::QueryTrace => f.write_str(TRACE_QUERY),
        }
    }
}

/// Commands that prepare and start one sweep, in the order the firmware
/// expects them
pub fn setup_sequence(request: &SweepRequest) -> Vec<OsaCommand> {
    let mut commands = vec![
        OsaCommand::OpenAnonymous,
        OsaCommand::Reset,
        OsaCommand::CommandFormat,
        OsaCommand::WavelengthStart(request.range.start_nm),
        OsaCommand::WavelengthStop(request.range.stop_nm),
    ];
    if let Some(resolution) = request.resolution_nm {
        commands.push(OsaCommand::Resolution(resolution));
    }
    commands.extend([
        OsaCommand::Sensitivity(request.sensitivity),
        OsaCommand::SweepSpeed(request.speed),
        OsaCommand::AutoSamplingPoints(true),
        OsaCommand::SweepMode(request.mode),
        OsaCommand::ClearStatus,
        OsaCommand::Initiate,
    ]);
    commands
}
