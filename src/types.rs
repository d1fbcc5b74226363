use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OsaError;

/// Wavelength window of a sweep, in nanometres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub start_nm: f64,
    pub stop_nm: f64,
}

impl WavelengthRange {
    pub fn new(start_nm: f64, stop_nm: f64) -> Self {
        Self { start_nm, stop_nm }
    }
}

/// Sweep trigger mode, `:init:smode` codes 1 to 3
///
/// Parsing is case-insensitive, from config files as well as from strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum SweepMode {
    #[default]
    Single = 1,
    Repeat = 2,
    Auto = 3,
}

impl From<SweepMode> for u8 {
    fn from(mode: SweepMode) -> Self {
        mode as u8
    }
}

impl TryFrom<String> for SweepMode {
    type Error = OsaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for SweepMode {
    type Err = OsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(SweepMode::Single),
            "REPEAT" => Ok(SweepMode::Repeat),
            "AUTO" => Ok(SweepMode::Auto),
            other => Err(OsaError::InvalidRequest(format!(
                "Invalid sweep mode '{other}', expected one of SINGLE, REPEAT, AUTO"
            ))),
        }
    }
}

/// Measurement sensitivity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    NormalHold,
    NormalAuto,
    Normal,
    Mid,
    High1,
    #[default]
    High2,
    High3,
}

impl Sensitivity {
    /// Token accepted by `:sens:sens`
    pub fn as_scpi(&self) -> &'static str {
        match self {
            Sensitivity::NormalHold => "NHLD",
            Sensitivity::NormalAuto => "NAUT",
            Sensitivity::Normal => "NORM",
            Sensitivity::Mid => "MID",
            Sensitivity::High1 => "HIGH1",
            Sensitivity::High2 => "HIGH2",
            Sensitivity::High3 => "HIGH3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepSpeed {
    #[serde(rename = "1x")]
    Normal,
    #[default]
    #[serde(rename = "2x")]
    Double,
}

impl SweepSpeed {
    pub fn as_scpi(&self) -> &'static str {
        match self {
            SweepSpeed::Normal => "1x",
            SweepSpeed::Double => "2x",
        }
    }
}

/// Parameters of one sweep. Built fresh for every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    pub range: WavelengthRange,
    /// Resolution bandwidth in nm; `None` keeps the instrument setting
    pub resolution_nm: Option<f64>,
    pub sensitivity: Sensitivity,
    pub speed: SweepSpeed,
    pub mode: SweepMode,
}

impl SweepRequest {
    pub fn new(start_nm: f64, stop_nm: f64) -> Self {
        Self {
            range: WavelengthRange::new(start_nm, stop_nm),
            resolution_nm: None,
            sensitivity: Sensitivity::default(),
            speed: SweepSpeed::default(),
            mode: SweepMode::default(),
        }
    }

    pub fn with_resolution(mut self, resolution_nm: f64) -> Self {
        self.resolution_nm = Some(resolution_nm);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_speed(mut self, speed: SweepSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reject ranges and resolutions the instrument cannot sweep
    pub fn validate(&self) -> Result<(), OsaError> {
        let WavelengthRange { start_nm, stop_nm } = self.range;
        if !start_nm.is_finite() || !stop_nm.is_finite() || start_nm <= 0.0 {
            return Err(OsaError::InvalidRequest(format!(
                "Wavelength bounds must be positive and finite, got {start_nm}..{stop_nm}"
            )));
        }
        if start_nm >= stop_nm {
            return Err(OsaError::InvalidRequest(format!(
                "Start wavelength {start_nm} nm must be below stop wavelength {stop_nm} nm"
            )));
        }
        if let Some(resolution) = self.resolution_nm {
            if !resolution.is_finite() || resolution <= 0.0 {
                return Err(OsaError::InvalidRequest(format!(
                    "Resolution must be positive, got {resolution} nm"
                )));
            }
        }
        Ok(())
    }
}

/// Decoded text of a single receive cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    text: String,
    byte_count: usize,
}

impl RawResponse {
    pub fn new(text: String, byte_count: usize) -> Self {
        Self { text, byte_count }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of bytes read off the wire, before decoding
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    pub fn is_empty(&self) -> bool {
        self.byte_count == 0
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `n` evenly spaced points from `start` to `stop`, both inclusive
pub fn wavelength_axis(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut axis: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            axis[n - 1] = stop;
            axis
        }
    }
}

/// One accepted spectrum: intensity samples on a linear wavelength axis
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    wavelengths: Vec<f64>,
    samples: Vec<f64>,
}

impl Trace {
    /// Attach the request's wavelength axis to parsed samples
    pub fn from_samples(range: &WavelengthRange, samples: Vec<f64>) -> Self {
        let wavelengths = wavelength_axis(range.start_nm, range.stop_nm, samples.len());
        Self {
            wavelengths,
            samples,
        }
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// (wavelength, intensity) pairs in sweep order
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.samples.iter().copied())
    }

    /// Peak sample as (wavelength, intensity)
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.points()
            .filter(|(_, v)| !v.is_nan())
            .fold(None, |best, p| match best {
                Some((_, v)) if v >= p.1 => best,
                _ => Some(p),
            })
    }
}
