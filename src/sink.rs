//! Hand-off points for accepted traces.
//!
//! The acquisition session streams every accepted trace to its sinks together
//! with the 1-based ordinal of the accepted sweep. Sinks own all file I/O.

use crate::error::OsaError;
use crate::types::Trace;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: [&str; 2] = ["Wavelength (nm)", "Intensity"];

/// Receives accepted traces
pub trait TraceSink {
    fn handle(&mut self, trace: &Trace, iteration: usize) -> Result<(), OsaError>;
}

impl<F> TraceSink for F
where
    F: FnMut(&Trace, usize) -> Result<(), OsaError>,
{
    fn handle(&mut self, trace: &Trace, iteration: usize) -> Result<(), OsaError> {
        self(trace, iteration)
    }
}

/// Persistence collaborator: one CSV file per accepted sweep
#[derive(Debug, Clone)]
pub struct CsvTraceWriter {
    folder: PathBuf,
    file_suffix: String,
}

impl CsvTraceWriter {
    /// Write into `folder`, creating it if needed
    pub fn new<P: Into<PathBuf>>(folder: P) -> Result<Self, OsaError> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;
        Ok(Self {
            folder,
            file_suffix: String::new(),
        })
    }

    /// Extra text between the iteration number and `.csv`, e.g. `_Pos_11_0_cm`
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = suffix.into();
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, iteration: usize) -> PathBuf {
        self.folder
            .join(format!("trace_data_{iteration}{}.csv", self.file_suffix))
    }

    pub fn write_trace(&self, trace: &Trace, iteration: usize) -> Result<PathBuf, OsaError> {
        let path = self.path_for(iteration);
        let mut writer = csv::Writer::from_path(&path)?;

        writer.write_record(CSV_HEADER)?;
        for (wavelength, intensity) in trace.points() {
            writer.write_record([wavelength.to_string(), intensity.to_string()])?;
        }
        writer.flush()?;

        info!(
            "Data for iteration {iteration} saved to {}",
            path.display()
        );
        Ok(path)
    }
}

impl TraceSink for CsvTraceWriter {
    fn handle(&mut self, trace: &Trace, iteration: usize) -> Result<(), OsaError> {
        self.write_trace(trace, iteration).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WavelengthRange;

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvTraceWriter::new(dir.path()).unwrap();
        let trace = Trace::from_samples(&WavelengthRange::new(600.0, 1100.0), vec![1.1, 2.2, 3.3]);

        let path = writer.write_trace(&trace, 7).unwrap();
        assert_eq!(path, dir.path().join("trace_data_7.csv"));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Wavelength (nm),Intensity",
                "600,1.1",
                "850,2.2",
                "1100,3.3"
            ]
        );
    }

    #[test]
    fn test_suffix_and_nested_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("run").join("pos_11");
        let writer = CsvTraceWriter::new(&folder)
            .unwrap()
            .with_suffix("_Current_7_22_100Hz");

        assert!(folder.is_dir());
        assert_eq!(
            writer.path_for(3),
            folder.join("trace_data_3_Current_7_22_100Hz.csv")
        );
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |trace: &Trace, iteration: usize| {
                seen.push((iteration, trace.len()));
                Ok::<(), OsaError>(())
            };
            let trace = Trace::from_samples(&WavelengthRange::new(1.0, 2.0), vec![0.5, 0.7]);
            sink.handle(&trace, 1).unwrap();
        }
        assert_eq!(seen, vec![(1, 2)]);
    }
}
