use crate::error::OsaError;
use crate::sink::TraceSink;
use crate::types::Trace;
use textplots::{Chart, Plot, Shape};

/// Determine the best scale and unit prefix for a given maximum value
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 || max_value == 0.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else {
        (1e12, "p")
    }
}

/// Intensity over wavelength, scaled for display
fn trace_frame(trace: &Trace) -> (Vec<(f32, f32)>, f64, &'static str) {
    let max_abs = trace
        .samples()
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, |a, &b| a.max(b.abs()));
    let (scale, unit) = determine_scale(max_abs);

    let frame = trace
        .points()
        .filter(|(_, v)| v.is_finite())
        .map(|(w, v)| (w as f32, (v * scale) as f32))
        .collect();
    (frame, scale, unit)
}

/// Line plot of one trace in the terminal
///
/// # Examples
/// ```
/// use rusty_osa::plotting::plot_trace;
/// use rusty_osa::{Trace, WavelengthRange};
///
/// let trace = Trace::from_samples(&WavelengthRange::new(600.0, 1100.0), vec![1.0, 3.0, 2.0]);
/// plot_trace(&trace, Some("Intensity Spectrum"), None, None).unwrap();
/// ```
pub fn plot_trace(
    trace: &Trace,
    title: Option<&str>,
    width: Option<usize>,
    height: Option<usize>,
) -> Result<(), OsaError> {
    if trace.is_empty() {
        return Err(OsaError::Plot("Cannot plot empty trace".to_string()));
    }

    let width = width.unwrap_or(140);
    let height = height.unwrap_or(60);

    let (frame, scale, unit) = trace_frame(trace);
    if frame.is_empty() {
        return Err(OsaError::Plot("Trace has no finite samples".to_string()));
    }

    let wavelengths = trace.wavelengths();
    let x_min = wavelengths[0] as f32;
    let mut x_max = wavelengths[wavelengths.len() - 1] as f32;
    if x_max <= x_min {
        x_max = x_min + 1.0;
    }
    let (y_min, y_max) = frame
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });

    println!("{}", title.unwrap_or("Intensity Spectrum"));
    println!("X-axis: Wavelength (nm) | Y-axis: {unit}Intensity");
    println!(
        "Range: {} samples, {:.2} to {:.2} nm | Values: {:.3} to {:.3} (x{})",
        trace.len(),
        x_min,
        x_max,
        y_min,
        y_max,
        scale
    );
    if let Some((peak_nm, peak_value)) = trace.peak() {
        println!("Peak: {:.3} at {:.2} nm", peak_value * scale, peak_nm);
    }
    println!("{}", "─".repeat(width));

    Chart::new(width as u32, height as u32, x_min, x_max)
        .lineplot(&Shape::Lines(&frame))
        .nice();

    println!("Wavelength (nm) →");

    Ok(())
}

/// Plot collaborator: draws every accepted trace
#[derive(Debug, Clone, Default)]
pub struct TerminalPlotter {
    width: Option<usize>,
    height: Option<usize>,
}

impl TerminalPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: usize, height: usize) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }
}

impl TraceSink for TerminalPlotter {
    fn handle(&mut self, trace: &Trace, iteration: usize) -> Result<(), OsaError> {
        let title = format!("Intensity Spectrum Iteration {iteration}");
        // Drawing is observational; a trace that cannot be drawn is not fatal
        if let Err(e) = plot_trace(trace, Some(&title), self.width, self.height) {
            log::warn!("Skipping plot for iteration {iteration}: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WavelengthRange;

    fn trace(samples: Vec<f64>) -> Trace {
        Trace::from_samples(&WavelengthRange::new(600.0, 1100.0), samples)
    }

    #[test]
    fn test_determine_scale() {
        assert_eq!(determine_scale(5.0), (1.0, ""));
        assert_eq!(determine_scale(0.005), (1e3, "m"));
        assert_eq!(determine_scale(5e-6), (1e6, "μ"));
        assert_eq!(determine_scale(5e-9), (1e9, "n"));
        assert_eq!(determine_scale(5e-12), (1e12, "p"));
        assert_eq!(determine_scale(0.0), (1.0, ""));
    }

    #[test]
    fn test_plot_trace_basic() {
        let data = trace(vec![-65.0, -40.0, -12.5, -40.0, -65.0]);
        assert!(plot_trace(&data, Some("Test Plot"), None, None).is_ok());
    }

    #[test]
    fn test_plot_empty_trace() {
        assert!(plot_trace(&trace(vec![]), None, None, None).is_err());
    }

    #[test]
    fn test_frame_uses_wavelength_axis() {
        let (frame, scale, unit) = trace_frame(&trace(vec![1e-6, 2e-6, 3e-6]));
        assert_eq!((scale, unit), (1e6, "μ"));
        assert_eq!(frame[0].0, 600.0);
        assert_eq!(frame[2].0, 1100.0);
        assert!((frame[1].1 - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_plotter_never_fails_the_session() {
        let mut plotter = TerminalPlotter::with_size(80, 20);
        assert!(plotter.handle(&trace(vec![]), 1).is_ok());
        assert!(plotter.handle(&trace(vec![1.0, 2.0]), 2).is_ok());
    }
}
