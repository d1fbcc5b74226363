use super::protocol::SENTINEL;
use crate::error::OsaError;

/// Extracts the sample list from a trace response.
///
/// Everything up to and including the first `ready` is login echo and status
/// text. What follows is a comma separated list of decimal intensities. Empty
/// segments (trailing commas, line breaks) are skipped.
pub fn parse_trace_payload(text: &str) -> Result<Vec<f64>, OsaError> {
    let (_, payload) = text
        .split_once(SENTINEL)
        .ok_or(OsaError::MissingSentinel)?;

    payload
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .parse::<f64>()
                .map_err(|_| OsaError::MalformedSample(segment.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_empty_segments() {
        let samples = parse_trace_payload("junk,ready,1.0,2.0,,3.0").unwrap();
        assert_eq!(samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_sentinel() {
        assert!(matches!(
            parse_trace_payload("no-sentinel-here,1,2,3"),
            Err(OsaError::MissingSentinel)
        ));
        assert!(matches!(
            parse_trace_payload(""),
            Err(OsaError::MissingSentinel)
        ));
    }

    #[test]
    fn test_malformed_sample() {
        let err = parse_trace_payload("ready,1.0,abc,3.0").unwrap_err();
        assert!(matches!(err, OsaError::MalformedSample(ref s) if s == "abc"));
        assert!(err.is_protocol());
    }

    #[test]
    fn test_only_first_sentinel_splits() {
        // A second "ready" after the sentinel is part of the payload
        assert!(matches!(
            parse_trace_payload("ready,1.0,ready,2.0"),
            Err(OsaError::MalformedSample(_))
        ));
    }

    #[test]
    fn test_real_response_layout() {
        let text = "AUTHENTICATE CRAM-MD5.\r\nready\r\n-210.000,-65.2E+00, 1.5e-3,\r\n";
        let samples = parse_trace_payload(text).unwrap();
        assert_eq!(samples, vec![-210.0, -65.2, 1.5e-3]);
    }

    #[test]
    fn test_sentinel_without_payload() {
        assert_eq!(parse_trace_payload("ready").unwrap(), Vec::<f64>::new());
        assert_eq!(parse_trace_payload("ready, ,\r\n").unwrap(), Vec::<f64>::new());
    }
}
