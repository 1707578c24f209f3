// src/report.rs
use std::fmt;

use serde::Serialize;

use crate::types::Sample;

pub const NO_DATA_MESSAGE: &str = "No flow/volume data available.";

/// Summary statistics a report renderer needs besides the samples themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub max_flow: f64,
    pub avg_flow: f64,
    /// Elapsed time of the first sample that reaches `max_flow`.
    pub time_to_max_flow: f64,
    pub last_volume: f64,
    pub sample_count: usize,
}

pub fn summarize(samples: &[Sample]) -> ReportSummary {
    let Some(last) = samples.last() else {
        return ReportSummary::default();
    };
    // 严格大于: 并列时取最早的一点
    let mut peak = &samples[0];
    let mut total = 0.0;
    for s in samples {
        if s.flow > peak.flow {
            peak = s;
        }
        total += s.flow;
    }
    ReportSummary {
        max_flow: peak.flow,
        avg_flow: total / samples.len() as f64,
        time_to_max_flow: peak.elapsed_seconds,
        last_volume: last.volume,
        sample_count: samples.len(),
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Maximum Flow Rate: {:.2}", self.max_flow)?;
        writeln!(f, "Average Flow Rate: {:.2}", self.avg_flow)?;
        writeln!(
            f,
            "Time to Maximum Flow Rate: {:.2} seconds",
            self.time_to_max_flow
        )?;
        write!(f, "Last Volume Data: {:.2}", self.last_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_reference_session() {
        let samples = [
            Sample::new(0.0, 10.0, 100.0),
            Sample::new(1.0, 30.0, 150.0),
            Sample::new(2.0, 20.0, 180.0),
        ];
        let s = summarize(&samples);
        assert_eq!(s.max_flow, 30.0);
        assert_eq!(s.avg_flow, 20.0);
        assert_eq!(s.time_to_max_flow, 1.0);
        assert_eq!(s.last_volume, 180.0);
        assert_eq!(s.sample_count, 3);
    }

    #[test]
    fn empty_session_is_all_zero() {
        assert_eq!(summarize(&[]), ReportSummary::default());
    }

    #[test]
    fn ties_resolve_to_first_sample() {
        let samples = [
            Sample::new(0.0, 5.0, 0.0),
            Sample::new(0.5, 9.0, 1.0),
            Sample::new(1.5, 9.0, 2.0),
        ];
        assert_eq!(summarize(&samples).time_to_max_flow, 0.5);
    }

    #[test]
    fn negative_flows_are_not_clamped() {
        let samples = [Sample::new(0.0, -3.0, 0.0), Sample::new(1.0, -1.0, 0.0)];
        let s = summarize(&samples);
        assert_eq!(s.max_flow, -1.0);
        assert_eq!(s.time_to_max_flow, 1.0);
    }

    #[test]
    fn renders_two_decimals() {
        let s = summarize(&[Sample::new(0.0, 12.5, 200.0)]);
        let text = s.to_string();
        assert!(text.starts_with("Maximum Flow Rate: 12.50\n"));
        assert!(text.ends_with("Last Volume Data: 200.00"));
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["sample_count"], 1);
    }
}
