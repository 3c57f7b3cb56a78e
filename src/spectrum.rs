//! Summary statistics of a sorted eigenvalue spectrum.
use tracing::info;

/// Eigenvalues smaller than this fraction of the largest one count as zero.
pub const RELATIVE_TOLERANCE: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumSummary {
    pub trace: f64,
    pub largest: f64,
    pub smallest: f64,
    /// Eigenvalues above `RELATIVE_TOLERANCE * largest`.
    pub n_positive: usize,
    /// Leading components needed to reach 90% of the trace.
    pub components_90: usize,
    /// Leading components needed to reach 99% of the trace.
    pub components_99: usize,
}

/// Number of leading values whose running sum reaches `fraction * trace`.
fn components_for(values: &[f64], trace: f64, fraction: f64) -> usize {
    let target = fraction * trace;
    let mut running = 0.0;
    for (i, value) in values.iter().enumerate() {
        running += value;
        if running >= target {
            return i + 1;
        }
    }
    values.len()
}

/// Summarize eigenvalues sorted in descending order. Returns `None` for an
/// empty spectrum.
pub fn summarize(values: &[f64]) -> Option<SpectrumSummary> {
    let largest = *values.first()?;
    let smallest = *values.last()?;
    let trace: f64 = values.iter().sum();
    let threshold = RELATIVE_TOLERANCE * largest.abs();
    let n_positive = values.iter().filter(|&&v| v > threshold).count();
    Some(SpectrumSummary {
        trace,
        largest,
        smallest,
        n_positive,
        components_90: components_for(values, trace, 0.9),
        components_99: components_for(values, trace, 0.99),
    })
}

pub fn log_summary(summary: &SpectrumSummary) {
    info!("trace: {:e}", summary.trace);
    info!("largest eigenvalue: {:e}", summary.largest);
    info!("smallest eigenvalue: {:e}", summary.smallest);
    info!("positive eigenvalues: {}", summary.n_positive);
    info!("components for 90% of the trace: {}", summary.components_90);
    info!("components for 99% of the trace: {}", summary.components_99);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_sorted_values() {
        let values = [6.0, 2.5, 1.0, 0.5, 0.0];
        let summary = summarize(&values).unwrap();
        assert_eq!(summary.trace, 10.0);
        assert_eq!(summary.largest, 6.0);
        assert_eq!(summary.smallest, 0.0);
        assert_eq!(summary.n_positive, 4);
        // 6 + 2.5 = 8.5 < 9, + 1 = 9.5
        assert_eq!(summary.components_90, 3);
        // 9.5 + 0.5 = 10
        assert_eq!(summary.components_99, 4);
    }

    #[test]
    fn empty_spectrum() {
        assert_eq!(summarize(&[]), None);
    }
}
