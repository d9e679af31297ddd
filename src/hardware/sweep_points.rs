//! Analyzer sweep-point recommendation.
//!
//! The trace must sample the span at least every RBW/2 to resolve features at
//! the analyzer's resolution. The minimum count is snapped up to the point
//! counts analyzers commonly offer and capped at the instrument maximum.

/// Point counts offered by the supported analyzers, ascending.
pub const POINT_LADDER: [usize; 6] = [1001, 2001, 5001, 10_001, 20_001, 40_001];

/// A recommended sweep point count and a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPointRecommendation {
    /// Point count to configure on the analyzer
    pub points: usize,
    /// Why this count was chosen
    pub message: String,
    /// True when the RBW requirement could not be met within `max_points`
    pub capped: bool,
}

/// Recommend a sweep point count for a span and resolution bandwidth.
///
/// Degenerate input (non-positive span or RBW) falls back to the smallest
/// ladder entry.
pub fn recommended_sweep_points(
    start_hz: f64,
    stop_hz: f64,
    rbw_hz: f64,
    max_points: usize,
) -> SweepPointRecommendation {
    let span = stop_hz - start_hz;
    if !(span > 0.0) || !(rbw_hz > 0.0) {
        let points = POINT_LADDER[0].min(max_points.max(1));
        return SweepPointRecommendation {
            points,
            message: format!("Invalid span or RBW, using default of {points} points"),
            capped: false,
        };
    }

    let required = (span / (rbw_hz / 2.0)).ceil();
    if required > max_points as f64 {
        return SweepPointRecommendation {
            points: max_points,
            message: format!(
                "RBW requires {required} points, capped to instrument maximum of {max_points}"
            ),
            capped: true,
        };
    }

    let required = required as usize;
    let points = POINT_LADDER
        .iter()
        .copied()
        .find(|&p| required <= p)
        .unwrap_or(POINT_LADDER[POINT_LADDER.len() - 1])
        .min(max_points);

    SweepPointRecommendation {
        points,
        message: format!("Sweep points set to {points}"),
        capped: false,
    }
}
