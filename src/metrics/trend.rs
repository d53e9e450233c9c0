use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of change between the two most recent measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Growing,
    Declining,
    Stable,
    /// Fewer than two data points
    InsufficientData,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Growing => "GROWING",
            TrendDirection::Declining => "DECLINING",
            TrendDirection::Stable => "STABLE",
            TrendDirection::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub direction: TrendDirection,
    /// None when there is no previous value to compare against
    pub change_pct: Option<f64>,
    pub latest: Option<u64>,
    pub previous: Option<u64>,
}

impl TrendReport {
    fn insufficient(latest: Option<u64>) -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            change_pct: None,
            latest,
            previous: None,
        }
    }
}

/// Compare the last two values of a series.
///
/// `(latest - previous) / previous * 100` above `threshold_pct` is growth,
/// below `-threshold_pct` is decline, anything in between is stable. A rise
/// from zero counts as growth with no percentage.
pub fn trend(values: &[u64], threshold_pct: f64) -> TrendReport {
    let (previous, latest) = match values {
        [.., previous, latest] => (*previous, *latest),
        [only] => return TrendReport::insufficient(Some(*only)),
        [] => return TrendReport::insufficient(None),
    };

    let (direction, change_pct) = if previous == 0 {
        if latest == 0 {
            (TrendDirection::Stable, Some(0.0))
        } else {
            (TrendDirection::Growing, None)
        }
    } else {
        let pct = (latest as f64 - previous as f64) / previous as f64 * 100.0;
        let direction = if pct > threshold_pct {
            TrendDirection::Growing
        } else if pct < -threshold_pct {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };
        (direction, Some(pct))
    };

    TrendReport {
        direction,
        change_pct,
        latest: Some(latest),
        previous: Some(previous),
    }
}
