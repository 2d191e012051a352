//! Backtest accuracy checks.
//!
//! Helps pick a retraining threshold: given a model's backtest
//! predictions joined with actuals, how often does the error at a
//! forecast point exceed a baseline? A single forecast point is noisy,
//! so [`accuracy_check_n`] also scores rolling windows of `n` points.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::dataset::Dataset;
use crate::error::CoreError;
use crate::payload::parse_day;

/// One backtest prediction before actuals are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestPrediction {
    pub forecast_point: String,
    pub timestamp: String,
    pub prediction: f64,
}

/// A backtest prediction with its observed value.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestPoint {
    pub forecast_point: String,
    pub timestamp: String,
    pub actual: f64,
    pub prediction: f64,
}

/// RMSE at (or up to) one forecast point, compared against a baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyCheck {
    pub forecast_point: String,
    pub rmse: f64,
    pub failed: bool,
}

/// Root mean squared error over a set of points. `None` when empty.
pub fn rmse<'a, I>(points: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a BacktestPoint>,
{
    let (sum, count) = points.into_iter().fold((0.0, 0usize), |(sum, n), p| {
        let err = p.actual - p.prediction;
        (sum + err * err, n + 1)
    });
    (count > 0).then(|| (sum / count as f64).sqrt())
}

/// Pick the item with the lowest score, ignoring unscored items.
///
/// Ties keep the first item in input order.
pub fn best_by_metric<T, F>(items: &[T], score: F) -> Option<&T>
where
    F: Fn(&T) -> Option<f64>,
{
    items
        .iter()
        .filter_map(|item| score(item).map(|s| (s, item)))
        .fold(None, |best: Option<(f64, &T)>, (s, item)| match best {
            Some((b, _)) if b <= s => best,
            _ => Some((s, item)),
        })
        .map(|(_, item)| item)
}

/// Target values of one series keyed by calendar day.
///
/// Rows with an unparsable date or a non-numeric target are skipped.
pub fn actuals_by_day(
    dataset: &Dataset,
    series_column: &str,
    series: &str,
    time_column: &str,
    target_column: &str,
) -> Result<HashMap<NaiveDate, f64>, CoreError> {
    let subset = dataset.series_subset(series_column, series)?;
    let time_idx = subset.column_index(time_column)?;
    let target_idx = subset.column_index(target_column)?;

    Ok(subset
        .rows()
        .iter()
        .filter_map(|row| {
            let day = parse_day(&row[time_idx])?;
            let actual = row[target_idx].trim().parse::<f64>().ok()?;
            Some((day, actual))
        })
        .collect())
}

/// Attach actuals to predictions by timestamp day, dropping unmatched rows.
pub fn join_actuals(
    predictions: &[BacktestPrediction],
    actuals: &HashMap<NaiveDate, f64>,
) -> Vec<BacktestPoint> {
    predictions
        .iter()
        .filter_map(|p| {
            let actual = *actuals.get(&parse_day(&p.timestamp)?)?;
            Some(BacktestPoint {
                forecast_point: p.forecast_point.clone(),
                timestamp: p.timestamp.clone(),
                actual,
                prediction: p.prediction,
            })
        })
        .collect()
}

fn group_by_forecast_point(points: &[BacktestPoint]) -> BTreeMap<&str, Vec<&BacktestPoint>> {
    let mut groups: BTreeMap<&str, Vec<&BacktestPoint>> = BTreeMap::new();
    for point in points {
        groups
            .entry(point.forecast_point.as_str())
            .or_default()
            .push(point);
    }
    groups
}

/// RMSE per forecast point, in forecast point order.
///
/// A check fails when its RMSE is strictly greater than `baseline`.
pub fn accuracy_check(points: &[BacktestPoint], baseline: f64) -> Vec<AccuracyCheck> {
    group_by_forecast_point(points)
        .into_iter()
        .filter_map(|(fp, group)| {
            let rmse = rmse(group)?;
            Some(AccuracyCheck {
                forecast_point: fp.to_string(),
                rmse,
                failed: rmse > baseline,
            })
        })
        .collect()
}

/// RMSE over every window of `n` consecutive forecast points.
///
/// Each check is labelled with the last forecast point of its window.
/// Returns nothing when `n` is zero or exceeds the number of points.
pub fn accuracy_check_n(points: &[BacktestPoint], baseline: f64, n: usize) -> Vec<AccuracyCheck> {
    let groups = group_by_forecast_point(points);
    let ordered: Vec<(&str, Vec<&BacktestPoint>)> = groups.into_iter().collect();
    if n == 0 || n > ordered.len() {
        return Vec::new();
    }

    ordered
        .windows(n)
        .filter_map(|window| {
            let rmse = rmse(window.iter().flat_map(|(_, group)| group.iter().copied()))?;
            let (last, _) = window.last()?;
            Some(AccuracyCheck {
                forecast_point: last.to_string(),
                rmse,
                failed: rmse > baseline,
            })
        })
        .collect()
}

/// Share of checks that failed, `0.0` when there are none.
pub fn failure_rate(checks: &[AccuracyCheck]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    checks.iter().filter(|c| c.failed).count() as f64 / checks.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(fp: &str, ts: &str, actual: f64, prediction: f64) -> BacktestPoint {
        BacktestPoint {
            forecast_point: fp.to_string(),
            timestamp: ts.to_string(),
            actual,
            prediction,
        }
    }

    fn points() -> Vec<BacktestPoint> {
        vec![
            point("2021-01-01", "2021-01-02", 10.0, 7.0),
            point("2021-01-01", "2021-01-03", 10.0, 14.0),
            point("2021-01-02", "2021-01-03", 5.0, 5.0),
            point("2021-01-03", "2021-01-04", 1.0, 2.0),
        ]
    }

    #[test]
    fn rmse_of_known_errors() {
        let pts = points();
        // errors 3 and -4: sqrt((9 + 16) / 2)
        let value = rmse(&pts[..2]).unwrap();
        assert!((value - 12.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(rmse(&[] as &[BacktestPoint]), None);
    }

    #[test]
    fn per_forecast_point_checks() {
        let checks = accuracy_check(&points(), 1.0);
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].forecast_point, "2021-01-01");
        assert!(checks[0].failed);
        assert_eq!(checks[1].rmse, 0.0);
        assert!(!checks[1].failed);
        // Exactly at the baseline is not a failure.
        assert_eq!(checks[2].rmse, 1.0);
        assert!(!checks[2].failed);
    }

    #[test]
    fn rolling_windows() {
        let checks = accuracy_check_n(&points(), 2.0, 2);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].forecast_point, "2021-01-02");
        // errors 3, -4, 0: sqrt(25 / 3)
        assert!((checks[0].rmse - (25.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(checks[0].failed);
        assert_eq!(checks[1].forecast_point, "2021-01-03");
        // errors 0, -1: sqrt(1 / 2)
        assert!((checks[1].rmse - 0.5f64.sqrt()).abs() < 1e-12);
        assert!(!checks[1].failed);
    }

    #[test]
    fn rolling_window_larger_than_data() {
        assert!(accuracy_check_n(&points(), 1.0, 4).is_empty());
        assert!(accuracy_check_n(&points(), 1.0, 0).is_empty());
        assert_eq!(accuracy_check_n(&points(), 1.0, 3).len(), 1);
    }

    #[test]
    fn failure_rate_counts_failed() {
        let checks = accuracy_check(&points(), 1.0);
        assert!((failure_rate(&checks) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(failure_rate(&[]), 0.0);
    }

    #[test]
    fn best_by_metric_skips_unscored_and_keeps_first_tie() {
        let items = [("a", None), ("b", Some(2.0)), ("c", Some(1.0)), ("d", Some(1.0))];
        let best = best_by_metric(&items, |(_, s)| *s).unwrap();
        assert_eq!(best.0, "c");

        let none: [(&str, Option<f64>); 1] = [("a", None)];
        assert!(best_by_metric(&none, |(_, s)| *s).is_none());
    }

    #[test]
    fn join_matches_on_day() {
        let ds = Dataset::from_csv_str(
            "state,date,cases\nNSW,2021-01-02,10\nNSW,2021-01-03,x\nVIC,2021-01-02,99\n",
        )
        .unwrap();
        let actuals = actuals_by_day(&ds, "state", "NSW", "date", "cases").unwrap();
        assert_eq!(actuals.len(), 1);

        let predictions = vec![
            BacktestPrediction {
                forecast_point: "2021-01-01T00:00:00Z".to_string(),
                timestamp: "2021-01-02T00:00:00.000000Z".to_string(),
                prediction: 8.0,
            },
            BacktestPrediction {
                forecast_point: "2021-01-01T00:00:00Z".to_string(),
                timestamp: "2021-01-03T00:00:00.000000Z".to_string(),
                prediction: 9.0,
            },
        ];
        let joined = join_actuals(&predictions, &actuals);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].actual, 10.0);
        assert_eq!(joined[0].prediction, 8.0);
    }
}
