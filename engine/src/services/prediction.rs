use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use vigil_models::{health_score, MetricsSnapshot};

/// Samples used for the moving-average forecast.
const SHORT_WINDOW: usize = 10;
/// Samples used for the least-squares trend fit.
const TREND_WINDOW: usize = 30;
/// Slope magnitude below which a series counts as stable.
const SLOPE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    Volatile,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Ordinary least-squares slope with the sample index as x.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|x| (x as f64) * (x as f64)).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        (n_f * sum_xy - sum_x * sum_y) / denominator
    }
}

/// Classify a series: volatile variance overrides the slope direction.
pub fn classify_series(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let mean = mean(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    if mean.abs() > f64::EPSILON && variance > 0.3 * mean.abs() {
        return Trend::Volatile;
    }

    let slope = ols_slope(values);
    if slope > SLOPE_EPSILON {
        Trend::Rising
    } else if slope < -SLOPE_EPSILON {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Rolling metrics history with short-horizon forecasting. Recording is
/// O(1) amortized; the history is FIFO-bounded.
pub struct TrendPredictor {
    history: RwLock<VecDeque<MetricsSnapshot>>,
    capacity: usize,
}

impl TrendPredictor {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    pub async fn record(&self, snapshot: MetricsSnapshot) {
        let mut history = self.history.write().await;
        history.push_back(snapshot);
        if history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }

    /// Forecast per resource for the given horizon. Empty until enough
    /// samples accumulate. The multipliers bias toward headroom: CPU and
    /// memory overshoot slightly, disk moves too slowly to inflate. With a
    /// full trend window the least-squares slope extends the forecast.
    pub async fn predict(&self, horizon_minutes: f64) -> HashMap<String, f64> {
        let history = self.history.read().await;
        if history.len() < SHORT_WINDOW {
            return HashMap::new();
        }

        let recent: Vec<&MetricsSnapshot> =
            history.iter().rev().take(SHORT_WINDOW).collect();
        let avg_of = |f: fn(&MetricsSnapshot) -> f64| {
            recent.iter().map(|s| f(s)).sum::<f64>() / recent.len() as f64
        };

        let mut predictions = HashMap::new();
        predictions.insert("cpu".to_string(), avg_of(|s| s.cpu_percent) * 1.10);
        predictions.insert("memory".to_string(), avg_of(|s| s.memory_percent) * 1.05);
        predictions.insert("disk".to_string(), avg_of(|s| s.disk_percent));
        predictions.insert(
            "response_time".to_string(),
            avg_of(|s| s.response_time_ms),
        );

        if history.len() >= TREND_WINDOW {
            let window: Vec<&MetricsSnapshot> = history
                .iter()
                .skip(history.len() - TREND_WINDOW)
                .collect();
            let cpu_series: Vec<f64> = window.iter().map(|s| s.cpu_percent).collect();
            let memory_series: Vec<f64> = window.iter().map(|s| s.memory_percent).collect();

            if let Some(cpu) = predictions.get_mut("cpu") {
                *cpu += ols_slope(&cpu_series) * horizon_minutes;
            }
            if let Some(memory) = predictions.get_mut("memory") {
                *memory += ols_slope(&memory_series) * horizon_minutes;
            }
        }

        predictions
    }

    /// Health score the system is heading toward. Falls back to the latest
    /// observed score while the forecast is still warming up, and to a
    /// perfect score with no data at all.
    pub async fn predict_health_score(&self, horizon_minutes: f64) -> f64 {
        let forecast = self.predict(horizon_minutes).await;
        let history = self.history.read().await;
        let Some(last) = history.back() else {
            return 100.0;
        };
        if forecast.is_empty() {
            return last.health_score;
        }

        health_score(
            forecast.get("cpu").copied().unwrap_or(last.cpu_percent),
            forecast
                .get("memory")
                .copied()
                .unwrap_or(last.memory_percent),
            forecast.get("disk").copied().unwrap_or(last.disk_percent),
            forecast
                .get("response_time")
                .copied()
                .unwrap_or(last.response_time_ms),
            last.error_rate,
        )
    }

    /// Trend classification for one of the forecast resources, used by
    /// reporting only.
    pub async fn trend_for(&self, resource: &str) -> Trend {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(TREND_WINDOW);
        let series: Vec<f64> = history
            .iter()
            .skip(start)
            .map(|s| match resource {
                "cpu" => s.cpu_percent,
                "memory" => s.memory_percent,
                "disk" => s.disk_percent,
                "response_time" => s.response_time_ms,
                _ => 0.0,
            })
            .collect();
        classify_series(&series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cpu: f64, memory: f64, disk: f64) -> MetricsSnapshot {
        MetricsSnapshot::new(cpu, memory, disk, 200.0, 0.0, 100.0, 10)
    }

    #[tokio::test]
    async fn test_no_forecast_until_enough_samples() {
        let predictor = TrendPredictor::new(1000);
        for _ in 0..9 {
            predictor.record(snapshot(50.0, 50.0, 50.0)).await;
        }
        assert!(predictor.predict(30.0).await.is_empty());

        predictor.record(snapshot(50.0, 50.0, 50.0)).await;
        assert!(!predictor.predict(30.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_moving_average_multipliers() {
        let predictor = TrendPredictor::new(1000);
        for _ in 0..10 {
            predictor.record(snapshot(50.0, 60.0, 70.0)).await;
        }
        let forecast = predictor.predict(30.0).await;
        assert!((forecast["cpu"] - 55.0).abs() < 1e-9);
        assert!((forecast["memory"] - 63.0).abs() < 1e-9);
        assert!((forecast["disk"] - 70.0).abs() < 1e-9);
        assert!((forecast["response_time"] - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_trend_slope_extends_forecast() {
        let predictor = TrendPredictor::new(1000);
        // Steadily climbing CPU, one point per sample.
        for i in 0..30 {
            predictor.record(snapshot(10.0 + i as f64, 50.0, 50.0)).await;
        }
        let flat = predictor.predict(0.0).await;
        let ahead = predictor.predict(30.0).await;
        // Slope is 1 per sample, so 30 minutes out adds about 30 points.
        assert!((ahead["cpu"] - flat["cpu"] - 30.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_history_is_bounded_fifo() {
        let predictor = TrendPredictor::new(1000);
        for i in 0..2000 {
            predictor.record(snapshot(i as f64 % 100.0, 50.0, 50.0)).await;
        }
        assert_eq!(predictor.len().await, 1000);

        // Oldest entries went first: the remaining front is sample 1000.
        let history = predictor.history.read().await;
        assert_eq!(history.front().unwrap().cpu_percent, 1000.0 % 100.0);
        assert_eq!(history.back().unwrap().cpu_percent, 1999.0 % 100.0);
    }

    #[test]
    fn test_classify_series() {
        // Gentle ramps: steep enough for the slope test, calm enough to
        // stay under the volatility cutoff.
        let rising: Vec<f64> = (0..30).map(|i| 50.0 + i as f64 * 0.2).collect();
        assert_eq!(classify_series(&rising), Trend::Rising);

        let falling: Vec<f64> = (0..30).map(|i| 80.0 - i as f64 * 0.2).collect();
        assert_eq!(classify_series(&falling), Trend::Falling);

        let stable = vec![50.0; 30];
        assert_eq!(classify_series(&stable), Trend::Stable);

        // Alternating extremes: variance dwarfs the mean.
        let volatile: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 5.0 } else { 95.0 })
            .collect();
        assert_eq!(classify_series(&volatile), Trend::Volatile);
    }

    #[tokio::test]
    async fn test_predicted_health_with_no_data_is_perfect() {
        let predictor = TrendPredictor::new(1000);
        assert_eq!(predictor.predict_health_score(60.0).await, 100.0);
    }

    #[tokio::test]
    async fn test_predicted_health_degrades_with_load() {
        let predictor = TrendPredictor::new(1000);
        for _ in 0..10 {
            predictor.record(snapshot(98.0, 98.0, 98.0)).await;
        }
        let predicted = predictor.predict_health_score(60.0).await;
        assert!(predicted < 70.0);
        assert!(predicted > 0.0);
    }
}
