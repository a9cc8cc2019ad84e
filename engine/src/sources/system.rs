use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rand::Rng;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tokio::sync::Mutex;

use vigil_models::{DiskUsage, SystemReading};

use super::{MetricsSource, SourceError};

/// Rolling window of response-time samples.
#[derive(Debug)]
struct ResponseWindow {
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl ResponseWindow {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples,
        }
    }

    fn add_sample(&mut self, response_time_ms: f64) {
        self.samples.push_back(response_time_ms);
        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Application-level counters the host feeds as it serves traffic.
/// Draining happens once per sampling pass, so error rate and throughput
/// describe the interval since the previous sample.
pub struct AppMetricsFeed {
    request_count: AtomicU64,
    error_count: AtomicU64,
    active_users: AtomicU64,
    window: parking_lot::Mutex<ResponseWindow>,
    window_started: parking_lot::Mutex<Instant>,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowStats {
    pub error_rate: f64,
    pub avg_response_ms: f64,
    pub throughput: f64,
    pub active_users: u64,
}

impl AppMetricsFeed {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            active_users: AtomicU64::new(0),
            window: parking_lot::Mutex::new(ResponseWindow::new(1000)),
            window_started: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn record_request(&self, duration_ms: f64, is_error: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.window.lock().add_sample(duration_ms);
    }

    pub fn set_active_users(&self, count: u64) {
        self.active_users.store(count, Ordering::Relaxed);
    }

    /// Consume the current window and start a fresh one.
    pub fn drain(&self) -> WindowStats {
        let requests = self.request_count.swap(0, Ordering::Relaxed);
        let errors = self.error_count.swap(0, Ordering::Relaxed);
        let avg_response_ms = {
            let mut window = self.window.lock();
            let avg = window.avg();
            window.clear();
            avg
        };
        let elapsed_secs = {
            let mut started = self.window_started.lock();
            let elapsed = started.elapsed().as_secs_f64();
            *started = Instant::now();
            elapsed
        };

        WindowStats {
            error_rate: if requests > 0 {
                (errors as f64 / requests as f64).min(1.0)
            } else {
                0.0
            },
            avg_response_ms,
            throughput: if elapsed_secs > 0.0 {
                requests as f64 / elapsed_secs
            } else {
                0.0
            },
            active_users: self.active_users.load(Ordering::Relaxed),
        }
    }
}

impl Default for AppMetricsFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics source backed by sysinfo for host readings and an
/// [`AppMetricsFeed`] for the application-level figures.
pub struct SysinfoMetricsSource {
    system: Mutex<System>,
    feed: Arc<AppMetricsFeed>,
}

impl SysinfoMetricsSource {
    pub fn new(feed: Arc<AppMetricsFeed>) -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            feed,
        }
    }
}

#[async_trait]
impl MetricsSource for SysinfoMetricsSource {
    async fn sample(&self) -> Result<SystemReading, SourceError> {
        let (cpu_percent, memory_percent, disks) = {
            let mut system = self.system.lock().await;
            system.refresh_cpu();
            system.refresh_memory();
            system.refresh_disks();

            if system.cpus().is_empty() {
                return Err(SourceError::Unavailable("no CPUs reported".to_string()));
            }
            let cpu_percent = f64::from(system.global_cpu_info().cpu_usage());

            let total_memory = system.total_memory();
            if total_memory == 0 {
                return Err(SourceError::Unavailable("no memory reported".to_string()));
            }
            let memory_percent = system.used_memory() as f64 / total_memory as f64 * 100.0;

            let disks = system
                .disks()
                .iter()
                .filter(|disk| disk.total_space() > 0)
                .map(|disk| DiskUsage {
                    mount_point: disk.mount_point().to_string_lossy().into_owned(),
                    percent: (disk.total_space() - disk.available_space()) as f64
                        / disk.total_space() as f64
                        * 100.0,
                })
                .collect::<Vec<_>>();

            (cpu_percent, memory_percent, disks)
        };

        let stats = self.feed.drain();

        Ok(SystemReading {
            cpu_percent,
            memory_percent,
            disks,
            response_time_ms: stats.avg_response_ms,
            error_rate: stats.error_rate,
            throughput: stats.throughput,
            active_users: stats.active_users,
        })
    }
}

/// Scripted metrics source for tests and for running the engine without
/// touching the host. Pops queued readings in order, then keeps repeating
/// the last one; with nothing queued it produces jittered idle readings.
pub struct SimulatedMetricsSource {
    queue: parking_lot::Mutex<VecDeque<SystemReading>>,
    last: parking_lot::Mutex<Option<SystemReading>>,
    fail_next: AtomicBool,
}

impl SimulatedMetricsSource {
    pub fn new() -> Self {
        Self {
            queue: parking_lot::Mutex::new(VecDeque::new()),
            last: parking_lot::Mutex::new(None),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn with_reading(reading: SystemReading) -> Self {
        let source = Self::new();
        source.push(reading);
        source
    }

    pub fn push(&self, reading: SystemReading) {
        self.queue.lock().push_back(reading);
    }

    /// Make the next sample fail, simulating an unreachable source.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }

    fn idle_reading() -> SystemReading {
        let mut rng = rand::thread_rng();
        SystemReading {
            cpu_percent: rng.gen_range(5.0..25.0),
            memory_percent: rng.gen_range(30.0..50.0),
            disks: vec![DiskUsage {
                mount_point: "/".to_string(),
                percent: rng.gen_range(40.0..55.0),
            }],
            response_time_ms: rng.gen_range(150.0..250.0),
            error_rate: rng.gen_range(0.0..0.01),
            throughput: rng.gen_range(80.0..120.0),
            active_users: rng.gen_range(5..15),
        }
    }
}

impl Default for SimulatedMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SimulatedMetricsSource {
    async fn sample(&self) -> Result<SystemReading, SourceError> {
        if self.fail_next.swap(false, Ordering::Relaxed) {
            return Err(SourceError::Unavailable("simulated outage".to_string()));
        }

        let next = self.queue.lock().pop_front();
        let reading = match next {
            Some(reading) => {
                *self.last.lock() = Some(reading.clone());
                reading
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(Self::idle_reading),
        };
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_drain_resets_window() {
        let feed = AppMetricsFeed::new();
        feed.record_request(100.0, false);
        feed.record_request(200.0, true);
        feed.set_active_users(7);

        let stats = feed.drain();
        assert!((stats.error_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_response_ms - 150.0).abs() < 1e-9);
        assert_eq!(stats.active_users, 7);

        // Second drain sees an empty window.
        let stats = feed.drain();
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.avg_response_ms, 0.0);
    }

    #[tokio::test]
    async fn test_simulated_source_replays_then_repeats() {
        let source = SimulatedMetricsSource::new();
        source.push(SystemReading {
            cpu_percent: 96.0,
            memory_percent: 50.0,
            disks: vec![],
            response_time_ms: 200.0,
            error_rate: 0.0,
            throughput: 100.0,
            active_users: 10,
        });

        let first = source.sample().await.unwrap();
        assert_eq!(first.cpu_percent, 96.0);
        // Queue drained; the last reading repeats.
        let second = source.sample().await.unwrap();
        assert_eq!(second.cpu_percent, 96.0);
    }

    #[tokio::test]
    async fn test_simulated_source_failure() {
        let source = SimulatedMetricsSource::new();
        source.fail_next();
        assert!(source.sample().await.is_err());
        assert!(source.sample().await.is_ok());
    }
}
