//! 📊 Progress: how far along is the file, and what did the flow actually do.
//!
//! 🎬 *[a tab-separated file, mid-read. a progress bar, mid-render.]*
//! *["Are we there yet?" asks the operator. The bar answers in percent.]*
//!
//! Two halves:
//! - `ProgressMetrics`: the live source-side bar (bytes, tuples, rates, ETA), rendered
//!   through indicatif with a comfy-table message block.
//! - `FlowCounters` / `FlowStats`: atomics every worker bumps, and the plain snapshot
//!   `Flow::complete()` hands back. The snapshot prints as a summary table.
//!
//! 🦆

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: u64 = 1024 * 1024;

/// 📏 Pick a unit based on the size of the whole file, so the numbers don't jitter units mid-run.
fn format_bytes(bytes: u64, file_size: u64) -> String {
    if file_size >= 512 * MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if file_size >= MIB {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 1234567 → "1,234,567"
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    tuples_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Live progress for one source. Owned by the source, updated once per batch.
pub(crate) struct ProgressMetrics {
    source_name: String,
    total_size: u64,
    total_bytes: u64,
    total_tuples: u64,
    progress_bar: ProgressBar,
    /// 🪟 (when, bytes so far, tuples so far), trimmed to a 5 second window
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_tuples", &self.total_tuples)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(source_name: String, total_size: u64) -> Self {
        let progress_bar = ProgressBar::new(total_size);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name,
            total_size,
            total_bytes: 0,
            total_tuples: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    pub(crate) fn update(&mut self, bytes_read: u64, tuples_read: u64) {
        self.total_bytes += bytes_read;
        self.total_tuples += tuples_read;
        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.total_bytes);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_tuples));

        if let Some(&(oldest_time, oldest_bytes, oldest_tuples)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let tuples_delta = self.total_tuples.saturating_sub(oldest_tuples);
                return Rates {
                    tuples_per_sec: tuples_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }
        Rates {
            tuples_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    fn render(&self, rates: Rates) {
        let percent = if self.total_size > 0 {
            (self.total_bytes as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        };
        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            let remaining_secs = elapsed.as_secs_f64() / (percent / 100.0) - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Tuples/s", format_number(rates.tuples_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Tuples", format_number(self.total_tuples)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {}",
                format_bytes(self.total_bytes, self.total_size),
                format_bytes(self.total_size, self.total_size)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining ({:.2}%)", remaining, percent))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

/// 🧮 Shared flow counters. Every worker holds an `Arc` and bumps what it did.
#[derive(Debug, Default)]
pub(crate) struct FlowCounters {
    tuples_read: AtomicU64,
    documents_written: AtomicU64,
    bulk_requests: AtomicU64,
    bytes_sent: AtomicU64,
    retries: AtomicU64,
    indices: Mutex<BTreeSet<String>>,
}

impl FlowCounters {
    pub(crate) fn add_tuples_read(&self, n: u64) {
        self.tuples_read.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_documents_written(&self, n: u64) {
        self.documents_written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_request(&self, bytes: u64) {
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn touch_index(&self, index: &str) {
        let mut indices = self.indices.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !indices.contains(index) {
            indices.insert(index.to_string());
        }
    }

    pub(crate) fn snapshot(&self, elapsed: Duration) -> FlowStats {
        let indices = self
            .indices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        FlowStats {
            tuples_read: self.tuples_read.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            bulk_requests: self.bulk_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            indices,
            elapsed,
        }
    }
}

/// 📋 What a completed flow did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStats {
    pub tuples_read: u64,
    pub documents_written: u64,
    /// 📡 Requests sent to the sink, retries included.
    pub bulk_requests: u64,
    pub bytes_sent: u64,
    pub retries: u64,
    /// 🗂️ Every index a document was written to, sorted.
    pub indices: Vec<String>,
    pub elapsed: Duration,
}

impl fmt::Display for FlowStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        let rows = [
            ("tuples read", format_number(self.tuples_read)),
            ("documents written", format_number(self.documents_written)),
            ("requests", format_number(self.bulk_requests)),
            ("bytes sent", format_number(self.bytes_sent)),
            ("retries", format_number(self.retries)),
            ("elapsed", format_duration(self.elapsed)),
            (
                "indices",
                if self.indices.is_empty() {
                    "-".to_string()
                } else {
                    self.indices.join(", ")
                },
            ),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label).set_alignment(CellAlignment::Right),
                Cell::new(value),
            ]);
        }
        write!(f, "{}", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_drop_hours_when_they_can() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn the_one_where_counters_become_a_snapshot() {
        let counters = FlowCounters::default();
        counters.add_tuples_read(12);
        counters.add_documents_written(12);
        counters.add_request(2048);
        counters.add_retry();
        counters.touch_index("pattern-12");
        counters.touch_index("pattern-1");
        counters.touch_index("pattern-12");

        let stats = counters.snapshot(Duration::from_secs(1));
        assert_eq!(stats.tuples_read, 12);
        assert_eq!(stats.bulk_requests, 1);
        assert_eq!(stats.bytes_sent, 2048);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.indices, ["pattern-1", "pattern-12"]);
        assert!(stats.to_string().contains("pattern-1, pattern-12"));
    }

    #[test]
    fn the_one_where_the_progress_bar_survives_an_unknown_size() {
        let mut metrics = ProgressMetrics::new("artists.dat".into(), 0);
        metrics.update(100, 3);
        metrics.finish();
        assert_eq!(metrics.total_tuples, 3);
    }
}
