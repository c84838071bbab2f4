use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detection::DropletMetrics;
use crate::error::{DetectorError, Result};
use crate::ring_buffer::RingBuffer;

/// Export column order.
pub const RAW_COLUMNS: [&str; 12] = [
    "timestamp_ms",
    "frame_id",
    "radius_px",
    "radius_um",
    "area_px",
    "area_um2",
    "x_center_px",
    "y_center_px",
    "major_axis_px",
    "major_axis_um",
    "equivalent_diameter_px",
    "equivalent_diameter_um",
];

/// Text layout of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated.
    Csv,
    /// Tab separated.
    Txt,
}

impl ExportFormat {
    pub fn delimiter(&self) -> char {
        match self {
            Self::Csv => ',',
            Self::Txt => '\t',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            _ => Err(DetectorError::UnsupportedExportFormat(s.to_string())),
        }
    }
}

/// One exported droplet measurement, values rounded to two decimals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp_ms: u64,
    pub frame_id: u64,
    pub radius_px: f64,
    pub radius_um: f64,
    pub area_px: f64,
    pub area_um2: f64,
    pub x_center_px: f64,
    pub y_center_px: f64,
    pub major_axis_px: f64,
    pub major_axis_um: f64,
    pub equivalent_diameter_px: f64,
    pub equivalent_diameter_um: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl RawRecord {
    pub fn from_metrics(metrics: &DropletMetrics, timestamp_ms: u64, frame_id: u64) -> Self {
        Self {
            timestamp_ms,
            frame_id,
            radius_px: round2(metrics.radius_px()),
            radius_um: round2(metrics.radius_um()),
            area_px: round2(metrics.area_px),
            area_um2: round2(metrics.area_um2),
            x_center_px: round2(metrics.centroid.0),
            y_center_px: round2(metrics.centroid.1),
            major_axis_px: round2(metrics.major_axis_px),
            major_axis_um: round2(metrics.major_axis_um),
            equivalent_diameter_px: round2(metrics.equivalent_diameter_px),
            equivalent_diameter_um: round2(metrics.equivalent_diameter_um),
        }
    }

    fn write_row(&self, out: &mut String, delimiter: char) {
        let floats = [
            self.radius_px,
            self.radius_um,
            self.area_px,
            self.area_um2,
            self.x_center_px,
            self.y_center_px,
            self.major_axis_px,
            self.major_axis_um,
            self.equivalent_diameter_px,
            self.equivalent_diameter_um,
        ];
        let _ = write!(out, "{}{delimiter}{}", self.timestamp_ms, self.frame_id);
        for v in floats {
            let _ = write!(out, "{delimiter}{v:.2}");
        }
        out.push('\n');
    }
}

/// Capped FIFO of raw measurements; the oldest records go first.
#[derive(Clone, Debug)]
pub struct RawMeasurementLog {
    records: RingBuffer<RawRecord>,
}

impl RawMeasurementLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RingBuffer::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    /// Append one record per droplet of a frame.
    pub fn extend_from_metrics(&mut self, metrics: &[DropletMetrics], timestamp_ms: u64, frame_id: u64) {
        self.records.extend(
            metrics
                .iter()
                .map(|m| RawRecord::from_metrics(m, timestamp_ms, frame_id)),
        );
    }

    /// Change the cap, keeping the most recent records.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity() {
            return;
        }
        let mut resized = RingBuffer::new(capacity);
        resized.extend(self.records.iter().copied());
        self.records = resized;
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> Vec<RawRecord> {
        self.records.to_vec()
    }

    pub fn oldest(&self) -> Option<&RawRecord> {
        self.records.front()
    }

    pub fn newest(&self) -> Option<&RawRecord> {
        self.records.back()
    }

    /// Render the log as delimited text with a header row. `None` when the
    /// log is empty.
    pub fn export(&self, format: ExportFormat) -> Option<String> {
        if self.records.is_empty() {
            return None;
        }
        let delimiter = format.delimiter();
        let mut out = String::with_capacity(64 * (self.records.len() + 1));
        for (i, column) in RAW_COLUMNS.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            out.push_str(column);
        }
        out.push('\n');
        for record in self.records.iter() {
            record.write_row(&mut out, delimiter);
        }
        Some(out)
    }
}
