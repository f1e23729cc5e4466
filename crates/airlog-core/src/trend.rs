//! Trend ring buffers feeding the on-device graph
//!
//! Five series (one per tracked metric) advance together on every sample and
//! share a single head index and "filled" flag. Until the buffers wrap for the
//! first time only `[0, head)` holds data; afterwards the whole ring does, with
//! the oldest value at `head`.

use crate::sensors::SensorReading;

/// Samples kept per series; one per graph column.
pub const TREND_LEN: usize = 100;

/// Minimum vertical span of the graph scale.
pub const MIN_SCALE_SPAN: f32 = 2.0;

/// Metrics tracked by the trend buffers, in graph cycling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Iaq,
    Co2,
    Temperature,
    Humidity,
    Pressure,
}

impl Metric {
    pub const COUNT: usize = 5;

    pub const ALL: [Metric; Self::COUNT] = [
        Metric::Iaq,
        Metric::Co2,
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::Iaq => 0,
            Self::Co2 => 1,
            Self::Temperature => 2,
            Self::Humidity => 3,
            Self::Pressure => 4,
        }
    }

    /// Next metric, wrapping around after pressure.
    pub const fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::COUNT]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Iaq => "IAQ",
            Self::Co2 => "CO2",
            Self::Temperature => "TEMP",
            Self::Humidity => "HUM",
            Self::Pressure => "PRESS",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Iaq => "",
            Self::Co2 => "ppm",
            Self::Temperature => "C",
            Self::Humidity => "%",
            Self::Pressure => "Pa",
        }
    }

    /// Current value of this metric in a reading.
    pub fn value(self, reading: &SensorReading) -> f32 {
        match self {
            Self::Iaq => reading.iaq,
            Self::Co2 => reading.co2,
            Self::Temperature => reading.temperature,
            Self::Humidity => reading.humidity,
            Self::Pressure => reading.pressure,
        }
    }
}

/// Vertical scale of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendScale {
    pub min: f32,
    pub max: f32,
}

impl TrendScale {
    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

/// Ring buffers for every [`Metric`].
pub struct TrendBuffers {
    series: [[f32; TREND_LEN]; Metric::COUNT],
    head: usize,
    filled: bool,
}

impl Default for TrendBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendBuffers {
    pub const fn new() -> Self {
        Self {
            series: [[0.0; TREND_LEN]; Metric::COUNT],
            head: 0,
            filled: false,
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Number of valid samples per series.
    pub fn len(&self) -> usize {
        if self.filled { TREND_LEN } else { self.head }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every series by one sample.
    pub fn push(&mut self, reading: &SensorReading) {
        for metric in Metric::ALL {
            self.series[metric.index()][self.head] = metric.value(reading);
        }
        self.head += 1;
        if self.head >= TREND_LEN {
            self.head = 0;
            self.filled = true;
        }
    }

    /// Valid samples of a series, oldest first.
    pub fn iter(&self, metric: Metric) -> impl Iterator<Item = f32> + '_ {
        let series = &self.series[metric.index()];
        let start = if self.filled { self.head } else { 0 };
        (0..self.len()).map(move |i| series[(start + i) % TREND_LEN])
    }

    /// Raw min/max over the valid range of a series.
    pub fn min_max(&self, metric: Metric) -> Option<(f32, f32)> {
        self.iter(metric).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((if v < lo { v } else { lo }, if v > hi { v } else { hi })),
        })
    }

    /// Graph scale for a series: min/max of the valid range, padded
    /// symmetrically when the span is too small to draw anything but a
    /// flat line. `None` while the series is empty.
    pub fn scale(&self, metric: Metric) -> Option<TrendScale> {
        let (min, max) = self.min_max(metric)?;
        if max - min < MIN_SCALE_SPAN {
            let pad = MIN_SCALE_SPAN / 2.0;
            Some(TrendScale {
                min: min - pad,
                max: max + pad,
            })
        } else {
            Some(TrendScale { min, max })
        }
    }
}
