//! Trend of a numeric variable over the last 30 days.
//!
//! One point per second for the last minute, then one per minute, hour and
//! day. Coarser points fold sixty (or 24, or 30) finer ones with the
//! variable's [`SeriesFold`].

use crate::combiner::SeriesFold;
use crate::sampler::{schedule, Sampler, SamplerHandle};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

const SECONDS: usize = 60;
const MINUTES: usize = 60;
const HOURS: usize = 24;
const DAYS: usize = 30;

/// Rendering options for [`Series::describe`].
#[derive(Debug, Clone, Default)]
pub struct SeriesOptions {
    /// Render only the last minute of per-second points
    pub seconds_only: bool,
}

/// Fixed-size multi-resolution history.
#[derive(Debug, Clone)]
pub struct Series {
    fold: SeriesFold,
    second: [f64; SECONDS],
    minute: [f64; MINUTES],
    hour: [f64; HOURS],
    day: [f64; DAYS],
    nsecond: usize,
    nminute: usize,
    nhour: usize,
    nday: usize,
}

impl Series {
    /// Empty series rolling points up with `fold`.
    pub fn new(fold: SeriesFold) -> Self {
        Self {
            fold,
            second: [0.0; SECONDS],
            minute: [0.0; MINUTES],
            hour: [0.0; HOURS],
            day: [0.0; DAYS],
            nsecond: 0,
            nminute: 0,
            nhour: 0,
            nday: 0,
        }
    }

    /// Record the newest per-second point.
    pub fn append(&mut self, value: f64) {
        self.second[self.nsecond] = value;
        self.nsecond += 1;
        if self.nsecond < SECONDS {
            return;
        }
        self.nsecond = 0;
        let value = self.roll_up(&self.second);
        self.minute[self.nminute] = value;
        self.nminute += 1;
        if self.nminute < MINUTES {
            return;
        }
        self.nminute = 0;
        let value = self.roll_up(&self.minute);
        self.hour[self.nhour] = value;
        self.nhour += 1;
        if self.nhour < HOURS {
            return;
        }
        self.nhour = 0;
        let value = self.roll_up(&self.hour);
        self.day[self.nday] = value;
        self.nday = (self.nday + 1) % DAYS;
    }

    #[allow(clippy::cast_precision_loss)]
    fn roll_up(&self, points: &[f64]) -> f64 {
        match self.fold {
            SeriesFold::Average => points.iter().sum::<f64>() / points.len() as f64,
            SeriesFold::Max => points.iter().copied().fold(f64::MIN, f64::max),
            SeriesFold::Min => points.iter().copied().fold(f64::MAX, f64::min),
        }
    }

    /// The last 60 per-second points, oldest first.
    pub fn seconds(&self) -> Vec<f64> {
        (0..SECONDS)
            .map(|i| self.second[(i + self.nsecond) % SECONDS])
            .collect()
    }

    /// Write `{"label":"trend","data":[[0,v],...]}`, oldest point first.
    pub fn describe(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> fmt::Result {
        out.write_str("{\"label\":\"trend\",\"data\":[")?;
        let mut order = 0usize;
        if !options.seconds_only {
            write_ring(out, &mut order, &self.day, self.nday)?;
            write_ring(out, &mut order, &self.hour, self.nhour)?;
            write_ring(out, &mut order, &self.minute, self.nminute)?;
        }
        write_ring(out, &mut order, &self.second, self.nsecond)?;
        out.write_str("]}")
    }
}

fn write_ring(out: &mut dyn fmt::Write, order: &mut usize, ring: &[f64], head: usize) -> fmt::Result {
    for i in 0..ring.len() {
        if *order > 0 {
            out.write_char(',')?;
        }
        write!(out, "[{},{}]", order, ring[(i + head) % ring.len()])?;
        *order += 1;
    }
    Ok(())
}

/// Appends one point per period from a numeric source.
pub struct SeriesSampler {
    source: Box<dyn Fn() -> Option<f64> + Send + Sync>,
    series: Mutex<Series>,
}

impl SeriesSampler {
    /// Schedule a series fed by `source`.
    pub fn schedule<S>(source: S, fold: SeriesFold) -> (Arc<SeriesSampler>, SamplerHandle)
    where
        S: Fn() -> Option<f64> + Send + Sync + 'static,
    {
        let sampler = Arc::new(SeriesSampler {
            source: Box::new(source),
            series: Mutex::new(Series::new(fold)),
        });
        let handle = schedule(Arc::clone(&sampler) as Arc<dyn Sampler>);
        (sampler, handle)
    }

    /// Render the series.
    pub fn describe(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> fmt::Result {
        self.series.lock().describe(out, options)
    }

    /// Copy of the current series.
    pub fn snapshot(&self) -> Series {
        self.series.lock().clone()
    }
}

impl Sampler for SeriesSampler {
    fn take_sample(&self) {
        if let Some(value) = (self.source)() {
            self.series.lock().append(value);
        }
    }
}
