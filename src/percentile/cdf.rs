//! Cumulative distribution view of a percentile window.

use crate::percentile::PercentileSamples;
use crate::variable::{Exposable, ExposeSlot, Variable, VariableKind};
use std::fmt;
use std::sync::{Arc, Weak};

type SamplesFn = Box<dyn Fn() -> PercentileSamples + Send + Sync>;

struct CdfInner {
    source: SamplesFn,
    exposure: ExposeSlot,
}

/// Describes the samples from `source` as CDF points for plotting.
///
/// Points are `[10, p10]` through `[90, p90]`, then each percent from 91 to
/// 99. Keys 100 and 101 carry p99.9 and p99.99.
pub struct PercentileCdf {
    inner: Arc<CdfInner>,
}

impl Clone for PercentileCdf {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl PercentileCdf {
    /// CDF over whatever `source` returns when described.
    pub fn new<F>(source: F) -> Self
    where
        F: Fn() -> PercentileSamples + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CdfInner {
                source: Box::new(source),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// `(key, value)` pairs in the order they are described.
    pub fn points(&self) -> Vec<(u32, i64)> {
        cdf_points(&(self.inner.source)())
    }
}

fn cdf_points(samples: &PercentileSamples) -> Vec<(u32, i64)> {
    let mut points = Vec::with_capacity(20);
    for key in (10..=90).step_by(10).chain(91..=99) {
        points.push((key, samples.get_number(f64::from(key) / 100.0)));
    }
    points.push((100, samples.get_number(0.999)));
    points.push((101, samples.get_number(0.9999)));
    points
}

impl Variable for CdfInner {
    fn kind(&self) -> VariableKind {
        VariableKind::Cdf
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        out.write_str("{\"label\":\"cdf\",\"data\":[")?;
        for (i, (key, value)) in cdf_points(&(self.source)()).into_iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, "[{},{}]", key, value)?;
        }
        out.write_str("]}")
    }
}

impl Exposable for PercentileCdf {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<CdfInner> = Arc::downgrade(&self.inner);
        weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_layout() {
        let cdf = PercentileCdf::new(|| {
            let mut samples = PercentileSamples::new();
            for v in 1..=100 {
                samples.add(v);
            }
            samples
        });
        let points = cdf.points();
        let keys: Vec<u32> = points.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.len(), 20);
        assert_eq!(&keys[..3], &[10, 20, 30]);
        assert_eq!(&keys[9..11], &[91, 92]);
        assert_eq!(&keys[18..], &[100, 101]);
        assert!((10..=11).contains(&points[0].1));
        assert!((90..=91).contains(&points[8].1));
        assert!(points.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_describe_empty() {
        let cdf = PercentileCdf::new(PercentileSamples::new);
        let mut out = String::new();
        cdf.inner.describe(&mut out, false).unwrap();
        assert!(out.starts_with("{\"label\":\"cdf\",\"data\":[[10,0],[20,0],"));
        assert!(out.ends_with("[100,0],[101,0]]}"));
    }
}
