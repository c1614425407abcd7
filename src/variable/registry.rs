//! Sharded name table of exposed variables.

use crate::core::{Result, TallyError};
use crate::export::{ReportedVariable, StatsReporter};
use crate::sampler::SeriesOptions;
use crate::variable::filter::WildcardFilter;
use crate::variable::name::to_underscored_name;
use crate::variable::scope::Scope;
use crate::variable::{describe_to_string, Exposure, Variable, VariableKind};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

const SHARD_COUNT: usize = 32;

struct Entry {
    token: u64,
    var: Weak<dyn Variable>,
    help: String,
    scope: Arc<Scope>,
}

type Shard = RwLock<FxHashMap<String, Entry>>;

static SHARDS: Lazy<[Shard; SHARD_COUNT]> =
    Lazy::new(|| std::array::from_fn(|_| RwLock::new(FxHashMap::default())));

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn shard_of(name: &str) -> &'static Shard {
    let mut h: usize = 0;
    for b in name.bytes() {
        h = h.wrapping_mul(5).wrapping_add(usize::from(b));
    }
    &SHARDS[h & (SHARD_COUNT - 1)]
}

pub(crate) fn insert(
    scope: &Arc<Scope>,
    name: &str,
    help: &str,
    var: Weak<dyn Variable>,
) -> Result<Exposure> {
    let normalized = to_underscored_name(name);
    if normalized.is_empty() {
        return Err(TallyError::invalid_argument("variable name is empty"));
    }
    let full = scope.fully_qualified_name(&normalized);
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);

    let mut shard = shard_of(&full).write();
    if let Some(existing) = shard.get(&full) {
        // A dead variable whose drop has not reached us yet does not count.
        if existing.var.strong_count() > 0 {
            return Err(TallyError::already_exists(full));
        }
    }
    shard.insert(
        full.clone(),
        Entry {
            token,
            var,
            help: help.to_string(),
            scope: Arc::clone(scope),
        },
    );
    Ok(Exposure { name: full, token })
}

pub(crate) fn remove(name: &str, token: u64) {
    let mut shard = shard_of(name).write();
    if shard.get(name).map_or(false, |entry| entry.token == token) {
        shard.remove(name);
        tracing::debug!(name, "variable hidden");
    }
}

// Skips entries whose variable is gone but whose Exposure has not dropped yet.
fn live_entries(shard: &FxHashMap<String, Entry>) -> impl Iterator<Item = (&String, &Entry)> {
    shard.iter().filter(|(_, entry)| entry.var.strong_count() > 0)
}

/// The live variable exposed as `name`.
pub fn find_exposed(name: &str) -> Option<Arc<dyn Variable>> {
    let shard = shard_of(name).read();
    shard.get(name).and_then(|entry| entry.var.upgrade())
}

/// Help text of the variable exposed as `name`.
pub fn help_of(name: &str) -> Option<String> {
    let shard = shard_of(name).read();
    shard.get(name).map(|entry| entry.help.clone())
}

/// Sorted names of exposed variables, optionally filtered by a wildcard
/// list such as `*latency*;*qps`.
pub fn list_exposed(filter: Option<&str>) -> Result<Vec<String>> {
    let filter = filter.map(WildcardFilter::new).transpose()?;
    let mut names = Vec::new();
    for shard in SHARDS.iter() {
        let shard = shard.read();
        names.extend(
            live_entries(&shard)
                .filter(|(name, _)| filter.as_ref().map_or(true, |f| f.matches(name)))
                .map(|(name, _)| name.clone()),
        );
    }
    names.sort();
    Ok(names)
}

/// Number of exposed variables.
pub fn count_exposed() -> usize {
    SHARDS.iter().map(|shard| live_entries(&shard.read()).count()).sum()
}

/// Current value of `name` as text.
pub fn describe_exposed(name: &str, quote_string: bool) -> Result<String> {
    let var = find_exposed(name).ok_or_else(|| TallyError::not_found(name))?;
    let mut out = String::new();
    var.describe(&mut out, quote_string)?;
    Ok(out)
}

/// Trend of `name`; Unavailable when it keeps no series.
pub fn describe_series_exposed(name: &str, options: &SeriesOptions) -> Result<String> {
    let var = find_exposed(name).ok_or_else(|| TallyError::not_found(name))?;
    let mut out = String::new();
    var.describe_series(&mut out, options)?;
    Ok(out)
}

/// Counts of what one [`report`] sweep visited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportState {
    /// Variables visited.
    pub total: usize,
    /// Counters reported.
    pub counter_count: usize,
    /// Gauges reported.
    pub gauge_count: usize,
    /// Histograms reported.
    pub histogram_count: usize,
    /// Variables with no metric form.
    pub no_metric_count: usize,
    /// Dropped by the reporter's allow or block list
    pub discard_count: usize,
}

struct Snapshot {
    name: String,
    help: String,
    scope: Arc<Scope>,
    var: Arc<dyn Variable>,
}

/// Hand every exposed variable to `reporter` once, then flush it.
///
/// Each shard is copied under its read lock; variables are reported with no
/// registry lock held.
pub fn report(reporter: &mut dyn StatsReporter, stamp: SystemTime) -> ReportState {
    let mut state = ReportState::default();
    for shard in SHARDS.iter() {
        let snapshot: Vec<Snapshot> = {
            let shard = shard.read();
            shard
                .iter()
                .filter_map(|(name, entry)| {
                    entry.var.upgrade().map(|var| Snapshot {
                        name: name.clone(),
                        help: entry.help.clone(),
                        scope: Arc::clone(&entry.scope),
                        var,
                    })
                })
                .collect()
        };

        for item in snapshot {
            state.total += 1;
            if !reporter.options().allow_report(&item.name) {
                state.discard_count += 1;
                continue;
            }
            match item.var.kind() {
                VariableKind::Counter => state.counter_count += 1,
                VariableKind::Gauge => state.gauge_count += 1,
                VariableKind::Histogram => state.histogram_count += 1,
                VariableKind::Status | VariableKind::Cdf => state.no_metric_count += 1,
            }
            let reported = ReportedVariable {
                name: &item.name,
                help: &item.help,
                tags: item.scope.tags(),
                variable: item.var.as_ref(),
            };
            reporter.report_variable(&reported, stamp);
        }
    }
    reporter.flush();
    tracing::debug!(total = state.total, discarded = state.discard_count, "report finished");
    state
}

/// Text of every exposed variable matching `filter`, one `name : value` per line.
pub fn dump_exposed(filter: Option<&str>, quote_string: bool) -> Result<String> {
    let mut out = String::new();
    for name in list_exposed(filter)? {
        if let Some(var) = find_exposed(&name) {
            out.push_str(&name);
            out.push_str(" : ");
            out.push_str(&describe_to_string(var.as_ref(), quote_string));
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_spread() {
        let a = shard_of("a") as *const Shard;
        let b = shard_of("b") as *const Shard;
        assert_ne!(a, b);
        assert_eq!(shard_of("abc") as *const Shard, shard_of("abc") as *const Shard);
    }

    struct Idle;

    impl Variable for Idle {
        fn kind(&self) -> VariableKind {
            VariableKind::Gauge
        }

        fn describe(&self, out: &mut dyn std::fmt::Write, _quote_string: bool) -> std::fmt::Result {
            out.write_str("0")
        }
    }

    fn entry(var: Weak<dyn Variable>) -> Entry {
        Entry {
            token: 0,
            var,
            help: String::new(),
            scope: Scope::root(),
        }
    }

    #[test]
    fn test_dead_entries_are_not_live() {
        let alive: Arc<dyn Variable> = Arc::new(Idle);
        let dead: Weak<dyn Variable> = {
            let gone: Arc<dyn Variable> = Arc::new(Idle);
            Arc::downgrade(&gone)
        };
        let mut shard = FxHashMap::default();
        shard.insert("alive".to_string(), entry(Arc::downgrade(&alive)));
        shard.insert("dead".to_string(), entry(dead));

        let names: Vec<&String> = live_entries(&shard).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alive"]);
    }

    #[test]
    fn test_unknown_name() {
        let err = describe_exposed("registry_test_missing", false).unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));
        assert!(find_exposed("registry_test_missing").is_none());
    }
}
