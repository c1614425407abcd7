//! Free-form status values.

use crate::variable::{write_quoted, Exposable, ExposeSlot, Variable, VariableKind};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Write `value`, quoting it unless it reads as a number.
fn describe_display(out: &mut dyn fmt::Write, value: &dyn fmt::Display, quote_string: bool) -> fmt::Result {
    if !quote_string {
        return write!(out, "{}", value);
    }
    let text = value.to_string();
    if text.parse::<f64>().is_ok() {
        out.write_str(&text)
    } else {
        write_quoted(out, &text)
    }
}

struct StatusInner<T> {
    value: RwLock<T>,
    exposure: ExposeSlot,
}

/// A value shown as-is, e.g. a version string or a mode.
pub struct Status<T = String> {
    inner: Arc<StatusInner<T>>,
}

impl<T> Clone for Status<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Status<T>
where
    T: fmt::Display + Clone + Send + Sync + 'static,
{
    /// Unexposed status holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StatusInner {
                value: RwLock::new(value),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Status exposed as `name`; failures are logged.
    pub fn with_name(name: &str, help: &str, value: T) -> Self {
        let status = Self::new(value);
        let _ = status.expose(name, help);
        status
    }

    /// Replace the value.
    pub fn set_value(&self, value: T) {
        *self.inner.value.write() = value;
    }

    /// Copy of the current value.
    pub fn get_value(&self) -> T {
        self.inner.value.read().clone()
    }
}

impl<T> Variable for StatusInner<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn kind(&self) -> VariableKind {
        VariableKind::Status
    }

    fn describe(&self, out: &mut dyn fmt::Write, quote_string: bool) -> fmt::Result {
        let value = self.value.read();
        describe_display(out, &*value, quote_string)
    }
}

impl<T> Exposable for Status<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<StatusInner<T>> = Arc::downgrade(&self.inner);
        weak
    }
}

type StatusFn<T> = Box<dyn Fn() -> T + Send + Sync>;

struct PassiveStatusInner<T> {
    func: StatusFn<T>,
    exposure: ExposeSlot,
}

/// Status computed by a closure whenever it is described.
pub struct PassiveStatus<T> {
    inner: Arc<PassiveStatusInner<T>>,
}

impl<T> Clone for PassiveStatus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Display + 'static> PassiveStatus<T> {
    /// Status reading `func` on every access.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PassiveStatusInner {
                func: Box::new(func),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Call the function.
    pub fn get_value(&self) -> T {
        (self.inner.func)()
    }
}

impl<T: fmt::Display + 'static> Variable for PassiveStatusInner<T> {
    fn kind(&self) -> VariableKind {
        VariableKind::Status
    }

    fn describe(&self, out: &mut dyn fmt::Write, quote_string: bool) -> fmt::Result {
        describe_display(out, &(self.func)(), quote_string)
    }
}

impl<T: fmt::Display + 'static> Exposable for PassiveStatus<T> {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<PassiveStatusInner<T>> = Arc::downgrade(&self.inner);
        weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::describe_exposed;

    #[test]
    fn test_status_set_and_describe() {
        let status = Status::new("starting".to_string());
        status.set_value("serving".to_string());
        assert_eq!(status.get_value(), "serving");

        let mut out = String::new();
        status.inner.describe(&mut out, true).unwrap();
        assert_eq!(out, "\"serving\"");

        out.clear();
        status.inner.describe(&mut out, false).unwrap();
        assert_eq!(out, "serving");
    }

    #[test]
    fn test_numeric_status_not_quoted() {
        let status = Status::new(42u32);
        let mut out = String::new();
        status.inner.describe(&mut out, true).unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_passive_status_exposed() {
        let status = PassiveStatus::new(|| "ok");
        status.expose("status_mod_passive", "health").unwrap();
        assert_eq!(describe_exposed("status_mod_passive", false).unwrap(), "ok");
        assert!(status.hide());
    }
}
