//! Per-thread storage cells.
//!
//! A cell has one writer (the owning thread) and occasional readers (the
//! combiner). Primitive values live in a single `AtomicU64` and are updated by
//! a CAS loop; anything else sits behind a per-agent mutex that only the owner
//! and a reader ever touch.

use crate::combiner::ops::ReduceOp;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Values that round-trip losslessly through 64 raw bits.
pub trait Atomical: Copy + Send + Sync + 'static {
    /// Raw bit representation
    fn to_raw(self) -> u64;
    /// Inverse of [`Atomical::to_raw`]
    fn from_raw(raw: u64) -> Self;
}

macro_rules! impl_atomical_int {
    ($($t:ty => $u:ty),*) => {
        $(
            impl Atomical for $t {
                #[inline]
                #[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
                fn to_raw(self) -> u64 {
                    self as $u as u64
                }

                #[inline]
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                fn from_raw(raw: u64) -> Self {
                    raw as $u as $t
                }
            }
        )*
    };
}

impl_atomical_int!(
    i8 => u8, i16 => u16, i32 => u32, i64 => u64, isize => usize,
    u8 => u8, u16 => u16, u32 => u32, u64 => u64, usize => usize
);

impl Atomical for f32 {
    #[inline]
    fn to_raw(self) -> u64 {
        u64::from(self.to_bits())
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn from_raw(raw: u64) -> Self {
        f32::from_bits(raw as u32)
    }
}

impl Atomical for f64 {
    #[inline]
    fn to_raw(self) -> u64 {
        self.to_bits()
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        f64::from_bits(raw)
    }
}

/// Storage for one agent's value.
pub trait ElementCell<T>: Send + Sync + 'static {
    /// New cell holding `value`
    fn new(value: T) -> Self;
    /// Current value
    fn load(&self) -> T;
    /// Overwrite the value
    fn store(&self, value: T);
    /// Replace the value, returning the previous one
    fn exchange(&self, value: T) -> T;
    /// Apply `op(value, rhs)` in place
    fn modify<O: ReduceOp<T>>(&self, op: &O, rhs: &T);
}

/// Lock-free cell for [`Atomical`] values.
pub struct AtomicElement<T> {
    raw: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Atomical> AtomicElement<T> {
    /// Single CAS attempt, returning the observed value on failure.
    #[inline]
    pub fn compare_exchange_weak(&self, current: T, new: T) -> Result<T, T> {
        self.raw
            .compare_exchange_weak(current.to_raw(), new.to_raw(), Ordering::Relaxed, Ordering::Relaxed)
            .map(T::from_raw)
            .map_err(T::from_raw)
    }
}

impl<T: Atomical> ElementCell<T> for AtomicElement<T> {
    fn new(value: T) -> Self {
        Self {
            raw: AtomicU64::new(value.to_raw()),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn load(&self) -> T {
        T::from_raw(self.raw.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: T) {
        self.raw.store(value.to_raw(), Ordering::Relaxed);
    }

    #[inline]
    fn exchange(&self, value: T) -> T {
        T::from_raw(self.raw.swap(value.to_raw(), Ordering::Relaxed))
    }

    /// Only a concurrent `exchange` from the combiner can make the CAS fail,
    /// so the loop retries at most a handful of times.
    #[inline]
    fn modify<O: ReduceOp<T>>(&self, op: &O, rhs: &T) {
        let mut current = self.raw.load(Ordering::Relaxed);
        loop {
            let mut next = T::from_raw(current);
            op.apply(&mut next, rhs);
            match self.raw.compare_exchange_weak(
                current,
                next.to_raw(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Mutex-guarded cell for values that do not fit in a word.
pub struct LockedElement<T> {
    value: Mutex<T>,
}

impl<T> LockedElement<T> {
    /// Run `f` with exclusive access to the value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.value.lock())
    }
}

impl<T: Clone + Send + 'static> ElementCell<T> for LockedElement<T> {
    fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    fn load(&self) -> T {
        self.value.lock().clone()
    }

    fn store(&self, value: T) {
        *self.value.lock() = value;
    }

    fn exchange(&self, value: T) -> T {
        std::mem::replace(&mut *self.value.lock(), value)
    }

    fn modify<O: ReduceOp<T>>(&self, op: &O, rhs: &T) {
        op.apply(&mut self.value.lock(), rhs);
    }
}
