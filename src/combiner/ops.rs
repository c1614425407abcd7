//! Reducing operations and their inverses.
//!
//! An operation must be associative and commutative, and the identity given to
//! the combiner must satisfy `identity op a == a`. Neither is checked at runtime.

/// How a sampled series folds fine points into coarser ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesFold {
    /// Coarse point is the mean of the fine points
    Average,
    /// Coarse point is the largest fine point
    Max,
    /// Coarse point is the smallest fine point
    Min,
}

/// Associative, commutative reduction `lhs = lhs op rhs`.
pub trait ReduceOp<T>: Clone + Send + Sync + 'static {
    /// Roll-up used when this op's values are kept as a series
    const SERIES: SeriesFold = SeriesFold::Average;

    /// Fold `rhs` into `lhs`.
    fn apply(&self, lhs: &mut T, rhs: &T);
}

/// Inverse of a [`ReduceOp`], used to compute window deltas.
pub trait InverseOp<T>: Clone + Send + Sync + 'static {
    /// False for [`VoidOp`]; windows then reset the base on every sample.
    const EXISTS: bool = true;

    /// Remove `rhs` from `lhs`.
    fn apply(&self, lhs: &mut T, rhs: &T);
}

/// `lhs += rhs`
#[derive(Debug, Clone, Copy, Default)]
pub struct AddTo;

/// `lhs -= rhs`
#[derive(Debug, Clone, Copy, Default)]
pub struct MinusFrom;

/// `lhs = max(lhs, rhs)`
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxTo;

/// `lhs = min(lhs, rhs)`
#[derive(Debug, Clone, Copy, Default)]
pub struct MinTo;

/// Marks an operation without an inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidOp;

macro_rules! impl_int_ops {
    ($($t:ty),*) => {
        $(
            impl ReduceOp<$t> for AddTo {
                #[inline]
                fn apply(&self, lhs: &mut $t, rhs: &$t) {
                    *lhs = lhs.wrapping_add(*rhs);
                }
            }

            impl InverseOp<$t> for MinusFrom {
                #[inline]
                fn apply(&self, lhs: &mut $t, rhs: &$t) {
                    *lhs = lhs.wrapping_sub(*rhs);
                }
            }
        )*
    };
}

macro_rules! impl_float_ops {
    ($($t:ty),*) => {
        $(
            impl ReduceOp<$t> for AddTo {
                #[inline]
                fn apply(&self, lhs: &mut $t, rhs: &$t) {
                    *lhs += *rhs;
                }
            }

            impl InverseOp<$t> for MinusFrom {
                #[inline]
                fn apply(&self, lhs: &mut $t, rhs: &$t) {
                    *lhs -= *rhs;
                }
            }
        )*
    };
}

impl_int_ops!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_float_ops!(f32, f64);

impl ReduceOp<String> for AddTo {
    fn apply(&self, lhs: &mut String, rhs: &String) {
        lhs.push_str(rhs);
    }
}

impl<T: PartialOrd + Clone + 'static> ReduceOp<T> for MaxTo {
    const SERIES: SeriesFold = SeriesFold::Max;

    #[inline]
    fn apply(&self, lhs: &mut T, rhs: &T) {
        if *rhs > *lhs {
            *lhs = rhs.clone();
        }
    }
}

impl<T: PartialOrd + Clone + 'static> ReduceOp<T> for MinTo {
    const SERIES: SeriesFold = SeriesFold::Min;

    #[inline]
    fn apply(&self, lhs: &mut T, rhs: &T) {
        if *rhs < *lhs {
            *lhs = rhs.clone();
        }
    }
}

impl<T> InverseOp<T> for VoidOp {
    const EXISTS: bool = false;

    // Never called: callers branch on `EXISTS` first.
    fn apply(&self, _lhs: &mut T, _rhs: &T) {}
}
