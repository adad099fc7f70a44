//! This module defines various unit types and their conversions.
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// Implement the traits shared by every quantity type
macro_rules! base_unit_struct {
    ($name:ident) => {
        impl $name {
            /// Create from an `f64` value
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Returns the value as an `f64`
            pub const fn value(&self) -> f64 {
                self.0
            }

            /// Returns true if the value is neither infinite nor NaN
            pub fn is_finite(&self) -> bool {
                self.0.is_finite()
            }

            /// Returns the absolute value
            pub fn abs(&self) -> Self {
                Self(self.0.abs())
            }

            /// Returns the larger of two values
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }
        }

        impl std::ops::AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl std::ops::SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl std::ops::Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl float_cmp::ApproxEq for $name {
            type Margin = float_cmp::F64Margin;

            fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }
    };
}

/// Define a new quantity type with the given name
macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::Display,
        )]
        pub struct $name(pub f64);

        base_unit_struct!($name);

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Mul<$name> for Dimensionless {
            type Output = $name;
            fn mul(self, rhs: $name) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl std::ops::Div<$name> for $name {
            type Output = Dimensionless;
            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }
    };
}

macro_rules! impl_mul {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Mul<$Rhs> for $Lhs {
            type Output = $Out;
            fn mul(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 * rhs.0)
            }
        }
        impl std::ops::Mul<$Lhs> for $Rhs {
            type Output = $Out;
            fn mul(self, lhs: $Lhs) -> $Out {
                <$Out>::new(self.0 * lhs.0)
            }
        }
    };
}

macro_rules! impl_div {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Div<$Rhs> for $Lhs {
            type Output = $Out;
            fn div(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 / rhs.0)
            }
        }
    };
}

/// Represents a dimensionless quantity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Default,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Display,
)]
pub struct Dimensionless(pub f64);

base_unit_struct!(Dimensionless);

impl std::ops::Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 * rhs.0)
    }
}

impl std::ops::Div for Dimensionless {
    type Output = Dimensionless;

    fn div(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 / rhs.0)
    }
}

impl Dimensionless {
    pub fn powi(self, rhs: i32) -> Self {
        Dimensionless(self.0.powi(rhs))
    }
}

impl From<f64> for Dimensionless {
    fn from(val: f64) -> Self {
        Self(val)
    }
}

impl From<Dimensionless> for f64 {
    fn from(val: Dimensionless) -> Self {
        val.0
    }
}

// Base quantities
unit_struct!(Money);
unit_struct!(Activity);
unit_struct!(Capacity);

// Derived quantities
unit_struct!(MoneyPerActivity);
unit_struct!(MoneyPerCapacity);
unit_struct!(ActivityPerCapacity);

// Division rules
impl_div!(Money, Activity, MoneyPerActivity);
impl_div!(Money, Capacity, MoneyPerCapacity);
impl_div!(Activity, Capacity, ActivityPerCapacity);
impl_div!(Activity, ActivityPerCapacity, Capacity);

// Multiplication rules
impl_mul!(MoneyPerCapacity, Capacity, Money);
impl_mul!(MoneyPerActivity, Activity, Money);
impl_mul!(ActivityPerCapacity, Capacity, Activity);

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_unit_arithmetic() {
        let capacity = Capacity(4.0);
        let factor = ActivityPerCapacity(0.5);
        let activity = factor * capacity;
        assert_eq!(activity, Activity(2.0));
        assert_eq!(activity / factor, capacity);

        let cost = MoneyPerActivity(3.0) * activity;
        assert_approx_eq!(Money, cost, Money(6.0));
        assert_approx_eq!(MoneyPerActivity, cost / activity, MoneyPerActivity(3.0));
        assert_eq!(Capacity(3.0) / Capacity(2.0), Dimensionless(1.5));
    }

    #[test]
    fn test_unit_sum_and_neg() {
        let total: Activity = [Activity(1.0), Activity(2.5)].into_iter().sum();
        assert_eq!(total, Activity(3.5));
        assert_eq!(-total, Activity(-3.5));

        let mut money = Money(1.0);
        money += Money(2.0);
        money -= Money(0.5);
        assert_eq!(money, Money(2.5));
    }
}
