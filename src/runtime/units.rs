//! Dimensioned-quantity primitives used throughout the runtime
//!
//! Each quantity is an immutable `f64` newtype. Only physically meaningful
//! operator combinations are implemented, so mixing units is a compile
//! error. NaN encodes "invalid"; it is produced by `invalid()`, detected by
//! `is_valid()` and never compares equal to anything.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

macro_rules! quantity {
    ($(#[$meta:meta])* $name:ident, $unit:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
        pub struct $name(f64);

        impl $name {
            pub const ZERO: Self = Self(0.0);

            pub const fn new(raw: f64) -> Self {
                Self(raw)
            }

            /// The raw value in base SI units.
            pub const fn raw(self) -> f64 {
                self.0
            }

            /// The NaN-encoded invalid value.
            pub fn invalid() -> Self {
                Self(f64::NAN)
            }

            pub fn is_valid(self) -> bool {
                !self.0.is_nan()
            }

            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            pub fn clamp(self, lo: Self, hi: Self) -> Self {
                Self(self.0.clamp(lo.0, hi.0))
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0.0
            }

            pub fn is_negative(self) -> bool {
                self.0 < 0.0
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl Mul<$name> for f64 {
            type Output = $name;
            fn mul(self, rhs: $name) -> $name {
                $name(self * rhs.0)
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                Self(self.0 / rhs)
            }
        }

        /// Same-unit division yields a dimensionless ratio.
        impl Div<$name> for $name {
            type Output = f64;
            fn div(self, rhs: $name) -> f64 {
                self.0 / rhs.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.0, $unit)
            }
        }
    };
}

/// `A * B = Out`, in both operand orders.
macro_rules! quantity_mul {
    ($a:ident * $b:ident = $out:ident) => {
        impl Mul<$b> for $a {
            type Output = $out;
            fn mul(self, rhs: $b) -> $out {
                $out::new(self.raw() * rhs.raw())
            }
        }

        impl Mul<$a> for $b {
            type Output = $out;
            fn mul(self, rhs: $a) -> $out {
                $out::new(self.raw() * rhs.raw())
            }
        }
    };
}

/// `A / B = Out`.
macro_rules! quantity_div {
    ($a:ident / $b:ident = $out:ident) => {
        impl Div<$b> for $a {
            type Output = $out;
            fn div(self, rhs: $b) -> $out {
                $out::new(self.raw() / rhs.raw())
            }
        }
    };
}

quantity!(
    /// Distance along the path in meters.
    Length, "m"
);
quantity!(
    /// Time in seconds.
    Time, "s"
);
quantity!(
    /// Speed in meters per second.
    Speed, "m/s"
);
quantity!(
    /// Acceleration in meters per second squared.
    Acceleration, "m/s^2"
);
quantity!(
    /// Force in newtons.
    Force, "N"
);
quantity!(
    /// Mass in kilograms.
    Mass, "kg"
);
quantity!(
    /// Squared speed in m^2/s^2, the intermediate of braking-curve algebra.
    SpeedSquared, "m^2/s^2"
);

quantity_div!(Length / Time = Speed);
quantity_div!(Length / Speed = Time);
quantity_mul!(Speed * Time = Length);

quantity_div!(Speed / Time = Acceleration);
quantity_div!(Speed / Acceleration = Time);
quantity_mul!(Acceleration * Time = Speed);

quantity_div!(Force / Mass = Acceleration);
quantity_mul!(Mass * Acceleration = Force);

quantity_mul!(Acceleration * Length = SpeedSquared);
quantity_div!(SpeedSquared / Speed = Speed);
quantity_div!(SpeedSquared / Acceleration = Length);

impl Length {
    pub fn from_m(meters: f64) -> Self {
        Self::new(meters)
    }

    pub fn from_km(kilometers: f64) -> Self {
        Self::new(kilometers * 1000.0)
    }

    pub fn as_m(self) -> f64 {
        self.raw()
    }

    /// Whether this length is a whole number of `step`s, within float slack.
    pub fn is_multiple_of(self, step: Length) -> bool {
        let ratio = self / step;
        (ratio - ratio.round()).abs() < 1e-6
    }

    /// Rounds to the nearest whole number of `step`s.
    pub fn round_to_step(self, step: Length) -> Length {
        step * (self / step).round()
    }
}

impl Time {
    pub fn from_s(seconds: f64) -> Self {
        Self::new(seconds)
    }

    pub fn as_s(self) -> f64 {
        self.raw()
    }
}

impl Speed {
    pub fn from_m_s(meters_per_second: f64) -> Self {
        Self::new(meters_per_second)
    }

    pub fn from_km_h(kilometers_per_hour: f64) -> Self {
        Self::new(kilometers_per_hour / 3.6)
    }

    pub fn as_m_s(self) -> f64 {
        self.raw()
    }

    pub fn as_km_h(self) -> f64 {
        self.raw() * 3.6
    }

    pub fn squared(self) -> SpeedSquared {
        SpeedSquared::new(self.raw() * self.raw())
    }
}

impl Acceleration {
    pub fn from_m_s2(meters_per_second_squared: f64) -> Self {
        Self::new(meters_per_second_squared)
    }

    pub fn as_m_s2(self) -> f64 {
        self.raw()
    }
}

impl Mass {
    pub fn from_kg(kilograms: f64) -> Self {
        Self::new(kilograms)
    }

    pub fn from_t(tonnes: f64) -> Self {
        Self::new(tonnes * 1000.0)
    }
}

impl Force {
    pub fn from_n(newtons: f64) -> Self {
        Self::new(newtons)
    }

    pub fn from_kn(kilonewtons: f64) -> Self {
        Self::new(kilonewtons * 1000.0)
    }
}

impl SpeedSquared {
    pub fn sqrt(self) -> Speed {
        Speed::new(self.raw().sqrt())
    }
}

/// Track gradient, stored as an angle in radians.
///
/// Not part of the arithmetic web above; it only ever enters a formula
/// through its sine.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Slope(f64);

impl Slope {
    pub const FLAT: Self = Self(0.0);

    pub fn from_radians(radians: f64) -> Self {
        Self(radians)
    }

    /// Gradient given as rise per mille, e.g. `12.5` for 12.5 per mille uphill.
    pub fn from_per_mille(per_mille: f64) -> Self {
        Self((per_mille / 1000.0).atan())
    }

    pub fn as_radians(self) -> f64 {
        self.0
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }
}

impl fmt::Display for Slope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rad", self.0)
    }
}
