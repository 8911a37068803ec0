use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A real-valued lattice vector (centroids, directions, field samples).
/// Two-dimensional models keep `z` at zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    /// Creates a new Point.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }

    /// Creates a point in the `z = 0` plane.
    pub const fn planar(x: f64, y: f64) -> Self {
        Point { x, y, z: 0.0 }
    }

    /// Creates a zero vector.
    pub const fn zero() -> Self {
        Point { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a normalized version of the vector (unit vector).
    /// Returns a zero vector if the original vector's length is zero.
    pub fn normalize_or_zero(&self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 1e-24 {
            *self * (1.0 / len_sq.sqrt())
        } else {
            Point::zero()
        }
    }

    /// Calculates the dot product with another vector.
    pub fn dot(&self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Maps a displacement on a periodic axis of length `dimension` to its
    /// minimum image: components above `dimension / 2` (integer half) are
    /// shifted down by one period, components below `-dimension / 2` up.
    pub fn wrap(&self, dimension: i64) -> Self {
        let period = dimension as f64;
        let half = (dimension / 2) as f64;
        let fold = |c: f64| {
            if c > half {
                c - period
            } else if c < -half {
                c + period
            } else {
                c
            }
        };
        Point::new(fold(self.x), fold(self.y), fold(self.z))
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Point {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Point::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Point {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Point::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Point {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Point::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f64> for Point {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Point::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

/// An integer lattice coordinate or an integer running sum of coordinates.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl IntPoint {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        IntPoint { x, y, z }
    }

    pub const fn planar(x: i64, y: i64) -> Self {
        IntPoint { x, y, z: 0 }
    }

    pub const fn zero() -> Self {
        IntPoint { x: 0, y: 0, z: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }

    /// Multiplies every component by `r`.
    pub fn scale(&self, r: i64) -> Self {
        IntPoint::new(self.x * r, self.y * r, self.z * r)
    }

    /// Component-wise integer division, truncating toward zero.
    pub fn div_trunc(&self, r: i64) -> Self {
        IntPoint::new(self.x / r, self.y / r, self.z / r)
    }

    /// Component-wise non-negative remainder in `[0, m)`.
    pub fn rem_euclid(&self, m: i64) -> Self {
        IntPoint::new(self.x.rem_euclid(m), self.y.rem_euclid(m), self.z.rem_euclid(m))
    }

    pub fn to_point(&self) -> Point {
        Point::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Real-valued quotient, used to turn a coordinate sum into a mean.
    pub fn divide(&self, r: f64) -> Point {
        Point::new(self.x as f64 / r, self.y as f64 / r, self.z as f64 / r)
    }
}

impl Add for IntPoint {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        IntPoint::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for IntPoint {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        IntPoint::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for IntPoint {
    type Output = Self;
    fn neg(self) -> Self {
        IntPoint::new(-self.x, -self.y, -self.z)
    }
}
