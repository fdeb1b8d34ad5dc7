use serde::{Deserialize, Serialize};

use super::FixedNum;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: FixedNum,
    pub y: FixedNum,
}

impl FixedVec2 {
    pub const ZERO: Self = Self { x: FixedNum::ZERO, y: FixedNum::ZERO };

    pub fn new(x: FixedNum, y: FixedNum) -> Self {
        Self { x, y }
    }

    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    pub fn length_squared(self) -> FixedNum {
        self.x * self.x + self.y * self.y
    }

    /// Squared distance; ordering by this avoids the fixed-point sqrt.
    pub fn distance_squared(self, other: Self) -> FixedNum {
        (self - other).length_squared()
    }
}

impl std::ops::Add for FixedVec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for FixedVec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}
