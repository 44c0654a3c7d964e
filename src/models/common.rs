use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// 2次元位置を表す構造体（ワールド座標系）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position2D {
    pub x: f64,
    pub y: f64,
}

impl Position2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// ユークリッド距離を計算
    pub fn distance(&self, other: &Position2D) -> f64 {
        let delta = *other - *self;
        delta.x.hypot(delta.y)
    }

    /// 自身から`other`へ向かう方位角（ラジアン）
    pub fn bearing_to(&self, other: &Position2D) -> f64 {
        let delta = *other - *self;
        delta.y.atan2(delta.x)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Position2D {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Position2D {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// シミュレーション領域の矩形境界
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl RegionBounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// 領域の中心
    pub fn center(&self) -> Position2D {
        Position2D::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, position: &Position2D) -> bool {
        position.x >= self.min_x && position.x <= self.max_x &&
        position.y >= self.min_y && position.y <= self.max_y
    }

    /// いずれかの壁から`margin`未満の距離にあるかを判定
    pub fn is_near_wall(&self, position: &Position2D, margin: f64) -> bool {
        position.x < self.min_x + margin || position.x > self.max_x - margin ||
        position.y < self.min_y + margin || position.y > self.max_y - margin
    }
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self::new(-50.0, 50.0, -50.0, 50.0)
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use std::f64::consts::{PI, TAU};

    /// 角度（ラジアン）を(-π, π]の範囲に正規化
    ///
    /// 非有限値は0.0に置き換えます。
    pub fn normalize_angle(angle: f64) -> f64 {
        if !angle.is_finite() {
            return 0.0;
        }
        if angle > -PI && angle <= PI {
            return angle;
        }
        let wrapped = (angle + PI).rem_euclid(TAU) - PI;
        if wrapped <= -PI {
            wrapped + TAU
        } else {
            wrapped
        }
    }

    /// `from`から`to`への符号付き角度差（(-π, π]）
    pub fn angle_difference(from: f64, to: f64) -> f64 {
        normalize_angle(to - from)
    }

    /// 小数点以下2桁に丸める
    pub fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    /// 小数点以下1桁に丸める
    pub fn round1(value: f64) -> f64 {
        (value * 10.0).round() / 10.0
    }
}
