//! 窗宽窗位变换
//!
//! 将存储像素值经过线性重缩放、裁剪到窗口后归一化到 0–255 灰度，
//! 原地写入 RGBA 缓冲区。

use serde::{Deserialize, Serialize};

/// 默认窗位
pub const DEFAULT_WINDOW_CENTER: f64 = 50.0;
/// 默认窗宽
pub const DEFAULT_WINDOW_WIDTH: f64 = 400.0;
/// 默认存储位数
pub const DEFAULT_BITS_STORED: u16 = 16;

/// 像素表示 (0028,0103)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelRepresentation {
    #[default]
    Unsigned,
    Signed,
}

impl PixelRepresentation {
    pub fn from_tag_value(value: u16) -> Self {
        if value == 1 {
            PixelRepresentation::Signed
        } else {
            PixelRepresentation::Unsigned
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, PixelRepresentation::Signed)
    }
}

/// 窗宽窗位参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowParams {
    pub window_center: f64,
    pub window_width: f64,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub bits_stored: u16,
    pub pixel_representation: PixelRepresentation,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            window_center: DEFAULT_WINDOW_CENTER,
            window_width: DEFAULT_WINDOW_WIDTH,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            bits_stored: DEFAULT_BITS_STORED,
            pixel_representation: PixelRepresentation::Unsigned,
        }
    }
}

impl WindowParams {
    /// 覆盖窗位/窗宽（查看器交互调整）
    pub fn with_window(mut self, center: Option<f64>, width: Option<f64>) -> Self {
        if let Some(center) = center {
            self.window_center = center;
        }
        if let Some(width) = width {
            self.window_width = width;
        }
        self
    }

    /// 重缩放后的取值范围 `(min, max)`
    pub fn value_range(&self) -> (f64, f64) {
        let max_value = 2f64.powi(i32::from(self.bits_stored)) - 1.0;
        let min_value = if self.pixel_representation.is_signed() {
            -max_value / 2.0
        } else {
            0.0
        };
        (min_value, max_value)
    }

    /// 窗口上下界 `(window_min, window_max)`
    pub fn window_bounds(&self) -> (f64, f64) {
        let half = self.window_width / 2.0;
        (self.window_center - half, self.window_center + half)
    }

    /// 单个存储像素值到 0–255 的映射
    pub fn normalize(&self, raw: i32) -> u8 {
        let (min_value, max_value) = self.value_range();
        let (window_min, window_max) = self.window_bounds();
        normalize_value(raw, self, min_value, max_value, window_min, window_max)
    }
}

#[inline]
fn normalize_value(
    raw: i32,
    params: &WindowParams,
    min_value: f64,
    max_value: f64,
    window_min: f64,
    window_max: f64,
) -> u8 {
    let value = (f64::from(raw) * params.rescale_slope + params.rescale_intercept)
        .clamp(min_value, max_value);

    if value <= window_min {
        0
    } else if value >= window_max {
        255
    } else {
        ((value - window_min) / (window_max - window_min) * 255.0).round() as u8
    }
}

/// 对 RGBA 缓冲区原地应用窗宽窗位
///
/// 每 4 字节一个像素：R、G、B 写入相同的归一化灰度值，A 固定为 255。
/// 缓冲区与像素数组按较短者对齐，多余部分不做修改。
pub fn apply_window_level(rgba: &mut [u8], pixels: &[i32], params: &WindowParams) {
    let (min_value, max_value) = params.value_range();
    let (window_min, window_max) = params.window_bounds();

    for (pixel, &raw) in rgba.chunks_exact_mut(4).zip(pixels) {
        let grey = normalize_value(raw, params, min_value, max_value, window_min, window_max);
        pixel[0] = grey;
        pixel[1] = grey;
        pixel[2] = grey;
        pixel[3] = 255;
    }
}
