//! 分割流水线: 身体 → 肺 → 气道.
//!
//! 每个阶段都是纯函数: 消费不可变输入, 产出新的不可变掩膜.
//! 阶段失败 (产出空掩膜, 种子非法) 是不可恢复的, 以 `Err` 形式向
//! 调用方传播并终止流水线; 本库绝不返回 "空但正常" 的掩膜.

use std::error::Error;
use std::fmt;

use crate::consts::{
    AIR_THRESHOLD_HU, BODY_CLOSING_RADIUS, BODY_THRESHOLD_HU, LUNG_CLOSING_RADIUS, MIN_LUNG_VOXELS,
};
use crate::Idx3d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod airway;
mod body;
mod lungs;

pub use airway::{extract_airways, AirwayTree};
pub use body::segment_body;
pub use lungs::{estimate_air_threshold, segment_lungs, LungSegmentation};

/// 分割流水线的阶段标识.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stage {
    /// 身体分割.
    Body,

    /// 肺部分割.
    Lungs,

    /// 气道树提取.
    Airways,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Body => "body",
            Stage::Lungs => "lungs",
            Stage::Airways => "airways",
        };
        f.write_str(name)
    }
}

/// 分割阶段运行时错误. 均为致命错误, 指示输入数据异常或阈值标定失误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// 某阶段产出了零体素掩膜 (如非胸部序列或损坏数据).
    EmptyMask(Stage),

    /// 气道种子体素不满足空气阈值, 或不在身体掩膜内.
    SeedNotAir(Idx3d),
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::EmptyMask(stage) => {
                write!(f, "segmentation stage `{stage}` produced an empty mask")
            }
            SegmentError::SeedNotAir(seed) => {
                write!(f, "airway seed {seed:?} is not an air voxel inside the body")
            }
        }
    }
}

impl Error for SegmentError {}

/// 分割阶段运行时结果.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// 分割行为配置.
///
/// 源工具链的精确阈值与结构元半径属于可调参数而非固定契约,
/// 因此全部在此显式暴露. 默认值是对常见胸部序列的经验校准
/// (见 [`crate::consts`]).
///
/// 该配置是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentSpec {
    body_threshold_hu: f32,
    air_threshold_hu: f32,
    body_closing_radius: usize,
    lung_closing_radius: usize,
    min_lung_voxels: usize,
}

impl Default for SegmentSpec {
    #[inline]
    fn default() -> Self {
        Self {
            body_threshold_hu: BODY_THRESHOLD_HU,
            air_threshold_hu: AIR_THRESHOLD_HU,
            body_closing_radius: BODY_CLOSING_RADIUS,
            lung_closing_radius: LUNG_CLOSING_RADIUS,
            min_lung_voxels: MIN_LUNG_VOXELS,
        }
    }
}

impl SegmentSpec {
    /// 构建分割配置.
    ///
    /// `body_threshold_hu` 与 `air_threshold_hu` 必须为有限值且落在
    /// 合理的 HU 范围 (-1024, 1024) 内, 否则返回 `None`.
    pub fn new(
        body_threshold_hu: f32,
        air_threshold_hu: f32,
        body_closing_radius: usize,
        lung_closing_radius: usize,
        min_lung_voxels: usize,
    ) -> Option<Self> {
        let sane = |hu: f32| hu.is_finite() && (-1024.0..1024.0).contains(&hu);
        if sane(body_threshold_hu) && sane(air_threshold_hu) {
            Some(Self {
                body_threshold_hu,
                air_threshold_hu,
                body_closing_radius,
                lung_closing_radius,
                min_lung_voxels,
            })
        } else {
            None
        }
    }

    /// 以新的空气阈值替换当前值, 返回新配置. 非法值时返回 `None`.
    ///
    /// 常与 [`estimate_air_threshold`] 连用.
    pub fn with_air_threshold(self, air_threshold_hu: f32) -> Option<Self> {
        Self::new(
            self.body_threshold_hu,
            air_threshold_hu,
            self.body_closing_radius,
            self.lung_closing_radius,
            self.min_lung_voxels,
        )
    }

    /// 身体/组织 HU 阈值下限.
    #[inline]
    pub fn body_threshold_hu(&self) -> f32 {
        self.body_threshold_hu
    }

    /// 空气 HU 阈值上限 (严格小于该值视为空气).
    #[inline]
    pub fn air_threshold_hu(&self) -> f32 {
        self.air_threshold_hu
    }

    /// 身体掩膜闭运算结构元半径 (像素).
    #[inline]
    pub fn body_closing_radius(&self) -> usize {
        self.body_closing_radius
    }

    /// 肺掩膜闭运算结构元半径 (像素).
    #[inline]
    pub fn lung_closing_radius(&self) -> usize {
        self.lung_closing_radius
    }

    /// 候选肺分量的最小体素数.
    #[inline]
    pub fn min_lung_voxels(&self) -> usize {
        self.min_lung_voxels
    }
}
