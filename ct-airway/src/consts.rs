//! 通用常量.
//!
//! 这里只提供经验校准的默认值. 所有阈值与结构元半径都应通过
//! [`crate::segment::SegmentSpec`] 显式配置, 精确标定属于可调参数,
//! 不构成固定契约.

/// 区分人体组织与周围空气的 HU 阈值下限. 体素值大于等于该值视为身体候选.
pub const BODY_THRESHOLD_HU: f32 = -700.0;

/// 空气密度 HU 阈值. 体素值严格小于该值视为空气.
///
/// 当 Otsu 估计失效时, 该值也是 [`crate::segment::estimate_air_threshold`]
/// 的回退值.
pub const AIR_THRESHOLD_HU: f32 = -500.0;

/// 合法空气阈值的开区间下界. Otsu 估计结果不大于它时视为失效.
pub const AIR_HU_FLOOR: f32 = -1000.0;

/// 合法空气阈值的开区间上界. Otsu 估计结果不小于它时视为失效.
pub const AIR_HU_CEIL: f32 = 0.0;

/// 身体掩膜闭运算的默认结构元半径 (像素).
pub const BODY_CLOSING_RADIUS: usize = 3;

/// 肺部掩膜闭运算的默认结构元半径 (像素). 用于封闭血管与结节造成的孔洞.
pub const LUNG_CLOSING_RADIUS: usize = 10;

/// 候选肺分量的最小体素数. 小于该值的内部空气分量不参与肺的评选.
pub const MIN_LUNG_VOXELS: usize = 64;

/// Otsu 直方图的桶个数.
pub(crate) const OTSU_BINS: usize = 256;
