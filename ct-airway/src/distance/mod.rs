//! 测地距离引擎.
//!
//! 在气道掩膜上计算从气管入口种子出发、沿 6-连通体素图的单源最短路
//! 距离场, 并回答任意目标体素的 "口到点" 距离查询. 体素图从不被显式
//! 物化: 邻接关系在遍历时由掩膜成员关系与网格坐标按需计算, 内存开销
//! 与气道的稀疏管状结构无关, 只有距离场本身占一份体数据.

use std::error::Error;
use std::fmt;

use crate::{GridGeometry, Idx3d};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod field;

pub use field::DistanceField;

/// 距离查询错误. 每条查询独立成败, 批量查询不会因单条失败而中止.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// 搜索半径内不存在任何可达的气道体素.
    ///
    /// 这通常指示气道提取失败, 或目标远离任何已分割气道;
    /// 本库不会以 0 或无穷大静默顶替.
    UnreachableTarget(Idx3d),

    /// 区域掩膜中没有任何为真的体素.
    EmptyRegion,

    /// 区域掩膜与距离场形状不一致.
    ShapeMismatch,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnreachableTarget(pos) => {
                write!(f, "no reachable airway voxel near target {pos:?}")
            }
            QueryError::EmptyRegion => f.write_str("region mask contains no voxel"),
            QueryError::ShapeMismatch => f.write_str("region mask shape differs from field"),
        }
    }
}

impl Error for QueryError {}

/// 距离查询结果.
pub type QueryResult<T> = Result<T, QueryError>;

/// 点距离查询配置.
///
/// 该配置是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuerySpec {
    search_radius_mm: f64,
}

impl QuerySpec {
    /// 构建查询配置. `search_radius_mm` 必须为有限非负值, 否则返回 `None`.
    pub fn new(search_radius_mm: f64) -> Option<Self> {
        (search_radius_mm.is_finite() && search_radius_mm >= 0.0)
            .then_some(Self { search_radius_mm })
    }

    /// 恰好覆盖目标体素全部相邻体素 (含对角) 的搜索半径,
    /// 即单步体素对角线的物理长度. 这是 "默认覆盖紧邻" 的推荐配置.
    pub fn adjacent(geom: &impl GridGeometry) -> Self {
        let [z, h, w] = geom.pix_dim();
        Self {
            search_radius_mm: (z * z + h * h + w * w).sqrt(),
        }
    }

    /// 目标体素不在气道内时, 允许向外搜索最近气道体素的物理半径 (mm).
    #[inline]
    pub fn search_radius_mm(&self) -> f64 {
        self.search_radius_mm
    }
}

/// 一个目标区域 (如结节掩膜) 的经气管距离统计.
///
/// 下游结节形态学报告按结节消费这四个统计量.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionDistanceStats {
    /// 区域内最小距离 (mm).
    pub min: f64,

    /// 区域内平均距离 (mm).
    pub mean: f64,

    /// 区域内中位距离 (mm).
    pub median: f64,

    /// 区域内最大距离 (mm).
    pub max: f64,
}
