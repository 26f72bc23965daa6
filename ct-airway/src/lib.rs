#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供胸部 3D CT 扫描的身体/肺部/气道分割, 以及沿气道树的
//! 经气管 (mouth-to-point) 测地距离计算.
//!
//! 该 crate 目前仅提供 `safe` 接口. 数据加载 (DICOM 解析, 体素重采样)
//! 与结节形态学测量均由上游/下游协作方完成, 不属于本库范围.
//!
//! # 注意
//!
//! 1. 所有体数据按照 `(z, h, w)` 索引访问, 即第一维为切片方向.
//! 2. 每个流水线阶段都是纯函数: 输入不可变, 输出新建且此后不再修改.
//!   阶段之间没有共享可变状态.
//! 3. 在违反调用约定的情况下, 程序会直接 panic, 而不会导致内存错误.
//!   As what Rust promises. 对于数据本身导致的失败 (如分割结果为空),
//!   程序返回 `Err` 而非 panic.
//!
//! # 开发计划
//!
//! ### 身体分割 ✅
//!
//! 阈值化 + 最大连通分量 + 空腔填充 + 形态学闭运算.
//!
//! 实现位于 `ct-airway/src/segment/body.rs`.
//!
//! ### 肺部分割 ✅
//!
//! 身体内部空气阈值化, 剔除与体外连通的空气, 保留最大的两个分量
//! (单肺时记录诊断标志), 并以闭运算封闭血管/结节孔洞.
//!
//! 实现位于 `ct-airway/src/segment/lungs.rs`.
//!
//! ### 气道树提取 ✅
//!
//! 从气管上端种子出发, 以 6-连通规则提取含种子的唯一空气分量.
//! 种子可由调用方提供, 也可自动估计.
//!
//! 实现位于 `ct-airway/src/segment/airway.rs`.
//!
//! ### 测地距离场 ✅
//!
//! 在隐式体素图上运行 Dijkstra 单源最短路, 边权为相邻体素中心的
//! 物理距离 (各向异性间距下各轴不同). 支持任意目标点查询,
//! 目标不在气道内时回退到 "最近气道体素 + 欧氏距离" 近似.
//!
//! 实现位于 `ct-airway/src/distance`.
//!
//! ### 连通分量标注 ✅
//!
//! 以扁平化体素索引为竞技场的并查集实现, 6-连通.
//! `rayon` feature 下提供两阶段并行版本 (切片局部标注 + 边界归并).
//!
//! 实现位于 `ct-airway/src/labeling.rs`.
//!
//! ### 小功能 ✅
//!
//! 1. 提供压缩掩膜快照以约束流水线峰值内存. ✅
//! 2. Otsu 空气阈值估计. ✅
//! 3. 区域距离统计 (min/mean/median/max). ✅

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量. 格式为 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

/// 3D 体数据基础结构.
mod data;

pub use data::{BinaryMask, CompactMask, CtScan, GridGeometry, MaskSlice, MaskSliceMut};

pub mod consts;

pub mod distance;
pub mod labeling;
pub mod morph;
pub mod segment;

pub mod prelude;

#[cfg(test)]
pub(crate) mod phantoms;
