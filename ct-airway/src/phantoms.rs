//! 测试用合成胸部体模.
//!
//! 体模布局 (形状 `(16, 20, 20)`, 各向同性 1 mm):
//!
//! - 背景空气 (-1000 HU): 其余全部体素;
//! - 身体组织 (40 HU): `h, w ∈ [3, 16]` 的实心柱, z 方向贯穿;
//! - 左肺 (-800 HU): `z ∈ [4, 12], h ∈ [5, 14], w ∈ [4, 7]`;
//! - 右肺 (-800 HU): `z ∈ [4, 12], h ∈ [5, 14], w ∈ [12, 15]`;
//! - 气管 (-900 HU): `z ∈ [0, 10], h, w ∈ [9, 10]`, 从顶部切片开口;
//! - 结节 (30 HU): `z = 8, h ∈ [9, 10], w ∈ [5, 6]`, 嵌在左肺内.
//!
//! 气管与两肺互不连通 (w = 8 与 w = 11 处有组织壁),
//! 对应 "肺实质空气不可经空气路径到达气管" 的解剖学近似.

use ndarray::Array3;

use crate::segment::SegmentSpec;
use crate::CtScan;

/// 体模形状.
pub(crate) const SHAPE: (usize, usize, usize) = (16, 20, 20);

fn build(with_right_lung: bool) -> CtScan {
    let data = Array3::from_shape_fn(SHAPE, |(z, h, w)| {
        let in_body = (3..=16).contains(&h) && (3..=16).contains(&w);
        if !in_body {
            return -1000.0f32;
        }
        if z == 8 && (9..=10).contains(&h) && (5..=6).contains(&w) {
            return 30.0; // 结节
        }
        let in_lung_box = (4..=12).contains(&z) && (5..=14).contains(&h);
        if in_lung_box && (4..=7).contains(&w) {
            return -800.0; // 左肺
        }
        if with_right_lung && in_lung_box && (12..=15).contains(&w) {
            return -800.0; // 右肺
        }
        if (0..=10).contains(&z) && (9..=10).contains(&h) && (9..=10).contains(&w) {
            return -900.0; // 气管
        }
        40.0 // 组织
    });
    CtScan::from_raw(data, [1.0; 3], [0.0; 3])
}

/// 双肺胸部体模.
pub(crate) fn chest_phantom() -> CtScan {
    build(true)
}

/// 单肺 (模拟肺切除术后) 胸部体模.
pub(crate) fn pneumonectomy_phantom() -> CtScan {
    build(false)
}

/// 适配体模尺度的分割配置.
pub(crate) fn test_spec() -> SegmentSpec {
    SegmentSpec::new(-700.0, -500.0, 1, 2, 50).unwrap()
}
