//! 身体分割.

use super::{SegmentError, SegmentResult, SegmentSpec, Stage};
use crate::labeling::label_components;
use crate::morph::close_slices;
use crate::{BinaryMask, CtScan};

/// 从胸部 CT 扫描中分割出患者身体区域.
///
/// 算法: HU 阈值化 → 最大 6-连通分量 → 体内空腔填充 → 逐切片闭运算.
///
/// 空腔填充规则: 对候选身体的补集做连通标注, 只有触碰 h/w 侧边界的
/// 补集分量才算体外空气, 其余补集分量 (肺腔, 气管腔等胸腔内空腔)
/// 一并归入身体. z 方向两端伸出的补集分量 **不** 算体外, 因为扫描窗口
/// 常在 z 方向截断身体, 气管腔也正是从顶部切片开口的.
///
/// # 错误
///
/// 没有体素通过组织阈值时返回 [`SegmentError::EmptyMask`]
/// (非胸部序列或阈值标定失误), 不会产生静默的空结果.
pub fn segment_body(scan: &CtScan, spec: &SegmentSpec) -> SegmentResult<BinaryMask> {
    let thr = spec.body_threshold_hu();
    let foreground = scan.mask_where(|hu| hu >= thr);
    if foreground.is_empty() {
        return Err(SegmentError::EmptyMask(Stage::Body));
    }

    let labels = label_components(&foreground);
    // 掩膜非空则必有分量, 可直接 unwrap.
    let body = labels.mask_of(labels.largest().unwrap());

    // 体外空气 = 补集中触碰 h/w 侧边界的分量 (含扫描床等非身体异物,
    // 它们与周围空气 6-连通). 其补集即 "身体 + 体内空腔".
    let cavities = label_components(&body.complement());
    let exterior = cavities.border_labels([false, true, true]);
    let filled = cavities.mask_of_any(&exterior).complement();

    let closed = close_slices(&filled, spec.body_closing_radius());
    log::debug!(
        "body segmentation: {} candidate components, {} voxels after closing",
        labels.len(),
        closed.count_true()
    );
    Ok(closed)
}
