//! 肺部分割.

use std::collections::HashSet;

use super::{SegmentError, SegmentResult, SegmentSpec, Stage};
use crate::consts::{AIR_HU_CEIL, AIR_HU_FLOOR, AIR_THRESHOLD_HU, OTSU_BINS};
use crate::labeling::{label_components, ComponentLabels};
use crate::morph::close_slices;
use crate::{BinaryMask, CtScan, GridGeometry};

/// 肺部分割结果.
#[derive(Debug, Clone)]
pub struct LungSegmentation {
    /// 肺掩膜.
    pub mask: BinaryMask,

    /// 是否只找到了一个肺分量 (如肺切除术后或过小的扫描窗口).
    ///
    /// 非致命诊断, 随掩膜一起记录, 供下游消费方降低置信度;
    /// 同时会以 `log::warn!` 形式上报.
    pub single_lung: bool,
}

/// 从身体掩膜内部分割出左右肺.
///
/// 算法: 身体内空气阈值化 → 剔除与体外连通的空气分量 → 剔除过小分量 →
/// 按体素数保留最大的两个 (只有一个时记录单肺诊断) → 逐切片闭运算封闭
/// 血管/结节孔洞, 避免结节被错误地排除在 "肺" 之外.
///
/// 与体外连通的判据: 分量含有位于体数据边界的体素, 或与非身体体素
/// 6-相邻的体素. 气管从顶部切片开口, 口鼻腔空气与扫描伪影都由此被
/// 剔除.
///
/// # 错误
///
/// 身体内部找不到任何候选空气分量时返回 [`SegmentError::EmptyMask`].
pub fn segment_lungs(
    scan: &CtScan,
    body: &BinaryMask,
    spec: &SegmentSpec,
) -> SegmentResult<LungSegmentation> {
    assert_eq!(scan.shape(), body.shape(), "扫描与身体掩膜形状不一致");

    let thr = spec.air_threshold_hu();
    let air = BinaryMask::from_fn(scan.shape(), scan.pix_dim(), scan.origin(), |pos| {
        body[pos] && scan[pos] < thr
    });

    let labels = label_components(&air);
    if labels.is_empty() {
        return Err(SegmentError::EmptyMask(Stage::Lungs));
    }
    let exterior = exterior_connected(&air, body, &labels);

    let candidates: Vec<u32> = labels
        .ranked()
        .into_iter()
        .filter(|lbl| !exterior.contains(lbl) && labels.count_of(*lbl) >= spec.min_lung_voxels())
        .collect();
    if candidates.is_empty() {
        return Err(SegmentError::EmptyMask(Stage::Lungs));
    }

    let keep = &candidates[..candidates.len().min(2)];
    let single_lung = keep.len() == 1;
    if single_lung {
        log::warn!(
            "lung segmentation kept a single component of {} voxels (pneumonectomy?)",
            labels.count_of(keep[0])
        );
    }

    // 闭运算封闭孔洞; 结果收敛回身体范围.
    let mask = close_slices(&labels.mask_of_any(keep), spec.lung_closing_radius()).intersect(body);
    log::debug!(
        "lung segmentation: kept {}/{} interior air components, {} voxels",
        keep.len(),
        labels.len(),
        mask.count_true()
    );
    Ok(LungSegmentation { mask, single_lung })
}

/// 收集与体外连通的空气分量标签.
fn exterior_connected(
    air: &BinaryMask,
    body: &BinaryMask,
    labels: &ComponentLabels,
) -> HashSet<u32> {
    let (zl, hl, wl) = air.shape();
    let mut exterior = HashSet::new();

    for pos in air.true_positions() {
        let lbl = labels.label_at(pos);
        if exterior.contains(&lbl) {
            continue;
        }
        let (z, h, w) = pos;
        let at_border = z == 0 || z + 1 == zl || h == 0 || h + 1 == hl || w == 0 || w + 1 == wl;
        if at_border || air.diamond_neighbours(pos).into_iter().any(|n| !body[n]) {
            exterior.insert(lbl);
        }
    }
    exterior
}

/// 以 Otsu 法估计身体内部的空气/组织 HU 阈值.
///
/// 对身体掩膜内的全部有限 HU 值求类间方差最大的分割点.
/// 估计值落在合法窗口 ([`AIR_HU_FLOOR`], [`AIR_HU_CEIL`]) 之外时,
/// 回退到默认值 [`AIR_THRESHOLD_HU`].
///
/// 结果可经 [`SegmentSpec::with_air_threshold`] 注入分割配置.
pub fn estimate_air_threshold(scan: &CtScan, body: &BinaryMask) -> f32 {
    assert_eq!(scan.shape(), body.shape(), "扫描与身体掩膜形状不一致");

    let values: Vec<f32> = body
        .true_positions()
        .map(|pos| scan[pos])
        .filter(|hu| hu.is_finite())
        .collect();
    if values.is_empty() {
        return AIR_THRESHOLD_HU;
    }

    let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if hi <= lo {
        // 常数图像没有可分的两类.
        return AIR_THRESHOLD_HU;
    }

    let mut hist = vec![0u64; OTSU_BINS];
    let scale = OTSU_BINS as f32 / (hi - lo);
    for hu in values.iter() {
        let bin = (((hu - lo) * scale) as usize).min(OTSU_BINS - 1);
        hist[bin] += 1;
    }

    // 最大化类间方差 w0 * w1 * (mu0 - mu1)^2.
    let total = values.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(i, c)| i as f64 * *c as f64).sum();
    let (mut w0, mut sum0) = (0.0f64, 0.0f64);
    let (mut best_var, mut best_bin) = (f64::NEG_INFINITY, 0usize);

    for (bin, &cnt) in hist.iter().enumerate().take(OTSU_BINS - 1) {
        w0 += cnt as f64;
        sum0 += bin as f64 * cnt as f64;
        if w0 == 0.0 {
            continue;
        }
        let w1 = total - w0;
        if w1 == 0.0 {
            break;
        }
        let (mu0, mu1) = (sum0 / w0, (sum_all - sum0) / w1);
        let var = w0 * w1 * (mu0 - mu1) * (mu0 - mu1);
        if var > best_var {
            (best_var, best_bin) = (var, bin);
        }
    }

    // 阈值取最优分割桶的上边界.
    let thr = lo + (best_bin as f32 + 1.0) / OTSU_BINS as f32 * (hi - lo);
    if thr <= AIR_HU_FLOOR || thr >= AIR_HU_CEIL {
        log::debug!("estimated air threshold {thr} outside ({AIR_HU_FLOOR}, {AIR_HU_CEIL}), falling back");
        return AIR_THRESHOLD_HU;
    }
    thr
}

#[cfg(test)]
mod tests {
    use super::{estimate_air_threshold, segment_lungs};
    use crate::consts::AIR_THRESHOLD_HU;
    use crate::phantoms::{chest_phantom, pneumonectomy_phantom, test_spec};
    use crate::segment::{segment_body, SegmentError, Stage};
    use crate::{BinaryMask, CtScan};
    use ndarray::Array3;

    #[test]
    fn test_lungs_two_components() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let lungs = segment_lungs(&scan, &body, &test_spec()).unwrap();

        assert!(!lungs.single_lung);
        assert!(!lungs.mask.is_empty());
        assert!(lungs.mask.is_subset_of(&body));

        // 左右肺内部体素.
        assert!(lungs.mask[(8, 8, 5)]);
        assert!(lungs.mask[(8, 8, 14)]);
        // 气管与体外连通, 不属于肺.
        assert!(!lungs.mask[(2, 9, 9)]);
        // 体外背景不属于肺.
        assert!(!lungs.mask[(8, 0, 0)]);
    }

    #[test]
    fn test_lungs_closing_recovers_nodule() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let lungs = segment_lungs(&scan, &body, &test_spec()).unwrap();

        // 结节是组织密度, 不通过空气阈值, 但闭运算应将其归入肺掩膜.
        assert!(lungs.mask[(8, 9, 6)], "结节孔洞应被闭运算封闭");
    }

    #[test]
    fn test_lungs_single_lung_diagnostic() {
        let scan = pneumonectomy_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let lungs = segment_lungs(&scan, &body, &test_spec()).unwrap();

        assert!(lungs.single_lung);
        assert!(lungs.mask[(8, 8, 5)]);
        assert!(!lungs.mask[(8, 8, 14)]);
    }

    #[test]
    fn test_lungs_empty_interior() {
        // 实心组织块: 身体内没有空气.
        let scan = CtScan::from_raw(Array3::from_elem((4, 8, 8), 40.0f32), [1.0; 3], [0.0; 3]);
        let body = BinaryMask::from_fn((4, 8, 8), [1.0; 3], [0.0; 3], |_| true);
        let err = segment_lungs(&scan, &body, &test_spec()).unwrap_err();
        assert_eq!(err, SegmentError::EmptyMask(Stage::Lungs));
    }

    #[test]
    fn test_estimate_air_threshold_bimodal() {
        // 双峰分布: 空气簇与组织簇之间应出现阈值.
        let scan = CtScan::from_raw(
            Array3::from_shape_fn((2, 10, 10), |(_, h, _)| {
                if h < 5 {
                    -850.0 + h as f32 * 10.0
                } else {
                    -40.0 + h as f32 * 5.0
                }
            }),
            [1.0; 3],
            [0.0; 3],
        );
        let body = BinaryMask::from_fn((2, 10, 10), [1.0; 3], [0.0; 3], |_| true);

        let thr = estimate_air_threshold(&scan, &body);
        assert!(thr > -810.0, "阈值 {thr} 应高于空气簇");
        assert!(thr < -40.0, "阈值 {thr} 应低于组织簇");
    }

    #[test]
    fn test_estimate_air_threshold_fallback() {
        // 常数图像: 无法分类, 回退默认值.
        let scan = CtScan::from_raw(Array3::from_elem((2, 4, 4), -600.0f32), [1.0; 3], [0.0; 3]);
        let body = BinaryMask::from_fn((2, 4, 4), [1.0; 3], [0.0; 3], |_| true);
        assert_eq!(estimate_air_threshold(&scan, &body), AIR_THRESHOLD_HU);

        // 全部取值都在合法窗口之外: 同样回退.
        let scan = CtScan::from_raw(
            Array3::from_shape_fn((2, 4, 4), |(_, h, _)| -1020.0 + h as f32),
            [1.0; 3],
            [0.0; 3],
        );
        let body = BinaryMask::from_fn((2, 4, 4), [1.0; 3], [0.0; 3], |_| true);
        assert_eq!(estimate_air_threshold(&scan, &body), AIR_THRESHOLD_HU);
    }
}
