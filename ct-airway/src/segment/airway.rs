//! 气道树提取.

use ordered_float::NotNan;

use super::{SegmentError, SegmentResult, SegmentSpec, Stage};
use crate::labeling::flood_component;
use crate::{BinaryMask, CtScan, GridGeometry, Idx3d};

/// 气道树提取结果.
#[derive(Debug, Clone)]
pub struct AirwayTree {
    /// 气道掩膜: 含种子的唯一 6-连通空气分量.
    pub mask: BinaryMask,

    /// 实际使用的气管种子体素.
    pub seed: Idx3d,
}

/// 从身体掩膜中提取气管/支气管树.
///
/// 空气阈值化在 **整个身体掩膜** 上进行而不限于肺掩膜, 因为气管向上
/// 延伸超出肺的范围. 掩膜取含 `seed` 的唯一 6-连通分量: 管状的气道树
/// 由此与肺实质中互不连通的空气区域分离.
///
/// `seed` 为 `None` 时自动估计: 自顶部 (z = 0) 起逐切片寻找身体内的
/// 空气体素, 取与身体包围盒 h/w 中心物理距离最近者 (解剖学上即气管
/// 上端). 对相同输入, 估计结果是确定性的.
///
/// # 边界情况
///
/// 肺实质内恰好与气道相触的小块滞留空气会被吸收进该分量.
/// 这是可接受的近似, 不做进一步修正.
///
/// # 错误
///
/// - [`SegmentError::SeedNotAir`]: 调用方给出的种子越界、不在身体内
///   或不满足空气阈值.
/// - [`SegmentError::EmptyMask`]: 身体内不存在任何空气体素,
///   无法估计种子.
pub fn extract_airways(
    scan: &CtScan,
    body: &BinaryMask,
    seed: Option<Idx3d>,
    spec: &SegmentSpec,
) -> SegmentResult<AirwayTree> {
    assert_eq!(scan.shape(), body.shape(), "扫描与身体掩膜形状不一致");

    let thr = spec.air_threshold_hu();
    let air = BinaryMask::from_fn(scan.shape(), scan.pix_dim(), scan.origin(), |pos| {
        body[pos] && scan[pos] < thr
    });

    let seed = match seed {
        Some(given) => {
            if !air.get(given).is_some_and(|v| *v) {
                return Err(SegmentError::SeedNotAir(given));
            }
            given
        }
        None => estimate_seed(&air, body)?,
    };

    let mask = flood_component(&air, seed);
    if mask.is_empty() {
        return Err(SegmentError::EmptyMask(Stage::Airways));
    }
    log::debug!(
        "airway tree: seed {seed:?}, {} of {} air voxels",
        mask.count_true(),
        air.count_true()
    );
    Ok(AirwayTree { mask, seed })
}

/// 估计气管上端种子: 最靠近身体包围盒顶部中心的身体内空气体素.
fn estimate_seed(air: &BinaryMask, body: &BinaryMask) -> SegmentResult<Idx3d> {
    // 身体包围盒的 h/w 中心.
    let (mut h_min, mut h_max, mut w_min, mut w_max) = (usize::MAX, 0, usize::MAX, 0);
    for (_, h, w) in body.true_positions() {
        (h_min, h_max) = (h_min.min(h), h_max.max(h));
        (w_min, w_max) = (w_min.min(w), w_max.max(w));
    }
    if h_min > h_max {
        return Err(SegmentError::EmptyMask(Stage::Airways));
    }
    let (ch, cw) = (
        (h_min + h_max) as f64 / 2.0,
        (w_min + w_max) as f64 / 2.0,
    );

    let [_, hm, wm] = air.pix_dim();
    for z in 0..air.len_z() {
        let sli = air.slice_at(z);
        let found = sli
            .indexed_iter()
            .filter_map(|(pos, &v)| v.then_some(pos))
            .min_by_key(|(h, w)| {
                let dh = (*h as f64 - ch) * hm;
                let dw = (*w as f64 - cw) * wm;
                // 距离平方恒为有限值, 可直接 unwrap.
                NotNan::new(dh * dh + dw * dw).unwrap()
            });
        if let Some((h, w)) = found {
            return Ok((z, h, w));
        }
    }
    Err(SegmentError::EmptyMask(Stage::Airways))
}

#[cfg(test)]
mod tests {
    use super::extract_airways;
    use crate::labeling::label_components;
    use crate::phantoms::{chest_phantom, test_spec};
    use crate::segment::{segment_body, SegmentError};

    #[test]
    fn test_airway_single_component() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, None, &test_spec()).unwrap();

        // 自动估计的种子位于气管上端.
        assert_eq!(tree.seed, (0, 9, 9));
        // 气管柱: 11 层, 每层 2x2.
        assert_eq!(tree.mask.count_true(), 44);
        assert!(tree.mask[(5, 10, 10)]);

        // 肺实质空气与气道不连通, 不被吸收.
        assert!(!tree.mask[(8, 8, 5)]);
        assert!(!tree.mask[(8, 8, 14)]);

        // 构造保证: 输出恰为一个连通分量.
        assert_eq!(label_components(&tree.mask).len(), 1);
    }

    #[test]
    fn test_airway_explicit_seed() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, Some((4, 10, 9)), &test_spec()).unwrap();
        assert_eq!(tree.seed, (4, 10, 9));
        assert_eq!(tree.mask.count_true(), 44);
    }

    #[test]
    fn test_airway_seed_not_air() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();

        // 组织体素不是空气.
        let err = extract_airways(&scan, &body, Some((8, 4, 4)), &test_spec()).unwrap_err();
        assert_eq!(err, SegmentError::SeedNotAir((8, 4, 4)));

        // 体外空气不在身体掩膜内.
        let err = extract_airways(&scan, &body, Some((8, 0, 0)), &test_spec()).unwrap_err();
        assert_eq!(err, SegmentError::SeedNotAir((8, 0, 0)));
    }

    #[test]
    fn test_airway_idempotent() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let a = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        let b = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.mask, b.mask);
    }

    #[test]
    fn test_airway_absorbs_touching_pocket() {
        // 与气管相触的滞留空气被吸收 (可接受的近似).
        // 口袋放在肺上方 (z = 2), 只与气管侧壁相邻.
        let mut data = chest_phantom().data().to_owned();
        data[(2, 9, 11)] = -820.0;
        let scan = crate::CtScan::from_raw(data, [1.0; 3], [0.0; 3]);

        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        assert!(tree.mask[(2, 9, 11)]);
        assert_eq!(tree.mask.count_true(), 45);
    }
}
