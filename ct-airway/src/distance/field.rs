use std::ops::Index;

use binary_heap_plus::BinaryHeap;
use itertools::iproduct;
use ndarray::{Array3, ArrayView, Ix3};
use ordered_float::NotNan;

use super::{QueryError, QueryResult, QuerySpec, RegionDistanceStats};
use crate::segment::AirwayTree;
use crate::{BinaryMask, GridGeometry, Idx3d};

/// 从种子出发的测地距离场.
///
/// 每个气道体素保存它到种子的沿图最短物理距离 (mm); 从种子不可达的
/// 体素 (含掩膜外体素) 以 [`DistanceField::UNREACHABLE`] 哨兵值表示.
///
/// # 不变式
///
/// 1. 种子自身的距离为 0, 其余可达体素的距离恒为正;
/// 2. 距离沿任意最短路径单调非减;
/// 3. 对相同掩膜与种子重复计算, 结果逐位一致.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    data: Array3<f64>,
    seed: Idx3d,
    pix_dim: [f64; 3],
    origin: [f64; 3],
}

impl GridGeometry for DistanceField {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.pix_dim
    }

    #[inline]
    fn origin(&self) -> [f64; 3] {
        self.origin
    }
}

impl Index<Idx3d> for DistanceField {
    type Output = f64;

    /// 原始距离值, 不可达体素为 [`DistanceField::UNREACHABLE`].
    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl DistanceField {
    /// 不可达体素的哨兵值.
    pub const UNREACHABLE: f64 = f64::INFINITY;

    /// 在气道掩膜的隐式体素图上计算从 `seed` 出发的单源最短路距离场.
    ///
    /// 节点为掩膜内体素, 边连接 6-相邻体素对, 边权为跨越轴向的物理
    /// 间距. 即使 6-连通下单轴边权一致, 各向异性间距仍使不同轴的边权
    /// 不同, 因此无条件使用优先队列驱动的 Dijkstra 展开 (均匀代价的
    /// 宽度展开只在各向同性间距下成立). 平手顺序不影响结果:
    /// 最短路 **数值** 与展开顺序无关.
    ///
    /// `mask[seed]` 必须为真, 否则程序 panic
    /// ([`crate::segment::extract_airways`] 产出的种子天然满足).
    pub fn compute(mask: &BinaryMask, seed: Idx3d) -> Self {
        assert!(
            mask.get(seed).is_some_and(|v| *v),
            "种子体素必须位于气道掩膜内"
        );
        let [zm, hm, wm] = mask.pix_dim();
        let mut data = Array3::from_elem(mask.shape(), Self::UNREACHABLE);

        // 堆顶为当前暂定距离最小的体素.
        let mut heap: BinaryHeap<(f64, Idx3d), _> =
            BinaryHeap::new_by(|a: &(f64, Idx3d), b: &(f64, Idx3d)| b.0.total_cmp(&a.0));
        heap.reserve(64);
        data[seed] = 0.0;
        heap.push((0.0, seed));

        while let Some((d, pos)) = heap.pop() {
            if d > data[pos] {
                continue; // 过期堆项
            }
            let (z, h, w) = pos;
            let steps = [
                ((z.wrapping_sub(1), h, w), zm),
                ((z.saturating_add(1), h, w), zm),
                ((z, h.wrapping_sub(1), w), hm),
                ((z, h.saturating_add(1), w), hm),
                ((z, h, w.wrapping_sub(1)), wm),
                ((z, h, w.saturating_add(1)), wm),
            ];
            for (neigh, weight) in steps {
                if !mask.check(&neigh) || !mask[neigh] {
                    continue;
                }
                let relaxed = d + weight;
                if relaxed < data[neigh] {
                    data[neigh] = relaxed;
                    heap.push((relaxed, neigh));
                }
            }
        }

        Self {
            data,
            seed,
            pix_dim: mask.pix_dim(),
            origin: mask.origin(),
        }
    }

    /// 对 [`AirwayTree`] 计算距离场的便捷入口.
    #[inline]
    pub fn from_airway(tree: &AirwayTree) -> Self {
        Self::compute(&tree.mask, tree.seed)
    }

    /// 计算所用的种子体素.
    #[inline]
    pub fn seed(&self) -> Idx3d {
        self.seed
    }

    /// 获得距离数据的一份不可变 shallow copy.
    /// 不可达体素为 [`Self::UNREACHABLE`].
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f64, Ix3> {
        self.data.view()
    }

    /// 获取 `pos` 处的距离. 体素不可达或越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<f64> {
        self.data.get(pos).copied().filter(|d| d.is_finite())
    }

    /// `pos` 是否从种子可达?
    #[inline]
    pub fn is_reachable(&self, pos: Idx3d) -> bool {
        self.get(pos).is_some()
    }

    /// 查询 `target` 的 "口到点" 距离.
    ///
    /// `target` 在气道内且有已定义的距离时直接返回该值; 否则在
    /// `spec.search_radius_mm()` 的物理半径内寻找 (按物理欧氏距离)
    /// 最近的、有已定义距离的气道体素, 返回其场值加上 `target` 到它
    /// 的欧氏距离. 这近似了结节等紧贴气道外侧的点 "先到最近气道壁,
    /// 再沿气道" 的路径. 等距平手时取行优先序更早的体素, 结果确定.
    ///
    /// `target` 越界时程序 panic.
    ///
    /// # 错误
    ///
    /// 半径内没有任何有定义距离的气道体素时返回
    /// [`QueryError::UnreachableTarget`].
    pub fn distance_to_point(&self, target: Idx3d, spec: &QuerySpec) -> QueryResult<f64> {
        assert!(self.check(&target), "目标体素越界");
        if let Some(direct) = self.get(target) {
            return Ok(direct);
        }

        let radius = spec.search_radius_mm();
        let [zm, hm, wm] = self.pix_dim;
        let (zl, hl, wl) = self.shape();
        let (z, h, w) = target;

        // 搜索半径在三个轴上的体素跨度.
        let (dz, dh, dw) = (
            (radius / zm) as usize,
            (radius / hm) as usize,
            (radius / wm) as usize,
        );
        let z_range = z.saturating_sub(dz)..=z.saturating_add(dz).min(zl - 1);
        let h_range = h.saturating_sub(dh)..=h.saturating_add(dh).min(hl - 1);
        let w_range = w.saturating_sub(dw)..=w.saturating_add(dw).min(wl - 1);

        let mut best: Option<(NotNan<f64>, f64)> = None;
        for pos in iproduct!(z_range, h_range, w_range) {
            let Some(through) = self.get(pos) else {
                continue;
            };
            let euclid = self.physical_distance(&target, &pos);
            if euclid > radius {
                continue;
            }
            // 欧氏距离恒为有限值, 可直接 unwrap.
            let key = NotNan::new(euclid).unwrap();
            if best.map_or(true, |(cur, _)| key < cur) {
                best = Some((key, through + euclid));
            }
        }

        best.map(|(_, total)| total)
            .ok_or(QueryError::UnreachableTarget(target))
    }

    /// 批量点查询. 每条查询独立成败, 单条失败不影响其余.
    ///
    /// 查询按迭代顺序逐条惰性求值, 长批量的协作式取消由调用方在
    /// 迭代之间自行实施.
    pub fn distance_to_points<I>(&self, targets: I, spec: &QuerySpec) -> Vec<QueryResult<f64>>
    where
        I: IntoIterator<Item = Idx3d>,
    {
        targets
            .into_iter()
            .map(|target| self.distance_to_point(target, spec))
            .collect()
    }

    /// 计算一个目标区域 (如结节掩膜) 的距离统计.
    ///
    /// 对区域内每个体素执行 [`Self::distance_to_point`];
    /// 单体素不可达时跳过该体素.
    ///
    /// # 错误
    ///
    /// - [`QueryError::ShapeMismatch`]: 区域掩膜与距离场形状不一致;
    /// - [`QueryError::EmptyRegion`]: 区域掩膜全为假;
    /// - [`QueryError::UnreachableTarget`]: 区域内没有任何可达体素
    ///   (携带区域内行优先序第一个体素).
    pub fn region_stats(
        &self,
        region: &BinaryMask,
        spec: &QuerySpec,
    ) -> QueryResult<RegionDistanceStats> {
        if self.shape() != region.shape() {
            return Err(QueryError::ShapeMismatch);
        }

        let mut first = None;
        let mut dists: Vec<f64> = Vec::new();
        for pos in region.true_positions() {
            first.get_or_insert(pos);
            if let Ok(d) = self.distance_to_point(pos, spec) {
                dists.push(d);
            }
        }
        let Some(first) = first else {
            return Err(QueryError::EmptyRegion);
        };
        if dists.is_empty() {
            return Err(QueryError::UnreachableTarget(first));
        }

        dists.sort_by(f64::total_cmp);
        let n = dists.len();
        let median = if n % 2 == 1 {
            dists[n / 2]
        } else {
            (dists[n / 2 - 1] + dists[n / 2]) / 2.0
        };
        Ok(RegionDistanceStats {
            min: dists[0],
            mean: dists.iter().sum::<f64>() / n as f64,
            median,
            max: dists[n - 1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::DistanceField;
    use crate::distance::{QueryError, QuerySpec};
    use crate::phantoms::{chest_phantom, test_spec};
    use crate::segment::{extract_airways, segment_body};
    use crate::{BinaryMask, GridGeometry, Idx3d};

    /// 3x3x3 网格中的 "加号" 掩膜: 中心 + 六个面相邻体素.
    fn plus_mask(pix_dim: [f64; 3]) -> BinaryMask {
        let mut m = BinaryMask::falses((3, 3, 3), pix_dim, [0.0; 3]);
        m[(1, 1, 1)] = true;
        for pos in [(0, 1, 1), (2, 1, 1), (1, 0, 1), (1, 2, 1), (1, 1, 0), (1, 1, 2)] {
            m[pos] = true;
        }
        m
    }

    #[test]
    fn test_plus_mask_unit_spacing() {
        let m = plus_mask([1.0; 3]);
        let field = DistanceField::compute(&m, (1, 1, 1));

        // 种子距离为 0, 六个面相邻体素距离为 1.0.
        assert_eq!(field.get((1, 1, 1)), Some(0.0));
        for pos in [(0, 1, 1), (2, 1, 1), (1, 0, 1), (1, 2, 1), (1, 1, 0), (1, 1, 2)] {
            assert_eq!(field.get(pos), Some(1.0));
        }

        // 其余 20 个角/棱体素不在掩膜内, 距离未定义.
        let undefined = iter_cube()
            .filter(|pos| field.get(*pos).is_none())
            .count();
        assert_eq!(undefined, 20);

        // 半径不足时角体素不可达; 默认紧邻半径下回退到
        // "最近气道体素 + 欧氏距离".
        let tiny = QuerySpec::new(0.5).unwrap();
        assert_eq!(
            field.distance_to_point((0, 0, 0), &tiny),
            Err(QueryError::UnreachableTarget((0, 0, 0)))
        );
        let adjacent = QuerySpec::adjacent(&field);
        let got = field.distance_to_point((0, 0, 0), &adjacent).unwrap();
        assert!((got - (1.0 + 2.0f64.sqrt())).abs() < 1e-12);
        assert_eq!(field.distance_to_point((0, 0, 1), &adjacent), Ok(2.0));
    }

    fn iter_cube() -> impl Iterator<Item = Idx3d> {
        itertools::iproduct!(0..3usize, 0..3usize, 0..3usize)
    }

    #[test]
    fn test_full_cube_corner_via_axis_steps() {
        // 全真 3x3x3 掩膜: 角体素经三步轴向路径可达.
        let m = BinaryMask::from_fn((3, 3, 3), [1.0; 3], [0.0; 3], |_| true);
        let field = DistanceField::compute(&m, (1, 1, 1));
        assert_eq!(field.get((0, 0, 0)), Some(3.0));
        assert_eq!(field.get((0, 0, 1)), Some(2.0));
    }

    #[test]
    fn test_anisotropic_weights() {
        let m = plus_mask([2.5, 1.0, 0.5]);
        let field = DistanceField::compute(&m, (1, 1, 1));
        assert_eq!(field.get((0, 1, 1)), Some(2.5));
        assert_eq!(field.get((1, 0, 1)), Some(1.0));
        assert_eq!(field.get((1, 1, 0)), Some(0.5));
    }

    #[test]
    fn test_monotone_along_tube() {
        // 沿 z 的直管: 距离沿路径单调非减.
        let m = BinaryMask::from_fn((8, 1, 1), [1.5, 1.0, 1.0], [0.0; 3], |_| true);
        let field = DistanceField::compute(&m, (0, 0, 0));
        let mut last = -1.0;
        for z in 0..8 {
            let d = field.get((z, 0, 0)).unwrap();
            assert!(d >= last);
            last = d;
        }
        assert_eq!(field.get((7, 0, 0)), Some(10.5));
    }

    #[test]
    fn test_spacing_scaling_scales_distances() {
        // 物理间距整体缩放 k 倍, 距离场精确缩放 k 倍 (k 取 2 的幂).
        let shape = (4, 5, 5);
        let pred = |(z, h, w): Idx3d| (z + h + w) % 3 != 0 || z == 0;
        let m1 = BinaryMask::from_fn(shape, [1.0, 0.5, 0.75], [0.0; 3], pred);
        let m2 = BinaryMask::from_fn(shape, [2.0, 1.0, 1.5], [0.0; 3], pred);

        let f1 = DistanceField::compute(&m1, (0, 0, 0));
        let f2 = DistanceField::compute(&m2, (0, 0, 0));
        for (a, b) in f1.data().iter().zip(f2.data().iter()) {
            if a.is_finite() {
                assert_eq!(*b, *a * 2.0);
            } else {
                assert!(b.is_infinite());
            }
        }
    }

    #[test]
    fn test_compute_deterministic() {
        let m = BinaryMask::from_fn((5, 6, 7), [1.25, 0.8, 0.8], [0.0; 3], |(z, h, w)| {
            (z * h + w) % 2 == 0 || h == 3
        });
        let seed = (0, 3, 0);
        let a = DistanceField::compute(&m, seed);
        let b = DistanceField::compute(&m, seed);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    #[should_panic(expected = "种子体素必须位于气道掩膜内")]
    fn test_compute_seed_contract() {
        let m = plus_mask([1.0; 3]);
        DistanceField::compute(&m, (0, 0, 0));
    }

    #[test]
    fn test_phantom_nodule_distance() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        let field = DistanceField::from_airway(&tree);

        assert_eq!(field.get(field.seed()), Some(0.0));
        // 气管柱内: 距离即 z 方向物理路程.
        assert_eq!(field.get((8, 9, 9)), Some(8.0));

        // 结节体素 (8, 9, 5): 最近气道体素为 (8, 9, 9), 欧氏距离 4 mm.
        let wide = QuerySpec::new(5.0).unwrap();
        assert_eq!(field.distance_to_point((8, 9, 5), &wide), Ok(12.0));

        // 默认紧邻半径下, 远离气道的结节不可达.
        let adjacent = QuerySpec::adjacent(&field);
        assert_eq!(
            field.distance_to_point((8, 9, 5), &adjacent),
            Err(QueryError::UnreachableTarget((8, 9, 5)))
        );

        // 批量查询: 单条失败不影响其余.
        let results = field.distance_to_points([(8, 9, 9), (8, 9, 5)], &adjacent);
        assert_eq!(results[0], Ok(8.0));
        assert!(results[1].is_err());
    }

    #[test]
    fn test_phantom_disconnected_bubble_unreachable() {
        // 肺实质空气泡与气道不连通: 默认半径下查询失败,
        // 大半径下回退到最近气道体素近似.
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        let field = DistanceField::from_airway(&tree);

        let bubble = (8, 8, 5); // 左肺内部
        assert!(!tree.mask[bubble]);
        assert!(!field.is_reachable(bubble));
        let adjacent = QuerySpec::adjacent(&field);
        assert_eq!(
            field.distance_to_point(bubble, &adjacent),
            Err(QueryError::UnreachableTarget(bubble))
        );
        let wide = QuerySpec::new(10.0).unwrap();
        assert!(field.distance_to_point(bubble, &wide).is_ok());
    }

    #[test]
    fn test_region_stats_nodule() {
        let scan = chest_phantom();
        let body = segment_body(&scan, &test_spec()).unwrap();
        let tree = extract_airways(&scan, &body, None, &test_spec()).unwrap();
        let field = DistanceField::from_airway(&tree);

        // 结节区域: z = 8, h ∈ [9, 10], w ∈ [5, 6].
        let nodule = BinaryMask::from_fn(
            field.shape(),
            field.pix_dim(),
            field.origin(),
            |(z, h, w)| z == 8 && (9..=10).contains(&h) && (5..=6).contains(&w),
        );

        let wide = QuerySpec::new(5.0).unwrap();
        let stats = field.region_stats(&nodule, &wide).unwrap();
        // 体素距离分别为 12, 11, 13, 12.
        assert_eq!(stats.min, 11.0);
        assert_eq!(stats.max, 13.0);
        assert_eq!(stats.mean, 12.0);
        assert_eq!(stats.median, 12.0);

        // 空区域与形状不一致的区域.
        let empty = BinaryMask::falses_like(&field);
        assert_eq!(field.region_stats(&empty, &wide), Err(QueryError::EmptyRegion));
        let wrong = BinaryMask::falses((1, 1, 1), [1.0; 3], [0.0; 3]);
        assert_eq!(field.region_stats(&wrong, &wide), Err(QueryError::ShapeMismatch));

        // 全部不可达的区域: 返回区域首体素.
        let tiny = QuerySpec::new(0.5).unwrap();
        assert_eq!(
            field.region_stats(&nodule, &tiny),
            Err(QueryError::UnreachableTarget((8, 9, 5)))
        );
    }
}
