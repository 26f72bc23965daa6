//! 6-连通连通分量标注.
//!
//! 以扁平化体素索引为竞技场 (arena) 的并查集实现, 避免任何指针式图节点.
//! 两个体素属于同一分量, 当且仅当存在一条 6-相邻 (钻石型) 路径连接它们,
//! 且路径上的所有体素在掩膜中均为真.
//!
//! `rayon` feature 下提供两阶段并行版本: 每个水平切片先并行地做局部
//! 标注, 然后一趟顺序归并把相邻切片间的标签对接起来. 两个版本的输出
//! 逐位一致.

use std::collections::{HashMap, HashSet, VecDeque};

use itertools::Itertools;
use ndarray::{Array3, ArrayView, Ix3};

use crate::{BinaryMask, GridGeometry, Idx3d};

/// 以连续非负整数为元素的并查集. 按大小合并, 查找时做路径减半.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    /// 创建 `n` 个独立元素的并查集.
    ///
    /// `n` 超出 `u32` 表达范围时程序 panic.
    pub fn new(n: usize) -> Self {
        assert!(u32::try_from(n).is_ok(), "元素个数超出 u32 范围");
        Self {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
        }
    }

    /// 查找 `x` 所在集合的代表元.
    pub fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            // 路径减半: 让 x 指向祖父.
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    /// 合并 `a` 与 `b` 所在的集合. 若两者本就同属一个集合则返回 `false`.
    pub fn union(&mut self, a: u32, b: u32) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        // 大小相同时固定选较小的代表元, 保证结果与合并顺序无关.
        let (root, child) = match self.size[ra as usize].cmp(&self.size[rb as usize]) {
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Equal if ra < rb => (ra, rb),
            std::cmp::Ordering::Equal => (rb, ra),
        };
        self.parent[child as usize] = root;
        self.size[root as usize] += self.size[child as usize];
        true
    }
}

/// 一次连通分量标注的完整结果.
///
/// 标签值 `0` 代表背景; 分量标签为 `1..=len`, 按行优先首次出现的顺序
/// 分配, 因此对相同输入每次运行都产生相同标注.
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    labels: Array3<u32>,
    counts: Vec<usize>,
    pix_dim: [f64; 3],
    origin: [f64; 3],
}

impl GridGeometry for ComponentLabels {
    #[inline]
    fn shape(&self) -> Idx3d {
        self.labels.dim()
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

impl ComponentLabels {
    /// 分量个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// 是否一个分量都没有?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 获取 `pos` 处的标签. `0` 代表背景. 越界时 panic.
    #[inline]
    pub fn label_at(&self, pos: Idx3d) -> u32 {
        self.labels[pos]
    }

    /// 获取标签 `label` 对应分量的体素数. `label` 不存在时 panic.
    #[inline]
    pub fn count_of(&self, label: u32) -> usize {
        assert!(label >= 1, "标签 0 是背景");
        self.counts[label as usize - 1]
    }

    /// 获得标签数据的一份不可变 shallow copy.
    #[inline]
    pub fn labels(&self) -> ArrayView<'_, u32, Ix3> {
        self.labels.view()
    }

    /// 体素数最大的分量标签. 体素数相同时取较小标签. 无分量时返回 `None`.
    pub fn largest(&self) -> Option<u32> {
        self.ranked().first().copied()
    }

    /// 按体素数从大到小排序的所有分量标签. 体素数相同时较小标签在前.
    ///
    /// 这是 "largest-N" 选择规则的平手裁决: 较小标签即行优先序更早出现
    /// 的分量, 因此结果是确定性的.
    pub fn ranked(&self) -> Vec<u32> {
        (1..=self.counts.len() as u32)
            .sorted_by_key(|lbl| (std::cmp::Reverse(self.count_of(*lbl)), *lbl))
            .collect()
    }

    /// 提取标签 `label` 对应分量的二值掩膜.
    #[inline]
    pub fn mask_of(&self, label: u32) -> BinaryMask {
        self.mask_of_any(&[label])
    }

    /// 提取 `wanted` 中任一标签对应分量的并集掩膜.
    pub fn mask_of_any(&self, wanted: &[u32]) -> BinaryMask {
        let set: HashSet<u32> = wanted.iter().copied().collect();
        BinaryMask::from_fn(self.shape(), self.pix_dim, self.origin, |pos| {
            let lbl = self.labels[pos];
            lbl != 0 && set.contains(&lbl)
        })
    }

    /// 收集触碰指定轴边界平面的所有分量标签, 升序去重.
    ///
    /// `axes` 按 `[z, h, w]` 顺序指定要检查的轴. 例如 `[false, true, true]`
    /// 只检查四个侧面 (h/w 方向), 允许分量从 z 方向两端伸出.
    pub fn border_labels(&self, axes: [bool; 3]) -> Vec<u32> {
        let (zl, hl, wl) = self.shape();
        let mut found = HashSet::new();

        for ((z, h, w), &lbl) in self.labels.indexed_iter() {
            if lbl == 0 {
                continue;
            }
            let on_border = (axes[0] && (z == 0 || z + 1 == zl))
                || (axes[1] && (h == 0 || h + 1 == hl))
                || (axes[2] && (w == 0 || w + 1 == wl));
            if on_border {
                found.insert(lbl);
            }
        }
        found.into_iter().sorted().collect()
    }
}

/// 对掩膜的真体素做 6-连通分量标注.
///
/// 单趟正向扫描: 每个真体素与其 `-z`, `-h`, `-w` 方向的已访问邻居合并,
/// 然后按行优先首次出现顺序压缩标签.
pub fn label_components(mask: &BinaryMask) -> ComponentLabels {
    let (_, hl, wl) = mask.shape();
    let (stride_z, stride_h) = ((hl * wl) as u32, wl as u32);

    let mut uf = UnionFind::new(mask.size());
    let mut flat = 0u32;
    for ((z, h, w), &v) in mask.data().indexed_iter() {
        if v {
            if z > 0 && mask[(z - 1, h, w)] {
                uf.union(flat, flat - stride_z);
            }
            if h > 0 && mask[(z, h - 1, w)] {
                uf.union(flat, flat - stride_h);
            }
            if w > 0 && mask[(z, h, w - 1)] {
                uf.union(flat, flat - 1);
            }
        }
        flat += 1;
    }

    compact_roots(mask, |i, uf_ref: &mut UnionFind| uf_ref.find(i), uf)
}

/// 按行优先序将并查集代表元压缩为连续标签.
fn compact_roots<S>(
    mask: &BinaryMask,
    mut root_of: impl FnMut(u32, &mut S) -> u32,
    mut state: S,
) -> ComponentLabels {
    let mut labels = Array3::from_elem(mask.shape(), 0u32);
    let mut root_label: HashMap<u32, u32> = HashMap::new();
    let mut counts: Vec<usize> = Vec::new();

    let mut flat = 0u32;
    for (pos, &v) in mask.data().indexed_iter() {
        if v {
            let root = root_of(flat, &mut state);
            let lbl = *root_label.entry(root).or_insert_with(|| {
                counts.push(0);
                counts.len() as u32
            });
            counts[lbl as usize - 1] += 1;
            labels[pos] = lbl;
        }
        flat += 1;
    }

    ComponentLabels {
        labels,
        counts,
        pix_dim: mask.pix_dim(),
        origin: mask.origin(),
    }
}

/// 从 `seed` 出发, 以 6-连通规则提取含种子的唯一分量掩膜.
///
/// `mask[seed]` 必须为真, 否则程序 panic.
pub fn flood_component(mask: &BinaryMask, seed: Idx3d) -> BinaryMask {
    assert!(
        mask.get(seed).is_some_and(|v| *v),
        "种子体素必须位于掩膜内"
    );

    let mut component = BinaryMask::falses_like(mask);
    let mut q = VecDeque::with_capacity(64);
    component[seed] = true;
    q.push_back(seed);

    while let Some(cur) = q.pop_front() {
        for neigh in mask.diamond_neighbours(cur) {
            if mask[neigh] && !component[neigh] {
                component[neigh] = true;
                q.push_back(neigh);
            }
        }
    }
    component
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::{Array2, ArrayView2, Axis};
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

        /// 单个水平切片的 4-连通局部标注. 标签从 1 开始连续分配.
        fn label_slice_local(view: ArrayView2<bool>) -> (Array2<u32>, u32) {
            let &[hl, wl] = view.shape() else { unreachable!() };
            let mut uf = UnionFind::new(hl * wl);

            for ((h, w), &v) in view.indexed_iter() {
                if v {
                    let flat = (h * wl + w) as u32;
                    if h > 0 && view[(h - 1, w)] {
                        uf.union(flat, flat - wl as u32);
                    }
                    if w > 0 && view[(h, w - 1)] {
                        uf.union(flat, flat - 1);
                    }
                }
            }

            let mut labels = Array2::from_elem((hl, wl), 0u32);
            let mut root_label: HashMap<u32, u32> = HashMap::new();
            let mut next = 0u32;
            for ((h, w), &v) in view.indexed_iter() {
                if v {
                    let root = uf.find((h * wl + w) as u32);
                    labels[(h, w)] = *root_label.entry(root).or_insert_with(|| {
                        next += 1;
                        next
                    });
                }
            }
            (labels, next)
        }

        /// [`label_components`] 的两阶段并行版本.
        ///
        /// 阶段一并行地对每个水平切片做局部标注; 阶段二以一趟顺序扫描,
        /// 通过全局并查集把相邻切片上垂直相邻的局部标签合并; 最后按行
        /// 优先序压缩. 输出与顺序版本逐位一致.
        pub fn par_label_components(mask: &BinaryMask) -> ComponentLabels {
            let zl = mask.len_z();

            // 阶段一: 切片局部标注.
            let local: Vec<(Array2<u32>, u32)> = mask
                .data()
                .axis_iter(Axis(0))
                .into_par_iter()
                .map(label_slice_local)
                .collect();

            // 每个切片局部标签在全局临时编号空间中的偏移.
            let mut offsets = Vec::with_capacity(zl + 1);
            offsets.push(0u32);
            for (_, cnt) in local.iter() {
                offsets.push(offsets.last().unwrap() + cnt);
            }
            let total = *offsets.last().unwrap() as usize;

            // 阶段二: 跨切片边界归并.
            let mut uf = UnionFind::new(total);
            for z in 1..zl {
                let (prev, cur) = (&local[z - 1].0, &local[z].0);
                for ((h, w), &lbl) in cur.indexed_iter() {
                    let below = prev[(h, w)];
                    if lbl != 0 && below != 0 {
                        uf.union(offsets[z] + lbl - 1, offsets[z - 1] + below - 1);
                    }
                }
            }

            compact_roots(
                mask,
                |flat, uf_ref: &mut UnionFind| {
                    let (_, hl, wl) = mask.shape();
                    let z = flat as usize / (hl * wl);
                    let rem = flat as usize % (hl * wl);
                    let lbl = local[z].0[(rem / wl, rem % wl)];
                    debug_assert_ne!(lbl, 0);
                    uf_ref.find(offsets[z] + lbl - 1)
                },
                uf,
            )
        }
    }
}
