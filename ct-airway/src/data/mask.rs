use std::ops::{Index, IndexMut};

use ndarray::iter::{Iter, IterMut};
use ndarray::{Array3, ArrayView, ArrayView2, ArrayViewMut2, Axis, Ix2, Ix3};

use super::GridGeometry;
use crate::{Idx2d, Idx3d};

/// 二值分割掩膜 (身体 / 肺 / 气道), 与其来源扫描同形状.
///
/// 掩膜由一个流水线阶段一次性产出, 产出后不再修改; 消费方只读.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    data: Array3<bool>,
    pix_dim: [f64; 3],
    origin: [f64; 3],
}

impl GridGeometry for BinaryMask {
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

impl Index<Idx3d> for BinaryMask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for BinaryMask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl BinaryMask {
    /// 创建一个全 `false` 的掩膜.
    pub fn falses(shape: Idx3d, pix_dim: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            data: Array3::from_elem(shape, false),
            pix_dim,
            origin,
        }
    }

    /// 创建一个与 `like` 几何信息相同的全 `false` 掩膜.
    #[inline]
    pub fn falses_like(like: &impl GridGeometry) -> Self {
        Self::falses(like.shape(), like.pix_dim(), like.origin())
    }

    /// 根据体素级谓词 `pred` 创建掩膜.
    pub fn from_fn(
        shape: Idx3d,
        pix_dim: [f64; 3],
        origin: [f64; 3],
        pred: impl Fn(Idx3d) -> bool,
    ) -> Self {
        Self {
            data: Array3::from_shape_fn(shape, pred),
            pix_dim,
            origin,
        }
    }

    /// 根据裸布尔数据和几何元信息直接创建掩膜实体.
    pub fn from_raw(data: Array3<bool>, pix_dim: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            data,
            pix_dim,
            origin,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, bool, Ix3> {
        self.data.view()
    }

    /// 获取给定位置的掩膜值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&bool> {
        self.data.get(pos)
    }

    /// 获取掩膜中为真的体素个数.
    #[inline]
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 掩膜是否不含任何为真的体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|p| *p)
    }

    /// 以行优先序迭代所有为真的体素索引.
    pub fn true_positions(&self) -> impl Iterator<Item = Idx3d> + '_ {
        self.data
            .indexed_iter()
            .filter_map(|(pos, &v)| v.then_some(pos))
    }

    /// 获得掩膜的补集.
    pub fn complement(&self) -> Self {
        Self {
            data: self.data.map(|v| !v),
            pix_dim: self.pix_dim,
            origin: self.origin,
        }
    }

    /// 获得两个掩膜的交集. 形状不一致时程序 panic.
    pub fn intersect(&self, other: &Self) -> Self {
        assert_eq!(self.shape(), other.shape(), "掩膜形状不一致");
        Self {
            data: ndarray::Zip::from(&self.data)
                .and(&other.data)
                .map_collect(|a, b| *a && *b),
            pix_dim: self.pix_dim,
            origin: self.origin,
        }
    }

    /// `self` 的所有真体素是否都包含在 `other` 中?
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| !*a || *b)
    }

    /// 获取 3D 掩膜 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> MaskSlice<'_> {
        MaskSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取 3D 掩膜 z 空间的第 `z_index` 层可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at_mut(&mut self, z_index: usize) -> MaskSliceMut<'_> {
        MaskSliceMut::new(self.data.index_axis_mut(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 掩膜水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = MaskSlice> {
        self.data.axis_iter(Axis(0)).map(MaskSlice::new)
    }

    /// 获取能按升序迭代 3D 掩膜水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = MaskSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(MaskSliceMut::new)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl BinaryMask {
    /// 借助 `rayon`, 并行地对 3D 掩膜每个水平不可变切片实施 `op` 操作.
    pub fn par_for_each_slice<F>(&self, op: F)
    where
        F: Fn(MaskSlice) + Sync + Send,
    {
        self.data
            .view()
            .axis_iter(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(MaskSlice::new(v));
            });
    }

    /// 借助 `rayon`, 并行地对 3D 掩膜每个水平可变切片实施 `op` 操作.
    /// 该操作会同时携带 z 方向索引信息.
    pub fn par_for_each_indexed_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(usize, MaskSliceMut) + Sync + Send,
    {
        self.data
            .view_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, v)| {
                op(i, MaskSliceMut::new(v));
            });
    }
}

/// 不可变、借用的二维水平掩膜切片.
pub struct MaskSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`BinaryMask`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, bool>,
}

impl Index<Idx2d> for MaskSlice<'_> {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维水平掩膜切片.
pub struct MaskSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`BinaryMask`].
    ///
    /// 这里有意把代码写死为 `ArrayViewMut` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayViewMut2<'a, bool>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 获取可以迭代并修改切片像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, bool, Ix2> {
        self.data.iter_mut()
    }

    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut bool> {
        self.data.get_mut(pos)
    }

    /// 将 `it` 给出的所有像素置为 `value`. 越界索引被静默忽略.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, value: bool) {
        for pos in it.into_iter() {
            if let Some(p) = self.data.get_mut(pos) {
                *p = value;
            }
        }
    }
}

impl Index<Idx2d> for MaskSliceMut<'_> {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for MaskSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 掩膜切片不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<bool> {
                self.data.view()
            }

            /// 获取可以迭代切片像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, bool, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&bool> {
                self.data.get(pos)
            }

            /// 切片的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 获得切片的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得切片的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 切片的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计切片中为真的像素总个数.
            #[inline]
            pub fn count_true(&self) -> usize {
                self.data.iter().filter(|&p| *p).count()
            }

            /// 以行优先规则, 获取能迭代切片所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &bool)> {
                self.data.indexed_iter()
            }

            /// 判断一个索引是否位于切片的边缘.
            #[inline]
            pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
                h == 0
                    || h.saturating_add(1) == self.height()
                    || w == 0
                    || w.saturating_add(1) == self.width()
            }
        }
    };
}

impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, bool>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, bool>);
