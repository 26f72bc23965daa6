use std::ops::Index;

use ndarray::{Array3, ArrayView, Ix3};

use crate::{Idx2d, Idx3d};

mod compact;
mod mask;

pub use compact::CompactMask;
pub use mask::{BinaryMask, MaskSlice, MaskSliceMut};

/// 3D 体数据 (扫描, 掩膜, 距离场) 的共用几何属性和部分通用操作.
///
/// 所有实现者都以 `(z, h, w)` 格式组织数据: 第一维为切片方向,
/// 后两维为自然图像的垂直/水平方向.
pub trait GridGeometry {
    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    ///
    /// 该值也可以通过 `self.{z_mm, height_mm, width_mm}` 分别获取.
    fn pix_dim(&self) -> [f64; 3];

    /// 获取体数据的物理原点偏移, 以毫米为单位, 格式为 `[z, h, w]`.
    fn origin(&self) -> [f64; 3];

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.pix_dim()[0]
    }

    /// 获取 height 方向 (自然 2D 图像的垂直方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.pix_dim()[1]
    }

    /// 获取 width 方向 (自然 2D 图像的水平方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.pix_dim()[2]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 计算两个体素中心之间的实际欧氏距离, 以毫米为单位.
    ///
    /// 该距离考虑了体素的各向异性.
    fn physical_distance(&self, (az, ah, aw): &Idx3d, (bz, bh, bw): &Idx3d) -> f64 {
        let [zm, hm, wm] = self.pix_dim();
        let dz = az.abs_diff(*bz) as f64 * zm;
        let dh = ah.abs_diff(*bh) as f64 * hm;
        let dw = aw.abs_diff(*bw) as f64 * wm;
        (dz * dz + dh * dh + dw * dw).sqrt()
    }

    /// 获取 `pos` 前后上下左右六个点的坐标.
    ///
    /// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
    fn diamond_neighbours(&self, (z, h, w): Idx3d) -> Vec<Idx3d> {
        [
            (z.wrapping_sub(1), h, w),
            (z.saturating_add(1), h, w),
            (z, h.wrapping_sub(1), w),
            (z, h.saturating_add(1), w),
            (z, h, w.wrapping_sub(1)),
            (z, h, w.saturating_add(1)),
        ]
        .into_iter()
        .filter(|p| self.check(p))
        .collect()
    }
}

/// 3D CT 扫描体数据, 包括 HU 体素值与物理几何元信息. HU 值以 `f32` 保存.
///
/// 该结构一经创建即不可变. 数据加载 (DICOM 解析, 间距归一化)
/// 由上游协作方完成, 本库只接受内存中已就绪的数组.
#[derive(Debug, Clone)]
pub struct CtScan {
    data: Array3<f32>,
    pix_dim: [f64; 3],
    origin: [f64; 3],
}

impl GridGeometry for CtScan {
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

impl Index<Idx3d> for CtScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl CtScan {
    /// 根据裸 HU 数据和几何元信息直接创建扫描实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 `(z, h, w)` 格式组织且各维非零.
    /// 2. `pix_dim` 按照 `[z, h, w]` 格式存储, 每项必须为有限正数.
    /// 3. `origin` 按照 `[z, h, w]` 格式存储, 每项必须有限.
    ///
    /// 违反上述约定时程序 panic.
    pub fn from_raw(data: Array3<f32>, pix_dim: [f64; 3], origin: [f64; 3]) -> Self {
        let (z, h, w) = data.dim();
        assert!(z * h * w != 0, "体数据每一维都必须非零");
        assert!(
            pix_dim.iter().all(|d| d.is_finite() && *d > 0.0),
            "体素分辨率必须为有限正数"
        );
        assert!(origin.iter().all(|d| d.is_finite()), "原点偏移必须有限");
        Self {
            data,
            pix_dim,
            origin,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获取给定位置的 HU 值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 根据体素级谓词 `pred` 生成与该扫描同形状的二值掩膜.
    pub fn mask_where(&self, pred: impl Fn(f32) -> bool) -> BinaryMask {
        BinaryMask::from_fn(self.shape(), self.pix_dim, self.origin, |pos| {
            pred(self.data[pos])
        })
    }
}
