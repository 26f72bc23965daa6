//! 压缩掩膜快照.
//!
//! 流水线各阶段的掩膜都是整块 `bool` 体数据. 当调用方只想保留早期阶段
//! 的结果以备复查时, 可以先压缩成快照再丢弃原掩膜, 将峰值内存约束在
//! 大约两份全尺寸缓冲以内.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::Array3;

use super::{BinaryMask, GridGeometry};
use crate::Idx3d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 压缩存储的 [`BinaryMask`]; 不透明类型.
///
/// 体素先按行优先序打包成位图, 再经 zlib 压缩.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactMask {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,

    /// 形状.
    sh: Idx3d,

    pix_dim: [f64; 3],
    origin: [f64; 3],
}

impl BinaryMask {
    /// 压缩数据.
    pub fn compress(&self) -> CompactMask {
        let mut packed = vec![0u8; self.size().div_ceil(8)];
        for (i, v) in self.data().iter().enumerate() {
            if *v {
                packed[i / 8] |= 1 << (i % 8);
            }
        }

        let mut e = ZlibEncoder::new(Vec::with_capacity(8), Compression::best());
        e.write_all(&packed).expect("Compression error");
        CompactMask {
            buf: e.finish().expect("Compression error"),
            sh: self.shape(),
            pix_dim: self.pix_dim(),
            origin: self.origin(),
        }
    }
}

impl CompactMask {
    /// 解压缩数据.
    pub fn decompress(self) -> BinaryMask {
        let Self {
            buf,
            sh,
            pix_dim,
            origin,
        } = self;
        let (z, h, w) = sh;
        let size = z * h * w;

        let mut d = ZlibDecoder::new(buf.as_slice());
        let mut packed = Vec::with_capacity(size.div_ceil(8));
        d.read_to_end(&mut packed).expect("Decompression error");
        debug_assert_eq!(packed.len(), size.div_ceil(8));

        let bits = (0..size)
            .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
            .collect();
        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data = Array3::from_shape_vec(sh, bits).unwrap();
        BinaryMask::from_raw(data, pix_dim, origin)
    }

    /// 快照的压缩字节数.
    #[inline]
    pub fn compressed_len(&self) -> usize {
        self.buf.len()
    }
}
