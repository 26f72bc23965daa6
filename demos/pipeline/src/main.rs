//! 合成体模上的端到端流水线演示:
//! 身体分割 → 肺部分割 → 气道树提取 → 经气管距离查询.

use ct_airway::prelude::*;
use ct_airway::segment::estimate_air_threshold;
use ndarray::Array3;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
fn sep() {
    println!("{SEP}");
}

/// 合成胸部体模: 组织圆柱 + 双肺 + 气管/支气管树 + 左肺结节.
///
/// 形状 `(32, 40, 40)`, 体素 `2.0 x 0.8 x 0.8` mm.
fn synth_phantom() -> CtScan {
    let data = Array3::from_shape_fn((32, 40, 40), |(z, h, w)| {
        let in_body = (4..=35).contains(&h) && (4..=35).contains(&w);
        if !in_body {
            return -1000.0f32; // 体外空气
        }
        // 左肺内结节 (组织密度).
        if z == 22 && (19..=21).contains(&h) && (14..=16).contains(&w) {
            return 10.0;
        }
        let in_lung_box = (8..=26).contains(&z) && (8..=31).contains(&h);
        if in_lung_box && ((6..=16).contains(&w) || (23..=33).contains(&w)) {
            return -820.0; // 肺实质
        }
        let in_airway_hw = (19..=20).contains(&h);
        // 气管主干.
        if z <= 18 && in_airway_hw && (19..=20).contains(&w) {
            return -950.0;
        }
        // 水平支气管臂 (与两肺均保持一个体素的组织壁).
        if z == 18 && in_airway_hw && (18..=21).contains(&w) {
            return -950.0;
        }
        // 左右下行支气管.
        if (18..=24).contains(&z) && in_airway_hw && (w == 18 || w == 21) {
            return -950.0;
        }
        20.0 // 软组织
    });
    CtScan::from_raw(data, [2.0, 0.8, 0.8], [0.0; 3])
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()
        .unwrap();

    let scan = synth_phantom();
    let spec = SegmentSpec::new(-700.0, -500.0, 2, 3, 100).unwrap();

    sep();
    println!("Segmenting body...");
    let body = segment_body(&scan, &spec).expect("body segmentation failed");
    println!("body voxels: {}", body.count_true());

    // Otsu 估计空气阈值并注入配置.
    let air_thr = estimate_air_threshold(&scan, &body);
    println!("estimated air threshold: {air_thr:.1} HU");
    let spec = spec.with_air_threshold(air_thr).unwrap();

    // 身体掩膜压缩快照: 调用方可先丢弃全尺寸掩膜以约束峰值内存.
    let body_snap = body.compress();
    println!(
        "compact body snapshot: {} bytes (raw {} voxels)",
        body_snap.compressed_len(),
        body.count_true()
    );

    sep();
    println!("Segmenting lungs...");
    let lungs = segment_lungs(&scan, &body, &spec).expect("lung segmentation failed");
    println!(
        "lung voxels: {}, single lung: {}",
        lungs.mask.count_true(),
        lungs.single_lung
    );

    sep();
    println!("Extracting airway tree...");
    let tree = extract_airways(&scan, &body, None, &spec).expect("airway extraction failed");
    println!("seed: {:?}, airway voxels: {}", tree.seed, tree.mask.count_true());

    sep();
    println!("Computing tracheal distance field...");
    let field = DistanceField::from_airway(&tree);
    let qspec = QuerySpec::new(12.0).unwrap();

    // 结节中心与结节区域.
    let nodule_center = (22, 20, 15);
    match field.distance_to_point(nodule_center, &qspec) {
        Ok(d) => println!("nodule centre {nodule_center:?}: {d:.2} mm from trachea entry"),
        Err(e) => println!("nodule centre query failed: {e}"),
    }

    let nodule = BinaryMask::from_fn(field.shape(), field.pix_dim(), field.origin(), |(z, h, w)| {
        z == 22 && (19..=21).contains(&h) && (14..=16).contains(&w)
    });
    match field.region_stats(&nodule, &qspec) {
        Ok(stats) => println!(
            "nodule region: min {:.2} / mean {:.2} / median {:.2} / max {:.2} mm",
            stats.min, stats.mean, stats.median, stats.max
        ),
        Err(e) => println!("nodule region query failed: {e}"),
    }

    // 快照复原与复查.
    let restored = body_snap.decompress();
    assert_eq!(restored, body, "snapshot must round-trip");
    sep();
}
