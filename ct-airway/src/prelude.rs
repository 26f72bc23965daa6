//! 🫁欢迎光临🫁
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{BinaryMask, CompactMask, CtScan, GridGeometry, MaskSlice, MaskSliceMut};

pub use crate::consts::{
    AIR_THRESHOLD_HU, BODY_CLOSING_RADIUS, BODY_THRESHOLD_HU, LUNG_CLOSING_RADIUS, MIN_LUNG_VOXELS,
};

pub use crate::labeling::{label_components, ComponentLabels};

pub use crate::segment::{
    extract_airways, segment_body, segment_lungs, AirwayTree, LungSegmentation, SegmentError,
    SegmentResult, SegmentSpec, Stage,
};

pub use crate::distance::{
    DistanceField, QueryError, QueryResult, QuerySpec, RegionDistanceStats,
};
