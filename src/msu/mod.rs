//! MSU pack rules engine
//!
//! Pure classification of track-number-to-file maps against named pack
//! types, and conversion of track numbers between type schemas.

pub mod catalog;
pub mod conversion;
pub mod pack;
pub mod pcm;
pub mod rules;
pub mod types;

pub use catalog::MsuTypeCatalog;
pub use pack::scan_pack;
pub use pcm::PcmLoopOracle;
pub use rules::LoopOracle;
pub use types::{Conversion, FileMap, MsuType, RangedModifier, TrackList, TrackRemapping};
