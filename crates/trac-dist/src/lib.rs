//! 粒子軌跡モデルの2ラン間の輸送偏差（transport deviation）解析
//!
//! 同じ粒子集合を異なる入力条件で計算した2つのランの出力を時刻ごとに比較し、
//! 水平・鉛直の絶対偏差／相対偏差と追跡量の偏差の統計を求める。

pub mod atm;
pub mod cfmt;
pub mod config;
pub mod deviation;
pub mod error;
pub mod geo;
pub mod io;
pub mod report;
pub mod run;
pub mod stats;
pub mod time;

pub use atm::{ParticleEnsemble, read_ensemble};
pub use config::{CtlFile, DistConfig, QuantitySpec, RelativeNormalization};
pub use deviation::{ComparisonState, DeviationEngine, DeviationStatistics, check_consistency};
pub use error::{DistError, DistResult};
pub use report::{OutputMode, ReportWriter};
pub use run::{RunOptions, SnapshotPair, pair_up, run_pairs};
