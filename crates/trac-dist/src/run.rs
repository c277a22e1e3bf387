//! スナップショットの組を順に処理するランナー

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::atm::{ParticleEnsemble, read_ensemble};
use crate::config::DistConfig;
use crate::deviation::{ComparisonState, DeviationEngine};
use crate::error::{DistError, DistResult};
use crate::report::ReportWriter;
use crate::time::decode_time_tag;

/// 同じ時刻の2ランのスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPair {
    pub a: PathBuf,
    pub b: PathBuf,
}

/// ランナーの動作オプション
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// ファイル名ではなく粒子データ自身の時刻をレコードの時刻に使う
    pub time_from_data: bool,
    /// 読めない組を警告して読み飛ばす（既定では致命的エラー）
    pub skip_unreadable: bool,
}

/// パスの並びを (A, B) の組にする。奇数個なら `None`
pub fn pair_up(paths: &[PathBuf]) -> Option<Vec<SnapshotPair>> {
    if paths.is_empty() || paths.len() % 2 != 0 {
        return None;
    }
    Some(
        paths
            .chunks_exact(2)
            .map(|c| SnapshotPair {
                a: c[0].clone(),
                b: c[1].clone(),
            })
            .collect(),
    )
}

/// すべての組を時刻順に比較してレコードを書く
///
/// 書いたレコード数を返す。ヘッダは呼び出し側で先に書いておくこと。
pub fn run_pairs<W: Write>(
    config: &DistConfig,
    pairs: &[SnapshotPair],
    report: &mut ReportWriter<W>,
    options: RunOptions,
) -> DistResult<usize> {
    let nq = config.nq();
    let mut engine = DeviationEngine::new(config.max_particles, config.relative_normalization);
    let mut state = ComparisonState::new();
    let mut written = 0;

    for pair in pairs {
        let (a, b) = match read_pair(pair, nq, config.max_particles) {
            Ok(ab) => ab,
            Err(e @ (DistError::Io(_) | DistError::Parse { .. })) if options.skip_unreadable => {
                log::warn!("skipping pair {} / {}: {e}", pair.a.display(), pair.b.display());
                continue;
            }
            Err(e) => return Err(e),
        };

        let first_pair = state.pairs_processed() == 0;
        let stats = engine.compare(&a, &b, &mut state, first_pair, nq)?;
        let time = record_time(&pair.a, &a, options.time_from_data);
        log::debug!(
            "t = {time:.2}: AHTD mean {:.3} km, AVTD mean {:.3} km",
            stats.abs_horizontal.mean,
            stats.abs_vertical.mean
        );
        report.write_record(time, &stats)?;
        written += 1;
    }

    report.flush()?;
    Ok(written)
}

fn read_pair(
    pair: &SnapshotPair,
    nq: usize,
    max_particles: usize,
) -> DistResult<(ParticleEnsemble, ParticleEnsemble)> {
    log::info!("Read atmospheric data: {}", pair.a.display());
    let a = read_ensemble(&pair.a, nq, max_particles)?;
    log::info!("Read atmospheric data: {}", pair.b.display());
    let b = read_ensemble(&pair.b, nq, max_particles)?;
    Ok((a, b))
}

/// レコードの時刻。ファイル名から読めなければ先頭粒子の時刻を使う
///
/// ディレクトリ名を時刻と誤読しないよう、ファイル名部分だけを解読する。
fn record_time(path: &Path, atm: &ParticleEnsemble, from_data: bool) -> f64 {
    let data_time = atm.time.first().copied().unwrap_or(0.0);
    if from_data {
        return data_time;
    }
    let name = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
    match decode_time_tag(&name) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("{e}; using particle time {data_time} instead");
            data_time
        }
    }
}
