//! 粒子アンサンブルのスナップショットと読み込み
//!
//! ASCII 形式は1行1粒子で、空白区切りの列
//! `time[s] z[km] lon[deg] lat[deg] q_0 .. q_{nq-1}` を持つ。
//! 先頭の列が数値でない行（コメント・空行）は読み飛ばす。

use std::io::BufRead;
use std::path::Path;

use crate::error::{DistError, DistResult};
use crate::geo::pressure;
use crate::io::open_reader;

/// ある時刻における1ランぶんの粒子集合
///
/// すべての配列は粒子番号で対応する。`q[iq][ip]` は粒子 `ip` の追跡量 `iq`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleEnsemble {
    pub time: Vec<f64>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// 気圧 [hPa]
    pub p: Vec<f64>,
    pub q: Vec<Vec<f64>>,
}

impl ParticleEnsemble {
    pub fn with_quantities(nq: usize) -> Self {
        ParticleEnsemble {
            q: vec![Vec::new(); nq],
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn nq(&self) -> usize {
        self.q.len()
    }

    /// すべての配列が同じ長さか
    pub fn is_aligned(&self) -> bool {
        let n = self.time.len();
        self.lon.len() == n
            && self.lat.len() == n
            && self.p.len() == n
            && self.q.iter().all(|col| col.len() == n)
    }

    /// 粒子を1つ追加する。`values` の長さは `nq()` と一致していること
    pub fn push(&mut self, time: f64, lon: f64, lat: f64, p: f64, values: &[f64]) {
        debug_assert_eq!(values.len(), self.q.len());
        self.time.push(time);
        self.lon.push(lon);
        self.lat.push(lat);
        self.p.push(p);
        for (column, &v) in self.q.iter_mut().zip(values) {
            column.push(v);
        }
    }
}

/// スナップショットを読む
///
/// `max_particles` を超える粒子があれば [`DistError::Capacity`]。
pub fn read_ensemble<P: AsRef<Path>>(
    path: P,
    nq: usize,
    max_particles: usize,
) -> DistResult<ParticleEnsemble> {
    let path = path.as_ref();
    let reader = open_reader(path)?;
    parse_ensemble(reader, path, nq, max_particles)
}

pub fn parse_ensemble<R: BufRead>(
    reader: R,
    path: &Path,
    nq: usize,
    max_particles: usize,
) -> DistResult<ParticleEnsemble> {
    let mut atm = ParticleEnsemble::with_quantities(nq);
    let mut values = vec![0.0; nq];

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(time) = tokens.next().and_then(|t| t.parse::<f64>().ok()) else {
            continue;
        };

        let mut column = |name: &str| -> DistResult<f64> {
            let tok = tokens.next().ok_or_else(|| DistError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                message: format!("missing column {name}"),
            })?;
            tok.parse::<f64>().map_err(|_| DistError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                message: format!("invalid {name}: {tok:?}"),
            })
        };
        let z = column("z")?;
        let lon = column("lon")?;
        let lat = column("lat")?;
        for (iq, v) in values.iter_mut().enumerate() {
            *v = column(&format!("q[{iq}]"))?;
        }

        if atm.len() >= max_particles {
            return Err(DistError::Capacity {
                actual: atm.len() + 1,
                limit: max_particles,
            });
        }
        atm.push(time, lon, lat, pressure(z), &values);
    }

    log::debug!("read {} particles from {}", atm.len(), path.display());
    Ok(atm)
}
