//! 母集団統計（平均・標準偏差・順位統計）

use serde::Serialize;

/// 平均と標準偏差
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MeanSigma {
    pub mean: f64,
    pub sigma: f64,
}

/// 和と二乗和の逐次集計
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Moments {
    pub sum: f64,
    pub sum_sq: f64,
    /// 実際に加算した値の個数
    pub count: usize,
}

impl Moments {
    pub fn add(&mut self, x: f64) {
        self.sum += x;
        self.sum_sq += x * x;
        self.count += 1;
    }

    /// `divisor` で割った母集団平均・標準偏差
    ///
    /// 丸め誤差で分散がわずかに負になる場合は 0 に切り上げる。
    /// `divisor == 0` のときは (0, 0)。
    pub fn mean_sigma(&self, divisor: usize) -> MeanSigma {
        if divisor == 0 {
            return MeanSigma::default();
        }
        let n = divisor as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        MeanSigma {
            mean,
            sigma: var.sqrt(),
        }
    }
}

/// 最大値を取る最小の添字（空なら `None`）
///
/// 左から1回走査し、真に大きい値が現れたときだけ更新する。
pub fn max_index(v: &[f64]) -> Option<usize> {
    let mut it = v.iter().enumerate();
    let (mut best, mut best_v) = it.next().map(|(i, &x)| (i, x))?;
    for (i, &x) in it {
        if x > best_v {
            best = i;
            best_v = x;
        }
    }
    Some(best)
}

/// 昇順ソート済み配列の nearest-rank パーセンタイル（`floor(N * percent / 100)` 番目）
///
/// 補間はしない。`sorted` は空でないこと。
pub fn nearest_rank(sorted: &[f64], percent: usize) -> f64 {
    let n = sorted.len();
    let idx = (n * percent / 100).min(n - 1);
    sorted[idx]
}

/// 絶対偏差の要約（平均・標準偏差・パーセンタイル・最大値の粒子番号）
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RankSummary {
    pub mean: f64,
    pub sigma: f64,
    pub min: f64,
    pub p10: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub max: f64,
    /// 最大値を取る粒子番号（同値なら最小の番号）
    pub argmax: usize,
}

impl RankSummary {
    /// `values` を並べ替えて要約を作る
    ///
    /// 最大値の添字はソート前に取得する。`values` は空でないこと。
    pub fn from_values(values: &mut [f64], moments: &Moments) -> Self {
        let n = values.len();
        let argmax = max_index(values).unwrap_or(0);
        values.sort_unstable_by(f64::total_cmp);
        let MeanSigma { mean, sigma } = moments.mean_sigma(n);
        RankSummary {
            mean,
            sigma,
            min: values[0],
            p10: nearest_rank(values, 10),
            p25: nearest_rank(values, 25),
            median: nearest_rank(values, 50),
            p75: nearest_rank(values, 75),
            p90: nearest_rank(values, 90),
            max: values[n - 1],
            argmax,
        }
    }
}
