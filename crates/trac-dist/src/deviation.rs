//! 輸送偏差（transport deviation）の計算
//!
//! 同じ粒子集合を2通りの条件で計算したスナップショットの組を時刻順に受け取り、
//! 粒子ごとの絶対偏差と、各ランの累積移動距離に対する相対偏差を集計する。
//!
//! - 水平絶対偏差: 2点を地表の球面に射影した直交座標間の弦長 [km]
//! - 鉛直絶対偏差: 気圧高度の差の絶対値 [km]
//! - 相対偏差: `200 * 絶対偏差 / (L_A + L_B)` [%]（`L` は累積移動距離）
//!
//! 累積移動距離は前回のスナップショットからの移動量を積算するため、
//! [`ComparisonState`] が呼び出しをまたいで位置と距離を保持する。

use serde::Serialize;

use crate::atm::ParticleEnsemble;
use crate::config::RelativeNormalization;
use crate::error::{DistError, DistResult};
use crate::geo::{altitude, distance, geo_to_cart};
use crate::stats::{MeanSigma, Moments, RankSummary};

/// 2つのスナップショットが同じ粒子・同じ時刻を表しているか検査する
pub fn check_consistency(a: &ParticleEnsemble, b: &ParticleEnsemble) -> DistResult<()> {
    if a.len() != b.len() {
        return Err(DistError::Consistency(format!(
            "different numbers of particles: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if let Some(ip) = a.time.iter().zip(&b.time).position(|(ta, tb)| ta != tb) {
        return Err(DistError::Consistency(format!(
            "times do not match at particle {ip}: {} vs {}",
            a.time[ip], b.time[ip]
        )));
    }
    Ok(())
}

/// 1ランぶんの直前位置と累積移動距離
#[derive(Debug, Clone, Default)]
struct RunTrack {
    lon: Vec<f64>,
    lat: Vec<f64>,
    p: Vec<f64>,
    /// 累積水平移動距離 [km]
    path_h: Vec<f64>,
    /// 累積鉛直移動距離 [km]
    path_v: Vec<f64>,
}

impl RunTrack {
    fn init(&mut self, np: usize) {
        for v in [
            &mut self.lon,
            &mut self.lat,
            &mut self.p,
            &mut self.path_h,
            &mut self.path_v,
        ] {
            v.clear();
            v.resize(np, 0.0);
        }
    }

    /// 直前位置から `x`（直交座標）, `z`（高度）までの移動量を累積距離に加える
    fn advance(&mut self, ip: usize, x: &[f64; 3], z: f64) -> (f64, f64) {
        let x0 = geo_to_cart(0.0, self.lon[ip], self.lat[ip]);
        self.path_h[ip] += distance(&x0, x);
        self.path_v[ip] += (altitude(self.p[ip]) - z).abs();
        (self.path_h[ip], self.path_v[ip])
    }

    fn record(&mut self, ip: usize, atm: &ParticleEnsemble) {
        self.lon[ip] = atm.lon[ip];
        self.lat[ip] = atm.lat[ip];
        self.p[ip] = atm.p[ip];
    }
}

/// 呼び出しをまたいで保持する比較状態
///
/// ラン全体で1つだけ作り、スナップショットの組を時刻順に渡す。
#[derive(Debug, Clone, Default)]
pub struct ComparisonState {
    run_a: RunTrack,
    run_b: RunTrack,
    pairs: usize,
}

/// 粒子1つぶんの累積移動距離
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLengths {
    pub horizontal_a: f64,
    pub vertical_a: f64,
    pub horizontal_b: f64,
    pub vertical_b: f64,
}

impl ComparisonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追跡している粒子数（最初の組を処理するまでは 0）
    pub fn len(&self) -> usize {
        self.run_a.lon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// これまでに処理した組の数
    pub fn pairs_processed(&self) -> usize {
        self.pairs
    }

    pub fn path_lengths(&self, ip: usize) -> Option<PathLengths> {
        Some(PathLengths {
            horizontal_a: *self.run_a.path_h.get(ip)?,
            vertical_a: *self.run_a.path_v.get(ip)?,
            horizontal_b: *self.run_b.path_h.get(ip)?,
            vertical_b: *self.run_b.path_v.get(ip)?,
        })
    }
}

/// 1組ぶんの偏差統計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviationStatistics {
    /// 水平絶対偏差 (AHTD) [km]
    pub abs_horizontal: RankSummary,
    /// 水平相対偏差 (RHTD) [%]
    pub rel_horizontal: MeanSigma,
    /// 鉛直絶対偏差 (AVTD) [km]
    pub abs_vertical: RankSummary,
    /// 鉛直相対偏差 (RVTD) [%]
    pub rel_vertical: MeanSigma,
    /// 追跡量ごとの絶対偏差
    pub quantities: Vec<MeanSigma>,
}

/// 偏差計算器
///
/// 粒子ごとの偏差を入れる作業領域を持ち、呼び出しごとに再利用する。
#[derive(Debug, Clone)]
pub struct DeviationEngine {
    max_particles: usize,
    normalization: RelativeNormalization,
    dh: Vec<f64>,
    dv: Vec<f64>,
}

impl DeviationEngine {
    pub fn new(max_particles: usize, normalization: RelativeNormalization) -> Self {
        DeviationEngine {
            max_particles,
            normalization,
            dh: Vec::new(),
            dv: Vec::new(),
        }
    }

    /// 1組のスナップショットを比較し、`state` を更新する
    ///
    /// `first_pair` のときは相対偏差を計算せず、`state` の初期化だけを行う。
    /// 検査で失敗した場合 `state` は変更されない。
    pub fn compare(
        &mut self,
        a: &ParticleEnsemble,
        b: &ParticleEnsemble,
        state: &mut ComparisonState,
        first_pair: bool,
        nq: usize,
    ) -> DistResult<DeviationStatistics> {
        check_consistency(a, b)?;
        if !a.is_aligned() || !b.is_aligned() {
            return Err(DistError::Consistency("particle arrays differ in length".to_string()));
        }
        let np = a.len();
        if np == 0 {
            return Err(DistError::EmptyEnsemble);
        }
        if np > self.max_particles {
            return Err(DistError::Capacity {
                actual: np,
                limit: self.max_particles,
            });
        }
        if a.nq() < nq || b.nq() < nq {
            return Err(DistError::Consistency(format!(
                "expected {nq} quantities, got {} and {}",
                a.nq(),
                b.nq()
            )));
        }
        if !first_pair && state.len() != np {
            return Err(DistError::Consistency(format!(
                "particle count changed from {} to {np} between pairs",
                state.len()
            )));
        }

        if first_pair {
            state.run_a.init(np);
            state.run_b.init(np);
        }
        if self.dh.capacity() < np {
            log::debug!("growing deviation buffers to {np} particles");
        }
        self.dh.clear();
        self.dv.clear();

        let mut ah = Moments::default();
        let mut av = Moments::default();
        let mut rh = Moments::default();
        let mut rv = Moments::default();
        let mut aq = vec![Moments::default(); nq];

        for ip in 0..np {
            let xa = geo_to_cart(0.0, a.lon[ip], a.lat[ip]);
            let xb = geo_to_cart(0.0, b.lon[ip], b.lat[ip]);
            let za = altitude(a.p[ip]);
            let zb = altitude(b.p[ip]);

            let dh = distance(&xa, &xb);
            let dv = (za - zb).abs();
            self.dh.push(dh);
            self.dv.push(dv);
            ah.add(dh);
            av.add(dv);
            for (iq, m) in aq.iter_mut().enumerate() {
                m.add((a.q[iq][ip] - b.q[iq][ip]).abs());
            }

            if !first_pair {
                let (lh_a, lv_a) = state.run_a.advance(ip, &xa, za);
                let (lh_b, lv_b) = state.run_b.advance(ip, &xb, zb);
                if lh_a + lh_b > 0.0 {
                    rh.add(200.0 * dh / (lh_a + lh_b));
                }
                if lv_a + lv_b > 0.0 {
                    rv.add(200.0 * dv / (lv_a + lv_b));
                }
            }

            state.run_a.record(ip, a);
            state.run_b.record(ip, b);
        }
        state.pairs += 1;

        let normalization = self.normalization;
        let rel_divisor = |m: &Moments| match normalization {
            RelativeNormalization::Population => np,
            RelativeNormalization::Contributing => m.count,
        };
        Ok(DeviationStatistics {
            abs_horizontal: RankSummary::from_values(&mut self.dh, &ah),
            rel_horizontal: rh.mean_sigma(rel_divisor(&rh)),
            abs_vertical: RankSummary::from_values(&mut self.dv, &av),
            rel_vertical: rv.mean_sigma(rel_divisor(&rv)),
            quantities: aq.iter().map(|m| m.mean_sigma(np)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{RE, pressure};

    const EPS: f64 = 1e-9;

    fn ensemble(time: f64, particles: &[(f64, f64, f64)], q: &[&[f64]]) -> ParticleEnsemble {
        let mut atm = ParticleEnsemble::with_quantities(q.len());
        for (ip, &(lon, lat, p)) in particles.iter().enumerate() {
            let values: Vec<f64> = q.iter().map(|col| col[ip]).collect();
            atm.push(time, lon, lat, p, &values);
        }
        atm
    }

    fn chord(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
        distance(&geo_to_cart(0.0, lon1, lat1), &geo_to_cart(0.0, lon2, lat2))
    }

    fn engine() -> DeviationEngine {
        DeviationEngine::new(1000, RelativeNormalization::Population)
    }

    #[test]
    fn test_identical_ensembles_have_zero_deviation() {
        let particles = [
            (10.0, 20.0, 500.0),
            (-30.0, 45.0, 250.0),
            (170.0, -60.0, 850.0),
            (0.0, 0.0, 100.0),
        ];
        let a = ensemble(0.0, &particles, &[]);
        let b = a.clone();
        let mut state = ComparisonState::new();
        let s = engine().compare(&a, &b, &mut state, true, 0).unwrap();

        for summary in [s.abs_horizontal, s.abs_vertical] {
            assert_eq!(summary.mean, 0.0);
            assert_eq!(summary.sigma, 0.0);
            for x in [summary.min, summary.p10, summary.p25, summary.median, summary.p75, summary.p90, summary.max] {
                assert_eq!(x, 0.0);
            }
            assert_eq!(summary.argmax, 0);
        }
        assert_eq!(s.rel_horizontal, MeanSigma::default());
        assert_eq!(s.rel_vertical, MeanSigma::default());
        assert!(s.quantities.is_empty());
        assert_eq!(state.len(), 4);
        assert_eq!(state.pairs_processed(), 1);
    }

    #[test]
    fn test_one_degree_offset_at_equator() {
        let a = ensemble(0.0, &[(0.0, 0.0, 300.0)], &[]);
        let b = ensemble(0.0, &[(1.0, 0.0, 300.0)], &[]);
        let mut state = ComparisonState::new();
        let s = engine().compare(&a, &b, &mut state, true, 0).unwrap();

        let d = 2.0 * RE * 0.5_f64.to_radians().sin();
        assert!((s.abs_horizontal.mean - d).abs() < EPS);
        assert!(s.abs_horizontal.sigma.abs() < 1e-6);
        assert_eq!(s.abs_horizontal.max, s.abs_horizontal.min);
        assert_eq!(s.abs_vertical.mean, 0.0);
    }

    #[test]
    fn test_vertical_deviation_uses_pressure_altitude() {
        let a = ensemble(0.0, &[(0.0, 0.0, pressure(10.0))], &[]);
        let b = ensemble(0.0, &[(0.0, 0.0, pressure(12.5))], &[]);
        let s = engine().compare(&a, &b, &mut ComparisonState::new(), true, 0).unwrap();
        assert!((s.abs_vertical.mean - 2.5).abs() < EPS);
        assert_eq!(s.abs_horizontal.mean, 0.0);
    }

    #[test]
    fn test_relative_deviation_on_second_pair() {
        let mut eng = engine();
        let mut state = ComparisonState::new();

        let a1 = ensemble(0.0, &[(0.0, 0.0, 500.0)], &[]);
        let b1 = ensemble(0.0, &[(0.0, 0.0, 500.0)], &[]);
        let s1 = eng.compare(&a1, &b1, &mut state, true, 0).unwrap();
        assert_eq!(s1.rel_horizontal, MeanSigma::default());
        assert_eq!(state.path_lengths(0).unwrap().horizontal_a, 0.0);

        let a2 = ensemble(3600.0, &[(2.0, 0.0, 500.0)], &[]);
        let b2 = ensemble(3600.0, &[(1.0, 0.0, 500.0)], &[]);
        let s2 = eng.compare(&a2, &b2, &mut state, false, 0).unwrap();

        let h_a = chord(0.0, 0.0, 2.0, 0.0);
        let h_b = chord(0.0, 0.0, 1.0, 0.0);
        let d2 = chord(2.0, 0.0, 1.0, 0.0);
        assert!((s2.abs_horizontal.mean - d2).abs() < EPS);
        assert!((s2.rel_horizontal.mean - 200.0 * d2 / (h_a + h_b)).abs() < EPS);
        assert!(s2.rel_horizontal.sigma.abs() < 1e-6);
        // 鉛直方向は移動していないので寄与なし
        assert_eq!(s2.rel_vertical, MeanSigma::default());

        let paths = state.path_lengths(0).unwrap();
        assert!((paths.horizontal_a - h_a).abs() < EPS);
        assert!((paths.horizontal_b - h_b).abs() < EPS);
        assert_eq!(paths.vertical_a, 0.0);
        assert_eq!(state.pairs_processed(), 2);
    }

    #[test]
    fn test_path_lengths_accumulate_over_pairs() {
        let mut eng = engine();
        let mut state = ComparisonState::new();
        let lons = [0.0, 1.0, 3.0, 6.0];
        for (step, &lon) in lons.iter().enumerate() {
            let t = step as f64 * 3600.0;
            let a = ensemble(t, &[(lon, 0.0, pressure(step as f64))], &[]);
            let b = ensemble(t, &[(0.0, 0.0, 1000.0)], &[]);
            eng.compare(&a, &b, &mut state, step == 0, 0).unwrap();
        }
        let expected_h: f64 = lons.windows(2).map(|w| chord(w[0], 0.0, w[1], 0.0)).sum();
        let paths = state.path_lengths(0).unwrap();
        assert!((paths.horizontal_a - expected_h).abs() < 1e-6);
        assert!((paths.vertical_a - 3.0).abs() < 1e-9);
        assert_eq!(paths.horizontal_b, 0.0);
    }

    #[test]
    fn test_first_pair_ignores_previous_state() {
        // first_pair では既存の状態から移動量を測らない
        let mut eng = engine();
        let mut state = ComparisonState::new();
        let a = ensemble(0.0, &[(50.0, 10.0, 500.0)], &[]);
        let b = ensemble(0.0, &[(51.0, 10.0, 500.0)], &[]);
        eng.compare(&a, &b, &mut state, true, 0).unwrap();
        let s = eng.compare(&a, &b, &mut state, true, 0).unwrap();
        assert_eq!(s.rel_horizontal, MeanSigma::default());
        assert_eq!(state.path_lengths(0).unwrap().horizontal_a, 0.0);
    }

    /// 累積移動距離が 0 の粒子は和に寄与しないが、分母は全粒子数のまま
    #[test]
    fn test_zero_path_particle_keeps_population_divisor() {
        let mut eng = engine();
        let mut state = ComparisonState::new();
        let p1 = [(0.0, 0.0, 500.0), (20.0, 20.0, 500.0)];
        let a1 = ensemble(0.0, &p1, &[]);
        eng.compare(&a1, &a1.clone(), &mut state, true, 0).unwrap();

        let a2 = ensemble(60.0, &[(1.0, 0.0, 500.0), (20.0, 20.0, 500.0)], &[]);
        let b2 = ensemble(60.0, &p1, &[]);
        let s = eng.compare(&a2, &b2, &mut state, false, 0).unwrap();

        // 粒子0: 200 * d / (d + 0) = 200, 粒子1: 寄与なし
        assert!((s.rel_horizontal.mean - 100.0).abs() < 1e-9);
        assert!((s.rel_horizontal.sigma - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_path_particle_with_contributing_divisor() {
        let mut eng = DeviationEngine::new(1000, RelativeNormalization::Contributing);
        let mut state = ComparisonState::new();
        let p1 = [(0.0, 0.0, 500.0), (20.0, 20.0, 500.0)];
        let a1 = ensemble(0.0, &p1, &[]);
        let s1 = eng.compare(&a1, &a1.clone(), &mut state, true, 0).unwrap();
        assert_eq!(s1.rel_horizontal, MeanSigma::default());

        let a2 = ensemble(60.0, &[(1.0, 0.0, 500.0), (20.0, 20.0, 500.0)], &[]);
        let b2 = ensemble(60.0, &p1, &[]);
        let s = eng.compare(&a2, &b2, &mut state, false, 0).unwrap();
        assert!((s.rel_horizontal.mean - 200.0).abs() < 1e-9);
        assert!(s.rel_horizontal.sigma < 1e-4);
    }

    #[test]
    fn test_quantity_offsets() {
        let particles = [(0.0, 0.0, 500.0), (1.0, 1.0, 400.0), (2.0, 2.0, 300.0)];
        let a = ensemble(0.0, &particles, &[&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0], &[0.0, 0.0, 0.0]]);
        let b = ensemble(
            0.0,
            &particles,
            &[&[1.5, 2.5, 3.5], &[8.0, 18.0, 28.0], &[0.25, -0.25, 0.25]],
        );
        let s = engine().compare(&a, &b, &mut ComparisonState::new(), true, 3).unwrap();
        let expected = [0.5, 2.0, 0.25];
        assert_eq!(s.quantities.len(), 3);
        for (ms, want) in s.quantities.iter().zip(expected) {
            assert!((ms.mean - want).abs() < 1e-12);
            assert!(ms.sigma.abs() < 1e-6);
        }
    }

    #[test]
    fn test_argmax_and_percentiles_over_particles() {
        // 粒子 1 と 3 が同じ最大値を持つ
        let lons_b = [0.5, 3.0, 1.0, 3.0, 2.0];
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0); 5], &[]);
        let pb: Vec<(f64, f64, f64)> = lons_b.iter().map(|&l| (l, 0.0, 500.0)).collect();
        let b = ensemble(0.0, &pb, &[]);
        let s = engine().compare(&a, &b, &mut ComparisonState::new(), true, 0).unwrap();
        assert_eq!(s.abs_horizontal.argmax, 1);
        assert!((s.abs_horizontal.min - chord(0.0, 0.0, 0.5, 0.0)).abs() < EPS);
        assert!((s.abs_horizontal.median - chord(0.0, 0.0, 2.0, 0.0)).abs() < EPS);
        assert!((s.abs_horizontal.max - chord(0.0, 0.0, 3.0, 0.0)).abs() < EPS);
    }

    #[test]
    fn test_inconsistent_pairs_are_rejected() {
        let mut eng = engine();
        let mut state = ComparisonState::new();
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0), (1.0, 0.0, 500.0)], &[]);
        let b = ensemble(0.0, &[(0.0, 0.0, 500.0)], &[]);
        assert!(matches!(
            eng.compare(&a, &b, &mut state, true, 0),
            Err(DistError::Consistency(_))
        ));

        let mut c = a.clone();
        c.time[1] = 1.0;
        assert!(matches!(
            eng.compare(&a, &c, &mut state, true, 0),
            Err(DistError::Consistency(_))
        ));
        assert_eq!(state.pairs_processed(), 0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_particle_count_change_between_pairs() {
        let mut eng = engine();
        let mut state = ComparisonState::new();
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0), (1.0, 0.0, 500.0)], &[]);
        eng.compare(&a, &a.clone(), &mut state, true, 0).unwrap();
        let small = ensemble(60.0, &[(0.0, 0.0, 500.0)], &[]);
        assert!(matches!(
            eng.compare(&small, &small.clone(), &mut state, false, 0),
            Err(DistError::Consistency(_))
        ));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_missing_quantities_are_rejected() {
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0)], &[&[1.0]]);
        let result = engine().compare(&a, &a.clone(), &mut ComparisonState::new(), true, 2);
        assert!(matches!(result, Err(DistError::Consistency(_))));
    }

    #[test]
    fn test_ragged_ensemble_is_rejected() {
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0), (1.0, 0.0, 500.0)], &[]);
        let mut b = a.clone();
        b.lat.pop();
        let result = engine().compare(&a, &b, &mut ComparisonState::new(), true, 0);
        assert!(matches!(result, Err(DistError::Consistency(_))));
    }

    #[test]
    fn test_capacity_and_empty() {
        let mut eng = DeviationEngine::new(2, RelativeNormalization::Population);
        let a = ensemble(0.0, &[(0.0, 0.0, 500.0); 3], &[]);
        assert!(matches!(
            eng.compare(&a, &a.clone(), &mut ComparisonState::new(), true, 0),
            Err(DistError::Capacity { actual: 3, limit: 2 })
        ));
        let empty = ParticleEnsemble::default();
        assert!(matches!(
            eng.compare(&empty, &empty, &mut ComparisonState::new(), true, 0),
            Err(DistError::EmptyEnsemble)
        ));
    }

    #[test]
    fn test_check_consistency_has_no_side_effects() {
        let a = ensemble(5.0, &[(0.0, 0.0, 500.0)], &[]);
        let b = ensemble(5.0, &[(90.0, 45.0, 200.0)], &[]);
        let before = (a.clone(), b.clone());
        check_consistency(&a, &b).unwrap();
        assert_eq!((a, b), before);
    }
}
