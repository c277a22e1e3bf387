//! 地理座標・気圧高度の変換

/// 地球半径 [km]
pub const RE: f64 = 6367.421;

/// スケールハイト [km]
pub const H0: f64 = 7.0;

/// 基準気圧 [hPa]
pub const P0: f64 = 1013.25;

/// 地理座標を直交座標 [km] に変換する
///
/// `z` は地表からの高度 [km]。水平距離の比較では 0 を渡して地表の球面上に射影する。
pub fn geo_to_cart(z: f64, lon: f64, lat: f64) -> [f64; 3] {
    let radius = z + RE;
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    [radius * cos_lat * cos_lon, radius * cos_lat * sin_lon, radius * sin_lat]
}

/// 2点間のユークリッド距離（弦長）
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// 気圧 [hPa] から気圧高度 [km]
pub fn altitude(p: f64) -> f64 {
    H0 * (P0 / p).ln()
}

/// 気圧高度 [km] から気圧 [hPa]
pub fn pressure(z: f64) -> f64 {
    P0 * (-z / H0).exp()
}
