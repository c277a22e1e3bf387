//! 時刻変換とファイル名に埋め込まれた時刻の解読

use chrono::NaiveDate;

use crate::error::{DistError, DistResult};

/// 識別子末尾から数えた時刻フィールドの位置
///
/// `..._YYYY_MM_DD_HH_MM.tab` のような 20 文字の末尾を想定している。
const YEAR_OFFSET: usize = 20;
const MONTH_OFFSET: usize = 15;
const DAY_OFFSET: usize = 12;
const HOUR_OFFSET: usize = 9;
const MINUTE_OFFSET: usize = 6;

/// 暦日時を 2000-01-01 00:00 UTC からの経過秒に変換する
pub fn time_to_jsec(
    year: i32,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
    remain: f64,
) -> DistResult<f64> {
    let t = NaiveDate::from_ymd_opt(year, mon, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .ok_or_else(|| {
            DistError::TimeTag(format!(
                "{year:04}-{mon:02}-{day:02} {hour:02}:{min:02}:{sec:02} is not a valid date"
            ))
        })?;
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| DistError::TimeTag("invalid reference epoch".to_string()))?;
    Ok(t.signed_duration_since(epoch).num_seconds() as f64 + remain)
}

/// 識別子（通常はスナップショットのファイル名）から経過秒を取り出す
///
/// 各フィールドは固定幅で、数値は先頭の数字列だけを読む（数字がなければ 0）。
/// 形式の妥当性までは検査しない。
pub fn decode_time_tag(identifier: &str) -> DistResult<f64> {
    let len = identifier.len();
    if len < YEAR_OFFSET {
        return Err(DistError::TimeTag(format!(
            "identifier too short for an embedded timestamp: {identifier}"
        )));
    }
    let field = |offset: usize, width: usize| -> DistResult<u32> {
        let start = len - offset;
        identifier
            .get(start..start + width)
            .map(leading_number)
            .ok_or_else(|| DistError::TimeTag(format!("non-ASCII timestamp field in {identifier}")))
    };
    let year = field(YEAR_OFFSET, 4)?;
    let mon = field(MONTH_OFFSET, 2)?;
    let day = field(DAY_OFFSET, 2)?;
    let hour = field(HOUR_OFFSET, 2)?;
    let min = field(MINUTE_OFFSET, 2)?;
    time_to_jsec(year as i32, mon, day, hour, min, 0, 0.0)
}

fn leading_number(s: &str) -> u32 {
    s.trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}
