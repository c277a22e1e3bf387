//! 偏差統計の出力
//!
//! テキスト形式は番号付きのヘッダ（`# $<n> = <説明> [<単位>]`）と空行のあとに、
//! 1組につき1行の空白区切りレコードを書く。

use std::io::Write;

use serde::Serialize;

use crate::cfmt::CFormat;
use crate::config::QuantitySpec;
use crate::deviation::DeviationStatistics;
use crate::error::DistResult;
use crate::stats::RankSummary;

/// 水平・鉛直それぞれの列の説明（単位なしは添字列）
const RANK_COLUMNS: [(&str, Option<&str>); 10] = [
    ("mean", Some("km")),
    ("sigma", Some("km")),
    ("minimum", Some("km")),
    ("10% percentile", Some("km")),
    ("1st quartile", Some("km")),
    ("median", Some("km")),
    ("3rd quartile", Some("km")),
    ("90% percentile", Some("km")),
    ("maximum", Some("km")),
    ("maximum trajectory index", None),
];

/// 出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// 番号付きヘッダ + 空白区切り
    #[default]
    Text,
    /// 1組につき1行の JSON（ヘッダなし）
    JsonLines,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    time: f64,
    #[serde(flatten)]
    stats: &'a DeviationStatistics,
}

/// ヘッダと各組のレコードを書き出す
pub struct ReportWriter<W: Write> {
    out: W,
    mode: OutputMode,
    quantities: Vec<QuantitySpec>,
    time_format: CFormat,
    value_format: CFormat,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, mode: OutputMode, quantities: &[QuantitySpec]) -> Self {
        ReportWriter {
            out,
            mode,
            quantities: quantities.to_vec(),
            time_format: CFormat::fixed(2),
            value_format: CFormat::default(),
        }
    }

    /// 列定義を書く（JSON Lines では何もしない）
    pub fn write_header(&mut self) -> DistResult<()> {
        if self.mode == OutputMode::JsonLines {
            return Ok(());
        }
        for (n, line) in header_lines(&self.quantities).iter().enumerate() {
            writeln!(self.out, "# ${:<2} = {}", n + 1, line)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    pub fn write_record(&mut self, time: f64, stats: &DeviationStatistics) -> DistResult<()> {
        match self.mode {
            OutputMode::Text => {
                let line = self.format_record(time, stats);
                writeln!(self.out, "{line}")?;
            }
            OutputMode::JsonLines => {
                serde_json::to_writer(&mut self.out, &JsonRecord { time, stats })?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// テキスト形式の1行（改行なし）
    pub fn format_record(&self, time: f64, stats: &DeviationStatistics) -> String {
        let mut fields = Vec::with_capacity(25 + 2 * stats.quantities.len());
        fields.push(self.time_format.format(time));
        self.push_rank(&mut fields, &stats.abs_horizontal);
        fields.push(self.value_format.format(stats.rel_horizontal.mean));
        fields.push(self.value_format.format(stats.rel_horizontal.sigma));
        self.push_rank(&mut fields, &stats.abs_vertical);
        fields.push(self.value_format.format(stats.rel_vertical.mean));
        fields.push(self.value_format.format(stats.rel_vertical.sigma));
        for (spec, ms) in self.quantities.iter().zip(&stats.quantities) {
            fields.push(spec.format.format(ms.mean));
            fields.push(spec.format.format(ms.sigma));
        }
        fields.join(" ")
    }

    fn push_rank(&self, fields: &mut Vec<String>, s: &RankSummary) {
        for v in [s.mean, s.sigma, s.min, s.p10, s.p25, s.median, s.p75, s.p90, s.max] {
            fields.push(self.value_format.format(v));
        }
        fields.push(s.argmax.to_string());
    }

    pub fn flush(&mut self) -> DistResult<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// ヘッダの各列の説明（番号なし）
pub fn header_lines(quantities: &[QuantitySpec]) -> Vec<String> {
    let mut lines = vec!["time [s]".to_string()];
    for (abs, rel) in [("AHTD", "RHTD"), ("AVTD", "RVTD")] {
        for (label, unit) in RANK_COLUMNS {
            lines.push(match unit {
                Some(u) => format!("{abs} ({label}) [{u}]"),
                None => format!("{abs} ({label})"),
            });
        }
        lines.push(format!("{rel} (mean) [%]"));
        lines.push(format!("{rel} (sigma) [%]"));
    }
    for q in quantities {
        for stat in ["mean", "sigma"] {
            lines.push(format!("{} transport deviation ({stat}) [{}]", q.name, q.unit));
        }
    }
    lines
}
