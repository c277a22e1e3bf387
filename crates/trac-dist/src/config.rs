//! 制御ファイルの読み込みと解析設定
//!
//! 制御ファイルは `NAME = VALUE` 形式の行からなり、配列要素は `NAME[i] = VALUE`、
//! 全要素共通の既定値は `NAME[*] = VALUE` で与える。それ以外の行は無視する。

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::cfmt::CFormat;
use crate::error::{DistError, DistResult};
use crate::io::open_reader;

/// 追跡量の最大数
pub const MAX_QUANTITIES: usize = 12;

/// 粒子数上限の既定値
pub const DEFAULT_MAX_PARTICLES: usize = 10_000_000;

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\[(\d+|\*)\])?\s*=\s*(\S+)")
        .expect("valid control entry regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Scalar,
    Index(usize),
    Wildcard,
}

/// 制御ファイルの生の値
#[derive(Debug, Default, Clone)]
pub struct CtlFile {
    entries: HashMap<(String, Slot), String>,
}

impl CtlFile {
    /// 制御ファイルを読む。`-` はファイルなし（`--set` のみ）として扱う
    pub fn load<P: AsRef<Path>>(path: P) -> DistResult<Self> {
        let p = path.as_ref();
        let mut ctl = CtlFile::default();
        if p.to_string_lossy() == "-" {
            return Ok(ctl);
        }
        let reader = open_reader(p)?;
        for line in reader.lines() {
            let line = line?;
            ctl.insert_line(&line);
        }
        Ok(ctl)
    }

    pub fn parse_str(text: &str) -> Self {
        let mut ctl = CtlFile::default();
        for line in text.lines() {
            ctl.insert_line(line);
        }
        ctl
    }

    fn insert_line(&mut self, line: &str) -> bool {
        let Some(caps) = ENTRY_RE.captures(line) else {
            return false;
        };
        let name = caps[1].to_string();
        let slot = match caps.get(2).map(|m| m.as_str()) {
            None => Slot::Scalar,
            Some("*") => Slot::Wildcard,
            Some(idx) => match idx.parse() {
                Ok(i) => Slot::Index(i),
                Err(_) => return false,
            },
        };
        self.entries.insert((name, slot), caps[3].to_string());
        true
    }

    /// コマンドラインからの上書き（`NAME=VALUE` / `NAME[i]=VALUE`）
    pub fn set_override(&mut self, assignment: &str) -> DistResult<()> {
        if self.insert_line(assignment) {
            Ok(())
        } else {
            Err(DistError::Config(format!(
                "invalid override {assignment:?} (expected NAME=VALUE or NAME[i]=VALUE)"
            )))
        }
    }

    /// 値を探す。添字付き → `[*]` → 添字なし → 既定値の順
    pub fn scan(&self, name: &str, index: Option<usize>, default: Option<&str>) -> DistResult<String> {
        let mut keys = Vec::with_capacity(3);
        if let Some(i) = index {
            keys.push(Slot::Index(i));
            keys.push(Slot::Wildcard);
        }
        keys.push(Slot::Scalar);

        let found = keys
            .into_iter()
            .find_map(|slot| self.entries.get(&(name.to_string(), slot)).cloned());
        let value = match (found, default) {
            (Some(v), _) => v,
            (None, Some(d)) => d.to_string(),
            (None, None) => {
                let label = match index {
                    Some(i) => format!("{name}[{i}]"),
                    None => name.to_string(),
                };
                return Err(DistError::Config(format!("missing variable {label}")));
            }
        };
        match index {
            Some(i) => log::debug!("{name}[{i}] = {value}"),
            None => log::debug!("{name} = {value}"),
        }
        Ok(value)
    }

    fn scan_parsed<T: std::str::FromStr>(
        &self,
        name: &str,
        index: Option<usize>,
        default: Option<&str>,
    ) -> DistResult<T> {
        let raw = self.scan(name, index, default)?;
        raw.parse()
            .map_err(|_| DistError::Config(format!("cannot parse {name} = {raw:?}")))
    }
}

/// 相対偏差の平均・標準偏差を求めるときの分母
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeNormalization {
    /// 全粒子数 N で割る（累積移動距離 0 の粒子も分母に含める）
    #[default]
    Population,
    /// 実際に寄与した粒子数で割る
    Contributing,
}

impl std::str::FromStr for RelativeNormalization {
    type Err = DistError;

    fn from_str(s: &str) -> DistResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "population" => Ok(Self::Population),
            "contributing" => Ok(Self::Contributing),
            other => Err(DistError::Config(format!(
                "unknown DIST_REL_NORM {other:?} (expected population or contributing)"
            ))),
        }
    }
}

/// 追跡量の名前・単位・出力書式
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySpec {
    pub name: String,
    pub unit: String,
    pub format: CFormat,
}

/// 解析設定
#[derive(Debug, Clone)]
pub struct DistConfig {
    pub quantities: Vec<QuantitySpec>,
    /// 1スナップショットあたりの粒子数上限
    pub max_particles: usize,
    pub relative_normalization: RelativeNormalization,
}

impl Default for DistConfig {
    fn default() -> Self {
        DistConfig {
            quantities: Vec::new(),
            max_particles: DEFAULT_MAX_PARTICLES,
            relative_normalization: RelativeNormalization::default(),
        }
    }
}

impl DistConfig {
    pub fn from_ctl(ctl: &CtlFile) -> DistResult<Self> {
        let nq: usize = ctl.scan_parsed("NQ", None, Some("0"))?;
        if nq > MAX_QUANTITIES {
            return Err(DistError::Config(format!(
                "too many quantities: NQ = {nq} (max {MAX_QUANTITIES})"
            )));
        }
        let quantities = (0..nq)
            .map(|iq| {
                let format = ctl.scan("QNT_FORMAT", Some(iq), Some("%g"))?;
                Ok(QuantitySpec {
                    name: ctl.scan("QNT_NAME", Some(iq), None)?,
                    unit: ctl.scan("QNT_UNIT", Some(iq), None)?,
                    format: CFormat::parse(&format)?,
                })
            })
            .collect::<DistResult<Vec<_>>>()?;

        let max_particles: usize = ctl.scan_parsed(
            "NP_MAX",
            None,
            Some(&DEFAULT_MAX_PARTICLES.to_string()),
        )?;
        if max_particles == 0 {
            return Err(DistError::Config("NP_MAX must be >= 1".to_string()));
        }

        Ok(DistConfig {
            quantities,
            max_particles,
            relative_normalization: ctl.scan_parsed("DIST_REL_NORM", None, Some("population"))?,
        })
    }

    pub fn nq(&self) -> usize {
        self.quantities.len()
    }
}
