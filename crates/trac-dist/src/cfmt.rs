//! printf 互換の浮動小数点フォーマット
//!
//! 制御ファイルの `QNT_FORMAT` は C の書式文字列（`%g`, `%.4e`, `%8.2f` など）で
//! 与えられるため、その部分集合を解釈して同じ出力を得る。

use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{DistError, DistResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conv {
    Fixed,
    Exp,
    General,
}

/// 1つの変換指定を含む書式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFormat {
    prefix: String,
    suffix: String,
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
    conv: Conv,
    upper: bool,
}

impl Default for CFormat {
    /// `%g`
    fn default() -> Self {
        CFormat {
            prefix: String::new(),
            suffix: String::new(),
            left: false,
            plus: false,
            space: false,
            zero: false,
            alt: false,
            width: 0,
            precision: None,
            conv: Conv::General,
            upper: false,
        }
    }
}

impl FromStr for CFormat {
    type Err = DistError;

    fn from_str(s: &str) -> DistResult<Self> {
        CFormat::parse(s)
    }
}

impl CFormat {
    /// `%.<precision>f`
    pub fn fixed(precision: usize) -> Self {
        CFormat {
            precision: Some(precision),
            conv: Conv::Fixed,
            ..CFormat::default()
        }
    }

    pub fn parse(s: &str) -> DistResult<Self> {
        let err = |msg: &str| DistError::Config(format!("invalid number format {s:?}: {msg}"));
        let mut fmt = CFormat::default();
        let mut chars = s.chars().peekable();
        let mut seen_conv = false;

        while let Some(c) = chars.next() {
            if c != '%' {
                if seen_conv {
                    fmt.suffix.push(c);
                } else {
                    fmt.prefix.push(c);
                }
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                if seen_conv {
                    fmt.suffix.push('%');
                } else {
                    fmt.prefix.push('%');
                }
                continue;
            }
            if seen_conv {
                return Err(err("more than one conversion"));
            }

            while let Some(&f) = chars.peek() {
                match f {
                    '-' => fmt.left = true,
                    '+' => fmt.plus = true,
                    ' ' => fmt.space = true,
                    '0' => fmt.zero = true,
                    '#' => fmt.alt = true,
                    _ => break,
                }
                chars.next();
            }
            fmt.width = take_digits(&mut chars).unwrap_or(0);
            if chars.peek() == Some(&'.') {
                chars.next();
                fmt.precision = Some(take_digits(&mut chars).unwrap_or(0));
            }
            // 長さ修飾子（%lg など）は double では意味を持たない
            while matches!(chars.peek(), Some('l' | 'L')) {
                chars.next();
            }
            let conv = chars.next().ok_or_else(|| err("missing conversion"))?;
            (fmt.conv, fmt.upper) = match conv {
                'f' => (Conv::Fixed, false),
                'F' => (Conv::Fixed, true),
                'e' => (Conv::Exp, false),
                'E' => (Conv::Exp, true),
                'g' => (Conv::General, false),
                'G' => (Conv::General, true),
                other => return Err(err(&format!("unsupported conversion '{other}'"))),
            };
            seen_conv = true;
        }

        if !seen_conv {
            return Err(err("no conversion"));
        }
        Ok(fmt)
    }

    pub fn format(&self, v: f64) -> String {
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len() + 16);
        out.push_str(&self.prefix);
        self.write_number(&mut out, v);
        out.push_str(&self.suffix);
        out
    }

    fn write_number(&self, out: &mut String, v: f64) {
        let sign = if v.is_sign_negative() {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        };

        let mut body = if v.is_nan() {
            "nan".to_string()
        } else if v.is_infinite() {
            "inf".to_string()
        } else {
            let abs = v.abs();
            let prec = self.precision.unwrap_or(6);
            match self.conv {
                Conv::Fixed => fixed(abs, prec, self.alt),
                Conv::Exp => exponential(abs, prec, self.alt),
                Conv::General => general(abs, prec, self.alt),
            }
        };
        if self.upper {
            body.make_ascii_uppercase();
        }

        let len = sign.len() + body.len();
        let pad = self.width.saturating_sub(len);
        if self.left {
            out.push_str(sign);
            out.push_str(&body);
            out.extend(std::iter::repeat_n(' ', pad));
        } else if self.zero && v.is_finite() {
            out.push_str(sign);
            out.extend(std::iter::repeat_n('0', pad));
            out.push_str(&body);
        } else {
            out.extend(std::iter::repeat_n(' ', pad));
            out.push_str(sign);
            out.push_str(&body);
        }
    }
}

fn take_digits<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0) * 10 + d as usize);
        chars.next();
    }
    n
}

fn fixed(abs: f64, prec: usize, alt: bool) -> String {
    let mut s = format!("{abs:.prec$}");
    if alt && prec == 0 {
        s.push('.');
    }
    s
}

/// Rust の `{:e}` は `1.5e3` 形式なので C の `1.5e+03` 形式に直す
fn exponential(abs: f64, prec: usize, alt: bool) -> String {
    let (mantissa, exp) = split_exp(abs, prec);
    let mut s = mantissa;
    if alt && prec == 0 {
        s.push('.');
    }
    let _ = write!(s, "e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.unsigned_abs());
    s
}

fn general(abs: f64, prec: usize, alt: bool) -> String {
    let p = prec.max(1);
    let x = if abs == 0.0 { 0 } else { split_exp(abs, p - 1).1 };
    let use_fixed = x >= -4 && x < p as i32;
    let mut s = if use_fixed {
        fixed(abs, (p as i32 - 1 - x) as usize, alt)
    } else {
        exponential(abs, p - 1, alt)
    };
    if !alt {
        strip_trailing_zeros(&mut s);
    }
    s
}

fn split_exp(abs: f64, prec: usize) -> (String, i32) {
    let s = format!("{abs:.prec$e}");
    match s.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn strip_trailing_zeros(s: &mut String) {
    let exp_part = s.find('e').map(|i| s.split_off(i));
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if let Some(e) = exp_part {
        s.push_str(&e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(spec: &str, v: f64) -> String {
        CFormat::parse(spec).unwrap().format(v)
    }

    #[test]
    fn test_general_matches_printf() {
        assert_eq!(f("%g", 0.0), "0");
        assert_eq!(f("%g", 1.0), "1");
        assert_eq!(f("%g", 0.5), "0.5");
        assert_eq!(f("%g", 3.14159265), "3.14159");
        assert_eq!(f("%g", 100000.0), "100000");
        assert_eq!(f("%g", 1e6), "1e+06");
        assert_eq!(f("%g", 123456789.0), "1.23457e+08");
        assert_eq!(f("%g", 0.0001), "0.0001");
        assert_eq!(f("%g", 0.00001234), "1.234e-05");
        assert_eq!(f("%g", 9.9999999), "10");
        assert_eq!(f("%g", -2.5), "-2.5");
        assert_eq!(f("%G", 1e-10), "1E-10");
    }

    #[test]
    fn test_fixed_and_exponential() {
        assert_eq!(f("%.2f", 1234.5678), "1234.57");
        assert_eq!(f("%.3e", 12345.678), "1.235e+04");
        assert_eq!(f("%e", 0.0), "0.000000e+00");
        assert_eq!(f("%.1e", 1.5e-120), "1.5e-120");
        assert_eq!(f("%lg", 2.0), "2");
        assert_eq!(CFormat::fixed(2).format(86400.0), "86400.00");
        assert_eq!(CFormat::fixed(2), CFormat::parse("%.2f").unwrap());
    }

    #[test]
    fn test_width_and_flags() {
        assert_eq!(f("%10.2f", 3.14159), "      3.14");
        assert_eq!(f("%-8.1f|", 3.14159), "3.1     |");
        assert_eq!(f("%08.3f", -3.14159), "-003.142");
        assert_eq!(f("%+g", 1.5), "+1.5");
        assert_eq!(f("% g", 1.5), " 1.5");
    }

    #[test]
    fn test_literals_and_special_values() {
        assert_eq!(f("%.1f%%", 12.34), "12.3%");
        assert_eq!(f("[%g]", 2.0), "[2]");
        assert_eq!(f("%g", f64::NAN), "nan");
        assert_eq!(f("%g", f64::INFINITY), "inf");
        assert_eq!(f("%g", f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_rejects_invalid_formats() {
        assert!(CFormat::parse("abc").is_err());
        assert!(CFormat::parse("%d").is_err());
        assert!(CFormat::parse("%g %g").is_err());
        assert!(CFormat::parse("%.3").is_err());
    }
}
