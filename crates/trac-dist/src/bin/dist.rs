/// 2つのランの粒子軌跡の輸送偏差を計算するツール
///
/// 使い方:
///   # 制御ファイルと出力ファイル、A/B のスナップショットを時刻順に組で並べる
///   dist run.ctl dist.tab a/atm_2011_06_05_00_00.tab b/atm_2011_06_05_00_00.tab \
///        a/atm_2011_06_05_06_00.tab b/atm_2011_06_05_06_00.tab
///
///   # 制御ファイルなしで追跡量を指定
///   dist - dist.tab --set NQ=1 --set QNT_NAME[0]=m --set QNT_UNIT[0]=kg a.tab b.tab
///
///   # JSON Lines 出力
///   dist --json run.ctl - a.tab b.tab
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use trac_dist::io::open_writer;
use trac_dist::{
    CtlFile, DistConfig, OutputMode, ReportWriter, RunOptions, pair_up, run_pairs,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(author, version, about = "Calculate transport deviations of trajectories")]
struct Cli {
    /// 制御ファイル（`-` で制御ファイルなし）
    ctl: PathBuf,

    /// 出力ファイル（`-` で標準出力、`.gz` で gzip 圧縮）
    outfile: PathBuf,

    /// スナップショット（A1 B1 [A2 B2 ...] の順）
    #[arg(required = true, num_args = 2.., value_name = "SNAPSHOT")]
    snapshots: Vec<PathBuf>,

    /// 制御ファイルの値を上書き（NAME=VALUE / NAME[i]=VALUE、複数指定可）
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,

    /// JSON Lines で出力する（ヘッダなし）
    #[arg(long)]
    json: bool,

    /// ファイル名ではなく粒子データの時刻をレコードの時刻にする
    #[arg(long)]
    time_from_data: bool,

    /// 読めないスナップショットの組を読み飛ばす
    #[arg(long)]
    skip_unreadable: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let Some(pairs) = pair_up(&cli.snapshots) else {
        bail!(
            "Give parameters: <ctl> <outfile> <atm1a> <atm1b> [<atm2a> <atm2b> ...] \
             (got {} snapshot files)",
            cli.snapshots.len()
        );
    };

    let mut ctl = CtlFile::load(&cli.ctl)
        .with_context(|| format!("failed to read control file {}", cli.ctl.display()))?;
    for assignment in &cli.overrides {
        ctl.set_override(assignment)?;
    }
    let config = DistConfig::from_ctl(&ctl)?;

    log::info!("Write transport deviations: {}", cli.outfile.display());
    let out = open_writer(&cli.outfile)
        .with_context(|| format!("failed to create {}", cli.outfile.display()))?;

    let mode = if cli.json {
        OutputMode::JsonLines
    } else {
        OutputMode::Text
    };
    let mut report = ReportWriter::new(out, mode, &config.quantities);
    report.write_header()?;

    let options = RunOptions {
        time_from_data: cli.time_from_data,
        skip_unreadable: cli.skip_unreadable,
    };
    let written = run_pairs(&config, &pairs, &mut report, options)?;

    report
        .into_inner()
        .close()
        .with_context(|| format!("failed to finish {}", cli.outfile.display()))?;
    log::info!("{written} of {} pairs written", pairs.len());
    Ok(())
}
