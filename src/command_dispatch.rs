//! Purpose: Run the requested pipeline stages for `dataflow-pqt`.
//! Exports: `Mode`, `RunConfig`, `WorkflowSummary`, `dispatch`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate stage execution.
//! Invariants: A failed decode stage stops the full workflow before conversion.
//! Invariants: The summary is printed once, after the last stage that ran.

use std::path::PathBuf;

use tracing::{error, info};

use super::{RunOutcome, summary_json};
use dataflow_pqt::api::{
    BatchReport, ConvertOptions, ConvertReport, Error, ErrorKind, RetryPolicy, convert_workspace,
    decode_directory,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Mode {
    Decode,
    Convert,
    All,
}

impl Mode {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Mode::Decode => "decode",
            Mode::Convert => "convert",
            Mode::All => "all",
        }
    }

    pub(crate) fn description(self) -> &'static str {
        match self {
            Mode::Decode => "Decode only",
            Mode::Convert => "Convert only",
            Mode::All => "Complete workflow (decode + convert)",
        }
    }

    fn runs_decode(self) -> bool {
        matches!(self, Mode::Decode | Mode::All)
    }

    fn runs_convert(self) -> bool {
        matches!(self, Mode::Convert | Mode::All)
    }
}

#[derive(Debug)]
pub(crate) struct RunConfig {
    pub(crate) mode: Mode,
    pub(crate) source: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) json: bool,
    pub(crate) retry: RetryPolicy,
}

#[derive(Debug)]
pub(crate) struct WorkflowSummary {
    pub(crate) mode: Mode,
    pub(crate) source: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) decode: Option<BatchReport>,
    pub(crate) convert: Option<ConvertReport>,
    pub(crate) stopped_after_decode: bool,
}

impl WorkflowSummary {
    pub(crate) fn is_success(&self) -> bool {
        let decode_ok = self.decode.as_ref().is_none_or(BatchReport::is_success);
        let convert_ok = self.convert.as_ref().is_none_or(ConvertReport::is_success);
        decode_ok && convert_ok && !self.stopped_after_decode
    }
}

pub(crate) fn dispatch(config: RunConfig) -> Result<RunOutcome, Error> {
    if !config.source.is_dir() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("source directory does not exist")
            .with_path(&config.source));
    }

    let mut summary = WorkflowSummary {
        mode: config.mode,
        source: config.source.clone(),
        output: config.output.clone(),
        decode: None,
        convert: None,
        stopped_after_decode: false,
    };

    if config.mode.runs_decode() {
        info!(source = %config.source.display(), "step 1: decoding dataflow exports");
        let report = decode_directory(&config.source)?;
        let decoded = report.is_success();
        summary.decode = Some(report);
        if !decoded {
            error!("decode step failed");
            if config.mode == Mode::All {
                error!("stopping workflow due to decode failure");
                summary.stopped_after_decode = true;
                summary_json::emit_summary(&summary, config.json);
                return Ok(RunOutcome::with_code(1));
            }
        }
    }

    if config.mode.runs_convert() {
        info!(source = %config.source.display(), "step 2: converting to .pqt files");
        let options = ConvertOptions {
            retry: config.retry,
        };
        let report = convert_workspace(&config.source, config.output.as_deref(), options)?;
        if !report.is_success() {
            error!("convert step failed");
        }
        summary.convert = Some(report);
    }

    summary_json::emit_summary(&summary, config.json);
    if summary.is_success() {
        Ok(RunOutcome::ok())
    } else {
        Ok(RunOutcome::with_code(1))
    }
}
