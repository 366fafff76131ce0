//! Output writer selection.

use crate::core::types::AnalysisResult;
use crate::io::writers::{JsonWriter, TerminalWriter};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Terminal,
}

pub trait OutputWriter {
    fn write_results(&mut self, results: &AnalysisResult) -> anyhow::Result<()>;
}

pub fn create_writer(format: OutputFormat) -> Box<dyn OutputWriter> {
    match format {
        OutputFormat::Json => Box::new(JsonWriter::new(io::stdout())),
        OutputFormat::Terminal => Box::new(TerminalWriter::new()),
    }
}
