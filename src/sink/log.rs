use std::io::Write;

use crate::annotate::AnnotatedFrame;
use crate::error::PipelineError;

const STDOUT_LABEL: &str = "<stdout>";

/// Prints `<frame_id> <label> <confidence>` for every annotated frame.
pub struct LogSink<W: Write> {
    out: W,
    lines: u64,
}

impl<W: Write> LogSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    pub fn write(&mut self, frames: &[AnnotatedFrame]) -> Result<(), PipelineError> {
        for frame in frames {
            writeln!(
                self.out,
                "{} {} {:.6}",
                frame.id(),
                frame.prediction.label,
                frame.prediction.confidence
            )
            .map_err(|e| PipelineError::sink_write(STDOUT_LABEL, e))?;
            self.lines += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.out
            .flush()
            .map_err(|e| PipelineError::sink_write(STDOUT_LABEL, e))
    }

    /// Lines written since creation.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
