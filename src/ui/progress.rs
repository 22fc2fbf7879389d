//! Progress indicators for long-running operations
//!
//! Uses `linya` for allocation-free progress bars drawn on stderr

use crate::release::runner::StageObserver;
use crate::release::stage::Stage;
use linya::{Bar, Progress};
use std::io::IsTerminal;

/// Progress bar over the stages of one release
pub struct StageProgress {
  progress: Progress,
  bar: Bar,
  stages: Vec<Stage>,
  position: usize,
}

impl StageProgress {
  /// Create a bar with one step per planned stage
  pub fn new(stages: Vec<Stage>, label: impl Into<String>) -> Self {
    let mut progress = Progress::new();
    let bar = progress.bar(stages.len().max(1), label.into());
    Self {
      progress,
      bar,
      stages,
      position: 0,
    }
  }

  /// Whether a bar should be drawn at all
  pub fn enabled(json: bool) -> bool {
    !json && std::io::stderr().is_terminal()
  }

  /// Steps completed once `stage` has started; never moves backwards
  fn step_for(&self, stage: Stage) -> Option<usize> {
    let index = self.stages.iter().position(|s| *s == stage)?;
    Some(index.max(self.position))
  }

  /// Record that `stage` started
  pub fn advance(&mut self, stage: Stage) {
    if let Some(step) = self.step_for(stage) {
      self.position = step;
      self.progress.set_and_draw(&self.bar, step);
    }
  }

  /// Fill the bar after the last stage finished
  pub fn finish(&mut self) {
    self.position = self.stages.len();
    self.progress.set_and_draw(&self.bar, self.stages.len().max(1));
  }

  /// Observer driving this bar from the pipeline
  pub fn into_observer(mut self) -> StageObserver {
    Box::new(move |stage| {
      self.advance(stage);
      if self.stages.last() == Some(&stage) {
        self.finish();
      }
    })
  }
}
