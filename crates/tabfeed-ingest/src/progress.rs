//! Progress display for long ingestion runs

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({eta})";

/// Create a progress bar counting files against `total`
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Files finished so far; a no-op when progress display is off
#[derive(Debug, Clone, Default)]
pub struct FileProgress {
    bar: Option<ProgressBar>,
}

impl FileProgress {
    pub fn new(total: u64, enabled: bool) -> Self {
        if !enabled {
            return Self::hidden();
        }
        Self {
            bar: Some(create_progress_bar(total, "Ingesting")),
        }
    }

    pub fn hidden() -> Self {
        Self { bar: None }
    }

    pub fn file_done(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }

    pub fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(ProgressBar::position)
    }
}

/// Bar drawn nowhere, for tests
#[cfg(test)]
fn hidden_bar(total: u64) -> ProgressBar {
    let pb = create_progress_bar(total, "test");
    pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    pb
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar() {
        let pb = hidden_bar(100);
        assert_eq!(pb.length(), Some(100));
    }

    #[test]
    fn test_file_progress_counts() {
        let progress = FileProgress {
            bar: Some(hidden_bar(3)),
        };
        progress.file_done();
        progress.clone().file_done();
        assert_eq!(progress.position(), Some(2));
        progress.finish("done");
    }

    #[test]
    fn test_disabled_progress_is_noop() {
        let progress = FileProgress::new(10, false);
        progress.file_done();
        assert_eq!(progress.position(), None);
    }
}
