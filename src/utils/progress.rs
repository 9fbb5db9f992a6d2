use indicatif::{ProgressBar, ProgressStyle};

const DEFAULT_PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {pos} {msg}";

fn pb_style() -> ProgressStyle {
    ProgressStyle::default_spinner().template(DEFAULT_PROGRESS_TEMPLATE)
}

/// A spinner counting processed units, hidden unless `show` is set
pub fn spinner(show: bool, unit: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    progress.set_style(pb_style());
    progress.set_message(unit);
    progress
}
