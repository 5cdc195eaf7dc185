//! Progress bars shared by the per-bucket stages.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}";

/// A bar over `len` buckets, or a hidden one when progress output is off.
pub(crate) fn stage_bar(len: usize, message: String, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("█▓▒░ "));
    }
    bar.set_message(message);
    bar
}
