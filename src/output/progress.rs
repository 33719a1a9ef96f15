use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{failed, pending, succeeded};

/// Spinner shown while a pipeline run is in flight
pub struct StageProgress {
    pb: ProgressBar,
}

impl StageProgress {
    pub fn start(message: &str) -> Self {
        let pb = create_spinner(pending(message).to_string());
        Self { pb }
    }

    pub fn succeed(self, message: &str) {
        self.pb
            .finish_with_message(succeeded(format!("{message} ✓")).to_string());
    }

    pub fn fail(self, message: &str) {
        self.pb
            .finish_with_message(failed(format!("{message} ✗")).to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
