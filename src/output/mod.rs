mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::StageProgress;
pub use styling::failed;
use styling::{muted, title};
pub use summary::{print_jobs, print_origin, print_published};

/// Prints the ci-repeat banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        title("🔁 ci-repeat"),
        muted(env!("CARGO_PKG_VERSION")),
        muted("Repeat a CI job to catch intermittent failures")
    );
}
