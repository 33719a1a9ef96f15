use std::fmt::Write;

use ci_repeat::{JobType, OriginStatus, PublishedBranch, RepeatJobRequest, WorkingCopy};
use comfy_table::Cell;

use super::styling::{emphasis, muted, pending, pointer};
use super::tables::{create_table, cyan_header, origin_cell};

/// Prints what was published and how to follow it up.
pub fn print_published(published: &PublishedBranch, request: &RepeatJobRequest) {
    eprintln!("{}", render_published(published, request));
}

pub fn print_origin(working_copy: &WorkingCopy, origin: &OriginStatus) {
    eprintln!("{}", render_origin(working_copy, origin));
}

pub fn print_jobs() {
    println!("{}", render_jobs());
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", emphasis(emoji), emphasis(title).underlined());
}

fn render_published(published: &PublishedBranch, request: &RepeatJobRequest) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🚀", "Published");

    let extras = if request.globals().is_empty() {
        "none".to_string()
    } else {
        request.globals().join("\n")
    };

    let mut table = create_table();
    table.set_header(cyan_header(&["Branch", "Remote", "Job", "Repetitions", "Extras", "Origin"]));
    table.add_row(vec![
        Cell::new(&published.branch),
        Cell::new(&published.remote),
        Cell::new(request.job()),
        Cell::new(request.repetitions()),
        Cell::new(extras),
        origin_cell(published.origin.canonical),
    ]);
    let _ = writeln!(output, "{table}");

    let _ = writeln!(
        output,
        "\n{} CI runs {} shards of {} on {}",
        pointer("→"),
        request.repetitions(),
        request.job(),
        emphasis(&published.branch)
    );
    output
}

fn render_origin(working_copy: &WorkingCopy, origin: &OriginStatus) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🔎", "Working copy");

    let mut table = create_table();
    table.set_header(cyan_header(&["Root", "Remote", "Origin URL", "Origin"]));
    table.add_row(vec![
        Cell::new(working_copy.root().display()),
        Cell::new(working_copy.remote()),
        Cell::new(&origin.url),
        origin_cell(origin.canonical),
    ]);
    let _ = writeln!(output, "{table}");

    if !origin.canonical {
        let _ = writeln!(
            output,
            "{} origin is not {}; publishing still works from a fork",
            pending("!"),
            muted(&working_copy.project().canonical_url)
        );
    }
    output
}

fn render_jobs() -> String {
    JobType::ALL
        .iter()
        .map(|job| job.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
