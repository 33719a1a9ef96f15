use std::fmt::Display;

use console::{style, StyledObject};

type Styled = StyledObject<String>;

fn paint(text: impl Display) -> Styled {
    style(text.to_string())
}

/// A stage that is still running, and warnings.
pub fn pending(text: impl Display) -> Styled {
    paint(text).bright().yellow()
}

pub fn succeeded(text: impl Display) -> Styled {
    paint(text).bright().green()
}

pub fn failed(text: impl Display) -> Styled {
    paint(text).bright().red()
}

pub fn pointer(text: impl Display) -> Styled {
    paint(text).cyan()
}

pub fn muted(text: impl Display) -> Styled {
    paint(text).dim()
}

/// Branch names and section titles.
pub fn emphasis(text: impl Display) -> Styled {
    paint(text).bright()
}

pub fn title(text: impl Display) -> Styled {
    paint(text).magenta().bold()
}
