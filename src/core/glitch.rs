//! Classification of interpreter error text into learner-facing glitches.
//!
//! Only rendered text crosses the sandbox boundary, so classification is a
//! two-phase string match: a line-anchored `<Name>Error:` scan from the last
//! line upwards, then a substring scan over the known kinds in table order.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GlitchCategory {
    SyntaxGlitch,
    LogicGlitch,
    RuntimeGlitch,
    QuestGlitch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlitchInfo {
    pub error_kind: String,
    pub category: GlitchCategory,
    pub hint: String,
}

impl GlitchInfo {
    pub fn new(error_kind: impl Into<String>, category: GlitchCategory, hint: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            category,
            hint: hint.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_KIND, GlitchCategory::RuntimeGlitch, FALLBACK_HINT)
    }
}

pub const UNKNOWN_KIND: &str = "Unknown";
pub const FALLBACK_HINT: &str =
    "An unexpected glitch occurred! Try a different approach, or check your code for anything unusual.";

/// Known error kinds, in the order the substring fallback tries them.
pub const KNOWN_GLITCHES: &[(&str, GlitchCategory, &str)] = &[
    (
        "SyntaxError",
        GlitchCategory::SyntaxGlitch,
        "Your spell has a typo! Check for missing colons, brackets, or quotes.",
    ),
    (
        "IndentationError",
        GlitchCategory::SyntaxGlitch,
        "Your code alignment is off. Python is picky about spaces \u{2014} make sure each line starts in the right place!",
    ),
    (
        "NameError",
        GlitchCategory::SyntaxGlitch,
        "The system doesn\u{2019}t recognize that word. Did you spell your variable or function name correctly?",
    ),
    (
        "TypeError",
        GlitchCategory::LogicGlitch,
        "You\u{2019}re mixing up types! Make sure you\u{2019}re using the right kind of data (text vs. number, for example).",
    ),
    (
        "IndexError",
        GlitchCategory::LogicGlitch,
        "You tried to reach something that doesn\u{2019}t exist! Check your list positions \u{2014} remember, they start at 0.",
    ),
    (
        "ValueError",
        GlitchCategory::LogicGlitch,
        "The value doesn\u{2019}t look right. Double-check what you\u{2019}re passing in.",
    ),
    (
        "KeyError",
        GlitchCategory::LogicGlitch,
        "That key doesn\u{2019}t exist in the dictionary. Check your key names \u{2014} spelling and capitalization matter!",
    ),
    (
        "AttributeError",
        GlitchCategory::LogicGlitch,
        "That object doesn\u{2019}t have that ability. Check your method names \u{2014} did you use the right one?",
    ),
    (
        "ZeroDivisionError",
        GlitchCategory::RuntimeGlitch,
        "Dividing by zero creates a black hole! Make sure your divisor isn\u{2019}t zero.",
    ),
    (
        "RecursionError",
        GlitchCategory::RuntimeGlitch,
        "Infinite loop detected! Your spell is casting itself forever. Check your loop or function for a missing exit condition.",
    ),
    (
        "TimeoutError",
        GlitchCategory::RuntimeGlitch,
        "Your code took too long! It might be stuck in a loop. Check your `while` condition or loop logic.",
    ),
    (
        "MemoryError",
        GlitchCategory::RuntimeGlitch,
        "Your code used too much memory! Try simplifying your approach \u{2014} smaller lists, fewer variables.",
    ),
    (
        "AssertionError",
        GlitchCategory::QuestGlitch,
        "Almost there! The quest check didn\u{2019}t pass. Re-read the instructions carefully.",
    ),
];

fn lookup(error_kind: &str) -> Option<GlitchInfo> {
    KNOWN_GLITCHES
        .iter()
        .find(|(kind, _, _)| *kind == error_kind)
        .map(|(kind, category, hint)| GlitchInfo::new(*kind, *category, *hint))
}

/// Returns the `<Name>Error` prefix of a line shaped like `<Name>Error: ...`.
fn error_kind_of(line: &str) -> Option<&str> {
    let (head, _) = line.split_once(':')?;
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let name = head.strip_suffix("Error")?;
    (!name.is_empty() && name.chars().all(is_word)).then_some(head)
}

/// Classifies raw error text. Pure and total.
pub fn classify(standard_error: &str) -> GlitchInfo {
    let text = standard_error.trim();
    if text.is_empty() {
        return GlitchInfo::unknown();
    }

    let anchored = text
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(error_kind_of);
    if let Some(kind) = anchored {
        return lookup(kind).unwrap_or_else(|| {
            GlitchInfo::new(kind, GlitchCategory::RuntimeGlitch, FALLBACK_HINT)
        });
    }

    KNOWN_GLITCHES
        .iter()
        .find(|(kind, _, _)| standard_error.contains(kind))
        .map(|(kind, category, hint)| GlitchInfo::new(*kind, *category, *hint))
        .unwrap_or_else(GlitchInfo::unknown)
}
