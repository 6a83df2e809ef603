//! yt-dlp output classifier
//!
//! The tool is asked for a fixed `percent:eta:speed` progress template, so a
//! strict `NN.N%` anchor is enough to spot progress without tripping over
//! resolutions or bitrates. Rules run in order; first match wins.

use crate::core::{EventKind, Payload, Progress};
use crate::semantic::Classified;
use regex::Regex;

type Predicate = fn(&YtDlpParser, &str) -> bool;
type Producer = fn(&YtDlpParser, &str) -> Classified;

/// One row of the classification table
pub struct Rule {
    pub name: &'static str,
    predicate: Predicate,
    produce: Producer,
}

/// Ordered rule table. Lines matching none of them become `Log`.
pub const RULES: &[Rule] = &[
    Rule {
        name: "percent",
        predicate: YtDlpParser::has_percent,
        produce: YtDlpParser::progress,
    },
    Rule {
        name: "phase_marker",
        predicate: YtDlpParser::has_phase_marker,
        produce: YtDlpParser::status,
    },
    Rule {
        name: "activity_word",
        predicate: YtDlpParser::has_activity_word,
        produce: YtDlpParser::status,
    },
];

/// Parser for yt-dlp's line output
pub struct YtDlpParser {
    percent_re: Regex,
    phase_re: Regex,
}

impl YtDlpParser {
    pub fn new() -> Self {
        Self {
            percent_re: Regex::new(r"(\d{1,3}\.\d)%").unwrap(),
            phase_re: Regex::new(r"(?i)\[(?:download|merger)\]").unwrap(),
        }
    }

    /// Classify one line. Pure: same line, same answer.
    pub fn classify(&self, line: &str) -> Classified {
        RULES
            .iter()
            .find(|rule| (rule.predicate)(self, line))
            .map(|rule| (rule.produce)(self, line))
            .unwrap_or_else(|| Classified::text(EventKind::Log, line))
    }

    /// Name of the rule that would fire, `None` for plain log lines
    pub fn matching_rule(&self, line: &str) -> Option<&'static str> {
        RULES
            .iter()
            .find(|rule| (rule.predicate)(self, line))
            .map(|rule| rule.name)
    }

    fn has_percent(&self, line: &str) -> bool {
        self.percent_re.is_match(line)
    }

    fn has_phase_marker(&self, line: &str) -> bool {
        self.phase_re.is_match(line)
    }

    fn has_activity_word(&self, line: &str) -> bool {
        line.contains("Downloading") || line.contains("Extracting")
    }

    fn progress(&self, line: &str) -> Classified {
        let percent = self
            .percent_re
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| format!("{}%", m.as_str()))
            .unwrap_or_default();
        let (eta, speed) = split_template(line).unwrap_or_default();

        Classified {
            kind: EventKind::Progress,
            payload: Payload::Progress(Progress {
                percent,
                eta: eta.to_string(),
                speed: speed.to_string(),
                raw: line.to_string(),
            }),
        }
    }

    fn status(&self, line: &str) -> Classified {
        Classified::text(EventKind::Status, line)
    }
}

impl Default for YtDlpParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull eta and speed out of a `percent:eta:speed` line.
///
/// The eta itself may contain colons (`01:02:03`), so the percent is split off
/// the front and the speed off the back.
fn split_template(line: &str) -> Option<(&str, &str)> {
    let (head, rest) = line.trim().split_once(':')?;
    if !head.trim_end().ends_with('%') {
        return None;
    }
    let (eta, speed) = rest.rsplit_once(':')?;
    Some((eta.trim(), speed.trim()))
}
