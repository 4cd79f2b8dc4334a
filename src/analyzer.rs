use once_cell::sync::Lazy;
use regex::Regex;
use time::{Duration, OffsetDateTime, Time};

use crate::db_types::Disposition;

/// Outcome of classifying one completed call's transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub disposition: Disposition,
    pub follow_up: Option<FollowUp>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FollowUp {
    pub at: OffsetDateTime,
    pub reason: String,
}

// Disposition rules, checked in priority order.  Keyword sets are matched on
// whole-word boundaries over the lowercased transcript; hot keywords are
// additionally discarded when negated ("not interested" must not read as
// hot).
const HOT_KEYWORDS: &[&str] = &[
    "interested",
    "sounds good",
    "tell me more",
    "send me the details",
    "share the details",
    "yes please",
    "definitely",
    "looking forward",
];

const NOT_INTERESTED_KEYWORDS: &[&str] = &[
    "not interested",
    "no interest",
    "don't call",
    "do not call",
    "stop calling",
    "too expensive",
    "no thanks",
    "not looking",
    "already bought",
];

const FAKE_KEYWORDS: &[&str] = &[
    "wrong number",
    "never enquired",
    "never inquired",
    "who is this",
    "spam",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "isn't", "isnt", "aren't", "arent", "don't", "dont", "never", "can't", "cant",
    "won't", "wont", "nothing", "without",
];

// Words that signal the caller is talking about a follow-up at all.  Without
// one of these (or an explicit clock time) no schedule is extracted, to
// avoid false positives on incidental numbers.
const SCHEDULING_INTENT: &[&str] = &[
    "schedule",
    "visit",
    "tomorrow",
    "appointment",
    "call me",
    "call back",
    "callback",
    "later",
    "next week",
    "morning",
    "afternoon",
    "evening",
    "tonight",
    "follow up",
    "meet",
];

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?\b").unwrap());
static WORDED_CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\s+([ap])\.?m\.?\b",
    )
    .unwrap()
});
static BARE_CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bat\s+(\d{1,2})(?::(\d{2}))?\b").unwrap());
static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bin\s+(a|an|\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\s+(minute|hour|day|week)s?\b",
    )
    .unwrap()
});

/// Classify a transcript into a disposition and an optional follow-up
/// schedule.  Pure and deterministic given `now`; idempotence against
/// re-runs is the caller's job (the `transcript_analyzed` flag).
pub fn analyze(transcript: &str, now: OffsetDateTime) -> Analysis {
    let text = normalize(transcript);
    Analysis { disposition: classify(&text), follow_up: extract_follow_up(&text, now) }
}

fn normalize(transcript: &str) -> String {
    transcript.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn classify(text: &str) -> Disposition {
    if HOT_KEYWORDS.iter().any(|kw| contains_unnegated(text, kw)) {
        return Disposition::Hot;
    }
    if NOT_INTERESTED_KEYWORDS.iter().any(|kw| contains_phrase(text, kw)) {
        return Disposition::NotInterested;
    }
    if FAKE_KEYWORDS.iter().any(|kw| contains_phrase(text, kw)) {
        return Disposition::Fake;
    }
    Disposition::Cold
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Substring match of `phrase` constrained to word boundaries on both ends.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(idx, _)| at_word_boundary(text, idx, phrase.len()))
}

fn at_word_boundary(text: &str, idx: usize, len: usize) -> bool {
    let before_ok = idx == 0 || !text[..idx].chars().next_back().is_some_and(is_word_char);
    let after_ok =
        idx + len == text.len() || !text[idx + len..].chars().next().is_some_and(is_word_char);
    before_ok && after_ok
}

/// True when `kw` occurs at least once without a negation word among the
/// three words preceding it.
fn contains_unnegated(text: &str, kw: &str) -> bool {
    text.match_indices(kw).any(|(idx, _)| {
        if !at_word_boundary(text, idx, kw.len()) {
            return false;
        }
        let negated = text[..idx]
            .split_whitespace()
            .rev()
            .take(3)
            .map(|w| w.trim_matches(|c: char| !is_word_char(c) && c != '\''))
            .any(|w| NEGATIONS.contains(&w));
        !negated
    })
}

fn has_scheduling_intent(text: &str) -> bool {
    SCHEDULING_INTENT.iter().any(|kw| contains_phrase(text, kw))
        || CLOCK_RE.is_match(text)
        || WORDED_CLOCK_RE.is_match(text)
}

fn word_to_number(word: &str) -> Option<i64> {
    let n = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        _ => return None,
    };
    Some(n)
}

/// Extract `(hour24, minute, matched text)` from an explicit or worded
/// clock-time mention.
fn extract_clock_time(text: &str) -> Option<(u8, u8, String)> {
    if let Some(caps) = CLOCK_RE.captures(text) {
        let hour: u8 = caps[1].parse().ok()?;
        let minute: u8 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if (1..=12).contains(&hour) && minute < 60 {
            let hour = to_hour24(hour, &caps[3]);
            return Some((hour, minute, caps[0].to_string()));
        }
    }
    if let Some(caps) = WORDED_CLOCK_RE.captures(text) {
        let hour = word_to_number(&caps[1])? as u8;
        let hour = to_hour24(hour, &caps[2]);
        return Some((hour, 0, caps[0].to_string()));
    }
    if let Some(caps) = BARE_CLOCK_RE.captures(text) {
        let hour: u8 = caps[1].parse().ok()?;
        let minute: u8 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if hour > 23 || minute > 59 {
            return None;
        }
        if hour > 12 {
            // Already 24-hour.
            return Some((hour, minute, caps[0].to_string()));
        }
        let hour = to_hour24(hour, infer_meridiem(text, hour));
        return Some((hour, minute, caps[0].to_string()));
    }
    None
}

fn to_hour24(hour12: u8, meridiem: &str) -> u8 {
    match (meridiem, hour12) {
        ("a", 12) => 0,
        ("a", h) => h,
        (_, 12) => 12,
        (_, h) => h + 12,
    }
}

/// A bare "at 3" carries no am/pm; take it from the surrounding
/// time-of-day words, otherwise assume business hours.
fn infer_meridiem(text: &str, hour: u8) -> &'static str {
    if text.contains("morning") {
        return "a";
    }
    if text.contains("afternoon") || text.contains("evening") || text.contains("tonight") {
        return "p";
    }
    if (8..=11).contains(&hour) {
        "a"
    } else {
        "p"
    }
}

fn extract_relative(text: &str) -> Option<(Duration, String)> {
    let caps = RELATIVE_RE.captures(text)?;
    let amount: i64 = caps[1].parse().ok().or_else(|| word_to_number(&caps[1]))?;
    let offset = match &caps[2] {
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        _ => return None,
    };
    Some((offset, caps[0].to_string()))
}

fn extract_follow_up(text: &str, now: OffsetDateTime) -> Option<FollowUp> {
    if !has_scheduling_intent(text) {
        return None;
    }
    if let Some((hour, minute, matched)) = extract_clock_time(text) {
        let time = Time::from_hms(hour, minute, 0).ok()?;
        let mut at = now.replace_time(time);
        if contains_phrase(text, "tomorrow") {
            at += Duration::days(1);
        } else if contains_phrase(text, "next week") {
            at += Duration::weeks(1);
        } else if at <= now {
            // That time already passed today; the next occurrence is
            // tomorrow.
            at += Duration::days(1);
        }
        return Some(FollowUp { at, reason: format!("caller asked for a follow-up at {matched}") });
    }
    if let Some((offset, matched)) = extract_relative(text) {
        return Some(FollowUp {
            at: now + offset,
            reason: format!("caller asked for a follow-up {matched}"),
        });
    }
    if contains_phrase(text, "tomorrow") {
        return Some(FollowUp {
            at: now + Duration::days(1),
            reason: "caller asked to be contacted tomorrow".to_string(),
        });
    }
    if contains_phrase(text, "next week") {
        return Some(FollowUp {
            at: now + Duration::weeks(1),
            reason: "caller asked to be contacted next week".to_string(),
        });
    }
    None
}
