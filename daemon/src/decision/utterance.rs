//! Utterance phrasing.
//!
//! When only one of the two classifiers is confident, the missing half is
//! borrowed from the previous utterance by splitting it on single spaces:
//! the subject is word 0 and the action is word 2 of "{subject} is {action}".
//! Previous utterances of any other shape yield whatever sits at those
//! positions, or an empty string.

pub fn combined(subject: &str, action: &str) -> String {
    format!("{} is {}", subject, action)
}

pub fn object(subject: &str) -> String {
    format!("{} is detected nearby", subject)
}

pub fn subject_of(previous: Option<&str>) -> &str {
    previous
        .and_then(|p| p.split(' ').next())
        .unwrap_or("")
}

pub fn action_of(previous: Option<&str>) -> &str {
    previous
        .and_then(|p| p.split(' ').nth(2))
        .unwrap_or("")
}
