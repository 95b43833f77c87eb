//! Commit message classification
//!
//! Downstream commits advertise their fate through an `UPSTREAM: <tag>:`
//! subject prefix. The classifier is pure; policy application lives in the
//! planner.

use crate::types::CommitTag;
use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^UPSTREAM:\s*<([^>]+)>:\s*").unwrap())
}

/// Parse the UPSTREAM tag out of a commit subject. Case-sensitive; subjects
/// without the prefix classify as `None`.
pub fn classify(subject: &str) -> CommitTag {
    match tag_re().captures(subject) {
        Some(caps) => match &caps[1] {
            "carry" => CommitTag::Carry,
            "drop" => CommitTag::Drop,
            other => CommitTag::Other(other.to_string()),
        },
        None => CommitTag::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_tag() {
        assert_eq!(classify("UPSTREAM: <carry>: keep this patch"), CommitTag::Carry);
    }

    #[test]
    fn drop_tag() {
        assert_eq!(classify("UPSTREAM: <drop>: retract"), CommitTag::Drop);
    }

    #[test]
    fn other_tag_keeps_token() {
        assert_eq!(
            classify("UPSTREAM: <1234>: backport"),
            CommitTag::Other("1234".to_string())
        );
    }

    #[test]
    fn untagged_subject() {
        assert_eq!(classify("local fix"), CommitTag::None);
        assert_eq!(classify("UPSTREAM: no brackets here"), CommitTag::None);
    }

    #[test]
    fn prefix_is_case_sensitive() {
        assert_eq!(classify("upstream: <carry>: nope"), CommitTag::None);
    }

    #[test]
    fn whitespace_after_colon_is_flexible() {
        assert_eq!(classify("UPSTREAM:<carry>: tight"), CommitTag::Carry);
        assert_eq!(classify("UPSTREAM:  <drop>:  loose"), CommitTag::Drop);
    }
}
