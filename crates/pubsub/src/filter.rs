// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MQTT topic filter matching.

/// Match a topic against a subscription filter.
///
/// `+` matches exactly one segment; `#` matches the remainder and must be
/// the final segment. Literal segments compare exactly, including
/// `$`-prefixed leaves like `$state`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (None, None) => return true,
            (Some("#"), _) => return filter_parts.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest::proptest! {
        #[test]
        fn any_topic_matches_itself_and_the_hash_filter(
            segments in proptest::collection::vec("[a-z0-9$_]{1,8}", 1..6)
        ) {
            let topic = segments.join("/");
            proptest::prop_assert!(topic_matches(&topic, &topic));
            proptest::prop_assert!(topic_matches("#", &topic));
        }
    }

    #[yare::parameterized(
        exact          = { "pioreactor/u/e/stirring/$state", "pioreactor/u/e/stirring/$state", true },
        plus_leaf      = { "pioreactor/u/e/stirring/+/set", "pioreactor/u/e/stirring/target_rpm/set", true },
        plus_dollar    = { "pioreactor/u/e/stirring/+/set", "pioreactor/u/e/stirring/$state/set", true },
        plus_unit      = { "pioreactor/+/e/stirring/$state", "pioreactor/u9/e/stirring/$state", true },
        hash_tail      = { "pioreactor/u/e/#", "pioreactor/u/e/stirring/$state", true },
        hash_everything = { "#", "pioreactor/u/e/logs/app", true },
        segment_count  = { "pioreactor/u/e/stirring/+/set", "pioreactor/u/e/stirring/set", false },
        wrong_leaf     = { "pioreactor/u/e/stirring/$state", "pioreactor/u/e/stirring/target_rpm", false },
        too_short      = { "pioreactor/u/e/stirring/+", "pioreactor/u/e/stirring", false },
        too_long       = { "pioreactor/u/e/stirring", "pioreactor/u/e/stirring/$state", false },
        hash_not_last  = { "pioreactor/#/e", "pioreactor/u/e", false },
    )]
    fn matching(filter: &str, topic: &str, expected: bool) {
        assert_eq!(topic_matches(filter, topic), expected);
    }
}
