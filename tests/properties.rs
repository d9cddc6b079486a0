use arbor::path::{ParsedPath, Pattern, normalize, ordered};
use arbor::{AccessController, MemoryAclStore};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,6}"
}

fn segments(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 0..max)
}

/// A pattern segment: literal or `:name`, paired with a path segment it
/// accepts.
fn pattern_part() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        segment().prop_map(|s| (s.clone(), s)),
        (segment(), segment()).prop_map(|(name, value)| (format!(":p{name}"), value)),
    ]
}

proptest! {
    #[test]
    fn literal_patterns_match_only_equal_lengths(pat in segments(6), path in segments(6)) {
        let pattern = Pattern::parse(&pat.join("/")).unwrap();
        let matched = pattern.matches(&ParsedPath::parse(&path.join("/")), false).is_some();
        prop_assert_eq!(matched, pat == path);
    }

    #[test]
    fn ordering_is_idempotent_and_literal_first(parts in prop::collection::vec(pattern_part(), 1..10)) {
        let patterns: Vec<Pattern> = parts.iter().map(|(p, _)| Pattern::parse(p).unwrap()).collect();
        let once: Vec<Pattern> = ordered(&patterns, |p| p).into_iter().cloned().collect();
        let twice: Vec<Pattern> = ordered(&once, |p| p).into_iter().cloned().collect();
        prop_assert_eq!(&once, &twice);

        let first_param = once.iter().position(Pattern::is_parameterized).unwrap_or(once.len());
        prop_assert!(once[first_param..].iter().all(Pattern::is_parameterized));
    }

    #[test]
    fn render_reproduces_the_matched_path(parts in prop::collection::vec(pattern_part(), 0..6), extra in segments(3)) {
        // Distinct names, so no capture is overwritten.
        let parts: Vec<(String, String)> = parts
            .into_iter()
            .enumerate()
            .map(|(i, (p, v))| if p.starts_with(':') { (format!("{p}{i}"), v) } else { (p, v) })
            .collect();
        let pattern = Pattern::parse(&parts.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>().join("/")).unwrap();
        let matched: Vec<&str> = parts.iter().map(|(_, v)| v.as_str()).collect();
        let full = [matched.clone(), extra.iter().map(String::as_str).collect()].concat().join("/");

        let m = pattern.matches(&ParsedPath::parse(&full), true).unwrap();
        prop_assert_eq!(pattern.render(&m.params).unwrap(), normalize(&matched.join("/")));
        prop_assert_eq!(m.rest, extra);
    }

    #[test]
    fn deny_wins_regardless_of_position(path in segments(4), deny_first in any::<bool>()) {
        let target = path.join("/");
        prop_assume!(!target.is_empty());
        let deny = format!("!/{target}");
        let rules: Vec<&str> = if deny_first { vec![deny.as_str(), "/*"] } else { vec!["/*", deny.as_str()] };

        let acl = AccessController::new(MemoryAclStore::new().with("p", &rules), "service");
        prop_assert!(!acl.check_access(&target, "p").unwrap());
        prop_assert!(acl.check_access(&target, "service").unwrap());
    }
}
