//! Token to command resolution.

/// Exact-match substitutions applied before anything else.
const ALIASES: &[(&str, &str)] = &[
    ("bc", "broadcast"),
    ("n", "north"),
    ("s", "south"),
    ("e", "east"),
    ("w", "west"),
    ("u", "up"),
    ("d", "down"),
    ("ne", "northeast"),
    ("nw", "northwest"),
    ("se", "southeast"),
    ("sw", "southwest"),
];

pub fn substitute(token: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
        .map(|(_, canon)| *canon)
        .unwrap_or(token)
}

/// Built-in names unioned with the current room's exits, sorted and deduped.
pub fn namespace<'a, 'b>(
    builtins: impl IntoIterator<Item = &'a str>,
    exits: impl IntoIterator<Item = &'b str>,
) -> Vec<String> {
    let mut out = builtins
        .into_iter()
        .map(str::to_string)
        .chain(exits.into_iter().map(str::to_string))
        .collect::<Vec<_>>();
    out.sort();
    out.dedup();
    out
}

/// Exact case-insensitive match first, then the alphabetically first
/// candidate the token prefixes.
pub fn auto_complete(token: &str, candidates: &[String]) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    if let Some(hit) = candidates.iter().find(|c| c.eq_ignore_ascii_case(token)) {
        return Some(hit.clone());
    }

    let lc = token.to_lowercase();
    let mut sorted = candidates.iter().collect::<Vec<_>>();
    sorted.sort();
    sorted
        .into_iter()
        .find(|c| c.to_lowercase().starts_with(&lc))
        .cloned()
}

/// Substitute, then complete against `candidates`.
pub fn resolve(token: &str, candidates: &[String]) -> Option<String> {
    auto_complete(substitute(token), candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn ambiguous_prefix_takes_alphabetically_first() {
        assert_eq!(
            auto_complete("no", &c(&["northeast", "north"])).as_deref(),
            Some("north")
        );
    }

    #[test]
    fn single_letter_prefix() {
        assert_eq!(auto_complete("l", &c(&["look"])).as_deref(), Some("look"));
    }

    #[test]
    fn no_match_fails() {
        assert_eq!(auto_complete("xyz", &c(&["say"])), None);
        assert_eq!(auto_complete("", &c(&["say"])), None);
    }

    #[test]
    fn exact_match_beats_shorter_prefix_match() {
        // "Sa" prefixes both, but "say" is typed in full.
        assert_eq!(auto_complete("SAY", &c(&["sa", "say"])).as_deref(), Some("say"));
    }

    #[test]
    fn aliases_substitute_before_completion() {
        let ns = c(&["broadcast", "north", "northeast"]);
        assert_eq!(resolve("bc", &ns).as_deref(), Some("broadcast"));
        assert_eq!(resolve("NE", &ns).as_deref(), Some("northeast"));
        assert_eq!(resolve("n", &ns).as_deref(), Some("north"));
    }

    #[test]
    fn alias_to_missing_exit_does_not_fall_back() {
        assert_eq!(resolve("s", &c(&["say", "north"])), None);
    }

    #[test]
    fn namespace_unions_builtins_and_exits() {
        let ns = namespace(["say", "look"], ["north", "look"]);
        assert_eq!(ns, c(&["look", "north", "say"]));
    }
}
