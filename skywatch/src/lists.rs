//! Named aircraft identifier lists, referenced by `aircraft_list` and
//! `exclude_aircraft_list` conditions.

use std::collections::{HashMap, HashSet};

/// Named sets of literal aircraft identifiers. Entries are normalized to
/// uppercase at load so membership matches canonical report identifiers.
#[derive(Debug, Clone, Default)]
pub struct AircraftLists {
    lists: HashMap<String, HashSet<String>>,
}

impl AircraftLists {
    pub fn from_config(raw: &HashMap<String, Vec<String>>) -> AircraftLists {
        let lists = raw
            .iter()
            .map(|(name, idents)| {
                let set = idents.iter().map(|s| s.trim().to_uppercase()).collect();
                (name.clone(), set)
            })
            .collect();
        AircraftLists { lists }
    }

    pub fn has_list(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    /// Is the identifier in the named list? Unknown lists never match;
    /// configuration validation rejects them before evaluation.
    pub fn contains(&self, list: &str, ident: &str) -> bool {
        self.lists.get(list).is_some_and(|s| s.contains(ident))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lists() -> AircraftLists {
        let mut raw = HashMap::new();
        raw.insert("watchlist".to_string(), vec!["n12345".to_string(), " N67890 ".to_string()]);
        AircraftLists::from_config(&raw)
    }

    #[test]
    fn test_membership_normalized() {
        let lists = make_lists();
        assert!(lists.contains("watchlist", "N12345"));
        assert!(lists.contains("watchlist", "N67890"));
        assert!(!lists.contains("watchlist", "N11111"));
    }

    #[test]
    fn test_unknown_list_never_matches() {
        let lists = make_lists();
        assert!(!lists.contains("nope", "N12345"));
        assert!(!lists.has_list("nope"));
        assert!(lists.has_list("watchlist"));
    }
}
