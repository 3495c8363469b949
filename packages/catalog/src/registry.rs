//! Collection registry, loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/catalog/collections/` is baked into the
//! binary at compile time via [`include_str!`]. Adding a collection means
//! adding a TOML file and listing it below.

use crate::definition::{CollectionDefinition, parse_collection_toml};

/// TOML configs embedded at compile time.
const COLLECTION_TOMLS: &[(&str, &str)] = &[
    // ── Per-ID data collections ──────────────────────────────────────
    ("items", include_str!("../collections/items.toml")),
    ("quests", include_str!("../collections/quests.toml")),
    (
        "achievements",
        include_str!("../collections/achievements.toml"),
    ),
    ("spells", include_str!("../collections/spells.toml")),
    // ── Listing collections ──────────────────────────────────────────
    ("bosses", include_str!("../collections/bosses.toml")),
    ("mounts", include_str!("../collections/mounts.toml")),
    ("pets", include_str!("../collections/pets.toml")),
    (
        "item_classes",
        include_str!("../collections/item_classes.toml"),
    ),
    ("zones", include_str!("../collections/zones.toml")),
];

#[cfg(test)]
const EXPECTED_COLLECTION_COUNT: usize = 9;

/// Returns every configured collection, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any embedded TOML config is malformed. The configs ship with
/// the binary, so this is caught by the registry tests.
#[must_use]
pub fn all_collections() -> Vec<CollectionDefinition> {
    COLLECTION_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_collection_toml(name, toml)
                .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a collection by id.
#[must_use]
pub fn find_collection(id: &str) -> Option<CollectionDefinition> {
    all_collections().into_iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollectionKind;

    #[test]
    fn loads_all_collections() {
        assert_eq!(all_collections().len(), EXPECTED_COLLECTION_COUNT);
    }

    #[test]
    fn collection_ids_are_unique() {
        let collections = all_collections();
        let mut ids: Vec<&str> = collections.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_COLLECTION_COUNT);
    }

    #[test]
    fn file_names_match_ids() {
        for ((name, _), collection) in COLLECTION_TOMLS.iter().zip(all_collections()) {
            assert_eq!(*name, collection.id);
        }
    }

    #[test]
    fn natural_key_overrides() {
        let key = |id: &str| find_collection(id).unwrap().natural_key;
        assert_eq!(key("items"), "id");
        assert_eq!(key("mounts"), "spellId");
        assert_eq!(key("pets"), "creatureId");
        assert_eq!(key("item_classes"), "class");
    }

    #[test]
    fn items_cover_full_id_range() {
        let items = find_collection("items").unwrap();
        assert_eq!(
            items.kind,
            CollectionKind::Data {
                min_id: 0,
                max_id: 200_000
            }
        );
    }

    #[test]
    fn unknown_collection_is_none() {
        assert!(find_collection("guilds").is_none());
    }
}
