//! Grouping of catalog artists that share a name.

use std::collections::HashMap;

use lineup_catalog::model::CatalogArtist;

/// Artists already in the catalog under the same name, distinct from
/// import-time conflicts.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub name: String,
    pub count: usize,
    pub artists: Vec<CatalogArtist>,
}

/// Group artists by trimmed case-insensitive name and keep the groups with
/// more than one member, in first-seen order. The group keeps the catalog's
/// order of its members.
pub fn find_duplicate_groups(catalog: &[CatalogArtist]) -> Vec<DuplicateGroup> {
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for artist in catalog {
        let key = artist.name.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        match index_by_key.get(&key) {
            Some(&i) => {
                groups[i].artists.push(artist.clone());
                groups[i].count += 1;
            }
            None => {
                index_by_key.insert(key, groups.len());
                groups.push(DuplicateGroup {
                    name: artist.name.trim().to_string(),
                    count: 1,
                    artists: vec![artist.clone()],
                });
            }
        }
    }

    groups.retain(|g| g.count > 1);
    groups
}
