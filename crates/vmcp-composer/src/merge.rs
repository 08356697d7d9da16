//! Collision-resolution for `list_tools`/`list_resources`/`list_prompts`
//! (spec §4.6): upstream entries appended in vMCP-declared order first,
//! custom entries last, first occurrence of a bare name wins — except a
//! custom entry always wins its bare name over an upstream one, even
//! though it's appended later in iteration order.

use std::collections::HashMap;

use vmcp_core::ServerId;

use crate::types::Origin;

/// One candidate entry before collision resolution: its declared bare
/// name/URI, its origin, and the origin-local name/URI the reverse map
/// needs to route a dispatched call back to its owner.
pub struct Candidate<T> {
    pub bare_name: String,
    pub local_name: String,
    pub origin: Origin,
    pub descriptor: T,
}

pub struct Resolved<T> {
    pub exposed_name: String,
    pub origin: Origin,
    pub local_name: String,
    pub descriptor: T,
}

/// Resolves bare-name collisions for one capability kind. `suffix_of`
/// derives the collision suffix from an origin (`@<server_name>` for
/// upstreams; spec §4.6 never collision-suffixes a custom entry since it
/// always wins the bare name).
pub fn resolve<T>(candidates: Vec<Candidate<T>>, server_name: impl Fn(&ServerId) -> String) -> Vec<Resolved<T>> {
    let mut bare_name_owner: HashMap<String, Origin> = HashMap::new();
    for candidate in &candidates {
        let owner = bare_name_owner.entry(candidate.bare_name.clone()).or_insert_with(|| candidate.origin.clone());
        if matches!(candidate.origin, Origin::Custom) {
            // Custom always wins the bare name, even over an upstream
            // entry that claimed it first in iteration order.
            *owner = Origin::Custom;
        }
    }

    candidates
        .into_iter()
        .map(|candidate| {
            let owner = bare_name_owner.get(&candidate.bare_name).expect("every candidate registered its bare name above");
            let exposed_name = if *owner == candidate.origin {
                candidate.bare_name.clone()
            } else {
                match &candidate.origin {
                    Origin::Upstream(server_id) => format!("{}@{}", candidate.bare_name, server_name(server_id)),
                    Origin::Custom => candidate.bare_name.clone(),
                }
            };
            Resolved {
                exposed_name,
                origin: candidate.origin,
                local_name: candidate.local_name,
                descriptor: candidate.descriptor,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(id: &ServerId) -> String {
        id.as_str().to_string()
    }

    #[test]
    fn first_upstream_occurrence_wins_bare_name() {
        let candidates = vec![
            Candidate { bare_name: "add".into(), local_name: "add".into(), origin: Origin::Upstream(ServerId::new("mathA")), descriptor: () },
            Candidate { bare_name: "add".into(), local_name: "add".into(), origin: Origin::Upstream(ServerId::new("mathB")), descriptor: () },
        ];
        let resolved = resolve(candidates, name_of);
        assert_eq!(resolved[0].exposed_name, "add");
        assert_eq!(resolved[1].exposed_name, "add@mathB");
    }

    #[test]
    fn custom_tool_always_wins_even_declared_after_upstream() {
        let candidates = vec![
            Candidate { bare_name: "add".into(), local_name: "add".into(), origin: Origin::Upstream(ServerId::new("mathA")), descriptor: () },
            Candidate { bare_name: "add".into(), local_name: "add".into(), origin: Origin::Custom, descriptor: () },
        ];
        let resolved = resolve(candidates, name_of);
        assert_eq!(resolved[0].exposed_name, "add@mathA");
        assert_eq!(resolved[1].exposed_name, "add");
    }

    #[test]
    fn no_collision_keeps_bare_names() {
        let candidates = vec![
            Candidate { bare_name: "search".into(), local_name: "search".into(), origin: Origin::Upstream(ServerId::new("s1")), descriptor: () },
            Candidate { bare_name: "summarize".into(), local_name: "summarize".into(), origin: Origin::Custom, descriptor: () },
        ];
        let resolved = resolve(candidates, name_of);
        assert_eq!(resolved[0].exposed_name, "search");
        assert_eq!(resolved[1].exposed_name, "summarize");
    }
}
