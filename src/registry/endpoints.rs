use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{CapturedCall, CapturedRequest};

/// Outcome of recording one captured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First time this `(method, path)` was seen; a tool should be registered.
    FirstSight(CapturedCall),
    /// Known endpoint; only the statistics moved.
    Repeat { call_count: u64 },
}

/// Deduplicated record of every endpoint seen on the wire.
///
/// Keyed by `method_path`. Entries are never removed while the process runs.
#[derive(Default)]
pub struct EndpointRegistry {
    calls: DashMap<String, CapturedCall>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a captured request.
    ///
    /// The entry lock is held for the whole check-then-insert, so two
    /// concurrent sightings of a new key yield exactly one `FirstSight`.
    pub fn record(&self, request: CapturedRequest) -> Observation {
        let key = CapturedCall::key(&request.method, &request.path);
        let now = Utc::now();

        match self.calls.entry(key) {
            Entry::Occupied(mut entry) => {
                let call = entry.get_mut();
                call.last_seen = now;
                call.call_count += 1;
                Observation::Repeat {
                    call_count: call.call_count,
                }
            }
            Entry::Vacant(entry) => {
                let call = CapturedCall {
                    method: request.method,
                    path: request.path,
                    query: request.query,
                    headers: request.headers,
                    body: request.body,
                    first_seen: now,
                    last_seen: now,
                    call_count: 1,
                };
                entry.insert(call.clone());
                Observation::FirstSight(call)
            }
        }
    }

    pub fn get(&self, method: &str, path: &str) -> Option<CapturedCall> {
        self.calls
            .get(&CapturedCall::key(method, path))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn request(method: &str, path: &str, body: &str) -> CapturedRequest {
        CapturedRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_repeats_only_bump_statistics() {
        let registry = EndpointRegistry::new();

        let first = registry.record(request("GET", "/users", ""));
        assert!(matches!(first, Observation::FirstSight(ref c) if c.call_count == 1));

        let second = registry.record(request("GET", "/users", "ignored"));
        let third = registry.record(request("GET", "/users", "ignored"));
        assert_eq!(second, Observation::Repeat { call_count: 2 });
        assert_eq!(third, Observation::Repeat { call_count: 3 });

        let call = registry.get("GET", "/users").unwrap();
        assert_eq!(call.call_count, 3);
        assert_eq!(call.body, "");
        assert!(call.last_seen >= call.first_seen);
    }

    #[test]
    fn test_method_is_part_of_the_key() {
        let registry = EndpointRegistry::new();
        registry.record(request("GET", "/users", ""));
        registry.record(request("POST", "/users", "{}"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_call_count_matches_occurrences_across_sequence() {
        let registry = EndpointRegistry::new();
        let sequence = [
            ("GET", "/a"),
            ("GET", "/b"),
            ("GET", "/a"),
            ("POST", "/a"),
            ("GET", "/a"),
        ];

        let first_sights = sequence
            .iter()
            .map(|(m, p)| registry.record(request(m, p, "")))
            .filter(|o| matches!(o, Observation::FirstSight(_)))
            .count();

        assert_eq!(first_sights, 3);
        assert_eq!(registry.get("GET", "/a").unwrap().call_count, 3);
        assert_eq!(registry.get("GET", "/b").unwrap().call_count, 1);
        assert_eq!(registry.get("POST", "/a").unwrap().call_count, 1);
    }

    #[test]
    fn test_concurrent_first_sight_is_unique() {
        let registry = Arc::new(EndpointRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| {
                            matches!(
                                registry.record(request("GET", "/hot", "")),
                                Observation::FirstSight(_)
                            )
                        })
                        .count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
        assert_eq!(registry.get("GET", "/hot").unwrap().call_count, 400);
    }
}
