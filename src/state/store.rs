//! StateCache - In-memory mirror of confirmed remote state
//!
//! Single writer (the router task), many readers. Every mutation is applied
//! under one write lock so readers never observe half of a rename or removal.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use super::types::{Facet, Output, OutputStatus, Singleton, StateKey, StateValue};
use crate::keys::EntityRef;
use crate::router::DomainEvent;

type StateMap = HashMap<StateKey, StateValue>;

/// Mirror of remote application state
#[derive(Default)]
pub struct StateCache {
    entries: RwLock<StateMap>,
    /// Bumped on every reset so readers can tell a refilled cache apart
    epoch: AtomicU64,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Readers
    // =========================================================================

    pub fn get(&self, key: &StateKey) -> Option<StateValue> {
        self.entries.read().get(key).cloned()
    }

    pub fn get_bool(&self, key: &StateKey) -> Option<bool> {
        self.entries.read().get(key).and_then(StateValue::as_bool)
    }

    pub fn get_number(&self, key: &StateKey) -> Option<f64> {
        self.entries.read().get(key).and_then(StateValue::as_number)
    }

    pub fn get_text(&self, key: &StateKey) -> Option<String> {
        self.entries
            .read()
            .get(key)
            .and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn output(&self, output: Output) -> Option<OutputStatus> {
        match self.get(&StateKey::output(output)) {
            Some(StateValue::Output(status)) => Some(status),
            _ => None,
        }
    }

    pub fn studio_mode(&self) -> Option<bool> {
        self.get_bool(&StateKey::Singleton(Singleton::StudioMode))
    }

    pub fn program_scene(&self) -> Option<String> {
        self.get_text(&StateKey::Singleton(Singleton::ProgramScene))
    }

    pub fn preview_scene(&self) -> Option<String> {
        self.get_text(&StateKey::Singleton(Singleton::PreviewScene))
    }

    pub fn scene_collection(&self) -> Option<String> {
        self.get_text(&StateKey::Singleton(Singleton::SceneCollection))
    }

    pub fn has_scene(&self, scene: &str) -> bool {
        self.entries
            .read()
            .contains_key(&StateKey::entity(Facet::Scene, EntityRef::scene(scene)))
    }

    pub fn has_input(&self, input: &str) -> bool {
        self.entries
            .read()
            .contains_key(&StateKey::entity(Facet::Input, EntityRef::input(input)))
    }

    /// Known scene names, sorted
    pub fn scenes(&self) -> Vec<String> {
        self.names_for(Facet::Scene, |e| e.scene.clone())
    }

    /// Known input names, sorted
    pub fn inputs(&self) -> Vec<String> {
        self.names_for(Facet::Input, |e| e.source_name.clone())
    }

    /// Filter names cached for a source (input or scene), sorted
    pub fn filters(&self, source: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter_map(|k| match k {
                StateKey::Entity {
                    facet: Facet::Filter(filter),
                    entity,
                } if is_filter_owner(entity, source) => Some(filter.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    fn names_for(&self, facet: Facet, name: impl Fn(&EntityRef) -> Option<String>) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter_map(|k| match k {
                StateKey::Entity { facet: f, entity } if *f == facet => name(entity),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    /// Resolve a scene item id from its source name
    pub fn scene_item_id(&self, scene: &str, source: &str) -> Option<i64> {
        self.entries.read().iter().find_map(|(k, v)| match k {
            StateKey::Entity {
                facet: Facet::SceneItem,
                entity,
            } if entity.scene.as_deref() == Some(scene) && v.as_text() == Some(source) => {
                entity.source_id
            },
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Copy of every entry, sorted by key
    pub fn snapshot(&self) -> Vec<(StateKey, StateValue)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    // =========================================================================
    // Writer (router task only)
    // =========================================================================

    /// Drop everything (reconnect, collection switch)
    pub(crate) fn reset(&self) {
        self.entries.write().clear();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("State cache reset (epoch={})", epoch);
    }

    /// Fold one confirmed event into the cache
    pub(crate) fn apply(&self, event: &DomainEvent) {
        let mut map = self.entries.write();

        match event {
            DomainEvent::ProgramSceneChanged { scene } => {
                set_singleton(&mut map, Singleton::ProgramScene, StateValue::Text(scene.clone()));
                mark_scene(&mut map, scene);
            },
            DomainEvent::PreviewSceneChanged { scene } => {
                set_singleton(&mut map, Singleton::PreviewScene, StateValue::Text(scene.clone()));
                mark_scene(&mut map, scene);
            },
            DomainEvent::SceneCreated { scene } => mark_scene(&mut map, scene),
            DomainEvent::SceneRemoved { scene } => {
                map.retain(|k, _| match k {
                    StateKey::Entity {
                        facet: Facet::Filter(_),
                        entity,
                    } if is_filter_owner(entity, scene) => false,
                    _ => k
                        .entity_ref()
                        .map_or(true, |e| e.scene.as_deref() != Some(scene.as_str())),
                });
            },
            DomainEvent::SceneRenamed { old, new } => rename_scene(&mut map, old, new),

            DomainEvent::SourceCreated { entity, kind } => {
                if entity.scene.is_some() {
                    let source = entity.source_name.clone().unwrap_or_default();
                    map.insert(
                        StateKey::entity(Facet::SceneItem, item_key(entity)),
                        StateValue::Text(source),
                    );
                } else {
                    map.insert(
                        StateKey::entity(Facet::Input, entity.clone()),
                        StateValue::Text(kind.clone().unwrap_or_default()),
                    );
                }
            },
            DomainEvent::SourceRemoved { entity } => {
                if entity.scene.is_some() {
                    let key = item_key(entity);
                    map.remove(&StateKey::entity(Facet::SceneItem, key.clone()));
                    map.remove(&StateKey::entity(Facet::Visible, key));
                } else {
                    let name = entity.source_name.clone();
                    map.retain(|k, _| match k {
                        StateKey::Entity { facet, entity } if facet.is_input_level() => {
                            entity.source_name != name
                        },
                        _ => true,
                    });
                }
            },
            DomainEvent::SourceRenamed { old, new } => rename_input(&mut map, old, new),
            DomainEvent::SourceVisibilityChanged { entity, visible } => {
                map.insert(
                    StateKey::entity(Facet::Visible, item_key(entity)),
                    StateValue::Bool(*visible),
                );
            },

            DomainEvent::MuteChanged { entity, muted } => {
                map.insert(
                    StateKey::entity(Facet::Muted, entity.clone()),
                    StateValue::Bool(*muted),
                );
            },
            DomainEvent::VolumeChanged { entity, mul, db } => {
                map.insert(
                    StateKey::entity(Facet::VolumeDb, entity.clone()),
                    StateValue::Number(*db),
                );
                map.insert(
                    StateKey::entity(Facet::VolumeMul, entity.clone()),
                    StateValue::Number(*mul),
                );
            },

            DomainEvent::FilterCreated {
                entity,
                filter,
                enabled,
            }
            | DomainEvent::FilterEnabledChanged {
                entity,
                filter,
                enabled,
            } => {
                map.insert(
                    StateKey::entity(Facet::Filter(filter.clone()), entity.clone()),
                    StateValue::Bool(*enabled),
                );
            },
            DomainEvent::FilterRemoved { entity, filter } => {
                map.remove(&StateKey::entity(Facet::Filter(filter.clone()), entity.clone()));
            },

            DomainEvent::OutputChanged { output, status } => {
                map.insert(StateKey::output(*output), StateValue::Output(*status));
            },
            DomainEvent::StudioModeChanged { enabled } => {
                set_singleton(&mut map, Singleton::StudioMode, StateValue::Bool(*enabled));
                if !*enabled {
                    map.remove(&StateKey::Singleton(Singleton::PreviewScene));
                }
            },

            DomainEvent::SceneCollectionChanging { .. } => {
                map.clear();
                drop(map);
                self.epoch.fetch_add(1, Ordering::SeqCst);
            },
            DomainEvent::SceneCollectionChanged { name } => {
                set_singleton(&mut map, Singleton::SceneCollection, StateValue::Text(name.clone()));
            },
        }
    }
}

/// Scene items are keyed by scene + id only; visibility events carry no name
fn item_key(entity: &EntityRef) -> EntityRef {
    EntityRef {
        collection: None,
        scene: entity.scene.clone(),
        source_id: entity.source_id,
        source_name: None,
    }
}

fn set_singleton(map: &mut StateMap, key: Singleton, value: StateValue) {
    map.insert(StateKey::Singleton(key), value);
}

fn mark_scene(map: &mut StateMap, scene: &str) {
    map.insert(
        StateKey::entity(Facet::Scene, EntityRef::scene(scene)),
        StateValue::Bool(true),
    );
}

/// Filters are keyed by source name with no scene, for scenes as well as inputs
fn is_filter_owner(entity: &EntityRef, source: &str) -> bool {
    entity.scene.is_none() && entity.source_name.as_deref() == Some(source)
}

fn rename_scene(map: &mut StateMap, old: &str, new: &str) {
    let moved: Vec<StateKey> = map
        .keys()
        .filter(|k| match k {
            StateKey::Entity {
                facet: Facet::Filter(_),
                entity,
            } if is_filter_owner(entity, old) => true,
            _ => k.entity_ref().and_then(|e| e.scene.as_deref()) == Some(old),
        })
        .cloned()
        .collect();

    for key in moved {
        if let Some(value) = map.remove(&key) {
            if let StateKey::Entity { facet, mut entity } = key {
                if entity.scene.is_some() {
                    entity.scene = Some(new.to_string());
                } else {
                    entity.source_name = Some(new.to_string());
                }
                map.insert(StateKey::Entity { facet, entity }, value);
            }
        }
    }

    for singleton in [Singleton::ProgramScene, Singleton::PreviewScene] {
        let key = StateKey::Singleton(singleton);
        if map.get(&key).and_then(StateValue::as_text) == Some(old) {
            map.insert(key, StateValue::Text(new.to_string()));
        }
    }
}

fn rename_input(map: &mut StateMap, old: &str, new: &str) {
    let moved: Vec<StateKey> = map
        .keys()
        .filter(|k| match k {
            StateKey::Entity { facet, entity } => {
                facet.is_input_level() && entity.source_name.as_deref() == Some(old)
            },
            _ => false,
        })
        .cloned()
        .collect();

    for key in moved {
        if let Some(value) = map.remove(&key) {
            if let StateKey::Entity { facet, mut entity } = key {
                entity.source_name = Some(new.to_string());
                map.insert(StateKey::Entity { facet, entity }, value);
            }
        }
    }

    // Scene items name their source in the value
    for (key, value) in map.iter_mut() {
        if matches!(key, StateKey::Entity { facet: Facet::SceneItem, .. })
            && value.as_text() == Some(old)
        {
            *value = StateValue::Text(new.to_string());
        }
    }
}
