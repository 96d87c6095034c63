//! Delta computation between two full world states.
//!
//! [`compute_delta`] is a pure function of `(prev, next, base_tick, next_tick)`:
//! no hidden state, no I/O, and neither input is mutated. Patching happens at
//! component granularity: a changed component is sent whole.
//!
//! Ordering is deterministic. `added` and `updated` follow the id order of
//! `next`, `removed` follows the id order of `prev`; [`EntityMap`] iterates
//! by id so identical inputs always produce an identical delta.

use crate::component::{ComponentMap, ComponentName, EntityMap};
use crate::error::SyncError;
use crate::math::DEFAULT_EPSILON;
use crate::protocol::{Delta, DeltaEntityUpdate, Snapshot};
use crate::types::EntityId;

/// Diff `prev` (state at `base_tick`) against `next` (state at `next_tick`).
///
/// Does not check `next_tick > base_tick`; that is the caller's contract
/// (see [`delta_between`] for a checked variant).
///
/// "Id order" is the byte-wise lexicographic order of [`EntityMap`] keys, not
/// the order the simulation inserted them in: `"npc-10"` sorts before
/// `"npc-2"`. Hosts that want numeric order should zero-pad their ids.
pub fn compute_delta(prev: &EntityMap, next: &EntityMap, base_tick: u64, next_tick: u64) -> Delta {
    let mut added = Vec::new();
    let mut updated = Vec::new();

    for (id, next_components) in next {
        match prev.get(id) {
            None => added.push(DeltaEntityUpdate {
                entity_id: id.clone(),
                components: Some(next_components.clone()),
                removed_components: None,
            }),
            Some(prev_components) => {
                if let Some(update) = diff_entity(id, prev_components, next_components) {
                    updated.push(update);
                }
            }
        }
    }

    let removed: Vec<EntityId> = prev
        .keys()
        .filter(|id| !next.contains_key(*id))
        .cloned()
        .collect();

    Delta::new(next_tick, base_tick, added, updated, removed)
}

/// Checked diff of two snapshots. Carries `next`'s events onto the delta.
pub fn delta_between(prev: &Snapshot, next: &Snapshot) -> Result<Delta, SyncError> {
    if next.tick <= prev.tick {
        return Err(SyncError::NonMonotonicTick {
            base_tick: prev.tick,
            tick: next.tick,
        });
    }
    let delta = compute_delta(&prev.entities, &next.entities, prev.tick, next.tick);
    Ok(delta.with_events(next.events.clone().unwrap_or_default()))
}

/// Per-component patch for an entity present on both sides. `None` when the
/// entity contributes nothing.
fn diff_entity(id: &str, prev: &ComponentMap, next: &ComponentMap) -> Option<DeltaEntityUpdate> {
    let mut patch = ComponentMap::new();

    if let Some(n) = &next.transform {
        if !prev
            .transform
            .as_ref()
            .is_some_and(|p| p.approx_eq(n, DEFAULT_EPSILON))
        {
            patch.transform = Some(n.clone());
        }
    }

    if let Some(n) = &next.visual {
        if !prev
            .visual
            .as_ref()
            .is_some_and(|p| p.approx_eq(n, DEFAULT_EPSILON))
        {
            patch.visual = Some(n.clone());
        }
    }

    // Exact comparison.
    if let Some(n) = next.health {
        if prev.health != Some(n) {
            patch.health = Some(n);
        }
    }

    let removed_components: Vec<ComponentName> = prev
        .names()
        .into_iter()
        .filter(|name| !next.has(*name))
        .collect();

    if patch.is_empty() && removed_components.is_empty() {
        return None;
    }

    Some(DeltaEntityUpdate {
        entity_id: id.to_owned(),
        components: (!patch.is_empty()).then_some(patch),
        removed_components: (!removed_components.is_empty()).then_some(removed_components),
    })
}

/// Apply `delta` to `state` in place: upsert `added` whole, merge `updated`
/// patches then drop their `removedComponents`, delete `removed` ids.
///
/// No tick check is made here; see [`crate::replica::ReplicaState`] for the
/// gated client-side version.
pub fn apply_delta(state: &mut EntityMap, delta: &Delta) {
    for update in delta.added.iter().flatten() {
        let mut components = update.components.clone().unwrap_or_default();
        for name in update.removed_components.iter().flatten() {
            components.remove(*name);
        }
        state.insert(update.entity_id.clone(), components);
    }

    for update in delta.updated.iter().flatten() {
        let entry = state.entry(update.entity_id.clone()).or_default();
        if let Some(patch) = &update.components {
            entry.merge(patch);
        }
        for name in update.removed_components.iter().flatten() {
            entry.remove(*name);
        }
    }

    for id in delta.removed.iter().flatten() {
        state.remove(id);
    }
}
