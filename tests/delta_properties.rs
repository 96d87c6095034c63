/// Property-based checks for the delta engine.
///
/// Invariants:
/// 1. Applying `compute_delta(prev, next)` to `prev` reproduces `next`
///    within epsilon, for arbitrary component sets and perturbations.
/// 2. Diffing a state against itself yields an empty delta.
/// 3. Added ids are new, removed ids are gone, and every produced delta
///    passes its own validator.
use entity_sync::{
    apply_delta, compute_delta,
    component::entity_maps_approx_eq,
    math::DEFAULT_EPSILON,
    validate, ComponentMap, EntityMap, Health, Transform, Visual,
};
use proptest::prelude::*;

fn vec3() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(-100.0f64..100.0)
}

fn transform_strategy() -> impl Strategy<Value = Transform> {
    (
        vec3(),
        prop::array::uniform4(-1.0f64..1.0),
        prop::option::of(vec3()),
        prop::option::of(vec3()),
    )
        .prop_map(|(position, rotation, scale, velocity)| Transform {
            position,
            rotation,
            scale,
            velocity,
        })
}

fn visual_strategy() -> impl Strategy<Value = Visual> {
    (
        prop::option::of("[a-z]{1,8}"),
        prop::option::of(prop::array::uniform3(0.0f64..1.0)),
    )
        .prop_map(|(model, tint)| Visual { model, tint })
}

fn health_strategy() -> impl Strategy<Value = Health> {
    (0.0f64..100.0, 1.0f64..100.0).prop_map(|(current, max)| Health::new(current, max))
}

fn components_strategy() -> impl Strategy<Value = ComponentMap> {
    (
        prop::option::of(transform_strategy()),
        prop::option::of(visual_strategy()),
        prop::option::of(health_strategy()),
    )
        .prop_map(|(transform, visual, health)| ComponentMap {
            transform,
            visual,
            health,
        })
}

fn world_strategy() -> impl Strategy<Value = EntityMap> {
    prop::collection::btree_map("e[0-9]{1,2}", components_strategy(), 0..12)
}

/// What happens to one surviving entity between `prev` and `next`.
#[derive(Debug, Clone)]
enum Edit {
    Keep,
    /// Moves every transform vector by less than epsilon.
    Jitter(f64),
    /// Moves the position by more than epsilon.
    Shift(f64),
    Hurt(f64),
    DropVisual,
    DropHealth,
    Remove,
    Replace(ComponentMap),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::Keep),
        (-4e-7f64..4e-7).prop_map(Edit::Jitter),
        (1e-5f64..10.0).prop_map(Edit::Shift),
        (0.0f64..50.0).prop_map(Edit::Hurt),
        Just(Edit::DropVisual),
        Just(Edit::DropHealth),
        Just(Edit::Remove),
        components_strategy().prop_map(Edit::Replace),
    ]
}

fn nudge(v: &mut [f64; 3], by: f64) {
    for x in v.iter_mut() {
        *x += by;
    }
}

fn evolve(prev: &EntityMap, edits: &[Edit], spawned: &EntityMap) -> EntityMap {
    let mut next = EntityMap::new();
    for (i, (id, components)) in prev.iter().enumerate() {
        let mut c = components.clone();
        match edits.get(i % edits.len().max(1)).cloned().unwrap_or(Edit::Keep) {
            Edit::Keep => {}
            Edit::Jitter(by) => {
                if let Some(t) = c.transform.as_mut() {
                    nudge(&mut t.position, by);
                    if let Some(v) = t.velocity.as_mut() {
                        nudge(v, by);
                    }
                }
            }
            Edit::Shift(by) => {
                if let Some(t) = c.transform.as_mut() {
                    t.position[0] += by;
                }
            }
            Edit::Hurt(by) => {
                if let Some(h) = c.health.as_mut() {
                    h.current -= by;
                }
            }
            Edit::DropVisual => c.visual = None,
            Edit::DropHealth => c.health = None,
            Edit::Remove => continue,
            Edit::Replace(fresh) => c = fresh,
        }
        next.insert(id.clone(), c);
    }
    for (id, components) in spawned {
        next.entry(format!("new-{id}")).or_insert_with(|| components.clone());
    }
    next
}

proptest! {
    #[test]
    fn prop_apply_reconstructs_next(
        prev in world_strategy(),
        edits in prop::collection::vec(edit_strategy(), 1..12),
        spawned in world_strategy(),
        base in 0u64..1_000_000,
    ) {
        let next = evolve(&prev, &edits, &spawned);
        let delta = compute_delta(&prev, &next, base, base + 1);

        let mut replica = prev.clone();
        apply_delta(&mut replica, &delta);
        prop_assert!(
            entity_maps_approx_eq(&replica, &next, DEFAULT_EPSILON),
            "replica {:?} != next {:?}",
            replica,
            next
        );
    }

    #[test]
    fn prop_self_diff_is_empty(state in world_strategy(), t in 0u64..1_000_000) {
        prop_assert!(compute_delta(&state, &state, t, t + 1).is_empty());
        prop_assert!(compute_delta(&state, &state, t, t).is_empty());
    }

    #[test]
    fn prop_categories_are_consistent_and_valid(
        prev in world_strategy(),
        edits in prop::collection::vec(edit_strategy(), 1..12),
        spawned in world_strategy(),
    ) {
        let next = evolve(&prev, &edits, &spawned);
        let delta = compute_delta(&prev, &next, 7, 8);

        for added in delta.added.iter().flatten() {
            prop_assert!(!prev.contains_key(&added.entity_id));
            prop_assert_eq!(added.components.as_ref(), next.get(&added.entity_id));
        }
        for id in delta.removed.iter().flatten() {
            prop_assert!(prev.contains_key(id));
            prop_assert!(!next.contains_key(id));
        }
        for updated in delta.updated.iter().flatten() {
            prop_assert!(prev.contains_key(&updated.entity_id));
            prop_assert!(next.contains_key(&updated.entity_id));
        }
        prop_assert!(validate::check_outbound(&delta).is_ok());
    }
}
