//! Per-entity state fragments and the component map that holds them.
//!
//! A [`ComponentMap`] is an explicit field set, one `Option` per component.
//! Adding a component means adding a field here and a variant to
//! [`ComponentName`]; every exhaustive `match` on the name then points at the
//! places (diffing, validation, patch application) that need updating.

use crate::math::{opt_vec_approx_eq, vec_approx_eq};
use crate::types::{EntityId, Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Complete world state: every live entity and its components, ordered by id.
pub type EntityMap = BTreeMap<EntityId, ComponentMap>;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: Quaternion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vector3>,
}

impl Transform {
    pub fn new(position: Vector3, rotation: Quaternion) -> Self {
        Self {
            position,
            rotation,
            scale: None,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        vec_approx_eq(&self.position, &other.position, eps)
            && vec_approx_eq(&self.rotation, &other.rotation, eps)
            && opt_vec_approx_eq(
                self.scale.as_ref().map(|v| &v[..]),
                other.scale.as_ref().map(|v| &v[..]),
                eps,
            )
            && opt_vec_approx_eq(
                self.velocity.as_ref().map(|v| &v[..]),
                other.velocity.as_ref().map(|v| &v[..]),
                eps,
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Visual {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<Vector3>,
}

impl Visual {
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        self.model == other.model
            && opt_vec_approx_eq(
                self.tint.as_ref().map(|v| &v[..]),
                other.tint.as_ref().map(|v| &v[..]),
                eps,
            )
    }
}

/// Game-balance values; compared exactly, never with a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Health {
    pub current: f64,
    pub max: f64,
}

impl Health {
    pub fn new(current: f64, max: f64) -> Self {
        Self { current, max }
    }
}

// ---------------------------------------------------------------------------
// Component names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentName {
    Transform,
    Visual,
    Health,
}

impl ComponentName {
    /// Every known component, in wire order.
    pub const ALL: [ComponentName; 3] = [Self::Transform, Self::Visual, Self::Health];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Visual => "visual",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|n| n.as_str() == s).ok_or(())
    }
}

// ---------------------------------------------------------------------------
// Component map
// ---------------------------------------------------------------------------

/// Partial component set for one entity. An absent field means the entity
/// does not currently have that component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct ComponentMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<Visual>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
}

impl ComponentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_visual(mut self, visual: Visual) -> Self {
        self.visual = Some(visual);
        self
    }

    pub fn with_health(mut self, health: Health) -> Self {
        self.health = Some(health);
        self
    }

    pub fn has(&self, name: ComponentName) -> bool {
        match name {
            ComponentName::Transform => self.transform.is_some(),
            ComponentName::Visual => self.visual.is_some(),
            ComponentName::Health => self.health.is_some(),
        }
    }

    /// Names of the components present, in [`ComponentName::ALL`] order.
    pub fn names(&self) -> Vec<ComponentName> {
        ComponentName::ALL
            .into_iter()
            .filter(|n| self.has(*n))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    pub fn remove(&mut self, name: ComponentName) {
        match name {
            ComponentName::Transform => self.transform = None,
            ComponentName::Visual => self.visual = None,
            ComponentName::Health => self.health = None,
        }
    }

    /// Upsert every component present in `patch`; components absent from the
    /// patch are left alone.
    pub fn merge(&mut self, patch: &ComponentMap) {
        if let Some(t) = &patch.transform {
            self.transform = Some(t.clone());
        }
        if let Some(v) = &patch.visual {
            self.visual = Some(v.clone());
        }
        if let Some(h) = patch.health {
            self.health = Some(h);
        }
    }

    /// Same rules the diff engine uses: epsilon for transform/visual, exact
    /// for health.
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        let transform = match (&self.transform, &other.transform) {
            (None, None) => true,
            (Some(a), Some(b)) => a.approx_eq(b, eps),
            _ => false,
        };
        let visual = match (&self.visual, &other.visual) {
            (None, None) => true,
            (Some(a), Some(b)) => a.approx_eq(b, eps),
            _ => false,
        };
        transform && visual && self.health == other.health
    }
}

/// Entity maps are equal when they hold the same ids and every pair of
/// component maps is [`ComponentMap::approx_eq`].
pub fn entity_maps_approx_eq(a: &EntityMap, b: &EntityMap, eps: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(id, ca)| b.get(id).is_some_and(|cb| ca.approx_eq(cb, eps)))
}
