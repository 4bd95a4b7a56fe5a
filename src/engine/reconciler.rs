use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Marker;
use crate::geo::is_near;

/// Positional comparison of two marker lists by id and exact position.
///
/// Order matters: callers hand in lists sorted by a stable key.
pub fn should_update<M: Marker>(previous: &[M], next: &[M]) -> bool {
    if previous.len() != next.len() {
        return true;
    }

    previous
        .iter()
        .zip(next.iter())
        .any(|(p, n)| p.id() != n.id() || p.point() != n.point())
}

/// A marker as drawn, with the instance handle the surface keeps alive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedMarker<M> {
    pub instance: Uuid,
    pub marker: M,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub moved: Vec<String>,
}

impl MarkerChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

/// One rendered layer of markers (nearby drivers or requesting passengers).
#[derive(Debug)]
pub struct MarkerLayer<M: Marker> {
    identity_epsilon: f64,
    markers: Vec<RenderedMarker<M>>,
    selected: Option<String>,
}

impl<M: Marker> MarkerLayer<M> {
    pub fn new(identity_epsilon: f64) -> Self {
        Self {
            identity_epsilon,
            markers: vec![],
            selected: None,
        }
    }

    pub fn markers(&self) -> &[RenderedMarker<M>] {
        &self.markers
    }

    pub fn selected(&self) -> Option<&M> {
        let id = self.selected.as_deref()?;
        self.find(id)
    }

    pub fn find(&self, id: &str) -> Option<&M> {
        self.markers
            .iter()
            .find(|m| m.marker.id() == id)
            .map(|m| &m.marker)
    }

    /// Replaces the layer with a fresh poll. Returns `None` when nothing
    /// visible changed and the surface can skip re-rendering.
    #[tracing::instrument(skip_all, fields(kind = M::KIND))]
    pub fn reconcile(&mut self, mut next: Vec<M>) -> Option<MarkerChanges> {
        next.sort_by(|a, b| a.id().cmp(b.id()));

        let current: Vec<M> = self.markers.iter().map(|m| m.marker.clone()).collect();
        if !should_update(&current, &next) {
            tracing::debug!("marker poll unchanged");
            return None;
        }

        let mut previous: HashMap<String, RenderedMarker<M>> = self
            .markers
            .drain(..)
            .map(|m| (m.marker.id().to_string(), m))
            .collect();

        let mut changes = MarkerChanges::default();
        let mut rendered = Vec::with_capacity(next.len());

        for marker in next {
            let instance = match previous.remove(marker.id()) {
                Some(old) if is_near(old.marker.point(), marker.point(), self.identity_epsilon) => {
                    if old.marker.point() != marker.point() {
                        changes.moved.push(marker.id().to_string());
                    }
                    old.instance
                }
                Some(_) => {
                    // jumped too far to animate, redraw
                    changes.removed.push(marker.id().to_string());
                    changes.added.push(marker.id().to_string());
                    Uuid::new_v4()
                }
                None => {
                    changes.added.push(marker.id().to_string());
                    Uuid::new_v4()
                }
            };

            rendered.push(RenderedMarker { instance, marker });
        }

        let mut removed: Vec<String> = previous.into_keys().collect();
        removed.sort();
        changes.removed.extend(removed);

        if let Some(id) = &self.selected {
            if !rendered.iter().any(|m| m.marker.id() == id) {
                tracing::debug!(id = id.as_str(), "selected marker left the layer");
                self.selected = None;
            }
        }

        self.markers = rendered;

        tracing::info!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            moved = changes.moved.len(),
            "marker layer updated"
        );

        Some(changes)
    }

    /// Click dispatch keyed by id. Unknown ids are ignored.
    pub fn click(&mut self, id: &str) -> Option<&M> {
        if self.find(id).is_none() {
            tracing::debug!(kind = M::KIND, id, "click on unknown marker");
            return None;
        }

        self.selected = Some(id.to_string());
        self.find(id)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

#[cfg(test)]
fn driver(id: &str, latitude: f64, longitude: f64) -> crate::entities::NearbyDriverMarker {
    crate::entities::NearbyDriverMarker {
        id: id.into(),
        point: crate::entities::GeoPoint::new(latitude, longitude),
        display_name: format!("driver {}", id),
        vehicle_description: "".into(),
        rating: 4.5,
    }
}

#[test]
fn identical_lists_do_not_update() {
    let previous = vec![driver("d1", 1.0, -77.0)];
    let next = vec![driver("d1", 1.0, -77.0)];

    assert!(!should_update(&previous, &next));
}

#[test]
fn exact_position_change_updates() {
    let previous = vec![driver("d1", 1.0, -77.0)];
    let next = vec![driver("d1", 1.00005, -77.0)];

    assert!(should_update(&previous, &next));
}

#[test]
fn length_and_order_changes_update() {
    let a = driver("d1", 1.0, -77.0);
    let b = driver("d2", 1.1, -77.1);

    assert!(should_update(&[a.clone()], &[a.clone(), b.clone()]));
    assert!(should_update(&[a.clone(), b.clone()], &[b.clone(), a.clone()]));
    assert!(!should_update::<crate::entities::NearbyDriverMarker>(&[], &[]));
}

#[test]
fn layer_ignores_reordered_poll() {
    let mut layer = MarkerLayer::new(0.0001);

    assert!(layer
        .reconcile(vec![driver("d2", 1.1, -77.1), driver("d1", 1.0, -77.0)])
        .is_some());
    assert!(layer
        .reconcile(vec![driver("d1", 1.0, -77.0), driver("d2", 1.1, -77.1)])
        .is_none());
    assert_eq!(layer.markers()[0].marker.id, "d1");
}

#[test]
fn layer_keeps_instance_for_small_moves() {
    let mut layer = MarkerLayer::new(0.0001);
    layer.reconcile(vec![driver("d1", 1.0, -77.0), driver("d2", 1.1, -77.1)]);
    let d1 = layer.markers()[0].instance;
    let d2 = layer.markers()[1].instance;

    let changes = layer
        .reconcile(vec![driver("d1", 1.00005, -77.0), driver("d2", 1.2, -77.1)])
        .unwrap();

    assert_eq!(changes.moved, vec!["d1".to_string()]);
    assert_eq!(changes.added, vec!["d2".to_string()]);
    assert_eq!(changes.removed, vec!["d2".to_string()]);
    assert_eq!(layer.markers()[0].instance, d1);
    assert_ne!(layer.markers()[1].instance, d2);
}

#[test]
fn selection_survives_neighbour_changes() {
    let mut layer = MarkerLayer::new(0.0001);
    layer.reconcile(vec![
        driver("d1", 1.0, -77.0),
        driver("d2", 1.1, -77.1),
        driver("d3", 1.2, -77.2),
    ]);

    assert_eq!(layer.click("d3").unwrap().id, "d3");
    assert!(layer.click("missing").is_none());

    layer.reconcile(vec![driver("d3", 1.20001, -77.2)]);
    assert_eq!(layer.selected().unwrap().id, "d3");

    layer.reconcile(vec![driver("d1", 1.0, -77.0)]);
    assert!(layer.selected().is_none());
}

#[test]
fn emptied_poll_removes_everything() {
    let mut layer = MarkerLayer::new(0.0001);
    layer.reconcile(vec![
        driver("d1", 1.0, -77.0),
        driver("d2", 1.1, -77.1),
        driver("d3", 1.2, -77.2),
    ]);

    let changes = layer.reconcile(vec![]).unwrap();

    assert_eq!(changes.removed.len(), 3);
    assert!(layer.markers().is_empty());
}
