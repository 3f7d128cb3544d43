//! Read-only start-of-frame picture of the world
//!
//! Capabilities see other members only through this view, so every member
//! ticked in a frame observes the same positions regardless of tick order.

use ahash::AHashMap;
use ordered_float::OrderedFloat;

use crate::core::types::{EntityId, Vec2};

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSummary {
    pub id: EntityId,
    pub camp_id: String,
    pub position: Vec2,
    pub alive: bool,
    pub hp: f64,
    pub hp_max: f64,
}

#[derive(Debug, Clone, Default)]
pub struct WorldView {
    members: Vec<MemberSummary>,
    index: AHashMap<EntityId, usize>,
}

impl WorldView {
    pub fn new(members: Vec<MemberSummary>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        Self { members, index }
    }

    pub fn get(&self, id: &EntityId) -> Option<&MemberSummary> {
        self.index.get(id).map(|&i| &self.members[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberSummary> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Living members of other camps, in spawn order
    pub fn living_enemies<'a>(&'a self, camp_id: &'a str) -> impl Iterator<Item = &'a MemberSummary> + 'a {
        self.members
            .iter()
            .filter(move |m| m.alive && m.camp_id != camp_id)
    }

    /// Closest living enemy within `range` (unbounded if None); ties go to
    /// the lexically smaller id
    pub fn nearest_enemy<'a>(&'a self, from: Vec2, camp_id: &str, range: Option<f32>) -> Option<&'a MemberSummary> {
        self.members
            .iter()
            .filter(|m| m.alive && m.camp_id != camp_id)
            .map(|m| (m, m.position.distance(&from)))
            .filter(|(_, d)| range.map_or(true, |r| *d <= r))
            .min_by_key(|(m, d)| (OrderedFloat(*d), m.id.clone()))
            .map(|(m, _)| m)
    }

    /// Living members whose position is within `radius` of `center`
    pub fn within_radius(&self, center: Vec2, radius: f32) -> Vec<&MemberSummary> {
        self.members
            .iter()
            .filter(|m| m.alive && m.position.distance(&center) <= radius)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, camp: &str, x: f32, alive: bool) -> MemberSummary {
        MemberSummary {
            id: EntityId::from(id),
            camp_id: camp.into(),
            position: Vec2::new(x, 0.0),
            alive,
            hp: 10.0,
            hp_max: 10.0,
        }
    }

    #[test]
    fn test_nearest_enemy_skips_allies_and_dead() {
        let view = WorldView::new(vec![
            summary("me", "red", 0.0, true),
            summary("ally", "red", 1.0, true),
            summary("corpse", "blue", 2.0, false),
            summary("far", "blue", 9.0, true),
            summary("near", "blue", 4.0, true),
        ]);
        let found = {
            // the result borrows the view, not the camp name
            let camp = String::from("red");
            view.nearest_enemy(Vec2::default(), &camp, None)
        };
        assert_eq!(found.map(|m| m.id.as_str()), Some("near"));
        assert!(view.nearest_enemy(Vec2::default(), "red", Some(3.0)).is_none());
    }

    #[test]
    fn test_nearest_enemy_tie_breaks_by_id() {
        let view = WorldView::new(vec![
            summary("b", "blue", 5.0, true),
            summary("a", "blue", -5.0, true),
        ]);
        let found = view.nearest_enemy(Vec2::default(), "red", None).unwrap();
        assert_eq!(found.id.as_str(), "a");
    }

    #[test]
    fn test_within_radius() {
        let view = WorldView::new(vec![
            summary("a", "blue", 1.0, true),
            summary("b", "blue", 3.0, true),
            summary("c", "blue", 1.5, false),
        ]);
        let hits: Vec<&str> = view
            .within_radius(Vec2::default(), 2.0)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(hits, vec!["a"]);
    }
}
