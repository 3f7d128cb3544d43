//! INIT payload: the full initial state handed to the executor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::behavior::tree::BehaviorTreeDef;
use crate::core::types::{EntityId, Frame, Vec2};

/// A castable skill carried by a member template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Behavior tree run as the primary tree while casting
    pub tree: String,
    #[serde(default)]
    pub cooldown_frames: Frame,
    #[serde(default)]
    pub mp_cost: f64,
    /// Maximum distance to the selected target, if the skill needs one
    #[serde(default)]
    pub range: Option<f32>,
}

/// One member as supplied by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTemplate {
    pub id: EntityId,
    #[serde(rename = "type", default = "default_member_type")]
    pub member_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Vec2,
    /// Base stat values by path (`hp`, `mp`, `speed`, `attack`...)
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub skills: Vec<SkillTemplate>,
    /// Buff trees attached at spawn
    #[serde(default)]
    pub buffs: Vec<String>,
    /// Tree started as primary at spawn (autonomous members)
    #[serde(default)]
    pub behavior: Option<String>,
}

fn default_member_type() -> String {
    "unit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTemplate {
    pub team_id: String,
    #[serde(default)]
    pub members: Vec<MemberTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideTemplate {
    pub camp_id: String,
    #[serde(default)]
    pub teams: Vec<TeamTemplate>,
}

/// Everything CMD_INIT carries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// Seed for every random choice made by the simulation
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub sides: Vec<SideTemplate>,
    #[serde(default)]
    pub behavior_trees: Vec<BehaviorTreeDef>,
}

impl InitPayload {
    /// Iterate members with their camp and team ids, in payload order
    pub fn members(&self) -> impl Iterator<Item = (&str, &str, &MemberTemplate)> {
        self.sides.iter().flat_map(|side| {
            side.teams.iter().flat_map(move |team| {
                team.members
                    .iter()
                    .map(move |m| (side.camp_id.as_str(), team.team_id.as_str(), m))
            })
        })
    }

    pub fn member_count(&self) -> usize {
        self.members().count()
    }
}
