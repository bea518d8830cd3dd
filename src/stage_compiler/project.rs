// Project specification document
//
// The assembled, validated and pruned description of one game.

use crate::stage_compiler::error::Span;
use crate::stage_compiler::ir::RuleSpec;
use crate::stage_compiler::schema::{Schema, TypeExpr};
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSpec {
    pub value: Value,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorInstance {
    pub schema: String,
    pub uid: String,
    /// Every schema field, declared values overriding defaults.
    pub fields: IndexMap<String, Value>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Human,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSpec {
    pub schema: String,
    pub kind: RoleKind,
    /// Server-owned fields; local fields keep their schema defaults on each client.
    pub fields: IndexMap<String, Value>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Audio,
    Font,
    Data,
}

impl ResourceKind {
    pub fn from_path(path: &str) -> ResourceKind {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" => ResourceKind::Image,
            "wav" | "mp3" | "ogg" | "flac" | "m4a" => ResourceKind::Audio,
            "ttf" | "otf" | "woff" | "woff2" => ResourceKind::Font,
            _ => ResourceKind::Data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSpec {
    pub path: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpriteSpec {
    pub clips: IndexMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSpec {
    pub grid: Vec<Vec<i64>>,
    pub tile_size: f64,
    /// Tile code to the actor schema spawned for it.
    pub tiles: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSpec {
    pub width: f64,
    pub height: f64,
    pub gravity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl Default for SceneSpec {
    fn default() -> Self {
        SceneSpec {
            width: 800.0,
            height: 600.0,
            gravity: 0.0,
            background: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    Realtime,
    Turn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiplayerSpec {
    pub default_loop: LoopMode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub turn_order: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<i64>,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub roles: IndexMap<String, String>,
    /// Where each per-role interface was set.
    #[serde(skip)]
    pub role_spans: IndexMap<String, Span>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectSpec {
    pub actor_schemas: IndexMap<String, Schema>,
    pub role_schemas: IndexMap<String, Schema>,
    pub globals: IndexMap<String, GlobalSpec>,
    pub actors: Vec<ActorInstance>,
    pub rules: Vec<RuleSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapSpec>,
    pub cameras: IndexMap<String, CameraSpec>,
    pub resources: IndexMap<String, ResourceSpec>,
    pub sprites: IndexMap<String, SpriteSpec>,
    pub scene: SceneSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplayer: Option<MultiplayerSpec>,
    pub roles: IndexMap<String, RoleSpec>,
    pub interface: InterfaceSpec,
    /// Names of the functions kept after pruning; bodies live in the IR document.
    pub actions: Vec<String>,
    pub predicates: Vec<String>,
    pub callables: Vec<String>,
}

impl ProjectSpec {
    pub fn actor(&self, uid: &str) -> Option<&ActorInstance> {
        self.actors.iter().find(|a| a.uid == uid)
    }

    pub fn human_roles(&self) -> impl Iterator<Item = (&String, &RoleSpec)> {
        self.roles.iter().filter(|(_, r)| r.kind == RoleKind::Human)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_resource_kind_from_extension() {
        assert_eq!(ResourceKind::from_path("art/hero.PNG"), ResourceKind::Image);
        assert_eq!(ResourceKind::from_path("sfx/jump.ogg"), ResourceKind::Audio);
        assert_eq!(ResourceKind::from_path("fonts/pixel.ttf"), ResourceKind::Font);
        assert_eq!(ResourceKind::from_path("levels/one"), ResourceKind::Data);
    }

    #[test]
    fn test_empty_project_serializes_in_field_order() {
        let json = serde_json::to_string(&ProjectSpec::default()).unwrap();
        let schemas = json.find("actor_schemas").unwrap();
        let scene = json.find("\"scene\"").unwrap();
        let actions = json.find("\"actions\"").unwrap();
        assert!(schemas < scene && scene < actions);
        assert!(!json.contains("\"map\""));
    }
}
