// Project Assembler - Declarations
//
// Actors, roles, globals, assets, map, cameras, scene, multiplayer and
// interface text. Every declaration value must be known at compile time.

use crate::stage_compiler::binding::parse_role_ref;
use crate::stage_compiler::error::{CompilerError, Span};
use crate::stage_compiler::project::{
    ActorInstance, CameraSpec, GlobalSpec, LoopMode, MapSpec, MultiplayerSpec, ResourceKind, ResourceSpec,
    RoleKind, RoleSpec, SceneSpec, SpriteSpec,
};
use crate::stage_compiler::schema::{FieldSpec, TypeExpr};
use crate::stage_compiler::syntax::{Expr, ExprKind};
use crate::stage_compiler::value::Value;
use indexmap::IndexMap;

use super::{DeclCall, ProjectAssembler};

impl<'a> ProjectAssembler<'a> {
    pub(super) fn add_actor(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl = call.required(0, "actor")?;
        let instance = self.actor_decl(decl)?;
        if self.project.actor(&instance.uid).is_some() {
            return Err(CompilerError::DuplicateSymbol(
                format!("actor '{}'", instance.uid),
                decl.span,
            ));
        }
        log::debug!("ASSEMBLE: actor {} ({})", instance.uid, instance.schema);
        self.project.actors.push(instance);
        Ok(())
    }

    /// `Schema(uid?, field=value, ...)`; the uid defaults to the schema name.
    fn actor_decl(&self, expr: &Expr) -> Result<ActorInstance, CompilerError> {
        let names: Vec<&str> = self.schemas.actors().keys().map(String::as_str).collect();
        let call = self.declaration(expr, &names)?;
        let schema = self
            .schemas
            .actor(call.name)
            .ok_or_else(|| CompilerError::UndefinedSymbol(call.name.to_string(), call.span))?;
        if call.args.len() > 1 {
            return Err(CompilerError::UnsupportedSyntax(
                format!("{}() takes the uid as its only positional argument", call.name),
                call.args[1].span,
            ));
        }
        let uid = match call.arg(0, "uid") {
            Some(uid) => self.static_str(uid, "actor uid")?,
            None => schema.name.clone(),
        };
        let mut fields = self.field_values(&call, &schema.fields, &["uid"])?;
        fields.insert("uid".to_string(), Value::Str(uid.clone()));
        Ok(ActorInstance {
            schema: schema.name.clone(),
            uid,
            fields,
            span: call.span,
        })
    }

    /// Schema defaults overridden by the declaration's keywords, coerced to field types.
    fn field_values(
        &self,
        call: &DeclCall,
        schema_fields: &IndexMap<String, FieldSpec>,
        reserved: &[&str],
    ) -> Result<IndexMap<String, Value>, CompilerError> {
        let mut values: IndexMap<String, Value> = schema_fields
            .iter()
            .filter(|(_, spec)| !spec.local)
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect();
        for keyword in call.keywords {
            if reserved.contains(&keyword.name.as_str()) {
                continue;
            }
            let spec = schema_fields.get(&keyword.name).ok_or_else(|| {
                CompilerError::UndefinedSymbol(
                    format!("{}.{}", call.name, keyword.name),
                    keyword.value.span,
                )
            })?;
            if spec.local {
                return Err(CompilerError::BindingError(
                    format!(
                        "'{}' is a client-local field of {} and cannot be set when declaring a role",
                        keyword.name, call.name
                    ),
                    keyword.value.span,
                ));
            }
            let value = self.static_value(&keyword.value, &format!("field '{}'", keyword.name))?;
            let coerced = spec.ty.coerce(&value).ok_or_else(|| {
                CompilerError::TypeMismatch(
                    format!("{} for {}.{}", spec.ty, call.name, keyword.name),
                    value.type_name().to_string(),
                    keyword.value.span,
                )
            })?;
            values.insert(keyword.name.clone(), coerced);
        }
        Ok(values)
    }

    pub(super) fn add_global(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(3, &["name", "value", "type"])?;
        let name = self.static_str(call.required(0, "name")?, "global name")?;
        let value_expr = call.required(1, "value")?;
        let value = self.static_value(value_expr, &format!("global '{}'", name))?;
        let (value, ty) = match call.arg(2, "type") {
            Some(annotation) => {
                let ty = TypeExpr::parse(annotation)?;
                let coerced = ty.coerce(&value).ok_or_else(|| {
                    CompilerError::TypeMismatch(ty.to_string(), value.type_name().to_string(), value_expr.span)
                })?;
                (coerced, Some(ty))
            }
            None => {
                let ty = TypeExpr::infer(&value);
                (value, ty)
            }
        };
        if self.project.globals.contains_key(&name) {
            return Err(CompilerError::DuplicateSymbol(format!("global '{}'", name), call.span));
        }
        log::debug!("ASSEMBLE: global {} = {}", name, value);
        self.project.globals.insert(name, GlobalSpec { value, ty });
        Ok(())
    }

    pub(super) fn add_resource(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl = self.declaration(call.required(0, "resource")?, &["Resource"])?;
        decl.expect_args(2, &["name", "path"])?;
        let name = self.static_str(decl.required(0, "name")?, "resource name")?;
        let path = self.static_str(decl.required(1, "path")?, "resource path")?;
        if self.project.resources.contains_key(&name) {
            return Err(CompilerError::DuplicateSymbol(format!("resource '{}'", name), decl.span));
        }
        let kind = ResourceKind::from_path(&path);
        self.project.resources.insert(name, ResourceSpec { path, kind });
        Ok(())
    }

    pub(super) fn add_sprite(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl = self.declaration(call.required(0, "sprite")?, &["Sprite"])?;
        decl.expect_args(2, &["name", "clips"])?;
        let name = self.static_str(decl.required(0, "name")?, "sprite name")?;
        let clips_expr = decl.required(1, "clips")?;
        let clips = match self.static_value(clips_expr, "sprite clips")? {
            Value::Dict(entries) => {
                let mut clips = IndexMap::new();
                for (clip, frames) in entries {
                    match frames {
                        Value::List(frames) => clips.insert(clip, frames),
                        other => {
                            return Err(CompilerError::TypeMismatch(
                                format!("a list of frames for clip '{}'", clip),
                                other.type_name().to_string(),
                                clips_expr.span,
                            ))
                        }
                    };
                }
                clips
            }
            other => {
                return Err(CompilerError::TypeMismatch(
                    "a dict of clips".to_string(),
                    other.type_name().to_string(),
                    clips_expr.span,
                ))
            }
        };
        if self.project.sprites.contains_key(&name) {
            return Err(CompilerError::DuplicateSymbol(format!("sprite '{}'", name), decl.span));
        }
        self.project.sprites.insert(name, SpriteSpec { clips });
        Ok(())
    }

    pub(super) fn set_map(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl = self.declaration(call.required(0, "map")?, &["Map"])?;
        decl.expect_args(0, &["grid", "tile_size", "tiles"])?;
        if self.project.map.is_some() {
            return Err(CompilerError::DuplicateSymbol("map".to_string(), call.span));
        }
        let grid_expr = decl.required(0, "grid")?;
        let grid = self.grid(grid_expr)?;
        let tile_size = match decl.keyword("tile_size") {
            Some(size) => self.static_number(size, "tile_size")?,
            None => 32.0,
        };

        let mut tiles = IndexMap::new();
        if let Some(tiles_expr) = decl.keyword("tiles") {
            let entries = match &self.resolve(tiles_expr).kind {
                ExprKind::Dict(entries) => entries,
                _ => {
                    return Err(CompilerError::TypeMismatch(
                        "a dict of tile code to actor schema".to_string(),
                        tiles_expr.describe(),
                        tiles_expr.span,
                    ))
                }
            };
            for (code, schema) in entries {
                let code = match self.static_value(code, "tile code")? {
                    Value::Int(i) => i.to_string(),
                    Value::Str(s) => s,
                    other => {
                        return Err(CompilerError::TypeMismatch(
                            "int or str tile code".to_string(),
                            other.type_name().to_string(),
                            code.span,
                        ))
                    }
                };
                let schema_name = match schema.as_name() {
                    Some(name) if self.schemas.is_actor(name) => name.to_string(),
                    Some(name) => return Err(CompilerError::UndefinedSymbol(name.to_string(), schema.span)),
                    None => {
                        return Err(CompilerError::BindingError(
                            format!("tile '{}' must name an actor schema", code),
                            schema.span,
                        ))
                    }
                };
                tiles.insert(code, schema_name);
            }
        }
        for (row, cells) in grid.iter().enumerate() {
            if let Some(cell) = cells.iter().find(|c| **c != 0 && !tiles.contains_key(&c.to_string())) {
                return Err(CompilerError::ValidationError(
                    format!("map row {} uses tile {} which has no entry in tiles", row + 1, cell),
                    grid_expr.span,
                ));
            }
        }
        log::debug!("ASSEMBLE: map {}x{} with {} tile kinds", grid.first().map_or(0, Vec::len), grid.len(), tiles.len());
        self.project.map = Some(MapSpec {
            grid,
            tile_size,
            tiles,
        });
        Ok(())
    }

    /// Inline matrix or `load_grid("file")`.
    fn grid(&self, expr: &Expr) -> Result<Vec<Vec<i64>>, CompilerError> {
        let resolved = self.resolve(expr);
        if let ExprKind::Call { func, args, .. } = &resolved.kind {
            if func.as_name() == Some("load_grid") {
                let path = match args.first() {
                    Some(path) if args.len() == 1 => self.static_str(path, "grid file")?,
                    _ => {
                        return Err(CompilerError::UnsupportedSyntax(
                            "load_grid() takes one file path".to_string(),
                            resolved.span,
                        ))
                    }
                };
                let text = self.load_asset(&path, resolved.span)?;
                return parse_grid(&text, &path, resolved.span);
            }
        }
        let rows = match self.static_value(expr, "map grid")? {
            Value::List(rows) => rows,
            other => return Err(grid_shape_error(other.type_name(), expr.span)),
        };
        let mut grid = Vec::new();
        for row in rows {
            let cells = match row {
                Value::List(cells) => cells,
                other => return Err(grid_shape_error(other.type_name(), expr.span)),
            };
            let cells = cells
                .iter()
                .map(|cell| match cell {
                    Value::Int(i) => Ok(*i),
                    other => Err(grid_shape_error(other.type_name(), expr.span)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            grid.push(cells);
        }
        check_rectangular(&grid, expr.span)?;
        Ok(grid)
    }

    pub(super) fn add_camera(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl = self.declaration(call.required(0, "camera")?, &["Camera"])?;
        decl.expect_args(1, &["name", "role", "x", "y", "width", "height", "zoom"])?;
        let name = self.static_str(decl.required(0, "name")?, "camera name")?;
        let role = match decl.keyword("role") {
            Some(role) => Some(parse_role_ref(self.resolve(role), &self.schemas)?),
            None => None,
        };
        let number = |key: &str, default: f64| -> Result<f64, CompilerError> {
            match decl.keyword(key) {
                Some(value) => self.static_number(value, &format!("camera {}", key)),
                None => Ok(default),
            }
        };
        let camera = CameraSpec {
            role,
            x: number("x", 0.0)?,
            y: number("y", 0.0)?,
            width: number("width", self.project.scene.width)?,
            height: number("height", self.project.scene.height)?,
            zoom: number("zoom", 1.0)?,
            span: decl.span,
        };
        if camera.zoom <= 0.0 {
            return Err(CompilerError::ValidationError(
                format!("camera '{}' zoom must be positive", name),
                decl.span,
            ));
        }
        if self.project.cameras.contains_key(&name) {
            return Err(CompilerError::DuplicateSymbol(format!("camera '{}'", name), decl.span));
        }
        log::debug!("ASSEMBLE: camera {} for {:?}", name, camera.role);
        self.project.cameras.insert(name, camera);
        Ok(())
    }

    /// `<RoleSchema>(id?, kind="human"|"ai", field=value, ...)`; the id defaults to
    /// the schema name.
    pub(super) fn add_role(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(1, &[])?;
        let decl_expr = call.required(0, "role")?;
        let names: Vec<&str> = self.schemas.roles().keys().map(String::as_str).collect();
        let decl = self.declaration(decl_expr, &names)?;
        let schema = self
            .schemas
            .role(decl.name)
            .ok_or_else(|| CompilerError::UndefinedSymbol(decl.name.to_string(), decl.span))?;
        if decl.args.len() > 1 {
            return Err(CompilerError::UnsupportedSyntax(
                format!("{}() takes the role id as its only positional argument", decl.name),
                decl.args[1].span,
            ));
        }
        let id = match decl.arg(0, "id") {
            Some(id) => self.static_str(id, "role id")?,
            None => schema.name.clone(),
        };
        let kind = match decl.keyword("kind") {
            Some(kind) => match self.static_str(kind, "role kind")?.as_str() {
                "human" => RoleKind::Human,
                "ai" => RoleKind::Ai,
                other => {
                    return Err(CompilerError::ValidationError(
                        format!("role kind must be \"human\" or \"ai\", found \"{}\"", other),
                        kind.span,
                    ))
                }
            },
            None => RoleKind::Human,
        };
        let fields = self.field_values(&decl, &schema.fields, &["id", "kind"])?;
        if self.project.roles.contains_key(&id) {
            return Err(CompilerError::DuplicateSymbol(format!("role '{}'", id), decl.span));
        }
        log::debug!("ASSEMBLE: role {} ({:?})", id, kind);
        let schema = schema.name.clone();
        self.project.roles.insert(
            id,
            RoleSpec {
                schema,
                kind,
                fields,
                span: decl.span,
            },
        );
        Ok(())
    }

    pub(super) fn set_interface(&mut self, call: &DeclCall) -> Result<(), CompilerError> {
        call.expect_args(2, &["text", "role"])?;
        let text_expr = call.required(0, "text")?;
        let text = self.interface_text(text_expr)?;
        match call.arg(1, "role") {
            Some(role) => {
                let role = parse_role_ref(self.resolve(role), &self.schemas)?;
                if self.project.interface.roles.contains_key(&role) {
                    return Err(CompilerError::DuplicateSymbol(
                        format!("interface for role '{}'", role),
                        call.span,
                    ));
                }
                self.project.interface.role_spans.insert(role.clone(), call.span);
                self.project.interface.roles.insert(role, text);
            }
            None => {
                if self.project.interface.global.is_some() {
                    return Err(CompilerError::DuplicateSymbol("global interface".to_string(), call.span));
                }
                self.project.interface.global = Some(text);
            }
        }
        Ok(())
    }

    /// Literal text or `load_text("file")`.
    fn interface_text(&self, expr: &Expr) -> Result<String, CompilerError> {
        let resolved = self.resolve(expr);
        if let ExprKind::Call { func, args, .. } = &resolved.kind {
            if func.as_name() == Some("load_text") {
                return match args.first() {
                    Some(path) if args.len() == 1 => {
                        let path = self.static_str(path, "interface file")?;
                        self.load_asset(&path, resolved.span)
                    }
                    _ => Err(CompilerError::UnsupportedSyntax(
                        "load_text() takes one file path".to_string(),
                        resolved.span,
                    )),
                };
            }
        }
        self.static_str(expr, "interface text")
    }

    pub(super) fn scene_decl(&self, expr: &Expr) -> Result<SceneSpec, CompilerError> {
        let decl = self.declaration(expr, &["Scene"])?;
        decl.expect_args(0, &["width", "height", "gravity", "background"])?;
        let mut scene = SceneSpec::default();
        if let Some(width) = decl.keyword("width") {
            scene.width = self.static_number(width, "scene width")?;
        }
        if let Some(height) = decl.keyword("height") {
            scene.height = self.static_number(height, "scene height")?;
        }
        if let Some(gravity) = decl.keyword("gravity") {
            scene.gravity = self.static_number(gravity, "scene gravity")?;
        }
        if let Some(background) = decl.keyword("background") {
            scene.background = Some(self.static_str(background, "scene background")?);
        }
        if scene.width <= 0.0 || scene.height <= 0.0 {
            return Err(CompilerError::ValidationError(
                "scene width and height must be positive".to_string(),
                decl.span,
            ));
        }
        Ok(scene)
    }

    pub(super) fn multiplayer_decl(&self, expr: &Expr) -> Result<MultiplayerSpec, CompilerError> {
        let decl = self.declaration(expr, &["Multiplayer"])?;
        decl.expect_args(0, &["default_loop", "turn_order", "max_players"])?;
        let default_loop = match decl.keyword("default_loop") {
            Some(mode) => match self.static_str(mode, "default_loop")?.as_str() {
                "realtime" => LoopMode::Realtime,
                "turn" => LoopMode::Turn,
                other => {
                    return Err(CompilerError::ValidationError(
                        format!("default_loop must be \"realtime\" or \"turn\", found \"{}\"", other),
                        mode.span,
                    ))
                }
            },
            None => LoopMode::Realtime,
        };
        let mut turn_order = Vec::new();
        if let Some(order) = decl.keyword("turn_order") {
            match &self.resolve(order).kind {
                ExprKind::List(items) | ExprKind::Tuple(items) => {
                    for item in items {
                        turn_order.push(parse_role_ref(self.resolve(item), &self.schemas)?);
                    }
                }
                _ => {
                    return Err(CompilerError::TypeMismatch(
                        "a list of roles".to_string(),
                        order.describe(),
                        order.span,
                    ))
                }
            }
        }
        let max_players = match decl.keyword("max_players") {
            Some(max) => match self.static_value(max, "max_players")? {
                Value::Int(n) if n > 0 => Some(n),
                other => {
                    return Err(CompilerError::TypeMismatch(
                        "a positive int".to_string(),
                        other.to_string(),
                        max.span,
                    ))
                }
            },
            None => None,
        };
        Ok(MultiplayerSpec {
            default_loop,
            turn_order,
            max_players,
            span: decl.span,
        })
    }
}

/// Rows of comma- or whitespace-separated integers; blank lines and `#` comments
/// are skipped.
pub(crate) fn parse_grid(text: &str, path: &str, span: Span) -> Result<Vec<Vec<i64>>, CompilerError> {
    let mut grid = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<i64>().map_err(|_| {
                    CompilerError::ValidationError(
                        format!("{}:{}: '{}' is not an integer tile code", path, number + 1, cell),
                        span,
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        grid.push(row);
    }
    check_rectangular(&grid, span)?;
    Ok(grid)
}

fn check_rectangular(grid: &[Vec<i64>], span: Span) -> Result<(), CompilerError> {
    let width = grid.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(CompilerError::ValidationError("map grid is empty".to_string(), span));
    }
    match grid.iter().position(|row| row.len() != width) {
        Some(row) => Err(CompilerError::ValidationError(
            format!(
                "map row {} has {} cells but the first row has {}",
                row + 1,
                grid[row].len(),
                width
            ),
            span,
        )),
        None => Ok(()),
    }
}

fn grid_shape_error(found: &str, span: Span) -> CompilerError {
    CompilerError::TypeMismatch("a list of rows of int tile codes".to_string(), found.to_string(), span)
}
