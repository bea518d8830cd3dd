// End-to-end compilation scenarios
// Drives the public StageCompiler from source text to project, IR and JavaScript

use std::path::PathBuf;

use stagehand::stage_compiler::ir::{Selector, COLLIDER_A, COLLIDER_B};
use stagehand::stage_compiler::{CompiledGame, CompilerConfig, CompilerError, StageCompiler};
use stagehand::stage_compiler::value::Value;
use test_log::test;

const TWO_PLAYERS: &str = r#"
class Player(Actor):
    score: int = 0

class Coin(Actor):
    value: int = 1

class Pilot(Role):
    points: int = 0

game = Game()
game.add_role(Pilot("human_1"))
game.add_role(Pilot("human_2"))
game.add_camera(Camera("cam_1", role=Role["human_1"]))
game.add_camera(Camera("cam_2", role=Role["human_2"]))
game.add_actor(Player("p1"))
game.add_actor(Player("p2"))
game.add_global("total", 0)
"#;

fn compile(src: &str) -> Result<CompiledGame, CompilerError> {
    StageCompiler::new().compile_source(&format!("{}{}", TWO_PLAYERS, src), None)
}

fn warnings(compiled: &CompiledGame) -> Vec<String> {
    compiled.warnings.iter().map(|w| w.message.clone()).collect()
}

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

#[test]
fn test_compilation_is_byte_identical() {
    let src = r#"
@condition(KeyboardCondition.on_press("d", Role["human_1"]))
def right(p: Player["p1"], total: Global["total", int]):
    for i in range(10, 0, -1):
        p.x += i
    total += 1

@condition(OnOverlap(Player, Coin))
def collect(p: Player, c: Coin):
    p.score += c.value
    c.destroy()
"#;
    let first = compile(src).unwrap();
    let second = compile(src).unwrap();
    assert_eq!(first.project_json().unwrap(), second.project_json().unwrap());
    assert_eq!(first.ir_json().unwrap(), second.ir_json().unwrap());
    assert_eq!(first.target_source, second.target_source);
}

#[test]
fn test_range_bounds_reach_the_generated_loop() {
    let compiled = compile(
        r#"
@condition(KeyboardCondition.on_press("r", Role["human_1"]))
def count(p: Player["p1"]):
    for i in range(10, 0, -1):
        p.score += i
    for j in range(5):
        p.score += j
"#,
    )
    .unwrap();
    let js = &compiled.target_source;
    assert!(js.contains("let __i = 10, __i_stop = 0, __i_step = -1;"), "{}", js);
    assert!(js.contains("let __j = 0, __j_stop = 5, __j_step = 1;"), "{}", js);
    assert!(js.contains("__i_step >= 0 ? __i < __i_stop : __i > __i_stop"));
}

#[test]
fn test_keyboard_rule_only_drives_its_role() {
    let compiled = compile(
        r#"
@condition(KeyboardCondition.on_press("d", Role["human_2"]))
def bump_two(r: Pilot["human_2"]):
    r.points += 1

@condition(KeyboardCondition.on_press("a", Role["human_1"]))
def bump_one(r: Pilot["human_1"]):
    r.points += 1
"#,
    )
    .unwrap();
    let project: serde_json::Value = serde_json::from_str(&compiled.project_json().unwrap()).unwrap();
    let rules = project["rules"].as_array().unwrap();
    let rule = rules.iter().find(|r| r["action"] == "bump_two").unwrap();
    assert_eq!(rule["condition"]["role"], "human_2");
    assert_eq!(compiled.ir.actions["bump_two"].params[0].ident(), Some("human_2"));
    assert!(compiled.target_source.contains("const r = ctx.roles[\"human_2\"];"));
}

#[test]
fn test_tool_rebinding_is_fatal() {
    let err = compile(
        r#"
@condition(OnToolCall("boost", "Add a point", Role["human_1"]))
def boost(r: Pilot["human_1"]):
    r.points += 1

@condition(OnToolCall("boost", "Add two points", Role["human_1"]))
def boost_more(r: Pilot["human_1"]):
    r.points += 2
"#,
    )
    .unwrap_err();
    assert!(err.message().contains("already bound"), "{}", err);
}

#[test]
fn test_abstract_block_instantiations_stay_independent() {
    let compiled = compile(
        r#"
t = AbstractCodeBlock.begin("enemy", x=int)
class Enemy(Actor):
    hp: int = x
@condition(KeyboardCondition.on_press("h", Role["human_1"]))
def hit(e: Enemy):
    e.hp -= t.x
t.end()
t.instantiate(x=1)
t.instantiate(x=2)
"#,
    )
    .unwrap();
    let schemas = &compiled.project.actor_schemas;
    assert_eq!(schemas["Enemy__enemy_0"].fields["hp"].default, Value::Int(1));
    assert_eq!(schemas["Enemy__enemy_1"].fields["hp"].default, Value::Int(2));
    assert_eq!(compiled.project.actions, vec!["hit__enemy_0", "hit__enemy_1"]);
    let js = &compiled.target_source;
    assert!(js.contains("export function hit__enemy_0(ctx) {"));
    assert!(js.contains("e__enemy_0.hp = e__enemy_0.hp - 1;"), "{}", js);
    assert!(js.contains("e__enemy_1.hp = e__enemy_1.hp - 2;"), "{}", js);
}

#[test]
fn test_unbound_action_is_dropped_with_one_warning() {
    let compiled = compile(
        r#"
@condition(KeyboardCondition.on_press("d", Role["human_1"]))
def right(p: Player["p1"]):
    p.x += 1

def left(p: Player["p1"]):
    p.x -= 1
"#,
    )
    .unwrap();
    assert_eq!(compiled.project.actions, vec!["right"]);
    assert!(!compiled.target_source.contains("function left"));
    let ignored: Vec<String> = warnings(&compiled)
        .into_iter()
        .filter(|w| w.contains("ignored"))
        .collect();
    assert_eq!(ignored.len(), 1, "{:?}", ignored);
}

#[test]
fn test_collision_parameters_use_reserved_selectors() {
    let compiled = compile(
        r#"
@condition(OnContact(Player, Coin))
def collect(p: Player["p2"], c: Coin[-1]):
    p.score += c.value
"#,
    )
    .unwrap();
    let params = &compiled.ir.actions["collect"].params;
    assert_eq!(params[0].selector, Some(Selector::Ident(COLLIDER_A.to_string())));
    assert_eq!(params[1].selector, Some(Selector::Ident(COLLIDER_B.to_string())));
    assert!(warnings(&compiled).iter().any(|w| w.contains("overridden")));
    assert!(!compiled.target_source.contains("__c_view"));
}

#[test]
fn test_global_is_written_back_after_every_reassignment() {
    let compiled = compile(
        r#"
@condition(KeyboardCondition.on_press("t", Role["human_1"]))
def tally(total: Global["total", int]):
    total = total * 2
    if total > 100:
        total = 0
    total += 3
"#,
    )
    .unwrap();
    let js = &compiled.target_source;
    let start = js.find("export function tally(ctx) {").unwrap();
    let body = &js[start..];
    let read = body.find("let total = structuredClone(ctx.globals[\"total\"]);").unwrap();
    let last_assign = body.find("total = total + 3;").unwrap();
    let write = body.find("ctx.globals[\"total\"] = total;").unwrap();
    assert!(read < last_assign && last_assign < write);
}

#[test]
fn test_assets_load_relative_to_source() {
    let path = fixture("arena.py");
    let compiled = StageCompiler::new().compile_file(&path).unwrap();
    let map = compiled.project.map.as_ref().unwrap();
    assert_eq!(map.grid, vec![vec![0, 1, 1], vec![1, 0, 1], vec![1, 1, 0]]);
    assert_eq!(map.tiles["1"], "Brick");
    assert_eq!(
        compiled.project.interface.global.as_deref(),
        Some("Break every brick!\n")
    );
}

#[test]
fn test_missing_asset_is_an_io_error() {
    let err = StageCompiler::new()
        .compile_source(
            "class S(Role):\n    pass\ngame = Game()\ngame.set_interface(load_text(\"nowhere.txt\"))\n",
            Some(&fixture("arena.py")),
        )
        .unwrap_err();
    assert!(matches!(err, CompilerError::IOError(_)), "{:?}", err);
}

#[test]
fn test_strict_blocks_drop_stray_statements() {
    let src = r#"
CodeBlock.begin("setup")
class Player(Actor):
    hp: int = 1
class Seat(Role):
    pass
game = Game()
game.add_role(Seat("human_1"))
game.add_camera(Camera("cam", role=Role["human_1"]))
game.add_actor(Player("p1"))
CodeBlock.end("setup")
game.add_actor(Player("p2"))
"#;
    let loose = StageCompiler::new().compile_source(src, None).unwrap();
    assert_eq!(loose.project.actors.len(), 2);

    let config = CompilerConfig {
        strict_blocks: true,
        ..CompilerConfig::default()
    };
    let strict = StageCompiler::with_config(config).compile_source(src, None).unwrap();
    assert_eq!(strict.project.actors.len(), 1);
    assert!(!strict.warnings.is_empty());
}

#[test]
fn test_errors_render_with_location() {
    let src = format!("{}\ndef broken(p: Player[\"p1\"]):\n    p.x = mystery\n", TWO_PLAYERS);
    let err = StageCompiler::new().compile_source(&src, None).unwrap_err();
    let rendered = err.render(&src, Some("game.py"));
    assert!(rendered.contains("game.py:"), "{}", rendered);
    assert!(rendered.contains("p.x = mystery"), "{}", rendered);
}
