// JavaScript code generation tests

#[cfg(test)]
mod codegen_tests {
    use crate::stage_compiler::codegen::{js_ident, js_value};
    use crate::stage_compiler::config::CompilerConfig;
    use crate::stage_compiler::value::Value;
    use crate::stage_compiler::StageCompiler;
    use indexmap::IndexMap;
    use test_log::test;

    const PRELUDE: &str = "\
class Player(Actor):
    hp: int = 3
class Coin(Actor):
    value: int = 1
class Pilot(Role):
    score: int
game = Game()
game.add_role(Pilot(\"human_1\"))
game.add_camera(Camera(\"cam_1\", role=Role[\"human_1\"]))
game.add_actor(Player(\"p1\"))
game.add_global(\"score\", 0)
";

    fn generate(src: &str) -> String {
        StageCompiler::new()
            .compile_source(&format!("{}{}", PRELUDE, src), None)
            .unwrap()
            .target_source
    }

    #[test]
    fn test_output_is_deterministic() {
        let src = "\
@condition(KeyboardCondition.on_press(\"d\", Role[\"human_1\"]))
def right(p: Player, score: Global[\"score\", int]):
    for i in range(3):
        p.x += i
    score += 1
@condition(OnOverlap(Player, Coin))
def collect(p: Player, c: Coin):
    p.hp += c.value
";
        let first = generate(src);
        let second = generate(src);
        assert_eq!(first, second);
        assert!(first.starts_with("// Generated by stage-compiler"));
    }

    #[test]
    fn test_descending_range_loop() {
        let js = generate(
            "\
@condition(KeyboardCondition.on_press(\"c\", Role[\"human_1\"]))
def countdown(p: Player):
    for i in range(10, 0, -1):
        p.hp = i
",
        );
        assert!(
            js.contains("for (let __i = 10, __i_stop = 0, __i_step = -1; __i_step >= 0 ? __i < __i_stop : __i > __i_stop; __i += __i_step) {"),
            "{}",
            js
        );
        assert!(js.contains("i = __i;"));
        assert!(js.contains("let i;"));
    }

    #[test]
    fn test_globals_are_written_back() {
        let js = generate(
            "\
@condition(KeyboardCondition.on_press(\"s\", Role[\"human_1\"]))
def bump(score: Global[\"score\", int]):
    score += 1
",
        );
        let read = js.find("let score = structuredClone(ctx.globals[\"score\"]);").unwrap();
        let write = js.find("ctx.globals[\"score\"] = score;").unwrap();
        assert!(read < write);
    }

    #[test]
    fn test_predicates_never_write_back() {
        let js = generate(
            "\
@predicate
def winning(p: Player, score: Global[\"score\", int]) -> bool:
    return score > p.hp
@condition(OnLogicalCondition(winning, Player))
def celebrate(p: Player):
    p.hp = 99
",
        );
        assert!(js.contains("export function winning(ctx) {"));
        assert!(js.contains("return score > p.hp;"), "{}", js);
        assert!(!js.contains("ctx.globals[\"score\"] ="));
    }

    #[test]
    fn test_yielding_action_becomes_coroutine() {
        let js = generate(
            "\
@condition(KeyboardCondition.on_press(\"w\", Role[\"human_1\"]))
def walk(p: Player, t: Tick):
    \"\"\"Walk right one step per tick.\"\"\"
    while p.x < 10:
        p.x += 1
        yield t
",
        );
        assert!(js.contains("/** Walk right one step per tick. */"));
        assert!(js.contains("export function walk(ctx) {"));
        assert!(js.contains("step(ctx) {"));
        assert!(js.contains("case 1:"));
        assert!(js.contains("return false;"));
        assert!(js.contains("continue __run;"));
        assert!(js.contains("walk: { fn: walk, coroutine: true },"));
    }

    #[test]
    fn test_collision_action_reads_colliders() {
        let js = generate(
            "\
@condition(OnOverlap(Player, Coin))
def collect(p: Player, c: Coin):
    p.hp += c.value
",
        );
        assert!(js.contains("const p = ctx.actorIndex.get(\"__collider_a\");"), "{}", js);
        assert!(js.contains("const c = ctx.actorIndex.get(\"__collider_b\");"));
        assert!(js.contains("if (p === undefined) return;"));
        assert!(js.contains("collect: { fn: collect, coroutine: false },"));
    }

    #[test]
    fn test_negative_selector_counts_from_the_end() {
        let js = generate(
            "\
@condition(KeyboardCondition.on_press(\"l\", Role[\"human_1\"]))
def last(p: Player[-1]):
    p.hp = 0
",
        );
        assert!(js.contains("const __p_view = ctx.actors.filter((a) => a.schema === \"Player\");"));
        assert!(js.contains("const p = __p_view[__p_view.length - 1];"), "{}", js);
    }

    #[test]
    fn test_python_arithmetic() {
        let js = generate(
            "\
@condition(KeyboardCondition.on_press(\"m\", Role[\"human_1\"]))
def mash(p: Player):
    p.hp = p.hp // 2
    p.x = p.x % 3
    p.active = p.hp == 0 and not p.active
",
        );
        assert!(js.contains("p.hp = Math.floor(p.hp / 2);"), "{}", js);
        assert!(js.contains("p.x = __py.mod(p.x, 3);"));
        assert!(js.contains("==="));
        assert!(js.contains("&&"));
    }

    #[test]
    fn test_dispatch_table_can_be_disabled() {
        let config = CompilerConfig {
            emit_dispatch_table: false,
            ..CompilerConfig::default()
        };
        let src = format!(
            "{}@condition(KeyboardCondition.on_press(\"d\", Role[\"human_1\"]))\ndef right(p: Player):\n    p.x += 1\n",
            PRELUDE
        );
        let compiled = StageCompiler::with_config(config).compile_source(&src, None).unwrap();
        assert!(compiled.target_source.contains("export function right(ctx) {"));
        assert!(!compiled.target_source.contains("export const ACTIONS"));
    }

    #[test]
    fn test_js_value() {
        let mut dict = IndexMap::new();
        dict.insert("a".to_string(), Value::Int(1));
        dict.insert("b".to_string(), Value::List(vec![Value::Bool(true), Value::None]));
        assert_eq!(js_value(&Value::Dict(dict)).unwrap(), "{ \"a\": 1, \"b\": [true, null] }");
        assert_eq!(js_value(&Value::Str("say \"hi\"".to_string())).unwrap(), "\"say \\\"hi\\\"\"");
        assert_eq!(js_value(&Value::Float(f64::INFINITY)).unwrap(), "Infinity");
        assert_eq!(js_value(&Value::Dict(IndexMap::new())).unwrap(), "{}");
    }

    #[test]
    fn test_reserved_names_are_suffixed() {
        assert_eq!(js_ident("delete"), "delete_");
        assert_eq!(js_ident("ctx"), "ctx_");
        assert_eq!(js_ident("player"), "player");
    }
}
