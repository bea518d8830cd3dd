// Coroutine lowering for yielding actions
//
// An action that contains `yield` becomes a factory returning `{ step(ctx) }`.
// Its locals live on a state object `__s` together with the program counter
// `__s.pc`; control flow that encloses a `yield` is flattened into numbered
// `case` labels of a dispatch loop, while yield-free statements keep their
// structured form. `step` returns `false` when suspended and `true` once the
// action has finished. Context bindings are re-resolved on every step, and
// globals are written back before every suspension.

use crate::stage_compiler::codegen::{collect_locals, js_ident, Exit, FunctionScope, JsCodeGen};
use crate::stage_compiler::error::CompilerError;
use crate::stage_compiler::ir::{contains_yield, ActionIr, IrExpr, IrStmt};

/// Allocator for `case` labels; label 0 is the entry point.
#[derive(Debug)]
struct Labels {
    next: usize,
}

impl Labels {
    fn fresh(&mut self) -> usize {
        let label = self.next;
        self.next += 1;
        label
    }
}

impl JsCodeGen {
    pub(crate) fn emit_coroutine(&mut self, action: &ActionIr) -> Result<(), CompilerError> {
        let params: Vec<String> = action.params.iter().map(|p| p.name.clone()).collect();
        let mut scope = FunctionScope::new(Exit::Step, collect_locals(&action.body, &params));
        let mut labels = Labels { next: 1 };

        self.doc_comment(action.description.as_deref());
        self.open(format!("export function {}(ctx) {{", js_ident(&action.name)));
        self.line("const __s = { pc: 0 };");
        self.open("return {");
        self.open("step(ctx) {");
        self.line("if (__s.pc < 0) return true;");
        self.emit_prologue(&action.params, &mut scope)?;
        self.open("__run: for (;;) {");
        self.open("switch (__s.pc) {");
        self.open("case 0:");
        self.coroutine_block(&action.body, &mut scope, &mut labels, None)?;
        self.emit_writeback(&scope);
        self.line("__s.pc = -1;");
        self.line("return true;");
        self.dedent();
        self.open("default:");
        self.line("return true;");
        self.dedent();
        self.close("}");
        self.close("}");
        self.close("},");
        self.close("};");
        self.close("}");
        log::debug!(
            "CODEGEN: {} flattened into {} step labels",
            action.name,
            labels.next
        );
        Ok(())
    }

    /// Start `case label:` at the switch's indentation.
    fn place(&mut self, label: usize) {
        self.dedent();
        self.open(format!("case {}:", label));
    }

    /// Transfer control to `label` on the next pass of the dispatch loop.
    pub(crate) fn emit_jump(&mut self, label: usize) {
        self.line(format!("__s.pc = {};", label));
        self.line("continue __run;");
    }

    fn jump_unless(&mut self, cond: &str, label: usize) {
        self.open(format!("if (!({})) {{", cond));
        self.emit_jump(label);
        self.close("}");
    }

    fn coroutine_block(
        &mut self,
        body: &[IrStmt],
        scope: &mut FunctionScope,
        labels: &mut Labels,
        cont: Option<usize>,
    ) -> Result<(), CompilerError> {
        for stmt in body {
            if contains_yield(std::slice::from_ref(stmt)) {
                self.coroutine_stmt(stmt, scope, labels, cont)?;
            } else {
                self.emit_stmt(stmt, scope, cont)?;
            }
        }
        Ok(())
    }

    fn coroutine_stmt(
        &mut self,
        stmt: &IrStmt,
        scope: &mut FunctionScope,
        labels: &mut Labels,
        cont: Option<usize>,
    ) -> Result<(), CompilerError> {
        match stmt {
            IrStmt::Yield { .. } => {
                let resume = labels.fresh();
                self.line(format!("__s.pc = {};", resume));
                self.emit_writeback(scope);
                self.line("return false;");
                self.place(resume);
            }
            IrStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr_bare(cond, scope)?;
                let end = labels.fresh();
                if else_body.is_empty() {
                    self.jump_unless(&cond, end);
                    self.coroutine_block(then_body, scope, labels, cont)?;
                } else {
                    let otherwise = labels.fresh();
                    self.jump_unless(&cond, otherwise);
                    self.coroutine_block(then_body, scope, labels, cont)?;
                    self.emit_jump(end);
                    self.place(otherwise);
                    self.coroutine_block(else_body, scope, labels, cont)?;
                }
                self.place(end);
            }
            IrStmt::While { cond, body } => {
                let head = labels.fresh();
                let end = labels.fresh();
                self.place(head);
                let cond = self.expr_bare(cond, scope)?;
                self.jump_unless(&cond, end);
                self.coroutine_block(body, scope, labels, Some(head))?;
                self.emit_jump(head);
                self.place(end);
            }
            IrStmt::For { var, iter, body } => {
                let target = scope.var(var);
                let t = scope.temp(var);
                let (head, next, end) = (labels.fresh(), labels.fresh(), labels.fresh());
                let (test, advance, current) = match iter {
                    IrExpr::Range { start, stop, step } => {
                        let start = self.expr_bare(start, scope)?;
                        let stop = self.expr_bare(stop, scope)?;
                        let step = self.expr_bare(step, scope)?;
                        self.line(format!("{} = {};", t, start));
                        self.line(format!("{}_stop = {};", t, stop));
                        self.line(format!("{}_step = {};", t, step));
                        (
                            format!("{t}_step >= 0 ? {t} < {t}_stop : {t} > {t}_stop", t = t),
                            format!("{t} += {t}_step;", t = t),
                            t.clone(),
                        )
                    }
                    other => {
                        let items = self.expr_bare(other, scope)?;
                        self.line(format!("{}_items = Array.from(__py.iter({}));", t, items));
                        self.line(format!("{}_pos = 0;", t));
                        (
                            format!("{t}_pos < {t}_items.length", t = t),
                            format!("{}_pos += 1;", t),
                            format!("{t}_items[{t}_pos]", t = t),
                        )
                    }
                };
                self.place(head);
                self.jump_unless(&test, end);
                self.line(format!("{} = {};", target, current));
                self.coroutine_block(body, scope, labels, Some(next))?;
                self.place(next);
                self.line(advance);
                self.emit_jump(head);
                self.place(end);
            }
            _ => {
                return Err(CompilerError::CodeGenError(
                    "yield nested in a statement that cannot suspend".to_string(),
                ))
            }
        }
        Ok(())
    }
}
