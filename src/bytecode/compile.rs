use tracing::{debug, trace};

use crate::{
    bytecode::{
        code::{Code, JumpRef},
        compile_error::{CompileError, Violation},
        const_pool::ConstPool,
        object::{Func, Object},
        op::{Instr, InstrSet},
        stack::VirtualStack,
        stack_check,
    },
    lang::{
        form::{self, BinOp, Block, Call, Expr, FuncDecl, Stmt},
        predicates::{PANIC_FN, block_is_returning, is_returning},
    },
};

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Largest peak operand-stack depth a function may need.
    pub max_stack_size: usize,
    /// Re-check the assembled object with the stack checker.
    pub verify: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_stack_size: 10_000,
            verify: cfg!(debug_assertions),
        }
    }
}

/// Single-use form compiler.
///
/// A compiler owns the constant pool, virtual stack and code buffer of the
/// one function it builds; `compile_func` consumes it, so state can never
/// leak into a second compilation.
pub struct Compiler<I: InstrSet> {
    isa: I,
    config: CompilerConfig,
    code: Code<I::Opcode>,
    consts: ConstPool,
    stack: VirtualStack,
}

/// Compile one function with a fresh compiler and default configuration.
pub fn compile_func<I: InstrSet, S: AsRef<str>>(
    isa: I,
    name: &str,
    params: &[S],
    body: &[Stmt],
) -> Result<Func<I::Opcode>, CompileError> {
    Compiler::new(isa).compile_func(name, params, body)
}

impl<I: InstrSet> Compiler<I> {
    pub fn new(isa: I) -> Self {
        Self::with_config(isa, CompilerConfig::default())
    }

    pub fn with_config(isa: I, config: CompilerConfig) -> Self {
        Self {
            isa,
            config,
            code: Code::new(),
            consts: ConstPool::new(),
            stack: VirtualStack::new(),
        }
    }

    pub fn compile_decl(self, decl: &FuncDecl) -> Result<Func<I::Opcode>, CompileError> {
        self.compile_func(&decl.name, &decl.params, &decl.body)
    }

    pub fn compile_func<S: AsRef<str>>(
        mut self,
        name: &str,
        params: &[S],
        body: &[Stmt],
    ) -> Result<Func<I::Opcode>, CompileError> {
        debug!(target: "formc::compile", func = name, isa = self.isa.name(), params = params.len(), "compiling function");

        for param in params {
            self.stack.push_var(param.as_ref());
        }

        self.compile_stmt_list(body)?;

        // Void functions may run off the end of their body.
        let falls_through = !body.iter().any(is_returning);
        if falls_through {
            self.emit(self.isa.ret(0))?;
        }

        // The frame is torn down by the return; unwind the body's own binds
        // without emitting anything.
        self.leave_scope(params.len(), form::scope_len(body), false)?;

        let object = self.finish(params.len())?;
        debug!(
            target: "formc::compile",
            func = name,
            instrs = object.len(),
            consts = object.consts().len(),
            stack_usage = object.stack_usage(),
            "compiled function"
        );

        Ok(Func {
            name: name.to_string(),
            params: params.len(),
            object,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_stmt(&mut self, form: &Stmt) -> Result<(), CompileError> {
        match form {
            Stmt::Return { results } => self.compile_return(results),
            Stmt::If { test, then, else_ } => self.compile_if(test, then, else_.as_deref()),
            Stmt::Block(block) => self.compile_block(block),
            Stmt::FormList(forms) => self.compile_stmt_list(forms),
            Stmt::Bind { name, init } => self.compile_bind(name, init),
            Stmt::Rebind { name, expr } => self.compile_rebind(name, expr),
            Stmt::CallStmt(call) => self.compile_call_stmt(call),
            Stmt::Panic { arg } => self.compile_panic(arg),
            Stmt::While { test, body } => self.compile_while(test, body),
        }
    }

    fn compile_stmt_list(&mut self, forms: &[Stmt]) -> Result<(), CompileError> {
        for form in forms {
            self.compile_stmt(form)?;
        }
        Ok(())
    }

    fn compile_return(&mut self, results: &[Expr]) -> Result<(), CompileError> {
        if results.len() > 1 {
            return Err(CompileError::unsupported(format!(
                "returning {} values",
                results.len()
            )));
        }
        self.compile_expr_list(results)?;
        self.emit(self.isa.ret(results.len()))
    }

    /// Emitted layout:
    ///
    /// ```text
    ///   <test>
    ///   jmp-nil  else
    /// then:
    ///   <then>
    ///   jmp      end      ; only with an else that can be reached
    /// else:
    ///   <else>
    /// end:
    /// ```
    fn compile_if(
        &mut self,
        test: &Expr,
        then: &Block,
        else_: Option<&Stmt>,
    ) -> Result<(), CompileError> {
        let entry = self.stack.depth();

        self.compile_expr(test)?;
        let to_else = self.emit_jmp(self.isa.jmp_nil())?;

        self.code.push_block("then");
        self.compile_block(then)?;
        let then_depth = self.stack.depth();
        let then_returns = block_is_returning(then);

        let Some(else_) = else_ else {
            self.code.push_block("else");
            to_else.bind(&mut self.code);
            return Ok(());
        };

        let to_end = if then_returns {
            None
        } else {
            Some(self.emit_jmp(self.isa.jmp())?)
        };

        self.code.push_block("else");
        to_else.bind(&mut self.code);
        self.compile_stmt(else_)?;
        let else_depth = self.stack.depth();

        let then_ok = then_returns || then_depth == entry;
        let else_ok = is_returning(else_) || else_depth == entry;
        if !(then_ok && else_ok) {
            return Err(Violation::BranchDepthMismatch {
                then: then_depth,
                else_: else_depth,
            }
            .into());
        }

        if let Some(to_end) = to_end {
            to_end.bind(&mut self.code);
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let entry = self.stack.depth();
        self.compile_stmt_list(&block.forms)?;
        self.leave_scope(entry, block.scope_len(), !block_is_returning(block))
    }

    /// Drop the `binds` slots a scope opened at depth `entry` introduced.
    ///
    /// When control can reach the scope's end a discard is emitted so the
    /// VM stack follows the model.
    fn leave_scope(
        &mut self,
        entry: usize,
        binds: usize,
        falls_through: bool,
    ) -> Result<(), CompileError> {
        let expected = entry + binds;
        let actual = self.stack.depth();
        if actual != expected {
            return Err(Violation::ScopeDepthMismatch { expected, actual }.into());
        }

        if binds == 0 {
            return Ok(());
        }
        if falls_through {
            self.emit(self.isa.discard(binds))
        } else {
            self.stack.drop(binds)
        }
    }

    fn compile_bind(&mut self, name: &str, init: &Expr) -> Result<(), CompileError> {
        self.compile_expr(init)?;
        self.stack.bind_top(name)
    }

    fn compile_rebind(&mut self, name: &str, expr: &Expr) -> Result<(), CompileError> {
        self.compile_expr(expr)?;
        let slot = self.stack.find_var(name)?;
        self.emit(self.isa.stack_set(slot))
    }

    /// A call to the panic function never returns, so it ends in a trap
    /// instead of discarding a result.
    fn compile_call_stmt(&mut self, call: &Call) -> Result<(), CompileError> {
        if call.func == PANIC_FN {
            if let [arg] = call.args.as_slice() {
                return self.compile_panic(arg);
            }
            // the callee's result becomes the trap's argument
            self.compile_call(&call.func, &call.args)?;
            return self.emit(self.isa.trap());
        }
        self.compile_call(&call.func, &call.args)?;
        self.emit(self.isa.discard(1))
    }

    fn compile_panic(&mut self, arg: &Expr) -> Result<(), CompileError> {
        self.compile_expr(arg)?;
        self.emit(self.isa.trap())
    }

    /// Emitted layout:
    ///
    /// ```text
    /// loop:
    ///   <test>
    ///   jmp-nil  exit
    ///   <body>
    ///   jmp      loop
    /// loop-exit:
    /// ```
    fn compile_while(&mut self, test: &Expr, body: &Block) -> Result<(), CompileError> {
        let entry = self.stack.depth();

        self.code.push_block("loop");
        let start = self.code.position();
        self.compile_expr(test)?;
        let to_exit = self.emit_jmp(self.isa.jmp_nil())?;

        self.compile_block(body)?;
        self.emit(Instr::new(self.isa.jmp(), start))?;

        self.code.push_block("loop-exit");
        to_exit.bind(&mut self.code);

        let actual = self.stack.depth();
        if actual != entry {
            return Err(Violation::ScopeDepthMismatch {
                expected: entry,
                actual,
            }
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, form: &Expr) -> Result<(), CompileError> {
        match form {
            Expr::Int(val) => {
                let index = self.consts.insert_int(*val);
                self.emit_const(index)
            }
            Expr::Float(val) => {
                let index = self.consts.insert_float(*val);
                self.emit_const(index)
            }
            Expr::Str(val) => {
                let index = self.consts.insert_string(val);
                self.emit_const(index)
            }
            Expr::Symbol(val) => {
                let index = self.consts.insert_symbol(val);
                self.emit_const(index)
            }
            Expr::Bool(val) => {
                let index = self.consts.insert_symbol(self.isa.bool_symbol(*val));
                self.emit_const(index)
            }
            Expr::Var(name) => {
                let slot = self.stack.find_var(name)?;
                self.emit(self.isa.stack_ref(slot))
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.emit(Instr::bare(self.isa.binary(*op)))
            }
            Expr::Op { op, args, .. } => self.compile_op(*op, args),
            Expr::Call(call) => self.compile_call(&call.func, &call.args),
            Expr::MultiValueRef { index } => self.compile_multi_value_ref(*index),
        }
    }

    fn compile_expr_list(&mut self, forms: &[Expr]) -> Result<(), CompileError> {
        for form in forms {
            self.compile_expr(form)?;
        }
        Ok(())
    }

    fn compile_op(&mut self, op: BinOp, args: &[Expr]) -> Result<(), CompileError> {
        if args.len() == 2 {
            self.compile_expr_list(args)?;
            self.emit(Instr::bare(self.isa.binary(op)))
        } else {
            self.compile_call(self.isa.fallback(op), args)
        }
    }

    fn compile_call(&mut self, func: &str, args: &[Expr]) -> Result<(), CompileError> {
        let index = self.consts.insert_symbol(func);
        self.emit_const(index)?;
        self.compile_expr_list(args)?;
        self.emit(self.isa.call(args.len()))
    }

    /// Secondary results live outside the operand stack, so loading one
    /// leaves every existing slot untouched.
    fn compile_multi_value_ref(&mut self, index: usize) -> Result<(), CompileError> {
        if index == 0 {
            return Err(Violation::InvalidMultiValueIndex(index).into());
        }
        self.emit(self.isa.multi_value_ref(index))
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Append `instr` and apply its stack contract from the opcode table.
    fn emit(&mut self, instr: Instr<I::Opcode>) -> Result<(), CompileError> {
        let spec = self.isa.spec(instr.op);

        self.stack.drop(spec.consumes(instr.arg))?;
        self.trace_instr(&instr);
        self.code.push_instr(instr);
        if spec.output {
            self.stack.push_tmp();
        }
        Ok(())
    }

    fn emit_jmp(&mut self, op: I::Opcode) -> Result<JumpRef, CompileError> {
        let spec = self.isa.spec(op);

        self.stack.drop(spec.consumes(0))?;
        self.trace_instr(&Instr::bare(op));
        Ok(self.code.push_jmp(op))
    }

    fn emit_const(&mut self, index: usize) -> Result<(), CompileError> {
        let instr = self.isa.const_ref(index);

        self.trace_instr(&instr);
        self.code.push_instr(instr);
        self.stack.push_const(index);
        Ok(())
    }

    fn trace_instr(&self, instr: &Instr<I::Opcode>) {
        trace!(
            target: "formc::compile::emit",
            ip = self.code.position(),
            op = self.isa.mnemonic(instr.op),
            arg = instr.arg,
            depth = self.stack.depth(),
            "emit"
        );
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    fn finish(self, params: usize) -> Result<Object<I::Opcode>, CompileError> {
        let actual = self.stack.depth();
        if actual != params {
            return Err(Violation::ScopeDepthMismatch {
                expected: params,
                actual,
            }
            .into());
        }

        let peak = self.stack.max_size();
        if peak > self.config.max_stack_size {
            return Err(CompileError::StackLimitExceeded {
                peak,
                limit: self.config.max_stack_size,
            });
        }

        let blocks = self.code.finish()?;
        let object = Object::new(blocks, self.consts.into_values(), peak);

        if self.config.verify {
            stack_check::check_object(&self.isa, &object, params)
                .map_err(|e| Violation::StackCheck(e.to_string()))?;
        }
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::generic::{Ir, IrOp};
    use crate::bytecode::lap::{Lap, LapOp};
    use crate::lang::form::NumKind;
    use crate::lang::value::Constant;
    use assert2::{check, let_assert};

    fn checked() -> CompilerConfig {
        CompilerConfig {
            verify: true,
            ..CompilerConfig::default()
        }
    }

    fn ir(params: &[&str], body: &[Stmt]) -> Result<Func<IrOp>, CompileError> {
        Compiler::with_config(Ir, checked()).compile_func("test", params, body)
    }

    fn ops(func: &Func<IrOp>) -> Vec<(IrOp, usize)> {
        func.object.instrs().map(|i| (i.op, i.arg)).collect()
    }

    fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Add, NumKind::Int, lhs, rhs)
    }

    // =========================================================================
    // Straight-line code
    // =========================================================================

    #[test]
    fn test_bind_then_return() {
        let func = ir(&[], &[Stmt::bind("x", Expr::Int(3)), Stmt::ret(Expr::var("x"))]).unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::Return, 1)
                ]
        );
        check!(func.object.consts() == &[Constant::Int(3)]);
        // x itself plus the copy handed to return
        check!(func.object.stack_usage() == 2);
    }

    #[test]
    fn test_return_fused_add() {
        let func = ir(&[], &[Stmt::ret(add(Expr::Int(2), Expr::Int(3)))]).unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::NumAdd, 0),
                    (IrOp::Return, 1)
                ]
        );
        check!(!func.object.instrs().any(|i| i.op == IrOp::Call));
    }

    #[test]
    fn test_call_with_two_args() {
        let func = ir(
            &["a"],
            &[Stmt::ret(Expr::call("f", vec![Expr::var("a"), Expr::Int(7)]))],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::Call, 2),
                    (IrOp::Return, 1)
                ]
        );
        check!(func.object.consts()[0] == Constant::Symbol("f".to_string()));
        check!(Ir.spec(IrOp::Call).consumes(2) == 3);
        // param + callee + two args
        check!(func.object.stack_usage() == 4);
    }

    #[test]
    fn test_constants_dedup_within_function() {
        let func = ir(
            &[],
            &[Stmt::ret(Expr::call("f", vec![Expr::Int(1), Expr::Int(1)]))],
        )
        .unwrap();

        check!(func.object.consts().len() == 2);
        check!(ops(&func)[1] == (IrOp::ConstRef, 1));
        check!(ops(&func)[2] == (IrOp::ConstRef, 1));
    }

    #[test]
    fn test_op_with_two_args_is_fused() {
        let expr = Expr::Op {
            op: BinOp::Mul,
            kind: NumKind::Float,
            args: vec![Expr::Float(1.5), Expr::Float(2.0)],
        };
        let func = ir(&[], &[Stmt::ret(expr)]).unwrap();

        check!(ops(&func)[2] == (IrOp::NumMul, 0));
    }

    #[test]
    fn test_op_with_other_arity_falls_back_to_call() {
        let expr = Expr::Op {
            op: BinOp::Add,
            kind: NumKind::Int,
            args: vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)],
        };
        let func = ir(&[], &[Stmt::ret(expr)]).unwrap();

        check!(func.object.consts()[0] == Constant::Symbol("+".to_string()));
        check!(ops(&func)[4] == (IrOp::Call, 3));
        check!(!func.object.instrs().any(|i| i.op == IrOp::NumAdd));
    }

    #[test]
    fn test_rebind_is_stack_neutral() {
        let func = ir(
            &["n"],
            &[
                Stmt::rebind("n", add(Expr::var("n"), Expr::Int(1))),
                Stmt::ret(Expr::var("n")),
            ],
        )
        .unwrap();

        check!(ops(&func)[3] == (IrOp::StackSet, 0));
        check!(ops(&func)[4] == (IrOp::StackRef, 0));
    }

    #[test]
    fn test_call_stmt_discards_result() {
        let func = ir(&[], &[Stmt::call("print", vec![Expr::Str("hi".to_string())])]).unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::Call, 1),
                    (IrOp::Discard, 1),
                    (IrOp::Return, 0)
                ]
        );
    }

    #[test]
    fn test_bool_literal_uses_isa_symbol() {
        let body = [Stmt::ret(Expr::Bool(true))];

        let lap = Compiler::with_config(Lap, checked())
            .compile_func::<&str>("t", &[], &body)
            .unwrap();
        let generic = ir(&[], &body).unwrap();

        check!(lap.object.consts() == &[Constant::Symbol("t".to_string())]);
        check!(generic.object.consts() == &[Constant::Symbol("true".to_string())]);
    }

    #[test]
    fn test_panic_has_no_implicit_return() {
        let func = ir(&[], &[Stmt::Panic {
            arg: Expr::Str("boom".to_string()),
        }])
        .unwrap();

        check!(ops(&func) == vec![(IrOp::ConstRef, 0), (IrOp::Panic, 0)]);
    }

    #[test]
    fn test_panic_call_ends_in_trap() {
        let func = ir(
            &[],
            &[Stmt::call(PANIC_FN, vec![Expr::Str("boom".to_string())])],
        )
        .unwrap();

        check!(ops(&func) == vec![(IrOp::ConstRef, 0), (IrOp::Panic, 0)]);
        check!(func.object.consts() == &[Constant::String("boom".to_string())]);
    }

    #[test]
    fn test_panic_call_inside_block() {
        let func = ir(
            &[],
            &[Stmt::block(vec![
                Stmt::bind("x", Expr::Int(1)),
                Stmt::call(PANIC_FN, vec![Expr::var("x")]),
            ])],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::Panic, 0)
                ]
        );
    }

    #[test]
    fn test_panic_call_with_other_arity_traps_on_result() {
        let func = ir(
            &[],
            &[Stmt::call(
                PANIC_FN,
                vec![Expr::Str("bad".to_string()), Expr::Int(1)],
            )],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::ConstRef, 2),
                    (IrOp::Call, 2),
                    (IrOp::Panic, 0)
                ]
        );
        check!(func.object.consts()[0] == Constant::Symbol(PANIC_FN.to_string()));
    }

    #[test]
    fn test_top_level_binds_unwound() {
        let func = ir(
            &["p"],
            &[
                Stmt::bind("a", Expr::Int(1)),
                Stmt::bind("b", Expr::Int(2)),
                Stmt::call("use", vec![Expr::var("a"), Expr::var("b")]),
            ],
        )
        .unwrap();

        // the frame is dropped by return, no discard for a and b
        check!(func.object.instrs().last().map(|i| i.op) == Some(IrOp::Return));
        check!(func.params == 1);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_without_else_targets_end_of_then() {
        let func = ir(
            &["c"],
            &[
                Stmt::If {
                    test: Expr::var("c"),
                    then: Block::new(vec![Stmt::call("print", vec![Expr::Int(1)])]),
                    else_: None,
                },
                Stmt::ret_void(),
            ],
        )
        .unwrap();

        let names: Vec<&str> = func.object.blocks().iter().map(|b| b.name.as_str()).collect();
        check!(names == vec!["entry", "then", "else"]);

        let then_len = func.object.blocks()[1].instrs.len();
        check!(then_len == 4);
        // stack-ref c, jmp-nil, then T instructions
        check!(ops(&func)[1] == (IrOp::JmpNil, 2 + then_len));
        check!(ops(&func)[2 + then_len] == (IrOp::Return, 0));
    }

    #[test]
    fn test_if_else_skips_else_branch() {
        let func = ir(
            &["c"],
            &[
                Stmt::If {
                    test: Expr::var("c"),
                    then: Block::new(vec![Stmt::rebind("c", Expr::Int(1))]),
                    else_: Some(Box::new(Stmt::block(vec![Stmt::rebind(
                        "c",
                        Expr::Int(2),
                    )]))),
                },
                Stmt::ret(Expr::var("c")),
            ],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::StackRef, 0),
                    (IrOp::JmpNil, 5),
                    (IrOp::ConstRef, 0),
                    (IrOp::StackSet, 0),
                    (IrOp::Jmp, 7),
                    (IrOp::ConstRef, 1),
                    (IrOp::StackSet, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::Return, 1)
                ]
        );
    }

    #[test]
    fn test_returning_then_needs_no_skip_jump() {
        let func = ir(
            &["c"],
            &[Stmt::If {
                test: Expr::var("c"),
                then: Block::new(vec![Stmt::ret(Expr::Int(1))]),
                else_: Some(Box::new(Stmt::block(vec![Stmt::ret(Expr::Int(2))]))),
            }],
        )
        .unwrap();

        check!(!func.object.instrs().any(|i| i.op == IrOp::Jmp));
        // both branches return, so no trailing implicit return
        check!(func.object.instrs().filter(|i| i.op == IrOp::Return).count() == 2);
    }

    #[test]
    fn test_if_branch_depth_mismatch() {
        let result = ir(
            &["c"],
            &[Stmt::If {
                test: Expr::var("c"),
                then: Block::default(),
                else_: Some(Box::new(Stmt::bind("leak", Expr::Int(1)))),
            }],
        );

        let_assert!(Err(err) = result);
        check!(
            err.violation()
                == Some(&Violation::BranchDepthMismatch {
                    then: 1,
                    else_: 2
                })
        );
    }

    #[test]
    fn test_block_drops_its_scope() {
        let func = ir(
            &[],
            &[
                Stmt::block(vec![
                    Stmt::bind("a", Expr::Int(1)),
                    Stmt::bind("b", Expr::Int(2)),
                ]),
                Stmt::ret_void(),
            ],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::ConstRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::Discard, 2),
                    (IrOp::Return, 0)
                ]
        );
    }

    #[test]
    fn test_shadowing_restored_after_block() {
        let func = ir(
            &["x"],
            &[
                Stmt::block(vec![
                    Stmt::bind("x", Expr::Int(1)),
                    Stmt::call("print", vec![Expr::var("x")]),
                ]),
                Stmt::ret(Expr::var("x")),
            ],
        )
        .unwrap();

        let refs: Vec<usize> = func
            .object
            .instrs()
            .filter(|i| i.op == IrOp::StackRef)
            .map(|i| i.arg)
            .collect();
        check!(refs == vec![1, 0]);
    }

    #[test]
    fn test_returning_block_drops_scope_without_discard() {
        let func = ir(
            &["c"],
            &[
                Stmt::If {
                    test: Expr::var("c"),
                    then: Block::new(vec![
                        Stmt::bind("a", Expr::Int(1)),
                        Stmt::bind("b", Expr::Int(2)),
                        Stmt::ret(Expr::var("a")),
                    ]),
                    else_: None,
                },
                Stmt::ret(Expr::var("c")),
            ],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::StackRef, 0),
                    (IrOp::JmpNil, 6),
                    (IrOp::ConstRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::StackRef, 1),
                    (IrOp::Return, 1),
                    (IrOp::StackRef, 0),
                    (IrOp::Return, 1)
                ]
        );
        check!(!func.object.instrs().any(|i| i.op == IrOp::Discard));
        // c, a, b and the copy of a
        check!(func.object.stack_usage() == 4);
    }

    #[test]
    fn test_returning_block_restores_depth() {
        let mut compiler = Compiler::with_config(Ir, checked());
        compiler.stack.push_var("p");

        let block = Stmt::block(vec![
            Stmt::bind("a", Expr::Int(1)),
            Stmt::bind("b", Expr::Int(2)),
            Stmt::ret(Expr::var("a")),
        ]);
        compiler.compile_stmt(&block).unwrap();

        check!(compiler.stack.depth() == 1);
        check!(compiler.code.position() == 4);
        check!(compiler.stack.max_size() == 4);
    }

    #[test]
    fn test_else_if_chain() {
        let func = ir(
            &["c"],
            &[
                Stmt::If {
                    test: Expr::var("c"),
                    then: Block::new(vec![Stmt::rebind("c", Expr::Int(1))]),
                    else_: Some(Box::new(Stmt::If {
                        test: Expr::var("c"),
                        then: Block::new(vec![Stmt::rebind("c", Expr::Int(2))]),
                        else_: Some(Box::new(Stmt::block(vec![Stmt::rebind(
                            "c",
                            Expr::Int(3),
                        )]))),
                    })),
                },
                Stmt::ret(Expr::var("c")),
            ],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::StackRef, 0),
                    (IrOp::JmpNil, 5),
                    (IrOp::ConstRef, 0),
                    (IrOp::StackSet, 0),
                    (IrOp::Jmp, 12),
                    (IrOp::StackRef, 0),
                    (IrOp::JmpNil, 10),
                    (IrOp::ConstRef, 1),
                    (IrOp::StackSet, 0),
                    (IrOp::Jmp, 12),
                    (IrOp::ConstRef, 2),
                    (IrOp::StackSet, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::Return, 1)
                ]
        );
        let names: Vec<&str> = func.object.blocks().iter().map(|b| b.name.as_str()).collect();
        check!(names == vec!["entry", "then", "else", "then", "else"]);
    }

    #[test]
    fn test_while_loop_layout() {
        let gt = Expr::binary(BinOp::Gt, NumKind::Int, Expr::var("n"), Expr::Int(0));
        let dec = Expr::binary(BinOp::Sub, NumKind::Int, Expr::var("n"), Expr::Int(1));
        let func = ir(
            &["n"],
            &[
                Stmt::While {
                    test: gt,
                    body: Block::new(vec![Stmt::rebind("n", dec)]),
                },
                Stmt::ret(Expr::var("n")),
            ],
        )
        .unwrap();

        check!(
            ops(&func)
                == vec![
                    (IrOp::StackRef, 0),
                    (IrOp::ConstRef, 0),
                    (IrOp::NumGt, 0),
                    (IrOp::JmpNil, 9),
                    (IrOp::StackRef, 0),
                    (IrOp::ConstRef, 1),
                    (IrOp::NumSub, 0),
                    (IrOp::StackSet, 0),
                    (IrOp::Jmp, 0),
                    (IrOp::StackRef, 0),
                    (IrOp::Return, 1)
                ]
        );
        let names: Vec<&str> = func.object.blocks().iter().map(|b| b.name.as_str()).collect();
        check!(names == vec!["entry", "loop", "loop-exit"]);
    }

    #[test]
    fn test_while_is_stack_neutral() {
        let func = ir(
            &["n"],
            &[
                Stmt::bind("acc", Expr::Int(0)),
                Stmt::While {
                    test: Expr::var("n"),
                    body: Block::new(vec![
                        Stmt::bind("step", Expr::var("n")),
                        Stmt::rebind("acc", add(Expr::var("acc"), Expr::var("step"))),
                        Stmt::rebind("n", Expr::call("dec", vec![Expr::var("n")])),
                    ]),
                },
                Stmt::ret(Expr::var("acc")),
            ],
        )
        .unwrap();

        let linear = func.object.linear();
        let depths = stack_check::check_instrs(&Ir, &linear, 1, func.object.stack_usage()).unwrap();
        let starts = func.object.block_starts();
        // depth entering the loop equals depth after it
        check!(depths[starts[1]] == depths[starts[2]]);
        check!(depths[starts[1]] == Some(2));
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_multiple_results_unsupported() {
        let result = ir(&[], &[Stmt::Return {
            results: vec![Expr::Int(1), Expr::Int(2)],
        }]);

        let_assert!(Err(CompileError::UnsupportedFeature { feature }) = result);
        check!(feature.contains("2 values"));
    }

    #[test]
    fn test_unbound_variable_is_internal() {
        let result = ir(&[], &[Stmt::ret(Expr::var("ghost"))]);

        let_assert!(Err(err) = result);
        check!(err.is_internal());
        check!(err.violation() == Some(&Violation::UnboundVariable("ghost".to_string())));
    }

    #[test]
    fn test_rebind_unbound_is_internal() {
        let result = ir(&[], &[Stmt::rebind("ghost", Expr::Int(1))]);

        let_assert!(Err(err) = result);
        check!(err.violation() == Some(&Violation::UnboundVariable("ghost".to_string())));
    }

    #[test]
    fn test_multi_value_ref() {
        let func = ir(
            &[],
            &[
                Stmt::bind("q", Expr::call("divmod", vec![Expr::Int(7), Expr::Int(2)])),
                Stmt::ret(Expr::MultiValueRef { index: 1 }),
            ],
        )
        .unwrap();
        check!(ops(&func)[4] == (IrOp::MultiValueRef, 1));

        let result = ir(&[], &[Stmt::ret(Expr::MultiValueRef { index: 0 })]);
        let_assert!(Err(err) = result);
        check!(err.violation() == Some(&Violation::InvalidMultiValueIndex(0)));
    }

    #[test]
    fn test_stack_limit() {
        let config = CompilerConfig {
            max_stack_size: 1,
            verify: true,
        };
        let result = Compiler::with_config(Ir, config).compile_func::<&str>(
            "deep",
            &[],
            &[Stmt::ret(add(Expr::Int(2), Expr::Int(3)))],
        );

        check!(result == Err(CompileError::StackLimitExceeded { peak: 2, limit: 1 }));
    }

    // =========================================================================
    // Instruction-set independence
    // =========================================================================

    #[test]
    fn test_same_shape_on_both_targets() {
        let body = [
            Stmt::bind("i", Expr::Int(0)),
            Stmt::While {
                test: Expr::binary(BinOp::Lt, NumKind::Int, Expr::var("i"), Expr::var("n")),
                body: Block::new(vec![Stmt::rebind("i", add(Expr::var("i"), Expr::Int(1)))]),
            },
            Stmt::If {
                test: Expr::binary(BinOp::Eq, NumKind::Int, Expr::var("i"), Expr::Int(3)),
                then: Block::new(vec![Stmt::ret(Expr::Bool(true))]),
                else_: None,
            },
            Stmt::ret(Expr::Bool(false)),
        ];

        let lap = Compiler::with_config(Lap, checked())
            .compile_func("f", &["n"], &body)
            .unwrap();
        let generic = ir(&["n"], &body).unwrap();

        check!(lap.object.len() == generic.object.len());
        check!(lap.object.stack_usage() == generic.object.stack_usage());
        let lap_args: Vec<usize> = lap.object.instrs().map(|i| i.arg).collect();
        let ir_args: Vec<usize> = generic.object.instrs().map(|i| i.arg).collect();
        check!(lap_args == ir_args);
        check!(lap.object.instrs().any(|i| i.op == LapOp::GotoIfNil));
    }

    #[test]
    fn test_compile_decl_and_free_function() {
        let decl = FuncDecl {
            name: "id".to_string(),
            params: vec!["v".to_string()],
            body: vec![Stmt::ret(Expr::var("v"))],
        };

        let a = Compiler::new(Ir).compile_decl(&decl).unwrap();
        let b = compile_func(Ir, "id", &["v"], &decl.body).unwrap();
        check!(a == b);
        check!(a.name == "id");
    }
}
