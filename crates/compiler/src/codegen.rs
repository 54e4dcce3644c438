//! x86-64 code generation (GNU assembler, AT&T syntax).
//!
//! The generator walks the AST once and appends assembly text to a
//! string buffer. Expression nodes evaluate into a pool of four scratch
//! registers; whoever emits a value either frees its register or hands
//! it up to the caller. Statements produce no value. Every named object
//! has static storage reserved with `.comm`, so there are no stack
//! frames and no spilling: an expression deep enough to exhaust the
//! pool is a fatal error.
//!
//! Calls follow the System V integer argument registers. Conditions
//! compare against `$1` and fall through on match, matching the shapes
//! documented on the individual `gen_*` methods.

use std::fmt::{self, Write as _};

use crate::ast::{BinOp, Block, Expr, ExprKind, Program, Stmt, UnOp};
use crate::symtab::{ScopeId, ScopeKind, SymbolTable};

/// Scratch registers for expression evaluation, in allocation order.
const REGS: [&str; 4] = ["%r8", "%r9", "%r10", "%r11"];

/// System V integer argument registers, in parameter order.
const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Error type for code generation.
///
/// Logical errors cover constructs the backend cannot express as well
/// as register exhaustion; formatting errors come from writing into the
/// output buffer and are propagated with `?`.
#[derive(Debug)]
pub enum CodegenError {
    /// The expression needed more than the four scratch registers.
    OutOfRegisters,
    /// A construct the backend does not support.
    Logic(String),
    /// A write into the output buffer failed.
    Format(fmt::Error),
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::OutOfRegisters => write!(f, "out of registers"),
            CodegenError::Logic(msg) => write!(f, "{}", msg),
            CodegenError::Format(e) => write!(f, "assembly generation error: {}", e),
        }
    }
}

impl std::error::Error for CodegenError {}

impl From<String> for CodegenError {
    fn from(msg: String) -> Self {
        CodegenError::Logic(msg)
    }
}

impl From<fmt::Error> for CodegenError {
    fn from(e: fmt::Error) -> Self {
        CodegenError::Format(e)
    }
}

/// Escape a string literal for a `.string` directive. The lexer already
/// decoded source escapes, so the emitted text re-encodes them.
fn escape_asm(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\000"),
            c => out.push(c),
        }
    }
    out
}

pub struct Codegen<'a> {
    symtab: &'a SymbolTable,
    out: String,
    /// Busy flags for the scratch register pool.
    regs: [bool; REGS.len()],
    /// Monotonic counter behind the `L<n>` jump and string labels.
    labels: u32,
    /// Scope of the block currently being walked, for name resolution.
    scope: ScopeId,
}

impl<'a> Codegen<'a> {
    pub fn new(symtab: &'a SymbolTable) -> Self {
        Codegen {
            symtab,
            out: String::new(),
            regs: [false; REGS.len()],
            labels: 0,
            scope: symtab.current_scope(),
        }
    }

    /// Generate assembly for a whole program, consuming the generator.
    pub fn generate(mut self, program: &Program) -> Result<String, CodegenError> {
        self.gen_block(&program.root)?;
        Ok(self.out)
    }

    // ---- registers and labels ------------------------------------------

    fn alloc_reg(&mut self) -> Result<usize, CodegenError> {
        for (i, busy) in self.regs.iter_mut().enumerate() {
            if !*busy {
                *busy = true;
                return Ok(i);
            }
        }
        Err(CodegenError::OutOfRegisters)
    }

    fn free_reg(&mut self, r: usize) {
        debug_assert!(self.regs[r], "freeing a register that is not allocated");
        self.regs[r] = false;
    }

    fn new_label(&mut self) -> u32 {
        let l = self.labels;
        self.labels += 1;
        l
    }

    /// Emit a string constant into `.rodata` and return its label.
    fn emit_string(&mut self, s: &str) -> Result<u32, CodegenError> {
        let l = self.new_label();
        writeln!(self.out, "\t.section .rodata")?;
        writeln!(self.out, "L{}:", l)?;
        writeln!(self.out, "\t.string \"{}\"", escape_asm(s))?;
        writeln!(self.out, "\t.section .text")?;
        Ok(l)
    }

    // ---- expressions ---------------------------------------------------

    /// Emit an expression and return the register holding its value
    /// (or, for an lvalue dereference, its address).
    fn gen_expr(&mut self, expr: &Expr) -> Result<usize, CodegenError> {
        match &expr.kind {
            ExprKind::IntLit(v) => {
                let r = self.alloc_reg()?;
                writeln!(self.out, "\tmov\t${}, {}", v, REGS[r])?;
                Ok(r)
            }
            ExprKind::StrLit(s) => {
                let l = self.emit_string(s)?;
                let r = self.alloc_reg()?;
                writeln!(self.out, "\tleaq\tL{}(%rip), {}", l, REGS[r])?;
                Ok(r)
            }
            ExprKind::Ident(name) => {
                let r = self.alloc_reg()?;
                writeln!(self.out, "\tmov\t{}(%rip), {}", name, REGS[r])?;
                Ok(r)
            }
            ExprKind::SizeOf(ty) => {
                let size = ty.byte_size()?;
                let r = self.alloc_reg()?;
                writeln!(self.out, "\tmov\t${}, {}", size, REGS[r])?;
                Ok(r)
            }
            // every pool value is a full register wide; a cast only
            // narrows the static type
            ExprKind::Cast { val, .. } => self.gen_expr(val),
            ExprKind::Unary { op, val } => self.gen_unary(*op, val, expr.lvalue),
            ExprKind::Binop { op, lhs, rhs } => self.gen_binop(*op, lhs, rhs),
            ExprKind::Call { callee, args } => self.gen_call(callee, args),
        }
    }

    fn gen_unary(&mut self, op: UnOp, val: &Expr, lvalue: bool) -> Result<usize, CodegenError> {
        match op {
            UnOp::AddrOf => {
                let name = match &val.kind {
                    ExprKind::Ident(name) => name,
                    _ => {
                        return Err(CodegenError::Logic(
                            "cannot take the address of this expression".to_string(),
                        ));
                    }
                };
                let r = self.alloc_reg()?;
                writeln!(self.out, "\tlea\t{}(%rip), {}", name, REGS[r])?;
                Ok(r)
            }
            UnOp::Deref => {
                let r1 = self.gen_expr(val)?;
                if lvalue {
                    // assignment target: the address itself is wanted
                    Ok(r1)
                } else {
                    let r2 = self.alloc_reg()?;
                    writeln!(self.out, "\tmov\t({}), {}", REGS[r1], REGS[r2])?;
                    self.free_reg(r1);
                    Ok(r2)
                }
            }
            UnOp::Neg => {
                let r1 = self.gen_expr(val)?;
                let r2 = self.alloc_reg()?;
                writeln!(self.out, "\tmov\t$0, {}", REGS[r2])?;
                writeln!(self.out, "\tsub\t{}, {}", REGS[r1], REGS[r2])?;
                self.free_reg(r1);
                Ok(r2)
            }
            UnOp::Not => {
                let r1 = self.gen_expr(val)?;
                let r2 = self.alloc_reg()?;
                writeln!(self.out, "\tcmp\t$0, {}", REGS[r1])?;
                writeln!(self.out, "\tsete\t%al")?;
                writeln!(self.out, "\tmovzx\t%al, {}", REGS[r2])?;
                self.free_reg(r1);
                Ok(r2)
            }
        }
    }

    fn gen_binop(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<usize, CodegenError> {
        if op == BinOp::Assign {
            return self.gen_assign(lhs, rhs);
        }

        let r1 = self.gen_expr(lhs)?;
        let r2 = self.gen_expr(rhs)?;
        match op {
            BinOp::Add => {
                writeln!(self.out, "\tadd\t{}, {}", REGS[r1], REGS[r2])?;
                self.free_reg(r1);
                Ok(r2)
            }
            BinOp::Sub => {
                writeln!(self.out, "\tsub\t{}, {}", REGS[r1], REGS[r2])?;
                self.free_reg(r1);
                Ok(r2)
            }
            BinOp::Mul => {
                writeln!(self.out, "\timul\t{}, {}", REGS[r1], REGS[r2])?;
                self.free_reg(r1);
                Ok(r2)
            }
            BinOp::Div => Err(CodegenError::Logic(
                "integer division is not implemented".to_string(),
            )),
            BinOp::LogAnd | BinOp::LogOr => Err(CodegenError::Logic(
                "logical operators are not implemented".to_string(),
            )),
            BinOp::Eq | BinOp::Ne | BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                let r = self.alloc_reg()?;
                // AT&T cmp sets flags from dst - src, so comparing
                // rhs (src) against lhs (dst) tests lhs OP rhs
                writeln!(self.out, "\tcmp\t{}, {}", REGS[r2], REGS[r1])?;
                writeln!(self.out, "\t{}\t%al", set_instruction(op))?;
                writeln!(self.out, "\tmovzx\t%al, {}", REGS[r])?;
                self.free_reg(r1);
                self.free_reg(r2);
                Ok(r)
            }
            BinOp::Assign => unreachable!("handled above"),
        }
    }

    /// Store through a pointer when the target is a dereference,
    /// otherwise store to the named symbol. The right-hand register
    /// stays live as the value of the whole expression.
    fn gen_assign(&mut self, lhs: &Expr, rhs: &Expr) -> Result<usize, CodegenError> {
        let r1 = self.gen_expr(lhs)?;
        let r2 = self.gen_expr(rhs)?;
        match &lhs.kind {
            ExprKind::Unary {
                op: UnOp::Deref, ..
            } => {
                writeln!(self.out, "\tmov\t{}, ({})", REGS[r2], REGS[r1])?;
            }
            ExprKind::Ident(name) => {
                writeln!(self.out, "\tmov\t{}, {}(%rip)", REGS[r2], name)?;
            }
            _ => {
                return Err(CodegenError::Logic(
                    "assignment target must be an identifier or a dereference".to_string(),
                ));
            }
        }
        self.free_reg(r1);
        Ok(r2)
    }

    /// Arguments go into the System V registers in order, then a call
    /// by name; the result moves out of `%rax` into a fresh register.
    fn gen_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<usize, CodegenError> {
        let name = match &callee.kind {
            ExprKind::Unary {
                op: UnOp::AddrOf,
                val,
            } => match &val.kind {
                ExprKind::Ident(name) => name.clone(),
                _ => {
                    return Err(CodegenError::Logic(
                        "calls through function pointers are not supported".to_string(),
                    ));
                }
            },
            _ => {
                return Err(CodegenError::Logic(
                    "calls through function pointers are not supported".to_string(),
                ));
            }
        };

        if args.len() > ARG_REGS.len() {
            return Err(CodegenError::Logic(format!(
                "call to '{}' passes more than {} arguments",
                name,
                ARG_REGS.len()
            )));
        }

        for (i, arg) in args.iter().enumerate() {
            let r = self.gen_expr(arg)?;
            writeln!(self.out, "\tmov\t{}, {}", REGS[r], ARG_REGS[i])?;
            self.free_reg(r);
        }

        writeln!(self.out, "\tcall\t{}", name)?;
        let r = self.alloc_reg()?;
        writeln!(self.out, "\tmov\t%rax, {}", REGS[r])?;
        Ok(r)
    }

    // ---- statements ----------------------------------------------------

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Expr(e) => {
                let r = self.gen_expr(e)?;
                self.free_reg(r);
                Ok(())
            }
            Stmt::VarDef { name, init } => self.gen_vardef(name, init.as_ref()),
            Stmt::FuncDef { name, body } => self.gen_funcdef(name, body),
            Stmt::Asm(code) => {
                write!(self.out, "{}", code)?;
                Ok(())
            }
            Stmt::Return { value } => {
                if let Some(v) = value {
                    let r = self.gen_expr(v)?;
                    writeln!(self.out, "\tmov\t{}, %rax", REGS[r])?;
                    self.free_reg(r);
                }
                writeln!(self.out, "\tret")?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.gen_if(cond, then_block, else_block.as_ref()),
            Stmt::While { cond, body } => self.gen_while(cond, body),
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.gen_for(init, cond, update, body),
            Stmt::Label(name) => {
                writeln!(self.out, "{}:", name)?;
                Ok(())
            }
            Stmt::Goto(name) => {
                writeln!(self.out, "\tjmp\t{}", name)?;
                Ok(())
            }
        }
    }

    fn gen_block(&mut self, block: &Block) -> Result<(), CodegenError> {
        let prev = self.scope;
        self.scope = block.scope;
        for stmt in &block.stmts {
            self.gen_stmt(stmt)?;
        }
        self.scope = prev;
        Ok(())
    }

    fn gen_funcdef(&mut self, name: &str, body: &Block) -> Result<(), CodegenError> {
        writeln!(self.out, "\t.global {}", name)?;
        writeln!(self.out, "{}:", name)?;
        self.gen_block(body)?;
        // unconditional trailing ret, even after an explicit return
        writeln!(self.out, "\tret")?;
        Ok(())
    }

    /// Reserve zeroed static storage for the variable. A file-scope
    /// initializer is not materialized (globals start zeroed); inside a
    /// function the initializer stores into the reserved storage.
    fn gen_vardef(&mut self, name: &str, init: Option<&Expr>) -> Result<(), CodegenError> {
        let sym = self
            .symtab
            .lookup_from(self.scope, name)
            .ok_or_else(|| CodegenError::Logic(format!("undefined symbol '{}'", name)))?;
        let size = sym.ty.byte_size()?;
        writeln!(self.out, "\t.comm {}, {}", name, size)?;

        if let Some(e) = init {
            if self.symtab.kind(self.scope) != ScopeKind::Global {
                let r = self.gen_expr(e)?;
                writeln!(self.out, "\tmov\t{}, {}(%rip)", REGS[r], name)?;
                self.free_reg(r);
            }
        }
        Ok(())
    }

    /// ```text
    ///         <cond>
    ///         mov $1, %rax
    ///         cmp r, %rax
    ///         jne Lelse            ; or Lend without an else-block
    ///         <then>
    ///         jmp Lend
    /// Lelse:  <else>
    /// Lend:
    /// ```
    fn gen_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<(), CodegenError> {
        let r = self.gen_expr(cond)?;

        let else_label = else_block.map(|_| self.new_label());
        let end_label = self.new_label();

        writeln!(self.out, "\tmov\t$1, %rax")?;
        writeln!(self.out, "\tcmp\t{}, %rax", REGS[r])?;
        writeln!(self.out, "\tjne\tL{}", else_label.unwrap_or(end_label))?;
        self.free_reg(r);

        self.gen_block(then_block)?;

        if let (Some(label), Some(block)) = (else_label, else_block) {
            writeln!(self.out, "\tjmp\tL{}", end_label)?;
            writeln!(self.out, "L{}:", label)?;
            self.gen_block(block)?;
        }

        writeln!(self.out, "L{}:", end_label)?;
        Ok(())
    }

    fn gen_while(&mut self, cond: &Expr, body: &Block) -> Result<(), CodegenError> {
        let top = self.new_label();
        let end = self.new_label();

        writeln!(self.out, "L{}:", top)?;
        let r = self.gen_expr(cond)?;
        writeln!(self.out, "\tmov\t$1, %rax")?;
        writeln!(self.out, "\tcmp\t{}, %rax", REGS[r])?;
        writeln!(self.out, "\tjne\tL{}", end)?;
        self.free_reg(r);

        self.gen_block(body)?;

        writeln!(self.out, "\tjmp\tL{}", top)?;
        writeln!(self.out, "L{}:", end)?;
        Ok(())
    }

    /// Same shape as `while`, with the update emitted before the
    /// back-edge.
    fn gen_for(
        &mut self,
        init: &Stmt,
        cond: &Expr,
        update: &Stmt,
        body: &Block,
    ) -> Result<(), CodegenError> {
        let top = self.new_label();
        let end = self.new_label();

        self.gen_stmt(init)?;

        writeln!(self.out, "L{}:", top)?;
        let r = self.gen_expr(cond)?;
        writeln!(self.out, "\tmov\t$1, %rax")?;
        writeln!(self.out, "\tcmp\t{}, %rax", REGS[r])?;
        writeln!(self.out, "\tjne\tL{}", end)?;
        self.free_reg(r);

        self.gen_block(body)?;
        self.gen_stmt(update)?;

        writeln!(self.out, "\tjmp\tL{}", top)?;
        writeln!(self.out, "L{}:", end)?;
        Ok(())
    }
}

fn set_instruction(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "sete",
        BinOp::Ne => "setne",
        BinOp::Gt => "setg",
        BinOp::Lt => "setl",
        BinOp::Ge => "setge",
        BinOp::Le => "setle",
        _ => unreachable!("not a comparison operator"),
    }
}
