//! Recursive-descent parser and semantic checker.
//!
//! Parsing is a single left-to-right pass over the token vector with
//! one token of lookahead. Type checking is interleaved: every
//! expression production resolves its value type as the node is built,
//! and scope and typedef bookkeeping happen inline, so name and type
//! errors are reported at the offending token. There is no recovery;
//! the first diagnostic aborts the compile.

use std::fmt;

use crate::ast::{BinOp, Block, Expr, ExprKind, Program, Stmt, UnOp};
use crate::lexer::{Token, TokenKind};
use crate::symtab::{ScopeKind, SymAttrs, Symbol, SymbolTable};
use crate::types::{compatible, BaseType, StructMember, Type};

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Assign => 1,
        BinOp::LogOr => 2,
        BinOp::LogAnd => 3,
        BinOp::Add | BinOp::Sub => 4,
        BinOp::Mul | BinOp::Div => 5,
        BinOp::Eq | BinOp::Ne => 6,
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 7,
    }
}

fn right_assoc(op: BinOp) -> bool {
    op == BinOp::Assign
}

/// Primitive type keywords: the only bases a cast may name.
fn is_primitive_type(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Int8
            | TokenKind::Int16
            | TokenKind::Int32
            | TokenKind::Int64
            | TokenKind::Uint8
            | TokenKind::Uint16
            | TokenKind::Uint32
            | TokenKind::Uint64
            | TokenKind::Float32
            | TokenKind::Float64
    )
}

/// Statements that leave a block open stand alone; everything else must
/// be terminated by a semicolon.
fn needs_semi(stmt: &Stmt) -> bool {
    !matches!(
        stmt,
        Stmt::FuncDef { .. }
            | Stmt::Asm(_)
            | Stmt::If { .. }
            | Stmt::While { .. }
            | Stmt::For { .. }
            | Stmt::Label(_)
    )
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    symtab: SymbolTable,
    /// Ordered alias list, appended to by `typedef` and `struct`
    /// declarations. First match wins on lookup.
    typedefs: Vec<(String, Type)>,
    /// Name of the function whose body is being parsed, if any.
    current_fn: Option<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            symtab: SymbolTable::new(),
            typedefs: Vec::new(),
            current_fn: None,
        }
    }

    pub fn parse(mut self) -> Result<Program, String> {
        let scope = self.symtab.current_scope();
        let stmts = self.statement_list()?;
        if !matches!(self.kind(), TokenKind::Eof) {
            return Err(self.error_at(format!("unexpected '{}'", self.kind())));
        }
        Ok(Program {
            root: Block { scope, stmts },
            symtab: self.symtab,
        })
    }

    // ---- token helpers -------------------------------------------------

    fn kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error_at<M: fmt::Display>(&self, msg: M) -> String {
        format!("line {}: {}", self.line(), msg)
    }

    fn expected(&self, what: &str) -> String {
        self.error_at(format!("expected {}, got '{}'", what, self.kind()))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), String> {
        if *self.kind() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error_at(format!("expected '{}', got '{}'", kind, self.kind())))
        }
    }

    fn eat_ident(&mut self) -> Result<String, String> {
        if let TokenKind::Ident(name) = &self.tokens[self.pos].kind {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        Err(self.expected("identifier"))
    }

    fn eat_intlit(&mut self) -> Result<u64, String> {
        if let TokenKind::IntLit(v) = self.tokens[self.pos].kind {
            self.advance();
            return Ok(v);
        }
        Err(self.expected("int literal"))
    }

    fn eat_strlit(&mut self) -> Result<String, String> {
        if let TokenKind::StrLit(s) = &self.tokens[self.pos].kind {
            let s = s.clone();
            self.advance();
            return Ok(s);
        }
        Err(self.expected("string literal"))
    }

    /// Tokens that end an expression.
    fn at_terminator(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Semi | TokenKind::RParen | TokenKind::Comma | TokenKind::RBrack
        )
    }

    // ---- types ---------------------------------------------------------

    /// Parse a type: a primitive keyword, a bare `*` (read as `void`,
    /// with indirection coming from the stars that follow), a function
    /// signature `fn(T, ...) -> T`, or a typedef name. Any base may be
    /// followed by `*`s and one `[N]` array suffix.
    fn parse_type(&mut self) -> Result<Type, String> {
        if matches!(self.kind(), TokenKind::Fn) {
            let ty = self.parse_fn_type()?;
            return self.parse_array_suffix(ty);
        }

        let base = match self.kind() {
            TokenKind::Int8 => Some(BaseType::Int8),
            TokenKind::Int16 => Some(BaseType::Int16),
            TokenKind::Int32 => Some(BaseType::Int32),
            TokenKind::Int64 => Some(BaseType::Int64),
            TokenKind::Uint8 => Some(BaseType::Uint8),
            TokenKind::Uint16 => Some(BaseType::Uint16),
            TokenKind::Uint32 => Some(BaseType::Uint32),
            TokenKind::Uint64 => Some(BaseType::Uint64),
            TokenKind::Float32 => Some(BaseType::Float32),
            TokenKind::Float64 => Some(BaseType::Float64),
            TokenKind::Star => Some(BaseType::Void),
            _ => None,
        };

        let mut ty = if let Some(base) = base {
            self.advance();
            Type::new(base)
        } else if let TokenKind::Ident(name) = &self.tokens[self.pos].kind {
            let found = self
                .typedefs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone());
            match found {
                Some(t) => {
                    self.advance();
                    t
                }
                None => return Err(self.error_at(format!("unknown type '{}'", name))),
            }
        } else {
            return Err(self.expected("type"));
        };

        while matches!(self.kind(), TokenKind::Star) {
            ty.ptr += 1;
            self.advance();
        }
        self.parse_array_suffix(ty)
    }

    fn parse_array_suffix(&mut self, mut ty: Type) -> Result<Type, String> {
        if matches!(self.kind(), TokenKind::LBrack) {
            self.advance();
            ty.arrlen = self.eat_intlit()?;
            self.expect(TokenKind::RBrack)?;
        }
        Ok(ty)
    }

    /// `fn [*...] (T, ...) [-> T]`; a missing arrow means `void`.
    fn parse_fn_type(&mut self) -> Result<Type, String> {
        self.advance(); // fn
        let mut ptr = 0;
        while matches!(self.kind(), TokenKind::Star) {
            ptr += 1;
            self.advance();
        }
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !matches!(self.kind(), TokenKind::RParen) {
            params.push(self.parse_type()?);
            if !matches!(self.kind(), TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.advance(); // ')'
        let ret = if matches!(self.kind(), TokenKind::Arrow) {
            self.advance();
            self.parse_type()?
        } else {
            Type::void()
        };
        Ok(Type {
            base: BaseType::Func {
                ret: Box::new(ret),
                params,
            },
            ptr,
            arrlen: 0,
        })
    }

    // ---- expressions ---------------------------------------------------

    /// Precedence-climbing loop. Forming a binary node marks the left
    /// operand as an lvalue and the right as not; the generator relies
    /// on that flag when it reaches a dereference.
    fn binexpr(&mut self, min_prec: u8) -> Result<Expr, String> {
        let mut lhs = self.prefix()?;
        if self.at_terminator() {
            return Ok(lhs);
        }

        let mut op = self.binop()?;
        while precedence(op) > min_prec || (right_assoc(op) && precedence(op) == min_prec) {
            self.advance();
            let mut rhs = self.binexpr(precedence(op))?;

            if !compatible(&lhs.vtype, &rhs.vtype) {
                return Err(self.error_at(format!(
                    "incompatible types '{}' and '{}' in binary expression",
                    lhs.vtype, rhs.vtype
                )));
            }

            let vtype = lhs.vtype.clone();
            lhs.lvalue = true;
            rhs.lvalue = false;
            lhs = Expr::new(
                ExprKind::Binop {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                vtype,
            );

            if self.at_terminator() {
                return Ok(lhs);
            }
            op = self.binop()?;
        }
        Ok(lhs)
    }

    /// Map the current token to a binary operator. Bit operators, the
    /// ternary and `++`/`--` are lexed but have no binding power here,
    /// so they are rejected rather than silently dropped.
    fn binop(&self) -> Result<BinOp, String> {
        let op = match self.kind() {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Assign => BinOp::Assign,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Neq => BinOp::Ne,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gte => BinOp::Ge,
            TokenKind::Lte => BinOp::Le,
            TokenKind::AndAnd => BinOp::LogAnd,
            TokenKind::OrOr => BinOp::LogOr,
            _ => return Err(self.expected("operator")),
        };
        Ok(op)
    }

    /// Prefix operators `&`, `*`, `!`, `-`.
    fn prefix(&mut self) -> Result<Expr, String> {
        match self.kind() {
            TokenKind::Amp => {
                self.advance();
                let val = self.prefix()?;
                let mut vtype = val.vtype.clone();
                vtype.ptr += 1;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::AddrOf,
                        val: Box::new(val),
                    },
                    vtype,
                ))
            }
            TokenKind::Star => {
                let line = self.line();
                self.advance();
                let val = self.prefix()?;
                if val.vtype.ptr == 0 {
                    return Err(format!(
                        "line {}: cannot dereference non-pointer type '{}'",
                        line, val.vtype
                    ));
                }
                let mut vtype = val.vtype.clone();
                vtype.ptr -= 1;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Deref,
                        val: Box::new(val),
                    },
                    vtype,
                ))
            }
            TokenKind::Not => {
                self.advance();
                let val = self.prefix()?;
                let vtype = val.vtype.clone();
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Not,
                        val: Box::new(val),
                    },
                    vtype,
                ))
            }
            TokenKind::Minus => {
                self.advance();
                let val = self.prefix()?;
                let vtype = val.vtype.clone();
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Neg,
                        val: Box::new(val),
                    },
                    vtype,
                ))
            }
            _ => {
                let p = self.primary()?;
                self.postfix(p)
            }
        }
    }

    /// One postfix form: `[idx]`, a call, or a `.`/`->` member chain.
    fn postfix(&mut self, ast: Expr) -> Result<Expr, String> {
        match self.kind() {
            TokenKind::LBrack => {
                self.advance();
                let idx = self.prefix()?;

                // arr[i] rewrites to *(arr + i)
                let sum_t = Type {
                    base: ast.vtype.base.clone(),
                    ptr: 1,
                    arrlen: 0,
                };
                let sum = Expr::new(
                    ExprKind::Binop {
                        op: BinOp::Add,
                        lhs: Box::new(ast),
                        rhs: Box::new(idx),
                    },
                    sum_t.clone(),
                );
                let mut access_t = sum_t;
                access_t.ptr -= 1;
                let access = Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Deref,
                        val: Box::new(sum),
                    },
                    access_t,
                );
                self.expect(TokenKind::RBrack)?;
                Ok(access)
            }
            TokenKind::LParen => self.call(ast),
            TokenKind::Dot | TokenKind::Arrow => self.member_access(ast),
            _ => Ok(ast),
        }
    }

    /// A call site. The callee must be a function or a pointer to one;
    /// a direct callee is wrapped in address-of so the generator can
    /// call it by name. Argument count must match exactly.
    fn call(&mut self, ast: Expr) -> Result<Expr, String> {
        let line = self.line();
        let (ret, param_count) = match &ast.vtype.base {
            BaseType::Func { ret, params } => (ret.as_ref().clone(), params.len()),
            _ => {
                return Err(format!(
                    "line {}: call of non-function or function-pointer type",
                    line
                ));
            }
        };

        let callee = if ast.vtype.is_pointer() {
            ast
        } else {
            let mut vtype = ast.vtype.clone();
            vtype.ptr += 1;
            Expr::new(
                ExprKind::Unary {
                    op: UnOp::AddrOf,
                    val: Box::new(ast),
                },
                vtype,
            )
        };

        self.advance(); // '('
        let mut args = Vec::new();
        while !matches!(self.kind(), TokenKind::RParen) {
            args.push(self.binexpr(0)?);
            if !matches!(self.kind(), TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        if args.len() < param_count {
            return Err(format!("line {}: too few arguments in call", line));
        }
        if args.len() > param_count {
            return Err(format!("line {}: too many arguments in call", line));
        }

        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ret,
        ))
    }

    /// A `.`/`->` chain. The whole chain collapses into a sum of byte
    /// offsets added to the base address, dereferenced once at the end
    /// with the final member's type. `.` takes the address of its base;
    /// `->` uses the pointer value itself.
    fn member_access(&mut self, base: Expr) -> Result<Expr, String> {
        let arrow = matches!(self.kind(), TokenKind::Arrow);
        let mut structype = base.vtype.clone();

        let mut node = if arrow {
            base
        } else {
            let addr_t = Type::new(BaseType::Uint64);
            Expr::new(
                ExprKind::Unary {
                    op: UnOp::AddrOf,
                    val: Box::new(base),
                },
                addr_t,
            )
        };

        loop {
            let line = self.line();
            let arrow = matches!(self.kind(), TokenKind::Arrow);

            let members = match &structype.base {
                BaseType::Struct { members, .. } => members.clone(),
                _ => {
                    return Err(format!("line {}: member access of non-struct type", line));
                }
            };
            if arrow && !structype.is_pointer() {
                return Err(format!(
                    "line {}: use of '->' on non-pointer to struct; use '.' instead",
                    line
                ));
            }
            if !arrow && structype.is_pointer() {
                return Err(format!(
                    "line {}: use of '.' on pointer to struct; use '->' instead",
                    line
                ));
            }

            self.advance(); // '.' or '->'
            let name = self.eat_ident()?;
            let member = members
                .iter()
                .find(|m| m.name == name)
                .ok_or_else(|| format!("line {}: struct has no member '{}'", line, name))?;

            let offset = Expr::new(ExprKind::IntLit(member.offset), node.vtype.clone());
            let vtype = node.vtype.clone();
            node = Expr::new(
                ExprKind::Binop {
                    op: BinOp::Add,
                    lhs: Box::new(node),
                    rhs: Box::new(offset),
                },
                vtype,
            );
            structype = member.ty.clone();

            if !matches!(self.kind(), TokenKind::Dot | TokenKind::Arrow) {
                break;
            }
        }

        Ok(Expr::new(
            ExprKind::Unary {
                op: UnOp::Deref,
                val: Box::new(node),
            },
            structype,
        ))
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.kind() {
            TokenKind::Sizeof => {
                self.advance();
                let ty = self.parse_type()?;
                Ok(Expr::new(ExprKind::SizeOf(ty), Type::new(BaseType::Uint64)))
            }
            TokenKind::IntLit(_) => {
                let v = self.eat_intlit()?;
                // literals fitting 32 bits read as uint32
                let vtype = if v < u32::MAX as u64 {
                    Type::new(BaseType::Uint32)
                } else {
                    Type::new(BaseType::Uint64)
                };
                Ok(Expr::new(ExprKind::IntLit(v), vtype))
            }
            TokenKind::StrLit(_) => {
                let s = self.eat_strlit()?;
                let vtype = Type {
                    base: BaseType::Int8,
                    ptr: 1,
                    arrlen: 0,
                };
                Ok(Expr::new(ExprKind::StrLit(s), vtype))
            }
            TokenKind::LParen => self.paren_expr(),
            TokenKind::Ident(_) => {
                let line = self.line();
                let name = self.eat_ident()?;
                let sym = self
                    .symtab
                    .lookup(&name)
                    .ok_or_else(|| format!("line {}: use of undeclared symbol '{}'", line, name))?;
                let vtype = sym.ty.clone();
                Ok(Expr::new(ExprKind::Ident(name), vtype))
            }
            _ => Err(self.expected("expression")),
        }
    }

    /// After `(`: either a C-style cast, when the next token starts a
    /// primitive type, or a parenthesized subexpression. Only casts to
    /// integral non-pointer, non-array types are accepted.
    fn paren_expr(&mut self) -> Result<Expr, String> {
        self.advance(); // '('
        if is_primitive_type(self.kind()) {
            let line = self.line();
            let target = self.parse_type()?;
            if !target.is_integral() {
                return Err(format!("line {}: cannot cast to non-integral type", line));
            }
            self.expect(TokenKind::RParen)?;
            let val = self.prefix()?;
            Ok(Expr::new(
                ExprKind::Cast {
                    target: target.clone(),
                    val: Box::new(val),
                },
                target,
            ))
        } else {
            let expr = self.binexpr(0)?;
            self.expect(TokenKind::RParen)?;
            Ok(expr)
        }
    }

    // ---- statements ----------------------------------------------------

    /// Parse one statement. Declarations that only register types or
    /// symbols (`typedef`, `struct`, an extern `fn` without a body)
    /// produce no node.
    fn statement(&mut self) -> Result<Option<Stmt>, String> {
        match self.kind() {
            TokenKind::Asm => {
                self.advance();
                let code = self.eat_strlit()?;
                Ok(Some(Stmt::Asm(code)))
            }
            TokenKind::Fn => self.func_decl(),
            TokenKind::Var => {
                self.advance();
                self.var_decl().map(Some)
            }
            TokenKind::Return => self.return_statement().map(Some),
            TokenKind::If => self.if_statement().map(Some),
            TokenKind::While => self.while_statement().map(Some),
            TokenKind::For => self.for_statement().map(Some),
            TokenKind::Label => self.label_statement().map(Some),
            TokenKind::Goto => self.goto_statement().map(Some),
            TokenKind::Typedef => {
                self.typedef_statement()?;
                Ok(None)
            }
            TokenKind::Struct => {
                self.struct_declaration()?;
                Ok(None)
            }
            _ => Ok(Some(Stmt::Expr(self.binexpr(0)?))),
        }
    }

    /// Statements until a closing brace or end of input. The caller
    /// owns the surrounding braces.
    fn statement_list(&mut self) -> Result<Vec<Stmt>, String> {
        let mut stmts = Vec::new();
        while !matches!(self.kind(), TokenKind::RBrace | TokenKind::Eof) {
            let stmt = match self.statement()? {
                Some(stmt) => stmt,
                None => continue,
            };
            if needs_semi(&stmt) {
                self.expect(TokenKind::Semi)?;
            }
            stmts.push(stmt);
        }
        Ok(stmts)
    }

    /// A braced statement list in a fresh scope.
    fn block(&mut self, kind: ScopeKind) -> Result<Block, String> {
        let scope = self.symtab.push_scope(kind);
        let stmts = self.statement_list()?;
        self.symtab.pop_scope();
        Ok(Block { scope, stmts })
    }

    /// `fn [public] [extern] name(p: T, ...) [-> T] { ... }`
    ///
    /// The signature always lands in the global scope. A body is
    /// required exactly when the function is not `extern`. Parameter
    /// names are part of the surface syntax only; just the types enter
    /// the function type, so a body referencing a parameter by name
    /// fails as an undeclared symbol.
    fn func_decl(&mut self) -> Result<Option<Stmt>, String> {
        self.advance(); // fn

        let mut attrs = SymAttrs::default();
        if matches!(self.kind(), TokenKind::Public) {
            attrs.public = true;
            self.advance();
        }
        if matches!(self.kind(), TokenKind::Extern) {
            attrs.is_extern = true;
            self.advance();
        }

        let line = self.line();
        let name = self.eat_ident()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        while !matches!(self.kind(), TokenKind::RParen) {
            self.eat_ident()?;
            self.expect(TokenKind::Colon)?;
            params.push(self.parse_type()?);
            if !matches!(self.kind(), TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        let ret = if matches!(self.kind(), TokenKind::Arrow) {
            self.advance();
            self.parse_type()?
        } else {
            Type::void()
        };
        let ty = Type::new(BaseType::Func {
            ret: Box::new(ret),
            params,
        });

        if let Some(prev) = self.symtab.lookup(&name) {
            if !attrs.is_extern && !prev.attrs.is_extern {
                return Err(format!(
                    "line {}: multiple definition of function '{}'",
                    line, name
                ));
            }
        }
        self.symtab
            .insert_global(Symbol {
                name: name.clone(),
                ty,
                attrs: attrs.clone(),
            })
            .map_err(|e| format!("line {}: {}", line, e))?;

        if matches!(self.kind(), TokenKind::LBrace) {
            if attrs.is_extern {
                return Err(format!(
                    "line {}: definition of function '{}' marked 'extern'",
                    line, name
                ));
            }
            if !self.symtab.at_global_scope() {
                return Err(format!(
                    "line {}: function definitions are only allowed at global scope",
                    line
                ));
            }
            self.advance();
            let prev_fn = self.current_fn.replace(name.clone());
            let body = self.block(ScopeKind::Function)?;
            self.expect(TokenKind::RBrace)?;
            self.current_fn = prev_fn;
            Ok(Some(Stmt::FuncDef { name, body }))
        } else {
            if !attrs.is_extern {
                return Err(format!(
                    "line {}: function '{}' has no body and is not marked 'extern'",
                    line, name
                ));
            }
            self.expect(TokenKind::Semi)?;
            Ok(None)
        }
    }

    /// `var name [: T] [= expr] ;`
    ///
    /// The type may be omitted only when an initializer supplies one.
    fn var_decl(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        let name = self.eat_ident()?;

        let declared = if matches!(self.kind(), TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            if !matches!(self.kind(), TokenKind::Assign) {
                return Err(format!(
                    "line {}: variable '{}' without a type must be initialized",
                    line, name
                ));
            }
            None
        };

        let mut init = None;
        if matches!(self.kind(), TokenKind::Assign) {
            self.advance();
            init = Some(self.binexpr(0)?);
        }

        let ty = if let Some(ty) = declared {
            if let Some(e) = &init {
                if !compatible(&e.vtype, &ty) {
                    return Err(format!(
                        "line {}: incompatible types in initialization of '{}'",
                        line, name
                    ));
                }
            }
            ty
        } else {
            // checked above: an untyped declaration always has an initializer
            init.as_ref().map(|e| e.vtype.clone()).unwrap_or_else(Type::void)
        };

        self.symtab
            .insert(Symbol {
                name: name.clone(),
                ty,
                attrs: SymAttrs::default(),
            })
            .map_err(|e| format!("line {}: {}", line, e))?;

        Ok(Stmt::VarDef { name, init })
    }

    /// `struct Name { m: T, ... };`
    ///
    /// Lays the members out back to back and registers the struct name
    /// as a typedef.
    fn struct_declaration(&mut self) -> Result<(), String> {
        self.advance(); // struct
        let name = self.eat_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut members: Vec<StructMember> = Vec::new();
        let mut offset = 0u64;
        while !matches!(self.kind(), TokenKind::RBrace) {
            let line = self.line();
            let member_name = self.eat_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let size = ty.byte_size().map_err(|e| format!("line {}: {}", line, e))?;
            members.push(StructMember {
                name: member_name,
                ty,
                offset,
            });
            offset += size;
            if !matches!(self.kind(), TokenKind::RBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.expect(TokenKind::Semi)?;

        let ty = Type::new(BaseType::Struct {
            members,
            size: offset,
        });
        self.typedefs.push((name, ty));
        Ok(())
    }

    /// `typedef Name = T;`
    fn typedef_statement(&mut self) -> Result<(), String> {
        self.advance(); // typedef
        let name = self.eat_ident()?;
        self.expect(TokenKind::Assign)?;
        let ty = self.parse_type()?;
        self.typedefs.push((name, ty));
        self.expect(TokenKind::Semi)?;
        Ok(())
    }

    /// `return [expr];`
    ///
    /// A value is checked against the enclosing function's declared
    /// return type.
    fn return_statement(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // return

        let mut value = None;
        if !matches!(self.kind(), TokenKind::Semi) {
            let fname = self.current_fn.clone().ok_or_else(|| {
                format!("line {}: cannot return a value outside of a function", line)
            })?;
            let sym = self.symtab.lookup(&fname).ok_or_else(|| {
                format!("line {}: use of undeclared symbol '{}'", line, fname)
            })?;
            let ret_ty = match &sym.ty.base {
                BaseType::Func { ret, .. } => ret.as_ref().clone(),
                _ => {
                    return Err(format!("line {}: '{}' is not a function", line, fname));
                }
            };

            if matches!(ret_ty.base, BaseType::Void) && !ret_ty.is_pointer() {
                return Err(format!(
                    "line {}: returning a value from void function '{}'",
                    line, fname
                ));
            }

            let val = self.binexpr(0)?;
            if !compatible(&val.vtype, &ret_ty) {
                return Err(format!(
                    "line {}: incompatible return type in function '{}'",
                    line, fname
                ));
            }
            value = Some(val);
        }

        Ok(Stmt::Return { value })
    }

    fn if_statement(&mut self) -> Result<Stmt, String> {
        self.advance(); // if
        self.expect(TokenKind::LParen)?;
        let cond = self.binexpr(0)?;
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrace)?;
        let then_block = self.block(ScopeKind::Block)?;
        self.expect(TokenKind::RBrace)?;

        let else_block = if matches!(self.kind(), TokenKind::Else) {
            self.advance();
            self.expect(TokenKind::LBrace)?;
            let block = self.block(ScopeKind::Block)?;
            self.expect(TokenKind::RBrace)?;
            Some(block)
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, String> {
        self.advance(); // while
        self.expect(TokenKind::LParen)?;
        let cond = self.binexpr(0)?;
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrace)?;
        let body = self.block(ScopeKind::Block)?;
        self.expect(TokenKind::RBrace)?;

        Ok(Stmt::While { cond, body })
    }

    /// `for (init; cond; update) { ... }`
    ///
    /// The init and update slots are full statements; names declared in
    /// init land in the enclosing scope.
    fn for_statement(&mut self) -> Result<Stmt, String> {
        self.advance(); // for
        self.expect(TokenKind::LParen)?;

        let init = self
            .statement()?
            .ok_or_else(|| self.expected("statement"))?;
        self.expect(TokenKind::Semi)?;

        let cond = self.binexpr(0)?;
        self.expect(TokenKind::Semi)?;

        let update = self
            .statement()?
            .ok_or_else(|| self.expected("statement"))?;
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrace)?;
        let body = self.block(ScopeKind::Block)?;
        self.expect(TokenKind::RBrace)?;

        Ok(Stmt::For {
            init: Box::new(init),
            cond,
            update: Box::new(update),
            body,
        })
    }

    fn label_statement(&mut self) -> Result<Stmt, String> {
        self.advance(); // label
        let name = self.eat_ident()?;
        self.expect(TokenKind::Colon)?;
        Ok(Stmt::Label(name))
    }

    fn goto_statement(&mut self) -> Result<Stmt, String> {
        self.advance(); // goto
        let name = self.eat_ident()?;
        Ok(Stmt::Goto(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Result<Program, String> {
        Parser::new(tokenize(source).unwrap()).parse()
    }

    fn parse_err(source: &str) -> String {
        parse(source).unwrap_err()
    }

    #[test]
    fn test_parse_empty_function() {
        let program = parse("fn main() { }").unwrap();
        assert_eq!(program.root.stmts.len(), 1);
        assert!(matches!(
            &program.root.stmts[0],
            Stmt::FuncDef { name, .. } if name == "main"
        ));
    }

    #[test]
    fn test_global_var_lands_in_symtab() {
        let program = parse("var x: int32;").unwrap();
        let sym = program.symtab.lookup("x").unwrap();
        assert_eq!(sym.ty, Type::new(BaseType::Int32));
    }

    #[test]
    fn test_auto_var_infers_type_from_initializer() {
        let program = parse("var x = 5;").unwrap();
        assert_eq!(
            program.symtab.lookup("x").unwrap().ty,
            Type::new(BaseType::Uint32)
        );
    }

    #[test]
    fn test_auto_var_without_initializer_is_error() {
        let err = parse_err("var x;");
        assert!(err.contains("must be initialized"));
    }

    #[test]
    fn test_incompatible_initializer_is_error() {
        let err = parse_err("struct S { a: int32 }; var s: S = 5;");
        assert!(err.contains("incompatible types in initialization"));
    }

    #[test]
    fn test_pointer_type_parsing() {
        let program = parse("var p: int8**;").unwrap();
        let ty = &program.symtab.lookup("p").unwrap().ty;
        assert_eq!(ty.base, BaseType::Int8);
        assert_eq!(ty.ptr, 2);
    }

    #[test]
    fn test_array_type_parsing() {
        let program = parse("var a: int32[8];").unwrap();
        let ty = &program.symtab.lookup("a").unwrap().ty;
        assert_eq!(ty.arrlen, 8);
    }

    #[test]
    fn test_bare_star_type_reads_as_void() {
        // a single '*' is plain void; each additional star adds a level
        let program = parse("var p: **;").unwrap();
        let ty = &program.symtab.lookup("p").unwrap().ty;
        assert_eq!(ty.base, BaseType::Void);
        assert_eq!(ty.ptr, 1);
    }

    #[test]
    fn test_fn_type_parsing() {
        let program = parse("var f: fn(int32, int8*) -> int64;").unwrap();
        let ty = &program.symtab.lookup("f").unwrap().ty;
        match &ty.base {
            BaseType::Func { ret, params } => {
                assert_eq!(params.len(), 2);
                assert_eq!(ret.base, BaseType::Int64);
            }
            other => panic!("expected function type, got {:?}", other),
        }
    }

    #[test]
    fn test_typedef_idempotence() {
        let program = parse("typedef A = int16; typedef B = A; var x: B;").unwrap();
        assert_eq!(
            program.symtab.lookup("x").unwrap().ty,
            Type::new(BaseType::Int16)
        );
    }

    #[test]
    fn test_typedef_base_accepts_pointer_suffix() {
        let program = parse("struct S { a: int32 }; var p: S*;").unwrap();
        let ty = &program.symtab.lookup("p").unwrap().ty;
        assert_eq!(ty.ptr, 1);
        assert!(matches!(ty.base, BaseType::Struct { .. }));
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = parse_err("var x: Widget;");
        assert!(err.contains("unknown type 'Widget'"));
    }

    #[test]
    fn test_struct_member_offsets_accumulate() {
        let program = parse(
            "struct P { a: int8, b: int32, c: int64, d: int16[4] }; var p: P;",
        )
        .unwrap();
        let ty = &program.symtab.lookup("p").unwrap().ty;
        match &ty.base {
            BaseType::Struct { members, size } => {
                let offsets: Vec<u64> = members.iter().map(|m| m.offset).collect();
                assert_eq!(offsets, vec![0, 1, 5, 13]);
                assert_eq!(*size, 1 + 4 + 8 + 8);
            }
            other => panic!("expected struct type, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_identifier_is_error() {
        let err = parse_err("fn f() { x = 1; }");
        assert!(err.contains("undeclared symbol 'x'"));
    }

    #[test]
    fn test_parameter_names_are_not_bound_in_body() {
        let err = parse_err("fn f(a: int32) -> int32* { return &a; }");
        assert!(err.contains("undeclared symbol 'a'"));
    }

    #[test]
    fn test_scope_discipline() {
        // a name declared in a nested block is invisible to siblings
        let err = parse_err("fn f() { if (1) { var x: int32; } x = 1; }");
        assert!(err.contains("undeclared symbol 'x'"));

        // but visible to blocks opened inside it
        parse("fn f() { if (1) { var x: int32; if (1) { x = 2; } } }").unwrap();
    }

    #[test]
    fn test_assignment_marks_lvalues() {
        let program = parse("var x: int32; fn f() { x = 1; }").unwrap();
        let body = match &program.root.stmts[1] {
            Stmt::FuncDef { body, .. } => body,
            other => panic!("expected funcdef, got {:?}", other),
        };
        match &body.stmts[0] {
            Stmt::Expr(Expr {
                kind: ExprKind::Binop { op, lhs, rhs },
                ..
            }) => {
                assert_eq!(*op, BinOp::Assign);
                assert!(lhs.lvalue);
                assert!(!rhs.lvalue);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_binds_tighter_than_add() {
        let program = parse("var r = 2 + 3 * 4;").unwrap();
        let init = match &program.root.stmts[0] {
            Stmt::VarDef { init: Some(e), .. } => e,
            other => panic!("expected initialized vardef, got {:?}", other),
        };
        match &init.kind {
            ExprKind::Binop { op, rhs, .. } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binop { op: BinOp::Mul, .. }
                ));
            }
            other => panic!("expected binop, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("var a: int32; var b: int32; fn f() { a = b = 1; }").unwrap();
        let body = match &program.root.stmts[2] {
            Stmt::FuncDef { body, .. } => body,
            other => panic!("expected funcdef, got {:?}", other),
        };
        match &body.stmts[0] {
            Stmt::Expr(Expr {
                kind: ExprKind::Binop { op, rhs, .. },
                ..
            }) => {
                assert_eq!(*op, BinOp::Assign);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binop {
                        op: BinOp::Assign,
                        ..
                    }
                ));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_bit_operators_are_rejected() {
        let err = parse_err("fn f() { var x = 1 ^ 2; }");
        assert!(err.contains("expected operator"));
    }

    #[test]
    fn test_incompatible_binary_operands() {
        let err = parse_err("var p: int32*; fn f() { var x = p + 1; }");
        assert!(err.contains("incompatible types"));
    }

    #[test]
    fn test_dereference_of_non_pointer_is_error() {
        let err = parse_err("var x: int32; fn f() { var y = *x; }");
        assert!(err.contains("cannot dereference non-pointer"));
    }

    #[test]
    fn test_cast_to_integral() {
        let program = parse("var p: int8*; var x = (uint64) p;").unwrap();
        assert_eq!(
            program.symtab.lookup("x").unwrap().ty,
            Type::new(BaseType::Uint64)
        );
    }

    #[test]
    fn test_cast_to_pointer_is_rejected() {
        let err = parse_err("fn f() { var x = (int32*) 5; }");
        assert!(err.contains("cannot cast to non-integral type"));
    }

    #[test]
    fn test_call_arity_checked_exactly() {
        let decl = "fn extern f(a: int32, b: int32) -> int32;";
        let err = parse_err(&format!("{} fn g() {{ f(1); }}", decl));
        assert!(err.contains("too few arguments"));
        let err = parse_err(&format!("{} fn g() {{ f(1, 2, 3); }}", decl));
        assert!(err.contains("too many arguments"));
        parse(&format!("{} fn g() {{ f(1, 2); }}", decl)).unwrap();
    }

    #[test]
    fn test_call_of_non_function_is_error() {
        let err = parse_err("var x: int32; fn f() { x(); }");
        assert!(err.contains("call of non-function"));
    }

    #[test]
    fn test_direct_callee_wrapped_in_addrof() {
        let program = parse("fn extern f() -> int32; fn g() { f(); }").unwrap();
        let body = match &program.root.stmts[0] {
            Stmt::FuncDef { body, .. } => body,
            other => panic!("expected funcdef, got {:?}", other),
        };
        match &body.stmts[0] {
            Stmt::Expr(Expr {
                kind: ExprKind::Call { callee, .. },
                ..
            }) => {
                assert!(matches!(
                    callee.kind,
                    ExprKind::Unary {
                        op: UnOp::AddrOf,
                        ..
                    }
                ));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_member_access_diagnostics() {
        let decl = "struct S { a: int32, b: int32 };";
        let err = parse_err(&format!("{} var s: S; fn f() {{ s->a = 1; }}", decl));
        assert!(err.contains("use of '->' on non-pointer"));
        let err = parse_err(&format!("{} var p: S*; fn f() {{ p.a = 1; }}", decl));
        assert!(err.contains("use of '.' on pointer"));
        let err = parse_err(&format!("{} var s: S; fn f() {{ s.z = 1; }}", decl));
        assert!(err.contains("no member 'z'"));
        let err = parse_err("var x: int32; fn f() { x.a = 1; }");
        assert!(err.contains("member access of non-struct"));
    }

    #[test]
    fn test_member_chain_through_nested_structs() {
        parse(
            "struct Inner { v: int64 }; struct Outer { pad: int32, inner: Inner }; \
             var o: Outer; fn f() { o.inner.v = 3; }",
        )
        .unwrap();
    }

    #[test]
    fn test_extern_function_with_body_is_error() {
        let err = parse_err("fn extern f() { }");
        assert!(err.contains("marked 'extern'"));
    }

    #[test]
    fn test_function_without_body_must_be_extern() {
        let err = parse_err("fn f();");
        assert!(err.contains("not marked 'extern'"));
    }

    #[test]
    fn test_function_redefinition_is_error() {
        let err = parse_err("fn f() { } fn f() { }");
        assert!(err.contains("multiple definition of function 'f'"));
    }

    #[test]
    fn test_extern_then_definition_merges() {
        parse("fn extern f() -> int32; fn f() -> int32 { return 0; }").unwrap();
    }

    #[test]
    fn test_nested_function_definition_is_rejected() {
        let err = parse_err("fn f() { fn g() { } }");
        assert!(err.contains("only allowed at global scope"));
    }

    #[test]
    fn test_return_value_from_void_function_is_error() {
        let err = parse_err("fn f() { return 1; }");
        assert!(err.contains("returning a value from void function"));
    }

    #[test]
    fn test_incompatible_return_type_is_error() {
        let err = parse_err("var x: int32; fn f() -> int32 { return &x; }");
        assert!(err.contains("incompatible return type"));
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let err = parse_err("fn f() { var x: int32 = 1 }");
        assert!(err.contains("expected ';'"));
    }

    #[test]
    fn test_brace_statements_need_no_semicolon() {
        parse("fn f() { if (1) { } while (0) { } label top: goto top; }").unwrap();
    }

    #[test]
    fn test_unbalanced_braces_are_an_error() {
        assert!(parse("fn f() { if (1) { }").is_err());
    }

    #[test]
    fn test_for_loop_shape() {
        let program =
            parse("fn f() { for (var i: int32 = 0; i < 10; i = i + 1) { } }").unwrap();
        let body = match &program.root.stmts[0] {
            Stmt::FuncDef { body, .. } => body,
            other => panic!("expected funcdef, got {:?}", other),
        };
        assert!(matches!(&body.stmts[0], Stmt::For { .. }));
    }

    #[test]
    fn test_sizeof_yields_uint64() {
        let program = parse("var s = sizeof int32[4];").unwrap();
        assert_eq!(
            program.symtab.lookup("s").unwrap().ty,
            Type::new(BaseType::Uint64)
        );
    }

    #[test]
    fn test_parenthesized_expression() {
        parse("fn f() { var x = (1 + 2) * 3; }").unwrap();
    }

    #[test]
    fn test_sixty_four_bit_literal_reads_as_uint64() {
        let program = parse("var x = 4294967296;").unwrap();
        assert_eq!(
            program.symtab.lookup("x").unwrap().ty,
            Type::new(BaseType::Uint64)
        );
    }
}
