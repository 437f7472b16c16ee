//! Single-pass parser and evaluator.
//!
//! Statements execute as they are parsed; there is no syntax tree. Every
//! production takes an `exec` flag: true means evaluate, false means walk
//! the tokens for syntax only (untaken branches, function bodies at
//! declaration time). Loops re-run their bodies by rewinding the lexer to a
//! snapshot taken on the first pass.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::{Instance, NativeCall};
use crate::error::{ScriptError, ScriptResult};
use crate::lexer::Lexer;
use crate::object::{Object, PropCategory, PropFlags};
use crate::token::{is_expression_keyword, is_statement_keyword, OpKind, TokenKind};
use crate::value::{binary_op, Function, NativeCallback, Value};

/// Nested script-function calls allowed before a resource error.
const MAX_CALL_DEPTH: usize = 128;

/// Consecutive statement parses without lexer progress before the statement
/// loop gives up. A parser-stall safety net, not a script timeout.
const STALL_LIMIT: usize = 8;

/// How a statement finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Return,
    Exit,
}

/// Where an assignment lands.
enum Target {
    /// A bare name, bound per the variable binding rules.
    Var(String),
    /// A property of a resolved object.
    Prop {
        obj: Rc<RefCell<Object>>,
        name: String,
    },
}

/// Expression operand: the value plus where it came from, so assignment and
/// increment can write back. `resolved` is false for a name that resolved
/// nowhere; using it as anything but an assignment target is a reference
/// error.
struct Operand {
    value: Value,
    target: Option<Target>,
    resolved: bool,
}

impl Operand {
    fn value(value: Value) -> Operand {
        Operand {
            value,
            target: None,
            resolved: true,
        }
    }
}

/// Evaluate `src` on `interp` to end of input. Returns the last statement's
/// value.
pub(crate) fn run(interp: &mut Instance, src: &str) -> ScriptResult<Value> {
    interp.result = Value::Undefined;
    let mut ev = Evaluator {
        interp,
        lex: Lexer::new(src),
    };
    ev.program(true)?;
    Ok(ev.interp.result.clone())
}

/// Syntax-check `src` without executing anything.
pub(crate) fn check(interp: &mut Instance, src: &str) -> ScriptResult<()> {
    let mut ev = Evaluator {
        interp,
        lex: Lexer::new(src),
    };
    ev.program(false)
}

struct Evaluator<'i, 's> {
    interp: &'i mut Instance,
    lex: Lexer<'s>,
}

impl<'i, 's> Evaluator<'i, 's> {
    fn token(&mut self) -> ScriptResult<crate::token::Token> {
        let tok = self.lex.next_token()?;
        self.interp.line = tok.line;
        Ok(tok)
    }

    fn syntax<S: Into<String>>(&self, message: S) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: self.lex.line(),
            source_line: self.lex.line_text(),
        }
    }

    fn expect(&mut self, want: &TokenKind, msg: &str) -> ScriptResult<()> {
        let tok = self.token()?;
        if tok.kind == *want {
            Ok(())
        } else {
            Err(self.syntax(format!("{}, found '{}'", msg, tok.kind)))
        }
    }

    /// Consume a trailing `;` if one is present.
    fn eat_semi(&mut self) -> ScriptResult<()> {
        let tok = self.token()?;
        if tok.kind != TokenKind::Semi {
            self.lex.put_back(tok);
        }
        Ok(())
    }

    /// Statement loop to end of input.
    fn program(&mut self, exec: bool) -> ScriptResult<()> {
        let mut stalls = 0;
        loop {
            let tok = self.token()?;
            if tok.is_eof() {
                return Ok(());
            }
            self.lex.put_back(tok);
            let before = self.lex.offset();
            let flow = self.statement(exec)?;
            if self.lex.offset() == before {
                stalls += 1;
                if stalls >= STALL_LIMIT {
                    return Err(self.syntax("statement parse is not advancing"));
                }
            } else {
                stalls = 0;
            }
            if flow != Flow::Normal || self.interp.exit_requested() {
                return Ok(());
            }
        }
    }

    fn statement(&mut self, exec: bool) -> ScriptResult<Flow> {
        let tok = self.token()?;
        match tok.kind {
            TokenKind::Semi => Ok(Flow::Normal),
            TokenKind::LBrace => self.block(exec),
            TokenKind::Ident(ref word) if is_statement_keyword(word) => match word.as_str() {
                "if" => self.if_statement(exec),
                "else" => Err(self.syntax("'else' without 'if'")),
                "var" => {
                    self.var_statement(exec)?;
                    self.eat_semi()?;
                    Ok(Flow::Normal)
                }
                "for" => self.for_statement(exec),
                "delete" => self.delete_statement(exec),
                "function" => self.function_declaration(exec),
                "return" => self.return_statement(exec),
                _ => unreachable!("keyword table out of sync"),
            },
            _ => {
                self.lex.put_back(tok);
                let value = self.expression(exec)?;
                if exec {
                    self.interp.result = value;
                }
                self.eat_semi()?;
                Ok(Flow::Normal)
            }
        }
    }

    /// `{ ... }`, opening brace already consumed. A `return` inside stops
    /// execution of the remainder but the rest is still parsed so the block
    /// is consumed, and the flow propagates out unswallowed.
    fn block(&mut self, exec: bool) -> ScriptResult<Flow> {
        let mut flow = Flow::Normal;
        loop {
            let tok = self.token()?;
            match tok.kind {
                TokenKind::RBrace => return Ok(flow),
                TokenKind::Eof => return Err(self.syntax("missing '}'")),
                _ => {
                    self.lex.put_back(tok);
                    let run = exec && flow == Flow::Normal && !self.interp.exit_requested();
                    let inner = self.statement(run)?;
                    if flow == Flow::Normal {
                        flow = inner;
                    }
                }
            }
        }
    }

    fn if_statement(&mut self, exec: bool) -> ScriptResult<Flow> {
        self.expect(&TokenKind::LParen, "expected '(' after 'if'")?;
        let cond = self.expression(exec)?;
        self.expect(&TokenKind::RParen, "expected ')'")?;
        let taken = exec && cond.to_bool();
        let then_flow = self.statement(taken)?;
        let tok = self.token()?;
        if matches!(&tok.kind, TokenKind::Ident(w) if w == "else") {
            let else_flow = self.statement(exec && !taken)?;
            return Ok(if taken { then_flow } else { else_flow });
        }
        self.lex.put_back(tok);
        Ok(then_flow)
    }

    /// `var` declaration list, `var` already consumed. Does not consume the
    /// trailing semicolon. Declared names bind on the local frame.
    fn var_statement(&mut self, exec: bool) -> ScriptResult<()> {
        loop {
            let tok = self.token()?;
            let TokenKind::Ident(name) = tok.kind else {
                return Err(self.syntax("expected variable name"));
            };
            let tok = self.token()?;
            let value = match tok.kind {
                TokenKind::Op(OpKind::Assign) => Some(self.expression(exec)?),
                _ => {
                    self.lex.put_back(tok);
                    None
                }
            };
            if exec {
                let local = self.interp.frames.local();
                match value {
                    Some(v) => local.borrow_mut().set_or_create(name, v)?,
                    None => {
                        // `var x;` declares but does not overwrite.
                        if !local.borrow().has(&name) {
                            local.borrow_mut().create(name, Value::Undefined)?;
                        }
                    }
                }
            }
            let tok = self.token()?;
            if tok.kind != TokenKind::Comma {
                self.lex.put_back(tok);
                return Ok(());
            }
        }
    }

    fn return_statement(&mut self, exec: bool) -> ScriptResult<Flow> {
        let tok = self.token()?;
        let value = match tok.kind {
            TokenKind::Semi => Value::Undefined,
            TokenKind::RBrace | TokenKind::Eof => {
                self.lex.put_back(tok);
                Value::Undefined
            }
            _ => {
                self.lex.put_back(tok);
                let v = self.expression(exec)?;
                self.eat_semi()?;
                v
            }
        };
        if exec {
            self.interp.result = value;
            Ok(Flow::Return)
        } else {
            Ok(Flow::Normal)
        }
    }

    /// `delete x`, `delete a.b`, `delete a[i]`.
    fn delete_statement(&mut self, exec: bool) -> ScriptResult<Flow> {
        let tok = self.token()?;
        let TokenKind::Ident(name) = tok.kind else {
            return Err(self.syntax("expected a variable after 'delete'"));
        };
        let operand = self.resolve_ident(name, exec)?;
        let operand = self.suffix_walk(operand, exec, false)?;
        if exec {
            match operand.target {
                Some(Target::Prop { obj, name }) => obj.borrow_mut().delete(&name)?,
                Some(Target::Var(name)) => {
                    let frame = self
                        .interp
                        .frames
                        .find(&name)
                        .ok_or_else(|| ScriptError::reference(format!("'{}' is undefined", name)))?;
                    frame.borrow_mut().delete(&name)?;
                }
                None => return Err(self.syntax("cannot delete this expression")),
            }
        }
        self.eat_semi()?;
        Ok(Flow::Normal)
    }

    /// `function name(params) { body }`, `function` already consumed. The
    /// name binds on the global frame — two-point resolution would hide a
    /// call-frame binding from every other call — and the binding is created
    /// before the body is scanned so recursive references resolve. The body
    /// is walked once, unexecuted, for syntax.
    fn function_declaration(&mut self, exec: bool) -> ScriptResult<Flow> {
        let tok = self.token()?;
        let TokenKind::Ident(name) = tok.kind else {
            return Err(self.syntax("expected function name"));
        };
        self.expect(&TokenKind::LParen, "expected '(' after function name")?;
        let params = self.param_list()?;
        self.expect(&TokenKind::LBrace, "expected '{' to open function body")?;
        let func = Rc::new(Function::new(name.clone(), params, String::new()));
        if exec {
            self.interp
                .frames
                .global()
                .borrow_mut()
                .set_or_create(name, Value::Function(func.clone()))?;
        }
        let body = self.capture_body()?;
        func.set_body(body);
        Ok(Flow::Normal)
    }

    /// Anonymous (or named, unbound) function in expression position.
    fn function_expression(&mut self) -> ScriptResult<Operand> {
        let tok = self.token()?;
        let name = match tok.kind {
            TokenKind::Ident(name) => name,
            _ => {
                self.lex.put_back(tok);
                String::new()
            }
        };
        self.expect(&TokenKind::LParen, "expected '(' after 'function'")?;
        let params = self.param_list()?;
        self.expect(&TokenKind::LBrace, "expected '{' to open function body")?;
        let func = Rc::new(Function::new(name, params, String::new()));
        let body = self.capture_body()?;
        func.set_body(body);
        Ok(Operand::value(Value::Function(func)))
    }

    /// Parameter names through the closing `)`.
    fn param_list(&mut self) -> ScriptResult<Vec<String>> {
        let mut params = Vec::new();
        let tok = self.token()?;
        if tok.kind == TokenKind::RParen {
            return Ok(params);
        }
        self.lex.put_back(tok);
        loop {
            let tok = self.token()?;
            let TokenKind::Ident(p) = tok.kind else {
                return Err(self.syntax("expected parameter name"));
            };
            params.push(p);
            let tok = self.token()?;
            match tok.kind {
                TokenKind::Comma => {}
                TokenKind::RParen => return Ok(params),
                _ => return Err(self.syntax("expected ',' or ')' in parameter list")),
            }
        }
    }

    /// Walk a function body to its closing `}` (statements validated,
    /// nothing executed) and return the body text, brace excluded.
    fn capture_body(&mut self) -> ScriptResult<String> {
        let start = self.lex.offset();
        loop {
            let tok = self.token()?;
            match tok.kind {
                TokenKind::RBrace => {
                    return Ok(self.lex.text_between(start, tok.start).to_string());
                }
                TokenKind::Eof => return Err(self.syntax("missing '}' in function body")),
                _ => {
                    self.lex.put_back(tok);
                    self.statement(false)?;
                }
            }
        }
    }

    /// `for (init; cond; incr) body` and `for ([var] x in obj) body`.
    ///
    /// The three-part loop is rotated: init runs once; condition, increment
    /// and body positions are snapshotted on the first (parsing) pass, and
    /// iteration re-runs increment then condition then body from those
    /// snapshots. When the first condition check is false the body and
    /// increment are parsed but never execute.
    fn for_statement(&mut self, exec: bool) -> ScriptResult<Flow> {
        self.expect(&TokenKind::LParen, "expected '(' after 'for'")?;
        if let Some((declared, loop_var)) = self.match_for_in()? {
            return self.for_in_statement(exec, declared, loop_var);
        }

        // init
        let tok = self.token()?;
        match tok.kind {
            TokenKind::Semi => {}
            TokenKind::Ident(ref w) if w == "var" => {
                self.var_statement(exec)?;
                self.expect(&TokenKind::Semi, "expected ';' after for initializer")?;
            }
            _ => {
                self.lex.put_back(tok);
                self.expression(exec)?;
                self.expect(&TokenKind::Semi, "expected ';' after for initializer")?;
            }
        }

        // condition
        let cond_pos = self.lex.state();
        let tok = self.token()?;
        let has_cond = tok.kind != TokenKind::Semi;
        let mut cond_true = true;
        if has_cond {
            self.lex.put_back(tok);
            cond_true = self.expression(exec)?.to_bool();
            self.expect(&TokenKind::Semi, "expected ';' after for condition")?;
        }

        // increment: parsed now, executed only from the snapshot
        let incr_pos = self.lex.state();
        let tok = self.token()?;
        let has_incr = tok.kind != TokenKind::RParen;
        if has_incr {
            self.lex.put_back(tok);
            self.expression(false)?;
            self.expect(&TokenKind::RParen, "expected ')' after for clauses")?;
        }

        // body
        let body_pos = self.lex.state();
        let run = exec && cond_true;
        let mut flow = self.statement(run)?;
        let end_pos = self.lex.state();
        if run {
            while flow == Flow::Normal {
                if self.interp.exit_requested() {
                    flow = Flow::Exit;
                    break;
                }
                if has_incr {
                    self.lex.restore(incr_pos.clone());
                    self.expression(true)?;
                }
                if has_cond {
                    self.lex.restore(cond_pos.clone());
                    if !self.expression(true)?.to_bool() {
                        break;
                    }
                }
                self.lex.restore(body_pos.clone());
                flow = self.statement(true)?;
            }
            self.lex.restore(end_pos);
        }
        Ok(flow)
    }

    /// Try to match `[var] name in` after `for (`; rewinds and returns
    /// `None` when the input is a three-part loop instead.
    fn match_for_in(&mut self) -> ScriptResult<Option<(bool, String)>> {
        let mark = self.lex.state();
        let mut tok = self.token()?;
        let declared = matches!(&tok.kind, TokenKind::Ident(w) if w == "var");
        if declared {
            tok = self.token()?;
        }
        let TokenKind::Ident(name) = tok.kind else {
            self.lex.restore(mark);
            return Ok(None);
        };
        if is_statement_keyword(&name) || is_expression_keyword(&name) {
            self.lex.restore(mark);
            return Ok(None);
        }
        let tok = self.token()?;
        if matches!(&tok.kind, TokenKind::Ident(w) if w == "in") {
            Ok(Some((declared, name)))
        } else {
            self.lex.restore(mark);
            Ok(None)
        }
    }

    /// `for (x in obj)` over the enumerable data properties, in insertion
    /// order. The name list is snapshotted first, so mutating the loop
    /// variable (or the object) inside the body does not perturb the
    /// iteration set.
    fn for_in_statement(
        &mut self,
        exec: bool,
        declared: bool,
        loop_var: String,
    ) -> ScriptResult<Flow> {
        let target = self.expression(exec)?;
        self.expect(&TokenKind::RParen, "expected ')' after for-in")?;
        let body_pos = self.lex.state();
        if !exec {
            return self.statement(false);
        }
        let obj = target.as_object().ok_or_else(|| {
            ScriptError::type_error(format!("cannot enumerate {}", target.tag_name()))
        })?;
        let names = obj.borrow().names(PropCategory::Data);
        let mut flow = Flow::Normal;
        let mut ran = false;
        for prop_name in names {
            self.lex.restore(body_pos.clone());
            let value = Value::string(prop_name);
            if declared {
                // `for (var k in ...)` always binds locally, shadowing any
                // global of the same name.
                let local = self.interp.frames.local();
                local.borrow_mut().set_or_create(loop_var.clone(), value)?;
            } else {
                self.assign(Target::Var(loop_var.clone()), value, true)?;
            }
            flow = self.statement(true)?;
            ran = true;
            if self.interp.exit_requested() && flow == Flow::Normal {
                flow = Flow::Exit;
            }
            if flow != Flow::Normal {
                break;
            }
        }
        if !ran {
            // Zero iterations: the body still has to be consumed.
            self.lex.restore(body_pos);
            self.statement(false)?;
        }
        Ok(flow)
    }

    // ---- expressions ----

    /// Full expression: assignment, else a left-to-right binary chain with
    /// `&&`/`||` on top.
    fn expression(&mut self, exec: bool) -> ScriptResult<Value> {
        let first = self.unary(exec)?;
        let tok = self.token()?;
        if tok.kind == TokenKind::Op(OpKind::Assign) {
            // Right-associative: evaluate the right side first.
            let value = self.expression(exec)?;
            if exec {
                let Some(target) = first.target else {
                    return Err(self.syntax("invalid assignment target"));
                };
                self.assign(target, value.clone(), false)?;
            }
            return Ok(value);
        }
        self.lex.put_back(tok);
        let value = if exec {
            self.rvalue(first)?
        } else {
            Value::Undefined
        };
        let value = self.binary_rest(value, exec)?;
        self.logic_rest(value, exec)
    }

    /// Chain of binary operators, left-to-right, no precedence.
    fn binary_rest(&mut self, mut value: Value, exec: bool) -> ScriptResult<Value> {
        loop {
            let tok = self.token()?;
            let op = match tok.kind {
                TokenKind::Op(op) if op.is_binary() => op,
                _ => {
                    self.lex.put_back(tok);
                    return Ok(value);
                }
            };
            let rhs = self.unary(exec)?;
            if exec {
                let rhs = self.rvalue(rhs)?;
                let lhs = self.coerce_operand(value, op)?;
                let rhs = self.coerce_operand(rhs, op)?;
                value = binary_op(op, &lhs, &rhs)?;
            }
        }
    }

    /// `&&`/`||` chain. The right side is always parsed but only evaluated
    /// when it can affect the outcome.
    fn logic_rest(&mut self, mut value: Value, exec: bool) -> ScriptResult<Value> {
        loop {
            let tok = self.token()?;
            let op = match tok.kind {
                TokenKind::Op(op @ (OpKind::And | OpKind::Or)) => op,
                _ => {
                    self.lex.put_back(tok);
                    return Ok(value);
                }
            };
            let lhs_true = value.to_bool();
            let need_rhs = match op {
                OpKind::And => lhs_true,
                _ => !lhs_true,
            };
            let rhs_exec = exec && need_rhs;
            let rhs = self.unary(rhs_exec)?;
            let rhs = if rhs_exec {
                self.rvalue(rhs)?
            } else {
                Value::Undefined
            };
            let rhs = self.binary_rest(rhs, rhs_exec)?;
            if exec {
                value = match op {
                    OpKind::And => Value::Bool(lhs_true && rhs.to_bool()),
                    _ => Value::Bool(lhs_true || rhs.to_bool()),
                };
            }
        }
    }

    fn unary(&mut self, exec: bool) -> ScriptResult<Operand> {
        let tok = self.token()?;
        match tok.kind {
            TokenKind::Int(n) => Ok(Operand::value(Value::integer(n))),
            #[cfg(feature = "float")]
            TokenKind::Float(n) => Ok(Operand::value(Value::Float(n))),
            TokenKind::Str(s) => Ok(Operand::value(Value::string(s))),
            TokenKind::Op(OpKind::Not) => {
                let o = self.unary(exec)?;
                let value = if exec {
                    Value::Bool(!self.rvalue(o)?.to_bool())
                } else {
                    Value::Undefined
                };
                Ok(Operand::value(value))
            }
            TokenKind::Op(OpKind::Minus) => {
                let o = self.unary(exec)?;
                let value = if exec {
                    let v = self.rvalue(o)?;
                    let v = self.coerce_operand(v, OpKind::Minus)?;
                    binary_op(OpKind::Minus, &Value::Int(0), &v)?
                } else {
                    Value::Undefined
                };
                Ok(Operand::value(value))
            }
            TokenKind::Op(op @ (OpKind::Inc | OpKind::Dec)) => {
                let o = self.unary(exec)?;
                if !exec {
                    return Ok(Operand::value(Value::Undefined));
                }
                if !o.resolved {
                    return self.rvalue(o).map(Operand::value);
                }
                let Some(target) = o.target else {
                    return Err(self.syntax("invalid increment target"));
                };
                let step = if op == OpKind::Inc {
                    OpKind::Plus
                } else {
                    OpKind::Minus
                };
                let value = binary_op(step, &o.value, &Value::Int(1))?;
                self.assign(target, value.clone(), false)?;
                Ok(Operand::value(value))
            }
            TokenKind::LParen => {
                let value = self.expression(exec)?;
                self.expect(&TokenKind::RParen, "expected ')'")?;
                self.suffix_walk(Operand::value(value), exec, true)
            }
            TokenKind::Ident(ref word) if is_expression_keyword(word) => match word.as_str() {
                "new" => self.new_expression(exec),
                "function" => self.function_expression(),
                "in" => Err(self.syntax("'in' is only valid in a for statement")),
                _ => unreachable!("keyword table out of sync"),
            },
            TokenKind::Ident(name) => {
                let operand = self.resolve_ident(name, exec)?;
                self.suffix_walk(operand, exec, true)
            }
            other => Err(self.syntax(format!("unexpected token '{}'", other))),
        }
    }

    /// Look a name up in the frames. An unresolved name is still a valid
    /// assignment target; anything else trips the reference error later.
    fn resolve_ident(&mut self, name: String, exec: bool) -> ScriptResult<Operand> {
        if !exec {
            return Ok(Operand {
                value: Value::Undefined,
                target: Some(Target::Var(name)),
                resolved: true,
            });
        }
        match self.interp.frames.find(&name) {
            Some(frame) => {
                let value = frame.borrow_mut().get(&name)?.unwrap_or(Value::Undefined);
                Ok(Operand {
                    value,
                    target: Some(Target::Var(name)),
                    resolved: true,
                })
            }
            None => Ok(Operand {
                value: Value::Undefined,
                target: Some(Target::Var(name)),
                resolved: false,
            }),
        }
    }

    fn rvalue(&mut self, operand: Operand) -> ScriptResult<Value> {
        if operand.resolved {
            Ok(operand.value)
        } else {
            let name = match &operand.target {
                Some(Target::Var(name)) => name.as_str(),
                _ => "expression",
            };
            Err(ScriptError::reference(format!("'{}' is undefined", name)))
        }
    }

    /// Member access, indexing, calls and postfix increment after a primary.
    fn suffix_walk(
        &mut self,
        mut cur: Operand,
        exec: bool,
        allow_calls: bool,
    ) -> ScriptResult<Operand> {
        loop {
            let tok = self.token()?;
            match tok.kind {
                TokenKind::Period => {
                    let tok = self.token()?;
                    let TokenKind::Ident(prop) = tok.kind else {
                        return Err(self.syntax("expected property name after '.'"));
                    };
                    cur = self.member(cur, prop, exec)?;
                }
                TokenKind::LBracket => {
                    let index = self.expression(exec)?;
                    self.expect(&TokenKind::RBracket, "expected ']'")?;
                    cur = self.member(cur, index.coerced_string(), exec)?;
                }
                TokenKind::LParen if allow_calls => {
                    let args = self.arg_list(exec)?;
                    if exec {
                        let this = match &cur.target {
                            Some(Target::Prop { obj, .. }) => Some(obj.clone()),
                            _ => None,
                        };
                        let callee = self.rvalue(cur)?;
                        let value = self.call_value(callee, args, this)?;
                        cur = Operand::value(value);
                    } else {
                        cur = Operand::value(Value::Undefined);
                    }
                }
                TokenKind::Op(op @ (OpKind::Inc | OpKind::Dec)) => {
                    if exec {
                        if !cur.resolved {
                            return self.rvalue(cur).map(Operand::value);
                        }
                        let Some(target) = cur.target else {
                            return Err(self.syntax("invalid increment target"));
                        };
                        let step = if op == OpKind::Inc {
                            OpKind::Plus
                        } else {
                            OpKind::Minus
                        };
                        let new = binary_op(step, &cur.value, &Value::Int(1))?;
                        self.assign(target, new, false)?;
                        // Postfix yields the value before the step.
                        cur = Operand::value(cur.value);
                    } else {
                        cur = Operand::value(Value::Undefined);
                    }
                }
                _ => {
                    self.lex.put_back(tok);
                    return Ok(cur);
                }
            }
        }
    }

    /// One `.name` or `[index]` step.
    fn member(&mut self, base: Operand, prop: String, exec: bool) -> ScriptResult<Operand> {
        if !exec {
            return Ok(Operand::value(Value::Undefined));
        }
        let base = self.rvalue(base)?;
        let obj = base.as_object().ok_or_else(|| {
            ScriptError::type_error(format!(
                "{} has no property '{}'",
                base.tag_name(),
                prop
            ))
        })?;
        let value = obj.borrow_mut().get(&prop)?.unwrap_or(Value::Undefined);
        Ok(Operand {
            value,
            target: Some(Target::Prop { obj, name: prop }),
            resolved: true,
        })
    }

    /// `new Ctor(args)`. A fresh bare object is bound as `this` for the
    /// constructor call, and is the expression's result no matter what the
    /// constructor body returns. A native constructor may substitute an
    /// object of its own by returning one.
    fn new_expression(&mut self, exec: bool) -> ScriptResult<Operand> {
        let tok = self.token()?;
        let TokenKind::Ident(name) = tok.kind else {
            return Err(self.syntax("expected constructor name after 'new'"));
        };
        let ctor = self.resolve_ident(name, exec)?;
        let ctor = self.suffix_walk(ctor, exec, false)?;
        self.expect(&TokenKind::LParen, "expected '(' after constructor")?;
        let args = self.arg_list(exec)?;
        if !exec {
            return Ok(Operand::value(Value::Undefined));
        }
        let callee = self.rvalue(ctor)?;
        match callee {
            Value::Function(_) => {
                let obj = Rc::new(RefCell::new(Object::new()));
                self.call_value(callee, args, Some(obj.clone()))?;
                Ok(Operand::value(Value::Object(obj)))
            }
            Value::Native(_) => {
                let result = self.call_value(callee, args, None)?;
                match result {
                    Value::Object(_) => Ok(Operand::value(result)),
                    _ => Ok(Operand::value(Value::object(Object::new()))),
                }
            }
            other => Err(ScriptError::type_error(format!(
                "{} is not a constructor",
                other.tag_name()
            ))),
        }
    }

    /// Comma-separated arguments through the closing `)`.
    fn arg_list(&mut self, exec: bool) -> ScriptResult<Vec<Value>> {
        let mut args = Vec::new();
        let tok = self.token()?;
        if tok.kind == TokenKind::RParen {
            return Ok(args);
        }
        self.lex.put_back(tok);
        loop {
            args.push(self.expression(exec)?);
            let tok = self.token()?;
            match tok.kind {
                TokenKind::Comma => {}
                TokenKind::RParen => return Ok(args),
                _ => return Err(self.syntax("expected ',' or ')' in argument list")),
            }
        }
    }

    /// Coerce an object operand through its script-level `toValue` (then
    /// `toString`) before a binary operator. An object with neither keeps
    /// its identity under `==`/`!=` and falls back to its display form for
    /// every other operator.
    fn coerce_operand(&mut self, value: Value, op: OpKind) -> ScriptResult<Value> {
        let Value::Object(obj) = &value else {
            return Ok(value);
        };
        let method = {
            let mut o = obj.borrow_mut();
            let by_name = |o: &mut Object, name: &str| -> ScriptResult<Option<Value>> {
                Ok(match o.get(name)? {
                    Some(v @ (Value::Function(_) | Value::Native(_))) => Some(v),
                    _ => None,
                })
            };
            match by_name(&mut o, "toValue")? {
                Some(f) => Some(f),
                None => by_name(&mut o, "toString")?,
            }
        };
        match method {
            Some(f) => self.call_value(f, Vec::new(), Some(obj.clone())),
            None if op.is_equality() => Ok(value),
            None => Ok(Value::string(value.coerced_string())),
        }
    }

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        this: Option<Rc<RefCell<Object>>>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args, this),
            Value::Native(native) => self.call_native(&native, args),
            other => Err(ScriptError::type_error(format!(
                "{} is not callable",
                other.tag_name()
            ))),
        }
    }

    /// Script-function call: fresh frame, `arguments` object, positional
    /// formals (missing actuals are `undefined`), body re-entered through a
    /// nested evaluator. Actuals are deep-copied so the callee cannot
    /// mutate the caller's values through them.
    fn call_function(
        &mut self,
        func: Rc<Function>,
        args: Vec<Value>,
        this: Option<Rc<RefCell<Object>>>,
    ) -> ScriptResult<Value> {
        if self.interp.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::resource("call depth exceeded"));
        }
        let block = self.interp.frames.open_block();
        let frame = self.interp.frames.local();
        {
            let mut frame = frame.borrow_mut();
            let hidden = PropFlags::READ_ONLY | PropFlags::DONT_ENUM;
            let mut argo = Object::new();
            for (i, arg) in args.iter().enumerate() {
                argo.create(i.to_string(), arg.deep_clone())?;
            }
            argo.create_with_flags("length", Value::Int(args.len() as i32), hidden)?;
            argo.create_with_flags("callee", Value::Function(func.clone()), hidden)?;
            frame.create("arguments", Value::object(argo))?;
            for (i, param) in func.params.iter().enumerate() {
                let v = args
                    .get(i)
                    .map(Value::deep_clone)
                    .unwrap_or(Value::Undefined);
                frame.create(param.clone(), v)?;
            }
            if let Some(this) = &this {
                frame.create_with_flags("this", Value::Object(this.clone()), hidden)?;
            }
        }
        self.interp.depth += 1;
        let body = func.body();
        let result = run(self.interp, &body);
        self.interp.depth -= 1;
        self.interp.frames.close_block(block);
        result
    }

    /// Native call: marshal arguments per the registered callback shape and
    /// hand over the registration data and selected host handle.
    fn call_native(&mut self, native: &crate::value::NativeFunction, args: Vec<Value>) -> ScriptResult<Value> {
        let handle = self.interp.handle(native.handle);
        let mut call = NativeCall {
            interp: &mut *self.interp,
            data: native.data.clone(),
            handle,
        };
        match &native.callback {
            NativeCallback::Values(f) => f(&mut call, &args),
            NativeCallback::Strings(f) => {
                let strs: Vec<String> = args.iter().map(Value::coerced_string).collect();
                f(&mut call, &strs)
            }
        }
    }

    /// Store `value` at `target`. A bare name writes through its resolving
    /// frame when one exists; otherwise it binds on the local frame in
    /// variable-binding position (`var`, for-in) and on the global frame
    /// for a plain assignment to an undeclared name.
    fn assign(&mut self, target: Target, value: Value, binding: bool) -> ScriptResult<()> {
        match target {
            Target::Var(name) => match self.interp.frames.find(&name) {
                Some(frame) => {
                    let result = frame.borrow_mut().set(&name, value);
                    result
                }
                None if binding => {
                    let local = self.interp.frames.local();
                    let result = local.borrow_mut().create(name, value);
                    result
                }
                None => {
                    let global = self.interp.frames.global();
                    let result = global.borrow_mut().set_or_create(name, value);
                    result
                }
            },
            Target::Prop { obj, name } => {
                let result = obj.borrow_mut().set_or_create(name, value);
                result
            }
        }
    }
}
