//! Statement execution and expression evaluation.
//!
//! Every call, script or native, goes through [`Runtime::call_value`], which
//! owns the call frame for its duration. Errors are intercepted there while
//! the failing frames are still on the stack, which is what lets a message
//! handler see the full traceback.

use super::frame::{CallFrame, FrameKind};
use super::scope::Env;
use crate::error::{RuntimeError, RuntimeResult};
use crate::gc::{Closure, Function};
use crate::native::Args;
use crate::parser::ast::*;
use crate::runtime::Runtime;
use crate::value::Value;
use std::rc::Rc;

/// How control leaves a block.
pub(crate) enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

impl Runtime {
    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `callee` with `args`. `name` is the call-site name shown in
    /// tracebacks.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        name: Option<Rc<str>>,
    ) -> RuntimeResult<Vec<Value>> {
        let function_ref = match callee {
            Value::Function(function) => function,
            other => {
                if let Some(handler) = self.metamethod(&other, "__call") {
                    let mut call_args = Vec::with_capacity(args.len() + 1);
                    call_args.push(other);
                    call_args.extend(args);
                    return self.call_value(handler, call_args, name);
                }
                let message = match &name {
                    Some(name) => format!("attempt to call '{}' (a {} value)", name, other.type_name()),
                    None => format!("attempt to call a {} value", other.type_name()),
                };
                return Err(self.error_at(message));
            }
        };

        if self.frames.len() >= self.options.max_call_depth {
            return Err(self.error_at("stack overflow"));
        }

        let function = self.heap.function(function_ref)?.clone();
        let frame = match &function {
            Function::Script(closure) => CallFrame {
                name,
                kind: if closure.body.is_main {
                    FrameKind::Main {
                        chunk: closure.chunk.clone(),
                    }
                } else {
                    FrameKind::Script {
                        chunk: closure.chunk.clone(),
                        defined_at: closure.body.line,
                    }
                },
                line: closure.body.line,
            },
            Function::Native(native) => CallFrame {
                name: name.or_else(|| Some(native.name.clone())),
                kind: FrameKind::Native,
                line: 0,
            },
        };

        self.frames.push(frame);
        let result = match function {
            Function::Script(closure) => self.invoke_closure(&closure, args),
            Function::Native(native) => {
                let args = Args::new(native.name.clone(), args, native.upvalues.clone());
                (native.callback)(self, args)
            }
        };
        let result = result.map_err(|error| self.intercept(error));
        self.frames.pop();
        result
    }

    /// Run the innermost message handler on an error that hasn't seen one.
    fn intercept(&mut self, error: RuntimeError) -> RuntimeError {
        match error {
            RuntimeError::Raised {
                value,
                message,
                traced: false,
                reported,
            } => match self.handlers.last().cloned().flatten() {
                Some(handler) => self.run_handler(handler, value),
                None => RuntimeError::Raised {
                    value,
                    message,
                    traced: false,
                    reported,
                },
            },
            other => other,
        }
    }

    pub(crate) fn run_handler(&mut self, handler: Value, value: Value) -> RuntimeError {
        self.handlers.push(None);
        let outcome = self.call_value(handler, vec![value], None);
        self.handlers.pop();

        let value = match outcome {
            Ok(results) => results.into_iter().next().unwrap_or_default(),
            Err(_) => Value::from("error in error handling"),
        };
        let mut error = RuntimeError::from_value(value);
        if let RuntimeError::Raised { traced, .. } = &mut error {
            *traced = true;
        }
        error
    }

    fn invoke_closure(&mut self, closure: &Closure, args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        let mut env = closure.env.clone();
        let mut args = args.into_iter();
        for param in &closure.body.params {
            env = env.bind(param.clone(), args.next().unwrap_or_default());
        }

        match self.exec_block(&closure.body.block, &env)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    pub(crate) fn make_closure(&mut self, body: &Rc<FunctionBody>, env: &Env) -> Value {
        let closure = Closure {
            body: body.clone(),
            chunk: self.current_chunk(),
            env: env.clone(),
        };
        Value::Function(self.heap.alloc_function(Function::Script(Rc::new(closure))))
    }

    fn current_chunk(&self) -> Rc<str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.chunk().cloned())
            .unwrap_or_else(|| "?".into())
    }

    fn set_line(&mut self, line: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// Raise `message` prefixed with the current script position.
    pub(crate) fn error_at(&self, message: impl Into<String>) -> RuntimeError {
        let message = message.into();
        match self.frames.last() {
            Some(frame) if !frame.is_native() => {
                RuntimeError::raise(format!("{}: {}", frame.location(), message))
            }
            _ => RuntimeError::raise(message),
        }
    }

    pub(crate) fn locate(&self, error: RuntimeError) -> RuntimeError {
        match error {
            RuntimeError::Raised {
                value: Value::String(message),
                traced: false,
                ..
            } => self.error_at(message.to_string()),
            other => other,
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, block: &Block, env: &Env) -> RuntimeResult<Flow> {
        self.exec_statements(block, env).map(|(flow, _)| flow)
    }

    /// Execute a block and hand back its final scope (`repeat ... until`
    /// evaluates its condition inside the body's scope).
    fn exec_statements(&mut self, block: &Block, env: &Env) -> RuntimeResult<(Flow, Env)> {
        let mut scope = env.clone();
        for statement in &block.statements {
            match self.exec_statement(statement, &mut scope)? {
                Flow::Normal => {}
                flow => return Ok((flow, scope)),
            }
        }
        Ok((Flow::Normal, scope))
    }

    fn exec_statement(&mut self, statement: &Statement, scope: &mut Env) -> RuntimeResult<Flow> {
        self.set_line(statement.line);

        match &statement.kind {
            StatementKind::Local { names, values } => {
                let mut values = self.eval_multi(values, scope)?;
                values.resize(names.len(), Value::Nil);
                for (name, value) in names.iter().zip(values) {
                    *scope = scope.bind(name.clone(), value);
                }
            }
            StatementKind::LocalFunction { name, body } => {
                let inner = scope.bind(name.clone(), Value::Nil);
                let function = self.make_closure(body, &inner);
                if let Some(cell) = inner.lookup(name) {
                    *cell.borrow_mut() = function;
                }
                *scope = inner;
            }
            StatementKind::Assign { targets, values } => {
                let mut values = self.eval_multi(values, scope)?;
                values.resize(targets.len(), Value::Nil);
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value, scope)?;
                }
            }
            StatementKind::Call(expr) => {
                self.eval_multi_expr(expr, scope)?;
            }
            StatementKind::If {
                branches,
                otherwise,
            } => {
                for (condition, block) in branches {
                    if self.eval(condition, scope)?.is_truthy() {
                        return self.exec_block(block, scope);
                    }
                }
                if let Some(block) = otherwise {
                    return self.exec_block(block, scope);
                }
            }
            StatementKind::While { condition, body } => {
                while self.eval(condition, scope)?.is_truthy() {
                    match self.exec_block(body, scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StatementKind::Repeat { body, condition } => loop {
                let (flow, inner) = self.exec_statements(body, scope)?;
                match flow {
                    Flow::Normal => {}
                    Flow::Break => break,
                    flow @ Flow::Return(_) => return Ok(flow),
                }
                if self.eval(condition, &inner)?.is_truthy() {
                    break;
                }
            },
            StatementKind::NumericFor {
                variable,
                start,
                limit,
                step,
                body,
            } => {
                let start = self.for_number(start, scope, "initial")?;
                let limit = self.for_number(limit, scope, "limit")?;
                let step = match step {
                    Some(step) => self.for_number(step, scope, "step")?,
                    None => 1.0,
                };

                let mut i = start;
                while (step > 0.0 && i <= limit) || (step <= 0.0 && i >= limit) {
                    let body_env = scope.bind(variable.clone(), Value::Number(i));
                    match self.exec_block(body, &body_env)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    i += step;
                }
            }
            StatementKind::GenericFor {
                names,
                values,
                body,
            } => {
                let mut state = self.eval_multi(values, scope)?;
                state.resize(3, Value::Nil);
                let iterator = state[0].clone();
                let invariant = state[1].clone();
                let mut control = state[2].clone();

                loop {
                    let mut results = self.call_value(
                        iterator.clone(),
                        vec![invariant.clone(), control.clone()],
                        Some("for iterator".into()),
                    )?;
                    results.resize(names.len().max(1), Value::Nil);
                    if results[0].is_nil() {
                        break;
                    }
                    control = results[0].clone();

                    let mut body_env = scope.clone();
                    for (name, value) in names.iter().zip(results) {
                        body_env = body_env.bind(name.clone(), value);
                    }
                    match self.exec_block(body, &body_env)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StatementKind::Do(block) => return self.exec_block(block, scope),
            StatementKind::Break => return Ok(Flow::Break),
            StatementKind::Return(values) => {
                let values = self.eval_multi(values, scope)?;
                return Ok(Flow::Return(values));
            }
        }

        Ok(Flow::Normal)
    }

    fn for_number(&mut self, expr: &Expr, env: &Env, what: &str) -> RuntimeResult<f64> {
        let value = self.eval(expr, env)?;
        value
            .to_number()
            .ok_or_else(|| self.error_at(format!("'for' {} value must be a number", what)))
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Env) -> RuntimeResult<()> {
        match target {
            Expr::Name(name) => match env.lookup(name) {
                Some(cell) => *cell.borrow_mut() = value,
                None => self.set_global(name, value),
            },
            Expr::Index(object, key) => {
                let target_value = self.eval(object, env)?;
                let key = self.eval(key, env)?;
                if !self.is_indexable(&target_value) {
                    return Err(self.index_error(&target_value, object, env));
                }
                self.set_index(&target_value, key, value)?;
            }
            _ => return Err(self.error_at("cannot assign to this expression")),
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval_multi(&mut self, exprs: &[Expr], env: &Env) -> RuntimeResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.is_multi() {
                values.extend(self.eval_multi_expr(expr, env)?);
            } else {
                values.push(self.eval(expr, env)?);
            }
        }
        Ok(values)
    }

    fn eval_multi_expr(&mut self, expr: &Expr, env: &Env) -> RuntimeResult<Vec<Value>> {
        match expr {
            Expr::Call(call) => self.eval_call(call, env),
            other => Ok(vec![self.eval(other, env)?]),
        }
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> RuntimeResult<Value> {
        let value = match expr {
            Expr::Nil => Value::Nil,
            Expr::True => Value::Boolean(true),
            Expr::False => Value::Boolean(false),
            Expr::Number(n) => Value::Number(*n),
            Expr::String(s) => Value::String(s.clone()),
            Expr::Function(body) => self.make_closure(body, env),
            Expr::Table(fields) => self.eval_table(fields, env)?,
            Expr::Name(name) => match env.lookup(name) {
                Some(cell) => cell.borrow().clone(),
                None => self.get_global(name),
            },
            Expr::Index(object, key) => {
                let target = self.eval(object, env)?;
                let key = self.eval(key, env)?;
                if !self.is_indexable(&target) {
                    return Err(self.index_error(&target, object, env));
                }
                self.index(&target, &key)?
            }
            Expr::Call(call) => self
                .eval_call(call, env)?
                .into_iter()
                .next()
                .unwrap_or_default(),
            Expr::Paren(inner) => self.eval(inner, env)?,
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, env)?,
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, env)?,
        };
        Ok(value)
    }

    fn eval_call(&mut self, call: &CallExpr, env: &Env) -> RuntimeResult<Vec<Value>> {
        let (callee, mut args, description) = match &call.method {
            Some(method) => {
                let receiver = self.eval(&call.callee, env)?;
                if !self.is_indexable(&receiver) {
                    return Err(self.index_error(&receiver, &call.callee, env));
                }
                let function = self.index(&receiver, &Value::String(method.clone()))?;
                (function, vec![receiver], Some(format!("method '{}'", method)))
            }
            None => {
                let function = self.eval(&call.callee, env)?;
                (function, Vec::new(), describe_expr(&call.callee, env))
            }
        };
        args.extend(self.eval_multi(&call.args, env)?);
        self.set_line(call.line);

        if !self.is_callable(&callee) {
            let message = match description {
                Some(what) => format!("attempt to call {} (a {} value)", what, callee.type_name()),
                None => format!("attempt to call a {} value", callee.type_name()),
            };
            return Err(self.error_at(message));
        }

        self.call_value(callee, args, call.callee_name())
    }

    fn eval_table(&mut self, fields: &[TableField], env: &Env) -> RuntimeResult<Value> {
        let table = self.create_table();
        let mut position = 1usize;

        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) if i + 1 == fields.len() && expr.is_multi() => {
                    for value in self.eval_multi_expr(expr, env)? {
                        self.raw_set(table, Value::from(position), value)?;
                        position += 1;
                    }
                }
                TableField::Positional(expr) => {
                    let value = self.eval(expr, env)?;
                    self.raw_set(table, Value::from(position), value)?;
                    position += 1;
                }
                TableField::Keyed(key, value) => {
                    let key = self.eval(key, env)?;
                    let value = self.eval(value, env)?;
                    self.raw_set(table, key, value)
                        .map_err(|error| self.locate(error))?;
                }
            }
        }

        Ok(Value::Table(table))
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
    ) -> RuntimeResult<Value> {
        match op {
            BinaryOp::And => {
                let value = self.eval(left, env)?;
                return if value.is_truthy() {
                    self.eval(right, env)
                } else {
                    Ok(value)
                };
            }
            BinaryOp::Or => {
                let value = self.eval(left, env)?;
                return if value.is_truthy() {
                    Ok(value)
                } else {
                    self.eval(right, env)
                };
            }
            _ => {}
        }

        let a = self.eval(left, env)?;
        let b = self.eval(right, env)?;

        match op {
            BinaryOp::Equal => Ok(Value::Boolean(a == b)),
            BinaryOp::NotEqual => Ok(Value::Boolean(a != b)),
            BinaryOp::Less => self.less_than(&a, &b).map(Value::Boolean),
            BinaryOp::Greater => self.less_than(&b, &a).map(Value::Boolean),
            BinaryOp::LessEqual => self.less_equal(&a, &b).map(Value::Boolean),
            BinaryOp::GreaterEqual => self.less_equal(&b, &a).map(Value::Boolean),
            BinaryOp::Concat => match (a.to_text(), b.to_text()) {
                (Some(x), Some(y)) => Ok(Value::String(format!("{}{}", x, y).into())),
                (None, _) => Err(self.operand_error("concatenate", &a, left, env)),
                (_, None) => Err(self.operand_error("concatenate", &b, right, env)),
            },
            _ => match (a.to_number(), b.to_number()) {
                (Some(x), Some(y)) => Ok(Value::Number(arithmetic(op, x, y))),
                (None, _) => Err(self.operand_error("perform arithmetic on", &a, left, env)),
                (_, None) => Err(self.operand_error("perform arithmetic on", &b, right, env)),
            },
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> RuntimeResult<Value> {
        let value = self.eval(operand, env)?;
        match op {
            UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
            UnaryOp::Negate => match value.to_number() {
                Some(n) => Ok(Value::Number(-n)),
                None => Err(self.operand_error("perform arithmetic on", &value, operand, env)),
            },
            UnaryOp::Length => match &value {
                Value::String(s) => Ok(Value::from(s.len())),
                Value::Table(t) => Ok(Value::from(self.heap.table(*t)?.border())),
                _ => Err(self.operand_error("get length of", &value, operand, env)),
            },
        }
    }

    fn less_than(&self, a: &Value, b: &Value) -> RuntimeResult<bool> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(x < y),
            (Value::String(x), Value::String(y)) => Ok(x < y),
            _ => Err(self.compare_error(a, b)),
        }
    }

    fn less_equal(&self, a: &Value, b: &Value) -> RuntimeResult<bool> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(x <= y),
            (Value::String(x), Value::String(y)) => Ok(x <= y),
            _ => Err(self.compare_error(a, b)),
        }
    }

    fn compare_error(&self, a: &Value, b: &Value) -> RuntimeError {
        if a.type_name() == b.type_name() {
            self.error_at(format!("attempt to compare two {} values", a.type_name()))
        } else {
            self.error_at(format!(
                "attempt to compare {} with {}",
                a.type_name(),
                b.type_name()
            ))
        }
    }

    fn operand_error(&self, action: &str, value: &Value, expr: &Expr, env: &Env) -> RuntimeError {
        match describe_expr(expr, env) {
            Some(what) => self.error_at(format!(
                "attempt to {} {} (a {} value)",
                action,
                what,
                value.type_name()
            )),
            None => self.error_at(format!("attempt to {} a {} value", action, value.type_name())),
        }
    }

    fn index_error(&self, value: &Value, expr: &Expr, env: &Env) -> RuntimeError {
        self.operand_error("index", value, expr, env)
    }
}

/// Variable description used in error messages (`global 'x'`, `field 'y'`).
fn describe_expr(expr: &Expr, env: &Env) -> Option<String> {
    match expr {
        Expr::Name(name) if env.lookup(name).is_some() => Some(format!("local '{}'", name)),
        Expr::Name(name) => Some(format!("global '{}'", name)),
        Expr::Index(_, key) => match key.as_ref() {
            Expr::String(name) => Some(format!("field '{}'", name)),
            _ => None,
        },
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, x: f64, y: f64) -> f64 {
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Subtract => x - y,
        BinaryOp::Multiply => x * y,
        BinaryOp::Divide => x / y,
        BinaryOp::Modulo => x - (x / y).floor() * y,
        BinaryOp::Power => x.powf(y),
        _ => f64::NAN,
    }
}
