use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::capability::Hardware;
use super::parser::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use crate::error::ScriptError;

/// Loop iterations between forced yields, so a sketch spinning without
/// `delay` cannot starve the runtime.
const YIELD_EVERY: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Result<f64, ScriptError> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            Value::Str(s) => Err(ScriptError::Type(format!("\"{}\" is not a number", s))),
        }
    }

    /// Integer view; floats truncate toward zero.
    pub fn as_int(&self) -> Result<i64, ScriptError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(f) => Ok(*f as i64),
            Value::Str(s) => Err(ScriptError::Type(format!("\"{}\" is not a number", s))),
        }
    }

    fn from_reading(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 {
            Value::Int(value as i64)
        } else {
            Value::Float(value)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:.2}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return,
}

/// Executes a compiled program against a [`Hardware`] implementation.
///
/// Globals persist across calls, so `loop` sees what `setup` and earlier
/// iterations left behind.
pub struct Interpreter {
    program: Arc<Program>,
    globals: HashMap<String, Value>,
}

impl Interpreter {
    pub fn new(program: Program) -> Self {
        Interpreter {
            program: Arc::new(program),
            globals: HashMap::new(),
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.program.function(name).is_some()
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Evaluate the top-level `let` bindings in order.
    pub async fn init_globals(&mut self, hw: &mut dyn Hardware) -> Result<(), ScriptError> {
        let program = Arc::clone(&self.program);
        let mut machine = Machine::new(&mut self.globals, hw);
        for stmt in &program.globals {
            machine.exec(stmt).await?;
        }
        Ok(())
    }

    /// Run a named procedure. A missing procedure is a no-op.
    pub async fn call(&mut self, name: &str, hw: &mut dyn Hardware) -> Result<(), ScriptError> {
        let program = Arc::clone(&self.program);
        let Some(body) = program.function(name) else {
            return Ok(());
        };
        let mut machine = Machine::new(&mut self.globals, hw);
        machine.exec_block(body).await?;
        Ok(())
    }
}

struct Machine<'a> {
    globals: &'a mut HashMap<String, Value>,
    scopes: Vec<HashMap<String, Value>>,
    hw: &'a mut dyn Hardware,
    ticks: u32,
}

impl<'a> Machine<'a> {
    fn new(globals: &'a mut HashMap<String, Value>, hw: &'a mut dyn Hardware) -> Self {
        Machine {
            globals,
            scopes: Vec::new(),
            hw,
            ticks: 0,
        }
    }

    fn exec_block<'s>(&'s mut self, stmts: &'s [Stmt]) -> BoxFuture<'s, Result<Flow, ScriptError>> {
        async move {
            self.scopes.push(HashMap::new());
            let mut flow = Flow::Normal;
            for stmt in stmts {
                flow = self.exec(stmt).await?;
                if flow != Flow::Normal {
                    break;
                }
            }
            self.scopes.pop();
            Ok(flow)
        }
        .boxed()
    }

    fn exec<'s>(&'s mut self, stmt: &'s Stmt) -> BoxFuture<'s, Result<Flow, ScriptError>> {
        async move {
            match stmt {
                Stmt::Let(bindings) => {
                    for (name, init) in bindings {
                        let value = match init {
                            Some(expr) => self.eval(expr).await?,
                            None => Value::Int(0),
                        };
                        self.declare(name, value);
                    }
                    Ok(Flow::Normal)
                }
                Stmt::Expr(expr) => {
                    self.eval(expr).await?;
                    Ok(Flow::Normal)
                }
                Stmt::If(cond, then, otherwise) => {
                    if self.eval(cond).await?.truthy() {
                        self.exec(then).await
                    } else if let Some(otherwise) = otherwise {
                        self.exec(otherwise).await
                    } else {
                        Ok(Flow::Normal)
                    }
                }
                Stmt::While(cond, body) => {
                    loop {
                        self.tick().await?;
                        if !self.eval(cond).await?.truthy() {
                            break;
                        }
                        match self.exec(body).await? {
                            Flow::Break => break,
                            Flow::Return => return Ok(Flow::Return),
                            Flow::Normal | Flow::Continue => {}
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::DoWhile(body, cond) => {
                    loop {
                        self.tick().await?;
                        match self.exec(body).await? {
                            Flow::Break => break,
                            Flow::Return => return Ok(Flow::Return),
                            Flow::Normal | Flow::Continue => {}
                        }
                        if !self.eval(cond).await?.truthy() {
                            break;
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::For {
                    init,
                    cond,
                    step,
                    body,
                } => {
                    self.scopes.push(HashMap::new());
                    if let Some(init) = init {
                        self.exec(init).await?;
                    }
                    loop {
                        self.tick().await?;
                        if let Some(cond) = cond {
                            if !self.eval(cond).await?.truthy() {
                                break;
                            }
                        }
                        match self.exec(body).await? {
                            Flow::Break => break,
                            Flow::Return => {
                                self.scopes.pop();
                                return Ok(Flow::Return);
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                        if let Some(step) = step {
                            self.eval(step).await?;
                        }
                    }
                    self.scopes.pop();
                    Ok(Flow::Normal)
                }
                Stmt::Block(stmts) => self.exec_block(stmts).await,
                Stmt::Break => Ok(Flow::Break),
                Stmt::Continue => Ok(Flow::Continue),
                Stmt::Return(value) => {
                    if let Some(value) = value {
                        self.eval(value).await?;
                    }
                    Ok(Flow::Return)
                }
                Stmt::Empty => Ok(Flow::Normal),
            }
        }
        .boxed()
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, Result<Value, ScriptError>> {
        async move {
            match expr {
                Expr::Int(n) => Ok(Value::Int(*n)),
                Expr::Float(f) => Ok(Value::Float(*f)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Var(name) => self.lookup(name).cloned(),
                Expr::Assign { target, op, value } => {
                    let value = self.eval(value).await?;
                    let value = match op {
                        Some(op) => binary(*op, self.lookup(target)?.clone(), value)?,
                        None => value,
                    };
                    self.store(target, value.clone())?;
                    Ok(value)
                }
                Expr::Step {
                    target,
                    delta,
                    prefix,
                } => {
                    let old = self.lookup(target)?.clone();
                    let new = match &old {
                        Value::Int(n) => Value::Int(n.wrapping_add(*delta)),
                        Value::Float(f) => Value::Float(f + *delta as f64),
                        Value::Str(_) => {
                            return Err(ScriptError::Type(format!("cannot step string {}", target)))
                        }
                    };
                    self.store(target, new.clone())?;
                    Ok(if *prefix { new } else { old })
                }
                Expr::Unary(op, operand) => {
                    let value = self.eval(operand).await?;
                    unary(*op, value)
                }
                Expr::Binary(op, lhs, rhs) => {
                    let lhs = self.eval(lhs).await?;
                    let rhs = self.eval(rhs).await?;
                    binary(*op, lhs, rhs)
                }
                Expr::And(lhs, rhs) => {
                    if !self.eval(lhs).await?.truthy() {
                        return Ok(Value::Int(0));
                    }
                    Ok(Value::Int(self.eval(rhs).await?.truthy() as i64))
                }
                Expr::Or(lhs, rhs) => {
                    if self.eval(lhs).await?.truthy() {
                        return Ok(Value::Int(1));
                    }
                    Ok(Value::Int(self.eval(rhs).await?.truthy() as i64))
                }
                Expr::Ternary(cond, then, otherwise) => {
                    if self.eval(cond).await?.truthy() {
                        self.eval(then).await
                    } else {
                        self.eval(otherwise).await
                    }
                }
                Expr::Capability {
                    name,
                    args,
                    awaited,
                } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(arg).await?);
                    }
                    self.capability(name, values, *awaited).await
                }
                Expr::Call(name) => Err(ScriptError::NotCallable(name.clone())),
            }
        }
        .boxed()
    }

    async fn capability(
        &mut self,
        name: &str,
        args: Vec<Value>,
        awaited: bool,
    ) -> Result<Value, ScriptError> {
        if self.hw.is_halted() {
            return Err(ScriptError::Halted);
        }
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ScriptError::Arity {
                    name: name.to_string(),
                    expected,
                    got: args.len(),
                })
            }
        };

        match name {
            "pinMode" => {
                arity(2)?;
                self.hw.pin_mode(args[0].as_int()?, args[1].as_int()?);
            }
            "digitalWrite" => {
                arity(2)?;
                self.hw.digital_write(args[0].as_int()?, args[1].truthy());
            }
            "digitalRead" => {
                arity(1)?;
                return Ok(Value::Int(self.hw.digital_read(args[0].as_int()?)));
            }
            "analogWrite" => {
                arity(2)?;
                self.hw.analog_write(args[0].as_int()?, args[1].as_f64()?);
            }
            "analogRead" => {
                arity(1)?;
                let reading = self.hw.analog_read(args[0].as_int()?);
                return Ok(Value::from_reading(reading));
            }
            "millis" => {
                arity(0)?;
                return Ok(Value::Int(self.hw.millis() as i64));
            }
            "delay" => {
                arity(1)?;
                if !awaited {
                    return Err(ScriptError::NotAwaited);
                }
                let ms = args[0].as_f64()?;
                let ms = if ms.is_nan() || ms < 0.0 { 0 } else { ms as u64 };
                self.hw.delay(ms).await?;
            }
            "print" => {
                arity(1)?;
                self.hw.print(&args[0].to_string());
            }
            "println" => {
                if args.len() > 1 {
                    arity(1)?;
                }
                let text = args.first().map(Value::to_string).unwrap_or_default();
                self.hw.print(&format!("{}\n", text));
            }
            "serialBegin" => {}
            other => return Err(ScriptError::UnknownCapability(other.to_string())),
        }
        Ok(Value::Int(0))
    }

    /// Observe a stop request and yield periodically inside loops.
    async fn tick(&mut self) -> Result<(), ScriptError> {
        if self.hw.is_halted() {
            return Err(ScriptError::Halted);
        }
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn declare(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.to_string(), value),
            None => self.globals.insert(name.to_string(), value),
        };
    }

    fn lookup(&self, name: &str) -> Result<&Value, ScriptError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
            .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string()))
    }

    fn store(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        match self.globals.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ScriptError::UndefinedVariable(name.to_string())),
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, ScriptError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Int(!v.truthy() as i64)),
        (_, Value::Str(s)) => Err(ScriptError::Type(format!("cannot negate \"{}\"", s))),
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, v) => Ok(v),
    }
}

/// C-style arithmetic: integers stay integral with truncating division, any
/// float operand promotes. `+` with a string operand concatenates.
fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    use BinaryOp::*;

    if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
        return match op {
            Add => Ok(Value::Str(format!("{}{}", lhs, rhs))),
            Eq => Ok(Value::Int((lhs == rhs) as i64)),
            Ne => Ok(Value::Int((lhs != rhs) as i64)),
            _ => Err(ScriptError::Type(format!(
                "unsupported string operation {:?}",
                op
            ))),
        };
    }

    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        let value = match op {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div | Rem if b == 0 => return Err(ScriptError::DivisionByZero),
            Div => a.wrapping_div(b),
            Rem => a.wrapping_rem(b),
            Eq => (a == b) as i64,
            Ne => (a != b) as i64,
            Lt => (a < b) as i64,
            Le => (a <= b) as i64,
            Gt => (a > b) as i64,
            Ge => (a >= b) as i64,
            BitAnd => a & b,
            BitOr => a | b,
            BitXor => a ^ b,
        };
        return Ok(Value::Int(value));
    }

    let (a, b) = (lhs.as_f64()?, rhs.as_f64()?);
    let value = match op {
        Add => Value::Float(a + b),
        Sub => Value::Float(a - b),
        Mul => Value::Float(a * b),
        Div => Value::Float(a / b),
        Rem => Value::Float(a % b),
        Eq => Value::Int((a == b) as i64),
        Ne => Value::Int((a != b) as i64),
        Lt => Value::Int((a < b) as i64),
        Le => Value::Int((a <= b) as i64),
        Gt => Value::Int((a > b) as i64),
        Ge => Value::Int((a >= b) as i64),
        BitAnd | BitOr | BitXor => {
            return binary(op, Value::Int(lhs.as_int()?), Value::Int(rhs.as_int()?))
        }
    };
    Ok(value)
}
