use super::chunk::{Chunk, OpCode};
use super::reporter::{Report, Reporter};
use super::table::Table;
use super::value::Value;
use std::convert::TryFrom;
use std::rc::Rc;

pub const STACK_MAX: usize = 256;

#[derive(Debug, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Stack-based bytecode interpreter. `globals` and `strings` both outlive a
/// single `run`: in REPL mode the same `Vm` is reused across lines, so a
/// variable defined on one line is visible on the next and a string literal
/// seen twice anywhere in the session interns to the same `Rc`.
pub struct Vm {
    stack: Vec<Value>,
    globals: Table,
    strings: Table,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            strings: Table::new(),
        }
    }

    /// The table that must be passed to the compiler so string literals it
    /// emits share this VM's intern pool.
    pub fn strings_mut(&mut self) -> &mut Table {
        &mut self.strings
    }

    fn push(&mut self, value: Value, reporter: &mut dyn Reporter, line: u32) -> Result<(), ()> {
        if self.stack.len() >= STACK_MAX {
            reporter.error(Report::runtime("Stack overflow.", line));
            return Err(());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler emitted unbalanced bytecode")
    }

    fn peek(&self, distance: usize) -> &Value {
        let len = self.stack.len();
        &self.stack[len - 1 - distance]
    }

    fn runtime_error(&mut self, reporter: &mut dyn Reporter, message: impl Into<String>, line: u32) {
        reporter.error(Report::runtime(message, line));
        self.stack.clear();
    }

    pub fn run(&mut self, chunk: &Chunk, reporter: &mut dyn Reporter) -> InterpretResult {
        let mut ip = 0usize;

        macro_rules! read_byte {
            () => {{
                let byte = chunk.code[ip];
                ip += 1;
                byte
            }};
        }

        macro_rules! read_short {
            () => {{
                let hi = chunk.code[ip] as u16;
                let lo = chunk.code[ip + 1] as u16;
                ip += 2;
                (hi << 8) | lo
            }};
        }

        macro_rules! read_constant {
            () => {{
                let index = read_byte!();
                chunk.constants[index as usize].clone()
            }};
        }

        macro_rules! binary_numeric {
            ($self:ident, $line:expr, $op:tt, $wrap:expr) => {{
                let (a, b) = match ($self.peek(1), $self.peek(0)) {
                    (Value::Number(a), Value::Number(b)) => (*a, *b),
                    _ => {
                        $self.runtime_error(reporter, "Operands must be numbers.", $line);
                        return InterpretResult::RuntimeError;
                    }
                };
                $self.pop();
                $self.pop();
                #[allow(clippy::redundant_closure_call)]
                let result = $wrap(a $op b);
                if $self.push(result, reporter, $line).is_err() {
                    return InterpretResult::RuntimeError;
                }
            }};
        }

        loop {
            #[cfg(feature = "disassemble")]
            {
                let (line, _) = super::debug::disassemble_instruction(chunk, ip);
                eprintln!("{}", line);
            }

            let line = chunk.lines[ip];
            let op = match OpCode::try_from(read_byte!()) {
                Ok(op) => op,
                Err(()) => {
                    self.runtime_error(reporter, "Unknown opcode.", line);
                    return InterpretResult::RuntimeError;
                }
            };

            match op {
                OpCode::Constant => {
                    let value = read_constant!();
                    if self.push(value, reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Nil => {
                    if self.push(Value::Nil, reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::True => {
                    if self.push(Value::Bool(true), reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::False => {
                    if self.push(Value::Bool(false), reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = read_byte!() as usize;
                    let value = self.stack[slot].clone();
                    if self.push(value, reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::SetLocal => {
                    let slot = read_byte!() as usize;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = match read_constant!() {
                        Value::Str(s) => s,
                        _ => unreachable!("compiler always emits a string constant for a name"),
                    };
                    match self.globals.get(&name) {
                        Some(value) => {
                            if self.push(value, reporter, line).is_err() {
                                return InterpretResult::RuntimeError;
                            }
                        }
                        None => {
                            self.runtime_error(
                                reporter,
                                format!("Undefined variable '{}'.", name.text),
                                line,
                            );
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = match read_constant!() {
                        Value::Str(s) => s,
                        _ => unreachable!("compiler always emits a string constant for a name"),
                    };
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = match read_constant!() {
                        Value::Str(s) => s,
                        _ => unreachable!("compiler always emits a string constant for a name"),
                    };
                    let value = self.peek(0).clone();
                    // A bare assignment must not create the global: insert to
                    // find out whether it existed, then delete it right back
                    // out if it didn't.
                    if self.globals.set(Rc::clone(&name), value) {
                        self.globals.del(&name);
                        self.runtime_error(
                            reporter,
                            format!("Undefined variable '{}'.", name.text),
                            line,
                        );
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    if self.push(Value::Bool(a == b), reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Greater => {
                    binary_numeric!(self, line, >, Value::Bool);
                }
                OpCode::Less => {
                    binary_numeric!(self, line, <, Value::Bool);
                }
                OpCode::Add => {
                    let result = match (self.peek(1), self.peek(0)) {
                        (Value::Number(a), Value::Number(b)) => Some(Value::Number(a + b)),
                        (Value::Str(_), Value::Str(_)) => {
                            let b = self.pop();
                            let a = self.pop();
                            let (a, b) = match (a, b) {
                                (Value::Str(a), Value::Str(b)) => (a, b),
                                _ => unreachable!(),
                            };
                            let concatenated = format!("{}{}", a.text, b.text);
                            let interned = self.strings.intern(&concatenated);
                            if self.push(Value::Str(interned), reporter, line).is_err() {
                                return InterpretResult::RuntimeError;
                            }
                            None
                        }
                        _ => {
                            self.runtime_error(
                                reporter,
                                "Operands must be two numbers or two strings.",
                                line,
                            );
                            return InterpretResult::RuntimeError;
                        }
                    };
                    if let Some(value) = result {
                        self.pop();
                        self.pop();
                        if self.push(value, reporter, line).is_err() {
                            return InterpretResult::RuntimeError;
                        }
                    }
                }
                OpCode::Subtract => {
                    binary_numeric!(self, line, -, Value::Number);
                }
                OpCode::Multiply => {
                    binary_numeric!(self, line, *, Value::Number);
                }
                OpCode::Divide => {
                    binary_numeric!(self, line, /, Value::Number);
                }
                OpCode::Not => {
                    let value = self.pop();
                    if self.push(Value::Bool(value.is_falsey()), reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Negate => {
                    let value = match self.peek(0) {
                        Value::Number(n) => Value::Number(-n),
                        _ => {
                            self.runtime_error(reporter, "Operand must be a number.", line);
                            return InterpretResult::RuntimeError;
                        }
                    };
                    self.pop();
                    if self.push(value, reporter, line).is_err() {
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{}", value);
                }
                OpCode::Jump => {
                    let offset = read_short!();
                    ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_short!();
                    if self.peek(0).is_falsey() {
                        ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = read_short!();
                    ip -= offset as usize;
                }
                OpCode::Return => {
                    return InterpretResult::Ok;
                }
            }

            if ip >= chunk.size() {
                return InterpretResult::Ok;
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one source unit through the full pipeline: scan/parse/compile into a
/// `Chunk`, then execute it on `vm`. Shared by both the run-file and REPL
/// entry points so their error-to-exit-code mapping stays in one place.
pub fn interpret(vm: &mut Vm, source: &str, reporter: &mut dyn Reporter) -> InterpretResult {
    let chunk = {
        let compiler = super::compiler::Compiler::new(source, vm.strings_mut(), reporter);
        match compiler.compile() {
            Some(chunk) => chunk,
            None => return InterpretResult::CompileError,
        }
    };

    #[cfg(feature = "disassemble")]
    eprint!("{}", super::debug::disassemble_chunk(&chunk, "script"));

    vm.run(&chunk, reporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;

    fn run(source: &str) -> (InterpretResult, CollectingReporter) {
        let mut vm = Vm::new();
        let mut reporter = CollectingReporter::new();
        let result = interpret(&mut vm, source, &mut reporter);
        (result, reporter)
    }

    #[test]
    fn arithmetic_and_print() {
        let (result, reporter) = run("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::Ok);
        assert!(reporter.errors.is_empty());
    }

    #[test]
    fn string_concatenation() {
        let (result, reporter) = run(r#"print "foo" + "bar";"#);
        assert_eq!(result, InterpretResult::Ok);
        assert!(reporter.errors.is_empty());
    }

    #[test]
    fn undefined_global_read_is_runtime_error() {
        let (result, reporter) = run("print x;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert_eq!(reporter.errors.len(), 1);
        assert!(reporter.errors[0].message.contains("Undefined variable"));
    }

    #[test]
    fn assigning_to_undefined_global_does_not_create_it() {
        let (result, reporter) = run("x = 1;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(reporter.errors[0].message.contains("Undefined variable"));

        // the failed assignment must not have left a dangling global behind
        let (result2, reporter2) = run("var x = 2; print x;");
        assert_eq!(result2, InterpretResult::Ok);
        assert!(reporter2.errors.is_empty());
    }

    #[test]
    fn global_persists_across_separate_interpret_calls_on_same_vm() {
        let mut vm = Vm::new();
        let mut reporter = CollectingReporter::new();
        assert_eq!(
            interpret(&mut vm, "var count = 1;", &mut reporter),
            InterpretResult::Ok
        );
        assert_eq!(
            interpret(&mut vm, "print count;", &mut reporter),
            InterpretResult::Ok
        );
        assert!(reporter.errors.is_empty());
    }

    #[test]
    fn division_by_number_types_mismatch_reports_runtime_error() {
        let (result, reporter) = run(r#"print "a" - 1;"#);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(reporter.errors[0].message.contains("numbers"));
    }

    #[test]
    fn compile_error_short_circuits_before_running() {
        let (result, reporter) = run("1 +;");
        assert_eq!(result, InterpretResult::CompileError);
        assert!(!reporter.errors.is_empty());
    }

    #[test]
    fn while_loop_and_control_flow() {
        let (result, reporter) = run(
            "var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } print sum;",
        );
        assert_eq!(result, InterpretResult::Ok);
        assert!(reporter.errors.is_empty());
    }

    #[test]
    fn deeply_nested_addition_overflows_the_stack_not_ub() {
        // A right-nested `1 + (1 + (1 + ...))` holds one operand live per
        // level until the innermost group resolves, so depth grows with
        // nesting instead of collapsing immediately like a flat chain would.
        let mut source = String::from("print ");
        for _ in 0..(STACK_MAX + 10) {
            source.push_str("1 + (");
        }
        source.push('1');
        for _ in 0..(STACK_MAX + 10) {
            source.push(')');
        }
        source.push(';');

        let (result, reporter) = run(&source);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(reporter.errors[0].message.contains("Stack overflow"));
    }

    #[test]
    fn stack_overflow_is_reported_not_ub() {
        // Drives the overflow check directly at the bytecode level, which
        // is a cleaner way to exercise `Vm::push`'s own invariant than
        // crafting a source program that happens to grow the stack.
        let mut chunk = Chunk::new();
        for _ in 0..(STACK_MAX + 1) {
            chunk.write_op(OpCode::Nil, 1);
        }
        chunk.write_op(OpCode::Return, 1);

        let mut vm = Vm::new();
        let mut reporter = CollectingReporter::new();
        let result = vm.run(&chunk, &mut reporter);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(reporter.errors[0].message.contains("Stack overflow"));
    }
}
