//! The stack-based virtual machine (`spec.md` §4.4).

mod call;
mod debug;
mod ops;

pub use debug::{NoopTracer, RecordingTracer, StderrTracer, Tracer};

use std::rc::Rc;

use ahash::AHashMap;

use crate::chunk::OpCode;
use crate::error::{StackFrameInfo, VmError, VmResult};
use crate::function::Function;
use crate::host::{ForeignAllocate, ForeignMethodFn, Host};
use crate::value::{KlassRef, Value};

/// Resource ceilings the VM enforces while executing (the teacher's
/// `ResourceLimits`/`ResourceTracker` equivalent, `SPEC_FULL.md`
/// "Configuration").
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_frames: usize,
    pub max_stack: usize,
}

impl Default for Limits {
    /// `spec.md` §4.4: `frames: CallFrame[≤64]`.
    fn default() -> Limits {
        Limits { max_frames: 64, max_stack: 64 * 255 }
    }
}

pub(crate) struct CallFrame {
    pub function: Rc<Function>,
    pub ip: usize,
    pub stack_base: usize,
}

/// Cached well-known classes, resolved once the core library finishes
/// bootstrapping (`spec.md` §4.4 "Cached pointers").
#[derive(Default)]
struct CoreClasses {
    boolean: Option<KlassRef>,
    number: Option<KlassRef>,
    string: Option<KlassRef>,
    nothing: Option<KlassRef>,
    list: Option<KlassRef>,
    key_value: Option<KlassRef>,
}

pub struct Vm {
    stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: AHashMap<String, Value>,
    /// The API slot array used to pass arguments/results across the foreign
    /// boundary (`spec.md` §4.4, §6 "Slot (API)").
    pub(crate) slots: Vec<Value>,
    classes: CoreClasses,
    pub(crate) nothing: Option<Value>,
    pub(crate) random_instance: Option<Value>,
    limits: Limits,
    host: Box<dyn Host>,
    tracer: Box<dyn Tracer>,
    core_foreign_classes: AHashMap<String, ForeignAllocate>,
    core_foreign_methods: AHashMap<(String, String, bool), ForeignMethodFn>,
    pub(crate) debug_mode: bool,
    stepping: bool,
    should_stop: bool,
    last_stopped_line: i32,
    last_stopped_script_id: i32,
}

impl Vm {
    pub fn new(host: Box<dyn Host>) -> Vm {
        Self::with_limits(host, Limits::default())
    }

    pub fn with_limits(host: Box<dyn Host>, limits: Limits) -> Vm {
        let mut vm = Vm {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(limits.max_frames),
            globals: AHashMap::new(),
            slots: Vec::new(),
            classes: CoreClasses::default(),
            nothing: None,
            random_instance: None,
            limits,
            host,
            tracer: Box::new(NoopTracer),
            core_foreign_classes: AHashMap::new(),
            core_foreign_methods: AHashMap::new(),
            debug_mode: false,
            stepping: false,
            should_stop: false,
            last_stopped_line: -1,
            last_stopped_script_id: -1,
        };
        crate::foreign::register_core(&mut vm);
        vm
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = tracer;
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug_mode = enabled;
    }

    pub fn request_stop(&mut self) {
        self.should_stop = true;
    }

    pub fn host_mut(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    // ---- stack primitives ----

    pub(crate) fn push(&mut self, v: Value) -> VmResult<()> {
        if self.stack.len() >= self.limits.max_stack {
            return Err(self.runtime_error("Stack overflow"));
        }
        self.stack.push(v);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler bug")
    }

    pub(crate) fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    pub(crate) fn popn(&mut self, n: usize) {
        let new_len = self.stack.len() - n;
        self.stack.truncate(new_len);
    }

    pub fn stack_top(&self) -> usize {
        self.stack.len()
    }

    // ---- slot API ----

    pub fn get_slot(&self, i: usize) -> Value {
        self.slots[i].clone()
    }

    pub fn set_return(&mut self, v: Value) {
        *self.stack.last_mut().expect("setReturn with no active call") = v;
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn nothing(&self) -> Value {
        self.nothing.clone().expect("nothing singleton not bootstrapped yet")
    }

    pub fn nothing_class(&self) -> &KlassRef {
        self.classes.nothing.as_ref().expect("Nothing class not bootstrapped yet")
    }

    pub(crate) fn set_core_class(&mut self, name: &str, klass: KlassRef) {
        match name {
            "Boolean" => self.classes.boolean = Some(klass),
            "Number" => self.classes.number = Some(klass),
            "String" => self.classes.string = Some(klass),
            "Nothing" => self.classes.nothing = Some(klass),
            "List" => self.classes.list = Some(klass),
            "KeyValue" => self.classes.key_value = Some(klass),
            _ => {}
        }
    }

    pub(crate) fn register_foreign_class(&mut self, name: &str, allocate: ForeignAllocate) {
        self.core_foreign_classes.insert(name.to_string(), allocate);
    }

    pub(crate) fn register_foreign_method(&mut self, class: &str, signature: &str, is_static: bool, f: ForeignMethodFn) {
        self.core_foreign_methods.insert((class.to_string(), signature.to_string(), is_static), f);
    }

    /// Resolves the native allocator for a `foreign class` declaration
    /// (`spec.md` §4.4 "Foreign binding"), core library first.
    pub(crate) fn bind_foreign_class_callback(&mut self, class_name: &str) -> Option<ForeignAllocate> {
        if let Some(f) = self.core_foreign_classes.get(class_name).cloned() {
            return Some(f);
        }
        self.host.bind_foreign_class(class_name)
    }

    /// Resolves the native body for a `foreignMethod` declaration
    /// (`spec.md` §4.4 "Foreign binding"): the core library's own table
    /// first, then the embedding [`Host`] for anything it adds.
    pub(crate) fn bind_foreign_method_callback(&mut self, class_name: &str, signature: &str, is_static: bool, _arity: usize) -> Option<ForeignMethodFn> {
        if let Some(f) = self.core_foreign_methods.remove(&(class_name.to_string(), signature.to_string(), is_static)) {
            return Some(f);
        }
        self.host.bind_foreign_method(class_name, signature, is_static)
    }

    pub fn class_of(&self, v: &Value) -> KlassRef {
        match v {
            Value::Boolean(_) => self.classes.boolean.clone().expect("bootstrap"),
            Value::Number(_) => self.classes.number.clone().expect("bootstrap"),
            Value::String(_) => self.classes.string.clone().expect("bootstrap"),
            Value::Instance(i) => i.klass.clone(),
            Value::Class(c) => c.clone(),
            Value::Function(_) | Value::ForeignMethod(_) | Value::BoundMethod(_) => self.classes.number.clone().expect("bootstrap"),
        }
    }

    pub fn new_list(&mut self, items: Vec<Value>) -> VmResult<Value> {
        let klass = self.classes.list.clone().expect("List class not bootstrapped yet");
        let inst = Rc::new(crate::instance::Instance::new(klass, self.nothing.as_ref()));
        inst.set_foreign::<Vec<Value>>(items);
        Ok(Value::Instance(inst))
    }

    /// `Map` has no cached class pointer (`spec.md` §4.4 only names
    /// `listClass`/`keyValueClass` among the container types), so a literal
    /// looks it up by name among the globals like any other class value.
    pub(crate) fn new_map(&mut self, kv_pairs: Vec<Value>) -> VmResult<Value> {
        let klass = match self.globals.get("Map").cloned() {
            Some(Value::Class(k)) => k,
            _ => return Err(self.runtime_error("Map class not bootstrapped yet.")),
        };
        let inst = Rc::new(crate::instance::Instance::new(klass, self.nothing.as_ref()));
        let mut map: indexmap::IndexMap<Value, Value> = indexmap::IndexMap::new();
        let mut it = kv_pairs.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            map.insert(k, v);
        }
        inst.set_foreign(map);
        Ok(Value::Instance(inst))
    }

    pub(crate) fn new_key_value(&mut self, key: Value, value: Value) -> VmResult<Value> {
        let klass = self.classes.key_value.clone().expect("KeyValue class not bootstrapped yet");
        let inst = Rc::new(crate::instance::Instance::new(klass, self.nothing.as_ref()));
        inst.set_foreign((key, value));
        Ok(Value::Instance(inst))
    }

    // ---- top-level entry point ----

    /// `interpret(topLevelFunction)` (`spec.md` §6): resets, pushes the
    /// function, calls it with 0 args, runs to completion.
    pub fn interpret(&mut self, top_level: Rc<Function>) -> VmResult<()> {
        self.stack.clear();
        self.frames.clear();
        self.push(Value::Function(top_level.clone()))?;
        self.call_function(top_level, 0)?;
        let result = self.run(false);
        if result.is_ok() {
            self.host.finished();
        }
        result
    }

    pub fn runtime_error(&mut self, message: impl Into<String>) -> VmError {
        let message = message.into();
        let (line, script_id) = self
            .frames
            .last()
            .map(|f| (f.function.chunk.line_for_offset(f.ip.saturating_sub(1)), f.function.chunk.script_id_for_offset(f.ip.saturating_sub(1))))
            .unwrap_or((-1, -1));
        let stack_trace: Vec<StackFrameInfo> = self
            .frames
            .iter()
            .rev()
            .map(|f| StackFrameInfo {
                function_name: f.function.name.clone(),
                line: f.function.chunk.line_for_offset(f.ip.saturating_sub(1)),
                script_id: f.function.chunk.script_id_for_offset(f.ip.saturating_sub(1)),
            })
            .collect();
        let stack_dump = self.stack.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(", ");
        VmError { line, script_id, message, stack_dump, stack_trace }
    }

    /// `run(stepping)` (`spec.md` §6): the main dispatch loop.
    pub fn run(&mut self, stepping: bool) -> VmResult<()> {
        self.stepping = stepping;
        self.should_stop = false;
        let base_frame_depth = self.frames.len() - 1;

        loop {
            if self.frames.len() <= base_frame_depth {
                return Ok(());
            }

            if self.debug_mode && self.stepping {
                if self.should_stop {
                    let (sid, line) = self.current_location();
                    self.host.will_stop(sid, line);
                    return Ok(());
                }
                if self.is_stoppable_here() {
                    let (sid, line) = self.current_location();
                    if (sid, line) != (self.last_stopped_script_id, self.last_stopped_line) {
                        self.last_stopped_script_id = sid;
                        self.last_stopped_line = line;
                        self.host.will_stop(sid, line);
                        return Ok(());
                    }
                }
            }

            let byte = self.fetch_byte();
            let op = match OpCode::from_byte(byte) {
                Some(op) => op,
                None => return Err(self.runtime_error(format!("Corrupt bytecode: unknown opcode {byte}"))),
            };
            self.tracer.on_instruction(self.frames.len(), op);

            if let Err(e) = self.execute(op) {
                self.tracer.on_error(&e);
                return Err(e);
            }

            if self.frames.len() <= base_frame_depth {
                return Ok(());
            }
        }
    }

    fn current_location(&self) -> (i32, i32) {
        let f = self.frames.last().unwrap();
        (f.function.chunk.script_id_for_offset(f.ip), f.function.chunk.line_for_offset(f.ip))
    }

    pub(crate) fn fetch_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().unwrap();
        let b = frame.function.chunk.read_u8(frame.ip);
        frame.ip += 1;
        b
    }

    pub(crate) fn fetch_u16(&mut self) -> u16 {
        let frame = self.frames.last_mut().unwrap();
        let v = frame.function.chunk.read_u16(frame.ip);
        frame.ip += 2;
        v
    }

    pub(crate) fn current_chunk_constant(&self, index: usize) -> Value {
        self.frames.last().unwrap().function.chunk.constants.get(index).cloned().expect("compiler bug: bad constant index")
    }

    /// Runs instructions until the frame stack unwinds back to
    /// `target_depth`, used by foreign methods that need a user-overridden
    /// method's result synchronously (`spec.md` §6 "Foreign binding").
    fn run_until(&mut self, target_depth: usize) -> VmResult<()> {
        loop {
            if self.frames.len() <= target_depth {
                return Ok(());
            }
            let byte = self.fetch_byte();
            let op = match OpCode::from_byte(byte) {
                Some(op) => op,
                None => return Err(self.runtime_error(format!("Corrupt bytecode: unknown opcode {byte}"))),
            };
            self.execute(op)?;
        }
    }

    /// Dispatches `signature` on `receiver` and, if it resolves to a
    /// compiled `Function`, pumps the dispatch loop until that call (and
    /// anything it calls) returns, so a foreign method can call back into
    /// potentially user-overridden Objo code and get the result inline.
    pub(crate) fn invoke_and_run(&mut self, receiver: Value, signature: &str, args: Vec<Value>) -> VmResult<Value> {
        let arg_count = args.len();
        self.push(receiver)?;
        for a in args {
            self.push(a)?;
        }
        let depth_before = self.frames.len();
        self.invoke(signature, arg_count)?;
        if self.frames.len() > depth_before {
            self.run_until(depth_before)?;
        }
        Ok(self.pop())
    }

    /// `toString()` on any value, following user overrides.
    pub(crate) fn stringify(&mut self, v: &Value) -> VmResult<String> {
        match self.invoke_and_run(v.clone(), "toString()", Vec::new())? {
            Value::String(s) => Ok(s.to_string()),
            other => Ok(format!("{other:?}")),
        }
    }
}

