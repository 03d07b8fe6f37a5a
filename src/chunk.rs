//! Bytecode chunks, the opcode table and the deduplicated constant pool
//! (`spec.md` §3 "Chunk"/"ConstantTable", §4.4 opcode table).

use indexmap::IndexSet;

use crate::value::Value;

/// One instruction. Operand widths are fixed per variant; short/long pairs
/// differ only in whether the trailing operand is `u8` or big-endian `u16`
/// (`spec.md` §4.3 "Opcode width choice").
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    ConstantLong,
    Nothing,
    True_,
    False_,
    Load0,
    Load1,
    Load2,
    LoadMinus1,
    LoadMinus2,
    Pop,
    PopN,
    Swap,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add1,
    Subtract1,
    Negate,
    Not,
    BitwiseNot,
    Is_,
    RangeExclusive,
    RangeInclusive,
    GetLocal,
    SetLocal,
    GetGlobal,
    GetGlobalLong,
    SetGlobal,
    SetGlobalLong,
    DefineGlobal,
    DefineGlobalLong,
    GetField,
    SetField,
    GetStaticField,
    GetStaticFieldLong,
    SetStaticField,
    SetStaticFieldLong,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Loop,
    Call,
    Invoke,
    InvokeLong,
    SuperConstructor,
    SuperInvoke,
    SuperSetter,
    Class_,
    Inherit,
    Method,
    ForeignMethod,
    Constructor,
    List,
    Map,
    KeyValue,
    Return_,
    Assert,
    Breakpoint,
    Exit,
    LocalVarDeclaration,
    DebugFieldName,
    GetLocalClass,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        use OpCode::*;
        const TABLE: &[OpCode] = &[
            Constant, ConstantLong, Nothing, True_, False_, Load0, Load1, Load2, LoadMinus1, LoadMinus2, Pop, PopN, Swap, Add, Subtract, Multiply, Divide, Modulo, BitwiseAnd, BitwiseOr,
            BitwiseXor, ShiftLeft, ShiftRight, Equal, NotEqual, Less, LessEqual, Greater, GreaterEqual, Add1, Subtract1, Negate, Not, BitwiseNot, Is_, RangeExclusive, RangeInclusive, GetLocal,
            SetLocal, GetGlobal, GetGlobalLong, SetGlobal, SetGlobalLong, DefineGlobal, DefineGlobalLong, GetField, SetField, GetStaticField, GetStaticFieldLong, SetStaticField,
            SetStaticFieldLong, Jump, JumpIfFalse, JumpIfTrue, Loop, Call, Invoke, InvokeLong, SuperConstructor, SuperInvoke, SuperSetter, Class_, Inherit, Method, ForeignMethod, Constructor,
            List, Map, KeyValue, Return_, Assert, Breakpoint, Exit, LocalVarDeclaration, DebugFieldName, GetLocalClass,
        ];
        TABLE.get(byte as usize).copied()
    }
}

/// Ordered, deduplicated `Value` pool (`spec.md` §3 "ConstantTable"). Backed
/// by `IndexSet` so `add` is O(1) amortised and index order is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantTable {
    values: IndexSet<ConstEntry>,
}

/// `Value` doesn't implement `Hash`/`Eq` transitively through `f64`'s lack of
/// `Eq`; `Value` provides both explicitly (`spec.md` §3: "Value must be
/// hashable"), so this wrapper only exists to give `IndexSet` a named type.
#[derive(Debug, Clone)]
struct ConstEntry(Value);

impl PartialEq for ConstEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ConstEntry {}
impl std::hash::Hash for ConstEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

pub const MAX_CONSTANTS: usize = 65534;

impl ConstantTable {
    pub fn new() -> ConstantTable {
        ConstantTable { values: IndexSet::new() }
    }

    /// Returns the index of `v`, inserting it if it isn't already present.
    /// `Err` when the table is full (`spec.md` §3: max index 65534).
    pub fn add(&mut self, v: Value) -> Result<usize, ()> {
        if let Some(idx) = self.values.get_index_of(&ConstEntry(v.clone())) {
            return Ok(idx);
        }
        if self.values.len() >= MAX_CONSTANTS {
            return Err(());
        }
        let (idx, _) = self.values.insert_full(ConstEntry(v));
        Ok(idx)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get_index(index).map(|e| &e.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `spec.md` §3 "Chunk": `len(code) == len(lines) == len(scriptIds)`, one
/// entry per byte including operand bytes.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: ConstantTable,
    pub lines: Vec<i32>,
    pub script_ids: Vec<i32>,
    pub is_debug: bool,
}

impl Chunk {
    pub fn new(is_debug: bool) -> Chunk {
        Chunk { code: Vec::new(), constants: ConstantTable::new(), lines: Vec::new(), script_ids: Vec::new(), is_debug }
    }

    pub fn write_u8(&mut self, byte: u8, line: i32, script_id: i32) {
        self.code.push(byte);
        self.lines.push(line);
        self.script_ids.push(script_id);
    }

    pub fn write_op(&mut self, op: OpCode, line: i32, script_id: i32) {
        self.write_u8(op as u8, line, script_id);
    }

    pub fn write_u16(&mut self, value: u16, line: i32, script_id: i32) {
        self.write_u8((value >> 8) as u8, line, script_id);
        self.write_u8((value & 0xff) as u8, line, script_id);
    }

    /// Emits the `constant`/`constantLong` pair based on the pool index
    /// width, the pattern reused by every opcode that indexes the constant
    /// pool or a name/signature stored there.
    pub fn write_indexed(&mut self, short: OpCode, long: OpCode, index: usize, line: i32, script_id: i32) {
        if index <= u8::MAX as usize {
            self.write_op(short, line, script_id);
            self.write_u8(index as u8, line, script_id);
        } else {
            self.write_op(long, line, script_id);
            self.write_u16(index as u16, line, script_id);
        }
    }

    /// Patches a previously emitted 2-byte jump operand at `offset` with the
    /// distance from just after the operand to the current end of `code`.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ()> {
        let jump = self.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return Err(());
        }
        self.code[offset] = (jump >> 8) as u8;
        self.code[offset + 1] = (jump & 0xff) as u8;
        Ok(())
    }

    pub fn line_for_offset(&self, offset: usize) -> i32 {
        self.lines.get(offset).copied().unwrap_or(-1)
    }

    pub fn script_id_for_offset(&self, offset: usize) -> i32 {
        self.script_ids.get(offset).copied().unwrap_or(-1)
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        self.code[offset]
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        ((self.code[offset] as u16) << 8) | self.code[offset + 1] as u16
    }
}
