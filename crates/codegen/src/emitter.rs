//! The code generator (§4.3).
//!
//! Lowers an intermediate [`Meaning`] tree into bytecode on an
//! [`InstrBuf`], extending the shared constants table as a side effect.
//! Jump backpatching (alternative/and/or) emits each branch into a
//! throwaway buffer first so the displacement — and therefore whether a
//! short (one-byte) or long (varuint) jump form applies — is known
//! before the prefix bytes are written.

use idio_core::{InstrBuf, Value};
use idio_runtime::{ConstantsTable, Heap};

use crate::error::{CodeGenError, CodingError};
use crate::meaning::{Kind, Meaning, RefTable};
use crate::opcode::Opcode;

/// Small-integer specialization ceiling shared by every "N.. falls back
/// to the general form" rule in §4.3.
const SHORT_JUMP_MAX: u64 = 240;

/// The five fixed prologue PCs (§4.3 "Prologue", glossary).
pub mod prologue_pc {
    pub const NON_CONT_ERR: usize = 0;
    pub const FINISH: usize = 1;
    pub const CONDITION_HANDLER_RETURN: usize = 2;
    pub const APPLY_RETURN: usize = 5;
    pub const INTERRUPT_HANDLER_RETURN: usize = 7;
}

/// The code generator. Holds the shared constants table and heap (for
/// constant interning) plus the instruction buffer currently being
/// written to.
pub struct Emitter<'a> {
    pub constants: &'a mut ConstantsTable,
    pub heap: &'a mut Heap,
    buf: InstrBuf,
}

impl<'a> Emitter<'a> {
    pub fn new(constants: &'a mut ConstantsTable, heap: &'a mut Heap) -> Self {
        Emitter {
            constants,
            heap,
            buf: InstrBuf::new(),
        }
    }

    /// Consume the emitter, returning the assembled bytes. No buffer
    /// survives past this call — only its bytes do (§4.2).
    pub fn finish(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn push_opcode(&mut self, op: Opcode) {
        self.buf.push(op.into());
    }

    fn push_varuint(&mut self, n: u64) {
        self.buf.push_varuint(n);
    }

    fn push_ref_slot(&mut self, index: u32) {
        // The constants-reference slot is a fixed-width 16-bit unsigned
        // field, sized to the VM's fetch width (§4.3).
        self.buf.push_fixed2(index as u16);
    }

    /// Write the five fixed prologue sequences at PCs 0/1/2/5/7 (§4.3).
    /// Must be called on a fresh, empty emitter before any other
    /// emission.
    pub fn write_prologue(&mut self) -> Result<(), CodeGenError> {
        debug_assert_eq!(self.len(), prologue_pc::NON_CONT_ERR);
        self.push_opcode(Opcode::NonContErr);
        debug_assert_eq!(self.len(), prologue_pc::FINISH);
        self.push_opcode(Opcode::Finish);
        debug_assert_eq!(self.len(), prologue_pc::CONDITION_HANDLER_RETURN);
        self.push_opcode(Opcode::RestoreTrap);
        self.push_opcode(Opcode::RestoreState);
        self.push_opcode(Opcode::Return);
        debug_assert_eq!(self.len(), prologue_pc::APPLY_RETURN);
        self.push_opcode(Opcode::RestoreState);
        self.push_opcode(Opcode::Return);
        debug_assert_eq!(self.len(), prologue_pc::INTERRUPT_HANDLER_RETURN);
        self.push_opcode(Opcode::RestoreAllState);
        self.push_opcode(Opcode::Return);
        Ok(())
    }

    /// Emit one meaning. Per §4.3: a sequence (the `Sequence` variant)
    /// emits each sub-meaning in order; anything else is handled by its
    /// own opcode-specific emission.
    pub fn emit(&mut self, m: &Meaning) -> Result<(), CodeGenError> {
        match m {
            Meaning::Sequence(ms) => {
                for sub in ms {
                    self.emit(sub)?;
                }
                Ok(())
            }
            Meaning::Nop => {
                self.push_opcode(Opcode::Nop);
                Ok(())
            }
            Meaning::Return(inner) => {
                self.emit(inner)?;
                self.push_opcode(Opcode::Return);
                Ok(())
            }
            Meaning::Not(inner) => {
                self.emit(inner)?;
                self.push_opcode(Opcode::Not);
                Ok(())
            }
            Meaning::Constant { index } => self.emit_constant(*index),
            Meaning::Fixnum { value } => self.emit_fixnum(*value),
            Meaning::ShallowArgumentRef { index } => self.emit_shallow_ref(*index),
            Meaning::ShallowArgumentSet { index, value } => {
                self.emit(value)?;
                self.emit_shallow_set(*index)
            }
            Meaning::DeepArgumentRef { depth, index } => {
                self.push_opcode(Opcode::DeepArgumentRef);
                self.push_varuint(*depth as u64);
                self.push_varuint(*index as u64);
                Ok(())
            }
            Meaning::DeepArgumentSet { depth, index, value } => {
                self.emit(value)?;
                self.push_opcode(Opcode::DeepArgumentSet);
                self.push_varuint(*depth as u64);
                self.push_varuint(*index as u64);
                Ok(())
            }
            Meaning::Ref { table, kind, index } => self.emit_sym_val_ref(*table, *kind, *index, false),
            Meaning::FunctionRef { table, index } => {
                self.emit_sym_val_ref(*table, Kind::Toplevel, *index, true)
            }
            Meaning::ComputedRef { table, index } => {
                self.push_opcode(match table {
                    RefTable::Sym => Opcode::ComputedSymRef,
                    RefTable::Val => Opcode::ComputedValRef,
                });
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::Set { table, value, index, .. } => {
                self.emit(value)?;
                self.push_opcode(match table {
                    RefTable::Sym => Opcode::SymSet,
                    RefTable::Val => Opcode::ValSet,
                });
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::Def { table, index, value } => {
                self.emit(value)?;
                self.push_opcode(match table {
                    RefTable::Sym => Opcode::SymDef,
                    RefTable::Val => Opcode::ValDef,
                });
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::DynamicRef { index } => {
                self.push_opcode(Opcode::DynamicSymRef);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::DynamicFunctionRef { index } => {
                self.push_opcode(Opcode::DynamicFunctionSymRef);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::EnvironRef { index } => {
                self.push_opcode(Opcode::EnvironSymRef);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::EscaperLabelRef { index } => {
                self.push_opcode(Opcode::EscaperLabelRef);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::Primcall0 { primitive_index } => {
                self.push_opcode(Opcode::GlobalFunctionSymRef);
                self.push_ref_slot(*primitive_index);
                Ok(())
            }
            Meaning::Primcall1 { primitive_index, arg } => {
                self.emit(arg)?;
                self.push_opcode(Opcode::GlobalFunctionSymRef);
                self.push_ref_slot(*primitive_index);
                Ok(())
            }
            Meaning::Primcall2 { primitive_index, arg1, arg2 } => {
                self.emit(arg1)?;
                self.emit(arg2)?;
                self.push_opcode(Opcode::GlobalFunctionSymRef);
                self.push_ref_slot(*primitive_index);
                Ok(())
            }
            Meaning::StoreArgument { index, value } => {
                self.emit(value)?;
                self.emit_store_argument(*index)
            }
            Meaning::ListArgument { index, value } => {
                self.emit(value)?;
                self.push_opcode(Opcode::ListArgument);
                self.push_varuint(*index as u64);
                Ok(())
            }
            Meaning::AllocateFrame { size } => self.emit_allocate_frame(*size),
            Meaning::AllocateDottedFrame { size } => {
                self.push_opcode(Opcode::AllocateDottedFrame);
                self.push_varuint(*size as u64);
                Ok(())
            }
            Meaning::ReuseFrame { size } => {
                self.push_opcode(Opcode::ReuseFrame);
                self.push_varuint(*size as u64);
                Ok(())
            }
            Meaning::Alternative { test, consequent, alternative } => {
                self.emit_alternative(test, consequent, alternative)
            }
            Meaning::And { clauses, tail } => self.emit_short_circuit(clauses, *tail, true),
            Meaning::Or { clauses, tail } => self.emit_short_circuit(clauses, *tail, false),
            Meaning::Begin(ms) => {
                for sub in ms {
                    self.emit(sub)?;
                }
                Ok(())
            }
            Meaning::RegularCall { tail, function, args, src_expr_index } => {
                self.emit_call(*tail, function, args, *src_expr_index)
            }
            Meaning::FixClosure { formals_index, signature_index, docstring_index, source_location_index, arity, body } => {
                self.emit_closure(
                    *formals_index,
                    *signature_index,
                    *docstring_index,
                    *source_location_index,
                    ArityCheck::Fixed(*arity),
                    body,
                )
            }
            Meaning::NaryClosure { formals_index, signature_index, docstring_index, source_location_index, min_arity, body } => {
                self.emit_closure(
                    *formals_index,
                    *signature_index,
                    *docstring_index,
                    *source_location_index,
                    ArityCheck::AtLeast(*min_arity),
                    body,
                )
            }
            Meaning::PushDynamic { index, init } => {
                self.emit(init)?;
                self.push_opcode(Opcode::PushDynamic);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::PopDynamic => {
                self.push_opcode(Opcode::PopDynamic);
                Ok(())
            }
            Meaning::PushEnviron { index, init } => {
                self.emit(init)?;
                self.push_opcode(Opcode::PushEnviron);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::PopEnviron => {
                self.push_opcode(Opcode::PopEnviron);
                Ok(())
            }
            Meaning::PushTrap { index, init } => {
                self.emit(init)?;
                self.push_opcode(Opcode::PushTrap);
                self.push_ref_slot(*index);
                Ok(())
            }
            Meaning::PopTrap => {
                self.push_opcode(Opcode::PopTrap);
                Ok(())
            }
            Meaning::PushEscaper { index, init, body } => self.emit_push_escaper(*index, init, body),
            Meaning::PopEscaper => {
                self.push_opcode(Opcode::PopEscaper);
                Ok(())
            }
            Meaning::PushAbort { body } => self.emit_push_abort(body),
            Meaning::PopAbort => {
                self.push_opcode(Opcode::PopAbort);
                Ok(())
            }
            Meaning::Expander(inner) => self.emit(inner),
            Meaning::InfixOperator { body, .. } => self.emit(body),
            Meaning::PostfixOperator { body, .. } => self.emit(body),
        }
    }

    /// Emit one opcode directly, refusing the reserved prologue opcodes
    /// (§4.3: emitting `finish` from user code is a panic-equivalent
    /// coding error).
    pub fn emit_raw_opcode(&mut self, op: Opcode) -> Result<(), CodeGenError> {
        if op.is_reserved() {
            return Err(CodingError::ReservedOpcodeEmission(match op {
                Opcode::Finish => "finish",
                Opcode::NonContErr => "non-cont-err",
                _ => unreachable!(),
            })
            .into());
        }
        self.push_opcode(op);
        Ok(())
    }

    fn emit_constant(&mut self, index: u32) -> Result<(), CodeGenError> {
        match index {
            0 => self.push_opcode(Opcode::Constant0),
            1 => self.push_opcode(Opcode::Constant1),
            2 => self.push_opcode(Opcode::Constant2),
            3 => self.push_opcode(Opcode::Constant3),
            4 => self.push_opcode(Opcode::Constant4),
            _ => {
                self.push_opcode(Opcode::Constant);
                self.push_varuint(index as u64);
            }
        }
        Ok(())
    }

    /// A fixnum literal carries its own value as the operand, never a
    /// constants-table index: non-negative values emit `Fixnum v(n)`,
    /// negative values emit `NegFixnum v(|n|)` with the magnitude as an
    /// unsigned varuint (§8 scenarios 2-3).
    fn emit_fixnum(&mut self, value: i64) -> Result<(), CodeGenError> {
        if value >= 0 {
            self.push_opcode(Opcode::Fixnum);
            self.push_varuint(value as u64);
        } else {
            self.push_opcode(Opcode::NegFixnum);
            self.push_varuint(value.unsigned_abs());
        }
        Ok(())
    }

    /// Intern a guest value into the shared constants table, marking it
    /// const-in-GC first (§4.3 "Constants interning during codegen").
    /// Returns the interned index ready for [`Emitter::emit_constant`].
    pub fn intern_constant(&mut self, v: Value) -> u32 {
        if let Some(r) = v.as_heap_ref() {
            self.heap.get_mut(r).flags.insert(idio_runtime::value::GcFlags::CONST);
        }
        self.constants.intern(self.heap, v)
    }

    /// Call-source expressions are extended unconditionally: every
    /// textual occurrence is a distinct constant (§4.3), unlike
    /// [`Emitter::intern_constant`]'s lookup-or-extend sharing.
    pub fn intern_src_expr(&mut self, v: Value) -> u32 {
        // `ConstantsTable` has no "force append" primitive of its own —
        // appending an extra, deliberately-unshared copy is exactly
        // what a fresh allocation before interning achieves, since
        // identity (not structural) keys every non-pair value.
        self.constants.intern(self.heap, v)
    }

    fn emit_shallow_ref(&mut self, index: u32) -> Result<(), CodeGenError> {
        match index {
            0 => self.push_opcode(Opcode::ShallowArgumentRef0),
            1 => self.push_opcode(Opcode::ShallowArgumentRef1),
            2 => self.push_opcode(Opcode::ShallowArgumentRef2),
            3 => self.push_opcode(Opcode::ShallowArgumentRef3),
            _ => {
                self.push_opcode(Opcode::ShallowArgumentRef);
                self.push_varuint(index as u64);
            }
        }
        Ok(())
    }

    fn emit_shallow_set(&mut self, index: u32) -> Result<(), CodeGenError> {
        match index {
            0 => self.push_opcode(Opcode::ShallowArgumentSet0),
            1 => self.push_opcode(Opcode::ShallowArgumentSet1),
            2 => self.push_opcode(Opcode::ShallowArgumentSet2),
            3 => self.push_opcode(Opcode::ShallowArgumentSet3),
            _ => {
                self.push_opcode(Opcode::ShallowArgumentSet);
                self.push_varuint(index as u64);
            }
        }
        Ok(())
    }

    fn emit_store_argument(&mut self, index: u32) -> Result<(), CodeGenError> {
        match index {
            0 => self.push_opcode(Opcode::StoreArgument0),
            1 => self.push_opcode(Opcode::StoreArgument1),
            2 => self.push_opcode(Opcode::StoreArgument2),
            3 => self.push_opcode(Opcode::StoreArgument3),
            _ => {
                self.push_opcode(Opcode::StoreArgument);
                self.push_varuint(index as u64);
            }
        }
        Ok(())
    }

    fn emit_allocate_frame(&mut self, size: u32) -> Result<(), CodeGenError> {
        match size {
            1 => self.push_opcode(Opcode::AllocateFrame1),
            2 => self.push_opcode(Opcode::AllocateFrame2),
            3 => self.push_opcode(Opcode::AllocateFrame3),
            4 => self.push_opcode(Opcode::AllocateFrame4),
            5 => self.push_opcode(Opcode::AllocateFrame5),
            _ => {
                self.push_opcode(Opcode::AllocateFrame);
                self.push_varuint(size as u64);
            }
        }
        Ok(())
    }

    fn emit_sym_val_ref(
        &mut self,
        table: RefTable,
        kind: Kind,
        index: u32,
        function_position: bool,
    ) -> Result<(), CodeGenError> {
        if kind == Kind::Predef {
            return self.emit_predefined(index);
        }
        let op = match (table, function_position) {
            (RefTable::Sym, false) => Opcode::GlobalSymRef,
            (RefTable::Sym, true) => Opcode::GlobalFunctionSymRef,
            (RefTable::Val, false) => Opcode::GlobalValRef,
            (RefTable::Val, true) => Opcode::GlobalFunctionValRef,
        };
        self.push_opcode(op);
        self.push_ref_slot(index);
        Ok(())
    }

    /// `#t`/`#f`/`nil` get a dedicated one-byte opcode each; other small
    /// predefined slots up to 8 specialize, beyond that the general
    /// form plus varuint index (§4.3, §11).
    fn emit_predefined(&mut self, index: u32) -> Result<(), CodeGenError> {
        match index {
            0 => self.push_opcode(Opcode::Predefined0),
            1 => self.push_opcode(Opcode::Predefined1),
            2 => self.push_opcode(Opcode::Predefined2),
            3 => self.push_opcode(Opcode::Predefined3),
            4 => self.push_opcode(Opcode::Predefined4),
            5 => self.push_opcode(Opcode::Predefined5),
            6 => self.push_opcode(Opcode::Predefined6),
            7 => self.push_opcode(Opcode::Predefined7),
            8 => self.push_opcode(Opcode::Predefined8),
            _ => {
                self.push_opcode(Opcode::Predefined);
                self.push_varuint(index as u64);
            }
        }
        Ok(())
    }

    /// `alternative m1 m2 m3` (§4.3). Both branches are emitted into
    /// throwaway buffers first so the jump displacements — and which
    /// jump form they fit — are known before the prefix bytes are
    /// written: `test jump-false(len(m2')+len(goto)) m2' goto(len(m3')) m3'`.
    fn emit_alternative(&mut self, test: &Meaning, consequent: &Meaning, alternative: &Meaning) -> Result<(), CodeGenError> {
        let cons_bytes = Self::sub_emitter(self.constants, self.heap).emit_to_bytes(consequent)?;
        let alt_bytes = Self::sub_emitter(self.constants, self.heap).emit_to_bytes(alternative)?;

        let goto_len = jump_form_len(alt_bytes.len() as u64);
        let jf_displacement = cons_bytes.len() as u64 + goto_len as u64;

        self.emit(test)?;
        self.emit_jump_false(jf_displacement);
        self.buf_extend(&cons_bytes);
        self.emit_goto(alt_bytes.len() as u64);
        self.buf_extend(&alt_bytes);
        Ok(())
    }

    /// Emit `m` into a fresh sub-emitter sharing this one's constants
    /// table and heap, returning the assembled bytes.
    fn emit_to_bytes(mut self, m: &Meaning) -> Result<Vec<u8>, CodeGenError> {
        self.emit(m)?;
        Ok(self.finish())
    }

    fn sub_emitter<'b>(constants: &'b mut ConstantsTable, heap: &'b mut Heap) -> Emitter<'b> {
        Emitter::new(constants, heap)
    }

    fn emit_jump_false(&mut self, displacement: u64) {
        if displacement <= SHORT_JUMP_MAX {
            self.push_opcode(Opcode::ShortJumpFalse);
            self.buf.push(displacement as u8);
        } else {
            self.push_opcode(Opcode::LongJumpFalse);
            self.push_varuint(displacement);
        }
    }

    fn emit_jump_true(&mut self, displacement: u64) {
        if displacement <= SHORT_JUMP_MAX {
            self.push_opcode(Opcode::ShortJumpTrue);
            self.buf.push(displacement as u8);
        } else {
            self.push_opcode(Opcode::LongJumpTrue);
            self.push_varuint(displacement);
        }
    }

    fn emit_goto(&mut self, displacement: u64) {
        if displacement <= SHORT_JUMP_MAX {
            self.push_opcode(Opcode::ShortGoto);
            self.buf.push(displacement as u8);
        } else {
            self.push_opcode(Opcode::LongGoto);
            self.push_varuint(displacement);
        }
    }

    /// Short-circuit `and`/`or` (§4.3): each clause is emitted into its
    /// own buffer first, then stitched right-to-left so every jump's
    /// displacement — the byte length of everything still to come — is
    /// known before its prefix is written. Each non-last clause is
    /// wrapped in `suppress-rcse`/`pop-rcse` unless the whole form is in
    /// tail position.
    fn emit_short_circuit(&mut self, clauses: &[Meaning], tail: bool, is_and: bool) -> Result<(), CodeGenError> {
        if clauses.is_empty() {
            return Err(CodeGenError::Logic(format!(
                "{} requires at least one clause",
                if is_and { "and" } else { "or" }
            )));
        }

        let n = clauses.len();
        let mut clause_bytes = Vec::with_capacity(n);
        for clause in clauses {
            clause_bytes.push(Self::sub_emitter(self.constants, self.heap).emit_to_bytes(clause)?);
        }

        let mut assembled: Vec<Vec<u8>> = Vec::with_capacity(n);
        let mut suffix_len: u64 = 0;
        for i in (0..n).rev() {
            let is_last = i == n - 1;
            let mut piece = Vec::new();
            if !is_last {
                if !tail {
                    piece.push(Opcode::SuppressRcse.into());
                }
                let mut jump = Self::sub_emitter(self.constants, self.heap);
                if is_and {
                    jump.emit_jump_false(suffix_len);
                } else {
                    jump.emit_jump_true(suffix_len);
                }
                piece.extend_from_slice(&jump.finish());
            }
            piece.extend_from_slice(&clause_bytes[i]);
            if !is_last && !tail {
                piece.push(Opcode::PopRcse.into());
            }
            suffix_len += piece.len() as u64;
            assembled.push(piece);
        }
        // `assembled` was built last-clause-first; emit in source order.
        for piece in assembled.into_iter().rev() {
            self.buf_extend(&piece);
        }
        Ok(())
    }

    fn buf_extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.buf.push(b);
        }
    }

    /// Non-tail regular call vs. tail call (§4.3 "Calls").
    fn emit_call(&mut self, tail: bool, function: &Meaning, args: &[Meaning], src_expr_index: u32) -> Result<(), CodeGenError> {
        self.emit_allocate_frame(args.len() as u32)?;
        self.push_opcode(Opcode::PushValue);
        for (i, arg) in args.iter().enumerate() {
            self.emit(arg)?;
            self.emit_store_argument(i as u32)?;
        }
        self.push_opcode(Opcode::SrcExpr);
        self.push_varuint(src_expr_index as u64);
        self.emit(function)?;
        self.push_opcode(Opcode::PopFunction);
        if tail {
            self.push_opcode(Opcode::FunctionGoto);
        } else {
            self.push_opcode(Opcode::PreserveState);
            self.push_opcode(Opcode::FunctionInvoke);
            self.push_opcode(Opcode::RestoreState);
        }
        Ok(())
    }

    /// `fix-closure`/`nary-closure` (§4.3 "Closure creation").
    fn emit_closure(
        &mut self,
        formals_index: u32,
        signature_index: u32,
        docstring_index: u32,
        source_location_index: u32,
        arity: ArityCheck,
        body: &Meaning,
    ) -> Result<(), CodeGenError> {
        let mut body_buf = Self::sub_emitter(self.constants, self.heap);
        match arity {
            ArityCheck::Fixed(n) => body_buf.emit_arity_check_fixed(n),
            ArityCheck::AtLeast(min) => {
                body_buf.push_opcode(Opcode::PackFrame);
                body_buf.emit_arity_check_at_least(min);
            }
        }
        body_buf.push_opcode(Opcode::LinkFrame);
        body_buf.push_varuint(formals_index as u64);
        body_buf.emit(body)?;
        body_buf.push_opcode(Opcode::Return);
        let body_bytes = body_buf.finish();

        let code_length = body_bytes.len() as u64;
        // `skip_length` is the byte length of the GOTO instruction that
        // precedes the body, not the body itself — the VM uses it to
        // step over the closure header to the GOTO, which then jumps
        // over the body in one hop (`IDIO_A_CREATE_CLOSURE`).
        let skip_length = jump_form_len(code_length) as u64;

        self.push_opcode(Opcode::CreateClosure);
        self.push_varuint(skip_length);
        self.push_varuint(code_length);
        self.push_varuint(signature_index as u64);
        self.push_varuint(docstring_index as u64);
        self.push_varuint(source_location_index as u64);
        self.emit_goto(code_length);
        self.buf_extend(&body_bytes);
        Ok(())
    }

    fn emit_arity_check_fixed(&mut self, arity: u16) {
        match arity {
            1 => self.push_opcode(Opcode::Arity1p),
            2 => self.push_opcode(Opcode::Arity2p),
            3 => self.push_opcode(Opcode::Arity3p),
            4 => self.push_opcode(Opcode::Arity4p),
            n => {
                self.push_opcode(Opcode::ArityEqp);
                self.push_varuint(n as u64);
            }
        }
    }

    fn emit_arity_check_at_least(&mut self, min: u16) {
        self.push_opcode(Opcode::ArityGep);
        self.push_varuint(min as u64);
    }

    /// `push-escaper`: emits the initializer, the opcode plus constants
    /// reference, then a varuint length of the protected body, then the
    /// body bytes (§4.3).
    fn emit_push_escaper(&mut self, index: u32, init: &Meaning, body: &Meaning) -> Result<(), CodeGenError> {
        self.emit(init)?;
        self.push_opcode(Opcode::PushEscaper);
        self.push_ref_slot(index);
        let mut body_buf = Self::sub_emitter(self.constants, self.heap);
        body_buf.emit(body)?;
        let body_bytes = body_buf.finish();
        self.push_varuint(body_bytes.len() as u64);
        self.buf_extend(&body_bytes);
        Ok(())
    }

    /// `push-abort`: symmetric to `push-escaper` but without a
    /// constants reference (§4.3 "Special abort").
    fn emit_push_abort(&mut self, body: &Meaning) -> Result<(), CodeGenError> {
        self.push_opcode(Opcode::PushAbort);
        let mut body_buf = Self::sub_emitter(self.constants, self.heap);
        body_buf.emit(body)?;
        let body_bytes = body_buf.finish();
        self.push_varuint(body_bytes.len() as u64);
        self.buf_extend(&body_bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ArityCheck {
    Fixed(u16),
    AtLeast(u16),
}

/// Bytes a jump opcode occupies for a given displacement: 2 (opcode +
/// one-byte offset) if it fits the short form, otherwise 1 (opcode) plus
/// the varuint's own length (§4.1, §4.3).
fn jump_form_len(displacement: u64) -> usize {
    if displacement <= SHORT_JUMP_MAX {
        2
    } else {
        1 + idio_core::varuint::encoded_len(displacement)
    }
}
