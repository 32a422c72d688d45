// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The fetch-decode-execute loop.

use std::fmt;
use std::io::{self, Write};
use std::ops::Range;

use tracing::{debug, info};

use super::memory::{Heap, MemoryLayout, Segment};
use super::opcode::{Instruction, OpCode};
use super::syscall::FileTable;
use super::Word;
use crate::error::{Error, Result};

/// Target used for per-instruction trace events.
pub const TRACE_TARGET: &str = "minic::trace";

/// Pool size used when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 256 * 1024;

/// Lifecycle state of a [`VirtualMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing loaded since the last reset
    Idle,
    /// Instructions have been appended
    Loaded,
    /// Inside `run`
    Running,
    /// Stopped at `EXIT`
    Halted,
    /// Stopped by a runtime error
    Faulted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Idle => "idle",
            Status::Loaded => "loaded",
            Status::Running => "running",
            Status::Halted => "halted",
            Status::Faulted => "faulted",
        })
    }
}

/// A word-addressed stack machine with an accumulator.
///
/// The machine owns one memory pool holding the text, data, heap and stack
/// segments. The compiler appends instructions through the emission API and
/// the machine executes them in place.
pub struct VirtualMachine {
    pub(super) memory: Vec<Word>,
    pub(super) layout: MemoryLayout,
    text_end: usize,
    data_end: usize,
    /// Compile-time contents of the used data words, restored by `reset`
    data_image: Vec<Word>,

    pc: usize,
    pub(super) sp: usize,
    bp: usize,
    ax: Word,
    /// Address of the instruction being executed, for fault reports
    pub(super) current: usize,

    cycles: u64,
    max_cycles: Option<u64>,
    status: Status,

    pub(super) heap: Heap,
    pub(super) files: FileTable,
    pub(super) output: Box<dyn Write + Send>,
}

impl VirtualMachine {
    /// Creates a machine with a pool of `pool_size` words, writing program
    /// output to stdout.
    pub fn new(pool_size: usize) -> Result<Self> {
        let layout = MemoryLayout::partition(pool_size)?;
        let heap = Heap::new(layout.heap.clone());
        let mut vm = Self {
            memory: vec![0; pool_size],
            text_end: layout.text.start,
            data_end: layout.data.start,
            data_image: Vec::new(),
            layout,
            pc: 0,
            sp: 0,
            bp: 0,
            ax: 0,
            current: 0,
            cycles: 0,
            max_cycles: None,
            status: Status::Idle,
            heap,
            files: FileTable::new(),
            output: Box::new(io::stdout()),
        };
        vm.reset();
        Ok(vm)
    }

    /// Redirects program output.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.set_output(output);
        self
    }

    /// Redirects program output.
    pub fn set_output(&mut self, output: impl Write + Send + 'static) {
        self.output = Box::new(output);
    }

    /// Limits the number of instructions a single run may execute.
    pub fn set_max_cycles(&mut self, limit: Option<u64>) {
        self.max_cycles = limit;
    }

    // ==================== Instruction buffer ====================

    fn emit(&mut self, word: Word) -> Result<usize> {
        if self.text_end >= self.layout.text.end {
            return Err(Error::SegmentFull {
                segment: Segment::Text,
            });
        }
        let address = self.text_end;
        self.memory[address] = word;
        self.text_end += 1;
        if self.status == Status::Idle {
            self.status = Status::Loaded;
        }
        Ok(address)
    }

    /// Appends an opcode and returns its address.
    pub fn add_instruction(&mut self, opcode: OpCode) -> Result<usize> {
        self.emit(opcode.word())
    }

    /// Appends an operand word and returns its address.
    pub fn add_operand(&mut self, operand: Word) -> Result<usize> {
        self.emit(operand)
    }

    /// Appends a placeholder word to be patched later.
    pub fn add_placeholder(&mut self) -> Result<usize> {
        self.emit(OpCode::Plac.word())
    }

    /// Overwrites an already written text word.
    pub fn patch(&mut self, address: usize, value: Word) -> Result<()> {
        if !(self.layout.text.start..self.text_end).contains(&address) {
            return Err(Error::InvalidMemoryAccess {
                address: address as Word,
                pc: self.pc,
            });
        }
        self.memory[address] = value;
        Ok(())
    }

    /// Address the next emitted word will occupy.
    pub fn text_len(&self) -> usize {
        self.text_end
    }

    /// The written part of the text segment.
    pub fn text(&self) -> &[Word] {
        &self.memory[self.layout.text.start..self.text_end]
    }

    // ==================== Data segment ====================

    /// Reserves one data word initialized to `init`.
    pub fn allocate_global_word(&mut self, init: Word) -> Result<usize> {
        let address = self.reserve_data(1)?;
        self.memory[address] = init;
        self.data_image.push(init);
        Ok(address)
    }

    /// Copies `value` into the data segment, one word per byte plus a NUL
    /// terminator.
    pub fn allocate_string(&mut self, value: &str) -> Result<usize> {
        let bytes = value.as_bytes();
        let address = self.reserve_data(bytes.len() + 1)?;
        for (slot, byte) in self.memory[address..].iter_mut().zip(bytes) {
            *slot = Word::from(*byte);
        }
        self.memory[address + bytes.len()] = 0;
        self.data_image
            .extend_from_slice(&self.memory[address..=address + bytes.len()]);
        Ok(address)
    }

    fn reserve_data(&mut self, words: usize) -> Result<usize> {
        if self.layout.data.end - self.data_end < words {
            return Err(Error::SegmentFull {
                segment: Segment::Data,
            });
        }
        let address = self.data_end;
        self.data_end += words;
        Ok(address)
    }

    /// Number of data words in use.
    pub fn data_len(&self) -> usize {
        self.data_end - self.layout.data.start
    }

    /// Reads a pool word.
    pub fn read_word(&self, address: usize) -> Option<Word> {
        self.memory.get(address).copied()
    }

    // ==================== Lifecycle ====================

    /// Rewinds the registers and clears the stack, heap and open files.
    /// Text is kept and data returns to its compile-time contents.
    pub fn reset(&mut self) {
        let data = self.layout.data.start..self.data_end;
        self.memory[data].copy_from_slice(&self.data_image);
        self.pc = self.layout.text.start;
        self.sp = self.layout.stack.end;
        self.bp = self.layout.stack.end;
        self.ax = 0;
        self.current = 0;
        self.cycles = 0;
        self.memory[self.layout.heap.start..self.layout.stack.end].fill(0);
        self.heap.reset();
        self.files.close_all();
        self.status = Status::Idle;
    }

    /// Resets the machine and also discards all text and data.
    pub fn clear(&mut self) {
        self.reset();
        self.memory[self.layout.text.start..self.layout.data.end].fill(0);
        self.text_end = self.layout.text.start;
        self.data_end = self.layout.data.start;
        self.data_image.clear();
    }

    /// Executes from the current `pc` until `EXIT` or a fault and returns the
    /// accumulator.
    pub fn run(&mut self, trace: bool) -> Result<Word> {
        self.check_runnable("run")?;
        self.status = Status::Running;
        debug!(pc = self.pc, text = self.text_end, "starting execution");

        let outcome = loop {
            match self.step(trace) {
                Ok(None) => {}
                Ok(Some(result)) => break Ok(result),
                Err(err) => break Err(err),
            }
        };

        self.status = match &outcome {
            Ok(result) => {
                debug!(result, cycles = self.cycles, "program halted");
                Status::Halted
            }
            Err(err) => {
                debug!(error = %err, cycles = self.cycles, "program faulted");
                Status::Faulted
            }
        };
        outcome
    }

    /// Sets `pc` to `entry`, then runs.
    pub fn run_from(&mut self, entry: usize, trace: bool) -> Result<Word> {
        self.check_runnable("run")?;
        self.pc = entry;
        self.run(trace)
    }

    fn check_runnable(&self, operation: &'static str) -> Result<()> {
        match self.status {
            Status::Idle | Status::Loaded => Ok(()),
            state => Err(Error::InvalidState { state, operation }),
        }
    }

    /// Decodes the written text segment.
    pub fn disassemble(&self) -> Vec<(usize, Instruction)> {
        let mut listing = Vec::new();
        let mut address = self.layout.text.start;
        while address < self.text_end {
            let Some((instruction, width)) =
                Instruction::decode(&self.memory[address..self.text_end])
            else {
                break;
            };
            listing.push((address, instruction));
            address += width;
        }
        listing
    }

    // ==================== Registers ====================

    /// Program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Stack pointer.
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Base pointer.
    pub fn bp(&self) -> usize {
        self.bp
    }

    /// Accumulator.
    pub fn ax(&self) -> Word {
        self.ax
    }

    /// Instructions executed since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Lifecycle state.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Segment boundaries.
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    // ==================== Execution ====================

    /// Executes one instruction. Returns the result once `EXIT` is reached.
    fn step(&mut self, trace: bool) -> Result<Option<Word>> {
        if let Some(limit) = self.max_cycles.filter(|limit| self.cycles >= *limit) {
            return Err(Error::CycleLimitExceeded { limit });
        }

        self.current = self.pc;
        let (instruction, width) = self.fetch()?;
        self.cycles += 1;
        if trace {
            info!(target: TRACE_TARGET, "{}> {:>6}: {}", self.cycles, self.current, instruction);
        }
        self.pc += width;

        let operand = instruction.operand.unwrap_or_default();
        match instruction.opcode {
            OpCode::Imm => self.ax = operand,
            OpCode::Lea => self.ax = (self.bp as Word).wrapping_sub(operand),

            OpCode::Jmp => self.pc = self.jump_target(operand)?,
            OpCode::Jz => {
                if self.ax == 0 {
                    self.pc = self.jump_target(operand)?;
                }
            }
            OpCode::Jnz => {
                if self.ax != 0 {
                    self.pc = self.jump_target(operand)?;
                }
            }
            OpCode::Call => {
                let target = self.jump_target(operand)?;
                self.push(self.pc as Word)?;
                self.pc = target;
            }

            OpCode::Ent => {
                self.push(self.bp as Word)?;
                self.bp = self.sp;
                let words = self.count(operand)?;
                if self.sp - self.layout.stack.start < words {
                    return Err(Error::StackOverflow { pc: self.current });
                }
                self.sp -= words;
                self.memory[self.sp..self.bp].fill(0);
            }
            OpCode::Adj => {
                let words = self.count(operand)?;
                let sp = self.sp + words;
                if sp > self.layout.stack.end {
                    return Err(self.fault(sp as Word));
                }
                self.sp = sp;
            }
            OpCode::Lev => {
                self.sp = self.bp;
                let bp = self.pop()?;
                self.bp = usize::try_from(bp)
                    .ok()
                    .filter(|bp| self.layout.stack.start <= *bp && *bp <= self.layout.stack.end)
                    .ok_or_else(|| self.fault(bp))?;
                let pc = self.pop()?;
                self.pc = self.jump_target(pc)?;
            }

            OpCode::Li => {
                let address = self.address(self.ax)?;
                self.ax = self.memory[address];
            }
            OpCode::Si => {
                let value = self.pop()?;
                let address = self.span(self.ax, 1, true)?.start;
                self.memory[address] = value;
                self.ax = value;
            }
            OpCode::Push => self.push(self.ax)?,

            OpCode::Or => self.binary_op(|l, r| l | r)?,
            OpCode::Xor => self.binary_op(|l, r| l ^ r)?,
            OpCode::And => self.binary_op(|l, r| l & r)?,
            OpCode::Eq => self.binary_op(|l, r| Word::from(l == r))?,
            OpCode::Ne => self.binary_op(|l, r| Word::from(l != r))?,
            OpCode::Lt => self.binary_op(|l, r| Word::from(l < r))?,
            OpCode::Gt => self.binary_op(|l, r| Word::from(l > r))?,
            OpCode::Le => self.binary_op(|l, r| Word::from(l <= r))?,
            OpCode::Ge => self.binary_op(|l, r| Word::from(l >= r))?,
            OpCode::Add => self.binary_op(Word::wrapping_add)?,
            OpCode::Sub => self.binary_op(Word::wrapping_sub)?,
            OpCode::Mul => self.binary_op(Word::wrapping_mul)?,
            OpCode::Div => self.division_op(Word::wrapping_div)?,
            OpCode::Mod => self.division_op(Word::wrapping_rem)?,

            OpCode::Plac => return Err(Error::UnpatchedPlaceholder { pc: self.current }),

            OpCode::Open
            | OpCode::Read
            | OpCode::Close
            | OpCode::Printf
            | OpCode::Malloc
            | OpCode::Free
            | OpCode::Memset
            | OpCode::Memcmp => self.ax = self.system_call(instruction.opcode, operand)?,

            OpCode::Exit => return Ok(Some(self.ax)),
        }

        Ok(None)
    }

    fn fetch(&self) -> Result<(Instruction, usize)> {
        let pc = self.pc;
        if !(self.layout.text.start..self.text_end).contains(&pc) {
            return Err(Error::InvalidMemoryAccess {
                address: pc as Word,
                pc,
            });
        }
        let word = self.memory[pc];
        let opcode = OpCode::from_word(word).ok_or(Error::UnknownOpcode { opcode: word, pc })?;
        if opcode == OpCode::Plac {
            return Err(Error::UnpatchedPlaceholder { pc });
        }
        Instruction::decode(&self.memory[pc..self.text_end]).ok_or(Error::InvalidMemoryAccess {
            address: pc as Word + 1,
            pc,
        })
    }

    pub(super) fn fault(&self, address: Word) -> Error {
        Error::InvalidMemoryAccess {
            address,
            pc: self.current,
        }
    }

    fn jump_target(&self, target: Word) -> Result<usize> {
        usize::try_from(target)
            .ok()
            .filter(|target| (self.layout.text.start..self.text_end).contains(target))
            .ok_or_else(|| self.fault(target))
    }

    /// A non-negative operand used as a word count.
    fn count(&self, operand: Word) -> Result<usize> {
        usize::try_from(operand).map_err(|_| self.fault(operand))
    }

    /// Validates a readable pool address.
    pub(super) fn address(&self, address: Word) -> Result<usize> {
        usize::try_from(address)
            .ok()
            .filter(|address| *address < self.memory.len())
            .ok_or_else(|| self.fault(address))
    }

    /// Validates `count` words starting at `start`. Writable spans may not
    /// touch the text segment.
    pub(super) fn span(&self, start: Word, count: Word, writable: bool) -> Result<Range<usize>> {
        let first = usize::try_from(start).map_err(|_| self.fault(start))?;
        let count = usize::try_from(count).map_err(|_| self.fault(start))?;
        let end = first
            .checked_add(count)
            .filter(|end| *end <= self.memory.len())
            .ok_or_else(|| self.fault(start))?;
        if writable && count > 0 && first < self.layout.text.end && end > self.layout.text.start {
            return Err(self.fault(start));
        }
        Ok(first..end)
    }

    pub(super) fn push(&mut self, value: Word) -> Result<()> {
        if self.sp <= self.layout.stack.start {
            return Err(Error::StackOverflow { pc: self.current });
        }
        self.sp -= 1;
        self.memory[self.sp] = value;
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<Word> {
        if self.sp >= self.layout.stack.end {
            return Err(self.fault(self.sp as Word));
        }
        let value = self.memory[self.sp];
        self.sp += 1;
        Ok(value)
    }

    fn binary_op<F>(&mut self, op: F) -> Result<()>
    where
        F: Fn(Word, Word) -> Word,
    {
        let left = self.pop()?;
        self.ax = op(left, self.ax);
        Ok(())
    }

    fn division_op<F>(&mut self, op: F) -> Result<()>
    where
        F: Fn(Word, Word) -> Word,
    {
        let left = self.pop()?;
        if self.ax == 0 {
            return Err(Error::DivisionByZero { pc: self.current });
        }
        self.ax = op(left, self.ax);
        Ok(())
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("layout", &self.layout)
            .field("status", &self.status)
            .field("pc", &self.pc)
            .field("sp", &self.sp)
            .field("bp", &self.bp)
            .field("ax", &self.ax)
            .field("cycles", &self.cycles)
            .field("text_len", &self.text_end)
            .field("data_len", &self.data_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes `program` into a fresh machine.
    fn assemble(program: &[(OpCode, Option<Word>)]) -> VirtualMachine {
        let mut vm = VirtualMachine::new(1024).unwrap();
        for (opcode, operand) in program {
            vm.add_instruction(*opcode).unwrap();
            if let Some(operand) = operand {
                vm.add_operand(*operand).unwrap();
            }
        }
        vm
    }

    fn run(program: &[(OpCode, Option<Word>)]) -> Result<Word> {
        assemble(program).run(false)
    }

    use OpCode::*;

    #[test]
    fn test_new_machine() {
        let vm = VirtualMachine::new(1024).unwrap();
        assert_eq!(vm.status(), Status::Idle);
        assert_eq!(vm.sp(), 1024);
        assert_eq!(vm.bp(), 1024);
        assert_eq!(vm.text_len(), 0);
    }

    #[test]
    fn test_pool_too_small() {
        assert!(matches!(
            VirtualMachine::new(8),
            Err(Error::PoolTooSmall { words: 8 })
        ));
    }

    #[test]
    fn test_imm_exit() {
        let mut vm = assemble(&[(Imm, Some(42)), (Exit, None)]);
        assert_eq!(vm.status(), Status::Loaded);
        assert_eq!(vm.run(false).unwrap(), 42);
        assert_eq!(vm.status(), Status::Halted);
        assert_eq!(vm.cycles(), 2);
    }

    #[test]
    fn test_binary_operand_order() {
        let program = [(Imm, Some(10)), (Push, None), (Imm, Some(3)), (Sub, None), (Exit, None)];
        assert_eq!(run(&program).unwrap(), 7);

        let program = [(Imm, Some(2)), (Push, None), (Imm, Some(5)), (Lt, None), (Exit, None)];
        assert_eq!(run(&program).unwrap(), 1);

        let program = [(Imm, Some(17)), (Push, None), (Imm, Some(5)), (Mod, None), (Exit, None)];
        assert_eq!(run(&program).unwrap(), 2);
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let program = [
            (Imm, Some(Word::MAX)),
            (Push, None),
            (Imm, Some(1)),
            (Add, None),
            (Exit, None),
        ];
        assert_eq!(run(&program).unwrap(), Word::MIN);
    }

    #[test]
    fn test_division_by_zero() {
        let mut vm = assemble(&[(Imm, Some(1)), (Push, None), (Imm, Some(0)), (Div, None)]);
        assert_eq!(vm.run(false), Err(Error::DivisionByZero { pc: 5 }));
        assert_eq!(vm.status(), Status::Faulted);
    }

    #[test]
    fn test_run_requires_reset_after_fault() {
        let mut vm = assemble(&[(Imm, Some(1)), (Push, None), (Imm, Some(0)), (Mod, None)]);
        assert!(vm.run(false).is_err());
        assert_eq!(
            vm.run(false),
            Err(Error::InvalidState {
                state: Status::Faulted,
                operation: "run"
            })
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let mut vm = VirtualMachine::new(1024).unwrap();
        vm.add_operand(999).unwrap();
        assert_eq!(vm.run(false), Err(Error::UnknownOpcode { opcode: 999, pc: 0 }));
    }

    #[test]
    fn test_unpatched_placeholder() {
        let mut vm = VirtualMachine::new(1024).unwrap();
        vm.add_placeholder().unwrap();
        assert_eq!(vm.run(false), Err(Error::UnpatchedPlaceholder { pc: 0 }));
    }

    #[test]
    fn test_patch_jump() {
        let mut vm = VirtualMachine::new(1024).unwrap();
        vm.add_instruction(Jmp).unwrap();
        let site = vm.add_placeholder().unwrap();
        vm.add_instruction(Imm).unwrap();
        vm.add_operand(1).unwrap();
        vm.add_instruction(Exit).unwrap();
        let target = vm.add_instruction(Imm).unwrap();
        vm.add_operand(2).unwrap();
        vm.add_instruction(Exit).unwrap();

        vm.patch(site, target as Word).unwrap();
        assert_eq!(vm.run(false).unwrap(), 2);
    }

    #[test]
    fn test_patch_past_end_rejected() {
        let mut vm = assemble(&[(Exit, None)]);
        assert!(vm.patch(5, 0).is_err());
    }

    #[test]
    fn test_conditional_jumps() {
        // 0: IMM 0; 2: JZ 7; 4: IMM 1; 6: EXIT; 7: IMM 2; 9: EXIT
        let program = [
            (Imm, Some(0)),
            (Jz, Some(7)),
            (Imm, Some(1)),
            (Exit, None),
            (Imm, Some(2)),
            (Exit, None),
        ];
        assert_eq!(run(&program).unwrap(), 2);

        let program = [
            (Imm, Some(5)),
            (Jnz, Some(7)),
            (Imm, Some(1)),
            (Exit, None),
            (Imm, Some(2)),
            (Exit, None),
        ];
        assert_eq!(run(&program).unwrap(), 2);
    }

    #[test]
    fn test_call_with_argument() {
        // Doubles its single argument.
        let program = [
            (Imm, Some(21)), // 0
            (Push, None),    // 2
            (Call, Some(8)), // 3
            (Adj, Some(1)),  // 5
            (Exit, None),    // 7
            (Ent, Some(1)),  // 8
            (Lea, Some(-2)), // 10
            (Li, None),      // 12
            (Push, None),    // 13
            (Imm, Some(2)),  // 14
            (Mul, None),     // 16
            (Lev, None),     // 17
        ];
        let mut vm = assemble(&program);
        assert_eq!(vm.run(false).unwrap(), 42);
        assert_eq!(vm.sp(), vm.layout().stack.end);
        assert_eq!(vm.bp(), vm.layout().stack.end);
    }

    #[test]
    fn test_local_store_and_load() {
        let program = [
            (Ent, Some(1)),  // 0
            (Imm, Some(9)),  // 2
            (Push, None),    // 4
            (Lea, Some(1)),  // 5
            (Si, None),      // 7
            (Imm, Some(0)),  // 8
            (Lea, Some(1)),  // 10
            (Li, None),      // 12
            (Exit, None),    // 13
        ];
        assert_eq!(run(&program).unwrap(), 9);
    }

    #[test]
    fn test_store_into_text_rejected() {
        let program = [(Imm, Some(5)), (Push, None), (Imm, Some(0)), (Si, None)];
        assert_eq!(
            run(&program),
            Err(Error::InvalidMemoryAccess { address: 0, pc: 5 })
        );
    }

    #[test]
    fn test_load_outside_pool() {
        let program = [(Imm, Some(5000)), (Li, None)];
        assert_eq!(
            run(&program),
            Err(Error::InvalidMemoryAccess { address: 5000, pc: 2 })
        );
    }

    #[test]
    fn test_jump_outside_text() {
        assert_eq!(
            run(&[(Jmp, Some(700))]),
            Err(Error::InvalidMemoryAccess { address: 700, pc: 0 })
        );
    }

    #[test]
    fn test_stack_overflow() {
        let mut vm = VirtualMachine::new(64).unwrap();
        vm.add_instruction(Call).unwrap();
        vm.add_operand(0).unwrap();
        assert!(matches!(vm.run(false), Err(Error::StackOverflow { pc: 0 })));
    }

    #[test]
    fn test_cycle_limit() {
        let mut vm = assemble(&[(Jmp, Some(0))]);
        vm.set_max_cycles(Some(100));
        assert_eq!(vm.run(false), Err(Error::CycleLimitExceeded { limit: 100 }));
        assert_eq!(vm.cycles(), 100);
    }

    #[test]
    fn test_reset_keeps_text() {
        let mut vm = assemble(&[(Imm, Some(3)), (Push, None), (Imm, Some(4)), (Add, None), (Exit, None)]);
        assert_eq!(vm.run(false).unwrap(), 7);
        vm.reset();
        assert_eq!(vm.status(), Status::Idle);
        assert_eq!(vm.cycles(), 0);
        assert_eq!(vm.sp(), vm.layout().stack.end);
        assert_eq!(vm.run(false).unwrap(), 7);
    }

    #[test]
    fn test_reset_restores_data() {
        let mut vm = VirtualMachine::new(1024).unwrap();
        let global = vm.allocate_global_word(5).unwrap();
        let string = vm.allocate_string("ab").unwrap();
        for (opcode, operand) in [
            (Imm, Some(9)),
            (Push, None),
            (Imm, Some(global as Word)),
            (Si, None),
            (Push, None),
            (Imm, Some(string as Word)),
            (Si, None),
            (Exit, None),
        ] {
            vm.add_instruction(opcode).unwrap();
            if let Some(operand) = operand {
                vm.add_operand(operand).unwrap();
            }
        }

        assert_eq!(vm.run(false).unwrap(), 9);
        assert_eq!(vm.read_word(global), Some(9));
        assert_eq!(vm.read_word(string), Some(9));

        vm.reset();
        assert_eq!(vm.read_word(global), Some(5));
        assert_eq!(vm.read_word(string), Some(Word::from(b'a')));
        assert_eq!(vm.read_word(string + 2), Some(0));
        assert_eq!(vm.data_len(), 4);
    }

    #[test]
    fn test_clear_discards_text_and_data() {
        let mut vm = assemble(&[(Exit, None)]);
        vm.allocate_global_word(5).unwrap();
        vm.clear();
        assert_eq!(vm.text_len(), 0);
        assert_eq!(vm.data_len(), 0);
        assert_eq!(vm.status(), Status::Idle);
    }

    #[test]
    fn test_run_from_entry() {
        let mut vm = assemble(&[(Imm, Some(1)), (Exit, None), (Imm, Some(2)), (Exit, None)]);
        assert_eq!(vm.run_from(3, false).unwrap(), 2);
    }

    #[test]
    fn test_allocate_string() {
        let mut vm = VirtualMachine::new(1024).unwrap();
        let address = vm.allocate_string("hi").unwrap();
        assert_eq!(address, vm.layout().data.start);
        assert_eq!(vm.read_word(address), Some(Word::from(b'h')));
        assert_eq!(vm.read_word(address + 1), Some(Word::from(b'i')));
        assert_eq!(vm.read_word(address + 2), Some(0));
        assert_eq!(vm.data_len(), 3);
    }

    #[test]
    fn test_segments_fill_up() {
        let mut vm = VirtualMachine::new(64).unwrap();
        for _ in 0..16 {
            vm.add_instruction(Push).unwrap();
        }
        assert_eq!(
            vm.add_instruction(Push),
            Err(Error::SegmentFull {
                segment: Segment::Text
            })
        );
        assert_eq!(
            vm.allocate_string(&"x".repeat(16)),
            Err(Error::SegmentFull {
                segment: Segment::Data
            })
        );
    }

    #[test]
    fn test_disassemble() {
        let vm = assemble(&[(Imm, Some(4)), (Push, None), (Jmp, Some(0))]);
        let listing = vm.disassemble();
        assert_eq!(
            listing,
            vec![
                (0, Instruction::with_operand(Imm, 4)),
                (2, Instruction::simple(Push)),
                (3, Instruction::with_operand(Jmp, 0)),
            ]
        );
    }

    #[test]
    fn test_machine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<VirtualMachine>();
    }
}
