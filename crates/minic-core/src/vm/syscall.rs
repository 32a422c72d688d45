// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! System-call traps.
//!
//! Each trap pops its own arguments; the first argument was pushed first and
//! therefore sits deepest on the stack. Host failures (missing files, bad
//! descriptors) are reported to the program as `-1`; invalid memory is a
//! machine fault.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};

use rustc_hash::FxHashMap;
use tracing::debug;

use super::interpreter::VirtualMachine;
use super::opcode::OpCode;
use super::Word;
use crate::error::{Error, Result};

/// Descriptors handed out by `open`.
#[derive(Debug)]
pub(crate) struct FileTable {
    files: FxHashMap<Word, File>,
    next_fd: Word,
}

impl FileTable {
    /// First descriptor after stdin, stdout and stderr.
    const FIRST_FD: Word = 3;

    pub(crate) fn new() -> Self {
        Self {
            files: FxHashMap::default(),
            next_fd: Self::FIRST_FD,
        }
    }

    fn insert(&mut self, file: File) -> Word {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, file);
        fd
    }

    fn get_mut(&mut self, fd: Word) -> Option<&mut File> {
        self.files.get_mut(&fd)
    }

    fn close(&mut self, fd: Word) -> bool {
        self.files.remove(&fd).is_some()
    }

    pub(crate) fn close_all(&mut self) {
        self.files.clear();
        self.next_fd = Self::FIRST_FD;
    }
}

impl VirtualMachine {
    pub(super) fn system_call(&mut self, opcode: OpCode, argc: Word) -> Result<Word> {
        let args = self.pop_arguments(argc)?;
        let arg = |index: usize| args.get(index).copied().unwrap_or(0);

        match opcode {
            OpCode::Open => self.sys_open(arg(0), arg(1)),
            OpCode::Read => self.sys_read(arg(0), arg(1), arg(2)),
            OpCode::Close => Ok(if self.files.close(arg(0)) { 0 } else { -1 }),
            OpCode::Printf => self.sys_printf(&args),
            OpCode::Malloc => self.sys_malloc(arg(0)),
            OpCode::Free => self.sys_free(arg(0)),
            OpCode::Memset => {
                let span = self.span(arg(0), arg(2), true)?;
                self.memory[span].fill(arg(1));
                Ok(arg(0))
            }
            OpCode::Memcmp => {
                let left = self.span(arg(0), arg(2), false)?;
                let right = self.span(arg(1), arg(2), false)?;
                Ok(self.memory[left]
                    .iter()
                    .zip(&self.memory[right])
                    .find(|(l, r)| l != r)
                    .map(|(l, r)| l.wrapping_sub(*r))
                    .unwrap_or(0))
            }
            other => Err(Error::UnknownOpcode {
                opcode: other.word(),
                pc: self.current,
            }),
        }
    }

    /// Pops `argc` arguments, returned in source order.
    fn pop_arguments(&mut self, argc: Word) -> Result<Vec<Word>> {
        let count = usize::try_from(argc).map_err(|_| self.fault(argc))?;
        let end = self
            .sp
            .checked_add(count)
            .filter(|end| *end <= self.layout.stack.end)
            .ok_or_else(|| self.fault(self.sp as Word))?;
        let args = self.memory[self.sp..end].iter().rev().copied().collect();
        self.sp = end;
        Ok(args)
    }

    /// Reads a NUL-terminated byte string from the pool.
    pub(super) fn read_bytes(&self, address: Word) -> Result<Vec<u8>> {
        let start = self.address(address)?;
        Ok(self.memory[start..]
            .iter()
            .take_while(|word| **word != 0)
            .map(|word| *word as u8)
            .collect())
    }

    fn sys_open(&mut self, path: Word, flags: Word) -> Result<Word> {
        let path = String::from_utf8_lossy(&self.read_bytes(path)?).into_owned();
        let mut options = OpenOptions::new();
        match flags {
            0 => options.read(true),
            1 => options.write(true).create(true).truncate(true),
            2 => options.read(true).write(true),
            _ => return Ok(-1),
        };
        match options.open(&path) {
            Ok(file) => {
                let fd = self.files.insert(file);
                debug!(%path, fd, "opened file");
                Ok(fd)
            }
            Err(err) => {
                debug!(%path, error = %err, "open failed");
                Ok(-1)
            }
        }
    }

    fn sys_read(&mut self, fd: Word, buffer: Word, count: Word) -> Result<Word> {
        let span = self.span(buffer, count, true)?;
        let mut bytes = vec![0u8; span.len()];
        let result = if fd == 0 {
            io::stdin().read(&mut bytes)
        } else {
            match self.files.get_mut(fd) {
                Some(file) => file.read(&mut bytes),
                None => return Ok(-1),
            }
        };
        match result {
            Ok(read) => {
                for (slot, byte) in self.memory[span].iter_mut().zip(&bytes[..read]) {
                    *slot = Word::from(*byte);
                }
                Ok(read as Word)
            }
            Err(_) => Ok(-1),
        }
    }

    fn sys_printf(&mut self, args: &[Word]) -> Result<Word> {
        let Some((&template, values)) = args.split_first() else {
            return Ok(-1);
        };
        let template = self.read_bytes(template)?;
        let text = self.format(&template, values)?;
        let written = self
            .output
            .write_all(&text)
            .and_then(|()| self.output.flush());
        Ok(match written {
            Ok(()) => text.len() as Word,
            Err(_) => -1,
        })
    }

    fn sys_malloc(&mut self, words: Word) -> Result<Word> {
        let Some(size) = usize::try_from(words).ok().filter(|size| *size > 0) else {
            return Ok(0);
        };
        match self.heap.allocate(size) {
            Some(address) => {
                self.memory[address..address + size].fill(0);
                Ok(address as Word)
            }
            None => Ok(0),
        }
    }

    fn sys_free(&mut self, pointer: Word) -> Result<Word> {
        if pointer == 0 {
            return Ok(0);
        }
        let address = usize::try_from(pointer).map_err(|_| self.fault(pointer))?;
        let words = self
            .heap
            .release(address)
            .ok_or_else(|| self.fault(pointer))?;
        debug!(address, words, live = self.heap.live_blocks(), "freed heap block");
        Ok(0)
    }

    /// Expands a printf template. Supports `%d %i %u %x %X %c %s %%` with
    /// optional `-`/`0` flags and a field width.
    fn format(&self, template: &[u8], values: &[Word]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(template.len());
        let mut values = values.iter().copied();
        let mut bytes = template.iter().copied().peekable();

        while let Some(byte) = bytes.next() {
            if byte != b'%' {
                out.push(byte);
                continue;
            }

            let mut left_align = false;
            let mut zero_pad = false;
            while let Some(flag) = bytes.next_if(|b| *b == b'-' || *b == b'0') {
                match flag {
                    b'-' => left_align = true,
                    _ => zero_pad = true,
                }
            }
            let mut width = 0usize;
            while let Some(digit) = bytes.next_if(u8::is_ascii_digit) {
                width = width * 10 + usize::from(digit - b'0');
            }

            let Some(conversion) = bytes.next() else {
                out.push(b'%');
                break;
            };
            let field = match conversion {
                b'%' => {
                    out.push(b'%');
                    continue;
                }
                b'd' | b'i' => values.next().unwrap_or(0).to_string().into_bytes(),
                b'u' => (values.next().unwrap_or(0) as u64).to_string().into_bytes(),
                b'x' => format!("{:x}", values.next().unwrap_or(0)).into_bytes(),
                b'X' => format!("{:X}", values.next().unwrap_or(0)).into_bytes(),
                b'c' => vec![values.next().unwrap_or(0) as u8],
                b's' => self.read_bytes(values.next().unwrap_or(0))?,
                other => {
                    // Unknown conversions are copied through
                    out.extend_from_slice(&[b'%', other]);
                    continue;
                }
            };

            let padding = width.saturating_sub(field.len());
            let numeric = matches!(conversion, b'd' | b'i' | b'u' | b'x' | b'X');
            if left_align {
                out.extend_from_slice(&field);
                out.resize(out.len() + padding, b' ');
            } else if zero_pad && numeric {
                let (sign, digits) = match field.split_first() {
                    Some((b'-', digits)) => (&field[..1], digits),
                    _ => (&field[..0], &field[..]),
                };
                out.extend_from_slice(sign);
                out.resize(out.len() + padding, b'0');
                out.extend_from_slice(digits);
            } else {
                out.resize(out.len() + padding, b' ');
                out.extend_from_slice(&field);
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Output sink shared with the test.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn machine() -> (VirtualMachine, Capture) {
        let capture = Capture::default();
        let vm = VirtualMachine::new(1024).unwrap().with_output(capture.clone());
        (vm, capture)
    }

    /// Emits `IMM arg; PUSH` for each argument, then the trap and `EXIT`.
    fn call(vm: &mut VirtualMachine, opcode: OpCode, args: &[Word]) {
        for arg in args {
            vm.add_instruction(OpCode::Imm).unwrap();
            vm.add_operand(*arg).unwrap();
            vm.add_instruction(OpCode::Push).unwrap();
        }
        vm.add_instruction(opcode).unwrap();
        vm.add_operand(args.len() as Word).unwrap();
        vm.add_instruction(OpCode::Exit).unwrap();
    }

    fn render(template: &str, values: &[Word]) -> String {
        let (mut vm, _) = machine();
        let strings: Vec<Word> = ["abc", "xy"]
            .iter()
            .map(|s| vm.allocate_string(s).unwrap() as Word)
            .collect();
        let values: Vec<Word> = values
            .iter()
            .map(|v| match v {
                -100 => strings[0],
                -200 => strings[1],
                other => *other,
            })
            .collect();
        String::from_utf8(vm.format(template.as_bytes(), &values).unwrap()).unwrap()
    }

    #[test]
    fn test_format_conversions() {
        assert_eq!(render("%d|%i|%x|%X", &[-5, 7, 255, 255]), "-5|7|ff|FF");
        assert_eq!(render("%c%c", &[104, 105]), "hi");
        assert_eq!(render("[%s] [%s]", &[-100, -200]), "[abc] [xy]");
        assert_eq!(render("100%%", &[]), "100%");
        assert_eq!(render("%u", &[-1]), "18446744073709551615");
    }

    #[test]
    fn test_format_width_and_flags() {
        assert_eq!(render("[%5d]", &[42]), "[   42]");
        assert_eq!(render("[%-5d]", &[42]), "[42   ]");
        assert_eq!(render("[%05d]", &[-42]), "[-0042]");
        assert_eq!(render("[%4s]", &[-200]), "[  xy]");
    }

    #[test]
    fn test_format_missing_arguments_and_unknown_conversion() {
        assert_eq!(render("%d %d", &[1]), "1 0");
        assert_eq!(render("%q", &[]), "%q");
        assert_eq!(render("trailing %", &[]), "trailing %");
    }

    #[test]
    fn test_printf_writes_to_output() {
        let (mut vm, capture) = machine();
        let template = vm.allocate_string("x=%d\n").unwrap() as Word;
        call(&mut vm, OpCode::Printf, &[template, 7]);
        assert_eq!(vm.run(false).unwrap(), 4);
        assert_eq!(capture.text(), "x=7\n");
        assert_eq!(vm.sp(), vm.layout().stack.end);
    }

    #[test]
    fn test_malloc_returns_zeroed_heap_block() {
        let (mut vm, _) = machine();
        call(&mut vm, OpCode::Malloc, &[4]);
        let address = vm.run(false).unwrap() as usize;
        assert_eq!(address, vm.layout().heap.start);
        assert!((address..address + 4).all(|a| vm.read_word(a) == Some(0)));
    }

    #[test]
    fn test_malloc_exhaustion_returns_null() {
        let (mut vm, _) = machine();
        call(&mut vm, OpCode::Malloc, &[10_000]);
        assert_eq!(vm.run(false).unwrap(), 0);
    }

    #[test]
    fn test_free_releases_malloc_block() {
        let (mut vm, _) = machine();
        for (opcode, operand) in [
            (OpCode::Imm, Some(3)),
            (OpCode::Push, None),
            (OpCode::Malloc, Some(1)),
            (OpCode::Push, None),
            (OpCode::Free, Some(1)),
            (OpCode::Exit, None),
        ] {
            vm.add_instruction(opcode).unwrap();
            if let Some(operand) = operand {
                vm.add_operand(operand).unwrap();
            }
        }
        assert_eq!(vm.run(false).unwrap(), 0);
        assert_eq!(vm.heap.live_blocks(), 0);
        assert_eq!(vm.sp(), vm.layout().stack.end);
    }

    #[test]
    fn test_free_unknown_pointer_faults() {
        let (mut vm, _) = machine();
        call(&mut vm, OpCode::Free, &[600]);
        assert!(matches!(
            vm.run(false),
            Err(Error::InvalidMemoryAccess { address: 600, .. })
        ));
    }

    #[test]
    fn test_memset_and_memcmp() {
        let (mut vm, _) = machine();
        let a = vm.allocate_string("abcd").unwrap() as Word;
        let b = vm.allocate_string("abzd").unwrap() as Word;
        call(&mut vm, OpCode::Memcmp, &[a, b, 4]);
        assert_eq!(vm.run(false).unwrap(), Word::from(b'c') - Word::from(b'z'));

        vm.clear();
        let a = vm.allocate_string("abcd").unwrap() as Word;
        call(&mut vm, OpCode::Memset, &[a, 120, 2]);
        assert_eq!(vm.run(false).unwrap(), a);
        assert_eq!(vm.read_word(a as usize), Some(120));
        assert_eq!(vm.read_word(a as usize + 1), Some(120));
        assert_eq!(vm.read_word(a as usize + 2), Some(Word::from(b'c')));
    }

    #[test]
    fn test_memset_into_text_faults() {
        let (mut vm, _) = machine();
        call(&mut vm, OpCode::Memset, &[0, 1, 2]);
        assert!(matches!(
            vm.run(false),
            Err(Error::InvalidMemoryAccess { address: 0, .. })
        ));
    }

    #[test]
    fn test_open_read_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "hey").unwrap();

        let (mut vm, _) = machine();
        let name = vm.allocate_string(path.to_str().unwrap()).unwrap() as Word;
        let buffer = vm.layout().heap.start as Word;
        // read(open(name, 0), buffer, 8)
        for (opcode, operand) in [
            (OpCode::Imm, Some(name)),
            (OpCode::Push, None),
            (OpCode::Imm, Some(0)),
            (OpCode::Push, None),
            (OpCode::Open, Some(2)),
            (OpCode::Push, None),
            (OpCode::Imm, Some(buffer)),
            (OpCode::Push, None),
            (OpCode::Imm, Some(8)),
            (OpCode::Push, None),
            (OpCode::Read, Some(3)),
            (OpCode::Exit, None),
        ] {
            vm.add_instruction(opcode).unwrap();
            if let Some(operand) = operand {
                vm.add_operand(operand).unwrap();
            }
        }
        assert_eq!(vm.run(false).unwrap(), 3);
        let text: Vec<Word> = (0..4).map(|i| vm.read_word(buffer as usize + i).unwrap()).collect();
        assert_eq!(text, vec![104, 101, 121, 0]);

        // Reset closes every descriptor
        vm.reset();
        call(&mut vm, OpCode::Close, &[3]);
        let entry = vm.text_len() - 6;
        assert_eq!(vm.run_from(entry, false).unwrap(), -1);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let (mut vm, _) = machine();
        let name = vm.allocate_string(path.to_str().unwrap()).unwrap() as Word;
        call(&mut vm, OpCode::Open, &[name, 0]);
        assert_eq!(vm.run(false).unwrap(), -1);
    }

    #[test]
    fn test_read_from_unknown_descriptor() {
        let (mut vm, _) = machine();
        let buffer = vm.layout().heap.start as Word;
        call(&mut vm, OpCode::Read, &[42, buffer, 4]);
        assert_eq!(vm.run(false).unwrap(), -1);
    }
}
