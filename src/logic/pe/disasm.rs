//! Entry Point Disassembly
//!
//! Decodes a bounded instruction stream at the PE entry point so the UI can
//! show the first function of the image. Decoding itself sits behind
//! [`InstructionDecoder`]; production uses Capstone.

use capstone::prelude::*;
use once_cell::unsync::OnceCell;
use std::path::Path;

use super::parser::{parse_headers, rva_to_offset, PeError};
use crate::constants::{DISASM_MAX_BYTES, DISASM_MAX_INSNS};
use crate::logic::types::{DisassemblyLine, DisassemblyMeta};

// ============================================================================
// DECODER CAPABILITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub address: u64,
    pub mnemonic: String,
    pub op_str: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Decoder initialization failed: {0}")]
    Init(String),

    #[error("Decoding failed: {0}")]
    Decode(String),
}

/// Turns raw bytes at a base address into instructions
pub trait InstructionDecoder: Send + Sync {
    fn decode(
        &self,
        code: &[u8],
        address: u64,
        is64: bool,
        max_count: usize,
    ) -> Result<Vec<DecodedInstruction>, DecodeError>;
}

thread_local! {
    static ENGINE_X86: OnceCell<Capstone> = const { OnceCell::new() };
    static ENGINE_X86_64: OnceCell<Capstone> = const { OnceCell::new() };
}

/// Capstone-backed decoder (x86 / x86-64, Intel syntax).
///
/// Engines are built on first use and reused for the life of the decoding
/// thread; Capstone handles cannot move between threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapstoneDecoder;

impl CapstoneDecoder {
    fn build_engine(is64: bool) -> Result<Capstone, DecodeError> {
        let mode = if is64 {
            arch::x86::ArchMode::Mode64
        } else {
            arch::x86::ArchMode::Mode32
        };

        Capstone::new()
            .x86()
            .mode(mode)
            .syntax(arch::x86::ArchSyntax::Intel)
            .build()
            .map_err(|e| DecodeError::Init(e.to_string()))
    }
}

impl InstructionDecoder for CapstoneDecoder {
    fn decode(
        &self,
        code: &[u8],
        address: u64,
        is64: bool,
        max_count: usize,
    ) -> Result<Vec<DecodedInstruction>, DecodeError> {
        let run = |cell: &OnceCell<Capstone>| -> Result<Vec<DecodedInstruction>, DecodeError> {
            let cs = cell.get_or_try_init(|| {
                log::debug!("[Disasm] Initializing capstone ({})", if is64 { "x86_64" } else { "x86" });
                Self::build_engine(is64)
            })?;

            let insns = cs
                .disasm_count(code, address, max_count)
                .map_err(|e| DecodeError::Decode(e.to_string()))?;

            Ok(insns
                .iter()
                .map(|insn| DecodedInstruction {
                    address: insn.address(),
                    mnemonic: insn.mnemonic().unwrap_or_default().to_string(),
                    op_str: insn.op_str().unwrap_or_default().to_string(),
                })
                .collect())
        };

        if is64 {
            ENGINE_X86_64.with(run)
        } else {
            ENGINE_X86.with(run)
        }
    }
}

// ============================================================================
// SNIPPET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblySnippet {
    pub instructions: Vec<DisassemblyLine>,
    pub arch: &'static str,
    pub entry_rva: u32,
    pub is64: bool,
}

impl DisassemblySnippet {
    /// Metadata as emitted on the disassembly event
    pub fn event_meta(&self) -> DisassemblyMeta {
        DisassemblyMeta {
            arch: self.arch.to_string(),
            entry_rva: self.entry_rva,
            is64: Some(self.is64),
        }
    }

    /// Metadata as attached to the scan result
    pub fn result_meta(&self) -> DisassemblyMeta {
        DisassemblyMeta {
            arch: self.arch.to_string(),
            entry_rva: self.entry_rva,
            is64: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DisasmError {
    #[error(transparent)]
    Pe(#[from] PeError),

    #[error("Entry point not mapped to a file offset")]
    Unmapped,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Disassemble the entry point of an in-memory image.
pub fn disassemble_buffer(buffer: &[u8], decoder: &dyn InstructionDecoder) -> Result<DisassemblySnippet, DisasmError> {
    let headers = parse_headers(buffer)?;

    let entry_offset = rva_to_offset(headers.entry_rva, &headers.sections)
        .map(|o| o as usize)
        .filter(|&o| o < buffer.len())
        .ok_or(DisasmError::Unmapped)?;

    let slice_end = buffer.len().min(entry_offset + DISASM_MAX_BYTES);
    let code = &buffer[entry_offset..slice_end];

    let decoded = decoder.decode(code, u64::from(headers.entry_rva), headers.is64, DISASM_MAX_INSNS)?;

    let mut instructions = Vec::new();
    for insn in decoded.into_iter().take(DISASM_MAX_INSNS) {
        let is_return = insn.mnemonic.to_lowercase().starts_with("ret");
        instructions.push(DisassemblyLine {
            address: format!("0x{:x}", insn.address),
            mnemonic: insn.mnemonic,
            op_str: insn.op_str,
        });

        if is_return {
            break;
        }
    }

    Ok(DisassemblySnippet {
        instructions,
        arch: if headers.is64 { "x86_64" } else { "x86" },
        entry_rva: headers.entry_rva,
        is64: headers.is64,
    })
}

/// Disassemble the entry point of the file at `path`.
///
/// Every failure is logged and reported as `None`; a missing snippet never
/// fails the scan.
pub fn disassemble_entry_point(path: &Path, decoder: &dyn InstructionDecoder) -> Option<DisassemblySnippet> {
    let buffer = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            log::error!("[Disasm] Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match disassemble_buffer(&buffer, decoder) {
        Ok(snippet) => Some(snippet),
        Err(e) => {
            log::error!("[Disasm] Failed to generate disassembly: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::pe::parser::tests::build_pe;

    /// Emits a fixed instruction list regardless of input
    struct ScriptedDecoder {
        mnemonics: Vec<&'static str>,
    }

    impl InstructionDecoder for ScriptedDecoder {
        fn decode(&self, _code: &[u8], address: u64, _is64: bool, max_count: usize) -> Result<Vec<DecodedInstruction>, DecodeError> {
            Ok(self
                .mnemonics
                .iter()
                .take(max_count)
                .enumerate()
                .map(|(i, m)| DecodedInstruction {
                    address: address + i as u64,
                    mnemonic: m.to_string(),
                    op_str: String::new(),
                })
                .collect())
        }
    }

    struct BrokenDecoder;

    impl InstructionDecoder for BrokenDecoder {
        fn decode(&self, _: &[u8], _: u64, _: bool, _: usize) -> Result<Vec<DecodedInstruction>, DecodeError> {
            Err(DecodeError::Init("no engine".to_string()))
        }
    }

    fn image_with_code(code: &[u8]) -> Vec<u8> {
        let mut buf = build_pe(true, 0x1000, &[(".text", 0x200, 0x1000, 0x200, 0x400)], 0x600);
        buf[0x400..0x400 + code.len()].copy_from_slice(code);
        buf
    }

    #[test]
    fn test_stops_at_first_return() {
        let decoder = ScriptedDecoder { mnemonics: vec!["push", "mov", "RETN", "nop", "nop"] };
        let snippet = disassemble_buffer(&image_with_code(&[0x90]), &decoder).unwrap();

        assert_eq!(snippet.instructions.len(), 3);
        assert_eq!(snippet.instructions[2].mnemonic, "RETN");
        assert_eq!(snippet.instructions[0].address, "0x1000");
        assert_eq!(snippet.arch, "x86_64");
    }

    #[test]
    fn test_instruction_cap() {
        let decoder = ScriptedDecoder { mnemonics: vec!["nop"; 500] };
        let snippet = disassemble_buffer(&image_with_code(&[0x90]), &decoder).unwrap();
        assert_eq!(snippet.instructions.len(), DISASM_MAX_INSNS);
    }

    #[test]
    fn test_unmapped_entry_is_error() {
        let buf = build_pe(true, 0x8000, &[(".text", 0x200, 0x1000, 0x200, 0x400)], 0x600);
        let decoder = ScriptedDecoder { mnemonics: vec!["nop"] };
        assert!(matches!(disassemble_buffer(&buf, &decoder), Err(DisasmError::Unmapped)));
    }

    #[test]
    fn test_entry_offset_past_eof_is_unmapped() {
        let buf = build_pe(true, 0x1000, &[(".text", 0x200, 0x1000, 0x200, 0x4000)], 0x600);
        let decoder = ScriptedDecoder { mnemonics: vec!["nop"] };
        assert!(matches!(disassemble_buffer(&buf, &decoder), Err(DisasmError::Unmapped)));
    }

    #[test]
    fn test_decoder_failure_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.exe");
        std::fs::write(&path, image_with_code(&[0xC3])).unwrap();

        assert!(disassemble_entry_point(&path, &BrokenDecoder).is_none());
        assert!(disassemble_entry_point(&dir.path().join("missing.exe"), &BrokenDecoder).is_none());
    }

    #[test]
    fn test_capstone_decodes_prologue_until_ret() {
        // push rbp; mov rbp, rsp; ret; nop
        let code = [0x55, 0x48, 0x89, 0xE5, 0xC3, 0x90];
        let snippet = disassemble_buffer(&image_with_code(&code), &CapstoneDecoder).unwrap();

        let mnemonics: Vec<&str> = snippet.instructions.iter().map(|i| i.mnemonic.as_str()).collect();
        assert_eq!(mnemonics, vec!["push", "mov", "ret"]);
        assert_eq!(snippet.instructions[1].op_str, "rbp, rsp");
        assert_eq!(snippet.instructions[2].address, "0x1004");
    }
}
