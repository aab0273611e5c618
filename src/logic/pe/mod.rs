//! PE triage: header parsing and entry point disassembly

pub mod disasm;
pub mod parser;

pub use disasm::{disassemble_entry_point, CapstoneDecoder, DisassemblySnippet, InstructionDecoder};
pub use parser::{is_pe_file, parse_headers, rva_to_offset, PeError, PeHeaderInfo, Section};
