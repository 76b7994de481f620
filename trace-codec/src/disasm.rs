//! Disassembler capability used by formats that store no disassembly text

use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter, MemorySizeOptions};
use trace_data::Arch;

/// Turns opcode bytes into a `mnemonic operands` string
pub trait Disassembler {
    /// Disassemble the first instruction in `opcodes`, located at `ip`
    ///
    /// Returns `None` when the bytes do not decode.
    fn disassemble(&self, opcodes: &[u8], ip: u64, arch: &Arch) -> Option<String>;
}

impl<F> Disassembler for F
where
    F: Fn(&[u8], u64, &Arch) -> Option<String>,
{
    fn disassemble(&self, opcodes: &[u8], ip: u64, arch: &Arch) -> Option<String> {
        self(opcodes, ip, arch)
    }
}

/// x86/x64 disassembler backed by iced-x86, Intel syntax
///
/// Memory operands always carry their size (`dword ptr`), which legacy decode
/// relies on to narrow memory values. Numbers are printed as `0x`-prefixed
/// lowercase hex so `0x` filters and finds match them.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcedDisassembler;

impl Disassembler for IcedDisassembler {
    fn disassemble(&self, opcodes: &[u8], ip: u64, arch: &Arch) -> Option<String> {
        let bitness = match arch {
            Arch::X64 => 64,
            _ => 32,
        };
        let mut decoder = Decoder::with_ip(bitness, opcodes, ip, DecoderOptions::NONE);
        if !decoder.can_decode() {
            return None;
        }
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return None;
        }

        let mut formatter = IntelFormatter::new();
        let options = formatter.options_mut();
        options.set_memory_size_options(MemorySizeOptions::Always);
        options.set_space_after_operand_separator(true);
        options.set_hex_prefix("0x");
        options.set_hex_suffix("");
        options.set_uppercase_hex(false);
        options.set_add_leading_zero_to_hex_numbers(false);
        options.set_branch_leading_zeros(false);
        let mut output = String::new();
        formatter.format(&instruction, &mut output);
        Some(output)
    }
}
