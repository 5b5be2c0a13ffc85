//! Final assembly emission: template placeholder substitution, data/code
//! section assembly (spec §4.9).
//!
//! Grounded on `original_source/compile.py`'s `FileHandler.print_data_header`
//! / `print_string_fragment` / `print_code_header` / `print_assembly_procedure`
//! call order: a data section listing every string fragment, then a code
//! section listing every procedure in fragment order.

use crate::assembly::{Instruction, TempMap};
use crate::entities::{Label, Temp};
use crate::ir::frame::Frame;
use crate::isa::TargetIsa;
use crate::context::Context;

/// One procedure's compiled output: its frame (for the prologue/epilogue
/// wrap) plus its final, register-allocated instruction list.
pub struct CompiledProc {
    pub frame: Frame,
    pub temp_map: TempMap,
    pub body: Vec<Instruction>,
}

/// A fragment ready for emission, after the rest of the pipeline has run.
pub enum CompiledFragment {
    Proc(CompiledProc),
    Str { label: Label, data: Vec<u8> },
}

fn substitute(template: &str, dst: &[Temp], src: &[Temp], jump_targets: &[Label], temp_map: &TempMap) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\'' && i + 1 < chars.len() && matches!(chars[i + 1], 'd' | 's' | 'j') {
            let kind = chars[i + 1];
            let mut j = i + 2;
            let mut digits = String::new();
            while j < chars.len() && chars[j].is_ascii_digit() {
                digits.push(chars[j]);
                j += 1;
            }
            if !digits.is_empty() {
                let idx: usize = digits.parse().expect("scanned only ASCII digits");
                match kind {
                    'd' => out.push_str(&register_name(dst[idx], temp_map)),
                    's' => out.push_str(&register_name(src[idx], temp_map)),
                    'j' => out.push_str(&jump_targets[idx].to_string()),
                    _ => unreachable!(),
                }
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn register_name(t: Temp, temp_map: &TempMap) -> String {
    temp_map
        .get(t)
        .unwrap_or_else(|| panic!("{} was never assigned a register by the allocator", t))
        .to_string()
}

/// Render one instruction as a line of assembly (empty for the zero-template
/// sink instruction, which exists only to pin registers live and carries no
/// real output).
pub fn emit_instruction(instr: &Instruction, temp_map: &TempMap) -> String {
    match instr {
        Instruction::Oper { template, dst, src, jump_targets } => {
            if template.is_empty() {
                return String::new();
            }
            let targets = jump_targets.as_deref().unwrap_or(&[]);
            format!("\t{}\n", substitute(template, dst, src, targets, temp_map))
        }
        Instruction::Move { template, dst, src } => {
            format!("\t{}\n", substitute(template, &[*dst], &[*src], &[], temp_map))
        }
        Instruction::Label { template, .. } => format!("{}\n", template),
    }
}

fn emit_string_fragment(ctx: &Context, label: Label, data: &[u8]) -> String {
    let name = ctx.label_name(label).map(str::to_string).unwrap_or_else(|| label.to_string());
    let escaped: String = data
        .iter()
        .map(|&b| match b {
            b'"' => "\\\"".to_string(),
            b'\\' => "\\\\".to_string(),
            b'\n' => "\\n".to_string(),
            0x20..=0x7e => (b as char).to_string(),
            other => format!("\\x{:02x}", other),
        })
        .collect();
    format!("{}:\n\t.asciz \"{}\"\n", name, escaped)
}

/// Assemble every compiled fragment into one output file: a data section
/// (spec §4.9's string literals) followed by a code section (one assembly
/// procedure per fragment, in the order they were given).
pub fn emit_program(ctx: &Context, isa: &dyn TargetIsa, fragments: &[CompiledFragment]) -> String {
    let mut out = String::new();
    out.push_str("\t.data\n");
    for fragment in fragments {
        if let CompiledFragment::Str { label, data } = fragment {
            out.push_str(&emit_string_fragment(ctx, *label, data));
        }
    }

    out.push_str("\t.text\n");
    for fragment in fragments {
        if let CompiledFragment::Proc(proc) = fragment {
            out.push_str(&proc.frame.assembly_procedure(isa, &proc.temp_map, &proc.body, ctx));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::frame::Access;
    use crate::isa::registers::MachineReg;
    use crate::isa::TigerIsa;
    use smallvec::smallvec;

    fn slot_offset(access: Access) -> i64 {
        match access {
            Access::InFrame(off) => off,
            Access::InReg(_) => 0,
        }
    }

    #[test]
    fn operand_placeholders_substitute_register_names() {
        let mut ctx = Context::new();
        let d = ctx.new_temp();
        let s0 = ctx.new_temp();
        let s1 = ctx.new_temp();
        let mut temp_map = TempMap::new();
        temp_map.insert(d, MachineReg(0));
        temp_map.insert(s0, MachineReg(1));
        temp_map.insert(s1, MachineReg(2));
        let instr = Instruction::Oper {
            template: "add 'd0, 's0, 's1".to_string(),
            dst: smallvec![d],
            src: smallvec![s0, s1],
            jump_targets: None,
        };
        let line = emit_instruction(&instr, &temp_map);
        assert_eq!(line, "\tadd %r0, %r1, %r2\n");
    }

    #[test]
    fn sink_instruction_emits_nothing() {
        let temp_map = TempMap::new();
        let instr = Instruction::Oper {
            template: String::new(),
            dst: smallvec![],
            src: smallvec![],
            jump_targets: None,
        };
        assert_eq!(emit_instruction(&instr, &temp_map), "");
    }

    #[test]
    fn string_fragment_escapes_quotes_and_newlines() {
        let mut ctx = Context::new();
        let l = ctx.named_label("s0");
        let out = emit_string_fragment(&ctx, l, b"a\"b\nc");
        assert!(out.contains("s0:"));
        assert!(out.contains("\\\"b\\nc"));
    }

    #[test]
    fn assembly_procedure_ends_in_a_code_section() {
        let mut ctx = Context::new();
        let isa = TigerIsa::default();
        let name = ctx.named_label("main");
        let (mut frame, _pro) = Frame::new(&mut ctx, &isa, name, &[]);
        let _ = frame.alloc_local(&mut ctx, true);
        let temp_map = TempMap::new();
        let frag = CompiledFragment::Proc(CompiledProc {
            frame,
            temp_map,
            body: vec![],
        });
        let program = emit_program(&ctx, &isa, &[frag]);
        assert!(program.contains("\t.text\n"));
        assert!(program.contains("main:\n"));
        assert!(program.contains("\tret\n"));
        assert_eq!(slot_offset(Access::InFrame(-8)), -8);
    }
}
