//! SLRB: the on-disk container for compiled programs.
//!
//! Layout: magic `SLRB`, `u16` bytecode version, `u16` reserved, then tagged
//! sections (`[u8; 4]` tag, `u32` length, payload). The `PROG` section holds
//! the serialized [`Program`]; unknown sections are skipped. All integers are
//! little-endian. A file written by a different [`BYTECODE_VERSION`] is
//! rejected rather than reinterpreted.

use anyhow::{Context, Result, anyhow, bail, ensure};

use super::opcode::BYTECODE_VERSION;
use super::program::Program;

const MAGIC: [u8; 4] = *b"SLRB";
const HEADER_LEN: usize = 8;

/// Encodes `program` with the current bytecode version.
pub fn encode_program(program: &Program) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, BYTECODE_VERSION);
    write_u16(&mut out, 0); // reserved

    let payload = serde_json::to_vec(program).context("serializing program")?;
    write_section(&mut out, *b"PROG", &payload);
    Ok(out)
}

/// Decodes a program written by [`encode_program`], re-verifying the stack
/// depth of every function.
pub fn decode_program(bytes: &[u8]) -> Result<Program> {
    ensure!(bytes.len() >= HEADER_LEN, "compiled program too small");
    ensure!(bytes[..4] == MAGIC, "invalid SLRB magic");

    let mut cursor = 4;
    let version = read_u16(bytes, &mut cursor)?;
    let _reserved = read_u16(bytes, &mut cursor)?;
    ensure!(
        version == BYTECODE_VERSION,
        "compiled program has bytecode version {version}, this build uses {BYTECODE_VERSION}"
    );

    let mut program: Option<Program> = None;
    while cursor < bytes.len() {
        let tag = read_tag(bytes, &mut cursor)?;
        let len = read_u32(bytes, &mut cursor)? as usize;
        ensure!(cursor + len <= bytes.len(), "section overruns payload");
        let payload = &bytes[cursor..cursor + len];
        cursor += len;

        match &tag {
            b"PROG" => {
                ensure!(program.is_none(), "duplicate PROG section");
                program = Some(serde_json::from_slice(payload).context("deserializing program")?);
            }
            _ => {}
        }
    }

    let program = program.ok_or_else(|| anyhow!("missing PROG section"))?;
    for fc in program.funcodes() {
        let depth = fc.check_stack().with_context(|| format!("verifying {}", fc.name))?;
        if depth != fc.max_stack {
            bail!("{}: recorded max_stack {} but code needs {depth}", fc.name, fc.max_stack);
        }
    }
    Ok(program)
}

fn write_section(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) {
    out.extend_from_slice(&tag);
    write_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    if *cursor + 2 > bytes.len() {
        bail!("unexpected end of input while reading u16");
    }
    let value = u16::from_le_bytes([bytes[*cursor], bytes[*cursor + 1]]);
    *cursor += 2;
    Ok(value)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > bytes.len() {
        bail!("unexpected end of input while reading u32");
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(u32::from_le_bytes(buf))
}

fn read_tag(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 4]> {
    if *cursor + 4 > bytes.len() {
        bail!("unexpected end of input while reading section tag");
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::eval::compile_source;
    use crate::options::FileOptions;
    use crate::val::StringDict;
    use crate::vm::Thread;

    const SRC: &str = "def f(x):\n    return [x * i for i in range(3)]\n\nresult = f(7)\n";

    fn compile() -> Program {
        compile_source("enc.star", SRC, FileOptions::default(), &|_| false).expect("compile")
    }

    #[test]
    fn decoded_program_runs_like_the_original() {
        let bytes = encode_program(&compile()).expect("encode");
        assert_eq!(&bytes[..4], b"SLRB");
        let decoded = Arc::new(decode_program(&bytes).expect("decode"));
        let mut thread = Thread::default();
        let (globals, result) = decoded.init(&mut thread, StringDict::new());
        result.expect("run decoded program");
        assert_eq!(globals["result"].repr(), "[0, 7, 14]");
    }

    #[test]
    fn rejects_other_bytecode_versions() {
        let mut bytes = encode_program(&compile()).expect("encode");
        bytes[4..6].copy_from_slice(&(BYTECODE_VERSION + 1).to_le_bytes());
        let err = decode_program(&bytes).unwrap_err();
        assert!(err.to_string().contains("bytecode version"), "{err}");
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let bytes = encode_program(&compile()).expect("encode");
        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(decode_program(&bad).is_err());
        assert!(decode_program(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_program(&bytes[..HEADER_LEN]).is_err());
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let mut bytes = encode_program(&compile()).expect("encode");
        write_section(&mut bytes, *b"XTRA", b"ignored");
        assert!(decode_program(&bytes).is_ok());
    }
}
