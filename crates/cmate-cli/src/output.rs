//! Result rendering shared by all subcommands.

use std::io::Write;

use serde::Serialize;

/// How command results are printed on stdout.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Print `value` as JSON, or fall back to `text` for human output.
pub fn emit<T, W, F>(out: &mut W, format: OutputFormat, value: &T, text: F) -> anyhow::Result<()>
where
    T: Serialize,
    W: Write,
    F: FnOnce(&mut W) -> std::io::Result<()>,
{
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputFormat::Text => text(out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_output_ends_with_newline() {
        let mut buf = Vec::new();
        emit(&mut buf, OutputFormat::Json, &serde_json::json!({"a": 1}), |_| Ok(())).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.ends_with("}\n"));
    }

    #[test]
    fn text_output_uses_closure() {
        let mut buf = Vec::new();
        emit(&mut buf, OutputFormat::Text, &1, |w| writeln!(w, "one")).unwrap();
        assert_eq!(buf, b"one\n");
    }
}
