use anyhow::{Context, Result, bail};
use ecekit::Storage;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

/// Reads the payload from `path`, or from stdin when it is piped in.
pub fn read_input(path: Option<&PathBuf>) -> Result<Vec<u8>> {
    //  File
    //  ecekit encrypt --input message.txt ...
    if let Some(path) = path {
        return std::fs::read(path).with_context(|| format!("failed to read {}", path.display()));
    }

    //  stdin (Pipeline)
    //  printf "hello" | ecekit encrypt ...
    if !io::stdin().is_terminal() {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }

    bail!("No input provided: pass --input or pipe data on stdin")
}

/// Writes the result to `path` atomically, or raw to stdout.
pub fn write_output(path: Option<&PathBuf>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => Storage::new(path.clone()).write_atomic(data),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
