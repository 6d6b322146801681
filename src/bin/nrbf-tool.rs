// nrbf-codec - A round-trip codec for the .NET Remoting Binary Format.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Thin CLI front end over the `nrbf_codec` library. No codec logic lives
//! here: every subcommand just reads a file, calls into the library, and
//! writes the result back out.

use clap::{Parser, Subcommand};
use nrbf_codec::{decoder, encoder, guid, json, sniff};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nrbf-tool")]
#[command(about = "Inspect and transform MS-NRBF binary streams", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a stream and print a debug dump of the object graph
    Dump { input: PathBuf },

    /// Decode a stream and print its JSON representation
    ToJson {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Read a JSON document produced by `to-json` and re-encode it as NRBF
    FromJson {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Scan a buffer for the little-endian bytes of a GUID
    FindGuid { input: PathBuf, guid: String },

    /// Overwrite a 16-byte GUID at the given offset
    ReplaceGuid {
        input: PathBuf,
        offset: usize,
        guid: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check whether a file looks like an NRBF stream
    Sniff { input: PathBuf },
}

fn run() -> nrbf_codec::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Dump { input } => {
            let bytes = read_file(&input)?;
            let out = decoder::decode(&bytes)?;
            println!("header: {:?}", out.header);
            println!("libraries: {:?}", out.libraries);
            match &out.root {
                Some(root) => println!("root: {:#?}", root.borrow()),
                None => println!("root: <empty graph>"),
            }
        }
        Commands::ToJson { input, output } => {
            let bytes = read_file(&input)?;
            let out = decoder::decode(&bytes)?;
            let doc = json::to_json(&out.header, out.root.as_ref(), &out.libraries);
            let text = serde_json::to_string_pretty(&doc).expect("json serialization");
            write_output(output, &text)?;
        }
        Commands::FromJson { input, output } => {
            let bytes = read_file(&input)?;
            let doc: serde_json::Value =
                serde_json::from_slice(&bytes).expect("input is valid json");
            let (header, root, libraries) = json::from_json(&doc)?;
            let bytes = encoder::encode(&header, root.as_ref(), &libraries)?;
            write_output_bytes(output, &bytes)?;
        }
        Commands::FindGuid { input, guid } => {
            let bytes = read_file(&input)?;
            let offsets = guid::find_guid_in_buffer(&bytes, &guid)?;
            for offset in offsets {
                println!("{offset}");
            }
        }
        Commands::ReplaceGuid {
            input,
            offset,
            guid,
            output,
        } => {
            let bytes = read_file(&input)?;
            let patched = guid::replace_guid_at_offset(&bytes, offset, &guid)?;
            write_output_bytes(output, &patched)?;
        }
        Commands::Sniff { input } => {
            let bytes = read_file(&input)?;
            println!("{}", sniff::looks_like_nrbf(&bytes));
        }
    }
    Ok(())
}

fn read_file(path: &PathBuf) -> nrbf_codec::Result<Vec<u8>> {
    fs::read(path).map_err(|_| nrbf_codec::Error::PathNotFound(path.display().to_string()))
}

fn write_output(output: Option<PathBuf>, text: &str) -> nrbf_codec::Result<()> {
    match output {
        Some(path) => fs::write(&path, text)
            .map_err(|_| nrbf_codec::Error::PathNotFound(path.display().to_string())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn write_output_bytes(output: Option<PathBuf>, bytes: &[u8]) -> nrbf_codec::Result<()> {
    match output {
        Some(path) => fs::write(&path, bytes)
            .map_err(|_| nrbf_codec::Error::PathNotFound(path.display().to_string())),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(bytes)
                .map_err(|_| nrbf_codec::Error::PathNotFound("<stdout>".to_string()))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
