//! HarborKV CLI Client
//!
//! Sends one command and prints the reply the way redis-cli does.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::process;

use clap::Parser;
use harborkv::protocol::{read_frame, write_frame, Frame};

/// HarborKV CLI
#[derive(Parser, Debug)]
#[command(name = "harborkv-cli")]
#[command(about = "CLI for HarborKV")]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6666)]
    port: u16,

    /// Password or namespace token, sent with AUTH first
    #[arg(short = 'a', long)]
    password: Option<String>,

    /// Command and its arguments
    #[arg(required = true, num_args = 1..)]
    command: Vec<String>,
}

fn main() {
    let args = Args::parse();
    match run(&args) {
        Ok(reply) => {
            let failed = reply.is_error();
            println!("{}", render(&reply, 0));
            if failed {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Could not talk to {}:{}: {}", args.host, args.port, e);
            process::exit(2);
        }
    }
}

fn run(args: &Args) -> harborkv::Result<Frame> {
    let stream = TcpStream::connect((args.host.as_str(), args.port))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    let mut request = |words: &[&str]| -> harborkv::Result<Frame> {
        write_frame(&mut writer, &Frame::command(words))?;
        read_frame(&mut reader)?.ok_or_else(|| {
            harborkv::Error::Protocol("connection closed by server".to_string())
        })
    };

    if let Some(password) = &args.password {
        let reply = request(&["AUTH", password.as_str()])?;
        if reply.is_error() {
            return Ok(reply);
        }
    }

    let words: Vec<&str> = args.command.iter().map(String::as_str).collect();
    request(&words)
}

/// redis-cli style rendering
fn render(frame: &Frame, depth: usize) -> String {
    match frame {
        Frame::Simple(text) => text.clone(),
        Frame::Error(text) => format!("(error) {}", text),
        Frame::Integer(n) => format!("(integer) {}", n),
        Frame::Bulk(data) => format!("\"{}\"", String::from_utf8_lossy(data)),
        Frame::Null => "(nil)".to_string(),
        Frame::Array(items) if items.is_empty() => "(empty array)".to_string(),
        Frame::Array(items) => {
            let indent = " ".repeat(depth * 3);
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    let prefix = if idx == 0 { String::new() } else { indent.clone() };
                    format!("{}{}) {}", prefix, idx + 1, render(item, depth + 1))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
