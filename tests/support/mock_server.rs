// Mock MCP server speaking newline-delimited JSON-RPC over stdio.
//
// Usage: mock-mcp-server [--tools a,b,c] [--mode MODE] [--page-size N]
//
// Tools: echo, get_weather, book_hotel, sleep, fail, crash
// Modes: normal, fail-handshake, silent, no-tools, malformed

use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::process;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Normal,
    /// Exit instead of answering `initialize`.
    FailHandshake,
    /// Never answer `initialize`.
    Silent,
    NoTools,
    /// Advertise tools whose input schema is not an object.
    Malformed,
}

#[derive(Debug, Parser)]
#[command(name = "mock-mcp-server")]
struct Options {
    /// Tools to advertise, comma separated
    #[arg(long, value_delimiter = ',', default_value = "echo")]
    tools: Vec<String>,

    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Tools per `tools/list` page; 0 disables pagination
    #[arg(long, default_value_t = 0)]
    page_size: usize,
}

fn descriptor(name: &str, malformed: bool) -> Value {
    let schema = if malformed {
        json!("not-an-object")
    } else {
        match name {
            "get_weather" | "book_hotel" => json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }),
            "sleep" => json!({
                "type": "object",
                "properties": { "ms": { "type": "integer" } }
            }),
            _ => json!({ "type": "object", "properties": { "text": { "type": "string" } } }),
        }
    };
    json!({
        "name": name,
        "description": format!("mock {name} tool"),
        "inputSchema": schema
    })
}

fn text(content: impl Into<String>, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": content.into() }],
        "isError": is_error
    })
}

fn call_tool(params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let city = arguments.get("city").and_then(Value::as_str).unwrap_or("nowhere");

    match name {
        "echo" => match arguments.get("text").and_then(Value::as_str) {
            Some(text_arg) => text(text_arg, false),
            None => text(arguments.to_string(), false),
        },
        "get_weather" => text(format!("Sunny and 24C in {city}"), false),
        "book_hotel" => text(format!("Booked a room in {city}"), false),
        "sleep" => {
            let ms = arguments.get("ms").and_then(Value::as_u64).unwrap_or(1_000);
            thread::sleep(Duration::from_millis(ms));
            text(format!("slept {ms}ms"), false)
        }
        "fail" => text("tool failed on purpose", true),
        "crash" => {
            eprintln!("mock-mcp-server: crashing on request");
            process::exit(3);
        }
        other => text(format!("unknown tool {other}"), true),
    }
}

fn list_tools(options: &Options, params: &Value) -> Value {
    if options.mode == Mode::NoTools {
        return json!({ "tools": [] });
    }
    let malformed = options.mode == Mode::Malformed;
    let all: Vec<Value> = options
        .tools
        .iter()
        .map(|name| descriptor(name, malformed))
        .collect();
    if options.page_size == 0 {
        return json!({ "tools": all });
    }

    let start = params
        .get("cursor")
        .and_then(Value::as_str)
        .and_then(|cursor| cursor.parse::<usize>().ok())
        .unwrap_or(0);
    let end = (start + options.page_size).min(all.len());
    let mut result = json!({ "tools": all[start.min(end)..end].to_vec() });
    if end < all.len() {
        result["nextCursor"] = json!(end.to_string());
    }
    result
}

fn send(out: &mut impl Write, message: &Value) {
    if writeln!(out, "{message}").and_then(|_| out.flush()).is_err() {
        process::exit(0);
    }
}

fn main() {
    let options = Options::parse();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    eprintln!("mock-mcp-server: started with tools {:?}", options.tools);

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            eprintln!("mock-mcp-server: ignoring non-JSON input");
            continue;
        };
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            // Response to one of our own requests.
            continue;
        };
        let id = message.get("id").cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let result = match method {
            "initialize" => match options.mode {
                Mode::FailHandshake => {
                    eprintln!("mock-mcp-server: refusing to initialize");
                    process::exit(1);
                }
                Mode::Silent => continue,
                _ => json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "mock-mcp-server", "version": "0.1.0" },
                    "instructions": "Mock server for integration tests."
                }),
            },
            "notifications/initialized" => {
                send(&mut stdout, &json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" }));
                continue;
            }
            "tools/list" => list_tools(&options, &params),
            "tools/call" => call_tool(&params),
            "ping" => json!({}),
            _ if id.is_none() => continue,
            other => {
                send(
                    &mut stdout,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32601, "message": format!("method not found: {other}") }
                    }),
                );
                continue;
            }
        };

        if let Some(id) = id {
            send(&mut stdout, &json!({ "jsonrpc": "2.0", "id": id, "result": result }));
        }
    }
}
