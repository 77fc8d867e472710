//! Shared Kythe-stream fixture builders for the CLI test suites.
//!
//! Fact values are base64-encoded here, the same way the extractor
//! emits them; nothing in the fixtures is hand-encoded.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub const MODULE_SV: &str = "module m; wire a; assign a = a; endmodule\n";

pub const STRUCT_SV: &str =
    "typedef struct { logic x; logic y; } s_t;\ns_t v;\nassign q = v.x;\n";

pub fn fact(signature: &str, path: &str, fact_name: &str, value: &str) -> String {
    serde_json::json!({
        "source": { "signature": signature, "path": path, "language": "verilog", "root": "", "corpus": "" },
        "fact_name": fact_name,
        "fact_value": BASE64.encode(value)
    })
    .to_string()
}

pub fn edge(source: &str, target: &str, path: &str, kind: &str) -> String {
    serde_json::json!({
        "source": { "signature": source, "path": path, "language": "verilog", "root": "", "corpus": "" },
        "target": { "signature": target, "path": path, "language": "verilog", "root": "", "corpus": "" },
        "edge_kind": format!("/kythe/edge{kind}"),
        "fact_name": "/"
    })
    .to_string()
}

fn anchor_lines(signature: &str, path: &str, start: usize, end: usize) -> Vec<String> {
    vec![
        fact(signature, path, "/kythe/node/kind", "anchor"),
        fact(signature, path, "/kythe/loc/start", &start.to_string()),
        fact(signature, path, "/kythe/loc/end", &end.to_string()),
    ]
}

/// Stream for `module m; wire a; assign a = a; endmodule`:
/// declaration of `a` at byte 15..16, uses at 25..26 and 29..30.
pub fn wire_stream() -> String {
    let mut lines = vec![
        fact("", "m.sv", "/kythe/node/kind", "file"),
        fact("", "m.sv", "/kythe/text", MODULE_SV),
    ];
    lines.extend(anchor_lines("anchor_a", "m.sv", 15, 16));
    lines.push(fact("sym_a", "m.sv", "/kythe/node/kind", "variable"));
    lines.push(fact("sym_a", "m.sv", "/kythe/subkind", "wire"));
    lines.push(edge("anchor_a", "sym_a", "m.sv", "/defines/binding"));
    for (sig, start, end) in [("use_lhs", 25, 26), ("use_rhs", 29, 30)] {
        lines.extend(anchor_lines(sig, "m.sv", start, end));
        lines.push(edge(sig, "sym_a", "m.sv", "/ref"));
    }
    lines.join("\n")
}

/// Stream for a struct variable with two members:
/// `typedef struct { logic x; logic y; } s_t; s_t v; assign q = v.x;`
/// with `x`/`y` recorded as children of `v`.
pub fn struct_stream() -> String {
    let mut lines = vec![
        fact("", "s.sv", "/kythe/node/kind", "file"),
        fact("", "s.sv", "/kythe/text", STRUCT_SV),
    ];

    // (symbol, declaration byte range)
    for (sym, anchor, start, end) in [
        ("sym_x", "anchor_x", 23usize, 24usize),
        ("sym_y", "anchor_y", 32, 33),
        ("sym_v", "anchor_v", 46, 47),
    ] {
        lines.extend(anchor_lines(anchor, "s.sv", start, end));
        lines.push(fact(sym, "s.sv", "/kythe/node/kind", "variable"));
        lines.push(edge(anchor, sym, "s.sv", "/defines/binding"));
    }

    lines.push(edge("sym_x", "sym_v", "s.sv", "/childof"));
    lines.push(edge("sym_y", "sym_v", "s.sv", "/childof"));

    // Use of `v` on the assign line.
    lines.extend(anchor_lines("use_v", "s.sv", 60, 61));
    lines.push(edge("use_v", "sym_v", "s.sv", "/ref"));

    lines.join("\n")
}

/// Write `stream` under `dir` and return its path.
pub fn write_stream(dir: &Path, stream: &str) -> PathBuf {
    let path = dir.join("index.json");
    std::fs::write(&path, stream).expect("write stream fixture");
    path
}
