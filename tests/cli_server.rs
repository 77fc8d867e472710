mod common;

use std::net::TcpListener;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::Duration;

use assert_cmd::cargo::CommandCargoExt;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use tempfile::tempdir;

use common::{wire_stream, write_stream};

struct TestDaemon {
    base_url: String,
    child: Child,
}

impl TestDaemon {
    fn spawn(stream_path: &Path) -> Self {
        // Bind an ephemeral port first so we know which port to pass to
        // the `svindex serve` subcommand.
        let listener =
            TcpListener::bind("127.0.0.1:0").expect("bind ephemeral TCP listener for daemon");
        let port = listener
            .local_addr()
            .expect("local_addr for daemon listener")
            .port();
        drop(listener);

        let addr_arg = format!("127.0.0.1:{port}");
        let base_url = format!("http://{addr_arg}");

        let mut cmd =
            std::process::Command::cargo_bin("svindex").expect("locate svindex binary");
        cmd.args(["serve", "--addr", &addr_arg, "--index-file"])
            .arg(stream_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = cmd.spawn().expect("spawn svindex serve daemon");

        wait_for_health(&base_url);

        Self { base_url, child }
    }

    fn post(&self, path: &str, body: &Value) -> Value {
        let client = Client::new();
        let response = client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .expect("send request")
            .error_for_status()
            .expect("success status");
        response.json().expect("json body")
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_for_health(base_url: &str) {
    let client = Client::new();
    for _ in 0..100 {
        if let Ok(response) = client.get(format!("{base_url}/v1/health")).send() {
            if response.status().is_success() {
                return;
            }
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("daemon did not become healthy at {base_url}");
}

#[test]
fn daemon_answers_definition_and_references() {
    let dir = tempdir().expect("tempdir");
    let stream = write_stream(dir.path(), &wire_stream());
    let daemon = TestDaemon::spawn(&stream);

    let location = daemon.post(
        "/v1/definition",
        &json!({ "path": "m.sv", "position": { "line": 0, "character": 29 } }),
    );
    assert_eq!(location["range"]["start"]["character"], 15);
    assert_eq!(location["range"]["end"]["character"], 16);

    let references = daemon.post(
        "/v1/references",
        &json!({
            "path": "m.sv",
            "position": { "line": 0, "character": 15 },
            "include_declaration": true
        }),
    );
    assert_eq!(references.as_array().expect("array").len(), 3);
}

#[test]
fn daemon_serves_the_rename_flow() {
    let dir = tempdir().expect("tempdir");
    let stream = write_stream(dir.path(), &wire_stream());
    let daemon = TestDaemon::spawn(&stream);

    let range = daemon.post(
        "/v1/prepare-rename",
        &json!({ "path": "m.sv", "position": { "line": 0, "character": 15 } }),
    );
    assert_eq!(range["start"]["character"], 15);
    assert_eq!(range["end"]["character"], 16);

    let plan = daemon.post(
        "/v1/rename",
        &json!({
            "path": "m.sv",
            "position": { "line": 0, "character": 15 },
            "new_name": "foo"
        }),
    );
    let edits = plan["edits"]["m.sv"].as_array().expect("edits");
    assert_eq!(edits.len(), 3);

    // The store was updated in place: the renamed symbol resolves at
    // its shifted position.
    let location = daemon.post(
        "/v1/definition",
        &json!({ "path": "m.sv", "position": { "line": 0, "character": 34 } }),
    );
    assert_eq!(location["range"]["start"]["character"], 15);
    assert_eq!(location["range"]["end"]["character"], 18);
}

#[test]
fn daemon_reindex_and_dump_round_trip() {
    let dir = tempdir().expect("tempdir");
    let stream = write_stream(dir.path(), &wire_stream());
    let daemon = TestDaemon::spawn(&stream);

    let summary = daemon.post("/v1/reindex", &json!(null));
    assert_eq!(summary["files"], 1);
    assert_eq!(summary["refs"], 2);

    let dump_path = dir.path().join("dump.db");
    daemon.post("/v1/dump", &json!({ "path": dump_path }));

    let store = svindex::IndexStore::open(&dump_path).expect("reopen dump");
    assert_eq!(store.get_symbols_by_name("a").expect("query").len(), 1);
}
