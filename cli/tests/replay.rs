//! End-to-end tests of the `boa-inspector` binary.

use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use indoc::indoc;
use serde_json::Value;

/// Runs the binary with `args`, feeding `input` on stdin.
fn run(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_boa-inspector"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start boa-inspector");
    let mut stdin = child.stdin.take().expect("stdin is piped");
    if !input.is_empty() {
        stdin
            .write_all(input.as_bytes())
            .expect("failed to write the session");
    }
    drop(stdin);
    child.wait_with_output().expect("boa-inspector did not exit")
}

/// Splits `Content-Length` framed output into JSON messages.
fn messages(stdout: &[u8]) -> Vec<Value> {
    let mut rest = std::str::from_utf8(stdout).expect("utf-8 output");
    let mut messages = Vec::new();
    while let Some((header, body)) = rest.split_once("\r\n\r\n") {
        let length: usize = header
            .strip_prefix("Content-Length: ")
            .and_then(|length| length.parse().ok())
            .expect("Content-Length header");
        messages.push(serde_json::from_str(&body[..length]).expect("JSON body"));
        rest = &body[length..];
    }
    messages
}

fn names(messages: &[Value]) -> Vec<&str> {
    messages
        .iter()
        .map(|message| {
            message["event"]
                .as_str()
                .or_else(|| message["command"].as_str())
                .expect("event or response")
        })
        .collect()
}

const SESSION: &str = indoc! {r#"
    # enable the agent and load a script
    {"type":"request","seq":1,"command":"enable"}
    {"type":"engine","action":{"op":"parseScript","script":{"scriptId":"1","url":"app.js","endLine":20}}}
    {"type":"request","seq":2,"command":"setBreakpointByUrl","arguments":{"url":"app.js","lineNumber":4}}

    # run into the breakpoint, inspect and step
    {"type":"engine","action":{"op":"call","frame":{"functionName":"main","scriptId":"1","lineNumber":0,"locals":{"n":3}}}}
    {"type":"engine","action":{"op":"execute","line":4}}
    {"type":"request","seq":3,"command":"evaluateOnCallFrame","arguments":{"callFrameId":"{\"ordinal\":0,\"epoch\":1}","expression":"n"}}
    {"type":"request","seq":4,"command":"stepOver"}
    {"type":"engine","action":{"op":"execute","line":5}}
    {"type":"request","seq":5,"command":"resume"}
    {"type":"engine","action":{"op":"return"}}
"#};

#[test]
fn replays_a_session_from_stdin() {
    let output = run(&["--framing", "lines"], SESSION);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let messages = messages(&output.stdout);
    assert_eq!(
        names(&messages),
        [
            "enable",
            "scriptParsed",
            "setBreakpointByUrl",
            "paused",
            "evaluateOnCallFrame",
            "stepOver",
            "resumed",
            "paused",
            "resume",
            "resumed",
        ]
    );
    assert_eq!(messages[2]["body"]["breakpointId"], "app.js:4:0");
    assert_eq!(messages[4]["body"]["result"]["value"], 3);
    assert_eq!(messages[7]["body"]["callFrames"][0]["location"]["lineNumber"], 5);
    assert_eq!(messages[7]["body"]["hitBreakpointIds"], serde_json::json!([]));
}

#[test]
fn config_files_set_the_async_depth() {
    let path = std::env::temp_dir().join(format!("boa-inspector-{}.toml", std::process::id()));
    std::fs::write(&path, "max-async-call-stack-depth = 4\n").expect("write config");

    let session = indoc! {r#"
        {"type":"request","seq":1,"command":"enable"}
        {"type":"engine","action":{"op":"parseScript","script":{"scriptId":"1","url":"app.js","endLine":9}}}
        {"type":"engine","action":{"op":"call","frame":{"functionName":"main","scriptId":"1","lineNumber":2}}}
        {"type":"engine","action":{"op":"startAsync","description":"setTimeout"}}
        {"type":"request","seq":2,"command":"flushAsyncOperationEvents"}
    "#};
    let output = run(
        &["--framing", "lines", "--config", path.to_str().expect("utf-8 path")],
        session,
    );
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let messages = messages(&output.stdout);
    assert_eq!(
        names(&messages),
        ["enable", "scriptParsed", "asyncOperationStarted", "flushAsyncOperationEvents"]
    );
    let operation = &messages[2]["body"]["operation"];
    assert_eq!(operation["id"], 1);
    assert_eq!(operation["stackTrace"]["description"], "setTimeout");
}

#[test]
fn missing_config_files_are_reported() {
    let output = run(&["--config", "/nonexistent/boa-inspector.toml"], "");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not read config file"));
}

#[test]
fn framed_stdin_is_the_default() {
    let body = r#"{"type":"request","seq":1,"command":"enable"}"#;
    let input = format!("Content-Length: {}\r\n\r\n{body}", body.len());
    let output = run(&[], &input);
    assert!(output.status.success());

    let messages = messages(&output.stdout);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "response");
    assert_eq!(messages[0]["success"], true);
    assert_eq!(messages[0]["request_seq"], 1);
}
