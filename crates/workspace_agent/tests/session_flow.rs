mod support;

use std::sync::Arc;

use model_transport::{FinishReason, Message, Role, TransportError};
use model_transport_mock::{ScriptStep, ScriptedTransport};
use pretty_assertions::assert_eq;
use serde_json::Value;
use support::{
    lock_unpoisoned, plain_output, session, workspace, write_file, ScriptedLines, README,
};
use workspace_agent::commands::HELP_TEXT;
use workspace_agent::session::MAX_TOOL_ROUNDS;
use workspace_agent::{AgentConfig, AgentSession, FatalStartupError, SessionState};

fn tool_end() -> ScriptStep {
    ScriptStep::End(FinishReason::ToolCall)
}

fn tool_output(message: &Message) -> Value {
    serde_json::from_str(&message.content).expect("tool output is JSON")
}

#[test]
fn plain_text_turn_appends_one_user_and_one_assistant_message() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        ScriptStep::text("The workspace has "),
        ScriptStep::text("`main.py` and **READ"),
        ScriptStep::text("ME.md**."),
        ScriptStep::end(),
    ]]));
    let (mut session, trace) = session(dir.path(), transport.clone());

    let summary = session.conversation().workspace_summary().to_string();
    assert!(summary.contains("- main.py"));
    assert!(summary.contains("- README.md"));

    assert_eq!(session.handle_input("list files here"), SessionState::Idle);

    let history = session.conversation().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("list files here"));
    assert_eq!(
        history[1],
        Message::assistant("The workspace has `main.py` and **README.md**.")
    );
    assert_eq!(session.renderer().buffer(), "");

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].workspace_summary, summary);
    assert_eq!(requests[0].tools[0].name, "read_file");

    let output = plain_output(&trace);
    assert!(output.contains("Assistant:"));
    assert!(output.contains("The workspace has main.py and README.md."));
    assert!(!output.contains("**"));
}

#[test]
fn read_file_result_is_appended_before_the_follow_up_request() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![ScriptStep::read_file("call-1", "README.md"), tool_end()],
        vec![ScriptStep::text("It is a demo project."), ScriptStep::end()],
    ]));
    let (mut session, _trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("what is in the readme?"), SessionState::Idle);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let follow_up = &requests[1].messages;
    assert_eq!(follow_up.len(), 3);
    assert_eq!(follow_up[1].role, Role::Assistant);
    assert_eq!(follow_up[1].tool_calls.len(), 1);
    assert_eq!(follow_up[2].role, Role::Tool);
    assert_eq!(follow_up[2].tool_call_id.as_deref(), Some("call-1"));

    let output = tool_output(&follow_up[2]);
    assert_eq!(output["content"], README);
    assert_eq!(output["file_path"], "README.md");
    assert_eq!(output["truncated"], false);

    let history = session.conversation().history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], Message::assistant("It is a demo project."));
}

#[test]
fn traversal_request_becomes_an_error_result_and_the_turn_continues() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![ScriptStep::read_file("call-1", "../../etc/passwd"), tool_end()],
        vec![ScriptStep::text("That file is outside the workspace."), ScriptStep::end()],
    ]));
    let (mut session, _trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("show /etc/passwd"), SessionState::Idle);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let tool_message = &requests[1].messages[2];
    let output = tool_output(tool_message);
    assert!(output["error"]
        .as_str()
        .is_some_and(|error| error.contains("escapes the workspace root")));
    assert!(output.get("content").is_none());
    // The error names the rejected path but never the file's lines.
    assert!(!tool_message.content.contains("root:x:0:0"));
    assert_eq!(session.conversation().len(), 4);
}

#[test]
fn every_pending_call_gets_one_result_in_request_order() {
    let dir = workspace();
    write_file(dir.path(), "a.txt", "alpha");
    write_file(dir.path(), "b.txt", "beta");
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![
            ScriptStep::text("Reading three files."),
            ScriptStep::read_file("c1", "a.txt"),
            ScriptStep::read_file("c2", "missing.txt"),
            ScriptStep::read_file("c3", "b.txt"),
            tool_end(),
        ],
        vec![ScriptStep::text("Done."), ScriptStep::end()],
    ]));
    let (mut session, _trace) = session(dir.path(), transport.clone());

    session.handle_input("read them all");

    let follow_up = &transport.requests()[1].messages;
    let tool_ids: Vec<_> = follow_up
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| message.tool_call_id.clone().unwrap_or_default())
        .collect();
    assert_eq!(tool_ids, vec!["c1", "c2", "c3"]);
    assert_eq!(follow_up[1].content, "Reading three files.");

    assert_eq!(tool_output(&follow_up[2])["content"], "alpha");
    assert!(tool_output(&follow_up[3])["error"]
        .as_str()
        .is_some_and(|error| error.contains("not found")));
    assert_eq!(tool_output(&follow_up[4])["content"], "beta");
}

#[test]
fn round_without_tool_calls_leaves_no_tool_messages() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        ScriptStep::text("hi"),
        ScriptStep::end(),
    ]]));
    let (mut session, _trace) = session(dir.path(), transport);

    session.handle_input("hello");
    assert_eq!(session.conversation().count_role(Role::Tool), 0);
}

#[test]
fn text_from_each_round_is_separated_on_screen() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![
            ScriptStep::text("Let me check."),
            ScriptStep::read_file("c1", "main.py"),
            tool_end(),
        ],
        vec![ScriptStep::text("It prints hello."), ScriptStep::end()],
    ]));
    let (mut session, trace) = session(dir.path(), transport);

    session.handle_input("what does main.py do?");

    let output = plain_output(&trace);
    assert!(output.contains("Let me check."));
    assert!(output.contains("It prints hello."));
    let history = session.conversation().history();
    assert_eq!(history.last(), Some(&Message::assistant("It prints hello.")));
}

#[test]
fn transport_error_is_reported_and_history_is_unchanged() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![
            ScriptStep::text("partial "),
            ScriptStep::Fail(TransportError::Status {
                status: 500,
                message: "internal error".to_string(),
            }),
        ],
        vec![ScriptStep::text("recovered"), ScriptStep::end()],
    ]));
    let (mut session, trace) = session(dir.path(), transport);

    assert_eq!(session.handle_input("first"), SessionState::Idle);
    assert!(session.conversation().is_empty());
    assert!(plain_output(&trace).contains("Error: HTTP 500: internal error"));

    session.handle_input("second");
    assert_eq!(
        session.conversation().history(),
        [Message::user("second"), Message::assistant("recovered")]
    );
}

#[test]
fn failure_after_a_tool_round_discards_the_whole_turn() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![ScriptStep::read_file("c1", "README.md"), tool_end()],
        vec![ScriptStep::Fail(TransportError::Stream("connection reset".to_string()))],
    ]));
    let (mut session, _trace) = session(dir.path(), transport);

    session.handle_input("read the readme");
    assert!(session.conversation().is_empty());
    assert!(!session.conversation().turn_open());
}

#[test]
fn stream_without_end_marker_is_a_protocol_error() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![ScriptStep::text("cut off")]]));
    let (mut session, trace) = session(dir.path(), transport);

    assert_eq!(session.handle_input("hello"), SessionState::Idle);
    assert!(session.conversation().is_empty());
    assert!(plain_output(&trace).contains("end-of-turn marker"));
}

#[test]
fn runaway_tool_loop_is_abandoned_after_the_round_limit() {
    let dir = workspace();
    let scripts = (0..=MAX_TOOL_ROUNDS)
        .map(|round| vec![ScriptStep::read_file(format!("c{round}"), "main.py"), tool_end()])
        .collect();
    let transport = Arc::new(ScriptedTransport::new(scripts));
    let (mut session, trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("loop forever"), SessionState::Idle);
    assert_eq!(transport.requests().len(), MAX_TOOL_ROUNDS + 1);
    assert!(session.conversation().is_empty());
    assert!(plain_output(&trace).contains("protocol violation"));
}

#[test]
fn help_prints_commands_without_touching_history() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::default());
    let (mut session, trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("help"), SessionState::Idle);
    assert_eq!(session.handle_input("/HELP"), SessionState::Idle);
    assert!(session.conversation().is_empty());
    assert!(transport.requests().is_empty());
    assert!(plain_output(&trace).contains("- rescan: Rescan current directory"));
    assert!(plain_output(&trace).contains(HELP_TEXT.lines().last().unwrap_or_default()));
}

#[test]
fn clear_wipes_the_screen_and_keeps_the_conversation() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        ScriptStep::text("hi"),
        ScriptStep::end(),
    ]]));
    let (mut session, trace) = session(dir.path(), transport);

    session.handle_input("hello");
    let before = session.conversation().clone();
    session.handle_input("clear");

    assert_eq!(session.conversation(), &before);
    let raw = support::lock_unpoisoned(&trace).writes.concat();
    let after_clear = raw.rsplit("\x1b[2J").next().unwrap_or_default();
    assert!(after_clear.contains("Type 'help' for available commands"));
}

#[test]
fn rescan_twice_yields_identical_summaries() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::default());
    let (mut session, trace) = session(dir.path(), transport);

    write_file(dir.path(), "src/lib.rs", "pub fn demo() {}\n");
    session.handle_input("rescan");
    let first = session.conversation().workspace_summary().to_string();
    session.handle_input("rescan");
    let second = session.conversation().workspace_summary().to_string();

    assert_eq!(first, second);
    assert!(first.contains("- src/lib.rs"));
    assert!(plain_output(&trace).contains("Workspace rescanned (3 files)"));
}

#[test]
fn exit_terminates_and_ignores_later_input() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::default());
    let (mut session, trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("  Exit "), SessionState::Terminated);
    assert_eq!(session.handle_input("hello"), SessionState::Terminated);
    assert!(transport.requests().is_empty());
    assert!(plain_output(&trace).contains("Goodbye!"));
}

#[test]
fn unknown_slash_input_is_sent_as_chat() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        ScriptStep::text("ok"),
        ScriptStep::end(),
    ]]));
    let (mut session, _trace) = session(dir.path(), transport.clone());

    session.handle_input("/model fast");
    assert_eq!(
        transport.requests()[0].messages,
        vec![Message::user("/model fast")]
    );
}

#[test]
fn blank_input_does_nothing() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::default());
    let (mut session, _trace) = session(dir.path(), transport.clone());

    assert_eq!(session.handle_input("   "), SessionState::Idle);
    assert!(transport.requests().is_empty());
}

#[test]
fn run_loop_prompts_until_exit() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        ScriptStep::text("Hello there."),
        ScriptStep::end(),
    ]]));
    let (mut session, trace) = session(dir.path(), transport);

    session
        .run(&mut ScriptedLines::new(&["hi", "exit", "never read"]))
        .expect("loop runs");

    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.conversation().len(), 2);
    let output = plain_output(&trace);
    assert!(output.contains("(2 files indexed)"));
    assert_eq!(output.matches("You: ").count(), 2);
    assert!(output.contains("Hello there."));
}

#[test]
fn end_of_input_terminates_cleanly() {
    let dir = workspace();
    let (mut session, trace) = session(dir.path(), Arc::new(ScriptedTransport::default()));

    session.run(&mut ScriptedLines::new(&[])).expect("loop runs");

    assert_eq!(session.state(), SessionState::Terminated);
    assert!(plain_output(&trace).contains("Goodbye!"));
}

#[test]
fn inaccessible_workspace_root_is_fatal() {
    let dir = workspace();
    let (terminal, _trace) = support::SharedTerminal::new(80, 24);
    let renderer = inkstream::StreamRenderer::new(terminal, inkstream::MarkdownRenderer::plain());
    let result = AgentSession::new(
        AgentConfig::new(dir.path().join("missing")),
        Arc::new(ScriptedTransport::default()),
        renderer,
    );
    assert!(matches!(result, Err(FatalStartupError::WorkspaceRoot { .. })));
}

#[test]
fn model_supplied_paths_are_shown_without_control_sequences() {
    let dir = workspace();
    let transport = Arc::new(ScriptedTransport::new(vec![
        vec![
            ScriptStep::read_file("c1", "notes\x1b]0;owned\x07\x1b[2J\n.txt"),
            tool_end(),
        ],
        vec![ScriptStep::text("No such file."), ScriptStep::end()],
    ]));
    let (mut session, trace) = session(dir.path(), transport);

    assert_eq!(session.handle_input("read the notes"), SessionState::Idle);

    let raw = lock_unpoisoned(&trace).writes.concat();
    assert!(!raw.contains("\x1b]0;owned"));
    assert!(!raw.contains("\x1b[2J"));
    assert!(plain_output(&trace).contains("No such file."));
}
