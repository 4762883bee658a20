//! End-to-end runs of the agent against an in-process desk.

use desk::Desk;
use mcp::Client;
use runtime::{
    Agent, AgentConfig, Conversation, Error, McpToolHost, ModelError, Role, ScriptedBackend,
    ToolCall, ToolError, ToolResult,
};
use serde_json::json;
use tokio::io::{BufReader, duplex};

async fn desk_host() -> McpToolHost {
    let (client_io, host_io) = duplex(64 * 1024);
    tokio::spawn(async move {
        let (read, write) = tokio::io::split(host_io);
        mcp::serve(&Desk::seeded(), BufReader::new(read), write).await
    });
    let (read, write) = tokio::io::split(client_io);
    McpToolHost::connect(Client::connect("desk", read, write), None)
        .await
        .unwrap()
}

fn results(conversation: &Conversation, index: usize) -> Vec<ToolResult> {
    let message = &conversation.messages()[index];
    assert_eq!(message.role, Role::User);
    message.results().cloned().collect()
}

#[tokio::test]
async fn purchase_total() {
    let backend = ScriptedBackend::new()
        .tool_calls([ToolCall::new(
            "call_1",
            "calculate_account_value",
            json!({"customer_id": "12345", "purchase_history": [150, 300, 89]}),
        )])
        .text("The total is $539.00 across 3 purchases, averaging $179.67.");
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    let answer = agent
        .run(&mut conversation, "Calculate total for purchases $150, $300, $89")
        .await
        .unwrap();

    assert_eq!(answer.rounds, 1);
    assert!(answer.text.contains("539"));

    match &results(&conversation, 2)[..] {
        [ToolResult::Success { tool_call_id, output }] => {
            assert_eq!(tool_call_id, "call_1");
            assert_eq!(output["total_value"], 539.0);
            assert_eq!(output["average_purchase"], 179.67);
            assert_eq!(output["purchase_count"], 3);
        }
        other => panic!("unexpected results: {other:?}"),
    }

    // The second model call saw the tool result.
    let requests = agent.backend().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(
        requests[0].tools,
        vec![
            "get_recent_customers",
            "create_support_ticket",
            "calculate_account_value"
        ]
    );
}

#[tokio::test]
async fn ticket_for_missing_customer_still_gets_a_reply() {
    let backend = ScriptedBackend::new()
        .tool_calls([ToolCall::new(
            "call_1",
            "create_support_ticket",
            json!({
                "customer_id": "00000",
                "subject": "Login Issues",
                "description": "Cannot access account",
                "priority": "high"
            }),
        )])
        .text("I couldn't find customer 00000. Could you double-check the ID?");
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    let answer = agent
        .run(&mut conversation, "Open a ticket for customer 00000")
        .await
        .unwrap();
    assert!(answer.text.contains("00000"));

    match &results(&conversation, 2)[..] {
        [ToolResult::Failure { error: ToolError::Domain(message), .. }] => {
            assert!(message.contains("00000"));
        }
        other => panic!("unexpected results: {other:?}"),
    }
}

#[tokio::test]
async fn bad_priority_is_handed_back_to_the_model() {
    let backend = ScriptedBackend::new()
        .tool_calls([ToolCall::new(
            "call_1",
            "create_support_ticket",
            json!({"customer_id": "12345", "subject": "s", "description": "d", "priority": "High"}),
        )])
        .tool_calls([ToolCall::new(
            "call_2",
            "create_support_ticket",
            json!({"customer_id": "12345", "subject": "s", "description": "d", "priority": "high"}),
        )])
        .text("Ticket created.");
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    let answer = agent.run(&mut conversation, "open a ticket").await.unwrap();
    assert_eq!(answer.rounds, 2);
    assert!(matches!(
        &results(&conversation, 2)[..],
        [ToolResult::Failure { error: ToolError::InvalidInput(_), .. }]
    ));
    match &results(&conversation, 4)[..] {
        [ToolResult::Success { output, .. }] => {
            assert_eq!(output["status"], "open");
            assert!(output["ticket_id"].as_str().unwrap().starts_with("TICKET-"));
        }
        other => panic!("unexpected results: {other:?}"),
    }
}

#[tokio::test]
async fn several_rounds_then_done() {
    let backend = ScriptedBackend::new()
        .tool_calls([ToolCall::new("a", "get_recent_customers", json!({"limit": 1}))])
        .tool_calls([
            ToolCall::new("b", "get_recent_customers", json!({})),
            ToolCall::new(
                "c",
                "calculate_account_value",
                json!({"customer_id": "67890", "purchase_history": []}),
            ),
        ])
        .tool_calls([ToolCall::new("d", "made_up_tool", json!({}))])
        .text("All done.");
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    let answer = agent.run(&mut conversation, "summarize").await.unwrap();
    assert_eq!(answer.text, "All done.");
    assert_eq!(answer.rounds, 3);
    assert_eq!(answer.usage.output_tokens, 4);
    assert_eq!(conversation.last_reply().as_deref(), Some("All done."));

    let second = results(&conversation, 4);
    assert_eq!(
        second.iter().map(|r| r.tool_call_id()).collect::<Vec<_>>(),
        vec!["b", "c"]
    );
    match &second[1] {
        ToolResult::Success { output, .. } => {
            assert_eq!(output["total_value"], 0.0);
            assert_eq!(output["purchase_count"], 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(matches!(
        &results(&conversation, 6)[..],
        [ToolResult::Failure { error: ToolError::UnknownOperation(_), .. }]
    ));
}

#[tokio::test]
async fn round_limit_ends_the_run() {
    let mut backend = ScriptedBackend::new();
    for i in 0..5 {
        backend = backend.tool_calls([ToolCall::new(
            format!("call_{i}"),
            "get_recent_customers",
            json!({}),
        )]);
    }
    let config = AgentConfig::default().max_rounds(3);
    let agent = Agent::new(backend, desk_host().await, config).unwrap();

    let err = agent
        .run(&mut Conversation::new(), "keep going")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RoundLimit(3)));
    assert_eq!(agent.backend().remaining(), 1);
}

#[tokio::test]
async fn conversation_continues_across_runs() {
    let backend = ScriptedBackend::new()
        .text("Hello! How can I help?")
        .tool_calls([ToolCall::new("x", "get_recent_customers", json!({"limit": 2}))])
        .text("Alice and Bob.");
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    agent.run(&mut conversation, "hi").await.unwrap();
    let answer = agent
        .run(&mut conversation, "who are my customers?")
        .await
        .unwrap();

    assert_eq!(answer.text, "Alice and Bob.");
    assert_eq!(conversation.len(), 6);
    assert_eq!(agent.backend().requests()[1].messages.len(), 3);
}

#[tokio::test]
async fn provider_failure_after_a_tool_round() {
    let backend = ScriptedBackend::new()
        .tool_calls([ToolCall::new("a", "get_recent_customers", json!({}))])
        .fail(ModelError::Network("connection reset".into()));
    let agent = Agent::new(backend, desk_host().await, AgentConfig::default()).unwrap();
    let mut conversation = Conversation::new();

    let err = agent
        .run(&mut conversation, "who are my customers?")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(ModelError::Network(_))));

    // user, assistant with one call, its result; nothing dangling.
    assert_eq!(conversation.len(), 3);
    assert!(conversation.pending_calls().is_empty());
    assert_eq!(
        results(&conversation, 2)
            .iter()
            .map(|r| r.tool_call_id())
            .collect::<Vec<_>>(),
        vec!["a"]
    );
    assert_eq!(agent.backend().requests().len(), 2);
}
