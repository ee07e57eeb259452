use super::*;

#[tokio::test]
async fn functional_content_and_split_tool_arguments_flow_through_turn() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = ScriptedClient::new(vec![
        vec![
            text("Hel"),
            text("lo"),
            tool_start(0, "call_1", "lookup"),
            tool_args(0, "{\"id\":"),
            tool_args(0, "\"42\"}"),
            Ok(StreamEvent::finished("tool_calls")),
        ],
        vec![text("Record 42 "), text("is active.")],
    ]);
    let orchestrator = orchestrator(client.clone(), recording_router(seen.clone()));
    let (sender, receiver) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run_turn(
            TurnInput::new("v-1", vec![Message::user("status of 42?")]),
            &sender,
        )
        .await
        .expect("turn completes");
    drop(sender);

    assert_eq!(
        drain(receiver).await,
        vec!["Hel", "Hello", "Record 42 ", "Record 42 is active."]
    );
    assert_eq!(*seen.lock().expect("seen lock"), vec![json!({"id": "42"})]);
    assert_eq!(outcome.content, "Record 42 is active.");
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        outcome.tool_output("lookup"),
        Some(&json!({"record": "42", "status": "active"}))
    );
}

#[tokio::test]
async fn functional_outcome_history_holds_tool_context_and_final_answer() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = ScriptedClient::new(vec![
        vec![tool_start(0, "call_1", "lookup"), tool_args(0, "{\"id\":\"7\"}")],
        vec![text("Done.")],
    ]);
    let orchestrator = orchestrator(client.clone(), recording_router(seen));

    let outcome = orchestrator
        .run_turn(
            TurnInput::new("v-1", vec![Message::user("check 7")]),
            &DiscardSink,
        )
        .await
        .expect("turn completes");

    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.messages[0], Message::user("check 7"));
    assert_eq!(outcome.messages[1].role, MessageRole::System);
    assert!(outcome.messages[1]
        .content
        .starts_with("\nTool Result (lookup):\n"));
    assert_eq!(outcome.messages[2], Message::assistant("Done."));

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0].name, "lookup");
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(requests[1].messages[3], outcome.messages[1]);
}

#[tokio::test]
async fn regression_sink_chunks_never_shrink_within_a_sub_turn() {
    let client = ScriptedClient::new(vec![vec![
        text("a"),
        text(""),
        text("b"),
        Ok(StreamEvent::default()),
        text("c"),
    ]]);
    let orchestrator = orchestrator(client, recording_router(Arc::new(Mutex::new(Vec::new()))));
    let (sender, receiver) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run_turn(TurnInput::new("v-1", Vec::new()), &sender)
        .await
        .expect("turn completes");
    drop(sender);

    let chunks = drain(receiver).await;
    assert_eq!(chunks, vec!["a", "ab", "abc"]);
    assert!(chunks.windows(2).all(|pair| pair[1].starts_with(&pair[0])));
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn regression_closed_sink_cancels_turn_before_more_content() {
    let client = ScriptedClient::new(vec![vec![text("Hel"), text("lo")]]);
    let orchestrator = orchestrator(client, recording_router(Arc::new(Mutex::new(Vec::new()))));
    let (sender, receiver) = mpsc::unbounded_channel::<String>();
    drop(receiver);

    let error = orchestrator
        .run_turn(TurnInput::new("v-1", Vec::new()), &sender)
        .await
        .expect_err("closed sink cancels");
    assert!(matches!(error, OrchestratorError::Cancelled));
}

#[tokio::test]
async fn functional_sink_closed_during_tool_call_lets_call_finish_then_cancels() {
    let (sender, receiver) = mpsc::unbounded_channel::<String>();
    let receiver = Arc::new(Mutex::new(Some(receiver)));
    let executions = Arc::new(AtomicUsize::new(0));

    let mut registry = ToolRegistry::new();
    let closer = Arc::clone(&receiver);
    let counter = Arc::clone(&executions);
    registry
        .register(ToolDescriptor::new(
            "slow_lookup",
            "Closes the caller while running",
            json!({"type": "object"}),
            move |_arguments: Value| {
                let closer = Arc::clone(&closer);
                let counter = Arc::clone(&counter);
                async move {
                    closer.lock().expect("receiver lock").take();
                    tokio::task::yield_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"finished": true}))
                }
            },
        ))
        .expect("register slow_lookup");

    let client = ScriptedClient::new(vec![
        vec![
            tool_start(0, "call_1", "slow_lookup"),
            tool_start(1, "call_2", "slow_lookup"),
        ],
        vec![text("never requested")],
    ]);
    let orchestrator = orchestrator(
        client.clone(),
        Arc::new(ToolRouter::from_registries([registry])),
    );

    let error = orchestrator
        .run_turn(TurnInput::new("v-1", Vec::new()), &sender)
        .await
        .expect_err("turn is cancelled");
    assert!(matches!(error, OrchestratorError::Cancelled));
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn regression_model_stream_fault_fails_the_turn() {
    let client = ScriptedClient::new(vec![vec![
        text("partial"),
        Err(AisleAiError::InvalidResponse("connection reset".to_string())),
    ]]);
    let orchestrator = orchestrator(client, recording_router(Arc::new(Mutex::new(Vec::new()))));

    let error = orchestrator
        .run_turn(TurnInput::new("v-1", Vec::new()), &DiscardSink)
        .await
        .expect_err("stream fault");
    assert!(matches!(error, OrchestratorError::Model(_)));
    assert_eq!(error.code(), ErrorCode::InternalError);
}

#[tokio::test]
async fn functional_subscribers_observe_turn_lifecycle_in_order() {
    let client = ScriptedClient::new(vec![
        vec![tool_start(0, "call_1", "lookup"), tool_args(0, "{}")],
        vec![text("ok")],
    ]);
    let mut orchestrator =
        orchestrator(client, recording_router(Arc::new(Mutex::new(Vec::new()))));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    orchestrator.subscribe(move |event| {
        let label = match event {
            TurnEvent::TurnStart { iteration } => format!("turn_start:{iteration}"),
            TurnEvent::ContentUpdated { chars, .. } => format!("content:{chars}"),
            TurnEvent::ToolExecutionStart { tool_name, .. } => format!("tool_start:{tool_name}"),
            TurnEvent::ToolExecutionEnd {
                tool_name, success, ..
            } => format!("tool_end:{tool_name}:{success}"),
            TurnEvent::TurnEnd {
                iteration,
                tool_calls,
                ..
            } => format!("turn_end:{iteration}:{tool_calls}"),
        };
        sink.lock().expect("events lock").push(label);
    });
    orchestrator.subscribe(|_event| panic!("faulty subscriber"));

    orchestrator
        .run_turn(TurnInput::new("v-1", Vec::new()), &DiscardSink)
        .await
        .expect("turn completes");

    assert_eq!(
        *events.lock().expect("events lock"),
        vec![
            "turn_start:0",
            "tool_start:lookup",
            "tool_end:lookup:true",
            "turn_end:0:1",
            "turn_start:1",
            "content:2",
            "turn_end:1:0",
        ]
    );
}
