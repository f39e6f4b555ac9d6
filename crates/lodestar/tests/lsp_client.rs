//! Client behaviour against an in-process fake language server.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{initialized, initialized_with, workspace_uri, Harness};
use lodestar::lsp::{ClientOptions, ClientState, LspError, RequestId, RequestOptions};
use lsp_types::{DocumentSymbolResponse, HoverContents};
use serde_json::{json, Value};

fn location(uri: &str, line: u32) -> Value {
    json!({
        "uri": uri,
        "range": {
            "start": {"line": line, "character": 4},
            "end": {"line": line, "character": 10}
        }
    })
}

#[tokio::test]
async fn handshake_advertises_workspace_and_client() {
    let mut harness = Harness::new();
    let (reader, writer) = harness.client_streams();
    let (client, server) = (&harness.client, &mut harness.server);

    let (attached, initialize) = tokio::join!(client.attach(reader, writer), server.handshake());
    attached.expect("handshake");

    let params = &initialize["params"];
    assert!(params["processId"].is_u64());
    assert_eq!(params["clientInfo"]["name"], "lodestar");
    let root = params["rootUri"].as_str().expect("rootUri");
    assert!(root.starts_with("file://"), "{root}");
    assert_eq!(params["workspaceFolders"][0]["uri"], root);
    assert_eq!(
        params["capabilities"]["textDocument"]["definition"]["linkSupport"],
        true
    );

    assert_eq!(client.state(), ClientState::Initialized);
    let capabilities = client.server_capabilities().expect("stored");
    assert_eq!(capabilities["hoverProvider"], true);
}

#[tokio::test]
async fn missing_required_capability_fails_startup() {
    let mut harness = Harness::new();
    let (reader, writer) = harness.client_streams();
    let (client, server) = (&harness.client, &mut harness.server);

    let (attached, ()) = tokio::join!(client.attach(reader, writer), async {
        let initialize = server.expect_method("initialize").await;
        let result = json!({"capabilities": {"textDocumentSync": 1}});
        server.respond(&initialize, result).await;
    });

    let err = attached.expect_err("pyright needs definitionProvider");
    assert!(
        matches!(&err, LspError::MissingCapability { capability, .. } if capability == "definitionProvider"),
        "{err}"
    );
    assert_eq!(client.state(), ClientState::Error);
    assert_eq!(server.try_recv().await, None, "no initialized after failure");
}

#[tokio::test]
async fn initialize_error_response_fails_startup() {
    let mut harness = Harness::new();
    let (reader, writer) = harness.client_streams();
    let (client, server) = (&harness.client, &mut harness.server);

    let (attached, ()) = tokio::join!(client.attach(reader, writer), async {
        let initialize = server.expect_method("initialize").await;
        server
            .respond_error(&initialize, -32002, "workspace unreadable")
            .await;
    });

    assert!(matches!(
        attached,
        Err(LspError::ServerError { code: -32002, .. })
    ));
    assert_eq!(client.state(), ClientState::Error);

    client.stop().await.expect("stop");
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn definition_round_trip() {
    let mut harness = initialized().await;
    let uri = workspace_uri(&harness, "app.py");
    let target = uri.as_str().to_string();
    let (client, server) = (&harness.client, &mut harness.server);

    let (definition, ()) = tokio::join!(client.get_definition(&uri, 3, 8), async {
        let request = server.expect_method("textDocument/definition").await;
        assert_eq!(
            request["params"]["position"],
            json!({"line": 3, "character": 8})
        );
        assert_eq!(request["params"]["textDocument"]["uri"], target.as_str());
        server.respond(&request, json!([location(&target, 1)])).await;
    });

    let locations = definition.expect("definition").expect("found");
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].range.start.line, 1);
}

#[tokio::test]
async fn null_result_means_nothing_found() {
    let mut harness = initialized().await;
    let uri = workspace_uri(&harness, "app.py");
    let (client, server) = (&harness.client, &mut harness.server);

    let (definition, ()) = tokio::join!(client.get_definition(&uri, 0, 0), async {
        let request = server.expect_method("textDocument/definition").await;
        server.respond(&request, Value::Null).await;
    });

    assert_eq!(definition.expect("definition"), None);
}

#[tokio::test]
async fn hover_and_document_symbols_decode() {
    let mut harness = initialized().await;
    let uri = workspace_uri(&harness, "app.py");
    let target = uri.as_str().to_string();
    let (client, server) = (&harness.client, &mut harness.server);

    let (hover, ()) = tokio::join!(client.get_hover(&uri, 2, 4), async {
        let request = server.expect_method("textDocument/hover").await;
        let result = json!({"contents": {"kind": "markdown", "value": "def area(self) -> float"}});
        server.respond(&request, result).await;
    });
    let hover = hover.expect("hover").expect("present");
    assert!(matches!(hover.contents, HoverContents::Markup(ref m) if m.value.contains("area")));

    let (symbols, ()) = tokio::join!(client.get_document_symbols(&uri), async {
        let request = server.expect_method("textDocument/documentSymbol").await;
        let result = json!([{
            "name": "Shape",
            "kind": 5,
            "location": location(&target, 0)
        }]);
        server.respond(&request, result).await;
    });
    match symbols.expect("symbols").expect("present") {
        DocumentSymbolResponse::Flat(flat) => assert_eq!(flat[0].name, "Shape"),
        DocumentSymbolResponse::Nested(nested) => panic!("expected flat symbols, got {nested:?}"),
    }
}

#[tokio::test]
async fn responses_are_matched_by_id_not_order() {
    let mut harness = initialized().await;
    let uri = workspace_uri(&harness, "app.py");
    let target = uri.as_str().to_string();
    let (client, server) = (&harness.client, &mut harness.server);

    let hover = tokio::spawn({
        let client = Arc::clone(client);
        let uri = uri.clone();
        async move { client.get_hover(&uri, 1, 1).await }
    });
    let references = tokio::spawn({
        let client = Arc::clone(client);
        let uri = uri.clone();
        async move { client.get_references(&uri, 1, 1, true).await }
    });

    let first = server.recv().await;
    let second = server.recv().await;
    // Answer in reverse arrival order.
    for request in [&second, &first] {
        let result = match request["method"].as_str() {
            Some("textDocument/hover") => json!({"contents": "hover text"}),
            Some("textDocument/references") => {
                assert_eq!(request["params"]["context"]["includeDeclaration"], true);
                json!([location(&target, 4), location(&target, 9)])
            }
            other => panic!("unexpected method {other:?}"),
        };
        server.respond(request, result).await;
    }

    let hover = hover.await.expect("task").expect("hover").expect("present");
    assert!(matches!(hover.contents, HoverContents::Scalar(_)));
    let references = references
        .await
        .expect("task")
        .expect("references")
        .expect("present");
    assert_eq!(references.len(), 2);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn timeout_fails_the_call_and_late_response_is_dropped() {
    let options = ClientOptions {
        request_timeout: Duration::from_millis(100),
        ..ClientOptions::default()
    };
    let mut harness = initialized_with(options).await;
    let (client, server) = (&harness.client, &mut harness.server);

    let started = Instant::now();
    let (slow, request) = tokio::join!(
        client.send_request("custom/slow", None, RequestOptions::default()),
        server.expect_method("custom/slow")
    );
    let elapsed = started.elapsed();

    let err = slow.expect_err("no response in time");
    assert!(elapsed >= Duration::from_millis(100), "gave up early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "deadline overran: {elapsed:?}");
    assert!(
        matches!(&err, LspError::Timeout { method, .. } if method == "custom/slow"),
        "{err}"
    );
    assert_eq!(client.pending_requests(), 0);

    server.respond(&request, json!("too late")).await;

    let (next, ()) = tokio::join!(
        client.send_request("custom/fast", None, RequestOptions::default()),
        async {
            let request = server.expect_method("custom/fast").await;
            server.respond(&request, json!(42)).await;
        }
    );
    assert_eq!(next.expect("fast"), json!(42));
    assert_eq!(client.state(), ClientState::Initialized);
}

#[tokio::test]
async fn error_response_fails_only_that_call() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let (result, ()) = tokio::join!(
        client.send_request("custom/broken", Some(json!({})), RequestOptions::default()),
        async {
            let request = server.expect_method("custom/broken").await;
            server
                .respond_error(&request, -32603, "internal failure")
                .await;
        }
    );

    match result {
        Err(LspError::ServerError { code, message }) => {
            assert_eq!(code, -32603);
            assert_eq!(message, "internal failure");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(client.state(), ClientState::Initialized);
}

#[tokio::test]
async fn server_requests_are_answered() {
    let mut harness = initialized().await;
    let server = &mut harness.server;

    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": "cfg-1",
            "method": "workspace/configuration",
            "params": {"items": [{"section": "python"}, {"section": "python.analysis"}]}
        }))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], "cfg-1");
    assert_eq!(reply["result"], json!([null, null]));

    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "window/workDoneProgress/create",
            "params": {"token": "indexing"}
        }))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["result"], Value::Null);

    server
        .send(json!({"jsonrpc": "2.0", "id": 8, "method": "custom/unsupported"}))
        .await;
    let reply = server.recv().await;
    assert_eq!(reply["id"], 8);
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn notification_handlers_receive_params() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.on_notification("textDocument/publishDiagnostics", move |params| {
        let _ = tx.send(params);
    });

    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": {"type": 1, "message": "forwarded to tracing"}
        }))
        .await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": "file:///app.py", "diagnostics": []}
        }))
        .await;

    let params = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("handler called")
        .expect("channel open")
        .expect("params present");
    assert_eq!(params["uri"], "file:///app.py");
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    server.send_raw(b"Content-Length: 7\r\n\r\n{nope!}").await;

    let (result, ()) = tokio::join!(
        client.send_request("custom/after", None, RequestOptions::default()),
        async {
            let request = server.expect_method("custom/after").await;
            server.respond(&request, json!("still alive")).await;
        }
    );
    assert_eq!(result.expect("request"), json!("still alive"));
    assert_eq!(client.state(), ClientState::Initialized);
}

#[tokio::test]
async fn cancel_request_resolves_the_caller() {
    let mut harness = initialized().await;
    let id = RequestId::from("long-1");
    let (client, server) = (&harness.client, &mut harness.server);

    let call = tokio::spawn({
        let client = Arc::clone(client);
        async move {
            client
                .send_request("custom/long", None, RequestOptions::default().id("long-1"))
                .await
        }
    });
    let request = server.expect_method("custom/long").await;
    assert_eq!(request["id"], "long-1");

    assert!(client.cancel_request(&id).await.expect("cancel"));
    let cancel = server.expect_method("$/cancelRequest").await;
    assert_eq!(cancel["params"]["id"], "long-1");

    let result = call.await.expect("task");
    assert!(
        matches!(result, Err(LspError::Cancelled { id: ref cancelled }) if *cancelled == id)
    );
    assert_eq!(client.pending_requests(), 0);
    assert!(!client.cancel_request(&id).await.expect("already gone"));
}

#[tokio::test]
async fn duplicate_request_id_is_rejected() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let first = tokio::spawn({
        let client = Arc::clone(client);
        async move {
            client
                .send_request("custom/one", None, RequestOptions::default().id("dup"))
                .await
        }
    });
    let request = server.expect_method("custom/one").await;

    let err = client
        .send_request("custom/two", None, RequestOptions::default().id("dup"))
        .await
        .expect_err("id in flight");
    assert!(matches!(err, LspError::DuplicateRequestId(_)));

    server.respond(&request, json!(1)).await;
    assert_eq!(first.await.expect("task").expect("first"), json!(1));
}

#[tokio::test]
async fn document_notifications_are_sent() {
    let mut harness = initialized().await;
    let uri = workspace_uri(&harness, "app.py");
    let (client, server) = (&harness.client, &mut harness.server);

    client
        .did_open(&uri, "python", 1, "x = 1\n")
        .await
        .expect("didOpen");
    let open = server.expect_method("textDocument/didOpen").await;
    assert_eq!(open["params"]["textDocument"]["languageId"], "python");
    assert_eq!(open["params"]["textDocument"]["text"], "x = 1\n");
    assert!(open.get("id").is_none());

    client.did_close(&uri).await.expect("didClose");
    server.expect_method("textDocument/didClose").await;
}

#[tokio::test]
async fn stop_sends_shutdown_then_exit() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let (stopped, ()) = tokio::join!(client.stop(), async {
        let shutdown = server.expect_method("shutdown").await;
        server.respond(&shutdown, Value::Null).await;
        let exit = server.expect_method("exit").await;
        assert!(exit.get("id").is_none());
    });

    stopped.expect("stop");
    assert_eq!(client.state(), ClientState::Disconnected);
    assert_eq!(client.server_capabilities(), None);
    assert_eq!(server.try_recv().await, None);
}

#[tokio::test]
async fn hang_up_after_exit_is_a_clean_stop() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let (stopped, ()) = tokio::join!(client.stop(), async {
        let shutdown = server.expect_method("shutdown").await;
        server.respond(&shutdown, Value::Null).await;
        server.expect_method("exit").await;
        assert!(
            matches!(
                client.state(),
                ClientState::ShuttingDown | ClientState::Disconnected
            ),
            "client still {} when exit arrived",
            client.state()
        );
        server.hang_up().await;
    });

    stopped.expect("stop");
    assert_eq!(client.state(), ClientState::Disconnected);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn stop_proceeds_when_shutdown_times_out() {
    let options = ClientOptions {
        shutdown_timeout: Duration::from_millis(50),
        ..ClientOptions::default()
    };
    let mut harness = initialized_with(options).await;
    let (client, server) = (&harness.client, &mut harness.server);

    let (stopped, ()) = tokio::join!(client.stop(), async {
        server.expect_method("shutdown").await;
        server.expect_method("exit").await;
    });

    stopped.expect("stop");
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn stop_cancels_outstanding_requests() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let call = tokio::spawn({
        let client = Arc::clone(client);
        async move {
            client
                .send_request("custom/forever", None, RequestOptions::default())
                .await
        }
    });
    server.expect_method("custom/forever").await;

    let (stopped, ()) = tokio::join!(client.stop(), async {
        let shutdown = server.expect_method("shutdown").await;
        server.respond(&shutdown, Value::Null).await;
    });
    stopped.expect("stop");

    assert!(matches!(
        call.await.expect("task"),
        Err(LspError::Cancelled { .. })
    ));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn server_eof_fails_pending_requests_and_enters_error() {
    let mut harness = initialized().await;
    let (client, server) = (&harness.client, &mut harness.server);

    let call = tokio::spawn({
        let client = Arc::clone(client);
        async move {
            client
                .send_request("custom/doomed", None, RequestOptions::default())
                .await
        }
    });
    server.expect_method("custom/doomed").await;
    server.hang_up().await;

    assert!(matches!(
        call.await.expect("task"),
        Err(LspError::ServerExited)
    ));
    assert_eq!(client.state(), ClientState::Error);

    let err = client
        .send_request("custom/after", None, RequestOptions::default())
        .await
        .expect_err("gated");
    assert!(matches!(
        err,
        LspError::NotInitialized {
            state: ClientState::Error
        }
    ));

    client.stop().await.expect("stop");
    assert_eq!(client.state(), ClientState::Disconnected);
}
