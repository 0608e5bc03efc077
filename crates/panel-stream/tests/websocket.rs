use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use panel_stream::transport::WebSocketConnector;
use panel_stream::{
    CloseCause, Connector, ControlFrame, Credential, Dimensions, IdentityResolver, LogCategory,
    MemorySink, MountContext, SessionController, SessionIdentity, SessionState, StaticCredential,
    Transport, TransportError, TransportEventKind, TransportId,
};
use tokio::sync::mpsc;

const TOKEN: &str = "test-token";

async fn terminal(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let authorized = params.get("token").map(String::as_str) == Some(TOKEN);
    let site = params.get("site_id").cloned();
    ws.on_upgrade(move |socket| fake_shell(socket, authorized, site))
}

/// Holds the shell until the first resize, then prompts and echoes input.
async fn fake_shell(mut socket: WebSocket, authorized: bool, site: Option<String>) {
    if !authorized {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    let mut sized = false;
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        match ControlFrame::decode(&text) {
            Ok(ControlFrame::Resize { cols, rows }) => {
                if !sized {
                    sized = true;
                    let prompt = match &site {
                        Some(site) => format!("[{cols}x{rows}] {site}$ "),
                        None => "$ ".to_string(),
                    };
                    if socket.send(Message::Text(prompt)).await.is_err() {
                        return;
                    }
                }
            }
            Ok(ControlFrame::Input { data }) if sized => {
                if data == "exit\r" {
                    close_gracefully(socket).await;
                    return;
                }
                if socket.send(Message::Binary(data.into_bytes())).await.is_err() {
                    return;
                }
            }
            _ => {
                let _ = socket
                    .send(Message::Text("protocol violation".into()))
                    .await;
                return;
            }
        }
    }
}

async fn logs(
    ws: WebSocketUpgrade,
    Path((category, resource)): Path<(String, String)>,
) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        // Nothing is tailed until the client has reported its size.
        loop {
            match socket.recv().await {
                Some(Ok(Message::Text(text))) => {
                    if ControlFrame::decode(&text).is_ok_and(|frame| frame.is_resize()) {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            }
        }
        for line in 1..=3 {
            let text = format!("{category}/{resource} line {line}\n");
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        close_gracefully(socket).await;
    })
}

/// Send a close frame and wait for the client to acknowledge it.
async fn close_gracefully(mut socket: WebSocket) {
    if socket.send(Message::Close(None)).await.is_err() {
        return;
    }
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/ws/terminal", get(terminal))
        .route("/ws/logs/:category/:resource", get(logs));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A terminal endpoint that forwards every text message it receives.
async fn spawn_recorder() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let record = move |ws: WebSocketUpgrade| {
        let tx = tx.clone();
        async move {
            ws.on_upgrade(move |mut socket| async move {
                while let Some(Ok(message)) = socket.recv().await {
                    if let Message::Text(text) = message {
                        if tx.send(text).is_err() {
                            return;
                        }
                    }
                }
            })
        }
    };
    let app = Router::new().route("/ws/terminal", get(record));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, rx)
}

fn controller(
    addr: SocketAddr,
    context: MountContext,
    sink: &MemorySink,
) -> SessionController<MemorySink, WebSocketConnector> {
    SessionController::new(
        context,
        IdentityResolver::new(format!("http://{addr}")).unwrap(),
        Arc::new(StaticCredential::new(TOKEN)),
        WebSocketConnector::new(),
        sink.clone(),
    )
}

/// Feed transport events to the controller until `done` holds.
async fn drive_until<F>(
    controller: &mut SessionController<MemorySink, WebSocketConnector>,
    mut done: F,
) where
    F: FnMut(&SessionController<MemorySink, WebSocketConnector>) -> bool,
{
    let wait = async {
        while !done(&*controller) {
            let Some(event) = controller.next_event().await else {
                break;
            };
            controller.handle_event(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for session");
}

#[tokio::test]
async fn shell_round_trip_over_websocket() {
    let addr = spawn_backend().await;
    let sink = MemorySink::with_dimensions(80, 24);
    let mut controller = controller(addr, MountContext::global_shell(), &sink);
    controller.mount().unwrap();

    drive_until(&mut controller, |_| sink.text() == "$ ").await;
    assert_eq!(controller.state(), SessionState::Open);

    controller.send_input("echo hi\r");
    drive_until(&mut controller, |_| sink.text().ends_with("echo hi\r")).await;

    controller.send_input("exit\r");
    drive_until(&mut controller, |c| !c.state().is_live()).await;
    assert_eq!(
        controller.state(),
        SessionState::Closed(CloseCause::Remote)
    );
}

#[tokio::test]
async fn scoped_shell_sends_site_and_size() {
    let addr = spawn_backend().await;
    let sink = MemorySink::with_dimensions(120, 40);
    let mut controller = controller(addr, MountContext::shell(Some("42".into())), &sink);
    controller.mount().unwrap();

    drive_until(&mut controller, |_| sink.text().contains("$ ")).await;
    assert_eq!(sink.text(), "[120x40] 42$ ");
}

#[tokio::test]
async fn log_tail_streams_until_backend_closes() {
    let addr = spawn_backend().await;
    let sink = MemorySink::with_dimensions(80, 24);
    let context = MountContext::logs(Some("shop".into()), LogCategory::Webserver);
    let mut controller = controller(addr, context, &sink);
    controller.mount().unwrap();
    controller.start().unwrap();

    drive_until(&mut controller, |c| {
        c.state() == SessionState::Closed(CloseCause::Remote)
    })
    .await;

    assert_eq!(
        sink.text(),
        concat!(
            "\x1b[34m[STREAMING] webserver logs for shop\x1b[0m\r\n",
            "nginx/shop line 1\n",
            "nginx/shop line 2\n",
            "nginx/shop line 3\n",
            "\r\n\x1b[31m[CONNECTION CLOSED]\x1b[0m\r\n",
        )
    );
}

#[tokio::test]
async fn unreachable_backend_errors() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = MemorySink::with_dimensions(80, 24);
    let mut controller = controller(addr, MountContext::global_shell(), &sink);
    controller.mount().unwrap();

    drive_until(&mut controller, |c| c.state() == SessionState::Errored).await;
    assert!(sink.text().contains("[CONNECTION ERROR]"));
}

#[tokio::test]
async fn stop_closes_the_socket_quietly() {
    let addr = spawn_backend().await;
    let sink = MemorySink::with_dimensions(80, 24);
    let mut controller = controller(addr, MountContext::global_shell(), &sink);
    controller.mount().unwrap();
    drive_until(&mut controller, |_| sink.text() == "$ ").await;

    assert!(controller.stop());

    // Anything still queued belongs to the stopped transport.
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.poll_events();
    assert_eq!(
        controller.state(),
        SessionState::Closed(CloseCause::Stopped)
    );
    assert_eq!(sink.text(), "$ ");
}

#[tokio::test]
async fn sends_before_the_handshake_are_refused() {
    let (addr, mut received) = spawn_recorder().await;
    let target = IdentityResolver::new(format!("http://{addr}"))
        .unwrap()
        .resolve(&SessionIdentity::Global, &Credential::new(TOKEN).unwrap())
        .unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut transport = WebSocketConnector::new().connect(&target, TransportId::next(), events_tx);

    let early = ControlFrame::input("rm").encode().unwrap();
    assert_eq!(transport.send_text(early), Err(TransportError::NotOpen));

    let opened = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for open")
        .unwrap();
    assert_eq!(opened.kind, TransportEventKind::Opened);

    let resize = ControlFrame::resize(Dimensions::new(80, 24));
    transport.send_text(resize.encode().unwrap()).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(10), received.recv())
        .await
        .expect("timed out waiting for the backend")
        .unwrap();
    assert_eq!(ControlFrame::decode(&first).unwrap(), resize);

    transport.close();
    assert_eq!(
        transport.send_text(ControlFrame::input("ls").encode().unwrap()),
        Err(TransportError::Closed)
    );
}
