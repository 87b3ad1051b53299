//! End-to-end tests over a real TCP socket.
//!
//! Each test binds a server to an ephemeral port, runs the accept loop on a
//! background thread and speaks the line protocol one connection per request.

use alopex_tscache::{Dispatcher, Server, ServerConfig};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

fn start_server(config: ServerConfig) -> SocketAddr {
    let config = config.with_bind_addr("127.0.0.1:0");
    let server = Server::bind(&config, Dispatcher::default()).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());
    addr
}

/// Sends one request line and returns the single response line.
fn request(addr: SocketAddr, line: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(line.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();

    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).unwrap();

    // The server closes the connection after one response.
    let mut rest = String::new();
    assert_eq!(reader.read_line(&mut rest).unwrap(), 0);

    reply.trim_end().to_string()
}

// ============================================================================
// Registry verbs
// ============================================================================

#[test]
fn test_ping() {
    let addr = start_server(ServerConfig::default());
    assert_eq!(request(addr, "PING"), "PONG");
    assert_eq!(request(addr, "ping"), "PONG");
}

#[test]
fn test_alloc_then_getall() {
    let addr = start_server(ServerConfig::default());

    let first = request(
        addr,
        "ALLOC 2010-01-02T12:00:00.000+05:30,2010-01-01T12:00:00.000+05:30 DOWN,UP",
    );
    assert_eq!(first, "1");
    let second = request(addr, "ALLOC 2010-01-01T12:00:00.000+05:30 UP");
    assert_eq!(second, "2");

    assert_eq!(
        request(addr, "GETALL 1"),
        r#"{"2010-01-01T12:00:00.000+05:30":"UP","2010-01-02T12:00:00.000+05:30":"DOWN"}"#
    );
    assert_eq!(request(addr, "SIZE 2"), "1");
}

#[test]
fn test_errors_close_with_err_line() {
    let addr = start_server(ServerConfig::default());

    assert_eq!(request(addr, "FROB"), "ERR: Command not supported: FROB");
    assert_eq!(request(addr, "GETALL 7"), "ERR: Unknown timeseries id: 7");
    assert_eq!(
        request(addr, "ALLOC 2010-01-01T12:00:00.000+05:30"),
        "ERR: Usage: ALLOC <timestamps> <values>"
    );
    // The server keeps serving after errors.
    assert_eq!(request(addr, "PING"), "PONG");
}

#[test]
fn test_single_worker_survives_oversized_grid_tick() {
    let addr = start_server(ServerConfig::default().with_workers(1));

    let id = request(
        addr,
        "ALLOC 2010-01-01T00:00:00.000+00:00,2010-01-03T00:00:00.000+00:00 a,c",
    );
    assert_eq!(id, "1");
    assert!(request(addr, "GRID 1 9223372036854775s -").starts_with("ERR: Grid needs"));
    assert_eq!(request(addr, "GRID 1 1w -"), "ERR: Invalid format: '1w'");
    assert_eq!(request(addr, "PING"), "PONG");
}

#[test]
fn test_configured_id_origin() {
    let config = ServerConfig::default().with_id_origin(500);
    let server = Server::bind(
        &config.clone().with_bind_addr("127.0.0.1:0"),
        Dispatcher::new(
            std::sync::Arc::new(alopex_tscache::TimeseriesRegistry::with_origin(config.id_origin)),
            std::sync::Arc::new(std::sync::RwLock::new(alopex_tscache::CacheTree::new())),
        ),
    )
    .unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());

    assert_eq!(request(addr, "ALLOC 2010-01-01T12:00:00.000+05:30 UP"), "500");
}

// ============================================================================
// Tree verbs
// ============================================================================

#[test]
fn test_tree_round_trip() {
    let addr = start_server(ServerConfig::default());

    assert_eq!(request(addr, "NSADD infra"), "OK");
    assert_eq!(request(addr, "NSADD infra"), "ERR: namespace already exists: infra");
    assert_eq!(request(addr, "STADD infra link host,port"), "OK");
    assert_eq!(
        request(addr, "INADD infra link port=1,host=a 2010-01-01T12:00:00.000+05:30 UP"),
        "OK"
    );
    assert_eq!(
        request(addr, "TSGET infra link port=1,host=a"),
        r#"{"2010-01-01T12:00:00.000+05:30":"UP"}"#
    );
    assert_eq!(
        request(addr, "TSGET infra link port=9,host=a"),
        "ERR: No timeseries at path infra.link.port=9,host=a"
    );

    assert_eq!(request(addr, "STDEL infra link"), "OK");
    assert_eq!(
        request(addr, "TSGET infra link port=1,host=a"),
        "ERR: No timeseries at path infra.link.port=1,host=a"
    );
    assert_eq!(request(addr, "STDEL infra link"), "ERR: structure not found: infra.link");
    assert_eq!(request(addr, "STLIST infra"), "[]");
}

// ============================================================================
// Connection limits
// ============================================================================

#[test]
fn test_overlong_line_rejected() {
    let addr = start_server(ServerConfig::default().with_max_line_bytes(8));
    let reply = request(addr, "ALLOC 2010-01-01T12:00:00.000+05:30 UP");
    assert!(reply.starts_with("ERR: Malformed request"), "got {reply}");
}

#[test]
fn test_silent_client_times_out() {
    let addr = start_server(ServerConfig::default().with_read_timeout(Duration::from_millis(100)));

    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).unwrap();
    assert!(reply.starts_with("ERR: "), "got {reply}");
}

#[test]
fn test_many_clients_single_worker() {
    let addr = start_server(ServerConfig::default().with_workers(1).with_queue_capacity(1));

    let clients: Vec<_> = (0..16)
        .map(|_| thread::spawn(move || request(addr, "ALLOC 2010-01-01T12:00:00.000+05:30 UP")))
        .collect();
    let mut ids: Vec<u64> = clients
        .into_iter()
        .map(|client| client.join().unwrap().parse().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=16).collect::<Vec<u64>>());
}
