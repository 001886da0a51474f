use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Value};
use respdb::codec::FrameCodec;
use respdb::config::Config;
use respdb::db::Db;
use respdb::server::serve;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<respdb::Result<()>>,
}

impl TestServer {
    async fn start(aof_path: &Path) -> TestServer {
        let config = Config {
            aof_path: aof_path.to_path_buf(),
            fsync_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let db = Db::open(&config).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, db, FrameCodec::new(), async move {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            shutdown,
            handle,
        }
    }

    async fn connect(&self) -> MultiplexedConnection {
        let client = redis::Client::open(format!("redis://{}/", self.addr)).unwrap();
        client.get_multiplexed_async_connection().await.unwrap()
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().unwrap();
    }
}

async fn query<T: redis::FromRedisValue>(
    conn: &mut MultiplexedConnection,
    args: &[&str],
) -> Result<T, RedisError> {
    let mut cmd = redis::cmd(args[0]);
    for arg in &args[1..] {
        cmd.arg(*arg);
    }
    cmd.query_async(conn).await
}

/// When the server responds with an error, the client parses it into `Err(RedisError)`. We only
/// care about the message sent by the server, which is the `detail`.
async fn query_err(conn: &mut MultiplexedConnection, args: &[&str]) -> String {
    let err = query::<Value>(conn, args).await.unwrap_err();
    assert_eq!(err.code(), Some("ERR"));
    err.detail().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_set_and_get() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    let _: () = conn.set("set_get_key_1", 1).await.unwrap();
    let _: () = conn.set("set_get_key_2", "Argentina").await.unwrap();
    let _: () = conn.set("set_get_key_3", &b"Hello,\r\nWorld!"[..]).await.unwrap();

    let value: String = conn.get("set_get_key_1").await.unwrap();
    assert_eq!(value, "1");
    let value: String = conn.get("set_get_key_2").await.unwrap();
    assert_eq!(value, "Argentina");
    let value: Vec<u8> = conn.get("set_get_key_3").await.unwrap();
    assert_eq!(value, b"Hello,\r\nWorld!");
    let value: Option<String> = conn.get("set_get_nonexistentkey").await.unwrap();
    assert_eq!(value, None);

    let ok: Value = query(&mut conn, &["SET", "key", "value"]).await.unwrap();
    assert_eq!(ok, Value::Okay);

    server.stop().await;
}

#[tokio::test]
async fn test_arity_errors() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    for args in [
        &["SET"][..],
        &["SET", "key"][..],
        &["SET", "key", "value", "extra"][..],
    ] {
        let detail = query_err(&mut conn, args).await;
        assert_eq!(detail, "wrong number of arguments for 'set' command");
    }

    let detail = query_err(&mut conn, &["HGET", "h"]).await;
    assert_eq!(detail, "wrong number of arguments for 'hget' command");

    // The connection survives command errors.
    let value: Option<String> = conn.get("key").await.unwrap();
    assert_eq!(value, None);

    server.stop().await;
}

#[tokio::test]
async fn test_hashes() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    let ok: Value = query(&mut conn, &["HSET", "h", "f", "v"]).await.unwrap();
    assert_eq!(ok, Value::Okay);
    let _: Value = query(&mut conn, &["HSET", "h", "g", "w"]).await.unwrap();

    let value: Option<String> = conn.get("h").await.unwrap();
    assert_eq!(value, None);
    let value: Option<String> = conn.hget("h", "f").await.unwrap();
    assert_eq!(value, Some("v".to_string()));
    let value: Option<String> = conn.hget("h", "other").await.unwrap();
    assert_eq!(value, None);
    let value: Option<String> = conn.hget("nope", "f").await.unwrap();
    assert_eq!(value, None);

    let all: HashMap<String, String> = conn.hgetall("h").await.unwrap();
    assert_eq!(
        all,
        HashMap::from([
            ("f".to_string(), "v".to_string()),
            ("g".to_string(), "w".to_string())
        ])
    );

    server.stop().await;
}

#[tokio::test]
async fn test_ping() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    let pong: Value = query(&mut conn, &["PING"]).await.unwrap();
    assert_eq!(pong, Value::Status("PONG".to_string()));

    let echo: Value = query(&mut conn, &["ping", "hello"]).await.unwrap();
    assert_eq!(echo, Value::Status("hello".to_string()));

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_command() {
    let dir = tempdir().unwrap();
    let aof_path = dir.path().join("appendonly.aof");
    let server = TestServer::start(&aof_path).await;
    let mut conn = server.connect().await;

    let detail = query_err(&mut conn, &["FOO", "bar"]).await;
    assert_eq!(detail, "unknown command 'FOO'");

    server.stop().await;

    assert_eq!(std::fs::metadata(&aof_path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_pipeline_preserves_order() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    let res: Vec<Value> = redis::pipe()
        .cmd("SET")
        .arg("k")
        .arg("1")
        .cmd("GET")
        .arg("k")
        .cmd("SET")
        .arg("k")
        .arg("2")
        .cmd("GET")
        .arg("k")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(
        res,
        vec![
            Value::Okay,
            Value::Data(b"1".to_vec()),
            Value::Okay,
            Value::Data(b"2".to_vec()),
        ]
    );

    server.stop().await;
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let aof_path = dir.path().join("appendonly.aof");

    let server = TestServer::start(&aof_path).await;
    let mut conn = server.connect().await;
    let _: () = conn.set("a", "1").await.unwrap();
    let _: Value = query(&mut conn, &["HSET", "h", "f", "x"]).await.unwrap();
    let _: () = conn.set("a", "2").await.unwrap();
    let _: () = conn.set("b", "only").await.unwrap();
    let _: Value = query(&mut conn, &["HSET", "h", "f", "y"]).await.unwrap();
    drop(conn);
    server.stop().await;

    let server = TestServer::start(&aof_path).await;
    let mut conn = server.connect().await;

    let value: String = conn.get("a").await.unwrap();
    assert_eq!(value, "2");
    let value: String = conn.get("b").await.unwrap();
    assert_eq!(value, "only");
    let value: String = conn.hget("h", "f").await.unwrap();
    assert_eq!(value, "y");

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;

    let mut clients = vec![];
    for i in 0..16 {
        let mut conn = server.connect().await;
        clients.push(tokio::spawn(async move {
            let key = format!("concurrent_key_{i}");
            let value = format!("value_{i}");

            let _: () = conn.set(&key, &value).await.unwrap();
            let actual: String = conn.get(&key).await.unwrap();

            assert_eq!(actual, value);
        }));
    }

    for client in clients {
        client.await.unwrap();
    }

    let mut conn = server.connect().await;
    for i in 0..16 {
        let actual: String = conn.get(format!("concurrent_key_{i}")).await.unwrap();
        assert_eq!(actual, format!("value_{i}"));
    }

    server.stop().await;
}

#[tokio::test]
async fn test_protocol_error_closes_only_that_connection() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("appendonly.aof")).await;
    let mut conn = server.connect().await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(b"%1\r\n").await.unwrap();

    let mut reply = vec![];
    raw.read_to_end(&mut reply).await.unwrap();
    assert!(reply.starts_with(b"-ERR protocol error"));

    let _: () = conn.set("still", "alive").await.unwrap();
    let value: String = conn.get("still").await.unwrap();
    assert_eq!(value, "alive");

    server.stop().await;
}
