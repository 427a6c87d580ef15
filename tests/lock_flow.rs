//! End-to-end lock flows: a real server on an ephemeral port and pooled
//! `LockClient`s talking to it over TCP.

use std::sync::Arc;
use std::time::Duration;

use mlock::client::MuxState;
use mlock::{
    ClientError, ClientOptions, LockClient, LockOptions, LockServer, RejectReason, ServerConfig,
};

fn local_config(port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port,
        ..ServerConfig::default()
    }
}

async fn start_server() -> LockServer {
    LockServer::start(local_config(0)).await.unwrap()
}

fn client_for(server: &LockServer) -> LockClient {
    LockClient::new(
        ClientOptions::new()
            .host("127.0.0.1")
            .port(server.local_addr().port()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_goods_lock_extend_unlock_status() {
    let server = start_server().await;
    let client = client_for(&server);

    let lock_id = client
        .lock("goods-1", LockOptions::ttl(5000))
        .await
        .unwrap();
    let expiry = client.extend(&lock_id, Some(1000)).await.unwrap();
    assert!(expiry > 0);
    client.unlock(&lock_id).await.unwrap();

    let status = client.status().await.unwrap();
    assert_eq!(status.counters.lock_count, 1);
    assert_eq!(status.counters.locked_count, 1);
    assert_eq!(status.counters.finished_count, 1);
    assert_eq!(status.counters.extend_count, 1);
    assert_eq!(status.current_locks, 0);
    assert_eq!(status.socket_count, 1);

    client.ping().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_handles_share_one_multiplexer() {
    let server = start_server().await;
    let a = client_for(&server);
    let b = client_for(&server);

    assert!(Arc::ptr_eq(a.multiplexer(), b.multiplexer()));
    assert_eq!(a.socket_id(), b.socket_id());
    assert_eq!(a.multiplexer().handle_count(), 2);

    a.ping().await.unwrap();
    b.ping().await.unwrap();
    assert_eq!(b.status().await.unwrap().socket_count, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_multi_resource_locks_wait_for_release() {
    let server = start_server().await;
    let holder = client_for(&server);
    let waiter = client_for(&server);

    let held = holder
        .lock("shelf-a|shelf-b", LockOptions::ttl(5000))
        .await
        .unwrap();

    let pending = tokio::spawn(async move {
        let result = waiter.lock("shelf-b|shelf-c", LockOptions::ttl(5000)).await;
        (waiter, result)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    holder.unlock(&held).await.unwrap();
    let (waiter, result) = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    let second = result.unwrap();
    assert_ne!(second, held);
    waiter.unlock(&second).await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_disjoint_locks_do_not_wait() {
    let server = start_server().await;
    let client = client_for(&server);

    let (a, b) = tokio::join!(
        client.lock("bin-1", LockOptions::ttl(5000)),
        client.lock("bin-2", LockOptions::ttl(5000)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);
    assert_eq!(client.status().await.unwrap().counters.locked_count, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_queued_lock_times_out() {
    let server = start_server().await;
    let client = client_for(&server);

    let _held = client.lock("dock", LockOptions::ttl(5000)).await.unwrap();
    let err = client
        .lock("dock", LockOptions::ttl(5000).with_timeout(100))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Timeout);
    assert_eq!(err.to_string(), "Lock timeout");
    assert_eq!(client.status().await.unwrap().counters.timeout_count, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_tolerate_rejects_deep_queue() {
    let server = start_server().await;
    let holder = client_for(&server);
    let queued = client_for(&server);
    let impatient = client_for(&server);

    let held = holder.lock("gate", LockOptions::ttl(5000)).await.unwrap();
    let pending = tokio::spawn(async move {
        let result = queued.lock("gate", LockOptions::ttl(5000)).await;
        (queued, result)
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = impatient
        .lock("gate", LockOptions::ttl(5000).with_tolerate(1))
        .await
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::Intolerant));
    assert_eq!(err.to_string(), "can not tolerate!");

    holder.unlock(&held).await.unwrap();
    let (_queued, result) = pending.await.unwrap();
    result.unwrap();

    let status = impatient.status().await.unwrap();
    assert_eq!(status.counters.intolerance_count, 1);
    assert_eq!(status.counters.lock_count, 3);

    server.shutdown().await;
}

#[tokio::test]
async fn test_extend_after_expiry_is_not_found() {
    let server = start_server().await;
    let client = client_for(&server);

    let lock_id = client.lock("crate", LockOptions::ttl(100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let err = client.extend(&lock_id, Some(1000)).await.unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::NotFound));
    assert_eq!(client.status().await.unwrap().counters.expired_count, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_prefix_and_default_ttl_from_uri() {
    let server = start_server().await;
    let uri = format!(
        "mlock://127.0.0.1:{}?prefix=orders:",
        server.local_addr().port()
    );
    let client = LockClient::new(ClientOptions::from_uri(uri).ttl(5000)).unwrap();

    let lock_id = client.lock("a|b", LockOptions::default()).await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.current_locks, 1);
    client.unlock(&lock_id).await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_restart_within_retry_budget() {
    let server = start_server().await;
    let port = server.local_addr().port();
    let client = client_for(&server);

    let lock_id = client
        .lock("goods-1|goods-2", LockOptions::ttl(5000).with_tolerate(0))
        .await
        .unwrap();

    server.shutdown().await;
    for _ in 0..100 {
        if client.multiplexer().state() != MuxState::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_ne!(client.multiplexer().state(), MuxState::Connected);

    let restarted = LockServer::start(local_config(port)).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(10), client.extend(&lock_id, Some(1000)))
        .await
        .expect("extend hung after server restart")
        .unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::NotFound));
    assert_eq!(err.to_string(), "lock not exist!");

    restarted.shutdown().await;
}
