//! Integration tests for the Redis cache store and event transport.
//!
//! Tests use testcontainers to spin up a real Redis instance and are
//! ignored by default. Run with `cargo test -- --ignored` where Docker is
//! available.

use estoque_core::events::NamedEntity;
use estoque_core::{CacheNamespace, DomainEvent, EventType};
use estoque_server::cache::{KeyedCacheStore, RedisCacheStore, create_redis_pool};
use estoque_server::events::{EventPublisher, RedisTransport, SubscriberBuilder};
use estoque_server::{AppConfig, RedisConfig, Service, ServiceContext};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::{OnceCell, mpsc};

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

fn redis_config(url: &str) -> RedisConfig {
    RedisConfig {
        enabled: true,
        url: url.to_string(),
        pool_size: 4,
        timeout_ms: 2_000,
    }
}

async fn store() -> RedisCacheStore {
    let url = get_redis_url().await;
    let pool = create_redis_pool(&redis_config(&url)).expect("create pool");
    RedisCacheStore::new(pool)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_get_set_delete() {
    let store = store().await;
    store.ping().await.unwrap();

    store
        .set(CacheNamespace::Unidades, "rt:id:1", b"{\"id\":1}", Duration::from_secs(60))
        .await
        .unwrap();
    let value = store.get(CacheNamespace::Unidades, "rt:id:1").await.unwrap();
    assert_eq!(value.as_deref().map(Vec::as_slice), Some(&b"{\"id\":1}"[..]));

    assert!(store.delete(CacheNamespace::Unidades, "rt:id:1").await.unwrap());
    assert!(!store.delete(CacheNamespace::Unidades, "rt:id:1").await.unwrap());
    assert!(store.get(CacheNamespace::Unidades, "rt:id:1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_entries_expire() {
    let store = store().await;
    store
        .set(CacheNamespace::Auth, "rt:sessao:1", b"token", Duration::from_millis(100))
        .await
        .unwrap();
    assert!(store.get(CacheNamespace::Auth, "rt:sessao:1").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(store.get(CacheNamespace::Auth, "rt:sessao:1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_pattern_delete_is_namespace_scoped() {
    let store = store().await;
    let ttl = Duration::from_secs(60);
    for key in ["pd:todos", "pd:id:1", "pd:id:2"] {
        store.set(CacheNamespace::Relatorios, key, b"1", ttl).await.unwrap();
    }
    store.set(CacheNamespace::Movimentacoes, "pd:todos", b"1", ttl).await.unwrap();

    let removed = store
        .delete_by_pattern(CacheNamespace::Relatorios, "pd:id:*")
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(store.get(CacheNamespace::Relatorios, "pd:todos").await.unwrap().is_some());
    assert!(store.get(CacheNamespace::Movimentacoes, "pd:todos").await.unwrap().is_some());

    let removed = store
        .delete_by_pattern(CacheNamespace::Relatorios, "nothing:*")
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_redis_transport_round_trip() {
    let url = get_redis_url().await;
    let pool = create_redis_pool(&redis_config(&url)).unwrap();
    let transport = Arc::new(RedisTransport::new(pool, &url).unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = SubscriberBuilder::new(transport.clone())
        .on_fn(EventType::CategoriaDeletada, "recorder", move |envelope| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(envelope);
                Ok(())
            }
        })
        .subscribe(&[EventType::CategoriaDeletada])
        .await
        .unwrap();

    let publisher = EventPublisher::new(transport, "categorias-service");
    let event = DomainEvent::CategoriaDeletada(NamedEntity::new(12, "Defensivos"));
    let delivered = publisher.publish(event.clone()).await.unwrap();
    assert!(delivered >= 1);

    let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.event, event);
    assert_eq!(envelope.origin_service, "categorias-service");

    subscription.unsubscribe().await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_service_context_over_redis() {
    let url = get_redis_url().await;
    let mut config = AppConfig::default();
    config.redis = redis_config(&url);

    let unidades = ServiceContext::start(&config, Service::Unidades).await.unwrap();
    let produtos = ServiceContext::start(&config, Service::Produtos).await.unwrap();
    assert_eq!(produtos.cache().store().mode(), "redis");

    produtos
        .cache()
        .set(CacheNamespace::Produtos, "ctx:unidade:3", &vec![1, 2], None)
        .await;

    unidades
        .coordinator()
        .after_commit(DomainEvent::UnidadeAtualizada(NamedEntity::new(3, "Filial Oeste")))
        .await
        .unwrap();

    let mut cleared = false;
    for _ in 0..100 {
        let cached: Option<Vec<i32>> = produtos.cache().get(CacheNamespace::Produtos, "ctx:unidade:3").await;
        if cached.is_none() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleared);

    produtos.shutdown().await;
    unidades.shutdown().await;
}
