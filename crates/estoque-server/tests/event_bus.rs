//! Publish/subscribe behaviour over the in-process transport.

use async_trait::async_trait;
use estoque_core::events::{
    HandlerError, MovementCreated, MovementKind, NamedEntity, ProductApproved, UserUpdated,
};
use estoque_core::{DomainEvent, EventEnvelope, EventHandler, EventType};
use estoque_server::events::{
    EventPublisher, EventTransport, MemoryTransport, MessageStream, PublishError,
    ReconnectPolicy, SubscriberBuilder, TransportError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn recorder(
    builder: SubscriberBuilder,
    event_type: EventType,
    tx: &mpsc::UnboundedSender<EventEnvelope>,
) -> SubscriberBuilder {
    let tx = tx.clone();
    builder.on_fn(event_type, "recorder", move |envelope| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(envelope);
            Ok(())
        }
    })
}

struct Exploding;

#[async_trait]
impl EventHandler for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
        panic!("handler exploded")
    }
}

/// Transport whose every call fails, as when Redis is down.
struct BrokenTransport;

#[async_trait]
impl EventTransport for BrokenTransport {
    fn mode(&self) -> &'static str {
        "broken"
    }

    async fn publish(&self, _channel: &str, _payload: &[u8]) -> Result<usize, TransportError> {
        Err(TransportError::Publish("connection reset by peer".into()))
    }

    async fn listen(&self, _channels: &[String]) -> Result<MessageStream, TransportError> {
        Err(TransportError::Subscribe("connection reset by peer".into()))
    }
}

#[tokio::test]
async fn test_subscriber_receives_published_payload() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = recorder(
        recorder(
            SubscriberBuilder::new(transport.clone()),
            EventType::ProdutoAprovado,
            &tx,
        ),
        EventType::MovimentacaoCriada,
        &tx,
    )
    .subscribe(&[EventType::ProdutoAprovado, EventType::MovimentacaoCriada])
    .await
    .unwrap();

    let publisher = EventPublisher::new(transport.clone(), "produtos-service");
    let approved = DomainEvent::ProdutoAprovado(ProductApproved {
        id: 17,
        name: "Adubo NPK".into(),
        cost_price: 89.5,
        sale_price: 129.25,
    });
    assert_eq!(publisher.publish(approved.clone()).await.unwrap(), 1);

    let envelope = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.event, approved);
    assert_eq!(envelope.origin_service, "produtos-service");

    let movements = EventPublisher::new(transport.clone(), "movimentacoes-service");
    let created = DomainEvent::MovimentacaoCriada(MovementCreated {
        id: 3,
        kind: MovementKind::Saida,
        produto_id: 17,
        quantity: 12,
    });
    movements.publish(created.clone()).await.unwrap();

    let envelope = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.event, created);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_handlers_only_see_their_type() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let foreign_calls = Arc::new(AtomicU32::new(0));
    let counter = foreign_calls.clone();

    let mut subscription = recorder(
        SubscriberBuilder::new(transport.clone()),
        EventType::CategoriaCriada,
        &tx,
    )
    .on_fn(EventType::CategoriaDeletada, "counter", move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .subscribe(&[EventType::CategoriaCriada, EventType::CategoriaDeletada])
    .await
    .unwrap();

    let publisher = EventPublisher::new(transport.clone(), "categorias-service");
    publisher
        .publish(DomainEvent::CategoriaCriada(NamedEntity::new(4, "Fertilizantes")))
        .await
        .unwrap();

    let envelope = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.event_type(), EventType::CategoriaCriada);
    assert_eq!(foreign_calls.load(Ordering::SeqCst), 0);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_failing_handlers_do_not_block_siblings() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let builder = SubscriberBuilder::new(transport.clone())
        .on_fn(EventType::UsuarioAtualizado, "failing", |_| async {
            Err::<(), _>(HandlerError::execution("audit store offline"))
        })
        .on(EventType::UsuarioAtualizado, Arc::new(Exploding));
    let mut subscription = recorder(builder, EventType::UsuarioAtualizado, &tx)
        .subscribe(&[EventType::UsuarioAtualizado])
        .await
        .unwrap();

    let publisher = EventPublisher::new(transport.clone(), "usuarios-service");
    for id in [1, 2] {
        publisher
            .publish(DomainEvent::UsuarioAtualizado(UserUpdated {
                id,
                email: format!("user{id}@raiz.com"),
                previous_role: None,
                new_role: None,
            }))
            .await
            .unwrap();
    }

    // the third handler ran for both messages despite its siblings failing
    for id in [1, 2] {
        let envelope = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.event.entity_id(), Some(id));
    }
    assert!(subscription.is_active());

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_publish_without_subscribers_reports_zero() {
    let transport = Arc::new(MemoryTransport::new());
    let publisher = EventPublisher::new(transport, "unidades-service");

    let delivered = publisher
        .publish(DomainEvent::UnidadeDeletada(NamedEntity::new(8, "Filial Sul")))
        .await
        .unwrap();
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_publish_failure_is_reported() {
    let publisher = EventPublisher::new(Arc::new(BrokenTransport), "produtos-service");

    let err = publisher
        .publish(DomainEvent::ProdutoCriado(NamedEntity::new(1, "Milho")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PublishError::Transport {
            event_type: EventType::ProdutoCriado,
            ..
        }
    ));
}

#[tokio::test]
async fn test_initial_listen_failure_is_returned() {
    let result = SubscriberBuilder::new(Arc::new(BrokenTransport))
        .subscribe(&[EventType::ProdutoCriado])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_subscriber_relistens_after_stream_loss() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = recorder(
        SubscriberBuilder::new(transport.clone()).with_reconnect(ReconnectPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        }),
        EventType::UnidadeCriada,
        &tx,
    )
    .subscribe(&[EventType::UnidadeCriada])
    .await
    .unwrap();

    transport.reset();
    assert_eq!(transport.listener_count("unidade:criada"), 0);

    let publisher = EventPublisher::new(transport.clone(), "unidades-service");
    let event = DomainEvent::UnidadeCriada(NamedEntity::new(2, "Filial Norte"));

    let mut delivered = 0;
    for _ in 0..200 {
        delivered = publisher.publish(event.clone()).await.unwrap();
        if delivered > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, 1);

    let envelope = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.event, event);
    assert!(subscription.is_active());

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_malformed_message_does_not_stall_other_types() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscribed = [
        EventType::MovimentacaoCriada,
        EventType::ProdutoCriado,
        EventType::LoginFalhou,
    ];
    let mut builder = SubscriberBuilder::new(transport.clone());
    for event_type in subscribed {
        builder = recorder(builder, event_type, &tx);
    }
    let mut subscription = builder.subscribe(&subscribed).await.unwrap();

    // garbage, wrong payload shape, and a lowercase movement kind
    transport
        .publish("movimentacao:criada", b"{not json")
        .await
        .unwrap();
    transport
        .publish(
            "produto:criado",
            br#"{"tipo":"produto:criado","dados":{"nome":"Milho"},"timestamp":"2026-10-19T12:00:00.000Z","servicoOrigem":"produtos-service"}"#,
        )
        .await
        .unwrap();
    transport
        .publish(
            "movimentacao:criada",
            br#"{"tipo":"movimentacao:criada","dados":{"id":1,"tipo":"entrada","produto_id":2,"quantidade":3},"timestamp":"2026-10-19T12:00:00.000Z","servicoOrigem":"movimentacoes-service"}"#,
        )
        .await
        .unwrap();

    // producer-framed messages still get through
    transport
        .publish(
            "login:falhou",
            br#"{"tipo":"login:falhou","dados":{"email":"ana@raiz.com","motivo":"Senha incorreta"},"timestamp":"2026-10-19T12:00:00.123Z","servicoOrigem":"auth-service"}"#,
        )
        .await
        .unwrap();
    transport
        .publish(
            "movimentacao:criada",
            br#"{"tipo":"movimentacao:criada","dados":{"id":40,"tipo":"ENTRADA","produto_id":17,"quantidade":250},"timestamp":"2026-10-19T12:00:00.123Z","servicoOrigem":"movimentacoes-service"}"#,
        )
        .await
        .unwrap();

    let mut received = Vec::new();
    for _ in 0..2 {
        received.push(timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap());
    }
    received.sort_by_key(|envelope| envelope.event_type().as_str());

    assert_eq!(received[0].event_type(), EventType::LoginFalhou);
    assert_eq!(received[0].origin_service, "auth-service");
    assert_eq!(
        received[1].event,
        DomainEvent::MovimentacaoCriada(MovementCreated {
            id: 40,
            kind: MovementKind::Entrada,
            produto_id: 17,
            quantity: 250,
        })
    );

    assert!(rx.try_recv().is_err());
    assert!(subscription.is_active());

    subscription.unsubscribe().await;
}
