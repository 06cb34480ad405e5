//! Domain event catalog shared by every service.
//!
//! This module defines the wire contract of the event bus:
//! - `EventType` - the closed set of channel names
//! - `DomainEvent` - one typed payload per event type
//! - `EventEnvelope` - the JSON message actually sent over a channel

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;

// ============================================================================
// Event Types
// ============================================================================

/// Type of domain event. The string form is also the channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "usuario:criado")]
    UsuarioCriado,
    #[serde(rename = "usuario:atualizado")]
    UsuarioAtualizado,
    #[serde(rename = "usuario:deletado")]
    UsuarioDeletado,
    #[serde(rename = "usuario:aprovado")]
    UsuarioAprovado,
    #[serde(rename = "usuario:rejeitado")]
    UsuarioRejeitado,
    #[serde(rename = "login:realizado")]
    LoginRealizado,
    #[serde(rename = "login:falhou")]
    LoginFalhou,
    #[serde(rename = "unidade:criada")]
    UnidadeCriada,
    #[serde(rename = "unidade:atualizada")]
    UnidadeAtualizada,
    #[serde(rename = "unidade:deletada")]
    UnidadeDeletada,
    #[serde(rename = "categoria:criada")]
    CategoriaCriada,
    #[serde(rename = "categoria:atualizada")]
    CategoriaAtualizada,
    #[serde(rename = "categoria:deletada")]
    CategoriaDeletada,
    #[serde(rename = "produto:criado")]
    ProdutoCriado,
    #[serde(rename = "produto:atualizado")]
    ProdutoAtualizado,
    #[serde(rename = "produto:deletado")]
    ProdutoDeletado,
    #[serde(rename = "produto:aprovado")]
    ProdutoAprovado,
    #[serde(rename = "produto:rejeitado")]
    ProdutoRejeitado,
    #[serde(rename = "movimentacao:criada")]
    MovimentacaoCriada,
    #[serde(rename = "movimentacao:deletada")]
    MovimentacaoDeletada,
}

impl EventType {
    /// Every event type in the catalog.
    pub const ALL: [EventType; 20] = [
        EventType::UsuarioCriado,
        EventType::UsuarioAtualizado,
        EventType::UsuarioDeletado,
        EventType::UsuarioAprovado,
        EventType::UsuarioRejeitado,
        EventType::LoginRealizado,
        EventType::LoginFalhou,
        EventType::UnidadeCriada,
        EventType::UnidadeAtualizada,
        EventType::UnidadeDeletada,
        EventType::CategoriaCriada,
        EventType::CategoriaAtualizada,
        EventType::CategoriaDeletada,
        EventType::ProdutoCriado,
        EventType::ProdutoAtualizado,
        EventType::ProdutoDeletado,
        EventType::ProdutoAprovado,
        EventType::ProdutoRejeitado,
        EventType::MovimentacaoCriada,
        EventType::MovimentacaoDeletada,
    ];

    /// Returns the channel name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UsuarioCriado => "usuario:criado",
            EventType::UsuarioAtualizado => "usuario:atualizado",
            EventType::UsuarioDeletado => "usuario:deletado",
            EventType::UsuarioAprovado => "usuario:aprovado",
            EventType::UsuarioRejeitado => "usuario:rejeitado",
            EventType::LoginRealizado => "login:realizado",
            EventType::LoginFalhou => "login:falhou",
            EventType::UnidadeCriada => "unidade:criada",
            EventType::UnidadeAtualizada => "unidade:atualizada",
            EventType::UnidadeDeletada => "unidade:deletada",
            EventType::CategoriaCriada => "categoria:criada",
            EventType::CategoriaAtualizada => "categoria:atualizada",
            EventType::CategoriaDeletada => "categoria:deletada",
            EventType::ProdutoCriado => "produto:criado",
            EventType::ProdutoAtualizado => "produto:atualizado",
            EventType::ProdutoDeletado => "produto:deletado",
            EventType::ProdutoAprovado => "produto:aprovado",
            EventType::ProdutoRejeitado => "produto:rejeitado",
            EventType::MovimentacaoCriada => "movimentacao:criada",
            EventType::MovimentacaoDeletada => "movimentacao:deletada",
        }
    }

    /// Entity part of the channel name (`"produto"` for `produto:criado`).
    pub fn entity(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map(|(entity, _)| entity)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a channel name is not part of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload for entities identified by id and name (units, categories, products).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
}

impl NamedEntity {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: i64,
    pub email: String,
    #[serde(rename = "nome")]
    pub name: String,
}

/// Payload of `usuario:atualizado`. Role fields are present only when the
/// update changed the user's role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub id: i64,
    pub email: String,
    #[serde(rename = "cargo_anterior", default, skip_serializing_if = "Option::is_none")]
    pub previous_role: Option<String>,
    #[serde(rename = "cargo_novo", default, skip_serializing_if = "Option::is_none")]
    pub new_role: Option<String>,
}

/// Payload for user lifecycle events that only carry identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserApproved {
    pub id: i64,
    pub email: String,
    #[serde(rename = "cargo")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginFailed {
    pub email: String,
    #[serde(rename = "motivo")]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductApproved {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "preco_custo")]
    pub cost_price: f64,
    #[serde(rename = "preco_venda")]
    pub sale_price: f64,
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    Entrada,
    Saida,
    Transferencia,
    Ajuste,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementCreated {
    pub id: i64,
    #[serde(rename = "tipo")]
    pub kind: MovementKind,
    pub produto_id: i64,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDeleted {
    pub id: i64,
}

// ============================================================================
// Domain Event
// ============================================================================

/// A domain event: one variant per `EventType`, each with its payload shape.
///
/// Serialized adjacently tagged, i.e. `{"tipo": "<channel>", "dados": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "dados")]
pub enum DomainEvent {
    #[serde(rename = "usuario:criado")]
    UsuarioCriado(UserCreated),
    #[serde(rename = "usuario:atualizado")]
    UsuarioAtualizado(UserUpdated),
    #[serde(rename = "usuario:deletado")]
    UsuarioDeletado(UserRef),
    #[serde(rename = "usuario:aprovado")]
    UsuarioAprovado(UserApproved),
    #[serde(rename = "usuario:rejeitado")]
    UsuarioRejeitado(UserRef),
    #[serde(rename = "login:realizado")]
    LoginRealizado(UserRef),
    #[serde(rename = "login:falhou")]
    LoginFalhou(LoginFailed),
    #[serde(rename = "unidade:criada")]
    UnidadeCriada(NamedEntity),
    #[serde(rename = "unidade:atualizada")]
    UnidadeAtualizada(NamedEntity),
    #[serde(rename = "unidade:deletada")]
    UnidadeDeletada(NamedEntity),
    #[serde(rename = "categoria:criada")]
    CategoriaCriada(NamedEntity),
    #[serde(rename = "categoria:atualizada")]
    CategoriaAtualizada(NamedEntity),
    #[serde(rename = "categoria:deletada")]
    CategoriaDeletada(NamedEntity),
    #[serde(rename = "produto:criado")]
    ProdutoCriado(NamedEntity),
    #[serde(rename = "produto:atualizado")]
    ProdutoAtualizado(NamedEntity),
    #[serde(rename = "produto:deletado")]
    ProdutoDeletado(NamedEntity),
    #[serde(rename = "produto:aprovado")]
    ProdutoAprovado(ProductApproved),
    #[serde(rename = "produto:rejeitado")]
    ProdutoRejeitado(NamedEntity),
    #[serde(rename = "movimentacao:criada")]
    MovimentacaoCriada(MovementCreated),
    #[serde(rename = "movimentacao:deletada")]
    MovimentacaoDeletada(MovementDeleted),
}

impl DomainEvent {
    /// The catalog entry (and channel) of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::UsuarioCriado(_) => EventType::UsuarioCriado,
            DomainEvent::UsuarioAtualizado(_) => EventType::UsuarioAtualizado,
            DomainEvent::UsuarioDeletado(_) => EventType::UsuarioDeletado,
            DomainEvent::UsuarioAprovado(_) => EventType::UsuarioAprovado,
            DomainEvent::UsuarioRejeitado(_) => EventType::UsuarioRejeitado,
            DomainEvent::LoginRealizado(_) => EventType::LoginRealizado,
            DomainEvent::LoginFalhou(_) => EventType::LoginFalhou,
            DomainEvent::UnidadeCriada(_) => EventType::UnidadeCriada,
            DomainEvent::UnidadeAtualizada(_) => EventType::UnidadeAtualizada,
            DomainEvent::UnidadeDeletada(_) => EventType::UnidadeDeletada,
            DomainEvent::CategoriaCriada(_) => EventType::CategoriaCriada,
            DomainEvent::CategoriaAtualizada(_) => EventType::CategoriaAtualizada,
            DomainEvent::CategoriaDeletada(_) => EventType::CategoriaDeletada,
            DomainEvent::ProdutoCriado(_) => EventType::ProdutoCriado,
            DomainEvent::ProdutoAtualizado(_) => EventType::ProdutoAtualizado,
            DomainEvent::ProdutoDeletado(_) => EventType::ProdutoDeletado,
            DomainEvent::ProdutoAprovado(_) => EventType::ProdutoAprovado,
            DomainEvent::ProdutoRejeitado(_) => EventType::ProdutoRejeitado,
            DomainEvent::MovimentacaoCriada(_) => EventType::MovimentacaoCriada,
            DomainEvent::MovimentacaoDeletada(_) => EventType::MovimentacaoDeletada,
        }
    }

    /// Id of the entity the event describes, when the payload carries one.
    pub fn entity_id(&self) -> Option<i64> {
        match self {
            DomainEvent::UsuarioCriado(p) => Some(p.id),
            DomainEvent::UsuarioAtualizado(p) => Some(p.id),
            DomainEvent::UsuarioDeletado(p)
            | DomainEvent::UsuarioRejeitado(p)
            | DomainEvent::LoginRealizado(p) => Some(p.id),
            DomainEvent::UsuarioAprovado(p) => Some(p.id),
            DomainEvent::LoginFalhou(_) => None,
            DomainEvent::UnidadeCriada(p)
            | DomainEvent::UnidadeAtualizada(p)
            | DomainEvent::UnidadeDeletada(p)
            | DomainEvent::CategoriaCriada(p)
            | DomainEvent::CategoriaAtualizada(p)
            | DomainEvent::CategoriaDeletada(p)
            | DomainEvent::ProdutoCriado(p)
            | DomainEvent::ProdutoAtualizado(p)
            | DomainEvent::ProdutoDeletado(p)
            | DomainEvent::ProdutoRejeitado(p) => Some(p.id),
            DomainEvent::ProdutoAprovado(p) => Some(p.id),
            DomainEvent::MovimentacaoCriada(p) => Some(p.id),
            DomainEvent::MovimentacaoDeletada(p) => Some(p.id),
        }
    }

    /// Email carried by user and login payloads.
    pub fn email(&self) -> Option<&str> {
        match self {
            DomainEvent::UsuarioCriado(p) => Some(&p.email),
            DomainEvent::UsuarioAtualizado(p) => Some(&p.email),
            DomainEvent::UsuarioDeletado(p)
            | DomainEvent::UsuarioRejeitado(p)
            | DomainEvent::LoginRealizado(p) => Some(&p.email),
            DomainEvent::UsuarioAprovado(p) => Some(&p.email),
            DomainEvent::LoginFalhou(p) => Some(&p.email),
            _ => None,
        }
    }

    /// The `dados` part of the wire message.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("dados")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuild a typed event from a channel name and an untyped payload.
    pub fn from_parts(
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "tipo": event_type.as_str(),
            "dados": payload,
        }))
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Error decoding an inbound message.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed event message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownType(#[from] UnknownEventType),
}

/// Wire form of an envelope. Kept separate so the payload can be decoded
/// against the type named in `tipo`.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    tipo: String,
    dados: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(rename = "servicoOrigem")]
    servico_origem: String,
}

/// A domain event as transmitted on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: DomainEvent,
    pub emitted_at: OffsetDateTime,
    pub origin_service: String,
}

impl EventEnvelope {
    /// Wrap an event emitted now by `origin_service`.
    pub fn new(event: DomainEvent, origin_service: impl Into<String>) -> Self {
        Self {
            event,
            emitted_at: OffsetDateTime::now_utc(),
            origin_service: origin_service.into(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    /// Encode as the JSON message sent on the `tipo` channel.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let wire = WireEnvelope {
            tipo: self.event_type().as_str().to_string(),
            dados: self.event.payload()?,
            timestamp: self.emitted_at,
            servico_origem: self.origin_service.clone(),
        };
        serde_json::to_string(&wire)
    }

    /// Decode a JSON message received from the bus.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_slice(bytes)?;
        let event_type: EventType = wire.tipo.parse()?;
        let event = DomainEvent::from_parts(event_type, wire.dados)?;
        Ok(Self {
            event,
            emitted_at: wire.timestamp,
            origin_service: wire.servico_origem,
        })
    }
}
