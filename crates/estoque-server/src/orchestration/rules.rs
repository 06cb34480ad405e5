//! Rule tables binding writes to invalidations and events to reactions.
//!
//! Write side: after a committed mutation the owning service clears its own
//! namespace plus the precise keys of the touched entity. Movements also
//! clear the product namespace directly, since product reads carry balances.
//!
//! Read side: each service reacts to other services' events with coarse
//! whole-namespace clears.
//!
//! | service       | events                                                   | reaction          |
//! |---------------|----------------------------------------------------------|-------------------|
//! | produtos      | categoria:*, unidade:*, usuario:atualizado/deletado,     | clear produtos    |
//! |               | movimentacao:criada/deletada                             |                   |
//! | movimentacoes | produto:atualizado/deletado                              | clear movimentacoes |
//! | relatorios    | movimentacao:criada/deletada, produto:*                  | clear relatorios  |
//! | auth          | usuario:atualizado/deletado/aprovado/rejeitado           | clear auth        |
//! | usuarios      | login:realizado/falhou                                   | audit log         |

use estoque_core::cache::keys;
use estoque_core::{CacheNamespace, DomainEvent, EventType};

use super::service::Service;

/// One cache effect of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Remove every entry of the namespace.
    Namespace(CacheNamespace),
    /// Remove a single entry.
    Key(CacheNamespace, String),
}

/// Reaction of a subscribing service to a foreign event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAction {
    ClearNamespace(CacheNamespace),
    AuditLog,
}

/// Cache effects `service` applies after committing the write described by
/// `event`, in order. Empty when the service does not own the event.
pub fn write_invalidations(service: Service, event: &DomainEvent) -> Vec<Invalidation> {
    if !service.owns(event.event_type()) {
        return Vec::new();
    }

    let ns = service.namespace();
    let by_id = || event.entity_id().map(|id| Invalidation::Key(ns, keys::by_id(id)));

    let mut effects = Vec::with_capacity(3);
    match event {
        // Logins change no cached read model of the auth service
        DomainEvent::LoginRealizado(_) | DomainEvent::LoginFalhou(_) => {}

        DomainEvent::UsuarioAtualizado(_) | DomainEvent::UsuarioDeletado(_) => {
            effects.push(Invalidation::Namespace(ns));
            if let Some(email) = event.email() {
                effects.push(Invalidation::Key(ns, keys::by_email(email)));
            }
        }
        DomainEvent::UsuarioCriado(_)
        | DomainEvent::UsuarioAprovado(_)
        | DomainEvent::UsuarioRejeitado(_) => {
            effects.push(Invalidation::Namespace(ns));
        }

        DomainEvent::UnidadeAtualizada(_)
        | DomainEvent::UnidadeDeletada(_)
        | DomainEvent::CategoriaAtualizada(_)
        | DomainEvent::CategoriaDeletada(_)
        | DomainEvent::ProdutoAtualizado(_)
        | DomainEvent::ProdutoDeletado(_) => {
            effects.push(Invalidation::Namespace(ns));
            effects.extend(by_id());
        }

        DomainEvent::ProdutoAprovado(_) | DomainEvent::ProdutoRejeitado(_) => {
            effects.push(Invalidation::Namespace(ns));
            effects.extend(by_id());
            effects.push(Invalidation::Key(ns, keys::pending()));
        }

        DomainEvent::UnidadeCriada(_)
        | DomainEvent::CategoriaCriada(_)
        | DomainEvent::ProdutoCriado(_) => {
            effects.push(Invalidation::Namespace(ns));
        }

        // Stock movements change product balances too
        DomainEvent::MovimentacaoCriada(_) | DomainEvent::MovimentacaoDeletada(_) => {
            effects.push(Invalidation::Namespace(ns));
            effects.push(Invalidation::Namespace(CacheNamespace::Produtos));
        }
    }
    effects
}

/// Foreign events `service` reacts to.
pub fn read_rules(service: Service) -> Vec<(EventType, ReadAction)> {
    use EventType::*;

    let (events, action): (&[EventType], ReadAction) = match service {
        Service::Produtos => (
            &[
                CategoriaCriada,
                CategoriaAtualizada,
                CategoriaDeletada,
                UnidadeCriada,
                UnidadeAtualizada,
                UnidadeDeletada,
                UsuarioAtualizado,
                UsuarioDeletado,
                MovimentacaoCriada,
                MovimentacaoDeletada,
            ],
            ReadAction::ClearNamespace(CacheNamespace::Produtos),
        ),
        Service::Movimentacoes => (
            &[ProdutoAtualizado, ProdutoDeletado],
            ReadAction::ClearNamespace(CacheNamespace::Movimentacoes),
        ),
        Service::Relatorios => (
            &[
                MovimentacaoCriada,
                MovimentacaoDeletada,
                ProdutoCriado,
                ProdutoAtualizado,
                ProdutoDeletado,
                ProdutoAprovado,
                ProdutoRejeitado,
            ],
            ReadAction::ClearNamespace(CacheNamespace::Relatorios),
        ),
        Service::Auth => (
            &[
                UsuarioAtualizado,
                UsuarioDeletado,
                UsuarioAprovado,
                UsuarioRejeitado,
            ],
            ReadAction::ClearNamespace(CacheNamespace::Auth),
        ),
        Service::Usuarios => (&[LoginRealizado, LoginFalhou], ReadAction::AuditLog),
        Service::Unidades | Service::Categorias => (&[], ReadAction::AuditLog),
    };

    events.iter().map(|event_type| (*event_type, action)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use estoque_core::events::{MovementDeleted, NamedEntity, ProductApproved, UserRef};

    #[test]
    fn test_category_update_clears_namespace_then_key() {
        let event = DomainEvent::CategoriaAtualizada(NamedEntity::new(4, "Defensivos"));
        assert_eq!(
            write_invalidations(Service::Categorias, &event),
            vec![
                Invalidation::Namespace(CacheNamespace::Categorias),
                Invalidation::Key(CacheNamespace::Categorias, "id:4".into()),
            ]
        );
    }

    #[test]
    fn test_product_approval_clears_pending() {
        let event = DomainEvent::ProdutoAprovado(ProductApproved {
            id: 12,
            name: "Ureia".into(),
            cost_price: 80.0,
            sale_price: 110.5,
        });
        let effects = write_invalidations(Service::Produtos, &event);
        assert_eq!(effects.len(), 3);
        assert!(effects.contains(&Invalidation::Key(CacheNamespace::Produtos, "pendentes".into())));
        assert!(effects.contains(&Invalidation::Key(CacheNamespace::Produtos, "id:12".into())));
    }

    #[test]
    fn test_movement_clears_products_directly() {
        let event = DomainEvent::MovimentacaoDeletada(MovementDeleted { id: 40 });
        assert_eq!(
            write_invalidations(Service::Movimentacoes, &event),
            vec![
                Invalidation::Namespace(CacheNamespace::Movimentacoes),
                Invalidation::Namespace(CacheNamespace::Produtos),
            ]
        );
    }

    #[test]
    fn test_user_deletion_clears_email_key() {
        let event = DomainEvent::UsuarioDeletado(UserRef {
            id: 2,
            email: "ana@raiz.com".into(),
        });
        assert_eq!(
            write_invalidations(Service::Usuarios, &event),
            vec![
                Invalidation::Namespace(CacheNamespace::Usuarios),
                Invalidation::Key(CacheNamespace::Usuarios, "email:ana@raiz.com".into()),
            ]
        );
    }

    #[test]
    fn test_foreign_event_has_no_write_effect() {
        let event = DomainEvent::CategoriaCriada(NamedEntity::new(1, "Sementes"));
        assert!(write_invalidations(Service::Produtos, &event).is_empty());
    }

    #[test]
    fn test_every_mutation_clears_own_namespace() {
        for service in Service::ALL {
            for event_type in service.publishes() {
                if matches!(event_type, EventType::LoginRealizado | EventType::LoginFalhou) {
                    continue;
                }
                let payload = match event_type.entity() {
                    "usuario" => serde_json::json!({"id": 1, "email": "a@b.c", "nome": "A", "cargo": "gerente"}),
                    "movimentacao" => serde_json::json!({"id": 1, "tipo": "ENTRADA", "produto_id": 2, "quantidade": 3}),
                    "produto" => serde_json::json!({"id": 1, "nome": "P", "preco_custo": 1.0, "preco_venda": 2.0}),
                    _ => serde_json::json!({"id": 1, "nome": "X"}),
                };
                let event = DomainEvent::from_parts(*event_type, payload).unwrap();
                let effects = write_invalidations(service, &event);
                assert_eq!(
                    effects.first(),
                    Some(&Invalidation::Namespace(service.namespace())),
                    "{event_type}"
                );
            }
        }
    }

    #[test]
    fn test_read_rules_never_target_own_events() {
        for service in Service::ALL {
            for (event_type, _) in read_rules(service) {
                assert!(!service.owns(event_type), "{service} reacts to own {event_type}");
            }
        }
    }

    #[test]
    fn test_products_react_to_categories() {
        let rules = read_rules(Service::Produtos);
        assert!(rules.contains(&(
            EventType::CategoriaAtualizada,
            ReadAction::ClearNamespace(CacheNamespace::Produtos)
        )));
        assert!(read_rules(Service::Categorias).is_empty());
    }
}
