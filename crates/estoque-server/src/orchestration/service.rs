//! The inventory services and what each one owns.

use estoque_core::{CacheNamespace, EventType};
use std::str::FromStr;

/// One independently deployed inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Auth,
    Usuarios,
    Unidades,
    Categorias,
    Produtos,
    Movimentacoes,
    Relatorios,
}

impl Service {
    pub const ALL: [Service; 7] = [
        Service::Auth,
        Service::Usuarios,
        Service::Unidades,
        Service::Categorias,
        Service::Produtos,
        Service::Movimentacoes,
        Service::Relatorios,
    ];

    /// Short name, as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Auth => "auth",
            Service::Usuarios => "usuarios",
            Service::Unidades => "unidades",
            Service::Categorias => "categorias",
            Service::Produtos => "produtos",
            Service::Movimentacoes => "movimentacoes",
            Service::Relatorios => "relatorios",
        }
    }

    /// Name stamped as `servicoOrigem` on published envelopes.
    pub fn name(&self) -> &'static str {
        match self {
            Service::Auth => "auth-service",
            Service::Usuarios => "usuarios-service",
            Service::Unidades => "unidades-service",
            Service::Categorias => "categorias-service",
            Service::Produtos => "produtos-service",
            Service::Movimentacoes => "movimentacoes-service",
            Service::Relatorios => "relatorios-service",
        }
    }

    /// Cache namespace written by this service's read paths.
    pub fn namespace(&self) -> CacheNamespace {
        match self {
            Service::Auth => CacheNamespace::Auth,
            Service::Usuarios => CacheNamespace::Usuarios,
            Service::Unidades => CacheNamespace::Unidades,
            Service::Categorias => CacheNamespace::Categorias,
            Service::Produtos => CacheNamespace::Produtos,
            Service::Movimentacoes => CacheNamespace::Movimentacoes,
            Service::Relatorios => CacheNamespace::Relatorios,
        }
    }

    /// Event types this service is allowed to publish.
    pub fn publishes(&self) -> &'static [EventType] {
        match self {
            Service::Auth => &[EventType::LoginRealizado, EventType::LoginFalhou],
            Service::Usuarios => &[
                EventType::UsuarioCriado,
                EventType::UsuarioAtualizado,
                EventType::UsuarioDeletado,
                EventType::UsuarioAprovado,
                EventType::UsuarioRejeitado,
            ],
            Service::Unidades => &[
                EventType::UnidadeCriada,
                EventType::UnidadeAtualizada,
                EventType::UnidadeDeletada,
            ],
            Service::Categorias => &[
                EventType::CategoriaCriada,
                EventType::CategoriaAtualizada,
                EventType::CategoriaDeletada,
            ],
            Service::Produtos => &[
                EventType::ProdutoCriado,
                EventType::ProdutoAtualizado,
                EventType::ProdutoDeletado,
                EventType::ProdutoAprovado,
                EventType::ProdutoRejeitado,
            ],
            Service::Movimentacoes => &[
                EventType::MovimentacaoCriada,
                EventType::MovimentacaoDeletada,
            ],
            Service::Relatorios => &[],
        }
    }

    pub fn owns(&self, event_type: EventType) -> bool {
        self.publishes().contains(&event_type)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service '{0}', expected one of auth, usuarios, unidades, categorias, produtos, movimentacoes, relatorios")]
pub struct UnknownService(pub String);

impl FromStr for Service {
    type Err = UnknownService;

    /// Accepts both the short name and the `-service` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.trim().strip_suffix("-service").unwrap_or(s.trim());
        Service::ALL
            .into_iter()
            .find(|service| service.as_str().eq_ignore_ascii_case(short))
            .ok_or_else(|| UnknownService(s.to_string()))
    }
}
