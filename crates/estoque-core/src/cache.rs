//! Cache namespaces, key conventions and TTL policy.
//!
//! Keys live in a flat keyspace as `"<namespace>:<key>"`. A namespace is the
//! unit of bulk invalidation: `"produtos:*"` clears every product entry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL applied when a caller does not choose one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Logical partition of the cache keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Usuarios,
    Auth,
    Unidades,
    Categorias,
    Produtos,
    Movimentacoes,
    Relatorios,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 7] = [
        CacheNamespace::Usuarios,
        CacheNamespace::Auth,
        CacheNamespace::Unidades,
        CacheNamespace::Categorias,
        CacheNamespace::Produtos,
        CacheNamespace::Movimentacoes,
        CacheNamespace::Relatorios,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Usuarios => "usuarios",
            CacheNamespace::Auth => "auth",
            CacheNamespace::Unidades => "unidades",
            CacheNamespace::Categorias => "categorias",
            CacheNamespace::Produtos => "produtos",
            CacheNamespace::Movimentacoes => "movimentacoes",
            CacheNamespace::Relatorios => "relatorios",
        }
    }

    /// Full store key for `key` in this namespace.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.as_str(), key)
    }

    /// Glob pattern scoped to this namespace.
    pub fn pattern(&self, pattern: &str) -> String {
        format!("{}:{}", self.as_str(), pattern)
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key shapes used by the read paths of the services.
pub mod keys {
    pub fn all() -> String {
        "todos".to_string()
    }

    pub fn by_id(id: i64) -> String {
        format!("id:{id}")
    }

    pub fn by_unit(unit_id: i64) -> String {
        format!("unidade:{unit_id}")
    }

    pub fn by_email(email: &str) -> String {
        format!("email:{email}")
    }

    pub fn pending() -> String {
        "pendentes".to_string()
    }

    /// Key of a cached login session.
    pub fn session(user_id: i64) -> String {
        format!("sessao:{user_id}")
    }
}

/// Kind of cached read, each with its staleness tolerance.
///
/// Rarely-changing reference data gets long TTLs; aggregates over
/// frequently-changing data get short ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    UserList,
    UserByEmail,
    AuthSession,
    Units,
    Categories,
    Products,
    PendingProducts,
    Movements,
    AbcCurveReport,
    Reports,
}

impl ReadKind {
    pub fn namespace(&self) -> CacheNamespace {
        match self {
            ReadKind::UserList | ReadKind::UserByEmail => CacheNamespace::Usuarios,
            ReadKind::AuthSession => CacheNamespace::Auth,
            ReadKind::Units => CacheNamespace::Unidades,
            ReadKind::Categories => CacheNamespace::Categorias,
            ReadKind::Products | ReadKind::PendingProducts => CacheNamespace::Produtos,
            ReadKind::Movements => CacheNamespace::Movimentacoes,
            ReadKind::AbcCurveReport | ReadKind::Reports => CacheNamespace::Relatorios,
        }
    }

    pub fn ttl(&self) -> Duration {
        let secs = match self {
            ReadKind::UserList => 300,
            ReadKind::UserByEmail => 600,
            ReadKind::AuthSession => 7200,
            ReadKind::Units | ReadKind::Categories | ReadKind::Products => 600,
            ReadKind::PendingProducts | ReadKind::Movements => 300,
            ReadKind::AbcCurveReport => 1800,
            ReadKind::Reports => 900,
        };
        Duration::from_secs(secs)
    }
}
