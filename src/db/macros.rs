//! Backend dispatch over [`DbPool`](crate::db::pool::DbPool).
//!
//! Most operations are written once per backend because sqlx pools are typed by
//! database. `impl_db_dispatch!` expands the three match arms.

/// Generate one match arm per `DbPool` variant.
///
/// # Example
///
/// ```ignore
/// let version = impl_db_dispatch!(&pool, {
///     MySql(p) => fetch_version(p).await,
///     Postgres(p) => fetch_version(p).await,
///     SQLite(p) => fetch_sqlite_version(p).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
