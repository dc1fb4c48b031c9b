use chrono::Utc;
use classbook::accounts::{Invite, InviteRepository, TokenIssuer, UserRole, UuidTokenIssuer};
use classbook::booking::{default_classes, import_classes, load_csv, ClassRepository};
use classbook::config::{SeedConfig, StorageBackend};
use classbook::error::AppError;
use classbook::store::{InMemoryStore, SqliteStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The store selected by configuration. Each variant implements every
/// repository trait, so callers match once and stay generic afterwards.
pub(crate) enum StoreHandle {
    Memory(Arc<InMemoryStore>),
    Sqlite(Arc<SqliteStore>),
}

pub(crate) fn open_store(backend: &StorageBackend) -> Result<StoreHandle, AppError> {
    match backend {
        StorageBackend::Memory => {
            info!("using in-memory store; bookings are lost on exit");
            Ok(StoreHandle::Memory(Arc::new(InMemoryStore::new())))
        }
        StorageBackend::Sqlite(path) => Ok(StoreHandle::Sqlite(Arc::new(SqliteStore::open(path)?))),
    }
}

/// Ensure the bootstrap admin invite exists and, when the catalog is empty,
/// load classes from the configured CSV or the built-in defaults.
pub(crate) fn seed<S>(store: &S, seed: &SeedConfig) -> Result<(), AppError>
where
    S: ClassRepository + InviteRepository,
{
    store.ensure_invite(Invite {
        token: seed.admin_invite.clone(),
        email: Some(seed.admin_email.clone()),
        role: UserRole::Admin,
        used: false,
        created_at: Utc::now(),
    })?;

    if !store.list_classes()?.is_empty() {
        return Ok(());
    }

    let classes = match seed.classes_csv.as_deref() {
        Some(path) => {
            info!(path = %path.display(), "seeding classes from csv");
            load_csv(path)?
        }
        None => default_classes(Utc::now()),
    };
    let created = import_classes(store, classes)?;
    info!(count = created.len(), "class catalog seeded");
    Ok(())
}

pub(crate) fn issue_invite<S>(
    store: &S,
    role: UserRole,
    email: Option<String>,
) -> Result<Invite, AppError>
where
    S: InviteRepository + ?Sized,
{
    let invite = Invite {
        token: UuidTokenIssuer.issue(),
        email,
        role,
        used: false,
        created_at: Utc::now(),
    };
    store.ensure_invite(invite.clone())?;
    info!(role = invite.role.label(), "invite issued");
    Ok(invite)
}
