//! Connection lifecycle for the control store and the relay's event store.

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use parking_lot::RwLock;
use rusqlite::OpenFlags;
use tokio_rusqlite::Connection;

use crate::{ControlStore, Error, Result, error::StorageContext as _};

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Size of the read-only connection pool over the event store.
  pub reader_connections:       usize,
  /// Busy timeout for the control store and event-store readers.
  pub busy_timeout:             Duration,
  /// Busy timeout for the maintenance writer, which competes with the relay.
  pub maintenance_busy_timeout: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      reader_connections:       4,
      busy_timeout:             Duration::from_secs(5),
      maintenance_busy_timeout: Duration::from_secs(30),
    }
  }
}

// ─── Both stores ─────────────────────────────────────────────────────────────

/// The control store and event store, opened together.
///
/// Cloning is cheap; both halves are reference-counted.
#[derive(Clone)]
pub struct Stores {
  control: ControlStore,
  events:  EventStore,
}

impl Stores {
  /// Open (or create) the control store and open the event store read-only.
  ///
  /// A missing event store file is not an error: the relay may not have
  /// started yet. Event reads fail with [`Error::NotConnected`] until
  /// [`EventStore::reconnect`] or [`EventStore::connect_if_present`] finds it.
  pub async fn open(
    control_path: impl AsRef<Path>,
    event_path: impl AsRef<Path>,
    options: StoreOptions,
  ) -> Result<Self> {
    let control = ControlStore::open(control_path, options.busy_timeout).await?;
    let events = EventStore::open(event_path, options).await?;
    Ok(Self { control, events })
  }

  pub fn control(&self) -> &ControlStore { &self.control }

  pub fn events(&self) -> &EventStore { &self.events }
}

// ─── Event store ─────────────────────────────────────────────────────────────

/// Read access to the relay's event database.
#[derive(Clone)]
pub struct EventStore {
  inner: Arc<Inner>,
}

struct Inner {
  path:    PathBuf,
  options: StoreOptions,
  readers: RwLock<Option<ReaderPool>>,
}

/// Read-only connections handed out round-robin.
#[derive(Clone)]
struct ReaderPool {
  conns: Arc<[Connection]>,
  next:  Arc<AtomicUsize>,
}

impl ReaderPool {
  async fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
      | OpenFlags::SQLITE_OPEN_URI
      | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let mut conns = Vec::with_capacity(options.reader_connections.max(1));
    for _ in 0..options.reader_connections.max(1) {
      let conn = Connection::open_with_flags(path, flags)
        .await
        .during("open event store")?;
      let busy = options.busy_timeout;
      conn
        .call(move |conn| {
          conn.busy_timeout(busy)?;
          conn.execute_batch("PRAGMA query_only = ON;")?;
          Ok(())
        })
        .await
        .during("configure event store reader")?;
      conns.push(conn);
    }

    Ok(Self { conns: conns.into(), next: Arc::new(AtomicUsize::new(0)) })
  }

  fn pick(&self) -> Connection {
    let i = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
    self.conns[i].clone()
  }

  async fn close(self) {
    for conn in self.conns.iter().cloned() {
      if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close event store reader");
      }
    }
  }
}

impl EventStore {
  /// Open the event store at `path` read-only, leaving it disconnected if
  /// the file does not exist yet.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let store = Self {
      inner: Arc::new(Inner {
        path: path.as_ref().to_path_buf(),
        options,
        readers: RwLock::new(None),
      }),
    };
    store.connect_if_present().await?;
    Ok(store)
  }

  pub fn path(&self) -> &Path { &self.inner.path }

  pub fn is_connected(&self) -> bool { self.inner.readers.read().is_some() }

  /// Connect if currently disconnected and the file now exists.
  ///
  /// Returns whether the store is connected afterwards.
  pub async fn connect_if_present(&self) -> Result<bool> {
    if self.is_connected() {
      return Ok(true);
    }
    if !tokio::fs::try_exists(&self.inner.path).await? {
      tracing::warn!(path = %self.inner.path.display(), "event store not found; leaving disconnected");
      return Ok(false);
    }

    let pool = ReaderPool::open(&self.inner.path, &self.inner.options).await?;
    let surplus = {
      let mut slot = self.inner.readers.write();
      if slot.is_none() {
        *slot = Some(pool);
        None
      } else {
        Some(pool)
      }
    };
    if let Some(pool) = surplus {
      pool.close().await;
    }

    tracing::info!(path = %self.inner.path.display(), "connected to event store");
    Ok(true)
  }

  /// Close the read-only connections and open fresh ones, e.g. after the
  /// relay recreated its database file.
  pub async fn reconnect(&self) -> Result<()> {
    let old = self.inner.readers.write().take();
    if let Some(pool) = old {
      pool.close().await;
    }
    if self.connect_if_present().await? {
      Ok(())
    } else {
      Err(Error::NotConnected)
    }
  }

  /// A read-only connection, or [`Error::NotConnected`].
  pub(crate) fn reader(&self) -> Result<Connection> {
    self
      .inner
      .readers
      .read()
      .as_ref()
      .map(ReaderPool::pick)
      .ok_or(Error::NotConnected)
  }

  /// Open a dedicated read-write connection for deletion, vacuum and
  /// integrity checks.
  ///
  /// The handle holds the relay's database open for writing; close it with
  /// [`MaintenanceHandle::close`] as soon as the work is done.
  pub async fn open_for_write(&self) -> Result<MaintenanceHandle> {
    if !tokio::fs::try_exists(&self.inner.path).await? {
      return Err(Error::NotConnected);
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
      | OpenFlags::SQLITE_OPEN_URI
      | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(&self.inner.path, flags)
      .await
      .during("open event store for write")?;
    let busy = self.inner.options.maintenance_busy_timeout;
    conn
      .call(move |conn| {
        conn.busy_timeout(busy)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await
      .during("configure maintenance connection")?;

    tracing::debug!(path = %self.inner.path.display(), "opened maintenance connection");
    Ok(MaintenanceHandle { conn })
  }
}

// ─── Maintenance handle ──────────────────────────────────────────────────────

/// A short-lived read-write connection to the event store.
///
/// Deletion, vacuum and integrity-check operations live on this type so
/// they cannot run through the read-only pool.
pub struct MaintenanceHandle {
  pub(crate) conn: Connection,
}

impl MaintenanceHandle {
  /// Close the connection, releasing any lock held against the relay.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await.during("close maintenance connection")?;
    tracing::debug!("closed maintenance connection");
    Ok(())
  }
}
