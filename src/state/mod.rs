// State module - Durable tenant record store

pub mod ports;

use crate::error::{FleetError, Result};
use crate::tenant::Tenant;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub use ports::next_port;

/// Version of the record file format
const STORE_VERSION: &str = "1.0.0";

/// Durable mapping from tenant ID to tenant record.
///
/// Reads may run concurrently; writes are serialized. A write that fails to
/// persist is not applied.
pub trait TenantStore: Send + Sync {
    fn get_tenant(&self, id: &str) -> Result<Tenant>;

    /// All tenants, ordered by ID
    fn tenants(&self) -> Vec<Tenant>;

    /// Insert a new record; `Conflict` if the ID is taken
    fn add_tenant(&self, tenant: Tenant) -> Result<()>;

    /// Replace an existing record; `NotFound` if absent
    fn update_tenant(&self, tenant: &Tenant) -> Result<()>;

    /// Read-modify-write a record under the store's write lock.
    ///
    /// `apply` returns whether it changed anything; nothing is persisted when
    /// it returns false. Returns the record as stored afterwards.
    fn modify_tenant(&self, id: &str, apply: &mut dyn FnMut(&mut Tenant) -> bool)
        -> Result<Tenant>;

    fn remove_tenant(&self, id: &str) -> Result<Tenant>;

    /// Reserve the next free port above `baseline`.
    ///
    /// The reservation is durable: the port is never handed out again even if
    /// the tenant that receives it is later deleted.
    fn allocate_port(&self, baseline: u16) -> Result<u16>;
}

/// On-disk representation of the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFile {
    pub version: String,
    pub tenants: BTreeMap<String, Tenant>,
    /// Highest port ever allocated
    #[serde(default)]
    pub port_high_water: u16,
    pub last_updated: DateTime<Utc>,
}

impl StoreFile {
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            tenants: BTreeMap::new(),
            port_high_water: 0,
            last_updated: Utc::now(),
        }
    }

    /// Validate the loaded structure
    pub fn validate(&self) -> Result<()> {
        if self.version != STORE_VERSION {
            return Err(FleetError::StateCorruption(format!(
                "Incompatible store version: expected {}, found {}",
                STORE_VERSION, self.version
            )));
        }

        let mut seen_ports = HashSet::new();
        for (key, tenant) in &self.tenants {
            if key != &tenant.id {
                return Err(FleetError::StateCorruption(format!(
                    "Record keyed {} carries id {}",
                    key, tenant.id
                )));
            }
            if !seen_ports.insert(tenant.port) {
                return Err(FleetError::StateCorruption(format!(
                    "Duplicate port {} found on tenant {}",
                    tenant.port, tenant.id
                )));
            }
        }

        Ok(())
    }
}

impl Default for StoreFile {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON-file backed [`TenantStore`]
pub struct JsonTenantStore {
    path: PathBuf,
    data: RwLock<StoreFile>,
}

impl JsonTenantStore {
    /// Open the store at `path`, loading existing records if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = load_file(&path)?;
        tracing::debug!(path = %path.display(), tenants = data.tenants.len(), "Opened tenant store");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the data, persist it, then publish it.
    fn write<T>(&self, mutate: impl FnOnce(&mut StoreFile) -> Result<Option<T>>) -> Result<Option<T>> {
        let mut guard = self.data.write();
        let mut next = guard.clone();
        let Some(out) = mutate(&mut next)? else {
            return Ok(None);
        };
        next.last_updated = Utc::now();
        save_file(&self.path, &next)?;
        *guard = next;
        Ok(Some(out))
    }
}

impl TenantStore for JsonTenantStore {
    fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.data
            .read()
            .tenants
            .get(id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(id.to_string()))
    }

    fn tenants(&self) -> Vec<Tenant> {
        self.data.read().tenants.values().cloned().collect()
    }

    fn add_tenant(&self, tenant: Tenant) -> Result<()> {
        self.write(|data| {
            if data.tenants.contains_key(&tenant.id) {
                return Err(FleetError::Conflict(tenant.subdomain.clone()));
            }
            if let Some(holder) = data.tenants.values().find(|t| t.port == tenant.port) {
                return Err(FleetError::Conflict(format!(
                    "port {} already held by {}",
                    tenant.port, holder.id
                )));
            }
            data.port_high_water = data.port_high_water.max(tenant.port);
            data.tenants.insert(tenant.id.clone(), tenant);
            Ok(Some(()))
        })?;
        Ok(())
    }

    fn update_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.write(|data| match data.tenants.get_mut(&tenant.id) {
            Some(slot) => {
                *slot = tenant.clone();
                Ok(Some(()))
            }
            None => Err(FleetError::NotFound(tenant.id.clone())),
        })?;
        Ok(())
    }

    fn modify_tenant(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Tenant) -> bool,
    ) -> Result<Tenant> {
        let changed = self.write(|data| {
            let tenant = data
                .tenants
                .get_mut(id)
                .ok_or_else(|| FleetError::NotFound(id.to_string()))?;
            Ok(apply(tenant).then(|| tenant.clone()))
        })?;

        match changed {
            Some(tenant) => Ok(tenant),
            None => self.get_tenant(id),
        }
    }

    fn remove_tenant(&self, id: &str) -> Result<Tenant> {
        self.write(|data| {
            data.tenants
                .remove(id)
                .map(Some)
                .ok_or_else(|| FleetError::NotFound(id.to_string()))
        })?
        .ok_or_else(|| FleetError::NotFound(id.to_string()))
    }

    fn allocate_port(&self, baseline: u16) -> Result<u16> {
        self.write(|data| {
            let port = next_port(
                data.tenants.values().map(|t| t.port),
                data.port_high_water,
                baseline,
            )
            .ok_or_else(|| FleetError::Other("port space exhausted".to_string()))?;
            data.port_high_water = port;
            Ok(Some(port))
        })?
        .ok_or_else(|| FleetError::Other("port space exhausted".to_string()))
    }
}

fn load_file(path: &Path) -> Result<StoreFile> {
    // A missing file is an empty fleet
    if !path.exists() {
        return Ok(StoreFile::new());
    }

    let file = File::open(path)
        .map_err(|e| FleetError::StateLoadError(format!("Failed to open store file: {}", e)))?;

    let data: StoreFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| FleetError::StateLoadError(format!("Failed to parse store file: {}", e)))?;

    data.validate()?;

    Ok(data)
}

/// Write the store atomically (temp file + rename)
fn save_file(path: &Path, data: &StoreFile) -> Result<()> {
    data.validate()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to create store directory: {}", e))
        })?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let file = File::create(&temp_path).map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to create temp store file: {}", e))
        })?;

        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, data).map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to serialize tenants: {}", e))
        })?;

        writer.flush().map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to flush store file: {}", e))
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        FleetError::PersistenceFailure(format!("Failed to rename temp store file: {}", e))
    })?;

    Ok(())
}
