//! Connection profile discovery over the NetworkManager D-Bus Settings API.

use std::collections::HashMap;

use tracing::{debug, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Str};

use crate::{Error, Result};

/// Setting-group → key → value, as returned by `GetSettings`.
pub type SettingsMap = HashMap<String, HashMap<String, OwnedValue>>;

/// Setting groups that keep their values behind `GetSecrets`.
const SECRET_SETTINGS: &[&str] = &[
    "802-11-wireless",
    "802-11-wireless-security",
    "802-1x",
    "gsm",
    "cdma",
    "ppp",
];

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings",
    gen_blocking = false
)]
trait Settings {
    fn list_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
trait SettingsConnection {
    fn get_settings(&self) -> zbus::Result<SettingsMap>;

    fn get_secrets(&self, setting_name: &str) -> zbus::Result<SettingsMap>;
}

/// One existing connection profile, as discovered.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub id: String,
    pub uuid: String,
    pub conn_type: String,
    pub settings: SettingsMap,
}

/// Enumerates existing connection profiles from the Settings service.
///
/// Holds a caller-provided bus connection; records are fetched fresh on
/// every [`list`](Inventory::list) call, never cached.
pub struct Inventory {
    conn: zbus::Connection,
}

impl Inventory {
    pub fn new(conn: zbus::Connection) -> Self {
        Self { conn }
    }

    /// Fetch all connection profiles with their full settings, secrets
    /// merged in.
    pub async fn list(&self) -> Result<Vec<ConnectionRecord>> {
        let settings = SettingsProxy::new(&self.conn)
            .await
            .map_err(Error::Discovery)?;
        let paths = settings.list_connections().await.map_err(Error::Discovery)?;

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let proxy = SettingsConnectionProxy::builder(&self.conn)
                .path(path.clone())
                .map_err(Error::Discovery)?
                .build()
                .await
                .map_err(Error::Discovery)?;

            let mut config = proxy.get_settings().await.map_err(Error::Discovery)?;
            merge_secrets(&proxy, &mut config).await;

            match record_from_settings(config) {
                Some(record) => {
                    debug!(id = %record.id, conn_type = %record.conn_type, "discovered connection");
                    records.push(record);
                }
                None => warn!(path = %path, "connection settings lack an id, skipping"),
            }
        }

        Ok(records)
    }
}

/// Merge secret sub-settings into the configuration map.
///
/// There is no "get all secrets" call, so each secret-bearing group is
/// fetched separately. A failure for one group (no secrets, no permission)
/// does not invalidate the record.
async fn merge_secrets(proxy: &SettingsConnectionProxy<'_>, config: &mut SettingsMap) {
    for &group in SECRET_SETTINGS {
        match proxy.get_secrets(group).await {
            Ok(secrets) => {
                let target = config.entry(group.to_string()).or_default();
                for values in secrets.into_values() {
                    for (key, value) in values {
                        target.insert(key, value);
                    }
                }
            }
            Err(e) => debug!(group, "no secrets merged: {e}"),
        }
    }
}

fn record_from_settings(settings: SettingsMap) -> Option<ConnectionRecord> {
    let id = setting_str(&settings, "connection", "id")?;
    let uuid = setting_str(&settings, "connection", "uuid").unwrap_or_default();
    let conn_type = setting_str(&settings, "connection", "type").unwrap_or_default();
    Some(ConnectionRecord {
        id,
        uuid,
        conn_type,
        settings,
    })
}

fn setting_str(settings: &SettingsMap, group: &str, key: &str) -> Option<String> {
    settings
        .get(group)?
        .get(key)
        .and_then(|v| v.downcast_ref::<Str>().ok())
        .map(|s| s.as_str().to_owned())
}

/// Whether a profile with this name already exists.
///
/// Matching is exact string equality on the record's name only; a name
/// collision with a record of a different type still counts as existing,
/// and is converged via modify rather than create.
pub fn connection_exists(name: &str, records: &[ConnectionRecord]) -> bool {
    records.iter().any(|r| r.id == name)
}
