pub mod command;
pub mod exec;
pub mod inventory;
pub mod reconcile;
pub mod spec;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("D-Bus error: {0}")]
    Zbus(#[from] zbus::Error),

    #[error(
        "unable to read NetworkManager settings from the D-Bus system bus: {0}; \
         check that NetworkManager is installed and the service is running"
    )]
    Discovery(#[source] zbus::Error),

    #[error("invalid connection spec: {0}")]
    Config(String),

    #[error("connection type {0} is not supported for create/modify")]
    Unsupported(crate::spec::ConnectionType),

    #[error("nmcli executable not found on PATH")]
    NmcliNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
