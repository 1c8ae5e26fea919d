//! Desired-state model for a single connection profile.
//!
//! A [`ConnectionSpec`] is deserialized once per reconciliation from the
//! caller's flat JSON object and never mutated afterwards. Every optional
//! field is an `Option` so "unset" stays structurally distinct from a
//! false/zero value; no defaulting happens here or downstream.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Connection profile types understood by the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionType {
    Ethernet,
    Team,
    TeamSlave,
    Bond,
    BondSlave,
    Bridge,
    Vlan,
    Generic,
}

impl ConnectionType {
    /// `true` for types that must be bound to a master aggregation.
    pub fn is_slave(self) -> bool {
        matches!(self, Self::TeamSlave | Self::BondSlave)
    }

    /// The nmcli type token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Team => "team",
            Self::TeamSlave => "team-slave",
            Self::Bond => "bond",
            Self::BondSlave => "bond-slave",
            Self::Bridge => "bridge",
            Self::Vlan => "vlan",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bonding mode (`mode` option of a bond connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondMode {
    #[serde(rename = "balance-rr")]
    BalanceRr,
    #[serde(rename = "active-backup")]
    ActiveBackup,
    #[serde(rename = "balance-xor")]
    BalanceXor,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "802.3ad")]
    Ieee8023ad,
    #[serde(rename = "balance-tlb")]
    BalanceTlb,
    #[serde(rename = "balance-alb")]
    BalanceAlb,
}

impl BondMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BalanceRr => "balance-rr",
            Self::ActiveBackup => "active-backup",
            Self::BalanceXor => "balance-xor",
            Self::Broadcast => "broadcast",
            Self::Ieee8023ad => "802.3ad",
            Self::BalanceTlb => "balance-tlb",
            Self::BalanceAlb => "balance-alb",
        }
    }
}

/// Whether the connection profile should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Present,
    Absent,
}

/// Desired state of one connection profile, as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSpec {
    pub conn_name: String,
    pub state: DesiredState,
    #[serde(rename = "type", default)]
    pub conn_type: Option<ConnectionType>,
    #[serde(default)]
    pub ifname: Option<String>,
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub autoconnect: Option<bool>,

    // Addressing
    #[serde(default)]
    pub ip4: Option<String>,
    #[serde(default)]
    pub gw4: Option<String>,
    #[serde(default)]
    pub dns4: Option<Vec<String>>,
    #[serde(default)]
    pub ip6: Option<String>,
    #[serde(default)]
    pub gw6: Option<String>,
    #[serde(default)]
    pub dns6: Option<Vec<String>>,
    #[serde(default)]
    pub mtu: Option<u32>,

    // Bonding
    #[serde(default)]
    pub mode: Option<BondMode>,
    #[serde(default)]
    pub miimon: Option<u32>,
    #[serde(default)]
    pub downdelay: Option<u32>,
    #[serde(default)]
    pub updelay: Option<u32>,
    #[serde(default)]
    pub arp_interval: Option<u32>,
    #[serde(default)]
    pub arp_ip_target: Option<String>,
    #[serde(default)]
    pub primary: Option<String>,

    // Bridging
    #[serde(default)]
    pub stp: Option<bool>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub slavepriority: Option<u32>,
    #[serde(default)]
    pub forwarddelay: Option<u32>,
    #[serde(default)]
    pub hellotime: Option<u32>,
    #[serde(default)]
    pub maxage: Option<u32>,
    #[serde(default)]
    pub ageingtime: Option<u32>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub path_cost: Option<u32>,
    #[serde(default)]
    pub hairpin: Option<bool>,

    // VLAN
    #[serde(default)]
    pub vlanid: Option<u16>,
    #[serde(default)]
    pub vlandev: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub ingress: Option<String>,
    #[serde(default)]
    pub egress: Option<String>,
}

const MAX_DNS_SERVERS: usize = 3;

impl ConnectionSpec {
    /// Interface name, falling back to the connection name.
    pub fn ifname(&self) -> &str {
        self.ifname.as_deref().unwrap_or(&self.conn_name)
    }

    /// Validate caller input before any discovery or actuation.
    pub fn validate(&self) -> Result<()> {
        if self.conn_name.is_empty() {
            return Err(Error::Config("conn_name must not be empty".into()));
        }

        if let Some(ty) = self.conn_type {
            if ty.is_slave() && self.master.is_none() {
                return Err(Error::Config(format!(
                    "master is required for connection type {ty}"
                )));
            }
            if ty == ConnectionType::TeamSlave && self.ifname.is_none() {
                return Err(Error::Config(
                    "ifname is required for connection type team-slave".into(),
                ));
            }
        }

        for (family, dns) in [("dns4", &self.dns4), ("dns6", &self.dns6)] {
            if let Some(servers) = dns
                && servers.len() > MAX_DNS_SERVERS
            {
                return Err(Error::Config(format!(
                    "{family} accepts at most {MAX_DNS_SERVERS} servers, got {}",
                    servers.len()
                )));
            }
        }

        Ok(())
    }
}
