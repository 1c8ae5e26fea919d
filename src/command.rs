//! nmcli argument synthesis.
//!
//! Pure functions mapping a [`ConnectionSpec`] to the literal ordered token
//! list of an nmcli invocation (without the binary itself). Optional fields
//! are emitted as a `key value` pair only when set; booleans render as
//! `yes`/`no`. Dispatch is over the closed [`ConnectionType`] enum, so a
//! type the synthesizer cannot express is an explicit [`Error::Unsupported`]
//! instead of a silently empty command.

use crate::spec::{ConnectionSpec, ConnectionType};
use crate::{Error, Result};

/// Ordered nmcli token list under construction.
#[derive(Debug, Default)]
struct ArgList(Vec<String>);

impl ArgList {
    fn push(&mut self, token: impl Into<String>) {
        self.0.push(token.into());
    }

    /// Emit `key value` only when the field is set.
    fn pair_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.0.push(key.to_owned());
            self.0.push(v.to_owned());
        }
    }

    fn pair_num(&mut self, key: &str, value: Option<u32>) {
        if let Some(v) = value {
            self.0.push(key.to_owned());
            self.0.push(v.to_string());
        }
    }

    fn pair_bool(&mut self, key: &str, value: Option<bool>) {
        if let Some(v) = value {
            self.0.push(key.to_owned());
            self.0.push(bool_token(v).to_owned());
        }
    }
}

/// Render a boolean the way nmcli expects it.
fn bool_token(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

/// Space-join a DNS server list, preserving input order.
fn dns_value(servers: Option<&Vec<String>>) -> Option<String> {
    servers.map(|s| s.join(" "))
}

fn required_type(spec: &ConnectionSpec, op: &str) -> Result<ConnectionType> {
    spec.conn_type.ok_or_else(|| {
        Error::Config(format!(
            "a connection type is required while performing a {op} operation"
        ))
    })
}

fn required_master(spec: &ConnectionSpec) -> Result<&str> {
    spec.master.as_deref().ok_or_else(|| {
        Error::Config(format!(
            "master is required for connection type {}",
            spec.conn_type.map(|t| t.as_str()).unwrap_or("unknown")
        ))
    })
}

/// `con add ...` for the spec's connection type.
pub fn create_args(spec: &ConnectionSpec) -> Result<Vec<String>> {
    let ty = required_type(spec, "create")?;
    let mut args = ArgList::default();
    args.push("con");
    args.push("add");
    args.push("type");
    args.push(ty.as_str());
    args.push("con-name");
    args.push(&spec.conn_name);
    args.push("ifname");
    args.push(spec.ifname());

    match ty {
        ConnectionType::Team => {
            push_create_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
        }
        ConnectionType::TeamSlave | ConnectionType::BondSlave => {
            args.push("master");
            args.push(required_master(spec)?);
        }
        ConnectionType::Bond => {
            args.pair_opt("mode", spec.mode.map(|m| m.as_str()));
            push_create_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
            args.pair_num("miimon", spec.miimon);
            args.pair_num("downdelay", spec.downdelay);
            args.pair_num("updelay", spec.updelay);
            args.pair_num("arp-interval", spec.arp_interval);
            args.pair_opt("arp-ip-target", spec.arp_ip_target.as_deref());
            args.pair_opt("primary", spec.primary.as_deref());
        }
        ConnectionType::Ethernet | ConnectionType::Generic => {
            push_create_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
        }
        ConnectionType::Bridge | ConnectionType::Vlan => return Err(Error::Unsupported(ty)),
    }

    Ok(args.0)
}

/// `con mod <name> ...` for the spec's connection type.
pub fn modify_args(spec: &ConnectionSpec) -> Result<Vec<String>> {
    let ty = required_type(spec, "modify")?;
    let mut args = ArgList::default();
    args.push("con");
    args.push("mod");
    args.push(&spec.conn_name);

    match ty {
        ConnectionType::Team => {
            push_modify_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
            // MTU is structurally unsupported on a team profile.
        }
        ConnectionType::TeamSlave => {
            args.push("connection.master");
            args.push(required_master(spec)?);
            args.pair_num("802-3-ethernet.mtu", spec.mtu);
        }
        ConnectionType::Bond => {
            push_modify_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
        }
        ConnectionType::BondSlave => {
            args.push("connection.master");
            args.push(required_master(spec)?);
        }
        ConnectionType::Ethernet => {
            push_modify_addressing(&mut args, spec);
            args.pair_num("802-3-ethernet.mtu", spec.mtu);
            args.pair_bool("autoconnect", spec.autoconnect);
        }
        ConnectionType::Generic => {
            push_modify_addressing(&mut args, spec);
            args.pair_bool("autoconnect", spec.autoconnect);
        }
        ConnectionType::Bridge | ConnectionType::Vlan => return Err(Error::Unsupported(ty)),
    }

    Ok(args.0)
}

/// Create-time addressing block: `ip4`/`gw4`/`ip6`/`gw6` short options.
/// DNS cannot be set at creation time; it rides the modify phase.
fn push_create_addressing(args: &mut ArgList, spec: &ConnectionSpec) {
    args.pair_opt("ip4", spec.ip4.as_deref());
    args.pair_opt("gw4", spec.gw4.as_deref());
    args.pair_opt("ip6", spec.ip6.as_deref());
    args.pair_opt("gw6", spec.gw6.as_deref());
}

/// Modify-time addressing block, using full setting.property names.
fn push_modify_addressing(args: &mut ArgList, spec: &ConnectionSpec) {
    args.pair_opt("ipv4.address", spec.ip4.as_deref());
    args.pair_opt("ipv4.gateway", spec.gw4.as_deref());
    args.pair_opt("ipv4.dns", dns_value(spec.dns4.as_ref()).as_deref());
    args.pair_opt("ipv6.address", spec.ip6.as_deref());
    args.pair_opt("ipv6.gateway", spec.gw6.as_deref());
    args.pair_opt("ipv6.dns", dns_value(spec.dns6.as_ref()).as_deref());
}

/// Whether creation needs the create → modify → activate sequence.
///
/// nmcli cannot set DNS servers (any type) or MTU (slave/ethernet-like
/// types) at creation time; those attributes require a follow-up modify and
/// an activation to apply them to the live device.
pub fn needs_two_phase(spec: &ConnectionSpec) -> bool {
    let has_dns = spec.dns4.is_some() || spec.dns6.is_some();
    match spec.conn_type {
        Some(ConnectionType::Team) => has_dns,
        Some(ConnectionType::TeamSlave) => spec.mtu.is_some(),
        Some(ConnectionType::Bond | ConnectionType::Ethernet | ConnectionType::Generic) => {
            spec.mtu.is_some() || has_dns
        }
        _ => false,
    }
}

pub fn up_args(conn_name: &str) -> Vec<String> {
    name_command("up", conn_name)
}

pub fn down_args(conn_name: &str) -> Vec<String> {
    name_command("down", conn_name)
}

pub fn delete_args(conn_name: &str) -> Vec<String> {
    name_command("del", conn_name)
}

fn name_command(verb: &str, conn_name: &str) -> Vec<String> {
    vec!["con".to_owned(), verb.to_owned(), conn_name.to_owned()]
}
