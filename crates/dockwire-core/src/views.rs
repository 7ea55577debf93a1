//! Derived views over container inspect and disk usage data.
//!
//! Each view is a plain value built from the raw records; nothing here talks
//! to the daemon.

use crate::models::{ContainerInspect, PortBinding, SystemDf};
use crate::normalize::{compose_info, short_id, strip_name_prefix, ComposeInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overview of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryView {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub state: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub oom_killed: bool,
    pub dead: bool,
    pub health: Option<String>,
    pub pid: i64,
    pub created: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: i64,
    pub error: Option<String>,
    pub restart_count: i64,
    /// Restart policy as Docker prints it, e.g. `on-failure:5`.
    pub restart_policy: String,
    pub command: String,
    pub working_dir: String,
    pub env: Vec<(String, String)>,
    pub compose: Option<ComposeInfo>,
}

/// Parse a daemon timestamp; Go's zero time means "never".
fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() || value.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn split_env(entry: &str) -> (String, String) {
    match entry.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (entry.to_string(), String::new()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Build the overview of a container.
pub fn summary_view(inspect: &ContainerInspect) -> SummaryView {
    let state = &inspect.state;
    let policy = &inspect.host_config.restart_policy;
    let restart_policy = match policy.name.as_str() {
        "" => "no".to_string(),
        "on-failure" if policy.maximum_retry_count > 0 => {
            format!("on-failure:{}", policy.maximum_retry_count)
        }
        name => name.to_string(),
    };

    let command = std::iter::once(inspect.path.as_str())
        .chain(inspect.args.iter().map(String::as_str))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    SummaryView {
        id: inspect.id.clone(),
        short_id: short_id(&inspect.id).to_string(),
        name: strip_name_prefix(&inspect.name).to_string(),
        image: inspect.config.image.clone(),
        image_id: inspect.image.clone(),
        state: state.status.clone(),
        running: state.running,
        paused: state.paused,
        restarting: state.restarting,
        oom_killed: state.oom_killed,
        dead: state.dead,
        health: state.health.as_ref().map(|h| h.status.clone()),
        pid: state.pid,
        created: parse_time(&inspect.created),
        started_at: parse_time(&state.started_at),
        finished_at: parse_time(&state.finished_at),
        exit_code: state.exit_code,
        error: non_empty(&state.error),
        restart_count: inspect.restart_count,
        restart_policy,
        command,
        working_dir: inspect.config.working_dir.clone(),
        env: inspect
            .config
            .env
            .iter()
            .flatten()
            .map(|e| split_env(e))
            .collect(),
        compose: inspect.config.labels.as_ref().and_then(compose_info),
    }
}

/// One network attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network: String,
    pub network_id: String,
    pub ip_address: Option<String>,
    pub prefix_len: i64,
    pub gateway: Option<String>,
    pub mac_address: Option<String>,
    pub aliases: Vec<String>,
}

/// A container port and where it is published on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
}

/// Networking details of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkView {
    pub mode: String,
    pub networks: Vec<NetworkAttachment>,
    pub ports: Vec<PortMapping>,
}

/// Expand a `"80/tcp" -> [bindings]` map into sorted mappings.
fn port_mappings(ports: &HashMap<String, Option<Vec<PortBinding>>>) -> Vec<PortMapping> {
    let mut out = Vec::new();
    for (key, bindings) in ports {
        let (port, protocol) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let Ok(container_port) = port.parse::<u16>() else {
            tracing::debug!(port = %key, "Skipping unparsable port key");
            continue;
        };

        match bindings.as_deref() {
            Some(bindings) if !bindings.is_empty() => {
                for binding in bindings {
                    out.push(PortMapping {
                        container_port,
                        protocol: protocol.to_string(),
                        host_ip: non_empty(&binding.host_ip),
                        host_port: binding.host_port.parse().ok(),
                    });
                }
            }
            _ => out.push(PortMapping {
                container_port,
                protocol: protocol.to_string(),
                host_ip: None,
                host_port: None,
            }),
        }
    }
    out.sort_by(|a, b| {
        (a.container_port, &a.protocol, &a.host_ip, a.host_port)
            .cmp(&(b.container_port, &b.protocol, &b.host_ip, b.host_port))
    });
    out
}

/// Build the networking view of a container.
///
/// Live port bindings come from the network settings; a stopped container
/// has none, so the configured bindings are used instead.
pub fn network_view(inspect: &ContainerInspect) -> NetworkView {
    let mut networks: Vec<NetworkAttachment> = inspect
        .network_settings
        .networks
        .iter()
        .map(|(name, endpoint)| NetworkAttachment {
            network: name.clone(),
            network_id: endpoint.network_id.clone(),
            ip_address: non_empty(&endpoint.ip_address),
            prefix_len: endpoint.ip_prefix_len,
            gateway: non_empty(&endpoint.gateway),
            mac_address: non_empty(&endpoint.mac_address),
            aliases: endpoint.aliases.clone().unwrap_or_default(),
        })
        .collect();
    networks.sort_by(|a, b| a.network.cmp(&b.network));

    let ports = inspect
        .network_settings
        .ports
        .as_ref()
        .filter(|p| !p.is_empty())
        .or(inspect.host_config.port_bindings.as_ref())
        .map(port_mappings)
        .unwrap_or_default();

    NetworkView {
        mode: inspect.host_config.network_mode.clone(),
        networks,
        ports,
    }
}

/// Totals for one category of `docker system df`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total: usize,
    pub active: usize,
    pub size: i64,
    pub reclaimable: i64,
}

/// System-wide disk usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsageSummary {
    pub images: UsageTotals,
    pub containers: UsageTotals,
    pub volumes: UsageTotals,
    pub build_cache: UsageTotals,
}

impl DiskUsageSummary {
    /// Summarize a system df response.
    pub fn from_df(df: &SystemDf) -> Self {
        let mut images = UsageTotals {
            total: df.images.len(),
            ..Default::default()
        };
        for image in &df.images {
            if image.containers > 0 {
                images.active += 1;
            } else {
                images.reclaimable += image.size.max(0);
            }
            images.size += image.size.max(0);
        }
        if df.layers_size > 0 {
            images.size = df.layers_size;
            images.reclaimable = images.reclaimable.min(images.size);
        }

        let mut containers = UsageTotals {
            total: df.containers.len(),
            ..Default::default()
        };
        for container in &df.containers {
            let size = container.size_rw.unwrap_or(0).max(0);
            containers.size += size;
            if container.state == "running" {
                containers.active += 1;
            } else {
                containers.reclaimable += size;
            }
        }

        let mut volumes = UsageTotals {
            total: df.volumes.len(),
            ..Default::default()
        };
        for volume in &df.volumes {
            let Some(usage) = &volume.usage_data else {
                continue;
            };
            let size = usage.size.max(0);
            volumes.size += size;
            if usage.ref_count > 0 {
                volumes.active += 1;
            } else {
                volumes.reclaimable += size;
            }
        }

        let cache = df.build_cache.as_deref().unwrap_or_default();
        let mut build_cache = UsageTotals {
            total: cache.len(),
            ..Default::default()
        };
        for record in cache {
            let size = record.size.max(0);
            build_cache.size += size;
            if record.in_use {
                build_cache.active += 1;
            } else if !record.shared {
                build_cache.reclaimable += size;
            }
        }

        Self {
            images,
            containers,
            volumes,
            build_cache,
        }
    }
}

/// Disk usage of one container plus the system totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsageView {
    /// Bytes written to the container's writable layer.
    pub size_rw: Option<i64>,
    /// Total size of all layers including the writable one.
    pub size_root_fs: Option<i64>,
    pub system: DiskUsageSummary,
}

/// Build the disk usage view for a container.
///
/// Sizes come from the system df entry with the same ID, falling back to
/// whatever the inspect response carried.
pub fn disk_usage_view(inspect: &ContainerInspect, df: &SystemDf) -> DiskUsageView {
    let entry = df.containers.iter().find(|c| c.id == inspect.id);
    DiskUsageView {
        size_rw: entry.and_then(|c| c.size_rw).or(inspect.size_rw),
        size_root_fs: entry.and_then(|c| c.size_root_fs).or(inspect.size_root_fs),
        system: DiskUsageSummary::from_df(df),
    }
}

/// One mount of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountView {
    pub kind: String,
    pub name: Option<String>,
    pub source: String,
    pub destination: String,
    pub mode: String,
    pub read_write: bool,
}

/// List a container's mounts in destination order.
pub fn mounts_view(inspect: &ContainerInspect) -> Vec<MountView> {
    let mut mounts: Vec<MountView> = inspect
        .mounts
        .iter()
        .map(|m| MountView {
            kind: m.kind.clone(),
            name: m.name.clone().filter(|n| !n.is_empty()),
            source: m.source.clone(),
            destination: m.destination.clone(),
            mode: m.mode.clone(),
            read_write: m.rw,
        })
        .collect();
    mounts.sort_by(|a, b| a.destination.cmp(&b.destination));
    mounts
}

/// Everything the detail views need for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub summary: SummaryView,
    pub network: NetworkView,
    pub disk_usage: DiskUsageView,
    pub mounts: Vec<MountView>,
}

impl ContainerDetails {
    pub fn build(inspect: &ContainerInspect, df: &SystemDf) -> Self {
        Self {
            summary: summary_view(inspect),
            network: network_view(inspect),
            disk_usage: disk_usage_view(inspect, df),
            mounts: mounts_view(inspect),
        }
    }
}

/// Format a byte count with decimal units, e.g. `1.5kB` or `236MB`.
pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    // Four significant digits, trailing zeros dropped.
    let mut text = four_significant(value);
    if text.parse::<f64>().is_ok_and(|v| v >= 1000.0) && unit < UNITS.len() - 1 {
        unit += 1;
        text = four_significant(value / 1000.0);
    }
    format!("{text}{}", UNITS[unit])
}

fn four_significant(value: f64) -> String {
    let integer_digits = if value < 1.0 {
        1
    } else {
        value.log10().floor() as usize + 1
    };
    let decimals = 4usize.saturating_sub(integer_digits);
    let text = format!("{value:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
