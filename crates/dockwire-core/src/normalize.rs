//! Pure helpers that turn raw API records into display-ready snapshots.

use crate::models::{ContainerSummary, ImageSummary, Port};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Compose label keys.
pub mod labels {
    pub const PROJECT: &str = "com.docker.compose.project";
    pub const SERVICE: &str = "com.docker.compose.service";
    pub const WORKING_DIR: &str = "com.docker.compose.project.working_dir";
    pub const CONFIG_FILES: &str = "com.docker.compose.project.config_files";
    pub const CONTAINER_NUMBER: &str = "com.docker.compose.container-number";
}

const NONE_TAG: &str = "<none>";

/// Strip the single leading `/` Docker puts on container names.
pub fn strip_name_prefix(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// First 12 characters of an ID, after any `sha256:` prefix.
pub fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    id.get(..12).unwrap_or(id)
}

/// Split `repo[:tag]` into repository and tag.
///
/// A colon only starts a tag when it comes after the last `/`, so registry
/// ports are left alone. Untagged references get `latest`.
pub fn split_repo_tag(reference: &str) -> (String, String) {
    if reference == "<none>:<none>" {
        return (NONE_TAG.to_string(), NONE_TAG.to_string());
    }

    let slash = reference.rfind('/');
    match reference.rfind(':') {
        Some(colon) if slash.map_or(true, |slash| colon > slash) => (
            reference[..colon].to_string(),
            reference[colon + 1..].to_string(),
        ),
        _ => (reference.to_string(), "latest".to_string()),
    }
}

/// Render a port the way `docker ps` does.
pub fn format_port(port: &Port) -> String {
    match port.public_port {
        Some(public) => match port.ip.as_deref().filter(|ip| !ip.is_empty()) {
            Some(ip) => format!("{ip}:{public}->{}/{}", port.private_port, port.kind),
            None => format!("{public}->{}/{}", port.private_port, port.kind),
        },
        None => format!("{}/{}", port.private_port, port.kind),
    }
}

/// Compose metadata carried in container labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeInfo {
    pub project: String,
    pub service: String,
    pub working_dir: Option<String>,
    pub config_files: Vec<String>,
    pub container_number: Option<u32>,
}

/// Extract compose metadata; `None` unless both project and service are set.
pub fn compose_info(labels: &HashMap<String, String>) -> Option<ComposeInfo> {
    let project = labels.get(labels::PROJECT)?;
    let service = labels.get(labels::SERVICE)?;

    Some(ComposeInfo {
        project: project.clone(),
        service: service.clone(),
        working_dir: labels.get(labels::WORKING_DIR).cloned(),
        config_files: labels
            .get(labels::CONFIG_FILES)
            .map(|files| {
                files
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        container_number: labels
            .get(labels::CONTAINER_NUMBER)
            .and_then(|n| n.trim().parse().ok()),
    })
}

/// A container from the listing, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub short_id: String,
    /// Primary name without the leading `/`.
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub command: String,
    /// Creation time, seconds since the epoch.
    pub created: i64,
    pub state: String,
    pub status: String,
    pub ports: Vec<String>,
    pub labels: HashMap<String, String>,
    pub compose: Option<ComposeInfo>,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

impl From<ContainerSummary> for Container {
    fn from(raw: ContainerSummary) -> Self {
        let name = raw
            .names
            .first()
            .map(|n| strip_name_prefix(n).to_string())
            .unwrap_or_default();
        let mut ports: Vec<String> = raw.ports.iter().map(format_port).collect();
        ports.dedup();

        Self {
            short_id: short_id(&raw.id).to_string(),
            compose: compose_info(&raw.labels),
            id: raw.id,
            name,
            image: raw.image,
            image_id: raw.image_id,
            command: raw.command,
            created: raw.created,
            state: raw.state,
            status: raw.status,
            ports,
            labels: raw.labels,
        }
    }
}

/// One row of the image listing: an image under one of its tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub short_id: String,
    pub repository: String,
    pub tag: String,
    /// Creation time, seconds since the epoch.
    pub created: i64,
    pub size: i64,
    /// Number of containers using the image, or `-1` if unknown.
    pub containers: i64,
}

/// Expand an image record into one row per tag (`<none>` if untagged).
pub fn image_rows(raw: &ImageSummary) -> Vec<Image> {
    let row = |(repository, tag): (String, String)| Image {
        id: raw.id.clone(),
        short_id: short_id(&raw.id).to_string(),
        repository,
        tag,
        created: raw.created,
        size: raw.size,
        containers: raw.containers,
    };

    match raw.repo_tags.as_deref() {
        Some(tags) if !tags.is_empty() => {
            tags.iter().map(|t| row(split_repo_tag(t))).collect()
        }
        _ => vec![row((NONE_TAG.to_string(), NONE_TAG.to_string()))],
    }
}

/// Group compose containers by project name.
///
/// Containers without compose labels are left out. Order within a group
/// follows the input.
pub fn group_by_project(containers: &[Container]) -> BTreeMap<&str, Vec<&Container>> {
    let mut groups: BTreeMap<&str, Vec<&Container>> = BTreeMap::new();
    for container in containers {
        if let Some(compose) = &container.compose {
            groups.entry(compose.project.as_str()).or_default().push(container);
        }
    }
    groups
}
