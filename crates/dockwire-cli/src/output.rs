//! Plain-text rendering of client results.

use chrono::{DateTime, Local};
use dockwire_core::normalize::group_by_project;
use dockwire_core::views::{human_size, UsageTotals};
use dockwire_core::{Container, DiskUsageSummary, DockerEvent, Image};

/// Left-aligned columns padded to the widest cell.
pub fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let render = |cells: Vec<&str>| {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == last {
                    cell.to_string()
                } else {
                    format!("{cell:<width$}", width = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join("   ")
    };

    let mut out = render(header.to_vec());
    for row in rows {
        out.push('\n');
        out.push_str(&render(row.iter().map(String::as_str).collect()));
    }
    out
}

fn container_row(c: &Container) -> Vec<String> {
    vec![
        c.short_id.clone(),
        c.image.clone(),
        c.status.clone(),
        c.ports.join(", "),
        c.name.clone(),
    ]
}

const CONTAINER_HEADER: [&str; 5] = ["CONTAINER ID", "IMAGE", "STATUS", "PORTS", "NAMES"];

pub fn containers(list: &[Container]) -> String {
    let rows: Vec<_> = list.iter().map(container_row).collect();
    table(&CONTAINER_HEADER, &rows)
}

/// Containers grouped by compose project; others listed last.
pub fn containers_grouped(list: &[Container]) -> String {
    let mut sections = Vec::new();
    for (project, members) in group_by_project(list) {
        let rows: Vec<_> = members.into_iter().map(container_row).collect();
        sections.push(format!("[{project}]\n{}", table(&CONTAINER_HEADER, &rows)));
    }

    let standalone: Vec<_> = list
        .iter()
        .filter(|c| c.compose.is_none())
        .map(container_row)
        .collect();
    if !standalone.is_empty() {
        sections.push(format!("[standalone]\n{}", table(&CONTAINER_HEADER, &standalone)));
    }
    sections.join("\n\n")
}

pub fn images(list: &[Image]) -> String {
    let rows: Vec<_> = list
        .iter()
        .map(|i| {
            vec![
                i.repository.clone(),
                i.tag.clone(),
                i.short_id.clone(),
                human_size(i.size),
            ]
        })
        .collect();
    table(&["REPOSITORY", "TAG", "IMAGE ID", "SIZE"], &rows)
}

pub fn disk_usage(summary: &DiskUsageSummary) -> String {
    let row = |name: &str, t: &UsageTotals| {
        let percent = if t.size > 0 {
            format!(" ({}%)", t.reclaimable * 100 / t.size)
        } else {
            String::new()
        };
        vec![
            name.to_string(),
            t.total.to_string(),
            t.active.to_string(),
            human_size(t.size),
            format!("{}{percent}", human_size(t.reclaimable)),
        ]
    };
    let rows = vec![
        row("Images", &summary.images),
        row("Containers", &summary.containers),
        row("Local Volumes", &summary.volumes),
        row("Build Cache", &summary.build_cache),
    ];
    table(&["TYPE", "TOTAL", "ACTIVE", "SIZE", "RECLAIMABLE"], &rows)
}

pub fn event(event: &DockerEvent) -> String {
    let time = event
        .timestamp()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%dT%H:%M:%S%.9f%:z").to_string())
        .unwrap_or_default();
    let mut line = format!("{time} {} {} {}", event.kind, event.action, event.actor.id);
    if let Some(name) = event.actor_name() {
        line.push_str(&format!(" (name={name})"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let out = table(
            &["ID", "NAME"],
            &[
                vec!["abc".into(), "web".into()],
                vec!["a".into(), "database".into()],
            ],
        );
        assert_eq!(out, "ID    NAME\nabc   web\na     database");
    }

    #[test]
    fn test_disk_usage_rendering() {
        let summary = DiskUsageSummary {
            images: UsageTotals {
                total: 3,
                active: 1,
                size: 2000,
                reclaimable: 1000,
            },
            ..Default::default()
        };
        let out = disk_usage(&summary);
        assert!(out.contains("2kB"));
        assert!(out.contains("1kB (50%)"));
        assert_eq!(out.lines().count(), 5);
    }

    #[test]
    fn test_event_line() {
        let e = DockerEvent::parse(
            r#"{"Type":"container","Action":"die","Actor":{"ID":"abc","Attributes":{"name":"web"}}}"#,
        )
        .unwrap();
        assert!(event(&e).ends_with("container die abc (name=web)"));
    }
}
