//! Inspection commands: roots, show, field, static

use super::{with_navigator, Settings};
use anyhow::{Context, Result};
use console::style;
use heapnav::{AuxFileNavigator, ObjectId, ObjectNavigator, NULL_ID};
use serde_json::json;
use std::path::Path;

pub(super) fn roots(settings: &Settings, snapshot: &Path, limit: Option<usize>) -> Result<()> {
    with_navigator(settings, snapshot, |nav| {
        let total = nav.roots().len();
        println!("\n{} GC roots ({})\n", style("●").bold(), total);

        let shown = limit.unwrap_or(total);
        for id in nav.create_roots_iterator().take(shown) {
            let class = nav
                .get_class_for_object_id(id)
                .map(|c| c.name.as_str())
                .unwrap_or("<unknown>");
            let reason = nav
                .get_root_reason_for_object_id(id)
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!(
                "  {} {} {}",
                style(format!("#{}", id)).cyan(),
                class,
                style(reason).dim()
            );
        }
        if total > shown {
            println!("  ... and {} more", total - shown);
        }
        Ok(())
    })
}

pub(super) fn show(
    settings: &Settings,
    snapshot: &Path,
    id: ObjectId,
    soft_weak: bool,
    format: &str,
) -> Result<()> {
    let max_refs = settings.config.output.max_references;
    with_navigator(settings, snapshot, |nav| {
        nav.go_to(id, soft_weak)
            .with_context(|| format!("Cannot navigate to object {}", id))?;
        if format == "json" {
            println!("{}", serde_json::to_string_pretty(&object_json(nav)?)?);
        } else {
            print_object(nav, max_refs)?;
        }
        Ok(())
    })
}

pub(super) fn field(settings: &Settings, snapshot: &Path, id: ObjectId, path: &str) -> Result<()> {
    let max_refs = settings.config.output.max_references;
    with_navigator(settings, snapshot, |nav| {
        nav.go_to(id, false)
            .with_context(|| format!("Cannot navigate to object {}", id))?;
        nav.go_to_field_path(path)
            .with_context(|| format!("Cannot follow {} from object {}", path, id))?;
        print_object(nav, max_refs)
    })
}

pub(super) fn static_field(
    settings: &Settings,
    snapshot: &Path,
    class: &str,
    field: &str,
) -> Result<()> {
    let max_refs = settings.config.output.max_references;
    with_navigator(settings, snapshot, |nav| {
        nav.go_to_static_field(class, field)
            .with_context(|| format!("Cannot resolve {}.{}", class, field))?;
        print_object(nav, max_refs)
    })
}

/// Field label for each reference slot of the current object
fn reference_labels(nav: &AuxFileNavigator) -> Result<Vec<String>> {
    let class = nav.get_class()?;
    let refs = nav.references()?;
    if class.is_array() {
        return Ok((0..refs.len()).map(|i| format!("[{}]", i)).collect());
    }
    Ok(class
        .all_ref_field_names(nav.class_store())
        .into_iter()
        .map(str::to_string)
        .collect())
}

fn print_object(nav: &AuxFileNavigator, max_refs: usize) -> Result<()> {
    if nav.is_null() {
        println!("\n  {}\n", style("null").dim());
        return Ok(());
    }
    let id = nav.id().unwrap_or(NULL_ID);
    let class = nav.get_class()?;
    println!("\n{} {}", style(format!("#{}", id)).cyan().bold(), class.name);
    if let Some(reason) = nav.get_root_reason_for_object_id(id) {
        println!("  root: {}", style(reason).yellow());
    }

    let refs = nav.references()?;
    let labels = reference_labels(nav)?;
    let shown = if max_refs == 0 { refs.len() } else { max_refs.min(refs.len()) };
    for (label, &target) in labels.iter().zip(refs).take(shown) {
        let target_desc = if target == NULL_ID {
            style("null".to_string()).dim()
        } else {
            let name = nav
                .get_class_for_object_id(target)
                .map(|c| c.name.clone())
                .unwrap_or_else(|_| "<unknown>".to_string());
            style(format!("#{} {}", target, name))
        };
        println!("  {} -> {}", label, target_desc);
    }
    if refs.len() > shown {
        println!("  ... and {} more", refs.len() - shown);
    }
    println!();
    Ok(())
}

fn object_json(nav: &AuxFileNavigator) -> Result<serde_json::Value> {
    if nav.is_null() {
        return Ok(json!({ "id": NULL_ID, "null": true }));
    }
    let id = nav.id().unwrap_or(NULL_ID);
    let labels = reference_labels(nav)?;
    let references: Vec<_> = labels
        .iter()
        .zip(nav.references()?)
        .map(|(label, target)| json!({ "field": label, "id": target }))
        .collect();

    Ok(json!({
        "id": id,
        "class": nav.get_class()?.name,
        "root_reason": nav.get_root_reason_for_object_id(id),
        "soft_weak_included": nav.includes_soft_weak_references(),
        "references": references,
    }))
}
