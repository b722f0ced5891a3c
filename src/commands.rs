//! CLI entry points. Each `run_*` function builds the services from config,
//! performs one operation and prints the result to stdout.

use anyhow::{bail, Result};

use segue_content_core::search::SearchFilters;
use segue_content_core::transfer::ContentDto;

use crate::app::{build_services, Services};
use crate::config::Config;

/// Resolves `head` to the repository head; anything else must name an
/// existing version.
async fn resolve_requested(services: &Services, version: &str) -> Result<String> {
    if version == "head" {
        return Ok(services.source.head_version().await?);
    }
    if !services.source.verify_version_exists(version).await {
        bail!("content version not found: {}", version);
    }
    Ok(version.to_string())
}

pub async fn run_versions(config: &Config) -> Result<()> {
    let services = build_services(config).await?;
    let indexed = services.manager.list_indexed_versions().await?;
    let live = services.manager.resolve_version(None).await.ok();

    for info in services.manager.list_versions().await? {
        let mut marks = Vec::new();
        if live.as_deref() == Some(info.id.as_str()) {
            marks.push("live");
        }
        if indexed.contains(&info.id) {
            marks.push("indexed");
        }
        println!(
            "{}  {}  {}{}",
            info.id.chars().take(12).collect::<String>(),
            info.committed_at.format("%Y-%m-%d %H:%M"),
            info.summary,
            if marks.is_empty() {
                String::new()
            } else {
                format!("  [{}]", marks.join(", "))
            }
        );
    }
    Ok(())
}

pub async fn run_index(config: &Config, version: &str, live: bool) -> Result<()> {
    let services = build_services(config).await?;
    let version = resolve_requested(&services, version).await?;

    let outcome = if live {
        services.indexer.set_live(&version).await?
    } else {
        services.indexer.build_index(&version).await?
    };

    if outcome.already_indexed {
        println!("Version {} already indexed.", outcome.version);
    } else {
        println!("Indexed version {}", outcome.version);
        println!("  objects:  {}", outcome.objects);
        println!("  tags:     {}", outcome.tags);
        println!("  units:    {}", outcome.units);
        println!("  problems: {}", outcome.problems);
    }
    if live {
        println!("Live version is now {}", outcome.version);
    }
    Ok(())
}

pub async fn run_get(config: &Config, id: &str, version: Option<&str>) -> Result<()> {
    let services = build_services(config).await?;
    let dto = match services.manager.get_content_by_id(version, id).await {
        Ok(dto) => dto,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", serde_json::to_string_pretty(&dto)?);
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    types: Vec<String>,
    tags: Vec<String>,
    start: usize,
    limit: Option<usize>,
    version: Option<&str>,
) -> Result<()> {
    let services = build_services(config).await?;
    let limit = limit.unwrap_or(config.search.default_limit);
    if limit == 0 {
        bail!("--limit must be at least 1");
    }

    let mut filters = SearchFilters::new();
    if !types.is_empty() {
        filters.insert("type".to_string(), types);
    }
    if !tags.is_empty() {
        filters.insert("tags".to_string(), tags);
    }

    let page = services
        .manager
        .search_for_content(version, query, &filters, start, limit)
        .await?;

    if page.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, dto) in page.results.iter().enumerate() {
        print_result(start + i + 1, dto);
    }
    println!(
        "Showing {}-{} of {}",
        start + 1,
        start + page.results.len(),
        page.total_results
    );
    Ok(())
}

fn print_result(rank: usize, dto: &ContentDto) {
    println!(
        "{}. {} ({})",
        rank,
        dto.title.as_deref().unwrap_or("(untitled)"),
        dto.content_type
    );
    if let Some(id) = &dto.id {
        println!("    id: {}", id);
    }
    if !dto.tags.is_empty() {
        let tags: Vec<&str> = dto.tags.iter().map(String::as_str).collect();
        println!("    tags: {}", tags.join(", "));
    }
    println!();
}

pub async fn run_problems(config: &Config, version: Option<&str>) -> Result<()> {
    let services = build_services(config).await?;
    let entries = services.manager.get_problems(version).await?;

    if entries.is_empty() {
        println!("No content problems.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{} [{}]{}",
            entry.canonical_source_file,
            entry.id.as_deref().unwrap_or("-"),
            if entry.published { " (published)" } else { "" }
        );
        for problem in &entry.problems {
            println!("    {:?}: {}", problem.kind, problem.message);
        }
    }
    println!(
        "{} problems across {} objects",
        entries.iter().map(|e| e.problems.len()).sum::<usize>(),
        entries.len()
    );
    Ok(())
}
