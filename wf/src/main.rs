//! wf - wildcard prompt expansion
//!
//! CLI entry point for expanding templates and inspecting the wildcard corpus.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use wildforge::cli::{Cli, Command, GraphFormat, OutputFormat};
use wildforge::config::Config;
use wildforge::{
    DependencyGraph, DirectorySource, Engine, ExpandOptions, Expansion, GenerationContext, Severity, TokenSyntax,
    ValidationIssue, WildcardDefinition, referenced_names, validate,
};

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let source = DirectorySource::from_config(&config.wildcards);
    let engine = Engine::open(&source).context("Failed to load wildcards")?;
    info!(paths = ?source.paths(), "wildforge starting");

    // Dispatch command
    match cli.command {
        Command::Expand {
            template,
            file,
            seed,
            count,
            context,
            reroll,
            reroll_seed,
            swap,
            save_context,
            format,
        } => {
            let template = read_template(template, file)?;
            let options = ExpandOptions {
                existing_context: context.as_deref().map(read_context).transpose()?,
                force_reroll: reroll.into_iter().collect(),
                force_swap: swap.into_iter().collect(),
                reroll_seed,
            };
            let seed = seed.or(config.generation.default_seed);
            cmd_expand(&engine, &template, seed, count, &options, format, save_context.as_deref())
        }
        Command::List => cmd_list(&engine),
        Command::Show { name } => cmd_show(&engine, &name),
        Command::Options { name, context } => cmd_options(&engine, &name, context.as_deref()),
        Command::Graph { format } => cmd_graph(&engine, format),
        Command::Check { name, candidate } => cmd_check(&engine, name.as_deref(), candidate.as_deref()),
        Command::Used { templates } => cmd_used(&config, &engine, templates),
    }
}

fn cmd_expand(
    engine: &Engine,
    template: &str,
    seed: Option<u64>,
    count: usize,
    options: &ExpandOptions,
    format: OutputFormat,
    save_context: Option<&Path>,
) -> Result<()> {
    let seed = match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            eprintln!("{} {}", "Seed:".dimmed(), seed);
            seed
        }
    };

    let results = engine.expand_many(template, seed, count.max(1), options)?;
    for (_, expansion) in &results {
        for warning in &expansion.warnings {
            eprintln!("{} {}", "warning:".yellow(), warning);
        }
    }

    match format {
        OutputFormat::Text => {
            for (_, expansion) in &results {
                println!("{}", expansion.text());
            }
        }
        OutputFormat::Segments => {
            for (seed, expansion) in &results {
                println!("{} {}", "#".dimmed(), format!("seed {}", seed).dimmed());
                print_segments(expansion);
            }
        }
        OutputFormat::Json => {
            let items: Vec<serde_json::Value> = results
                .iter()
                .map(|(seed, expansion)| expansion_json(*seed, expansion))
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    if let Some(path) = save_context
        && let Some((_, last)) = results.last()
    {
        let json = serde_json::to_string_pretty(&last.context)?;
        fs::write(path, json).context(format!("Failed to write context {}", path.display()))?;
        eprintln!("{} Saved context to {}", "✓".green(), path.display());
    }
    Ok(())
}

fn cmd_list(engine: &Engine) -> Result<()> {
    let snapshot = engine.snapshot();
    let names = snapshot.list_names();
    if names.is_empty() {
        println!("No wildcards found");
    }
    for name in names {
        match snapshot.get(&name) {
            Ok(definition) if definition.description.is_empty() => println!("{}", name.cyan()),
            Ok(definition) => println!("{}  {}", name.cyan(), definition.description.dimmed()),
            Err(_) => println!("{}  {}", name.red(), "(broken)".red()),
        }
    }
    Ok(())
}

fn cmd_show(engine: &Engine, name: &str) -> Result<()> {
    let snapshot = engine.snapshot();
    if let Some(broken) = snapshot.broken(name) {
        println!("{} {}", name.red(), "(broken)".red());
        println!("  Error: {}", broken.error);
        if let Some(path) = &broken.path {
            println!("  File: {}", path.display());
        }
        println!("{}", broken.raw);
        return Ok(());
    }
    print_definition(snapshot.get(name)?);
    Ok(())
}

fn cmd_options(engine: &Engine, name: &str, context: Option<&Path>) -> Result<()> {
    let ctx = match context {
        Some(path) => read_context(path)?,
        None => GenerationContext::default(),
    };
    for value in engine.choice_options(name, &ctx)? {
        println!("{}", value);
    }
    Ok(())
}

fn cmd_graph(engine: &Engine, format: GraphFormat) -> Result<()> {
    let graph = engine.dependency_graph();
    match format {
        GraphFormat::Text => print_graph(&graph),
        GraphFormat::Dot => print!("{}", graph.to_dot()),
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
    }
    Ok(())
}

fn cmd_check(engine: &Engine, name: Option<&str>, candidate: Option<&Path>) -> Result<()> {
    let issues = match (name, candidate) {
        (Some(name), Some(path)) => {
            let content =
                fs::read_to_string(path).context(format!("Failed to read candidate {}", path.display()))?;
            if path.extension().is_some_and(|e| e == "txt") {
                validate::check_definition(&engine.snapshot(), WildcardDefinition::from_lines(name, &content))
            } else {
                engine.check_candidate(name, &content)
            }
        }
        _ => engine.validate(),
    };
    print_issues(&issues);
    if validate::has_errors(&issues) {
        return Err(eyre::eyre!("Validation failed"));
    }
    Ok(())
}

fn cmd_used(config: &Config, engine: &Engine, templates: Option<PathBuf>) -> Result<()> {
    let dir = templates
        .or_else(|| config.templates.expanded_dir())
        .ok_or_else(|| eyre::eyre!("No template directory configured"))?;
    let roots = template_references(&dir)?;
    let graph = engine.dependency_graph();
    let used = graph.reachable_from(&roots);
    let unused: BTreeSet<&String> = graph.nodes.iter().filter(|n| !used.contains(*n)).collect();

    println!("{} ({})", "Used".bold(), used.len());
    for name in &used {
        if graph.nodes.contains(name) {
            println!("  {}", name.cyan());
        } else {
            println!("  {} {}", name.red(), "(missing)".red());
        }
    }
    println!("{} ({})", "Unused".bold(), unused.len());
    for name in unused {
        println!("  {}", name.dimmed());
    }
    Ok(())
}

fn read_template(template: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (template, file) {
        (Some(template), _) => Ok(template),
        (None, Some(path)) => {
            fs::read_to_string(&path).context(format!("Failed to read template {}", path.display()))
        }
        (None, None) => Err(eyre::eyre!("Provide a template or --file")),
    }
}

fn read_context(path: &Path) -> Result<GenerationContext> {
    let content = fs::read_to_string(path).context(format!("Failed to read context {}", path.display()))?;
    serde_json::from_str(&content).context(format!("Failed to parse context {}", path.display()))
}

fn expansion_json(seed: u64, expansion: &Expansion) -> serde_json::Value {
    serde_json::json!({
        "seed": seed,
        "text": expansion.text(),
        "segments": expansion.segments,
        "context": expansion.context,
        "warnings": expansion.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    })
}

fn print_segments(expansion: &Expansion) {
    for segment in &expansion.segments {
        let marker = if segment.is_from_include { "+" } else { " " };
        match &segment.wildcard_name {
            Some(name) => println!("{} {:<20} {:?}", marker, name.cyan(), segment.text),
            None => println!("{} {:<20} {:?}", marker, "", segment.text),
        }
    }
}

fn print_definition(definition: &WildcardDefinition) {
    println!("{}", definition.name.cyan().bold());
    if !definition.description.is_empty() {
        println!("  {}", definition.description);
    }
    if let Some(includes) = &definition.global_includes {
        println!("  Includes: {}", includes);
    }
    println!("  Choices ({}):", definition.choices.len());
    for choice in &definition.choices {
        let mut line = format!("    {}", choice.value());
        if choice.weight() != 1.0 {
            line.push_str(&format!("  weight={}", choice.weight()));
        }
        if !choice.tags().is_empty() {
            let tags: Vec<&str> = choice.tags().iter().map(String::as_str).collect();
            line.push_str(&format!("  tags=[{}]", tags.join(", ")));
        }
        println!("{}", line);
        if let Some(requires) = choice.requires() {
            println!("      {} {}", "requires".dimmed(), requires);
        }
        if let Some(includes) = choice.includes() {
            println!("      {} {}", "includes".dimmed(), includes);
        }
    }
    for issue in &definition.issues {
        println!("  {} {}", "!".yellow(), issue);
    }
}

fn print_graph(graph: &DependencyGraph) {
    for node in &graph.nodes {
        if graph.broken.contains(node) {
            println!("{} {}", node.red(), "(broken)".red());
            continue;
        }
        println!("{}", node.cyan());
        if let Some(targets) = graph.edges.get(node) {
            for (target, kind) in targets {
                println!("  -> {} {}", target, format!("({:?})", kind).to_lowercase().dimmed());
            }
        }
        for dependent in graph.dependents(node) {
            println!("  <- {}", dependent);
        }
    }
    for (name, referrers) in graph.unknown_references() {
        let referrers: Vec<&str> = referrers.into_iter().collect();
        println!("{} {} (referenced by {})", "missing".red(), name, referrers.join(", "));
    }
    for cycle in graph.find_cycles() {
        println!("{} {}", "cycle".red().bold(), cycle.join(" -> "));
    }
}

fn print_issues(issues: &[ValidationIssue]) {
    if issues.is_empty() {
        println!("{} No issues found", "✓".green());
        return;
    }
    for issue in issues {
        match issue.severity() {
            Severity::Error => println!("{} {}", "error:".red().bold(), issue),
            Severity::Warning => println!("{} {}", "warning:".yellow(), issue),
        }
    }
}

/// Every wildcard name referenced by a `*.txt` template under `dir`
fn template_references(dir: &Path) -> Result<BTreeSet<String>> {
    let pattern = dir.join("**").join("*.txt");
    let pattern = pattern.to_string_lossy();
    let mut names = BTreeSet::new();

    for entry in glob::glob(&pattern).context("Invalid template directory")? {
        let path: PathBuf = entry.context("Failed to read template directory")?;
        let content = fs::read_to_string(&path).context(format!("Failed to read template {}", path.display()))?;
        names.extend(referenced_names(&content, TokenSyntax::Template));
    }
    Ok(names)
}
