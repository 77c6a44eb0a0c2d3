mod client;
mod config;
mod error;
mod history;
mod prompt;
mod render;
mod session;

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use client::{CompletionClient, HttpTransport};
use config::ConfigStore;
use history::HistoryStore;
use render::{MarkdownEngine, Renderer, StdoutSink};
use session::SessionManager;

#[derive(Parser, Debug)]
#[command(
    name = "weainote",
    about = "A page-content AI assistant: chat sessions, prompt templates, and local history",
    long_about = None,
)]
struct Args {
    /// Page content file to chat about ("-" reads stdin)
    page: Option<String>,

    /// Question to ask about the page (omit for a plain analysis)
    #[arg(short, long, default_value = "")]
    question: String,

    /// Prompt template id to apply (see --templates)
    #[arg(short, long)]
    template: Option<i64>,

    /// Continue a saved conversation instead of starting fresh
    #[arg(long, value_name = "ID")]
    load: Option<String>,

    /// Save the conversation to history after the reply arrives
    #[arg(short, long)]
    save: bool,

    /// Print the reply at once instead of animating it
    #[arg(long)]
    no_reveal: bool,

    /// Use the minimal regex formatter instead of the full Markdown engine
    #[arg(long)]
    minimal_markdown: bool,

    /// Write the default config file and exit
    #[arg(long)]
    init: bool,

    /// List saved conversations and exit
    #[arg(long)]
    history: bool,

    /// List prompt templates grouped by category and exit
    #[arg(long)]
    templates: bool,

    /// Add a prompt category
    #[arg(long, value_name = "NAME")]
    add_category: Option<String>,

    /// Rename a prompt category
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"])]
    rename_category: Option<Vec<String>>,

    /// Delete a category and every template in it (asks for confirmation)
    #[arg(long, value_name = "ID")]
    delete_category: Option<i64>,

    /// Add a prompt template to a category
    #[arg(long, num_args = 3, value_names = ["CATEGORY_ID", "TITLE", "CONTENT"])]
    add_prompt: Option<Vec<String>>,

    /// Replace a template's title and content
    #[arg(long, num_args = 3, value_names = ["ID", "TITLE", "CONTENT"])]
    edit_prompt: Option<Vec<String>>,

    /// Delete a prompt template (asks for confirmation)
    #[arg(long, value_name = "ID")]
    delete_prompt: Option<i64>,

    /// Rename a saved conversation
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"])]
    rename: Option<Vec<String>>,

    /// Delete a saved conversation (asks for confirmation)
    #[arg(long, value_name = "ID")]
    delete: Option<String>,

    /// Delete all saved conversations (asks for confirmation)
    #[arg(long)]
    clear_history: bool,

    /// Export the full config as JSON
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Import a previously exported config file
    #[arg(long, value_name = "PATH")]
    import: Option<PathBuf>,

    /// Skip confirmation prompts for destructive operations
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_store = ConfigStore::new();
    let history_store = HistoryStore::new();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        config_store.load()?;
        println!("  Config written to: {}", config_store.path().display());
        return Ok(());
    }

    // ── --export / --import ───────────────────────────────────────────────────
    if let Some(path) = &args.export {
        let snapshot = config_store.load()?;
        std::fs::write(path, config::export_to_json(&snapshot)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("  ✓ config exported to {}", path.display());
        return Ok(());
    }
    if let Some(path) = &args.import {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let imported = config::import_config(&raw)?;
        config_store.save(&imported)?;
        println!("  ✓ config imported from {}", path.display());
        return Ok(());
    }

    // ── --history ─────────────────────────────────────────────────────────────
    if args.history {
        print_history(&history_store)?;
        return Ok(());
    }

    // ── --templates ───────────────────────────────────────────────────────────
    if args.templates {
        print_templates(&config_store)?;
        return Ok(());
    }

    // ── Category management ───────────────────────────────────────────────────
    if let Some(name) = &args.add_category {
        let mut snapshot = config_store.load()?;
        let id = snapshot.add_category(name)?;
        config_store.save(&snapshot)?;
        println!("  ✓ added category [{id}] {name}");
        return Ok(());
    }
    if let Some(pair) = &args.rename_category {
        let id: i64 = pair[0].parse().context("category id must be a number")?;
        let mut snapshot = config_store.load()?;
        snapshot.rename_category(id, &pair[1])?;
        config_store.save(&snapshot)?;
        println!("  ✓ category {id} is now \"{}\"", pair[1]);
        return Ok(());
    }
    if let Some(id) = args.delete_category {
        let mut snapshot = config_store.load()?;
        let affected = snapshot.template_count(id);
        if !args.yes
            && !confirm(&format!(
                "Delete category {id} and its {affected} template(s)? This cannot be undone."
            ))?
        {
            println!("  cancelled");
            return Ok(());
        }
        snapshot.delete_category(id);
        config_store.save(&snapshot)?;
        println!("  ✓ deleted category {id} ({affected} template(s) removed)");
        return Ok(());
    }

    // ── Template management ───────────────────────────────────────────────────
    if let Some(triple) = &args.add_prompt {
        let category_id: i64 = triple[0].parse().context("category id must be a number")?;
        let mut snapshot = config_store.load()?;
        let id = snapshot.add_prompt(category_id, &triple[1], &triple[2]);
        config_store.save(&snapshot)?;
        println!("  ✓ added template [{id}] {}", triple[1]);
        return Ok(());
    }
    if let Some(triple) = &args.edit_prompt {
        let id: i64 = triple[0].parse().context("template id must be a number")?;
        let mut snapshot = config_store.load()?;
        snapshot.update_prompt(id, &triple[1], &triple[2])?;
        config_store.save(&snapshot)?;
        println!("  ✓ updated template {id}");
        return Ok(());
    }
    if let Some(id) = args.delete_prompt {
        if !args.yes && !confirm(&format!("Delete template {id}? This cannot be undone."))? {
            println!("  cancelled");
            return Ok(());
        }
        let mut snapshot = config_store.load()?;
        snapshot.delete_prompt(id);
        config_store.save(&snapshot)?;
        println!("  ✓ deleted template {id}");
        return Ok(());
    }

    // ── --rename ──────────────────────────────────────────────────────────────
    if let Some(pair) = &args.rename {
        let (id, name) = (&pair[0], &pair[1]);
        history_store.rename(id, name)?;
        let display = history_store
            .get(id)?
            .map(|s| s.display_name())
            .unwrap_or_else(|| id.clone());
        println!("  ✓ {id} is now \"{display}\"");
        return Ok(());
    }

    // ── --delete / --clear-history ────────────────────────────────────────────
    if let Some(id) = &args.delete {
        if !args.yes && !confirm(&format!("Delete conversation {id}? This cannot be undone."))? {
            println!("  cancelled");
            return Ok(());
        }
        history_store.delete(id)?;
        println!("  ✓ deleted {id}");
        return Ok(());
    }
    if args.clear_history {
        if !args.yes && !confirm("Delete ALL saved conversations? This cannot be undone.")? {
            println!("  cancelled");
            return Ok(());
        }
        history_store.clear()?;
        println!("  ✓ history cleared");
        return Ok(());
    }

    // ── Chat mode ─────────────────────────────────────────────────────────────
    let engine = if args.minimal_markdown {
        MarkdownEngine::Minimal
    } else {
        MarkdownEngine::Full
    };
    let mut renderer = Renderer::new(engine);
    if args.no_reveal {
        renderer = renderer.without_animation();
    }

    let mut manager = SessionManager::new();

    if let Some(id) = &args.load {
        manager.load(id, &history_store)?;
        println!();
        println!("  ↩ {}", manager.current().display_name());
        for msg in &manager.current().messages {
            print_transcript_message(&renderer, msg);
        }
    }

    let Some(page) = &args.page else {
        if args.load.is_some() {
            // Load-only invocation: transcript printed above, nothing to send
            return Ok(());
        }
        bail!("no page content given — pass a file path, or \"-\" to read stdin");
    };
    let page_text = read_page(page)?;

    // Config is fetched fresh for the request, never cached across operations
    let snapshot = config_store.load()?;
    manager.select_template(args.template, &snapshot);
    if args.template.is_some() && manager.selected_template().is_none() {
        println!("  ⚠ no template with that id — using the default prompt");
    }
    if let Some(t) = manager.selected_template() {
        println!(
            "  ▸ template: {} ({})",
            t.title,
            snapshot.category_name(t.category_id)
        );
    }

    let client = CompletionClient::new(HttpTransport::new());
    let mut sink = StdoutSink::new();
    println!();
    manager
        .send_message(&page_text, &args.question, &snapshot, &client, &renderer, &mut sink)
        .await?;
    println!();

    if args.save {
        let id = manager.save(&history_store)?;
        println!("  ✓ saved as {id}");
    }

    Ok(())
}

// ── Page input ────────────────────────────────────────────────────────────────

fn read_page(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {source}"))
    }
}

// ── Listings ──────────────────────────────────────────────────────────────────

fn print_history(store: &HistoryStore) -> Result<()> {
    let sessions = store.list()?;
    println!();
    if sessions.is_empty() {
        println!("  no saved conversations");
        return Ok(());
    }
    println!("  Saved conversations");
    for s in &sessions {
        let preview = s
            .messages
            .first()
            .map(|m| truncate_chars(&m.content, 50))
            .unwrap_or_default();
        println!("  {}  {}", s.id.as_deref().unwrap_or("?"), s.display_name());
        println!("    {} message(s)  {preview}", s.messages.len());
    }
    Ok(())
}

fn print_templates(store: &ConfigStore) -> Result<()> {
    let snapshot = store.load()?;
    println!();
    println!("  Prompt templates");
    for t in &snapshot.prompts {
        println!(
            "  [{}] {}  ·  {}",
            t.id,
            t.title,
            snapshot.category_name(t.category_id)
        );
    }
    Ok(())
}

fn print_transcript_message(renderer: &Renderer, msg: &session::Message) {
    let glyph = match msg.role {
        prompt::Role::User => "❯",
        prompt::Role::Assistant => "▲",
        prompt::Role::System => "·",
    };
    println!();
    for line in renderer.render_message(msg.role, &msg.content).lines() {
        println!("  {glyph} {line}");
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    let truncated: String = s.chars().take(max).collect();
    if truncated.len() < s.len() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

// ── Confirmation prompt for destructive operations ────────────────────────────

fn confirm(question: &str) -> Result<bool> {
    print!("  {question} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
