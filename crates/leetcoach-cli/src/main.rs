//! Leetcoach CLI - Coding Practice Assistant
//!
//! Detects the problem on a practice page and answers questions about it
//! with the retrieval-augmented backend, streaming the answer as it arrives.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use leetcoach_core::bus::{Background, Endpoint, Notification, TabHost};
use leetcoach_core::chrome::{BrowserHandle, ChromeConfig, ChromeHost};
use leetcoach_core::extract::NetworkExtractor;
use leetcoach_core::fetch::{build_client, HttpHost, HttpPageSource};
use leetcoach_core::page::is_problem_url;
use leetcoach_core::session::MessageStatus;
use leetcoach_core::{
    ChatClient, ChatMessage, ChatResponse, ChatSession, ClientConfig, FetchConfig, Problem, ScrapeConfig,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Parser)]
#[command(name = "leetcoach")]
#[command(author, version, about = "A contextual assistant for coding practice problems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the problem on a page and print it
    Scrape {
        /// Problem page URL
        url: String,

        /// Output format: json, markdown, plain
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        /// Render the page in headless Chrome
        #[arg(long)]
        js: bool,
    },

    /// Ask one question about the problem on a page
    Ask {
        /// Problem page URL
        url: String,

        /// The question
        question: String,

        /// Render the page in headless Chrome
        #[arg(long)]
        js: bool,

        /// Don't index the problem on the backend first
        #[arg(long)]
        no_sync: bool,
    },

    /// Start an interactive conversation about the problem on a page
    Chat {
        /// Problem page URL
        url: String,

        /// Render the page in headless Chrome
        #[arg(long)]
        js: bool,
    },

    /// Check whether the backend is reachable
    Health,

    /// Read or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Change a setting
    Set { key: String, value: String },
    /// Print the settings file location
    Path,
}

#[derive(Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Json,
    Markdown,
    Plain,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "plain" | "text" | "txt" => Ok(OutputFormat::Plain),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(tracing_subscriber::EnvFilter::new("debug"))
            .init();
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Scrape { url, format, js } => run_scrape(&config, &url, format, js).await?,
        Commands::Ask {
            url,
            question,
            js,
            no_sync,
        } => run_ask(&config, &url, &question, js, no_sync).await?,
        Commands::Chat { url, js } => run_chat(&config, &url, js).await?,
        Commands::Health => run_health(&config).await?,
        Commands::Config { action } => run_config(config, action)?,
    }

    Ok(())
}

/// The background process plus whatever keeps its page alive
struct Panel {
    background: Background,
    endpoint: Endpoint,
    _browser: Option<BrowserHandle>,
}

impl Panel {
    async fn open(config: &Config, url: &str, js: bool) -> Result<Self> {
        let fetch = FetchConfig {
            javascript: js || config.scrape.javascript,
            use_network: config.scrape.use_network,
            ..Default::default()
        };
        let scrape = ScrapeConfig {
            timeout: Duration::from_secs(config.scrape.timeout_secs),
            ..Default::default()
        };

        let (host, browser): (Arc<dyn TabHost>, Option<BrowserHandle>) = if fetch.javascript {
            let browser = BrowserHandle::launch(&ChromeConfig::default()).await?;
            let tab = browser.open(url).await?;
            let network = if fetch.use_network {
                Some(NetworkExtractor::new(build_client(&fetch)?))
            } else {
                None
            };
            (Arc::new(ChromeHost::new(tab, scrape, network)), Some(browser))
        } else {
            let source = HttpPageSource::with_config(url, &fetch)?;
            (Arc::new(HttpHost::new(source, scrape, fetch.use_network)), None)
        };

        let page_url = Url::parse(url)?;
        if !is_problem_url(&page_url) {
            warn!("{} doesn't look like a problem page", page_url);
        }

        let background = Background::new(host);
        let endpoint = background.spawn();
        background.on_navigation(&page_url);
        endpoint.open_side_panel().await?;

        Ok(Self {
            background,
            endpoint,
            _browser: browser,
        })
    }

    async fn active_problem(&self) -> Result<Problem> {
        self.endpoint
            .get_active_problem()
            .await
            .context("Couldn't read the problem from this page")
    }
}

fn chat_client(config: &Config) -> Result<ChatClient> {
    Ok(ChatClient::new(ClientConfig {
        base_url: config.backend_url(),
        ..Default::default()
    })?)
}

/// Index the problem; the conversation goes ahead either way
async fn sync(client: &ChatClient, problem: &Problem) {
    match client.sync_problem(problem).await {
        Ok(response) => info!("Indexed '{}' ({} chunks)", problem.slug, response.chunks_indexed),
        Err(e) => warn!("Failed to index '{}': {}", problem.slug, e),
    }
}

async fn run_scrape(config: &Config, url: &str, format: OutputFormat, js: bool) -> Result<()> {
    let panel = Panel::open(config, url, js).await?;
    let problem = panel.active_problem().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&problem)?);
        }
        OutputFormat::Markdown => {
            println!("{}", problem_markdown(&problem));
        }
        OutputFormat::Plain => {
            println!("{}. {} ({})", problem.problem_number, problem.title, problem.difficulty);
            println!();
            println!("{}", problem.description);
            for (i, example) in problem.examples.iter().enumerate() {
                println!();
                println!("Example {}:", i + 1);
                println!("{}", example);
            }
            println!();
            println!("Constraints:");
            println!("{}", problem.constraints);
        }
    }

    Ok(())
}

fn problem_markdown(problem: &Problem) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}. {}\n\n", problem.problem_number, problem.title));
    out.push_str(&format!("**Difficulty:** {}  \n", problem.difficulty));
    out.push_str(&format!("**URL:** {}\n\n", problem.url));
    out.push_str(&problem.description);
    out.push_str("\n\n");
    for (i, example) in problem.examples.iter().enumerate() {
        out.push_str(&format!("## Example {}\n\n```\n{}\n```\n\n", i + 1, example));
    }
    out.push_str("## Constraints\n\n");
    out.push_str(&problem.constraints);
    out
}

async fn run_ask(config: &Config, url: &str, question: &str, js: bool, no_sync: bool) -> Result<()> {
    let panel = Panel::open(config, url, js).await?;
    let problem = panel.active_problem().await?;
    let client = chat_client(config)?;
    if !no_sync {
        sync(&client, &problem).await;
    }

    let mut session = ChatSession::new(client);
    session.set_problem(problem);
    let response = ask(&mut session, question).await?;
    print_sources(&response);
    Ok(())
}

async fn run_chat(config: &Config, url: &str, js: bool) -> Result<()> {
    let panel = Panel::open(config, url, js).await?;
    let client = chat_client(config)?;
    let mut session = ChatSession::new(client);
    let mut changes = panel.background.subscribe();

    load_problem(&panel, &mut session).await?;
    println!("Ask a question, /open <url> to switch problems, /refresh to re-read the page, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            change = changes.recv() => {
                match change {
                    Ok(Notification::ActiveProblemChanged) | Err(RecvError::Lagged(_)) => {
                        println!();
                        load_problem(&panel, &mut session).await?;
                    }
                    Err(RecvError::Closed) => break,
                }
                continue;
            }
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/refresh" => load_problem(&panel, &mut session).await?,
            command if command.starts_with("/open ") => {
                let target = command.trim_start_matches("/open ").trim();
                match Url::parse(target) {
                    Ok(target) => {
                        if let Err(e) = panel.background.navigate(&target).await {
                            eprintln!("error: {}", e);
                        }
                    }
                    Err(e) => eprintln!("error: {}: {}", target, e),
                }
            }
            question => {
                // A failed turn stays in the transcript; keep talking
                if let Err(e) = ask(&mut session, question).await {
                    eprintln!("error: {}", e);
                }
            }
        }
    }

    Ok(())
}

/// Read the active problem into the session; a new slug starts a new conversation
async fn load_problem(panel: &Panel, session: &mut ChatSession) -> Result<()> {
    let problem = panel.active_problem().await?;
    sync(session.client(), &problem).await;
    println!("{}. {} ({})", problem.problem_number, problem.title, problem.difficulty);
    session.set_problem(problem);
    Ok(())
}

/// Stream one answer to stdout; Ctrl-C abandons it
async fn ask(session: &mut ChatSession, question: &str) -> Result<ChatResponse> {
    let cancelled = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let mut stdout = std::io::stdout();
    let mut shown = String::new();
    let result = session
        .ask(question, cancelled, |message| {
            let _ = print_update(&mut stdout, message, &mut shown);
        })
        .await;
    println!();
    Ok(result?)
}

/// Write the streamed preview, then the final answer when it differs from it
fn print_update(out: &mut impl Write, message: &ChatMessage, shown: &mut String) -> std::io::Result<()> {
    match &message.status {
        MessageStatus::Streaming => {
            if let Some(delta) = message.content.get(shown.len()..) {
                write!(out, "{}", delta)?;
            }
            *shown = message.content.clone();
        }
        MessageStatus::Complete if shown.is_empty() => write!(out, "{}", message.content)?,
        MessageStatus::Complete if message.content != *shown => write!(out, "\n---\n{}", message.content)?,
        MessageStatus::Complete | MessageStatus::Failed(_) => {}
    }
    out.flush()
}

fn print_sources(response: &ChatResponse) {
    if !response.summary.is_empty() {
        println!("\nSummary: {}", response.summary);
    }
    if response.sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in &response.sources {
        println!("- {}", source.title);
    }
}

async fn run_health(config: &Config) -> Result<()> {
    let client = chat_client(config)?;
    if !client.health().await {
        bail!("Backend at {} is unreachable", client.base_url());
    }
    println!("Backend at {} is healthy", client.base_url());
    Ok(())
}

fn run_config(mut config: Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => println!("{}", config.get(&key)?),
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
        }
        ConfigAction::Path => println!("{}", Config::config_path().display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leetcoach_core::Role;

    fn assistant(content: &str, status: MessageStatus) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: 0,
            status,
        }
    }

    fn render(updates: &[ChatMessage]) -> String {
        let mut out = Vec::new();
        let mut shown = String::new();
        for message in updates {
            print_update(&mut out, message, &mut shown).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_final_answer_replaces_preview() {
        let output = render(&[
            assistant("Hi", MessageStatus::Streaming),
            assistant("Hi there", MessageStatus::Streaming),
            assistant("Use a hash map.", MessageStatus::Complete),
        ]);
        assert_eq!(output, "Hi there\n---\nUse a hash map.");
    }

    #[test]
    fn test_matching_answer_printed_once() {
        let output = render(&[
            assistant("Hi", MessageStatus::Streaming),
            assistant("Hi there", MessageStatus::Streaming),
            assistant("Hi there", MessageStatus::Complete),
        ]);
        assert_eq!(output, "Hi there");
    }

    #[test]
    fn test_answer_without_tokens() {
        let output = render(&[assistant("Cached answer.", MessageStatus::Complete)]);
        assert_eq!(output, "Cached answer.");
    }

    #[test]
    fn test_failed_answer_keeps_preview() {
        let output = render(&[
            assistant("Hi", MessageStatus::Streaming),
            assistant("Hi", MessageStatus::Failed("backend down".to_string())),
        ]);
        assert_eq!(output, "Hi");
    }
}
