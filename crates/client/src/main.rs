//! Vejovis terminal chat
//!
//! Reads questions from stdin, streams grounded answers from the gateway,
//! and opens cited papers with `/open <id>`.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use vejovis_client::{
    citation,
    detail::{DetailLoader, DetailState},
    ChatSession, GatewayClient,
};

#[derive(Parser, Debug)]
#[command(name = "vejovis-chat", version, about = "Chat with the research corpus")]
struct Args {
    /// Gateway base URL
    #[arg(long, env = "VEJOVIS_GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway: String,

    /// Log filter for diagnostics on stderr
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Prints complete lines of a streaming answer as they arrive
#[derive(Default)]
struct LinePrinter {
    printed: usize,
}

impl LinePrinter {
    fn show(&mut self, text: &str, is_final: bool) {
        let rendered = citation::render_terminal(text);
        let lines: Vec<&str> = rendered.split('\n').collect();
        // The trailing line may still be growing until the final snapshot
        let ready = if is_final { lines.len() } else { lines.len() - 1 };

        let mut out = std::io::stdout().lock();
        for line in lines.iter().take(ready).skip(self.printed) {
            let _ = writeln!(out, "{}", line);
        }
        let _ = out.flush();
        self.printed = self.printed.max(ready);
    }
}

async fn open_paper(loader: &DetailLoader, id: i64) {
    let mut updates = loader.subscribe();
    loader.open(id);

    loop {
        let state = updates.borrow_and_update().clone();
        match state {
            DetailState::Loading(_) | DetailState::Empty => {}
            DetailState::Loaded(detail) => {
                let paper = &detail.paper;
                let year = paper.pub_year.map_or("?".to_string(), |y| y.to_string());
                println!("\n{} ({}) #{}", paper.title, year, paper.id);
                if !paper.entities.is_empty() {
                    println!("Topics: {}", paper.entities.join(", "));
                }
                for (label, value) in [
                    ("Summary", &paper.summary),
                    ("Findings", &paper.findings),
                    ("Hypothesis", &paper.hypothesis),
                ] {
                    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                        println!("{}: {}", label, value);
                    }
                }
                if let Some(url) = &detail.pdf_url {
                    println!("PDF: {}", url);
                }
                return;
            }
            DetailState::Failed { id, message } => {
                println!("\nCould not load paper #{}: {}", id, message);
                return;
            }
        }
        if updates.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    let client = GatewayClient::new(&args.gateway).context("failed to build HTTP client")?;
    let loader = DetailLoader::new(Arc::new(client.clone()));
    let mut session = ChatSession::new(client);

    if let Some(greeting) = session.conversation().messages().first() {
        println!("{}\n", greeting.content);
    }
    println!("Type a question, `/open <id>` to view a paper, or `/quit`.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(id) = line.strip_prefix("/open") {
            match id.trim().parse() {
                Ok(id) => open_paper(&loader, id).await,
                Err(_) => println!("Usage: /open <paper id>"),
            }
            continue;
        }

        println!();
        let mut printer = LinePrinter::default();
        match session
            .send(line, |update| printer.show(&update.text, update.is_final))
            .await
        {
            Ok(answer) => {
                let cited = citation::cited_papers(&answer);
                if !cited.is_empty() {
                    let ids: Vec<String> = cited.iter().map(|id| format!("#{}", id)).collect();
                    println!("\nCited: {}", ids.join(", "));
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Turn failed");
                if let Some(message) = session.conversation().messages().last() {
                    println!("{}", message.content);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["vejovis-chat"]).unwrap();
        assert_eq!(args.log_level, "warn");
    }
}
