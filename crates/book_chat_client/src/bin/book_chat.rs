//! book-chat: command-line front end for the course book chat.
//! Reads config, sends a question (argument or stdin) and prints the answer
//! to stdout as it streams in. `--interactive` drives the full widget.

use book_chat_client::widget::ERROR_REPLY;
use book_chat_client::{
    config, ChatWidget, Config, SharedSelection, SubmitStatus, Transcript, Visibility,
};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "book-chat", version, about = "Ask the course book a question")]
struct Cli {
    /// Config file [default: ~/.book-chat/config.yaml]
    #[arg(long, env = "BOOK_CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL; overrides the config file
    #[arg(long)]
    base_url: Option<String>,

    /// Document (chapter) id sent with whole-document questions
    #[arg(long)]
    document: Option<String>,

    /// Ask about this excerpt instead of the whole document
    #[arg(long)]
    excerpt: Option<String>,

    /// Read questions and `:` commands line by line
    #[arg(short, long)]
    interactive: bool,

    /// Question; read from stdin when omitted
    question: Option<String>,
}

fn load_config(cli: &Cli) -> Config {
    // An explicit path (flag or env) must load; the default path may be absent.
    let mut cfg = match &cli.config {
        Some(path) => config::load(path).unwrap_or_else(|e| {
            eprintln!("Error: failed to load config from {}: {}", path.display(), e);
            process::exit(1);
        }),
        None => match config::default_config_path() {
            Some(path) if path.exists() => config::load(&path).unwrap_or_else(|e| {
                eprintln!("Error: failed to load config from {}: {}", path.display(), e);
                process::exit(1);
            }),
            _ => Config::default(),
        },
    };

    if let Some(url) = &cli.base_url {
        cfg.api.base_url = Some(url.clone());
    }
    if let Some(doc) = &cli.document {
        cfg.chat.document_id = Some(doc.clone());
    }
    cfg
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let cfg = load_config(&cli);

    let selection = SharedSelection::new();
    let widget = ChatWidget::from_config(&cfg, Arc::new(selection.clone())).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    // Single-threaded: the stream read is the only suspend point.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    if let Some(excerpt) = &cli.excerpt {
        selection.set(excerpt.clone());
        if let Err(e) = widget.toggle_mode() {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    if cli.interactive {
        widget.open();
        rt.block_on(repl(&widget, &selection));
        return;
    }

    // Sent as typed; only the stdin line terminator is dropped.
    let question = match &cli.question {
        Some(q) => q.clone(),
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).unwrap_or(0);
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if question.trim().is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    widget.open();
    match rt.block_on(ask(&widget, &question)) {
        SubmitStatus::Completed => {}
        SubmitStatus::Failed(reason) => {
            eprintln!("Error: {}", reason);
            process::exit(1);
        }
        SubmitStatus::Ignored | SubmitStatus::Busy => process::exit(1),
    }
}

/// Submit `question` and print the answer to stdout while it streams.
async fn ask(widget: &ChatWidget, question: &str) -> SubmitStatus {
    let mut updates = widget.subscribe();
    let mut printer = AnswerPrinter::new(widget.transcript().len() + 1);

    let submit = widget.submit(question);
    tokio::pin!(submit);
    let status = loop {
        tokio::select! {
            status = &mut submit => break status,
            Ok(()) = updates.changed() => {
                let snapshot = updates.borrow_and_update().clone();
                printer.render(&snapshot);
            }
        }
    };
    printer.render(&widget.transcript());

    if status == SubmitStatus::Completed {
        println!();
    }
    status
}

/// Prints only the text added to one assistant entry since the last render.
struct AnswerPrinter {
    index: usize,
    printed: usize,
}

impl AnswerPrinter {
    fn new(index: usize) -> Self {
        Self { index, printed: 0 }
    }

    fn render(&mut self, transcript: &Transcript) {
        let Some(message) = transcript.messages().get(self.index) else {
            return;
        };
        if let Some(delta) = message.content.get(self.printed..) {
            if !delta.is_empty() {
                let mut out = io::stdout().lock();
                let _ = write!(out, "{}", delta);
                let _ = out.flush();
            }
            self.printed = message.content.len();
        }
    }
}

async fn repl(widget: &ChatWidget, selection: &SharedSelection) {
    println!("book-chat: type a question, or :help");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            ":quit" | ":q" => break,
            ":help" => println!(
                ":open  :close  :mode  :select TEXT  :unselect  :transcript  :reset  :quit"
            ),
            ":open" => widget.open(),
            ":close" => widget.close(),
            ":mode" => match widget.toggle_mode() {
                Ok(mode) => println!("mode: {}", mode),
                Err(_) => {
                    if let Some(notice) = widget.take_notice() {
                        eprintln!("{}", notice);
                    }
                }
            },
            ":select" => selection.set(arg),
            ":unselect" => selection.clear(),
            ":transcript" => match serde_json::to_string_pretty(&widget.transcript()) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            },
            ":reset" => {
                if !widget.reset() {
                    eprintln!("busy");
                }
            }
            _ if command.starts_with(':') => eprintln!("unknown command {}", command),
            _ if widget.visibility() == Visibility::Collapsed => {
                eprintln!("chat is closed; :open to ask")
            }
            _ => {
                if let SubmitStatus::Failed(reason) = ask(widget, line).await {
                    eprintln!("{}", ERROR_REPLY);
                    tracing::debug!(%reason, "question failed");
                }
            }
        }
    }
}
