//! Terminal front end for the notes store.
//!
//! Reads one command per line from stdin and renders the visible notes.
//! Backend and refresh policy come from `NOTES_*` environment variables.

use notes_client::config::{BackendKind, Config};
use notes_client::{
    HttpBackend, JsonFileSettings, MemoryBackend, NoteId, NotesBackend, NotesStore, Outcome,
    RefreshPolicy, Theme, ThemeSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;

/// How long to wait for the feed to reflect a write before re-rendering
const FEED_SETTLE: Duration = Duration::from_millis(500);

const HELP: &str = "\
commands:
  list                         show all notes
  search <query>               filter notes by title or content
  add <title> | <content>      create a note
  edit <id> <title> | <content>
                               replace a note's title and content
  rm <id>                      delete a note (asks for confirmation)
  theme                        toggle light/dark
  help                         show this help
  quit                         exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List,
    Search(String),
    Add { title: String, content: String },
    Edit { id: NoteId, title: String, content: String },
    Remove(NoteId),
    Theme,
    Help,
    Quit,
}

/// Split `<title> | <content>`. Either side may be empty; the store decides.
fn split_note(rest: &str) -> (String, String) {
    match rest.split_once('|') {
        Some((title, content)) => (title.trim().to_string(), content.trim().to_string()),
        None => (rest.trim().to_string(), String::new()),
    }
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "" | "list" | "ls" => Ok(Command::List),
            "search" | "find" => Ok(Command::Search(rest.to_string())),
            "add" | "new" => {
                let (title, content) = split_note(rest);
                Ok(Command::Add { title, content })
            }
            "edit" => {
                let (id, rest) = rest
                    .split_once(' ')
                    .ok_or_else(|| "usage: edit <id> <title> | <content>".to_string())?;
                let (title, content) = split_note(rest);
                Ok(Command::Edit {
                    id: NoteId::new(id),
                    title,
                    content,
                })
            }
            "rm" | "delete" => {
                if rest.is_empty() {
                    Err("usage: rm <id>".to_string())
                } else {
                    Ok(Command::Remove(NoteId::new(rest)))
                }
            }
            "theme" => Ok(Command::Theme),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("unknown command: {} (try 'help')", other)),
        }
    }
}

fn render(store: &NotesStore, theme: Theme, query: &str) {
    let view = store.view();

    println!();
    println!("== My Notes [{}] ==", theme.as_str());
    if view.loading {
        println!("(loading...)");
    }
    if !query.is_empty() {
        println!("search: {:?}", query);
    }

    let visible = store.search(query);
    if visible.is_empty() {
        println!("No notes found.");
        return;
    }

    for note in &visible {
        let id = note.id.as_ref().map(NoteId::as_str).unwrap_or("-");
        println!("[{}] {}", id, note.title);
        println!("    {}", note.preview());
    }
}

fn report(op: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Completed => {}
        Outcome::Skipped(reason) => println!("{} skipped: {:?}", op, reason),
        Outcome::Dropped(e) => println!("{} failed: {}", op, e),
    }
}

/// Give the feed a moment to deliver the snapshot for a write we just made.
/// `changes` must be taken before the write.
async fn settle(store: &NotesStore, mut changes: watch::Receiver<u64>, outcome: &Outcome) {
    if store.refresh_policy() == RefreshPolicy::Feed && outcome.is_completed() {
        let _ = tokio::time::timeout(FEED_SETTLE, changes.changed()).await;
    }
}

async fn confirm(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> bool {
    println!("{} [y/N]", prompt);
    matches!(
        lines.next_line().await,
        Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y")
    )
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    let backend: Arc<dyn NotesBackend> = match config.backend {
        BackendKind::Http => {
            log::info!("Using notes service at {}", config.api_url);
            match HttpBackend::new(&config.api_url) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    log::error!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        BackendKind::Memory => {
            log::info!("Using in-process notes store");
            Arc::new(MemoryBackend::new())
        }
    };

    let theme = ThemeSettings::load(Arc::new(JsonFileSettings::new(&config.settings_path)));
    let store = NotesStore::new(backend, config.refresh);

    let subscription = match config.refresh {
        RefreshPolicy::Feed => {
            let mut changes = store.changes();
            let handle = store.subscribe().await;
            // First snapshot normally lands right away
            let _ = tokio::time::timeout(FEED_SETTLE, changes.changed()).await;
            Some(handle)
        }
        RefreshPolicy::Reload => {
            store.load().await;
            None
        }
    };

    let mut query = String::new();
    render(&store, theme.get(), &query);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        match command {
            Command::List => query.clear(),
            Command::Search(q) => query = q,
            Command::Add { title, content } => {
                let changes = store.changes();
                let outcome = store.create(&title, &content).await;
                report("add", &outcome);
                settle(&store, changes, &outcome).await;
            }
            Command::Edit { id, title, content } => {
                let changes = store.changes();
                let outcome = store.update(&id, &title, &content).await;
                report("edit", &outcome);
                settle(&store, changes, &outcome).await;
            }
            Command::Remove(id) => {
                if !confirm(&mut lines, "Are you sure you want to delete this note?").await {
                    println!("kept {}", id);
                    continue;
                }
                let changes = store.changes();
                let outcome = store.remove(&id).await;
                report("rm", &outcome);
                settle(&store, changes, &outcome).await;
            }
            Command::Theme => {
                let next = theme.toggle();
                println!("theme: {}", next.as_str());
            }
            Command::Help => {
                println!("{}", HELP);
                continue;
            }
            Command::Quit => break,
        }

        render(&store, theme.get(), &query);
    }

    match subscription {
        Some(handle) => {
            handle.cancel();
        }
        None => {
            store.close();
        }
    }
}
