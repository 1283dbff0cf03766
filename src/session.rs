//! Line-oriented interactive session over a loaded [`FeedManager`].
//!
//! Feeds are addressed by their 1-based position in the listing, or by their
//! full hex key. Rendering is kept in pure functions so tables can be tested
//! without a terminal.
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::feed::ParsedEntry;
use crate::manager::{DocumentState, FeedManager};
use crate::types::{Feed, FeedKey, Genre};
use crate::util::{fit_to_width, strip_control_chars};

const NUM_WIDTH: usize = 4;
const TITLE_WIDTH: usize = 40;
const GENRE_WIDTH: usize = 14;
const URL_WIDTH: usize = 60;
const ARTICLE_LIMIT: usize = 5;

const HELP: &str = "\
Commands:
  list                  show the active feed list
  articles <feed>       show the latest articles of a feed
  genre <feed> <genre>  change a feed's genre
  delete <feed>         move a feed to the deleted archive
  save                  write the feed list
  health                re-check every feed and mark failures Dead
  help                  show this help
  quit                  leave the session
<feed> is a number from the listing or a feed key.";

// ============================================================================
// Commands
// ============================================================================

/// How a command names a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRef {
    /// 1-based position in the listing.
    Index(usize),
    Key(FeedKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Articles(FeedRef),
    Genre(FeedRef, String),
    Delete(FeedRef),
    Save,
    Health,
    Help,
    Quit,
}

fn parse_feed_ref(token: Option<&str>) -> Result<FeedRef, String> {
    let token = token.ok_or_else(|| "Missing feed number".to_string())?;
    if let Ok(n) = token.parse::<usize>() {
        if n == 0 {
            return Err("Feed numbers start at 1".to_string());
        }
        return Ok(FeedRef::Index(n));
    }
    token
        .parse::<FeedKey>()
        .map(FeedRef::Key)
        .map_err(|e| e.to_string())
}

/// Parses one input line. Blank lines parse as `List`.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(Command::List);
    };

    match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" | "l" => Ok(Command::List),
        "articles" | "a" => Ok(Command::Articles(parse_feed_ref(parts.next())?)),
        "genre" | "g" => {
            let feed = parse_feed_ref(parts.next())?;
            let label = parts.collect::<Vec<_>>().join(" ");
            if label.is_empty() {
                return Err("Missing genre".to_string());
            }
            Ok(Command::Genre(feed, label))
        }
        "delete" | "rm" | "d" => Ok(Command::Delete(parse_feed_ref(parts.next())?)),
        "save" | "s" => Ok(Command::Save),
        "health" | "h" => Ok(Command::Health),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("Unknown command '{}'", other)),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn cell(s: &str, width: usize) -> String {
    fit_to_width(&strip_control_chars(s), width)
}

/// Numbered table of the active list.
pub fn render_feed_table(feeds: &[Feed]) -> String {
    if feeds.is_empty() {
        return "No feeds.\n".to_string();
    }

    let mut out = format!(
        "{} {} {} {}\n",
        cell("#", NUM_WIDTH),
        cell("Title", TITLE_WIDTH),
        cell("Genre", GENRE_WIDTH),
        "URL"
    );
    for (i, feed) in feeds.iter().enumerate() {
        let row = format!(
            "{} {} {} {}",
            cell(&(i + 1).to_string(), NUM_WIDTH),
            cell(&feed.title, TITLE_WIDTH),
            cell(feed.genre.label(), GENRE_WIDTH),
            cell(&feed.url, URL_WIDTH)
        );
        out.push_str(row.trim_end());
        out.push('\n');
    }
    out
}

/// URL/reason table for feeds rejected on load.
pub fn render_invalid_table(invalid: &BTreeMap<String, String>) -> String {
    let mut out = format!("{} {}\n", cell("URL", URL_WIDTH), "Error");
    for (url, reason) in invalid {
        out.push_str(&format!(
            "{} {}\n",
            cell(url, URL_WIDTH),
            strip_control_chars(reason)
        ));
    }
    out
}

/// Date/title table of a feed's latest entries.
pub fn render_articles(entries: &[ParsedEntry]) -> String {
    if entries.is_empty() {
        return "No articles.\n".to_string();
    }

    let mut out = String::from("Latest Articles\n");
    for entry in entries {
        let date = entry
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let title = if entry.title.trim().is_empty() {
            "No title".into()
        } else {
            strip_control_chars(&entry.title)
        };
        out.push_str(&format!("{} {}\n", cell(&date, 10), title));
    }
    out
}

fn genre_choices() -> String {
    Genre::RECOGNIZED
        .iter()
        .map(|g| g.label())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Session Loop
// ============================================================================

pub struct Session<'a> {
    manager: &'a mut FeedManager,
    document: PathBuf,
    /// Skip writes of the active document.
    dry_run: bool,
}

impl<'a> Session<'a> {
    pub fn new(manager: &'a mut FeedManager, document: PathBuf, dry_run: bool) -> Self {
        Self {
            manager,
            document,
            dry_run,
        }
    }

    fn resolve(&self, feed: &FeedRef) -> Option<FeedKey> {
        match feed {
            FeedRef::Index(n) => self.manager.feeds().get(n - 1).map(Feed::key),
            FeedRef::Key(key) => self.manager.get(key).map(Feed::key),
        }
    }

    fn save(&mut self, out: &mut impl Write) -> Result<()> {
        if self.dry_run {
            writeln!(out, "Dry run: not writing {}", self.document.display())?;
            return Ok(());
        }
        match self.manager.save(&self.document) {
            Ok(()) => writeln!(out, "Changes saved to {}", self.document.display())?,
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
        Ok(())
    }

    /// Runs commands from `input` until `quit` or end of input.
    ///
    /// Command failures are reported on `out` and the loop continues; only
    /// I/O errors on `input` or `out` end the session early.
    pub async fn run<R>(&mut self, input: R, out: &mut impl Write) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        write!(out, "{}", render_feed_table(self.manager.feeds()))?;
        writeln!(out, "Type 'help' for commands.")?;

        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };

            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(msg) => {
                    writeln!(out, "{}", msg)?;
                    continue;
                }
            };
            tracing::debug!(command = ?command, "Session command");

            if command == Command::Quit {
                if self.manager.state() == DocumentState::Modified
                    && confirm(&mut lines, out, "Save changes before exiting?").await?
                {
                    self.save(out)?;
                }
                break;
            }
            self.execute(command, &mut lines, out).await?;
        }
        Ok(())
    }

    async fn execute<R>(
        &mut self,
        command: Command,
        lines: &mut Lines<R>,
        out: &mut impl Write,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        match command {
            Command::List => write!(out, "{}", render_feed_table(self.manager.feeds()))?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Save => self.save(out)?,
            Command::Articles(feed) => {
                let Some(feed) = self.resolve(&feed).and_then(|k| self.manager.get(&k)) else {
                    writeln!(out, "No such feed")?;
                    return Ok(());
                };
                let url = feed.url.clone();
                match self
                    .manager
                    .classifier()
                    .latest_articles(&url, ARTICLE_LIMIT)
                    .await
                {
                    Ok(entries) => write!(out, "{}", render_articles(&entries))?,
                    Err(e) => writeln!(out, "Error: {:#}", e)?,
                }
            }
            Command::Genre(feed, label) => {
                let Some(key) = self.resolve(&feed) else {
                    writeln!(out, "No such feed")?;
                    return Ok(());
                };
                match self.manager.set_genre(&key, &label) {
                    Ok(true) => writeln!(out, "Genre updated")?,
                    Ok(false) => writeln!(
                        out,
                        "Unknown genre '{}'. Available genres: {}",
                        label,
                        genre_choices()
                    )?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
            Command::Delete(feed) => {
                let Some(key) = self.resolve(&feed) else {
                    writeln!(out, "No such feed")?;
                    return Ok(());
                };
                let title = self
                    .manager
                    .get(&key)
                    .map(|f| strip_control_chars(&f.title).into_owned())
                    .unwrap_or_default();
                if !confirm(lines, out, &format!("Delete {}?", title)).await? {
                    return Ok(());
                }
                match self.manager.move_to_deleted(&key).await {
                    Ok(_) => writeln!(out, "Feed deleted")?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
            Command::Health => {
                writeln!(out, "Checking {} feeds...", self.manager.len())?;
                let marked = self.manager.check_health().await;
                writeln!(out, "Marked {} feeds as Dead", marked)?;
            }
            Command::Quit => {}
        }
        Ok(())
    }
}

/// Asks a yes/no question. End of input counts as no.
async fn confirm<R>(lines: &mut Lines<R>, out: &mut impl Write, question: &str) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    write!(out, "{} [y/N] ", question)?;
    out.flush()?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
